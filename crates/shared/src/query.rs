//! View-state snapshot describing which slice of a remote collection is wanted.

use serde::{Deserialize, Serialize};

pub const DEFAULT_PAGE_SIZE: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub offset: u64,
    pub limit: u32,
}

impl Pagination {
    pub fn new(offset: u64, limit: u32) -> Self {
        Self {
            offset,
            limit: limit.max(1),
        }
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self::new(0, DEFAULT_PAGE_SIZE)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    Asc,
    Desc,
}

/// One sort criterion. Serialized as `{"id": field, "desc": bool}`, the shape
/// the portal query handlers parse out of the `sorting` string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "WireSortKey", from = "WireSortKey")]
pub struct SortKey {
    pub field: String,
    pub direction: SortDirection,
}

impl SortKey {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Asc,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Desc,
        }
    }

    /// Parses `field` or `field:asc` / `field:desc`.
    pub fn parse(raw: &str) -> Option<Self> {
        let (field, direction) = match raw.split_once(':') {
            Some((field, dir)) if dir.eq_ignore_ascii_case("desc") => (field, SortDirection::Desc),
            Some((field, dir)) if dir.eq_ignore_ascii_case("asc") => (field, SortDirection::Asc),
            Some(_) => return None,
            None => (raw, SortDirection::Asc),
        };
        let field = field.trim();
        if field.is_empty() {
            return None;
        }
        Some(Self {
            field: field.to_string(),
            direction,
        })
    }
}

#[derive(Serialize, Deserialize)]
struct WireSortKey {
    id: String,
    desc: bool,
}

impl From<SortKey> for WireSortKey {
    fn from(value: SortKey) -> Self {
        Self {
            id: value.field,
            desc: value.direction == SortDirection::Desc,
        }
    }
}

impl From<WireSortKey> for SortKey {
    fn from(value: WireSortKey) -> Self {
        Self {
            field: value.id,
            direction: if value.desc {
                SortDirection::Desc
            } else {
                SortDirection::Asc
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    Bool(bool),
    Text(String),
}

impl FilterValue {
    /// `true`/`false` become booleans, everything else stays text.
    pub fn parse(raw: &str) -> Self {
        match raw {
            "true" => Self::Bool(true),
            "false" => Self::Bool(false),
            other => Self::Text(other.to_string()),
        }
    }
}

impl From<bool> for FilterValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<&str> for FilterValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for FilterValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnFilter {
    #[serde(rename = "id")]
    pub field: String,
    pub value: FilterValue,
}

/// Per-column filters, unique per field, kept in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ColumnFilters(Vec<ColumnFilter>);

impl ColumnFilters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, field: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        self.set(field, value);
        self
    }

    /// Last write wins: an existing entry for `field` is replaced in place.
    pub fn set(&mut self, field: impl Into<String>, value: impl Into<FilterValue>) {
        let field = field.into();
        let value = value.into();
        match self.0.iter_mut().find(|filter| filter.field == field) {
            Some(existing) => existing.value = value,
            None => self.0.push(ColumnFilter { field, value }),
        }
    }

    pub fn remove(&mut self, field: &str) -> Option<FilterValue> {
        let index = self.0.iter().position(|filter| filter.field == field)?;
        Some(self.0.remove(index).value)
    }

    pub fn get(&self, field: &str) -> Option<&FilterValue> {
        self.0
            .iter()
            .find(|filter| filter.field == field)
            .map(|filter| &filter.value)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ColumnFilter> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<ColumnFilter> for ColumnFilters {
    fn from_iter<T: IntoIterator<Item = ColumnFilter>>(iter: T) -> Self {
        let mut filters = Self::new();
        for filter in iter {
            filters.set(filter.field, filter.value);
        }
        filters
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryState {
    pub pagination: Pagination,
    pub sorting: Vec<SortKey>,
    pub column_filters: ColumnFilters,
    pub global_filter: String,
}

/// Partial update applied with [`QueryState::with_change`]. Unset fields keep
/// their current value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryChange {
    pub offset: Option<u64>,
    pub limit: Option<u32>,
    pub sorting: Option<Vec<SortKey>>,
    pub column_filters: Option<ColumnFilters>,
    pub global_filter: Option<String>,
}

impl QueryChange {
    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn sorting(mut self, sorting: Vec<SortKey>) -> Self {
        self.sorting = Some(sorting);
        self
    }

    pub fn column_filters(mut self, filters: ColumnFilters) -> Self {
        self.column_filters = Some(filters);
        self
    }

    pub fn global_filter(mut self, filter: impl Into<String>) -> Self {
        self.global_filter = Some(filter.into());
        self
    }
}

impl QueryState {
    pub fn new(limit: u32) -> Self {
        Self {
            pagination: Pagination::new(0, limit),
            ..Self::default()
        }
    }

    /// Produces the next snapshot. Any effective change to the limit, sorting,
    /// column filters or global filter moves the offset back to 0; an offset
    /// change alone leaves everything else untouched.
    pub fn with_change(&self, change: QueryChange) -> Self {
        let mut next = self.clone();
        let mut reshaped = false;

        if let Some(limit) = change.limit {
            let limit = limit.max(1);
            reshaped |= limit != next.pagination.limit;
            next.pagination.limit = limit;
        }
        if let Some(sorting) = change.sorting {
            reshaped |= sorting != next.sorting;
            next.sorting = sorting;
        }
        if let Some(filters) = change.column_filters {
            reshaped |= filters != next.column_filters;
            next.column_filters = filters;
        }
        if let Some(global_filter) = change.global_filter {
            reshaped |= global_filter != next.global_filter;
            next.global_filter = global_filter;
        }

        if reshaped {
            next.pagination.offset = 0;
        } else if let Some(offset) = change.offset {
            next.pagination.offset = offset;
        }
        next
    }

    pub fn page_index(&self) -> u64 {
        self.pagination.offset / u64::from(self.pagination.limit)
    }

    pub fn with_page(&self, index: u64) -> Self {
        let offset = index.saturating_mul(u64::from(self.pagination.limit));
        self.with_change(QueryChange::default().offset(offset))
    }

    /// Next page, or `None` when the current page already reaches `total`.
    pub fn next_page(&self, total: u64) -> Option<Self> {
        let next_offset = self.pagination.offset + u64::from(self.pagination.limit);
        (next_offset < total).then(|| self.with_page(self.page_index() + 1))
    }

    pub fn previous_page(&self) -> Option<Self> {
        let index = self.page_index();
        (index > 0).then(|| self.with_page(index - 1))
    }
}

#[cfg(test)]
#[path = "tests/query_tests.rs"]
mod tests;
