use std::fmt;

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{Map, Value};

pub const AGGREGATE_VERSION_FIELD: &str = "aggregateVersion";

/// Stable identity of a row within one result set. Composite keys keep every
/// part in order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RowKey(pub Vec<String>);

impl RowKey {
    pub fn single(value: impl Into<String>) -> Self {
        Self(vec![value.into()])
    }
}

impl fmt::Display for RowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("/"))
    }
}

pub trait GridRow: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    fn key(&self) -> RowKey;

    /// Optimistic-concurrency token the server issued with this row.
    fn aggregate_version(&self) -> Option<i64>;
}

/// Schemaless row for pages that do not bind a typed record. Identity is the
/// composite of every `id`/`…Id` field ordered by field name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JsonRow(pub Map<String, Value>);

impl JsonRow {
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }
}

fn is_identity_field(name: &str) -> bool {
    name == "id" || (name.len() > 2 && name.ends_with("Id"))
}

fn render_key_part(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

impl GridRow for JsonRow {
    fn key(&self) -> RowKey {
        let mut fields: Vec<(&String, &Value)> = self
            .0
            .iter()
            .filter(|(name, _)| is_identity_field(name))
            .collect();
        fields.sort_by(|a, b| a.0.cmp(b.0));
        RowKey(fields.into_iter().map(|(_, value)| render_key_part(value)).collect())
    }

    fn aggregate_version(&self) -> Option<i64> {
        self.0.get(AGGREGATE_VERSION_FIELD).and_then(Value::as_i64)
    }
}

/// One page of rows plus the size of the full server-side matching set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridResult<R> {
    pub rows: Vec<R>,
    pub total: u64,
}

impl<R> Default for GridResult<R> {
    fn default() -> Self {
        Self {
            rows: Vec::new(),
            total: 0,
        }
    }
}

impl<R: GridRow> GridResult<R> {
    pub fn position(&self, key: &RowKey) -> Option<usize> {
        self.rows.iter().position(|row| &row.key() == key)
    }

    /// Copy with the keyed row removed and `total` decremented, or `None` when
    /// the row is not on this page.
    pub fn without(&self, key: &RowKey) -> Option<Self> {
        let index = self.position(key)?;
        let mut rows = self.rows.clone();
        rows.remove(index);
        Some(Self {
            rows,
            total: self.total.saturating_sub(1),
        })
    }

    /// Copy with the row sharing `row`'s key swapped for `row`.
    pub fn with_replaced(&self, row: R) -> Option<Self> {
        let index = self.position(&row.key())?;
        let mut rows = self.rows.clone();
        rows[index] = row;
        Some(Self {
            rows,
            total: self.total,
        })
    }

    /// Copy with `row` put back where it sat in `original`: after the last of
    /// its former predecessors still on the page, with `total` incremented.
    /// `None` when a row with that key is already present.
    pub fn with_restored(&self, row: R, original: &Self) -> Option<Self> {
        let key = row.key();
        if self.position(&key).is_some() {
            return None;
        }
        let predecessors: Vec<RowKey> = original
            .rows
            .iter()
            .map(GridRow::key)
            .take_while(|candidate| candidate != &key)
            .collect();
        let index = self
            .rows
            .iter()
            .rposition(|current| predecessors.contains(&current.key()))
            .map_or(0, |index| index + 1);
        let mut rows = self.rows.clone();
        rows.insert(index, row);
        Some(Self {
            rows,
            total: self.total.saturating_add(1),
        })
    }
}

#[cfg(test)]
#[path = "tests/domain_tests.rs"]
mod tests;
