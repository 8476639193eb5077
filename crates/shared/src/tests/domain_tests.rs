use super::*;
use serde_json::json;

fn row(value: Value) -> JsonRow {
    serde_json::from_value(value).expect("row")
}

fn page() -> GridResult<JsonRow> {
    GridResult {
        rows: vec![
            row(json!({"appId": "W", "name": "w", "aggregateVersion": 1})),
            row(json!({"appId": "X", "name": "x", "aggregateVersion": 4})),
            row(json!({"appId": "Y", "name": "y", "aggregateVersion": 2})),
        ],
        total: 12,
    }
}

#[test]
fn json_row_identity_uses_id_fields_in_name_order() {
    let row = row(json!({
        "hostId": "h1",
        "appId": "portal",
        "id": 7,
        "name": "ignored",
        "Id": "too-short-suffix"
    }));
    assert_eq!(
        row.key(),
        RowKey(vec!["portal".into(), "h1".into(), "7".into()])
    );
    assert_eq!(row.key().to_string(), "portal/h1/7");
}

#[test]
fn json_row_reads_aggregate_version() {
    assert_eq!(page().rows[1].aggregate_version(), Some(4));
    assert_eq!(row(json!({"appId": "Z"})).aggregate_version(), None);
}

#[test]
fn without_removes_exactly_one_row_and_keeps_order() {
    let page = page();
    let next = page.without(&RowKey::single("X")).expect("present");

    let keys: Vec<String> = next.rows.iter().map(|r| r.key().to_string()).collect();
    assert_eq!(keys, vec!["W", "Y"]);
    assert_eq!(next.total, 11);
    assert_eq!(page.rows.len(), 3, "source is left untouched");
}

#[test]
fn without_missing_key_is_none() {
    assert!(page().without(&RowKey::single("Q")).is_none());
}

#[test]
fn with_replaced_swaps_row_in_place() {
    let fresh = row(json!({"appId": "Y", "name": "renamed", "aggregateVersion": 3}));
    let next = page().with_replaced(fresh.clone()).expect("present");
    assert_eq!(next.rows[2], fresh);
    assert_eq!(next.total, 12);

    let stranger = row(json!({"appId": "Q"}));
    assert!(page().with_replaced(stranger).is_none());
}

#[test]
fn with_restored_returns_row_to_its_slot() {
    let original = page();
    let x = original.rows[1].clone();
    let w = original.rows[0].clone();

    let without_x = original.without(&x.key()).expect("present");
    let restored = without_x.with_restored(x.clone(), &original).expect("absent");
    assert_eq!(restored, original);
    assert!(restored.with_restored(x.clone(), &original).is_none());

    // Both W and X gone; putting them back in either order keeps page order.
    let neither = without_x.without(&w.key()).expect("present");
    let x_first = neither
        .with_restored(x.clone(), &original)
        .and_then(|page| page.with_restored(w.clone(), &original))
        .expect("restored");
    assert_eq!(x_first, original);
    let w_first = neither
        .with_restored(w, &original)
        .and_then(|page| page.with_restored(x, &original))
        .expect("restored");
    assert_eq!(w_first, original);
}
