//! Row mapping from tabular results to documents

use serde_json::{Number, Value as JsonValue};

use data_common::types::Document;

use crate::backend::{Cell, RowSet};

/// Convert every row into a document keyed by column name.
///
/// Each document carries every selected column, nulls included.
#[must_use]
pub fn map_rows(result: RowSet) -> Vec<Document> {
    let RowSet { columns, rows } = result;

    rows.into_iter()
        .map(|row| {
            columns
                .iter()
                .cloned()
                .zip(row.into_iter().map(cell_to_json))
                .collect()
        })
        .collect()
}

/// Convert one cell; binary values are decoded as (lossy) UTF-8 text.
#[must_use]
pub fn cell_to_json(cell: Cell) -> JsonValue {
    match cell {
        Cell::Null => JsonValue::Null,
        Cell::Bool(b) => JsonValue::Bool(b),
        Cell::Int(n) => JsonValue::Number(n.into()),
        Cell::Float(f) => Number::from_f64(f).map_or(JsonValue::Null, JsonValue::Number),
        Cell::Text(s) => JsonValue::String(s),
        Cell::Bytes(bytes) => JsonValue::String(String::from_utf8_lossy(&bytes).into_owned()),
        Cell::Json(value) => value,
        Cell::Array(items) => JsonValue::Array(items.into_iter().map(cell_to_json).collect()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_map_rows() {
        let result = RowSet::new(
            vec!["id".into(), "name".into()],
            vec![
                vec![Cell::Int(1), Cell::Text("foobar".into())],
                vec![Cell::Int(2), Cell::Null],
            ],
        );

        let docs = map_rows(result);
        assert_eq!(docs.len(), 2);
        assert_eq!(JsonValue::Object(docs[0].clone()), json!({"id": 1, "name": "foobar"}));
        assert_eq!(JsonValue::Object(docs[1].clone()), json!({"id": 2, "name": null}));
    }

    #[test]
    fn test_bytes_become_strings() {
        assert_eq!(cell_to_json(Cell::Bytes(b"barfoo".to_vec())), json!("barfoo"));
    }

    #[test]
    fn test_scalar_passthrough() {
        assert_eq!(cell_to_json(Cell::Bool(true)), json!(true));
        assert_eq!(cell_to_json(Cell::Float(1.5)), json!(1.5));
        assert_eq!(cell_to_json(Cell::Float(f64::NAN)), JsonValue::Null);
        assert_eq!(cell_to_json(Cell::Json(json!({"a": [1]}))), json!({"a": [1]}));
        assert_eq!(
            cell_to_json(Cell::Array(vec![Cell::Int(1), Cell::Null, Cell::Bytes(b"ab".to_vec())])),
            json!([1, null, "ab"])
        );
    }

    #[test]
    fn test_empty_result() {
        assert!(map_rows(RowSet::default()).is_empty());
    }
}
