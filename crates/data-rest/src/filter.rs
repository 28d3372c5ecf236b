//! `where` filter expressions
//!
//! A filter is a JSON object whose keys are column names:
//!
//! ```text
//! {"name": "foobar"}                      name = 'foobar'
//! {"age": {"$gte": 18, "$lt": 65}}        age >= 18 AND age < 65
//! {"tag": {"$in": ["a", "b"]}}            tag IN ('a', 'b')
//! {"deleted_at": null}                    deleted_at IS NULL
//! {"$or": [{"name": "a"}, {"name": "b"}]} name = 'a' OR name = 'b'
//! ```
//!
//! Parsing only produces a [`Predicate`] tree; rendering to SQL lives in
//! [`crate::query`].

use serde_json::{Map, Value as JsonValue};

use data_common::error::{Error, Result};

/// Comparison operators available on a single column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
    Like,
    Ilike,
}

impl CompareOp {
    fn from_key(key: &str) -> Option<Self> {
        let op = match key {
            "$eq" => Self::Eq,
            "$ne" => Self::Neq,
            "$gt" => Self::Gt,
            "$gte" => Self::Gte,
            "$lt" => Self::Lt,
            "$lte" => Self::Lte,
            "$like" => Self::Like,
            "$ilike" => Self::Ilike,
            _ => return None,
        };
        Some(op)
    }

    /// SQL spelling of the operator
    #[must_use]
    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Neq => "<>",
            Self::Gt => ">",
            Self::Gte => ">=",
            Self::Lt => "<",
            Self::Lte => "<=",
            Self::Like => "LIKE",
            Self::Ilike => "ILIKE",
        }
    }
}

/// Parsed filter tree
///
/// Every leaf names a column and carries literal values only.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Predicate {
    /// Matches every row
    #[default]
    Empty,
    /// Matches no row
    False,
    Compare {
        column: String,
        op: CompareOp,
        value: JsonValue,
    },
    In {
        column: String,
        values: Vec<JsonValue>,
    },
    Null {
        column: String,
        negated: bool,
    },
    And(Box<Predicate>, Box<Predicate>),
    Or(Box<Predicate>, Box<Predicate>),
}

impl Predicate {
    /// Parse a raw `where` parameter. Blank input yields [`Predicate::Empty`].
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Ok(Self::Empty);
        }

        let value: JsonValue =
            serde_json::from_str(raw).map_err(|e| Error::InvalidFilter(e.to_string()))?;

        match value {
            JsonValue::Object(obj) => parse_object(&obj),
            _ => Err(Error::InvalidFilter(
                "filter must be a JSON object".to_string(),
            )),
        }
    }

    /// `column = value`
    pub fn eq(column: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        Self::Compare {
            column: column.into(),
            op: CompareOp::Eq,
            value: value.into(),
        }
    }

    /// Conjunction; `Empty` is the identity.
    #[must_use]
    pub fn and(left: Self, right: Self) -> Self {
        match (left, right) {
            (Self::Empty, other) | (other, Self::Empty) => other,
            (left, right) => Self::And(Box::new(left), Box::new(right)),
        }
    }

    /// Disjunction; an `Empty` side matches everything, so the result does
    /// too. `False` is the identity.
    #[must_use]
    pub fn or(left: Self, right: Self) -> Self {
        match (left, right) {
            (Self::Empty, _) | (_, Self::Empty) => Self::Empty,
            (Self::False, other) | (other, Self::False) => other,
            (left, right) => Self::Or(Box::new(left), Box::new(right)),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }
}

fn parse_object(obj: &Map<String, JsonValue>) -> Result<Predicate> {
    obj.iter().try_fold(Predicate::Empty, |acc, (key, value)| {
        Ok(Predicate::and(acc, parse_entry(key, value)?))
    })
}

fn parse_entry(key: &str, value: &JsonValue) -> Result<Predicate> {
    match key {
        "$and" => parse_group(key, value, Predicate::and, Predicate::Empty),
        "$or" => parse_group(key, value, Predicate::or, Predicate::False),
        k if k.starts_with('$') => Err(Error::InvalidFilter(format!(
            "unknown logical operator: {k}"
        ))),
        column => parse_column(column, value),
    }
}

fn parse_group(
    key: &str,
    value: &JsonValue,
    combine: fn(Predicate, Predicate) -> Predicate,
    identity: Predicate,
) -> Result<Predicate> {
    let JsonValue::Array(items) = value else {
        return Err(Error::InvalidFilter(format!(
            "{key} expects an array of filters"
        )));
    };

    let mut branches = Vec::with_capacity(items.len());
    for item in items {
        match item {
            JsonValue::Object(obj) => branches.push(parse_object(obj)?),
            _ => {
                return Err(Error::InvalidFilter(format!(
                    "{key} entries must be objects"
                )))
            }
        }
    }

    Ok(branches
        .into_iter()
        .reduce(combine)
        .unwrap_or(identity))
}

fn parse_column(column: &str, value: &JsonValue) -> Result<Predicate> {
    match value {
        JsonValue::Null => Ok(Predicate::Null {
            column: column.to_string(),
            negated: false,
        }),
        JsonValue::Bool(_) | JsonValue::Number(_) | JsonValue::String(_) => {
            Ok(Predicate::eq(column, value.clone()))
        }
        JsonValue::Array(_) => Err(Error::InvalidFilter(format!(
            "{column}: use {{\"$in\": [...]}} to match a list"
        ))),
        JsonValue::Object(ops) => parse_operators(column, ops),
    }
}

fn parse_operators(column: &str, ops: &Map<String, JsonValue>) -> Result<Predicate> {
    if ops.is_empty() {
        return Err(Error::InvalidFilter(format!(
            "{column}: empty operator object"
        )));
    }

    ops.iter().try_fold(Predicate::Empty, |acc, (key, operand)| {
        let leaf = match key.as_str() {
            "$in" => Predicate::In {
                column: column.to_string(),
                values: scalar_list(column, operand)?,
            },
            "$null" => match operand {
                JsonValue::Bool(is_null) => Predicate::Null {
                    column: column.to_string(),
                    negated: !is_null,
                },
                _ => {
                    return Err(Error::InvalidFilter(format!(
                        "{column}: $null expects a boolean"
                    )))
                }
            },
            // Comparing against null only makes sense as IS [NOT] NULL
            "$eq" | "$ne" if operand.is_null() => Predicate::Null {
                column: column.to_string(),
                negated: key == "$ne",
            },
            other => {
                let op = CompareOp::from_key(other).ok_or_else(|| {
                    Error::InvalidFilter(format!("{column}: unknown operator {other}"))
                })?;
                Predicate::Compare {
                    column: column.to_string(),
                    op,
                    value: scalar(column, operand)?,
                }
            }
        };
        Ok(Predicate::and(acc, leaf))
    })
}

fn scalar(column: &str, value: &JsonValue) -> Result<JsonValue> {
    match value {
        JsonValue::Bool(_) | JsonValue::Number(_) | JsonValue::String(_) => Ok(value.clone()),
        _ => Err(Error::InvalidFilter(format!(
            "{column}: operand must be a string, number or boolean"
        ))),
    }
}

fn scalar_list(column: &str, value: &JsonValue) -> Result<Vec<JsonValue>> {
    match value {
        JsonValue::Array(items) => items.iter().map(|v| scalar(column, v)).collect(),
        _ => Err(Error::InvalidFilter(format!(
            "{column}: $in expects an array"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_blank_is_empty() {
        assert_eq!(Predicate::parse("").unwrap(), Predicate::Empty);
        assert_eq!(Predicate::parse("   ").unwrap(), Predicate::Empty);
        assert_eq!(Predicate::parse("{}").unwrap(), Predicate::Empty);
    }

    #[test]
    fn test_scalar_equality() {
        let pred = Predicate::parse(r#"{"name":"foobar"}"#).unwrap();
        assert_eq!(pred, Predicate::eq("name", "foobar"));
    }

    #[test]
    fn test_multiple_keys_are_and_ed() {
        let pred = Predicate::parse(r#"{"a":1,"b":true}"#).unwrap();
        assert_eq!(
            pred,
            Predicate::And(
                Box::new(Predicate::eq("a", 1)),
                Box::new(Predicate::eq("b", true))
            )
        );
    }

    #[test]
    fn test_null_literal() {
        let pred = Predicate::parse(r#"{"deleted_at":null}"#).unwrap();
        assert_eq!(
            pred,
            Predicate::Null {
                column: "deleted_at".into(),
                negated: false
            }
        );

        let pred = Predicate::parse(r#"{"deleted_at":{"$ne":null}}"#).unwrap();
        assert_eq!(
            pred,
            Predicate::Null {
                column: "deleted_at".into(),
                negated: true
            }
        );
    }

    #[test]
    fn test_operator_object() {
        let pred = Predicate::parse(r#"{"age":{"$gte":18}}"#).unwrap();
        assert_eq!(
            pred,
            Predicate::Compare {
                column: "age".into(),
                op: CompareOp::Gte,
                value: json!(18)
            }
        );
    }

    #[test]
    fn test_in_list() {
        let pred = Predicate::parse(r#"{"tag":{"$in":["a","b"]}}"#).unwrap();
        assert_eq!(
            pred,
            Predicate::In {
                column: "tag".into(),
                values: vec![json!("a"), json!("b")]
            }
        );
    }

    #[test]
    fn test_or_group() {
        let pred = Predicate::parse(r#"{"$or":[{"name":"a"},{"name":"b"}]}"#).unwrap();
        assert_eq!(
            pred,
            Predicate::Or(
                Box::new(Predicate::eq("name", "a")),
                Box::new(Predicate::eq("name", "b"))
            )
        );
    }

    #[test]
    fn test_or_with_empty_branch_matches_all() {
        let pred = Predicate::parse(r#"{"$or":[{},{"name":"b"}]}"#).unwrap();
        assert!(pred.is_empty());
    }

    #[test]
    fn test_empty_groups() {
        assert_eq!(Predicate::parse(r#"{"$or":[]}"#).unwrap(), Predicate::False);
        assert_eq!(Predicate::parse(r#"{"$and":[]}"#).unwrap(), Predicate::Empty);
        assert_eq!(
            Predicate::parse(r#"{"name":"a","$or":[]}"#).unwrap(),
            Predicate::And(Box::new(Predicate::eq("name", "a")), Box::new(Predicate::False))
        );
    }

    #[test]
    fn test_false_is_or_identity() {
        assert_eq!(
            Predicate::or(Predicate::False, Predicate::eq("a", 1)),
            Predicate::eq("a", 1)
        );
        assert!(Predicate::or(Predicate::False, Predicate::Empty).is_empty());
    }

    #[test]
    fn test_malformed_input() {
        for raw in [
            "{not json",
            "[1,2]",
            r#""name""#,
            r#"{"name":[1]}"#,
            r#"{"name":{"$regex":"x"}}"#,
            r#"{"name":{"$gt":{"nested":1}}}"#,
            r#"{"$not":[{"a":1}]}"#,
            r#"{"$or":{"a":1}}"#,
            r#"{"name":{}}"#,
        ] {
            assert!(
                matches!(Predicate::parse(raw), Err(Error::InvalidFilter(_))),
                "expected {raw} to be rejected"
            );
        }
    }

    #[test]
    fn test_and_identity() {
        let id = Predicate::eq("id", "1");
        assert_eq!(Predicate::and(Predicate::Empty, id.clone()), id);
        assert_eq!(Predicate::and(id.clone(), Predicate::Empty), id);
    }
}
