//! The three record types that an expense passes through on its way to the record store.
//!
//! `CandidateRecord` and `NormalizedRecord` hold whatever the model emitted, untyped. Only
//! `ValidatedRecord` has real types, and it can only be produced by `pipeline::validate`.

use crate::model::{Amount, Category};
use chrono::NaiveDate;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub(crate) const AMOUNT: &str = "amount";
pub(crate) const CATEGORY: &str = "category";
pub(crate) const DESCRIPTION: &str = "description";
pub(crate) const DATE: &str = "date";

/// Read access to the four loosely-typed fields of an unvalidated record. A missing field reads
/// as `Value::Null`.
pub trait RawRecord {
    fn amount(&self) -> &Value;
    fn category(&self) -> &Value;
    fn description(&self) -> &Value;
    fn date(&self) -> &Value;
}

/// The fields shared by the two unvalidated record types.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
struct Fields {
    #[serde(default)]
    amount: Value,
    #[serde(default)]
    category: Value,
    #[serde(default)]
    description: Value,
    #[serde(default)]
    date: Value,
}

impl Fields {
    fn from_map(mut map: Map<String, Value>) -> Self {
        let mut take = |key: &str| map.remove(key).unwrap_or(Value::Null);
        Self {
            amount: take(AMOUNT),
            category: take(CATEGORY),
            description: take(DESCRIPTION),
            date: take(DATE),
        }
    }
}

macro_rules! raw_record {
    ($name:ident) => {
        impl RawRecord for $name {
            fn amount(&self) -> &Value {
                &self.0.amount
            }
            fn category(&self) -> &Value {
                &self.0.category
            }
            fn description(&self) -> &Value {
                &self.0.description
            }
            fn date(&self) -> &Value {
                &self.0.date
            }
        }

        impl $name {
            /// Builds a record from a JSON object, ignoring keys other than the four fields.
            pub fn from_map(map: Map<String, Value>) -> Self {
                Self(Fields::from_map(map))
            }

            /// Builds a record from its four field values.
            pub fn new(amount: Value, category: Value, description: Value, date: Value) -> Self {
                Self(Fields {
                    amount,
                    category,
                    description,
                    date,
                })
            }

            /// Returns the record as a JSON object with exactly the four fields.
            pub fn to_json(&self) -> Value {
                serde_json::json!({
                    "amount": self.0.amount,
                    "category": self.0.category,
                    "description": self.0.description,
                    "date": self.0.date,
                })
            }
        }
    };
}

/// The loosely-typed record that comes out of extraction.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CandidateRecord(Fields);

raw_record!(CandidateRecord);

/// The record that comes out of normalization. Its category and date should be canonical by now,
/// but nothing has checked that yet.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NormalizedRecord(Fields);

raw_record!(NormalizedRecord);

/// An expense that has passed every hard constraint:
/// - `amount >= 0`
/// - `category` is canonical
/// - `description` is at most 200 characters
/// - `date` is a real `YYYY-MM-DD` date
///
/// There is no public constructor and no `Deserialize` impl, so holding one of these proves that
/// validation happened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, JsonSchema)]
pub struct ValidatedRecord {
    /// Expense amount in dollars, never negative.
    amount: Amount,
    /// One of the canonical categories.
    category: Category,
    /// Description of the expense, at most 200 characters.
    description: String,
    /// Date in YYYY-MM-DD format.
    #[serde(with = "iso_date")]
    #[schemars(with = "String")]
    date: NaiveDate,
}

impl ValidatedRecord {
    pub(crate) fn new(
        amount: Amount,
        category: Category,
        description: String,
        date: NaiveDate,
    ) -> Self {
        Self {
            amount,
            category,
            description,
            date,
        }
    }

    pub fn amount(&self) -> Amount {
        self.amount
    }

    pub fn category(&self) -> Category {
        self.category
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }
}

/// Why a model response could not be turned into a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MalformedJson {
    pub raw_response: String,
    pub reason: String,
}

/// Parses a model response as a single JSON object. Only surrounding whitespace is forgiven:
/// code fences, prose around the object and truncated output are all failures.
pub(crate) fn parse_object(raw: &str) -> Result<Map<String, Value>, MalformedJson> {
    let malformed = |reason: String| MalformedJson {
        raw_response: raw.to_string(),
        reason,
    };
    match serde_json::from_str::<Value>(raw.trim()) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(malformed(format!(
            "expected a JSON object but got {}",
            json_type(&other)
        ))),
        Err(e) => Err(malformed(e.to_string())),
    }
}

/// A short name for the JSON type of `v`, used in error messages.
pub(crate) fn json_type(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

pub(crate) mod iso_date {
    use chrono::NaiveDate;
    use serde::Serializer;

    pub(crate) const FORMAT: &str = "%Y-%m-%d";

    pub(crate) fn serialize<S>(date: &NaiveDate, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(&date.format(FORMAT))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use serde_json::json;

    #[test]
    fn test_parse_object_accepts_whitespace() {
        let map = parse_object("\n  {\"amount\": 5}  \n").unwrap();
        assert_eq!(map.get("amount"), Some(&json!(5)));
    }

    #[test]
    fn test_parse_object_rejects_code_fences() {
        let raw = "```json\n{\"amount\": 5}\n```";
        let err = parse_object(raw).unwrap_err();
        assert_eq!(err.raw_response, raw);
    }

    #[test]
    fn test_parse_object_rejects_prose_and_truncation() {
        assert!(parse_object("Sure! Here is the JSON: {\"amount\": 5}").is_err());
        assert!(parse_object("{\"amount\": 5, \"category\": \"Fo").is_err());
    }

    #[test]
    fn test_parse_object_rejects_non_objects() {
        let err = parse_object("[1, 2]").unwrap_err();
        assert!(err.reason.contains("an array"));
    }

    #[test]
    fn test_missing_fields_are_null_and_extras_ignored() {
        let map = parse_object(r#"{"amount": 5, "metadata": {"tax": 1}}"#).unwrap();
        let record = CandidateRecord::from_map(map);
        assert_eq!(record.amount(), &json!(5));
        assert_eq!(record.category(), &Value::Null);
        assert_eq!(record.date(), &Value::Null);
        assert_eq!(
            record.to_json(),
            json!({"amount": 5, "category": null, "description": null, "date": null})
        );
    }

    #[test]
    fn test_validated_record_serializes_to_wire_shape() {
        let record = ValidatedRecord::new(
            Amount::new(Decimal::new(450, 1)),
            Category::Food,
            "Dinner at Olive Garden".to_string(),
            NaiveDate::from_ymd_opt(2026, 2, 17).unwrap(),
        );
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(
            value,
            json!({
                "amount": 45.0,
                "category": "Food",
                "description": "Dinner at Olive Garden",
                "date": "2026-02-17"
            })
        );
    }
}
