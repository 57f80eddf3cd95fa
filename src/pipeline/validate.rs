use crate::model::{iso_date, json_type, Amount, Category, RawRecord, ValidatedRecord};
use crate::pipeline::error::{Field, ValidationError};
use chrono::NaiveDate;
use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;

pub const MAX_DESCRIPTION_CHARS: usize = 200;

static DATE_SHAPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").expect("date pattern is valid"));

/// Checks `record` against the hard constraints and, if it passes, returns it as a
/// `ValidatedRecord`.
///
/// The checks run in a fixed order (amount, category, date, description) and the first failure is
/// returned. The input is never modified: a long description is rejected, not truncated.
pub fn validate(record: &impl RawRecord) -> Result<ValidatedRecord, ValidationError> {
    let amount = validate_amount(record.amount())?;
    let category = validate_category(record.category())?;
    let date = validate_date(record.date())?;
    let description = validate_description(record.description())?;
    Ok(ValidatedRecord::new(amount, category, description, date))
}

fn validate_amount(v: &Value) -> Result<Amount, ValidationError> {
    let err = |reason: String| ValidationError::new(Field::Amount, reason);
    let amount = match v {
        Value::Null => return Err(err("amount is required".to_string())),
        Value::Number(n) => Amount::from_json_number(n).map_err(|e| err(e.to_string()))?,
        Value::String(s) => Amount::parse_plain(s)
            .map_err(|_| err(format!("amount must be a number, got '{s}'")))?,
        other => {
            return Err(err(format!(
                "amount must be a number, got {}",
                json_type(other)
            )))
        }
    };
    if amount.is_negative() {
        return Err(err(format!("amount must not be negative, got {}", amount.value())));
    }
    Ok(amount)
}

fn validate_category(v: &Value) -> Result<Category, ValidationError> {
    let err = |reason: String| ValidationError::new(Field::Category, reason);
    match v {
        Value::Null => Err(err("category is required".to_string())),
        Value::String(s) => Category::from_canonical(s).ok_or_else(|| {
            err(format!(
                "'{s}' is not one of {}",
                Category::canonical_list()
            ))
        }),
        other => Err(err(format!(
            "category must be a string, got {}",
            json_type(other)
        ))),
    }
}

fn validate_date(v: &Value) -> Result<NaiveDate, ValidationError> {
    let err = |reason: String| ValidationError::new(Field::Date, reason);
    let s = match v {
        Value::Null => return Err(err("date is required".to_string())),
        Value::String(s) => s,
        other => {
            return Err(err(format!(
                "date must be a string, got {}",
                json_type(other)
            )))
        }
    };
    if !DATE_SHAPE.is_match(s) {
        return Err(err(format!("'{s}' is not in YYYY-MM-DD format")));
    }
    NaiveDate::parse_from_str(s, iso_date::FORMAT)
        .map_err(|_| err(format!("'{s}' is not a real calendar date")))
}

fn validate_description(v: &Value) -> Result<String, ValidationError> {
    let err = |reason: String| ValidationError::new(Field::Description, reason);
    match v {
        Value::Null => Ok(String::new()),
        Value::String(s) => {
            let len = s.chars().count();
            if len > MAX_DESCRIPTION_CHARS {
                Err(err(format!(
                    "description is {len} characters, the limit is {MAX_DESCRIPTION_CHARS}"
                )))
            } else {
                Ok(s.clone())
            }
        }
        other => Err(err(format!(
            "description must be a string, got {}",
            json_type(other)
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::CandidateRecord;
    use rust_decimal::Decimal;
    use serde_json::json;

    fn record(v: Value) -> CandidateRecord {
        match v {
            Value::Object(map) => CandidateRecord::from_map(map),
            _ => panic!("test records must be objects"),
        }
    }

    fn good() -> Value {
        json!({
            "amount": 45.0,
            "category": "Food",
            "description": "Dinner at Olive Garden",
            "date": "2026-02-17"
        })
    }

    fn field_of(v: Value) -> Field {
        validate(&record(v)).unwrap_err().field
    }

    #[test]
    fn test_well_formed_record_accepted_unmodified() {
        let validated = validate(&record(good())).unwrap();
        assert_eq!(validated.amount().value(), Decimal::new(45, 0));
        assert_eq!(validated.category(), Category::Food);
        assert_eq!(validated.description(), "Dinner at Olive Garden");
        assert_eq!(validated.date(), NaiveDate::from_ymd_opt(2026, 2, 17).unwrap());
        assert_eq!(serde_json::to_value(&validated).unwrap(), good());
    }

    #[test]
    fn test_validate_is_deterministic() {
        let r = record(json!({"amount": -1, "category": "Snacks", "date": "x"}));
        assert_eq!(validate(&r), validate(&r));
        let r = record(good());
        assert_eq!(validate(&r), validate(&r));
    }

    #[test]
    fn test_negative_amount() {
        let mut v = good();
        v["amount"] = json!(-5);
        assert_eq!(field_of(v), Field::Amount);
    }

    #[test]
    fn test_zero_and_string_amounts() {
        let mut v = good();
        v["amount"] = json!(0);
        assert!(validate(&record(v.clone())).is_ok());
        v["amount"] = json!("12.50");
        assert_eq!(
            validate(&record(v.clone())).unwrap().amount().value(),
            Decimal::new(1250, 2)
        );
        v["amount"] = json!("$12.50");
        assert_eq!(field_of(v.clone()), Field::Amount);
        v["amount"] = json!(true);
        assert_eq!(field_of(v), Field::Amount);
    }

    #[test]
    fn test_amount_strings_must_be_plain() {
        for bad in ["1_000", "+5", "1e3", "1,000", " "] {
            let mut v = good();
            v["amount"] = json!(bad);
            assert_eq!(field_of(v), Field::Amount, "{bad}");
        }
        let mut v = good();
        v["amount"] = json!("-5");
        let e = validate(&record(v)).unwrap_err();
        assert_eq!(e.field, Field::Amount);
        assert!(e.reason.contains("negative"));
    }

    #[test]
    fn test_date_shape_pattern() {
        assert!(DATE_SHAPE.is_match("2026-02-17"));
        assert!(!DATE_SHAPE.is_match("2026-02-17T00:00"));
        assert!(!DATE_SHAPE.is_match("26-02-17"));
    }

    #[test]
    fn test_missing_amount() {
        let e = validate(&record(json!({"category": "Food", "date": "2026-02-17"}))).unwrap_err();
        assert_eq!(e.field, Field::Amount);
        assert_eq!(e.reason, "amount is required");
    }

    #[test]
    fn test_non_canonical_category() {
        for bad in [json!("Snacks"), json!("food"), json!(null), json!(3)] {
            let mut v = good();
            v["category"] = bad;
            assert_eq!(field_of(v), Field::Category);
        }
    }

    #[test]
    fn test_dates() {
        for bad in ["2026-02-30", "2026-2-17", "02/17/2026", "yesterday", " 2026-02-17"] {
            let mut v = good();
            v["date"] = json!(bad);
            assert_eq!(field_of(v), Field::Date, "{bad}");
        }
        let mut v = good();
        v["date"] = json!("2024-02-29");
        assert!(validate(&record(v)).is_ok());
    }

    #[test]
    fn test_description_limit() {
        let mut v = good();
        v["description"] = json!("é".repeat(MAX_DESCRIPTION_CHARS));
        assert!(validate(&record(v.clone())).is_ok());
        v["description"] = json!("a".repeat(MAX_DESCRIPTION_CHARS + 1));
        assert_eq!(field_of(v), Field::Description);
    }

    #[test]
    fn test_missing_description_is_empty() {
        let mut v = good();
        v["description"] = Value::Null;
        assert_eq!(validate(&record(v)).unwrap().description(), "");
    }

    #[test]
    fn test_checks_run_in_order() {
        let e = validate(&record(json!({
            "amount": -1,
            "category": "Snacks",
            "description": 5,
            "date": "nope"
        })))
        .unwrap_err();
        assert_eq!(e.field, Field::Amount);

        let e = validate(&record(json!({
            "amount": 1,
            "category": "Food",
            "description": 5,
            "date": "nope"
        })))
        .unwrap_err();
        assert_eq!(e.field, Field::Date);
    }
}
