//! Amount type for handling monetary values.
//!
//! This module provides the `Amount` type which wraps `Decimal`. It parses user-typed values that
//! may carry a currency symbol and thousands separators, and serializes as a plain JSON number.

use regex::Regex;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use schemars::{json_schema, JsonSchema, Schema, SchemaGenerator};
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::borrow::Cow;
use std::error::Error;
use std::fmt;
use std::fmt::{Debug, Display, Formatter};
use std::str::FromStr;
use std::sync::LazyLock;

/// Currency symbols that are accepted, and discarded, in front of a number.
const CURRENCY_SYMBOLS: &[char] = &['$', '€', '£', '¥'];

/// Digits with an optional leading minus and an optional fraction. No `+`, `_` or exponent.
static PLAIN_DECIMAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^-?\d+(\.\d+)?$").expect("plain decimal pattern is valid"));

/// Represents a money amount.
///
/// # Examples
///
/// ```
/// # use expense_pipeline::model::Amount;
/// # use std::str::FromStr;
/// let amount = Amount::from_str("$1,250.5").unwrap();
/// assert_eq!(amount.to_string(), "$1,250.50");
/// assert_eq!(serde_json::to_string(&amount).unwrap(), "1250.5");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Amount(Decimal);

impl Amount {
    pub const fn new(value: Decimal) -> Self {
        Self(value)
    }

    /// Returns the underlying Decimal value.
    pub fn value(&self) -> Decimal {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn is_negative(&self) -> bool {
        !self.is_zero() && self.0.is_sign_negative()
    }

    /// Converts a JSON number into an `Amount` without going through binary floating point when
    /// the number's text form is exact.
    pub fn from_json_number(n: &serde_json::Number) -> Result<Self, AmountError> {
        let text = n.to_string();
        Decimal::from_str(&text)
            .or_else(|_| Decimal::from_scientific(&text))
            .map(Amount)
            .map_err(|e| AmountError::Invalid(text, e))
    }

    /// Parses a plain decimal string such as `"45"` or `" 45.00 "`. Unlike `from_str`, currency
    /// symbols, separators, underscores and a leading `+` are not tolerated.
    pub fn parse_plain(s: &str) -> Result<Self, AmountError> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(AmountError::Empty);
        }
        if !PLAIN_DECIMAL.is_match(trimmed) {
            return Err(AmountError::Malformed(trimmed.to_string()));
        }
        Decimal::from_str(trimmed)
            .map(Amount)
            .map_err(|e| AmountError::Invalid(trimmed.to_string(), e))
    }
}

/// An error that can occur when parsing strings into `Amount` values.
pub enum AmountError {
    Empty,
    /// The text has characters or signs that no amount may contain.
    Malformed(String),
    Invalid(String, rust_decimal::Error),
}

impl Debug for AmountError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(self, f)
    }
}

impl Display for AmountError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            AmountError::Empty => write!(f, "an empty string is not an amount"),
            AmountError::Malformed(s) => write!(f, "'{s}' is not a plain decimal number"),
            AmountError::Invalid(s, e) => write!(f, "'{s}' is not an amount: {e}"),
        }
    }
}

impl Error for AmountError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            AmountError::Empty | AmountError::Malformed(_) => None,
            AmountError::Invalid(_, e) => Some(e),
        }
    }
}

impl FromStr for Amount {
    type Err = AmountError;

    /// Parses `"$1,000.00"`, `"-€5"`, `"12.5"` and the like.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let (negative, rest) = match trimmed.strip_prefix('-') {
            Some(after_minus) => (true, after_minus.trim_start()),
            None => (false, trimmed),
        };
        let without_symbol = rest.trim_start_matches(CURRENCY_SYMBOLS).trim_start();

        // Remove commas (thousand separators)
        let without_commas = without_symbol.replace(',', "");
        if without_commas.is_empty() {
            return Err(AmountError::Empty);
        }
        // Only one sign, and only in front of the currency symbol.
        if without_commas.starts_with(['-', '+']) || !PLAIN_DECIMAL.is_match(&without_commas) {
            return Err(AmountError::Malformed(trimmed.to_string()));
        }

        let value = Decimal::from_str(&without_commas)
            .map_err(|e| AmountError::Invalid(trimmed.to_string(), e))?;
        Ok(Amount(if negative { -value } else { value }))
    }
}

impl Display for Amount {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let sign = if self.is_negative() { "-" } else { "" };
        let num = self.0.abs();
        write!(
            f,
            "{sign}${}",
            format_num::format_num!(",.2", num.to_f64().unwrap_or_default())
        )
    }
}

impl Serialize for Amount {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self.0.to_f64() {
            Some(f) => serializer.serialize_f64(f),
            None => Err(serde::ser::Error::custom(format!(
                "amount {} cannot be represented as a JSON number",
                self.0
            ))),
        }
    }
}

impl<'de> Deserialize<'de> for Amount {
    /// Accepts either a JSON number or a string in any format that `from_str` understands.
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct AmountVisitor;

        impl Visitor<'_> for AmountVisitor {
            type Value = Amount;

            fn expecting(&self, f: &mut Formatter<'_>) -> fmt::Result {
                f.write_str("a number or a numeric string")
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Amount, E> {
                Ok(Amount(Decimal::from(v)))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Amount, E> {
                Ok(Amount(Decimal::from(v)))
            }

            fn visit_f64<E: de::Error>(self, v: f64) -> Result<Amount, E> {
                Decimal::from_str(&v.to_string())
                    .or_else(|_| Decimal::from_scientific(&v.to_string()))
                    .map(Amount)
                    .map_err(E::custom)
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Amount, E> {
                Amount::from_str(v).map_err(E::custom)
            }
        }

        deserializer.deserialize_any(AmountVisitor)
    }
}

impl JsonSchema for Amount {
    fn schema_name() -> Cow<'static, str> {
        "Amount".into()
    }

    fn json_schema(_generator: &mut SchemaGenerator) -> Schema {
        json_schema!({
            "type": "number",
            "minimum": 0,
            "description": "Expense amount in dollars"
        })
    }
}

impl From<Decimal> for Amount {
    fn from(value: Decimal) -> Self {
        Amount::new(value)
    }
}

impl From<Amount> for Decimal {
    fn from(amount: Amount) -> Self {
        amount.value()
    }
}
