//! Cast strategies — coercion of stored values and operands into a common
//! comparable domain before any comparison happens.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::RuleError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CastType {
    /// Compare as text.
    Char,
    /// Compare as a floating point number.
    Double,
    /// Compare as a calendar day.
    Datetime,
}

/// A stored value before coercion.
#[derive(Debug, Clone, Copy)]
pub enum RawValue<'a> {
    Text(&'a str),
    Number(f64),
    Timestamp(DateTime<Utc>),
}

/// A coerced value; two values are only ever compared within one variant.
#[derive(Debug, Clone, PartialEq)]
pub enum ComparableValue {
    Text(String),
    Number(f64),
    Date(NaiveDate),
}

impl PartialOrd for ComparableValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (ComparableValue::Text(a), ComparableValue::Text(b)) => a.partial_cmp(b),
            (ComparableValue::Number(a), ComparableValue::Number(b)) => a.partial_cmp(b),
            (ComparableValue::Date(a), ComparableValue::Date(b)) => a.partial_cmp(b),
            _ => None,
        }
    }
}

impl fmt::Display for ComparableValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComparableValue::Text(text) => f.write_str(text),
            ComparableValue::Number(number) => write!(f, "{number}"),
            ComparableValue::Date(date) => write!(f, "{}", date.format("%Y-%m-%d")),
        }
    }
}

const TIMESTAMP_TEXT_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

impl CastType {
    pub fn name(&self) -> &'static str {
        match self {
            CastType::Char => "CHAR",
            CastType::Double => "DOUBLE",
            CastType::Datetime => "DATETIME",
        }
    }

    /// SQL type used in `CAST(... AS <type>)`.
    pub fn sql_type(&self) -> &'static str {
        match self {
            CastType::Char => "CHAR",
            CastType::Double => "DOUBLE",
            CastType::Datetime => "DATE",
        }
    }

    /// Whether values under this cast have a meaningful order.
    pub fn is_orderable(&self) -> bool {
        match self {
            CastType::Char => false,
            CastType::Double | CastType::Datetime => true,
        }
    }

    /// MySQL `REGEXP` a stored text value has to match before it is cast.
    /// A bare `CAST` turns unreadable text into `0` or a partial date where
    /// [`CastType::coerce`] yields `None`.
    pub fn text_guard_pattern(&self) -> Option<&'static str> {
        match self {
            CastType::Char => None,
            CastType::Double => Some(
                "^[[:space:]]*[-+]?([0-9]+[.]?[0-9]*|[.][0-9]+)([eE][-+]?[0-9]+)?[[:space:]]*$",
            ),
            CastType::Datetime => Some(
                "^[[:space:]]*[0-9]{4}-[0-9]{2}-[0-9]{2}([ T][0-9]{2}:[0-9]{2}:[0-9]{2}[^[:space:]]*)?[[:space:]]*$",
            ),
        }
    }

    /// Coerce a raw value. `None` behaves like SQL NULL: it never satisfies
    /// a comparison.
    pub fn coerce(&self, raw: RawValue<'_>) -> Option<ComparableValue> {
        match (self, raw) {
            (CastType::Char, RawValue::Text(text)) => Some(ComparableValue::Text(text.to_string())),
            (CastType::Char, RawValue::Number(number)) => {
                Some(ComparableValue::Text(number.to_string()))
            }
            (CastType::Char, RawValue::Timestamp(ts)) => Some(ComparableValue::Text(
                ts.format(TIMESTAMP_TEXT_FORMAT).to_string(),
            )),

            (CastType::Double, RawValue::Text(text)) => text
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|n| n.is_finite())
                .map(ComparableValue::Number),
            (CastType::Double, RawValue::Number(number)) => {
                Some(number).filter(|n| n.is_finite()).map(ComparableValue::Number)
            }
            (CastType::Double, RawValue::Timestamp(ts)) => {
                Some(ComparableValue::Number(ts.timestamp() as f64))
            }

            (CastType::Datetime, RawValue::Text(text)) => parse_day(text).map(ComparableValue::Date),
            (CastType::Datetime, RawValue::Number(_)) => None,
            (CastType::Datetime, RawValue::Timestamp(ts)) => {
                Some(ComparableValue::Date(ts.date_naive()))
            }
        }
    }

    /// Coerce a rule operand, rejecting it when the cast cannot represent it.
    pub fn coerce_operand(&self, operand: &str) -> Result<ComparableValue, RuleError> {
        self.coerce(RawValue::Text(operand))
            .ok_or_else(|| RuleError::InvalidCast {
                cast_type: self.name().to_string(),
                reason: format!("operand '{operand}' cannot be read as {}", self.name()),
            })
    }
}

impl FromStr for CastType {
    type Err = RuleError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.to_ascii_uppercase().as_str() {
            "CHAR" | "TEXT" => Ok(CastType::Char),
            "DOUBLE" | "NUMERIC" => Ok(CastType::Double),
            "DATETIME" => Ok(CastType::Datetime),
            _ => Err(RuleError::InvalidCast {
                cast_type: raw.to_string(),
                reason: "unknown cast type".to_string(),
            }),
        }
    }
}

fn parse_day(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(text) {
        return Some(ts.with_timezone(&Utc).date_naive());
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(text, TIMESTAMP_TEXT_FORMAT) {
        return Some(dt.date());
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d").ok()
}
