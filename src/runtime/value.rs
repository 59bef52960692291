/// Typed field values
///
/// Every value stored in a session carries its kind. Conversions between kinds
/// are explicit and return `Result`; the only silent fallback lives in
/// `ExecutionSession::get_field_value_as`.

use crate::definition::types::FieldType;
use crate::error::EngineError;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Format used for datetimes in SQL literals and display text
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A value held by a field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum FieldValue {
    String(String),
    Number(Decimal),
    Boolean(bool),
    DateTime(NaiveDateTime),
}

impl FieldValue {
    /// The field type this value satisfies
    pub fn field_type(&self) -> FieldType {
        match self {
            FieldValue::String(_) => FieldType::String,
            FieldValue::Number(_) => FieldType::Number,
            FieldValue::Boolean(_) => FieldType::Boolean,
            FieldValue::DateTime(_) => FieldType::DateTime,
        }
    }

    /// Zero value of a field type: "", 0, false, 1900-01-01 00:00:00
    pub fn zero(field_type: FieldType) -> Self {
        match field_type {
            FieldType::String => FieldValue::String(String::new()),
            FieldType::Number => FieldValue::Number(Decimal::ZERO),
            FieldType::Boolean => FieldValue::Boolean(false),
            FieldType::DateTime => FieldValue::DateTime(
                NaiveDate::from_ymd_opt(1900, 1, 1)
                    .and_then(|date| date.and_hms_opt(0, 0, 0))
                    .unwrap_or_default(),
            ),
        }
    }

    /// Parse text into a value of the given type
    pub fn parse_as(text: &str, field_type: FieldType) -> Result<Self, EngineError> {
        let trimmed = text.trim();
        match field_type {
            FieldType::String => Ok(FieldValue::String(text.to_string())),
            FieldType::Number => parse_decimal(trimmed)
                .map(FieldValue::Number)
                .ok_or_else(|| EngineError::Validation(format!("'{}' is not a valid number", text))),
            FieldType::Boolean => parse_bool(trimmed)
                .map(FieldValue::Boolean)
                .ok_or_else(|| EngineError::Validation(format!("'{}' is not a valid boolean", text))),
            FieldType::DateTime => parse_datetime(trimmed)
                .map(FieldValue::DateTime)
                .ok_or_else(|| EngineError::Validation(format!("'{}' is not a valid datetime", text))),
        }
    }

    /// Convert this value to another field type
    pub fn coerce_to(&self, field_type: FieldType) -> Result<Self, EngineError> {
        if self.field_type() == field_type {
            return Ok(self.clone());
        }

        match (self, field_type) {
            (_, FieldType::String) => Ok(FieldValue::String(self.to_string())),
            (FieldValue::String(text), target) => Self::parse_as(text, target),
            (FieldValue::Boolean(flag), FieldType::Number) => {
                Ok(FieldValue::Number(if *flag { Decimal::ONE } else { Decimal::ZERO }))
            }
            (FieldValue::Number(number), FieldType::Boolean) => Ok(FieldValue::Boolean(!number.is_zero())),
            (value, target) => Err(EngineError::Validation(format!(
                "Cannot convert {:?} value to {:?}",
                value.field_type(),
                target
            ))),
        }
    }

    /// Numeric view used by arithmetic: numbers, numeric text and booleans
    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            FieldValue::Number(number) => Some(*number),
            FieldValue::String(text) => parse_decimal(text.trim()),
            FieldValue::Boolean(flag) => Some(if *flag { Decimal::ONE } else { Decimal::ZERO }),
            FieldValue::DateTime(_) => None,
        }
    }

    /// Render as a SQL literal: quoted strings with doubled quotes, bare numbers,
    /// 1/0 booleans and quoted `YYYY-MM-DD HH:MM:SS` datetimes
    pub fn to_sql_literal(&self) -> String {
        match self {
            FieldValue::String(text) => format!("'{}'", text.replace('\'', "''")),
            FieldValue::Number(number) => number.to_string(),
            FieldValue::Boolean(flag) => (if *flag { "1" } else { "0" }).to_string(),
            FieldValue::DateTime(moment) => format!("'{}'", moment.format(DATETIME_FORMAT)),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::String(text) => f.write_str(text),
            FieldValue::Number(number) => write!(f, "{}", number),
            FieldValue::Boolean(flag) => write!(f, "{}", flag),
            FieldValue::DateTime(moment) => write!(f, "{}", moment.format(DATETIME_FORMAT)),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::String(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::String(value)
    }
}

impl From<Decimal> for FieldValue {
    fn from(value: Decimal) -> Self {
        FieldValue::Number(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Number(Decimal::from(value))
    }
}

impl From<i32> for FieldValue {
    fn from(value: i32) -> Self {
        FieldValue::Number(Decimal::from(value))
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Boolean(value)
    }
}

impl From<NaiveDateTime> for FieldValue {
    fn from(value: NaiveDateTime) -> Self {
        FieldValue::DateTime(value)
    }
}

/// Conversion out of a field value, used by the typed session getters
pub trait FromFieldValue: Sized {
    fn from_field_value(value: &FieldValue) -> Result<Self, EngineError>;
}

impl FromFieldValue for String {
    fn from_field_value(value: &FieldValue) -> Result<Self, EngineError> {
        Ok(value.to_string())
    }
}

impl FromFieldValue for Decimal {
    fn from_field_value(value: &FieldValue) -> Result<Self, EngineError> {
        match value.coerce_to(FieldType::Number)? {
            FieldValue::Number(number) => Ok(number),
            other => Err(EngineError::Validation(format!("'{}' is not a number", other))),
        }
    }
}

impl FromFieldValue for i64 {
    fn from_field_value(value: &FieldValue) -> Result<Self, EngineError> {
        let number = Decimal::from_field_value(value)?;
        if !number.fract().is_zero() {
            return Err(EngineError::Validation(format!("'{}' is not an integer", number)));
        }
        number
            .to_i64()
            .ok_or_else(|| EngineError::Validation(format!("'{}' does not fit in an integer", number)))
    }
}

impl FromFieldValue for bool {
    fn from_field_value(value: &FieldValue) -> Result<Self, EngineError> {
        match value.coerce_to(FieldType::Boolean)? {
            FieldValue::Boolean(flag) => Ok(flag),
            other => Err(EngineError::Validation(format!("'{}' is not a boolean", other))),
        }
    }
}

impl FromFieldValue for NaiveDateTime {
    fn from_field_value(value: &FieldValue) -> Result<Self, EngineError> {
        match value.coerce_to(FieldType::DateTime)? {
            FieldValue::DateTime(moment) => Ok(moment),
            other => Err(EngineError::Validation(format!("'{}' is not a datetime", other))),
        }
    }
}

fn parse_decimal(text: &str) -> Option<Decimal> {
    if text.is_empty() {
        return None;
    }
    Decimal::from_str(text)
        .or_else(|_| Decimal::from_scientific(text))
        .ok()
}

fn parse_bool(text: &str) -> Option<bool> {
    match text.to_ascii_lowercase().as_str() {
        "true" | "1" => Some(true),
        "false" | "0" => Some(false),
        _ => None,
    }
}

fn parse_datetime(text: &str) -> Option<NaiveDateTime> {
    const FORMATS: [&str; 3] = [DATETIME_FORMAT, "%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f"];

    FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
        .or_else(|| DateTime::parse_from_rfc3339(text).ok().map(|moment| moment.naive_utc()))
        .or_else(|| {
            NaiveDate::parse_from_str(text, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
}
