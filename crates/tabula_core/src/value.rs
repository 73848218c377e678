use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use time::{Date, PrimitiveDateTime};

use crate::{TabulaError, TabulaResult};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum ValueKind {
    Null,
    Int,
    Str,
    Decimal,
    Bool,
    Date,
    DateTime,
    Enum,
    Blob,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Value {
    Null,
    Int(i64),
    Str(String),
    Decimal(Decimal),
    Bool(bool),
    Date(Date),
    DateTime(PrimitiveDateTime),
    Enum(u32),
    Blob(Vec<u8>),
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Null => ValueKind::Null,
            Value::Int(_) => ValueKind::Int,
            Value::Str(_) => ValueKind::Str,
            Value::Decimal(_) => ValueKind::Decimal,
            Value::Bool(_) => ValueKind::Bool,
            Value::Date(_) => ValueKind::Date,
            Value::DateTime(_) => ValueKind::DateTime,
            Value::Enum(_) => ValueKind::Enum,
            Value::Blob(_) => ValueKind::Blob,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn from_enum<E: SqlEnum>(value: &E) -> Self {
        Value::Enum(value.ordinal())
    }

    pub fn to_enum<E: SqlEnum>(&self) -> TabulaResult<E> {
        let ordinal = match self {
            Value::Enum(ordinal) => *ordinal,
            Value::Int(raw) => u32::try_from(*raw)
                .map_err(|_| TabulaError::type_mismatch(format!("negative ordinal {raw}")))?,
            other => {
                return Err(TabulaError::type_mismatch(format!(
                    "expected enum ordinal, found {other}"
                )));
            }
        };
        E::from_ordinal(ordinal).ok_or_else(|| {
            TabulaError::type_mismatch(format!(
                "ordinal {ordinal} out of range for {} variants",
                E::VARIANTS.len()
            ))
        })
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Int(value) => write!(f, "{value}"),
            Value::Str(value) => write!(f, "{value:?}"),
            Value::Decimal(value) => write!(f, "{value}"),
            Value::Bool(value) => write!(f, "{value}"),
            Value::Date(value) => write!(f, "{value}"),
            Value::DateTime(value) => write!(f, "{value}"),
            Value::Enum(ordinal) => write!(f, "#{ordinal}"),
            Value::Blob(bytes) => write!(f, "<{} bytes>", bytes.len()),
        }
    }
}

/// Enumerations persisted by ordinal.
pub trait SqlEnum: Sized {
    const VARIANTS: &'static [&'static str];

    fn ordinal(&self) -> u32;

    fn from_ordinal(ordinal: u32) -> Option<Self>;
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(value.into())
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Str(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Str(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<Decimal> for Value {
    fn from(value: Decimal) -> Self {
        Value::Decimal(value)
    }
}

impl From<Date> for Value {
    fn from(value: Date) -> Self {
        Value::Date(value)
    }
}

impl From<PrimitiveDateTime> for Value {
    fn from(value: PrimitiveDateTime) -> Self {
        Value::DateTime(value)
    }
}

impl From<Vec<u8>> for Value {
    fn from(value: Vec<u8>) -> Self {
        Value::Blob(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(value) => value.into(),
            None => Value::Null,
        }
    }
}

pub trait FromValue: Sized {
    fn from_value(value: Value) -> TabulaResult<Self>;
}

fn unexpected<T>(expected: &str, found: &Value) -> TabulaResult<T> {
    Err(TabulaError::type_mismatch(format!(
        "expected {expected}, found {found}"
    )))
}

impl FromValue for Value {
    fn from_value(value: Value) -> TabulaResult<Self> {
        Ok(value)
    }
}

impl FromValue for i64 {
    fn from_value(value: Value) -> TabulaResult<Self> {
        match value {
            Value::Int(value) => Ok(value),
            Value::Enum(ordinal) => Ok(ordinal.into()),
            other => unexpected("integer", &other),
        }
    }
}

impl FromValue for i32 {
    fn from_value(value: Value) -> TabulaResult<Self> {
        let wide = i64::from_value(value)?;
        i32::try_from(wide)
            .map_err(|_| TabulaError::type_mismatch(format!("{wide} does not fit in i32")))
    }
}

impl FromValue for String {
    fn from_value(value: Value) -> TabulaResult<Self> {
        match value {
            Value::Str(value) => Ok(value),
            other => unexpected("string", &other),
        }
    }
}

impl FromValue for bool {
    fn from_value(value: Value) -> TabulaResult<Self> {
        match value {
            Value::Bool(value) => Ok(value),
            Value::Int(value) => Ok(value != 0),
            other => unexpected("boolean", &other),
        }
    }
}

impl FromValue for Decimal {
    fn from_value(value: Value) -> TabulaResult<Self> {
        match value {
            Value::Decimal(value) => Ok(value),
            Value::Int(value) => Ok(Decimal::from(value)),
            other => unexpected("decimal", &other),
        }
    }
}

impl FromValue for Date {
    fn from_value(value: Value) -> TabulaResult<Self> {
        match value {
            Value::Date(value) => Ok(value),
            Value::DateTime(value) => Ok(value.date()),
            other => unexpected("date", &other),
        }
    }
}

impl FromValue for PrimitiveDateTime {
    fn from_value(value: Value) -> TabulaResult<Self> {
        match value {
            Value::DateTime(value) => Ok(value),
            other => unexpected("datetime", &other),
        }
    }
}

impl FromValue for Vec<u8> {
    fn from_value(value: Value) -> TabulaResult<Self> {
        match value {
            Value::Blob(value) => Ok(value),
            other => unexpected("blob", &other),
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: Value) -> TabulaResult<Self> {
        match value {
            Value::Null => Ok(None),
            value => T::from_value(value).map(Some),
        }
    }
}
