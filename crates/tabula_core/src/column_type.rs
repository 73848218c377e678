use rust_decimal::Decimal;
use time::macros::format_description;
use time::{Date, PrimitiveDateTime};

use crate::{TabulaError, TabulaResult, Value};

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ColumnKind {
    Integer,
    Long,
    Char,
    Varchar {
        length: u32,
        collate: Option<String>,
    },
    Text,
    Decimal {
        precision: u32,
        scale: u32,
    },
    Date,
    DateTime,
    Boolean,
    Enumeration {
        variants: usize,
    },
    Blob,
    EntityId {
        table: String,
    },
}

impl ColumnKind {
    pub fn is_integral(&self) -> bool {
        matches!(
            self,
            ColumnKind::Integer | ColumnKind::Long | ColumnKind::EntityId { .. }
        )
    }

    pub fn is_textual(&self) -> bool {
        matches!(
            self,
            ColumnKind::Char | ColumnKind::Varchar { .. } | ColumnKind::Text
        )
    }
}

/// How values of one column are validated, rendered inline and converted back
/// from what the driver hands over.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ColumnType {
    kind: ColumnKind,
    nullable: bool,
    autoincrement: bool,
}

const DATE_FORMAT: &[time::format_description::FormatItem<'static>] =
    format_description!("[year]-[month]-[day]");
const DATE_TIME_FORMAT: &[time::format_description::FormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");

impl ColumnType {
    pub fn new(kind: ColumnKind) -> Self {
        Self {
            kind,
            nullable: false,
            autoincrement: false,
        }
    }

    pub fn integer() -> Self {
        Self::new(ColumnKind::Integer)
    }

    pub fn long() -> Self {
        Self::new(ColumnKind::Long)
    }

    pub fn text() -> Self {
        Self::new(ColumnKind::Text)
    }

    pub fn varchar(length: u32) -> Self {
        Self::new(ColumnKind::Varchar {
            length,
            collate: None,
        })
    }

    pub fn boolean() -> Self {
        Self::new(ColumnKind::Boolean)
    }

    pub fn decimal(precision: u32, scale: u32) -> Self {
        Self::new(ColumnKind::Decimal { precision, scale })
    }

    pub fn kind(&self) -> &ColumnKind {
        &self.kind
    }

    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    pub fn is_autoincrement(&self) -> bool {
        self.autoincrement
    }

    /// Same conversions, null permitted.
    pub fn nullable(&self) -> Self {
        Self {
            nullable: true,
            ..self.clone()
        }
    }

    pub fn auto_increment(&self) -> TabulaResult<Self> {
        if !self.kind.is_integral() {
            return Err(TabulaError::invalid(format!(
                "auto-increment requires an integral column, got {:?}",
                self.kind
            )));
        }
        Ok(Self {
            autoincrement: true,
            ..self.clone()
        })
    }

    /// Values of this type travel as bound parameters; everything else is
    /// inlined as an escaped literal.
    pub fn is_bindable(&self) -> bool {
        !matches!(self.kind, ColumnKind::Date | ColumnKind::DateTime)
    }

    /// Checks a caller-supplied value and normalises it to the in-memory form
    /// of this type.
    pub fn validate(&self, value: &Value) -> TabulaResult<Value> {
        if value.is_null() {
            if self.nullable {
                return Ok(Value::Null);
            }
            return Err(TabulaError::type_mismatch(format!(
                "null is not allowed for non-nullable {:?}",
                self.kind
            )));
        }
        let normalized = match (&self.kind, value) {
            (kind, Value::Int(_)) if kind.is_integral() => value.clone(),
            (ColumnKind::Char, Value::Str(text)) if text.chars().count() == 1 => value.clone(),
            (ColumnKind::Varchar { length, .. }, Value::Str(text)) => {
                if text.chars().count() > *length as usize {
                    return Err(TabulaError::type_mismatch(format!(
                        "value of {} chars exceeds varchar({length})",
                        text.chars().count()
                    )));
                }
                value.clone()
            }
            (ColumnKind::Text, Value::Str(_)) => value.clone(),
            (ColumnKind::Decimal { .. }, Value::Decimal(_)) => value.clone(),
            (ColumnKind::Decimal { .. }, Value::Int(raw)) => Value::Decimal(Decimal::from(*raw)),
            (ColumnKind::Date, Value::Date(_)) => value.clone(),
            (ColumnKind::DateTime, Value::DateTime(_)) => value.clone(),
            (ColumnKind::Boolean, Value::Bool(_)) => value.clone(),
            (ColumnKind::Enumeration { variants }, Value::Enum(ordinal))
                if (*ordinal as usize) < *variants =>
            {
                value.clone()
            }
            (ColumnKind::Enumeration { variants }, Value::Int(raw))
                if *raw >= 0 && (*raw as usize) < *variants =>
            {
                Value::Enum(*raw as u32)
            }
            (ColumnKind::Blob, Value::Blob(_)) => value.clone(),
            (kind, other) => {
                return Err(TabulaError::type_mismatch(format!(
                    "{other} does not fit column of kind {kind:?}"
                )));
            }
        };
        Ok(normalized)
    }

    /// The form handed to the driver when binding a parameter.
    pub fn to_db(&self, value: &Value) -> TabulaResult<Value> {
        Ok(match self.validate(value)? {
            Value::Enum(ordinal) => Value::Int(ordinal.into()),
            other => other,
        })
    }

    /// Inverse of [`ColumnType::to_db`] for values coming back from the driver.
    pub fn from_db(&self, raw: Value) -> TabulaResult<Value> {
        if raw.is_null() {
            return self.validate(&raw);
        }
        let converted = match (&self.kind, raw) {
            (ColumnKind::Decimal { scale, .. }, Value::Decimal(value)) => {
                Value::Decimal(value.round_dp(*scale))
            }
            (ColumnKind::Decimal { .. }, Value::Str(text)) => Value::Decimal(
                text.parse::<Decimal>()
                    .map_err(|err| TabulaError::type_mismatch(format!("decimal '{text}': {err}")))?,
            ),
            (ColumnKind::Boolean, Value::Int(raw)) => Value::Bool(raw != 0),
            (ColumnKind::Date, Value::Str(text)) => Value::Date(
                Date::parse(&text, DATE_FORMAT)
                    .map_err(|err| TabulaError::type_mismatch(format!("date '{text}': {err}")))?,
            ),
            (ColumnKind::Date, Value::DateTime(value)) => Value::Date(value.date()),
            (ColumnKind::DateTime, Value::Str(text)) => Value::DateTime(
                PrimitiveDateTime::parse(&text, DATE_TIME_FORMAT).map_err(|err| {
                    TabulaError::type_mismatch(format!("datetime '{text}': {err}"))
                })?,
            ),
            (_, other) => other,
        };
        self.validate(&converted)
    }

    /// SQL literal text for a value of this type.
    pub fn render_literal(&self, value: &Value) -> TabulaResult<String> {
        let value = self.validate(value)?;
        Ok(match value {
            Value::Null => "NULL".to_string(),
            Value::Int(raw) => raw.to_string(),
            Value::Str(text) => quote_string(&text),
            Value::Decimal(raw) => raw.to_string(),
            Value::Bool(true) => "TRUE".to_string(),
            Value::Bool(false) => "FALSE".to_string(),
            Value::Date(date) => quote_string(&format_date(date)?),
            Value::DateTime(stamp) => quote_string(&format_date_time(stamp)?),
            Value::Enum(ordinal) => ordinal.to_string(),
            Value::Blob(bytes) => {
                let hex: String = bytes.iter().map(|byte| format!("{byte:02X}")).collect();
                format!("X'{hex}'")
            }
        })
    }
}

pub fn quote_string(text: &str) -> String {
    format!("'{}'", text.replace('\'', "''"))
}

pub fn format_date(date: Date) -> TabulaResult<String> {
    date.format(DATE_FORMAT)
        .map_err(|err| TabulaError::type_mismatch(format!("format date: {err}")))
}

pub fn format_date_time(stamp: PrimitiveDateTime) -> TabulaResult<String> {
    stamp
        .format(DATE_TIME_FORMAT)
        .map_err(|err| TabulaError::type_mismatch(format!("format datetime: {err}")))
}
