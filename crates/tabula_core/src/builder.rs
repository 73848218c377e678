use std::fmt;

use crate::{Column, ColumnType, Dialect, TabulaResult, Value};

/// One bound parameter, kept in its in-memory form together with the type that
/// converts it for the driver.
#[derive(Clone, Debug, PartialEq)]
pub struct Argument {
    pub column_type: ColumnType,
    pub value: Value,
}

impl Argument {
    pub fn new(column_type: ColumnType, value: Value) -> Self {
        Self { column_type, value }
    }

    pub fn db_value(&self) -> TabulaResult<Value> {
        self.column_type.to_db(&self.value)
    }
}

impl fmt::Display for Argument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.column_type.render_literal(&self.value) {
            Ok(literal) => f.write_str(&literal),
            Err(_) => write!(f, "{}", self.value),
        }
    }
}

pub fn render_arguments(args: &[Argument]) -> String {
    args.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Collects bound arguments in textual order while SQL is rendered.
pub struct QueryBuilder<'a> {
    dialect: &'a dyn Dialect,
    prepared: bool,
    args: Vec<Argument>,
}

impl<'a> QueryBuilder<'a> {
    pub fn new(dialect: &'a dyn Dialect) -> Self {
        Self {
            dialect,
            prepared: true,
            args: Vec::new(),
        }
    }

    /// Renders every value inline; no arguments are collected.
    pub fn inline(dialect: &'a dyn Dialect) -> Self {
        Self {
            dialect,
            prepared: false,
            args: Vec::new(),
        }
    }

    pub fn dialect(&self) -> &'a dyn Dialect {
        self.dialect
    }

    pub fn is_prepared(&self) -> bool {
        self.prepared
    }

    pub fn register_argument(
        &mut self,
        column_type: &ColumnType,
        value: &Value,
    ) -> TabulaResult<String> {
        if !self.prepared {
            return self.literal(column_type, value);
        }
        let value = column_type.validate(value)?;
        self.args.push(Argument::new(column_type.clone(), value));
        Ok(self.dialect.placeholder(self.args.len()))
    }

    /// Binds `value` when its type binds cleanly, otherwise renders it inline.
    pub fn bind_value(&mut self, column_type: &ColumnType, value: &Value) -> TabulaResult<String> {
        if column_type.is_bindable() {
            self.register_argument(column_type, value)
        } else {
            self.literal(column_type, value)
        }
    }

    pub fn literal(&self, column_type: &ColumnType, value: &Value) -> TabulaResult<String> {
        match column_type.validate(value)? {
            Value::Blob(bytes) => Ok(self.dialect.blob_literal(&bytes)),
            value => column_type.render_literal(&value),
        }
    }

    pub fn identity(&self, name: &str) -> String {
        self.dialect.quote_identifier(name)
    }

    pub fn column_identity(&self, column: &Column) -> String {
        format!(
            "{}.{}",
            self.dialect.quote_identifier(column.table_name()),
            self.dialect.quote_identifier(column.name())
        )
    }

    pub fn args(&self) -> &[Argument] {
        &self.args
    }

    pub fn into_args(self) -> Vec<Argument> {
        self.args
    }
}
