use std::sync::Arc;

use crate::{Expr, FromValue, SqlEnum, TabulaError, TabulaResult, Value};

/// One fetched row, addressed by the expressions that were selected.
#[derive(Clone, Debug, PartialEq)]
pub struct ResultRow {
    fields: Arc<Vec<Expr>>,
    values: Vec<Value>,
}

impl ResultRow {
    pub fn new(fields: Arc<Vec<Expr>>, values: Vec<Value>) -> TabulaResult<Self> {
        if fields.len() != values.len() {
            return Err(TabulaError::invalid(format!(
                "row of {} values for {} fields",
                values.len(),
                fields.len()
            )));
        }
        Ok(Self { fields, values })
    }

    /// Builds a row from driver values, converting each through the type of
    /// its field.
    pub fn from_raw(fields: Arc<Vec<Expr>>, raw: Vec<Value>) -> TabulaResult<Self> {
        if fields.len() != raw.len() {
            return Self::new(fields, raw);
        }
        let values = fields
            .iter()
            .zip(raw)
            .map(|(field, value)| field.column_type().from_db(value))
            .collect::<TabulaResult<Vec<_>>>()?;
        Self::new(fields, values)
    }

    pub fn fields(&self) -> &[Expr] {
        &self.fields
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn position(&self, field: &Expr) -> Option<usize> {
        self.fields.iter().position(|candidate| candidate == field)
    }

    fn locate(&self, field: &Expr) -> TabulaResult<usize> {
        self.position(field)
            .ok_or_else(|| TabulaError::invalid(format!("{field:?} is not part of the row")))
    }

    pub fn get_value(&self, field: impl Into<Expr>) -> TabulaResult<&Value> {
        let index = self.locate(&field.into())?;
        Ok(&self.values[index])
    }

    pub fn get<T: FromValue>(&self, field: impl Into<Expr>) -> TabulaResult<T> {
        T::from_value(self.get_value(field)?.clone())
    }

    pub fn get_at<T: FromValue>(&self, index: usize) -> TabulaResult<T> {
        let value = self.values.get(index).ok_or_else(|| {
            TabulaError::invalid(format!("index {index} outside row of {}", self.len()))
        })?;
        T::from_value(value.clone())
    }

    pub fn get_enum<E: SqlEnum>(&self, field: impl Into<Expr>) -> TabulaResult<E> {
        self.get_value(field)?.to_enum()
    }

    pub fn set(&mut self, field: impl Into<Expr>, value: Value) -> TabulaResult<()> {
        let field = field.into();
        let index = self.locate(&field)?;
        self.values[index] = field.column_type().validate(&value)?;
        Ok(())
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }
}
