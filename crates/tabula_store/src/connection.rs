//! The connection capability the session executes through, and its sea-orm
//! implementation over one open database transaction.

use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use sea_orm::{
    ConnectionTrait, DatabaseBackend, DatabaseTransaction, DbErr, QueryResult, Statement,
    TryGetable, Value as SeaValue,
};
use time::{Date, PrimitiveDateTime};

use tabula_core::{
    Argument, Column, ColumnKind, ColumnType, Dialect, MysqlDialect, PostgresDialect,
    SqliteDialect, TabulaError, TabulaResult, Value, render_arguments,
};

/// A statement ready for execution, plus whatever keys its last execution
/// generated.
#[derive(Clone, Debug)]
pub struct PreparedHandle {
    sql: String,
    key_columns: Vec<Column>,
    generated_keys: Vec<Vec<Value>>,
}

impl PreparedHandle {
    pub fn new(sql: impl Into<String>, key_columns: &[Column]) -> Self {
        Self {
            sql: sql.into(),
            key_columns: key_columns.to_vec(),
            generated_keys: Vec::new(),
        }
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn key_columns(&self) -> &[Column] {
        &self.key_columns
    }

    pub fn wants_generated_keys(&self) -> bool {
        !self.key_columns.is_empty()
    }

    /// One entry per inserted row, one value per key column.
    pub fn generated_keys(&self) -> &[Vec<Value>] {
        &self.generated_keys
    }

    pub fn set_generated_keys(&mut self, keys: Vec<Vec<Value>>) {
        self.generated_keys = keys;
    }
}

#[async_trait]
pub trait Connection: Send {
    fn dialect(&self) -> &dyn Dialect;

    fn quote_identifier(&self, name: &str) -> String {
        self.dialect().quote_identifier(name)
    }

    async fn prepare(&mut self, sql: &str, key_columns: &[Column]) -> TabulaResult<PreparedHandle> {
        Ok(PreparedHandle::new(sql, key_columns))
    }

    /// Raw driver values, one entry per row and per entry of `result_types`.
    async fn execute_query(
        &mut self,
        handle: &PreparedHandle,
        args: &[Argument],
        result_types: &[ColumnType],
    ) -> TabulaResult<Vec<Vec<Value>>>;

    async fn execute_update(
        &mut self,
        handle: &mut PreparedHandle,
        args: &[Argument],
    ) -> TabulaResult<u64>;

    async fn execute_batch(
        &mut self,
        handle: &mut PreparedHandle,
        batch: &[Vec<Argument>],
    ) -> TabulaResult<Vec<u64>> {
        let mut counts = Vec::with_capacity(batch.len());
        let mut keys = Vec::new();
        for args in batch {
            counts.push(self.execute_update(handle, args).await?);
            keys.extend(handle.generated_keys().iter().cloned());
        }
        handle.set_generated_keys(keys);
        Ok(counts)
    }

    async fn commit(self: Box<Self>) -> TabulaResult<()>;

    async fn rollback(self: Box<Self>) -> TabulaResult<()>;
}

pub fn dialect_for(backend: DatabaseBackend) -> Box<dyn Dialect> {
    match backend {
        DatabaseBackend::Postgres => Box::new(PostgresDialect),
        DatabaseBackend::MySql => Box::new(MysqlDialect),
        _ => Box::new(SqliteDialect),
    }
}

pub struct SeaOrmConnection {
    transaction: DatabaseTransaction,
    backend: DatabaseBackend,
    dialect: Box<dyn Dialect>,
}

impl SeaOrmConnection {
    pub fn new(transaction: DatabaseTransaction) -> Self {
        let backend = transaction.get_database_backend();
        Self {
            transaction,
            backend,
            dialect: dialect_for(backend),
        }
    }

    fn statement(&self, sql: &str, args: &[Argument]) -> TabulaResult<Statement> {
        let values = args
            .iter()
            .map(|arg| sea_value(self.backend, &arg.column_type, arg.db_value()?))
            .collect::<TabulaResult<Vec<_>>>()?;
        Ok(Statement::from_sql_and_values(self.backend, sql, values))
    }
}

fn failure(err: DbErr, sql: &str, args: &[Argument]) -> TabulaError {
    TabulaError::database(err.to_string(), sql, render_arguments(args))
}

fn sea_value(backend: DatabaseBackend, column_type: &ColumnType, value: Value) -> TabulaResult<SeaValue> {
    let kind = column_type.kind();
    Ok(match value {
        Value::Null => null_of(backend, kind),
        Value::Int(raw) => match kind {
            ColumnKind::Integer | ColumnKind::Enumeration { .. } => match i32::try_from(raw) {
                Ok(narrow) => narrow.into(),
                Err(_) => raw.into(),
            },
            _ => raw.into(),
        },
        Value::Str(text) => text.into(),
        Value::Decimal(raw) if backend == DatabaseBackend::Sqlite => raw
            .to_f64()
            .ok_or_else(|| TabulaError::type_mismatch(format!("{raw} does not fit a double")))?
            .into(),
        Value::Decimal(raw) => raw.into(),
        Value::Bool(flag) => flag.into(),
        Value::Date(date) => date.into(),
        Value::DateTime(stamp) => stamp.into(),
        Value::Enum(ordinal) => i64::from(ordinal).into(),
        Value::Blob(bytes) => bytes.into(),
    })
}

fn null_of(backend: DatabaseBackend, kind: &ColumnKind) -> SeaValue {
    match kind {
        ColumnKind::Integer | ColumnKind::Enumeration { .. } => Option::<i32>::None.into(),
        ColumnKind::Long | ColumnKind::EntityId { .. } => Option::<i64>::None.into(),
        ColumnKind::Char | ColumnKind::Varchar { .. } | ColumnKind::Text => {
            Option::<String>::None.into()
        }
        ColumnKind::Decimal { .. } if backend == DatabaseBackend::Sqlite => {
            Option::<f64>::None.into()
        }
        ColumnKind::Decimal { .. } => Option::<Decimal>::None.into(),
        ColumnKind::Date => Option::<Date>::None.into(),
        ColumnKind::DateTime => Option::<PrimitiveDateTime>::None.into(),
        ColumnKind::Boolean => Option::<bool>::None.into(),
        ColumnKind::Blob => Option::<Vec<u8>>::None.into(),
    }
}

fn attempt<T: TryGetable>(row: &QueryResult, index: usize) -> Option<Option<T>> {
    row.try_get_by_index::<Option<T>>(index).ok()
}

fn to_value<T: Into<Value>>(raw: Option<T>) -> TabulaResult<Value> {
    Ok(raw.map(Into::into).unwrap_or(Value::Null))
}

/// Integral columns that a backend hands back as decimals.
fn integral_from_decimal(raw: Option<Decimal>) -> TabulaResult<Value> {
    match raw {
        None => Ok(Value::Null),
        Some(value) if value.fract().is_zero() => value.to_i64().map(Value::Int).ok_or_else(|| {
            TabulaError::type_mismatch(format!("{value} does not fit a 64-bit integer"))
        }),
        Some(value) => Err(TabulaError::type_mismatch(format!(
            "{value} is not an integer"
        ))),
    }
}

/// Decimal columns that a backend stores as doubles.
fn decimal_from_float(raw: Option<f64>) -> TabulaResult<Value> {
    match raw {
        None => Ok(Value::Null),
        Some(value) => Decimal::try_from(value).map(Value::Decimal).map_err(|_| {
            TabulaError::type_mismatch(format!("{value} cannot be read as a decimal"))
        }),
    }
}

/// Reads column `index` as the Rust type its declared kind maps to, falling
/// back to the representations backends use for that kind.
fn read_value(row: &QueryResult, index: usize, column_type: &ColumnType) -> TabulaResult<Value> {
    let kind = column_type.kind();
    let value = match kind {
        kind if kind.is_integral() || matches!(kind, ColumnKind::Enumeration { .. }) => {
            attempt::<i64>(row, index)
                .map(to_value)
                .or_else(|| attempt::<i32>(row, index).map(|raw| to_value(raw.map(i64::from))))
                .or_else(|| attempt::<Decimal>(row, index).map(integral_from_decimal))
        }
        kind if kind.is_textual() => attempt::<String>(row, index).map(to_value),
        ColumnKind::Decimal { .. } => attempt::<Decimal>(row, index)
            .map(to_value)
            .or_else(|| attempt::<f64>(row, index).map(decimal_from_float))
            .or_else(|| attempt::<i64>(row, index).map(|raw| to_value(raw.map(Decimal::from))))
            .or_else(|| attempt::<String>(row, index).map(to_value)),
        ColumnKind::Boolean => attempt::<bool>(row, index)
            .map(to_value)
            .or_else(|| attempt::<i64>(row, index).map(to_value)),
        ColumnKind::Date => attempt::<Date>(row, index)
            .map(to_value)
            .or_else(|| attempt::<String>(row, index).map(to_value)),
        ColumnKind::DateTime => attempt::<PrimitiveDateTime>(row, index)
            .map(to_value)
            .or_else(|| attempt::<String>(row, index).map(to_value)),
        ColumnKind::Blob => attempt::<Vec<u8>>(row, index).map(to_value),
        _ => None,
    };
    value.unwrap_or_else(|| {
        Err(TabulaError::type_mismatch(format!(
            "result column {index} cannot be read as {kind:?}"
        )))
    })
}

#[async_trait]
impl Connection for SeaOrmConnection {
    fn dialect(&self) -> &dyn Dialect {
        self.dialect.as_ref()
    }

    async fn execute_query(
        &mut self,
        handle: &PreparedHandle,
        args: &[Argument],
        result_types: &[ColumnType],
    ) -> TabulaResult<Vec<Vec<Value>>> {
        let statement = self.statement(handle.sql(), args)?;
        let rows = self
            .transaction
            .query_all_raw(statement)
            .await
            .map_err(|err| failure(err, handle.sql(), args))?;
        rows.iter()
            .map(|row| {
                result_types
                    .iter()
                    .enumerate()
                    .map(|(index, column_type)| read_value(row, index, column_type))
                    .collect()
            })
            .collect()
    }

    async fn execute_update(
        &mut self,
        handle: &mut PreparedHandle,
        args: &[Argument],
    ) -> TabulaResult<u64> {
        let statement = self.statement(handle.sql(), args)?;
        if handle.wants_generated_keys() && self.dialect.returns_generated_keys_inline() {
            let rows = self
                .transaction
                .query_all_raw(statement)
                .await
                .map_err(|err| failure(err, handle.sql(), args))?;
            let key_types: Vec<ColumnType> = handle
                .key_columns()
                .iter()
                .map(|column| column.column_type().clone())
                .collect();
            let keys = rows
                .iter()
                .map(|row| {
                    key_types
                        .iter()
                        .enumerate()
                        .map(|(index, column_type)| read_value(row, index, column_type))
                        .collect::<TabulaResult<Vec<_>>>()
                })
                .collect::<TabulaResult<Vec<_>>>()?;
            let count = keys.len() as u64;
            handle.set_generated_keys(keys);
            return Ok(count);
        }
        let result = self
            .transaction
            .execute_raw(statement)
            .await
            .map_err(|err| failure(err, handle.sql(), args))?;
        if handle.wants_generated_keys() {
            let id = i64::try_from(result.last_insert_id()).map_err(|_| {
                TabulaError::no_generated_key(format!(
                    "generated key {} out of range",
                    result.last_insert_id()
                ))
            })?;
            let keys = if result.rows_affected() == 0 {
                Vec::new()
            } else {
                vec![vec![Value::Int(id)]]
            };
            handle.set_generated_keys(keys);
        }
        Ok(result.rows_affected())
    }

    async fn commit(self: Box<Self>) -> TabulaResult<()> {
        self.transaction.commit().await.map_err(TabulaError::from)
    }

    async fn rollback(self: Box<Self>) -> TabulaResult<()> {
        self.transaction.rollback().await.map_err(TabulaError::from)
    }
}
