//! One-shot write statements. Each renders deterministic SQL with its
//! arguments and can be executed exactly once.

use std::collections::{BTreeSet, HashSet};

use tabula_core::{
    Argument, Column, Expr, QueryBuilder, Select, TabulaError, TabulaResult, Table, Value,
};

use crate::session::Session;

fn check_target(table: &Table, column: &Column) -> TabulaResult<()> {
    if table.contains(column) {
        Ok(())
    } else {
        Err(TabulaError::no_target_table(format!(
            "{column:?} is not a column of {}",
            table.name()
        )))
    }
}

fn check_predicate(table: &Table, condition: &Expr) -> TabulaResult<()> {
    let foreign: Vec<String> = condition
        .referenced_tables()
        .into_iter()
        .filter(|name| name != table.name())
        .collect();
    if foreign.is_empty() {
        Ok(())
    } else {
        Err(TabulaError::no_target_table(format!(
            "predicate on {} references {}",
            table.name(),
            foreign.join(", ")
        )))
    }
}

fn mark_executed(executed: &mut bool, table: &Table) -> TabulaResult<()> {
    if *executed {
        return Err(TabulaError::reused(format!(
            "statement on {} already executed",
            table.name()
        )));
    }
    *executed = true;
    Ok(())
}

/// Column to value pairs in assignment order.
#[derive(Clone, Debug)]
struct Assignments {
    table: Table,
    entries: Vec<(Column, Value)>,
}

impl Assignments {
    fn new(table: &Table) -> Self {
        Self {
            table: table.clone(),
            entries: Vec::new(),
        }
    }

    fn contains(&self, column: &Column) -> bool {
        self.entries.iter().any(|(assigned, _)| assigned == column)
    }

    fn assign(&mut self, column: &Column, value: Value) -> TabulaResult<()> {
        check_target(&self.table, column)?;
        if self.contains(column) {
            return Err(TabulaError::duplicate_assignment(format!(
                "{column:?} assigned twice"
            )));
        }
        let value = column.column_type().validate(&value)?;
        self.entries.push((column.clone(), value));
        Ok(())
    }

    /// Assigned entries followed by declared defaults of unset columns.
    fn with_defaults(&self) -> Vec<(Column, Value)> {
        let mut entries = self.entries.clone();
        for column in self.table.columns() {
            if let Some(default) = column.default_value() {
                if !self.contains(column) {
                    entries.push((column.clone(), default.clone()));
                }
            }
        }
        entries
    }
}

fn render_values(
    builder: &mut QueryBuilder<'_>,
    entries: &[(Column, Value)],
) -> TabulaResult<(Vec<Column>, Vec<String>)> {
    let mut columns = Vec::with_capacity(entries.len());
    let mut values = Vec::with_capacity(entries.len());
    for (column, value) in entries {
        values.push(builder.bind_value(column.column_type(), value)?);
        columns.push(column.clone());
    }
    Ok((columns, values))
}

#[derive(Clone, Debug)]
pub struct InsertStatement {
    values: Assignments,
    executed: bool,
    generated: Vec<Vec<Value>>,
}

impl InsertStatement {
    pub fn new(table: &Table) -> Self {
        Self {
            values: Assignments::new(table),
            executed: false,
            generated: Vec::new(),
        }
    }

    pub fn table(&self) -> &Table {
        &self.values.table
    }

    pub fn set(&mut self, column: &Column, value: impl Into<Value>) -> TabulaResult<&mut Self> {
        self.values.assign(column, value.into())?;
        Ok(self)
    }

    /// Columns whose values the database generates for this insert.
    pub fn key_columns(&self) -> Vec<Column> {
        self.table()
            .auto_increment_column()
            .filter(|column| !self.values.contains(column))
            .cloned()
            .into_iter()
            .collect()
    }

    pub fn to_sql(&self, builder: &mut QueryBuilder<'_>) -> TabulaResult<String> {
        let dialect = builder.dialect();
        let table = dialect.quote_identifier(self.table().name());
        let entries = self.values.with_defaults();
        let mut sql = if entries.is_empty() {
            format!("INSERT INTO {table} {}", dialect.default_values_clause())
        } else {
            let (columns, values) = render_values(builder, &entries)?;
            let names: Vec<String> = columns
                .iter()
                .map(|column| dialect.quote_identifier(column.name()))
                .collect();
            format!(
                "INSERT INTO {table} ({}) VALUES ({})",
                names.join(", "),
                values.join(", ")
            )
        };
        let keys = self.key_columns();
        if !keys.is_empty() && dialect.returns_generated_keys_inline() {
            let names: Vec<String> = keys
                .iter()
                .map(|column| dialect.quote_identifier(column.name()))
                .collect();
            sql.push_str(&format!(" RETURNING {}", names.join(", ")));
        }
        Ok(sql)
    }

    pub async fn execute(&mut self, session: &mut Session) -> TabulaResult<u64> {
        let (sql, args) = {
            let mut builder = QueryBuilder::new(session.dialect());
            let sql = self.to_sql(&mut builder)?;
            (sql, builder.into_args())
        };
        mark_executed(&mut self.executed, &self.values.table)?;
        let (count, keys) = session.run_update(&sql, args, &self.key_columns()).await?;
        self.generated = keys;
        Ok(count)
    }

    pub fn generated_keys(&self) -> TabulaResult<&[Vec<Value>]> {
        if !self.executed {
            return Err(TabulaError::no_generated_key(format!(
                "insert into {} has not been executed",
                self.table().name()
            )));
        }
        if self.generated.is_empty() {
            return Err(TabulaError::no_generated_key(format!(
                "no key generated for {}",
                self.table().name()
            )));
        }
        Ok(&self.generated)
    }

    /// The auto-increment key of the inserted row.
    pub fn generated_key(&self) -> TabulaResult<i64> {
        let keys = self.generated_keys()?;
        match keys.first().and_then(|row| row.first()) {
            Some(Value::Int(id)) => Ok(*id),
            other => Err(TabulaError::no_generated_key(format!(
                "unexpected generated key {other:?}"
            ))),
        }
    }
}

#[derive(Clone, Debug)]
enum Assigned {
    Value(Value),
    Expr(Expr),
}

#[derive(Clone, Debug)]
pub struct UpdateStatement {
    table: Table,
    assignments: Vec<(Column, Assigned)>,
    condition: Option<Expr>,
    limit: Option<u64>,
    executed: bool,
}

impl UpdateStatement {
    pub fn new(table: &Table) -> Self {
        Self {
            table: table.clone(),
            assignments: Vec::new(),
            condition: None,
            limit: None,
            executed: false,
        }
    }

    fn assign(&mut self, column: &Column, assigned: Assigned) -> TabulaResult<&mut Self> {
        check_target(&self.table, column)?;
        if self.assignments.iter().any(|(assigned, _)| assigned == column) {
            return Err(TabulaError::duplicate_assignment(format!(
                "{column:?} assigned twice"
            )));
        }
        self.assignments.push((column.clone(), assigned));
        Ok(self)
    }

    pub fn set(&mut self, column: &Column, value: impl Into<Value>) -> TabulaResult<&mut Self> {
        let value = column.column_type().validate(&value.into())?;
        self.assign(column, Assigned::Value(value))
    }

    /// Assigns a computed expression, e.g. `balance = balance + 1`.
    pub fn set_expr(&mut self, column: &Column, expr: Expr) -> TabulaResult<&mut Self> {
        check_predicate(&self.table, &expr)?;
        self.assign(column, Assigned::Expr(expr))
    }

    pub fn filter(&mut self, condition: Expr) -> TabulaResult<&mut Self> {
        check_predicate(&self.table, &condition)?;
        self.condition = Some(match self.condition.take() {
            Some(existing) => existing.and(condition),
            None => condition,
        });
        Ok(self)
    }

    pub fn limit(&mut self, limit: u64) -> &mut Self {
        self.limit = Some(limit);
        self
    }

    pub fn to_sql(&self, builder: &mut QueryBuilder<'_>) -> TabulaResult<String> {
        if self.assignments.is_empty() {
            return Err(TabulaError::invalid(format!(
                "update of {} assigns nothing",
                self.table.name()
            )));
        }
        let dialect = builder.dialect();
        let mut sets = Vec::with_capacity(self.assignments.len());
        for (column, assigned) in &self.assignments {
            let rendered = match assigned {
                Assigned::Value(value) => builder.bind_value(column.column_type(), value)?,
                Assigned::Expr(expr) => expr.to_sql(builder)?,
            };
            sets.push(format!("{} = {rendered}", dialect.quote_identifier(column.name())));
        }
        let mut sql = format!(
            "UPDATE {} SET {}",
            dialect.quote_identifier(self.table.name()),
            sets.join(", ")
        );
        if let Some(condition) = &self.condition {
            sql.push_str(" WHERE ");
            sql.push_str(&condition.to_sql(builder)?);
        }
        if let Some(limit) = self.limit {
            if !dialect.supports_update_limit() {
                return Err(TabulaError::unsupported(format!(
                    "{} does not support UPDATE ... LIMIT",
                    dialect.name()
                )));
            }
            sql.push_str(&format!(" LIMIT {limit}"));
        }
        Ok(sql)
    }

    pub async fn execute(&mut self, session: &mut Session) -> TabulaResult<u64> {
        let (sql, args) = {
            let mut builder = QueryBuilder::new(session.dialect());
            let sql = self.to_sql(&mut builder)?;
            (sql, builder.into_args())
        };
        mark_executed(&mut self.executed, &self.table)?;
        Ok(session.run_update(&sql, args, &[]).await?.0)
    }
}

#[derive(Clone, Debug)]
pub struct DeleteStatement {
    table: Table,
    condition: Option<Expr>,
    executed: bool,
}

impl DeleteStatement {
    pub fn new(table: &Table) -> Self {
        Self {
            table: table.clone(),
            condition: None,
            executed: false,
        }
    }

    pub fn filter(&mut self, condition: Expr) -> TabulaResult<&mut Self> {
        check_predicate(&self.table, &condition)?;
        self.condition = Some(match self.condition.take() {
            Some(existing) => existing.and(condition),
            None => condition,
        });
        Ok(self)
    }

    /// Without a predicate every row of the table is deleted.
    pub fn to_sql(&self, builder: &mut QueryBuilder<'_>) -> TabulaResult<String> {
        let mut sql = format!("DELETE FROM {}", builder.identity(self.table.name()));
        if let Some(condition) = &self.condition {
            sql.push_str(" WHERE ");
            sql.push_str(&condition.to_sql(builder)?);
        }
        Ok(sql)
    }

    pub async fn execute(&mut self, session: &mut Session) -> TabulaResult<u64> {
        let (sql, args) = {
            let mut builder = QueryBuilder::new(session.dialect());
            let sql = self.to_sql(&mut builder)?;
            (sql, builder.into_args())
        };
        mark_executed(&mut self.executed, &self.table)?;
        Ok(session.run_update(&sql, args, &[]).await?.0)
    }
}

/// One `UPDATE ... WHERE <keys>` template executed for many rows. Every row
/// must set the same columns.
#[derive(Clone, Debug)]
pub struct BatchUpdateStatement {
    table: Table,
    keys: Vec<Column>,
    rows: Vec<Vec<(Column, Value)>>,
    executed: bool,
}

impl BatchUpdateStatement {
    pub fn new(table: &Table, keys: &[Column]) -> TabulaResult<Self> {
        if keys.is_empty() {
            return Err(TabulaError::invalid(format!(
                "batch update of {} needs key columns",
                table.name()
            )));
        }
        for key in keys {
            check_target(table, key)?;
        }
        Ok(Self {
            table: table.clone(),
            keys: keys.to_vec(),
            rows: Vec::new(),
            executed: false,
        })
    }

    pub fn table(&self) -> &Table {
        &self.table
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Adds one row of values, key columns included.
    pub fn add_row(&mut self, values: Vec<(Column, Value)>) -> TabulaResult<&mut Self> {
        let mut row = Assignments::new(&self.table);
        for (column, value) in values {
            row.assign(&column, value)?;
        }
        self.rows.push(row.entries);
        Ok(self)
    }

    fn column_set(row: &[(Column, Value)]) -> HashSet<&Column> {
        row.iter().map(|(column, _)| column).collect()
    }

    /// The SQL template and one argument list per row. Fails before anything
    /// is rendered when rows disagree on their columns.
    pub fn to_sql(&self, builder: &mut QueryBuilder<'_>) -> TabulaResult<(String, Vec<Vec<Argument>>)> {
        let Some(first) = self.rows.first() else {
            return Err(TabulaError::invalid(format!(
                "batch update of {} has no rows",
                self.table.name()
            )));
        };
        let expected = Self::column_set(first);
        for key in &self.keys {
            if !expected.contains(key) {
                return Err(TabulaError::batch_inconsistent(format!(
                    "key {key:?} missing from batch row"
                )));
            }
        }
        if let Some(index) = self
            .rows
            .iter()
            .position(|row| Self::column_set(row) != expected)
        {
            return Err(TabulaError::batch_inconsistent(format!(
                "row {index} of batch on {} sets different columns than row 0",
                self.table.name()
            )));
        }
        let set_columns: Vec<Column> = first
            .iter()
            .map(|(column, _)| column.clone())
            .filter(|column| !self.keys.contains(column))
            .collect();
        if set_columns.is_empty() {
            return Err(TabulaError::invalid(format!(
                "batch update of {} only sets key columns",
                self.table.name()
            )));
        }
        let dialect = builder.dialect();
        let mut position = 0;
        let mut next = || {
            position += 1;
            dialect.placeholder(position)
        };
        let sets: Vec<String> = set_columns
            .iter()
            .map(|column| format!("{} = {}", dialect.quote_identifier(column.name()), next()))
            .collect();
        let conditions: Vec<String> = self
            .keys
            .iter()
            .map(|key| format!("{} = {}", dialect.quote_identifier(key.name()), next()))
            .collect();
        let sql = format!(
            "UPDATE {} SET {} WHERE {}",
            dialect.quote_identifier(self.table.name()),
            sets.join(", "),
            conditions.join(" AND ")
        );
        let ordered: Vec<&Column> = set_columns.iter().chain(self.keys.iter()).collect();
        let batch = self
            .rows
            .iter()
            .map(|row| {
                ordered
                    .iter()
                    .map(|column| {
                        let value = row
                            .iter()
                            .find(|(assigned, _)| assigned == *column)
                            .map(|(_, value)| value.clone())
                            .unwrap_or(Value::Null);
                        Argument::new(column.column_type().clone(), value)
                    })
                    .collect()
            })
            .collect();
        Ok((sql, batch))
    }

    /// Affected row counts, one per batch row.
    pub async fn execute(&mut self, session: &mut Session) -> TabulaResult<Vec<u64>> {
        let (sql, batch) = {
            let mut builder = QueryBuilder::new(session.dialect());
            self.to_sql(&mut builder)?
        };
        mark_executed(&mut self.executed, &self.table)?;
        Ok(session.run_batch(&sql, batch, &[]).await?.0)
    }
}

/// Rows to update grouped by the columns they set; one batch statement per
/// group.
#[derive(Clone, Debug)]
pub struct BatchUpdate {
    table: Table,
    keys: Vec<Column>,
    groups: Vec<(BTreeSet<String>, BatchUpdateStatement)>,
}

impl BatchUpdate {
    pub fn new(table: &Table, keys: &[Column]) -> TabulaResult<Self> {
        BatchUpdateStatement::new(table, keys)?;
        Ok(Self {
            table: table.clone(),
            keys: keys.to_vec(),
            groups: Vec::new(),
        })
    }

    pub fn add(&mut self, values: Vec<(Column, Value)>) -> TabulaResult<&mut Self> {
        let signature: BTreeSet<String> = values
            .iter()
            .map(|(column, _)| column.name().to_string())
            .collect();
        match self.groups.iter_mut().find(|(existing, _)| *existing == signature) {
            Some((_, statement)) => {
                statement.add_row(values)?;
            }
            None => {
                let mut statement = BatchUpdateStatement::new(&self.table, &self.keys)?;
                statement.add_row(values)?;
                self.groups.push((signature, statement));
            }
        }
        Ok(self)
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Total affected rows. Every group is rendered before the first one
    /// runs, so an inconsistent group leaves the table untouched.
    pub async fn execute(self, session: &mut Session) -> TabulaResult<u64> {
        {
            let mut builder = QueryBuilder::new(session.dialect());
            for (_, statement) in &self.groups {
                statement.to_sql(&mut builder)?;
            }
        }
        let mut total = 0;
        for (_, mut statement) in self.groups {
            total += statement.execute(session).await?.iter().sum::<u64>();
        }
        Ok(total)
    }
}

#[derive(Clone, Debug)]
pub struct InsertSelectStatement {
    table: Table,
    columns: Vec<Column>,
    select: Select,
    executed: bool,
}

impl InsertSelectStatement {
    pub fn new(table: &Table, columns: &[Column], select: Select) -> TabulaResult<Self> {
        for column in columns {
            check_target(table, column)?;
        }
        if columns.len() != select.fields().len() {
            return Err(TabulaError::invalid(format!(
                "{} target columns for {} selected fields",
                columns.len(),
                select.fields().len()
            )));
        }
        Ok(Self {
            table: table.clone(),
            columns: columns.to_vec(),
            select,
            executed: false,
        })
    }

    pub fn to_sql(&self, builder: &mut QueryBuilder<'_>) -> TabulaResult<String> {
        let names: Vec<String> = self
            .columns
            .iter()
            .map(|column| builder.identity(column.name()))
            .collect();
        Ok(format!(
            "INSERT INTO {} ({}) {}",
            builder.identity(self.table.name()),
            names.join(", "),
            self.select.to_sql(builder)?
        ))
    }

    pub async fn execute(&mut self, session: &mut Session) -> TabulaResult<u64> {
        let (sql, args) = {
            let mut builder = QueryBuilder::new(session.dialect());
            let sql = self.to_sql(&mut builder)?;
            (sql, builder.into_args())
        };
        mark_executed(&mut self.executed, &self.table)?;
        Ok(session.run_update(&sql, args, &[]).await?.0)
    }
}

/// Insert-or-update of one row keyed on the primary key, in the syntax of the
/// session's dialect.
#[derive(Clone, Debug)]
pub struct ReplaceStatement {
    values: Assignments,
    executed: bool,
}

impl ReplaceStatement {
    pub fn new(table: &Table) -> Self {
        Self {
            values: Assignments::new(table),
            executed: false,
        }
    }

    pub fn set(&mut self, column: &Column, value: impl Into<Value>) -> TabulaResult<&mut Self> {
        self.values.assign(column, value.into())?;
        Ok(self)
    }

    pub fn to_sql(&self, builder: &mut QueryBuilder<'_>) -> TabulaResult<String> {
        let table = &self.values.table;
        if let Some(missing) = table
            .primary_keys()
            .iter()
            .find(|key| !self.values.contains(key))
        {
            return Err(TabulaError::invalid(format!(
                "replace into {} without key {missing:?}",
                table.name()
            )));
        }
        let (columns, values) = render_values(builder, &self.values.with_defaults())?;
        builder.dialect().replace_sql(table, &columns, &values)
    }

    pub async fn execute(&mut self, session: &mut Session) -> TabulaResult<u64> {
        let (sql, args) = {
            let mut builder = QueryBuilder::new(session.dialect());
            let sql = self.to_sql(&mut builder)?;
            (sql, builder.into_args())
        };
        mark_executed(&mut self.executed, &self.values.table)?;
        Ok(session.run_update(&sql, args, &[]).await?.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tabula_core::{MysqlDialect, PostgresDialect, SqliteDialect};

    struct Schema {
        cities: Table,
        users: Table,
        city_id: Column,
        city_name: Column,
        user_id: Column,
        user_name: Column,
        user_city: Column,
    }

    fn schema() -> Schema {
        let mut cities = Table::builder("cities");
        let city_id = cities.integer("id").auto_increment().primary_key().column();
        let city_name = cities.varchar("name", 50).column();
        let cities = cities.build().unwrap();
        let mut users = Table::builder("users");
        let user_id = users.varchar("id", 10).primary_key().column();
        let user_name = users.varchar("name", 50).column();
        let user_city = users.reference("city_id", &city_id).nullable().column();
        let users = users.build().unwrap();
        Schema {
            cities,
            users,
            city_id,
            city_name,
            user_id,
            user_name,
            user_city,
        }
    }

    #[test]
    fn insert_renders_columns_in_assignment_order() {
        let s = schema();
        let mut insert = InsertStatement::new(&s.users);
        insert
            .set(&s.user_name, "Andrey")
            .unwrap()
            .set(&s.user_id, "andrey")
            .unwrap()
            .set(&s.user_city, None::<i64>)
            .unwrap();
        let dialect = SqliteDialect;
        let mut builder = QueryBuilder::new(&dialect);
        assert_eq!(
            insert.to_sql(&mut builder).unwrap(),
            "INSERT INTO users (name, id, city_id) VALUES (?, ?, ?)"
        );
        assert_eq!(builder.args().len(), 3);
        assert!(insert.key_columns().is_empty());
    }

    #[test]
    fn insert_rejects_bad_assignments() {
        let s = schema();
        let mut insert = InsertStatement::new(&s.cities);
        insert.set(&s.city_name, "Munich").unwrap();
        let err = insert.set(&s.city_name, "Prague").unwrap_err();
        assert!(matches!(err, TabulaError::DuplicateAssignment { .. }));
        let err = insert.set(&s.user_name, "x").unwrap_err();
        assert!(matches!(err, TabulaError::NoTargetTable { .. }));
        let err = InsertStatement::new(&s.users)
            .set(&s.user_name, Value::Null)
            .unwrap_err();
        assert!(matches!(err, TabulaError::TypeMismatch { .. }));
        let err = insert.generated_key().unwrap_err();
        assert!(matches!(err, TabulaError::NoGeneratedKey { .. }));
    }

    #[test]
    fn postgres_insert_returns_generated_keys() {
        let s = schema();
        let mut insert = InsertStatement::new(&s.cities);
        insert.set(&s.city_name, "Prague").unwrap();
        let dialect = PostgresDialect;
        let mut builder = QueryBuilder::new(&dialect);
        assert_eq!(
            insert.to_sql(&mut builder).unwrap(),
            "INSERT INTO cities (name) VALUES ($1) RETURNING id"
        );
        assert_eq!(insert.key_columns(), vec![s.city_id.clone()]);
        let empty = InsertStatement::new(&s.cities);
        let mut builder = QueryBuilder::new(&MysqlDialect);
        assert_eq!(
            empty.to_sql(&mut builder).unwrap(),
            "INSERT INTO cities () VALUES ()"
        );
    }

    #[test]
    fn update_checks_targets_and_limits() {
        let s = schema();
        let mut update = UpdateStatement::new(&s.users);
        update
            .set(&s.user_name, "Sergey")
            .unwrap()
            .filter(s.user_id.eq("sergey").unwrap())
            .unwrap();
        let err = update.filter(s.city_name.eq("Munich").unwrap()).unwrap_err();
        assert!(matches!(err, TabulaError::NoTargetTable { .. }));
        let dialect = SqliteDialect;
        let mut builder = QueryBuilder::new(&dialect);
        assert_eq!(
            update.to_sql(&mut builder).unwrap(),
            "UPDATE users SET name = ? WHERE users.id = ?"
        );
        update.limit(1);
        let mut builder = QueryBuilder::new(&dialect);
        let err = update.to_sql(&mut builder).unwrap_err();
        assert!(matches!(err, TabulaError::Unsupported { .. }));
        let mut builder = QueryBuilder::new(&MysqlDialect);
        assert!(update.to_sql(&mut builder).unwrap().ends_with("LIMIT 1"));
    }

    #[test]
    fn delete_without_predicate_targets_all_rows() {
        let s = schema();
        let delete = DeleteStatement::new(&s.users);
        let dialect = SqliteDialect;
        let mut builder = QueryBuilder::new(&dialect);
        assert_eq!(delete.to_sql(&mut builder).unwrap(), "DELETE FROM users");
    }

    #[test]
    fn batch_rows_must_share_columns() {
        let s = schema();
        let mut batch = BatchUpdateStatement::new(&s.users, &[s.user_id.clone()]).unwrap();
        batch
            .add_row(vec![
                (s.user_id.clone(), "andrey".into()),
                (s.user_name.clone(), "Andrew".into()),
            ])
            .unwrap()
            .add_row(vec![
                (s.user_name.clone(), "Serge".into()),
                (s.user_id.clone(), "sergey".into()),
            ])
            .unwrap();
        let dialect = PostgresDialect;
        let mut builder = QueryBuilder::new(&dialect);
        let (sql, rows) = batch.to_sql(&mut builder).unwrap();
        assert_eq!(sql, "UPDATE users SET name = $1 WHERE id = $2");
        assert_eq!(rows[1][0].value, Value::from("Serge"));
        assert_eq!(rows[1][1].value, Value::from("sergey"));

        batch
            .add_row(vec![
                (s.user_id.clone(), "eugene".into()),
                (s.user_city.clone(), Value::Int(2)),
            ])
            .unwrap();
        let mut builder = QueryBuilder::new(&dialect);
        let err = batch.to_sql(&mut builder).unwrap_err();
        assert!(matches!(err, TabulaError::BatchDataInconsistent { .. }));
    }

    #[test]
    fn batch_update_groups_by_column_set() {
        let s = schema();
        let mut update = BatchUpdate::new(&s.users, &[s.user_id.clone()]).unwrap();
        update
            .add(vec![
                (s.user_id.clone(), "andrey".into()),
                (s.user_name.clone(), "A".into()),
            ])
            .unwrap()
            .add(vec![
                (s.user_id.clone(), "alex".into()),
                (s.user_city.clone(), Value::Int(3)),
            ])
            .unwrap()
            .add(vec![
                (s.user_name.clone(), "S".into()),
                (s.user_id.clone(), "sergey".into()),
            ])
            .unwrap();
        assert_eq!(update.group_count(), 2);
    }

    #[test]
    fn insert_select_needs_matching_arity() {
        let s = schema();
        let select = s.cities.slice([&s.city_name]).select_all();
        let err = InsertSelectStatement::new(
            &s.users,
            &[s.user_id.clone(), s.user_name.clone()],
            select.clone(),
        )
        .unwrap_err();
        assert!(matches!(err, TabulaError::Invalid { .. }));
        let statement = InsertSelectStatement::new(&s.users, &[s.user_name.clone()], select).unwrap();
        let dialect = SqliteDialect;
        let mut builder = QueryBuilder::new(&dialect);
        assert_eq!(
            statement.to_sql(&mut builder).unwrap(),
            "INSERT INTO users (name) SELECT cities.name FROM cities"
        );
    }

    #[test]
    fn replace_requires_primary_key() {
        let s = schema();
        let mut replace = ReplaceStatement::new(&s.users);
        replace.set(&s.user_name, "Alex").unwrap();
        let dialect = SqliteDialect;
        let mut builder = QueryBuilder::new(&dialect);
        assert!(replace.to_sql(&mut builder).is_err());
        replace.set(&s.user_id, "alex").unwrap();
        let mut builder = QueryBuilder::new(&dialect);
        assert_eq!(
            replace.to_sql(&mut builder).unwrap(),
            "INSERT OR REPLACE INTO users (name, id) VALUES (?, ?)"
        );
    }
}
