use std::collections::HashSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::{ColumnKind, ColumnType, Dialect, SqlEnum, TabulaError, TabulaResult, Value};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ReferenceOption {
    Cascade,
    SetNull,
    Restrict,
    NoAction,
}

impl fmt::Display for ReferenceOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ReferenceOption::Cascade => "CASCADE",
            ReferenceOption::SetNull => "SET NULL",
            ReferenceOption::Restrict => "RESTRICT",
            ReferenceOption::NoAction => "NO ACTION",
        };
        f.write_str(text)
    }
}

#[derive(Clone)]
struct ColumnData {
    table: String,
    name: String,
    column_type: ColumnType,
    referee: Option<Column>,
    default: Option<Value>,
    on_delete: Option<ReferenceOption>,
}

/// Shared handle to a declared column. Two handles are equal when they name
/// the same column of the same table.
#[derive(Clone)]
pub struct Column(Arc<ColumnData>);

impl Column {
    fn new(table: &str, name: &str, column_type: ColumnType) -> Self {
        Column(Arc::new(ColumnData {
            table: table.to_string(),
            name: name.to_string(),
            column_type,
            referee: None,
            default: None,
            on_delete: None,
        }))
    }

    fn with(&self, change: impl FnOnce(&mut ColumnData)) -> Self {
        let mut data = (*self.0).clone();
        change(&mut data);
        Column(Arc::new(data))
    }

    pub fn table_name(&self) -> &str {
        &self.0.table
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn column_type(&self) -> &ColumnType {
        &self.0.column_type
    }

    pub fn is_nullable(&self) -> bool {
        self.0.column_type.is_nullable()
    }

    /// The column this one is a foreign key to.
    pub fn referee(&self) -> Option<&Column> {
        self.0.referee.as_ref()
    }

    pub fn default_value(&self) -> Option<&Value> {
        self.0.default.as_ref()
    }

    pub fn on_delete(&self) -> Option<ReferenceOption> {
        self.0.on_delete
    }

    /// Same column accepting null; keeps the reference link and default.
    pub fn nullable(&self) -> Self {
        self.with(|data| data.column_type = data.column_type.nullable())
    }
}

impl PartialEq for Column {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
            || (self.0.table == other.0.table && self.0.name == other.0.name)
    }
}

impl Eq for Column {}

impl Hash for Column {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.table.hash(state);
        self.0.name.hash(state);
    }
}

impl fmt::Debug for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.0.table, self.0.name)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Index {
    name: String,
    table: String,
    columns: Vec<String>,
    unique: bool,
}

impl Index {
    fn new(table: &str, columns: Vec<String>, unique: bool) -> Self {
        let mut name = format!("{table}_{}", columns.join("_"));
        if unique {
            name.push_str("_unique");
        }
        Self {
            name,
            table: table.to_string(),
            columns,
            unique,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn is_unique(&self) -> bool {
        self.unique
    }

    pub fn create_statement(&self, dialect: &dyn Dialect) -> String {
        let columns: Vec<String> = self
            .columns
            .iter()
            .map(|column| dialect.quote_identifier(column))
            .collect();
        format!(
            "CREATE {}INDEX {}{} ON {} ({})",
            if self.unique { "UNIQUE " } else { "" },
            if dialect.supports_create_index_if_not_exists() {
                "IF NOT EXISTS "
            } else {
                ""
            },
            dialect.quote_identifier(&self.name),
            dialect.quote_identifier(&self.table),
            columns.join(", ")
        )
    }
}

struct TableData {
    name: String,
    columns: Vec<Column>,
    primary_keys: Vec<Column>,
    indices: Vec<Index>,
}

/// Declared table. Tables are equal when their names are.
#[derive(Clone)]
pub struct Table(Arc<TableData>);

impl Table {
    pub fn builder(name: impl Into<String>) -> TableBuilder {
        TableBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn columns(&self) -> &[Column] {
        &self.0.columns
    }

    pub fn primary_keys(&self) -> &[Column] {
        &self.0.primary_keys
    }

    pub fn indices(&self) -> &[Index] {
        &self.0.indices
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.0.columns.iter().find(|column| column.name() == name)
    }

    pub fn contains(&self, column: &Column) -> bool {
        column.table_name() == self.name()
    }

    /// The first primary key, which identifies rows of this table.
    pub fn id_column(&self) -> TabulaResult<&Column> {
        self.0.primary_keys.first().ok_or_else(|| {
            TabulaError::invalid(format!("table {} declares no primary key", self.name()))
        })
    }

    pub fn auto_increment_column(&self) -> Option<&Column> {
        self.0
            .columns
            .iter()
            .find(|column| column.column_type().is_autoincrement())
    }

    pub fn create_statements(&self, dialect: &dyn Dialect) -> TabulaResult<Vec<String>> {
        let auto_increment = self.auto_increment_column();
        let inline_key = dialect.inline_auto_increment_key() && auto_increment.is_some();
        if inline_key
            && (self.primary_keys().len() != 1 || self.primary_keys().first() != auto_increment)
        {
            return Err(TabulaError::unsupported(format!(
                "{}: auto-increment column of {} must be its only primary key",
                dialect.name(),
                self.name()
            )));
        }
        let mut parts = Vec::new();
        for column in self.columns() {
            parts.push(column_definition(dialect, column)?);
        }
        if !self.primary_keys().is_empty() && !inline_key {
            let keys: Vec<String> = self
                .primary_keys()
                .iter()
                .map(|column| dialect.quote_identifier(column.name()))
                .collect();
            parts.push(format!("PRIMARY KEY ({})", keys.join(", ")));
        }
        for column in self.columns() {
            let Some(referee) = column.referee() else {
                continue;
            };
            let mut constraint = format!(
                "FOREIGN KEY ({}) REFERENCES {} ({})",
                dialect.quote_identifier(column.name()),
                dialect.quote_identifier(referee.table_name()),
                dialect.quote_identifier(referee.name())
            );
            if let Some(option) = column.on_delete() {
                constraint.push_str(&format!(" ON DELETE {option}"));
            }
            parts.push(constraint);
        }
        let mut statements = vec![format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            dialect.quote_identifier(self.name()),
            parts.join(", ")
        )];
        statements.extend(
            self.indices()
                .iter()
                .map(|index| index.create_statement(dialect)),
        );
        Ok(statements)
    }

    pub fn drop_statement(&self, dialect: &dyn Dialect) -> String {
        format!("DROP TABLE IF EXISTS {}", dialect.quote_identifier(self.name()))
    }
}

fn column_definition(dialect: &dyn Dialect, column: &Column) -> TabulaResult<String> {
    let column_type = column.column_type();
    let mut sql = format!(
        "{} {}",
        dialect.quote_identifier(column.name()),
        dialect.column_sql_type(column_type)
    );
    if column_type.is_autoincrement() {
        if let Some(suffix) = dialect.auto_increment_suffix() {
            sql.push(' ');
            sql.push_str(suffix);
        }
    }
    if !column_type.is_nullable() {
        sql.push_str(" NOT NULL");
    }
    if let Some(default) = column.default_value() {
        sql.push_str(" DEFAULT ");
        sql.push_str(&column_type.render_literal(default)?);
    }
    Ok(sql)
}

impl PartialEq for Table {
    fn eq(&self, other: &Self) -> bool {
        self.0.name == other.0.name
    }
}

impl Eq for Table {}

impl Hash for Table {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.name.hash(state);
    }
}

impl fmt::Debug for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Table({})", self.0.name)
    }
}

pub struct TableBuilder {
    name: String,
    columns: Vec<Column>,
    primary_keys: Vec<usize>,
    indices: Vec<(Vec<String>, bool)>,
    errors: Vec<TabulaError>,
}

impl TableBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            primary_keys: Vec::new(),
            indices: Vec::new(),
            errors: Vec::new(),
        }
    }

    pub fn column(&mut self, name: &str, column_type: ColumnType) -> ColumnDef<'_> {
        let column = Column::new(&self.name, name, column_type);
        self.columns.push(column);
        let position = self.columns.len() - 1;
        ColumnDef {
            builder: self,
            position,
        }
    }

    pub fn integer(&mut self, name: &str) -> ColumnDef<'_> {
        self.column(name, ColumnType::integer())
    }

    pub fn long(&mut self, name: &str) -> ColumnDef<'_> {
        self.column(name, ColumnType::long())
    }

    pub fn char(&mut self, name: &str) -> ColumnDef<'_> {
        self.column(name, ColumnType::new(ColumnKind::Char))
    }

    pub fn varchar(&mut self, name: &str, length: u32) -> ColumnDef<'_> {
        self.column(name, ColumnType::varchar(length))
    }

    pub fn varchar_collate(&mut self, name: &str, length: u32, collate: &str) -> ColumnDef<'_> {
        self.column(
            name,
            ColumnType::new(ColumnKind::Varchar {
                length,
                collate: Some(collate.to_string()),
            }),
        )
    }

    pub fn text(&mut self, name: &str) -> ColumnDef<'_> {
        self.column(name, ColumnType::text())
    }

    pub fn decimal(&mut self, name: &str, precision: u32, scale: u32) -> ColumnDef<'_> {
        self.column(name, ColumnType::decimal(precision, scale))
    }

    pub fn date(&mut self, name: &str) -> ColumnDef<'_> {
        self.column(name, ColumnType::new(ColumnKind::Date))
    }

    pub fn date_time(&mut self, name: &str) -> ColumnDef<'_> {
        self.column(name, ColumnType::new(ColumnKind::DateTime))
    }

    pub fn boolean(&mut self, name: &str) -> ColumnDef<'_> {
        self.column(name, ColumnType::boolean())
    }

    pub fn blob(&mut self, name: &str) -> ColumnDef<'_> {
        self.column(name, ColumnType::new(ColumnKind::Blob))
    }

    pub fn enumeration<E: SqlEnum>(&mut self, name: &str) -> ColumnDef<'_> {
        self.column(
            name,
            ColumnType::new(ColumnKind::Enumeration {
                variants: E::VARIANTS.len(),
            }),
        )
    }

    /// Integer column holding the id of a row of `target`'s table.
    pub fn reference(&mut self, name: &str, target: &Column) -> ColumnDef<'_> {
        let kind = ColumnKind::EntityId {
            table: target.table_name().to_string(),
        };
        self.column(name, ColumnType::new(kind)).references(target)
    }

    pub fn index(&mut self, unique: bool, columns: &[&Column]) -> &mut Self {
        if let Some(foreign) = columns.iter().find(|column| column.table_name() != self.name) {
            self.errors.push(TabulaError::invalid(format!(
                "cannot index {foreign:?} on table {}",
                self.name
            )));
            return self;
        }
        let names = columns
            .iter()
            .map(|column| column.name().to_string())
            .collect();
        self.indices.push((names, unique));
        self
    }

    pub fn build(self) -> TabulaResult<Table> {
        if let Some(err) = self.errors.into_iter().next() {
            return Err(err);
        }
        let mut seen = HashSet::new();
        for column in &self.columns {
            if !seen.insert(column.name()) {
                return Err(TabulaError::invalid(format!(
                    "column {} declared twice in {}",
                    column.name(),
                    self.name
                )));
            }
            check_column(column)?;
        }
        let auto_increments = self
            .columns
            .iter()
            .filter(|column| column.column_type().is_autoincrement())
            .count();
        if auto_increments > 1 {
            return Err(TabulaError::invalid(format!(
                "table {} declares {auto_increments} auto-increment columns",
                self.name
            )));
        }
        let mut indices = Vec::new();
        for (names, unique) in self.indices {
            if let Some(missing) = names.iter().find(|name| !seen.contains(name.as_str())) {
                return Err(TabulaError::invalid(format!(
                    "index on {} names unknown column {missing}",
                    self.name
                )));
            }
            indices.push(Index::new(&self.name, names, unique));
        }
        let primary_keys = self
            .primary_keys
            .iter()
            .map(|position| self.columns[*position].clone())
            .collect();
        Ok(Table(Arc::new(TableData {
            name: self.name,
            columns: self.columns,
            primary_keys,
            indices,
        })))
    }
}

fn check_column(column: &Column) -> TabulaResult<()> {
    if let Some(default) = column.default_value() {
        column.column_type().validate(default)?;
    }
    if let Some(referee) = column.referee() {
        let own = column.column_type().kind();
        let target = referee.column_type().kind();
        let compatible = (own.is_integral() && target.is_integral())
            || (own.is_textual() && target.is_textual())
            || own == target;
        if !compatible {
            return Err(TabulaError::type_mismatch(format!(
                "{column:?} of kind {own:?} cannot reference {referee:?} of kind {target:?}"
            )));
        }
    }
    Ok(())
}

pub struct ColumnDef<'a> {
    builder: &'a mut TableBuilder,
    position: usize,
}

impl ColumnDef<'_> {
    fn update(self, change: impl FnOnce(&mut ColumnData)) -> Self {
        let column = &mut self.builder.columns[self.position];
        *column = column.with(change);
        self
    }

    pub fn primary_key(self) -> Self {
        if !self.builder.primary_keys.contains(&self.position) {
            self.builder.primary_keys.push(self.position);
        }
        self
    }

    pub fn auto_increment(self) -> Self {
        let current = self.builder.columns[self.position].column_type().clone();
        match current.auto_increment() {
            Ok(column_type) => self.update(|data| data.column_type = column_type),
            Err(err) => {
                self.builder.errors.push(err);
                self
            }
        }
    }

    pub fn nullable(self) -> Self {
        self.update(|data| data.column_type = data.column_type.nullable())
    }

    pub fn references(self, target: &Column) -> Self {
        let target = target.clone();
        self.update(|data| data.referee = Some(target))
    }

    pub fn references_on_delete(self, target: &Column, option: ReferenceOption) -> Self {
        self.references(target)
            .update(|data| data.on_delete = Some(option))
    }

    pub fn default(self, value: impl Into<Value>) -> Self {
        let value = value.into();
        self.update(|data| data.default = Some(value))
    }

    pub fn index(self, unique: bool) -> Self {
        let name = self.builder.columns[self.position].name().to_string();
        self.builder.indices.push((vec![name], unique));
        self
    }

    /// Finishes the declaration and hands back the column.
    pub fn column(self) -> Column {
        self.builder.columns[self.position].clone()
    }
}
