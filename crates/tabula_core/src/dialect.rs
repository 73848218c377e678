//! Vendor policy: identifier quoting, placeholders, column types and the few
//! statements whose syntax differs between backends.

use std::fmt;

use crate::{Column, ColumnKind, ColumnType, TabulaError, TabulaResult, Table};

const KEYWORDS: &[&str] = &[
    "all", "and", "as", "asc", "between", "by", "case", "check", "column", "constraint", "create",
    "cross", "date", "default", "delete", "desc", "distinct", "drop", "else", "end", "exists",
    "for", "foreign", "from", "full", "group", "having", "in", "index", "inner", "insert", "into",
    "is", "join", "key", "left", "like", "limit", "not", "null", "offset", "on", "or", "order",
    "outer", "primary", "references", "right", "select", "set", "table", "then", "to", "union",
    "unique", "update", "user", "using", "value", "values", "when", "where",
];

pub fn is_keyword(identifier: &str) -> bool {
    let lower = identifier.to_ascii_lowercase();
    KEYWORDS.contains(&lower.as_str())
}

fn is_plain_identifier(identifier: &str) -> bool {
    let mut chars = identifier.chars();
    match chars.next() {
        Some(first) if first == '_' || first.is_ascii_lowercase() => {}
        _ => return false,
    }
    chars.all(|ch| ch == '_' || ch.is_ascii_lowercase() || ch.is_ascii_digit())
}

pub trait Dialect: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    fn identifier_quote(&self) -> char {
        '"'
    }

    fn needs_quotes(&self, identifier: &str) -> bool {
        !is_plain_identifier(identifier) || is_keyword(identifier)
    }

    fn quote_identifier(&self, identifier: &str) -> String {
        if !self.needs_quotes(identifier) {
            return identifier.to_string();
        }
        let quote = self.identifier_quote();
        let escaped = identifier.replace(quote, &format!("{quote}{quote}"));
        format!("{quote}{escaped}{quote}")
    }

    /// Placeholder for the 1-based `position`-th bound argument.
    fn placeholder(&self, _position: usize) -> String {
        "?".to_string()
    }

    fn supports_for_update(&self) -> bool {
        true
    }

    fn supports_update_limit(&self) -> bool {
        false
    }

    fn supports_create_index_if_not_exists(&self) -> bool {
        true
    }

    /// Generated keys come back as a result set of the insert itself.
    fn returns_generated_keys_inline(&self) -> bool {
        false
    }

    fn substring_function(&self) -> &'static str {
        "SUBSTRING"
    }

    fn blob_literal(&self, bytes: &[u8]) -> String {
        let hex: String = bytes.iter().map(|byte| format!("{byte:02X}")).collect();
        format!("X'{hex}'")
    }

    fn column_sql_type(&self, column_type: &ColumnType) -> String {
        generic_sql_type(column_type)
    }

    /// Text appended after the type of an auto-increment column.
    fn auto_increment_suffix(&self) -> Option<&'static str> {
        Some("AUTO_INCREMENT")
    }

    /// The auto-increment column carries the primary key inline, so no table
    /// level constraint is emitted.
    fn inline_auto_increment_key(&self) -> bool {
        false
    }

    /// Tail of an insert that sets no column explicitly.
    fn default_values_clause(&self) -> &'static str {
        "DEFAULT VALUES"
    }

    /// Upsert of one row whose values are already rendered.
    fn replace_sql(
        &self,
        table: &Table,
        _columns: &[Column],
        _values: &[String],
    ) -> TabulaResult<String> {
        Err(TabulaError::unsupported(format!(
            "{} has no replace statement for {}",
            self.name(),
            table.name()
        )))
    }
}

fn generic_sql_type(column_type: &ColumnType) -> String {
    match column_type.kind() {
        ColumnKind::Integer | ColumnKind::EntityId { .. } => "INT".to_string(),
        ColumnKind::Long => "BIGINT".to_string(),
        ColumnKind::Char => "CHAR".to_string(),
        ColumnKind::Varchar { length, collate } => match collate {
            Some(collate) => format!("VARCHAR({length}) COLLATE {collate}"),
            None => format!("VARCHAR({length})"),
        },
        ColumnKind::Text => "TEXT".to_string(),
        ColumnKind::Decimal { precision, scale } => format!("DECIMAL({precision}, {scale})"),
        ColumnKind::Date => "DATE".to_string(),
        ColumnKind::DateTime => "DATETIME".to_string(),
        ColumnKind::Boolean => "BOOLEAN".to_string(),
        ColumnKind::Enumeration { .. } => "INT".to_string(),
        ColumnKind::Blob => "BLOB".to_string(),
    }
}

fn insert_head(
    dialect: &dyn Dialect,
    verb: &str,
    table: &Table,
    columns: &[Column],
    values: &[String],
) -> String {
    let names: Vec<String> = columns
        .iter()
        .map(|column| dialect.quote_identifier(column.name()))
        .collect();
    format!(
        "{verb} {} ({}) VALUES ({})",
        dialect.quote_identifier(table.name()),
        names.join(", "),
        values.join(", ")
    )
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SqliteDialect;

impl Dialect for SqliteDialect {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn supports_for_update(&self) -> bool {
        false
    }

    fn substring_function(&self) -> &'static str {
        "substr"
    }

    fn column_sql_type(&self, column_type: &ColumnType) -> String {
        match column_type.kind() {
            ColumnKind::Integer | ColumnKind::Long if column_type.is_autoincrement() => {
                "INTEGER".to_string()
            }
            _ => generic_sql_type(column_type),
        }
    }

    fn auto_increment_suffix(&self) -> Option<&'static str> {
        Some("PRIMARY KEY AUTOINCREMENT")
    }

    fn inline_auto_increment_key(&self) -> bool {
        true
    }

    fn replace_sql(
        &self,
        table: &Table,
        columns: &[Column],
        values: &[String],
    ) -> TabulaResult<String> {
        Ok(insert_head(self, "INSERT OR REPLACE INTO", table, columns, values))
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct PostgresDialect;

impl Dialect for PostgresDialect {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn placeholder(&self, position: usize) -> String {
        format!("${position}")
    }

    fn returns_generated_keys_inline(&self) -> bool {
        true
    }

    fn blob_literal(&self, bytes: &[u8]) -> String {
        let hex: String = bytes.iter().map(|byte| format!("{byte:02x}")).collect();
        format!("'\\x{hex}'::bytea")
    }

    fn column_sql_type(&self, column_type: &ColumnType) -> String {
        match column_type.kind() {
            ColumnKind::Integer | ColumnKind::EntityId { .. } if column_type.is_autoincrement() => {
                "SERIAL".to_string()
            }
            ColumnKind::Long if column_type.is_autoincrement() => "BIGSERIAL".to_string(),
            ColumnKind::DateTime => "TIMESTAMP".to_string(),
            ColumnKind::Blob => "BYTEA".to_string(),
            ColumnKind::Varchar { length, collate: Some(collate) } => {
                format!("VARCHAR({length}) COLLATE \"{collate}\"")
            }
            _ => generic_sql_type(column_type),
        }
    }

    fn auto_increment_suffix(&self) -> Option<&'static str> {
        None
    }

    fn replace_sql(
        &self,
        table: &Table,
        columns: &[Column],
        values: &[String],
    ) -> TabulaResult<String> {
        if table.primary_keys().is_empty() {
            return Err(TabulaError::unsupported(format!(
                "replace into {} needs a primary key",
                table.name()
            )));
        }
        let keys: Vec<String> = table
            .primary_keys()
            .iter()
            .map(|column| self.quote_identifier(column.name()))
            .collect();
        let updates: Vec<String> = columns
            .iter()
            .filter(|column| !table.primary_keys().contains(*column))
            .map(|column| {
                let name = self.quote_identifier(column.name());
                format!("{name} = EXCLUDED.{name}")
            })
            .collect();
        let head = insert_head(self, "INSERT INTO", table, columns, values);
        if updates.is_empty() {
            return Ok(format!("{head} ON CONFLICT ({}) DO NOTHING", keys.join(", ")));
        }
        Ok(format!(
            "{head} ON CONFLICT ({}) DO UPDATE SET {}",
            keys.join(", "),
            updates.join(", ")
        ))
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct MysqlDialect;

impl Dialect for MysqlDialect {
    fn name(&self) -> &'static str {
        "mysql"
    }

    fn identifier_quote(&self) -> char {
        '`'
    }

    fn supports_update_limit(&self) -> bool {
        true
    }

    fn supports_create_index_if_not_exists(&self) -> bool {
        false
    }

    fn default_values_clause(&self) -> &'static str {
        "() VALUES ()"
    }

    fn replace_sql(
        &self,
        table: &Table,
        columns: &[Column],
        values: &[String],
    ) -> TabulaResult<String> {
        let updates: Vec<String> = columns
            .iter()
            .map(|column| {
                let name = self.quote_identifier(column.name());
                format!("{name} = VALUES({name})")
            })
            .collect();
        Ok(format!(
            "{} ON DUPLICATE KEY UPDATE {}",
            insert_head(self, "INSERT INTO", table, columns, values),
            updates.join(", ")
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quotes_only_when_needed() {
        let dialect = SqliteDialect;
        assert_eq!(dialect.quote_identifier("users"), "users");
        assert_eq!(dialect.quote_identifier("city_id"), "city_id");
        assert_eq!(dialect.quote_identifier("value"), "\"value\"");
        assert_eq!(dialect.quote_identifier("userData"), "\"userData\"");
        assert_eq!(dialect.quote_identifier("a\"b"), "\"a\"\"b\"");
        assert_eq!(MysqlDialect.quote_identifier("order"), "`order`");
    }

    #[test]
    fn placeholder_styles() {
        assert_eq!(SqliteDialect.placeholder(3), "?");
        assert_eq!(MysqlDialect.placeholder(1), "?");
        assert_eq!(PostgresDialect.placeholder(2), "$2");
    }

    #[test]
    fn auto_increment_types() {
        let id = ColumnType::integer().auto_increment().unwrap();
        assert_eq!(SqliteDialect.column_sql_type(&id), "INTEGER");
        assert_eq!(PostgresDialect.column_sql_type(&id), "SERIAL");
        assert_eq!(MysqlDialect.column_sql_type(&id), "INT");
        assert_eq!(PostgresDialect.auto_increment_suffix(), None);
        assert_eq!(
            SqliteDialect.column_sql_type(&ColumnType::decimal(12, 2)),
            "DECIMAL(12, 2)"
        );
    }

    #[test]
    fn replace_syntax_per_vendor() {
        let mut builder = Table::builder("settings");
        let key = builder.varchar("key", 20).primary_key().column();
        let value = builder.text("value").column();
        let table = builder.build().unwrap();
        let columns = vec![key, value];
        let values = vec!["?".to_string(), "?".to_string()];
        assert_eq!(
            SqliteDialect.replace_sql(&table, &columns, &values).unwrap(),
            "INSERT OR REPLACE INTO settings (\"key\", \"value\") VALUES (?, ?)"
        );
        assert_eq!(
            MysqlDialect.replace_sql(&table, &columns, &values).unwrap(),
            "INSERT INTO settings (`key`, `value`) VALUES (?, ?) ON DUPLICATE KEY UPDATE `key` = VALUES(`key`), `value` = VALUES(`value`)"
        );
        assert_eq!(
            PostgresDialect.replace_sql(&table, &columns, &values).unwrap(),
            "INSERT INTO settings (\"key\", \"value\") VALUES (?, ?) ON CONFLICT (\"key\") DO UPDATE SET \"value\" = EXCLUDED.\"value\""
        );
    }
}
