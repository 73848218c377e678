use std::fmt;

use crate::{Column, Expr, QueryBuilder, TabulaError, TabulaResult, Table};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JoinType {
    Inner,
    Left,
    Right,
    Full,
}

impl fmt::Display for JoinType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            JoinType::Inner => "INNER",
            JoinType::Left => "LEFT",
            JoinType::Right => "RIGHT",
            JoinType::Full => "FULL",
        })
    }
}

/// Anything rows can be selected from.
#[derive(Clone, Debug, PartialEq)]
pub enum ColumnSet {
    Table(Table),
    Join(Join),
}

impl From<Table> for ColumnSet {
    fn from(value: Table) -> Self {
        ColumnSet::Table(value)
    }
}

impl From<&Table> for ColumnSet {
    fn from(value: &Table) -> Self {
        ColumnSet::Table(value.clone())
    }
}

impl From<Join> for ColumnSet {
    fn from(value: Join) -> Self {
        ColumnSet::Join(value)
    }
}

impl From<&Join> for ColumnSet {
    fn from(value: &Join) -> Self {
        ColumnSet::Join(value.clone())
    }
}

impl ColumnSet {
    pub fn columns(&self) -> Vec<Column> {
        match self {
            ColumnSet::Table(table) => table.columns().to_vec(),
            ColumnSet::Join(join) => join.columns(),
        }
    }

    pub fn primary_keys(&self) -> Vec<Column> {
        match self {
            ColumnSet::Table(table) => table.primary_keys().to_vec(),
            ColumnSet::Join(join) => join
                .target_tables()
                .iter()
                .flat_map(|table| table.primary_keys().to_vec())
                .collect(),
        }
    }

    pub fn target_tables(&self) -> Vec<Table> {
        match self {
            ColumnSet::Table(table) => vec![table.clone()],
            ColumnSet::Join(join) => join.target_tables(),
        }
    }

    pub fn contains_table(&self, table: &Table) -> bool {
        self.target_tables().contains(table)
    }

    pub fn describe(&self, builder: &mut QueryBuilder<'_>) -> TabulaResult<String> {
        match self {
            ColumnSet::Table(table) => Ok(builder.identity(table.name())),
            ColumnSet::Join(join) => join.describe(builder),
        }
    }

    fn anchored(&self) -> Join {
        match self {
            ColumnSet::Join(join) => join.clone(),
            ColumnSet::Table(_) => Join {
                base: Box::new(self.clone()),
                parts: Vec::new(),
            },
        }
    }

    pub fn join(&self, other: impl Into<ColumnSet>, join_type: JoinType) -> TabulaResult<Join> {
        self.anchored().join(other, join_type)
    }

    pub fn inner_join(&self, other: impl Into<ColumnSet>) -> TabulaResult<Join> {
        self.join(other, JoinType::Inner)
    }

    pub fn left_join(&self, other: impl Into<ColumnSet>) -> TabulaResult<Join> {
        self.join(other, JoinType::Left)
    }

    pub fn join_on(
        &self,
        other: impl Into<ColumnSet>,
        join_type: JoinType,
        on: Option<(Column, Column)>,
        extra: Option<Expr>,
    ) -> TabulaResult<Join> {
        self.anchored().join_on(other, join_type, on, extra)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct JoinPart {
    pub join_type: JoinType,
    pub joined: ColumnSet,
    pub on: Option<(Column, Column)>,
    pub extra: Option<Expr>,
}

/// A base column set followed by the parts joined onto it, in order.
#[derive(Clone, Debug, PartialEq)]
pub struct Join {
    base: Box<ColumnSet>,
    parts: Vec<JoinPart>,
}

/// The single pair (primary key of `left`, column of `right` referencing it).
fn referencing_pair(
    left: &ColumnSet,
    right: &ColumnSet,
) -> TabulaResult<Option<(Column, Column)>> {
    let right_columns = right.columns();
    let mut found = Vec::new();
    for key in left.primary_keys() {
        for column in &right_columns {
            if column.referee() == Some(&key) {
                found.push((key.clone(), column.clone()));
            }
        }
    }
    match found.len() {
        0 => Ok(None),
        1 => Ok(found.pop()),
        _ => {
            let pairs: Vec<String> = found
                .iter()
                .map(|(key, column)| format!("{column:?} -> {key:?}"))
                .collect();
            Err(TabulaError::ambiguous_join(format!(
                "several reference paths: {}",
                pairs.join(", ")
            )))
        }
    }
}

impl Join {
    pub fn base(&self) -> &ColumnSet {
        &self.base
    }

    pub fn parts(&self) -> &[JoinPart] {
        &self.parts
    }

    pub fn columns(&self) -> Vec<Column> {
        let mut columns = self.base.columns();
        for part in &self.parts {
            columns.extend(part.joined.columns());
        }
        columns
    }

    pub fn target_tables(&self) -> Vec<Table> {
        let mut tables = self.base.target_tables();
        for part in &self.parts {
            tables.extend(part.joined.target_tables());
        }
        tables
    }

    pub fn already_in_join(&self, table: &Table) -> bool {
        self.target_tables().contains(table)
    }

    /// Joins `other` along the one foreign key linking it to this join,
    /// looked up in either direction.
    pub fn join(&self, other: impl Into<ColumnSet>, join_type: JoinType) -> TabulaResult<Join> {
        let other = other.into();
        let current = ColumnSet::Join(self.clone());
        let on = match referencing_pair(&current, &other)? {
            Some(pair) => pair,
            None => match referencing_pair(&other, &current)? {
                Some((key, column)) => (column, key),
                None => {
                    return Err(TabulaError::no_join_path(format!(
                        "no foreign key links {:?} with {:?}",
                        self.target_tables(),
                        other.target_tables()
                    )));
                }
            },
        };
        self.join_on(other, join_type, Some(on), None)
    }

    pub fn inner_join(&self, other: impl Into<ColumnSet>) -> TabulaResult<Join> {
        self.join(other, JoinType::Inner)
    }

    pub fn left_join(&self, other: impl Into<ColumnSet>) -> TabulaResult<Join> {
        self.join(other, JoinType::Left)
    }

    /// Joins `other` unless its table is already part of this join.
    pub fn join_if_absent(&self, other: &Table, join_type: JoinType) -> TabulaResult<Join> {
        if self.already_in_join(other) {
            return Ok(self.clone());
        }
        self.join(other, join_type)
    }

    pub fn join_on(
        &self,
        other: impl Into<ColumnSet>,
        join_type: JoinType,
        on: Option<(Column, Column)>,
        extra: Option<Expr>,
    ) -> TabulaResult<Join> {
        if on.is_none() && extra.is_none() {
            return Err(TabulaError::no_join_path(
                "a join needs a column pair or a predicate",
            ));
        }
        let mut parts = self.parts.clone();
        parts.push(JoinPart {
            join_type,
            joined: other.into(),
            on,
            extra,
        });
        Ok(Join {
            base: self.base.clone(),
            parts,
        })
    }

    pub fn describe(&self, builder: &mut QueryBuilder<'_>) -> TabulaResult<String> {
        let mut sql = self.base.describe(builder)?;
        for part in &self.parts {
            let joined = match &part.joined {
                ColumnSet::Join(nested) => format!("({})", nested.describe(builder)?),
                table => table.describe(builder)?,
            };
            sql.push_str(&format!(" {} JOIN {joined} ON ", part.join_type));
            match (&part.on, &part.extra) {
                (Some((left, right)), extra) => {
                    sql.push_str(&format!(
                        "{} = {}",
                        builder.column_identity(left),
                        builder.column_identity(right)
                    ));
                    if let Some(extra) = extra {
                        sql.push_str(&format!(" AND ({})", extra.to_sql(builder)?));
                    }
                }
                (None, Some(extra)) => sql.push_str(&format!("({})", extra.to_sql(builder)?)),
                (None, None) => {
                    return Err(TabulaError::no_join_path("join part without condition"));
                }
            }
        }
        Ok(sql)
    }
}

impl Table {
    pub fn join(&self, other: impl Into<ColumnSet>, join_type: JoinType) -> TabulaResult<Join> {
        ColumnSet::from(self).join(other, join_type)
    }

    pub fn inner_join(&self, other: impl Into<ColumnSet>) -> TabulaResult<Join> {
        self.join(other, JoinType::Inner)
    }

    pub fn left_join(&self, other: impl Into<ColumnSet>) -> TabulaResult<Join> {
        self.join(other, JoinType::Left)
    }

    pub fn join_on(
        &self,
        other: impl Into<ColumnSet>,
        join_type: JoinType,
        on: Option<(Column, Column)>,
        extra: Option<Expr>,
    ) -> TabulaResult<Join> {
        ColumnSet::from(self).join_on(other, join_type, on, extra)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SqliteDialect;

    struct Schema {
        cities: Table,
        users: Table,
        posts: Table,
    }

    fn schema() -> Schema {
        let mut cities = Table::builder("cities");
        let city_id = cities.integer("id").primary_key().column();
        cities.varchar("name", 50).column();
        let cities = cities.build().unwrap();

        let mut users = Table::builder("users");
        let user_id = users.varchar("id", 10).primary_key().column();
        users.reference("city_id", &city_id).nullable().column();
        let users = users.build().unwrap();

        let mut posts = Table::builder("posts");
        posts.integer("id").primary_key().column();
        posts.varchar("author", 10).references(&user_id).column();
        posts.varchar("editor", 10).references(&user_id).column();
        let posts = posts.build().unwrap();
        Schema {
            cities,
            users,
            posts,
        }
    }

    fn describe(join: &Join) -> String {
        let dialect = SqliteDialect;
        let mut builder = QueryBuilder::new(&dialect);
        join.describe(&mut builder).unwrap()
    }

    #[test]
    fn join_finds_the_edge_from_either_side() {
        let s = schema();
        assert_eq!(
            describe(&s.users.inner_join(&s.cities).unwrap()),
            "users INNER JOIN cities ON users.city_id = cities.id"
        );
        assert_eq!(
            describe(&s.cities.inner_join(&s.users).unwrap()),
            "cities INNER JOIN users ON cities.id = users.city_id"
        );
    }

    #[test]
    fn chained_joins_keep_order() {
        let s = schema();
        let join = s.cities.left_join(&s.users).unwrap();
        assert!(join.already_in_join(&s.users));
        assert!(!join.already_in_join(&s.posts));
        let same = join.join_if_absent(&s.users, JoinType::Inner).unwrap();
        assert_eq!(same, join);
        assert_eq!(join.parts().len(), 1);
    }

    #[test]
    fn unrelated_tables_need_a_predicate() {
        let s = schema();
        let mut tags = Table::builder("tags");
        let label = tags.varchar("label", 10).column();
        let tags = tags.build().unwrap();
        let err = s.cities.inner_join(&tags).unwrap_err();
        assert!(matches!(err, TabulaError::NoJoinPath { .. }));

        let name = s.cities.column("name").unwrap();
        let join = s
            .cities
            .join_on(&tags, JoinType::Inner, None, Some(label.eq(name).unwrap()))
            .unwrap();
        assert_eq!(
            describe(&join),
            "cities INNER JOIN tags ON (tags.label = cities.name)"
        );
    }

    #[test]
    fn several_candidate_keys_are_ambiguous() {
        let s = schema();
        let err = s.users.inner_join(&s.posts).unwrap_err();
        assert!(matches!(err, TabulaError::AmbiguousJoin { .. }));
    }

    #[test]
    fn explicit_pair_with_extra_predicate() {
        let s = schema();
        let author = s.posts.column("author").unwrap().clone();
        let user_id = s.users.id_column().unwrap().clone();
        let post_id = s.posts.id_column().unwrap();
        let join = s
            .users
            .join_on(
                &s.posts,
                JoinType::Left,
                Some((user_id, author)),
                Some(post_id.greater(10).unwrap()),
            )
            .unwrap();
        assert_eq!(
            describe(&join),
            "users LEFT JOIN posts ON users.id = posts.author AND (posts.id > ?)"
        );
    }
}
