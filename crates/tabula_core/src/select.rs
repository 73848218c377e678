use std::collections::BTreeSet;

use crate::{ColumnSet, Expr, Join, QueryBuilder, TabulaError, TabulaResult, Table};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    fn sql(self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

/// Selected expressions together with the column set they are read from.
#[derive(Clone, Debug, PartialEq)]
pub struct FieldSet {
    source: ColumnSet,
    fields: Vec<Expr>,
}

impl FieldSet {
    pub fn new<I, E>(source: impl Into<ColumnSet>, fields: I) -> Self
    where
        I: IntoIterator<Item = E>,
        E: Into<Expr>,
    {
        Self {
            source: source.into(),
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }

    pub fn source(&self) -> &ColumnSet {
        &self.source
    }

    pub fn fields(&self) -> &[Expr] {
        &self.fields
    }

    pub fn select(self, condition: Expr) -> Select {
        let mut select = Select::new(self);
        select.filter(condition);
        select
    }

    pub fn select_all(self) -> Select {
        Select::new(self)
    }
}

impl ColumnSet {
    pub fn slice<I, E>(&self, fields: I) -> FieldSet
    where
        I: IntoIterator<Item = E>,
        E: Into<Expr>,
    {
        FieldSet::new(self.clone(), fields)
    }

    pub fn all_fields(&self) -> FieldSet {
        FieldSet::new(self.clone(), self.columns())
    }

    pub fn select(&self, condition: Expr) -> Select {
        self.all_fields().select(condition)
    }

    pub fn select_all(&self) -> Select {
        self.all_fields().select_all()
    }
}

impl Table {
    pub fn slice<I, E>(&self, fields: I) -> FieldSet
    where
        I: IntoIterator<Item = E>,
        E: Into<Expr>,
    {
        ColumnSet::from(self).slice(fields)
    }

    pub fn select(&self, condition: Expr) -> Select {
        ColumnSet::from(self).select(condition)
    }

    pub fn select_all(&self) -> Select {
        ColumnSet::from(self).select_all()
    }
}

impl Join {
    pub fn slice<I, E>(&self, fields: I) -> FieldSet
    where
        I: IntoIterator<Item = E>,
        E: Into<Expr>,
    {
        ColumnSet::from(self).slice(fields)
    }

    pub fn select(&self, condition: Expr) -> Select {
        ColumnSet::from(self).select(condition)
    }

    pub fn select_all(&self) -> Select {
        ColumnSet::from(self).select_all()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Select {
    fields: FieldSet,
    condition: Option<Expr>,
    group_by: Vec<Expr>,
    having: Option<Expr>,
    order_by: Vec<(Expr, SortOrder)>,
    limit: Option<(u64, u64)>,
    for_update: bool,
}

impl Select {
    pub fn new(fields: FieldSet) -> Self {
        Self {
            fields,
            condition: None,
            group_by: Vec::new(),
            having: None,
            order_by: Vec::new(),
            limit: None,
            for_update: false,
        }
    }

    pub fn source(&self) -> &ColumnSet {
        self.fields.source()
    }

    pub fn fields(&self) -> &[Expr] {
        self.fields.fields()
    }

    pub fn condition(&self) -> Option<&Expr> {
        self.condition.as_ref()
    }

    /// Adds a predicate, AND-ed with any existing one.
    pub fn filter(&mut self, condition: Expr) -> &mut Self {
        self.condition = Some(match self.condition.take() {
            Some(existing) => existing.and(condition),
            None => condition,
        });
        self
    }

    pub fn group_by<I, E>(&mut self, exprs: I) -> &mut Self
    where
        I: IntoIterator<Item = E>,
        E: Into<Expr>,
    {
        self.group_by.extend(exprs.into_iter().map(Into::into));
        self
    }

    pub fn having(&mut self, condition: Expr) -> &mut Self {
        self.having = Some(condition);
        self
    }

    pub fn order_by(&mut self, expr: impl Into<Expr>, order: SortOrder) -> &mut Self {
        self.order_by.push((expr.into(), order));
        self
    }

    pub fn limit(&mut self, limit: u64, offset: u64) -> &mut Self {
        self.limit = Some((limit, offset));
        self
    }

    pub fn limits(&self) -> Option<(u64, u64)> {
        self.limit
    }

    pub fn set_for_update(&mut self, for_update: bool) -> &mut Self {
        self.for_update = for_update;
        self
    }

    pub fn is_for_update(&self) -> bool {
        self.for_update
    }

    pub fn referenced_tables(&self) -> BTreeSet<String> {
        let mut tables: BTreeSet<String> = self
            .source()
            .target_tables()
            .iter()
            .map(|table| table.name().to_string())
            .collect();
        let exprs = self
            .fields()
            .iter()
            .chain(self.condition.iter())
            .chain(self.group_by.iter())
            .chain(self.having.iter())
            .chain(self.order_by.iter().map(|(expr, _)| expr));
        for expr in exprs {
            tables.extend(expr.referenced_tables());
        }
        tables
    }

    fn render_body(&self, builder: &mut QueryBuilder<'_>) -> TabulaResult<String> {
        if self.fields().is_empty() {
            return Err(TabulaError::invalid("select without fields"));
        }
        let fields = self
            .fields()
            .iter()
            .map(|field| field.to_sql(builder))
            .collect::<TabulaResult<Vec<_>>>()?;
        let mut sql = format!(
            "SELECT {} FROM {}",
            fields.join(", "),
            self.source().describe(builder)?
        );
        if let Some(condition) = &self.condition {
            sql.push_str(" WHERE ");
            sql.push_str(&condition.to_sql(builder)?);
        }
        if !self.group_by.is_empty() {
            let groups = self
                .group_by
                .iter()
                .map(|expr| expr.to_sql(builder))
                .collect::<TabulaResult<Vec<_>>>()?;
            sql.push_str(" GROUP BY ");
            sql.push_str(&groups.join(", "));
        }
        if let Some(having) = &self.having {
            sql.push_str(" HAVING ");
            sql.push_str(&having.to_sql(builder)?);
        }
        if !self.order_by.is_empty() {
            let orders = self
                .order_by
                .iter()
                .map(|(expr, order)| Ok(format!("{} {}", expr.to_sql(builder)?, order.sql())))
                .collect::<TabulaResult<Vec<_>>>()?;
            sql.push_str(" ORDER BY ");
            sql.push_str(&orders.join(", "));
        }
        if let Some((limit, offset)) = self.limit {
            sql.push_str(&format!(" LIMIT {limit}"));
            if offset > 0 {
                sql.push_str(&format!(" OFFSET {offset}"));
            }
        }
        Ok(sql)
    }

    pub fn to_sql(&self, builder: &mut QueryBuilder<'_>) -> TabulaResult<String> {
        let mut sql = self.render_body(builder)?;
        if self.for_update && builder.dialect().supports_for_update() {
            sql.push_str(" FOR UPDATE");
        }
        Ok(sql)
    }

    /// `SELECT COUNT(*)` over this select as a subquery.
    pub fn count_sql(&self, builder: &mut QueryBuilder<'_>) -> TabulaResult<String> {
        Ok(format!(
            "SELECT COUNT(*) FROM ({}) subquery",
            self.render_body(builder)?
        ))
    }
}
