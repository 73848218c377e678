use async_trait::async_trait;

use tabula_core::{
    ColumnType, Expr, QueryBuilder, ResultRow, Select, SortOrder, TabulaError, TabulaResult,
    Value,
};

use crate::session::Session;
use crate::sized::SizedIterable;

#[derive(Clone, Debug)]
enum State {
    Building,
    Materialized { rows: Vec<ResultRow>, for_update: bool },
}

/// A select that is configured, then executed at most once; later reads are
/// served from the fetched rows.
#[derive(Clone, Debug)]
pub struct Query {
    select: Select,
    state: State,
}

impl From<Select> for Query {
    fn from(select: Select) -> Self {
        Query::new(select)
    }
}

impl Query {
    pub fn new(select: Select) -> Self {
        Self {
            select,
            state: State::Building,
        }
    }

    pub fn select(&self) -> &Select {
        &self.select
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self.state, State::Materialized { .. })
    }

    fn building(&mut self, operation: &str) -> TabulaResult<&mut Select> {
        match self.state {
            State::Building => Ok(&mut self.select),
            State::Materialized { .. } => Err(TabulaError::frozen(format!(
                "{operation} after the query was loaded"
            ))),
        }
    }

    pub fn filter(&mut self, condition: Expr) -> TabulaResult<&mut Self> {
        self.building("filter")?.filter(condition);
        Ok(self)
    }

    pub fn where_(&mut self, condition: Expr) -> TabulaResult<&mut Self> {
        self.filter(condition)
    }

    pub fn group_by<I, E>(&mut self, exprs: I) -> TabulaResult<&mut Self>
    where
        I: IntoIterator<Item = E>,
        E: Into<Expr>,
    {
        self.building("group by")?.group_by(exprs);
        Ok(self)
    }

    pub fn having(&mut self, condition: Expr) -> TabulaResult<&mut Self> {
        self.building("having")?.having(condition);
        Ok(self)
    }

    pub fn order_by(&mut self, expr: impl Into<Expr>, order: SortOrder) -> TabulaResult<&mut Self> {
        self.building("order by")?.order_by(expr, order);
        Ok(self)
    }

    pub fn limit(&mut self, limit: u64, offset: u64) -> TabulaResult<&mut Self> {
        self.building("limit")?.limit(limit, offset);
        Ok(self)
    }

    fn set_locking(&mut self, for_update: bool) -> TabulaResult<&mut Self> {
        let loaded = match &self.state {
            State::Building => None,
            State::Materialized { for_update, .. } => Some(*for_update),
        };
        match loaded {
            None => {
                self.select.set_for_update(for_update);
                Ok(self)
            }
            Some(loaded) if loaded == for_update => Ok(self),
            Some(loaded) => Err(TabulaError::frozen(format!(
                "rows were loaded with for_update = {loaded}"
            ))),
        }
    }

    pub fn for_update(&mut self) -> TabulaResult<&mut Self> {
        self.set_locking(true)
    }

    pub fn not_for_update(&mut self) -> TabulaResult<&mut Self> {
        self.set_locking(false)
    }

    pub fn is_for_update(&self) -> bool {
        match &self.state {
            State::Building => self.select.is_for_update(),
            State::Materialized { for_update, .. } => *for_update,
        }
    }

    pub fn to_sql(&self, builder: &mut QueryBuilder<'_>) -> TabulaResult<String> {
        self.select.to_sql(builder)
    }

    /// Executes the select on first use; every later call returns the same
    /// rows without touching the session.
    pub async fn load(&mut self, session: &mut Session) -> TabulaResult<&[ResultRow]> {
        if let State::Building = self.state {
            let rows = session.select_rows(&self.select).await?;
            self.state = State::Materialized {
                rows,
                for_update: self.select.is_for_update(),
            };
        }
        match &self.state {
            State::Materialized { rows, .. } => Ok(rows),
            State::Building => Err(TabulaError::invalid("query failed to materialize")),
        }
    }

    pub async fn rows(&mut self, session: &mut Session) -> TabulaResult<Vec<ResultRow>> {
        Ok(self.load(session).await?.to_vec())
    }

    pub async fn first(&mut self, session: &mut Session) -> TabulaResult<Option<ResultRow>> {
        Ok(self.load(session).await?.first().cloned())
    }

    /// The only row; anything but exactly one row is an error.
    pub async fn single(&mut self, session: &mut Session) -> TabulaResult<ResultRow> {
        let rows = self.load(session).await?;
        match rows {
            [row] => Ok(row.clone()),
            _ => Err(TabulaError::invalid(format!(
                "expected exactly one row, found {}",
                rows.len()
            ))),
        }
    }

    pub async fn count(&mut self, session: &mut Session) -> TabulaResult<u64> {
        if let State::Materialized { rows, .. } = &self.state {
            return Ok(rows.len() as u64);
        }
        let (sql, args) = {
            let mut builder = QueryBuilder::new(session.dialect());
            let sql = self.select.count_sql(&mut builder)?;
            (sql, builder.into_args())
        };
        let rows = session.run_query(&sql, args, &[ColumnType::long()]).await?;
        match rows.first().and_then(|row| row.first()) {
            Some(Value::Int(count)) => u64::try_from(*count)
                .map_err(|_| TabulaError::type_mismatch(format!("negative count {count}"))),
            other => Err(TabulaError::type_mismatch(format!(
                "unexpected count result {other:?}"
            ))),
        }
    }

    /// Fetches at most one row without loading the query.
    pub async fn empty(&mut self, session: &mut Session) -> TabulaResult<bool> {
        if let State::Materialized { rows, .. } = &self.state {
            return Ok(rows.is_empty());
        }
        let mut single = self.select.clone();
        let (limit, offset) = self.select.limits().unwrap_or((1, 0));
        single.limit(limit.min(1), offset).set_for_update(false);
        if limit == 0 {
            return Ok(true);
        }
        Ok(session.select_rows(&single).await?.is_empty())
    }
}

#[async_trait]
impl SizedIterable for Query {
    type Item = ResultRow;

    async fn count(&mut self, session: &mut Session) -> TabulaResult<u64> {
        Query::count(self, session).await
    }

    async fn empty(&mut self, session: &mut Session) -> TabulaResult<bool> {
        Query::empty(self, session).await
    }

    async fn load(&mut self, session: &mut Session) -> TabulaResult<Vec<ResultRow>> {
        self.rows(session).await
    }

    fn is_for_update(&self) -> bool {
        Query::is_for_update(self)
    }

    fn for_update(&mut self) -> TabulaResult<()> {
        Query::for_update(self).map(|_| ())
    }

    fn not_for_update(&mut self) -> TabulaResult<()> {
        Query::not_for_update(self).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tabula_core::{SqliteDialect, Table};

    fn query() -> (Query, tabula_core::Column) {
        let mut cities = Table::builder("cities");
        let id = cities.integer("id").primary_key().column();
        cities.varchar("name", 50).column();
        let cities = cities.build().unwrap();
        (Query::new(cities.select_all()), id)
    }

    #[test]
    fn configuration_renders_into_the_select() {
        let (mut query, id) = query();
        query
            .filter(id.greater(1).unwrap())
            .unwrap()
            .order_by(&id, SortOrder::Desc)
            .unwrap()
            .limit(2, 0)
            .unwrap();
        let dialect = SqliteDialect;
        let mut builder = QueryBuilder::new(&dialect);
        assert_eq!(
            query.to_sql(&mut builder).unwrap(),
            "SELECT cities.id, cities.name FROM cities WHERE cities.id > ? ORDER BY cities.id DESC LIMIT 2"
        );
        assert!(!query.is_loaded());
        query.for_update().unwrap();
        assert!(query.is_for_update());
        query.not_for_update().unwrap();
        assert!(!query.is_for_update());
    }

    #[test]
    fn loaded_queries_reject_changes() {
        let (mut query, id) = query();
        query.state = State::Materialized {
            rows: Vec::new(),
            for_update: false,
        };
        let err = query.filter(id.eq(1).unwrap()).unwrap_err();
        assert!(matches!(err, TabulaError::FrozenQuery { .. }));
        assert!(query.not_for_update().is_ok());
        let err = query.for_update().unwrap_err();
        assert!(matches!(err, TabulaError::FrozenQuery { .. }));
    }
}
