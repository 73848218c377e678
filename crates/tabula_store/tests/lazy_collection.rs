use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tabula_store::{
    Argument, Column, ColumnType, Connection, Dialect, ExecutionOutcome, LazySizedCollection,
    PreparedHandle, Query, Session, SizedIterable, SqliteDialect, StatementContext,
    StatementListener, TabulaError, TabulaResult, Table, Value,
};

/// Answers every query from memory and remembers what it was asked.
struct ScriptedConnection {
    dialect: SqliteDialect,
    rows: i64,
    queries: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl Connection for ScriptedConnection {
    fn dialect(&self) -> &dyn Dialect {
        &self.dialect
    }

    async fn execute_query(
        &mut self,
        handle: &PreparedHandle,
        _args: &[Argument],
        result_types: &[ColumnType],
    ) -> TabulaResult<Vec<Vec<Value>>> {
        self.queries
            .lock()
            .expect("queries")
            .push(handle.sql().to_string());
        if handle.sql().starts_with("SELECT COUNT(*)") {
            return Ok(vec![vec![Value::Int(self.rows)]]);
        }
        let limit = if handle.sql().contains("LIMIT 1") { 1 } else { self.rows };
        Ok((1..=self.rows.min(limit))
            .map(|id| {
                result_types
                    .iter()
                    .map(|column_type| {
                        if column_type.kind().is_integral() {
                            Value::Int(id)
                        } else {
                            Value::from(format!("user {id}"))
                        }
                    })
                    .collect()
            })
            .collect())
    }

    async fn execute_update(
        &mut self,
        _handle: &mut PreparedHandle,
        _args: &[Argument],
    ) -> TabulaResult<u64> {
        Err(TabulaError::unsupported("read-only connection"))
    }

    async fn commit(self: Box<Self>) -> TabulaResult<()> {
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> TabulaResult<()> {
        Ok(())
    }
}

#[derive(Default)]
struct RecordingListener {
    outcomes: Mutex<Vec<ExecutionOutcome>>,
}

impl StatementListener for RecordingListener {
    fn after_execution(
        &self,
        _contexts: &[StatementContext],
        outcome: &ExecutionOutcome,
        _elapsed: Duration,
    ) {
        self.outcomes.lock().expect("outcomes").push(outcome.clone());
    }
}

struct Fixture {
    session: Session,
    queries: Arc<Mutex<Vec<String>>>,
    listener: Arc<RecordingListener>,
    table: Table,
    name: Column,
}

fn fixture(rows: i64) -> TabulaResult<Fixture> {
    let queries = Arc::new(Mutex::new(Vec::new()));
    let mut session = Session::new(Box::new(ScriptedConnection {
        dialect: SqliteDialect,
        rows,
        queries: queries.clone(),
    }));
    let listener = Arc::new(RecordingListener::default());
    session.add_listener(listener.clone());
    let mut table = Table::builder("users");
    table.integer("id").primary_key().column();
    let name = table.varchar("name", 20).column();
    Ok(Fixture {
        session,
        queries,
        listener,
        table: table.build()?,
        name,
    })
}

fn issued(fixture: &Fixture) -> Vec<String> {
    fixture.queries.lock().expect("queries").clone()
}

#[tokio::test]
async fn count_before_load_does_not_materialize() -> TabulaResult<()> {
    let mut fixture = fixture(3)?;
    let mut users = LazySizedCollection::new(Query::new(fixture.table.select_all()));

    assert_eq!(users.count(&mut fixture.session).await?, 3);
    assert!(!users.is_loaded());
    assert!(!users.source().is_loaded());
    assert_eq!(issued(&fixture).len(), 1);
    assert!(issued(&fixture)[0].starts_with("SELECT COUNT(*) FROM (SELECT"));

    assert_eq!(users.count(&mut fixture.session).await?, 3);
    assert!(!users.empty(&mut fixture.session).await?);
    assert!(!users.is_loaded());
    assert_eq!(issued(&fixture).len(), 1);

    let rows = users.load(&mut fixture.session).await?;
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[2].get::<String>(&fixture.name)?, "user 3");
    assert!(users.is_loaded());
    assert_eq!(issued(&fixture).len(), 2);

    assert_eq!(users.count(&mut fixture.session).await?, 3);
    assert!(!users.empty(&mut fixture.session).await?);
    users.load(&mut fixture.session).await?;
    assert_eq!(issued(&fixture).len(), 2);

    let outcomes = fixture.listener.outcomes.lock().expect("outcomes").clone();
    assert_eq!(
        outcomes,
        vec![ExecutionOutcome::Rows(1), ExecutionOutcome::Rows(3)]
    );
    Ok(())
}

#[tokio::test]
async fn empty_fetches_a_single_row() -> TabulaResult<()> {
    let mut fixture = fixture(0)?;
    let mut users = LazySizedCollection::new(Query::new(fixture.table.select_all()));
    assert!(users.empty(&mut fixture.session).await?);
    assert!(!users.is_loaded());
    let sql = issued(&fixture).remove(0);
    assert!(sql.ends_with("LIMIT 1"), "{sql}");

    assert!(users.empty(&mut fixture.session).await?);
    assert_eq!(users.count(&mut fixture.session).await?, 0);
    assert_eq!(issued(&fixture).len(), 1);
    Ok(())
}

#[tokio::test]
async fn locking_mode_freezes_after_load() -> TabulaResult<()> {
    let mut fixture = fixture(2)?;
    let mut users = LazySizedCollection::new(Query::new(fixture.table.select_all()));
    users.for_update()?;
    assert!(users.is_for_update());
    users.load(&mut fixture.session).await?;
    users.for_update()?;
    let err = users.not_for_update().unwrap_err();
    assert!(matches!(err, TabulaError::FrozenQuery { .. }));

    let mut query = Query::new(fixture.table.select_all());
    query.load(&mut fixture.session).await?;
    let err = query.filter(fixture.name.eq("user 1")?).map(|_| ()).unwrap_err();
    assert!(matches!(err, TabulaError::FrozenQuery { .. }));
    Ok(())
}

#[tokio::test]
async fn failed_statements_reach_listeners() -> TabulaResult<()> {
    let mut fixture = fixture(1)?;
    let err = fixture.session.execute("DELETE FROM users").await.unwrap_err();
    assert!(matches!(err, TabulaError::Unsupported { .. }));
    let outcomes = fixture.listener.outcomes.lock().expect("outcomes").clone();
    assert!(matches!(outcomes.as_slice(), [ExecutionOutcome::Failed(_)]));
    fixture.session.rollback().await
}
