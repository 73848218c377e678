use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use sea_orm::{
    ConnectOptions, ConnectionTrait, Database as SeaDatabase, DatabaseBackend,
    DatabaseConnection, TransactionTrait,
};
use uuid::Uuid;

use tabula_core::{
    Argument, Column, ColumnType, Dialect, QueryBuilder, ResultRow, Select, TabulaError,
    TabulaResult, Value,
};

use crate::connection::{Connection, PreparedHandle, SeaOrmConnection, dialect_for};
use crate::listener::{ExecutionOutcome, LogStatementListener, StatementContext, StatementListener};
use crate::transaction::Transaction;
use crate::{DatabaseConfig, TabulaConfig};

const DEFAULT_SLOW_STATEMENT_MS: u64 = 500;

/// A pooled database handle; every [`Session`] runs on its own transaction.
#[derive(Clone)]
pub struct Database {
    conn: DatabaseConnection,
    backend: DatabaseBackend,
    log_statements: bool,
    slow_statement: Duration,
}

impl Database {
    /// Opens the database described by `tabula.json` in `base_dir`,
    /// initialising a sqlite configuration there on first use.
    pub async fn open(base_dir: &Path) -> TabulaResult<Self> {
        let config = TabulaConfig::load_or_init(base_dir)?;
        Database::connect(&config, base_dir).await
    }

    pub async fn connect(config: &TabulaConfig, base_dir: &Path) -> TabulaResult<Self> {
        let url = build_connection_url(config, base_dir)?;
        let mut options = ConnectOptions::new(url);
        if let Some(pool) = &config.pool {
            if let Some(max) = pool.max_connections {
                options.max_connections(max);
            }
            if let Some(min) = pool.min_connections {
                options.min_connections(min);
            }
            if let Some(timeout_ms) = pool.connect_timeout_ms {
                options.connect_timeout(Duration::from_millis(timeout_ms));
            }
            if let Some(timeout_ms) = pool.acquire_timeout_ms {
                options.acquire_timeout(Duration::from_millis(timeout_ms));
            }
            if let Some(timeout_ms) = pool.idle_timeout_ms {
                options.idle_timeout(Duration::from_millis(timeout_ms));
            }
        }
        options.sqlx_logging(false);
        let conn = SeaDatabase::connect(options).await.map_err(TabulaError::from)?;
        let backend = conn.get_database_backend();
        let logging = config.logging();
        log::info!(
            "tabula: connected to {} database",
            config.backend_name()
        );
        Ok(Self {
            conn,
            backend,
            log_statements: logging.log_statements.unwrap_or(true),
            slow_statement: Duration::from_millis(
                logging.slow_statement_ms.unwrap_or(DEFAULT_SLOW_STATEMENT_MS),
            ),
        })
    }

    pub fn backend(&self) -> DatabaseBackend {
        self.backend
    }

    pub fn dialect(&self) -> Box<dyn Dialect> {
        dialect_for(self.backend)
    }

    /// Opens a transaction and wraps it in a session.
    pub async fn session(&self) -> TabulaResult<Session> {
        let transaction = self.conn.begin().await.map_err(TabulaError::from)?;
        let mut session = Session::new(Box::new(SeaOrmConnection::new(transaction)));
        if self.log_statements {
            let listener = LogStatementListener::new(session.id().to_string(), self.slow_statement);
            session.add_listener(Arc::new(listener));
        }
        Ok(session)
    }

    /// A session carrying its own entity cache.
    pub async fn begin(&self) -> TabulaResult<Transaction> {
        Ok(Transaction::new(self.session().await?))
    }
}

fn build_connection_url(config: &TabulaConfig, base_dir: &Path) -> TabulaResult<String> {
    match &config.database {
        DatabaseConfig::Sqlite { .. } => {
            let path = config.sqlite_path(base_dir)?;
            Ok(format!("sqlite://{}?mode=rwc", path.display()))
        }
        DatabaseConfig::Postgres { url } => Ok(url.clone()),
        DatabaseConfig::Mysql { url } => Ok(url.clone()),
    }
}

/// One connection-bound unit of work. Every statement runs through here so
/// listeners see it.
pub struct Session {
    id: Uuid,
    connection: Box<dyn Connection>,
    listeners: Vec<Arc<dyn StatementListener>>,
}

impl Session {
    pub fn new(connection: Box<dyn Connection>) -> Self {
        Self {
            id: Uuid::new_v4(),
            connection,
            listeners: Vec::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn add_listener(&mut self, listener: Arc<dyn StatementListener>) {
        self.listeners.push(listener);
    }

    pub fn remove_listener(&mut self, listener: &Arc<dyn StatementListener>) {
        self.listeners
            .retain(|candidate| !Arc::ptr_eq(candidate, listener));
    }

    pub fn dialect(&self) -> &dyn Dialect {
        self.connection.dialect()
    }

    pub fn quote_identifier(&self, name: &str) -> String {
        self.connection.quote_identifier(name)
    }

    fn notify_before(&self, context: &StatementContext) {
        for listener in &self.listeners {
            listener.before_execution(context);
        }
    }

    fn notify_after(&self, contexts: &[StatementContext], outcome: &ExecutionOutcome, started: Instant) {
        let elapsed = started.elapsed();
        for listener in &self.listeners {
            listener.after_execution(contexts, outcome, elapsed);
        }
    }

    fn outcome_of<T>(result: &TabulaResult<T>, success: impl FnOnce(&T) -> ExecutionOutcome) -> ExecutionOutcome {
        match result {
            Ok(value) => success(value),
            Err(err) => ExecutionOutcome::Failed(err.to_string()),
        }
    }

    pub async fn prepare(&mut self, sql: &str, key_columns: &[Column]) -> TabulaResult<PreparedHandle> {
        self.connection.prepare(sql, key_columns).await
    }

    /// Raw rows, one value per entry of `result_types`.
    pub async fn run_query(
        &mut self,
        sql: &str,
        args: Vec<Argument>,
        result_types: &[ColumnType],
    ) -> TabulaResult<Vec<Vec<Value>>> {
        let context = StatementContext::new(sql, args);
        self.notify_before(&context);
        let started = Instant::now();
        let result = match self.prepare(sql, &[]).await {
            Ok(handle) => {
                self.connection
                    .execute_query(&handle, &context.args, result_types)
                    .await
            }
            Err(err) => Err(err),
        };
        let outcome = Self::outcome_of(&result, |rows| ExecutionOutcome::Rows(rows.len()));
        self.notify_after(std::slice::from_ref(&context), &outcome, started);
        result
    }

    /// Returns the affected row count and any keys generated for
    /// `key_columns`.
    pub async fn run_update(
        &mut self,
        sql: &str,
        args: Vec<Argument>,
        key_columns: &[Column],
    ) -> TabulaResult<(u64, Vec<Vec<Value>>)> {
        let context = StatementContext::new(sql, args);
        self.notify_before(&context);
        let started = Instant::now();
        let result = match self.prepare(sql, key_columns).await {
            Ok(mut handle) => match self
                .connection
                .execute_update(&mut handle, &context.args)
                .await
            {
                Ok(count) => Ok((count, handle.generated_keys().to_vec())),
                Err(err) => Err(err),
            },
            Err(err) => Err(err),
        };
        let outcome = Self::outcome_of(&result, |(count, _)| ExecutionOutcome::Updated(vec![*count]));
        self.notify_after(std::slice::from_ref(&context), &outcome, started);
        result
    }

    /// One template executed against every argument set.
    pub async fn run_batch(
        &mut self,
        sql: &str,
        batch: Vec<Vec<Argument>>,
        key_columns: &[Column],
    ) -> TabulaResult<(Vec<u64>, Vec<Vec<Value>>)> {
        let contexts: Vec<StatementContext> = batch
            .into_iter()
            .map(|args| StatementContext::new(sql, args))
            .collect();
        for context in &contexts {
            self.notify_before(context);
        }
        let started = Instant::now();
        let arguments: Vec<Vec<Argument>> =
            contexts.iter().map(|context| context.args.clone()).collect();
        let result = match self.prepare(sql, key_columns).await {
            Ok(mut handle) => match self.connection.execute_batch(&mut handle, &arguments).await {
                Ok(counts) => Ok((counts, handle.generated_keys().to_vec())),
                Err(err) => Err(err),
            },
            Err(err) => Err(err),
        };
        let outcome = Self::outcome_of(&result, |(counts, _)| ExecutionOutcome::Updated(counts.clone()));
        self.notify_after(&contexts, &outcome, started);
        result
    }

    /// Runs a statement without arguments, such as DDL.
    pub async fn execute(&mut self, sql: &str) -> TabulaResult<u64> {
        Ok(self.run_update(sql, Vec::new(), &[]).await?.0)
    }

    /// Renders and runs a select, converting every value through the type of
    /// its field.
    pub async fn select_rows(&mut self, select: &Select) -> TabulaResult<Vec<ResultRow>> {
        let fields = Arc::new(select.fields().to_vec());
        let (sql, args) = {
            let mut builder = QueryBuilder::new(self.dialect());
            let sql = select.to_sql(&mut builder)?;
            (sql, builder.into_args())
        };
        let types: Vec<ColumnType> = fields.iter().map(|field| field.column_type()).collect();
        let rows = self.run_query(&sql, args, &types).await?;
        rows.into_iter()
            .map(|raw| ResultRow::from_raw(Arc::clone(&fields), raw))
            .collect()
    }

    pub async fn commit(self) -> TabulaResult<()> {
        self.connection.commit().await
    }

    pub async fn rollback(self) -> TabulaResult<()> {
        self.connection.rollback().await
    }
}
