pub mod config;
pub mod connection;
pub mod dao;
pub mod entity;
pub mod listener;
pub mod query;
pub mod session;
pub mod sized;
pub mod statements;
pub mod transaction;

pub use tabula_core::*;

pub use config::{DatabaseConfig, LoggingConfig, PoolConfig, TabulaConfig};
pub use connection::{Connection, PreparedHandle, SeaOrmConnection, dialect_for};
pub use dao::{EntityClass, InnerTableLink, Reference, Referrers, View};
pub use entity::{Entity, EntityCache, EntityKey};
pub use listener::{ExecutionOutcome, LogStatementListener, StatementContext, StatementListener};
pub use query::Query;
pub use session::{Database, Session};
pub use sized::{LazySizedCollection, SizedIterable};
pub use statements::{
    BatchUpdate, BatchUpdateStatement, DeleteStatement, InsertSelectStatement, InsertStatement,
    ReplaceStatement, UpdateStatement,
};
pub use transaction::Transaction;
