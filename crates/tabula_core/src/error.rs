use thiserror::Error;

#[derive(Debug, Error)]
pub enum TabulaError {
    #[error("type mismatch: {message}")]
    TypeMismatch { message: String },
    #[error("null comparison: {message}")]
    NullComparison { message: String },
    #[error("no join path: {message}")]
    NoJoinPath { message: String },
    #[error("ambiguous join: {message}")]
    AmbiguousJoin { message: String },
    #[error("duplicate assignment: {message}")]
    DuplicateAssignment { message: String },
    #[error("inconsistent batch data: {message}")]
    BatchDataInconsistent { message: String },
    #[error("no generated key: {message}")]
    NoGeneratedKey { message: String },
    #[error("frozen query: {message}")]
    FrozenQuery { message: String },
    #[error("no target table: {message}")]
    NoTargetTable { message: String },
    #[error("statement reused: {message}")]
    StatementReused { message: String },
    #[error("unsupported by dialect: {message}")]
    Unsupported { message: String },
    #[error("invalid input: {message}")]
    Invalid { message: String },
    #[error("config error: {message}")]
    Config { message: String },
    #[error("database error: {message} (sql: {sql}, arguments: [{arguments}])")]
    Database {
        message: String,
        sql: String,
        arguments: String,
    },
}

impl TabulaError {
    pub fn type_mismatch(message: impl Into<String>) -> Self {
        Self::TypeMismatch {
            message: message.into(),
        }
    }

    pub fn null_comparison(message: impl Into<String>) -> Self {
        Self::NullComparison {
            message: message.into(),
        }
    }

    pub fn no_join_path(message: impl Into<String>) -> Self {
        Self::NoJoinPath {
            message: message.into(),
        }
    }

    pub fn ambiguous_join(message: impl Into<String>) -> Self {
        Self::AmbiguousJoin {
            message: message.into(),
        }
    }

    pub fn duplicate_assignment(message: impl Into<String>) -> Self {
        Self::DuplicateAssignment {
            message: message.into(),
        }
    }

    pub fn batch_inconsistent(message: impl Into<String>) -> Self {
        Self::BatchDataInconsistent {
            message: message.into(),
        }
    }

    pub fn no_generated_key(message: impl Into<String>) -> Self {
        Self::NoGeneratedKey {
            message: message.into(),
        }
    }

    pub fn frozen(message: impl Into<String>) -> Self {
        Self::FrozenQuery {
            message: message.into(),
        }
    }

    pub fn no_target_table(message: impl Into<String>) -> Self {
        Self::NoTargetTable {
            message: message.into(),
        }
    }

    pub fn reused(message: impl Into<String>) -> Self {
        Self::StatementReused {
            message: message.into(),
        }
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::Unsupported {
            message: message.into(),
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn database(
        message: impl Into<String>,
        sql: impl Into<String>,
        arguments: impl Into<String>,
    ) -> Self {
        Self::Database {
            message: message.into(),
            sql: sql.into(),
            arguments: arguments.into(),
        }
    }

    /// True for errors raised by local precondition checks, before any SQL
    /// reaches the connection.
    pub fn is_local(&self) -> bool {
        !matches!(self, Self::Database { .. } | Self::Config { .. })
    }
}

pub type TabulaResult<T> = Result<T, TabulaError>;

impl From<sea_orm::DbErr> for TabulaError {
    fn from(value: sea_orm::DbErr) -> Self {
        TabulaError::database(value.to_string(), "", "")
    }
}
