use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use tabula_core::{TabulaError, TabulaResult};

const DEFAULT_CONFIG_NAME: &str = "tabula.json";
const DEFAULT_SQLITE_NAME: &str = "tabula.sqlite";

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum DatabaseConfig {
    Sqlite { path: Option<String> },
    Postgres { url: String },
    Mysql { url: String },
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PoolConfig {
    pub max_connections: Option<u32>,
    pub min_connections: Option<u32>,
    pub connect_timeout_ms: Option<u64>,
    pub acquire_timeout_ms: Option<u64>,
    pub idle_timeout_ms: Option<u64>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub log_statements: Option<bool>,
    pub slow_statement_ms: Option<u64>,
}

impl LoggingConfig {
    pub fn with_defaults() -> Self {
        Self {
            log_statements: Some(true),
            slow_statement_ms: Some(500),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TabulaConfig {
    pub database: DatabaseConfig,
    pub pool: Option<PoolConfig>,
    pub logging: Option<LoggingConfig>,
}

impl TabulaConfig {
    pub fn default_sqlite(path: impl Into<String>) -> Self {
        Self {
            database: DatabaseConfig::Sqlite {
                path: Some(path.into()),
            },
            pool: None,
            logging: Some(LoggingConfig::with_defaults()),
        }
    }

    /// Reads `tabula.json` from `base_dir`, writing a sqlite default there
    /// first if it does not exist yet.
    pub fn load_or_init(base_dir: &Path) -> TabulaResult<Self> {
        fs::create_dir_all(base_dir)
            .map_err(|err| TabulaError::config(format!("create config dir: {err}")))?;
        let config_path = base_dir.join(DEFAULT_CONFIG_NAME);
        if config_path.exists() {
            let raw = fs::read_to_string(&config_path)
                .map_err(|err| TabulaError::config(format!("read config: {err}")))?;
            let config: TabulaConfig = serde_json::from_str(&raw)
                .map_err(|err| TabulaError::config(format!("parse config: {err}")))?;
            return Ok(config);
        }
        let default = TabulaConfig::default_sqlite(DEFAULT_SQLITE_NAME);
        let payload = serde_json::to_string_pretty(&default)
            .map_err(|err| TabulaError::config(format!("serialize config: {err}")))?;
        fs::write(&config_path, payload)
            .map_err(|err| TabulaError::config(format!("write config: {err}")))?;
        Ok(default)
    }

    pub fn sqlite_path(&self, base_dir: &Path) -> TabulaResult<PathBuf> {
        match &self.database {
            DatabaseConfig::Sqlite { path } => {
                let path = path
                    .clone()
                    .unwrap_or_else(|| DEFAULT_SQLITE_NAME.to_string());
                let candidate = PathBuf::from(path);
                if candidate.is_absolute() {
                    Ok(candidate)
                } else {
                    Ok(base_dir.join(candidate))
                }
            }
            _ => Err(TabulaError::config("config is not sqlite backend")),
        }
    }

    pub fn backend_name(&self) -> &'static str {
        match self.database {
            DatabaseConfig::Sqlite { .. } => "sqlite",
            DatabaseConfig::Postgres { .. } => "postgres",
            DatabaseConfig::Mysql { .. } => "mysql",
        }
    }

    pub fn connection_url(&self) -> Option<&str> {
        match &self.database {
            DatabaseConfig::Sqlite { .. } => None,
            DatabaseConfig::Postgres { url } | DatabaseConfig::Mysql { url } => Some(url.as_str()),
        }
    }

    pub fn logging(&self) -> LoggingConfig {
        self.logging.clone().unwrap_or_default()
    }
}
