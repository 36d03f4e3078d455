use libsql::{Builder, Connection};
use std::sync::Arc;

use crate::config::DatabaseConfig;
use crate::error::Result;

use super::schema;

/// Writers wait this long for a lock before failing.
const BUSY_TIMEOUT_MS: u64 = 5000;

/// Where the store lives, decided from `DATABASE_URL` and friends.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Location {
    Memory,
    File(String),
    Remote { url: String, token: String },
    Replica { path: String, url: String, token: String },
}

impl Location {
    fn from_config(config: &DatabaseConfig) -> Self {
        let url = config.url.trim();
        if url.starts_with("libsql://") || url.starts_with("https://") {
            let token = config.auth_token.clone().unwrap_or_default();
            return match &config.local_path {
                Some(path) => Self::Replica {
                    path: path.clone(),
                    url: url.to_string(),
                    token,
                },
                None => Self::Remote {
                    url: url.to_string(),
                    token,
                },
            };
        }
        if url == ":memory:" {
            return Self::Memory;
        }
        Self::File(url.strip_prefix("file:").unwrap_or(url).to_string())
    }

    /// Pragmas only make sense against a SQLite file we own.
    fn is_local_file(&self) -> bool {
        matches!(self, Self::File(_) | Self::Replica { .. })
    }
}

/// Shared handle to the libsql database holding the store.
#[derive(Clone)]
pub struct Database {
    db: Arc<libsql::Database>,
}

impl Database {
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        let location = Location::from_config(config);
        let db = match &location {
            Location::Memory => Builder::new_local(":memory:").build().await?,
            Location::File(path) => Builder::new_local(path).build().await?,
            Location::Remote { url, token } => {
                Builder::new_remote(url.clone(), token.clone()).build().await?
            }
            Location::Replica { path, url, token } => {
                Builder::new_remote_replica(path, url.clone(), token.clone())
                    .build()
                    .await?
            }
        };

        let database = Self { db: Arc::new(db) };
        let conn = database.connect()?;
        if location.is_local_file() {
            apply_pragmas(&conn).await;
        }
        schema::init_schema(&conn).await?;

        tracing::debug!(url = %redact_url(&config.url), "Database ready");
        Ok(database)
    }

    pub fn connect(&self) -> Result<Connection> {
        Ok(self.db.connect()?)
    }

    /// Push local writes to the primary when running as an embedded replica.
    pub async fn sync(&self) -> Result<()> {
        if let Ok(sync) = self.db.sync().await {
            tracing::info!("Database synced: {:?}", sync);
        }
        Ok(())
    }
}

async fn apply_pragmas(conn: &Connection) {
    let pragmas = [
        format!("PRAGMA busy_timeout = {BUSY_TIMEOUT_MS}"),
        "PRAGMA journal_mode = WAL".to_string(),
    ];
    for pragma in &pragmas {
        if let Err(error) = conn.execute_batch(pragma).await {
            tracing::warn!(%pragma, %error, "Failed to apply SQLite pragma");
        }
    }
}

fn redact_url(url: &str) -> &str {
    url.split('?').next().unwrap_or(url)
}
