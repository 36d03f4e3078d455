use async_trait::async_trait;

use crate::db::connection::Database;
use crate::db::kv::KvRepository;
use crate::db::traits::Persistence;
use crate::error::Result;
use crate::models::Store;

/// Key under which the whole store document lives.
pub const STORE_KEY: &str = "store";

pub struct LibSqlPersistence {
    db: Database,
}

impl LibSqlPersistence {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl Persistence for LibSqlPersistence {
    async fn load(&self) -> Result<Store> {
        let conn = self.db.connect()?;
        match KvRepository::get(&conn, STORE_KEY).await? {
            Some(text) => Store::from_json(&text),
            None => Ok(Store::default()),
        }
    }

    async fn save(&self, store: &Store) -> Result<()> {
        let conn = self.db.connect()?;
        let text = store.to_json()?;
        KvRepository::set(&conn, STORE_KEY, &text).await?;
        tracing::debug!(players = store.len(), bytes = text.len(), "Store flushed");
        Ok(())
    }
}
