use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::db::traits::Persistence;
use crate::error::{Result, TradeLogError};
use crate::models::Store;

/// Process-local persistence for tests and one-shot commands.
#[derive(Default)]
pub struct MemoryPersistence {
    store: Mutex<Store>,
    saves: AtomicUsize,
    fail_saves: bool,
}

impl MemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_store(store: Store) -> Self {
        Self {
            store: Mutex::new(store),
            ..Self::default()
        }
    }

    /// A backend whose every save fails, for exercising flush errors.
    pub fn failing() -> Self {
        Self {
            fail_saves: true,
            ..Self::default()
        }
    }

    /// Number of successful saves so far.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Store>> {
        self.store
            .lock()
            .map_err(|_| TradeLogError::Internal("memory store lock poisoned".to_string()))
    }
}

#[async_trait]
impl Persistence for MemoryPersistence {
    async fn load(&self) -> Result<Store> {
        Ok(self.lock()?.clone())
    }

    async fn save(&self, store: &Store) -> Result<()> {
        if self.fail_saves {
            return Err(TradeLogError::Internal("save rejected".to_string()));
        }
        *self.lock()? = store.clone();
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
