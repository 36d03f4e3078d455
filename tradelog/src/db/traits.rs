use async_trait::async_trait;

use crate::error::Result;
use crate::models::Store;

/// Durable home of the tracked-player store.
///
/// `save` replaces the whole document; there is no partial write.
#[async_trait]
pub trait Persistence: Send + Sync {
    /// Load the last saved store. A missing document yields an empty store.
    async fn load(&self) -> Result<Store>;
    async fn save(&self, store: &Store) -> Result<()>;
}
