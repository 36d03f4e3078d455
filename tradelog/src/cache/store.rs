use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::db::Persistence;
use crate::error::{Result, TradeLogError};
use crate::models::{fallback_name, PlayerRecord, Store};

use super::guard::RefreshGuard;
use super::merge::merge;

/// Outcome of merging an imported store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportSummary {
    pub received: usize,
    pub created: usize,
    pub total: usize,
}

/// Keyed store of tracked counterparties, flushed on every change.
///
/// Mutations build the next store, persist it, and only then replace the
/// in-memory copy, so a failed flush leaves the previous state untouched.
pub struct CacheStore {
    persistence: Arc<dyn Persistence>,
    state: Mutex<Store>,
    guard: RefreshGuard,
}

impl CacheStore {
    /// Load the persisted store. An unreadable document is replaced by an
    /// empty store on the next flush.
    pub async fn open(persistence: Arc<dyn Persistence>) -> Result<Self> {
        let store = match persistence.load().await {
            Ok(store) => store,
            Err(TradeLogError::InvalidImport(reason)) => {
                warn!(error = %reason, "Persisted store is corrupt, starting empty");
                Store::default()
            }
            Err(e) => return Err(e),
        };
        info!(players = store.len(), "Cache store loaded");

        Ok(Self {
            persistence,
            state: Mutex::new(store),
            guard: RefreshGuard::new(),
        })
    }

    pub async fn get(&self, id: &str) -> Option<PlayerRecord> {
        self.state.lock().await.get(id).cloned()
    }

    /// All records ordered by id.
    pub async fn list(&self) -> Vec<PlayerRecord> {
        self.state.lock().await.players.values().cloned().collect()
    }

    pub async fn snapshot(&self) -> Store {
        self.state.lock().await.clone()
    }

    /// Create or update the record for `id` and persist the result.
    ///
    /// A new record is named `name` or `Player <id>`. An existing record
    /// takes `name` when it is non-empty and differs. When neither the name
    /// nor `mutator` changes anything, nothing is written.
    pub async fn upsert<F>(&self, id: &str, name: Option<&str>, mutator: F) -> Result<PlayerRecord>
    where
        F: FnOnce(&mut PlayerRecord),
    {
        let id = id.trim();
        if id.is_empty() {
            return Err(TradeLogError::MissingCounterparty);
        }
        let name = name.map(str::trim).filter(|n| !n.is_empty());

        let mut state = self.state.lock().await;
        let existing = state.get(id).cloned();
        let mut record = match &existing {
            Some(record) => record.clone(),
            None => PlayerRecord::new(id, name.map_or_else(|| fallback_name(id), str::to_string)),
        };

        if let Some(name) = name {
            if record.name != name {
                record.name = name.to_string();
            }
        }
        mutator(&mut record);

        if existing.as_ref() == Some(&record) {
            debug!(counterparty_id = %id, "Upsert changed nothing, skipping flush");
            return Ok(record);
        }

        let mut next = state.clone();
        next.players.insert(id.to_string(), record.clone());
        self.persistence.save(&next).await?;
        *state = next;

        debug!(counterparty_id = %id, created = existing.is_none(), "Record saved");
        Ok(record)
    }

    /// Merge an imported store into the live one and persist it.
    pub async fn import(&self, incoming: &Store) -> Result<ImportSummary> {
        let mut state = self.state.lock().await;
        let created = incoming
            .players
            .keys()
            .filter(|id| !state.players.contains_key(*id))
            .count();

        let next = merge(state.clone(), incoming);
        if next != *state {
            self.persistence.save(&next).await?;
            *state = next;
        }

        let summary = ImportSummary {
            received: incoming.len(),
            created,
            total: state.len(),
        };
        info!(
            received = summary.received,
            created = summary.created,
            total = summary.total,
            "Import merged"
        );
        Ok(summary)
    }

    pub fn guard(&self) -> &RefreshGuard {
        &self.guard
    }

    /// Tear down pending re-verifications.
    pub fn shutdown(&self) {
        self.guard.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryPersistence;
    use crate::models::SummaryStats;
    use chrono::Utc;
    use pretty_assertions::assert_eq;

    async fn open_with(persistence: Arc<MemoryPersistence>) -> CacheStore {
        CacheStore::open(persistence).await.unwrap()
    }

    #[tokio::test]
    async fn test_upsert_creates_with_fallback_name() {
        let persistence = Arc::new(MemoryPersistence::new());
        let cache = open_with(persistence.clone()).await;

        let record = cache.upsert("555", None, |_| {}).await.unwrap();
        assert_eq!(record.name, "Player 555");
        assert_eq!(persistence.save_count(), 1);
        assert_eq!(cache.get("555").await, Some(record));
    }

    #[tokio::test]
    async fn test_most_recent_non_empty_name_wins() {
        let cache = open_with(Arc::new(MemoryPersistence::new())).await;

        cache.upsert("555", Some("Dyhr"), |_| {}).await.unwrap();
        cache.upsert("555", Some("  "), |_| {}).await.unwrap();
        assert_eq!(cache.get("555").await.unwrap().name, "Dyhr");

        cache.upsert("555", Some("Dyhr2"), |_| {}).await.unwrap();
        assert_eq!(cache.get("555").await.unwrap().name, "Dyhr2");
    }

    #[tokio::test]
    async fn test_identical_upsert_skips_flush() {
        let persistence = Arc::new(MemoryPersistence::new());
        let cache = open_with(persistence.clone()).await;

        cache
            .upsert("555", Some("Dyhr"), |r| r.notes = "ok".into())
            .await
            .unwrap();
        cache
            .upsert("555", Some("Dyhr"), |r| r.notes = "ok".into())
            .await
            .unwrap();

        assert_eq!(persistence.save_count(), 1);
    }

    #[tokio::test]
    async fn test_failed_flush_leaves_store_untouched() {
        let cache = open_with(Arc::new(MemoryPersistence::failing())).await;

        let result = cache.upsert("555", Some("Dyhr"), |r| r.marked = true).await;
        assert!(result.is_err());
        assert!(cache.get("555").await.is_none());
    }

    #[tokio::test]
    async fn test_blank_id_is_rejected() {
        let cache = open_with(Arc::new(MemoryPersistence::new())).await;
        assert!(matches!(
            cache.upsert(" ", None, |_| {}).await,
            Err(TradeLogError::MissingCounterparty)
        ));
    }

    #[tokio::test]
    async fn test_import_merges_and_reports() {
        let persistence = Arc::new(MemoryPersistence::new());
        let cache = open_with(persistence.clone()).await;
        cache
            .upsert("1", Some("One"), |r| r.notes = "mine".into())
            .await
            .unwrap();

        let mut incoming = Store::default();
        let mut one = PlayerRecord::new("1", "Uno");
        one.notes = "theirs".into();
        one.stats = Some(SummaryStats::empty(Utc::now(), 3));
        incoming.players.insert("1".into(), one);
        incoming
            .players
            .insert("2".into(), PlayerRecord::new("2", "Two"));

        let summary = cache.import(&incoming).await.unwrap();
        assert_eq!(
            summary,
            ImportSummary {
                received: 2,
                created: 1,
                total: 2
            }
        );

        let one = cache.get("1").await.unwrap();
        assert_eq!(one.name, "One");
        assert_eq!(one.notes, "mine\n---\ntheirs");
        assert!(one.stats.is_some());

        let saves = persistence.save_count();
        cache.import(&incoming).await.unwrap();
        assert_eq!(persistence.save_count(), saves);
    }

    #[tokio::test]
    async fn test_reopen_sees_flushed_state() {
        let persistence = Arc::new(MemoryPersistence::new());
        {
            let cache = open_with(persistence.clone()).await;
            cache.upsert("9", Some("Nine"), |r| r.marked = true).await.unwrap();
        }
        let cache = open_with(persistence).await;
        assert!(cache.get("9").await.unwrap().marked);
        assert_eq!(cache.list().await.len(), 1);
    }
}
