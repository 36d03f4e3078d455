use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::cache::{human_age, is_stale, CacheStore, RecheckTicket};
use crate::config::{clamp_history_years, TrackerConfig};
use crate::error::{Result, TradeLogError};
use crate::fetch::{FetchOptions, WindowedFetcher};
use crate::models::{clean_name, Counterparty, ManualEntry, PlayerRecord, TradeDirection};

/// Per-call overrides of the configured fetch options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshOverrides {
    pub history_years: Option<u32>,
    pub name_fallback: Option<bool>,
}

/// Where the stats in a view came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StatsSource {
    Cached,
    Live,
}

impl StatsSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cached => "cached",
            Self::Live => "live",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PlayerView {
    pub record: PlayerRecord,
    pub source: StatsSource,
    pub stale: bool,
    /// Age of the cached stats, e.g. `3h`.
    pub age: Option<String>,
    /// Set when an automatic refresh was attempted and failed.
    pub refresh_error: Option<String>,
}

/// Editable fields of a tracked player.
#[derive(Debug, Clone, Default)]
pub struct PlayerPatch {
    pub name: Option<String>,
    pub notes: Option<String>,
    pub marked: Option<bool>,
}

/// Orchestrates refreshes against the cache: fail-fast checks, one fetch per
/// id, cache write and the one-shot re-verification.
#[derive(Clone)]
pub struct TrackerService {
    cache: Arc<CacheStore>,
    fetcher: WindowedFetcher,
    config: TrackerConfig,
}

impl TrackerService {
    pub fn new(cache: Arc<CacheStore>, fetcher: WindowedFetcher, config: TrackerConfig) -> Self {
        Self {
            cache,
            fetcher,
            config: config.normalized(),
        }
    }

    pub fn cache(&self) -> &Arc<CacheStore> {
        &self.cache
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    fn options(&self, overrides: RefreshOverrides) -> FetchOptions {
        FetchOptions {
            history_years: clamp_history_years(
                overrides.history_years.unwrap_or(self.config.history_years),
            ),
            allow_name_fallback: overrides.name_fallback.unwrap_or(self.config.name_fallback),
        }
    }

    /// Fetch fresh stats for a counterparty and store them.
    ///
    /// Fails before any network call when the id or the credential is
    /// missing, or when a fetch for the same id is already running.
    pub async fn refresh(
        &self,
        id: Option<&str>,
        name: Option<&str>,
        overrides: RefreshOverrides,
    ) -> Result<PlayerRecord> {
        let target = Counterparty::resolve(id, name)?;
        let observed = observed_name(name);
        self.run_refresh(target, observed, self.options(overrides), true)
            .await
    }

    async fn run_refresh(
        &self,
        target: Counterparty,
        observed: Option<String>,
        options: FetchOptions,
        allow_recheck: bool,
    ) -> Result<PlayerRecord> {
        if !self.fetcher.has_credential() {
            return Err(TradeLogError::MissingCredential);
        }

        let permit = self.cache.guard().try_acquire(&target.id)?;

        let cached = self.cache.get(&target.id).await;
        let previous_count = cached.as_ref().and_then(|r| r.stats.as_ref()).map(|s| s.count);

        // Name fallback matching needs a real name, not the placeholder.
        let match_target = match (&observed, &cached) {
            (Some(_), _) => target.clone(),
            (None, Some(record)) => Counterparty::new(&target.id, Some(&record.name)),
            (None, None) => target.clone(),
        };

        info!(
            counterparty_id = %target.id,
            history_years = options.history_years,
            name_fallback = options.allow_name_fallback,
            "Refreshing trade history"
        );

        let stats = match self.fetcher.fetch(&match_target, &options).await {
            Ok(stats) => stats,
            Err(e) => {
                if e.is_fetch_failure() {
                    warn!(counterparty_id = %target.id, error = %e, "Trade history fetch failed");
                } else {
                    error!(counterparty_id = %target.id, error = %e, "Trade history sweep aborted");
                }
                return Err(e);
            }
        };
        let new_count = stats.count;

        let record = self
            .cache
            .upsert(&target.id, observed.as_deref(), move |r| r.stats = Some(stats))
            .await?;

        // Scheduled while the permit is held so a fetch that starts right
        // after always finds the ticket to cancel.
        if allow_recheck && previous_count.is_some_and(|prev| new_count <= prev) {
            self.schedule_recheck(target, observed, options);
        }
        drop(permit);

        Ok(record)
    }

    fn schedule_recheck(&self, target: Counterparty, observed: Option<String>, options: FetchOptions) {
        let ticket = self.cache.guard().schedule_recheck(&target.id);
        if ticket.token.is_cancelled() {
            return;
        }
        let delay = Duration::from_secs(self.config.recheck_delay_secs);
        debug!(
            counterparty_id = %target.id,
            delay_secs = delay.as_secs(),
            "Count did not grow, scheduling re-verification"
        );

        let service = self.clone();
        tokio::spawn(async move {
            service.run_recheck(ticket, target, observed, options, delay).await;
        });
    }

    async fn run_recheck(
        &self,
        ticket: RecheckTicket,
        target: Counterparty,
        observed: Option<String>,
        options: FetchOptions,
        delay: Duration,
    ) {
        tokio::select! {
            _ = ticket.token.cancelled() => {
                debug!(counterparty_id = %ticket.id, "Re-verification cancelled");
            }
            _ = tokio::time::sleep(delay) => {
                self.cache.guard().complete_recheck(&ticket);
                match self.run_refresh(target, observed, options, false).await {
                    Ok(record) => info!(
                        counterparty_id = %ticket.id,
                        count = record.stats.as_ref().map_or(0, |s| s.count),
                        "Re-verification complete"
                    ),
                    Err(e) => warn!(
                        counterparty_id = %ticket.id,
                        error = %e,
                        "Re-verification failed"
                    ),
                }
            }
        }
    }

    /// Show a counterparty, refreshing first when the cached stats are stale,
    /// auto-refresh is enabled and a credential is configured.
    ///
    /// A failed automatic refresh is reported in the view; the cached record
    /// is still returned.
    pub async fn view(&self, id: &str, name: Option<&str>) -> Result<PlayerView> {
        self.view_at(id, name, Utc::now()).await
    }

    pub async fn view_at(&self, id: &str, name: Option<&str>, now: DateTime<Utc>) -> Result<PlayerView> {
        let target = Counterparty::resolve(Some(id), name)?;
        let observed = observed_name(name);
        let record = self.cache.upsert(&target.id, observed.as_deref(), |_| {}).await?;

        let options = self.options(RefreshOverrides::default());
        let stale = is_stale(&record, self.config.cache_days, options.history_years, now);

        if stale && self.config.auto_refresh && self.fetcher.has_credential() {
            match self.run_refresh(target, observed, options, true).await {
                Ok(record) => {
                    return Ok(PlayerView {
                        record,
                        source: StatsSource::Live,
                        stale: false,
                        age: None,
                        refresh_error: None,
                    })
                }
                Err(e) => return Ok(cached_view(record, true, now, Some(e.to_string()))),
            }
        }

        Ok(cached_view(record, stale, now, None))
    }

    pub async fn list(&self) -> Vec<PlayerRecord> {
        self.cache.list().await
    }

    pub async fn set_notes(&self, id: &str, notes: &str) -> Result<PlayerRecord> {
        self.update(
            id,
            PlayerPatch {
                notes: Some(notes.to_string()),
                ..PlayerPatch::default()
            },
        )
        .await
    }

    /// Set the mark, or flip it when `marked` is `None`.
    pub async fn set_marked(&self, id: &str, marked: Option<bool>) -> Result<PlayerRecord> {
        let target = Counterparty::resolve(Some(id), None)?;
        self.cache
            .upsert(&target.id, None, |r| r.marked = marked.unwrap_or(!r.marked))
            .await
    }

    pub async fn update(&self, id: &str, patch: PlayerPatch) -> Result<PlayerRecord> {
        let target = Counterparty::resolve(Some(id), None)?;
        let name = observed_name(patch.name.as_deref());
        self.cache
            .upsert(&target.id, name.as_deref(), |r| {
                if let Some(notes) = patch.notes {
                    r.notes = notes;
                }
                if let Some(marked) = patch.marked {
                    r.marked = marked;
                }
            })
            .await
    }

    /// Log a trade by hand, at `at` or now. Works without a credential.
    pub async fn log_entry(
        &self,
        id: &str,
        name: Option<&str>,
        dir: TradeDirection,
        at: Option<DateTime<Utc>>,
    ) -> Result<PlayerRecord> {
        let target = Counterparty::resolve(Some(id), name)?;
        let observed = observed_name(name);
        let entry = ManualEntry {
            at: at.unwrap_or_else(Utc::now),
            dir,
        };
        let record = self
            .cache
            .upsert(&target.id, observed.as_deref(), |r| r.entries.push(entry))
            .await?;
        debug!(counterparty_id = %target.id, dir = dir.as_str(), "Logged manual entry");
        Ok(record)
    }

    /// Remove the most recently logged manual entry.
    pub async fn undo_entry(&self, id: &str) -> Result<PlayerRecord> {
        let target = Counterparty::resolve(Some(id), None)?;
        let has_entries = self
            .cache
            .get(&target.id)
            .await
            .is_some_and(|r| !r.entries.is_empty());
        if !has_entries {
            return Err(TradeLogError::NotFound(format!(
                "No manual entries to undo for {}",
                target.id
            )));
        }

        self.cache
            .upsert(&target.id, None, |r| {
                r.entries.pop();
            })
            .await
    }
}

fn observed_name(name: Option<&str>) -> Option<String> {
    name.map(clean_name).filter(|n| !n.is_empty())
}

fn cached_view(
    record: PlayerRecord,
    stale: bool,
    now: DateTime<Utc>,
    refresh_error: Option<String>,
) -> PlayerView {
    let age = record.stats.as_ref().map(|s| human_age(s.fetched_at, now));
    PlayerView {
        record,
        source: StatsSource::Cached,
        stale,
        age,
        refresh_error,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FetchConfig;
    use crate::db::MemoryPersistence;
    use crate::fetch::Transport;
    use crate::models::SummaryStats;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use url::Url;

    /// Returns the same page for every chunk and counts calls.
    struct FixedTransport {
        body: String,
        calls: AtomicUsize,
    }

    impl FixedTransport {
        fn new(body: serde_json::Value) -> Arc<Self> {
            Arc::new(Self {
                body: body.to_string(),
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Transport for FixedTransport {
        async fn fetch_page(&self, _url: &Url) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.body.clone())
        }
    }

    fn one_chunk_config() -> FetchConfig {
        FetchConfig {
            chunk_secs: 10 * 365 * 86_400,
            inter_chunk_delay_ms: 0,
            ..FetchConfig::default()
        }
    }

    async fn service(
        transport: Arc<FixedTransport>,
        api_key: Option<&str>,
        config: TrackerConfig,
    ) -> TrackerService {
        let cache = Arc::new(
            CacheStore::open(Arc::new(MemoryPersistence::new()))
                .await
                .unwrap(),
        );
        let fetcher = WindowedFetcher::new(transport, one_chunk_config(), api_key.map(String::from));
        TrackerService::new(cache, fetcher, config)
    }

    fn page_with_one_trade() -> serde_json::Value {
        let ts = Utc::now().timestamp() - 86_400;
        json!({"log": [{"category": "Trades", "title": "Trade accepted", "timestamp": ts, "data": {"user": 555}}]})
    }

    #[tokio::test]
    async fn test_refresh_stores_stats() {
        let transport = FixedTransport::new(page_with_one_trade());
        let tracker = service(transport.clone(), Some("k"), TrackerConfig::default()).await;

        let record = tracker
            .refresh(Some("555"), Some("Dyhr"), RefreshOverrides::default())
            .await
            .unwrap();

        assert_eq!(record.name, "Dyhr");
        assert_eq!(record.stats.as_ref().unwrap().count, 1);
        assert_eq!(record.stats.as_ref().unwrap().window_years, 3);
        assert_eq!(transport.calls(), 1);
        assert_eq!(tracker.cache().guard().pending_rechecks(), 0);
    }

    #[tokio::test]
    async fn test_refresh_fails_fast_without_id_or_key() {
        let transport = FixedTransport::new(page_with_one_trade());
        let no_key = service(transport.clone(), None, TrackerConfig::default()).await;

        assert!(matches!(
            no_key.refresh(None, Some("Dyhr"), RefreshOverrides::default()).await,
            Err(TradeLogError::MissingCounterparty)
        ));
        assert!(matches!(
            no_key.refresh(Some("555"), None, RefreshOverrides::default()).await,
            Err(TradeLogError::MissingCredential)
        ));
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test]
    async fn test_refresh_rejected_while_in_flight() {
        let transport = FixedTransport::new(page_with_one_trade());
        let tracker = service(transport.clone(), Some("k"), TrackerConfig::default()).await;

        let _permit = tracker.cache().guard().try_acquire("555").unwrap();
        assert!(matches!(
            tracker.refresh(Some("555"), None, RefreshOverrides::default()).await,
            Err(TradeLogError::FetchInProgress(_))
        ));
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test]
    async fn test_failed_fetch_keeps_prior_stats() {
        let transport = FixedTransport::new(json!({"error": {"code": 2, "error": "Incorrect key"}}));
        let tracker = service(transport, Some("k"), TrackerConfig::default()).await;
        let prior = SummaryStats::empty(Utc::now(), 3);
        tracker
            .cache()
            .upsert("555", Some("Dyhr"), |r| r.stats = Some(prior.clone()))
            .await
            .unwrap();

        let result = tracker
            .refresh(Some("555"), None, RefreshOverrides::default())
            .await;

        assert!(matches!(result, Err(TradeLogError::RemoteApi { code: 2, .. })));
        assert_eq!(tracker.cache().get("555").await.unwrap().stats, Some(prior));
    }

    #[tokio::test]
    async fn test_unchanged_count_schedules_single_recheck() {
        let transport = FixedTransport::new(page_with_one_trade());
        let config = TrackerConfig {
            recheck_delay_secs: 3600,
            ..TrackerConfig::default()
        };
        let tracker = service(transport, Some("k"), config).await;

        tracker
            .refresh(Some("555"), None, RefreshOverrides::default())
            .await
            .unwrap();
        assert_eq!(tracker.cache().guard().pending_rechecks(), 0);

        tracker
            .refresh(Some("555"), None, RefreshOverrides::default())
            .await
            .unwrap();
        assert_eq!(tracker.cache().guard().pending_rechecks(), 1);

        tracker.cache().shutdown();
        assert_eq!(tracker.cache().guard().pending_rechecks(), 0);
    }

    fn short_recheck() -> TrackerConfig {
        TrackerConfig {
            recheck_delay_secs: 5,
            ..TrackerConfig::default()
        }
    }

    async fn refresh_555(tracker: &TrackerService) -> PlayerRecord {
        tracker
            .refresh(Some("555"), None, RefreshOverrides::default())
            .await
            .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_recheck_fires_once_and_does_not_reschedule() {
        let transport = FixedTransport::new(page_with_one_trade());
        let tracker = service(transport.clone(), Some("k"), short_recheck()).await;

        refresh_555(&tracker).await;
        refresh_555(&tracker).await;
        assert_eq!(transport.calls(), 2);
        assert_eq!(tracker.cache().guard().pending_rechecks(), 1);

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(transport.calls(), 3);
        assert_eq!(tracker.cache().guard().pending_rechecks(), 0);
        assert!(!tracker.cache().guard().is_in_flight("555"));

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(transport.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_newer_refresh_cancels_pending_recheck() {
        let transport = FixedTransport::new(page_with_one_trade());
        let tracker = service(transport.clone(), Some("k"), short_recheck()).await;

        refresh_555(&tracker).await;
        refresh_555(&tracker).await;
        tokio::time::sleep(Duration::from_secs(2)).await;
        refresh_555(&tracker).await;
        assert_eq!(transport.calls(), 3);
        assert_eq!(tracker.cache().guard().pending_rechecks(), 1);

        // Only the ticket from the third refresh survives.
        tokio::time::sleep(Duration::from_secs(4)).await;
        assert_eq!(transport.calls(), 3);
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(transport.calls(), 4);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(transport.calls(), 4);
        assert_eq!(tracker.cache().guard().pending_rechecks(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_pending_recheck() {
        let transport = FixedTransport::new(page_with_one_trade());
        let tracker = service(transport.clone(), Some("k"), short_recheck()).await;

        refresh_555(&tracker).await;
        refresh_555(&tracker).await;
        tracker.cache().shutdown();

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test]
    async fn test_view_uses_fresh_cache_without_fetching() {
        let transport = FixedTransport::new(page_with_one_trade());
        let tracker = service(transport.clone(), Some("k"), TrackerConfig::default()).await;
        tracker
            .cache()
            .upsert("555", Some("Dyhr"), |r| {
                r.stats = Some(SummaryStats::empty(Utc::now(), 3))
            })
            .await
            .unwrap();

        let view = tracker.view("555", None).await.unwrap();
        assert_eq!(view.source, StatsSource::Cached);
        assert!(!view.stale);
        assert_eq!(view.record.name, "Dyhr");
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test]
    async fn test_view_refreshes_stale_window() {
        let transport = FixedTransport::new(page_with_one_trade());
        let tracker = service(transport.clone(), Some("k"), TrackerConfig::default()).await;
        tracker
            .cache()
            .upsert("555", None, |r| r.stats = Some(SummaryStats::empty(Utc::now(), 5)))
            .await
            .unwrap();

        let view = tracker.view("555", None).await.unwrap();
        assert_eq!(view.source, StatsSource::Live);
        assert_eq!(view.record.stats.as_ref().unwrap().window_years, 3);
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn test_view_without_auto_refresh_reports_stale() {
        let transport = FixedTransport::new(page_with_one_trade());
        let config = TrackerConfig {
            auto_refresh: false,
            ..TrackerConfig::default()
        };
        let tracker = service(transport.clone(), Some("k"), config).await;

        let view = tracker.view("555", Some("Dyhr")).await.unwrap();
        assert_eq!(view.source, StatsSource::Cached);
        assert!(view.stale);
        assert_eq!(view.record.name, "Dyhr");
        assert!(view.age.is_none());
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test]
    async fn test_manual_entries_log_and_undo() {
        let transport = FixedTransport::new(page_with_one_trade());
        let tracker = service(transport.clone(), None, TrackerConfig::default()).await;
        let at = |day| Utc.with_ymd_and_hms(2024, 1, day, 9, 0, 0).unwrap();

        assert!(matches!(
            tracker.undo_entry("555").await,
            Err(TradeLogError::NotFound(_))
        ));

        tracker
            .log_entry("555", Some("Dyhr"), TradeDirection::Buy, Some(at(3)))
            .await
            .unwrap();
        tracker
            .log_entry("555", None, TradeDirection::Sell, Some(at(1)))
            .await
            .unwrap();
        let record = tracker
            .log_entry("555", None, TradeDirection::Buy, None)
            .await
            .unwrap();

        assert_eq!(record.name, "Dyhr");
        let summary = record.manual_summary();
        assert_eq!((summary.count, summary.buys, summary.sells), (3, 2, 1));
        assert_eq!(summary.first, Some(at(1)));

        let record = tracker.undo_entry("555").await.unwrap();
        assert_eq!(record.entries.len(), 2);
        assert_eq!(record.entries.last().unwrap().dir, TradeDirection::Sell);
        assert_eq!(record.manual_summary().last, Some(at(3)));
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test]
    async fn test_mark_toggle_and_notes() {
        let transport = FixedTransport::new(page_with_one_trade());
        let tracker = service(transport, None, TrackerConfig::default()).await;

        assert!(tracker.set_marked("555", None).await.unwrap().marked);
        assert!(!tracker.set_marked("555", None).await.unwrap().marked);
        assert!(tracker.set_marked("555", Some(true)).await.unwrap().marked);

        let record = tracker.set_notes("555", "slow payer").await.unwrap();
        assert_eq!(record.notes, "slow payer");
        assert!(record.marked);
        assert_eq!(record.name, "Player 555");
    }
}
