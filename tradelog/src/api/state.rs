use std::sync::Arc;

use crate::cache::CacheStore;
use crate::config::Config;
use crate::fetch::WindowedFetcher;
use crate::services::{BackupService, TrackerService};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub cache: Arc<CacheStore>,
    pub tracker: TrackerService,
    pub backup: BackupService,
}

impl AppState {
    pub fn new(config: Config, cache: Arc<CacheStore>, fetcher: WindowedFetcher) -> Self {
        let config = Arc::new(config);
        let tracker = TrackerService::new(cache.clone(), fetcher, config.tracker.clone());
        let backup = BackupService::new(cache.clone());

        Self {
            config,
            cache,
            tracker,
            backup,
        }
    }
}
