use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::{clamp_history_years, FetchConfig};
use crate::correlation::{self, collapse, is_relevant_category, summarize};
use crate::error::{Result, TradeLogError};
use crate::models::{Counterparty, RawRecord, SummaryStats};

use super::transport::{log_page_url, parse_page, Transport};

const SECS_PER_YEAR: i64 = 365 * 24 * 3600;

/// A `[from, to)` slice of the remote log, in epoch seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub from: i64,
    pub to: i64,
}

/// Split `[start, end)` into contiguous slices of at most `chunk_secs`,
/// newest first, stopping after `max_chunks` slices.
pub fn plan_windows(start: i64, end: i64, chunk_secs: i64, max_chunks: usize) -> Vec<TimeWindow> {
    let mut windows = Vec::new();
    if chunk_secs <= 0 {
        return windows;
    }

    let mut to = end;
    while to > start && windows.len() < max_chunks {
        let from = (to - chunk_secs).max(start);
        windows.push(TimeWindow { from, to });
        to = from;
    }
    windows
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchOptions {
    pub history_years: u32,
    pub allow_name_fallback: bool,
}

/// Sweeps the remote log backwards in bounded chunks and summarizes the
/// trades found with one counterparty.
#[derive(Clone)]
pub struct WindowedFetcher {
    transport: Arc<dyn Transport>,
    config: FetchConfig,
    api_key: Option<String>,
}

impl WindowedFetcher {
    pub fn new(transport: Arc<dyn Transport>, config: FetchConfig, api_key: Option<String>) -> Self {
        Self {
            transport,
            config,
            api_key,
        }
    }

    pub fn has_credential(&self) -> bool {
        self.api_key.as_deref().is_some_and(|k| !k.is_empty())
    }

    pub async fn fetch(&self, target: &Counterparty, options: &FetchOptions) -> Result<SummaryStats> {
        self.fetch_at(target, options, Utc::now()).await
    }

    /// Run a sweep as of `now`.
    ///
    /// Any transport, remote or page error aborts the sweep; no partial
    /// summary is ever returned.
    pub async fn fetch_at(
        &self,
        target: &Counterparty,
        options: &FetchOptions,
        now: DateTime<Utc>,
    ) -> Result<SummaryStats> {
        let api_key = self
            .api_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or(TradeLogError::MissingCredential)?;

        let years = clamp_history_years(options.history_years);
        let end = now.timestamp() + self.config.window_skew_secs;
        let start = end - i64::from(years) * SECS_PER_YEAR;
        let windows = plan_windows(start, end, self.config.chunk_secs, self.config.max_chunks);
        let delay = Duration::from_millis(self.config.inter_chunk_delay_ms);

        let mut candidates: Vec<RawRecord> = Vec::new();
        for (index, window) in windows.iter().enumerate() {
            if index > 0 && !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            let url = log_page_url(
                &self.config.base_url,
                window.from,
                window.to,
                api_key,
                &self.config.comment,
                Utc::now(),
            )?;
            let body = self.transport.fetch_page(&url).await?;
            let records = parse_page(&body)?;
            let page_len = records.len();

            let before = candidates.len();
            candidates.extend(records.into_iter().filter(|r| {
                is_relevant_category(r)
                    && correlation::matches(
                        r,
                        &target.id,
                        &target.name,
                        options.allow_name_fallback,
                    )
            }));

            debug!(
                counterparty_id = %target.id,
                chunk = index + 1,
                from = window.from,
                to = window.to,
                page_len,
                matched = candidates.len() - before,
                "Fetched log chunk"
            );
        }

        let occurrences = collapse(
            &candidates,
            &target.id,
            &target.name,
            options.allow_name_fallback,
        );
        let summary = summarize(&occurrences);

        info!(
            counterparty_id = %target.id,
            chunks = windows.len(),
            candidates = candidates.len(),
            trades = summary.count,
            window_years = years,
            "Trade history sweep complete"
        );

        Ok(SummaryStats {
            count: summary.count,
            first_timestamp: summary.first,
            last_timestamp: summary.last,
            fetched_at: now,
            window_years: years,
        })
    }
}
