use chrono::{DateTime, SecondsFormat, Utc};
use serde::Deserialize;
use std::fmt;
use std::sync::Arc;

use crate::cache::{CacheStore, ImportSummary};
use crate::error::{Result, TradeLogError};
use crate::models::Store;

const CSV_HEADER: [&str; 11] = [
    "xid",
    "name",
    "first_trade",
    "last_trade",
    "total_trades",
    "buys",
    "sells",
    "mark",
    "notes",
    "last_synced",
    "window_years",
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Json,
    Csv,
}

impl ExportFormat {
    pub fn content_type(self) -> &'static str {
        match self {
            Self::Json => "application/json",
            Self::Csv => "text/csv",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Csv => "csv",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Export and import of the whole store.
#[derive(Clone)]
pub struct BackupService {
    cache: Arc<CacheStore>,
}

impl BackupService {
    pub fn new(cache: Arc<CacheStore>) -> Self {
        Self { cache }
    }

    pub async fn export(&self, format: ExportFormat) -> Result<String> {
        let store = self.cache.snapshot().await;
        match format {
            ExportFormat::Json => store.to_json_pretty(),
            ExportFormat::Csv => store_to_csv(&store),
        }
    }

    /// Parse `text` as a serialized store and merge it. Nothing is touched
    /// when the payload does not parse.
    pub async fn import_json(&self, text: &str) -> Result<ImportSummary> {
        let incoming = Store::from_json(text)?;
        self.cache.import(&incoming).await
    }
}

/// Suggested download name, e.g. `torn-trade-notes-20240601.csv`.
pub fn export_file_name(format: ExportFormat, now: DateTime<Utc>) -> String {
    format!("torn-trade-notes-{}.{}", now.format("%Y%m%d"), format.extension())
}

/// One row per player. Trade totals come from the last sweep; `buys` and
/// `sells` count manual entries. Newlines inside notes are written as a
/// literal `\n`.
pub fn store_to_csv(store: &Store) -> Result<String> {
    let mut writer = csv::WriterBuilder::new()
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());
    writer.write_record(CSV_HEADER)?;

    for (id, record) in &store.players {
        let stats = record.stats.as_ref();
        let manual = record.manual_summary();
        let iso = |t: Option<DateTime<Utc>>| {
            t.map(|t| t.to_rfc3339_opts(SecondsFormat::Millis, true))
                .unwrap_or_default()
        };
        writer.write_record([
            id.clone(),
            record.name.clone(),
            iso(stats.and_then(|s| s.first_timestamp)),
            iso(stats.and_then(|s| s.last_timestamp)),
            stats.map_or(0, |s| s.count).to_string(),
            manual.buys.to_string(),
            manual.sells.to_string(),
            if record.marked { "1" } else { "0" }.to_string(),
            record.notes.replace('\n', "\\n"),
            iso(stats.map(|s| s.fetched_at)),
            stats.map(|s| s.window_years.to_string()).unwrap_or_default(),
        ])?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| TradeLogError::Internal(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| TradeLogError::Internal(e.to_string()))
}
