#![allow(dead_code)]

use chrono::Utc;
use serde_json::{json, Value};
use std::sync::Arc;
use tempfile::TempDir;

use tradelog::config::{DatabaseConfig, FetchConfig, TrackerConfig};
use tradelog::db::{Database, LibSqlPersistence, Persistence};

/// Fetch settings pointed at a mock server, without pacing.
pub fn fetch_config(base_url: &str) -> FetchConfig {
    FetchConfig {
        base_url: base_url.to_string(),
        inter_chunk_delay_ms: 0,
        ..FetchConfig::default()
    }
}

pub fn tracker_config() -> TrackerConfig {
    TrackerConfig {
        api_key: Some("test-key".to_string()),
        recheck_delay_secs: 3600,
        ..TrackerConfig::default()
    }
}

/// A libsql store in a temporary directory. Keep the `TempDir` alive.
pub async fn file_persistence() -> (Arc<dyn Persistence>, TempDir) {
    let dir = TempDir::new().expect("temp dir");
    let config = DatabaseConfig {
        url: format!("file:{}", dir.path().join("tradelog.db").display()),
        auth_token: None,
        local_path: None,
    };
    let db = Database::new(&config).await.expect("open database");
    (Arc::new(LibSqlPersistence::new(db)), dir)
}

/// A trade record `days_ago` days old with `counterparty` in the payload.
pub fn trade_entry(title: &str, days_ago: i64, counterparty: u64) -> Value {
    trade_entry_at(title, Utc::now().timestamp() - days_ago * 86_400, counterparty)
}

pub fn trade_entry_at(title: &str, timestamp: i64, counterparty: u64) -> Value {
    json!({
        "category": "Trades",
        "title": title,
        "timestamp": timestamp,
        "data": {"user": counterparty}
    })
}

/// Start of the 15-minute bucket `days_ago` days back, so records placed a
/// few seconds after it always group together.
pub fn bucket_start(days_ago: i64) -> i64 {
    let ts = Utc::now().timestamp() - days_ago * 86_400;
    ts - ts.rem_euclid(900)
}

pub fn log_page(entries: Vec<Value>) -> Value {
    json!({ "log": entries })
}
