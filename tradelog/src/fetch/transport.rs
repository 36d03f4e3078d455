use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use url::Url;

use crate::error::{Result, TradeLogError};
use crate::models::RawRecord;

/// Fetches one page of the remote log as raw JSON text.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn fetch_page(&self, url: &Url) -> Result<String>;
}

#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(timeout_secs: u64) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| TradeLogError::Network(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn fetch_page(&self, url: &Url) -> Result<String> {
        // The URL carries the credential; keep it out of error messages.
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| TradeLogError::Network(e.without_url().to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TradeLogError::Network(format!(
                "Remote log returned HTTP {status}"
            )));
        }

        response
            .text()
            .await
            .map_err(|e| TradeLogError::Network(e.without_url().to_string()))
    }
}

/// Build the request URL for one `[from, to)` slice of the log.
pub fn log_page_url(
    base_url: &str,
    from: i64,
    to: i64,
    api_key: &str,
    comment: &str,
    now: DateTime<Utc>,
) -> Result<Url> {
    let mut url = Url::parse(&format!("{}/user/", base_url.trim_end_matches('/')))?;
    url.query_pairs_mut()
        .append_pair("selections", "log")
        .append_pair("from", &from.to_string())
        .append_pair("to", &to.to_string())
        // Defeats intermediary caches between identical requests.
        .append_pair("timestamp", &now.to_rfc3339_opts(SecondsFormat::Millis, true))
        .append_pair("comment", comment)
        .append_pair("key", api_key);
    Ok(url)
}

/// Parse a log page into records.
///
/// The log may arrive under `log` or `logs`, as an array or as a map of
/// entries; both shapes become one ordered sequence. An embedded `error`
/// object becomes [`TradeLogError::RemoteApi`]. Entries that are not objects
/// are skipped.
pub fn parse_page(text: &str) -> Result<Vec<RawRecord>> {
    let value: Value =
        serde_json::from_str(text).map_err(|e| TradeLogError::MalformedPage(e.to_string()))?;

    if let Some(error) = value.get("error").filter(|e| !e.is_null()) {
        return Err(remote_error(error));
    }

    let entries = normalize_entries(&value);
    let total = entries.len();
    let records: Vec<RawRecord> = entries.into_iter().filter_map(RawRecord::from_json).collect();

    if records.len() < total {
        tracing::debug!(
            skipped = total - records.len(),
            "Skipped malformed log entries"
        );
    }

    Ok(records)
}

fn normalize_entries(value: &Value) -> Vec<&Value> {
    for key in ["log", "logs"] {
        match value.get(key) {
            Some(Value::Array(items)) => return items.iter().collect(),
            Some(Value::Object(map)) => return map.values().collect(),
            _ => {}
        }
    }
    Vec::new()
}

fn remote_error(error: &Value) -> TradeLogError {
    let code = error.get("code").and_then(Value::as_i64).unwrap_or(0);
    let message = error
        .get("error")
        .or_else(|| error.get("message"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| error.to_string());
    TradeLogError::RemoteApi { code, message }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_array_and_map_shapes_normalize_alike() {
        let array = r#"{"log": [{"title": "Trade accepted", "timestamp": 1}]}"#;
        let map = r#"{"log": {"9001": {"title": "Trade accepted", "timestamp": 1}}}"#;
        let logs = r#"{"logs": [{"title": "Trade accepted", "timestamp": 1}]}"#;

        let a = parse_page(array).unwrap();
        assert_eq!(a.len(), 1);
        assert_eq!(a, parse_page(map).unwrap());
        assert_eq!(a, parse_page(logs).unwrap());
    }

    #[test]
    fn test_missing_log_is_empty() {
        assert!(parse_page(r#"{"log": null}"#).unwrap().is_empty());
        assert!(parse_page("{}").unwrap().is_empty());
    }

    #[test]
    fn test_malformed_entries_are_skipped() {
        let text = r#"{"log": [null, "junk", 7, {"title": "Trade"}]}"#;
        assert_eq!(parse_page(text).unwrap().len(), 1);
    }

    #[test]
    fn test_embedded_error_object() {
        let text = r#"{"error": {"code": 2, "error": "Incorrect key"}}"#;
        match parse_page(text) {
            Err(TradeLogError::RemoteApi { code, message }) => {
                assert_eq!(code, 2);
                assert_eq!(message, "Incorrect key");
            }
            other => panic!("expected remote api error, got {other:?}"),
        }
    }

    #[test]
    fn test_null_error_is_not_an_error() {
        assert!(parse_page(r#"{"error": null, "log": []}"#).is_ok());
    }

    #[test]
    fn test_invalid_json_is_malformed_page() {
        assert!(matches!(
            parse_page("<html>bad gateway</html>"),
            Err(TradeLogError::MalformedPage(_))
        ));
    }

    #[test]
    fn test_log_page_url() {
        let now = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        let url = log_page_url("https://api.torn.com/", 100, 200, "k3y", "Trader Log", now).unwrap();

        assert_eq!(url.path(), "/user/");
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert!(pairs.contains(&("selections".into(), "log".into())));
        assert!(pairs.contains(&("from".into(), "100".into())));
        assert!(pairs.contains(&("to".into(), "200".into())));
        assert!(pairs.contains(&("key".into(), "k3y".into())));
        assert!(pairs.contains(&("timestamp".into(), "2024-01-02T03:04:05.000Z".into())));
    }
}
