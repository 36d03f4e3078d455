use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

use crate::error::{Result, TradeLogError};

/// Summary of all trades with one counterparty inside a history window.
///
/// Serialized with the field names used by exported backups
/// (`firstISO`, `lastISO`, `lastFetched`, `historyYears`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryStats {
    #[serde(default)]
    pub count: u64,
    #[serde(rename = "firstISO", default)]
    pub first_timestamp: Option<DateTime<Utc>>,
    #[serde(rename = "lastISO", default)]
    pub last_timestamp: Option<DateTime<Utc>>,
    #[serde(rename = "lastFetched")]
    pub fetched_at: DateTime<Utc>,
    #[serde(rename = "historyYears", default)]
    pub window_years: u32,
}

impl SummaryStats {
    pub fn empty(fetched_at: DateTime<Utc>, window_years: u32) -> Self {
        Self {
            count: 0,
            first_timestamp: None,
            last_timestamp: None,
            fetched_at,
            window_years,
        }
    }
}

/// Side of a manually logged trade.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum TradeDirection {
    Sell,
    // Anything that is not `sell` reads as a buy.
    #[serde(other)]
    Buy,
}

impl TradeDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Buy => "buy",
            Self::Sell => "sell",
        }
    }
}

/// One trade logged by hand, independent of the remote log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ManualEntry {
    #[serde(rename = "iso")]
    pub at: DateTime<Utc>,
    pub dir: TradeDirection,
}

/// Totals derived from a player's manual entries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ManualSummary {
    pub count: u64,
    pub buys: u64,
    pub sells: u64,
    pub first: Option<DateTime<Utc>>,
    pub last: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerRecord {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "mark", alias = "marked", default)]
    pub marked: bool,
    #[serde(default)]
    pub notes: String,
    /// Manual log, oldest first. Undo removes the last element.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub entries: Vec<ManualEntry>,
    #[serde(
        default,
        deserialize_with = "fetched_stats",
        skip_serializing_if = "Option::is_none"
    )]
    pub stats: Option<SummaryStats>,
}

impl PlayerRecord {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            marked: false,
            notes: String::new(),
            entries: Vec::new(),
            stats: None,
        }
    }

    pub fn manual_summary(&self) -> ManualSummary {
        let mut summary = ManualSummary::default();
        for entry in &self.entries {
            summary.count += 1;
            match entry.dir {
                TradeDirection::Buy => summary.buys += 1,
                TradeDirection::Sell => summary.sells += 1,
            }
            summary.first = Some(summary.first.map_or(entry.at, |t| t.min(entry.at)));
            summary.last = Some(summary.last.map_or(entry.at, |t| t.max(entry.at)));
        }
        summary
    }
}

/// Sweep results always carry `lastFetched`. A stats object without it is a
/// summary of manual entries and is rebuilt from them instead of stored.
fn fetched_stats<'de, D>(deserializer: D) -> std::result::Result<Option<SummaryStats>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    match Option::<serde_json::Value>::deserialize(deserializer)? {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(value) if !value.is_object() => Err(D::Error::custom("stats must be an object")),
        Some(value) if value.get("lastFetched").map_or(true, |v| v.is_null()) => Ok(None),
        Some(value) => serde_json::from_value(value)
            .map(Some)
            .map_err(D::Error::custom),
    }
}

/// Every tracked counterparty, keyed by id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Store {
    pub players: BTreeMap<String, PlayerRecord>,
}

impl Store {
    /// Parse a serialized store. The map key is authoritative for each
    /// record's id.
    pub fn from_json(text: &str) -> Result<Self> {
        let mut store: Store = serde_json::from_str(text)
            .map_err(|e| TradeLogError::InvalidImport(e.to_string()))?;
        for (id, record) in store.players.iter_mut() {
            record.id = id.clone();
        }
        Ok(store)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn get(&self, id: &str) -> Option<&PlayerRecord> {
        self.players.get(id)
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_legacy_backup_format_is_accepted() {
        let text = r#"{
            "players": {
                "123456": {
                    "name": "Dyhr",
                    "mark": true,
                    "notes": "fair trader",
                    "stats": {
                        "firstISO": "2022-11-20T10:00:00.000Z",
                        "lastISO": null,
                        "count": 4,
                        "lastFetched": "2024-02-01T12:00:00.000Z",
                        "source": "live",
                        "historyYears": 3
                    }
                }
            }
        }"#;

        let store = Store::from_json(text).unwrap();
        let record = store.get("123456").unwrap();
        assert_eq!(record.id, "123456");
        assert!(record.marked);
        let stats = record.stats.as_ref().unwrap();
        assert_eq!(stats.count, 4);
        assert_eq!(stats.window_years, 3);
        assert!(stats.last_timestamp.is_none());
    }

    #[test]
    fn test_manual_backup_keeps_entries_and_drops_derived_stats() {
        let text = r#"{
            "players": {
                "555": {
                    "name": "Dyhr",
                    "mark": false,
                    "notes": "",
                    "entries": [
                        {"iso": "2024-01-01T00:00:00.000Z", "dir": "buy"},
                        {"iso": "2023-12-01T08:30:00.000Z", "dir": "sell"},
                        {"iso": "2024-02-01T00:00:00.000Z", "dir": "gift"}
                    ],
                    "stats": {"count": 3, "buys": 2, "sells": 1,
                              "firstISO": "2023-12-01T08:30:00.000Z",
                              "lastISO": "2024-02-01T00:00:00.000Z"}
                }
            }
        }"#;

        let store = Store::from_json(text).unwrap();
        let record = store.get("555").unwrap();
        assert!(record.stats.is_none());
        assert_eq!(record.entries.len(), 3);
        assert_eq!(record.entries[2].dir, TradeDirection::Buy);

        let summary = record.manual_summary();
        assert_eq!((summary.count, summary.buys, summary.sells), (3, 2, 1));
        assert_eq!(summary.first.unwrap().to_rfc3339(), "2023-12-01T08:30:00+00:00");
        assert_eq!(summary.last.unwrap().to_rfc3339(), "2024-02-01T00:00:00+00:00");

        let exported = store.to_json().unwrap();
        assert!(exported.contains(r#""iso":"2024-01-01T00:00:00Z","dir":"buy""#));
        assert!(!exported.contains("lastFetched"));
        assert_eq!(Store::from_json(&exported).unwrap(), store);
    }

    #[test]
    fn test_stats_must_be_an_object() {
        assert!(matches!(
            Store::from_json(r#"{"players":{"1":{"stats": 5}}}"#),
            Err(TradeLogError::InvalidImport(_))
        ));
        let store = Store::from_json(r#"{"players":{"1":{"stats": null}}}"#).unwrap();
        assert!(store.get("1").unwrap().stats.is_none());
    }

    #[test]
    fn test_marked_alias_is_accepted() {
        let store = Store::from_json(r#"{"players":{"7":{"marked":true}}}"#).unwrap();
        assert!(store.get("7").unwrap().marked);
        assert_eq!(store.get("7").unwrap().name, "");
    }

    #[test]
    fn test_wrong_shape_is_rejected() {
        assert!(matches!(
            Store::from_json("[1,2,3]"),
            Err(TradeLogError::InvalidImport(_))
        ));
        assert!(matches!(
            Store::from_json(r#"{"players": 5}"#),
            Err(TradeLogError::InvalidImport(_))
        ));
        assert!(Store::from_json("not json").is_err());
    }

    #[test]
    fn test_serialized_store_reloads_identically() {
        let mut store = Store::default();
        let mut record = PlayerRecord::new("42", "Someone");
        record.notes = "line one\nline two".to_string();
        record.stats = Some(SummaryStats::empty(Utc::now(), 2));
        store.players.insert("42".to_string(), record);

        let reloaded = Store::from_json(&store.to_json().unwrap()).unwrap();
        assert_eq!(reloaded, store);
    }
}
