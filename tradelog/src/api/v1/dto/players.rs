//! Player request/response DTOs for the v1 API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{ManualEntry, ManualSummary, PlayerRecord, SummaryStats, TradeDirection};
use crate::services::{PlayerPatch, PlayerView, RefreshOverrides, StatsSource};

// ---------------------------------------------------------------------------
// Request DTOs
// ---------------------------------------------------------------------------

/// Query for `GET /v1/players/{id}`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ViewPlayerQuery {
    /// Display name observed by the caller.
    pub name: Option<String>,
}

/// Body of `POST /v1/players/{id}/refresh`. Every field is optional and the
/// body itself may be empty.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshPlayerRequest {
    pub name: Option<String>,
    pub history_years: Option<u32>,
    pub name_fallback: Option<bool>,
}

impl RefreshPlayerRequest {
    pub fn overrides(&self) -> RefreshOverrides {
        RefreshOverrides {
            history_years: self.history_years,
            name_fallback: self.name_fallback,
        }
    }
}

/// Body of `PATCH /v1/players/{id}`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePlayerRequest {
    pub name: Option<String>,
    pub notes: Option<String>,
    pub marked: Option<bool>,
}

impl From<UpdatePlayerRequest> for PlayerPatch {
    fn from(req: UpdatePlayerRequest) -> Self {
        Self {
            name: req.name,
            notes: req.notes,
            marked: req.marked,
        }
    }
}

/// Body of `POST /v1/players/{id}/entries`.
#[derive(Debug, Clone, Deserialize)]
pub struct LogEntryRequest {
    pub dir: TradeDirection,
    /// Defaults to the time of the request.
    pub at: Option<DateTime<Utc>>,
    pub name: Option<String>,
}

// ---------------------------------------------------------------------------
// Response DTOs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsResponse {
    pub count: u64,
    pub first_trade: Option<DateTime<Utc>>,
    pub last_trade: Option<DateTime<Utc>>,
    pub fetched_at: DateTime<Utc>,
    pub window_years: u32,
}

impl From<SummaryStats> for StatsResponse {
    fn from(stats: SummaryStats) -> Self {
        Self {
            count: stats.count,
            first_trade: stats.first_timestamp,
            last_trade: stats.last_timestamp,
            fetched_at: stats.fetched_at,
            window_years: stats.window_years,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerResponse {
    pub id: String,
    pub name: String,
    pub marked: bool,
    pub notes: String,
    pub stats: Option<StatsResponse>,
    pub manual: ManualSummary,
    pub entries: Vec<ManualEntry>,
}

impl From<PlayerRecord> for PlayerResponse {
    fn from(record: PlayerRecord) -> Self {
        Self {
            manual: record.manual_summary(),
            id: record.id,
            name: record.name,
            marked: record.marked,
            notes: record.notes,
            stats: record.stats.map(Into::into),
            entries: record.entries,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerViewResponse {
    pub player: PlayerResponse,
    pub source: StatsSource,
    pub stale: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_error: Option<String>,
}

impl From<PlayerView> for PlayerViewResponse {
    fn from(view: PlayerView) -> Self {
        Self {
            player: view.record.into(),
            source: view.source,
            stale: view.stale,
            age: view.age,
            refresh_error: view.refresh_error,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ListPlayersResponse {
    pub players: Vec<PlayerResponse>,
}
