use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fmt;

use crate::models::RawRecord;

use super::classifier::{is_relevant_category, is_terminal_success};
use super::identity;

/// Width of the time bucket used when a record carries no trade id.
pub const BUCKET_SECS: i64 = 900;

const TRADE_ID_FIELDS: &[&str] = &["trade_id", "tradeId", "tid", "tradeid"];

/// Identity of one logical trade.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum GroupKey {
    /// Explicit trade id from the payload.
    Trade(String),
    /// Counterparty id plus a 15-minute bucket.
    Approx { counterparty: String, bucket: i64 },
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Trade(tid) => write!(f, "tid:{tid}"),
            Self::Approx {
                counterparty,
                bucket,
            } => write!(f, "approx:{counterparty}:{bucket}"),
        }
    }
}

/// One deduplicated trade, represented by its canonical record.
#[derive(Debug, Clone, PartialEq)]
pub struct Occurrence {
    pub key: GroupKey,
    pub record: RawRecord,
    pub occurred_at: Option<DateTime<Utc>>,
}

pub fn trade_id(record: &RawRecord) -> Option<String> {
    TRADE_ID_FIELDS
        .iter()
        .filter_map(|field| record.data.get(*field))
        .find(|v| v.is_present())
        .and_then(|v| v.id_string())
}

pub fn group_key(record: &RawRecord, target_id: &str) -> GroupKey {
    match trade_id(record) {
        Some(tid) => GroupKey::Trade(tid),
        None => GroupKey::Approx {
            counterparty: target_id.to_string(),
            bucket: record.timestamp_secs().unwrap_or(0).div_euclid(BUCKET_SECS),
        },
    }
}

/// Pick the record that represents a group: the first terminal success, or
/// else the latest one. Equal timestamps resolve to the later input.
pub fn canonical<'a>(group: &[&'a RawRecord]) -> Option<&'a RawRecord> {
    if let Some(done) = group.iter().find(|r| is_terminal_success(r)) {
        return Some(*done);
    }

    let mut latest: Option<(&'a RawRecord, i64)> = None;
    for record in group {
        let ts = record.timestamp_secs().unwrap_or(0);
        match latest {
            Some((_, best)) if best > ts => {}
            _ => latest = Some((*record, ts)),
        }
    }
    latest.map(|(record, _)| record)
}

/// Collapse raw records into one occurrence per logical trade with the target.
///
/// The result is ordered by group key, so it does not depend on input order.
pub fn collapse(
    records: &[RawRecord],
    target_id: &str,
    target_name: &str,
    allow_name_fallback: bool,
) -> Vec<Occurrence> {
    let mut groups: BTreeMap<GroupKey, Vec<&RawRecord>> = BTreeMap::new();

    for record in records {
        if !is_relevant_category(record)
            || !identity::matches(record, target_id, target_name, allow_name_fallback)
        {
            continue;
        }
        groups
            .entry(group_key(record, target_id))
            .or_default()
            .push(record);
    }

    groups
        .into_iter()
        .filter_map(|(key, group)| {
            canonical(&group).map(|record| Occurrence {
                key,
                occurred_at: record.occurred_at(),
                record: record.clone(),
            })
        })
        .collect()
}
