use regex::Regex;
use std::sync::OnceLock;

use crate::error::{Result, TradeLogError};

const MAX_NAME_LEN: usize = 30;

fn title_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"([^\[]{2,60}?)\s*\[\s*(\d{3,10})\s*\]").expect("title regex is valid")
    })
}

fn id_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"XID=(\d+)|\[(\d{3,10})\]").expect("id regex is valid"))
}

fn punctuation_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^\w\s.'-]").expect("punctuation regex is valid"))
}

/// The player whose trade history is being tracked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Counterparty {
    pub id: String,
    pub name: String,
}

impl Counterparty {
    /// Build a counterparty from a known id and a best-effort name. The name
    /// falls back to `Player <id>` when missing or empty after cleaning.
    pub fn new(id: impl Into<String>, name: Option<&str>) -> Self {
        let id = id.into();
        let name = name
            .map(clean_name)
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| fallback_name(&id));
        Self { id, name }
    }

    /// Validate caller input before any network call is made.
    pub fn resolve(id: Option<&str>, name: Option<&str>) -> Result<Self> {
        let id = id
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or(TradeLogError::MissingCounterparty)?;

        if !id.chars().all(|c| c.is_ascii_digit()) {
            return Err(TradeLogError::Validation(format!(
                "Counterparty id must be numeric, got '{id}'"
            )));
        }

        Ok(Self::new(id, name))
    }

    /// Discover `Name [1234]` in a page title or header line.
    pub fn from_title(text: &str) -> Option<Self> {
        if let Some(caps) = title_pattern().captures(text) {
            let id = caps.get(2)?.as_str();
            let name = caps.get(1).map(|m| m.as_str());
            return Some(Self::new(id, name));
        }
        detect_id(text).map(|id| Self::new(id, None))
    }
}

/// Find a counterparty id in a URL (`XID=`) or bracketed text.
pub fn detect_id(text: &str) -> Option<String> {
    let caps = id_pattern().captures(text)?;
    caps.get(1)
        .or_else(|| caps.get(2))
        .map(|m| m.as_str().to_string())
}

pub fn fallback_name(id: &str) -> String {
    format!("Player {id}").trim().to_string()
}

/// Collapse whitespace, drop separators and punctuation, cap the length.
pub fn clean_name(raw: &str) -> String {
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    let without_separators = collapsed.replace([':', '|'], "");
    let cleaned = punctuation_pattern().replace_all(&without_separators, "");
    cleaned.trim().chars().take(MAX_NAME_LEN).collect()
}
