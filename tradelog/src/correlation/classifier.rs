use regex::Regex;
use std::sync::OnceLock;

use crate::models::RawRecord;

const CATEGORY_TOKENS: &[&str] = &["trade", "trades"];
const CATEGORY_KEYWORD: &str = "trade";

fn success_vocabulary() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"finali[sz]ed|completed|finished|accepted").expect("success regex is valid")
    })
}

fn cancel_vocabulary() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"cancel(l)?ed|declined|aborted").expect("cancel regex is valid"))
}

fn non_empty(field: &Option<String>) -> Option<&str> {
    field.as_deref().filter(|t| !t.is_empty())
}

/// Whether a record belongs to the trade category.
///
/// Permissive on purpose: any textual signal qualifies. Precision comes from
/// identity matching afterwards.
pub fn is_relevant_category(record: &RawRecord) -> bool {
    if let Some(category) = record.category.as_deref() {
        let category = category.to_lowercase();
        if CATEGORY_TOKENS.contains(&category.as_str()) {
            return true;
        }
    }

    non_empty(&record.title)
        .or_else(|| non_empty(&record.event))
        .is_some_and(|t| t.to_lowercase().contains(CATEGORY_KEYWORD))
}

/// Whether a record marks a trade that went through.
///
/// Cancellation wording wins over success wording, so ambiguous text defers
/// to another record of the same trade.
pub fn is_terminal_success(record: &RawRecord) -> bool {
    if !is_relevant_category(record) {
        return false;
    }

    let text = [&record.title, &record.event, &record.action]
        .into_iter()
        .map(|f| f.as_deref().unwrap_or(""))
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();

    if cancel_vocabulary().is_match(&text) {
        return false;
    }
    success_vocabulary().is_match(&text)
}
