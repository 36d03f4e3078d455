use crate::models::RawRecord;

use super::classifier::is_relevant_category;

/// Field names known to carry the other party's id.
pub const COUNTERPARTY_ID_FIELDS: &[&str] = &[
    "other_id",
    "target_id",
    "player_id",
    "counterpart_id",
    "attacker_id",
    "defender_id",
    "user_id",
    "partner_id",
    "user",
];

/// Whether `record` concerns the counterparty `target_id`.
///
/// Strategies are tried in order and any hit is a match:
/// 1. an id-bearing field equals `target_id` (top level or payload)
/// 2. `[<target_id>]` appears in the record text or a payload string
/// 3. with `allow_name_fallback`, on trade records only, `target_name`
///    appears case-insensitively in the record text or a payload string
///
/// Strategy 3 favours recall: a common name fragment can match unrelated
/// trades when the log carries no id.
pub fn matches(
    record: &RawRecord,
    target_id: &str,
    target_name: &str,
    allow_name_fallback: bool,
) -> bool {
    matches_id_field(record, target_id)
        || matches_bracket_token(record, target_id)
        || (allow_name_fallback
            && is_relevant_category(record)
            && mentions_name(record, target_name))
}

fn matches_id_field(record: &RawRecord, target_id: &str) -> bool {
    COUNTERPARTY_ID_FIELDS.iter().any(|field| {
        record
            .field_values(field)
            .any(|v| v.id_string().as_deref() == Some(target_id))
    })
}

fn matches_bracket_token(record: &RawRecord, target_id: &str) -> bool {
    let token = format!("[{target_id}]");
    record.text_fields().any(|s| s.contains(&token))
        || record.payload_texts().any(|s| s.contains(&token))
}

fn mentions_name(record: &RawRecord, name: &str) -> bool {
    let needle = name.trim().to_lowercase();
    if needle.is_empty() {
        return false;
    }
    record
        .text_fields()
        .chain(record.payload_texts())
        .any(|s| s.to_lowercase().contains(&needle))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: serde_json::Value) -> RawRecord {
        RawRecord::from_json(&value).unwrap()
    }

    #[test]
    fn test_top_level_id_field() {
        let rec = record(json!({"title": "Trade completed", "user": 2938471}));
        assert!(matches(&rec, "2938471", "", false));
        assert!(!matches(&rec, "2938472", "", false));
    }

    #[test]
    fn test_payload_id_field_as_string() {
        let rec = record(json!({"title": "Trade", "data": {"partner_id": "555"}}));
        assert!(matches(&rec, "555", "", false));
    }

    #[test]
    fn test_unknown_id_field_is_ignored() {
        let rec = record(json!({"title": "Trade", "data": {"seller": 555}}));
        assert!(!matches(&rec, "555", "", false));
    }

    #[test]
    fn test_bracket_token_in_title_and_nested_payload() {
        let in_title = record(json!({"title": "Trade with Dyhr [555] accepted"}));
        assert!(matches(&in_title, "555", "", false));

        let nested = record(json!({
            "title": "Trade",
            "data": {"summary": {"text": "initiated by Dyhr [555]"}}
        }));
        assert!(matches(&nested, "555", "", false));

        let partial = record(json!({"title": "Trade with [5551]"}));
        assert!(!matches(&partial, "555", "", false));
    }

    #[test]
    fn test_name_only_record_rejected_without_fallback() {
        let rec = record(json!({
            "category": "Trades",
            "title": "Trade accepted",
            "data": {"with": "Dyhr"}
        }));
        assert!(is_relevant_category(&rec));
        assert!(!matches(&rec, "555", "Dyhr", false));
        assert!(matches(&rec, "555", "dyhr", true));
    }

    #[test]
    fn test_name_fallback_gated_on_trade_category() {
        let rec = record(json!({"title": "Attacked Dyhr", "category": "Attacking"}));
        assert!(!matches(&rec, "555", "Dyhr", true));
    }

    #[test]
    fn test_blank_name_never_matches() {
        let rec = record(json!({"title": "Trade accepted"}));
        assert!(!matches(&rec, "555", "   ", true));
    }
}
