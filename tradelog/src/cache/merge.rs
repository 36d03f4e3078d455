use std::collections::HashSet;

use crate::models::{ManualEntry, PlayerRecord, Store, SummaryStats};

/// Separator placed between notes from two sources.
pub const NOTES_SEPARATOR: &str = "\n---\n";

/// Reconcile `incoming` into `base`.
///
/// For every id in `incoming`: the record is created when missing; the name
/// is taken only when base has none; notes from both sides are kept; the mark
/// is OR-ed; manual entries are unioned by time and direction; stats with a
/// strictly newer fetch time replace base's.
///
/// `merge(s, s) == s` and `merge(merge(s, i), i) == merge(s, i)`.
pub fn merge(mut base: Store, incoming: &Store) -> Store {
    for (id, theirs) in &incoming.players {
        let ours = base
            .players
            .entry(id.clone())
            .or_insert_with(|| PlayerRecord::new(id.clone(), String::new()));
        merge_record(ours, theirs);
    }
    base
}

fn merge_record(ours: &mut PlayerRecord, theirs: &PlayerRecord) {
    if ours.name.trim().is_empty() && !theirs.name.trim().is_empty() {
        ours.name = theirs.name.clone();
    }
    ours.notes = merge_notes(&ours.notes, &theirs.notes);
    ours.marked |= theirs.marked;
    merge_entries(&mut ours.entries, &theirs.entries);
    ours.stats = newer_stats(ours.stats.take(), theirs.stats.as_ref());
}

/// Append entries from `theirs` that `ours` lacks, keeping both orders.
fn merge_entries(ours: &mut Vec<ManualEntry>, theirs: &[ManualEntry]) {
    let mut seen: HashSet<ManualEntry> = ours.iter().copied().collect();
    for entry in theirs {
        if seen.insert(*entry) {
            ours.push(*entry);
        }
    }
}

fn merge_notes(ours: &str, theirs: &str) -> String {
    if theirs.is_empty() || contains_run(ours, theirs) {
        return ours.to_string();
    }
    if ours.is_empty() || contains_run(theirs, ours) {
        return theirs.to_string();
    }
    format!("{ours}{NOTES_SEPARATOR}{theirs}")
}

/// Whether `needle` appears in `haystack` as a whole run of separated segments.
fn contains_run(haystack: &str, needle: &str) -> bool {
    haystack == needle
        || haystack.starts_with(&format!("{needle}{NOTES_SEPARATOR}"))
        || haystack.ends_with(&format!("{NOTES_SEPARATOR}{needle}"))
        || haystack.contains(&format!("{NOTES_SEPARATOR}{needle}{NOTES_SEPARATOR}"))
}

fn newer_stats(ours: Option<SummaryStats>, theirs: Option<&SummaryStats>) -> Option<SummaryStats> {
    match (ours, theirs) {
        (Some(ours), Some(theirs)) if theirs.fetched_at > ours.fetched_at => Some(theirs.clone()),
        (Some(ours), _) => Some(ours),
        (None, theirs) => theirs.cloned(),
    }
}
