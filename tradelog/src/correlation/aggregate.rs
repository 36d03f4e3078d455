use chrono::{DateTime, Utc};

use super::dedup::Occurrence;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Summary {
    pub count: u64,
    pub first: Option<DateTime<Utc>>,
    pub last: Option<DateTime<Utc>>,
}

/// Count occurrences and find the earliest and latest timestamps.
///
/// Occurrences without a parseable timestamp still count.
pub fn summarize(occurrences: &[Occurrence]) -> Summary {
    let dated = occurrences.iter().filter_map(|o| o.occurred_at);

    Summary {
        count: occurrences.len() as u64,
        first: dated.clone().min(),
        last: dated.max(),
    }
}
