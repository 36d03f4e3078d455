//! Trade correlation: classify raw log records, match them to a counterparty,
//! collapse multi-record trades and summarize the result.

pub mod aggregate;
pub mod classifier;
pub mod dedup;
pub mod identity;

pub use aggregate::{summarize, Summary};
pub use classifier::{is_relevant_category, is_terminal_success};
pub use dedup::{collapse, GroupKey, Occurrence};
pub use identity::matches;
