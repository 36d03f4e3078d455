//! Tracked-player cache: flushed store, merge, staleness and refresh guard.

mod guard;
mod merge;
mod staleness;
mod store;

pub use guard::{FetchPermit, RecheckTicket, RefreshGuard};
pub use merge::{merge, NOTES_SEPARATOR};
pub use staleness::{human_age, is_stale};
pub use store::{CacheStore, ImportSummary};
