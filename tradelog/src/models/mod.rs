mod counterparty;
mod player;
mod record;

pub use counterparty::{clean_name, detect_id, fallback_name, Counterparty};
pub use player::{ManualEntry, ManualSummary, PlayerRecord, Store, SummaryStats, TradeDirection};
pub use record::{Payload, PayloadValue, RawRecord};
