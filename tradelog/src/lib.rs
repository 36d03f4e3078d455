//! Per-counterparty trade history tracker.
//!
//! Sweeps the user's activity log in bounded windows, correlates the records
//! that concern one counterparty into unique trades, and keeps the summary in
//! a mergeable, staleness-aware cache.

pub mod api;
pub mod cache;
pub mod config;
pub mod correlation;
pub mod db;
pub mod error;
pub mod fetch;
pub mod models;
pub mod services;

pub use error::{Result, TradeLogError};
