//! Core data models for assetfeed
//!
//! This module contains the record types served by the endpoint: untyped
//! dataset records parsed from CSV tables, and the transaction records
//! extracted from the monthly RSS feeds.

pub mod aggregate;
pub mod feed;
pub mod rules;
pub mod table;

pub use aggregate::{aggregate, sort_periods, FeedPeriod};
pub use feed::{extract, format_date, parse_feed, parse_period, FeedError, RawFeedEntry};
pub use rules::{normalize, normalize_records};
pub use table::parse_csv;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One row of a dataset, keyed by the header row's column names
///
/// Column order follows the header row. Values are always JSON strings when
/// produced by [`parse_csv`].
pub type Record = Map<String, Value>;

/// Currency code attached to every transaction
pub const CURRENCY: &str = "JPY";

/// A structured transaction extracted from one feed item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecord {
    /// Calendar date as `YYYY-MM-DD`, or empty when the date could not be read
    pub date: String,
    /// Signed amount in yen
    pub amount: i64,
    /// Always [`CURRENCY`]
    pub currency: String,
    /// Merchant or counterparty text
    pub name: String,
    /// Category path, possibly empty
    pub category: String,
    /// Whether the transaction moves money between own accounts
    pub is_transfer: bool,
}
