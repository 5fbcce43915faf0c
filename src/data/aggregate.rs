//! Merging monthly feed periods into one transaction list

use serde::{Deserialize, Serialize};

use super::TransactionRecord;

/// The transactions of one feed period
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedPeriod {
    /// Six-digit `YYYYMM` identifier
    pub period: String,
    /// Transactions in feed declaration order
    pub entries: Vec<TransactionRecord>,
}

impl FeedPeriod {
    pub fn new(period: impl Into<String>, entries: Vec<TransactionRecord>) -> Self {
        Self {
            period: period.into(),
            entries,
        }
    }

    /// Numeric value of the period key; keys that are not numbers sort last
    fn sort_key(&self) -> u64 {
        self.period.parse().unwrap_or(0)
    }
}

/// Orders periods newest first by numeric period identifier
///
/// The sort is stable, so periods with equal keys keep their input order.
pub fn sort_periods(periods: &mut [FeedPeriod]) {
    periods.sort_by_key(|period| std::cmp::Reverse(period.sort_key()));
}

/// Flattens periods into one list, newest period first
///
/// Entries inside a period keep their source order.
pub fn aggregate(mut periods: Vec<FeedPeriod>) -> Vec<TransactionRecord> {
    sort_periods(&mut periods);
    periods
        .into_iter()
        .flat_map(|period| period.entries)
        .collect()
}
