//! Live computation of the served data
//!
//! A [`Snapshot`] is everything the endpoint can serve, computed straight
//! from a [`DataSource`]: every dataset parsed and normalized, and every feed
//! period parsed into transactions. It backs both cache misses and cache
//! rebuilds, so the cached and uncached responses are built the same way.

use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, warn};

use crate::data::{self, FeedError, FeedPeriod, Record, TransactionRecord};
use crate::source::{DataSource, SourceError};

/// Field of the combined response that holds the feed transactions
pub const FEED_FIELD: &str = "transactions";

/// All datasets and feed periods of a source at one point in time
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    /// `(dataset name, normalized records)` in listing order
    pub datasets: Vec<(String, Vec<Record>)>,
    /// Feed periods, newest first
    pub periods: Vec<FeedPeriod>,
}

impl Snapshot {
    /// Reads and normalizes every dataset and feed period in `source`
    pub fn load(source: &dyn DataSource) -> Result<Self, SourceError> {
        let mut datasets = Vec::new();
        for name in source.list_datasets()? {
            if let Some((name, records)) = load_dataset(source, &name)? {
                datasets.push((name, records));
            }
        }

        let periods = collect_feed(source)?;

        Ok(Self { datasets, periods })
    }

    /// Datasets as one JSON object keyed by dataset name
    pub fn datasets_object(&self) -> Map<String, Value> {
        self.datasets
            .iter()
            .map(|(name, records)| (name.clone(), records_value(records)))
            .collect()
    }

    /// Feed transactions of every period, newest period first
    pub fn transactions(&self) -> Vec<TransactionRecord> {
        data::aggregate(self.periods.clone())
    }

    /// The combined response: every dataset plus the feed under [`FEED_FIELD`]
    pub fn to_response(&self) -> Value {
        let mut object = self.datasets_object();
        let transactions = serde_json::to_value(self.transactions()).unwrap_or_default();
        object.insert(FEED_FIELD.to_string(), transactions);
        Value::Object(object)
    }
}

/// Converts records to a JSON array
pub fn records_value(records: &[Record]) -> Value {
    Value::Array(records.iter().cloned().map(Value::Object).collect())
}

/// Reads, parses and normalizes one dataset
///
/// Returns the dataset's stored name with its records, or `Ok(None)` when no
/// dataset matches `name`. Rules are matched against the stored name.
pub fn load_dataset(
    source: &dyn DataSource,
    name: &str,
) -> Result<Option<(String, Vec<Record>)>, SourceError> {
    let Some(file) = source.read_dataset(name)? else {
        return Ok(None);
    };

    let rows = data::parse_csv(&file.content).map_err(|source| SourceError::Csv {
        name: file.name.clone(),
        source,
    })?;
    let records = data::normalize_records(&rows, &file.name);
    debug!(dataset = %file.name, rows = records.len(), "loaded dataset");

    Ok(Some((file.name, records)))
}

/// Reads every feed period, newest first
///
/// A period that cannot be read or parsed contributes an empty list; the
/// failure is logged and the remaining periods are still collected.
pub fn collect_feed(source: &dyn DataSource) -> Result<Vec<FeedPeriod>, SourceError> {
    let mut periods: Vec<FeedPeriod> = source
        .list_feed_periods()?
        .into_iter()
        .map(|period| {
            let entries = match load_period(source, &period) {
                Ok(entries) => entries,
                Err(err) => {
                    warn!(period = %period, error = %err, "skipping unreadable feed period");
                    Vec::new()
                }
            };
            FeedPeriod::new(period, entries)
        })
        .collect();

    data::sort_periods(&mut periods);
    Ok(periods)
}

/// Why one feed period contributed no transactions
#[derive(Debug, Error)]
enum PeriodError {
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error(transparent)]
    Feed(#[from] FeedError),
}

fn load_period(source: &dyn DataSource, period: &str) -> Result<Vec<TransactionRecord>, PeriodError> {
    let xml = source.read_feed(period)?;
    Ok(data::parse_period(&xml, period)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::FolderSource;
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;

    fn feed(items: &[(&str, &str)]) -> String {
        let body: String = items
            .iter()
            .map(|(title, description)| {
                format!(
                    "<item><title>{}</title><pubDate>{}</pubDate><description>{}</description></item>",
                    title,
                    &title[..5],
                    description
                )
            })
            .collect();
        format!("<rss><channel>{}</channel></rss>", body)
    }

    fn create_source(files: &[(&str, String)]) -> (FolderSource, TempDir) {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        for (name, content) in files {
            fs::write(temp_dir.path().join(name), content).expect("Failed to write fixture");
        }
        (FolderSource::new(temp_dir.path()), temp_dir)
    }

    #[test]
    fn test_load_applies_rules_with_stored_name() {
        let (source, _dir) = create_source(&[
            ("assetClassRatio.csv", "timestamp,y,other\n2023-01-01,20,val".to_string()),
            ("other.CSV", "header1,header2\nval3,val4".to_string()),
        ]);

        let snapshot = Snapshot::load(&source).unwrap();

        assert_eq!(
            Value::Object(snapshot.datasets_object()),
            json!({
                "assetClassRatio": [{"other": "val", "amount_yen": "20"}],
                "other": [{"header1": "val3", "header2": "val4"}]
            })
        );
    }

    #[test]
    fn test_load_dataset_resolves_case_insensitively() {
        let (source, _dir) = create_source(&[(
            "assetClassRatio.csv",
            "timestamp,y,other\n2023-01-01,20,val".to_string(),
        )]);

        let (name, records) = load_dataset(&source, "assetclassratio")
            .unwrap()
            .expect("dataset should exist");

        assert_eq!(name, "assetClassRatio");
        assert_eq!(records_value(&records), json!([{"other": "val", "amount_yen": "20"}]));
    }

    #[test]
    fn test_load_dataset_missing() {
        let (source, _dir) = create_source(&[]);

        assert!(load_dataset(&source, "nonexistent").unwrap().is_none());
    }

    #[test]
    fn test_collect_feed_substitutes_empty_list_for_broken_period() {
        let (source, _dir) = create_source(&[
            (
                "transactions_202601.xml",
                feed(&[("01/10(土) -¥500 Bakery", "category: 食費 is_transfer: false")]),
            ),
            ("transactions_202602.xml", "<rss><channel><item><title>x</item>".to_string()),
            (
                "transactions_202603.xml",
                feed(&[("03/01(日) ¥1,000 Refund", "category: 収入 is_transfer: false")]),
            ),
        ]);

        let periods = collect_feed(&source).unwrap();

        let keys: Vec<&str> = periods.iter().map(|p| p.period.as_str()).collect();
        assert_eq!(keys, vec!["202603", "202602", "202601"]);
        assert!(periods[1].entries.is_empty());
        assert_eq!(periods[0].entries[0].amount, 1000);
        assert_eq!(periods[2].entries[0].name, "Bakery");
        assert_eq!(periods[2].entries[0].date, "2026-01-10");
    }

    #[test]
    fn test_to_response_puts_feed_under_transactions() {
        let (source, _dir) = create_source(&[
            ("other.csv", "h\nv".to_string()),
            (
                "transactions_202601.xml",
                feed(&[("01/10(土) -¥500 Bakery", "category: 食費 is_transfer: false")]),
            ),
            (
                "transactions_202602.xml",
                feed(&[
                    ("02/01(日) -¥100 A", "category: x is_transfer: false"),
                    ("02/02(月) -¥200 B", "category: y is_transfer: true"),
                ]),
            ),
        ]);

        let response = Snapshot::load(&source).unwrap().to_response();

        assert_eq!(response["other"], json!([{"h": "v"}]));
        let names: Vec<&str> = response[FEED_FIELD]
            .as_array()
            .expect("transactions should be an array")
            .iter()
            .map(|t| t["name"].as_str().unwrap_or_default())
            .collect();
        assert_eq!(names, vec!["A", "B", "Bakery"]);
    }
}
