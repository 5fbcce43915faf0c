//! Storage collaborators
//!
//! The endpoint reads CSV datasets and monthly feed documents from a storage
//! location. [`DataSource`] is the seam: the service only needs to list and
//! read files, so any storage backend can sit behind it. [`FolderSource`]
//! reads a local directory.

mod folder;

pub use folder::FolderSource;

use std::path::PathBuf;
use thiserror::Error;

/// Extension of dataset files
pub const DATASET_EXTENSION: &str = ".csv";

/// File name prefix of feed documents
pub const FEED_FILE_PREFIX: &str = "transactions_";

/// Extension of feed documents
pub const FEED_FILE_EXTENSION: &str = ".xml";

/// Errors that can occur when reading from storage
#[derive(Debug, Error)]
pub enum SourceError {
    /// Listing or reading a file failed
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A dataset file is not valid CSV
    #[error("Failed to parse dataset {name}: {source}")]
    Csv {
        name: String,
        #[source]
        source: csv::Error,
    },

    /// No feed document exists for the period
    #[error("Feed period not found: {0}")]
    MissingPeriod(String),
}

/// A dataset file resolved from a (case-insensitive) dataset name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetFile {
    /// Dataset name as stored, without extension
    pub name: String,
    /// Raw CSV content
    pub content: String,
}

/// Read-only access to the stored datasets and feed documents
pub trait DataSource: Send + Sync {
    /// Names of all datasets, without extension, unique when compared case-insensitively
    fn list_datasets(&self) -> Result<Vec<String>, SourceError>;

    /// Reads the dataset whose file name matches `name` case-insensitively
    ///
    /// Returns `Ok(None)` when no such dataset exists.
    fn read_dataset(&self, name: &str) -> Result<Option<DatasetFile>, SourceError>;

    /// `YYYYMM` keys of all stored feed documents
    fn list_feed_periods(&self) -> Result<Vec<String>, SourceError>;

    /// Reads the feed document for `period`
    fn read_feed(&self, period: &str) -> Result<String, SourceError>;
}

/// The file name a dataset name resolves to, lower-cased
pub fn dataset_file_name(name: &str) -> String {
    format!("{}{}", name, DATASET_EXTENSION).to_lowercase()
}

/// Strips a case-insensitive `.csv` extension, if present
pub fn strip_dataset_extension(file_name: &str) -> Option<&str> {
    let split = file_name.len().checked_sub(DATASET_EXTENSION.len())?;
    let (stem, ext) = (file_name.get(..split)?, file_name.get(split..)?);
    ext.eq_ignore_ascii_case(DATASET_EXTENSION).then_some(stem)
}

/// Extracts the `YYYYMM` period from a feed document file name
///
/// Only `transactions_<6 digits>.xml` names qualify; anything else is `None`.
pub fn feed_period(file_name: &str) -> Option<&str> {
    let period = file_name
        .strip_prefix(FEED_FILE_PREFIX)?
        .strip_suffix(FEED_FILE_EXTENSION)?;
    (period.len() == 6 && period.bytes().all(|b| b.is_ascii_digit())).then_some(period)
}

/// The feed document file name for a period
pub fn feed_file_name(period: &str) -> String {
    format!("{}{}{}", FEED_FILE_PREFIX, period, FEED_FILE_EXTENSION)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dataset_file_name_is_lower_cased() {
        assert_eq!(dataset_file_name("assetClassRatio"), "assetclassratio.csv");
    }

    #[test]
    fn test_strip_dataset_extension_is_case_insensitive() {
        assert_eq!(strip_dataset_extension("other.CSV"), Some("other"));
        assert_eq!(strip_dataset_extension("assetClassRatio.csv"), Some("assetClassRatio"));
        assert_eq!(strip_dataset_extension("notes.txt"), None);
        assert_eq!(strip_dataset_extension("csv"), None);
    }

    #[test]
    fn test_strip_dataset_extension_handles_multibyte_names() {
        assert_eq!(strip_dataset_extension("資産.csv"), Some("資産"));
        assert_eq!(strip_dataset_extension("資産"), None);
    }

    #[test]
    fn test_feed_period_accepts_only_six_digits() {
        assert_eq!(feed_period("transactions_202602.xml"), Some("202602"));
        assert_eq!(feed_period("transactions_20262.xml"), None);
        assert_eq!(feed_period("transactions_2026022.xml"), None);
        assert_eq!(feed_period("transactions_2026ab.xml"), None);
        assert_eq!(feed_period("other_202602.xml"), None);
        assert_eq!(feed_period("transactions_202602.csv"), None);
    }

    #[test]
    fn test_feed_file_name_round_trips_period() {
        let name = feed_file_name("202601");
        assert_eq!(name, "transactions_202601.xml");
        assert_eq!(feed_period(&name), Some("202601"));
    }
}
