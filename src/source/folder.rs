//! Local directory storage
//!
//! Reads datasets (`*.csv`) and feed documents (`transactions_YYYYMM.xml`)
//! from one flat directory.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use super::{
    dataset_file_name, feed_file_name, feed_period, strip_dataset_extension, DataSource,
    DatasetFile, SourceError,
};

/// A [`DataSource`] backed by a local directory
#[derive(Debug, Clone)]
pub struct FolderSource {
    /// Directory holding the dataset and feed files
    root: PathBuf,
}

impl FolderSource {
    /// Creates a FolderSource reading from `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Returns the directory this source reads from
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// File names in the directory, sorted so listings are stable
    fn file_names(&self) -> Result<Vec<String>, SourceError> {
        let entries = fs::read_dir(&self.root).map_err(|source| SourceError::Io {
            path: self.root.clone(),
            source,
        })?;

        let mut names: Vec<String> = entries
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
            .filter_map(|entry| entry.file_name().into_string().ok())
            .collect();
        names.sort();
        Ok(names)
    }

    /// Reads a file as UTF-8, replacing invalid byte sequences with U+FFFD
    fn read_file(&self, file_name: &str) -> Result<String, SourceError> {
        let path = self.root.join(file_name);
        let bytes = fs::read(&path).map_err(|source| SourceError::Io { path, source })?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

impl DataSource for FolderSource {
    /// Names differing only in case resolve to the same file, so only the
    /// first of them (in sorted order) is listed.
    fn list_datasets(&self) -> Result<Vec<String>, SourceError> {
        let mut seen = HashSet::new();
        Ok(self
            .file_names()?
            .iter()
            .filter_map(|name| strip_dataset_extension(name))
            .filter(|name| seen.insert(name.to_lowercase()))
            .map(str::to_string)
            .collect())
    }

    fn read_dataset(&self, name: &str) -> Result<Option<DatasetFile>, SourceError> {
        let target = dataset_file_name(name);

        let Some(file_name) = self
            .file_names()?
            .into_iter()
            .find(|file_name| file_name.to_lowercase() == target)
        else {
            return Ok(None);
        };

        let content = self.read_file(&file_name)?;
        let name = strip_dataset_extension(&file_name)
            .unwrap_or(name)
            .to_string();

        Ok(Some(DatasetFile { name, content }))
    }

    fn list_feed_periods(&self) -> Result<Vec<String>, SourceError> {
        Ok(self
            .file_names()?
            .iter()
            .filter_map(|name| feed_period(name))
            .map(str::to_string)
            .collect())
    }

    fn read_feed(&self, period: &str) -> Result<String, SourceError> {
        let file_name = feed_file_name(period);
        if !self.root.join(&file_name).is_file() {
            return Err(SourceError::MissingPeriod(period.to_string()));
        }
        self.read_file(&file_name)
    }
}
