//! CSV table parsing
//!
//! Turns a CSV export into dataset records keyed by the header row.

use csv::ReaderBuilder;
use serde_json::Value;

use super::Record;

/// Parses CSV content into records keyed by the first row
///
/// Returns an empty list when the content has fewer than two rows. Rows
/// shorter than the header get empty strings for the missing columns, so
/// every record carries the full header key set.
pub fn parse_csv(content: &str) -> Result<Vec<Record>, csv::Error> {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);

    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(content.as_bytes());

    let mut rows = reader.records();
    let headers = match rows.next() {
        Some(row) => row?,
        None => return Ok(Vec::new()),
    };

    let mut records = Vec::new();
    for row in rows {
        let row = row?;
        let record: Record = headers
            .iter()
            .enumerate()
            .map(|(index, header)| {
                let value = row.get(index).unwrap_or_default();
                (header.to_string(), Value::String(value.to_string()))
            })
            .collect();
        records.push(record);
    }

    Ok(records)
}
