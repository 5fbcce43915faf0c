//! Per-dataset normalization rules
//!
//! Each dataset exported to the storage folder carries bookkeeping columns
//! (scrape timestamps, table indices, raw text copies) that clients do not
//! need. The rule table below strips them, keyed by dataset name.

use serde_json::Value;

use super::Record;

/// How a rule decides whether it applies to a dataset name
#[derive(Debug, Clone, Copy)]
enum Matcher {
    /// Name equals one of the listed names
    Exact(&'static [&'static str]),
    /// Name starts with the prefix
    Prefix(&'static str),
}

impl Matcher {
    fn matches(&self, dataset: &str) -> bool {
        match self {
            Matcher::Exact(names) => names.contains(&dataset),
            Matcher::Prefix(prefix) => dataset.starts_with(prefix),
        }
    }
}

/// A normalization rule: columns to delete plus an optional in-place transform
#[derive(Debug, Clone, Copy)]
struct FormatRule {
    matcher: Matcher,
    remove: &'static [&'static str],
    transform: Option<fn(&mut Record)>,
}

/// Rules in evaluation order; the first match wins
static FORMAT_RULES: [FormatRule; 5] = [
    FormatRule {
        matcher: Matcher::Exact(&["breakdown-liability", "breakdown"]),
        remove: &["timestamp", "amount_text_num", "percentage_text_num"],
        transform: None,
    },
    FormatRule {
        matcher: Matcher::Prefix("details__liability"),
        remove: &["timestamp", "detail_id", "table_index", "残高_yen"],
        transform: None,
    },
    FormatRule {
        matcher: Matcher::Exact(&["total-liability"]),
        remove: &["timestamp", "total_text_num"],
        transform: None,
    },
    FormatRule {
        matcher: Matcher::Exact(&["assetClassRatio"]),
        remove: &["timestamp"],
        transform: Some(rename_y_to_amount_yen),
    },
    FormatRule {
        matcher: Matcher::Prefix("details__portfolio"),
        remove: &["timestamp", "detail_id", "table_index"],
        transform: None,
    },
];

/// Moves the chart value column `y` to `amount_yen`, appended last
fn rename_y_to_amount_yen(record: &mut Record) {
    if let Some(value) = record.shift_remove("y") {
        record.insert("amount_yen".to_string(), value);
    }
}

fn find_rule(dataset: &str) -> Option<&'static FormatRule> {
    FORMAT_RULES.iter().find(|rule| rule.matcher.matches(dataset))
}

fn apply_rule(rule: Option<&FormatRule>, mut record: Record) -> Record {
    if let Some(rule) = rule {
        for column in rule.remove {
            record.shift_remove(*column);
        }
        if let Some(transform) = rule.transform {
            transform(&mut record);
        }
    }
    record
}

/// Applies the dataset's rule to copies of `records`
///
/// Records of datasets without a rule come back as plain copies. Deleting a
/// column that does not exist is a no-op, and surviving columns keep their
/// original order.
pub fn normalize_records(records: &[Record], dataset: &str) -> Vec<Record> {
    let rule = find_rule(dataset);

    records
        .iter()
        .map(|record| apply_rule(rule, record.clone()))
        .collect()
}

/// Normalizes an arbitrary JSON value holding a dataset's rows
///
/// Anything other than an array is returned unchanged, as are array elements
/// that are not objects.
pub fn normalize(data: Value, dataset: &str) -> Value {
    let Value::Array(items) = data else {
        return data;
    };

    let rule = find_rule(dataset);
    let normalized = items
        .into_iter()
        .map(|item| match item {
            Value::Object(record) => Value::Object(apply_rule(rule, record)),
            other => other,
        })
        .collect();

    Value::Array(normalized)
}
