//! Transaction feed parsing
//!
//! Each month of household-ledger activity is exported as an RSS document.
//! The interesting data lives in free text: the item title carries the date,
//! the signed yen amount and the merchant name, and the description carries
//! `category:` and `is_transfer:` markers. This module reads the items and
//! extracts a [`TransactionRecord`] from each one.

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Utc};
use once_cell::sync::Lazy;
use quick_xml::events::Event;
use quick_xml::Reader;
use regex::Regex;
use thiserror::Error;

use super::{TransactionRecord, CURRENCY};

static TITLE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[0-9]{2}/[0-9]{2}\(.+?\)\s+([+-]?¥[0-9,]+)\s+(.+)$").expect("title pattern is valid")
});

static CATEGORY_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"category:\s*(.*?)\s+is_transfer:").expect("category pattern is valid")
});

static TRANSFER_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"is_transfer:\s*(true|false)").expect("transfer pattern is valid")
});

static MONTH_DAY_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([0-9]{1,2})/([0-9]{1,2})").expect("month/day pattern is valid"));

static YEAR_MONTH_DAY_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([0-9]{4})/([0-9]{1,2})/([0-9]{1,2})").expect("year/month/day pattern is valid")
});

static FOUR_DIGIT_YEAR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[0-9]{4}").expect("year pattern is valid"));

/// Errors that can occur when reading a feed document
#[derive(Debug, Error)]
pub enum FeedError {
    /// The document is not well-formed XML
    #[error("Malformed feed XML: {0}")]
    Xml(#[from] quick_xml::Error),

    /// The document ended inside an `<item>`
    #[error("Feed ended inside an unterminated item")]
    UnterminatedItem,
}

/// The three text fields of one feed `<item>`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawFeedEntry {
    pub title: String,
    pub pub_date: String,
    pub description: String,
}

#[derive(Debug, Clone, Copy)]
enum ItemField {
    Title,
    PubDate,
    Description,
}

/// Reads every `<item>` of an RSS document in declaration order
///
/// Text and CDATA content are both accepted and kept verbatim, surrounding
/// whitespace included; elements other than `title`, `pubDate` and
/// `description` are ignored.
pub fn parse_feed(xml: &str) -> Result<Vec<RawFeedEntry>, FeedError> {
    let mut reader = Reader::from_str(xml);

    let mut entries = Vec::new();
    let mut current: Option<RawFeedEntry> = None;
    let mut field: Option<ItemField> = None;

    loop {
        match reader.read_event()? {
            Event::Start(element) => match element.name().as_ref() {
                b"item" => current = Some(RawFeedEntry::default()),
                b"title" if current.is_some() => field = Some(ItemField::Title),
                b"pubDate" if current.is_some() => field = Some(ItemField::PubDate),
                b"description" if current.is_some() => field = Some(ItemField::Description),
                _ => {}
            },
            Event::End(element) => match element.name().as_ref() {
                b"item" => {
                    if let Some(entry) = current.take() {
                        entries.push(entry);
                    }
                    field = None;
                }
                b"title" | b"pubDate" | b"description" => field = None,
                _ => {}
            },
            Event::Text(text) => {
                if let (Some(entry), Some(field)) = (current.as_mut(), field) {
                    push_text(entry, field, &text.unescape()?);
                }
            }
            Event::CData(data) => {
                if let (Some(entry), Some(field)) = (current.as_mut(), field) {
                    let raw = data.into_inner();
                    push_text(entry, field, &String::from_utf8_lossy(&raw));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if current.is_some() {
        return Err(FeedError::UnterminatedItem);
    }

    Ok(entries)
}

fn push_text(entry: &mut RawFeedEntry, field: ItemField, text: &str) {
    let target = match field {
        ItemField::Title => &mut entry.title,
        ItemField::PubDate => &mut entry.pub_date,
        ItemField::Description => &mut entry.description,
    };
    target.push_str(text);
}

/// Parses one period's feed document into transactions
///
/// The first four characters of `period` (a `YYYYMM` key) are used as the
/// year for item dates that only carry month and day.
pub fn parse_period(xml: &str, period: &str) -> Result<Vec<TransactionRecord>, FeedError> {
    let year = period.get(..4);
    let entries = parse_feed(xml)?;

    Ok(entries
        .iter()
        .map(|entry| extract(&entry.title, &entry.pub_date, &entry.description, year))
        .collect())
}

/// Extracts a transaction from one feed item's text fields
///
/// Never fails: a title that does not match the expected layout yields an
/// amount of `0` and the whole title as the name, missing description
/// markers yield an empty category and `is_transfer = false`.
pub fn extract(
    title: &str,
    pub_date: &str,
    description: &str,
    period_year: Option<&str>,
) -> TransactionRecord {
    let (amount_text, name) = match TITLE_PATTERN.captures(title) {
        Some(caps) => (caps[1].to_string(), caps[2].to_string()),
        None => ("0".to_string(), title.to_string()),
    };

    let category = CATEGORY_PATTERN
        .captures(description)
        .map(|caps| caps[1].trim().to_string())
        .unwrap_or_default();

    let is_transfer = TRANSFER_PATTERN
        .captures(description)
        .map(|caps| &caps[1] == "true")
        .unwrap_or(false);

    TransactionRecord {
        date: format_date(pub_date, period_year),
        amount: parse_amount(&amount_text),
        currency: CURRENCY.to_string(),
        name,
        category,
        is_transfer,
    }
}

/// Parses signed yen text such as `-¥3,000`, returning 0 when it is not numeric
fn parse_amount(text: &str) -> i64 {
    let cleaned: String = text.chars().filter(|c| *c != '¥' && *c != ',').collect();
    cleaned.parse().unwrap_or(0)
}

/// Normalizes a feed date to `YYYY-MM-DD`
///
/// # Arguments
/// * `pub_date` - The raw date text from the feed
/// * `fallback_year` - Year used for `MM/DD` dates; the current UTC year when absent
///
/// # Returns
/// * `MM/DD...` without any four-digit year: the fallback year with that month and day
/// * `YYYY/MM/DD...`: the same date, reformatted without timezone conversion
/// * anything else chrono can read as a date: its UTC calendar date
/// * an empty string otherwise
pub fn format_date(pub_date: &str, fallback_year: Option<&str>) -> String {
    let text = pub_date.trim();

    if !FOUR_DIGIT_YEAR.is_match(text) {
        if let Some(caps) = MONTH_DAY_PATTERN.captures(text) {
            let year = fallback_year
                .and_then(|year| year.trim().parse::<i32>().ok())
                .unwrap_or_else(|| Utc::now().year());
            return format!("{:04}-{:0>2}-{:0>2}", year, &caps[1], &caps[2]);
        }
    }

    if let Some(caps) = YEAR_MONTH_DAY_PATTERN.captures(text) {
        return format!("{}-{:0>2}-{:0>2}", &caps[1], &caps[2], &caps[3]);
    }

    parse_generic_date(text)
        .map(|date| date.format("%Y-%m-%d").to_string())
        .unwrap_or_default()
}

/// Reads the date formats that show up in RSS `pubDate` elements, in UTC
fn parse_generic_date(text: &str) -> Option<NaiveDate> {
    if let Ok(dt) = DateTime::parse_from_rfc2822(text) {
        return Some(dt.with_timezone(&Utc).date_naive());
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc).date_naive());
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S") {
        return Some(dt.date());
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(text, "%m/%d/%Y"))
        .ok()
}
