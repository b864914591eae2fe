//! Naming — the CDN log object naming convention.
//!
//! Objects are stored as `<source>/cds/<yyyy>/<mm>/<dd>/cds_<yyyyMMdd>-<HHmmss>…`.
//! Because the timestamp is zero-padded and fixed-width, lexicographic order
//! of names equals chronological order, so an hour window maps to an exact
//! name range without opening any object.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};

use super::StorageError;

const LOG_DIR: &str = "cds";
const FILE_PREFIX: &str = "cds_";

/// Listing prefix holding every log object of a source.
pub fn source_prefix(source: &str) -> String {
    format!("{}/{}/", source, LOG_DIR)
}

/// The (possibly non-existent) object name that sorts exactly at `at`.
pub fn object_name_at(source: &str, at: DateTime<Utc>) -> String {
    format!(
        "{}/{}/{}",
        source,
        LOG_DIR,
        at.format("%Y/%m/%d/cds_%Y%m%d-%H%M%S")
    )
}

/// Parse the embedded timestamp out of a full object name.
pub fn parse_object_time(name: &str) -> Result<DateTime<Utc>, StorageError> {
    let invalid = || StorageError::InvalidName(name.to_string());

    let file = name.rsplit('/').next().unwrap_or(name);
    let stamp = file.strip_prefix(FILE_PREFIX).unwrap_or(file);
    let mut parts = stamp.split('-');
    let date = parts.next().and_then(|p| fixed_digits(p, 8)).ok_or_else(invalid)?;
    let time = parts.next().and_then(|p| fixed_digits(p, 6)).ok_or_else(invalid)?;

    let date = NaiveDate::parse_from_str(date, "%Y%m%d").map_err(|_| invalid())?;
    let time = NaiveTime::parse_from_str(time, "%H%M%S").map_err(|_| invalid())?;
    Ok(date.and_time(time).and_utc())
}

/// Truncate to the top of the hour.
pub fn truncate_to_hour(at: DateTime<Utc>) -> DateTime<Utc> {
    let secs = at.timestamp();
    DateTime::from_timestamp(secs - secs.rem_euclid(3600), 0).unwrap_or(at)
}

/// Strip one trailing `/` from a directory-style prefix.
pub fn trim_dir(prefix: &str) -> &str {
    prefix.strip_suffix('/').unwrap_or(prefix)
}

fn fixed_digits(part: &str, width: usize) -> Option<&str> {
    let head = part.get(..width)?;
    head.bytes().all(|b| b.is_ascii_digit()).then_some(head)
}
