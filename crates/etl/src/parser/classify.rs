//! Classify — tab-separated CDN log line → [`LineOutcome`].

use tracing::{trace, warn};

use super::model::{ClassifiedRecord, LineOutcome, SkipReason, StatusPolicy};
use super::path::entity_from_path;

pub const MIN_FIELDS: usize = 17;

const DATE: usize = 0;
const TIME: usize = 1;
const CLIENT_IP: usize = 3;
const FILE_SIZE: usize = 7;
const CS_BYTES: usize = 8;
const SC_BYTES: usize = 9;
const STATUS: usize = 12;
const PATH: usize = 14;

const COMMENT_MARKER: char = '#';
const MISSING_STATUS: &str = "-";
pub const COLLAPSED_STATUS: &str = "200";

/// Classify one raw log line.
pub fn classify(line: &str, policy: StatusPolicy) -> LineOutcome {
    if line.is_empty() {
        return LineOutcome::Skip(SkipReason::Empty);
    }
    if line.starts_with(COMMENT_MARKER) {
        return LineOutcome::Skip(SkipReason::Comment);
    }

    let fields: Vec<&str> = line.split('\t').collect();
    if fields.len() < MIN_FIELDS {
        trace!("Line has {} fields, need {}: {:?}", fields.len(), MIN_FIELDS, line);
        return LineOutcome::Skip(SkipReason::TooFewFields(fields.len()));
    }

    let (kind, entity_id) = match entity_from_path(fields[PATH]) {
        Ok(entity) => entity,
        Err(e) => {
            trace!("Unattributed path {:?}: {}", fields[PATH], e);
            return match fields[SC_BYTES].parse::<i64>() {
                Ok(bytes) => LineOutcome::NonEntity(bytes),
                Err(_) => LineOutcome::Skip(SkipReason::Unattributable),
            };
        }
    };

    let status = fields[STATUS];
    if status == MISSING_STATUS {
        return LineOutcome::Skip(SkipReason::MissingStatus);
    }
    let status = match policy {
        StatusPolicy::Collapsed => COLLAPSED_STATUS.to_string(),
        StatusPolicy::PerStatus => status.to_string(),
    };

    let hour = fields[TIME].split(':').next().unwrap_or_default();

    LineOutcome::Record(ClassifiedRecord {
        date_hour: format!("{}{}", fields[DATE], hour),
        entity_id,
        kind,
        client_ip: fields[CLIENT_IP].to_string(),
        file_size: parse_counter(fields[FILE_SIZE], "file size"),
        bytes_from_origin: parse_counter(fields[CS_BYTES], "cs-bytes"),
        bytes_to_client: parse_counter(fields[SC_BYTES], "sc-bytes"),
        status,
    })
}

/// Malformed counters count as zero.
fn parse_counter(raw: &str, name: &str) -> i64 {
    match raw.parse::<i64>() {
        Ok(v) => v,
        Err(_) => {
            warn!("Invalid {} value {:?}, using 0", name, raw);
            0
        }
    }
}
