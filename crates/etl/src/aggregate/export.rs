//! Export — flatten an [`AggregateStore`] into the usage API envelope.
//!
//! One [`UsageBatch`] per window, dated at the window start. Buckets that
//! differ only by date-hour are merged. Records carry the entity id in
//! `playback_id` (live) or `stream_id` (recordings); the other is empty.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};

use super::store::{AggregateBucket, AggregateStore};
use crate::error::EtlError;
use crate::parser::classify::COLLAPSED_STATUS;
use crate::parser::{EntityKind, StatusPolicy};

/// Envelope data for one window.
#[derive(Debug, Clone)]
pub struct WindowMeta {
    pub region: String,
    pub window_start: DateTime<Utc>,
    /// Last object processed in the window; stored by the API as the checkpoint.
    pub last_file: String,
    pub policy: StatusPolicy,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportRecord {
    pub kind: EntityKind,
    pub entity_id: String,
    pub unique_users: u64,
    pub total_views: u64,
    pub total_file_size: i64,
    pub total_bytes_from_origin: i64,
    pub total_bytes_to_client: i64,
    pub http_status: String,
}

impl ExportRecord {
    fn new(kind: EntityKind, entity_id: &str, status: &str, bucket: &AggregateBucket) -> Self {
        Self {
            kind,
            entity_id: entity_id.to_string(),
            unique_users: bucket.unique_client_ips.len() as u64,
            total_views: bucket.count,
            total_file_size: bucket.total_file_size,
            total_bytes_from_origin: bucket.total_bytes_from_origin,
            total_bytes_to_client: bucket.total_bytes_to_client,
            http_status: status.to_string(),
        }
    }

    pub fn stream_id(&self) -> &str {
        match self.kind {
            EntityKind::StreamId => &self.entity_id,
            EntityKind::ManifestId => "",
        }
    }

    pub fn playback_id(&self) -> &str {
        match self.kind {
            EntityKind::ManifestId => &self.entity_id,
            EntityKind::StreamId => "",
        }
    }
}

impl Serialize for ExportRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("ExportRecord", 8)?;
        s.serialize_field("stream_id", self.stream_id())?;
        s.serialize_field("playback_id", self.playback_id())?;
        s.serialize_field("unique_users", &self.unique_users)?;
        s.serialize_field("total_filesize", &self.total_file_size)?;
        s.serialize_field("total_cs_bytes", &self.total_bytes_from_origin)?;
        s.serialize_field("total_sc_bytes", &self.total_bytes_to_client)?;
        s.serialize_field("count", &self.total_views)?;
        s.serialize_field("http_status", &self.http_status)?;
        s.end()
    }
}

/// `POST /api/cdn-data` body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageBatch {
    /// Unix seconds of the window start.
    pub date: i64,
    pub region: String,
    pub file_name: String,
    pub data: Vec<ExportRecord>,
}

impl AggregateStore {
    /// Build the window's export batch without touching the store.
    ///
    /// `None` when nothing was aggregated. Records are sorted by
    /// (kind, id, status), so repeated calls return identical output.
    pub fn flatten(&self, meta: &WindowMeta) -> Result<Option<UsageBatch>, EtlError> {
        let mut merged: BTreeMap<(EntityKind, &str, &str), AggregateBucket> = BTreeMap::new();
        for (key, bucket) in self.buckets() {
            if bucket.count == 0 {
                return Err(EtlError::InvariantViolation(format!(
                    "empty bucket for {} {}",
                    key.kind, key.entity_id
                )));
            }
            if meta.policy == StatusPolicy::Collapsed && key.status != COLLAPSED_STATUS {
                return Err(EtlError::InvariantViolation(format!(
                    "status {:?} present under collapsed status policy",
                    key.status
                )));
            }
            merged
                .entry((key.kind, key.entity_id.as_str(), key.status.as_str()))
                .or_default()
                .merge(bucket);
        }

        if merged.is_empty() {
            return Ok(None);
        }

        Ok(Some(UsageBatch {
            date: meta.window_start.timestamp(),
            region: meta.region.clone(),
            file_name: meta.last_file.clone(),
            data: merged
                .iter()
                .map(|((kind, id, status), bucket)| ExportRecord::new(*kind, id, status, bucket))
                .collect(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    use crate::parser::{classify, LineOutcome};

    const SAMPLE: &str = "\
2021-11-17\t16:47:16\tGET\t104.28.131.0\thttps\thttps://cdn.livepeer.monster/\tMozilla/5.0\t0\t736\t0\t151.139.34.203\t2.147\t499\tmsn=516\t/hls/video+9e70xehvtu637q6p/5/chunk_1031999.ts\t-\t-
2021-11-17\t16:47:17\tGET\t104.28.131.0\thttps\thttps://cdn.livepeer.monster/\tMozilla/5.0\t72756\t736\t74134\t151.139.34.203\t0.542\t200\tmsn=516\t/hls/video+9e70xehvtu637q6p/5/chunk_1031999.ts\t-\t-
2021-11-17\t16:47:17\tGET\t104.28.131.0\thttps\thttps://cdn.livepeer.monster/\tMozilla/5.0\t81780\t736\t83205\t151.139.34.195\t0.784\t200\tmsn=517\t/hls/video+9e70xehvtu637q6p/5/chunk_1033999.ts\t-\t-";

    fn meta(policy: StatusPolicy) -> WindowMeta {
        WindowMeta {
            region: "test-region".to_string(),
            window_start: Utc.with_ymd_and_hms(2021, 11, 17, 16, 0, 0).unwrap(),
            last_file: "test.file.name".to_string(),
            policy,
        }
    }

    fn load(policy: StatusPolicy) -> AggregateStore {
        let mut store = AggregateStore::new();
        for line in SAMPLE.lines() {
            match classify(line, policy) {
                LineOutcome::Record(r) => store.apply(r),
                LineOutcome::NonEntity(b) => store.apply_non_entity(b),
                LineOutcome::Skip(_) => {}
            }
        }
        store
    }

    #[test]
    fn test_flatten_sample() {
        let store = load(StatusPolicy::Collapsed);
        let batch = store.flatten(&meta(StatusPolicy::Collapsed)).unwrap().unwrap();

        assert_eq!(batch.region, "test-region");
        assert_eq!(batch.file_name, "test.file.name");
        assert_eq!(batch.date, 1637164800);
        assert_eq!(batch.data.len(), 1);

        let r = &batch.data[0];
        assert_eq!(r.total_views, 3);
        assert_eq!(r.unique_users, 1);
        assert_eq!(r.stream_id(), "");
        assert_eq!(r.playback_id(), "9e70xehvtu637q6p");
        assert_eq!(r.total_file_size, 154536);
        assert_eq!(r.total_bytes_from_origin, 2208);
        assert_eq!(r.total_bytes_to_client, 157339);
        assert_eq!(r.http_status, "200");
    }

    #[test]
    fn test_flatten_per_status() {
        let store = load(StatusPolicy::PerStatus);
        let batch = store.flatten(&meta(StatusPolicy::PerStatus)).unwrap().unwrap();
        let statuses: Vec<&str> = batch.data.iter().map(|r| r.http_status.as_str()).collect();
        assert_eq!(statuses, vec!["200", "499"]);
    }

    #[test]
    fn test_flatten_is_idempotent() {
        let store = load(StatusPolicy::Collapsed);
        let first = store.flatten(&meta(StatusPolicy::Collapsed)).unwrap();
        let second = store.flatten(&meta(StatusPolicy::Collapsed)).unwrap();
        assert_eq!(first, second);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_flatten_rejects_uncollapsed_status() {
        let store = load(StatusPolicy::PerStatus);
        let err = store.flatten(&meta(StatusPolicy::Collapsed)).unwrap_err();
        assert!(matches!(err, EtlError::InvariantViolation(_)));
    }

    #[test]
    fn test_flatten_empty_store() {
        let store = AggregateStore::new();
        assert!(store.flatten(&meta(StatusPolicy::Collapsed)).unwrap().is_none());
    }

    #[test]
    fn test_lines_past_the_hour_merge_into_window_batch() {
        let mut store = load(StatusPolicy::Collapsed);
        let late = SAMPLE
            .lines()
            .nth(1)
            .unwrap()
            .replace("16:47:17", "17:00:03")
            .replace("104.28.131.0", "104.28.131.9");
        match classify(&late, StatusPolicy::Collapsed) {
            LineOutcome::Record(r) => store.apply(r),
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(store.len(), 2);

        let batch = store.flatten(&meta(StatusPolicy::Collapsed)).unwrap().unwrap();
        assert_eq!(batch.date, 1637164800);
        assert_eq!(batch.data.len(), 1);
        let r = &batch.data[0];
        assert_eq!(r.total_views, 4);
        assert_eq!(r.unique_users, 2);
        assert_eq!(r.total_bytes_to_client, 157339 + 74134);
    }

    #[test]
    fn test_wire_format() {
        let store = load(StatusPolicy::Collapsed);
        let batch = store.flatten(&meta(StatusPolicy::Collapsed)).unwrap().unwrap();
        let json = serde_json::to_value(&batch).unwrap();

        assert_eq!(json["date"], 1637164800);
        assert_eq!(json["fileName"], "test.file.name");
        let record = &json["data"][0];
        assert_eq!(record["playback_id"], "9e70xehvtu637q6p");
        assert_eq!(record["stream_id"], "");
        assert_eq!(record["count"], 3);
        assert_eq!(record["unique_users"], 1);
        assert_eq!(record["total_sc_bytes"], 157339);
        assert_eq!(record["total_cs_bytes"], 2208);
        assert_eq!(record["total_filesize"], 154536);
    }
}
