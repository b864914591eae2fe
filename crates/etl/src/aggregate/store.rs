use std::collections::{HashMap, HashSet};

use crate::parser::{ClassifiedRecord, EntityKind};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AggregateKey {
    pub date_hour: String,
    pub kind: EntityKind,
    pub entity_id: String,
    pub status: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AggregateBucket {
    pub unique_client_ips: HashSet<String>,
    /// Number of records folded in.
    pub count: u64,
    pub total_file_size: i64,
    pub total_bytes_from_origin: i64,
    pub total_bytes_to_client: i64,
}

impl AggregateBucket {
    fn add(&mut self, record: ClassifiedRecord) {
        self.unique_client_ips.insert(record.client_ip);
        self.count += 1;
        self.total_file_size = self.total_file_size.saturating_add(record.file_size);
        self.total_bytes_from_origin = self.total_bytes_from_origin.saturating_add(record.bytes_from_origin);
        self.total_bytes_to_client = self.total_bytes_to_client.saturating_add(record.bytes_to_client);
    }

    /// Fold another bucket in: union of client IPs, summed counters.
    pub fn merge(&mut self, other: &AggregateBucket) {
        self.unique_client_ips.extend(other.unique_client_ips.iter().cloned());
        self.count += other.count;
        self.total_file_size = self.total_file_size.saturating_add(other.total_file_size);
        self.total_bytes_from_origin = self.total_bytes_from_origin.saturating_add(other.total_bytes_from_origin);
        self.total_bytes_to_client = self.total_bytes_to_client.saturating_add(other.total_bytes_to_client);
    }
}

/// Counters for one processing window. Not shared; see [`super::actor`].
#[derive(Debug, Default)]
pub struct AggregateStore {
    buckets: HashMap<AggregateKey, AggregateBucket>,
    non_entity_bytes: i64,
}

impl AggregateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, record: ClassifiedRecord) {
        let key = AggregateKey {
            date_hour: record.date_hour.clone(),
            kind: record.kind,
            entity_id: record.entity_id.clone(),
            status: record.status.clone(),
        };
        self.buckets.entry(key).or_default().add(record);
    }

    pub fn apply_non_entity(&mut self, bytes: i64) {
        self.non_entity_bytes = self.non_entity_bytes.saturating_add(bytes);
    }

    pub fn bucket(&self, key: &AggregateKey) -> Option<&AggregateBucket> {
        self.buckets.get(key)
    }

    pub fn buckets(&self) -> impl Iterator<Item = (&AggregateKey, &AggregateBucket)> {
        self.buckets.iter()
    }

    pub fn non_entity_bytes(&self) -> i64 {
        self.non_entity_bytes
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}
