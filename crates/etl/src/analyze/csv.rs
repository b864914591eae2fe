//! CSV rendering of an [`AggregateStore`], one row per bucket.

use std::fmt::Write;

use crate::aggregate::AggregateStore;

pub const CSV_HEADER: &str =
    "date_hour,entity_kind,entity_id,http_status,unique_users,total_views,total_cs_bytes,total_sc_bytes,total_file_size";

/// Quote a field when it holds a separator, quote or line break.
fn field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Header plus rows sorted by (date-hour, kind, id, status).
pub fn render_csv(store: &AggregateStore) -> String {
    let mut buckets: Vec<_> = store.buckets().collect();
    buckets.sort_by(|a, b| a.0.cmp(b.0));

    let mut out = String::with_capacity(CSV_HEADER.len() + 1 + buckets.len() * 64);
    out.push_str(CSV_HEADER);
    out.push('\n');
    for (key, bucket) in buckets {
        let _ = writeln!(
            out,
            "{},{},{},{},{},{},{},{},{}",
            field(&key.date_hour),
            key.kind,
            field(&key.entity_id),
            field(&key.status),
            bucket.unique_client_ips.len(),
            bucket.count,
            bucket.total_bytes_from_origin,
            bucket.total_bytes_to_client,
            bucket.total_file_size
        );
    }
    out
}
