/// Flatten the aggregation tables into time-series points.
///
/// Scalars: for each dimension, for each metric it reports, one point per dimension value, named
/// `<dimension>_<metric>`, tagged `<dimension>=<value>`, with the single field `<metric>`.
///
/// Pending times: for partitions and groups, one point per (dimension value, job id), named
/// `<dimension>_jobs_time_pending`, tagged with both.  These go to a separate, shorter-lived
/// series set, hence the separate batch.
///
/// Everything is stamped with the capture instant.

use crate::aggregate::{Aggregates, Dimension};
use crate::Timestamp;

use std::collections::BTreeMap;

const TIME_PENDING: &str = "jobs_time_pending";

#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    pub measurement: String,
    pub timestamp: Timestamp,
    pub tags: BTreeMap<String, String>,
    pub fields: BTreeMap<String, f64>,
}

impl Point {
    fn new(dim: Dimension, key: &str, reading: &str, value: f64, timestamp: Timestamp) -> Point {
        let mut tags = BTreeMap::new();
        tags.insert(dim.name().to_string(), key.to_string());
        let mut fields = BTreeMap::new();
        fields.insert(reading.to_string(), value);
        Point {
            measurement: format!("{}_{}", dim.name(), reading),
            timestamp,
            tags,
            fields,
        }
    }

    pub fn tag(&self, name: &str) -> Option<&str> {
        self.tags.get(name).map(|s| s.as_str())
    }

    pub fn field(&self, name: &str) -> Option<f64> {
        self.fields.get(name).copied()
    }
}

#[derive(Debug, Default)]
pub struct Payload {
    pub scalars: Vec<Point>,
    pub pending: Vec<Point>,
}

impl Payload {
    /// The scalar point for a dimension value and metric, if there is one.
    pub fn scalar(&self, measurement: &str, key: &str) -> Option<f64> {
        self.scalars
            .iter()
            .find(|p| p.measurement == measurement && p.tags.values().any(|v| v == key))
            .and_then(|p| p.fields.values().next().copied())
    }
}

pub fn build_payload(aggs: &Aggregates, captured: Timestamp) -> Payload {
    let mut payload = Payload::default();
    for dim in Dimension::ALL {
        let table = aggs.table(dim);
        for metric in dim.metrics() {
            for (key, bucket) in table {
                payload
                    .scalars
                    .push(Point::new(dim, key, metric.name(), metric.value(bucket), captured));
            }
        }
    }
    for dim in Dimension::ALL.into_iter().filter(|d| d.tracks_pending_times()) {
        for (key, bucket) in aggs.table(dim) {
            for (job_id, seconds) in &bucket.jobs_time_pending {
                let mut p = Point::new(dim, key, TIME_PENDING, *seconds, captured);
                p.tags.insert("job_id".to_string(), job_id.to_string());
                payload.pending.push(p);
            }
        }
    }
    payload
}
