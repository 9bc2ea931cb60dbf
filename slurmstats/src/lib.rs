// This library folds one snapshot of a Slurm cluster (nodes, partitions, jobs, and group
// membership) into per-partition, per-user, per-group and per-identity-attribute summary metrics,
// and flattens those into time-series points.
//
// A run is a pure transform: everything is built fresh from the snapshot, nothing survives it.
// Fetching the snapshot and delivering the points are the caller's business.

mod accounts;
mod aggregate;
mod dates;
mod error;
mod identity;
mod jobs;
mod membership;
mod nodes;
mod pattern;
mod payload;
mod run;
mod snapshot;
mod tres;

use serde::Deserialize;

pub use accounts::{read_group_file, read_passwd_file, UserNames};
pub use aggregate::{Aggregates, Bucket, Dimension, Metric, ALL};
pub use dates::{capture_instant, from_unix};
pub use error::{Error, ParseError, Result};
pub use identity::{CachedIdentity, Directory, IdentityAttribute, NoIdentity};
pub use jobs::{aggregate_jobs, classify, extract_usage, target_partitions, ExtractionPolicy, JobClass, JobStats};
pub use membership::MembershipIndex;
pub use nodes::{aggregate_nodes, reported_allocation, NodeCapacity};
pub use pattern::expand_hostlist;
pub use payload::{build_payload, Payload, Point};
pub use run::summarize;
pub use snapshot::{parse_snapshot, read_snapshot};
pub use tres::{job_gpus, node_gpus, parse_tres_alloc, JobUsage};

pub type Timestamp = chrono::DateTime<chrono::Utc>;

pub fn now() -> Timestamp {
    chrono::Utc::now()
}

/// A compute node as reported by the scheduler.  Immutable for the duration of a run.

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NodeRecord {
    /// Short node name, as it appears in partition hostlists.
    pub name: String,

    /// Configured cores.
    pub cpus: u64,

    /// Cores allocated to jobs.
    #[serde(default)]
    pub alloc_cpus: u64,

    /// Configured memory in MiB.
    #[serde(default)]
    pub real_memory: u64,

    /// Memory allocated to jobs in MiB.
    #[serde(default)]
    pub alloc_mem: u64,

    /// Generic resource capacity descriptors, eg "gpu:a100:4(S:0-1)".
    #[serde(default)]
    pub gres: Vec<String>,

    /// Generic resource usage descriptors, eg "gpu:a100:2(IDX:0-1)".
    #[serde(default)]
    pub gres_used: Vec<String>,
}

/// A partition and its member nodes, still in compressed hostlist form.

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PartitionRecord {
    pub name: String,
    #[serde(default)]
    pub nodes: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct JobRecord {
    pub job_id: u32,

    /// Numeric uid of the owner.
    pub user_id: u32,

    /// Owner's login name, if the snapshot carries it; otherwise it is looked up from `user_id`.
    #[serde(default)]
    pub user_name: Option<String>,

    /// One partition name, or a comma-joined list of them.
    pub partition: String,

    /// RUNNING and PENDING are interesting, anything else is ignored.
    pub job_state: String,

    /// Seconds since the epoch.
    pub submit_time: i64,

    /// Seconds since the epoch, meaningful only for running jobs.
    #[serde(default)]
    pub start_time: i64,

    /// Allocated trackable resources, eg "cpu=4,mem=16G,node=1,billing=4".
    #[serde(default)]
    pub tres_alloc_str: String,

    /// Per-node generic resource request, eg "gres:gpu:2".
    #[serde(default)]
    pub tres_per_node: Option<String>,

    #[serde(default = "one")]
    pub num_nodes: u32,
}

fn one() -> u32 {
    1
}

/// A system group and the login names of its members.

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Group {
    pub name: String,
    pub members: Vec<String>,
}

/// Everything the scheduler tells us in one run.

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub nodes: Vec<NodeRecord>,
    #[serde(default)]
    pub partitions: Vec<PartitionRecord>,
    #[serde(default)]
    pub jobs: Vec<JobRecord>,
}
