/// Classify jobs and fold them into the partition, user, group and identity-attribute tables.
///
/// A running job adds one to `jobs_running` and folds its queue wait into `queue_time`, in: its
/// user; `ALL` and each partition it was submitted to; each group its user is in; its user's
/// identity attribute, if that dimension is enabled.  Its cpu/mem/gpu are added to the usage of
/// all of those.  Partition capacity comes from the nodes (see nodes.rs).
///
/// A pending job adds one to `jobs_pending` in the same buckets, and for partitions and groups
/// also records how long it has been waiting, by job id.
///
/// Jobs in any other state are not looked at.

use crate::accounts::UserNames;
use crate::aggregate::{Aggregates, Bucket, Dimension, ALL};
use crate::dates::{from_unix, seconds_between};
use crate::error::{Error, ParseError, Result};
use crate::identity::IdentityAttribute;
use crate::membership::MembershipIndex;
use crate::tres::{job_gpus, parse_tres_alloc, JobUsage};
use crate::{JobRecord, Timestamp};

use log::warn;
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobClass {
    Running,
    Pending,
}

/// What to do with a running job whose allocation descriptor cannot be parsed.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExtractionPolicy {
    /// Leave the job out of every bucket and log it.
    #[default]
    Skip,
    /// Fail the run.
    Abort,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct JobStats {
    pub running: usize,
    pub pending: usize,
    pub ignored: usize,
    pub skipped: usize,
}

/// The state must match exactly.

pub fn classify(job_state: &str) -> Option<JobClass> {
    match job_state {
        "RUNNING" => Some(JobClass::Running),
        "PENDING" => Some(JobClass::Pending),
        _ => None,
    }
}

/// The distinct partitions named in a job's partition field, not counting `ALL`, which every job
/// goes into anyway.

pub fn target_partitions(partition: &str) -> BTreeSet<&str> {
    partition
        .split(',')
        .map(|p| p.trim())
        .filter(|p| !p.is_empty() && *p != ALL)
        .collect()
}

/// The resources held by a running job.

pub fn extract_usage(job: &JobRecord) -> std::result::Result<JobUsage, ParseError> {
    let (cpus, mem_bytes) = parse_tres_alloc(job.job_id, &job.tres_alloc_str)?;
    Ok(JobUsage {
        cpus,
        mem_bytes,
        gpus: job_gpus(job.tres_per_node.as_deref(), job.num_nodes),
    })
}

// The buckets a job is counted in, except the user's own, which is separate because it is
// always there.

struct Targets<'a> {
    partitions: BTreeSet<&'a str>,
    groups: &'a BTreeSet<String>,
    identity: Option<String>,
}

impl<'a> Targets<'a> {
    fn for_each(&self, aggs: &mut Aggregates, mut f: impl FnMut(Dimension, &mut Bucket)) {
        f(Dimension::Partition, aggs.bucket(Dimension::Partition, ALL));
        for p in &self.partitions {
            f(Dimension::Partition, aggs.bucket(Dimension::Partition, p));
        }
        for g in self.groups {
            f(Dimension::Group, aggs.bucket(Dimension::Group, g));
        }
        if let Some(ref attr) = self.identity {
            f(Dimension::Identity, aggs.bucket(Dimension::Identity, attr));
        }
    }
}

/// Fold all jobs into `aggs`.  `now` is the capture instant, used for pending times.
///
/// Fails on a directory lookup failure, and on an unparseable allocation if `policy` says so.

pub fn aggregate_jobs(
    aggs: &mut Aggregates,
    index: &MembershipIndex,
    users: &mut UserNames,
    identity: &mut dyn IdentityAttribute,
    jobs: &[JobRecord],
    now: Timestamp,
    policy: ExtractionPolicy,
) -> Result<JobStats> {
    let mut stats = JobStats::default();
    for job in jobs {
        let Some(class) = classify(&job.job_state) else {
            stats.ignored += 1;
            continue;
        };

        // Extract before touching any bucket, so a skipped job leaves no trace.
        let usage = if class == JobClass::Running {
            match extract_usage(job) {
                Ok(usage) => Some(usage),
                Err(e) => match policy {
                    ExtractionPolicy::Abort => return Err(Error::Extraction(e)),
                    ExtractionPolicy::Skip => {
                        warn!("skipping job: {e}");
                        stats.skipped += 1;
                        continue;
                    }
                },
            }
        } else {
            None
        };

        let user = users.name_of(job);
        let targets = Targets {
            partitions: target_partitions(&job.partition),
            groups: index.groups_of(&user),
            identity: identity.resolve(&user)?,
        };

        match usage {
            Some(usage) => {
                let queue_wait = (job.start_time - job.submit_time) as f64;
                let b = aggs.bucket(Dimension::User, &user);
                b.add_running(queue_wait);
                b.add_usage(&usage);
                targets.for_each(aggs, |_, b| {
                    b.add_running(queue_wait);
                    b.add_usage(&usage);
                });
                stats.running += 1;
            }
            None => {
                let pending_for = seconds_between(now, from_unix(job.submit_time));
                aggs.bucket(Dimension::User, &user).add_pending();
                targets.for_each(aggs, |dim, b| {
                    b.add_pending();
                    if dim.tracks_pending_times() {
                        b.record_time_pending(job.job_id, pending_for);
                    }
                });
                stats.pending += 1;
            }
        }
    }
    Ok(stats)
}
