/// The run-scoped aggregation tables: one table per dimension, mapping a dimension value (a
/// partition name, a user, a group, an identity attribute) to a bucket of accumulated metrics.

use crate::nodes::NodeCapacity;
use crate::tres::JobUsage;

use std::collections::BTreeMap;

/// The synthetic partition that contains every node and every job.

pub const ALL: &str = "ALL";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Dimension {
    Partition,
    User,
    Group,
    Identity,
}

impl Dimension {
    /// All dimensions, in reporting order.
    pub const ALL: [Dimension; 4] = [
        Dimension::Partition,
        Dimension::User,
        Dimension::Group,
        Dimension::Identity,
    ];

    /// The name used as tag key and measurement prefix.
    pub fn name(self) -> &'static str {
        match self {
            Dimension::Partition => "partition",
            Dimension::User => "user",
            Dimension::Group => "group",
            Dimension::Identity => "ldap_attrib",
        }
    }

    /// The scalar metrics reported for this dimension.  Capacity and percentage metrics only make
    /// sense for partitions.
    pub fn metrics(self) -> &'static [Metric] {
        use Metric::*;
        match self {
            Dimension::Partition => &[
                CpuTotal, CpuUsage, CpuUsagePc, GpuTotal, GpuUsage, GpuUsagePc, MemTotal,
                MemUsage, MemUsagePc, JobsRunning, JobsPending, QueueTime,
            ],
            _ => &[CpuUsage, GpuUsage, MemUsage, JobsRunning, JobsPending, QueueTime],
        }
    }

    /// Whether per-job pending times are tracked for this dimension.
    pub fn tracks_pending_times(self) -> bool {
        matches!(self, Dimension::Partition | Dimension::Group)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Metric {
    CpuTotal,
    CpuUsage,
    CpuUsagePc,
    GpuTotal,
    GpuUsage,
    GpuUsagePc,
    MemTotal,
    MemUsage,
    MemUsagePc,
    JobsRunning,
    JobsPending,
    QueueTime,
    QueueJobs,
}

impl Metric {
    pub fn name(self) -> &'static str {
        match self {
            Metric::CpuTotal => "cpu_total",
            Metric::CpuUsage => "cpu_usage",
            Metric::CpuUsagePc => "cpu_usage_pc",
            Metric::GpuTotal => "gpu_total",
            Metric::GpuUsage => "gpu_usage",
            Metric::GpuUsagePc => "gpu_usage_pc",
            Metric::MemTotal => "mem_total",
            Metric::MemUsage => "mem_usage",
            Metric::MemUsagePc => "mem_usage_pc",
            Metric::JobsRunning => "jobs_running",
            Metric::JobsPending => "jobs_pending",
            Metric::QueueTime => "queue_time",
            Metric::QueueJobs => "queue_jobs",
        }
    }

    pub fn value(self, b: &Bucket) -> f64 {
        match self {
            Metric::CpuTotal => b.cpu_total as f64,
            Metric::CpuUsage => b.cpu_usage as f64,
            Metric::CpuUsagePc => b.cpu_usage_pc,
            Metric::GpuTotal => b.gpu_total as f64,
            Metric::GpuUsage => b.gpu_usage as f64,
            Metric::GpuUsagePc => b.gpu_usage_pc,
            Metric::MemTotal => b.mem_total as f64,
            Metric::MemUsage => b.mem_usage as f64,
            Metric::MemUsagePc => b.mem_usage_pc,
            Metric::JobsRunning => b.jobs_running as f64,
            Metric::JobsPending => b.jobs_pending as f64,
            Metric::QueueTime => b.queue_time,
            Metric::QueueJobs => b.queue_jobs as f64,
        }
    }
}

/// Accumulated metrics for one dimension value.  Memory is in bytes.  A percentage stays at zero
/// while its denominator is zero.

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Bucket {
    pub cpu_total: u64,
    pub cpu_usage: u64,
    pub cpu_usage_pc: f64,
    pub gpu_total: u64,
    pub gpu_usage: u64,
    pub gpu_usage_pc: f64,
    pub mem_total: u64,
    pub mem_usage: u64,
    pub mem_usage_pc: f64,
    pub jobs_running: u64,
    pub jobs_pending: u64,
    pub queue_time: f64,
    pub queue_jobs: u64,

    /// Job id to seconds pending so far.
    pub jobs_time_pending: BTreeMap<u32, f64>,
}

impl Bucket {
    /// Add a node's capacity.
    pub fn add_capacity(&mut self, node: &NodeCapacity) {
        self.cpu_total += node.cpu_total;
        self.mem_total += node.mem_total;
        self.gpu_total += node.gpu_total;
    }

    /// Recompute the percentages from the current sums.  A percentage whose total is zero is left
    /// alone.
    pub fn update_percentages(&mut self) {
        if let Some(pc) = percent(self.cpu_usage, self.cpu_total) {
            self.cpu_usage_pc = pc;
        }
        if let Some(pc) = percent(self.mem_usage, self.mem_total) {
            self.mem_usage_pc = pc;
        }
        if let Some(pc) = percent(self.gpu_usage, self.gpu_total) {
            self.gpu_usage_pc = pc;
        }
    }

    /// Count a running job and its queue wait.
    pub fn add_running(&mut self, queue_wait: f64) {
        self.jobs_running += 1;
        self.record_queue_wait(queue_wait);
    }

    /// Add the resources held by a running job.
    pub fn add_usage(&mut self, usage: &JobUsage) {
        self.cpu_usage += usage.cpus;
        self.mem_usage += usage.mem_bytes;
        self.gpu_usage += usage.gpus;
    }

    /// Count a pending job.
    pub fn add_pending(&mut self) {
        self.jobs_pending += 1;
    }

    pub fn record_time_pending(&mut self, job_id: u32, seconds: f64) {
        self.jobs_time_pending.insert(job_id, seconds);
    }

    /// Fold a queue wait into `queue_time` as (previous value + wait) / new job count.
    ///
    /// This is not an arithmetic mean: earlier samples are divided down again with every new job.
    pub fn record_queue_wait(&mut self, wait: f64) {
        self.queue_jobs += 1;
        self.queue_time = (self.queue_time + wait) / self.queue_jobs as f64;
    }
}

fn percent(usage: u64, total: u64) -> Option<f64> {
    if total > 0 {
        Some(100.0 * (usage as f64 / total as f64))
    } else {
        None
    }
}

/// The aggregation context for one run.

#[derive(Debug, Default)]
pub struct Aggregates {
    partition: BTreeMap<String, Bucket>,
    user: BTreeMap<String, Bucket>,
    group: BTreeMap<String, Bucket>,
    identity: BTreeMap<String, Bucket>,
}

impl Aggregates {
    /// Create the context with zeroed buckets for `ALL`, every named partition, and every named
    /// group, so that these are reported even when nothing touches them.
    pub fn seeded<'a, P, G>(partitions: P, groups: G) -> Aggregates
    where
        P: IntoIterator<Item = &'a str>,
        G: IntoIterator<Item = &'a str>,
    {
        let mut aggs = Aggregates::default();
        aggs.bucket(Dimension::Partition, ALL);
        for p in partitions {
            aggs.bucket(Dimension::Partition, p);
        }
        for g in groups {
            aggs.bucket(Dimension::Group, g);
        }
        aggs
    }

    /// Get the bucket for `key`, creating a zeroed one the first time the key is seen.  An
    /// existing bucket is never reset.
    pub fn bucket(&mut self, dim: Dimension, key: &str) -> &mut Bucket {
        self.table_mut(dim).entry(key.to_string()).or_default()
    }

    /// Compute the partition percentages, once capacity and usage are both in.
    pub fn update_percentages(&mut self) {
        for b in self.partition.values_mut() {
            b.update_percentages();
        }
    }

    pub fn get(&self, dim: Dimension, key: &str) -> Option<&Bucket> {
        self.table(dim).get(key)
    }

    /// The table for a dimension, ordered by dimension value.
    pub fn table(&self, dim: Dimension) -> &BTreeMap<String, Bucket> {
        match dim {
            Dimension::Partition => &self.partition,
            Dimension::User => &self.user,
            Dimension::Group => &self.group,
            Dimension::Identity => &self.identity,
        }
    }

    fn table_mut(&mut self, dim: Dimension) -> &mut BTreeMap<String, Bucket> {
        match dim {
            Dimension::Partition => &mut self.partition,
            Dimension::User => &mut self.user,
            Dimension::Group => &mut self.group,
            Dimension::Identity => &mut self.identity,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_queue_time_recurrence() {
        let mut b = Bucket {
            queue_time: 30.0,
            queue_jobs: 2,
            ..Default::default()
        };
        b.record_queue_wait(60.0);
        assert_eq!(b.queue_jobs, 3);
        assert_eq!(b.queue_time, (30.0 + 60.0) / 3.0);

        // Waits of 10, 20, 30: a true mean would be 20.
        let mut b = Bucket::default();
        b.record_queue_wait(10.0);
        assert_eq!(b.queue_time, 10.0);
        b.record_queue_wait(20.0);
        assert_eq!(b.queue_time, 15.0);
        b.record_queue_wait(30.0);
        assert_eq!(b.queue_time, 15.0);
        assert_eq!(b.queue_jobs, 3);
    }

    #[test]
    fn test_percentages() {
        let mut b = Bucket::default();
        b.add_capacity(&NodeCapacity {
            cpu_total: 8,
            mem_total: 1000,
            gpu_total: 0,
        });
        b.add_usage(&JobUsage {
            cpus: 2,
            mem_bytes: 250,
            gpus: 0,
        });
        b.update_percentages();
        assert_eq!(b.cpu_usage_pc, 25.0);
        assert_eq!(b.mem_usage_pc, 25.0);
        assert_eq!(b.gpu_usage_pc, 0.0);

        b.add_capacity(&NodeCapacity {
            cpu_total: 8,
            mem_total: 1000,
            gpu_total: 4,
        });
        b.add_usage(&JobUsage {
            cpus: 8,
            mem_bytes: 750,
            gpus: 1,
        });
        b.update_percentages();
        assert_eq!(b.cpu_usage_pc, 100.0 * 10.0 / 16.0);
        assert_eq!(b.mem_usage_pc, 50.0);
        assert_eq!(b.gpu_usage_pc, 25.0);
    }

    #[test]
    fn test_zero_capacity_has_no_percentage() {
        let mut b = Bucket::default();
        b.add_capacity(&NodeCapacity::default());
        b.add_usage(&JobUsage {
            cpus: 1,
            mem_bytes: 1,
            gpus: 1,
        });
        b.update_percentages();
        assert_eq!(b.cpu_usage_pc, 0.0);
        assert_eq!(b.mem_usage_pc, 0.0);
        assert_eq!(b.gpu_usage_pc, 0.0);
    }

    #[test]
    fn test_only_partitions_get_percentages() {
        let mut aggs = Aggregates::seeded(["compute"], Vec::<&str>::new());
        let usage = JobUsage {
            cpus: 2,
            mem_bytes: 0,
            gpus: 0,
        };
        aggs.bucket(Dimension::Partition, "compute").add_capacity(&NodeCapacity {
            cpu_total: 8,
            ..Default::default()
        });
        aggs.bucket(Dimension::Partition, "compute").add_usage(&usage);
        aggs.bucket(Dimension::User, "alice").add_usage(&usage);
        aggs.update_percentages();
        assert_eq!(aggs.get(Dimension::Partition, "compute").unwrap().cpu_usage_pc, 25.0);
        assert_eq!(aggs.get(Dimension::User, "alice").unwrap().cpu_usage_pc, 0.0);
    }

    #[test]
    fn test_bucket_is_not_reset() {
        let mut aggs = Aggregates::seeded(["compute"], ["staff"]);
        aggs.bucket(Dimension::User, "alice").add_pending();
        aggs.bucket(Dimension::User, "alice").add_pending();
        assert_eq!(aggs.get(Dimension::User, "alice").unwrap().jobs_pending, 2);
        assert!(aggs.get(Dimension::Partition, ALL).is_some());
        assert!(aggs.get(Dimension::Partition, "compute").is_some());
        assert!(aggs.get(Dimension::Group, "staff").is_some());
        assert!(aggs.get(Dimension::Group, "compute").is_none());
        assert!(aggs.table(Dimension::Identity).is_empty());
    }
}
