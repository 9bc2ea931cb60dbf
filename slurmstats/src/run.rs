use crate::accounts::UserNames;
use crate::aggregate::Aggregates;
use crate::error::Result;
use crate::identity::IdentityAttribute;
use crate::jobs::{aggregate_jobs, ExtractionPolicy};
use crate::membership::MembershipIndex;
use crate::nodes::aggregate_nodes;
use crate::{Group, Snapshot, Timestamp};

use log::{debug, info};

/// One complete aggregation pass: build the membership index, seed the tables, fold in the node
/// capacities and then the jobs, and finally compute the partition percentages.  `now` is the
/// capture instant.

pub fn summarize(
    snapshot: &Snapshot,
    groups: &[Group],
    users: &mut UserNames,
    identity: &mut dyn IdentityAttribute,
    now: Timestamp,
    policy: ExtractionPolicy,
) -> Result<Aggregates> {
    let index = MembershipIndex::build(&snapshot.partitions, groups)?;
    let mut aggs = Aggregates::seeded(
        snapshot.partitions.iter().map(|p| p.name.as_str()),
        groups.iter().map(|g| g.name.as_str()),
    );

    let nodes = aggregate_nodes(&mut aggs, &index, &snapshot.nodes);
    debug!("{nodes} nodes in {} partitions", snapshot.partitions.len());

    let stats = aggregate_jobs(&mut aggs, &index, users, identity, &snapshot.jobs, now, policy)?;
    info!(
        "jobs: {} running, {} pending, {} ignored, {} skipped",
        stats.running, stats.pending, stats.ignored, stats.skipped
    );
    aggs.update_percentages();

    Ok(aggs)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::accounts::{read_group_file, read_passwd_file};
    use crate::aggregate::{Dimension, ALL};
    use crate::identity::{CachedIdentity, Directory, NoIdentity};
    use crate::payload::build_payload;
    use crate::snapshot::{parse_snapshot, read_snapshot};
    use crate::dates::from_unix;

    const MIB: u64 = 1048576;

    struct Faculty;

    impl Directory for Faculty {
        fn lookup(&mut self, user: &str) -> anyhow::Result<String> {
            Ok(match user {
                "carol" => "chemistry",
                _ => "physics",
            }
            .to_string())
        }
    }

    fn fixture_run(identity: &mut dyn IdentityAttribute) -> Aggregates {
        let snapshot = read_snapshot("../slurm_test_data0/snapshot.json").unwrap();
        let groups = read_group_file(
            "../slurm_test_data0/group",
            &["staff".to_string(), "phd".to_string()],
        )
        .unwrap();
        let mut users = UserNames::new(read_passwd_file("../slurm_test_data0/passwd").unwrap());
        summarize(
            &snapshot,
            &groups,
            &mut users,
            identity,
            from_unix(1_700_001_000),
            ExtractionPolicy::Skip,
        )
        .unwrap()
    }

    #[test]
    fn test_fixture_partitions() {
        let aggs = fixture_run(&mut NoIdentity);

        let compute = aggs.get(Dimension::Partition, "compute").unwrap();
        assert_eq!(compute.cpu_total, 16);
        assert_eq!(compute.cpu_usage, 2);
        assert_eq!(compute.cpu_usage_pc, 12.5);
        assert_eq!(compute.mem_total, 32768 * MIB);
        assert_eq!(compute.mem_usage, 4096 * MIB);
        assert_eq!(compute.mem_usage_pc, 12.5);
        assert_eq!(compute.gpu_usage_pc, 0.0);
        assert_eq!(compute.jobs_running, 1);
        assert_eq!(compute.queue_time, 10.0);
        assert_eq!(compute.jobs_pending, 1);
        assert_eq!(compute.jobs_time_pending.get(&103), Some(&500.0));

        let gpu = aggs.get(Dimension::Partition, "gpu").unwrap();
        assert_eq!(gpu.gpu_total, 4);
        assert_eq!(gpu.gpu_usage, 2);
        assert_eq!(gpu.gpu_usage_pc, 50.0);
        assert_eq!(gpu.cpu_usage, 8);
        assert_eq!(gpu.cpu_usage_pc, 25.0);
        assert_eq!(gpu.mem_usage_pc, 25.0);
        assert_eq!(gpu.queue_time, 100.0);
        assert_eq!(gpu.jobs_time_pending.get(&104), Some(&200.0));

        let debug = aggs.get(Dimension::Partition, "debug").unwrap();
        // Only a pending job names debug, so nothing is in use there
        assert_eq!(debug.cpu_total, 40);
        assert_eq!(debug.cpu_usage, 0);
        assert_eq!(debug.cpu_usage_pc, 0.0);
        assert_eq!(debug.jobs_running, 0);
        assert_eq!(debug.jobs_pending, 1);

        // login1 is in no partition but still counts
        let all = aggs.get(Dimension::Partition, ALL).unwrap();
        assert_eq!(all.cpu_total, 8 + 8 + 32 + 4);
        assert_eq!(all.cpu_usage, 2 + 8);
        assert_eq!(all.gpu_usage, 2);
        assert_eq!(all.jobs_running, 2);
        assert_eq!(all.queue_jobs, 2);
        assert_eq!(all.queue_time, (10.0 + 100.0) / 2.0);
        assert_eq!(all.jobs_pending, 2);
        assert_eq!(all.jobs_time_pending.len(), 2);
    }

    #[test]
    fn test_fixture_users_and_groups() {
        let aggs = fixture_run(&mut NoIdentity);

        let alice = aggs.get(Dimension::User, "alice").unwrap();
        assert_eq!(alice.jobs_running, 1);
        assert_eq!(alice.jobs_pending, 1);
        assert_eq!(alice.cpu_usage, 2);
        assert_eq!(alice.mem_usage, 4096 * MIB);
        assert_eq!(alice.queue_time, 10.0);

        let bob = aggs.get(Dimension::User, "bob").unwrap();
        assert_eq!(bob.cpu_usage, 8);
        assert_eq!(bob.mem_usage, 64 * 1024 * MIB);
        assert_eq!(bob.gpu_usage, 2);

        // carol's running job has a malformed allocation and is skipped
        let carol = aggs.get(Dimension::User, "carol").unwrap();
        assert_eq!(carol.jobs_running, 0);
        assert_eq!(carol.jobs_pending, 1);

        // The completed job's owner never shows up
        assert!(aggs.get(Dimension::User, "dave").is_none());
        assert_eq!(aggs.table(Dimension::User).len(), 3);

        let staff = aggs.get(Dimension::Group, "staff").unwrap();
        let phd = aggs.get(Dimension::Group, "phd").unwrap();
        assert_eq!(staff.jobs_running, 1);
        assert_eq!(staff.jobs_pending, 2);
        assert_eq!(phd.jobs_pending, 1);
        // alice is in both, so both get her usage
        assert_eq!(staff.cpu_usage, alice.cpu_usage);
        assert_eq!(phd.cpu_usage, alice.cpu_usage);
        assert_eq!(phd.mem_usage, alice.mem_usage);
        assert_eq!(
            staff.jobs_time_pending.keys().copied().collect::<Vec<u32>>(),
            vec![103, 104]
        );

        assert!(aggs.table(Dimension::Identity).is_empty());
    }

    #[test]
    fn test_fixture_identity_and_payload() {
        let mut identity = CachedIdentity::new(Faculty);
        let aggs = fixture_run(&mut identity);
        assert_eq!(identity.lookups(), 3);

        let physics = aggs.get(Dimension::Identity, "physics").unwrap();
        assert_eq!(physics.jobs_running, 2);
        assert_eq!(physics.cpu_usage, 10);
        assert_eq!(physics.queue_time, 55.0);
        assert_eq!(physics.jobs_pending, 1);
        let chemistry = aggs.get(Dimension::Identity, "chemistry").unwrap();
        assert_eq!(chemistry.jobs_pending, 1);
        assert_eq!(chemistry.jobs_running, 0);

        let payload = build_payload(&aggs, from_unix(1_700_001_000));
        // 4 partitions x 12, 3 users x 6, 2 groups x 6, 2 attributes x 6
        assert_eq!(payload.scalars.len(), 48 + 18 + 12 + 12);
        // ALL 2, compute 1, debug 1, gpu 1; staff 2, phd 1
        assert_eq!(payload.pending.len(), 8);
        assert_eq!(payload.scalar("ldap_attrib_cpu_usage", "physics"), Some(10.0));
        assert_eq!(payload.scalar("partition_cpu_usage_pc", "compute"), Some(12.5));
    }

    #[test]
    fn test_single_running_job() {
        let snapshot = parse_snapshot(
            r#"{
              "nodes": [ { "name": "n1", "cpus": 8, "alloc_cpus": 4, "real_memory": 16, "alloc_mem": 8 } ],
              "partitions": [ { "name": "compute", "nodes": "n1" } ],
              "jobs": [ { "job_id": 1, "user_id": 1001, "user_name": "alice", "partition": "compute",
                          "job_state": "RUNNING", "submit_time": 0, "start_time": 10,
                          "tres_alloc_str": "cpu=2,mem=4.0M" } ]
            }"#,
        )
        .unwrap();
        let aggs = summarize(
            &snapshot,
            &[],
            &mut UserNames::default(),
            &mut NoIdentity,
            from_unix(100),
            ExtractionPolicy::Abort,
        )
        .unwrap();
        let payload = build_payload(&aggs, from_unix(100));

        assert_eq!(payload.scalar("partition_cpu_total", "compute"), Some(8.0));
        // Usage is what the job holds, not the node's alloc_cpus
        assert_eq!(payload.scalar("partition_cpu_usage", "compute"), Some(2.0));
        assert_eq!(payload.scalar("partition_cpu_usage_pc", "compute"), Some(25.0));
        assert_eq!(payload.scalar("partition_mem_total", "compute"), Some(16.0 * MIB as f64));
        assert_eq!(payload.scalar("partition_mem_usage", "compute"), Some(4.0 * MIB as f64));
        assert_eq!(payload.scalar("partition_mem_usage_pc", "compute"), Some(25.0));
        assert_eq!(payload.scalar("partition_cpu_usage", ALL), Some(2.0));
        assert_eq!(payload.scalar("partition_cpu_usage_pc", ALL), Some(25.0));
        assert_eq!(payload.scalar("partition_jobs_running", "compute"), Some(1.0));
        assert_eq!(payload.scalar("user_cpu_usage", "alice"), Some(2.0));
        assert_eq!(payload.scalar("user_mem_usage", "alice"), Some(4.0 * MIB as f64));
        assert_eq!(payload.scalar("user_queue_time", "alice"), Some(10.0));
        assert!(payload.pending.is_empty());
    }

    #[test]
    fn test_single_pending_job_without_groups() {
        let snapshot = parse_snapshot(
            r#"{
              "partitions": [ { "name": "compute", "nodes": "" } ],
              "jobs": [ { "job_id": 9, "user_id": 1002, "user_name": "bob", "partition": "compute",
                          "job_state": "PENDING", "submit_time": 40 } ]
            }"#,
        )
        .unwrap();
        let groups = vec![Group {
            name: "staff".to_string(),
            members: vec!["alice".to_string()],
        }];
        let aggs = summarize(
            &snapshot,
            &groups,
            &mut UserNames::default(),
            &mut NoIdentity,
            from_unix(100),
            ExtractionPolicy::Skip,
        )
        .unwrap();

        assert_eq!(aggs.get(Dimension::User, "bob").unwrap().jobs_pending, 1);
        assert_eq!(
            aggs.get(Dimension::Group, "staff").unwrap(),
            &crate::aggregate::Bucket::default()
        );
        let compute = aggs.get(Dimension::Partition, "compute").unwrap();
        assert_eq!(compute.jobs_time_pending.get(&9), Some(&60.0));
        assert_eq!(compute.cpu_usage_pc, 0.0);
    }
}
