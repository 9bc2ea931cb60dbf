// Reading a scheduler snapshot.
//
// The snapshot is a JSON object with three arrays, each optional:
//
//   nodes       - objects with name, cpus, alloc_cpus, real_memory, alloc_mem (MiB), gres and
//                 gres_used (arrays of descriptor strings)
//   partitions  - objects with name and nodes (a hostlist string)
//   jobs        - objects with job_id, user_id, user_name (optional), partition, job_state,
//                 submit_time and start_time (epoch seconds), tres_alloc_str, tres_per_node
//                 (optional), num_nodes
//
// See ../slurm_test_data0/snapshot.json for an example.  Fields not listed are ignored, so the
// snapshot can be a lightly filtered dump from the scheduler's own JSON output.

use crate::error::{Error, Result};
use crate::Snapshot;

use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path;

/// Read a snapshot from a file, or from stdin if `filename` is "-".

pub fn read_snapshot(filename: &str) -> Result<Snapshot> {
    let parsed = if filename == "-" {
        let mut text = String::new();
        io::stdin()
            .read_to_string(&mut text)
            .map_err(|e| source_error(filename, e))?;
        serde_json::from_str(&text)
    } else {
        let file = File::open(path::Path::new(filename)).map_err(|e| source_error(filename, e))?;
        serde_json::from_reader(BufReader::new(file))
    };
    parsed.map_err(|e| source_error(filename, e))
}

fn source_error(filename: &str, e: impl std::fmt::Display) -> Error {
    Error::DataSource(format!("{filename}: {e}"))
}

pub fn parse_snapshot(text: &str) -> Result<Snapshot> {
    serde_json::from_str(text).map_err(|e| Error::DataSource(e.to_string()))
}

#[test]
fn test_read_snapshot() {
    let s = read_snapshot("../slurm_test_data0/snapshot.json").unwrap();
    assert_eq!(s.nodes.len(), 4);
    assert_eq!(s.partitions.len(), 3);
    assert_eq!(s.jobs.len(), 6);
    assert_eq!(s.nodes[2].gres, vec!["gpu:a100:4(S:0-1)".to_string()]);
    assert_eq!(s.jobs[0].user_name, None);
    assert_eq!(s.jobs[0].num_nodes, 1);
}

#[test]
fn test_bad_snapshot() {
    assert!(matches!(parse_snapshot("{\"nodes\": 3}"), Err(Error::DataSource(_))));
    assert!(matches!(
        read_snapshot("../slurm_test_data0/no-such-file"),
        Err(Error::DataSource(_))
    ));
    let s = parse_snapshot("{}").unwrap();
    assert!(s.nodes.is_empty() && s.jobs.is_empty());
}
