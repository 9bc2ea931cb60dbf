// Parsers for the scheduler's resource descriptors.
//
// Generic resources (GRES) on a node look like "gpu:a100:4(S:0-1),shard:8" for capacity and
// "gpu:a100:2(IDX:0-1),shard:0" for usage: a comma-separated list of name[:type]:count tokens,
// each optionally followed by a parenthesized annotation that may itself contain commas.
//
// A job's trackable resource allocation looks like "cpu=4,mem=16G,node=1,billing=4"; only the
// leading cpu and mem items are used.

use crate::error::ParseError;

use std::str::FromStr;

const MIB: f64 = 1048576.0;

/// CPU, memory and GPU held by one running job.

#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct JobUsage {
    pub cpus: u64,
    pub mem_bytes: u64,
    pub gpus: u64,
}

/// Total GPU count in a set of GRES descriptors, zero if there are no gpu tokens.

pub fn node_gpus(descriptors: &[String]) -> u64 {
    descriptors
        .iter()
        .flat_map(|d| split_gres(d))
        .filter_map(gpu_count)
        .sum()
}

/// GPUs requested by a job: the per-node gpu count times the node count, zero if absent.

pub fn job_gpus(tres_per_node: Option<&str>, num_nodes: u32) -> u64 {
    let Some(tres) = tres_per_node else {
        return 0;
    };
    for item in tres.split(',') {
        let item = item
            .strip_prefix("gres/")
            .or_else(|| item.strip_prefix("gres:"))
            .unwrap_or(item);
        if let Some(n) = gpu_count(item) {
            return n * num_nodes as u64;
        }
    }
    0
}

/// Parse the leading "cpu=<int>,mem=<float><M|G>" of an allocation descriptor into a core count
/// and a byte count.  The memory amount is scaled to MiB first (x1024 for G) and then to bytes,
/// and truncated.

pub fn parse_tres_alloc(job_id: u32, descriptor: &str) -> Result<(u64, u64), ParseError> {
    let fail = || ParseError::TresAlloc {
        job_id,
        descriptor: descriptor.to_string(),
    };

    let rest = descriptor.strip_prefix("cpu=").ok_or_else(fail)?;
    let (digits, rest) = split_while(rest, |c| c.is_ascii_digit());
    let cpus = u64::from_str(digits).map_err(|_| fail())?;

    let rest = rest.strip_prefix(",mem=").ok_or_else(fail)?;
    let (amount, rest) = split_while(rest, |c| c.is_ascii_digit() || c == '.');
    let mut mem = f64::from_str(amount).map_err(|_| fail())?;
    let rest = if let Some(r) = rest.strip_prefix('G') {
        mem *= 1024.0;
        r
    } else {
        rest.strip_prefix('M').ok_or_else(fail)?
    };
    if !(rest.is_empty() || rest.starts_with(',')) {
        return Err(fail());
    }
    mem *= MIB;

    Ok((cpus, mem as u64))
}

// The count of a "gpu[:type]:count[(annotation)]" token, None for anything else.

fn gpu_count(token: &str) -> Option<u64> {
    let rest = token.trim().strip_prefix("gpu:")?;
    let rest = match rest.find('(') {
        Some(ix) => &rest[..ix],
        None => rest,
    };
    let parts = rest.split(':').collect::<Vec<&str>>();
    if parts.len() > 2 {
        return None;
    }
    let count = parts[parts.len() - 1];
    if count.is_empty() || !count.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    u64::from_str(count).ok()
}

// Split a GRES list at commas that are not inside parentheses.

fn split_gres(s: &str) -> Vec<&str> {
    let mut tokens = vec![];
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in s.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                tokens.push(&s[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    tokens.push(&s[start..]);
    tokens
}

fn split_while(s: &str, pred: impl Fn(char) -> bool) -> (&str, &str) {
    let ix = s.find(|c: char| !pred(c)).unwrap_or(s.len());
    s.split_at(ix)
}

#[cfg(test)]
mod test {
    use super::*;

    fn v(xs: &[&str]) -> Vec<String> {
        xs.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_node_gpus() {
        assert_eq!(node_gpus(&v(&["gpu:4"])), 4);
        assert_eq!(node_gpus(&v(&["gpu:4(S:0-1)"])), 4);
        assert_eq!(node_gpus(&v(&["gpu:a100:4(S:0-1),shard:8"])), 4);
        assert_eq!(node_gpus(&v(&["gpu:a100:2(IDX:0,2),shard:0"])), 2);
        assert_eq!(node_gpus(&v(&["gpu:a100:2,gpu:v100:1"])), 3);
        assert_eq!(node_gpus(&v(&["(null)"])), 0);
        assert_eq!(node_gpus(&v(&["shard:8", "mps:100"])), 0);
        assert_eq!(node_gpus(&v(&["gpu:a100:x:1", "gpu:", "gpu:a100"])), 0);
        assert_eq!(node_gpus(&[]), 0);
    }

    #[test]
    fn test_job_gpus() {
        assert_eq!(job_gpus(None, 4), 0);
        assert_eq!(job_gpus(Some(""), 4), 0);
        assert_eq!(job_gpus(Some("gpu:2"), 3), 6);
        assert_eq!(job_gpus(Some("gres:gpu:2"), 1), 2);
        assert_eq!(job_gpus(Some("gres/gpu:a100:1"), 2), 2);
        assert_eq!(job_gpus(Some("gres/shard:2,gres/gpu:1"), 2), 2);
        assert_eq!(job_gpus(Some("gres:mps:50"), 1), 0);
    }

    #[test]
    fn test_tres_alloc() {
        assert_eq!(parse_tres_alloc(1, "cpu=2,mem=4.0M"), Ok((2, 4 * 1048576)));
        assert_eq!(
            parse_tres_alloc(1, "cpu=4,mem=16G,node=1,billing=4"),
            Ok((4, 16 * 1024 * 1048576))
        );
        assert_eq!(
            parse_tres_alloc(1, "cpu=1,mem=1.5G,node=1"),
            Ok((1, 1536 * 1048576))
        );
        // Truncation after scaling
        assert_eq!(parse_tres_alloc(1, "cpu=1,mem=0.3M,"), Ok((1, 314572)));
    }

    #[test]
    fn test_tres_alloc_malformed() {
        for bad in [
            "",
            "mem=4G,cpu=2",
            "cpu=,mem=4G",
            "cpu=2",
            "cpu=2,mem=4T,node=1",
            "cpu=2,mem=4",
            "cpu=2,mem=G",
            "cpu=2,mem=1.2.3M",
            "cpu=2,mem=4Gx",
            "billing=2,cpu=2,mem=4G",
        ] {
            assert_eq!(
                parse_tres_alloc(7, bad),
                Err(ParseError::TresAlloc {
                    job_id: 7,
                    descriptor: bad.to_string()
                }),
                "{bad}"
            );
        }
    }
}
