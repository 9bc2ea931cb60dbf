// Render points as InfluxDB line protocol, one batch at a time.
//
// Each batch starts with the DML context header understood by `influx -import`, naming the
// database and, for batches that should not go to the default retention policy, the retention
// policy.  Timestamps are in nanoseconds.

use itertools::Itertools;
use slurmstats::Point;
use std::io;

pub fn write_batch(
    output: &mut dyn io::Write,
    database: &str,
    retention_policy: Option<&str>,
    points: &[Point],
) -> io::Result<()> {
    writeln!(output, "# DML")?;
    writeln!(output, "# CONTEXT-DATABASE: {database}")?;
    if let Some(rp) = retention_policy {
        writeln!(output, "# CONTEXT-RETENTION-POLICY: {rp}")?;
    }
    for p in points {
        writeln!(output, "{}", format_point(p))?;
    }
    Ok(())
}

pub fn format_point(p: &Point) -> String {
    let mut s = escape(&p.measurement, &[',', ' ']);
    for (k, v) in &p.tags {
        s += &format!(",{}={}", escape(k, &[',', '=', ' ']), escape(v, &[',', '=', ' ']));
    }
    let fields = p
        .fields
        .iter()
        .map(|(k, v)| format!("{}={}", escape(k, &[',', '=', ' ']), v))
        .join(",");
    s += &format!(" {} {}", fields, p.timestamp.timestamp() * 1_000_000_000);
    s
}

fn escape(s: &str, special: &[char]) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if special.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
