use chrono::{DateTime, SubsecRound, TimeZone, Utc};

/// The scheduler reports times as seconds since the epoch.  Out-of-range values (which Slurm
/// never produces) are clamped to the epoch.

pub fn from_unix(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).single().unwrap_or_default()
}

/// The capture instant for a run, with no subsecond precision.

pub fn capture_instant(t: DateTime<Utc>) -> DateTime<Utc> {
    t.trunc_subsecs(0)
}

/// Elapsed seconds from `earlier` to `later`, with millisecond resolution.  Negative if the
/// clocks disagree.

pub fn seconds_between(later: DateTime<Utc>, earlier: DateTime<Utc>) -> f64 {
    (later - earlier).num_milliseconds() as f64 / 1000.0
}

#[test]
fn test_seconds_between() {
    let submit = from_unix(1_700_000_000);
    let now = Utc.timestamp_opt(1_700_000_090, 500_000_000).unwrap();
    assert_eq!(seconds_between(now, submit), 90.5);
    assert_eq!(seconds_between(submit, now), -90.5);
    assert_eq!(capture_instant(now), from_unix(1_700_000_090));
}
