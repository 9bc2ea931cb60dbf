// `slurmfeed` -- Summarize a Slurm snapshot as time-series points
//
// One invocation is one run: read the configuration, the scheduler snapshot and the account
// databases, aggregate, and write two line-protocol batches, the scalar metrics and the per-job
// pending times (meant for a shorter retention policy).  Nothing is kept between runs.
//
// Run it from a timer.  Two overlapping runs would write conflicting points with the same
// timestamp, so the timer (eg `flock -n`) must keep them apart.
//
// Exit codes: 1 configuration, 2 output, 3 scheduler data or account databases, 4 directory
// lookup, 5 malformed job with on_malformed_job=abort.

mod configs;
mod directory;
mod lineproto;

use anyhow::Result;
use clap::Parser;
use configs::{Config, IdentitySource};
use directory::{CommandDirectory, CsvDirectory};
use log::{debug, info};
use slurmstats::{CachedIdentity, IdentityAttribute, NoIdentity, UserNames};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::process;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file (JSON)
    #[arg(long, short)]
    config: String,

    /// Scheduler snapshot (JSON), "-" for stdin
    #[arg(long, short)]
    snapshot: String,

    /// Write the scalar batch here [default: stdout]
    #[arg(long, short)]
    output: Option<String>,

    /// Write the pending-time batch here [default: after the scalar batch]
    #[arg(long)]
    pending_output: Option<String>,

    /// Log progress to stderr (RUST_LOG overrides)
    #[arg(long, short, default_value_t = false)]
    verbose: bool,
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            process::exit(usage_exit_code(&e));
        }
    };

    let level = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    match slurmfeed(&cli) {
        Ok(()) => {}
        Err(msg) => {
            eprintln!("ERROR: {:#}", msg);
            process::exit(exit_code(&msg));
        }
    }
}

// A bad command line is a configuration error; --help and --version are not errors at all.

fn usage_exit_code(e: &clap::Error) -> i32 {
    if e.use_stderr() {
        1
    } else {
        0
    }
}

// Errors that don't come from the engine are from reading the configuration, except where they
// are tagged otherwise below.

fn exit_code(e: &anyhow::Error) -> i32 {
    match e.downcast_ref::<slurmstats::Error>() {
        Some(slurmstats::Error::Config(_)) | None => 1,
        Some(slurmstats::Error::Sink(_)) => 2,
        Some(slurmstats::Error::DataSource(_)) => 3,
        Some(slurmstats::Error::Directory { .. }) => 4,
        Some(slurmstats::Error::Extraction(_)) => 5,
    }
}

fn slurmfeed(cli: &Cli) -> Result<()> {
    let config = configs::read_from_json(&cli.config)
        .map_err(|e| slurmstats::Error::Config(format!("{}: {e:#}", cli.config)))?;
    debug!("{:?}", config);

    let captured = slurmstats::capture_instant(slurmstats::now());

    // Everything the scheduler and the system databases can tell us, before any output is opened.

    let snapshot = slurmstats::read_snapshot(&cli.snapshot)?;
    let groups = slurmstats::read_group_file(&config.group_file, &config.groups)?;
    let mut users = UserNames::new(slurmstats::read_passwd_file(&config.passwd_file)?);
    let mut identity = open_identity(&config)?;

    let aggs = slurmstats::summarize(
        &snapshot,
        &groups,
        &mut users,
        identity.as_mut(),
        captured,
        config.on_malformed_job,
    )?;
    let payload = slurmstats::build_payload(&aggs, captured);
    info!(
        "{} scalar points, {} pending-time points",
        payload.scalars.len(),
        payload.pending.len()
    );

    write_payload(cli, &config, &payload).map_err(slurmstats::Error::Sink)?;
    Ok(())
}

fn open_identity(config: &Config) -> Result<Box<dyn IdentityAttribute>> {
    Ok(match config.identity {
        None => Box::new(NoIdentity),
        Some(IdentitySource::File(ref f)) => Box::new(CachedIdentity::new(
            CsvDirectory::open(f)
                .map_err(|e| slurmstats::Error::DataSource(format!("{e:#}")))?,
        )),
        Some(IdentitySource::Command(ref c)) => Box::new(CachedIdentity::new(CommandDirectory::new(c))),
    })
}

fn write_payload(cli: &Cli, config: &Config, payload: &slurmstats::Payload) -> io::Result<()> {
    let pending_rp = Some(config.pending_retention_policy.as_str());

    let mut output = open_output(&cli.output)?;
    lineproto::write_batch(output.as_mut(), &config.database, None, &payload.scalars)?;
    if cli.pending_output.is_none() {
        lineproto::write_batch(output.as_mut(), &config.database, pending_rp, &payload.pending)?;
    }
    output.flush()?;

    if cli.pending_output.is_some() {
        let mut pending = open_output(&cli.pending_output)?;
        lineproto::write_batch(pending.as_mut(), &config.database, pending_rp, &payload.pending)?;
        pending.flush()?;
    }
    Ok(())
}

fn open_output(file_name: &Option<String>) -> io::Result<Box<dyn Write>> {
    Ok(match file_name {
        Some(name) => Box::new(BufWriter::new(
            File::create(name).map_err(|e| io::Error::new(e.kind(), format!("{name}: {e}")))?,
        )),
        None => Box::new(BufWriter::new(io::stdout())),
    })
}

#[test]
fn test_exit_codes() {
    let e: anyhow::Error = slurmstats::Error::Directory {
        user: "x".to_string(),
        reason: "down".to_string(),
    }
    .into();
    assert_eq!(exit_code(&e), 4);
    assert_eq!(exit_code(&slurmstats::Error::DataSource("x".to_string()).into()), 3);
    assert_eq!(exit_code(&anyhow::anyhow!("bad flag")), 1);
}

#[test]
fn test_usage_exit_codes() {
    let e = Cli::try_parse_from(["slurmfeed", "--snapshot", "-"]).unwrap_err();
    assert_eq!(usage_exit_code(&e), 1);
    let e = Cli::try_parse_from(["slurmfeed", "-c", "x", "-s", "-", "--frobnicate"]).unwrap_err();
    assert_eq!(usage_exit_code(&e), 1);
    let e = Cli::try_parse_from(["slurmfeed", "--help"]).unwrap_err();
    assert_eq!(usage_exit_code(&e), 0);
    assert!(Cli::try_parse_from(["slurmfeed", "-c", "x", "-s", "-"]).is_ok());
}

#[test]
fn test_fixture_run() {
    let dir = std::env::temp_dir().join(format!("slurmfeed-test-{}", process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let scalars = dir.join("scalars.lp");
    let pending = dir.join("pending.lp");
    let cli = Cli {
        config: "../slurm_test_data0/config.json".to_string(),
        snapshot: "../slurm_test_data0/snapshot.json".to_string(),
        output: Some(scalars.to_string_lossy().to_string()),
        pending_output: Some(pending.to_string_lossy().to_string()),
        verbose: false,
    };
    slurmfeed(&cli).unwrap();

    let text = std::fs::read_to_string(&scalars).unwrap();
    assert!(text.starts_with("# DML\n# CONTEXT-DATABASE: slurm\n"));
    assert!(!text.contains("RETENTION-POLICY"));
    assert!(text.contains("\npartition_cpu_usage_pc,partition=compute cpu_usage_pc=12.5 "));
    assert!(text.contains("\npartition_gpu_usage_pc,partition=gpu gpu_usage_pc=50 "));
    assert!(text.contains("\nuser_cpu_usage,user=alice cpu_usage=2 "));
    assert!(text.contains("\nldap_attrib_jobs_pending,ldap_attrib=chemistry jobs_pending=1 "));
    assert!(!text.contains("queue_jobs"));

    let text = std::fs::read_to_string(&pending).unwrap();
    assert!(text.contains("# CONTEXT-RETENTION-POLICY: 1week\n"));
    assert!(text.contains("\ngroup_jobs_time_pending,group=staff,job_id=104 jobs_time_pending="));
    assert_eq!(text.lines().filter(|l| !l.starts_with('#')).count(), 8);

    std::fs::remove_dir_all(&dir).unwrap();
}
