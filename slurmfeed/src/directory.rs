// Directory services for the identity-attribute dimension.
//
// A csv file of `user,attribute` lines stands in for a directory that has been exported ahead of
// time; a command is run once per distinct user (the cache in slurmstats sees to that) and can
// wrap ldapsearch or whatever the site uses.  Either way, a user the directory cannot answer for
// fails the run.

use anyhow::{bail, Context, Result};
use log::debug;
use slurmstats::Directory;
use std::collections::HashMap;
use std::process::Command;

pub struct CsvDirectory {
    entries: HashMap<String, String>,
}

impl CsvDirectory {
    pub fn open(file_name: &str) -> Result<CsvDirectory> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .from_path(file_name)
            .with_context(|| format!("Opening directory file {file_name}"))?;
        let mut entries = HashMap::new();
        for record in reader.records() {
            let record = record.with_context(|| format!("Reading directory file {file_name}"))?;
            if record.len() != 2 {
                bail!("{file_name}: expected user,attribute but got {} fields", record.len());
            }
            entries.insert(record[0].to_string(), record[1].to_string());
        }
        debug!("{} directory entries from {file_name}", entries.len());
        Ok(CsvDirectory { entries })
    }
}

impl Directory for CsvDirectory {
    fn lookup(&mut self, user: &str) -> Result<String> {
        match self.entries.get(user) {
            Some(attr) if !attr.trim().is_empty() => Ok(attr.trim().to_string()),
            Some(_) => bail!("Empty attribute in directory entry"),
            None => bail!("No directory entry"),
        }
    }
}

pub struct CommandDirectory {
    program: String,
}

impl CommandDirectory {
    pub fn new(program: &str) -> CommandDirectory {
        CommandDirectory {
            program: program.to_string(),
        }
    }
}

impl Directory for CommandDirectory {
    fn lookup(&mut self, user: &str) -> Result<String> {
        let output = Command::new(&self.program)
            .arg(user)
            .output()
            .with_context(|| format!("Running {}", self.program))?;
        if !output.status.success() {
            bail!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        match stdout.lines().map(|l| l.trim()).find(|l| !l.is_empty()) {
            Some(attr) => Ok(attr.to_string()),
            None => bail!("{} printed no attribute", self.program),
        }
    }
}

#[test]
fn test_csv_directory() {
    let mut d = CsvDirectory::open("../slurm_test_data0/identity.csv").unwrap();
    assert_eq!(d.lookup("alice").unwrap(), "physics");
    assert_eq!(d.lookup("carol").unwrap(), "chemistry");
    assert!(d.lookup("mallory").is_err());
    assert!(CsvDirectory::open("../slurm_test_data0/no-such-file").is_err());
}

#[test]
fn test_csv_directory_empty_attribute() {
    let mut d = CsvDirectory {
        entries: [("dave", ""), ("erin", "  "), ("frank", " biology ")]
            .iter()
            .map(|(u, a)| (u.to_string(), a.to_string()))
            .collect(),
    };
    assert!(d.lookup("dave").is_err());
    assert!(d.lookup("erin").is_err());
    assert_eq!(d.lookup("frank").unwrap(), "biology");
}

#[cfg(unix)]
#[test]
fn test_command_directory() {
    let mut d = CommandDirectory::new("echo");
    assert_eq!(d.lookup("alice").unwrap(), "alice");
    let mut d = CommandDirectory::new("false");
    assert!(d.lookup("alice").is_err());
    let mut d = CommandDirectory::new("/no/such/program");
    assert!(d.lookup("alice").is_err());
}
