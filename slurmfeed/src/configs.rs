// Read the collector configuration from a json file.
//
// The file holds a single object { ... } with the following named fields and value types:
//
//   groups - array of strings, the system groups to report on
//   group_file - string, optional, group database in /etc/group format [default: /etc/group]
//   passwd_file - string, optional, user database in /etc/passwd format [default: /etc/passwd]
//   user_lookup - bool, optional, report by directory attribute too [default: false]
//   identity_file - string, csv file of user,attribute lines
//   identity_command - string, program that prints the attribute for the user name it is given
//   database - string, the time-series database the batches are for
//   pending_retention_policy - string, optional, retention policy for per-job pending times
//                              [default: 1week]
//   on_malformed_job - "skip" or "abort", optional, what to do with a running job whose resource
//                      allocation cannot be parsed [default: skip]
//
// When user_lookup is true exactly one of identity_file and identity_command must be present.
//
// See ../slurm_test_data0/config.json for an example.

use anyhow::{bail, Result};
use serde_json::Value;
use slurmstats::ExtractionPolicy;
use std::fs::File;
use std::io::BufReader;
use std::path;

#[derive(Debug, Clone, PartialEq)]
pub enum IdentitySource {
    File(String),
    Command(String),
}

// See above comment block for field documentation.

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub groups: Vec<String>,
    pub group_file: String,
    pub passwd_file: String,
    pub identity: Option<IdentitySource>,
    pub database: String,
    pub pending_retention_policy: String,
    pub on_malformed_job: ExtractionPolicy,
}

// The input is human-generated and has optional fields, so as for the other configuration files
// this uses the generic JSON parser followed by explicit decoding of the fields, rather than a
// (derived) strongly-typed parser.  That gives us error messages that name the field.

pub fn read_from_json(filename: &str) -> Result<Config> {
    let file = File::open(path::Path::new(filename))?;
    let reader = BufReader::new(file);
    let v = serde_json::from_reader(reader)?;
    decode(v)
}

fn decode(v: Value) -> Result<Config> {
    let Value::Object(fields) = v else {
        bail!("Expected an object value")
    };

    let groups = match fields.get("groups") {
        Some(Value::Array(gs)) => {
            let mut groups = vec![];
            for g in gs {
                if let Value::String(name) = g {
                    groups.push(name.clone());
                } else {
                    bail!("Field 'groups' must be an array of strings");
                }
            }
            groups
        }
        _ => bail!("Field 'groups' must be present and have an array value"),
    };

    let user_lookup = match fields.get("user_lookup") {
        None => false,
        Some(Value::Bool(b)) => *b,
        Some(_) => bail!("Field 'user_lookup' must have a boolean value"),
    };

    let identity_file = grab_opt_string(&fields, "identity_file")?;
    let identity_command = grab_opt_string(&fields, "identity_command")?;
    let identity = if user_lookup {
        match (identity_file, identity_command) {
            (Some(f), None) => Some(IdentitySource::File(f)),
            (None, Some(c)) => Some(IdentitySource::Command(c)),
            _ => bail!("With 'user_lookup', exactly one of 'identity_file' and 'identity_command' is required"),
        }
    } else {
        None
    };

    let on_malformed_job = match grab_opt_string(&fields, "on_malformed_job")?.as_deref() {
        None | Some("skip") => ExtractionPolicy::Skip,
        Some("abort") => ExtractionPolicy::Abort,
        Some(x) => bail!("Field 'on_malformed_job' must be \"skip\" or \"abort\", not \"{x}\""),
    };

    let database = match grab_opt_string(&fields, "database")? {
        Some(db) => db,
        None => bail!("Field 'database' must be present and have a string value"),
    };

    Ok(Config {
        groups,
        group_file: grab_opt_string(&fields, "group_file")?.unwrap_or("/etc/group".to_string()),
        passwd_file: grab_opt_string(&fields, "passwd_file")?.unwrap_or("/etc/passwd".to_string()),
        identity,
        database,
        pending_retention_policy: grab_opt_string(&fields, "pending_retention_policy")?
            .unwrap_or("1week".to_string()),
        on_malformed_job,
    })
}

fn grab_opt_string(fields: &serde_json::Map<String, Value>, name: &str) -> Result<Option<String>> {
    match fields.get(name) {
        None => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => bail!("Field '{name}' must have a string value"),
    }
}

#[test]
fn test_read_config() {
    let c = read_from_json("../slurm_test_data0/config.json").unwrap();
    assert_eq!(c.groups, vec!["staff".to_string(), "phd".to_string()]);
    assert_eq!(c.group_file, "../slurm_test_data0/group");
    assert_eq!(c.passwd_file, "../slurm_test_data0/passwd");
    assert_eq!(
        c.identity,
        Some(IdentitySource::File("../slurm_test_data0/identity.csv".to_string()))
    );
    assert_eq!(c.database, "slurm");
    assert_eq!(c.pending_retention_policy, "1week");
    assert_eq!(c.on_malformed_job, ExtractionPolicy::Skip);
}

#[test]
fn test_config_defaults_and_errors() {
    let c = decode(serde_json::json!({ "groups": [], "database": "db" })).unwrap();
    assert_eq!(c.group_file, "/etc/group");
    assert_eq!(c.passwd_file, "/etc/passwd");
    assert_eq!(c.identity, None);

    let c = decode(serde_json::json!({
        "groups": ["a"], "database": "db", "on_malformed_job": "abort",
        "user_lookup": true, "identity_command": "/usr/local/bin/dept"
    }))
    .unwrap();
    assert_eq!(c.on_malformed_job, ExtractionPolicy::Abort);
    assert_eq!(c.identity, Some(IdentitySource::Command("/usr/local/bin/dept".to_string())));

    assert!(decode(serde_json::json!([])).is_err());
    assert!(decode(serde_json::json!({ "database": "db" })).is_err());
    assert!(decode(serde_json::json!({ "groups": [1], "database": "db" })).is_err());
    assert!(decode(serde_json::json!({ "groups": [] })).is_err());
    assert!(decode(serde_json::json!({ "groups": [], "database": "db", "user_lookup": true })).is_err());
    assert!(decode(serde_json::json!({
        "groups": [], "database": "db", "on_malformed_job": "ignore"
    }))
    .is_err());
}
