// Readers for the system account databases, /etc/group and /etc/passwd or files in the same
// colon-separated format (eg the output of `getent group`).
//
// Group membership here is the supplementary member list only, users whose primary group is the
// group are not included unless also listed.

use crate::error::{Error, Result};
use crate::{Group, JobRecord};

use log::warn;
use std::collections::{HashMap, HashSet};
use std::str::FromStr;

fn read_colon_file(file_name: &str) -> Result<Vec<Vec<String>>> {
    let source = |e: csv::Error| Error::DataSource(format!("{file_name}: {e}"));

    // An error here is going to be an I/O error so always propagate it.
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .quoting(false)
        .delimiter(b':')
        .comment(Some(b'#'))
        .from_path(file_name)
        .map_err(source)?;

    let mut records = vec![];
    for record in reader.records() {
        match record {
            Err(e) => {
                if e.is_io_error() {
                    return Err(source(e));
                }
                // Otherwise drop the record
            }
            Ok(record) => records.push(record.iter().map(|f| f.to_string()).collect()),
        }
    }
    Ok(records)
}

/// Resolve each group in `wanted` to its members.  The groups are returned in the order given,
/// without duplicates.  A wanted group that is not in the file is an error.

pub fn read_group_file(file_name: &str, wanted: &[String]) -> Result<Vec<Group>> {
    let mut members = HashMap::<String, Vec<String>>::new();
    for fields in read_colon_file(file_name)? {
        // name:password:gid:member,member,...
        if fields.len() < 3 || members.contains_key(&fields[0]) {
            continue;
        }
        let list = fields
            .get(3)
            .map(|m| {
                m.split(',')
                    .filter(|u| !u.is_empty())
                    .map(|u| u.to_string())
                    .collect::<Vec<String>>()
            })
            .unwrap_or_default();
        members.insert(fields[0].clone(), list);
    }

    let mut seen = HashSet::new();
    let mut groups = vec![];
    for name in wanted {
        if !seen.insert(name) {
            continue;
        }
        match members.remove(name) {
            Some(list) => groups.push(Group {
                name: name.clone(),
                members: list,
            }),
            None => {
                return Err(Error::DataSource(format!(
                    "{file_name}: no such group `{name}`"
                )))
            }
        }
    }
    Ok(groups)
}

/// Map uid to login name.  Malformed lines are dropped; the first line for a uid wins.

pub fn read_passwd_file(file_name: &str) -> Result<HashMap<u32, String>> {
    let mut users = HashMap::new();
    for fields in read_colon_file(file_name)? {
        // name:password:uid:gid:gecos:home:shell
        if fields.len() < 3 {
            continue;
        }
        if let Ok(uid) = u32::from_str(&fields[2]) {
            users.entry(uid).or_insert_with(|| fields[0].clone());
        }
    }
    Ok(users)
}

/// Turns the owner of a job record into a login name, once per uid.

#[derive(Debug, Default)]
pub struct UserNames {
    passwd: HashMap<u32, String>,
    resolved: HashMap<u32, String>,
}

impl UserNames {
    pub fn new(passwd: HashMap<u32, String>) -> UserNames {
        UserNames {
            passwd,
            resolved: HashMap::new(),
        }
    }

    /// The record's own user name if it has one, else the passwd entry for its uid, else the uid
    /// in decimal.
    pub fn name_of(&mut self, job: &JobRecord) -> String {
        if let Some(ref name) = job.user_name {
            if !name.is_empty() {
                return name.clone();
            }
        }
        if let Some(name) = self.resolved.get(&job.user_id) {
            return name.clone();
        }
        let name = match self.passwd.get(&job.user_id) {
            Some(name) => name.clone(),
            None => {
                warn!("uid {} has no passwd entry, reporting it by number", job.user_id);
                job.user_id.to_string()
            }
        };
        self.resolved.insert(job.user_id, name.clone());
        name
    }
}

#[test]
fn test_read_group_file() {
    let groups = read_group_file(
        "../slurm_test_data0/group",
        &["staff".to_string(), "phd".to_string(), "staff".to_string(), "nobody".to_string()],
    )
    .unwrap();
    assert_eq!(
        groups,
        vec![
            Group {
                name: "staff".to_string(),
                members: vec!["alice".to_string(), "carol".to_string()]
            },
            Group {
                name: "phd".to_string(),
                members: vec!["alice".to_string(), "dave".to_string()]
            },
            Group {
                name: "nobody".to_string(),
                members: vec![]
            },
        ]
    );
}

#[test]
fn test_missing_group() {
    let r = read_group_file("../slurm_test_data0/group", &["wizards".to_string()]);
    assert!(matches!(r, Err(Error::DataSource(_))));
    let r = read_group_file("../slurm_test_data0/no-such-file", &[]);
    assert!(matches!(r, Err(Error::DataSource(_))));
}

#[test]
fn test_user_names() {
    let passwd = read_passwd_file("../slurm_test_data0/passwd").unwrap();
    assert_eq!(passwd.get(&1001).map(|s| s.as_str()), Some("alice"));
    assert_eq!(passwd.get(&0).map(|s| s.as_str()), Some("root"));
    assert!(passwd.get(&4242).is_none());

    let mut users = UserNames::new(passwd);
    let mut job = JobRecord {
        user_id: 1002,
        ..Default::default()
    };
    assert_eq!(users.name_of(&job), "bob");
    job.user_id = 4242;
    assert_eq!(users.name_of(&job), "4242");
    job.user_name = Some("erin".to_string());
    assert_eq!(users.name_of(&job), "erin");
}
