/// The optional identity-attribute dimension: a grouping value per user (a department, a faculty)
/// fetched from a directory service.
///
/// The aggregator always talks to an `IdentityAttribute`.  When the dimension is disabled it is
/// `NoIdentity`, which never has an answer and never touches the network.

use crate::error::{Error, Result};

use log::debug;
use std::collections::HashMap;

/// A directory service that maps a user name to its grouping attribute.  An error means the
/// service could not answer (transport, authentication, no such entry).

pub trait Directory {
    fn lookup(&mut self, user: &str) -> anyhow::Result<String>;
}

pub trait IdentityAttribute {
    /// The attribute value for `user`, or None if the dimension is disabled.
    fn resolve(&mut self, user: &str) -> Result<Option<String>>;
}

#[derive(Debug, Default)]
pub struct NoIdentity;

impl IdentityAttribute for NoIdentity {
    fn resolve(&mut self, _user: &str) -> Result<Option<String>> {
        Ok(None)
    }
}

/// Asks the directory at most once per distinct user for the lifetime of the value, which is one
/// run.

pub struct CachedIdentity<D: Directory> {
    directory: D,
    cache: HashMap<String, String>,
}

impl<D: Directory> CachedIdentity<D> {
    pub fn new(directory: D) -> CachedIdentity<D> {
        CachedIdentity {
            directory,
            cache: HashMap::new(),
        }
    }

    /// Number of distinct users looked up so far.
    pub fn lookups(&self) -> usize {
        self.cache.len()
    }
}

impl<D: Directory> IdentityAttribute for CachedIdentity<D> {
    fn resolve(&mut self, user: &str) -> Result<Option<String>> {
        if let Some(attr) = self.cache.get(user) {
            return Ok(Some(attr.clone()));
        }
        let attr = self.directory.lookup(user).map_err(|e| Error::Directory {
            user: user.to_string(),
            reason: format!("{e:#}"),
        })?;
        debug!("directory: {user} -> {attr}");
        self.cache.insert(user.to_string(), attr.clone());
        Ok(Some(attr))
    }
}
