/// Reverse indices from node to partitions and from user to groups, built once per run.
///
/// Lookups never fail: a node or user that appears in no list simply has no memberships.  Every
/// node is implicitly in `ALL`; that is not recorded here.

use crate::error::{Error, Result};
use crate::pattern::expand_hostlist;
use crate::{Group, PartitionRecord};

use std::collections::{BTreeSet, HashMap};

static NONE: BTreeSet<String> = BTreeSet::new();

#[derive(Debug, Default)]
pub struct MembershipIndex {
    node_partitions: HashMap<String, BTreeSet<String>>,
    user_groups: HashMap<String, BTreeSet<String>>,
}

impl MembershipIndex {
    /// Build the indices.  A partition whose hostlist cannot be expanded makes the snapshot
    /// unusable, as its totals would silently be wrong.
    pub fn build(partitions: &[PartitionRecord], groups: &[Group]) -> Result<MembershipIndex> {
        let mut index = MembershipIndex::default();
        for p in partitions {
            let nodes = expand_hostlist(&p.nodes).map_err(|e| {
                Error::DataSource(format!("partition {}: hostlist `{}`: {e}", p.name, p.nodes))
            })?;
            for node in nodes {
                index
                    .node_partitions
                    .entry(node)
                    .or_default()
                    .insert(p.name.clone());
            }
        }
        for g in groups {
            for user in &g.members {
                index
                    .user_groups
                    .entry(user.clone())
                    .or_default()
                    .insert(g.name.clone());
            }
        }
        Ok(index)
    }

    pub fn partitions_of(&self, node: &str) -> &BTreeSet<String> {
        self.node_partitions.get(node).unwrap_or(&NONE)
    }

    pub fn groups_of(&self, user: &str) -> &BTreeSet<String> {
        self.user_groups.get(user).unwrap_or(&NONE)
    }
}
