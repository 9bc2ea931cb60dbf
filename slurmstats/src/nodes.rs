// Fold per-node capacity into partition totals.  Partition usage comes from the running jobs
// (see jobs.rs); what the nodes report as allocated is only logged.

use crate::aggregate::{Aggregates, Dimension, ALL};
use crate::membership::MembershipIndex;
use crate::tres::node_gpus;
use crate::NodeRecord;

use log::debug;

const MIB: u64 = 1048576;

/// Capacity of one node, memory in bytes.

#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct NodeCapacity {
    pub cpu_total: u64,
    pub mem_total: u64,
    pub gpu_total: u64,
}

impl NodeCapacity {
    pub fn from_record(node: &NodeRecord) -> NodeCapacity {
        NodeCapacity {
            cpu_total: node.cpus,
            mem_total: node.real_memory * MIB,
            gpu_total: node_gpus(&node.gres),
        }
    }
}

/// What the scheduler says is allocated on a node: cores, bytes, GPUs.  Usage descriptors on
/// nodes without GPUs can still mention other gres, so GPUs are only read when there is capacity.

pub fn reported_allocation(node: &NodeRecord) -> (u64, u64, u64) {
    let gpus = if node_gpus(&node.gres) > 0 {
        node_gpus(&node.gres_used)
    } else {
        0
    };
    (node.alloc_cpus, node.alloc_mem * MIB, gpus)
}

/// Add every node's capacity into `ALL` and into each partition it belongs to.  Returns the number
/// of nodes processed.

pub fn aggregate_nodes(aggs: &mut Aggregates, index: &MembershipIndex, nodes: &[NodeRecord]) -> usize {
    let (mut cpus, mut mem, mut gpus) = (0, 0, 0);
    for node in nodes {
        let capacity = NodeCapacity::from_record(node);
        aggs.bucket(Dimension::Partition, ALL).add_capacity(&capacity);
        for part in index.partitions_of(&node.name) {
            aggs.bucket(Dimension::Partition, part).add_capacity(&capacity);
        }
        let (c, m, g) = reported_allocation(node);
        cpus += c;
        mem += m;
        gpus += g;
    }
    debug!("nodes report {cpus} cores, {mem} bytes, {gpus} gpus allocated");
    nodes.len()
}
