//! Cluster pool topology and pool assignment planning.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ProvisionError, ProvisionResult};

/// The maximum number of servers a pool will hold (primary plus replica).
pub const MAX_SERVERS_PER_POOL: u32 = 2;

/// A single pool as reported by the cluster.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct PoolStatus {
    /// The pool id.
    pub pool: u32,
    /// The number of member servers, 1 means the pool can take a replica.
    pub servers: u32,
    /// The number of series owned by the pool.
    pub series: u64,
}

impl PoolStatus {
    /// Whether this pool can accept a replica server.
    pub fn needs_replica(&self) -> bool {
        self.servers == 1
    }
}

/// A read-only snapshot of the cluster's pool layout.
///
/// The snapshot is taken once per provisioning run and never refreshed while
/// the run is in flight. A topology change made by another operator during the
/// run is not detected here, the cluster rejects the registration instead.
#[derive(Clone, Debug, Default)]
pub struct ClusterTopology {
    pools: Vec<PoolStatus>,
}

impl ClusterTopology {
    /// Build a snapshot from the reported pools, ordered by pool id.
    pub fn new(mut pools: Vec<PoolStatus>) -> Self {
        pools.sort_by_key(|p| p.pool);
        Self { pools }
    }

    /// The pools in this snapshot, ordered by pool id.
    pub fn pools(&self) -> &[PoolStatus] {
        &self.pools
    }

    /// The number of pools in the cluster.
    pub fn len(&self) -> usize {
        self.pools.len()
    }

    /// Whether the cluster reports no pools at all.
    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }

    /// Look up a pool by id.
    pub fn get(&self, pool: u32) -> Option<&PoolStatus> {
        self.pools.iter().find(|p| p.pool == pool)
    }

    /// The pools which currently hold a single server.
    pub fn replica_candidates(&self) -> impl Iterator<Item = &PoolStatus> {
        self.pools.iter().filter(|p| p.needs_replica())
    }
}

/// How the new server joins the cluster.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JoinMode {
    /// Start a brand-new pool owning a fresh shard of the series space.
    NewPool,
    /// Become the replica of the given existing pool.
    Replica(u32),
}

/// Compute the pool id the new server will be assigned to.
///
/// A new pool always takes the next sequential id. A replica target must exist
/// and hold exactly one server.
pub fn plan_pool_assignment(topology: &ClusterTopology, mode: JoinMode) -> ProvisionResult<u32> {
    match mode {
        JoinMode::NewPool => Ok(topology.len() as u32),
        JoinMode::Replica(target) => match topology.get(target) {
            None => Err(ProvisionError::PoolNotEligible(format!("pool id {} does not exist", target))),
            Some(pool) if !pool.needs_replica() => Err(ProvisionError::PoolNotEligible(format!(
                "a pool can only have {} servers, pool id {} already has {} servers",
                MAX_SERVERS_PER_POOL, target, pool.servers,
            ))),
            Some(pool) => Ok(pool.pool),
        },
    }
}

/// The identity of a server participating in the cluster.
///
/// Appended to the replicated server list and submitted to the cluster's
/// registration endpoint. Unique by uuid.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct ServerRecord {
    /// The server's unique id, minted once when the server is provisioned.
    pub uuid: Uuid,
    /// The address other servers use to reach this server.
    pub address: String,
    /// The backend (server to server) port.
    pub port: u16,
    /// The pool this server belongs to.
    pub pool: u32,
}
