//! The pool/container identity service: leader check, map version, and
//! the handles needed to open a container (§1 "Explicitly out of scope",
//! §6 "Pool/container identity").

use crate::vos::Oid;
use crate::AggResult;

/// The pool/container handle pair resolved by the IV service bootstrap,
/// required before `aggregate()` can be called (§6 "Public operation"
//  preconditions).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContainerHandles {
    pub pool_hdl_uuid: uuid::Uuid,
    pub cont_hdl_uuid: uuid::Uuid,
}

/// Pool-wide properties relevant to aggregation (redundancy factor and
/// similar EC-layout knobs); kept abstract since the property schema
/// itself is out of scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolProp {
    pub ec_cell_len: usize,
}

/// Outcome of a leader check for one object at a given pool map version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaderStatus {
    Leader,
    NonLeader,
}

pub trait PoolIdentity {
    fn pool_iv_srv_hdl_fetch(&self) -> AggResult<ContainerHandles>;
    fn pool_iv_prop_fetch(&self) -> AggResult<PoolProp>;
    fn pool_check_leader(&self, oid: Oid, map_version: u32) -> AggResult<LeaderStatus>;
}

/// A static [`PoolIdentity`] double: always reports the same handles,
/// property and leader set, regardless of map version. Good enough for
/// the single-invocation scenarios aggregation is tested against (§8);
/// the real service's map-version sensitivity is out of scope here.
#[derive(Debug, Clone)]
pub struct MockIdentity {
    handles: ContainerHandles,
    prop: PoolProp,
    leaders: std::collections::HashSet<Oid>,
}

impl MockIdentity {
    pub fn new(prop: PoolProp) -> Self {
        Self {
            handles: ContainerHandles {
                pool_hdl_uuid: uuid::Uuid::nil(),
                cont_hdl_uuid: uuid::Uuid::nil(),
            },
            prop,
            leaders: std::collections::HashSet::new(),
        }
    }

    pub fn set_leader(&mut self, oid: Oid) {
        self.leaders.insert(oid);
    }
}

impl PoolIdentity for MockIdentity {
    fn pool_iv_srv_hdl_fetch(&self) -> AggResult<ContainerHandles> {
        Ok(self.handles)
    }

    fn pool_iv_prop_fetch(&self) -> AggResult<PoolProp> {
        Ok(self.prop)
    }

    fn pool_check_leader(&self, oid: Oid, _map_version: u32) -> AggResult<LeaderStatus> {
        Ok(if self.leaders.contains(&oid) {
            LeaderStatus::Leader
        } else {
            LeaderStatus::NonLeader
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn leader_status_reflects_seeded_set() {
        let mut id = MockIdentity::new(PoolProp::default());
        id.set_leader(1);
        assert_eq!(id.pool_check_leader(1, 0).unwrap(), LeaderStatus::Leader);
        assert_eq!(id.pool_check_leader(2, 0).unwrap(), LeaderStatus::NonLeader);
    }
}
