//! Object aggregation context (§3 "Object aggregation context"): the
//! per-object state the Iteration Driver owns for as long as it is inside
//! one EC object it leads parity for.

use std::sync::Arc;

use crate::ec::{BufferPool, CodecTables};
use crate::oclass::ObjectClass;
use crate::object_remote::{ObjectHandle, ObjectRemote};
use crate::rpc::PeerTarget;
use crate::vos::Oid;
use crate::AggResult;

/// Container/pool identity threaded into every RPC this run issues,
/// resolved once via [`crate::identity::PoolIdentity`] at the start of
/// `aggregate()` (§6 "Pool/container identity", RPC wire fields).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContainerIds {
    pub pool_uuid: uuid::Uuid,
    pub pool_hdl_uuid: uuid::Uuid,
    pub cont_uuid: uuid::Uuid,
    pub cont_hdl_uuid: uuid::Uuid,
    pub map_version: u32,
}

/// The current object identity, class attributes, codec tables, a lazily
/// opened object handle for remote reads, the peer parity shard, and the
/// working buffer pool a stripe's SGLs are drawn from (§3). Created when
/// the Iteration Driver admits an EC object this target leads parity for;
/// destroyed when the driver leaves it.
pub struct AggregationContext<'a> {
    pub oid: Oid,
    pub oclass: ObjectClass,
    pub codec: Arc<CodecTables>,
    pub peer_target: PeerTarget,
    pub peer_idx: u32,
    remote: &'a dyn ObjectRemote,
    remote_handle: Option<Box<dyn ObjectHandle>>,
    pub buffers: BufferPool,
}

impl<'a> AggregationContext<'a> {
    pub fn new(
        oid: Oid,
        oclass: ObjectClass,
        codec: Arc<CodecTables>,
        peer_target: PeerTarget,
        peer_idx: u32,
        remote: &'a dyn ObjectRemote,
    ) -> Self {
        Self {
            oid,
            oclass,
            codec,
            peer_target,
            peer_idx,
            remote,
            remote_handle: None,
            buffers: BufferPool::new(),
        }
    }

    /// The object handle for remote reads, opened on first use and reused
    /// across every stripe of this object (§5 "Shared resources").
    pub fn remote_handle(&mut self) -> AggResult<&dyn ObjectHandle> {
        if self.remote_handle.is_none() {
            self.remote_handle = Some(self.remote.obj_open(self.oid)?);
        }
        Ok(self.remote_handle.as_deref().expect("just populated"))
    }
}
