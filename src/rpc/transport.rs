//! The peer RPC transport: an external, interface-only collaborator (§1,
//! §6 "RPC"). All outbound RPCs target `{rank: peer_rank, tag: peer_idx +
//! 1}` (§4.7).

use crate::rpc::messages::{
    EcAggregateRequest, EcAggregateResponse, EcFetchParityRequest, EcFetchParityResponse,
    EcReplicateRequest, EcReplicateResponse,
};
use crate::AggResult;

/// The peer parity shard an RPC is addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PeerTarget {
    pub rank: u32,
    pub tag: u32,
}

impl PeerTarget {
    /// The peer shard for parity index `peer_idx` is always at
    /// `tag = peer_idx + 1` on `rank` (§4.7).
    pub fn for_peer_idx(rank: u32, peer_idx: u32) -> Self {
        Self {
            rank,
            tag: peer_idx + 1,
        }
    }
}

/// Request/response RPC to the peer parity shard. The leader blocks
/// (cooperatively) on the reply before committing local changes (§4.7,
/// §5 "Suspension points").
pub trait PeerTransport {
    fn ec_aggregate(
        &self,
        target: PeerTarget,
        req: EcAggregateRequest,
    ) -> AggResult<EcAggregateResponse>;

    fn ec_replicate(
        &self,
        target: PeerTarget,
        req: EcReplicateRequest,
    ) -> AggResult<EcReplicateResponse>;

    /// Read the peer's current parity cell for a stripe, used by the
    /// Partial-Update path's incremental branch before folding a diff in
    /// (§4.5).
    fn ec_fetch_parity(
        &self,
        target: PeerTarget,
        req: EcFetchParityRequest,
    ) -> AggResult<EcFetchParityResponse>;
}

/// An in-process [`PeerTransport`] double that applies requests directly
/// to a caller-owned [`crate::vos::MockVos`] standing in for the peer's
/// store, instead of actually crossing the network. Used by the path
/// tests in §8 to assert on both leader- and peer-side post-states.
pub mod mock {
    use super::*;
    use crate::rpc::peer_receiver::{handle_ec_aggregate, handle_ec_fetch_parity, handle_ec_replicate};
    use crate::vos::MockVos;
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Clone, Default)]
    pub struct MockPeerTransport {
        peer_vos: Arc<Mutex<MockVos>>,
    }

    impl MockPeerTransport {
        pub fn new(peer_vos: Arc<Mutex<MockVos>>) -> Self {
            Self { peer_vos }
        }
    }

    impl PeerTransport for MockPeerTransport {
        fn ec_aggregate(
            &self,
            _target: PeerTarget,
            req: EcAggregateRequest,
        ) -> AggResult<EcAggregateResponse> {
            let mut vos = self.peer_vos.lock().expect("mock peer vos poisoned");
            Ok(handle_ec_aggregate(&mut *vos, &req))
        }

        fn ec_replicate(
            &self,
            _target: PeerTarget,
            req: EcReplicateRequest,
        ) -> AggResult<EcReplicateResponse> {
            let mut vos = self.peer_vos.lock().expect("mock peer vos poisoned");
            Ok(handle_ec_replicate(&mut *vos, &req))
        }

        fn ec_fetch_parity(
            &self,
            _target: PeerTarget,
            req: EcFetchParityRequest,
        ) -> AggResult<EcFetchParityResponse> {
            let vos = self.peer_vos.lock().expect("mock peer vos poisoned");
            Ok(handle_ec_fetch_parity(&*vos, &req))
        }
    }
}
