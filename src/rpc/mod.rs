//! Peer RPC plumbing: wire messages, the `PeerTransport` collaborator
//! interface, a redis-backed implementation, and the peer-side request
//! handlers (§4.7 "Peer Coordinator", §6 "RPC").

pub mod messages;
pub mod peer_receiver;
pub mod redis_transport;
pub mod transport;

pub use messages::{
    EcAggregateRequest, EcAggregateResponse, EcFetchParityRequest, EcFetchParityResponse,
    EcReplicateRequest, EcReplicateResponse, Ranges, TaskId,
};
pub use redis_transport::RedisTransport;
pub use transport::{PeerTarget, PeerTransport};
