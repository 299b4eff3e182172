//! A redis-backed [`PeerTransport`], grounded in `stripe-update`'s
//! coordinator/worker request-response queues: requests and responses
//! travel as `bincode`-serialized blobs pushed onto per-peer lists, with
//! the bulk buffer matched back up by [`TaskId`].

use redis::Commands;

use crate::rpc::messages::{
    EcAggregateRequest, EcAggregateResponse, EcFetchParityRequest, EcFetchParityResponse,
    EcReplicateRequest, EcReplicateResponse, TaskId,
};
use crate::rpc::transport::{PeerTarget, PeerTransport};
use crate::{AggError, AggResult};

/// The redis list a peer's receiver blocks on for incoming requests.
/// Public so `aggregate-peerd` can listen on the same key a
/// [`RedisTransport`] would push onto.
pub fn request_queue_key(target: PeerTarget) -> String {
    format!("ec-rank-{}-tag-{}", target.rank, target.tag)
}

/// The redis list a requester blocks on for one task's response.
pub fn response_queue_key(target: PeerTarget, task: TaskId) -> String {
    format!("ec-rank-{}-tag-{}-resp-{}", target.rank, target.tag, task)
}

/// The request envelope pushed onto [`request_queue_key`], tagging which
/// RPC it carries with the [`TaskId`] its response will be matched back
/// up by. Public so `aggregate-peerd`'s receiver loop can decode what a
/// [`RedisTransport`] sends.
#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub enum Envelope {
    Aggregate(TaskId, EcAggregateRequest),
    Replicate(TaskId, EcReplicateRequest),
    FetchParity(TaskId, EcFetchParityRequest),
}

/// The response envelope pushed onto a task's [`response_queue_key`].
#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub enum EnvelopeResponse {
    Aggregate(EcAggregateResponse),
    Replicate(EcReplicateResponse),
    FetchParity(EcFetchParityResponse),
}

/// A [`PeerTransport`] that pushes the request onto the peer's request
/// queue and blocks (via a blocking list pop) on a dedicated per-task
/// response queue. Grounded in `Request::push_to_redis` /
/// `Response::fetch_from_redis`.
pub struct RedisTransport {
    client: redis::Client,
}

impl RedisTransport {
    pub fn connect(redis_url: &str) -> AggResult<Self> {
        let client = redis::Client::open(redis_url).map_err(|e| AggError::transient(e.to_string()))?;
        Ok(Self { client })
    }

    fn roundtrip(&self, request_key: String, response_key: String, envelope: Envelope) -> AggResult<EnvelopeResponse> {
        let mut conn = self
            .client
            .get_connection()
            .map_err(|e| AggError::transient(e.to_string()))?;
        let bin = bincode::serialize(&envelope).map_err(|e| AggError::fatal(e.to_string()))?;
        conn.rpush::<_, _, ()>(&request_key, bin)
            .map_err(|e| AggError::transient(e.to_string()))?;
        let value: redis::Value = conn
            .blpop(&response_key, 0_f64)
            .map_err(|e| AggError::transient(e.to_string()))?;
        let redis::Value::Bulk(value) = value else {
            return Err(AggError::transient("malformed redis response envelope"));
        };
        let redis::Value::Data(data) = value.get(1).ok_or_else(|| AggError::transient("empty redis response"))? else {
            return Err(AggError::transient("malformed redis response payload"));
        };
        bincode::deserialize(data).map_err(|e| AggError::transient(e.to_string()))
    }
}

impl PeerTransport for RedisTransport {
    fn ec_aggregate(&self, target: PeerTarget, req: EcAggregateRequest) -> AggResult<EcAggregateResponse> {
        let task = TaskId::assign();
        let response = self.roundtrip(
            request_queue_key(target),
            response_queue_key(target, task),
            Envelope::Aggregate(task, req),
        )?;
        match response {
            EnvelopeResponse::Aggregate(resp) => Ok(resp),
            _ => Err(AggError::transient("response kind mismatch for EC_AGGREGATE")),
        }
    }

    fn ec_replicate(&self, target: PeerTarget, req: EcReplicateRequest) -> AggResult<EcReplicateResponse> {
        let task = TaskId::assign();
        let response = self.roundtrip(
            request_queue_key(target),
            response_queue_key(target, task),
            Envelope::Replicate(task, req),
        )?;
        match response {
            EnvelopeResponse::Replicate(resp) => Ok(resp),
            _ => Err(AggError::transient("response kind mismatch for EC_REPLICATE")),
        }
    }

    fn ec_fetch_parity(&self, target: PeerTarget, req: EcFetchParityRequest) -> AggResult<EcFetchParityResponse> {
        let task = TaskId::assign();
        let response = self.roundtrip(
            request_queue_key(target),
            response_queue_key(target, task),
            Envelope::FetchParity(task, req),
        )?;
        match response {
            EnvelopeResponse::FetchParity(resp) => Ok(resp),
            _ => Err(AggError::transient("response kind mismatch for EC_FETCH_PARITY")),
        }
    }
}
