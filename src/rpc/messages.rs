//! Wire messages for the two peer RPCs aggregation issues (§6 "RPC").

use bytes::Bytes;
use smallvec::SmallVec;

/// A task identifier, assigned per outbound RPC the way `stripe-update`
/// tags its coordinator requests, so a response can be matched back to
/// its request even though the two travel over separate queues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct TaskId(#[serde(with = "uuid::serde::compact")] uuid::Uuid);

impl TaskId {
    pub fn assign() -> Self {
        Self(uuid::Uuid::now_v7())
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.as_hyphenated().fmt(f)
    }
}

/// A set of record-index ranges, serialized as its sorted boundary list.
/// Grounded in `stripe-update`'s cluster `Ranges` wrapper over
/// `range_collections::RangeSet`; used for the `iod`/recx list of an
/// `EC_REPLICATE` request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ranges(range_collections::RangeSet<[u64; 2]>);

impl Ranges {
    pub fn empty() -> Self {
        Self(range_collections::RangeSet::empty())
    }

    pub fn from_ranges(ranges: impl IntoIterator<Item = std::ops::Range<u64>>) -> Self {
        let mut set = range_collections::RangeSet::empty();
        for r in ranges {
            set |= range_collections::RangeSet::from(r);
        }
        Self(set)
    }

    pub fn to_ranges(&self) -> Vec<std::ops::Range<u64>> {
        self.0
            .boundaries()
            .chunks_exact(2)
            .map(|b| b[0]..b[1])
            .collect()
    }
}

impl serde::Serialize for Ranges {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.0.boundaries().serialize(serializer)
    }
}

impl<'de> serde::Deserialize<'de> for Ranges {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        use serde::de::Error;
        let boundaries: SmallVec<[u64; 2]> = serde::de::Deserialize::deserialize(deserializer)?;
        Ok(Self(
            range_collections::RangeSet::new(boundaries)
                .ok_or_else(|| Error::custom("invalid range boundaries"))?,
        ))
    }
}

/// Request body for `EC_AGGREGATE`: ship the non-leader parity cell(s) of
/// a freshly encoded or updated stripe to the peer parity shard (§6 wire
/// fields).
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct EcAggregateRequest {
    pub pool_uuid: uuid::Uuid,
    pub pool_hdl_uuid: uuid::Uuid,
    pub cont_uuid: uuid::Uuid,
    pub cont_hdl_uuid: uuid::Uuid,
    /// Object id of the peer's shard.
    pub oid: u64,
    pub dkey: u64,
    pub akey: u64,
    pub rsize: usize,
    /// Records per cell -- needed to resolve the parity index
    /// (`stripenum*len | PARITY_FLAG`) and the stripe's data range on the
    /// peer side.
    pub len: u64,
    pub k: u64,
    pub epoch: u64,
    pub stripenum: u64,
    pub map_version: u32,
    pub prior_len: u64,
    pub after_len: u64,
    #[serde(with = "serde_bytes")]
    pub bulk: Vec<u8>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct EcAggregateResponse {
    pub status: Result<(), String>,
}

/// Request body for `EC_REPLICATE`: ship non-hole data ranges to the peer
/// so it can fall back to plain replication for a stripe whose parity is
/// being retired due to a hole (§6 wire fields).
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct EcReplicateRequest {
    pub pool_uuid: uuid::Uuid,
    pub pool_hdl_uuid: uuid::Uuid,
    pub cont_uuid: uuid::Uuid,
    pub cont_hdl_uuid: uuid::Uuid,
    pub oid: u64,
    pub dkey: u64,
    pub akey: u64,
    pub rsize: usize,
    pub len: u64,
    pub iod: Ranges,
    pub stripenum: u64,
    pub epoch: u64,
    pub map_version: u32,
    #[serde(with = "serde_bytes")]
    pub bulk: Vec<u8>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct EcReplicateResponse {
    pub status: Result<(), String>,
}

/// Request body for the parity pre-fetch the Partial-Update path's
/// incremental branch issues before folding a diff in: the peer's
/// current parity cell value is needed so the leader can compute the
/// cell's post-update value in memory and ship the whole thing back via
/// `EC_AGGREGATE` (§4.5 "If `p > 1`, fetch the non-leader parity cell(s)
/// from the peer shard at `parity.epoch`"). Not named as its own opcode
/// in §6's wire field list, which only enumerates the two commit RPCs;
/// grounded here as the minimal read companion those commits require.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct EcFetchParityRequest {
    pub pool_uuid: uuid::Uuid,
    pub pool_hdl_uuid: uuid::Uuid,
    pub cont_uuid: uuid::Uuid,
    pub cont_hdl_uuid: uuid::Uuid,
    pub oid: u64,
    pub dkey: u64,
    pub akey: u64,
    pub rsize: usize,
    pub len: u64,
    pub stripenum: u64,
    pub epoch: u64,
    pub map_version: u32,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct EcFetchParityResponse {
    pub status: Result<(), String>,
    #[serde(with = "serde_bytes")]
    pub bulk: Vec<u8>,
}

/// Helper shared by both request types: pull `bulk` apart into
/// fixed-size chunks (one per cell, or one per range) when the caller
/// needs to address individual pieces rather than the raw byte blob.
pub fn chunks(bulk: &[u8], chunk_bytes: usize) -> impl Iterator<Item = &[u8]> {
    bulk.chunks(chunk_bytes)
}

pub type Bulk = Bytes;
