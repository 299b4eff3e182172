//! The peer-side handlers for the two RPCs: "the peer's receiver of the
//! EC-aggregate RPC writes parity it received, deletes replica ranges on
//! its side, and replies with status. The peer's receiver of the
//! EC-replicate RPC writes data ranges and deletes parity on its side"
//! (§4.7).

use crate::oclass::PARITY_FLAG;
use crate::rpc::messages::{
    EcAggregateRequest, EcAggregateResponse, EcFetchParityRequest, EcFetchParityResponse,
    EcReplicateRequest, EcReplicateResponse,
};
use crate::vos::{EpochRange, Vos};
use crate::AggResult;

/// Apply an `EC_AGGREGATE` request to the peer's local VOS: write the
/// parity cell(s) carried in `req.bulk` at the stripe's parity index, then
/// delete the replica range the leader already holds the only-remaining
/// copy of.
pub fn apply_ec_aggregate(vos: &mut impl Vos, req: &EcAggregateRequest) -> AggResult<()> {
    let parity_index = (req.stripenum * req.len) | PARITY_FLAG;
    vos.obj_update(
        req.oid,
        req.dkey,
        req.akey,
        req.epoch,
        parity_index,
        &req.bulk,
        req.rsize,
    )?;
    let stripe_start = req.stripenum * req.k * req.len;
    let stripe_records = req.k * req.len;
    let remove_start = stripe_start.saturating_sub(req.prior_len);
    let remove_count = stripe_records - req.prior_len + req.after_len;
    vos.obj_array_remove(
        req.oid,
        req.dkey,
        req.akey,
        EpochRange::new(0, req.epoch),
        remove_start,
        remove_count,
    )
}

pub fn handle_ec_aggregate(vos: &mut impl Vos, req: &EcAggregateRequest) -> EcAggregateResponse {
    EcAggregateResponse {
        status: apply_ec_aggregate(vos, req).map_err(|e| e.to_string()),
    }
}

/// Apply an `EC_REPLICATE` request: write the shipped data ranges at
/// `req.epoch`, then delete the now-redundant parity extent for the
/// stripe.
pub fn apply_ec_replicate(vos: &mut impl Vos, req: &EcReplicateRequest) -> AggResult<()> {
    let mut offset = 0usize;
    for range in req.iod.to_ranges() {
        let count = range.end - range.start;
        let byte_len = (count as usize) * req.rsize;
        vos.obj_update(
            req.oid,
            req.dkey,
            req.akey,
            req.epoch,
            range.start,
            &req.bulk[offset..offset + byte_len],
            req.rsize,
        )?;
        offset += byte_len;
    }
    let parity_index = (req.stripenum * req.len) | PARITY_FLAG;
    vos.obj_array_remove(
        req.oid,
        req.dkey,
        req.akey,
        EpochRange::new(0, req.epoch),
        parity_index,
        req.len,
    )
}

pub fn handle_ec_replicate(vos: &mut impl Vos, req: &EcReplicateRequest) -> EcReplicateResponse {
    EcReplicateResponse {
        status: apply_ec_replicate(vos, req).map_err(|e| e.to_string()),
    }
}

/// Read-only: return the peer's current parity cell bytes for a stripe,
/// without mutating anything. Serves the Partial-Update path's
/// incremental branch (§4.5).
pub fn handle_ec_fetch_parity(vos: &impl Vos, req: &EcFetchParityRequest) -> EcFetchParityResponse {
    let parity_index = (req.stripenum * req.len) | PARITY_FLAG;
    match vos.obj_fetch(
        req.oid,
        req.dkey,
        req.akey,
        req.epoch,
        parity_index,
        req.len,
        req.rsize,
    ) {
        Ok(bulk) => EcFetchParityResponse {
            status: Ok(()),
            bulk,
        },
        Err(e) => EcFetchParityResponse {
            status: Err(e.to_string()),
            bulk: Vec::new(),
        },
    }
}
