//! Encode Path (§4.4): fetch a full stripe of replica data, compute fresh
//! parity, ship the non-leader cells to the peer, commit locally.

use crate::context::{AggregationContext, ContainerIds};
use crate::ec;
use crate::paths::StripeKey;
use crate::rpc::{EcAggregateRequest, PeerTransport};
use crate::stripe_state::StripeState;
use crate::vos::{EpochRange, Vos};
use crate::worker;
use crate::AggResult;

/// Run the Encode Path for a stripe that is a full, hole-free replica set
/// with parity absent or strictly stale (§4.3 mode 2).
pub fn run(
    ctx: &mut AggregationContext,
    vos: &mut impl Vos,
    peer: &impl PeerTransport,
    key: StripeKey,
    stripe: &StripeState,
    ids: &ContainerIds,
) -> AggResult<()> {
    let oclass = ctx.oclass;
    let cell_bytes = oclass.cell_bytes();
    let hi_epoch = stripe.hi_epoch();

    let raw = vos.obj_fetch(
        ctx.oid,
        key.dkey,
        key.akey,
        hi_epoch,
        stripe.stripe_start(),
        oclass.stripe_records(),
        oclass.rsize(),
    )?;

    let mut data = ctx.buffers.checkout_cells(oclass.k(), cell_bytes);
    for (cell, chunk) in data.iter_mut().zip(raw.chunks_exact(cell_bytes)) {
        cell.as_mut().copy_from_slice(chunk);
    }
    let mut parity = ctx.buffers.checkout_cells(oclass.p(), cell_bytes);

    let codec = ctx.codec.clone();
    let handle = worker::offload(move || {
        let mut parity = parity;
        let result = ec::encode(&codec, cell_bytes, &data, &mut parity);
        (data, parity, result)
    });
    let (data, mut parity, result) = handle.join()?;
    result?;

    if oclass.p() > 1 {
        let bulk: Vec<u8> = parity[1..].iter().flat_map(|c| c.as_ref().iter().copied()).collect();
        let req = EcAggregateRequest {
            pool_uuid: ids.pool_uuid,
            pool_hdl_uuid: ids.pool_hdl_uuid,
            cont_uuid: ids.cont_uuid,
            cont_hdl_uuid: ids.cont_hdl_uuid,
            oid: ctx.oid,
            dkey: key.dkey,
            akey: key.akey,
            rsize: oclass.rsize(),
            len: oclass.len() as u64,
            k: oclass.k() as u64,
            epoch: hi_epoch,
            stripenum: stripe.stripenum(),
            map_version: ids.map_version,
            prior_len: stripe.prefix_ext(),
            after_len: stripe.suffix_ext(),
            bulk,
        };
        let resp = peer.ec_aggregate(ctx.peer_target, req)?;
        resp.status.map_err(crate::AggError::transient)?;
    }

    let parity_index = oclass.parity_index(stripe.stripenum());
    vos.obj_update(
        ctx.oid,
        key.dkey,
        key.akey,
        hi_epoch,
        parity_index,
        parity[0].as_ref(),
        oclass.rsize(),
    )?;

    let (remove_start, remove_count) = crate::paths::stripe_delete_range(oclass, stripe);
    vos.obj_array_remove(
        ctx.oid,
        key.dkey,
        key.akey,
        EpochRange::new(0, hi_epoch),
        remove_start,
        remove_count,
    )?;

    ctx.buffers.release_cells(data);
    ctx.buffers.release_cells(parity);
    Ok(())
}
