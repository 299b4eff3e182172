//! Hole-Repair Path (§4.6): a stripe with at least one explicit hole is
//! downgraded from parity-coded to plain replication for the parts that
//! are still present, since the missing part can no longer be recovered
//! through erasure coding.

use crate::context::{AggregationContext, ContainerIds};
use crate::extent::Extent;
use crate::paths::StripeKey;
use crate::rpc::{EcReplicateRequest, PeerTransport, Ranges};
use crate::stripe_state::StripeState;
use crate::vos::{EpochRange, Vos};
use crate::AggResult;

/// Run the Hole-Repair Path for a stripe containing at least one hole
/// extent (§4.3 mode 4). `probe` must be present -- a holed stripe with
/// no parity has nothing to repair and would have selected `NoOp`.
pub fn run(
    ctx: &mut AggregationContext,
    vos: &mut impl Vos,
    peer: &impl PeerTransport,
    key: StripeKey,
    stripe: &StripeState,
    ids: &ContainerIds,
) -> AggResult<()> {
    let oclass = ctx.oclass;
    let hi_epoch = stripe.hi_epoch();
    let stripe_start = stripe.stripe_start();
    let stripe_end = stripe.stripe_end();

    // Open Question 4: this assumes VOS visibility filtering has already
    // removed overlapping/shadowed extents from `stripe.extents()`, so the
    // merge below is simply "everything covered by a live, non-hole
    // extent" rather than a full interval-overlay computation.
    let covered = covered_ranges(stripe.extents(), stripe_start, stripe_end);
    if covered.is_empty() {
        return Ok(());
    }

    let remote = ctx.remote_handle()?;
    let mut bulk = Vec::new();
    for range in &covered {
        let count = range.end - range.start;
        let bytes = remote.fetch(key.dkey, key.akey, hi_epoch, range.start, count, oclass.rsize())?;
        bulk.extend_from_slice(&bytes);
    }

    let iod = Ranges::from_ranges(covered.iter().cloned());
    let req = EcReplicateRequest {
        pool_uuid: ids.pool_uuid,
        pool_hdl_uuid: ids.pool_hdl_uuid,
        cont_uuid: ids.cont_uuid,
        cont_hdl_uuid: ids.cont_hdl_uuid,
        oid: ctx.oid,
        dkey: key.dkey,
        akey: key.akey,
        rsize: oclass.rsize(),
        len: oclass.len() as u64,
        iod,
        stripenum: stripe.stripenum(),
        epoch: hi_epoch,
        map_version: ids.map_version,
        bulk: bulk.clone(),
    };
    let resp = peer.ec_replicate(ctx.peer_target, req)?;
    resp.status.map_err(crate::AggError::transient)?;

    let mut offset = 0usize;
    for range in &covered {
        let count = range.end - range.start;
        let byte_len = (count as usize) * oclass.rsize();
        vos.obj_update(
            ctx.oid,
            key.dkey,
            key.akey,
            hi_epoch,
            range.start,
            &bulk[offset..offset + byte_len],
            oclass.rsize(),
        )?;
        offset += byte_len;
    }

    let parity_index = oclass.parity_index(stripe.stripenum());
    vos.obj_array_remove(
        ctx.oid,
        key.dkey,
        key.akey,
        EpochRange::new(0, hi_epoch),
        parity_index,
        oclass.len() as u64,
    )?;
    Ok(())
}

/// The merged ranges within `[stripe_start, stripe_end)` covered by a
/// live, non-hole extent -- the surviving replica data that must fall
/// back to plain replication since the stripe can no longer be
/// reconstructed from parity alone (spec §4.6, §8 scenario 4: "ship the
/// non-hole data ranges"). Adjacent/overlapping non-hole extents are
/// coalesced into a single range.
fn covered_ranges(extents: &[Extent], stripe_start: u64, stripe_end: u64) -> Vec<std::ops::Range<u64>> {
    let mut ranges: Vec<std::ops::Range<u64>> = extents
        .iter()
        .filter(|e| !e.is_hole && e.overlaps(stripe_start, stripe_end))
        .map(|e| e.index.max(stripe_start)..e.end().min(stripe_end))
        .collect();
    ranges.sort_by_key(|r| r.start);

    let mut merged: Vec<std::ops::Range<u64>> = Vec::new();
    for range in ranges.drain(..) {
        match merged.last_mut() {
            Some(last) if range.start <= last.end => last.end = last.end.max(range.end),
            _ => merged.push(range),
        }
    }
    merged
}
