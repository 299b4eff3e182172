//! Partial-Update Path (§4.5): fold newly-arrived replicas into existing
//! parity, either by a per-cell incremental XOR update or, once enough of
//! the stripe has turned over, a full recalc.

use crate::context::{AggregationContext, ContainerIds};
use crate::ec;
use crate::parity_probe::ParityProbe;
use crate::paths::StripeKey;
use crate::rpc::{EcAggregateRequest, EcFetchParityRequest, PeerTransport};
use crate::stripe_state::StripeState;
use crate::vos::{EpochRange, Vos};
use crate::worker;
use crate::{AggError, AggResult};

/// Which branch of the Partial-Update path a call to [`run`] took, so the
/// caller can attribute the stripe to the right [`crate::status::Status`]
/// counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartialUpdateOutcome {
    Incremental,
    Recalc,
}

/// Run the Partial-Update Path. `probe` must be `Some` -- reaching this
/// path implies parity is present and the stripe has no holes (§4.3 mode
/// 5).
pub fn run(
    ctx: &mut AggregationContext,
    vos: &mut impl Vos,
    peer: &impl PeerTransport,
    key: StripeKey,
    stripe: &StripeState,
    probe: &ParityProbe,
    ids: &ContainerIds,
) -> AggResult<PartialUpdateOutcome> {
    let oclass = ctx.oclass;
    let parity_epoch = probe.epoch().expect("partial-update requires present parity");
    let k = oclass.k();

    let full = stripe.full_cells(parity_epoch);
    let full_count = full.iter().filter(|&&b| b).count();

    // Open Question 2: the tie-break at exactly k/2 stays on the
    // incremental branch; only a strict majority of full cells recalcs.
    if full_count > k / 2 {
        recalc(ctx, vos, peer, key, stripe, ids, &full)?;
        Ok(PartialUpdateOutcome::Recalc)
    } else {
        incremental(ctx, vos, peer, key, stripe, probe, ids)?;
        Ok(PartialUpdateOutcome::Incremental)
    }
}

fn recalc(
    ctx: &mut AggregationContext,
    vos: &mut impl Vos,
    peer: &impl PeerTransport,
    key: StripeKey,
    stripe: &StripeState,
    ids: &ContainerIds,
    full: &[bool],
) -> AggResult<()> {
    let oclass = ctx.oclass;
    let cell_bytes = oclass.cell_bytes();
    let hi_epoch = stripe.hi_epoch();
    let stripe_start = stripe.stripe_start();

    let mut cell_bytes_buf = Vec::with_capacity(oclass.k());
    for (c, &is_full) in full.iter().enumerate() {
        let cell_index = stripe_start + (c * oclass.len()) as u64;
        let bytes = if is_full {
            vos.obj_fetch(ctx.oid, key.dkey, key.akey, hi_epoch, cell_index, oclass.len() as u64, oclass.rsize())?
        } else {
            ctx.remote_handle()?
                .fetch(key.dkey, key.akey, hi_epoch, cell_index, oclass.len() as u64, oclass.rsize())?
        };
        cell_bytes_buf.push(bytes);
    }

    let mut data = ctx.buffers.checkout_cells(oclass.k(), cell_bytes);
    for (cell, bytes) in data.iter_mut().zip(cell_bytes_buf.iter()) {
        cell.as_mut().copy_from_slice(bytes);
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

    commit(ctx, vos, peer, key, stripe, ids, &mut parity)?;
    ctx.buffers.release_cells(data);
    ctx.buffers.release_cells(parity);
    Ok(())
}

fn incremental(
    ctx: &mut AggregationContext,
    vos: &mut impl Vos,
    peer: &impl PeerTransport,
    key: StripeKey,
    stripe: &StripeState,
    probe: &ParityProbe,
    ids: &ContainerIds,
) -> AggResult<()> {
    let oclass = ctx.oclass;
    let cell_bytes = oclass.cell_bytes();
    let hi_epoch = stripe.hi_epoch();
    let parity_epoch = probe.epoch().expect("incremental requires present parity");
    let stripe_start = stripe.stripe_start();

    let new_extents = stripe.newer_extents(parity_epoch);
    let mut touched_cells: Vec<usize> = new_extents
        .iter()
        .flat_map(|e| {
            let start_cell = oclass.cell_of(e.index.max(stripe_start) - stripe_start);
            let end_cell = oclass.cell_of((e.end().min(stripe.stripe_end()) - 1).max(stripe_start) - stripe_start);
            start_cell..=end_cell
        })
        .collect();
    touched_cells.sort_unstable();
    touched_cells.dedup();

    let mut parity = ctx.buffers.checkout_cells(oclass.p(), cell_bytes);
    let parity_index = oclass.parity_index(stripe.stripenum());
    let leader_bytes = vos.obj_fetch(ctx.oid, key.dkey, key.akey, parity_epoch, parity_index, oclass.len() as u64, oclass.rsize())?;
    parity[0].as_mut().copy_from_slice(&leader_bytes);

    if oclass.p() > 1 {
        if oclass.p() > 2 {
            return Err(AggError::unsupported(format!(
                "peer-parity fetch only supports p in {{1, 2}}, got p={}",
                oclass.p()
            )));
        }
        let req = EcFetchParityRequest {
            pool_uuid: ids.pool_uuid,
            pool_hdl_uuid: ids.pool_hdl_uuid,
            cont_uuid: ids.cont_uuid,
            cont_hdl_uuid: ids.cont_hdl_uuid,
            oid: ctx.oid,
            dkey: key.dkey,
            akey: key.akey,
            rsize: oclass.rsize(),
            len: oclass.len() as u64,
            stripenum: stripe.stripenum(),
            epoch: parity_epoch,
            map_version: ids.map_version,
        };
        let resp = peer.ec_fetch_parity(ctx.peer_target, req)?;
        resp.status.map_err(AggError::transient)?;
        parity[1].as_mut().copy_from_slice(&resp.bulk);
    }

    for &cell_index in &touched_cells {
        let cell_start = stripe_start + (cell_index * oclass.len()) as u64;
        let old = vos.obj_fetch(ctx.oid, key.dkey, key.akey, parity_epoch, cell_start, oclass.len() as u64, oclass.rsize())?;
        let new = vos.obj_fetch(ctx.oid, key.dkey, key.akey, hi_epoch, cell_start, oclass.len() as u64, oclass.rsize())?;
        let mut diff = vec![0u8; cell_bytes];
        ec::xor(&[old.as_slice(), new.as_slice()], &mut diff)?;

        let codec = ctx.codec.clone();
        let handle = worker::offload(move || {
            let mut parity = parity;
            let result = ec::encode_update(&codec, cell_index, &diff, &mut parity);
            (parity, result)
        });
        let (joined_parity, result) = handle.join()?;
        parity = joined_parity;
        result?;
    }

    commit(ctx, vos, peer, key, stripe, ids, &mut parity)?;
    ctx.buffers.release_cells(parity);
    Ok(())
}

/// Shared commit tail for both branches: ship non-leader parity cells to
/// the peer first (if `p>1`), then write the leader's parity cell
/// locally (§3 invariant 5, §4.5 "Local commit" / "Peer commit").
fn commit(
    ctx: &mut AggregationContext,
    vos: &mut impl Vos,
    peer: &impl PeerTransport,
    key: StripeKey,
    stripe: &StripeState,
    ids: &ContainerIds,
    parity: &mut [ec::Cell],
) -> AggResult<()> {
    let oclass = ctx.oclass;
    let hi_epoch = stripe.hi_epoch();

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
        resp.status.map_err(AggError::transient)?;
    }

    let parity_index = oclass.parity_index(stripe.stripenum());
    vos.obj_update(ctx.oid, key.dkey, key.akey, hi_epoch, parity_index, parity[0].as_ref(), oclass.rsize())?;

    let (remove_start, remove_count) = crate::paths::stripe_delete_range(oclass, stripe);
    vos.obj_array_remove(
        ctx.oid,
        key.dkey,
        key.akey,
        EpochRange::new(0, hi_epoch),
        remove_start,
        remove_count,
    )?;
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::ec::CodecCache;
    use crate::extent::Extent;
    use crate::oclass::ObjectClass;
    use crate::object_remote::mock::MockObjectRemote;
    use crate::rpc::transport::mock::MockPeerTransport;
    use crate::rpc::PeerTarget;
    use crate::vos::MockVos;
    use std::num::NonZeroUsize;
    use std::sync::{Arc, Mutex};

    fn nz(n: usize) -> NonZeroUsize {
        NonZeroUsize::new(n).unwrap()
    }

    fn ids() -> ContainerIds {
        ContainerIds {
            pool_uuid: uuid::Uuid::nil(),
            pool_hdl_uuid: uuid::Uuid::nil(),
            cont_uuid: uuid::Uuid::nil(),
            cont_hdl_uuid: uuid::Uuid::nil(),
            map_version: 0,
        }
    }

    #[test]
    fn incremental_update_matches_fresh_recalc() {
        // k=4,p=2,len=4: write a full stripe at e1, encode parity, then
        // overwrite cell 0 at e2 and run the partial-update path.
        let oclass = ObjectClass::new(nz(4), nz(2), nz(4), nz(1));
        let mut vos = MockVos::new();
        vos.mark_ec_object(1, true);
        let mut cache = CodecCache::new();
        let tables = cache.get(nz(4), nz(2));

        let original: Vec<Vec<u8>> = (0..4).map(|c| (0..4).map(|i| (c * 10 + i) as u8).collect()).collect();
        for (c, cell) in original.iter().enumerate() {
            for (i, &b) in cell.iter().enumerate() {
                vos.seed_extent(1, 0, 0, (c * 4 + i) as u64, vec![b], 1, false);
            }
        }
        let data_cells: Vec<crate::ec::Cell> = original.iter().map(|c| crate::ec::Cell::from(c.clone())).collect();
        let mut parity_cells = crate::ec::Cell::zero_n(2, 4);
        ec::encode(&tables, 4, &data_cells, &mut parity_cells).unwrap();
        vos.seed_extent(1, 0, 0, oclass.parity_index(0), parity_cells[0].as_ref().to_vec(), 1, false);

        let peer_vos = Arc::new(Mutex::new(MockVos::new()));
        peer_vos.lock().unwrap().mark_ec_object(1, false);
        peer_vos.lock().unwrap().seed_extent(1, 0, 0, oclass.parity_index(0), parity_cells[1].as_ref().to_vec(), 1, false);
        let peer = MockPeerTransport::new(peer_vos.clone());

        // New replica for cell 0 at e2.
        let new_cell0 = vec![99u8, 98, 97, 96];
        for (i, &b) in new_cell0.iter().enumerate() {
            vos.seed_extent(1, 0, 0, i as u64, vec![b], 2, false);
        }

        let mut stripe = StripeState::new(oclass, 0);
        stripe.push_extent(Extent::new(0, 4, 2, false));

        let remote = MockObjectRemote::new();
        let mut ctx = AggregationContext::new(1, oclass, tables.clone(), PeerTarget::for_peer_idx(0, 0), 0, &remote);
        let probe = ParityProbe::present(1, oclass.parity_index(0), oclass.len() as u64);
        run(&mut ctx, &mut vos, &peer, StripeKey { dkey: 0, akey: 0 }, &stripe, &probe, &ids()).unwrap();

        let leader_parity = vos.obj_fetch(1, 0, 0, 2, oclass.parity_index(0), 4, 1).unwrap();
        let peer_parity = peer_vos.lock().unwrap().obj_fetch(1, 0, 0, 2, oclass.parity_index(0), 4, 1).unwrap();

        let mut expected_data = original.clone();
        expected_data[0] = new_cell0;
        let expected_cells: Vec<crate::ec::Cell> = expected_data.iter().map(|c| crate::ec::Cell::from(c.clone())).collect();
        let mut expected_parity = crate::ec::Cell::zero_n(2, 4);
        ec::encode(&tables, 4, &expected_cells, &mut expected_parity).unwrap();

        assert_eq!(leader_parity, expected_parity[0].as_ref());
        assert_eq!(peer_parity, expected_parity[1].as_ref());

        let replica = vos.obj_fetch(1, 0, 0, 2, 0, 4, 1).unwrap();
        assert_eq!(replica, vec![0u8; 4]);
    }
}
