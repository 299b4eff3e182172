//! The Iteration Driver (§4.1): the nested object/dkey/akey/extent walk
//! that buckets extents into [`StripeState`]s and, on each stripe or key
//! boundary, flushes through the Mode Selector into a path. Also the
//! crate's public entry point, `aggregate()` (§6 "Public operation").

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::context::{AggregationContext, ContainerIds};
use crate::ec::CodecCache;
use crate::identity::{LeaderStatus, PoolIdentity};
use crate::is_parity_index;
use crate::mode::{self, Mode};
use crate::object_remote::ObjectRemote;
use crate::oclass::ObjectClass;
use crate::parity_probe::ParityProbe;
use crate::paths::partial_update::PartialUpdateOutcome;
use crate::paths::{encode, hole_repair, partial_update, StripeKey};
use crate::rpc::{PeerTarget, PeerTransport};
use crate::status::Status;
use crate::stripe_state::StripeState;
use crate::vos::{AKey, DKey, EpochRange, Oid, Vos};
use crate::AggResult;

/// A container identity the caller has already opened, per §6 "Public
/// operation" precondition that the container is open with read-write
/// handles obtained via the identity-service bootstrap. The pool/cont
/// handle UUIDs themselves come from [`PoolIdentity::pool_iv_srv_hdl_fetch`]
/// at the start of the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Container {
    pub pool_uuid: uuid::Uuid,
    pub cont_uuid: uuid::Uuid,
}

/// A cooperative cancellation flag, checked at stripe-credit boundaries
/// (§5 "Cancellation / timeouts", §11 "Cancellation token"). Cloning
/// shares the same underlying flag, the way a supervisor would hand a
/// token to the run it is driving.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Per-object running state the driver carries between extent callbacks:
/// the current `(dkey, akey)`, the stripe being gathered, and the object
/// aggregation context (§3 "Object aggregation context"). `aborted` is
/// set once a non-recoverable path error has surfaced for this object, so
/// further extents for it are skipped rather than processed (§7 "object
/// errors fold into continue with next object").
struct ObjectCursor<'a> {
    key: (DKey, AKey),
    stripe: StripeState,
    ctx: AggregationContext<'a>,
    aborted: bool,
}

/// Run aggregation for `container` over `[epoch_range.lo, epoch_range.hi]`
/// (§6 "Public operation"). `oclass_of` resolves an object's EC attributes
/// from its oid -- attribute storage/lookup is out of scope (§1) so the
/// caller supplies it. `stripe_credit` bounds how many stripes are
/// processed between cancellation checks (§6 "Credit / batching").
#[allow(clippy::too_many_arguments)]
pub fn aggregate<V, P, I>(
    vos: &mut V,
    peer: &P,
    identity: &I,
    remote: &dyn ObjectRemote,
    oclass_of: impl Fn(Oid) -> AggResult<ObjectClass>,
    container: &Container,
    peer_rank: u32,
    peer_idx: u32,
    map_version: u32,
    epoch_range: EpochRange,
    stripe_credit: usize,
    cancel: &CancelToken,
) -> AggResult<Status>
where
    V: Vos,
    P: PeerTransport,
    I: PoolIdentity,
{
    let handles = identity.pool_iv_srv_hdl_fetch()?;
    let ids = ContainerIds {
        pool_uuid: container.pool_uuid,
        pool_hdl_uuid: handles.pool_hdl_uuid,
        cont_uuid: container.cont_uuid,
        cont_hdl_uuid: handles.cont_hdl_uuid,
        map_version,
    };
    let peer_target = PeerTarget::for_peer_idx(peer_rank, peer_idx);
    let mut cache = CodecCache::new();

    // VOS iteration is a `&self` walk; to let the visitor later drive
    // `&mut vos` mutations in the commit paths, the extent list is
    // drained up front and processed as a second, independent pass.
    let mut entries = Vec::new();
    vos.iterate(epoch_range, &mut |entry| {
        entries.push(entry);
        Ok(())
    })?;

    let mut status = Status::default();
    let mut cursor: Option<ObjectCursor> = None;
    let mut credit = 0usize;

    for entry in entries {
        if is_parity_index(entry.extent.index) {
            log::error!(
                "oid {} dkey {} akey {}: parity-flagged extent surfaced in data iteration",
                entry.oid,
                entry.dkey,
                entry.akey
            );
            status
                .first_fatal
                .get_or_insert_with(|| "consistency violated: parity extent in data space".to_string());
            continue;
        }

        if cursor.as_ref().map(|c| c.ctx.oid) != Some(entry.oid) {
            if let Some(mut c) = cursor.take() {
                flush(&mut c, vos, peer, &ids, epoch_range, &mut status);
            }
            cursor = admit_object(entry.oid, vos, identity, remote, &oclass_of, &mut cache, peer_target, peer_idx, map_version, &mut status);
        }

        let Some(c) = cursor.as_mut() else { continue };
        if c.aborted {
            continue;
        }

        if c.key != (entry.dkey, entry.akey) {
            flush(c, vos, peer, &ids, epoch_range, &mut status);
            if c.aborted {
                continue;
            }
            c.key = (entry.dkey, entry.akey);
            c.stripe = StripeState::new(c.ctx.oclass, c.ctx.oclass.stripe_of(entry.extent.index));
        }

        let stripenum = c.ctx.oclass.stripe_of(entry.extent.index);
        if stripenum != c.stripe.stripenum() {
            let next = next_stripe_state(&c.stripe, stripenum);
            flush(c, vos, peer, &ids, epoch_range, &mut status);
            if c.aborted {
                continue;
            }
            c.stripe = next;
            credit += 1;
            if credit >= stripe_credit {
                credit = 0;
                if cancel.is_cancelled() {
                    log::debug!("aggregation cancelled after {} stripes", status.total_processed());
                    cursor = None;
                    return Ok(status);
                }
            }
        }
        c.stripe.push_extent(entry.extent);
    }

    if let Some(mut c) = cursor.take() {
        flush(&mut c, vos, peer, &ids, epoch_range, &mut status);
    }

    Ok(status)
}

/// Object-enter admission (§4.1 "Object enter"): filter by EC-coded and
/// local-leader, then by the pool's own leader check at `map_version`.
/// Returns `None` if the object should be skipped; extents for it are
/// then dropped by the main loop without creating a cursor.
#[allow(clippy::too_many_arguments)]
fn admit_object<'a, V, I>(
    oid: Oid,
    vos: &V,
    identity: &I,
    remote: &'a dyn ObjectRemote,
    oclass_of: &impl Fn(Oid) -> AggResult<ObjectClass>,
    cache: &mut CodecCache,
    peer_target: PeerTarget,
    peer_idx: u32,
    map_version: u32,
    status: &mut Status,
) -> Option<ObjectCursor<'a>>
where
    V: Vos,
    I: PoolIdentity,
{
    if !vos.is_ec_object(oid) || !vos.is_local_leader(oid) {
        status.skipped += 1;
        return None;
    }
    match identity.pool_check_leader(oid, map_version) {
        Ok(LeaderStatus::Leader) => {}
        Ok(LeaderStatus::NonLeader) => {
            status.skipped += 1;
            return None;
        }
        Err(e) => {
            log::warn!("oid {oid}: leader check failed: {e}");
            status.first_fatal.get_or_insert_with(|| e.to_string());
            return None;
        }
    }
    let oclass = match oclass_of(oid) {
        Ok(oc) => oc,
        Err(e) => {
            log::warn!("oid {oid}: object class lookup failed: {e}");
            status.first_fatal.get_or_insert_with(|| e.to_string());
            return None;
        }
    };
    let tables = cache.get(
        NonZeroUsize::new(oclass.k()).expect("k > 0"),
        NonZeroUsize::new(oclass.p()).expect("p > 0"),
    );
    Some(ObjectCursor {
        key: (0, 0),
        stripe: StripeState::new(oclass, 0),
        ctx: AggregationContext::new(oid, oclass, tables, peer_target, peer_idx, remote),
        aborted: false,
    })
}

/// Build the stripe state for `new_stripenum`, carrying over the tail of
/// `old` if one extent crossed the boundary and the new stripe is its
/// immediate successor; otherwise (a gap with no carried data) start
/// fresh (§3 invariant 1, §4.1 boundary detection).
fn next_stripe_state(old: &StripeState, new_stripenum: u64) -> StripeState {
    let stripe_end = old.stripe_end();
    let tail = old
        .extents()
        .last()
        .copied()
        .filter(|e| e.end() > stripe_end)
        .map(|e| crate::extent::Extent::new(stripe_end, e.end() - stripe_end, e.epoch, e.is_hole));
    let carried = old.carry_over(tail);
    if carried.stripenum() == new_stripenum {
        carried
    } else {
        StripeState::new(old.oclass(), new_stripenum)
    }
}

/// Flush `cursor`'s current stripe through the Parity Probe, Mode
/// Selector, and the chosen path, folding the outcome into `status`.
/// Non-recoverable errors mark the object as aborted so subsequent
/// extents for it are skipped (§4.9, §7).
fn flush<V, P>(
    cursor: &mut ObjectCursor,
    vos: &mut V,
    peer: &P,
    ids: &ContainerIds,
    epoch_range: EpochRange,
    status: &mut Status,
) where
    V: Vos,
    P: PeerTransport,
{
    if cursor.aborted || cursor.stripe.extents().is_empty() {
        return;
    }
    let oid = cursor.ctx.oid;
    let (dkey, akey) = cursor.key;
    let key = StripeKey { dkey, akey };
    let stripe = &cursor.stripe;
    let oclass = cursor.ctx.oclass;
    let parity_index = oclass.parity_index(stripe.stripenum());

    let probe = match vos.probe_parity(oid, dkey, akey, epoch_range, parity_index, oclass.len() as u64) {
        Ok(Some((epoch, index, count))) => ParityProbe::present(epoch, index, count),
        Ok(None) => ParityProbe::absent(),
        Err(e) => {
            log::warn!("oid {oid} stripe {}: parity probe failed: {e}", stripe.stripenum());
            status.abandoned += 1;
            return;
        }
    };

    let mode = mode::select(stripe, &probe);
    log::debug!("oid {oid} stripe {} mode {:?}", stripe.stripenum(), mode);

    let result = match mode {
        Mode::NoOp => {
            status.skipped += 1;
            return;
        }
        Mode::Encode => encode::run(&mut cursor.ctx, vos, peer, key, stripe, ids).map(|_| None),
        Mode::PartialUpdate => {
            partial_update::run(&mut cursor.ctx, vos, peer, key, stripe, &probe, ids).map(Some)
        }
        Mode::HoleRepair => hole_repair::run(&mut cursor.ctx, vos, peer, key, stripe, ids).map(|_| None),
    };

    match result {
        Ok(Some(PartialUpdateOutcome::Incremental)) => status.partial_updated += 1,
        Ok(Some(PartialUpdateOutcome::Recalc)) => status.recalculated += 1,
        Ok(None) if mode == Mode::Encode => status.encoded += 1,
        Ok(None) => status.hole_repaired += 1,
        Err(e) => {
            if e.is_stripe_recoverable() {
                log::warn!("oid {oid} stripe {}: abandoned: {e}", stripe.stripenum());
                status.abandoned += 1;
            } else {
                log::error!("oid {oid} stripe {}: aborting object: {e}", stripe.stripenum());
                status.first_fatal.get_or_insert_with(|| e.to_string());
                cursor.aborted = true;
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::identity::{MockIdentity, PoolProp};
    use crate::object_remote::mock::MockObjectRemote;
    use crate::rpc::transport::mock::MockPeerTransport;
    use crate::vos::MockVos;
    use std::num::NonZeroUsize;
    use std::sync::Mutex;

    fn nz(n: usize) -> NonZeroUsize {
        NonZeroUsize::new(n).unwrap()
    }

    fn container() -> Container {
        Container {
            pool_uuid: uuid::Uuid::nil(),
            cont_uuid: uuid::Uuid::nil(),
        }
    }

    #[test]
    fn encodes_a_full_stripe_end_to_end() {
        let oclass = ObjectClass::new(nz(2), nz(1), nz(4), nz(1));
        let mut vos = MockVos::new();
        vos.mark_ec_object(1, true);
        for i in 0..8u64 {
            vos.seed_extent(1, 0, 0, i, vec![(i + 1) as u8], 1, false);
        }
        let mut identity = MockIdentity::new(PoolProp::default());
        identity.set_leader(1);
        let remote = MockObjectRemote::new();
        let peer_vos = Arc::new(Mutex::new(MockVos::new()));
        let peer = MockPeerTransport::new(peer_vos);
        let cancel = CancelToken::new();

        let status = aggregate(
            &mut vos,
            &peer,
            &identity,
            &remote,
            |_oid| Ok(oclass),
            &container(),
            0,
            0,
            0,
            EpochRange::new(0, 10),
            1024,
            &cancel,
        )
        .unwrap();

        assert_eq!(status.encoded, 1);
        assert!(status.is_clean());
        let replicas = vos.obj_fetch(1, 0, 0, 1, 0, 8, 1).unwrap();
        assert_eq!(replicas, vec![0u8; 8]);
        let parity = vos.obj_fetch(1, 0, 0, 1, oclass.parity_index(0), 4, 1).unwrap();
        assert_ne!(parity, vec![0u8; 4]);
    }

    #[test]
    fn non_leader_object_is_skipped_without_mutation() {
        let oclass = ObjectClass::new(nz(2), nz(1), nz(4), nz(1));
        let mut vos = MockVos::new();
        vos.mark_ec_object(1, false); // not local leader
        for i in 0..8u64 {
            vos.seed_extent(1, 0, 0, i, vec![(i + 1) as u8], 1, false);
        }
        let identity = MockIdentity::new(PoolProp::default());
        let remote = MockObjectRemote::new();
        let peer_vos = Arc::new(Mutex::new(MockVos::new()));
        let peer = MockPeerTransport::new(peer_vos);
        let cancel = CancelToken::new();

        let status = aggregate(
            &mut vos,
            &peer,
            &identity,
            &remote,
            |_oid| Ok(oclass),
            &container(),
            0,
            0,
            0,
            EpochRange::new(0, 10),
            1024,
            &cancel,
        )
        .unwrap();

        assert_eq!(status.total_processed(), 0);
        assert_eq!(status.skipped, 0); // MockVos::iterate never surfaces non-leader extents
    }
}
