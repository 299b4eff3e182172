//! The per-stripe decision tree choosing which path to run (§4.3 "Mode
//! Selector").

use crate::parity_probe::ParityProbe;
use crate::stripe_state::StripeState;

/// The transform chosen for a flushed stripe. The choice between
/// incremental update and full recalc inside `PartialUpdate` is made by
/// the partial-update path itself, from the stripe's cell occupancy (§4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Parity already covers every extent in the stripe; nothing to do.
    NoOp,
    /// The stripe is a full, hole-free replica set and parity is absent or
    /// strictly older than every extent; encode parity from scratch.
    Encode,
    /// Parity is present but older than some extents, and the stripe has
    /// no holes; update parity incrementally or recalc, per §4.5.
    PartialUpdate,
    /// The stripe contains at least one hole extent; re-replicate around
    /// it instead of maintaining parity for the gap.
    HoleRepair,
}

/// Select the transform for `state` given the probed parity extent
/// `probe`, following the decision tree of §4.3 in order.
pub fn select(state: &StripeState, probe: &ParityProbe) -> Mode {
    if let Some(p_epoch) = probe.epoch() {
        if p_epoch >= state.hi_epoch() {
            return Mode::NoOp;
        }
    }

    let fully_replicated_no_holes =
        probe.is_absent() && state.is_full() && !state.has_holes();
    let every_extent_newer_than_parity = state.is_full()
        && probe
            .epoch()
            .map(|p_epoch| state.extents().iter().all(|e| e.epoch > p_epoch))
            .unwrap_or(false);
    if fully_replicated_no_holes || every_extent_newer_than_parity {
        return Mode::Encode;
    }

    if probe.is_absent() {
        // Not enough data to form parity yet; carry-over only (§4.3.3).
        return Mode::NoOp;
    }

    if state.has_holes() {
        return Mode::HoleRepair;
    }

    Mode::PartialUpdate
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::extent::Extent;
    use crate::oclass::ObjectClass;
    use std::num::NonZeroUsize;

    fn nz(n: usize) -> NonZeroUsize {
        NonZeroUsize::new(n).unwrap()
    }

    fn oc() -> ObjectClass {
        ObjectClass::new(nz(2), nz(1), nz(4), nz(1))
    }

    #[test]
    fn parity_covers_everything_is_noop() {
        let oc = oc();
        let mut s = StripeState::new(oc, 0);
        s.push_extent(Extent::new(0, 8, 1, false));
        let probe = ParityProbe::present(5, 0, 4);
        assert_eq!(select(&s, &probe), Mode::NoOp);
    }

    #[test]
    fn full_fresh_replica_no_parity_is_encode() {
        let oc = oc();
        let mut s = StripeState::new(oc, 0);
        s.push_extent(Extent::new(0, 4, 1, false));
        s.push_extent(Extent::new(4, 4, 1, false));
        let probe = ParityProbe::absent();
        assert_eq!(select(&s, &probe), Mode::Encode);
    }

    #[test]
    fn full_replica_all_newer_than_stale_parity_is_encode() {
        let oc = oc();
        let mut s = StripeState::new(oc, 0);
        s.push_extent(Extent::new(0, 4, 2, false));
        s.push_extent(Extent::new(4, 4, 2, false));
        let probe = ParityProbe::present(1, 0, 4);
        assert_eq!(select(&s, &probe), Mode::Encode);
    }

    #[test]
    fn partial_replica_no_parity_is_noop() {
        let oc = oc();
        let mut s = StripeState::new(oc, 0);
        s.push_extent(Extent::new(0, 4, 1, false));
        let probe = ParityProbe::absent();
        assert_eq!(select(&s, &probe), Mode::NoOp);
    }

    #[test]
    fn stripe_with_hole_is_hole_repair() {
        let oc = oc();
        let mut s = StripeState::new(oc, 0);
        s.push_extent(Extent::new(0, 4, 2, false));
        s.push_extent(Extent::new(4, 4, 3, true));
        let probe = ParityProbe::present(1, 0, 4);
        assert_eq!(select(&s, &probe), Mode::HoleRepair);
    }

    #[test]
    fn newer_partial_overlap_is_partial_update() {
        let oc = oc();
        let mut s = StripeState::new(oc, 0);
        s.push_extent(Extent::new(2, 4, 2, false));
        let probe = ParityProbe::present(1, 0, 4);
        assert_eq!(select(&s, &probe), Mode::PartialUpdate);
    }
}
