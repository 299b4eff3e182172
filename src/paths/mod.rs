//! The four per-stripe transforms the Mode Selector dispatches to (§4.4 -
//! §4.6): Encode, Partial-Update (incremental or recalc) and
//! Hole-Repair. Each path takes a flushed [`crate::stripe_state::StripeState`]
//! snapshot plus the probed parity result and returns once its local (and,
//! for `p>1`, peer) commit has landed -- or a stripe-level error that
//! leaves the stripe untouched (§4.9).

pub mod encode;
pub mod hole_repair;
pub mod partial_update;

use crate::oclass::ObjectClass;
use crate::stripe_state::StripeState;
use crate::vos::{DKey, AKey};

/// The `(dkey, akey)` a stripe belongs to; `oid` lives on
/// [`crate::context::AggregationContext`] since it is constant for the
/// whole object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StripeKey {
    pub dkey: DKey,
    pub akey: AKey,
}

/// The `[remove_start, remove_start+remove_count)` range a path's local
/// commit deletes, shared by Encode and both Partial-Update branches
/// (§4.4 step (c), §4.5 "Local commit: ... delete data extents in the
/// stripe's covered range", §8 "no data extent ... remains locally after
/// a non-hole processing path completes"). Open Question 3: this
/// extends into the carried-over prefix/suffix, reclaiming data written
/// under the neighboring stripe's flush -- preserved intentionally, see
/// DESIGN.md.
pub(crate) fn stripe_delete_range(oclass: ObjectClass, stripe: &StripeState) -> (u64, u64) {
    let remove_start = stripe.stripe_start().saturating_sub(stripe.prefix_ext());
    let remove_count = oclass.stripe_records() - stripe.prefix_ext() + stripe.suffix_ext();
    (remove_start, remove_count)
}
