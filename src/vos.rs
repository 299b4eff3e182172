//! The local versioned object store: an external, interface-only
//! collaborator (§1 "Explicitly out of scope", §6 "Upstream interfaces").
//! This module only declares the shape the aggregation engine drives it
//! through, plus an in-memory double used by the test scenarios in §8.

use std::collections::BTreeMap;

use crate::extent::Extent;
use crate::AggResult;

pub type Oid = u64;
pub type DKey = u64;
pub type AKey = u64;

/// Inclusive epoch window a VOS operation is scoped to, mirroring the
/// `epoch_range_lo`/`epoch_range_hi` bounds threaded through `aggregate()`
/// (§6 "Public operation").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EpochRange {
    pub lo: u64,
    pub hi: u64,
}

impl EpochRange {
    pub fn new(lo: u64, hi: u64) -> Self {
        Self { lo, hi }
    }

    pub fn contains(&self, epoch: u64) -> bool {
        self.lo <= epoch && epoch <= self.hi
    }
}

/// One extent surfaced by [`Vos::iterate`], tagged with the object/dkey/akey
/// it belongs to so the Iteration Driver can detect key-level boundaries
/// (§4.1 "Dkey / Akey enter").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IterEntry {
    pub oid: Oid,
    pub dkey: DKey,
    pub akey: AKey,
    pub extent: Extent,
}

/// The subset of VOS operations aggregation needs (§6 "Upstream (consumed)
/// interfaces"): a recursive iterator over the object/dkey/akey/extent
/// hierarchy, a ranged fetch, a ranged update, and an epoch-scoped array
/// remove.
pub trait Vos {
    /// Whether `oid` is erasure-coded (vs. replicated) -- the first filter
    /// applied on object enter (§4.1).
    fn is_ec_object(&self, oid: Oid) -> bool;

    /// Whether the local target is the leader parity shard for `oid` at
    /// the pool's current map version -- the second filter on object enter.
    fn is_local_leader(&self, oid: Oid) -> bool;

    /// Walk every extent of every EC object in `epoch_range`, in
    /// `(oid, dkey, akey, index)` order, invoking `visitor` for each. An
    /// error returned by `visitor` aborts the walk and propagates.
    fn iterate(
        &self,
        epoch_range: EpochRange,
        visitor: &mut dyn FnMut(IterEntry) -> AggResult<()>,
    ) -> AggResult<()>;

    /// Fetch `count` consecutive records starting at `index`, as of
    /// `epoch`, returning `count * rsize` bytes.
    fn obj_fetch(
        &self,
        oid: Oid,
        dkey: DKey,
        akey: AKey,
        epoch: u64,
        index: u64,
        count: u64,
        rsize: usize,
    ) -> AggResult<Vec<u8>>;

    /// Write `data` (`data.len() / rsize` records) starting at `index`,
    /// under `epoch`.
    fn obj_update(
        &mut self,
        oid: Oid,
        dkey: DKey,
        akey: AKey,
        epoch: u64,
        index: u64,
        data: &[u8],
        rsize: usize,
    ) -> AggResult<()>;

    /// Remove `count` records starting at `index` across `epoch_range`
    /// (§4.4's "delete data extents ... across `[0, hi_epoch]`").
    fn obj_array_remove(
        &mut self,
        oid: Oid,
        dkey: DKey,
        akey: AKey,
        epoch_range: EpochRange,
        index: u64,
        count: u64,
    ) -> AggResult<()>;

    /// The Parity Probe (§4.2): a visibility-filtered range query over
    /// `[parity_index, parity_index+len)`. At most one extent can be
    /// present; returns `(epoch, index, count)` or `None` if absent.
    fn probe_parity(
        &self,
        oid: Oid,
        dkey: DKey,
        akey: AKey,
        epoch_range: EpochRange,
        parity_index: u64,
        len: u64,
    ) -> AggResult<Option<(u64, u64, u64)>>;
}

#[derive(Debug, Clone)]
struct Record {
    epoch: u64,
    is_hole: bool,
    bytes: Vec<u8>,
}

/// An in-memory [`Vos`] double: a per-`(oid, dkey, akey)` map from record
/// index to its most recent write, used by the test scenarios in §8 and by
/// `aggregate-run`'s standalone demo mode. Each record keeps only its
/// latest epoch -- good enough to drive the mode-selector/path tests,
/// which only care about the current extent list, not historical
/// versions.
#[derive(Debug, Default)]
pub struct MockVos {
    arrays: std::collections::HashMap<(Oid, DKey, AKey), BTreeMap<u64, Record>>,
    ec_objects: std::collections::HashSet<Oid>,
    leader_objects: std::collections::HashSet<Oid>,
}

impl MockVos {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_ec_object(&mut self, oid: Oid, is_leader: bool) {
        self.ec_objects.insert(oid);
        if is_leader {
            self.leader_objects.insert(oid);
        }
    }

    /// Seed a replica or parity extent directly, bypassing `obj_update`,
    /// for test setup convenience.
    pub fn seed_extent(
        &mut self,
        oid: Oid,
        dkey: DKey,
        akey: AKey,
        index: u64,
        bytes: Vec<u8>,
        epoch: u64,
        is_hole: bool,
    ) {
        let array = self.arrays.entry((oid, dkey, akey)).or_default();
        array.insert(
            index,
            Record {
                epoch,
                is_hole,
                bytes,
            },
        );
    }

    /// Group consecutive records sharing `(epoch, is_hole)` into extents,
    /// the way VOS coalesces contiguous same-epoch writes before handing
    /// them to an iterator.
    fn extents_for(&self, oid: Oid, dkey: DKey, akey: AKey, epoch_range: EpochRange, rsize: usize) -> Vec<Extent> {
        let Some(array) = self.arrays.get(&(oid, dkey, akey)) else {
            return Vec::new();
        };
        let mut extents = Vec::new();
        let mut current: Option<(u64, u64, u64, bool)> = None; // (start, count, epoch, is_hole)
        for (&index, rec) in array.iter() {
            if !epoch_range.contains(rec.epoch) {
                continue;
            }
            let record_count = (rec.bytes.len() / rsize.max(1)) as u64;
            match current {
                Some((start, count, epoch, is_hole))
                    if start + count == index && epoch == rec.epoch && is_hole == rec.is_hole =>
                {
                    current = Some((start, count + record_count, epoch, is_hole));
                }
                _ => {
                    if let Some((start, count, epoch, is_hole)) = current.take() {
                        extents.push(Extent::new(start, count, epoch, is_hole));
                    }
                    current = Some((index, record_count, rec.epoch, rec.is_hole));
                }
            }
        }
        if let Some((start, count, epoch, is_hole)) = current {
            extents.push(Extent::new(start, count, epoch, is_hole));
        }
        extents
    }
}

impl Vos for MockVos {
    fn is_ec_object(&self, oid: Oid) -> bool {
        self.ec_objects.contains(&oid)
    }

    fn is_local_leader(&self, oid: Oid) -> bool {
        self.leader_objects.contains(&oid)
    }

    fn iterate(
        &self,
        epoch_range: EpochRange,
        visitor: &mut dyn FnMut(IterEntry) -> AggResult<()>,
    ) -> AggResult<()> {
        let mut keys: Vec<_> = self.arrays.keys().copied().collect();
        keys.sort();
        for (oid, dkey, akey) in keys {
            if !self.is_ec_object(oid) || !self.is_local_leader(oid) {
                continue;
            }
            // rsize is not known to the store here; callers that need
            // byte-accurate fetch/update pass it explicitly. For
            // iteration purposes the mock treats every seeded record as
            // one logical unit already sized by the caller.
            for extent in self.extents_for(oid, dkey, akey, epoch_range, 1) {
                visitor(IterEntry {
                    oid,
                    dkey,
                    akey,
                    extent,
                })?;
            }
        }
        Ok(())
    }

    fn obj_fetch(
        &self,
        oid: Oid,
        dkey: DKey,
        akey: AKey,
        epoch: u64,
        index: u64,
        count: u64,
        rsize: usize,
    ) -> AggResult<Vec<u8>> {
        let array = self.arrays.get(&(oid, dkey, akey));
        let mut out = vec![0u8; (count as usize) * rsize];
        if let Some(array) = array {
            for (&rec_index, rec) in array.range(index..index + count) {
                if rec.epoch > epoch || rec.is_hole {
                    continue;
                }
                let offset = ((rec_index - index) as usize) * rsize;
                out[offset..offset + rec.bytes.len().min(rsize)]
                    .copy_from_slice(&rec.bytes[..rec.bytes.len().min(rsize)]);
            }
        }
        Ok(out)
    }

    fn obj_update(
        &mut self,
        oid: Oid,
        dkey: DKey,
        akey: AKey,
        epoch: u64,
        index: u64,
        data: &[u8],
        rsize: usize,
    ) -> AggResult<()> {
        let array = self.arrays.entry((oid, dkey, akey)).or_default();
        for (i, chunk) in data.chunks_exact(rsize).enumerate() {
            array.insert(
                index + i as u64,
                Record {
                    epoch,
                    is_hole: false,
                    bytes: chunk.to_vec(),
                },
            );
        }
        Ok(())
    }

    fn obj_array_remove(
        &mut self,
        oid: Oid,
        dkey: DKey,
        akey: AKey,
        epoch_range: EpochRange,
        index: u64,
        count: u64,
    ) -> AggResult<()> {
        if let Some(array) = self.arrays.get_mut(&(oid, dkey, akey)) {
            let to_remove: Vec<u64> = array
                .range(index..index + count)
                .filter(|(_, rec)| epoch_range.contains(rec.epoch))
                .map(|(&i, _)| i)
                .collect();
            for i in to_remove {
                array.remove(&i);
            }
        }
        Ok(())
    }

    fn probe_parity(
        &self,
        oid: Oid,
        dkey: DKey,
        akey: AKey,
        epoch_range: EpochRange,
        parity_index: u64,
        len: u64,
    ) -> AggResult<Option<(u64, u64, u64)>> {
        let Some(array) = self.arrays.get(&(oid, dkey, akey)) else {
            return Ok(None);
        };
        let mut epoch = None;
        let mut count = 0u64;
        for (_, rec) in array.range(parity_index..parity_index + len) {
            if !epoch_range.contains(rec.epoch) {
                continue;
            }
            count += 1;
            epoch = Some(epoch.map_or(rec.epoch, |e: u64| e.max(rec.epoch)));
        }
        Ok(epoch.map(|epoch| (epoch, parity_index, count)))
    }
}
