//! The remote object-read path used by Hole-Repair to gather non-local
//! data (§4.6, §6 "Object-remote"). Per §9's design note on dynamic
//! dispatch, this is exposed as a small capability object with two
//! operations rather than a full client.

use crate::vos::{AKey, DKey, Oid};
use crate::AggResult;

/// One shard's placement within an object's layout, as returned by
/// [`ObjectRemote::layout`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShardLocation {
    pub rank: u32,
    pub tag: u32,
}

/// A handle to an object opened for remote reads, reused across stripes
/// within the owning object context (§5 "Shared resources": "lazily
/// opened and reused").
pub trait ObjectHandle {
    /// Fetch `count` records of `(dkey, akey)` starting at `index`, as of
    /// `epoch`, from wherever the shard holding them actually lives.
    fn fetch(
        &self,
        dkey: DKey,
        akey: AKey,
        epoch: u64,
        index: u64,
        count: u64,
        rsize: usize,
    ) -> AggResult<Vec<u8>>;

    /// The shard layout of the object this handle was opened against.
    fn layout(&self) -> Vec<ShardLocation>;
}

/// Opens [`ObjectHandle`]s for a given object id. The real collaborator
/// resolves this through the cluster map; here it is interface-only (§1
/// "Explicitly out of scope").
pub trait ObjectRemote {
    fn obj_open(&self, oid: Oid) -> AggResult<Box<dyn ObjectHandle>>;
}

/// An in-memory [`ObjectRemote`]/[`ObjectHandle`] double for the
/// Hole-Repair scenario tests: fetches are served from a caller-seeded
/// record table rather than an actual remote shard.
pub mod mock {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Clone)]
    struct Record {
        epoch: u64,
        bytes: Vec<u8>,
    }

    #[derive(Debug, Default)]
    struct Store {
        arrays: std::collections::HashMap<(Oid, DKey, AKey), BTreeMap<u64, Record>>,
        layouts: std::collections::HashMap<Oid, Vec<ShardLocation>>,
    }

    #[derive(Debug, Clone, Default)]
    pub struct MockObjectRemote(Arc<Mutex<Store>>);

    impl MockObjectRemote {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn seed(&self, oid: Oid, dkey: DKey, akey: AKey, index: u64, bytes: Vec<u8>, epoch: u64) {
            let mut store = self.0.lock().expect("mock store poisoned");
            store
                .arrays
                .entry((oid, dkey, akey))
                .or_default()
                .insert(index, Record { epoch, bytes });
        }

        pub fn set_layout(&self, oid: Oid, layout: Vec<ShardLocation>) {
            self.0.lock().expect("mock store poisoned").layouts.insert(oid, layout);
        }
    }

    impl ObjectRemote for MockObjectRemote {
        fn obj_open(&self, oid: Oid) -> AggResult<Box<dyn ObjectHandle>> {
            Ok(Box::new(MockHandle {
                oid,
                store: self.0.clone(),
            }))
        }
    }

    struct MockHandle {
        oid: Oid,
        store: Arc<Mutex<Store>>,
    }

    impl ObjectHandle for MockHandle {
        fn fetch(
            &self,
            dkey: DKey,
            akey: AKey,
            epoch: u64,
            index: u64,
            count: u64,
            rsize: usize,
        ) -> AggResult<Vec<u8>> {
            let store = self.store.lock().expect("mock store poisoned");
            let mut out = vec![0u8; (count as usize) * rsize];
            if let Some(array) = store.arrays.get(&(self.oid, dkey, akey)) {
                for (&rec_index, rec) in array.range(index..index + count) {
                    if rec.epoch > epoch {
                        continue;
                    }
                    let offset = ((rec_index - index) as usize) * rsize;
                    out[offset..offset + rec.bytes.len().min(rsize)]
                        .copy_from_slice(&rec.bytes[..rec.bytes.len().min(rsize)]);
                }
            }
            Ok(out)
        }

        fn layout(&self) -> Vec<ShardLocation> {
            self.store
                .lock()
                .expect("mock store poisoned")
                .layouts
                .get(&self.oid)
                .cloned()
                .unwrap_or_default()
        }
    }
}

#[cfg(test)]
mod test {
    use super::mock::MockObjectRemote;
    use super::*;

    #[test]
    fn fetch_sees_only_visible_epochs() {
        let remote = MockObjectRemote::new();
        remote.seed(1, 0, 0, 0, vec![7], 4);
        let handle = (&remote as &dyn ObjectRemote).obj_open(1).unwrap();
        assert_eq!(handle.fetch(0, 0, 2, 0, 1, 1).unwrap(), vec![0]);
        assert_eq!(handle.fetch(0, 0, 4, 0, 1, 1).unwrap(), vec![7]);
    }
}
