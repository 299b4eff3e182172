//! Integration coverage for the six concrete scenarios enumerated by the
//! aggregation design: each drives `aggregate()` end-to-end against the
//! in-memory `MockVos`/`MockObjectRemote`/`MockPeerTransport` doubles
//! rather than exercising a single path function in isolation.

use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

use ec_agg::driver::{aggregate, CancelToken, Container};
use ec_agg::identity::{MockIdentity, PoolProp};
use ec_agg::object_remote::mock::MockObjectRemote;
use ec_agg::oclass::ObjectClass;
use ec_agg::rpc::transport::mock::MockPeerTransport;
use ec_agg::vos::{EpochRange, MockVos, Vos};

fn nz(n: usize) -> NonZeroUsize {
    NonZeroUsize::new(n).unwrap()
}

fn container() -> Container {
    Container {
        pool_uuid: uuid::Uuid::nil(),
        cont_uuid: uuid::Uuid::nil(),
    }
}

/// Scenario 1: `k=2, p=1, len=4, rsize=1`, a full replicated stripe with
/// no parity. Expect a single Encode, replicas removed.
#[test]
fn scenario_full_stripe_no_parity_encodes() {
    let oclass = ObjectClass::new(nz(2), nz(1), nz(4), nz(1));
    let mut vos = MockVos::new();
    vos.mark_ec_object(1, true);
    vos.seed_extent(1, 0, 0, 0, vec![1, 2, 3, 4], 1, false);
    vos.seed_extent(1, 0, 0, 4, vec![5, 6, 7, 8], 1, false);

    let mut identity = MockIdentity::new(PoolProp::default());
    identity.set_leader(1);
    let remote = MockObjectRemote::new();
    let peer = MockPeerTransport::new(Arc::new(Mutex::new(MockVos::new())));
    let cancel = CancelToken::new();

    let status = aggregate(
        &mut vos, &peer, &identity, &remote,
        |_| Ok(oclass), &container(), 0, 0, 0,
        EpochRange::new(0, 10), 1024, &cancel,
    )
    .unwrap();

    assert_eq!(status.encoded, 1);
    assert!(status.is_clean());
    assert_eq!(vos.obj_fetch(1, 0, 0, 1, 0, 8, 1).unwrap(), vec![0u8; 8]);
    let parity = vos.obj_fetch(1, 0, 0, 1, oclass.parity_index(0), 4, 1).unwrap();
    assert_ne!(parity, vec![0u8; 4]);
}

/// Scenario 2: `k=4, p=1, len=2, rsize=1`, parity present at e1; new
/// replicas at e2 wholly supersede 3 of the 4 cells, leaving the 4th at
/// its original epoch. A strict majority of full cells (`3 > 4/2`) takes
/// the recalc branch, pulling the one still-old cell through the
/// object-remote path rather than the local replica.
#[test]
fn scenario_overlapping_replica_recalcs_parity() {
    let oclass = ObjectClass::new(nz(4), nz(1), nz(2), nz(1));
    let mut vos = MockVos::new();
    vos.mark_ec_object(1, true);
    for i in 0..8u64 {
        vos.seed_extent(1, 0, 0, i, vec![(i + 1) as u8], 1, false);
    }
    let original: Vec<ec_agg::ec::Cell> = vec![
        ec_agg::ec::Cell::from(vec![1u8, 2]),
        ec_agg::ec::Cell::from(vec![3u8, 4]),
        ec_agg::ec::Cell::from(vec![5u8, 6]),
        ec_agg::ec::Cell::from(vec![7u8, 8]),
    ];
    let mut cache = ec_agg::ec::CodecCache::new();
    let tables = cache.get(nz(4), nz(1));
    let mut parity = ec_agg::ec::Cell::zero_n(1, 2);
    ec_agg::ec::encode(&tables, 2, &original, &mut parity).unwrap();
    vos.seed_extent(1, 0, 0, oclass.parity_index(0), parity[0].as_ref().to_vec(), 1, false);

    // e2 replaces records [0..6) -- cells 0, 1, 2 -- leaving cell 3's
    // original [6..8) replica as the only surviving non-local source.
    for (i, b) in [9u8, 10, 11, 12, 13, 14].into_iter().enumerate() {
        vos.seed_extent(1, 0, 0, i as u64, vec![b], 2, false);
    }

    let mut identity = MockIdentity::new(PoolProp::default());
    identity.set_leader(1);
    let remote = MockObjectRemote::new();
    remote.seed(1, 0, 0, 6, vec![7], 1);
    remote.seed(1, 0, 0, 7, vec![8], 1);
    let peer = MockPeerTransport::new(Arc::new(Mutex::new(MockVos::new())));
    let cancel = CancelToken::new();

    let status = aggregate(
        &mut vos, &peer, &identity, &remote,
        |_| Ok(oclass), &container(), 0, 0, 0,
        EpochRange::new(0, 10), 1024, &cancel,
    )
    .unwrap();

    assert_eq!(status.recalculated, 1);
    let new_parity = vos.obj_fetch(1, 0, 0, 2, oclass.parity_index(0), 2, 1).unwrap();

    let expect_data = vec![
        ec_agg::ec::Cell::from(vec![9u8, 10]),
        ec_agg::ec::Cell::from(vec![11u8, 12]),
        ec_agg::ec::Cell::from(vec![13u8, 14]),
        ec_agg::ec::Cell::from(vec![7u8, 8]),
    ];
    let mut expect_parity = ec_agg::ec::Cell::zero_n(1, 2);
    ec_agg::ec::encode(&tables, 2, &expect_data, &mut expect_parity).unwrap();
    assert_eq!(new_parity, expect_parity[0].as_ref());

    // the superseded data extents are gone; cell 3's original replica is
    // reclaimed too (Open Question 3: recalc's commit deletes the whole
    // covered range, not just the cells it actually touched).
    assert_eq!(vos.obj_fetch(1, 0, 0, 2, 0, 8, 1).unwrap(), vec![0u8; 8]);
}

/// Scenario 3: `k=4, p=2, len=4`, one cell overwritten -- incremental
/// update, both leader and peer parity cells land at the new epoch.
#[test]
fn scenario_single_cell_overwrite_updates_incrementally() {
    let oclass = ObjectClass::new(nz(4), nz(2), nz(4), nz(1));
    let mut vos = MockVos::new();
    vos.mark_ec_object(1, true);
    let mut cache = ec_agg::ec::CodecCache::new();
    let tables = cache.get(nz(4), nz(2));

    let original: Vec<Vec<u8>> = (0..4).map(|c| (0..4).map(|i| (c * 10 + i) as u8).collect()).collect();
    for (c, cell) in original.iter().enumerate() {
        for (i, &b) in cell.iter().enumerate() {
            vos.seed_extent(1, 0, 0, (c * 4 + i) as u64, vec![b], 1, false);
        }
    }
    let data_cells: Vec<ec_agg::ec::Cell> = original.iter().map(|c| ec_agg::ec::Cell::from(c.clone())).collect();
    let mut parity_cells = ec_agg::ec::Cell::zero_n(2, 4);
    ec_agg::ec::encode(&tables, 4, &data_cells, &mut parity_cells).unwrap();
    vos.seed_extent(1, 0, 0, oclass.parity_index(0), parity_cells[0].as_ref().to_vec(), 1, false);

    let peer_vos = Arc::new(Mutex::new(MockVos::new()));
    peer_vos.lock().unwrap().mark_ec_object(1, false);
    peer_vos.lock().unwrap().seed_extent(1, 0, 0, oclass.parity_index(0), parity_cells[1].as_ref().to_vec(), 1, false);
    let peer = MockPeerTransport::new(peer_vos.clone());

    for (i, &b) in [99u8, 98, 97, 96].iter().enumerate() {
        vos.seed_extent(1, 0, 0, i as u64, vec![b], 2, false);
    }

    let mut identity = MockIdentity::new(PoolProp::default());
    identity.set_leader(1);
    let remote = MockObjectRemote::new();
    let cancel = CancelToken::new();

    let status = aggregate(
        &mut vos, &peer, &identity, &remote,
        |_| Ok(oclass), &container(), 0, 0, 0,
        EpochRange::new(0, 10), 1024, &cancel,
    )
    .unwrap();

    assert_eq!(status.partial_updated, 1);
    let leader_parity = vos.obj_fetch(1, 0, 0, 2, oclass.parity_index(0), 4, 1).unwrap();
    let peer_parity = peer_vos.lock().unwrap().obj_fetch(1, 0, 0, 2, oclass.parity_index(0), 4, 1).unwrap();

    let mut expect_data = original.clone();
    expect_data[0] = vec![99, 98, 97, 96];
    let expect_cells: Vec<ec_agg::ec::Cell> = expect_data.iter().map(|c| ec_agg::ec::Cell::from(c.clone())).collect();
    let mut expect_parity = ec_agg::ec::Cell::zero_n(2, 4);
    ec_agg::ec::encode(&tables, 4, &expect_cells, &mut expect_parity).unwrap();
    assert_eq!(leader_parity, expect_parity[0].as_ref());
    assert_eq!(peer_parity, expect_parity[1].as_ref());
}

/// Scenario 4: a hole in the stripe's second cell -- surviving data is
/// shipped to the peer and written locally, parity is dropped.
#[test]
fn scenario_hole_triggers_repair() {
    let oclass = ObjectClass::new(nz(2), nz(1), nz(2), nz(1));
    let mut vos = MockVos::new();
    vos.mark_ec_object(1, true);
    vos.seed_extent(1, 0, 0, 0, vec![1], 2, false);
    vos.seed_extent(1, 0, 0, 1, vec![2], 2, false);
    vos.seed_extent(1, 0, 0, 2, vec![0], 3, true);
    vos.seed_extent(1, 0, 0, 3, vec![0], 3, true);
    vos.seed_extent(1, 0, 0, oclass.parity_index(0), vec![9, 9], 1, false);

    let remote = MockObjectRemote::new();
    remote.seed(1, 0, 0, 0, vec![1], 2);
    remote.seed(1, 0, 0, 1, vec![2], 2);

    let mut identity = MockIdentity::new(PoolProp::default());
    identity.set_leader(1);
    let peer_vos = Arc::new(Mutex::new(MockVos::new()));
    let peer = MockPeerTransport::new(peer_vos.clone());
    let cancel = CancelToken::new();

    let status = aggregate(
        &mut vos, &peer, &identity, &remote,
        |_| Ok(oclass), &container(), 0, 0, 0,
        EpochRange::new(0, 10), 1024, &cancel,
    )
    .unwrap();

    assert_eq!(status.hole_repaired, 1);
    assert_eq!(vos.obj_fetch(1, 0, 0, 3, 0, 2, 1).unwrap(), vec![1, 2]);
    assert_eq!(vos.obj_fetch(1, 0, 0, 3, oclass.parity_index(0), 2, 1).unwrap(), vec![0u8; 2]);
    assert_eq!(peer_vos.lock().unwrap().obj_fetch(1, 0, 0, 3, 0, 2, 1).unwrap(), vec![1, 2]);
}

/// Scenario 5: parity already newer than every replica -- no-op, no
/// writes observed on either side.
#[test]
fn scenario_fresh_parity_is_noop() {
    let oclass = ObjectClass::new(nz(2), nz(1), nz(4), nz(1));
    let mut vos = MockVos::new();
    vos.mark_ec_object(1, true);
    for i in 0..8u64 {
        vos.seed_extent(1, 0, 0, i, vec![(i + 1) as u8], 1, false);
    }
    vos.seed_extent(1, 0, 0, oclass.parity_index(0), vec![9, 9, 9, 9], 5, false);

    let mut identity = MockIdentity::new(PoolProp::default());
    identity.set_leader(1);
    let remote = MockObjectRemote::new();
    let peer = MockPeerTransport::new(Arc::new(Mutex::new(MockVos::new())));
    let cancel = CancelToken::new();

    let status = aggregate(
        &mut vos, &peer, &identity, &remote,
        |_| Ok(oclass), &container(), 0, 0, 0,
        EpochRange::new(0, 10), 1024, &cancel,
    )
    .unwrap();

    assert_eq!(status.total_processed(), 0);
    assert_eq!(status.skipped, 1);
    assert_eq!(vos.obj_fetch(1, 0, 0, 5, oclass.parity_index(0), 4, 1).unwrap(), vec![9, 9, 9, 9]);
}

/// Scenario 6: the local target is not the leader for this object -- no
/// callbacks at all, nothing processed.
#[test]
fn scenario_non_leader_object_is_skipped() {
    let oclass = ObjectClass::new(nz(2), nz(1), nz(4), nz(1));
    let mut vos = MockVos::new();
    vos.mark_ec_object(1, false);
    for i in 0..8u64 {
        vos.seed_extent(1, 0, 0, i, vec![(i + 1) as u8], 1, false);
    }

    let identity = MockIdentity::new(PoolProp::default());
    let remote = MockObjectRemote::new();
    let peer = MockPeerTransport::new(Arc::new(Mutex::new(MockVos::new())));
    let cancel = CancelToken::new();

    let status = aggregate(
        &mut vos, &peer, &identity, &remote,
        |_| Ok(oclass), &container(), 0, 0, 0,
        EpochRange::new(0, 10), 1024, &cancel,
    )
    .unwrap();

    assert_eq!(status.total_processed(), 0);
    assert_eq!(vos.obj_fetch(1, 0, 0, 1, 0, 8, 1).unwrap(), vec![1, 2, 3, 4, 5, 6, 7, 8]);
}
