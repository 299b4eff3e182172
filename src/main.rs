//! `aggregate-run`: the leader-side demo binary. Loads a config, opens a
//! local mock VOS seeded with synthetic replica data, and drives
//! `aggregate()` against a peer reachable over the redis-backed RPC
//! transport (§10 "CLI / demo binaries").

use std::num::NonZeroUsize;
use std::path::PathBuf;

use clap::Parser;
use ec_agg::config;
use ec_agg::driver::{self, CancelToken, Container};
use ec_agg::identity::{MockIdentity, PoolProp};
use ec_agg::object_remote::mock::MockObjectRemote;
use ec_agg::oclass::ObjectClass;
use ec_agg::rpc::RedisTransport;
use ec_agg::vos::{EpochRange, MockVos};

#[derive(Debug, Parser)]
#[command(name = "aggregate-run")]
struct Cli {
    /// configuration file in toml format
    #[arg(short, long)]
    config: PathBuf,
    /// object id to aggregate (demo data is seeded under it)
    #[arg(short, long, default_value_t = 1)]
    oid: u64,
    /// number of demo stripes to seed before running
    #[arg(short, long, default_value_t = 4)]
    stripes: u64,
}

fn main() {
    env_logger::init();
    let args = Cli::parse();
    if let Err(e) = config::init_config(&args.config) {
        panic!("FATAL ERROR loading config: {e}");
    }

    let oclass = ObjectClass::new(
        NonZeroUsize::new(config::ec_k()).expect("ec_k must be nonzero"),
        NonZeroUsize::new(config::ec_p()).expect("ec_p must be nonzero"),
        NonZeroUsize::new(config::ec_len()).expect("ec_len must be nonzero"),
        NonZeroUsize::new(config::ec_rsize()).expect("ec_rsize must be nonzero"),
    );

    log::info!("local vos root configured at {}", config::local_vos_root().display());
    let mut vos = MockVos::new();
    seed_demo_stripes(&mut vos, args.oid, oclass, args.stripes);

    let mut identity = MockIdentity::new(PoolProp {
        ec_cell_len: oclass.cell_bytes(),
    });
    identity.set_leader(args.oid);

    let remote = MockObjectRemote::new();
    let peer = RedisTransport::connect(config::redis_url()).unwrap_or_else(|e| panic!("FATAL ERROR connecting to peer: {e}"));
    let cancel = CancelToken::new();

    let bar = indicatif::ProgressBar::new(args.stripes);
    bar.set_style(
        indicatif::ProgressStyle::with_template("{spinner} [{elapsed_precise}] stripes processed: {pos}/{len}")
            .expect("valid progress template"),
    );

    let status = driver::aggregate(
        &mut vos,
        &peer,
        &identity,
        &remote,
        |_oid| Ok(oclass),
        &Container {
            pool_uuid: config::pool_uuid(),
            cont_uuid: config::cont_uuid(),
        },
        config::peer_rank() as u32,
        config::peer_idx() as u32,
        config::map_version(),
        EpochRange::new(0, u64::MAX),
        config::stripe_credit(),
        &cancel,
    )
    .unwrap_or_else(|e| panic!("FATAL ERROR running aggregation: {e}"));

    bar.finish_and_clear();
    log::info!(
        "encoded={} partial_updated={} recalculated={} hole_repaired={} skipped={} abandoned={}",
        status.encoded,
        status.partial_updated,
        status.recalculated,
        status.hole_repaired,
        status.skipped,
        status.abandoned,
    );
    let stripe_bytes = oclass.stripe_bytes() as u64 * status.total_processed();
    println!(
        "processed {} stripes, {} of replica data folded into parity",
        status.total_processed(),
        bytesize::ByteSize::b(stripe_bytes),
    );
    if let Some(err) = &status.first_fatal {
        eprintln!("aggregation aborted an object: {err}");
    }
}

/// Seed `count` full, parity-free stripes of replica data for `oid`, so a
/// fresh run of `aggregate-run` has something to encode.
fn seed_demo_stripes(vos: &mut MockVos, oid: u64, oclass: ObjectClass, count: u64) {
    vos.mark_ec_object(oid, true);
    let stripe_records = oclass.stripe_records();
    for stripenum in 0..count {
        let base = stripenum * stripe_records;
        for i in 0..stripe_records {
            let byte = ((stripenum * stripe_records + i) % 256) as u8;
            vos.seed_extent(oid, 0, 0, base + i, vec![byte; oclass.rsize()], 1, false);
        }
    }
}
