//! `aggregate-peerd`: the peer-side daemon draining `EC_AGGREGATE` /
//! `EC_REPLICATE` / `EC_FETCH_PARITY` requests from its redis request
//! queue and applying them to its own mock VOS -- the receiver side of
//! `stripe-update`'s `worker::work()` triad, reduced to a single blocking
//! loop since there is no CPU-bound work to farm out on this side (§10
//! "CLI / demo binaries").

use std::path::PathBuf;

use clap::Parser;
use ec_agg::rpc::peer_receiver::{handle_ec_aggregate, handle_ec_fetch_parity, handle_ec_replicate};
use ec_agg::rpc::redis_transport::{request_queue_key, response_queue_key, Envelope, EnvelopeResponse};
use ec_agg::vos::MockVos;
use redis::Commands;

#[derive(Debug, Parser)]
#[command(name = "aggregate-peerd")]
struct Cli {
    /// configuration file in toml format
    #[arg(short, long)]
    config: PathBuf,
}

fn main() {
    env_logger::init();
    let args = Cli::parse();
    if let Err(e) = ec_agg::config::init_config(&args.config) {
        panic!("FATAL ERROR loading config: {e}");
    }

    let client = redis::Client::open(ec_agg::config::redis_url())
        .unwrap_or_else(|e| panic!("FATAL ERROR connecting to redis: {e}"));
    let mut conn = client
        .get_connection()
        .unwrap_or_else(|e| panic!("FATAL ERROR opening redis connection: {e}"));

    let target = ec_agg::rpc::PeerTarget::for_peer_idx(
        ec_agg::config::peer_rank() as u32,
        ec_agg::config::peer_idx() as u32,
    );
    let request_key = request_queue_key(target);

    let mut vos = MockVos::new();
    log::info!("aggregate-peerd listening on {request_key}");

    loop {
        let value: redis::Value = match conn.blpop(&request_key, 0_f64) {
            Ok(v) => v,
            Err(e) => {
                log::error!("redis blpop failed: {e}");
                continue;
            }
        };
        let redis::Value::Bulk(items) = value else {
            log::warn!("malformed redis request envelope, skipping");
            continue;
        };
        let Some(redis::Value::Data(bytes)) = items.get(1) else {
            log::warn!("empty redis request payload, skipping");
            continue;
        };
        let envelope: Envelope = match bincode::deserialize(bytes) {
            Ok(e) => e,
            Err(e) => {
                log::warn!("failed to decode request envelope: {e}");
                continue;
            }
        };

        let (task, response, response_key) = match envelope {
            Envelope::Aggregate(task, req) => {
                (task, EnvelopeResponse::Aggregate(handle_ec_aggregate(&mut vos, &req)), response_queue_key(target, task))
            }
            Envelope::Replicate(task, req) => {
                (task, EnvelopeResponse::Replicate(handle_ec_replicate(&mut vos, &req)), response_queue_key(target, task))
            }
            Envelope::FetchParity(task, req) => {
                (task, EnvelopeResponse::FetchParity(handle_ec_fetch_parity(&vos, &req)), response_queue_key(target, task))
            }
        };
        log::debug!("handled request {task}");

        let bin = match bincode::serialize(&response) {
            Ok(b) => b,
            Err(e) => {
                log::error!("failed to encode response envelope: {e}");
                continue;
            }
        };
        if let Err(e) = conn.rpush::<_, _, ()>(&response_key, bin) {
            log::error!("failed to push response: {e}");
        }
    }
}
