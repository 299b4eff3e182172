use std::sync::OnceLock;

use crate::AggError;

/// Static aggregation configuration, loaded once from a TOML file by
/// `aggregate-run`/`aggregate-peerd`. `aggregate()` itself never reads this
/// table directly -- it is threaded in by the caller as `ObjectClass` /
/// `AggregationConfig` values -- this module only backs the demo binaries.
#[derive(serde::Deserialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
struct Config {
    ec_k: usize,
    ec_p: usize,
    ec_len: usize,
    ec_rsize: usize,
    /// Stripes processed per credit window before the iteration driver
    /// checks for cancellation (see §6 Credit / batching; suggested 1024).
    #[serde(default = "default_stripe_credit")]
    stripe_credit: usize,
    peer_rank: usize,
    peer_idx: usize,
    redis_url: String,
    local_vos_root: std::path::PathBuf,
    #[serde(default = "uuid::Uuid::nil")]
    pool_uuid: uuid::Uuid,
    #[serde(default = "uuid::Uuid::nil")]
    cont_uuid: uuid::Uuid,
    #[serde(default)]
    map_version: u32,
}

fn default_stripe_credit() -> usize {
    1024
}

static CONFIG: OnceLock<Config> = OnceLock::new();

pub fn init_config(config_file: &std::path::Path) -> crate::AggResult<()> {
    let text = std::fs::read_to_string(config_file)?;
    let config: Config = toml::from_str(&text).map_err(AggError::invalid_arg)?;
    CONFIG
        .set(config)
        .map_err(|_| ())
        .expect("initialize config more than once");
    Ok(())
}

fn get_config() -> &'static Config {
    CONFIG.get().expect("config not initialized")
}

pub fn ec_k() -> usize {
    get_config().ec_k
}

pub fn ec_p() -> usize {
    get_config().ec_p
}

pub fn ec_len() -> usize {
    get_config().ec_len
}

pub fn ec_rsize() -> usize {
    get_config().ec_rsize
}

pub fn stripe_credit() -> usize {
    get_config().stripe_credit
}

pub fn peer_rank() -> usize {
    get_config().peer_rank
}

pub fn peer_idx() -> usize {
    get_config().peer_idx
}

pub fn redis_url() -> &'static str {
    &get_config().redis_url
}

pub fn local_vos_root() -> &'static std::path::Path {
    &get_config().local_vos_root
}

pub fn pool_uuid() -> uuid::Uuid {
    get_config().pool_uuid
}

pub fn cont_uuid() -> uuid::Uuid {
    get_config().cont_uuid
}

pub fn map_version() -> u32 {
    get_config().map_version
}
