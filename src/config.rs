//! Runtime configuration loading from environment variables.
//!
//! All configuration values are loaded from `TENSOR_VAULT_*` environment
//! variables with sensible defaults. Invalid values fall back to defaults
//! without crashing.
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |---|---|---|
//! | `TENSOR_VAULT_BIND` | 127.0.0.1 | Listen address |
//! | `TENSOR_VAULT_PORT` | 9997 | Listen port |
//! | `TENSOR_VAULT_MODEL_DIR` | models | Directory for sealed partitions |
//! | `TENSOR_VAULT_CACHE_MODE` | resident | `resident` or `durable` |
//! | `TENSOR_VAULT_FRAME_LIMIT` | 268435456 | Max request frame size (bytes) |
//! | `TENSOR_VAULT_LOG_FORMAT` | pretty | `pretty` or `json` |

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;

/// Whether decrypted partitions stay in memory between requests or are
/// re-opened from sealed files on every inference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheMode {
    /// Decrypt once at registration; inference needs no tags.
    Resident,
    /// Keep only ciphertext on disk; every inference re-authenticates.
    Durable,
}

/// All runtime configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct EnvConfig {
    pub bind: IpAddr,
    pub port: u16,
    pub model_dir: PathBuf,
    pub cache_mode: CacheMode,
    pub frame_limit: usize,
    pub log_json: bool,
}

impl EnvConfig {
    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.port)
    }
}

/// Parse a `usize` env var, returning `default` on missing or invalid.
fn parse_usize(key: &str, default: usize) -> usize {
    match std::env::var(key) {
        Ok(val) => val.parse::<usize>().unwrap_or(default),
        Err(_) => default,
    }
}

/// Parse a `u16` env var, returning `default` on missing or invalid.
fn parse_u16(key: &str, default: u16) -> u16 {
    match std::env::var(key) {
        Ok(val) => val.parse::<u16>().unwrap_or(default),
        Err(_) => default,
    }
}

fn parse_bind(key: &str, default: IpAddr) -> IpAddr {
    match std::env::var(key) {
        Ok(val) => val.parse::<IpAddr>().unwrap_or(default),
        Err(_) => default,
    }
}

fn parse_cache_mode(key: &str) -> CacheMode {
    match std::env::var(key).as_deref() {
        Ok("durable") => CacheMode::Durable,
        _ => CacheMode::Resident,
    }
}

/// Load all configuration from environment variables.
///
/// Missing or invalid values fall back to safe defaults without panicking.
pub fn load() -> EnvConfig {
    const DEFAULT_FRAME: usize = 256 * 1024 * 1024;
    const MIN_FRAME: usize = 4096;

    let frame_limit = parse_usize("TENSOR_VAULT_FRAME_LIMIT", DEFAULT_FRAME).max(MIN_FRAME);
    let log_json = matches!(
        std::env::var("TENSOR_VAULT_LOG_FORMAT").as_deref(),
        Ok("json")
    );

    EnvConfig {
        bind: parse_bind(
            "TENSOR_VAULT_BIND",
            IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)),
        ),
        port: parse_u16("TENSOR_VAULT_PORT", 9997),
        model_dir: PathBuf::from(
            std::env::var("TENSOR_VAULT_MODEL_DIR").unwrap_or_else(|_| "models".to_string()),
        ),
        cache_mode: parse_cache_mode("TENSOR_VAULT_CACHE_MODE"),
        frame_limit,
        log_json,
    }
}
