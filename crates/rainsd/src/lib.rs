//! RAINS server daemon.
//!
//! Architecture:
//! - One UDP socket carrying JSON-framed messages
//! - A shared resolution engine behind `Arc`, driven per datagram
//! - A writer task draining the engine's outbound channel
//! - A reaper task sweeping expired cache entries and dead waiters

mod server;
mod transport;

pub use server::Server;
pub use transport::{bind, MAX_DATAGRAM};

use std::net::SocketAddr;

use rains_cache::MaxCacheValidity;
use rains_engine::EngineConfig;

/// Configuration for a RAINS server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// UDP listen address.
    pub listen: SocketAddr,

    /// The address peers reach this server under; a delegation walk
    /// ending here means we are authoritative and have no answer.
    pub server_address: SocketAddr,

    /// Where queries go when no delegation is cached.
    pub root_server: SocketAddr,

    /// `(context, zone)` pairs this server is authoritative for.
    pub authorities: Vec<(String, String)>,

    /// Capacity bounds of the three caches.
    pub assertion_cache_size: usize,
    pub negative_cache_size: usize,
    pub pending_query_cache_size: usize,

    /// Per-kind caps on cached validity windows, seconds.
    pub max_assertion_validity: i64,
    pub max_shard_validity: i64,
    pub max_zone_validity: i64,

    /// Upper bound on forwarded-query pending time, seconds.
    pub assertion_query_validity: i64,

    /// Seconds between reaper sweeps.
    pub reaper_interval: u64,

    /// UDP buffer sizes in bytes.
    pub sndbuf: usize,
    pub rcvbuf: usize,

    /// Capabilities advertised on `CapHashNotKnown`.
    pub capabilities: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

impl ServerConfig {
    /// Create config from environment variables with sensible defaults.
    pub fn from_env() -> Self {
        let listen = env_or("RAINS_LISTEN_ADDR", "0.0.0.0:55553")
            .parse()
            .expect("Invalid RAINS_LISTEN_ADDR");

        let server_address = env_or("RAINS_SERVER_ADDR", "127.0.0.1:55553")
            .parse()
            .expect("Invalid RAINS_SERVER_ADDR");

        let root_server = env_or("RAINS_ROOT_SERVER", "127.0.0.1:55553")
            .parse()
            .expect("Invalid RAINS_ROOT_SERVER");

        // Comma-separated context:zone pairs, e.g. ".:ch,.:ethz.ch".
        let authorities = std::env::var("RAINS_AUTHORITIES")
            .unwrap_or_default()
            .split(',')
            .filter(|pair| !pair.is_empty())
            .map(|pair| {
                let (context, zone) = pair
                    .split_once(':')
                    .expect("Invalid RAINS_AUTHORITIES entry, expected context:zone");
                (context.to_string(), zone.to_string())
            })
            .collect();

        let capabilities = std::env::var("RAINS_CAPABILITIES")
            .unwrap_or_default()
            .split(',')
            .filter(|cap| !cap.is_empty())
            .map(str::to_string)
            .collect();

        Self {
            listen,
            server_address,
            root_server,
            authorities,
            assertion_cache_size: env_num("RAINS_ASSERTION_CACHE_SIZE", 10_000),
            negative_cache_size: env_num("RAINS_NEGATIVE_CACHE_SIZE", 1_000),
            pending_query_cache_size: env_num("RAINS_PENDING_QUERY_CACHE_SIZE", 1_000),
            max_assertion_validity: env_num("RAINS_MAX_ASSERTION_VALIDITY", 24 * 3600),
            max_shard_validity: env_num("RAINS_MAX_SHARD_VALIDITY", 24 * 3600),
            max_zone_validity: env_num("RAINS_MAX_ZONE_VALIDITY", 24 * 3600),
            assertion_query_validity: env_num("RAINS_QUERY_VALIDITY", 10),
            reaper_interval: env_num("RAINS_REAPER_INTERVAL", 5),
            sndbuf: env_num("RAINS_SNDBUF", 4 * 1024 * 1024),
            rcvbuf: env_num("RAINS_RCVBUF", 4 * 1024 * 1024),
            capabilities,
        }
    }

    /// The engine configuration this server config implies.
    pub fn engine_config(&self) -> EngineConfig {
        let mut config = EngineConfig::default()
            .with_cache_sizes(
                self.assertion_cache_size,
                self.negative_cache_size,
                self.pending_query_cache_size,
            )
            .with_max_validity(MaxCacheValidity {
                assertion: self.max_assertion_validity,
                shard: self.max_shard_validity,
                zone: self.max_zone_validity,
            })
            .with_query_validity(self.assertion_query_validity)
            .with_server_address(self.server_address)
            .with_root_server(self.root_server);
        config.capabilities = self.capabilities.clone();
        config
    }

    /// Whether this server is authoritative for `(context, zone)`.
    pub fn is_authoritative(&self, context: &str, zone: &str) -> bool {
        self.authorities
            .iter()
            .any(|(c, z)| c == context && z == zone)
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_num<T: std::str::FromStr>(key: &str, default: T) -> T
where
    T::Err: std::fmt::Debug,
{
    match std::env::var(key) {
        Ok(value) => value.parse().unwrap_or_else(|_| panic!("Invalid {key}")),
        Err(_) => default,
    }
}
