//! Command-line and environment configuration.

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use hyper::header::HeaderName;

use tether_core::DEFAULT_TABLE_SIZE;

/// Which router serves requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RouterMode {
    /// Retain past generations and signal hand-offs to backends.
    Versioned,
    /// Route through the current table only.
    Simple,
}

/// Tether connection-affinity proxy.
#[derive(Debug, Clone, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// Interface to accept client connections on
    #[arg(long, env = "LISTEN_HOST", default_value = "0.0.0.0")]
    pub listen_host: IpAddr,

    /// Port to accept client connections on
    #[arg(long, env = "LISTEN_PORT", default_value_t = 8080)]
    pub listen_port: u16,

    /// Port requests are forwarded to on the chosen backend
    #[arg(long, env = "DEST_PORT", default_value_t = 8080)]
    pub dest_port: u16,

    /// Request header carrying the routing key
    #[arg(long, env = "ROUTE_HEADER", default_value = "x-room-id")]
    pub route_header: HeaderName,

    /// Router flavor
    #[arg(long, env = "ROUTER_MODE", value_enum, default_value_t = RouterMode::Versioned)]
    pub mode: RouterMode,

    /// DNS name resolving to the backend addresses
    #[arg(
        long,
        env = "BACKEND_FQDN",
        conflicts_with = "static_backends",
        required_unless_present = "static_backends"
    )]
    pub backend_fqdn: Option<String>,

    /// Fixed backend list: `id[@failure-domain],...`
    #[arg(long, env = "STATIC_BACKENDS")]
    pub static_backends: Option<String>,

    /// Time between DNS resolutions, e.g. `10s` or `1m 30s`
    #[arg(long, env = "RESOLVE_INTERVAL", default_value = "10s", value_parser = parse_interval)]
    pub resolve_interval: Duration,

    /// IPv4 prefix length grouping backends into failure domains
    #[arg(
        long,
        env = "FAILURE_CIDR",
        default_value_t = 32,
        value_parser = clap::value_parser!(u8).range(0..=32)
    )]
    pub failure_cidr: u8,

    /// Slots per Maglev table (prime recommended)
    #[arg(long, env = "TABLE_SIZE", default_value_t = DEFAULT_TABLE_SIZE, value_parser = parse_positive)]
    pub table_size: usize,

    /// Generations retained for hand-off detection
    #[arg(long, env = "MAX_HISTORY", default_value_t = 5, value_parser = parse_positive)]
    pub max_history: usize,

    /// Replicas selected per key, primary included
    #[arg(long, env = "REPLICA_COUNT", default_value_t = 3, value_parser = parse_positive)]
    pub replica_count: usize,

    /// Slots probed when searching for failure-domain-isolated replicas
    #[arg(long, env = "MAX_JUMPS", default_value_t = 5, value_parser = parse_positive)]
    pub max_jumps: usize,

    /// PEM certificate chain for TLS termination
    #[arg(long, env = "TLS_CERT", requires = "tls_key")]
    pub tls_cert: Option<PathBuf>,

    /// PEM PKCS#8 private key for TLS termination
    #[arg(long, env = "TLS_KEY", requires = "tls_cert")]
    pub tls_key: Option<PathBuf>,

    /// Unix socket path for the admin control plane
    #[arg(long, env = "ADMIN_SOCKET")]
    pub admin_socket: Option<PathBuf>,
}

impl Config {
    /// Socket address the proxy listens on.
    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.listen_host, self.listen_port)
    }
}

fn parse_interval(value: &str) -> Result<Duration, String> {
    match humantime::parse_duration(value) {
        Ok(interval) if interval.is_zero() => Err(String::from("must be greater than zero")),
        Ok(interval) => Ok(interval),
        Err(err) => Err(err.to_string()),
    }
}

fn parse_positive(value: &str) -> Result<usize, String> {
    match value.parse::<usize>() {
        Ok(0) => Err(String::from("must be greater than zero")),
        Ok(n) => Ok(n),
        Err(err) => Err(err.to_string()),
    }
}
