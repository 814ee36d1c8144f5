//! DNS polling backend source.
//!
//! Resolves a name (typically a headless service) on a fixed interval and
//! publishes a snapshot whenever the resolved address set changes.

use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};

use tether_core::{Backend, BackendSource, ChangeDetector, SnapshotStream};

/// Periodically resolves an FQDN into a backend set.
#[derive(Debug, Clone)]
pub struct DnsSource {
    fqdn: String,
    interval: Duration,
    failure_prefix: u8,
}

impl DnsSource {
    /// Create a source resolving `fqdn` every `interval`.
    ///
    /// IPv4 backends sharing the leading `failure_prefix` bits are placed in
    /// the same failure domain.
    pub fn new(fqdn: String, interval: Duration, failure_prefix: u8) -> Self {
        Self {
            fqdn,
            interval,
            failure_prefix: failure_prefix.min(32),
        }
    }

    async fn resolve(&self) -> std::io::Result<Vec<Backend>> {
        let mut ips: Vec<IpAddr> = tokio::net::lookup_host((self.fqdn.as_str(), 0))
            .await?
            .map(|addr| addr.ip())
            .collect();
        ips.sort();
        ips.dedup();

        Ok(ips
            .into_iter()
            .map(|ip| Backend::with_failure_domain(ip.to_string(), failure_domain(ip, self.failure_prefix)))
            .collect())
    }

    async fn poll(self, updates: mpsc::Sender<Vec<Backend>>) {
        let mut ticker = time::interval(self.interval);
        ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
        let mut detector = ChangeDetector::new();

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = updates.closed() => {
                    debug!(fqdn = %self.fqdn, "snapshot consumer gone; stopping resolver");
                    return;
                }
            }

            let backends = match self.resolve().await {
                Ok(backends) if backends.is_empty() => {
                    warn!(fqdn = %self.fqdn, "resolved no addresses; keeping previous backends");
                    continue;
                }
                Ok(backends) => backends,
                Err(err) => {
                    warn!(fqdn = %self.fqdn, error = %err, "DNS resolution failed");
                    continue;
                }
            };

            if !detector.observe(&backends) {
                debug!(fqdn = %self.fqdn, "backend set unchanged");
                continue;
            }

            info!(fqdn = %self.fqdn, backends = backends.len(), "backend set changed");
            if updates.send(backends).await.is_err() {
                debug!(fqdn = %self.fqdn, "snapshot consumer gone; stopping resolver");
                return;
            }
        }
    }
}

impl BackendSource for DnsSource {
    fn snapshots(&self) -> SnapshotStream {
        let (tx, rx) = mpsc::channel(1);
        tokio::spawn(self.clone().poll(tx));
        Box::pin(ReceiverStream::new(rx))
    }
}

/// Failure-domain label for `ip` under an IPv4 prefix of `prefix` bits.
///
/// A full-length prefix (or an IPv6 address) yields the address itself.
pub fn failure_domain(ip: IpAddr, prefix: u8) -> String {
    match ip {
        IpAddr::V4(v4) if prefix < 32 => {
            let mask = u32::MAX.checked_shl(32 - u32::from(prefix)).unwrap_or(0);
            let network = Ipv4Addr::from(u32::from(v4) & mask);
            format!("{network}/{prefix}")
        }
        other => other.to_string(),
    }
}
