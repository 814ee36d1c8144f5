//! A fixed backend list.

use tether_core::{Backend, BackendSource, SnapshotStream};

use crate::error::ProxyError;

/// Yields one configured backend list and then ends.
#[derive(Debug, Clone)]
pub struct StaticSource {
    backends: Vec<Backend>,
}

impl StaticSource {
    /// Wrap an already-built backend list.
    pub fn new(backends: Vec<Backend>) -> Self {
        Self { backends }
    }

    /// Parse `id[@failure-domain],...`.
    ///
    /// Entries without a domain are isolated in a domain of their own.
    pub fn parse(list: &str) -> Result<Self, ProxyError> {
        let mut backends = Vec::new();
        for entry in list.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let backend = match entry.split_once('@') {
                Some((id, domain)) if !id.trim().is_empty() && !domain.trim().is_empty() => {
                    Backend::with_failure_domain(id.trim(), domain.trim())
                }
                Some(_) => return Err(ProxyError::InvalidBackends(entry.to_string())),
                None => Backend::new(entry),
            };
            backends.push(backend);
        }

        if backends.is_empty() {
            return Err(ProxyError::InvalidBackends(String::from("no backends listed")));
        }
        Ok(Self::new(backends))
    }
}

impl BackendSource for StaticSource {
    fn snapshots(&self) -> SnapshotStream {
        Box::pin(tokio_stream::once(self.backends.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_stream::StreamExt;

    #[test]
    fn test_parse_with_and_without_domains() {
        let source = StaticSource::parse("10.0.0.1@rack-a, 10.0.0.2 ,10.0.0.3@rack-a,").unwrap();
        assert_eq!(
            source.backends,
            vec![
                Backend::with_failure_domain("10.0.0.1", "rack-a"),
                Backend::new("10.0.0.2"),
                Backend::with_failure_domain("10.0.0.3", "rack-a"),
            ]
        );
    }

    #[test]
    fn test_parse_rejects_empty_and_malformed() {
        assert!(StaticSource::parse("").is_err());
        assert!(StaticSource::parse(" , ").is_err());
        assert!(StaticSource::parse("a@").is_err());
        assert!(StaticSource::parse("@rack").is_err());
    }

    #[tokio::test]
    async fn test_yields_once_per_call() {
        let source = StaticSource::parse("a,b").unwrap();
        for _ in 0..2 {
            let snapshots: Vec<_> = source.snapshots().collect().await;
            assert_eq!(snapshots.len(), 1);
            assert_eq!(snapshots[0].len(), 2);
        }
    }
}
