//! TLS termination and configuration logic for Tether.
//!
//! This module handles loading certificates and private keys
//! into a `rustls::ServerConfig`, and providing an acceptor
//! for incoming secure connections.

use pki_types::{CertificateDer, PrivateKeyDer};
use rustls::ServerConfig;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;
use tokio_rustls::TlsAcceptor;

use crate::error::ProxyError;

/// Loads a TLS `ServerConfig` from the given certificate and key paths.
pub fn load_tls_config<P: AsRef<Path>>(
    cert_path: P,
    key_path: P,
) -> Result<Arc<ServerConfig>, ProxyError> {
    let cert_file = File::open(cert_path)?;
    let mut cert_reader = BufReader::new(cert_file);
    let certs: Vec<CertificateDer<'static>> =
        rustls_pemfile::certs(&mut cert_reader).collect::<Result<Vec<_>, _>>()?;

    let key_path = key_path.as_ref();
    let key_file = File::open(key_path)?;
    let mut key_reader = BufReader::new(key_file);
    let key = rustls_pemfile::pkcs8_private_keys(&mut key_reader)
        .next()
        .transpose()?
        .map(PrivateKeyDer::Pkcs8)
        .ok_or_else(|| ProxyError::MissingPrivateKey(key_path.display().to_string()))?;

    // Upstream forwarding is HTTP/1.1 only.
    let mut config = ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)?;
    config.alpn_protocols = vec![b"http/1.1".to_vec()];

    Ok(Arc::new(config))
}

/// Builds an acceptor from certificate and key paths.
pub fn acceptor<P: AsRef<Path>>(cert_path: P, key_path: P) -> Result<TlsAcceptor, ProxyError> {
    load_tls_config(cert_path, key_path).map(TlsAcceptor::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_files_are_io_errors() {
        let err = load_tls_config("/nonexistent/cert.pem", "/nonexistent/key.pem").unwrap_err();
        assert!(matches!(err, ProxyError::Io(_)));
    }

    #[test]
    fn test_key_file_without_pkcs8_key() {
        let dir = std::env::temp_dir();
        let cert = dir.join(format!("tether-empty-cert-{}.pem", std::process::id()));
        let key = dir.join(format!("tether-empty-key-{}.pem", std::process::id()));
        std::fs::write(&cert, "").unwrap();
        std::fs::write(&key, "").unwrap();

        let err = load_tls_config(&cert, &key).unwrap_err();
        assert!(matches!(err, ProxyError::MissingPrivateKey(_)));

        let _ = std::fs::remove_file(cert);
        let _ = std::fs::remove_file(key);
    }
}
