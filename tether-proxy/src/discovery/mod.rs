//! Backend-set producers feeding the router.

pub mod dns;
pub mod static_list;

pub use dns::DnsSource;
pub use static_list::StaticSource;

use tether_core::BackendSource;

use crate::config::Config;
use crate::error::ProxyError;

/// Build the backend source selected by `config`.
pub fn from_config(config: &Config) -> Result<Box<dyn BackendSource>, ProxyError> {
    if let Some(list) = &config.static_backends {
        return Ok(Box::new(StaticSource::parse(list)?));
    }
    match &config.backend_fqdn {
        Some(fqdn) => Ok(Box::new(DnsSource::new(
            fqdn.clone(),
            config.resolve_interval,
            config.failure_cidr,
        ))),
        None => Err(ProxyError::InvalidBackends(String::from(
            "either a static backend list or a backend FQDN is required",
        ))),
    }
}
