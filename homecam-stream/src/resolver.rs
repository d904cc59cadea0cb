//! Media host resolution with a last-known-good fallback.

use std::io;
use std::net::IpAddr;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::error::{Result, StreamError};

/// Forward hostname lookup.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait HostLookup: Send + Sync {
    async fn lookup(&self, host: &str) -> io::Result<Vec<IpAddr>>;
}

/// [`HostLookup`] backed by the system resolver.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemLookup;

#[async_trait]
impl HostLookup for SystemLookup {
    async fn lookup(&self, host: &str) -> io::Result<Vec<IpAddr>> {
        let addrs = tokio::net::lookup_host((host, 0)).await?;
        Ok(addrs.map(|addr| addr.ip()).collect())
    }
}

/// Resolves the media host, caching the last successful answer.
///
/// The cache is never expired, only replaced by the next successful lookup.
pub struct AddressResolver {
    lookup: Box<dyn HostLookup>,
    cached: RwLock<Option<IpAddr>>,
}

impl AddressResolver {
    /// Resolver using the system lookup
    pub fn new() -> Self {
        Self::with_lookup(SystemLookup)
    }

    pub fn with_lookup(lookup: impl HostLookup + 'static) -> Self {
        Self {
            lookup: Box::new(lookup),
            cached: RwLock::new(None),
        }
    }

    /// Last successfully resolved address
    pub fn cached(&self) -> Option<IpAddr> {
        *self.cached.read()
    }

    /// Resolve `host`, falling back to the cached address on failure
    pub async fn resolve(&self, host: &str) -> Result<IpAddr> {
        let failure = match self.lookup.lookup(host).await {
            Ok(addrs) => match addrs.into_iter().next() {
                Some(ip) => {
                    *self.cached.write() = Some(ip);
                    return Ok(ip);
                }
                None => "no addresses returned".to_string(),
            },
            Err(e) => e.to_string(),
        };

        match self.cached() {
            Some(ip) => {
                tracing::warn!(
                    "Resolving {} failed ({}), reusing last known address {}",
                    host,
                    failure,
                    ip
                );
                Ok(ip)
            }
            None => Err(StreamError::ResolutionFailure {
                host: host.to_string(),
                message: failure,
            }),
        }
    }
}

impl Default for AddressResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for AddressResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AddressResolver")
            .field("cached", &self.cached())
            .finish()
    }
}
