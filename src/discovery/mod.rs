// Discovery client
//
// Scatter-gather over every online registry on the tailnet. Each peer is
// fetched concurrently under its own timeout, and the answers are merged in
// the order the address source listed the peers, so the result order never
// depends on which peer happened to answer first.

pub mod target;

pub use target::{resolve_target, Target};

use futures::future::join_all;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::sync::Arc;

use crate::config::Config;
use crate::error::{RegistryError, Result};
use crate::network::AddressSource;
use crate::registry::{FetchError, RegistryClient};
use crate::service::{Labels, Service};

/// Why a peer's answer is missing from a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Nothing listening, or no answer in time.
    Unreachable,
    /// Something answered but not with a service list.
    Protocol,
}

/// A peer left out of a query result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedPeer {
    pub addr: SocketAddrV4,
    pub reason: SkipReason,
    pub detail: String,
}

/// Merged result of one scatter-gather query.
#[derive(Debug, Clone, Default)]
pub struct ServiceQuery {
    pub services: Vec<Service>,
    pub skipped: Vec<SkippedPeer>,
}

/// Finds services advertised anywhere on the tailnet.
#[derive(Clone)]
pub struct DiscoveryClient {
    source: Arc<dyn AddressSource>,
    client: RegistryClient,
    discovery_port: u16,
}

impl DiscoveryClient {
    pub fn new(config: &Config, source: Arc<dyn AddressSource>) -> Result<Self> {
        Ok(Self {
            source,
            client: RegistryClient::new(
                config.timings.fetch_timeout,
                config.timings.probe_timeout,
            )?,
            discovery_port: config.discovery_port,
        })
    }

    /// Client using the address source `config` selects.
    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(config, config.address_source())
    }

    /// Query every online registry and report which ones were skipped.
    ///
    /// Fails only if the address set itself can't be read.
    pub async fn query(&self) -> Result<ServiceQuery> {
        let status = self
            .source
            .status()
            .await
            .map_err(RegistryError::AddressSource)?;
        Ok(self.query_addrs(&status.online_addrs()).await)
    }

    async fn query_addrs(&self, addrs: &[Ipv4Addr]) -> ServiceQuery {
        let fetches = addrs.iter().map(|ip| {
            let addr = SocketAddrV4::new(*ip, self.discovery_port);
            async move { (addr, self.client.fetch_services(addr).await) }
        });

        // join_all yields results in input order, not completion order.
        let mut query = ServiceQuery::default();
        for (addr, result) in join_all(fetches).await {
            match result {
                Ok(part) => query.services.extend(part),
                Err(e) => query.skipped.push(skip(addr, e)),
            }
        }
        query
    }

    /// All services advertised on the tailnet.
    pub async fn list_services(&self) -> Result<Vec<Service>> {
        Ok(self.query().await?.services)
    }

    /// Address of the first service named `name` carrying every label in
    /// `labels`. Asking for env=prod matches [env=prod] and
    /// [env=prod, foo=bar] but not [env=staging].
    pub async fn find_service(&self, name: &str, labels: &Labels) -> Result<SocketAddrV4> {
        self.list_services()
            .await?
            .into_iter()
            .find(|s| s.matches(name, labels))
            .map(|s| s.addr_port)
            .ok_or(RegistryError::NoMatch)
    }
}

fn skip(addr: SocketAddrV4, e: FetchError) -> SkippedPeer {
    let reason = if e.is_unreachable() {
        tracing::debug!("Error connecting to {}: {}", addr, e);
        SkipReason::Unreachable
    } else {
        tracing::warn!("Error fetching services from {}: {}", addr, e);
        SkipReason::Protocol
    };
    SkippedPeer {
        addr,
        reason,
        detail: e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::StaticAddressSource;

    #[tokio::test]
    async fn test_no_registries_reachable_is_empty_not_error() {
        // Nothing listens on this port on 127.0.0.1.
        let config = Config {
            discovery_port: 1,
            ..Default::default()
        };
        let source = Arc::new(StaticAddressSource::new(Ipv4Addr::LOCALHOST, []));
        let client = DiscoveryClient::new(&config, source).unwrap();

        let query = client.query().await.unwrap();
        assert!(query.services.is_empty());
        assert_eq!(query.skipped.len(), 1);
        assert_eq!(query.skipped[0].reason, SkipReason::Unreachable);

        assert!(matches!(
            client.find_service("anything", &Labels::new()).await,
            Err(RegistryError::NoMatch)
        ));
    }

    struct BrokenSource;

    #[async_trait::async_trait]
    impl AddressSource for BrokenSource {
        async fn status(&self) -> anyhow::Result<crate::network::NetworkStatus> {
            anyhow::bail!("daemon not running")
        }
    }

    #[tokio::test]
    async fn test_address_source_failure_fails_query() {
        let client = DiscoveryClient::new(&Config::default(), Arc::new(BrokenSource)).unwrap();
        assert!(matches!(
            client.list_services().await,
            Err(RegistryError::AddressSource(_))
        ));
    }
}
