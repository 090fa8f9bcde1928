// Local registry
//
// The services this process offers, plus the node that serves them to the
// rest of the tailnet.
//
// A `Registry` is an explicit handle: several can live in one process (tests
// do exactly that), each with its own directory and election loop. Dropping
// the handle stops the loop; `shutdown()` does the same and reports how the
// loop ended.

pub mod client;
pub mod directory;
pub mod lifecycle;
pub mod server;

pub use client::{AddDelegateRequest, FetchError, RegistryClient};
pub use directory::ServiceDirectory;
pub use lifecycle::NodeRole;
pub use server::{create_router, ProtocolState};

use std::net::{Ipv4Addr, SocketAddrV4};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::error::{RegistryError, Result};
use crate::network::AddressSource;
use crate::service::{Labels, Service};
use lifecycle::Controller;

/// Handle to a running local registry.
pub struct Registry {
    directory: Arc<ServiceDirectory>,
    role: watch::Receiver<NodeRole>,
    shutdown: CancellationToken,
    task: Option<JoinHandle<Result<()>>>,
}

impl Registry {
    /// Create a registry and start its election loop in the background.
    ///
    /// The local tailnet address is read from `source` once, here.
    pub async fn start(config: &Config, source: &dyn AddressSource) -> Result<Self> {
        config.validate().map_err(RegistryError::InvalidConfig)?;
        let status = source.status().await.map_err(RegistryError::AddressSource)?;
        let client =
            RegistryClient::new(config.timings.fetch_timeout, config.timings.probe_timeout)?;
        let directory = Arc::new(ServiceDirectory::new(status.local_addr));

        let (role_tx, role) = watch::channel(NodeRole::Starting);
        let shutdown = CancellationToken::new();
        let controller = Controller {
            state: Arc::new(ProtocolState {
                directory: Arc::clone(&directory),
                client,
            }),
            discovery_port: config.discovery_port,
            timings: config.timings,
            role_tx,
            shutdown: shutdown.clone(),
        };

        tracing::info!("Starting registry on {}", status.local_addr);
        let task = tokio::spawn(controller.run());

        Ok(Self {
            directory,
            role,
            shutdown,
            task: Some(task),
        })
    }

    /// Advertise a service listening on this host at `port`.
    pub fn advertise(&self, port: u16, name: &str, labels: Labels) -> Result<()> {
        self.directory.advertise(port, name, labels)
    }

    /// Advertise a service on another tailnet host. Only use this for
    /// services that can't run a registry themselves.
    pub fn advertise_remote(&self, addr_port: SocketAddrV4, name: &str, labels: Labels) -> Result<()> {
        self.directory.advertise_remote(addr_port, name, labels)
    }

    /// Stop advertising the local service at `port`.
    pub fn unlist(&self, port: u16) -> Result<()> {
        self.directory.unlist(port)
    }

    pub fn unlist_remote(&self, addr_port: SocketAddrV4) -> Result<()> {
        self.directory.unlist_remote(addr_port)
    }

    pub fn services(&self) -> Vec<Service> {
        self.directory.services()
    }

    /// Delegates attached while this registry leads its host.
    pub fn delegates(&self) -> Vec<SocketAddrV4> {
        self.directory.delegates()
    }

    pub fn local_addr(&self) -> Ipv4Addr {
        self.directory.local_addr()
    }

    pub fn role(&self) -> NodeRole {
        *self.role.borrow()
    }

    /// Watch role transitions.
    pub fn subscribe(&self) -> watch::Receiver<NodeRole> {
        self.role.clone()
    }

    /// Stop serving, drain in-flight requests and return how the election
    /// loop ended. A fatal bind error surfaces here.
    pub async fn shutdown(mut self) -> Result<()> {
        self.shutdown.cancel();
        match self.task.take() {
            Some(task) => match task.await {
                Ok(result) => result,
                Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
                Err(_) => Ok(()),
            },
            None => Ok(()),
        }
    }
}

impl Drop for Registry {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Start a registry using the address source `config` selects.
pub async fn start_registry(config: &Config) -> Result<Registry> {
    let source = config.address_source();
    Registry::start(config, source.as_ref()).await
}
