// Service directory: the registry's in-memory state.
//
// Holds the services this process advertises and, when acting as leader,
// the other registries on this host that registered as delegates. One lock
// guards both lists; it is only ever held for in-memory work.

use parking_lot::Mutex;
use std::net::{Ipv4Addr, SocketAddrV4};

use crate::error::{RegistryError, Result};
use crate::network::is_member_address;
use crate::service::{Labels, Service};

#[derive(Default)]
struct DirectoryState {
    services: Vec<Service>,
    delegates: Vec<SocketAddrV4>,
}

/// Thread-safe list of advertised services plus attached delegates.
pub struct ServiceDirectory {
    /// Captured once at startup so a later network change can't mix
    /// addresses from two tailnets in one directory.
    local_addr: Ipv4Addr,
    state: Mutex<DirectoryState>,
}

impl ServiceDirectory {
    pub fn new(local_addr: Ipv4Addr) -> Self {
        Self {
            local_addr,
            state: Mutex::new(DirectoryState::default()),
        }
    }

    pub fn local_addr(&self) -> Ipv4Addr {
        self.local_addr
    }

    /// Advertise a service running on this host at `port`.
    pub fn advertise(&self, port: u16, name: &str, labels: Labels) -> Result<()> {
        if port == 0 {
            return Err(RegistryError::InvalidPort(port));
        }
        self.insert(SocketAddrV4::new(self.local_addr, port), name, labels)
    }

    /// Advertise a service on another tailnet host, on behalf of a process
    /// that can't run its own registry.
    pub fn advertise_remote(&self, addr_port: SocketAddrV4, name: &str, labels: Labels) -> Result<()> {
        if !is_member_address(*addr_port.ip()) {
            return Err(RegistryError::NonMemberAddress(addr_port));
        }
        if addr_port.port() == 0 {
            return Err(RegistryError::InvalidPort(0));
        }
        self.insert(addr_port, name, labels)
    }

    fn insert(&self, addr_port: SocketAddrV4, name: &str, labels: Labels) -> Result<()> {
        let mut state = self.state.lock();
        if state.services.iter().any(|s| s.addr_port == addr_port) {
            return Err(RegistryError::DuplicateAddress(addr_port));
        }
        tracing::info!(
            "Advertising new service. Name: {}, labels: {:?}, address: {}",
            name,
            labels,
            addr_port
        );
        state.services.push(Service::new(name, labels, addr_port));
        Ok(())
    }

    /// Stop advertising the local service at `port`.
    pub fn unlist(&self, port: u16) -> Result<()> {
        self.remove(SocketAddrV4::new(self.local_addr, port))
    }

    /// Stop advertising a service added with `advertise_remote`.
    pub fn unlist_remote(&self, addr_port: SocketAddrV4) -> Result<()> {
        self.remove(addr_port)
    }

    fn remove(&self, addr_port: SocketAddrV4) -> Result<()> {
        let mut state = self.state.lock();
        let before = state.services.len();
        state.services.retain(|s| s.addr_port != addr_port);
        if state.services.len() == before {
            return Err(RegistryError::NotFound(addr_port));
        }
        tracing::info!("Unlisted service at {}", addr_port);
        Ok(())
    }

    /// Advertised services in insertion order.
    pub fn services(&self) -> Vec<Service> {
        self.state.lock().services.clone()
    }

    pub fn delegates(&self) -> Vec<SocketAddrV4> {
        self.state.lock().delegates.clone()
    }

    /// Services and delegates captured under one lock acquisition.
    pub(crate) fn snapshot(&self) -> (Vec<Service>, Vec<SocketAddrV4>) {
        let state = self.state.lock();
        (state.services.clone(), state.delegates.clone())
    }

    /// Attach a delegate registry. Only registries on this host may attach;
    /// registering an already-known delegate is a no-op.
    pub(crate) fn add_delegate(&self, addr_port: SocketAddrV4) -> std::result::Result<(), SocketAddrV4> {
        if *addr_port.ip() != self.local_addr {
            return Err(addr_port);
        }
        let mut state = self.state.lock();
        if !state.delegates.contains(&addr_port) {
            state.delegates.push(addr_port);
        }
        Ok(())
    }

    pub(crate) fn remove_delegate(&self, addr_port: SocketAddrV4) {
        self.state.lock().delegates.retain(|d| *d != addr_port);
    }
}
