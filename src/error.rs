// Registry errors
//
// Policy failures (duplicate, non-member, not-found) are returned to the
// caller as-is and never retried. Bind failures on every port are fatal.

use std::net::{Ipv4Addr, SocketAddrV4};
use thiserror::Error;

/// Errors surfaced by the public registry and discovery API.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("address {0} already registered")]
    DuplicateAddress(SocketAddrV4),

    #[error("non-member address {0}: not inside the tailnet range")]
    NonMemberAddress(SocketAddrV4),

    #[error("no service at {0}")]
    NotFound(SocketAddrV4),

    #[error("invalid service port {0}")]
    InvalidPort(u16),

    #[error("no matching service found")]
    NoMatch,

    /// Neither the discovery port nor an ephemeral port could be bound.
    #[error("couldn't bind to any port on {addr}: {source}")]
    Bind {
        addr: Ipv4Addr,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {0:#}")]
    InvalidConfig(#[source] anyhow::Error),

    #[error("cannot build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("cannot read network status: {0:#}")]
    AddressSource(#[source] anyhow::Error),
}

pub type Result<T, E = RegistryError> = std::result::Result<T, E>;
