// meshdisc - service discovery for a private mesh network
// Library exports

pub mod config;
pub mod discovery;
pub mod error;
pub mod network;
pub mod registry;
pub mod service;

pub use config::{load_config, Config};
pub use discovery::{resolve_target, DiscoveryClient, ServiceQuery, SkipReason, SkippedPeer, Target};
pub use error::{RegistryError, Result};
pub use registry::{start_registry, NodeRole, Registry};
pub use service::{Labels, Service};
