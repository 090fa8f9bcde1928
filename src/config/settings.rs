// Configuration structs

use anyhow::bail;
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use super::constants::{
    DEFAULT_STATUS_SOCKET, DISCOVERY_PORT, FETCH_TIMEOUT, PROBE_INTERVAL, PROBE_TIMEOUT,
    RETRY_BACKOFF,
};
use crate::network::{AddressSource, StaticAddressSource, TailnetStatusSource};

/// Protocol timings. Injectable so tests can run the election loop in
/// milliseconds instead of seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timings {
    /// Bound on one `GET /services` fetch
    pub fetch_timeout: Duration,
    /// Bound on a delegate's liveness probe
    pub probe_timeout: Duration,
    /// Delay between liveness probes
    pub probe_interval: Duration,
    /// Wait after a failed delegate registration
    pub retry_backoff: Duration,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            fetch_timeout: FETCH_TIMEOUT,
            probe_timeout: PROBE_TIMEOUT,
            probe_interval: PROBE_INTERVAL,
            retry_backoff: RETRY_BACKOFF,
        }
    }
}

/// Fixed tailnet addresses, used instead of asking the tailnet daemon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticNetwork {
    pub local_address: Ipv4Addr,
    pub peers: Vec<Ipv4Addr>,
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Well-known port leaders bind and peers are queried on
    pub discovery_port: u16,

    /// Protocol timeouts, probe interval and retry backoff
    pub timings: Timings,

    /// Unix socket of the tailnet daemon's local API
    pub status_socket: PathBuf,

    /// Static addresses; when set the tailnet daemon is not consulted
    pub network: Option<StaticNetwork>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            discovery_port: DISCOVERY_PORT,
            timings: Timings::default(),
            status_socket: PathBuf::from(DEFAULT_STATUS_SOCKET),
            network: None,
        }
    }
}

impl Config {
    /// The address source this configuration selects.
    pub fn address_source(&self) -> Arc<dyn AddressSource> {
        match &self.network {
            Some(net) => Arc::new(StaticAddressSource::new(
                net.local_address,
                net.peers.iter().copied(),
            )),
            None => Arc::new(TailnetStatusSource::new(self.status_socket.clone())),
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.discovery_port == 0 {
            bail!("discovery_port must not be 0");
        }
        let t = &self.timings;
        for (name, value) in [
            ("fetch_timeout_ms", t.fetch_timeout),
            ("probe_timeout_ms", t.probe_timeout),
            ("probe_interval_ms", t.probe_interval),
            ("retry_backoff_ms", t.retry_backoff),
        ] {
            if value.is_zero() {
                bail!("timings.{} must be greater than 0", name);
            }
        }
        Ok(())
    }
}
