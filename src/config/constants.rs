// Project-wide constants
//
// Centralised here so the discovery port and protocol timings have one
// source of truth. Import via `use crate::config::constants::*;`.

use std::time::Duration;

/// Well-known port every leader registry listens on.
///
/// Binding it is the leader election: whoever holds it leads its host.
pub const DISCOVERY_PORT: u16 = 28004;

/// Timeout for one `GET /services` fetch (scatter-gather and delegate fan-out).
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(2);

/// Timeout for a delegate's `/ping` to its leader.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(1);

/// How often a delegate checks that its leader is still alive.
pub const PROBE_INTERVAL: Duration = Duration::from_secs(5);

/// Wait before retrying election after a failed delegate registration.
pub const RETRY_BACKOFF: Duration = Duration::from_secs(10);

/// Timeout for reading the tailnet daemon's status.
pub const STATUS_TIMEOUT: Duration = Duration::from_millis(500);

/// Where the tailnet daemon serves its local API.
pub const DEFAULT_STATUS_SOCKET: &str = "/var/run/tailscale/tailscaled.sock";

/// URI scheme understood by `discovery::Target`.
pub const TARGET_SCHEME: &str = "meshdisc";
