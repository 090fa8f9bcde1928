// Peer registry client.
//
// Client side of the registry protocol, shared by the scatter-gather query,
// the leader's delegate fan-out, delegate registration and the watchdog.
//
//   GET  /services       -> [{ name, labels, addrPort }]
//   POST /add-delegate   Body: { addrPort }
//   GET  /ping           -> 200
//
// Failures are split in two: `Unreachable` means the peer isn't there
// (expected, transient); anything else means something answered but didn't
// speak the protocol.

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::net::SocketAddrV4;
use std::time::Duration;
use thiserror::Error;

use crate::service::Service;

/// Body of `POST /add-delegate`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddDelegateRequest {
    #[serde(rename = "addrPort")]
    pub addr_port: SocketAddrV4,
}

#[derive(Debug, Error)]
pub enum FetchError {
    /// Connection refused, timed out, or otherwise never got a response.
    #[error("cannot reach {addr}: {source}")]
    Unreachable {
        addr: SocketAddrV4,
        #[source]
        source: reqwest::Error,
    },

    #[error("{addr} answered with status {status}")]
    Status { addr: SocketAddrV4, status: StatusCode },

    #[error("malformed response from {addr}: {reason}")]
    Decode { addr: SocketAddrV4, reason: String },
}

impl FetchError {
    pub fn is_unreachable(&self) -> bool {
        matches!(self, FetchError::Unreachable { .. })
    }

    fn from_reqwest(addr: SocketAddrV4, e: reqwest::Error) -> Self {
        if e.is_connect() || e.is_timeout() || e.is_request() {
            FetchError::Unreachable { addr, source: e }
        } else {
            FetchError::Decode {
                addr,
                reason: e.to_string(),
            }
        }
    }
}

/// HTTP client for talking to other registries.
#[derive(Debug, Clone)]
pub struct RegistryClient {
    http: Client,
    probe: Client,
}

impl RegistryClient {
    pub fn new(fetch_timeout: Duration, probe_timeout: Duration) -> reqwest::Result<Self> {
        // Peers are on the tailnet; an HTTP proxy from the environment would
        // only get in the way.
        let build = |timeout| {
            Client::builder()
                .timeout(timeout)
                .no_proxy()
                .build()
        };
        Ok(Self {
            http: build(fetch_timeout)?,
            probe: build(probe_timeout)?,
        })
    }

    /// Fetch the services a registry advertises.
    pub async fn fetch_services(&self, addr: SocketAddrV4) -> Result<Vec<Service>, FetchError> {
        let url = format!("http://{}/services", addr);
        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(addr, e))?;

        if !resp.status().is_success() {
            return Err(FetchError::Status {
                addr,
                status: resp.status(),
            });
        }

        let body = resp
            .bytes()
            .await
            .map_err(|e| FetchError::from_reqwest(addr, e))?;
        serde_json::from_slice(&body).map_err(|e| FetchError::Decode {
            addr,
            reason: e.to_string(),
        })
    }

    /// Ask the leader at `leader` to include `delegate` in its listings.
    pub async fn register_delegate(
        &self,
        leader: SocketAddrV4,
        delegate: SocketAddrV4,
    ) -> Result<(), FetchError> {
        let url = format!("http://{}/add-delegate", leader);
        let resp = self
            .http
            .post(&url)
            .json(&AddDelegateRequest {
                addr_port: delegate,
            })
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(leader, e))?;

        if resp.status() != StatusCode::OK {
            return Err(FetchError::Status {
                addr: leader,
                status: resp.status(),
            });
        }
        Ok(())
    }

    /// Whether the registry at `addr` answers its liveness probe.
    pub async fn ping(&self, addr: SocketAddrV4) -> bool {
        let url = format!("http://{}/ping", addr);
        match self.probe.get(&url).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                tracing::debug!("Ping to {} failed: {}", addr, e);
                false
            }
        }
    }
}
