// Tailnet status via the local daemon's API socket
//
// The tailnet daemon serves a small HTTP API over a unix domain socket. We
// only need `GET /localapi/v0/status`, from which we pull this node's IPv4
// address and the IPv4 address of every peer with its online flag. This
// internal socket interface is far more stable across daemon versions than
// linking the daemon's client library.

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use std::time::Duration;

use super::status::{AddressSource, NetworkStatus, Peer};
use crate::config::constants::{DEFAULT_STATUS_SOCKET, STATUS_TIMEOUT};

const STATUS_HOST: &str = "local-tailscaled.sock";
const STATUS_PATH: &str = "/localapi/v0/status";

/// Reads the tailnet map from the local daemon.
#[derive(Debug, Clone)]
pub struct TailnetStatusSource {
    socket_path: PathBuf,
    timeout: Duration,
}

impl TailnetStatusSource {
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
            timeout: STATUS_TIMEOUT,
        }
    }

    #[cfg(unix)]
    async fn fetch_status(&self) -> Result<hyper::body::Bytes> {
        use http_body_util::{BodyExt, Empty};
        use hyper::body::Bytes;
        use hyper_util::rt::TokioIo;
        use tokio::net::UnixStream;

        let stream = UnixStream::connect(&self.socket_path)
            .await
            .with_context(|| format!("Cannot connect to {}", self.socket_path.display()))?;
        let (mut sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(stream))
            .await
            .context("HTTP handshake with tailnet daemon failed")?;
        tokio::spawn(async move {
            if let Err(e) = conn.await {
                tracing::debug!("tailnet status connection closed: {}", e);
            }
        });

        let req = hyper::Request::builder()
            .method("GET")
            .uri(STATUS_PATH)
            .header(hyper::header::HOST, STATUS_HOST)
            .body(Empty::<Bytes>::new())
            .context("Failed to build status request")?;
        let resp = sender
            .send_request(req)
            .await
            .context("Error reading tailnet status")?;
        if !resp.status().is_success() {
            bail!("{} while reading tailnet status", resp.status());
        }
        let body = resp
            .into_body()
            .collect()
            .await
            .context("Error reading tailnet status body")?
            .to_bytes();
        Ok(body)
    }

    #[cfg(not(unix))]
    async fn fetch_status(&self) -> Result<Vec<u8>> {
        bail!("tailnet status socket is only supported on unix")
    }
}

impl Default for TailnetStatusSource {
    fn default() -> Self {
        Self::new(DEFAULT_STATUS_SOCKET)
    }
}

#[async_trait]
impl AddressSource for TailnetStatusSource {
    async fn status(&self) -> Result<NetworkStatus> {
        let body = tokio::time::timeout(self.timeout, self.fetch_status())
            .await
            .map_err(|_| anyhow!("Timed out reading tailnet status"))??;
        parse_status(&body)
    }
}

#[derive(Deserialize)]
struct StatusResponse {
    #[serde(rename = "TailscaleIPs", default)]
    ips: Option<Vec<IpAddr>>,
    #[serde(rename = "Peer", default)]
    peers: Option<BTreeMap<String, PeerStatus>>,
}

#[derive(Deserialize)]
struct PeerStatus {
    #[serde(rename = "Online", default)]
    online: bool,
    #[serde(rename = "TailscaleIPs", default)]
    ips: Option<Vec<IpAddr>>,
}

/// Decode the daemon's status document. Peers come out sorted by their node
/// key so repeated queries enumerate them in the same order.
pub(crate) fn parse_status(body: &[u8]) -> Result<NetworkStatus> {
    let status: StatusResponse =
        serde_json::from_slice(body).context("Cannot decode tailnet status")?;
    let local_addr = first_ipv4(status.ips.as_deref())
        .context("Cannot find IPv4 tailnet address for local host")?;
    let peers = status
        .peers
        .unwrap_or_default()
        .into_values()
        .filter_map(|p| {
            first_ipv4(p.ips.as_deref()).map(|addr| Peer {
                addr,
                online: p.online,
            })
        })
        .collect();
    Ok(NetworkStatus { local_addr, peers })
}

fn first_ipv4(ips: Option<&[IpAddr]>) -> Option<Ipv4Addr> {
    ips?.iter().find_map(|ip| match ip {
        IpAddr::V4(v4) => Some(*v4),
        IpAddr::V6(_) => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const STATUS: &str = r#"{
        "TailscaleIPs": ["fd7a:115c:a1e0::1", "100.101.0.1"],
        "Peer": {
            "nodekey:bbb": {"Online": true, "TailscaleIPs": ["100.101.0.3", "fd7a::3"]},
            "nodekey:aaa": {"Online": false, "TailscaleIPs": ["100.101.0.2"]},
            "nodekey:ccc": {"Online": true, "TailscaleIPs": ["fd7a::4"]}
        }
    }"#;

    #[test]
    fn test_parse_status_picks_ipv4() {
        let status = parse_status(STATUS.as_bytes()).unwrap();
        assert_eq!(status.local_addr, Ipv4Addr::new(100, 101, 0, 1));
        // ccc has no IPv4 address and is dropped; order follows node key.
        assert_eq!(
            status.peers,
            vec![
                Peer {
                    addr: Ipv4Addr::new(100, 101, 0, 2),
                    online: false
                },
                Peer {
                    addr: Ipv4Addr::new(100, 101, 0, 3),
                    online: true
                },
            ]
        );
        assert_eq!(
            status.online_addrs(),
            vec![Ipv4Addr::new(100, 101, 0, 1), Ipv4Addr::new(100, 101, 0, 3)]
        );
    }

    #[test]
    fn test_parse_status_without_peers() {
        let status = parse_status(br#"{"TailscaleIPs":["100.64.0.9"],"Peer":null}"#).unwrap();
        assert_eq!(status.local_addr, Ipv4Addr::new(100, 64, 0, 9));
        assert!(status.peers.is_empty());
    }

    #[test]
    fn test_parse_status_requires_local_ipv4() {
        let err = parse_status(br#"{"TailscaleIPs":["fd7a::1"]}"#).unwrap_err();
        assert!(err.to_string().contains("IPv4"));
    }

    #[test]
    fn test_parse_status_rejects_garbage() {
        assert!(parse_status(b"<html>").is_err());
    }

    #[tokio::test]
    async fn test_missing_socket_is_an_error() {
        let source = TailnetStatusSource::new("/nonexistent/meshdisc-test.sock");
        assert!(source.status().await.is_err());
    }
}
