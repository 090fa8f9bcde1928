// Network status: the reduced view of the tailnet the core depends on.

use anyhow::Result;
use async_trait::async_trait;
use std::net::Ipv4Addr;

/// Address block the tailnet hands out (CGNAT, RFC 6598).
const MEMBER_PREFIX: Ipv4Addr = Ipv4Addr::new(100, 64, 0, 0);
const MEMBER_PREFIX_LEN: u32 = 10;

/// A peer host on the tailnet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Peer {
    pub addr: Ipv4Addr,
    pub online: bool,
}

/// This host's tailnet address plus every known peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkStatus {
    pub local_addr: Ipv4Addr,
    pub peers: Vec<Peer>,
}

impl NetworkStatus {
    /// Every address worth querying: the local host first, then online peers
    /// in the order the source reported them.
    pub fn online_addrs(&self) -> Vec<Ipv4Addr> {
        std::iter::once(self.local_addr)
            .chain(self.peers.iter().filter(|p| p.online).map(|p| p.addr))
            .collect()
    }
}

/// Source of the local address and the online peer set.
#[async_trait]
pub trait AddressSource: Send + Sync {
    async fn status(&self) -> Result<NetworkStatus>;
}

/// Fixed addresses. Peers listed here are always considered online.
#[derive(Debug, Clone)]
pub struct StaticAddressSource {
    status: NetworkStatus,
}

impl StaticAddressSource {
    pub fn new(local_addr: Ipv4Addr, peers: impl IntoIterator<Item = Ipv4Addr>) -> Self {
        Self {
            status: NetworkStatus {
                local_addr,
                peers: peers
                    .into_iter()
                    .map(|addr| Peer { addr, online: true })
                    .collect(),
            },
        }
    }
}

#[async_trait]
impl AddressSource for StaticAddressSource {
    async fn status(&self) -> Result<NetworkStatus> {
        Ok(self.status.clone())
    }
}

/// Whether `addr` lies inside the tailnet's address range (100.64.0.0/10).
pub fn is_member_address(addr: Ipv4Addr) -> bool {
    let mask = u32::MAX << (32 - MEMBER_PREFIX_LEN);
    (u32::from(addr) & mask) == u32::from(MEMBER_PREFIX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_member_range_bounds() {
        assert!(is_member_address(Ipv4Addr::new(100, 64, 0, 0)));
        assert!(is_member_address(Ipv4Addr::new(100, 100, 1, 2)));
        assert!(is_member_address(Ipv4Addr::new(100, 127, 255, 255)));
    }

    #[test]
    fn test_outside_member_range() {
        // Inside 100.0.0.0/8 but outside the CGNAT block.
        assert!(!is_member_address(Ipv4Addr::new(100, 63, 255, 255)));
        assert!(!is_member_address(Ipv4Addr::new(100, 128, 0, 0)));
        assert!(!is_member_address(Ipv4Addr::new(192, 168, 1, 1)));
        assert!(!is_member_address(Ipv4Addr::LOCALHOST));
    }

    #[test]
    fn test_online_addrs_local_first_skips_offline() {
        let status = NetworkStatus {
            local_addr: Ipv4Addr::new(100, 64, 0, 1),
            peers: vec![
                Peer {
                    addr: Ipv4Addr::new(100, 64, 0, 2),
                    online: false,
                },
                Peer {
                    addr: Ipv4Addr::new(100, 64, 0, 3),
                    online: true,
                },
            ],
        };
        assert_eq!(
            status.online_addrs(),
            vec![Ipv4Addr::new(100, 64, 0, 1), Ipv4Addr::new(100, 64, 0, 3)]
        );
    }

    #[tokio::test]
    async fn test_static_source_reports_peers_online() {
        let source = StaticAddressSource::new(
            Ipv4Addr::new(127, 0, 0, 2),
            [Ipv4Addr::new(127, 0, 0, 3), Ipv4Addr::new(127, 0, 0, 4)],
        );
        let status = source.status().await.unwrap();
        assert_eq!(status.local_addr, Ipv4Addr::new(127, 0, 0, 2));
        assert_eq!(status.online_addrs().len(), 3);
        assert!(status.peers.iter().all(|p| p.online));
    }
}
