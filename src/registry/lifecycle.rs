// Election & lifecycle controller
//
// Joins this registry into the network of registries on the tailnet. Each
// pass through the loop ends in one of two setups:
//   - Leader:   the discovery port was free, so we serve on it until the
//               registry is shut down.
//   - Delegate: the discovery port is taken, so we serve on an ephemeral
//               port, register with the leader on this host, and ping it
//               every probe interval. When the leader goes away the delegate
//               server is drained and the loop starts over, this time
//               likely winning the discovery port.
// If not even an ephemeral port can be bound the loop gives up.

use std::net::SocketAddrV4;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::server::{create_router, ProtocolState};
use crate::config::Timings;
use crate::error::{RegistryError, Result};

/// Where a registry currently stands in its host's election.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeRole {
    /// Not bound to any port yet, or between attempts.
    Starting,
    /// Holds the discovery port.
    Leader,
    /// Registered with the leader, serving on `port`.
    Delegate { port: u16 },
    /// Shut down on request.
    Stopped,
    /// Could not bind any port; the loop has exited.
    Failed,
}

impl NodeRole {
    pub fn is_serving(&self) -> bool {
        matches!(self, NodeRole::Leader | NodeRole::Delegate { .. })
    }
}

/// Why a delegate pass ended.
#[derive(Debug, PartialEq, Eq)]
enum DelegateExit {
    RegistrationFailed,
    LeaderLost,
    ServerStopped,
    Shutdown,
}

impl DelegateExit {
    /// Whether the loop waits out the retry backoff before starting over.
    /// Losing the leader restarts at once so this registry can take over.
    fn backs_off(&self) -> bool {
        matches!(self, DelegateExit::RegistrationFailed | DelegateExit::ServerStopped)
    }
}

pub(crate) struct Controller {
    pub(crate) state: Arc<ProtocolState>,
    pub(crate) discovery_port: u16,
    pub(crate) timings: Timings,
    pub(crate) role_tx: watch::Sender<NodeRole>,
    pub(crate) shutdown: CancellationToken,
}

impl Controller {
    fn set_role(&self, role: NodeRole) {
        self.role_tx.send_replace(role);
    }

    /// Run the election loop until shutdown or a fatal bind error.
    pub(crate) async fn run(self) -> Result<()> {
        let local = self.state.directory.local_addr();
        let leader_addr = SocketAddrV4::new(local, self.discovery_port);

        let result = loop {
            if self.shutdown.is_cancelled() {
                break Ok(());
            }
            self.set_role(NodeRole::Starting);

            match TcpListener::bind(leader_addr).await {
                Ok(listener) => {
                    self.run_leader(listener, leader_addr).await;
                    continue;
                }
                Err(e) => tracing::debug!("Discovery port {} unavailable: {}", leader_addr, e),
            }

            let listener = match TcpListener::bind(SocketAddrV4::new(local, 0)).await {
                Ok(listener) => listener,
                Err(source) => {
                    error!("Couldn't bind to any port on {}: {}", local, source);
                    break Err(RegistryError::Bind {
                        addr: local,
                        source,
                    });
                }
            };

            if self.run_delegate(listener, leader_addr).await.backs_off() {
                info!(
                    "Waiting {:?} before restarting registry",
                    self.timings.retry_backoff
                );
                tokio::select! {
                    _ = self.shutdown.cancelled() => {}
                    _ = tokio::time::sleep(self.timings.retry_backoff) => {}
                }
            }
        };

        self.set_role(if result.is_ok() {
            NodeRole::Stopped
        } else {
            NodeRole::Failed
        });
        result
    }

    /// Serve on the discovery port until shutdown.
    async fn run_leader(&self, listener: TcpListener, addr: SocketAddrV4) {
        info!("Registry started as leader on {}", addr);
        self.set_role(NodeRole::Leader);

        let token = self.shutdown.clone();
        let app = create_router(Arc::clone(&self.state));
        let served = axum::serve(listener, app)
            .with_graceful_shutdown(async move { token.cancelled().await })
            .await;
        match served {
            Ok(()) => info!("Registry leader exited"),
            Err(e) => warn!("Registry leader exited with error: {}", e),
        }
    }

    /// Serve on an ephemeral port as the leader's delegate.
    async fn run_delegate(&self, listener: TcpListener, leader: SocketAddrV4) -> DelegateExit {
        let port = match listener.local_addr() {
            Ok(addr) => addr.port(),
            Err(e) => {
                warn!("Cannot read delegate listener address: {}", e);
                return DelegateExit::ServerStopped;
            }
        };
        let own = SocketAddrV4::new(*leader.ip(), port);

        // Stopping this token drains the delegate server; it also fires when
        // the whole registry shuts down.
        let server_token = self.shutdown.child_token();
        let token = server_token.clone();
        let app = create_router(Arc::clone(&self.state));
        let mut server = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move { token.cancelled().await })
                .await
        });

        if let Err(e) = self.state.client.register_delegate(leader, own).await {
            warn!("Cannot register as delegate with {}: {}", leader, e);
            server_token.cancel();
            if let Err(e) = server.await {
                error!("Delegate server task failed: {}", e);
            }
            return DelegateExit::RegistrationFailed;
        }
        info!("Registry started as delegate on {} (leader {})", own, leader);
        self.set_role(NodeRole::Delegate { port });

        let mut ticker = tokio::time::interval(self.timings.probe_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            tokio::select! {
                served = &mut server => {
                    return match served {
                        Ok(Ok(())) if self.shutdown.is_cancelled() => {
                            info!("Registry delegate exited");
                            DelegateExit::Shutdown
                        }
                        Ok(Ok(())) => {
                            warn!("Registry delegate stopped unexpectedly");
                            DelegateExit::ServerStopped
                        }
                        Ok(Err(e)) => {
                            warn!("Registry delegate exited with error: {}", e);
                            DelegateExit::ServerStopped
                        }
                        Err(e) => {
                            error!("Delegate server task failed: {}", e);
                            DelegateExit::ServerStopped
                        }
                    };
                }
                _ = ticker.tick() => {
                    if !self.state.client.ping(leader).await {
                        info!("Leader is unreachable. Stopping delegate.");
                        server_token.cancel();
                        if let Err(e) = (&mut server).await {
                            error!("Delegate server task failed: {}", e);
                        }
                        return DelegateExit::LeaderLost;
                    }
                }
            }
        }
    }
}
