//! TCP accept loop.
//!
//! One long-running task accepts connections on the configured port and runs
//! the full handshake for each socket to completion before accepting the
//! next.  Handshakes are deliberately not parallelized: the exchange rounds
//! are bounded by short timeouts, and serializing them keeps the
//! collision-snapshot window trivial.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::config::Settings;
use crate::connection::gatekeeper::Gatekeeper;
use crate::connection::health::{ClientHealthChecker, REGISTRATION_GRACE};
use crate::desktop::DesktopHandle;

/// The listening server: accept task plus health supervision.
pub struct TcpServer {
    accept_task: JoinHandle<()>,
    health: Arc<ClientHealthChecker>,
    local_addr: SocketAddr,
}

impl TcpServer {
    /// Binds the configured port and starts accepting connections.
    ///
    /// # Errors
    ///
    /// Returns the bind error, typically "address already in use".
    pub async fn start(
        settings: &Settings,
        desktop: DesktopHandle,
    ) -> std::io::Result<TcpServer> {
        let listener = TcpListener::bind(("0.0.0.0", settings.port)).await?;
        let local_addr = listener.local_addr()?;

        let server_id = Uuid::new_v4();
        let gatekeeper = Gatekeeper::new(settings.password.clone(), server_id, desktop.clone());
        let health = Arc::new(ClientHealthChecker::new(desktop));

        debug!("server id: '{server_id}'");
        info!("waiting for incoming connections on {local_addr}");

        let health_for_loop = Arc::clone(&health);
        let accept_task = tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, peer)) => {
                        info!("new incoming connection from {peer}");
                        // The client count may change in the next moment; do
                        // not let the checker stop on data that is about to
                        // be stale.
                        health_for_loop.keep_running(REGISTRATION_GRACE);
                        let result = gatekeeper.handle_incoming(stream).await;
                        if result.succeeded() {
                            health_for_loop.start();
                        }
                    }
                    Err(e) => {
                        error!("accept failed: {e}");
                        tokio::time::sleep(Duration::from_millis(100)).await;
                    }
                }
            }
        });

        Ok(TcpServer {
            accept_task,
            health,
            local_addr,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stops accepting, stops the health checker, and disconnects every
    /// client.
    pub async fn shutdown(self, desktop: &DesktopHandle) {
        self.accept_task.abort();
        self.health.stop();
        desktop.disconnect_all().await;
        debug!("tcp server stopped");
    }
}
