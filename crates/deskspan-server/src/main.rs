//! DeskSpan server entry point.
//!
//! Wires the desktop-manager actor, the input router, and the TCP listener
//! together, then parks until a shutdown signal arrives.
//!
//! ```text
//! main()
//!  ├─ Settings::load_or_default()   -- TOML settings, generated on first run
//!  ├─ desktop::spawn()              -- single-consumer desktop actor
//!  ├─ Router task                   -- consumes raw input events
//!  └─ TcpServer::start()            -- accept loop + health checker
//! ```
//!
//! This binary runs headless: the OS input hook, injection, and clipboard
//! collaborators are mock implementations.  A platform front end supplies
//! real ones and feeds captured events into the router channel.

use std::path::Path;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use deskspan_server::config::{Settings, SETTINGS_PATH};
use deskspan_server::connection::TcpServer;
use deskspan_server::desktop::{self, DesktopManager};
use deskspan_server::platform::{MockPlatform, RawInputEvent};
use deskspan_server::router::Router;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Structured logging; level overridden by `RUST_LOG`.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("DeskSpan server starting");

    let settings = Settings::load_or_default(Path::new(SETTINGS_PATH));
    debug!("listening port: {}", settings.port);

    let platform = Arc::new(MockPlatform::with_primary_screen(1920, 1080));

    // Active-target changes flow from the manager to the router.
    let (notify_tx, notify_rx) = mpsc::unbounded_channel();
    let manager = DesktopManager::new(
        settings.mode,
        platform.clone(),
        platform.clone(),
        platform.as_ref(),
        notify_tx,
    );
    let (desktop, actor_task) = desktop::spawn(manager);

    // The raw input source hands captured events to this channel; the router
    // answers each with a keep/discard decision for the hook.
    let (input_tx, mut input_rx) = mpsc::unbounded_channel::<RawInputEvent>();
    let mut router = Router::new(desktop.clone(), settings.hotkey_bindings(), notify_rx);
    let router_task = tokio::spawn(async move {
        while let Some(event) = input_rx.recv().await {
            let _decision = router.handle_event(event).await;
        }
    });

    let server = TcpServer::start(&settings, desktop.clone()).await?;
    info!("ready on {}; press Ctrl-C to exit", server.local_addr());

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");

    drop(input_tx);
    server.shutdown(&desktop).await;
    desktop.poison().await;
    actor_task.await.ok();
    router_task.await.ok();

    info!("DeskSpan server stopped");
    Ok(())
}
