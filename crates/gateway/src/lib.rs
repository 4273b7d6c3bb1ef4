//! WebSocket gateway pushing domain events to subscribed clients.
//!
//! Every connection gets its own bounded outbound queue drained by a writer
//! task, so a slow client never holds up event routing for the others.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod connection;
mod error;

pub use error::Error;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::extract::{State, WebSocketUpgrade};
use axum::response::Response;
use axum::routing::get;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{error, info};
use txflow_fanout::SubscriptionRegistry;

/// Options for the gateway.
#[derive(Clone, Debug)]
pub struct GatewayOptions {
    /// Address the HTTP server binds to.
    pub listen_addr: SocketAddr,

    /// Path of the WebSocket endpoint.
    pub path: String,

    /// Messages queued per connection before it is considered dead.
    pub outbound_buffer: usize,
}

impl Default for GatewayOptions {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 3003)),
            path: "/ws".to_string(),
            outbound_buffer: 256,
        }
    }
}

#[derive(Clone)]
struct GatewayState {
    outbound_buffer: usize,
    registry: Arc<SubscriptionRegistry>,
    shutdown_token: CancellationToken,
    task_tracker: TaskTracker,
}

/// The real-time WebSocket server.
#[derive(Clone, Debug)]
pub struct Gateway {
    options: GatewayOptions,
    registry: Arc<SubscriptionRegistry>,
    shutdown_token: CancellationToken,
    task_tracker: TaskTracker,
}

impl Gateway {
    /// Creates a gateway serving connections out of `registry`.
    #[must_use]
    pub fn new(options: GatewayOptions, registry: Arc<SubscriptionRegistry>) -> Self {
        Self {
            options,
            registry,
            shutdown_token: CancellationToken::new(),
            task_tracker: TaskTracker::new(),
        }
    }

    /// The registry connections are registered in.
    #[must_use]
    pub const fn registry(&self) -> &Arc<SubscriptionRegistry> {
        &self.registry
    }

    /// Routes of the gateway: the WebSocket endpoint and `/health`.
    pub fn router(&self) -> Router {
        let state = GatewayState {
            outbound_buffer: self.options.outbound_buffer,
            registry: self.registry.clone(),
            shutdown_token: self.shutdown_token.clone(),
            task_tracker: self.task_tracker.clone(),
        };

        Router::new()
            .route(&self.options.path, get(ws_handler))
            .route("/health", get(|| async { "OK" }))
            .with_state(state)
    }

    /// Binds the listen address and serves in the background. Returns the
    /// bound address.
    ///
    /// # Errors
    /// Returns an error if the address cannot be bound.
    pub async fn start(&self) -> Result<SocketAddr, Error> {
        let listener = TcpListener::bind(self.options.listen_addr)
            .await
            .map_err(|source| Error::Bind {
                addr: self.options.listen_addr,
                source,
            })?;
        let addr = listener.local_addr()?;

        let app = self.router();
        let shutdown_token = self.shutdown_token.clone();

        self.task_tracker.spawn(async move {
            let server = axum::serve(listener, app)
                .with_graceful_shutdown(async move { shutdown_token.cancelled().await });

            if let Err(e) = server.await {
                error!("gateway server failed: {e}");
            }
        });

        info!("gateway listening on ws://{addr}{}", self.options.path);

        Ok(addr)
    }

    /// Closes every connection and stops the server.
    pub async fn shutdown(&self) {
        info!("gateway shutting down");

        self.shutdown_token.cancel();
        self.task_tracker.close();
        self.task_tracker.wait().await;

        info!("gateway shut down");
    }
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<GatewayState>) -> Response {
    ws.on_upgrade(move |socket| {
        state.task_tracker.track_future(connection::serve_socket(
            socket,
            state.registry.clone(),
            state.outbound_buffer,
            state.shutdown_token.clone(),
        ))
    })
}
