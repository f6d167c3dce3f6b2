//! RTMP server listener
//!
//! Handles TCP accept loop and spawns connection handlers.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;

use crate::error::Result;
use crate::registry::{MediaKey, Registry, Subscription};
use crate::server::config::ServerConfig;
use crate::server::connection::Connection;

/// RTMP ingest server
pub struct RtmpServer {
    config: Arc<ServerConfig>,
    registry: Arc<Registry>,
    next_session_id: AtomicU64,
    connection_semaphore: Option<Arc<Semaphore>>,
}

impl RtmpServer {
    pub fn new(config: ServerConfig) -> Self {
        Self::with_registry(config, Arc::new(Registry::new()))
    }

    /// Serve into an existing registry, e.g. one shared with playback code
    pub fn with_registry(config: ServerConfig, registry: Arc<Registry>) -> Self {
        let connection_semaphore = if config.max_connections > 0 {
            Some(Arc::new(Semaphore::new(config.max_connections)))
        } else {
            None
        };

        Self {
            config: Arc::new(config),
            registry,
            next_session_id: AtomicU64::new(1),
            connection_semaphore,
        }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Attach a reader to the live source at `key`, queueing up to
    /// `subscriber_queue` packets. `None` while nothing publishes there.
    pub fn subscribe<S>(&self, key: &MediaKey, transport: &Arc<S>) -> Option<Subscription>
    where
        S: Send + Sync + 'static,
    {
        let source = self.registry.find(key).0?;
        Some(source.subscribe(transport, self.config.subscriber_queue))
    }

    /// Run the server
    ///
    /// This method blocks until accepting fails irrecoverably.
    pub async fn run(&self) -> Result<()> {
        let listener = self.bind().await?;
        self.accept_loop(&listener).await
    }

    /// Run the server with graceful shutdown
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let listener = self.bind().await?;
        self.serve_until(listener, shutdown).await
    }

    /// Serve on an already bound listener until `shutdown` completes.
    ///
    /// The registry is cleared on return, so sources of connections still
    /// running are no longer discoverable.
    pub async fn serve_until<F>(&self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let result = tokio::select! {
            _ = shutdown => {
                tracing::info!("Shutdown signal received");
                Ok(())
            }
            result = self.accept_loop(&listener) => result,
        };

        self.registry.shutdown();
        result
    }

    async fn bind(&self) -> Result<TcpListener> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        tracing::info!(addr = %listener.local_addr()?, "RTMP server listening");
        Ok(listener)
    }

    async fn accept_loop(&self, listener: &TcpListener) -> Result<()> {
        loop {
            match listener.accept().await {
                Ok((socket, peer_addr)) => {
                    self.handle_connection(socket, peer_addr);
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to accept connection");
                }
            }
        }
    }

    fn handle_connection(&self, socket: TcpStream, peer_addr: SocketAddr) {
        let permit = match &self.connection_semaphore {
            Some(sem) => match Arc::clone(sem).try_acquire_owned() {
                Ok(permit) => Some(permit),
                Err(_) => {
                    tracing::warn!(peer = %peer_addr, "Connection rejected: limit reached");
                    return;
                }
            },
            None => None,
        };

        let session_id = self.next_session_id.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(session_id, peer = %peer_addr, "New connection");

        if self.config.tcp_nodelay {
            if let Err(e) = socket.set_nodelay(true) {
                tracing::error!(session_id, error = %e, "Failed to configure socket");
                return;
            }
        }

        let config = Arc::clone(&self.config);
        let registry = Arc::clone(&self.registry);

        tokio::spawn(async move {
            let _permit = permit;
            let mut connection = Connection::new(session_id, socket, peer_addr, config, registry);
            // run() logs its own outcome
            let _ = connection.run().await;
        });
    }

    pub fn bind_addr(&self) -> SocketAddr {
        self.config.bind_addr
    }
}
