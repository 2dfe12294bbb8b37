//! TCP front-end: one Bifrost session per accepted connection.

use std::fmt;
use std::io;
use std::net::SocketAddr;

use anyhow::Context;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::bifrost::{IoClient, IoClientError};
use crate::comm::Client;
use crate::comm::bridge;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1357,
        }
    }
}

impl ServerConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Unique identifier for an accepted connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(uuid::Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub struct Server {
    listener: TcpListener,
}

impl Server {
    pub async fn bind(config: &ServerConfig) -> anyhow::Result<Self> {
        let addr = config.addr();
        let listener = TcpListener::bind(&addr)
            .await
            .with_context(|| format!("failed to listen on {addr}"))?;
        tracing::info!("Listening for Bifrost clients on {}", listener.local_addr()?);
        Ok(Self { listener })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accepts connections until cancelled or until the hub stops.
    ///
    /// `client` is the server's own hub client. Each connection gets a copy of
    /// it; the original is only drained. On exit every session is cancelled
    /// and joined before returning.
    pub async fn run(self, mut client: Client, cancel: CancellationToken) {
        let sessions_cancel = cancel.child_token();
        let mut sessions = JoinSet::new();

        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    tracing::info!("Server shutting down");
                    break;
                }

                accepted = self.listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(accepted) => accepted,
                        Err(e) => {
                            tracing::warn!(error = %e, "Failed to accept connection");
                            continue;
                        }
                    };
                    let session_client = match client.copy() {
                        Ok(c) => c,
                        Err(e) => {
                            tracing::warn!(%peer, error = %e, "Refusing connection");
                            break;
                        }
                    };
                    let id = ConnectionId::new();
                    tracing::info!(connection = %id, %peer, "Client connected");
                    sessions.spawn(session(id, stream, session_client, sessions_cancel.clone()));
                }

                response = client.recv() => {
                    if response.is_none() {
                        tracing::info!("Hub stopped, closing server");
                        break;
                    }
                }

                Some(joined) = sessions.join_next() => {
                    if let Err(e) = joined {
                        tracing::error!(error = %e, "Session task failed");
                    }
                }
            }
        }

        sessions_cancel.cancel();
        drop(client);
        while let Some(joined) = sessions.join_next().await {
            if let Err(e) = joined {
                tracing::error!(error = %e, "Session task failed");
            }
        }
        tracing::info!("Server stopped");
    }
}

async fn session(id: ConnectionId, stream: TcpStream, client: Client, cancel: CancellationToken) {
    let (io, endpoint) = IoClient::from_stream(stream);
    bridge::serve(io, endpoint, client, id.to_string(), cancel, |e| match e {
        IoClientError::HungUp => tracing::info!(connection = %id, "Client disconnected"),
        IoClientError::Parse(e) => {
            tracing::warn!(connection = %id, error = %e, "Invalid message")
        }
        IoClientError::Io(e) => tracing::warn!(connection = %id, error = %e, "Connection error"),
    })
    .await;
    tracing::debug!(connection = %id, "Session ended");
}
