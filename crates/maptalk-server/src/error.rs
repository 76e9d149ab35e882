//! Server error types.

use thiserror::Error;

/// Errors raised while starting or running the relay server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The listening socket could not be bound.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Address that was requested.
        addr: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// Other socket-level failure.
    #[error("server I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// [`RelayServer::listen`](crate::RelayServer::listen) was called twice.
    #[error("server is already listening")]
    AlreadyListening,
}
