//! Error types, split by the scope that is allowed to handle them.
//!
//! Startup and accept errors end the process. Session errors end one
//! session task and never reach the listener.

use std::io;
use std::net::SocketAddr;
use thiserror::Error;

/// Failure to create the listening endpoint.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("unable to open socket: {0}")]
    Open(#[source] io::Error),

    #[error("unable to bind to {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("unable to listen on {addr}: {source}")]
    Listen {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("unable to register listener with the runtime: {0}")]
    Register(#[source] io::Error),
}

/// The endpoint stopped accepting connections for a non-transient reason.
#[derive(Debug, Error)]
#[error("unable to accept client: {0}")]
pub struct AcceptError(#[source] pub io::Error);

/// I/O failure inside one session.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("unable to write greeting: {0}")]
    Greeting(#[source] io::Error),

    #[error("unable to read from client: {0}")]
    Read(#[source] io::Error),

    #[error("unable to write response: {0}")]
    Respond(#[source] io::Error),
}
