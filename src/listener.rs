//! Loopback listener and accept loop.
//!
//! The listener owns the only endpoint in the process. Every accepted
//! stream is moved into its own session task, so the accept loop never
//! holds a handle to a client after dispatch and never waits on a session.

use std::future::Future;
use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tracing::{info, warn};

use crate::error::{AcceptError, StartupError};
use crate::session;

/// Pending connections the kernel queues before `accept`.
pub const BACKLOG: i32 = 5;

/// Pause before accepting again after running out of descriptors or buffers.
const EXHAUSTED_PAUSE: Duration = Duration::from_millis(100);

/// The bound, listening socket.
pub struct Endpoint {
    listener: TcpListener,
    addr: SocketAddr,
}

impl Endpoint {
    /// Bind `127.0.0.1:port` and start listening.
    ///
    /// Must be called from within a tokio runtime. Port 0 picks an
    /// ephemeral port; see [`Endpoint::local_addr`].
    pub fn bind(port: u16) -> Result<Self, StartupError> {
        let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, port));

        let socket = socket2::Socket::new(
            socket2::Domain::IPV4,
            socket2::Type::STREAM,
            Some(socket2::Protocol::TCP),
        )
        .map_err(StartupError::Open)?;
        info!("Opened a gateway socket");

        // No SO_REUSEPORT: a second server on the same port must fail to bind.
        #[cfg(unix)]
        socket.set_reuse_address(true).map_err(StartupError::Open)?;

        socket
            .bind(&addr.into())
            .map_err(|source| StartupError::Bind { addr, source })?;
        info!(port, "Bound to port on localhost");

        socket
            .listen(BACKLOG)
            .map_err(|source| StartupError::Listen { addr, source })?;

        socket.set_nonblocking(true).map_err(StartupError::Register)?;
        let listener =
            TcpListener::from_std(socket.into()).map_err(StartupError::Register)?;
        let addr = listener.local_addr().map_err(StartupError::Register)?;
        info!(address = %addr, backlog = BACKLOG, "Listening");

        Ok(Self { listener, addr })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }
}

/// Accept loop that hands each client to a session task.
pub struct Listener {
    endpoint: Endpoint,
    next_session: u64,
}

impl Listener {
    pub fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            next_session: 0,
        }
    }

    /// Accept clients until `shutdown` resolves or the endpoint breaks.
    ///
    /// Failures tied to one connection are logged and skipped. When the
    /// process runs out of descriptors or buffers the loop waits
    /// [`EXHAUSTED_PAUSE`] before accepting again.
    pub async fn run<F>(mut self, shutdown: F) -> Result<(), AcceptError>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        loop {
            let accepted = tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutting down listener");
                    return Ok(());
                }
                accepted = self.endpoint.listener.accept() => accepted,
            };

            let e = match accepted {
                Ok((stream, peer)) => {
                    self.dispatch(stream, peer);
                    continue;
                }
                Err(e) => e,
            };

            let failure = classify(&e);
            if failure == AcceptFailure::Fatal {
                return Err(AcceptError(e));
            }
            warn!(error = %e, ?failure, "Failed to accept connection");

            if let Some(pause) = failure.pause() {
                tokio::select! {
                    _ = &mut shutdown => {
                        info!("Shutting down listener");
                        return Ok(());
                    }
                    _ = tokio::time::sleep(pause) => {}
                }
            }
        }
    }

    fn dispatch(&mut self, stream: TcpStream, peer: SocketAddr) {
        let id = self.next_session;
        self.next_session += 1;

        info!(session = id, peer = %peer, "A client just connected");
        session::spawn(id, peer, stream);
        info!(session = id, "Client delegated to session worker");
    }
}

/// How the accept loop reacts to a failed `accept`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AcceptFailure {
    /// The pending connection failed; accept the next one right away.
    Connection,
    /// Out of descriptors or buffers; sessions closing will free some.
    Exhausted,
    /// The endpoint itself is unusable.
    Fatal,
}

impl AcceptFailure {
    /// How long to wait before the next `accept`, if at all.
    fn pause(self) -> Option<Duration> {
        match self {
            AcceptFailure::Exhausted => Some(EXHAUSTED_PAUSE),
            AcceptFailure::Connection | AcceptFailure::Fatal => None,
        }
    }
}

fn classify(e: &io::Error) -> AcceptFailure {
    if matches!(
        e.kind(),
        io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionRefused
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
            | io::ErrorKind::TimedOut
    ) {
        return AcceptFailure::Connection;
    }

    match e.raw_os_error() {
        // Linux reports protocol errors of the pending connection via accept
        Some(libc::EPROTO) => AcceptFailure::Connection,
        Some(libc::EMFILE | libc::ENFILE | libc::ENOBUFS | libc::ENOMEM) => {
            AcceptFailure::Exhausted
        }
        _ => AcceptFailure::Fatal,
    }
}
