//! The unreliable datagram transport the protocol engine runs on.
//!
//! Every protocol operation takes a `&mut T where T: Transport` instead of a
//! global socket, so the same engine drives a real UDP socket
//! ([`crate::socket::UdpTransport`]), an in-memory link
//! ([`crate::simulator::MemoryTransport`]) or a fault-injecting wrapper
//! ([`crate::simulator::Simulator`]).

use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;

/// Errors reported by a [`Transport`].
///
/// The variants separate the outcomes the engine treats differently: an
/// expired wait is retried, a peer-closed signal ends the exchange cleanly,
/// everything else is fatal.
#[derive(Debug, Error)]
pub enum TransportError {
    /// No datagram arrived within the requested wait.
    #[error("timed out waiting for a datagram")]
    TimedOut,
    /// `from` shut the transport down (zero-length datagram).
    #[error("peer {from} closed the transport")]
    PeerClosed { from: SocketAddr },
    /// This transport has already been released.
    #[error("transport is closed")]
    Closed,
    /// Underlying I/O error from the OS.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TransportError {
    /// `true` for [`TransportError::TimedOut`].
    pub fn is_timeout(&self) -> bool {
        matches!(self, TransportError::TimedOut)
    }
}

/// A datagram endpoint with bounded receive waits.
///
/// Implementations must report a zero-length datagram as
/// [`TransportError::PeerClosed`] and an expired wait as
/// [`TransportError::TimedOut`], never as a generic I/O error.
#[allow(async_fn_in_trait)]
pub trait Transport {
    /// Send `bytes` as one datagram to `dest`, returning the bytes written.
    async fn send_to(&mut self, bytes: &[u8], dest: SocketAddr) -> Result<usize, TransportError>;

    /// Wait for the next datagram, at most `timeout` if one is given.
    ///
    /// Returns the datagram and the address it came from.
    async fn recv_timeout(
        &mut self,
        timeout: Option<Duration>,
    ) -> Result<(Vec<u8>, SocketAddr), TransportError>;

    /// Release the underlying resource.  Calling it again is a no-op.
    fn close(&mut self);

    /// `true` once [`Transport::close`] has run.
    fn is_closed(&self) -> bool;

    /// Local address of this endpoint.
    fn local_addr(&self) -> SocketAddr;
}
