//! Sender side: handshake, acknowledged transfer and teardown.
//!
//! The three free functions are the protocol operations; each is one call to
//! [`crate::arq::exchange`] with a different outbound packet.  [`Connection`]
//! bundles them with the transport and the responder address for callers
//! that want a handle instead of threading state by hand.
//!
//! ```ignore
//! let mut conn = Connection::connect(transport, server, RetryPolicy::default()).await?;
//! conn.send_all(&file).await?;
//! conn.close().await?;
//! ```

use std::net::SocketAddr;

use thiserror::Error;

use crate::arq::{exchange, AckSource, ArqError, Outcome};
use crate::packet::{Kind, Packet, PAYLOAD_CAPACITY};
use crate::state::SenderState;
use crate::timer::RetryPolicy;
use crate::transport::{Transport, TransportError};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("handshake failed: no acknowledgment after {attempts} attempt(s)")]
    HandshakeFailed { attempts: u32 },
    #[error("peer closed the transport during the handshake")]
    PeerClosed,
    #[error("handshake aborted: {0}")]
    Transport(TransportError),
}

#[derive(Debug, Error)]
pub enum SendError {
    #[error("chunk of {len} bytes exceeds payload capacity {PAYLOAD_CAPACITY}")]
    PayloadTooLarge { len: usize },
    #[error("refusing to send an empty chunk")]
    EmptyChunk,
    #[error("data not acknowledged after {attempts} attempt(s)")]
    MaxAttemptsExceeded { attempts: u32 },
    #[error("connection is not established")]
    NotConnected,
    #[error("send aborted: {0}")]
    Fatal(TransportError),
}

#[derive(Debug, Error)]
pub enum CloseError {
    #[error("close request not acknowledged after {attempts} attempt(s)")]
    MaxAttemptsExceeded { attempts: u32 },
    #[error("peer closed the transport before acknowledging the close request")]
    PeerClosed,
    #[error("close aborted: {0}")]
    Transport(TransportError),
}

// ---------------------------------------------------------------------------
// Protocol operations
// ---------------------------------------------------------------------------

/// Perform the handshake with `peer`.
///
/// Returns the address that acknowledged, which may differ from `peer`; all
/// later exchanges must use it.
pub async fn connect<T: Transport>(
    transport: &mut T,
    peer: SocketAddr,
    policy: &RetryPolicy,
) -> Result<SocketAddr, ConnectError> {
    log::info!("[rudp] requesting connection to {peer}");
    let syn = Packet::control(Kind::ConnectionRequest);

    match exchange(transport, &syn, peer, AckSource::Any, policy).await {
        Ok(Outcome::Acknowledged { from, .. }) => {
            if from != peer {
                log::info!("[rudp] {from} answered for {peer}; binding to responder");
            }
            Ok(from)
        }
        Ok(Outcome::PeerClosed) => Err(ConnectError::PeerClosed),
        Err(ArqError::MaxAttemptsExceeded { attempts }) => {
            Err(ConnectError::HandshakeFailed { attempts })
        }
        Err(ArqError::Transport(e)) => Err(ConnectError::Transport(e)),
    }
}

/// Deliver one chunk to `peer` and wait for its acknowledgment.
///
/// Returns the number of payload bytes delivered, or `0` if the peer closed
/// the transport (nothing more can be sent).  Empty chunks are rejected, so
/// `0` never means an acknowledged empty packet.
pub async fn send_reliable<T: Transport>(
    transport: &mut T,
    chunk: &[u8],
    peer: SocketAddr,
    policy: &RetryPolicy,
) -> Result<usize, SendError> {
    if chunk.is_empty() {
        return Err(SendError::EmptyChunk);
    }
    let packet =
        Packet::data(chunk).map_err(|_| SendError::PayloadTooLarge { len: chunk.len() })?;

    match exchange(transport, &packet, peer, AckSource::Peer(peer), policy).await {
        Ok(Outcome::Acknowledged { .. }) => Ok(chunk.len()),
        Ok(Outcome::PeerClosed) => Ok(0),
        Err(ArqError::MaxAttemptsExceeded { attempts }) => {
            Err(SendError::MaxAttemptsExceeded { attempts })
        }
        Err(ArqError::Transport(e)) => Err(SendError::Fatal(e)),
    }
}

/// Tear the connection down and release `transport`.
///
/// The transport is released on every path, including a failed close
/// handshake; the remote peer may then still consider itself connected.
pub async fn close<T: Transport>(
    transport: &mut T,
    peer: SocketAddr,
    policy: &RetryPolicy,
) -> Result<(), CloseError> {
    log::info!("[rudp] requesting close with {peer}");
    let fin = Packet::control(Kind::CloseRequest);

    let result = match exchange(transport, &fin, peer, AckSource::Peer(peer), policy).await {
        Ok(Outcome::Acknowledged { .. }) => Ok(()),
        Ok(Outcome::PeerClosed) => return Err(CloseError::PeerClosed),
        Err(ArqError::MaxAttemptsExceeded { attempts }) => {
            Err(CloseError::MaxAttemptsExceeded { attempts })
        }
        Err(ArqError::Transport(e)) => return Err(CloseError::Transport(e)),
    };
    // Fatal and peer-closed paths were released inside `exchange`.
    transport.close();
    result
}

// ---------------------------------------------------------------------------
// Connection
// ---------------------------------------------------------------------------

/// An established sender-side connection.
///
/// Owns the transport for its whole lifetime and releases it when the
/// connection is closed, fails fatally, or sees the peer close.
#[derive(Debug)]
pub struct Connection<T: Transport> {
    transport: T,
    /// Responder address observed during the handshake.
    peer: SocketAddr,
    policy: RetryPolicy,
    state: SenderState,
}

impl<T: Transport> Connection<T> {
    /// Handshake with `peer` and return a connection bound to the responder.
    ///
    /// On failure the transport is released exactly once before the error is
    /// returned.
    pub async fn connect(
        mut transport: T,
        peer: SocketAddr,
        policy: RetryPolicy,
    ) -> Result<Self, ConnectError> {
        match connect(&mut transport, peer, &policy).await {
            Ok(responder) => Ok(Self {
                transport,
                peer: responder,
                policy,
                state: SenderState::Connected,
            }),
            Err(e) => {
                // Fatal and peer-closed paths were released inside `exchange`.
                if !transport.is_closed() {
                    transport.close();
                }
                Err(e)
            }
        }
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn state(&self) -> SenderState {
        self.state
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.transport.local_addr()
    }

    /// Send one chunk of at most [`PAYLOAD_CAPACITY`] bytes.
    ///
    /// `Ok(0)` means the peer closed the transport; the connection is then
    /// closed too.
    pub async fn send(&mut self, chunk: &[u8]) -> Result<usize, SendError> {
        if self.state != SenderState::Connected {
            return Err(SendError::NotConnected);
        }
        let result = send_reliable(&mut self.transport, chunk, self.peer, &self.policy).await;
        if self.transport.is_closed() {
            self.state = SenderState::Closed;
        }
        result
    }

    /// Send `data` in [`PAYLOAD_CAPACITY`]-sized chunks, one at a time.
    ///
    /// Returns the bytes delivered, which is short of `data.len()` only if
    /// the peer closed the transport part-way.
    pub async fn send_all(&mut self, data: &[u8]) -> Result<usize, SendError> {
        let mut delivered = 0;
        for chunk in data.chunks(PAYLOAD_CAPACITY) {
            let n = self.send(chunk).await?;
            if n == 0 {
                log::warn!("[rudp] peer closed after {delivered} of {} bytes", data.len());
                break;
            }
            delivered += n;
        }
        Ok(delivered)
    }

    /// Tear the connection down.  The transport is released either way.
    pub async fn close(mut self) -> Result<(), CloseError> {
        if self.state != SenderState::Connected {
            self.transport.close();
            return Ok(());
        }
        self.state = SenderState::Closed;
        close(&mut self.transport, self.peer, &self.policy).await
    }
}
