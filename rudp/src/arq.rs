//! The single ARQ primitive: send a packet, wait for an acknowledgment,
//! retransmit on timeout.
//!
//! Handshake, data transfer and teardown differ only in the packet they send
//! and in which source addresses may acknowledge it, so all three go through
//! [`exchange`].
//!
//! # Stop-and-wait contract
//! - At most **one** packet is in flight; `exchange` does not return until it
//!   is acknowledged or abandoned.
//! - The packet is encoded once; every retransmission sends identical bytes.
//! - A timeout is the only outcome that triggers a retransmission.
//! - Packets other than an acceptable `ACK` do not end the wait; they are
//!   ignored for the remainder of the current attempt.  The same holds for a
//!   peer-closed signal from an address that may not acknowledge.

use std::net::SocketAddr;

use thiserror::Error;
use tokio::time::Instant;

use crate::packet::{Kind, Packet};
use crate::timer::RetryPolicy;
use crate::transport::{Transport, TransportError};

/// Which source addresses may acknowledge the in-flight packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckSource {
    /// Any responder (handshake: the responder becomes the peer).
    Any,
    /// Only the established peer.
    Peer(SocketAddr),
}

impl AckSource {
    fn admits(self, from: SocketAddr) -> bool {
        match self {
            AckSource::Any => true,
            AckSource::Peer(peer) => peer == from,
        }
    }
}

/// How an exchange ended without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// An acknowledgment arrived from `from` after `attempts` transmissions.
    Acknowledged { from: SocketAddr, attempts: u32 },
    /// The peer closed the transport; the local transport has been released.
    PeerClosed,
}

#[derive(Debug, Error)]
pub enum ArqError {
    #[error("no acknowledgment after {attempts} attempt(s)")]
    MaxAttemptsExceeded { attempts: u32 },
    /// Non-timeout transport failure; the local transport has been released.
    #[error(transparent)]
    Transport(TransportError),
}

/// Transmit `packet` to `dest` until it is acknowledged or the retry budget
/// runs out.
///
/// Exactly `policy.max_attempts` transmissions happen before
/// [`ArqError::MaxAttemptsExceeded`].  Fatal transport errors and a
/// peer-closed signal release `transport` before returning.
pub async fn exchange<T: Transport>(
    transport: &mut T,
    packet: &Packet,
    dest: SocketAddr,
    accept: AckSource,
    policy: &RetryPolicy,
) -> Result<Outcome, ArqError> {
    let bytes = packet.encode();

    for attempt in 1..=policy.max_attempts {
        if let Err(e) = transport.send_to(&bytes, dest).await {
            log::debug!("[rudp] → {} to {dest} failed: {e}", packet.kind());
            transport.close();
            return Err(ArqError::Transport(e));
        }
        log::debug!(
            "[rudp] → {} len={} to {dest} (attempt {attempt}/{})",
            packet.kind(),
            packet.length(),
            policy.max_attempts
        );

        match await_ack(transport, accept, policy).await {
            Ok(from) => {
                log::debug!("[rudp] ← ACK from {from}");
                return Ok(Outcome::Acknowledged { from, attempts: attempt });
            }
            Err(TransportError::TimedOut) => {
                log::debug!("[rudp] timeout waiting for ACK of {}", packet.kind());
            }
            Err(TransportError::PeerClosed { from }) => {
                log::info!("[rudp] {from} closed the transport during {}", packet.kind());
                transport.close();
                return Ok(Outcome::PeerClosed);
            }
            Err(e) => {
                transport.close();
                return Err(ArqError::Transport(e));
            }
        }
    }

    log::warn!(
        "[rudp] {} not acknowledged after {} attempt(s)",
        packet.kind(),
        policy.max_attempts
    );
    Err(ArqError::MaxAttemptsExceeded {
        attempts: policy.max_attempts,
    })
}

/// Wait up to `policy.timeout` for an acceptable acknowledgment.
async fn await_ack<T: Transport>(
    transport: &mut T,
    accept: AckSource,
    policy: &RetryPolicy,
) -> Result<SocketAddr, TransportError> {
    let deadline = Instant::now() + policy.timeout;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(TransportError::TimedOut);
        }

        let (bytes, from) = match transport.recv_timeout(Some(remaining)).await {
            Ok(datagram) => datagram,
            Err(TransportError::PeerClosed { from }) if !accept.admits(from) => {
                log::debug!("[rudp] ignoring shutdown signal from {from}");
                continue;
            }
            Err(e) => return Err(e),
        };
        match Packet::decode(&bytes) {
            Ok(pkt) if pkt.kind() == Kind::Acknowledgment && accept.admits(from) => return Ok(from),
            Ok(pkt) => log::trace!("[rudp] ignoring {} from {from} while awaiting ACK", pkt.kind()),
            Err(e) => log::trace!("[rudp] ignoring malformed datagram from {from}: {e}"),
        }
    }
}
