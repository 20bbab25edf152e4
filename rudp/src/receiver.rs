//! Receiver side: classify one inbound packet and acknowledge it.
//!
//! [`receive`] is the receiver's whole protocol surface.  Each call reads
//! exactly one datagram and is fully determined by its kind tag:
//!
//! | Inbound                | Reply | Result                          |
//! |------------------------|-------|---------------------------------|
//! | `SYN`                  | `ACK` | [`ReceivedEvent::Connected`]    |
//! | `DATA`, checksum ok    | `ACK` | [`ReceivedEvent::Data`]         |
//! | `DATA`, checksum bad   | none  | [`ReceiveError::ChecksumMismatch`] |
//! | `FIN`                  | `ACK` | [`ReceivedEvent::Closed`]       |
//! | anything else          | none  | [`ReceivedEvent::Ignored`]      |
//!
//! Acknowledgments are sent once and never retried: a lost `ACK` is recovered
//! by the sender retransmitting the original packet.  Likewise a corrupted
//! `DATA` is simply not acknowledged, which costs the sender one timeout.

use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;

use crate::packet::{Kind, Packet};
use crate::transport::{Transport, TransportError};

/// Classification of one inbound packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReceivedEvent {
    /// A connection request was acknowledged.
    Connected { from: SocketAddr },
    /// A valid data chunk was acknowledged.
    Data { from: SocketAddr, payload: Vec<u8> },
    /// A close request was acknowledged.
    Closed { from: SocketAddr },
    /// Malformed, unknown or unexpected packet; nothing was sent.
    Ignored,
}

impl ReceivedEvent {
    /// Payload bytes carried by a `Data` event, zero otherwise.
    pub fn bytes_received(&self) -> usize {
        match self {
            ReceivedEvent::Data { payload, .. } => payload.len(),
            _ => 0,
        }
    }

    /// Address of the sender, if the event came from a recognised packet.
    pub fn from(&self) -> Option<SocketAddr> {
        match self {
            ReceivedEvent::Connected { from }
            | ReceivedEvent::Data { from, .. }
            | ReceivedEvent::Closed { from } => Some(*from),
            ReceivedEvent::Ignored => None,
        }
    }

    /// Packet kind that produced the event.
    pub fn kind(&self) -> Option<Kind> {
        match self {
            ReceivedEvent::Connected { .. } => Some(Kind::ConnectionRequest),
            ReceivedEvent::Data { .. } => Some(Kind::Data),
            ReceivedEvent::Closed { .. } => Some(Kind::CloseRequest),
            ReceivedEvent::Ignored => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum ReceiveError {
    /// A data packet failed verification and was dropped unacknowledged.
    #[error("checksum mismatch on data from {from}")]
    ChecksumMismatch { from: SocketAddr },
    /// Sending the acknowledgment failed; the transport has been released.
    #[error("failed to send acknowledgment: {0}")]
    AckFailed(TransportError),
    /// The peer shut the transport down; the transport has been released.
    #[error("peer closed the transport")]
    PeerClosedTransport,
    /// The caller-imposed wait elapsed.
    #[error("timed out waiting for a packet")]
    TimedOut,
    /// Receiving failed; the transport has been released.
    #[error("receive failed: {0}")]
    Transport(TransportError),
}

impl ReceiveError {
    /// `true` if the caller can simply call [`receive`] again.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, ReceiveError::ChecksumMismatch { .. } | ReceiveError::TimedOut)
    }
}

/// Block until one packet arrives, dispatch it, and report what happened.
pub async fn receive<T: Transport>(transport: &mut T) -> Result<ReceivedEvent, ReceiveError> {
    receive_timeout(transport, None).await
}

/// Like [`receive`], but give up with [`ReceiveError::TimedOut`] after
/// `timeout` if one is given.
pub async fn receive_timeout<T: Transport>(
    transport: &mut T,
    timeout: Option<Duration>,
) -> Result<ReceivedEvent, ReceiveError> {
    let (bytes, from) = match transport.recv_timeout(timeout).await {
        Ok(datagram) => datagram,
        Err(TransportError::TimedOut) => return Err(ReceiveError::TimedOut),
        Err(TransportError::PeerClosed { from }) => {
            log::info!("[rudp] transport closed by {from}");
            transport.close();
            return Err(ReceiveError::PeerClosedTransport);
        }
        // Already released.
        Err(TransportError::Closed) => {
            return Err(ReceiveError::Transport(TransportError::Closed));
        }
        Err(e) => {
            transport.close();
            return Err(ReceiveError::Transport(e));
        }
    };

    let packet = match Packet::decode(&bytes) {
        Ok(packet) => packet,
        Err(e) => {
            log::debug!("[rudp] ignoring malformed datagram from {from}: {e}");
            return Ok(ReceivedEvent::Ignored);
        }
    };

    match packet.kind() {
        Kind::ConnectionRequest => {
            log::debug!("[rudp] ← SYN from {from}");
            send_ack(transport, from).await?;
            log::info!("[rudp] sender {from} connected");
            Ok(ReceivedEvent::Connected { from })
        }
        Kind::Data => {
            if !packet.verify() {
                log::warn!(
                    "[rudp] ← DATA len={} from {from}: checksum mismatch, dropping",
                    packet.length()
                );
                return Err(ReceiveError::ChecksumMismatch { from });
            }
            log::debug!("[rudp] ← DATA len={} from {from}", packet.length());
            send_ack(transport, from).await?;
            Ok(ReceivedEvent::Data {
                from,
                payload: packet.into_payload(),
            })
        }
        Kind::CloseRequest => {
            log::debug!("[rudp] ← FIN from {from}");
            send_ack(transport, from).await?;
            log::info!("[rudp] sender {from} closed the connection");
            Ok(ReceivedEvent::Closed { from })
        }
        Kind::Acknowledgment => {
            log::debug!("[rudp] ignoring unexpected ACK from {from}");
            Ok(ReceivedEvent::Ignored)
        }
    }
}

async fn send_ack<T: Transport>(transport: &mut T, dest: SocketAddr) -> Result<(), ReceiveError> {
    let ack = Packet::control(Kind::Acknowledgment).encode();
    match transport.send_to(&ack, dest).await {
        Ok(_) => {
            log::debug!("[rudp] → ACK to {dest}");
            Ok(())
        }
        Err(e) => {
            transport.close();
            Err(ReceiveError::AckFailed(e))
        }
    }
}
