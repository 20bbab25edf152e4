//! `rudp`: reliable, acknowledged, checksum-verified delivery over UDP.
//!
//! # Architecture
//!
//! ```text
//!  ┌────────────────────┐  SYN / DATA / FIN  ┌────────────────────┐
//!  │ connection (send)  │───────────────────▶│ receiver (dispatch)│
//!  │ connect            │                    │ receive            │
//!  │ send_reliable      │◀───────────────────│                    │
//!  │ close              │        ACK         └─────────┬──────────┘
//!  └─────────┬──────────┘                              │
//!            │ arq::exchange (stop-and-wait, bounded retry)
//!  ┌─────────▼────────────────────────────────────────▼──────────┐
//!  │          Transport (UdpTransport / MemoryTransport)         │
//!  └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Each module has a single responsibility:
//! - [`packet`]     : wire format and one's-complement checksum
//! - [`transport`]  : the datagram transport trait and its error taxonomy
//! - [`socket`]     : tokio UDP implementation of [`transport::Transport`]
//! - [`simulator`]  : in-memory link and fault injection for testing
//! - [`timer`]      : retry policy (attempts and per-attempt timeout)
//! - [`arq`]        : the one send-expect-ack-or-retry primitive
//! - [`connection`] : sender-side handshake, transfer and teardown
//! - [`receiver`]   : receive dispatch and acknowledgment
//! - [`session`]    : receiver-side ordering enforcement
//! - [`state`]      : sender / receiver state types
//! - [`transfer`]   : file-transfer rounds over a connection
//! - [`stats`]      : per-round timing and bandwidth
//!
//! There are no sequence numbers: if an `ACK` is lost the sender resends the
//! same chunk and the receiver delivers it twice.

pub mod arq;
pub mod connection;
pub mod packet;
pub mod receiver;
pub mod session;
pub mod simulator;
pub mod socket;
pub mod state;
pub mod stats;
pub mod timer;
pub mod transfer;
pub mod transport;

#[cfg(test)]
mod scripted;

pub use connection::{close, connect, send_reliable, Connection};
pub use packet::{compute_checksum, verify_checksum, Kind, Packet, PAYLOAD_CAPACITY};
pub use receiver::{receive, receive_timeout, ReceiveError, ReceivedEvent};
pub use timer::RetryPolicy;
pub use transport::{Transport, TransportError};
