//! Connection state types for both ends.
//!
//! The protocol engine itself is stateless between calls; these states are
//! tracked by [`crate::connection::Connection`] and
//! [`crate::session::ReceiverSession`] to reject out-of-order use.

use std::fmt;

/// Sender-side lifecycle.
///
/// ```text
///  (connect) ──ACK──▶ CONNECTED ──close / peer closed / fatal──▶ CLOSED
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SenderState {
    /// Handshake complete; data may be sent.
    Connected,
    /// Transport released; no further operations.
    #[default]
    Closed,
}

/// Receiver-side lifecycle as seen by a session.
///
/// ```text
///  IDLE ──SYN──▶ AWAITING_DATA ──DATA*──▶ AWAITING_DATA ──FIN──▶ IDLE
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReceiverState {
    /// No sender connected.
    #[default]
    Idle,
    /// Handshake acknowledged; data or a close request is expected.
    AwaitingData,
}

impl fmt::Display for SenderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SenderState::Connected => f.write_str("connected"),
            SenderState::Closed => f.write_str("closed"),
        }
    }
}

impl fmt::Display for ReceiverState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReceiverState::Idle => f.write_str("idle"),
            ReceiverState::AwaitingData => f.write_str("awaiting data"),
        }
    }
}
