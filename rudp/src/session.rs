//! Receiver session: ordering enforcement on top of [`crate::receiver`].
//!
//! The dispatcher acknowledges every well-formed request regardless of
//! history.  A [`ReceiverSession`] remembers which sender it is talking to
//! and turns out-of-sequence packets into
//! [`SessionError::ProtocolViolation`].  Retransmissions caused by a lost
//! acknowledgment (a second `SYN` from the bound sender, a second `FIN` after
//! the close) are reported again rather than rejected.

use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;

use crate::packet::Kind;
use crate::receiver::{receive_timeout, ReceiveError, ReceivedEvent};
use crate::state::ReceiverState;
use crate::transport::Transport;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Receive(#[from] ReceiveError),
    #[error("unexpected {kind} from {from} while {state}")]
    ProtocolViolation {
        kind: Kind,
        from: SocketAddr,
        state: ReceiverState,
    },
}

impl SessionError {
    /// `true` if the session can keep receiving.
    pub fn is_recoverable(&self) -> bool {
        match self {
            SessionError::Receive(e) => e.is_recoverable(),
            SessionError::ProtocolViolation { .. } => true,
        }
    }
}

/// A single-peer receiver that owns its transport.
#[derive(Debug)]
pub struct ReceiverSession<T: Transport> {
    transport: T,
    state: ReceiverState,
    /// Sender bound by the last handshake.
    peer: Option<SocketAddr>,
}

impl<T: Transport> ReceiverSession<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            state: ReceiverState::Idle,
            peer: None,
        }
    }

    pub fn state(&self) -> ReceiverState {
        self.state
    }

    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.transport.local_addr()
    }

    pub fn into_inner(self) -> T {
        self.transport
    }

    /// Receive and validate the next event, waiting indefinitely.
    pub async fn next_event(&mut self) -> Result<ReceivedEvent, SessionError> {
        self.next_event_timeout(None).await
    }

    /// Receive and validate the next event, waiting at most `timeout`.
    pub async fn next_event_timeout(
        &mut self,
        timeout: Option<Duration>,
    ) -> Result<ReceivedEvent, SessionError> {
        let event = receive_timeout(&mut self.transport, timeout).await?;
        self.advance(event)
    }

    fn advance(&mut self, event: ReceivedEvent) -> Result<ReceivedEvent, SessionError> {
        let (Some(kind), Some(from)) = (event.kind(), event.from()) else {
            return Ok(event);
        };

        match (self.state, kind) {
            (ReceiverState::Idle, Kind::ConnectionRequest) => {
                self.state = ReceiverState::AwaitingData;
                self.peer = Some(from);
                Ok(event)
            }
            (ReceiverState::Idle, Kind::CloseRequest) if self.peer == Some(from) => Ok(event),
            (ReceiverState::AwaitingData, _) if self.peer == Some(from) => {
                if kind == Kind::CloseRequest {
                    self.state = ReceiverState::Idle;
                }
                Ok(event)
            }
            (state, kind) => {
                log::warn!("[rudp] protocol violation: {kind} from {from} while {state}");
                Err(SessionError::ProtocolViolation { kind, from, state })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::Packet;
    use crate::scripted::{peer, ScriptedTransport};

    fn stranger() -> SocketAddr {
        "127.0.0.1:6000".parse().unwrap()
    }

    #[tokio::test]
    async fn full_lifecycle_returns_to_idle() {
        let mut t = ScriptedTransport::new();
        t.push_packet(Packet::control(Kind::ConnectionRequest), peer())
            .push_packet(Packet::data(b"abc").unwrap(), peer())
            .push_packet(Packet::control(Kind::CloseRequest), peer());
        let mut session = ReceiverSession::new(t);

        assert!(matches!(session.next_event().await.unwrap(), ReceivedEvent::Connected { .. }));
        assert_eq!(session.state(), ReceiverState::AwaitingData);
        assert_eq!(session.peer(), Some(peer()));
        assert_eq!(session.next_event().await.unwrap().bytes_received(), 3);
        assert!(matches!(session.next_event().await.unwrap(), ReceivedEvent::Closed { .. }));
        assert_eq!(session.state(), ReceiverState::Idle);
    }

    #[tokio::test]
    async fn data_before_handshake_is_a_violation() {
        let mut t = ScriptedTransport::new();
        t.push_packet(Packet::data(b"early").unwrap(), peer());
        let mut session = ReceiverSession::new(t);

        let err = session.next_event().await.unwrap_err();
        assert!(matches!(
            err,
            SessionError::ProtocolViolation { kind: Kind::Data, state: ReceiverState::Idle, .. }
        ));
        assert!(err.is_recoverable());
        assert_eq!(session.state(), ReceiverState::Idle);
    }

    #[tokio::test]
    async fn second_sender_is_rejected_while_bound() {
        let mut t = ScriptedTransport::new();
        t.push_packet(Packet::control(Kind::ConnectionRequest), peer())
            .push_packet(Packet::control(Kind::ConnectionRequest), stranger());
        let mut session = ReceiverSession::new(t);

        session.next_event().await.unwrap();
        let err = session.next_event().await.unwrap_err();
        assert!(matches!(err, SessionError::ProtocolViolation { from, .. } if from == stranger()));
        assert_eq!(session.peer(), Some(peer()));
    }

    #[tokio::test]
    async fn retransmitted_handshake_and_close_are_tolerated() {
        let mut t = ScriptedTransport::new();
        t.push_packet(Packet::control(Kind::ConnectionRequest), peer())
            .push_packet(Packet::control(Kind::ConnectionRequest), peer())
            .push_packet(Packet::control(Kind::CloseRequest), peer())
            .push_packet(Packet::control(Kind::CloseRequest), peer());
        let mut session = ReceiverSession::new(t);

        for _ in 0..4 {
            session.next_event().await.unwrap();
        }
        assert_eq!(session.state(), ReceiverState::Idle);
        assert_eq!(session.into_inner().sent.len(), 4);
    }

    #[tokio::test]
    async fn ignored_packets_pass_through() {
        let mut t = ScriptedTransport::new();
        t.push_raw(b"??", peer());
        let mut session = ReceiverSession::new(t);
        assert_eq!(session.next_event().await.unwrap(), ReceivedEvent::Ignored);
    }
}
