//! Scripted transport double for unit tests.
//!
//! Every `recv_timeout` pops the next scripted reply; an exhausted script
//! behaves like a silent network and times out.

use std::cell::Cell;
use std::collections::VecDeque;
use std::io;
use std::net::SocketAddr;
use std::rc::Rc;
use std::time::Duration;

use crate::packet::{Kind, Packet};
use crate::transport::{Transport, TransportError};

pub(crate) type Reply = Result<(Vec<u8>, SocketAddr), TransportError>;

#[derive(Debug, Default)]
pub(crate) struct ScriptedTransport {
    pub replies: VecDeque<Reply>,
    /// Every datagram sent, with its destination.
    pub sent: Vec<(Vec<u8>, SocketAddr)>,
    /// Fail every send with this error kind.
    pub fail_sends: Option<io::ErrorKind>,
    pub closes: u32,
    /// Same count, readable after the transport has been moved away.
    pub shared_closes: Rc<Cell<u32>>,
    closed: bool,
}

pub(crate) fn local() -> SocketAddr {
    "127.0.0.1:4000".parse().unwrap()
}

pub(crate) fn peer() -> SocketAddr {
    "127.0.0.1:5000".parse().unwrap()
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_timeout(&mut self) -> &mut Self {
        self.replies.push_back(Err(TransportError::TimedOut));
        self
    }

    pub fn push_packet(&mut self, packet: Packet, from: SocketAddr) -> &mut Self {
        self.replies.push_back(Ok((packet.encode(), from)));
        self
    }

    pub fn push_ack(&mut self, from: SocketAddr) -> &mut Self {
        self.push_packet(Packet::control(Kind::Acknowledgment), from)
    }

    pub fn push_raw(&mut self, bytes: &[u8], from: SocketAddr) -> &mut Self {
        self.replies.push_back(Ok((bytes.to_vec(), from)));
        self
    }

    pub fn push_err(&mut self, err: TransportError) -> &mut Self {
        self.replies.push_back(Err(err));
        self
    }

    /// Decoded kinds of everything sent so far.
    pub fn sent_kinds(&self) -> Vec<Kind> {
        self.sent
            .iter()
            .map(|(bytes, _)| Packet::decode(bytes).unwrap().kind())
            .collect()
    }
}

impl Transport for ScriptedTransport {
    async fn send_to(&mut self, bytes: &[u8], dest: SocketAddr) -> Result<usize, TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        if let Some(kind) = self.fail_sends {
            return Err(TransportError::Io(io::Error::new(kind, "scripted send failure")));
        }
        self.sent.push((bytes.to_vec(), dest));
        Ok(bytes.len())
    }

    async fn recv_timeout(
        &mut self,
        _timeout: Option<Duration>,
    ) -> Result<(Vec<u8>, SocketAddr), TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        self.replies.pop_front().unwrap_or(Err(TransportError::TimedOut))
    }

    fn close(&mut self) {
        self.closes += 1;
        self.shared_closes.set(self.shared_closes.get() + 1);
        self.closed = true;
    }

    fn is_closed(&self) -> bool {
        self.closed
    }

    fn local_addr(&self) -> SocketAddr {
        local()
    }
}
