//! Async UDP transport.
//!
//! [`UdpTransport`] is a thin wrapper around `tokio::net::UdpSocket` that
//! implements [`Transport`].  All protocol logic lives elsewhere; this module
//! owns only byte I/O and the timeout / peer-closed classification.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::UdpSocket;

use crate::transport::{Transport, TransportError};

/// Receive buffer size (theoretical UDP limit; RUDP datagrams are far smaller).
const MAX_DATAGRAM: usize = 65_535;

/// A UDP socket speaking raw datagrams for the protocol engine.
#[derive(Debug)]
pub struct UdpTransport {
    /// Address this socket is bound to (filled in after the OS assigns a port).
    local_addr: SocketAddr,
    /// `None` once the transport has been released.
    inner: Option<UdpSocket>,
}

impl UdpTransport {
    /// Bind a new socket to `local_addr`.
    ///
    /// Passing `0.0.0.0:0` lets the OS choose an ephemeral port.
    pub async fn bind(local_addr: SocketAddr) -> Result<Self, TransportError> {
        let inner = UdpSocket::bind(local_addr).await?;
        let local_addr = inner.local_addr()?;
        log::debug!("[rudp] bound UDP socket on {local_addr}");
        Ok(Self {
            local_addr,
            inner: Some(inner),
        })
    }

    fn socket(&self) -> Result<&UdpSocket, TransportError> {
        self.inner.as_ref().ok_or(TransportError::Closed)
    }
}

impl Transport for UdpTransport {
    async fn send_to(&mut self, bytes: &[u8], dest: SocketAddr) -> Result<usize, TransportError> {
        let n = self.socket()?.send_to(bytes, dest).await?;
        Ok(n)
    }

    async fn recv_timeout(
        &mut self,
        timeout: Option<Duration>,
    ) -> Result<(Vec<u8>, SocketAddr), TransportError> {
        let socket = self.socket()?;
        let mut buf = vec![0u8; MAX_DATAGRAM];

        let received = match timeout {
            Some(wait) => tokio::time::timeout(wait, socket.recv_from(&mut buf))
                .await
                .map_err(|_elapsed| TransportError::TimedOut)?,
            None => socket.recv_from(&mut buf).await,
        };

        let (n, from) = match received {
            Ok(v) => v,
            Err(e) if matches!(e.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock) => {
                return Err(TransportError::TimedOut)
            }
            Err(e) => return Err(TransportError::Io(e)),
        };

        if n == 0 {
            return Err(TransportError::PeerClosed { from });
        }
        buf.truncate(n);
        Ok((buf, from))
    }

    fn close(&mut self) {
        if self.inner.take().is_some() {
            log::debug!("[rudp] closed UDP socket on {}", self.local_addr);
        }
    }

    fn is_closed(&self) -> bool {
        self.inner.is_none()
    }

    fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}
