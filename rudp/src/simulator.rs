//! Network simulation for deterministic testing.
//!
//! Real networks drop, duplicate, and corrupt packets.  To exercise the
//! reliability mechanisms without depending on actual network conditions,
//! this module provides:
//!
//! - [`link`]: a pair of connected in-memory [`MemoryTransport`]s.
//! - [`Simulator`]: a wrapper around any [`Transport`] that intercepts sends
//!   and applies a configurable fault model:
//!
//! | Fault            | Description                                         |
//! |------------------|-----------------------------------------------------|
//! | Packet loss      | Drop a datagram with probability `loss_rate`, or    |
//! |                  | unconditionally for the first `drop_first` sends.   |
//! | Duplication      | Deliver a datagram twice.                           |
//! | Corruption       | Flip one payload bit of a `Data` datagram, with     |
//! |                  | probability `corrupt_rate` or for the first         |
//! |                  | `corrupt_first` data datagrams.                     |
//!
//! Faults are drawn from a seeded RNG so failures are reproducible.

use std::net::SocketAddr;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::mpsc;

use crate::packet::{Kind, HEADER_LEN};
use crate::transport::{Transport, TransportError};

// ---------------------------------------------------------------------------
// In-memory link
// ---------------------------------------------------------------------------

/// One end of an in-memory point-to-point link.
///
/// Every datagram sent is delivered to the other end regardless of the
/// destination address, stamped with this end's address as its source.
#[derive(Debug)]
pub struct MemoryTransport {
    local_addr: SocketAddr,
    /// Address of the other end, reported when it is released.
    peer_addr: SocketAddr,
    tx: Option<mpsc::UnboundedSender<(Vec<u8>, SocketAddr)>>,
    rx: Option<mpsc::UnboundedReceiver<(Vec<u8>, SocketAddr)>>,
}

/// Create two connected in-memory endpoints with the given addresses.
pub fn link(a: SocketAddr, b: SocketAddr) -> (MemoryTransport, MemoryTransport) {
    let (a_tx, b_rx) = mpsc::unbounded_channel();
    let (b_tx, a_rx) = mpsc::unbounded_channel();
    (
        MemoryTransport {
            local_addr: a,
            peer_addr: b,
            tx: Some(a_tx),
            rx: Some(a_rx),
        },
        MemoryTransport {
            local_addr: b,
            peer_addr: a,
            tx: Some(b_tx),
            rx: Some(b_rx),
        },
    )
}

impl Transport for MemoryTransport {
    async fn send_to(&mut self, bytes: &[u8], _dest: SocketAddr) -> Result<usize, TransportError> {
        let tx = self.tx.as_ref().ok_or(TransportError::Closed)?;
        // A vanished receiver behaves like an unreachable UDP peer: the
        // datagram is silently lost.
        let _ = tx.send((bytes.to_vec(), self.local_addr));
        Ok(bytes.len())
    }

    async fn recv_timeout(
        &mut self,
        timeout: Option<Duration>,
    ) -> Result<(Vec<u8>, SocketAddr), TransportError> {
        let rx = self.rx.as_mut().ok_or(TransportError::Closed)?;
        let next = match timeout {
            Some(wait) => tokio::time::timeout(wait, rx.recv())
                .await
                .map_err(|_elapsed| TransportError::TimedOut)?,
            None => rx.recv().await,
        };
        match next {
            Some((bytes, from)) if bytes.is_empty() => Err(TransportError::PeerClosed { from }),
            Some(datagram) => Ok(datagram),
            // The other end was released.
            None => Err(TransportError::PeerClosed {
                from: self.peer_addr,
            }),
        }
    }

    fn close(&mut self) {
        self.tx = None;
        self.rx = None;
    }

    fn is_closed(&self) -> bool {
        self.tx.is_none()
    }

    fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

// ---------------------------------------------------------------------------
// Fault injection
// ---------------------------------------------------------------------------

/// Configuration for the fault-injection model.
///
/// All probabilities are in the range `[0.0, 1.0]`.
#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    /// Probability that any given datagram is silently dropped.
    pub loss_rate: f64,
    /// Probability that a datagram is delivered twice.
    pub duplicate_rate: f64,
    /// Probability that a `Data` datagram has one payload bit flipped.
    pub corrupt_rate: f64,
    /// Drop this many datagrams unconditionally before applying `loss_rate`.
    pub drop_first: u32,
    /// Corrupt this many `Data` datagrams unconditionally.
    pub corrupt_first: u32,
    /// RNG seed.
    pub seed: u64,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            loss_rate: 0.0,
            duplicate_rate: 0.0,
            corrupt_rate: 0.0,
            drop_first: 0,
            corrupt_first: 0,
            seed: 0,
        }
    }
}

/// Counters of what the simulator did with outbound datagrams.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SimulatorStats {
    /// Calls to `send_to`.
    pub sent: u32,
    pub dropped: u32,
    pub duplicated: u32,
    pub corrupted: u32,
    /// Sends per packet kind: SYN, ACK, DATA, FIN.
    pub by_kind: [u32; 4],
}

impl SimulatorStats {
    /// Number of `send_to` calls that carried a packet of `kind`.
    pub fn sent_of(&self, kind: Kind) -> u32 {
        self.by_kind[kind_index(kind)]
    }
}

fn kind_index(kind: Kind) -> usize {
    match kind {
        Kind::ConnectionRequest => 0,
        Kind::Acknowledgment => 1,
        Kind::Data => 2,
        Kind::CloseRequest => 3,
    }
}

/// A fault-injecting wrapper around another [`Transport`].
///
/// Faults apply to outbound datagrams only; wrap both ends to disturb both
/// directions.
#[derive(Debug)]
pub struct Simulator<T> {
    inner: T,
    config: SimulatorConfig,
    rng: StdRng,
    stats: SimulatorStats,
    data_seen: u32,
}

impl<T: Transport> Simulator<T> {
    pub fn new(inner: T, config: SimulatorConfig) -> Self {
        let rng = StdRng::seed_from_u64(config.seed);
        Self {
            inner,
            config,
            rng,
            stats: SimulatorStats::default(),
            data_seen: 0,
        }
    }

    /// Pass-through simulator that only counts traffic.
    pub fn passthrough(inner: T) -> Self {
        Self::new(inner, SimulatorConfig::default())
    }

    pub fn stats(&self) -> SimulatorStats {
        self.stats
    }

    pub fn into_inner(self) -> T {
        self.inner
    }

    fn should_drop(&mut self) -> bool {
        if self.stats.sent <= self.config.drop_first {
            return true;
        }
        self.config.loss_rate > 0.0 && self.rng.random_bool(self.config.loss_rate)
    }

    /// Flip one bit inside the meaningful payload of a `Data` datagram.
    fn maybe_corrupt(&mut self, datagram: &mut [u8]) -> bool {
        if datagram.len() <= HEADER_LEN || datagram[4] != Kind::Data.tag() {
            return false;
        }
        self.data_seen += 1;
        let forced = self.data_seen <= self.config.corrupt_first;
        let random = self.config.corrupt_rate > 0.0 && self.rng.random_bool(self.config.corrupt_rate);
        if !forced && !random {
            return false;
        }

        let length = u16::from_be_bytes([datagram[0], datagram[1]]) as usize;
        let end = (HEADER_LEN + length).min(datagram.len());
        if end == HEADER_LEN {
            return false;
        }
        let byte = self.rng.random_range(HEADER_LEN..end);
        let bit = self.rng.random_range(0..8);
        datagram[byte] ^= 1 << bit;
        true
    }
}

impl<T: Transport> Transport for Simulator<T> {
    async fn send_to(&mut self, bytes: &[u8], dest: SocketAddr) -> Result<usize, TransportError> {
        self.stats.sent += 1;
        if let Some(kind) = bytes.get(4).and_then(|&tag| Kind::try_from(tag).ok()) {
            self.stats.by_kind[kind_index(kind)] += 1;
        }

        if self.should_drop() {
            self.stats.dropped += 1;
            log::trace!("[sim] dropped datagram #{} to {dest}", self.stats.sent);
            return Ok(bytes.len());
        }

        let mut datagram = bytes.to_vec();
        if self.maybe_corrupt(&mut datagram) {
            self.stats.corrupted += 1;
            log::trace!("[sim] corrupted datagram #{} to {dest}", self.stats.sent);
        }

        let n = self.inner.send_to(&datagram, dest).await?;
        if self.config.duplicate_rate > 0.0 && self.rng.random_bool(self.config.duplicate_rate) {
            self.stats.duplicated += 1;
            self.inner.send_to(&datagram, dest).await?;
        }
        Ok(n)
    }

    async fn recv_timeout(
        &mut self,
        timeout: Option<Duration>,
    ) -> Result<(Vec<u8>, SocketAddr), TransportError> {
        self.inner.recv_timeout(timeout).await
    }

    fn close(&mut self) {
        self.inner.close();
    }

    fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    fn local_addr(&self) -> SocketAddr {
        self.inner.local_addr()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::{verify_checksum, Packet};

    fn addrs() -> (SocketAddr, SocketAddr) {
        ("10.0.0.1:1000".parse().unwrap(), "10.0.0.2:2000".parse().unwrap())
    }

    const WAIT: Option<Duration> = Some(Duration::from_millis(50));

    #[tokio::test]
    async fn link_delivers_with_source_address() {
        let (a_addr, b_addr) = addrs();
        let (mut a, mut b) = link(a_addr, b_addr);

        a.send_to(b"hello", b_addr).await.unwrap();
        let (bytes, from) = b.recv_timeout(WAIT).await.unwrap();
        assert_eq!(bytes, b"hello");
        assert_eq!(from, a_addr);
    }

    #[tokio::test]
    async fn link_times_out_when_idle() {
        let (a_addr, b_addr) = addrs();
        let (_a, mut b) = link(a_addr, b_addr);
        assert!(b.recv_timeout(WAIT).await.unwrap_err().is_timeout());
    }

    #[tokio::test]
    async fn releasing_one_end_reports_peer_closed() {
        let (a_addr, b_addr) = addrs();
        let (mut a, mut b) = link(a_addr, b_addr);
        a.close();
        assert!(a.is_closed());
        assert!(matches!(
            b.recv_timeout(WAIT).await,
            Err(TransportError::PeerClosed { from }) if from == a_addr
        ));
        assert!(matches!(a.send_to(b"x", b_addr).await, Err(TransportError::Closed)));
    }

    #[tokio::test]
    async fn drop_first_loses_leading_datagrams() {
        let (a_addr, b_addr) = addrs();
        let (a, mut b) = link(a_addr, b_addr);
        let mut sim = Simulator::new(a, SimulatorConfig { drop_first: 2, ..Default::default() });

        for i in 0u8..3 {
            sim.send_to(&[i], b_addr).await.unwrap();
        }
        let (bytes, _) = b.recv_timeout(WAIT).await.unwrap();
        assert_eq!(bytes, [2]);
        assert!(b.recv_timeout(WAIT).await.unwrap_err().is_timeout());
        assert_eq!(sim.stats().sent, 3);
        assert_eq!(sim.stats().dropped, 2);
    }

    #[tokio::test]
    async fn corrupt_first_breaks_checksum_once() {
        let (a_addr, b_addr) = addrs();
        let (a, mut b) = link(a_addr, b_addr);
        let mut sim = Simulator::new(a, SimulatorConfig { corrupt_first: 1, seed: 7, ..Default::default() });

        let pkt = Packet::data(b"payload bytes").unwrap();
        sim.send_to(&pkt.encode(), b_addr).await.unwrap();
        sim.send_to(&pkt.encode(), b_addr).await.unwrap();

        let (first, _) = b.recv_timeout(WAIT).await.unwrap();
        let first = Packet::decode(&first).unwrap();
        assert!(!verify_checksum(first.checksum(), first.payload()));

        let (second, _) = b.recv_timeout(WAIT).await.unwrap();
        assert!(Packet::decode(&second).unwrap().verify());
        assert_eq!(sim.stats().corrupted, 1);
        assert_eq!(sim.stats().sent_of(Kind::Data), 2);
    }

    #[tokio::test]
    async fn control_packets_are_never_corrupted() {
        let (a_addr, b_addr) = addrs();
        let (a, mut b) = link(a_addr, b_addr);
        let config = SimulatorConfig { corrupt_rate: 1.0, ..Default::default() };
        let mut sim = Simulator::new(a, config);

        let ack = Packet::control(Kind::Acknowledgment).encode();
        sim.send_to(&ack, b_addr).await.unwrap();
        let (bytes, _) = b.recv_timeout(WAIT).await.unwrap();
        assert_eq!(bytes, ack);
        assert_eq!(sim.stats().corrupted, 0);
    }

    #[tokio::test]
    async fn duplicate_rate_one_delivers_twice() {
        let (a_addr, b_addr) = addrs();
        let (a, mut b) = link(a_addr, b_addr);
        let mut sim = Simulator::new(a, SimulatorConfig { duplicate_rate: 1.0, ..Default::default() });

        sim.send_to(b"dup", b_addr).await.unwrap();
        assert_eq!(b.recv_timeout(WAIT).await.unwrap().0, b"dup");
        assert_eq!(b.recv_timeout(WAIT).await.unwrap().0, b"dup");
        assert_eq!(sim.stats().duplicated, 1);
    }
}
