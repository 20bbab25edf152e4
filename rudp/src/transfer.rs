//! File-transfer orchestration on top of the protocol engine.
//!
//! The exchange, after the handshake:
//!
//! ```text
//!  sender                                 receiver
//!    │── DATA [size: u32 BE] ────────────▶ │  await_size
//!    │── DATA chunk ... DATA chunk ──────▶ │  receive_round  → TransferRecord
//!    │── DATA chunk ... (next round) ────▶ │  receive_round  → TransferRecord
//!    │── FIN ────────────────────────────▶ │  receive_round  → None
//! ```
//!
//! Every arrow is one or more stop-and-wait exchanges; the receiver tells
//! rounds apart only by counting bytes against the announced size.

use std::time::Instant;

use thiserror::Error;

use crate::connection::{CloseError, ConnectError, Connection, SendError};
use crate::receiver::ReceivedEvent;
use crate::session::{ReceiverSession, SessionError};
use crate::stats::{StatsLog, TransferRecord};
use crate::transport::Transport;

/// Length of the size announcement chunk.
pub const SIZE_ANNOUNCEMENT_LEN: usize = 4;

#[derive(Debug, Error)]
pub enum TransferError {
    #[error(transparent)]
    Connect(#[from] ConnectError),
    #[error(transparent)]
    Send(#[from] SendError),
    #[error(transparent)]
    Close(#[from] CloseError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("peer closed the connection after {delivered} of {expected} bytes")]
    PeerClosed { delivered: u64, expected: u64 },
    #[error("size announcement of {len} bytes, expected {SIZE_ANNOUNCEMENT_LEN}")]
    BadSizeAnnouncement { len: usize },
    #[error("announced transfer size is zero")]
    EmptyTransfer,
}

// ---------------------------------------------------------------------------
// Sender
// ---------------------------------------------------------------------------

/// Tell the receiver how many bytes each round carries.
pub async fn announce_size<T: Transport>(
    conn: &mut Connection<T>,
    size: u32,
) -> Result<(), TransferError> {
    if size == 0 {
        return Err(TransferError::EmptyTransfer);
    }
    let n = conn.send(&size.to_be_bytes()).await?;
    if n == 0 {
        return Err(TransferError::PeerClosed {
            delivered: 0,
            expected: SIZE_ANNOUNCEMENT_LEN as u64,
        });
    }
    log::info!("[rudp] announced transfer size {size} bytes");
    Ok(())
}

/// Send one full round of `data`.
pub async fn send_round<T: Transport>(
    conn: &mut Connection<T>,
    data: &[u8],
) -> Result<usize, TransferError> {
    let delivered = conn.send_all(data).await?;
    if delivered < data.len() {
        return Err(TransferError::PeerClosed {
            delivered: delivered as u64,
            expected: data.len() as u64,
        });
    }
    log::info!("[rudp] round of {delivered} bytes delivered");
    Ok(delivered)
}

/// Announce, send `data` `rounds` times, and close the connection.
pub async fn send_rounds<T: Transport>(
    mut conn: Connection<T>,
    data: &[u8],
    rounds: u32,
) -> Result<(), TransferError> {
    let size = u32::try_from(data.len()).map_err(|_| TransferError::BadSizeAnnouncement {
        len: data.len(),
    })?;
    announce_size(&mut conn, size).await?;
    for _ in 0..rounds {
        send_round(&mut conn, data).await?;
    }
    conn.close().await?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Receiver
// ---------------------------------------------------------------------------

/// Next event from `session`, skipping corrupted and out-of-sequence packets.
async fn next_event<T: Transport>(
    session: &mut ReceiverSession<T>,
) -> Result<ReceivedEvent, TransferError> {
    loop {
        match session.next_event().await {
            Ok(event) => return Ok(event),
            Err(e) if e.is_recoverable() => log::warn!("[rudp] {e}; continuing"),
            Err(e) => return Err(e.into()),
        }
    }
}

/// Wait for a sender to connect and announce the round size.
pub async fn await_size<T: Transport>(
    session: &mut ReceiverSession<T>,
) -> Result<u32, TransferError> {
    loop {
        match next_event(session).await? {
            ReceivedEvent::Data { payload, .. } => {
                let bytes: [u8; SIZE_ANNOUNCEMENT_LEN] = payload
                    .as_slice()
                    .try_into()
                    .map_err(|_| TransferError::BadSizeAnnouncement { len: payload.len() })?;
                let size = u32::from_be_bytes(bytes);
                if size == 0 {
                    return Err(TransferError::EmptyTransfer);
                }
                log::info!("[rudp] expecting {size} bytes per round");
                return Ok(size);
            }
            ReceivedEvent::Closed { .. } => {
                return Err(TransferError::PeerClosed {
                    delivered: 0,
                    expected: SIZE_ANNOUNCEMENT_LEN as u64,
                })
            }
            ReceivedEvent::Connected { .. } | ReceivedEvent::Ignored => {}
        }
    }
}

/// Receive one round of `expected` bytes.
///
/// Returns `None` if the sender closes instead of starting another round.
/// The round is timed from its first chunk.
pub async fn receive_round<T: Transport>(
    session: &mut ReceiverSession<T>,
    expected: u32,
) -> Result<Option<TransferRecord>, TransferError> {
    let expected = u64::from(expected);
    let mut received = 0u64;
    let mut started: Option<Instant> = None;

    while received < expected {
        match next_event(session).await? {
            ReceivedEvent::Data { payload, .. } => {
                started.get_or_insert_with(Instant::now);
                received += payload.len() as u64;
            }
            ReceivedEvent::Closed { .. } if received == 0 => return Ok(None),
            ReceivedEvent::Closed { .. } => {
                return Err(TransferError::PeerClosed {
                    delivered: received,
                    expected,
                })
            }
            ReceivedEvent::Connected { .. } | ReceivedEvent::Ignored => {}
        }
    }

    let elapsed = started.map(|s| s.elapsed()).unwrap_or_default();
    log::info!("[rudp] round complete: {received} bytes in {elapsed:?}");
    Ok(Some(TransferRecord::new(received, elapsed)))
}

/// Serve one sender from handshake to close, collecting per-round statistics.
pub async fn receive_all<T: Transport>(
    session: &mut ReceiverSession<T>,
) -> Result<StatsLog, TransferError> {
    let size = await_size(session).await?;
    let mut log = StatsLog::new();
    while let Some(record) = receive_round(session, size).await? {
        log.push(record);
    }
    Ok(log)
}
