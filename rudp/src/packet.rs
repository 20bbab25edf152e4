//! Wire-format definitions for RUDP packets.
//!
//! Every datagram exchanged between peers is a [`Packet`].  This module is
//! responsible for:
//! - Defining the on-wire binary layout (length, checksum, kind, payload).
//! - Serialising a [`Packet`] into a fixed-size byte buffer.
//! - Deserialising a raw byte slice back into a [`Packet`], returning errors
//!   for malformed or truncated input.
//! - Computing and verifying the one's-complement payload checksum.
//!
//! No I/O happens here.
//!
//! # Wire format
//!
//! All multi-byte integers are **big-endian**.
//!
//! ```text
//!  0               1               2               3
//!  0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |            Length             |           Checksum            |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |     Kind      |          Payload (PAYLOAD_CAPACITY bytes) ... |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! Header size: [`HEADER_LEN`] = 5 bytes.  Encoded packets are always
//! [`WIRE_LEN`] bytes long; only the first `length` payload bytes are defined
//! and the rest is zero padding.

use std::fmt;

use thiserror::Error;

/// Maximum number of payload bytes a single packet can carry.
pub const PAYLOAD_CAPACITY: usize = 2048;

/// Byte length of the fixed-size header on the wire.
pub const HEADER_LEN: usize = 5;

/// Byte length of every encoded packet.
pub const WIRE_LEN: usize = HEADER_LEN + PAYLOAD_CAPACITY;

// Byte offsets of each field within the serialised packet.
const OFF_LENGTH: usize = 0;
const OFF_CHECKSUM: usize = 2;
const OFF_KIND: usize = 4;

/// The semantic role of a packet.  Exactly one kind tags every packet.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    /// Handshake initiation (`'S'`).
    ConnectionRequest = b'S',
    /// Positive acknowledgment of the last packet received (`'A'`).
    Acknowledgment = b'A',
    /// Checksummed payload chunk (`'D'`).
    Data = b'D',
    /// Orderly teardown request (`'F'`).
    CloseRequest = b'F',
}

impl Kind {
    /// The ASCII tag written into the `kind` byte.
    pub fn tag(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for Kind {
    type Error = PacketError;

    fn try_from(tag: u8) -> Result<Self, Self::Error> {
        match tag {
            b'S' => Ok(Kind::ConnectionRequest),
            b'A' => Ok(Kind::Acknowledgment),
            b'D' => Ok(Kind::Data),
            b'F' => Ok(Kind::CloseRequest),
            other => Err(PacketError::UnknownKind(other)),
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Kind::ConnectionRequest => "SYN",
            Kind::Acknowledgment => "ACK",
            Kind::Data => "DATA",
            Kind::CloseRequest => "FIN",
        };
        f.write_str(name)
    }
}

/// A complete protocol datagram.
///
/// `payload` holds exactly the meaningful bytes, so `payload.len()` is the
/// `length` header field.  Control packets carry an empty payload and a zero
/// checksum.
///
/// Fields are private: [`Packet::control`], [`Packet::data`] and
/// [`Packet::decode`] are the only constructors, and all three keep the
/// payload within [`PAYLOAD_CAPACITY`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    kind: Kind,
    /// One's-complement checksum over `payload`; zero for control packets.
    checksum: u16,
    payload: Vec<u8>,
}

impl Packet {
    /// Build a zero-length control packet (`SYN`, `ACK` or `FIN`).
    pub fn control(kind: Kind) -> Self {
        Self {
            kind,
            checksum: 0,
            payload: Vec::new(),
        }
    }

    /// Build a `Data` packet carrying `chunk`, computing its checksum.
    ///
    /// Fails if `chunk` does not fit in one packet; chunking larger buffers
    /// is the caller's job.
    pub fn data(chunk: &[u8]) -> Result<Self, PacketError> {
        if chunk.len() > PAYLOAD_CAPACITY {
            return Err(PacketError::PayloadTooLarge(chunk.len()));
        }
        Ok(Self {
            kind: Kind::Data,
            checksum: compute_checksum(chunk),
            payload: chunk.to_vec(),
        })
    }

    pub fn kind(&self) -> Kind {
        self.kind
    }

    /// Checksum as carried in the header.
    pub fn checksum(&self) -> u16 {
        self.checksum
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }

    /// Value of the `length` header field.
    pub fn length(&self) -> u16 {
        self.payload.len() as u16
    }

    /// `true` if the stored checksum matches the payload.
    pub fn verify(&self) -> bool {
        verify_checksum(self.checksum, &self.payload)
    }

    /// Serialise this packet into a newly allocated [`WIRE_LEN`]-byte vector.
    ///
    /// The stored `checksum` is written as-is; use [`Packet::data`] to get a
    /// correct one.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = vec![0u8; WIRE_LEN];

        buf[OFF_LENGTH..OFF_LENGTH + 2].copy_from_slice(&self.length().to_be_bytes());
        buf[OFF_CHECKSUM..OFF_CHECKSUM + 2].copy_from_slice(&self.checksum.to_be_bytes());
        buf[OFF_KIND] = self.kind.tag();
        buf[HEADER_LEN..HEADER_LEN + self.payload.len()].copy_from_slice(&self.payload);

        buf
    }

    /// Parse a [`Packet`] from a raw datagram.
    ///
    /// Trailing padding past `length` is ignored.  The checksum is **not**
    /// verified here so the receiver can tell corruption apart from garbage.
    ///
    /// Returns [`Err`] if:
    /// - `buf` is shorter than [`HEADER_LEN`],
    /// - the kind tag is not one of the four known tags,
    /// - `length` exceeds [`PAYLOAD_CAPACITY`], or
    /// - `buf` ends before `length` payload bytes.
    pub fn decode(buf: &[u8]) -> Result<Self, PacketError> {
        if buf.len() < HEADER_LEN {
            return Err(PacketError::BufferTooShort(buf.len()));
        }

        let length = u16::from_be_bytes([buf[OFF_LENGTH], buf[OFF_LENGTH + 1]]);
        let checksum = u16::from_be_bytes([buf[OFF_CHECKSUM], buf[OFF_CHECKSUM + 1]]);
        let kind = Kind::try_from(buf[OFF_KIND])?;

        let length = length as usize;
        if length > PAYLOAD_CAPACITY {
            return Err(PacketError::LengthTooLarge(length));
        }
        let payload = buf
            .get(HEADER_LEN..HEADER_LEN + length)
            .ok_or(PacketError::Truncated {
                declared: length,
                available: buf.len() - HEADER_LEN,
            })?;

        Ok(Packet {
            kind,
            checksum,
            payload: payload.to_vec(),
        })
    }
}

/// Errors that can arise when building or parsing a packet.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PacketError {
    #[error("buffer of {0} bytes is too short to contain a header")]
    BufferTooShort(usize),
    #[error("unknown packet kind tag {0:#04x}")]
    UnknownKind(u8),
    #[error("declared length {0} exceeds payload capacity {PAYLOAD_CAPACITY}")]
    LengthTooLarge(usize),
    #[error("declared length {declared} but only {available} payload bytes present")]
    Truncated { declared: usize, available: usize },
    #[error("payload of {0} bytes exceeds capacity {PAYLOAD_CAPACITY}")]
    PayloadTooLarge(usize),
}

/// Compute the one's-complement checksum of `payload`.
///
/// `payload` must be the `length`-bounded region of the packet.
pub fn compute_checksum(payload: &[u8]) -> u16 {
    !ones_complement_sum(0, payload)
}

/// Verify `received` against `payload`.
///
/// The transmitted checksum is added into the sum before folding; an intact
/// payload folds to all ones.
pub fn verify_checksum(received: u16, payload: &[u8]) -> bool {
    ones_complement_sum(u32::from(received), payload) == 0xffff
}

/// Sum consecutive 16-bit big-endian words onto `seed` and fold the carries.
fn ones_complement_sum(seed: u32, data: &[u8]) -> u16 {
    let mut sum = u64::from(seed);

    let mut words = data.chunks_exact(2);
    for word in &mut words {
        sum += u64::from(u16::from_be_bytes([word[0], word[1]]));
    }
    // Odd trailing byte: pad with a zero byte on the right.
    if let [last] = words.remainder() {
        sum += u64::from(*last) << 8;
    }

    while sum >> 16 != 0 {
        sum = (sum & 0xffff) + (sum >> 16);
    }

    sum as u16
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    #[test]
    fn data_packet_decodes_to_same_fields() {
        let pkt = Packet::data(b"hello").unwrap();
        let decoded = Packet::decode(&pkt.encode()).unwrap();
        assert_eq!(decoded, pkt);
        assert!(decoded.verify());
    }

    #[test]
    fn encoded_length_is_fixed() {
        assert_eq!(Packet::control(Kind::Acknowledgment).encode().len(), WIRE_LEN);
        assert_eq!(Packet::data(&[7u8; 100]).unwrap().encode().len(), WIRE_LEN);
        assert_eq!(WIRE_LEN, 2053);
    }

    #[test]
    fn header_fields_big_endian_on_wire() {
        let mut pkt = Packet::data(&[0xaa; 0x0102]).unwrap();
        pkt.checksum = 0x0304;
        let bytes = pkt.encode();
        assert_eq!(&bytes[OFF_LENGTH..OFF_LENGTH + 2], &[0x01, 0x02]);
        assert_eq!(&bytes[OFF_CHECKSUM..OFF_CHECKSUM + 2], &[0x03, 0x04]);
        assert_eq!(bytes[OFF_KIND], b'D');
    }

    #[test]
    fn payload_never_exceeds_capacity() {
        assert_eq!(
            Packet::data(&[0u8; 70_000]),
            Err(PacketError::PayloadTooLarge(70_000))
        );

        let full = Packet::data(&[0xff; PAYLOAD_CAPACITY]).unwrap();
        assert_eq!(usize::from(full.length()), PAYLOAD_CAPACITY);
        let bytes = full.encode();
        assert_eq!(bytes.len(), WIRE_LEN);
        assert_eq!(Packet::decode(&bytes).unwrap().payload(), full.payload());
    }

    #[test]
    fn control_packets_are_zero_length_and_unchecksummed() {
        for kind in [Kind::ConnectionRequest, Kind::Acknowledgment, Kind::CloseRequest] {
            let bytes = Packet::control(kind).encode();
            assert_eq!(&bytes[..4], &[0, 0, 0, 0]);
            assert_eq!(bytes[OFF_KIND], kind.tag());
            assert!(bytes[HEADER_LEN..].iter().all(|&b| b == 0));
        }
    }

    #[test]
    fn kind_tags_match_ascii_letters() {
        assert_eq!(Kind::ConnectionRequest.tag(), b'S');
        assert_eq!(Kind::Acknowledgment.tag(), b'A');
        assert_eq!(Kind::Data.tag(), b'D');
        assert_eq!(Kind::CloseRequest.tag(), b'F');
        assert_eq!(Kind::try_from(b'X'), Err(PacketError::UnknownKind(b'X')));
    }

    #[test]
    fn decode_short_header_returns_error() {
        assert_eq!(Packet::decode(&[]), Err(PacketError::BufferTooShort(0)));
        assert_eq!(
            Packet::decode(&[0u8; HEADER_LEN - 1]),
            Err(PacketError::BufferTooShort(HEADER_LEN - 1))
        );
    }

    #[test]
    fn decode_unknown_kind_returns_error() {
        let mut bytes = Packet::control(Kind::Acknowledgment).encode();
        bytes[OFF_KIND] = b'?';
        assert_eq!(Packet::decode(&bytes), Err(PacketError::UnknownKind(b'?')));
    }

    #[test]
    fn decode_oversized_length_returns_error() {
        let mut bytes = Packet::control(Kind::Data).encode();
        bytes[OFF_LENGTH..OFF_LENGTH + 2].copy_from_slice(&2049u16.to_be_bytes());
        assert_eq!(Packet::decode(&bytes), Err(PacketError::LengthTooLarge(2049)));
    }

    #[test]
    fn decode_truncated_payload_returns_error() {
        let bytes = Packet::data(b"data").unwrap().encode();
        assert_eq!(
            Packet::decode(&bytes[..HEADER_LEN + 3]),
            Err(PacketError::Truncated { declared: 4, available: 3 })
        );
    }

    #[test]
    fn decode_accepts_unpadded_datagram() {
        let bytes = Packet::data(b"abc").unwrap().encode();
        let decoded = Packet::decode(&bytes[..HEADER_LEN + 3]).unwrap();
        assert_eq!(decoded.payload, b"abc");
    }

    #[test]
    fn decode_does_not_reject_bad_checksum() {
        let mut bytes = Packet::data(b"test").unwrap().encode();
        bytes[HEADER_LEN] ^= 0x01;
        let decoded = Packet::decode(&bytes).unwrap();
        assert!(!decoded.verify());
    }

    #[test]
    fn oversized_chunk_is_rejected() {
        assert_eq!(
            Packet::data(&[0u8; PAYLOAD_CAPACITY + 1]),
            Err(PacketError::PayloadTooLarge(PAYLOAD_CAPACITY + 1))
        );
        assert!(Packet::data(&[0u8; PAYLOAD_CAPACITY]).is_ok());
    }

    #[test]
    fn checksum_known_vector() {
        // RFC 1071 §3 example words.
        let data = [0x00, 0x01, 0xf2, 0x03, 0xf4, 0xf5, 0xf6, 0xf7];
        assert_eq!(compute_checksum(&data), !0xddf2);
    }

    #[test]
    fn checksum_odd_length_pads_low_byte() {
        assert_eq!(compute_checksum(&[0x12]), !0x1200);
        assert_eq!(compute_checksum(&[0x12, 0x34, 0x56]), !(0x1234u16 + 0x5600));
    }

    #[test]
    fn empty_payload_verifies() {
        assert_eq!(compute_checksum(&[]), 0xffff);
        assert!(verify_checksum(compute_checksum(&[]), &[]));
    }

    #[test]
    fn computed_checksum_always_verifies() {
        let mut rng = StdRng::seed_from_u64(0x5eed);
        for len in 0..=PAYLOAD_CAPACITY {
            let payload: Vec<u8> = (0..len).map(|_| rng.random()).collect();
            let csum = compute_checksum(&payload);
            assert!(verify_checksum(csum, &payload), "len {len}");
        }
    }

    #[test]
    fn any_single_bit_flip_is_detected() {
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..500 {
            let len = rng.random_range(1..=PAYLOAD_CAPACITY);
            let mut payload: Vec<u8> = (0..len).map(|_| rng.random()).collect();
            let csum = compute_checksum(&payload);

            let byte = rng.random_range(0..len);
            let bit = rng.random_range(0..8);
            payload[byte] ^= 1 << bit;
            assert!(!verify_checksum(csum, &payload), "flip byte {byte} bit {bit}");
        }
    }

    #[test]
    fn bit_flips_in_all_zero_payload_are_detected() {
        let mut payload = [0u8; 16];
        let csum = compute_checksum(&payload);
        for byte in 0..payload.len() {
            for bit in 0..8 {
                payload[byte] ^= 1 << bit;
                assert!(!verify_checksum(csum, &payload));
                payload[byte] ^= 1 << bit;
            }
        }
    }
}
