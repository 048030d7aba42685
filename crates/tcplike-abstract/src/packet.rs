//! Fixed-layout segment codec.
//!
//! Every datagram on the unreliable channel is exactly [`SEGMENT_LEN`] bytes:
//! a 20-byte TCP-style header followed by an [`MSS`]-byte payload block.
//! All multi-byte fields are big-endian.
//!
//! ```text
//!  0               1               2               3
//! +-------------------------------+-------------------------------+
//! |          Source Port          |        Destination Port       |
//! +-------------------------------+-------------------------------+
//! |                        Sequence Number                        |
//! +---------------------------------------------------------------+
//! |                     Acknowledgment Number                     |
//! +---------------+---------------+-------------------------------+
//! |  Header Len   |     Flags     |          Window Size          |
//! +---------------+---------------+-------------------------------+
//! |           Checksum            |     Urgent Pointer (zero)     |
//! +-------------------------------+-------------------------------+
//! |                      Payload (576 bytes)                      |
//! +---------------------------------------------------------------+
//! ```

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;

/// TCP Header flags
pub mod flags {
    pub const FIN: u8 = 0x01;
    pub const ACK: u8 = 0x10;
}

/// Header length in bytes.
pub const HEADER_LEN: usize = 20;
/// Maximum segment size: the fixed payload length of every packet.
pub const MSS: usize = 576;
/// Length of one encoded packet on the wire.
pub const SEGMENT_LEN: usize = HEADER_LEN + MSS;
/// Data offset of five 32-bit words in the high nibble, reserved bits clear.
pub const HEADER_LENGTH_WORD: u8 = 0x50;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PacketError {
    #[error("segment truncated: expected {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TcpHeader {
    pub src_port: u16,
    pub dst_port: u16,
    /// Packet index within the transfer, not a byte offset.
    pub seq_num: u32,
    /// Advances in lockstep with `seq_num`.
    pub ack_num: u32,
    pub header_len: u8,
    pub flags: u8,
    /// Advertised only; the sender never pipelines on it.
    pub window_size: u16,
    pub checksum: u16,
    pub urgent_ptr: u16,
}

impl TcpHeader {
    pub fn new(src_port: u16, dst_port: u16, seq: u32, ack: u32, flags: u8, wnd: u16) -> Self {
        Self {
            src_port,
            dst_port,
            seq_num: seq,
            ack_num: ack,
            header_len: HEADER_LENGTH_WORD,
            flags,
            window_size: wnd,
            ..Default::default()
        }
    }

    pub fn is_ack(&self) -> bool {
        self.flags & flags::ACK != 0
    }

    pub fn is_fin(&self) -> bool {
        self.flags & flags::FIN != 0
    }
}

/// One header plus one payload block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub header: TcpHeader,
    pub payload: [u8; MSS],
}

impl Packet {
    /// Build a packet whose `header.checksum` already holds the value
    /// [`Packet::encode`] will put on the wire.
    ///
    /// `data` shorter than [`MSS`] is zero-filled to a whole block.
    ///
    /// # Panics
    /// If `data` is longer than [`MSS`].
    pub fn sealed(header: TcpHeader, data: &[u8]) -> Self {
        assert!(
            data.len() <= MSS,
            "payload of {} bytes exceeds MSS {MSS}",
            data.len()
        );
        let mut payload = [0u8; MSS];
        payload[..data.len()].copy_from_slice(data);

        let mut packet = Self { header, payload };
        packet.header.checksum = packet.compute_checksum();
        packet
    }

    /// Serialise into a [`SEGMENT_LEN`]-byte buffer.
    ///
    /// The checksum is always recomputed; whatever `header.checksum` holds is ignored.
    pub fn encode(&self) -> Bytes {
        self.write_segment(self.compute_checksum()).freeze()
    }

    /// Parse the fixed layout back into its fields.
    ///
    /// This does not validate anything; see [`Packet::checksum_ok`].
    /// Bytes past [`SEGMENT_LEN`] are ignored.
    pub fn decode(buf: &[u8]) -> Result<Self, PacketError> {
        if buf.len() < SEGMENT_LEN {
            return Err(PacketError::Truncated {
                expected: SEGMENT_LEN,
                actual: buf.len(),
            });
        }

        let mut rdr = &buf[..SEGMENT_LEN];
        let header = TcpHeader {
            src_port: rdr.get_u16(),
            dst_port: rdr.get_u16(),
            seq_num: rdr.get_u32(),
            ack_num: rdr.get_u32(),
            header_len: rdr.get_u8(),
            flags: rdr.get_u8(),
            window_size: rdr.get_u16(),
            checksum: rdr.get_u16(),
            urgent_ptr: rdr.get_u16(),
        };
        let mut payload = [0u8; MSS];
        rdr.copy_to_slice(&mut payload);

        Ok(Self { header, payload })
    }

    /// Checksum of this packet as the sender computes it: over the whole
    /// segment with the checksum field zeroed.
    pub fn compute_checksum(&self) -> u16 {
        let h = &self.header;
        segment_checksum(
            h.src_port,
            h.dst_port,
            h.window_size,
            &self.write_segment(0),
        )
    }

    /// Compare the carried checksum against a fresh one.
    ///
    /// Decoding is lossless over the first [`SEGMENT_LEN`] bytes, so this is
    /// the same as recomputing over the received buffer itself.
    pub fn checksum_ok(&self) -> bool {
        self.header.checksum == self.compute_checksum()
    }

    fn write_segment(&self, checksum: u16) -> BytesMut {
        let h = &self.header;
        let mut buf = BytesMut::with_capacity(SEGMENT_LEN);
        buf.put_u16(h.src_port);
        buf.put_u16(h.dst_port);
        buf.put_u32(h.seq_num);
        buf.put_u32(h.ack_num);
        buf.put_u8(h.header_len);
        buf.put_u8(h.flags);
        buf.put_u16(h.window_size);
        buf.put_u16(checksum);
        buf.put_u16(h.urgent_ptr);
        buf.put_slice(&self.payload);
        debug_assert_eq!(buf.len(), SEGMENT_LEN);
        buf
    }
}

/// 16-bit segment checksum.
///
/// The accumulator starts at `src_port + dst_port + window_size` and then adds
/// every big-endian word of `segment`, header included, so those three fields
/// are counted twice. Sums wrap at 16 bits with no end-around carry. A
/// trailing odd byte is not summed.
pub fn segment_checksum(src_port: u16, dst_port: u16, window_size: u16, segment: &[u8]) -> u16 {
    let mut acc = src_port.wrapping_add(dst_port).wrapping_add(window_size);
    for word in segment.chunks_exact(2) {
        acc = acc.wrapping_add(u16::from_be_bytes([word[0], word[1]]));
    }
    !acc
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn data_packet(seq: u32, flags: u8, data: &[u8]) -> Packet {
        Packet::sealed(TcpHeader::new(40000, 5000, seq, seq, flags, 1), data)
    }

    #[test]
    fn fields_land_at_fixed_offsets() {
        let header = TcpHeader::new(0x0102, 0x0304, 0x0506_0708, 0x090a_0b0c, flags::ACK, 0x0d0e);
        let bytes = Packet::sealed(header, b"xy").encode();

        assert_eq!(bytes.len(), SEGMENT_LEN);
        assert_eq!(&bytes[0..2], &[0x01, 0x02]);
        assert_eq!(&bytes[2..4], &[0x03, 0x04]);
        assert_eq!(&bytes[4..8], &[0x05, 0x06, 0x07, 0x08]);
        assert_eq!(&bytes[8..12], &[0x09, 0x0a, 0x0b, 0x0c]);
        assert_eq!(bytes[12], 80);
        assert_eq!(bytes[13], 0x10);
        assert_eq!(&bytes[14..16], &[0x0d, 0x0e]);
        assert_eq!(&bytes[18..20], &[0, 0]);
        assert_eq!(&bytes[20..22], b"xy");
        assert!(bytes[22..].iter().all(|b| *b == 0));
    }

    #[test]
    fn fin_packet_carries_0x11() {
        let bytes = data_packet(3, flags::ACK | flags::FIN, b"").encode();
        assert_eq!(bytes[13], 0x11);
        let decoded = Packet::decode(&bytes).unwrap();
        assert!(decoded.header.is_ack());
        assert!(decoded.header.is_fin());
    }

    #[test]
    fn checksum_double_counts_ports_and_window() {
        let pkt = data_packet(0, flags::ACK, b"");
        let h = pkt.header;

        let mut acc = h.src_port.wrapping_add(h.dst_port).wrapping_add(h.window_size);
        // Header words with the checksum field zeroed; the payload is all zero.
        for word in [
            h.src_port,
            h.dst_port,
            (h.seq_num >> 16) as u16,
            h.seq_num as u16,
            (h.ack_num >> 16) as u16,
            h.ack_num as u16,
            u16::from_be_bytes([h.header_len, h.flags]),
            h.window_size,
            0,
            0,
        ] {
            acc = acc.wrapping_add(word);
        }
        assert_eq!(h.checksum, !acc);
    }

    #[test]
    fn checksum_ignores_trailing_odd_byte() {
        assert_eq!(
            segment_checksum(1, 2, 3, &[0xab, 0xcd, 0xff]),
            segment_checksum(1, 2, 3, &[0xab, 0xcd])
        );
    }

    #[test]
    fn checksum_wraps_without_carry_folding() {
        // 0xffff + 0x0001 wraps to zero instead of folding back to 0x0001.
        assert_eq!(segment_checksum(0, 0, 0, &[0xff, 0xff, 0x00, 0x01]), 0xffff);
    }

    #[test]
    fn corrupted_payload_fails_verification() {
        let mut bytes = data_packet(1, flags::ACK, b"payload").encode().to_vec();
        bytes[HEADER_LEN + 3] ^= 0x04;
        assert!(!Packet::decode(&bytes).unwrap().checksum_ok());
    }

    #[test]
    fn corrupted_checksum_field_fails_verification() {
        let mut bytes = data_packet(1, flags::ACK, b"payload").encode().to_vec();
        bytes[16] ^= 0x01;
        assert!(!Packet::decode(&bytes).unwrap().checksum_ok());
    }

    #[test]
    fn cancelling_payload_flips_go_undetected() {
        // Word 0 drops by one while word 1 gains one: the sum is unchanged.
        let mut data = [0u8; 4];
        data[1] = 1;
        let mut bytes = data_packet(1, flags::ACK, &data).encode().to_vec();
        bytes[HEADER_LEN + 1] = 0;
        bytes[HEADER_LEN + 3] = 1;

        let decoded = Packet::decode(&bytes).unwrap();
        assert_ne!(&decoded.payload[..4], &data[..]);
        assert!(decoded.checksum_ok());
    }

    #[test]
    fn top_bit_of_window_is_invisible_to_checksum() {
        // The window is summed twice, so a 0x8000 change adds 0x10000.
        let mut bytes = data_packet(1, flags::ACK, b"abc").encode().to_vec();
        bytes[14] ^= 0x80;

        let decoded = Packet::decode(&bytes).unwrap();
        assert_eq!(decoded.header.window_size, 0x8001);
        assert!(decoded.checksum_ok());
    }

    #[test]
    fn decode_short_buffer_is_an_error() {
        assert_eq!(
            Packet::decode(&[0u8; SEGMENT_LEN - 1]),
            Err(PacketError::Truncated {
                expected: SEGMENT_LEN,
                actual: SEGMENT_LEN - 1
            })
        );
        assert!(Packet::decode(&[]).is_err());
    }

    #[test]
    fn decode_ignores_bytes_past_segment() {
        let pkt = data_packet(2, flags::ACK, b"tail");
        let mut bytes = pkt.encode().to_vec();
        bytes.extend_from_slice(b"garbage");
        assert_eq!(Packet::decode(&bytes).unwrap(), pkt);
    }

    #[test]
    #[should_panic(expected = "exceeds MSS")]
    fn oversized_payload_panics() {
        let _ = data_packet(0, flags::ACK, &[1u8; MSS + 1]);
    }

    proptest! {
        #[test]
        fn decode_reproduces_sealed_packet(
            src_port in any::<u16>(),
            dst_port in any::<u16>(),
            seq in any::<u32>(),
            ack in any::<u32>(),
            flag_bits in any::<u8>(),
            window in any::<u16>(),
            data in proptest::collection::vec(any::<u8>(), 0..=MSS),
        ) {
            let header = TcpHeader::new(src_port, dst_port, seq, ack, flag_bits, window);
            let pkt = Packet::sealed(header, &data);
            let decoded = Packet::decode(&pkt.encode()).unwrap();

            prop_assert_eq!(&decoded, &pkt);
            prop_assert!(decoded.checksum_ok());
            prop_assert_eq!(&decoded.payload[..data.len()], &data[..]);
            prop_assert!(decoded.payload[data.len()..].iter().all(|b| *b == 0));
        }

        #[test]
        fn single_payload_bit_flip_is_detected(
            data in proptest::collection::vec(any::<u8>(), 0..=MSS),
            bit in 0..MSS * 8,
        ) {
            let mut bytes = data_packet(9, flags::ACK, &data).encode().to_vec();
            bytes[HEADER_LEN + bit / 8] ^= 1u8 << (bit % 8);
            prop_assert!(!Packet::decode(&bytes).unwrap().checksum_ok());
        }
    }
}
