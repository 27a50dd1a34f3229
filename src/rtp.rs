//! RTP header handling for Discord's Opus audio traffic.

use byteorder::{BigEndian, ByteOrder};

use crate::constants::{MONO_FRAME_SIZE, RTP_PROFILE_TYPE, RTP_VERSION};
use crate::crypto::CryptoMode;

/// Length of the fixed RTP header emitted by this library.
pub const RTP_HEADER_LEN: usize = 12;

/// Decoded view of an RTP packet header.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RtpHeader {
    pub version: u8,
    pub padding: bool,
    pub extension: bool,
    pub csrc_count: u8,
    pub marker: bool,
    pub payload_type: u8,
    pub sequence: u16,
    pub timestamp: u32,
    pub ssrc: u32,
    /// Offset of the payload within the packet. `12` for packets this
    /// library builds; contributing-source entries shift it on parse.
    pub payload_offset: usize,
}

impl RtpHeader {
    /// Creates the header for one outgoing Opus packet.
    pub fn new(sequence: u16, timestamp: u32, ssrc: u32) -> Self {
        Self {
            version: RTP_VERSION,
            padding: false,
            extension: false,
            csrc_count: 0,
            marker: false,
            payload_type: RTP_PROFILE_TYPE,
            sequence,
            timestamp,
            ssrc,
            payload_offset: RTP_HEADER_LEN,
        }
    }

    /// Serializes the fixed 12-byte header.
    pub fn to_bytes(&self) -> [u8; RTP_HEADER_LEN] {
        let mut buf = [0u8; RTP_HEADER_LEN];

        buf[0] = (self.version << 6)
            | ((self.padding as u8) << 5)
            | ((self.extension as u8) << 4)
            | (self.csrc_count & 0x0F);
        buf[1] = ((self.marker as u8) << 7) | (self.payload_type & 0x7F);
        BigEndian::write_u16(&mut buf[2..4], self.sequence);
        BigEndian::write_u32(&mut buf[4..8], self.timestamp);
        BigEndian::write_u32(&mut buf[8..12], self.ssrc);

        buf
    }

    /// Parses a header from the front of a datagram.
    ///
    /// Returns `None` when fewer than 12 bytes are available.
    pub fn parse(buf: &[u8]) -> Option<Self> {
        if buf.len() < RTP_HEADER_LEN {
            return None;
        }

        let csrc_count = buf[0] & 0x0F;

        Some(Self {
            version: buf[0] >> 6,
            padding: buf[0] & 0x20 != 0,
            extension: buf[0] & 0x10 != 0,
            csrc_count,
            marker: buf[1] & 0x80 != 0,
            payload_type: buf[1] & 0x7F,
            sequence: BigEndian::read_u16(&buf[2..4]),
            timestamp: BigEndian::read_u32(&buf[4..8]),
            ssrc: BigEndian::read_u32(&buf[8..12]),
            payload_offset: RTP_HEADER_LEN + 4 * csrc_count as usize,
        })
    }

    /// Whether this header plausibly fronts a Discord voice packet.
    pub fn is_voice(&self) -> bool {
        self.version == RTP_VERSION && self.payload_type == RTP_PROFILE_TYPE
    }
}

/// Per-session RTP send position.
///
/// One cursor exists per voice session and is replaced wholesale alongside
/// the SSRC and secret key. All counters wrap.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct RtpCursor {
    pub sequence: u16,
    pub timestamp: u32,
    pub nonce_counter: u32,
}

impl RtpCursor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marches the cursor past one sent packet: sequence +1, timestamp +960.
    ///
    /// The nonce counter moves only under `Lite`, which is the sole consumer
    /// of its value.
    pub fn advance(&mut self, mode: CryptoMode) {
        self.sequence = self.sequence.wrapping_add(1);
        self.timestamp = self.timestamp.wrapping_add(MONO_FRAME_SIZE as u32);

        if mode == CryptoMode::Lite {
            self.nonce_counter = self.nonce_counter.wrapping_add(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_build_parse_round_trip() {
        let header = RtpHeader::new(0xBEEF, 0xDEAD_CAFE, 0x1234_5678);
        let bytes = header.to_bytes();

        assert_eq!(RtpHeader::parse(&bytes), Some(header));
    }

    #[test]
    fn built_header_has_expected_layout() {
        let bytes = RtpHeader::new(1, 960, 12345).to_bytes();

        // Version 2 in the top bits, no padding/extension/csrc.
        assert_eq!(bytes[0], 0x80);
        // No marker, payload type 120.
        assert_eq!(bytes[1], 120);
        assert_eq!(&bytes[2..4], &1u16.to_be_bytes());
        assert_eq!(&bytes[4..8], &960u32.to_be_bytes());
        assert_eq!(&bytes[8..12], &12345u32.to_be_bytes());
    }

    #[test]
    fn parse_rejects_short_input() {
        assert_eq!(RtpHeader::parse(&[0u8; 11]), None);
    }

    #[test]
    fn parse_extracts_flag_fields() {
        let mut bytes = RtpHeader::new(7, 7, 7).to_bytes();
        bytes[0] |= 0x30 | 0x02; // padding + extension + csrc_count 2
        bytes[1] |= 0x80; // marker

        let parsed = RtpHeader::parse(&bytes).unwrap();
        assert!(parsed.padding);
        assert!(parsed.extension);
        assert!(parsed.marker);
        assert_eq!(parsed.csrc_count, 2);
        assert_eq!(parsed.payload_offset, RTP_HEADER_LEN + 8);
    }

    #[test]
    fn foreign_traffic_is_not_voice() {
        let mut bytes = RtpHeader::new(0, 0, 0).to_bytes();
        bytes[1] = 0x48; // RTCP-ish payload type

        assert!(!RtpHeader::parse(&bytes).unwrap().is_voice());
    }

    #[test]
    fn cursor_marches_and_wraps() {
        let mut cursor = RtpCursor {
            sequence: u16::MAX,
            timestamp: u32::MAX - 100,
            nonce_counter: u32::MAX,
        };

        cursor.advance(CryptoMode::Lite);
        assert_eq!(cursor.sequence, 0);
        assert_eq!(cursor.timestamp, (u32::MAX - 100).wrapping_add(960));
        assert_eq!(cursor.nonce_counter, 0);
    }

    #[test]
    fn nonce_counter_only_moves_under_lite() {
        let mut cursor = RtpCursor::new();

        cursor.advance(CryptoMode::Normal);
        cursor.advance(CryptoMode::Suffix);
        assert_eq!(cursor.nonce_counter, 0);
        assert_eq!(cursor.sequence, 2);
        assert_eq!(cursor.timestamp, 1920);

        cursor.advance(CryptoMode::Lite);
        assert_eq!(cursor.nonce_counter, 1);
    }

    #[test]
    fn consecutive_packets_differ_by_one_and_960() {
        let mut cursor = RtpCursor::new();
        let mut last = (cursor.sequence, cursor.timestamp);

        for _ in 0..200 {
            cursor.advance(CryptoMode::Lite);
            let next = (cursor.sequence, cursor.timestamp);
            assert_eq!(next.0, last.0.wrapping_add(1));
            assert_eq!(next.1, last.1.wrapping_add(960));
            last = next;
        }
    }
}
