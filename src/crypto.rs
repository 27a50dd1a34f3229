//! Encryption schemes supported by Discord's secure RTP negotiation.

use byteorder::{BigEndian, ByteOrder};
use rand::Rng;
use xsalsa20poly1305::aead::{AeadInPlace, KeyInit};
use xsalsa20poly1305::{Key, Nonce, Tag, XSalsa20Poly1305 as Cipher, KEY_SIZE, NONCE_SIZE, TAG_SIZE};

use crate::constants::VOICE_PACKET_MAX;
use crate::error::Error;
use crate::rtp::RTP_HEADER_LEN;

/// Variants of the XSalsa20Poly1305 encryption scheme.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub enum CryptoMode {
    /// The RTP header is used as the source of nonce bytes for the packet.
    ///
    /// Equivalent to a nonce of at most 48b (6B) at no extra packet overhead:
    /// the RTP sequence number and timestamp are the varying quantities.
    Normal,
    /// An additional random 24B suffix is used as the source of nonce bytes for the packet.
    ///
    /// Full nonce width of 24B (192b), at an extra 24B per packet (~1.2 kB/s).
    Suffix,
    /// A 32-bit counter is used as the source of nonce bytes for the packet.
    ///
    /// Nonce width of 4B (32b), at an extra 4B per packet (~0.2 kB/s).
    Lite,
}

/// Failure while sealing or opening a single voice packet.
///
/// Packet-level failures are counted and dropped; they never end a session.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PacketError {
    /// Packet too short to contain a tag and trailer for the chosen mode.
    TooShort,
    /// The AEAD rejected the packet (corrupted, forged, or mis-keyed).
    Crypto,
}

impl CryptoMode {
    /// Returns the name of a mode as it will appear during negotiation.
    pub fn to_request_str(self) -> &'static str {
        use CryptoMode::*;
        match self {
            Normal => "xsalsa20_poly1305",
            Suffix => "xsalsa20_poly1305_suffix",
            Lite => "xsalsa20_poly1305_lite",
        }
    }

    /// Maps a negotiation string onto a known mode.
    ///
    /// Unknown strings (e.g., AES-GCM variants this library does not speak)
    /// produce `None` and are skipped during negotiation.
    pub fn from_request_str(s: &str) -> Option<Self> {
        use CryptoMode::*;
        match s {
            "xsalsa20_poly1305" => Some(Normal),
            "xsalsa20_poly1305_suffix" => Some(Suffix),
            "xsalsa20_poly1305_lite" => Some(Lite),
            _ => None,
        }
    }

    /// Number of bytes each mode appends after the ciphertext.
    pub fn trailer_len(self) -> usize {
        use CryptoMode::*;
        match self {
            Normal => 0,
            Suffix => NONCE_SIZE,
            Lite => 4,
        }
    }

    /// Largest Opus frame which still fits a maximum-size packet under this
    /// mode's overhead.
    pub fn payload_budget(self) -> usize {
        VOICE_PACKET_MAX - RTP_HEADER_LEN - TAG_SIZE - self.trailer_len()
    }

    /// Selects a mode from the server's offer.
    ///
    /// The first preferred mode present in the offer wins; failing that, the
    /// first offered mode this library recognises. An offer with no usable
    /// mode is a negotiation failure.
    pub fn negotiate(offered: &[String], preferred: &[CryptoMode]) -> Result<CryptoMode, Error> {
        for mode in preferred {
            if offered.iter().any(|o| o == mode.to_request_str()) {
                return Ok(*mode);
            }
        }

        offered
            .iter()
            .find_map(|o| CryptoMode::from_request_str(o))
            .ok_or(Error::CryptoModeUnavailable)
    }

    /// Builds a cipher from a freshly negotiated secret key, zeroing the
    /// source bytes afterwards.
    pub(crate) fn cipher_from_key(secret_key: &mut Vec<u8>) -> Result<Cipher, Error> {
        if secret_key.len() != KEY_SIZE {
            return Err(Error::KeyLength(secret_key.len()));
        }

        let cipher = Cipher::new(Key::from_slice(secret_key));
        secret_key.iter_mut().for_each(|b| *b = 0);

        Ok(cipher)
    }

    /// Seals one RTP packet: `header || tag || ciphertext || trailer`.
    ///
    /// `nonce_counter` is only read in `Lite` mode, where its big-endian form
    /// doubles as the 4-byte trailer.
    pub fn seal(
        self,
        cipher: &Cipher,
        header: &[u8; RTP_HEADER_LEN],
        payload: &[u8],
        nonce_counter: u32,
    ) -> Result<Vec<u8>, PacketError> {
        let mut nonce = Nonce::default();

        match self {
            CryptoMode::Normal => {
                nonce[..RTP_HEADER_LEN].copy_from_slice(&header[..]);
            },
            CryptoMode::Suffix => {
                rand::thread_rng().fill(nonce.as_mut_slice());
            },
            CryptoMode::Lite => {
                BigEndian::write_u32(&mut nonce[..4], nonce_counter);
            },
        }

        let mut packet =
            Vec::with_capacity(RTP_HEADER_LEN + TAG_SIZE + payload.len() + self.trailer_len());
        packet.extend_from_slice(&header[..]);

        let mut body = payload.to_vec();
        let tag = cipher
            .encrypt_in_place_detached(&nonce, b"", &mut body)
            .map_err(|_| PacketError::Crypto)?;

        packet.extend_from_slice(&tag);
        packet.extend_from_slice(&body);

        match self {
            CryptoMode::Normal => {},
            CryptoMode::Suffix => packet.extend_from_slice(&nonce),
            CryptoMode::Lite => {
                let mut trailer = [0u8; 4];
                BigEndian::write_u32(&mut trailer, nonce_counter);
                packet.extend_from_slice(&trailer);
            },
        }

        Ok(packet)
    }

    /// Opens one sealed RTP packet, returning the plaintext payload.
    ///
    /// `header_len` is the parsed RTP header length; the nonce is always
    /// derived from the fixed 12-byte prefix (or the mode's trailer).
    pub fn open(
        self,
        cipher: &Cipher,
        packet: &[u8],
        header_len: usize,
    ) -> Result<Vec<u8>, PacketError> {
        let trailer = self.trailer_len();
        if packet.len() < header_len + TAG_SIZE + trailer || header_len < RTP_HEADER_LEN {
            return Err(PacketError::TooShort);
        }

        let body_end = packet.len() - trailer;
        let mut nonce = Nonce::default();

        match self {
            CryptoMode::Normal => {
                nonce[..RTP_HEADER_LEN].copy_from_slice(&packet[..RTP_HEADER_LEN]);
            },
            CryptoMode::Suffix => {
                nonce.copy_from_slice(&packet[body_end..]);
            },
            CryptoMode::Lite => {
                nonce[..4].copy_from_slice(&packet[body_end..]);
            },
        }

        let tag = Tag::clone_from_slice(&packet[header_len..header_len + TAG_SIZE]);
        let mut body = packet[header_len + TAG_SIZE..body_end].to_vec();

        cipher
            .decrypt_in_place_detached(&nonce, b"", &mut body, &tag)
            .map_err(|_| PacketError::Crypto)?;

        Ok(body)
    }
}
