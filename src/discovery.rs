//! IP discovery: the UDP bootstrap exchange revealing the client's
//! externally visible address and port.

use std::net::IpAddr;
use std::str::FromStr;

use byteorder::{BigEndian, ByteOrder};

use crate::error::Error;

/// Total size of a discovery request or reply datagram.
pub const DISCOVERY_LEN: usize = 74;

/// Length field carried by both directions of the exchange.
const DISCOVERY_BODY_LEN: u16 = 70;

const TYPE_REQUEST: u16 = 0x0001;
const TYPE_REPLY: u16 = 0x0002;

const ADDRESS_OFFSET: usize = 8;
const ADDRESS_LEN: usize = 64;
const PORT_OFFSET: usize = 72;

/// Builds a discovery request for the given SSRC.
///
/// Address and port fields are zero on send; the server populates them in
/// its reply.
pub fn request(ssrc: u32) -> [u8; DISCOVERY_LEN] {
    let mut buf = [0u8; DISCOVERY_LEN];

    BigEndian::write_u16(&mut buf[0..2], TYPE_REQUEST);
    BigEndian::write_u16(&mut buf[2..4], DISCOVERY_BODY_LEN);
    BigEndian::write_u32(&mut buf[4..8], ssrc);

    buf
}

/// Reads the SSRC back out of a discovery request.
///
/// Used by servers (and tests) to answer a probe.
pub fn parse_request(buf: &[u8]) -> Option<u32> {
    if buf.len() != DISCOVERY_LEN
        || BigEndian::read_u16(&buf[0..2]) != TYPE_REQUEST
        || BigEndian::read_u16(&buf[2..4]) != DISCOVERY_BODY_LEN
    {
        return None;
    }

    Some(BigEndian::read_u32(&buf[4..8]))
}

/// Builds a discovery reply, as a voice server would.
pub fn reply(ssrc: u32, address: &str, port: u16) -> [u8; DISCOVERY_LEN] {
    let mut buf = [0u8; DISCOVERY_LEN];

    BigEndian::write_u16(&mut buf[0..2], TYPE_REPLY);
    BigEndian::write_u16(&mut buf[2..4], DISCOVERY_BODY_LEN);
    BigEndian::write_u32(&mut buf[4..8], ssrc);

    let bytes = address.as_bytes();
    let len = bytes.len().min(ADDRESS_LEN - 1);
    buf[ADDRESS_OFFSET..ADDRESS_OFFSET + len].copy_from_slice(&bytes[..len]);

    BigEndian::write_u16(&mut buf[PORT_OFFSET..], port);

    buf
}

/// Extracts the externally visible `(address, port)` from a reply.
pub fn parse_reply(buf: &[u8]) -> Result<(IpAddr, u16), Error> {
    if buf.len() != DISCOVERY_LEN || BigEndian::read_u16(&buf[0..2]) != TYPE_REPLY {
        return Err(Error::IllegalDiscoveryResponse);
    }

    let address_raw = &buf[ADDRESS_OFFSET..ADDRESS_OFFSET + ADDRESS_LEN];

    // No assumptions about a clean left edge of NULs: UDP contents are
    // adversarial until authenticated.
    let nul_index = address_raw
        .iter()
        .position(|&b| b == 0)
        .ok_or(Error::IllegalIp)?;

    let address_str = std::str::from_utf8(&address_raw[..nul_index]).map_err(|_| Error::IllegalIp)?;
    let address = IpAddr::from_str(address_str).map_err(|_| Error::IllegalIp)?;

    let port = BigEndian::read_u16(&buf[PORT_OFFSET..]);

    Ok((address, port))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_round_trip() {
        let buf = request(0xCAFE_F00D);

        assert_eq!(buf.len(), DISCOVERY_LEN);
        assert_eq!(&buf[0..2], &[0x00, 0x01]);
        assert_eq!(&buf[2..4], &70u16.to_be_bytes());
        assert!(buf[8..].iter().all(|&b| b == 0));

        assert_eq!(parse_request(&buf), Some(0xCAFE_F00D));
    }

    #[test]
    fn reply_round_trip() {
        let buf = reply(12345, "198.51.100.2", 49152);

        let (ip, port) = parse_reply(&buf).unwrap();
        assert_eq!(ip, "198.51.100.2".parse::<IpAddr>().unwrap());
        assert_eq!(port, 49152);
    }

    #[test]
    fn reply_parse_rejects_requests() {
        let buf = request(1);
        assert!(matches!(
            parse_reply(&buf),
            Err(Error::IllegalDiscoveryResponse)
        ));
    }

    #[test]
    fn reply_parse_rejects_short_datagrams() {
        assert!(matches!(
            parse_reply(&[0u8; 16]),
            Err(Error::IllegalDiscoveryResponse)
        ));
    }

    #[test]
    fn reply_parse_rejects_unterminated_address() {
        let mut buf = reply(1, "203.0.113.1", 4000);
        for b in &mut buf[ADDRESS_OFFSET..ADDRESS_OFFSET + ADDRESS_LEN] {
            if *b == 0 {
                *b = b'9';
            }
        }

        assert!(matches!(parse_reply(&buf), Err(Error::IllegalIp)));
    }

    #[test]
    fn reply_parse_rejects_non_ip_address() {
        let buf = reply(1, "not-an-ip", 4000);
        assert!(matches!(parse_reply(&buf), Err(Error::IllegalIp)));
    }
}
