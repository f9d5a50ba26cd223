//! PAP protocol - RFC 1334
//!
//! Password Authentication Protocol: a single credentials request answered
//! by Authenticate-Ack or Authenticate-Nak.

use super::control::{ControlBuilder, ControlPacket};
use crate::{Error, Result};

/// PAP packet codes
pub mod codes {
    pub const AUTHENTICATE_REQUEST: u8 = 1;
    pub const AUTHENTICATE_ACK: u8 = 2;
    pub const AUTHENTICATE_NAK: u8 = 3;
}

/// Credentials carried by an Authenticate-Request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials<'a> {
    pub peer_id: &'a [u8],
    pub password: &'a [u8],
}

/// Extract Peer-ID and Password from an Authenticate-Request
///
/// Format: Peer-ID-Length (1) + Peer-ID + Passwd-Length (1) + Password
pub fn parse_request<'a>(packet: &ControlPacket<'a>) -> Result<Credentials<'a>> {
    if packet.code() != codes::AUTHENTICATE_REQUEST {
        return Err(Error::InvalidPacket(format!(
            "PAP code {} is not Authenticate-Request",
            packet.code()
        )));
    }
    let data = packet.data();
    let (peer_id, rest) =
        split_counted(data).ok_or_else(|| Error::Parse("PAP Peer-ID truncated".into()))?;
    let (password, _) =
        split_counted(rest).ok_or_else(|| Error::Parse("PAP Password truncated".into()))?;
    Ok(Credentials { peer_id, password })
}

/// Message text of an Authenticate-Ack/Nak, lossily decoded
///
/// A missing or truncated message yields an empty string.
pub fn parse_message(packet: &ControlPacket<'_>) -> String {
    split_counted(packet.data())
        .map(|(msg, _)| String::from_utf8_lossy(msg).into_owned())
        .unwrap_or_default()
}

/// Split a length-prefixed field off the front of `data`
fn split_counted(data: &[u8]) -> Option<(&[u8], &[u8])> {
    let (&len, rest) = data.split_first()?;
    let len = len as usize;
    if rest.len() < len {
        return None;
    }
    Some(rest.split_at(len))
}

fn push_counted(out: &mut Vec<u8>, field: &[u8]) {
    let len = field.len().min(u8::MAX as usize);
    out.push(len as u8);
    out.extend_from_slice(&field[..len]);
}

/// Build an Authenticate-Request
pub fn authenticate_request(identifier: u8, peer_id: &str, password: &str) -> Vec<u8> {
    let mut data = Vec::with_capacity(2 + peer_id.len() + password.len());
    push_counted(&mut data, peer_id.as_bytes());
    push_counted(&mut data, password.as_bytes());
    ControlBuilder::new(codes::AUTHENTICATE_REQUEST, identifier)
        .raw_data(&data)
        .build()
}

/// Build an Authenticate-Ack (`success`) or Authenticate-Nak
pub fn authenticate_reply(identifier: u8, success: bool, message: &str) -> Vec<u8> {
    let code = if success {
        codes::AUTHENTICATE_ACK
    } else {
        codes::AUTHENTICATE_NAK
    };
    let mut data = Vec::with_capacity(1 + message.len());
    push_counted(&mut data, message.as_bytes());
    ControlBuilder::new(code, identifier).raw_data(&data).build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_authenticate_request() {
        let data = [
            0x01, 0x01, 0x00, 0x0e, // Authenticate-Request id=1 len=14
            0x04, b't', b'e', b's', b't', // Peer-ID
            0x04, b'p', b'a', b's', b's', // Password
        ];

        let packet = ControlPacket::parse(&data).unwrap();
        let creds = parse_request(&packet).unwrap();
        assert_eq!(creds.peer_id, b"test");
        assert_eq!(creds.password, b"pass");
    }

    #[test]
    fn test_request_round_trip() {
        let bytes = authenticate_request(42, "user123", "secret456");
        let packet = ControlPacket::parse(&bytes).unwrap();
        assert_eq!(packet.identifier(), 42);
        let creds = parse_request(&packet).unwrap();
        assert_eq!(creds.peer_id, b"user123");
        assert_eq!(creds.password, b"secret456");
    }

    #[test]
    fn test_truncated_password() {
        let data = [0x01, 0x01, 0x00, 0x08, 0x01, b'a', 0x05, b'x'];
        let packet = ControlPacket::parse(&data).unwrap();
        assert!(parse_request(&packet).is_err());
    }

    #[test]
    fn test_request_wrong_code() {
        let bytes = authenticate_reply(1, true, "");
        let packet = ControlPacket::parse(&bytes).unwrap();
        assert!(parse_request(&packet).is_err());
    }

    #[test]
    fn test_reply_message() {
        let bytes = authenticate_reply(7, false, "Bad credentials");
        let packet = ControlPacket::parse(&bytes).unwrap();
        assert_eq!(packet.code(), codes::AUTHENTICATE_NAK);
        assert_eq!(parse_message(&packet), "Bad credentials");
    }

    #[test]
    fn test_empty_message() {
        let data = [0x02, 0x01, 0x00, 0x04];
        let packet = ControlPacket::parse(&data).unwrap();
        assert_eq!(parse_message(&packet), "");
    }
}
