//! PPP protocol numbers - RFC 1661
//!
//! The framing layer hands the engine a protocol number and a payload. On the
//! simulated wire the two are carried as a single buffer: a 2-byte protocol
//! field (never compressed here) followed by the payload.

use crate::{Error, Result};

/// Size of the uncompressed protocol field
pub const PPP_HEADER_SIZE: usize = 2;

/// PPP protocol numbers
pub mod protocols {
    /// Internet Protocol version 4
    pub const IP: u16 = 0x0021;
    /// Van Jacobson compressed TCP/IP
    pub const VJ_COMPRESSED: u16 = 0x002d;
    /// Van Jacobson uncompressed TCP/IP
    pub const VJ_UNCOMPRESSED: u16 = 0x002f;
    /// Internet Protocol Control Protocol
    pub const IPCP: u16 = 0x8021;
    /// Link Control Protocol
    pub const LCP: u16 = 0xc021;
    /// Password Authentication Protocol
    pub const PAP: u16 = 0xc023;
}

/// Human readable name of a protocol number, for logs and status output.
pub fn protocol_name(protocol: u16) -> &'static str {
    match protocol {
        protocols::IP => "IP",
        protocols::VJ_COMPRESSED => "VJ-Compressed",
        protocols::VJ_UNCOMPRESSED => "VJ-Uncompressed",
        protocols::IPCP => "IPCP",
        protocols::LCP => "LCP",
        protocols::PAP => "PAP",
        _ => "unknown",
    }
}

/// A PPP frame as seen after deframing (zero-copy reference)
#[derive(Debug)]
pub struct PppFrame<'a> {
    buffer: &'a [u8],
}

impl<'a> PppFrame<'a> {
    /// Split a deframed buffer into protocol and payload
    pub fn parse(buffer: &'a [u8]) -> Result<Self> {
        if buffer.len() < PPP_HEADER_SIZE {
            return Err(Error::Parse(format!(
                "PPP frame too short ({} bytes)",
                buffer.len()
            )));
        }
        Ok(Self { buffer })
    }

    /// Protocol field
    pub fn protocol(&self) -> u16 {
        u16::from_be_bytes([self.buffer[0], self.buffer[1]])
    }

    /// Payload following the protocol field
    pub fn payload(&self) -> &'a [u8] {
        &self.buffer[PPP_HEADER_SIZE..]
    }
}

/// Prepends the protocol field to a payload
#[derive(Debug)]
pub struct PppBuilder {
    protocol: u16,
    payload: Vec<u8>,
}

impl PppBuilder {
    pub fn new(protocol: u16) -> Self {
        Self {
            protocol,
            payload: Vec::new(),
        }
    }

    pub fn payload(mut self, data: &[u8]) -> Self {
        self.payload = data.to_vec();
        self
    }

    pub fn build(self) -> Vec<u8> {
        let mut frame = Vec::with_capacity(PPP_HEADER_SIZE + self.payload.len());
        frame.extend_from_slice(&self.protocol.to_be_bytes());
        frame.extend_from_slice(&self.payload);
        frame
    }
}
