//! LCP wire constants - RFC 1661, RFC 1662 (ACCM)
//!
//! LCP packets use the common control format from [`super::control`]; this
//! module adds the LCP-only codes and option types.

use super::control::{ControlBuilder, CONTROL_HEADER_SIZE};

/// LCP-only packet codes (1-7 are in [`super::control::codes`])
pub mod codes {
    pub const PROTOCOL_REJECT: u8 = 8;
    pub const ECHO_REQUEST: u8 = 9;
    pub const ECHO_REPLY: u8 = 10;
    pub const DISCARD_REQUEST: u8 = 11;
}

/// LCP option types
pub mod options {
    /// Maximum-Receive-Unit
    pub const MRU: u8 = 1;
    /// Async-Control-Character-Map
    pub const ACCM: u8 = 2;
    /// Authentication-Protocol
    pub const AUTH_PROTOCOL: u8 = 3;
    /// Quality-Protocol (not supported, always rejected)
    pub const QUALITY_PROTOCOL: u8 = 4;
    /// Magic-Number
    pub const MAGIC_NUMBER: u8 = 5;
    /// Protocol-Field-Compression
    pub const PFC: u8 = 7;
    /// Address-and-Control-Field-Compression
    pub const ACFC: u8 = 8;
}

/// Authentication-Protocol values
pub mod auth {
    /// Password Authentication Protocol
    pub const PAP: u16 = 0xc023;
}

/// Default MRU when the option is not negotiated
pub const DEFAULT_MRU: u16 = 1500;

/// Smallest MRU we accept from a peer
pub const MIN_MRU: u16 = 128;

/// Largest MRU we are willing to receive
pub const MAX_MRU: u16 = 4096;

/// Default ACCM on an async link: escape every control character
pub const DEFAULT_ACCM: u32 = 0xffff_ffff;

/// Name of an LCP option type, for logs and status output
pub fn option_name(opt_type: u8) -> &'static str {
    match opt_type {
        options::MRU => "MRU",
        options::ACCM => "ACCM",
        options::AUTH_PROTOCOL => "Auth-Protocol",
        options::QUALITY_PROTOCOL => "Quality-Protocol",
        options::MAGIC_NUMBER => "Magic-Number",
        options::PFC => "PFC",
        options::ACFC => "ACFC",
        _ => "unknown",
    }
}

/// Echo-Reply carrying our magic number ahead of the echoed data
pub fn echo_reply(identifier: u8, magic: u32, echoed: &[u8]) -> Vec<u8> {
    let mut data = magic.to_be_bytes().to_vec();
    // The peer's magic occupies the first four octets of its request
    if echoed.len() > 4 {
        data.extend_from_slice(&echoed[4..]);
    }
    ControlBuilder::new(codes::ECHO_REPLY, identifier)
        .raw_data(&data)
        .build()
}

/// Protocol-Reject for a packet whose protocol number we do not support
pub fn protocol_reject(identifier: u8, protocol: u16, info: &[u8], mru: u16) -> Vec<u8> {
    let room = (mru as usize).saturating_sub(CONTROL_HEADER_SIZE + 2);
    let mut data = protocol.to_be_bytes().to_vec();
    data.extend_from_slice(&info[..info.len().min(room)]);
    ControlBuilder::new(codes::PROTOCOL_REJECT, identifier)
        .raw_data(&data)
        .build()
}
