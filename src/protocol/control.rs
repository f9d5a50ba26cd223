//! Control packet format shared by LCP, IPCP and PAP - RFC 1661 section 5
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |     Code      |  Identifier   |            Length             |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |    Data ...
//! +-+-+-+-+
//! ```
//!
//! Configure-* packets carry a list of type/length/value options in Data.

use crate::{Error, Result};

/// Code + Identifier + Length
pub const CONTROL_HEADER_SIZE: usize = 4;

/// Option header size (type + length)
pub const OPTION_HEADER_SIZE: usize = 2;

/// Codes common to every option-negotiating control protocol
pub mod codes {
    pub const CONFIGURE_REQUEST: u8 = 1;
    pub const CONFIGURE_ACK: u8 = 2;
    pub const CONFIGURE_NAK: u8 = 3;
    pub const CONFIGURE_REJECT: u8 = 4;
    pub const TERMINATE_REQUEST: u8 = 5;
    pub const TERMINATE_ACK: u8 = 6;
    pub const CODE_REJECT: u8 = 7;
}

/// Name of a common control code, for logging
pub fn code_name(code: u8) -> &'static str {
    match code {
        codes::CONFIGURE_REQUEST => "Configure-Request",
        codes::CONFIGURE_ACK => "Configure-Ack",
        codes::CONFIGURE_NAK => "Configure-Nak",
        codes::CONFIGURE_REJECT => "Configure-Reject",
        codes::TERMINATE_REQUEST => "Terminate-Request",
        codes::TERMINATE_ACK => "Terminate-Ack",
        codes::CODE_REJECT => "Code-Reject",
        _ => "Other",
    }
}

/// Parsed control packet (zero-copy reference)
#[derive(Debug, Clone, Copy)]
pub struct ControlPacket<'a> {
    buffer: &'a [u8],
}

impl<'a> ControlPacket<'a> {
    /// Parse a control packet, trimming any padding past the Length field
    pub fn parse(buffer: &'a [u8]) -> Result<Self> {
        if buffer.len() < CONTROL_HEADER_SIZE {
            return Err(Error::Parse("control packet too short".into()));
        }

        let length = u16::from_be_bytes([buffer[2], buffer[3]]) as usize;
        if length < CONTROL_HEADER_SIZE {
            return Err(Error::Parse(format!("control length {} too small", length)));
        }
        if buffer.len() < length {
            return Err(Error::Parse(format!(
                "control packet truncated ({} of {} bytes)",
                buffer.len(),
                length
            )));
        }

        Ok(Self {
            buffer: &buffer[..length],
        })
    }

    pub fn code(&self) -> u8 {
        self.buffer[0]
    }

    pub fn identifier(&self) -> u8 {
        self.buffer[1]
    }

    pub fn length(&self) -> u16 {
        u16::from_be_bytes([self.buffer[2], self.buffer[3]])
    }

    /// Everything after the header, up to Length
    pub fn data(&self) -> &'a [u8] {
        &self.buffer[CONTROL_HEADER_SIZE..]
    }

    /// Iterate over options without validating the whole list
    pub fn iter_options(&self) -> OptionIter<'a> {
        OptionIter::new(self.data())
    }

    /// Decode the full option list, failing if any option is malformed
    pub fn options(&self) -> Result<Vec<ConfigOption<'a>>> {
        parse_options(self.data())
    }

    pub fn as_bytes(&self) -> &'a [u8] {
        self.buffer
    }
}

/// A single type/length/value option
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfigOption<'a> {
    pub opt_type: u8,
    /// Value bytes, excluding the type and length octets
    pub data: &'a [u8],
}

impl ConfigOption<'_> {
    /// Append this option, header included, to `out`
    pub fn encode_into(&self, out: &mut Vec<u8>) {
        encode_option(out, self.opt_type, self.data);
    }

    pub fn u16(&self) -> Option<u16> {
        match self.data {
            [a, b] => Some(u16::from_be_bytes([*a, *b])),
            _ => None,
        }
    }

    pub fn u32(&self) -> Option<u32> {
        match self.data {
            [a, b, c, d] => Some(u32::from_be_bytes([*a, *b, *c, *d])),
            _ => None,
        }
    }
}

/// Iterator over options; stops at the first malformed option
pub struct OptionIter<'a> {
    data: &'a [u8],
    offset: usize,
    malformed: bool,
}

impl<'a> OptionIter<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            offset: 0,
            malformed: false,
        }
    }

    /// True once iteration stopped on a bad length rather than end of data
    pub fn is_malformed(&self) -> bool {
        self.malformed
    }
}

impl<'a> Iterator for OptionIter<'a> {
    type Item = ConfigOption<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.malformed || self.offset >= self.data.len() {
            return None;
        }
        if self.offset + OPTION_HEADER_SIZE > self.data.len() {
            self.malformed = true;
            return None;
        }

        let opt_type = self.data[self.offset];
        let opt_len = self.data[self.offset + 1] as usize;
        if opt_len < OPTION_HEADER_SIZE || self.offset + opt_len > self.data.len() {
            self.malformed = true;
            return None;
        }

        let start = self.offset + OPTION_HEADER_SIZE;
        let end = self.offset + opt_len;
        self.offset = end;

        Some(ConfigOption {
            opt_type,
            data: &self.data[start..end],
        })
    }
}

/// Decode an option list, failing on trailing garbage or bad lengths
pub fn parse_options(data: &[u8]) -> Result<Vec<ConfigOption<'_>>> {
    let mut iter = OptionIter::new(data);
    let options: Vec<_> = iter.by_ref().collect();
    if iter.is_malformed() {
        return Err(Error::Parse("malformed option list".into()));
    }
    Ok(options)
}

/// Append one option to an option list
pub fn encode_option(out: &mut Vec<u8>, opt_type: u8, value: &[u8]) {
    out.push(opt_type);
    out.push((OPTION_HEADER_SIZE + value.len()) as u8);
    out.extend_from_slice(value);
}

/// Builder for control packets
#[derive(Debug, Default)]
pub struct ControlBuilder {
    code: u8,
    identifier: u8,
    data: Vec<u8>,
}

impl ControlBuilder {
    pub fn new(code: u8, identifier: u8) -> Self {
        Self {
            code,
            identifier,
            data: Vec::new(),
        }
    }

    pub fn configure_request(identifier: u8) -> Self {
        Self::new(codes::CONFIGURE_REQUEST, identifier)
    }

    pub fn configure_ack(identifier: u8) -> Self {
        Self::new(codes::CONFIGURE_ACK, identifier)
    }

    pub fn configure_nak(identifier: u8) -> Self {
        Self::new(codes::CONFIGURE_NAK, identifier)
    }

    pub fn configure_reject(identifier: u8) -> Self {
        Self::new(codes::CONFIGURE_REJECT, identifier)
    }

    pub fn terminate_request(identifier: u8) -> Self {
        Self::new(codes::TERMINATE_REQUEST, identifier)
    }

    pub fn terminate_ack(identifier: u8) -> Self {
        Self::new(codes::TERMINATE_ACK, identifier)
    }

    /// Code-Reject carrying as much of the offending packet as fits `mru`
    pub fn code_reject(identifier: u8, rejected: &[u8], mru: u16) -> Self {
        let room = (mru as usize).saturating_sub(CONTROL_HEADER_SIZE);
        let take = rejected.len().min(room);
        Self::new(codes::CODE_REJECT, identifier).raw_data(&rejected[..take])
    }

    pub fn add_option(mut self, opt_type: u8, value: &[u8]) -> Self {
        encode_option(&mut self.data, opt_type, value);
        self
    }

    pub fn raw_data(mut self, data: &[u8]) -> Self {
        self.data = data.to_vec();
        self
    }

    pub fn build(self) -> Vec<u8> {
        let length = (CONTROL_HEADER_SIZE + self.data.len()) as u16;
        let mut packet = Vec::with_capacity(length as usize);
        packet.push(self.code);
        packet.push(self.identifier);
        packet.extend_from_slice(&length.to_be_bytes());
        packet.extend_from_slice(&self.data);
        packet
    }
}
