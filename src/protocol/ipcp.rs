//! IPCP wire constants - RFC 1332
//!
//! IPCP shares the LCP packet format and codes 1-7.

/// IPCP option types
pub mod options {
    /// IP-Addresses (deprecated, RFC 1172; always rejected)
    pub const IP_ADDRESSES: u8 = 1;
    /// IP-Compression-Protocol
    pub const IP_COMPRESSION: u8 = 2;
    /// IP-Address
    pub const IP_ADDRESS: u8 = 3;
}

/// Van Jacobson TCP/IP header compression (carried in IP-Compression-Protocol)
pub const VJ_COMPRESSION: u16 = 0x002d;

/// Slot range supported by the external VJ codec
pub const MIN_SLOTS: u16 = 1;
pub const MAX_SLOTS: u16 = 16;
pub const DEFAULT_SLOTS: u16 = 16;

/// Name of an IPCP option type, for logs and status output
pub fn option_name(opt_type: u8) -> &'static str {
    match opt_type {
        options::IP_ADDRESSES => "IP-Addresses",
        options::IP_COMPRESSION => "IP-Compression",
        options::IP_ADDRESS => "IP-Address",
        _ => "unknown",
    }
}

/// Encode the VJ compression option value
///
/// The wire carries Max-Slot-Id, one less than the slot count.
pub fn encode_vj(slots: u16, slot_compress: bool) -> [u8; 4] {
    let [hi, lo] = VJ_COMPRESSION.to_be_bytes();
    let max_slot_id = slots.saturating_sub(1).min(u8::MAX as u16) as u8;
    [hi, lo, max_slot_id, slot_compress as u8]
}

/// Decoded IP-Compression-Protocol value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompressionValue {
    pub protocol: u16,
    /// Slot count (Max-Slot-Id + 1); zero when the protocol is not VJ
    pub slots: u16,
    /// Raw Comp-Slot-Id octet
    pub slot_compress: u8,
}

/// Decode an IP-Compression-Protocol value; `None` if too short
pub fn decode_compression(data: &[u8]) -> Option<CompressionValue> {
    if data.len() < 2 {
        return None;
    }
    let protocol = u16::from_be_bytes([data[0], data[1]]);
    if protocol != VJ_COMPRESSION {
        return Some(CompressionValue {
            protocol,
            slots: 0,
            slot_compress: 0,
        });
    }
    match data {
        [_, _, max_slot_id, comp_slot_id] => Some(CompressionValue {
            protocol,
            slots: *max_slot_id as u16 + 1,
            slot_compress: *comp_slot_id,
        }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vj_wire_uses_max_slot_id() {
        assert_eq!(encode_vj(16, true), [0x00, 0x2d, 0x0f, 0x01]);
    }

    #[test]
    fn test_decode_vj() {
        let value = decode_compression(&[0x00, 0x2d, 0x07, 0x00]).unwrap();
        assert_eq!(value.protocol, VJ_COMPRESSION);
        assert_eq!(value.slots, 8);
        assert_eq!(value.slot_compress, 0);
    }

    #[test]
    fn test_decode_vj_wrong_length() {
        assert_eq!(decode_compression(&[0x00, 0x2d, 0x07]), None);
        assert_eq!(decode_compression(&[0x00]), None);
    }

    #[test]
    fn test_decode_foreign_protocol() {
        let value = decode_compression(&[0x00, 0x61, 0x01]).unwrap();
        assert_eq!(value.protocol, 0x0061);
        assert_eq!(value.slots, 0);
    }
}
