//! IPCP option policy - RFC 1332
//!
//! Negotiates the IPv4 address of each end and Van Jacobson header
//! compression. Once IPCP is opened, [`Ipcp::network_params`] tells the
//! outside world what was agreed.

use super::fsm::Fsm;
use super::negotiate::{
    option_bit, Negotiation, OptionPolicy, OptionSide, OptionValues, Verdict,
};
use crate::protocol::control::encode_option;
use crate::protocol::ipcp::{
    self, decode_compression, encode_vj, options, MAX_SLOTS, MIN_SLOTS, VJ_COMPRESSION,
};
use crate::protocol::ppp::protocols;
use crate::protocol::ConfigOption;
use std::net::Ipv4Addr;

/// Negotiate bits for IPCP options
pub mod bits {
    use super::{option_bit, options};

    pub const COMPRESSION: u16 = option_bit(options::IP_COMPRESSION);
    pub const ADDRESS: u16 = option_bit(options::IP_ADDRESS);

    pub const ALL: u16 = COMPRESSION | ADDRESS;
}

/// IPCP option values for one side of the link
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IpcpValues {
    pub negotiate: u16,
    /// 0.0.0.0 asks the peer to assign one
    pub address: Ipv4Addr,
    /// Compression protocol number, 0 for none
    pub compression: u16,
    pub slots: u16,
    pub slot_compress: bool,
}

impl Default for IpcpValues {
    fn default() -> Self {
        Self {
            negotiate: 0,
            address: Ipv4Addr::UNSPECIFIED,
            compression: 0,
            slots: 0,
            slot_compress: false,
        }
    }
}

impl IpcpValues {
    pub fn is_negotiated(&self, bit: u16) -> bool {
        self.negotiate & bit != 0
    }

    /// VJ settings when compression is negotiated
    pub fn vj(&self) -> Option<VjParams> {
        if self.is_negotiated(bits::COMPRESSION) && self.compression == VJ_COMPRESSION {
            Some(VjParams {
                slots: self.slots,
                slot_compress: self.slot_compress,
            })
        } else {
            None
        }
    }
}

impl OptionValues for IpcpValues {
    fn negotiate(&self) -> u16 {
        self.negotiate
    }

    fn set_negotiate(&mut self, mask: u16) {
        self.negotiate = mask;
    }
}

/// Parameters for the external VJ codec
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VjParams {
    pub slots: u16,
    pub slot_compress: bool,
}

/// What IPCP agreed, handed over when the network layer comes up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkParams {
    pub local: Ipv4Addr,
    pub peer: Ipv4Addr,
    /// Compression the peer applies to packets it sends us
    pub rx_compression: Option<VjParams>,
    /// Compression we apply to packets we send
    pub tx_compression: Option<VjParams>,
}

/// IPCP-specific negotiation rules
#[derive(Debug, Default)]
pub struct IpcpPolicy;

impl OptionPolicy for IpcpPolicy {
    type Values = IpcpValues;

    const PROTOCOL: u16 = protocols::IPCP;
    const NAME: &'static str = "IPCP";
    const OPTIONS: &'static [u8] = &[options::IP_COMPRESSION, options::IP_ADDRESS];

    fn option_name(opt_type: u8) -> &'static str {
        ipcp::option_name(opt_type)
    }

    fn encode(&self, opt_type: u8, values: &IpcpValues, out: &mut Vec<u8>) {
        match opt_type {
            options::IP_ADDRESS => encode_option(out, opt_type, &values.address.octets()),
            options::IP_COMPRESSION if values.compression == VJ_COMPRESSION => {
                encode_option(out, opt_type, &encode_vj(values.slots, values.slot_compress))
            }
            options::IP_COMPRESSION => {
                encode_option(out, opt_type, &values.compression.to_be_bytes())
            }
            _ => {}
        }
    }

    fn decode(&self, opt: &ConfigOption<'_>, values: &mut IpcpValues) -> bool {
        match opt.opt_type {
            options::IP_ADDRESS => match opt.u32() {
                Some(raw) => {
                    values.address = Ipv4Addr::from(raw);
                    true
                }
                None => false,
            },
            options::IP_COMPRESSION => match decode_compression(opt.data) {
                Some(value) => {
                    values.compression = value.protocol;
                    values.slots = value.slots;
                    values.slot_compress = value.slot_compress != 0;
                    true
                }
                None => false,
            },
            _ => false,
        }
    }

    fn is_requestable(&self, opt_type: u8, values: &IpcpValues) -> bool {
        match opt_type {
            options::IP_COMPRESSION => {
                values.compression == VJ_COMPRESSION && values.slots >= MIN_SLOTS
            }
            _ => true,
        }
    }

    fn check_request(
        &mut self,
        opt_type: u8,
        proposed: &mut IpcpValues,
        local: &mut OptionSide<IpcpValues>,
        remote: &OptionSide<IpcpValues>,
    ) -> Verdict {
        match opt_type {
            options::IP_ADDRESS => {
                let assigned = remote.desired.address;
                let ours = local.desired.address;
                let wrong = proposed.address.is_unspecified()
                    || (!ours.is_unspecified() && proposed.address == ours)
                    || (!assigned.is_unspecified() && proposed.address != assigned);
                if !wrong {
                    Verdict::Accept
                } else if assigned.is_unspecified() {
                    Verdict::Reject
                } else {
                    proposed.address = assigned;
                    Verdict::Nak
                }
            }
            options::IP_COMPRESSION => {
                if proposed.compression != VJ_COMPRESSION {
                    proposed.compression = VJ_COMPRESSION;
                    proposed.slots = remote.desired.slots.clamp(MIN_SLOTS, MAX_SLOTS);
                    proposed.slot_compress = remote.desired.slot_compress;
                    Verdict::Nak
                } else if proposed.slots > MAX_SLOTS {
                    // The wire carries the highest slot id, so a decoded
                    // count is never below one
                    proposed.slots = MAX_SLOTS;
                    Verdict::Nak
                } else {
                    Verdict::Accept
                }
            }
            _ => Verdict::Accept,
        }
    }

    fn apply_nak(
        &mut self,
        opt_type: u8,
        suggested: &IpcpValues,
        desired: &mut IpcpValues,
    ) -> bool {
        match opt_type {
            options::IP_ADDRESS if !suggested.address.is_unspecified() => {
                desired.address = suggested.address;
                true
            }
            options::IP_COMPRESSION
                if suggested.compression == VJ_COMPRESSION
                    && (MIN_SLOTS..=MAX_SLOTS).contains(&suggested.slots) =>
            {
                desired.compression = VJ_COMPRESSION;
                desired.slots = suggested.slots;
                desired.slot_compress = suggested.slot_compress;
                true
            }
            _ => false,
        }
    }

    fn is_mandatory(&self, opt_type: u8, desired: &IpcpValues) -> bool {
        // Without a configured address we cannot run IP at all
        opt_type == options::IP_ADDRESS && desired.address.is_unspecified()
    }
}

/// IPCP negotiation state
pub type Ipcp = Negotiation<IpcpPolicy>;

/// IPCP state machine
pub type IpcpFsm = Fsm<Ipcp>;

pub fn new_ipcp(
    local: IpcpValues,
    local_permit: u16,
    remote: IpcpValues,
    remote_permit: u16,
) -> Ipcp {
    Negotiation::new(
        IpcpPolicy,
        OptionSide::new(local, local_permit),
        OptionSide::new(remote, remote_permit),
    )
}

impl Ipcp {
    /// Addresses and compression agreed in the last exchange
    pub fn network_params(&self) -> NetworkParams {
        let local = if self.local().in_effect.is_negotiated(bits::ADDRESS) {
            self.local().in_effect.address
        } else {
            self.local().desired.address
        };
        let peer = if self.remote().in_effect.is_negotiated(bits::ADDRESS) {
            self.remote().in_effect.address
        } else {
            self.remote().desired.address
        };
        NetworkParams {
            local,
            peer,
            rx_compression: self.local().in_effect.vj(),
            tx_compression: self.remote().in_effect.vj(),
        }
    }
}
