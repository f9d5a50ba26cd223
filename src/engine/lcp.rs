//! LCP option policy - RFC 1661 section 6
//!
//! Negotiates MRU, ACCM, authentication protocol, magic number, PFC and
//! ACFC, and answers the LCP-only codes (Echo, Discard, Protocol-Reject).

use super::fsm::{Fsm, FsmState};
use super::negotiate::{
    option_bit, Extended, Negotiation, Negotiator, OptionPolicy, OptionSide, OptionValues,
    Verdict,
};
use crate::protocol::control::encode_option;
use crate::protocol::lcp::{
    self, auth, codes, options, DEFAULT_ACCM, DEFAULT_MRU, MAX_MRU, MIN_MRU,
};
use crate::protocol::ppp::protocols;
use crate::protocol::{ConfigOption, ControlPacket};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, warn};

/// Negotiate bits for LCP options
pub mod bits {
    use super::{option_bit, options};

    pub const MRU: u16 = option_bit(options::MRU);
    pub const ACCM: u16 = option_bit(options::ACCM);
    pub const AUTH: u16 = option_bit(options::AUTH_PROTOCOL);
    pub const MAGIC: u16 = option_bit(options::MAGIC_NUMBER);
    pub const PFC: u16 = option_bit(options::PFC);
    pub const ACFC: u16 = option_bit(options::ACFC);

    /// Every option LCP knows how to negotiate
    pub const ALL: u16 = MRU | ACCM | AUTH | MAGIC | PFC | ACFC;
}

/// LCP option values for one side of the link
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LcpValues {
    pub negotiate: u16,
    pub mru: u16,
    pub accm: u32,
    /// Authentication protocol number, 0 for none
    pub authentication: u16,
    pub magic_number: u32,
    pub pfc: bool,
    pub acfc: bool,
}

impl Default for LcpValues {
    fn default() -> Self {
        Self {
            negotiate: 0,
            mru: DEFAULT_MRU,
            accm: DEFAULT_ACCM,
            authentication: 0,
            magic_number: 0,
            pfc: false,
            acfc: false,
        }
    }
}

impl LcpValues {
    pub fn is_negotiated(&self, bit: u16) -> bool {
        self.negotiate & bit != 0
    }
}

impl OptionValues for LcpValues {
    fn negotiate(&self) -> u16 {
        self.negotiate
    }

    fn set_negotiate(&mut self, mask: u16) {
        self.negotiate = mask;
    }
}

/// LCP-specific negotiation rules
#[derive(Debug)]
pub struct LcpPolicy {
    rng: StdRng,
    loopbacks: u64,
}

impl LcpPolicy {
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
            loopbacks: 0,
        }
    }

    /// Deterministic magic numbers, for tests and simulations
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            loopbacks: 0,
        }
    }

    /// Looped-back links detected so far
    pub fn loopbacks(&self) -> u64 {
        self.loopbacks
    }

    /// Nonzero random magic number different from `avoid`
    fn next_magic(&mut self, avoid: u32) -> u32 {
        loop {
            let magic: u32 = self.rng.gen();
            if magic != 0 && magic != avoid {
                return magic;
            }
        }
    }
}

impl Default for LcpPolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl OptionPolicy for LcpPolicy {
    type Values = LcpValues;

    const PROTOCOL: u16 = protocols::LCP;
    const NAME: &'static str = "LCP";
    const OPTIONS: &'static [u8] = &[
        options::MRU,
        options::ACCM,
        options::AUTH_PROTOCOL,
        options::MAGIC_NUMBER,
        options::PFC,
        options::ACFC,
    ];

    fn option_name(opt_type: u8) -> &'static str {
        lcp::option_name(opt_type)
    }

    fn encode(&self, opt_type: u8, values: &LcpValues, out: &mut Vec<u8>) {
        match opt_type {
            options::MRU => encode_option(out, opt_type, &values.mru.to_be_bytes()),
            options::ACCM => encode_option(out, opt_type, &values.accm.to_be_bytes()),
            options::AUTH_PROTOCOL => {
                encode_option(out, opt_type, &values.authentication.to_be_bytes())
            }
            options::MAGIC_NUMBER => {
                encode_option(out, opt_type, &values.magic_number.to_be_bytes())
            }
            options::PFC | options::ACFC => encode_option(out, opt_type, &[]),
            _ => {}
        }
    }

    fn decode(&self, opt: &ConfigOption<'_>, values: &mut LcpValues) -> bool {
        match opt.opt_type {
            options::MRU => opt.u16().map(|mru| values.mru = mru).is_some(),
            options::ACCM => opt.u32().map(|accm| values.accm = accm).is_some(),
            // Protocol-specific data may follow the protocol number
            options::AUTH_PROTOCOL => match opt.data {
                [hi, lo, ..] => {
                    values.authentication = u16::from_be_bytes([*hi, *lo]);
                    true
                }
                _ => false,
            },
            options::MAGIC_NUMBER => opt.u32().map(|magic| values.magic_number = magic).is_some(),
            options::PFC => {
                values.pfc = opt.data.is_empty();
                values.pfc
            }
            options::ACFC => {
                values.acfc = opt.data.is_empty();
                values.acfc
            }
            _ => false,
        }
    }

    fn is_requestable(&self, opt_type: u8, values: &LcpValues) -> bool {
        match opt_type {
            options::AUTH_PROTOCOL => values.authentication != 0,
            options::MAGIC_NUMBER => values.magic_number != 0,
            _ => true,
        }
    }

    fn prepare(&mut self, local: &mut LcpValues) {
        if local.is_negotiated(bits::MAGIC) && local.magic_number == 0 {
            local.magic_number = self.next_magic(0);
        }
    }

    fn check_request(
        &mut self,
        opt_type: u8,
        proposed: &mut LcpValues,
        local: &mut OptionSide<LcpValues>,
        remote: &OptionSide<LcpValues>,
    ) -> Verdict {
        match opt_type {
            options::MRU if proposed.mru < MIN_MRU => {
                proposed.mru = remote.desired.mru.max(MIN_MRU);
                Verdict::Nak
            }
            options::AUTH_PROTOCOL if proposed.authentication != auth::PAP => {
                proposed.authentication = auth::PAP;
                Verdict::Nak
            }
            options::MAGIC_NUMBER if proposed.magic_number == 0 => {
                proposed.magic_number = self.next_magic(local.desired.magic_number);
                Verdict::Nak
            }
            options::MAGIC_NUMBER
                if local.desired.is_negotiated(bits::MAGIC)
                    && proposed.magic_number == local.desired.magic_number =>
            {
                self.loopbacks += 1;
                warn!(
                    "LCP: peer echoed our magic number {:#010x}, link looped back",
                    proposed.magic_number
                );
                local.desired.magic_number = self.next_magic(local.desired.magic_number);
                proposed.magic_number = self.next_magic(local.desired.magic_number);
                Verdict::Nak
            }
            _ => Verdict::Accept,
        }
    }

    fn apply_nak(&mut self, opt_type: u8, suggested: &LcpValues, desired: &mut LcpValues) -> bool {
        match opt_type {
            options::MRU if (MIN_MRU..=MAX_MRU).contains(&suggested.mru) => {
                desired.mru = suggested.mru;
                true
            }
            options::ACCM => {
                // Characters the peer needs escaped are added, never removed
                desired.accm |= suggested.accm;
                true
            }
            options::AUTH_PROTOCOL if suggested.authentication == auth::PAP => {
                desired.authentication = auth::PAP;
                true
            }
            options::MAGIC_NUMBER => {
                desired.magic_number = self.next_magic(desired.magic_number);
                true
            }
            options::PFC | options::ACFC => true,
            _ => false,
        }
    }

    fn is_mandatory(&self, opt_type: u8, desired: &LcpValues) -> bool {
        opt_type == options::AUTH_PROTOCOL && desired.authentication != 0
    }

    fn handle_extended(
        &mut self,
        packet: &ControlPacket<'_>,
        opened: bool,
        local: &OptionSide<LcpValues>,
        _remote: &OptionSide<LcpValues>,
    ) -> Extended {
        match packet.code() {
            codes::ECHO_REQUEST => {
                if !opened {
                    debug!("LCP: dropping Echo-Request, not opened");
                    return Extended::Consumed;
                }
                let magic = if local.in_effect.is_negotiated(bits::MAGIC) {
                    local.in_effect.magic_number
                } else {
                    0
                };
                if let [a, b, c, d, ..] = packet.data() {
                    let theirs = u32::from_be_bytes([*a, *b, *c, *d]);
                    if magic != 0 && theirs == magic {
                        self.loopbacks += 1;
                        warn!("LCP: Echo-Request carries our magic number, link looped back");
                    }
                }
                Extended::Reply(lcp::echo_reply(packet.identifier(), magic, packet.data()))
            }
            codes::ECHO_REPLY | codes::DISCARD_REQUEST => Extended::Consumed,
            codes::PROTOCOL_REJECT => match packet.data() {
                [hi, lo, ..] => Extended::ProtocolRejected(u16::from_be_bytes([*hi, *lo])),
                _ => Extended::Consumed,
            },
            _ => Extended::Unknown,
        }
    }

    fn peer_mru(&self, remote: &OptionSide<LcpValues>) -> u16 {
        if remote.in_effect.is_negotiated(bits::MRU) {
            remote.in_effect.mru
        } else {
            DEFAULT_MRU
        }
    }
}

/// LCP negotiation state
pub type Lcp = Negotiation<LcpPolicy>;

/// LCP state machine
pub type LcpFsm = Fsm<Lcp>;

/// Build an LCP negotiation from desired values and permitted masks
pub fn new_lcp(
    policy: LcpPolicy,
    local: LcpValues,
    local_permit: u16,
    remote: LcpValues,
    remote_permit: u16,
) -> Lcp {
    Negotiation::new(
        policy,
        OptionSide::new(local, local_permit),
        OptionSide::new(remote, remote_permit),
    )
}

impl Fsm<Lcp> {
    /// Protocol-Reject for a packet of an unsupported protocol; only sent
    /// while LCP is opened
    pub fn protocol_reject(&mut self, protocol: u16, payload: &[u8]) -> Option<Vec<u8>> {
        if self.state() != FsmState::Opened {
            return None;
        }
        let mru = self.negotiator().peer_mru();
        let id = self.next_identifier();
        Some(lcp::protocol_reject(id, protocol, payload, mru))
    }
}
