//! Option negotiation shared by LCP and IPCP
//!
//! [`Negotiation`] runs the Configure-Request/Ack/Nak/Reject algorithm over a
//! pair of [`OptionSide`]s. What differs per protocol (which options exist,
//! how they are encoded, which values are acceptable) is supplied by an
//! [`OptionPolicy`].

use crate::protocol::control::codes;
use crate::protocol::lcp::DEFAULT_MRU;
use crate::protocol::{ConfigOption, ControlPacket};
use std::fmt::Debug;
use tracing::{debug, warn};

/// Negotiate bit for an option type
///
/// Option types at or above 16 never get a bit, so they can never be
/// permitted.
pub const fn option_bit(opt_type: u8) -> u16 {
    if opt_type < 16 {
        1 << opt_type
    } else {
        0
    }
}

/// A protocol's full set of option values plus the bitmask of which ones
/// are being negotiated
pub trait OptionValues: Clone + Debug + Default + PartialEq {
    fn negotiate(&self) -> u16;
    fn set_negotiate(&mut self, mask: u16);
}

/// One direction of a negotiation
#[derive(Debug, Clone, PartialEq)]
pub struct OptionSide<V> {
    /// Target configuration for the current connection
    pub desired: V,
    /// Values agreed in the last successful exchange
    pub in_effect: V,
    /// Options this side may negotiate at all
    pub permitted: u16,
}

impl<V: OptionValues> OptionSide<V> {
    pub fn new(desired: V, permitted: u16) -> Self {
        Self {
            desired,
            in_effect: V::default(),
            permitted,
        }
    }
}

/// Outcome for a single option in a peer's Configure-Request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Accept,
    /// Counter-proposal was written into the proposed values
    Nak,
    Reject,
}

/// Reply to a peer's Configure-Request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// Configure-Ack, Configure-Nak or Configure-Reject
    pub code: u8,
    /// Option list to send back
    pub data: Vec<u8>,
}

impl Reply {
    pub fn is_ack(&self) -> bool {
        self.code == codes::CONFIGURE_ACK
    }
}

/// The peer refused, or countered unacceptably, an option we cannot do
/// without
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NegotiationFailure {
    pub opt_type: u8,
    pub option: &'static str,
}

/// Outcome of a protocol-specific packet outside Configure/Terminate
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extended {
    /// Send this packet back
    Reply(Vec<u8>),
    /// Handled, nothing to send
    Consumed,
    /// Peer does not speak the given protocol number
    ProtocolRejected(u16),
    /// Code is not known to this protocol (answered with Code-Reject)
    Unknown,
}

/// Per-protocol knowledge plugged into [`Negotiation`]
pub trait OptionPolicy: Debug {
    type Values: OptionValues;

    const PROTOCOL: u16;
    const NAME: &'static str;
    /// Known option types, in Configure-Request emission order
    const OPTIONS: &'static [u8];

    fn option_name(opt_type: u8) -> &'static str;

    /// Append option `opt_type`, header included, carrying `values`
    fn encode(&self, opt_type: u8, values: &Self::Values, out: &mut Vec<u8>);

    /// Decode `opt` into `values`; false if the value is malformed
    fn decode(&self, opt: &ConfigOption<'_>, values: &mut Self::Values) -> bool;

    /// Whether `values` can be put in a Configure-Request at all
    fn is_requestable(&self, _opt_type: u8, _values: &Self::Values) -> bool {
        true
    }

    /// Called once with the configured local values before first use
    fn prepare(&mut self, _local: &mut Self::Values) {}

    /// Judge one option of the peer's request. On [`Verdict::Nak`] the
    /// counter-proposal must have been written into `proposed`.
    fn check_request(
        &mut self,
        opt_type: u8,
        proposed: &mut Self::Values,
        local: &mut OptionSide<Self::Values>,
        remote: &OptionSide<Self::Values>,
    ) -> Verdict;

    /// Try to adopt a value the peer suggested in a Configure-Nak.
    /// Returns false when the suggestion is outside local policy.
    fn apply_nak(
        &mut self,
        opt_type: u8,
        suggested: &Self::Values,
        desired: &mut Self::Values,
    ) -> bool;

    /// Whether losing this option closes the protocol
    fn is_mandatory(&self, _opt_type: u8, _desired: &Self::Values) -> bool {
        false
    }

    fn handle_extended(
        &mut self,
        _packet: &ControlPacket<'_>,
        _opened: bool,
        _local: &OptionSide<Self::Values>,
        _remote: &OptionSide<Self::Values>,
    ) -> Extended {
        Extended::Unknown
    }

    fn peer_mru(&self, _remote: &OptionSide<Self::Values>) -> u16 {
        DEFAULT_MRU
    }
}

/// What the FSM core needs from a protocol
pub trait Negotiator: Debug {
    const PROTOCOL: u16;
    const NAME: &'static str;

    /// Start of a new connection: restore configured values
    fn reset(&mut self);

    /// Start of any negotiation round, fresh or renegotiated: apply staged
    /// administrative changes
    fn begin_round(&mut self);

    /// Option list for our next Configure-Request
    fn build_request(&mut self) -> Vec<u8>;

    /// Judge the peer's Configure-Request
    fn handle_request(&mut self, options: &[ConfigOption<'_>]) -> Reply;

    /// Our request (echoed in `options`) was acknowledged
    fn handle_ack(&mut self, options: &[ConfigOption<'_>]);

    /// Revise our request after a Configure-Nak or Configure-Reject
    fn handle_nak_or_reject(
        &mut self,
        code: u8,
        options: &[ConfigOption<'_>],
    ) -> Result<(), NegotiationFailure>;

    fn handle_extended(&mut self, packet: &ControlPacket<'_>, opened: bool) -> Extended;

    /// Largest packet the peer accepts, for sizing rejects
    fn peer_mru(&self) -> u16;
}

/// Option negotiation state for one protocol instance
#[derive(Debug)]
pub struct Negotiation<P: OptionPolicy> {
    policy: P,
    configured: (P::Values, P::Values),
    desired_changed: bool,
    staged_permitted: Option<(u16, u16)>,
    local: OptionSide<P::Values>,
    remote: OptionSide<P::Values>,
}

impl<P: OptionPolicy> Negotiation<P> {
    pub fn new(
        mut policy: P,
        mut local: OptionSide<P::Values>,
        remote: OptionSide<P::Values>,
    ) -> Self {
        policy.prepare(&mut local.desired);
        Self {
            policy,
            configured: (local.desired.clone(), remote.desired.clone()),
            desired_changed: false,
            staged_permitted: None,
            local,
            remote,
        }
    }

    pub fn policy(&self) -> &P {
        &self.policy
    }

    pub fn local(&self) -> &OptionSide<P::Values> {
        &self.local
    }

    pub fn remote(&self) -> &OptionSide<P::Values> {
        &self.remote
    }

    /// Replace the desired values; applied from the next round on
    pub fn set_desired(&mut self, mut local: P::Values, remote: P::Values) {
        self.policy.prepare(&mut local);
        self.configured = (local, remote);
        self.desired_changed = true;
    }

    /// Replace the permitted masks; applied from the next round on
    pub fn set_permitted(&mut self, local: u16, remote: u16) {
        self.staged_permitted = Some((local, remote));
    }

    /// Whether administrative changes are waiting for the next round
    pub fn has_staged_changes(&self) -> bool {
        self.desired_changed || self.staged_permitted.is_some()
    }

    fn is_known(opt_type: u8) -> bool {
        P::OPTIONS.contains(&opt_type)
    }
}

impl<P: OptionPolicy> Negotiator for Negotiation<P> {
    const PROTOCOL: u16 = P::PROTOCOL;
    const NAME: &'static str = P::NAME;

    fn reset(&mut self) {
        self.local.desired = self.configured.0.clone();
        self.local.in_effect = P::Values::default();
        self.remote.desired = self.configured.1.clone();
        self.remote.in_effect = P::Values::default();
        self.desired_changed = false;
    }

    fn begin_round(&mut self) {
        if std::mem::take(&mut self.desired_changed) {
            self.local.desired = self.configured.0.clone();
            self.remote.desired = self.configured.1.clone();
        }
        if let Some((local, remote)) = self.staged_permitted.take() {
            debug!(
                "{}: permitted now local {:#06x} remote {:#06x}",
                P::NAME,
                local,
                remote
            );
            self.local.permitted = local;
            self.remote.permitted = remote;
        }
        // in_effect never holds an option that is no longer permitted
        for side in [&mut self.local, &mut self.remote] {
            let mask = side.in_effect.negotiate() & side.permitted;
            side.in_effect.set_negotiate(mask);
        }
    }

    fn build_request(&mut self) -> Vec<u8> {
        let mask = self.local.desired.negotiate() & self.local.permitted;
        let mut out = Vec::new();
        for &opt_type in P::OPTIONS {
            if mask & option_bit(opt_type) == 0 {
                continue;
            }
            if !self.policy.is_requestable(opt_type, &self.local.desired) {
                debug!("{}: not requesting {}", P::NAME, P::option_name(opt_type));
                continue;
            }
            self.policy.encode(opt_type, &self.local.desired, &mut out);
        }
        out
    }

    fn handle_request(&mut self, options: &[ConfigOption<'_>]) -> Reply {
        let mut proposed = P::Values::default();
        let mut rejected = Vec::new();
        let mut naked = Vec::new();

        for opt in options {
            let bit = option_bit(opt.opt_type);

            if !Self::is_known(opt.opt_type) {
                debug!("{}: rejecting unknown option {}", P::NAME, opt.opt_type);
                opt.encode_into(&mut rejected);
                continue;
            }
            if self.remote.permitted & bit == 0 {
                debug!(
                    "{}: rejecting {} (not permitted)",
                    P::NAME,
                    P::option_name(opt.opt_type)
                );
                opt.encode_into(&mut rejected);
                continue;
            }
            if !self.policy.decode(opt, &mut proposed) {
                debug!(
                    "{}: rejecting malformed {}",
                    P::NAME,
                    P::option_name(opt.opt_type)
                );
                opt.encode_into(&mut rejected);
                continue;
            }
            proposed.set_negotiate(proposed.negotiate() | bit);

            match self
                .policy
                .check_request(opt.opt_type, &mut proposed, &mut self.local, &self.remote)
            {
                Verdict::Accept => {}
                Verdict::Nak => {
                    debug!("{}: naking {}", P::NAME, P::option_name(opt.opt_type));
                    self.policy.encode(opt.opt_type, &proposed, &mut naked);
                }
                Verdict::Reject => {
                    debug!("{}: rejecting {}", P::NAME, P::option_name(opt.opt_type));
                    opt.encode_into(&mut rejected);
                }
            }
        }

        if !rejected.is_empty() {
            return Reply {
                code: codes::CONFIGURE_REJECT,
                data: rejected,
            };
        }
        if !naked.is_empty() {
            return Reply {
                code: codes::CONFIGURE_NAK,
                data: naked,
            };
        }

        self.remote.in_effect = proposed;
        let mut echo = Vec::new();
        for opt in options {
            opt.encode_into(&mut echo);
        }
        Reply {
            code: codes::CONFIGURE_ACK,
            data: echo,
        }
    }

    fn handle_ack(&mut self, options: &[ConfigOption<'_>]) {
        let mut agreed = P::Values::default();
        for opt in options {
            let bit = option_bit(opt.opt_type);
            if self.local.permitted & bit != 0 && self.policy.decode(opt, &mut agreed) {
                agreed.set_negotiate(agreed.negotiate() | bit);
            }
        }
        self.local.in_effect = agreed;
    }

    fn handle_nak_or_reject(
        &mut self,
        code: u8,
        options: &[ConfigOption<'_>],
    ) -> Result<(), NegotiationFailure> {
        for opt in options {
            let bit = option_bit(opt.opt_type);
            let requested = self.local.desired.negotiate() & self.local.permitted & bit != 0;
            if !Self::is_known(opt.opt_type) || !requested {
                debug!(
                    "{}: ignoring {} for option {} we did not request",
                    P::NAME,
                    if code == codes::CONFIGURE_NAK { "nak" } else { "reject" },
                    opt.opt_type
                );
                continue;
            }

            let adopted = if code == codes::CONFIGURE_NAK {
                let mut suggested = self.local.desired.clone();
                self.policy.decode(opt, &mut suggested)
                    && self
                        .policy
                        .apply_nak(opt.opt_type, &suggested, &mut self.local.desired)
            } else {
                false
            };
            if adopted {
                continue;
            }

            if self.policy.is_mandatory(opt.opt_type, &self.local.desired) {
                warn!(
                    "{}: peer refused mandatory option {}",
                    P::NAME,
                    P::option_name(opt.opt_type)
                );
                return Err(NegotiationFailure {
                    opt_type: opt.opt_type,
                    option: P::option_name(opt.opt_type),
                });
            }

            debug!(
                "{}: dropping {} for this connection",
                P::NAME,
                P::option_name(opt.opt_type)
            );
            let negotiate = self.local.desired.negotiate() & !bit;
            self.local.desired.set_negotiate(negotiate);
        }
        Ok(())
    }

    fn handle_extended(&mut self, packet: &ControlPacket<'_>, opened: bool) -> Extended {
        self.policy
            .handle_extended(packet, opened, &self.local, &self.remote)
    }

    fn peer_mru(&self) -> u16 {
        self.policy.peer_mru(&self.remote)
    }
}
