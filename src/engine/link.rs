//! Link orchestrator
//!
//! Owns the LCP, PAP and IPCP machines of one link and sequences them:
//! LCP opened starts authentication, authentication success starts IPCP,
//! and LCP leaving Opened takes everything above it down. Packets come in
//! and go out as `(protocol, payload)` pairs; framing is someone else's job.

use super::fsm::{CloseReason, Fsm, FsmOutput, FsmState, Mode, RetryLimits};
use super::ipcp::{new_ipcp, IpcpFsm, NetworkParams};
use super::lcp::{self, new_lcp, LcpFsm, LcpPolicy};
use super::pap::{Pap, PapState};
use crate::config::Config;
use crate::protocol::ppp::{protocol_name, protocols};
use crate::telemetry::LinkStats;
use crate::Error;
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::fmt;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// The protocols a link runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProtocolKind {
    Lcp,
    Pap,
    Ipcp,
}

impl ProtocolKind {
    pub const ALL: [ProtocolKind; 3] =
        [ProtocolKind::Lcp, ProtocolKind::Pap, ProtocolKind::Ipcp];

    pub fn from_protocol(protocol: u16) -> Option<Self> {
        match protocol {
            protocols::LCP => Some(ProtocolKind::Lcp),
            protocols::PAP => Some(ProtocolKind::Pap),
            protocols::IPCP => Some(ProtocolKind::Ipcp),
            _ => None,
        }
    }

    pub fn protocol(self) -> u16 {
        match self {
            ProtocolKind::Lcp => protocols::LCP,
            ProtocolKind::Pap => protocols::PAP,
            ProtocolKind::Ipcp => protocols::IPCP,
        }
    }

    pub fn name(self) -> &'static str {
        protocol_name(self.protocol())
    }
}

/// RFC 1661 link phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Dead,
    Establish,
    Authenticate,
    Network,
    Terminate,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// What the link asks of the outside world
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkAction {
    /// Frame and transmit
    Send { protocol: u16, payload: Vec<u8> },
    /// IPCP opened: start passing IP with these parameters
    NetworkUp(NetworkParams),
    /// Stop passing IP
    NetworkDown,
}

/// One point-to-point link
#[derive(Debug)]
pub struct Link {
    name: String,
    phase: Phase,
    lcp: LcpFsm,
    pap: Pap,
    ipcp: IpcpFsm,
    stats: LinkStats,
    up_since: Option<DateTime<Utc>>,
    loopbacks_seen: u64,
}

impl Link {
    pub fn new(name: impl Into<String>, lcp: LcpFsm, pap: Pap, ipcp: IpcpFsm) -> Self {
        Self {
            name: name.into(),
            phase: Phase::Dead,
            lcp,
            pap,
            ipcp,
            stats: LinkStats::new(),
            up_since: None,
            loopbacks_seen: 0,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::with_policy(config, LcpPolicy::new())
    }

    /// Like [`Link::from_config`] with a caller-supplied magic number source
    pub fn with_policy(config: &Config, policy: LcpPolicy) -> Self {
        let name = config.link.name.clone();
        let lcp = Fsm::new(
            name.clone(),
            config.lcp.fsm.settings(),
            new_lcp(
                policy,
                config.lcp.local.values(),
                config.lcp.local.permitted(),
                config.lcp.remote.values(),
                config.lcp.remote.permitted(),
            ),
        );
        let pap = Pap::new(
            name.clone(),
            config.pap.settings(),
            config.pap.identity(),
            Box::new(config.pap.validator()),
        );
        let ipcp = Fsm::new(
            name.clone(),
            config.ipcp.fsm.settings(),
            new_ipcp(
                config.ipcp.local_values(),
                config.ipcp.permitted(),
                config.ipcp.remote_values(),
                config.ipcp.permitted(),
            ),
        );
        Self::new(name, lcp, pap, ipcp)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn lcp(&self) -> &LcpFsm {
        &self.lcp
    }

    pub fn lcp_mut(&mut self) -> &mut LcpFsm {
        &mut self.lcp
    }

    pub fn pap(&self) -> &Pap {
        &self.pap
    }

    pub fn ipcp(&self) -> &IpcpFsm {
        &self.ipcp
    }

    pub fn ipcp_mut(&mut self) -> &mut IpcpFsm {
        &mut self.ipcp
    }

    pub fn stats(&self) -> &LinkStats {
        &self.stats
    }

    /// When the network layer last came up, if it is up
    pub fn up_since(&self) -> Option<DateTime<Utc>> {
        self.up_since
    }

    pub fn is_network_up(&self) -> bool {
        self.ipcp.is_opened()
    }

    /// Why the link gave up, if it gave up rather than being closed
    pub fn failure(&self) -> Option<Error> {
        let failed = |protocol: &'static str, reason: CloseReason| match reason {
            CloseReason::Timeout | CloseReason::NegotiationFailed { .. } => {
                Some(Error::Negotiation {
                    protocol,
                    reason: reason.to_string(),
                })
            }
            _ => None,
        };
        if let Some(err) = self.lcp.close_reason().and_then(|r| failed("LCP", r)) {
            return Some(err);
        }
        if self.pap.state() == PapState::AuthenticateFailure {
            return Some(Error::Negotiation {
                protocol: "PAP",
                reason: self.pap.message().to_string(),
            });
        }
        self.ipcp.close_reason().and_then(|r| failed("IPCP", r))
    }

    /// Administrative open of the link
    pub fn open(&mut self) -> Vec<LinkAction> {
        let outputs = self.lcp.open();
        self.process(ProtocolKind::Lcp, outputs)
    }

    /// Administrative close; takes the network layer down first
    pub fn close(&mut self) -> Vec<LinkAction> {
        let outputs = self.lcp.close();
        let actions = self.process(ProtocolKind::Lcp, outputs);
        if self.lcp.state() == FsmState::Terminating {
            self.phase = Phase::Terminate;
        }
        actions
    }

    /// Carrier detected
    pub fn lower_up(&mut self) -> Vec<LinkAction> {
        if self.phase == Phase::Dead {
            self.phase = Phase::Establish;
        }
        let outputs = self.lcp.lower_up();
        self.process(ProtocolKind::Lcp, outputs)
    }

    /// Carrier lost
    pub fn lower_down(&mut self) -> Vec<LinkAction> {
        let outputs = self.lcp.lower_down();
        let actions = self.process(ProtocolKind::Lcp, outputs);
        self.phase = Phase::Dead;
        actions
    }

    /// Handle one deframed packet
    pub fn receive(&mut self, protocol: u16, payload: &[u8]) -> Vec<LinkAction> {
        let Some(kind) = ProtocolKind::from_protocol(protocol) else {
            return self.reject_protocol(protocol, payload);
        };
        self.stats.protocol(kind).record_rx(payload.len());

        let result = match kind {
            ProtocolKind::Lcp => self.lcp.receive(payload),
            // Late Authenticate-Requests still need an answer after the network phase began
            ProtocolKind::Pap if matches!(self.phase, Phase::Authenticate | Phase::Network) => {
                self.pap.receive(payload)
            }
            ProtocolKind::Ipcp if self.phase == Phase::Network => self.ipcp.receive(payload),
            _ => {
                debug!(
                    "{}: dropping {} packet in {} phase",
                    self.name,
                    kind.name(),
                    self.phase
                );
                self.stats.protocol(kind).record_drop();
                return Vec::new();
            }
        };

        let actions = match result {
            Ok(outputs) => self.process(kind, outputs),
            Err(e) => {
                debug!("{}: malformed {} packet: {}", self.name, kind.name(), e);
                self.stats.rx_malformed.inc();
                Vec::new()
            }
        };

        if kind == ProtocolKind::Lcp {
            let seen = self.lcp.negotiator().policy().loopbacks();
            if seen > self.loopbacks_seen {
                self.stats.loopbacks_detected.add(seen - self.loopbacks_seen);
                self.loopbacks_seen = seen;
            }
        }
        actions
    }

    /// Run any expired timers
    pub fn poll(&mut self, now: Instant) -> Vec<LinkAction> {
        let mut actions = Vec::new();
        let outputs = self.lcp.poll(now);
        actions.extend(self.process(ProtocolKind::Lcp, outputs));
        let outputs = self.pap.poll(now);
        actions.extend(self.process(ProtocolKind::Pap, outputs));
        let outputs = self.ipcp.poll(now);
        actions.extend(self.process(ProtocolKind::Ipcp, outputs));
        actions
    }

    /// Earliest pending timer deadline
    pub fn next_deadline(&self) -> Option<Instant> {
        [
            self.lcp.timer().deadline(),
            self.pap.timer().deadline(),
            self.ipcp.timer().deadline(),
        ]
        .into_iter()
        .flatten()
        .min()
    }

    /// Take desired values and permitted options from a new configuration.
    /// An opened protocol keeps what it negotiated until its next round.
    pub fn reconfigure(&mut self, config: &Config) {
        let lcp = self.lcp.negotiator_mut();
        lcp.set_desired(config.lcp.local.values(), config.lcp.remote.values());
        lcp.set_permitted(config.lcp.local.permitted(), config.lcp.remote.permitted());

        let ipcp = self.ipcp.negotiator_mut();
        ipcp.set_desired(config.ipcp.local_values(), config.ipcp.remote_values());
        ipcp.set_permitted(config.ipcp.permitted(), config.ipcp.permitted());
        info!("{}: options reconfigured for the next round", self.name);
    }

    /// Switch LCP or IPCP between active and passive
    pub fn set_mode(&mut self, kind: ProtocolKind, mode: Mode) -> Vec<LinkAction> {
        let outputs = match kind {
            ProtocolKind::Lcp => self.lcp.set_mode(mode),
            ProtocolKind::Ipcp => self.ipcp.set_mode(mode),
            ProtocolKind::Pap => return Vec::new(),
        };
        self.process(kind, outputs)
    }

    pub fn set_timeout(&mut self, kind: ProtocolKind, timeout: Duration) {
        match kind {
            ProtocolKind::Lcp => self.lcp.set_timeout(timeout),
            ProtocolKind::Pap => self.pap.set_timeout(timeout),
            ProtocolKind::Ipcp => self.ipcp.set_timeout(timeout),
        }
    }

    pub fn set_limits(&mut self, kind: ProtocolKind, limits: RetryLimits) {
        match kind {
            ProtocolKind::Lcp => self.lcp.set_limits(limits),
            ProtocolKind::Pap => self.pap.set_max_attempts(limits.max_configure),
            ProtocolKind::Ipcp => self.ipcp.set_limits(limits),
        }
    }

    fn reject_protocol(&mut self, protocol: u16, payload: &[u8]) -> Vec<LinkAction> {
        self.stats.rx_unknown.inc();
        match self.lcp.protocol_reject(protocol, payload) {
            Some(reject) => {
                debug!("{}: Protocol-Reject for {:#06x}", self.name, protocol);
                self.process(ProtocolKind::Lcp, vec![FsmOutput::Send(reject)])
            }
            None => {
                debug!(
                    "{}: dropping protocol {:#06x} before LCP is opened",
                    self.name, protocol
                );
                Vec::new()
            }
        }
    }

    /// Apply FSM outputs until no machine has anything left to say
    fn process(&mut self, kind: ProtocolKind, outputs: Vec<FsmOutput>) -> Vec<LinkAction> {
        let mut actions = Vec::new();
        let mut queue: VecDeque<(ProtocolKind, FsmOutput)> =
            outputs.into_iter().map(|o| (kind, o)).collect();

        while let Some((kind, output)) = queue.pop_front() {
            match (kind, output) {
                (kind, FsmOutput::Send(payload)) => {
                    self.stats.protocol(kind).record_tx(payload.len());
                    actions.push(LinkAction::Send {
                        protocol: kind.protocol(),
                        payload,
                    });
                }

                (ProtocolKind::Lcp, FsmOutput::LayerUp) => {
                    self.phase = Phase::Authenticate;
                    let negotiated = self.lcp.negotiator();
                    let we_authenticate =
                        negotiated.remote().in_effect.is_negotiated(lcp::bits::AUTH);
                    let peer_authenticates =
                        negotiated.local().in_effect.is_negotiated(lcp::bits::AUTH);
                    info!(
                        "{}: link established, authenticate (us: {}, peer: {})",
                        self.name, we_authenticate, peer_authenticates
                    );
                    let outputs = self.pap.start(we_authenticate, peer_authenticates);
                    queue.extend(outputs.into_iter().map(|o| (ProtocolKind::Pap, o)));
                }
                (ProtocolKind::Lcp, FsmOutput::LayerDown) => {
                    self.phase = match self.lcp.state() {
                        FsmState::Terminating => Phase::Terminate,
                        FsmState::Closed => Phase::Dead,
                        _ => Phase::Establish,
                    };
                    self.pap.reset();
                    let outputs = self.ipcp.lower_down();
                    queue.extend(outputs.into_iter().map(|o| (ProtocolKind::Ipcp, o)));
                }
                (ProtocolKind::Lcp, FsmOutput::Finished(reason)) => {
                    info!("{}: link down ({})", self.name, reason);
                    self.phase = Phase::Dead;
                }
                (ProtocolKind::Lcp, FsmOutput::ProtocolRejected(protocol)) => {
                    warn!(
                        "{}: peer rejected protocol {} ({:#06x})",
                        self.name,
                        protocol_name(protocol),
                        protocol
                    );
                    if protocol == protocols::IPCP {
                        let outputs = self.ipcp.lower_down();
                        queue.extend(outputs.into_iter().map(|o| (ProtocolKind::Ipcp, o)));
                    }
                }

                (ProtocolKind::Pap, FsmOutput::LayerUp) => {
                    self.phase = Phase::Network;
                    let mut outputs = self.ipcp.lower_up();
                    outputs.extend(self.ipcp.open());
                    queue.extend(outputs.into_iter().map(|o| (ProtocolKind::Ipcp, o)));
                }
                (ProtocolKind::Pap, FsmOutput::Finished(reason)) => {
                    // LCP stays up; the network phase is never entered
                    warn!("{}: authentication failed ({})", self.name, reason);
                }

                (ProtocolKind::Ipcp, FsmOutput::LayerUp) => {
                    let params = self.ipcp.negotiator().network_params();
                    info!(
                        "{}: network up, local {} peer {}",
                        self.name, params.local, params.peer
                    );
                    self.up_since = Some(Utc::now());
                    actions.push(LinkAction::NetworkUp(params));
                }
                (ProtocolKind::Ipcp, FsmOutput::LayerDown) => {
                    info!("{}: network down", self.name);
                    self.up_since = None;
                    actions.push(LinkAction::NetworkDown);
                }
                (ProtocolKind::Ipcp, FsmOutput::Finished(reason)) => {
                    if matches!(
                        reason,
                        CloseReason::Timeout | CloseReason::NegotiationFailed { .. }
                    ) {
                        warn!("{}: IPCP closed ({})", self.name, reason);
                    }
                }

                (kind, output) => {
                    debug!("{}: {} output {:?} ignored", self.name, kind.name(), output);
                }
            }
        }
        actions
    }
}
