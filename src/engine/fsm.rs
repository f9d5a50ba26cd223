//! Generic negotiation state machine - RFC 1661 section 4
//!
//! One [`Fsm`] drives one option-negotiating protocol (LCP or IPCP) on one
//! link. It consumes administrative events, carrier events, timer expiry and
//! received packets, and answers with [`FsmOutput`]s for the orchestrator:
//! packets to transmit and layer up/down/finished notifications.

use super::negotiate::{Extended, Negotiator};
use super::timer::Timer;
use crate::protocol::control::{code_name, codes};
use crate::protocol::{ControlBuilder, ControlPacket};
use crate::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// FSM state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsmState {
    Closed,
    /// Waiting for the peer (or the carrier) before negotiating
    Listening,
    /// Our Configure-Request is outstanding
    Negotiating,
    /// Peer acknowledged our request; waiting for the peer's request
    PeerAccepted,
    /// We acknowledged the peer's request; waiting for our Ack
    WeAccepted,
    Opened,
    /// Terminate-Request sent (or being waited out)
    Terminating,
}

impl FsmState {
    /// Long description for status display
    pub fn description(&self) -> &'static str {
        match self {
            FsmState::Closed => "Closed",
            FsmState::Listening => "Listening -- waiting for remote host to attempt open",
            FsmState::Negotiating => "Starting configuration exchange",
            FsmState::PeerAccepted => {
                "Remote host accepted our request; waiting for remote request"
            }
            FsmState::WeAccepted => "We accepted remote request; waiting for reply to our request",
            FsmState::Opened => "Opened",
            FsmState::Terminating => "Terminate request sent to remote host",
        }
    }
}

impl fmt::Display for FsmState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Who starts the negotiation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Send a Configure-Request as soon as the lower layer is up
    #[default]
    Active,
    /// Wait for the peer's first Configure-Request
    Passive,
}

/// Why an FSM last reached Closed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    Administrative,
    LowerDown,
    PeerTerminated,
    /// A retry counter ran out
    Timeout,
    /// The peer refused a mandatory option
    NegotiationFailed { option: &'static str },
    AuthenticationFailed,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseReason::Administrative => write!(f, "administrative close"),
            CloseReason::LowerDown => write!(f, "lower layer down"),
            CloseReason::PeerTerminated => write!(f, "terminated by peer"),
            CloseReason::Timeout => write!(f, "timeout"),
            CloseReason::NegotiationFailed { option } => {
                write!(f, "negotiation failed on {}", option)
            }
            CloseReason::AuthenticationFailed => write!(f, "authentication failed"),
        }
    }
}

/// Retry ceilings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryLimits {
    /// Configure-Request retransmissions on timeout
    pub max_configure: u8,
    /// Requests revised because of a Nak or Reject
    pub max_nak: u8,
    /// Terminate-Request retransmissions
    pub max_terminate: u8,
}

impl Default for RetryLimits {
    fn default() -> Self {
        Self {
            max_configure: 10,
            max_nak: 5,
            max_terminate: 2,
        }
    }
}

/// Attempts remaining for the outstanding request
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetryCounters {
    pub configure: u8,
    pub nak: u8,
    pub terminate: u8,
}

/// Static settings for one FSM
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FsmSettings {
    pub mode: Mode,
    pub timeout: Duration,
    pub limits: RetryLimits,
}

impl Default for FsmSettings {
    fn default() -> Self {
        Self {
            mode: Mode::Active,
            timeout: super::timer::DEFAULT_TIMEOUT,
            limits: RetryLimits::default(),
        }
    }
}

/// Something the orchestrator must act on
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FsmOutput {
    /// Control packet (without protocol field) to transmit
    Send(Vec<u8>),
    /// Reached Opened
    LayerUp,
    /// Left Opened
    LayerDown,
    /// Reached Closed
    Finished(CloseReason),
    /// Peer rejected a protocol number (LCP only)
    ProtocolRejected(u16),
}

/// Negotiation state machine for one protocol on one link
#[derive(Debug)]
pub struct Fsm<N: Negotiator> {
    link: String,
    state: FsmState,
    mode: Mode,
    admin_open: bool,
    lower_up: bool,
    limits: RetryLimits,
    counters: RetryCounters,
    timer: Timer,
    identifier: u8,
    /// Identifier and option list of our outstanding Configure-Request
    last_request: Option<(u8, Vec<u8>)>,
    pending_reason: CloseReason,
    close_reason: Option<CloseReason>,
    negotiator: N,
}

impl<N: Negotiator> Fsm<N> {
    pub fn new(link: impl Into<String>, settings: FsmSettings, negotiator: N) -> Self {
        Self {
            link: link.into(),
            state: FsmState::Closed,
            mode: settings.mode,
            admin_open: false,
            lower_up: false,
            limits: settings.limits,
            counters: RetryCounters::default(),
            timer: Timer::new(settings.timeout),
            identifier: 0,
            last_request: None,
            pending_reason: CloseReason::Administrative,
            close_reason: None,
            negotiator,
        }
    }

    pub fn state(&self) -> FsmState {
        self.state
    }

    pub fn is_opened(&self) -> bool {
        self.state == FsmState::Opened
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn limits(&self) -> RetryLimits {
        self.limits
    }

    pub fn counters(&self) -> RetryCounters {
        self.counters
    }

    pub fn timer(&self) -> &Timer {
        &self.timer
    }

    pub fn close_reason(&self) -> Option<CloseReason> {
        self.close_reason
    }

    pub fn negotiator(&self) -> &N {
        &self.negotiator
    }

    pub fn negotiator_mut(&mut self) -> &mut N {
        &mut self.negotiator
    }

    pub fn set_limits(&mut self, limits: RetryLimits) {
        self.limits = limits;
    }

    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timer.set_interval(timeout);
    }

    /// Switch between active and passive; an active FSM already listening
    /// on a live carrier starts negotiating immediately
    pub fn set_mode(&mut self, mode: Mode) -> Vec<FsmOutput> {
        self.mode = mode;
        let mut out = Vec::new();
        if mode == Mode::Active && self.state == FsmState::Listening && self.lower_up {
            self.start_negotiation(true, &mut out);
        }
        out
    }

    /// Administrative open
    pub fn open(&mut self) -> Vec<FsmOutput> {
        let mut out = Vec::new();
        self.admin_open = true;
        if self.state == FsmState::Closed {
            self.transition(FsmState::Listening, &mut out);
            if self.mode == Mode::Active && self.lower_up {
                self.start_negotiation(true, &mut out);
            }
        }
        out
    }

    /// Administrative close; never refused and idempotent
    pub fn close(&mut self) -> Vec<FsmOutput> {
        let mut out = Vec::new();
        self.admin_open = false;
        match self.state {
            FsmState::Closed | FsmState::Terminating => {}
            FsmState::Listening => {
                self.close_reason = Some(CloseReason::Administrative);
                self.transition(FsmState::Closed, &mut out);
            }
            FsmState::Negotiating
            | FsmState::PeerAccepted
            | FsmState::WeAccepted
            | FsmState::Opened => {
                self.begin_terminate(CloseReason::Administrative, &mut out);
            }
        }
        out
    }

    /// Carrier (or, for an NCP, the link) came up
    pub fn lower_up(&mut self) -> Vec<FsmOutput> {
        let mut out = Vec::new();
        self.lower_up = true;
        if self.state == FsmState::Closed && self.admin_open {
            self.transition(FsmState::Listening, &mut out);
        }
        if self.state == FsmState::Listening && self.mode == Mode::Active {
            self.start_negotiation(true, &mut out);
        }
        out
    }

    /// Carrier lost: drop straight to Closed
    pub fn lower_down(&mut self) -> Vec<FsmOutput> {
        let mut out = Vec::new();
        self.lower_up = false;
        if self.state != FsmState::Closed {
            self.close_reason = Some(CloseReason::LowerDown);
            self.transition(FsmState::Closed, &mut out);
        }
        out
    }

    /// Feed the retransmission timer
    pub fn poll(&mut self, now: Instant) -> Vec<FsmOutput> {
        if self.timer.expired(now) {
            self.timeout()
        } else {
            Vec::new()
        }
    }

    /// Retransmission timer fired
    pub fn timeout(&mut self) -> Vec<FsmOutput> {
        let mut out = Vec::new();
        match self.state {
            FsmState::Negotiating | FsmState::PeerAccepted | FsmState::WeAccepted => {
                if self.counters.configure == 0 {
                    warn!(
                        "{}: {} Configure-Request retries exhausted",
                        self.link,
                        N::NAME
                    );
                    self.close_reason = Some(CloseReason::Timeout);
                    self.transition(FsmState::Closed, &mut out);
                    return out;
                }
                self.counters.configure -= 1;
                debug!(
                    "{}: {} retransmitting Configure-Request ({} left)",
                    self.link,
                    N::NAME,
                    self.counters.configure
                );
                self.send_request(&mut out);
                if self.state == FsmState::PeerAccepted {
                    // The Ack we hold was for the request being replaced
                    self.transition(FsmState::Negotiating, &mut out);
                }
            }
            FsmState::Terminating => {
                if self.counters.terminate == 0 {
                    self.close_reason = Some(self.pending_reason);
                    self.transition(FsmState::Closed, &mut out);
                    return out;
                }
                self.counters.terminate -= 1;
                self.send_terminate_request(&mut out);
            }
            _ => {
                debug!("{}: {} stale timeout in {}", self.link, N::NAME, self.state);
            }
        }
        out
    }

    /// Handle one received control packet
    ///
    /// Malformed packets are returned as errors and change nothing.
    pub fn receive(&mut self, payload: &[u8]) -> Result<Vec<FsmOutput>> {
        let packet = ControlPacket::parse(payload)?;
        let mut out = Vec::new();

        debug!(
            "{}: {} received {} id={} in {}",
            self.link,
            N::NAME,
            code_name(packet.code()),
            packet.identifier(),
            self.state
        );

        match packet.code() {
            codes::CONFIGURE_REQUEST => self.rx_configure_request(&packet, &mut out)?,
            codes::CONFIGURE_ACK => self.rx_configure_ack(&packet, &mut out)?,
            codes::CONFIGURE_NAK | codes::CONFIGURE_REJECT => {
                self.rx_configure_nak_or_reject(&packet, &mut out)?
            }
            codes::TERMINATE_REQUEST => self.rx_terminate_request(&packet, &mut out),
            codes::TERMINATE_ACK => self.rx_terminate_ack(&mut out),
            codes::CODE_REJECT => {
                warn!(
                    "{}: {} peer sent Code-Reject ({} bytes)",
                    self.link,
                    N::NAME,
                    packet.data().len()
                );
            }
            _ => {
                let opened = self.is_opened();
                match self.negotiator.handle_extended(&packet, opened) {
                    Extended::Reply(reply) => out.push(FsmOutput::Send(reply)),
                    Extended::Consumed => {}
                    Extended::ProtocolRejected(protocol) => {
                        out.push(FsmOutput::ProtocolRejected(protocol))
                    }
                    Extended::Unknown => {
                        if self.state != FsmState::Closed {
                            let id = self.next_identifier();
                            let reject = ControlBuilder::code_reject(
                                id,
                                packet.as_bytes(),
                                self.negotiator.peer_mru(),
                            )
                            .build();
                            out.push(FsmOutput::Send(reject));
                        }
                    }
                }
            }
        }
        Ok(out)
    }

    fn rx_configure_request(
        &mut self,
        packet: &ControlPacket<'_>,
        out: &mut Vec<FsmOutput>,
    ) -> Result<()> {
        let options = packet.options()?;

        match self.state {
            FsmState::Closed | FsmState::Terminating => {
                debug!(
                    "{}: {} ignoring Configure-Request in {}",
                    self.link,
                    N::NAME,
                    self.state
                );
                return Ok(());
            }
            FsmState::Listening => self.start_negotiation(true, out),
            FsmState::Opened => {
                info!("{}: {} peer renegotiating", self.link, N::NAME);
                self.start_negotiation(false, out);
            }
            _ => {}
        }

        let reply = self.negotiator.handle_request(&options);
        let acked = reply.is_ack();
        debug!(
            "{}: {} sending {} id={}",
            self.link,
            N::NAME,
            code_name(reply.code),
            packet.identifier()
        );
        out.push(FsmOutput::Send(
            ControlBuilder::new(reply.code, packet.identifier())
                .raw_data(&reply.data)
                .build(),
        ));

        let next = match (self.state, acked) {
            (FsmState::Negotiating, true) => FsmState::WeAccepted,
            (FsmState::PeerAccepted, true) => FsmState::Opened,
            (FsmState::WeAccepted, false) => FsmState::Negotiating,
            (state, _) => state,
        };
        self.transition(next, out);
        Ok(())
    }

    fn rx_configure_ack(
        &mut self,
        packet: &ControlPacket<'_>,
        out: &mut Vec<FsmOutput>,
    ) -> Result<()> {
        if !matches!(self.state, FsmState::Negotiating | FsmState::WeAccepted) {
            debug!("{}: {} ignoring Configure-Ack in {}", self.link, N::NAME, self.state);
            return Ok(());
        }
        if !self.matches_last_request(packet.identifier(), Some(packet.data())) {
            debug!(
                "{}: {} discarding stray Configure-Ack id={}",
                self.link,
                N::NAME,
                packet.identifier()
            );
            return Ok(());
        }

        let options = packet.options()?;
        self.negotiator.handle_ack(&options);
        self.counters.configure = self.limits.max_configure;

        if self.state == FsmState::WeAccepted {
            self.transition(FsmState::Opened, out);
        } else {
            self.timer.start();
            self.transition(FsmState::PeerAccepted, out);
        }
        Ok(())
    }

    fn rx_configure_nak_or_reject(
        &mut self,
        packet: &ControlPacket<'_>,
        out: &mut Vec<FsmOutput>,
    ) -> Result<()> {
        if !matches!(
            self.state,
            FsmState::Negotiating | FsmState::PeerAccepted | FsmState::WeAccepted
        ) {
            debug!(
                "{}: {} ignoring {} in {}",
                self.link,
                N::NAME,
                code_name(packet.code()),
                self.state
            );
            return Ok(());
        }
        if !self.matches_last_request(packet.identifier(), None) {
            debug!(
                "{}: {} discarding stray {} id={}",
                self.link,
                N::NAME,
                code_name(packet.code()),
                packet.identifier()
            );
            return Ok(());
        }

        let options = packet.options()?;

        if self.counters.nak == 0 {
            warn!("{}: {} Nak/Reject retries exhausted", self.link, N::NAME);
            self.close_reason = Some(CloseReason::Timeout);
            self.transition(FsmState::Closed, out);
            return Ok(());
        }
        self.counters.nak -= 1;

        if let Err(failure) = self.negotiator.handle_nak_or_reject(packet.code(), &options) {
            self.close_reason = Some(CloseReason::NegotiationFailed {
                option: failure.option,
            });
            self.transition(FsmState::Closed, out);
            return Ok(());
        }

        self.counters.configure = self.limits.max_configure;
        self.send_request(out);
        if self.state == FsmState::PeerAccepted {
            self.transition(FsmState::Negotiating, out);
        }
        Ok(())
    }

    fn rx_terminate_request(&mut self, packet: &ControlPacket<'_>, out: &mut Vec<FsmOutput>) {
        out.push(FsmOutput::Send(
            ControlBuilder::terminate_ack(packet.identifier()).build(),
        ));

        match self.state {
            FsmState::Closed | FsmState::Listening => {}
            FsmState::Negotiating
            | FsmState::PeerAccepted
            | FsmState::WeAccepted
            | FsmState::Terminating => {
                self.close_reason = Some(CloseReason::PeerTerminated);
                self.transition(FsmState::Closed, out);
            }
            FsmState::Opened => {
                info!("{}: {} terminated by peer", self.link, N::NAME);
                // Wait out one restart interval before closing
                self.counters.terminate = 0;
                self.pending_reason = CloseReason::PeerTerminated;
                self.timer.start();
                self.transition(FsmState::Terminating, out);
            }
        }
    }

    fn rx_terminate_ack(&mut self, out: &mut Vec<FsmOutput>) {
        if self.state == FsmState::Terminating {
            self.close_reason = Some(self.pending_reason);
            self.transition(FsmState::Closed, out);
        }
    }

    /// Send our first Configure-Request of a round and enter Negotiating.
    /// `fresh` starts a new connection and restores configured values.
    fn start_negotiation(&mut self, fresh: bool, out: &mut Vec<FsmOutput>) {
        if fresh {
            self.negotiator.reset();
        }
        self.negotiator.begin_round();
        self.counters.configure = self.limits.max_configure;
        self.counters.nak = self.limits.max_nak;
        self.last_request = None;
        self.send_request(out);
        self.transition(FsmState::Negotiating, out);
    }

    /// Build and send a Configure-Request, reusing the identifier when the
    /// content is unchanged
    fn send_request(&mut self, out: &mut Vec<FsmOutput>) {
        let data = self.negotiator.build_request();
        let id = match &self.last_request {
            Some((id, previous)) if *previous == data => *id,
            _ => self.next_identifier(),
        };

        debug!(
            "{}: {} sending Configure-Request id={} ({} bytes of options)",
            self.link,
            N::NAME,
            id,
            data.len()
        );
        out.push(FsmOutput::Send(
            ControlBuilder::configure_request(id).raw_data(&data).build(),
        ));
        self.last_request = Some((id, data));
        self.timer.start();
    }

    fn begin_terminate(&mut self, reason: CloseReason, out: &mut Vec<FsmOutput>) {
        self.pending_reason = reason;
        self.counters.terminate = self.limits.max_terminate;
        self.identifier = self.identifier.wrapping_add(1);
        self.send_terminate_request(out);
        self.transition(FsmState::Terminating, out);
    }

    fn send_terminate_request(&mut self, out: &mut Vec<FsmOutput>) {
        debug!(
            "{}: {} sending Terminate-Request id={}",
            self.link,
            N::NAME,
            self.identifier
        );
        out.push(FsmOutput::Send(
            ControlBuilder::terminate_request(self.identifier).build(),
        ));
        self.timer.start();
    }

    pub(super) fn next_identifier(&mut self) -> u8 {
        self.identifier = self.identifier.wrapping_add(1);
        self.identifier
    }

    fn matches_last_request(&self, identifier: u8, data: Option<&[u8]>) -> bool {
        match &self.last_request {
            Some((id, sent)) => *id == identifier && data.map_or(true, |d| d == sent.as_slice()),
            None => false,
        }
    }

    fn transition(&mut self, next: FsmState, out: &mut Vec<FsmOutput>) {
        let prev = self.state;
        if prev == next {
            return;
        }
        debug!("{}: {} {} -> {}", self.link, N::NAME, prev, next);
        self.state = next;

        if prev == FsmState::Opened {
            out.push(FsmOutput::LayerDown);
        }

        match next {
            FsmState::Opened => {
                self.timer.stop();
                self.close_reason = None;
                info!("{}: {} opened", self.link, N::NAME);
                out.push(FsmOutput::LayerUp);
            }
            FsmState::Closed => {
                self.timer.stop();
                self.last_request = None;
                let reason = self.close_reason.unwrap_or(CloseReason::Administrative);
                info!("{}: {} closed ({})", self.link, N::NAME, reason);
                out.push(FsmOutput::Finished(reason));
            }
            _ => {}
        }
    }
}
