//! PAP authentication exchange - RFC 1334
//!
//! Not an option negotiation: once LCP is opened each side that was asked
//! to authenticate sends its credentials until the authenticator answers
//! with an Ack or Nak. Either direction may be required, or both.

use super::fsm::{CloseReason, FsmOutput, FsmSettings, FsmState};
use super::timer::Timer;
use crate::protocol::pap::{self, codes};
use crate::protocol::ControlPacket;
use crate::Result;
use std::fmt;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PapState {
    /// LCP not opened yet
    WaitingForLower,
    /// Our Authenticate-Request is outstanding
    SendingCredentials,
    /// Waiting for the peer's Authenticate-Request
    AwaitingPeerCredentials,
    AuthenticateSuccess,
    AuthenticateFailure,
}

impl fmt::Display for PapState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Decides whether a peer's credentials are acceptable
pub trait CredentialValidator: fmt::Debug {
    fn validate(&self, peer_id: &[u8], password: &[u8]) -> bool;
}

/// Fixed list of accepted peer-id/password pairs
#[derive(Debug, Clone, Default)]
pub struct StaticCredentials {
    users: Vec<(String, String)>,
}

impl StaticCredentials {
    pub fn new(users: Vec<(String, String)>) -> Self {
        Self { users }
    }
}

impl CredentialValidator for StaticCredentials {
    fn validate(&self, peer_id: &[u8], password: &[u8]) -> bool {
        self.users
            .iter()
            .any(|(user, pass)| user.as_bytes() == peer_id && pass.as_bytes() == password)
    }
}

/// The peer-id and password we present
#[derive(Clone, PartialEq, Eq)]
pub struct Identity {
    pub peer_id: String,
    pub password: String,
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("peer_id", &self.peer_id)
            .field("password", &"***")
            .finish()
    }
}

/// PAP exchange for one link
#[derive(Debug)]
pub struct Pap {
    link: String,
    state: PapState,
    identity: Option<Identity>,
    validator: Box<dyn CredentialValidator>,
    timer: Timer,
    max_attempts: u8,
    attempts: u8,
    identifier: u8,
    /// Direction still to complete: we authenticate to the peer
    we_pending: bool,
    /// Direction still to complete: the peer authenticates to us
    peer_pending: bool,
    peer_required: bool,
    message: String,
}

impl Pap {
    pub fn new(
        link: impl Into<String>,
        settings: FsmSettings,
        identity: Option<Identity>,
        validator: Box<dyn CredentialValidator>,
    ) -> Self {
        Self {
            link: link.into(),
            state: PapState::WaitingForLower,
            identity,
            validator,
            timer: Timer::new(settings.timeout),
            max_attempts: settings.limits.max_configure,
            attempts: 0,
            identifier: 0,
            we_pending: false,
            peer_pending: false,
            peer_required: false,
            message: String::new(),
        }
    }

    pub fn state(&self) -> PapState {
        self.state
    }

    /// Last message text received or sent
    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn attempts_remaining(&self) -> u8 {
        self.attempts
    }

    pub fn timer(&self) -> &Timer {
        &self.timer
    }

    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timer.set_interval(timeout);
    }

    pub fn set_max_attempts(&mut self, max_attempts: u8) {
        self.max_attempts = max_attempts;
    }

    /// Equivalent generic FSM state, for status display
    pub fn fsm_state(&self) -> FsmState {
        match self.state {
            PapState::WaitingForLower => FsmState::Closed,
            PapState::SendingCredentials | PapState::AwaitingPeerCredentials => {
                FsmState::Negotiating
            }
            PapState::AuthenticateSuccess => FsmState::Opened,
            PapState::AuthenticateFailure => FsmState::Closed,
        }
    }

    /// LCP opened: begin the exchange for whichever directions LCP agreed
    pub fn start(&mut self, we_authenticate: bool, peer_authenticates: bool) -> Vec<FsmOutput> {
        let mut out = Vec::new();
        self.we_pending = we_authenticate;
        self.peer_pending = peer_authenticates;
        self.peer_required = peer_authenticates;
        self.attempts = self.max_attempts;
        self.message.clear();

        if we_authenticate && self.identity.is_none() {
            warn!(
                "{}: PAP peer requires authentication but no credentials are configured",
                self.link
            );
            self.fail(CloseReason::AuthenticationFailed, &mut out);
            return out;
        }

        if we_authenticate {
            self.state = PapState::SendingCredentials;
            self.send_credentials(&mut out);
        } else if peer_authenticates {
            self.state = PapState::AwaitingPeerCredentials;
            self.timer.start();
        }
        self.check_complete(&mut out);
        out
    }

    /// LCP left Opened; back to waiting
    pub fn reset(&mut self) {
        self.state = PapState::WaitingForLower;
        self.timer.stop();
        self.we_pending = false;
        self.peer_pending = false;
        self.peer_required = false;
    }

    pub fn poll(&mut self, now: Instant) -> Vec<FsmOutput> {
        if self.timer.expired(now) {
            self.timeout()
        } else {
            Vec::new()
        }
    }

    pub fn timeout(&mut self) -> Vec<FsmOutput> {
        let mut out = Vec::new();
        if !matches!(
            self.state,
            PapState::SendingCredentials | PapState::AwaitingPeerCredentials
        ) {
            return out;
        }
        if self.attempts == 0 {
            warn!("{}: PAP gave up waiting in {}", self.link, self.state);
            self.fail(CloseReason::Timeout, &mut out);
            return out;
        }
        self.attempts -= 1;
        if self.state == PapState::SendingCredentials {
            self.send_credentials(&mut out);
        } else {
            self.timer.start();
        }
        out
    }

    pub fn receive(&mut self, payload: &[u8]) -> Result<Vec<FsmOutput>> {
        let packet = ControlPacket::parse(payload)?;
        let mut out = Vec::new();

        match packet.code() {
            codes::AUTHENTICATE_REQUEST => self.rx_request(&packet, &mut out)?,
            codes::AUTHENTICATE_ACK | codes::AUTHENTICATE_NAK => self.rx_reply(&packet, &mut out),
            code => debug!("{}: PAP ignoring code {}", self.link, code),
        }
        Ok(out)
    }

    fn rx_request(&mut self, packet: &ControlPacket<'_>, out: &mut Vec<FsmOutput>) -> Result<()> {
        if !self.peer_required
            || matches!(
                self.state,
                PapState::WaitingForLower | PapState::AuthenticateFailure
            )
        {
            debug!("{}: PAP ignoring Authenticate-Request in {}", self.link, self.state);
            return Ok(());
        }

        if !self.peer_pending {
            // Our Ack was lost; the peer is retransmitting
            out.push(FsmOutput::Send(pap::authenticate_reply(
                packet.identifier(),
                true,
                "Login ok",
            )));
            return Ok(());
        }

        let credentials = pap::parse_request(packet)?;
        let accepted = self
            .validator
            .validate(credentials.peer_id, credentials.password);
        let peer_id = String::from_utf8_lossy(credentials.peer_id).into_owned();

        if accepted {
            info!("{}: PAP peer {} authenticated", self.link, peer_id);
            self.message = "Login ok".into();
            out.push(FsmOutput::Send(pap::authenticate_reply(
                packet.identifier(),
                true,
                &self.message,
            )));
            self.peer_pending = false;
            if self.state == PapState::AwaitingPeerCredentials {
                self.timer.stop();
            }
            self.check_complete(out);
        } else {
            warn!("{}: PAP peer {} failed authentication", self.link, peer_id);
            self.message = "Invalid username or password".into();
            out.push(FsmOutput::Send(pap::authenticate_reply(
                packet.identifier(),
                false,
                &self.message,
            )));
            self.fail(CloseReason::AuthenticationFailed, out);
        }
        Ok(())
    }

    fn rx_reply(&mut self, packet: &ControlPacket<'_>, out: &mut Vec<FsmOutput>) {
        if self.state != PapState::SendingCredentials || packet.identifier() != self.identifier {
            debug!(
                "{}: PAP discarding stray reply id={} in {}",
                self.link,
                packet.identifier(),
                self.state
            );
            return;
        }

        self.message = pap::parse_message(packet);
        if packet.code() == codes::AUTHENTICATE_NAK {
            warn!("{}: PAP authentication refused: {}", self.link, self.message);
            self.fail(CloseReason::AuthenticationFailed, out);
            return;
        }

        info!("{}: PAP authenticated to peer", self.link);
        self.we_pending = false;
        self.timer.stop();
        if self.peer_pending {
            self.state = PapState::AwaitingPeerCredentials;
            self.attempts = self.max_attempts;
            self.timer.start();
        }
        self.check_complete(out);
    }

    fn send_credentials(&mut self, out: &mut Vec<FsmOutput>) {
        let Some(identity) = &self.identity else {
            return;
        };
        self.identifier = self.identifier.wrapping_add(1);
        debug!(
            "{}: PAP sending credentials for {} id={}",
            self.link, identity.peer_id, self.identifier
        );
        out.push(FsmOutput::Send(pap::authenticate_request(
            self.identifier,
            &identity.peer_id,
            &identity.password,
        )));
        self.timer.start();
    }

    fn check_complete(&mut self, out: &mut Vec<FsmOutput>) {
        if self.we_pending || self.peer_pending || self.state == PapState::AuthenticateFailure {
            return;
        }
        self.state = PapState::AuthenticateSuccess;
        self.timer.stop();
        out.push(FsmOutput::LayerUp);
    }

    fn fail(&mut self, reason: CloseReason, out: &mut Vec<FsmOutput>) {
        self.state = PapState::AuthenticateFailure;
        self.timer.stop();
        info!("{}: PAP failed ({})", self.link, reason);
        out.push(FsmOutput::Finished(reason));
    }
}
