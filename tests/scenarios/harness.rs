//! In-memory wiring for scenario tests

use ppplink::config;
use ppplink::engine::lcp::{bits, new_lcp, LcpFsm, LcpPolicy, LcpValues};
use ppplink::engine::{Fsm, FsmOutput, FsmSettings, Link, LinkAction, Mode, RetryLimits};
use ppplink::protocol::control::codes;
use ppplink::protocol::{ConfigOption, ControlPacket};
use std::time::Duration;

/// Settings with small, explicit retry ceilings
pub fn settings(mode: Mode, max_configure: u8) -> FsmSettings {
    FsmSettings {
        mode,
        timeout: Duration::from_secs(3),
        limits: RetryLimits {
            max_configure,
            max_nak: 5,
            max_terminate: 2,
        },
    }
}

pub fn lcp_fsm(name: &str, mode: Mode, local: LcpValues, seed: u64) -> LcpFsm {
    lcp_fsm_with(name, settings(mode, 10), local, bits::ALL, bits::ALL, seed)
}

pub fn lcp_fsm_with(
    name: &str,
    settings: FsmSettings,
    local: LcpValues,
    local_permit: u16,
    remote_permit: u16,
    seed: u64,
) -> LcpFsm {
    Fsm::new(
        name,
        settings,
        new_lcp(
            LcpPolicy::with_seed(seed),
            local,
            local_permit,
            LcpValues::default(),
            remote_permit,
        ),
    )
}

/// Open and raise the carrier, returning whatever the FSM sent
pub fn start(fsm: &mut LcpFsm) -> Vec<FsmOutput> {
    let mut out = fsm.open();
    out.extend(fsm.lower_up());
    out
}

/// Packets among the outputs
pub fn sent(out: &[FsmOutput]) -> Vec<Vec<u8>> {
    out.iter()
        .filter_map(|o| match o {
            FsmOutput::Send(bytes) => Some(bytes.clone()),
            _ => None,
        })
        .collect()
}

/// Configure-Requests among the outputs
pub fn requests(out: &[FsmOutput]) -> Vec<Vec<u8>> {
    sent(out)
        .into_iter()
        .filter(|p| p[0] == codes::CONFIGURE_REQUEST)
        .collect()
}

pub fn options_of(packet: &[u8]) -> Vec<(u8, Vec<u8>)> {
    let packet = ControlPacket::parse(packet).expect("valid control packet");
    packet
        .options()
        .expect("valid options")
        .iter()
        .map(|o: &ConfigOption<'_>| (o.opt_type, o.data.to_vec()))
        .collect()
}

pub fn has_option(packet: &[u8], opt_type: u8) -> bool {
    options_of(packet).iter().any(|(t, _)| *t == opt_type)
}

/// Shuttle packets between two FSMs until neither sends anything.
/// Returns the number of one-way deliveries that carried packets.
pub fn exchange(a: &mut LcpFsm, b: &mut LcpFsm, from_a: Vec<FsmOutput>) -> usize {
    let mut to_b = sent(&from_a);
    let mut to_a: Vec<Vec<u8>> = Vec::new();
    let mut half_trips = 0;

    while !to_a.is_empty() || !to_b.is_empty() {
        assert!(half_trips < 64, "negotiation did not settle");
        if !to_b.is_empty() {
            half_trips += 1;
            for packet in to_b.drain(..) {
                to_a.extend(sent(&b.receive(&packet).expect("peer accepts packet")));
            }
        }
        if !to_a.is_empty() {
            half_trips += 1;
            for packet in to_a.drain(..) {
                to_b.extend(sent(&a.receive(&packet).expect("local accepts packet")));
            }
        }
    }
    half_trips
}

/// Two links wired back to back
pub struct Pair {
    pub a: Link,
    pub b: Link,
    pub events_a: Vec<LinkAction>,
    pub events_b: Vec<LinkAction>,
}

impl Pair {
    pub fn new(a_toml: &str, b_toml: &str) -> Self {
        let a_cfg = config::parse(a_toml).expect("valid config a");
        let b_cfg = config::parse(b_toml).expect("valid config b");
        Self {
            a: Link::with_policy(&a_cfg, LcpPolicy::with_seed(11)),
            b: Link::with_policy(&b_cfg, LcpPolicy::with_seed(22)),
            events_a: Vec::new(),
            events_b: Vec::new(),
        }
    }

    /// Bring both carriers up (b first) and run to quiescence
    pub fn run(&mut self) {
        let mut to_a = self.b.open();
        to_a.extend(self.b.lower_up());
        let mut to_b = self.a.open();
        to_b.extend(self.a.lower_up());

        for _ in 0..128 {
            if to_a.is_empty() && to_b.is_empty() {
                return;
            }
            let mut next_a = Vec::new();
            for action in to_b.drain(..) {
                match action {
                    LinkAction::Send { protocol, payload } => {
                        next_a.extend(self.b.receive(protocol, &payload))
                    }
                    event => self.events_a.push(event),
                }
            }
            let mut next_b = Vec::new();
            for action in to_a.drain(..) {
                match action {
                    LinkAction::Send { protocol, payload } => {
                        next_b.extend(self.a.receive(protocol, &payload))
                    }
                    event => self.events_b.push(event),
                }
            }
            to_a = next_a;
            to_b = next_b;
        }
        panic!("links did not settle");
    }

    pub fn network_up_a(&self) -> Option<ppplink::engine::NetworkParams> {
        self.events_a.iter().find_map(|e| match e {
            LinkAction::NetworkUp(params) => Some(*params),
            _ => None,
        })
    }
}
