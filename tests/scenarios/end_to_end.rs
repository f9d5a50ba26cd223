//! Whole-link bring-up between two engines, or an engine and a scripted peer

use super::harness::{exchange, has_option, lcp_fsm, sent, start, Pair};
use ppplink::engine::lcp::{bits, LcpValues};
use ppplink::engine::{
    FsmState, LinkAction, Mode, PapState, Phase, ProtocolKind, VjParams,
};
use ppplink::protocol::control::{codes, encode_option};
use ppplink::protocol::lcp::options;
use ppplink::protocol::ppp::protocols;
use ppplink::protocol::{ControlBuilder, ControlPacket};
use std::net::Ipv4Addr;

#[test]
fn test_scenario_a_active_meets_passive() {
    let values = LcpValues {
        negotiate: bits::MRU | bits::MAGIC,
        mru: 1500,
        ..Default::default()
    };
    let mut a = lcp_fsm("a", Mode::Active, values.clone(), 100);
    let mut b = lcp_fsm("b", Mode::Passive, values, 200);
    start(&mut b);

    let initial = start(&mut a);
    let half_trips = exchange(&mut a, &mut b, initial);
    assert!(half_trips <= 4);
    assert_eq!(a.state(), FsmState::Opened);
    assert_eq!(b.state(), FsmState::Opened);

    for fsm in [&a, &b] {
        let negotiation = fsm.negotiator();
        assert_eq!(negotiation.local().in_effect.mru, 1500);
        assert_eq!(negotiation.remote().in_effect.mru, 1500);
    }
    assert_ne!(
        a.negotiator().local().in_effect.magic_number,
        b.negotiator().local().in_effect.magic_number
    );
}

#[test]
fn test_scenario_b_peer_rejects_acfc() {
    let mut a = lcp_fsm(
        "a",
        Mode::Active,
        LcpValues {
            negotiate: bits::MRU | bits::PFC | bits::ACFC,
            mru: 1500,
            pfc: true,
            acfc: true,
            ..Default::default()
        },
        300,
    );

    let mut pending = sent(&start(&mut a));
    // The peer's own (empty) request; a acks it
    let peer_request = ControlBuilder::configure_request(1).build();
    pending.extend(sent(&a.receive(&peer_request).unwrap()));
    let mut rejects = 0;

    for _ in 0..16 {
        let Some(packet) = pending.pop() else { break };
        let parsed = ControlPacket::parse(&packet).unwrap();
        if parsed.code() != codes::CONFIGURE_REQUEST {
            continue;
        }
        let reply = if has_option(&packet, options::ACFC) {
            rejects += 1;
            let mut data = Vec::new();
            encode_option(&mut data, options::ACFC, &[]);
            ControlBuilder::configure_reject(parsed.identifier())
                .raw_data(&data)
                .build()
        } else {
            ControlBuilder::configure_ack(parsed.identifier())
                .raw_data(parsed.data())
                .build()
        };
        pending.extend(sent(&a.receive(&reply).unwrap()));
    }

    assert_eq!(rejects, 1);
    assert_eq!(a.state(), FsmState::Opened);
    let negotiation = a.negotiator();
    assert_eq!(negotiation.local().desired.negotiate & bits::ACFC, 0);
    assert_eq!(negotiation.local().in_effect.negotiate & bits::ACFC, 0);
    assert!(negotiation.local().in_effect.pfc);
}

const AUTHENTICATOR: &str = r#"
[link]
name = "hub"

[lcp.local]
magic = true
auth = "pap"

[[pap.users]]
username = "bob"
password = "hunter2"

[ipcp]
local_address = "10.0.0.1"
peer_address = "10.0.0.2"
"#;

fn client(password: &str) -> String {
    format!(
        r#"
[link]
name = "client"

[lcp.local]
magic = true

[pap]
username = "bob"
password = "{}"

[ipcp]
local_address = "10.0.0.2"
"#,
        password
    )
}

#[test]
fn test_authenticated_link_reaches_network() {
    let mut pair = Pair::new(AUTHENTICATOR, &client("hunter2"));
    pair.run();

    assert_eq!(pair.a.phase(), Phase::Network);
    assert_eq!(pair.b.pap().state(), PapState::AuthenticateSuccess);
    let params = pair.network_up_a().expect("network came up");
    assert_eq!(params.local, Ipv4Addr::new(10, 0, 0, 1));
    assert_eq!(params.peer, Ipv4Addr::new(10, 0, 0, 2));
}

#[test]
fn test_scenario_c_authentication_failure_blocks_ipcp() {
    let mut pair = Pair::new(AUTHENTICATOR, &client("guess"));
    pair.run();

    for link in [&pair.a, &pair.b] {
        assert_eq!(link.lcp().state(), FsmState::Opened);
        assert_eq!(link.pap().state(), PapState::AuthenticateFailure);
        assert_eq!(link.ipcp().state(), FsmState::Closed);
        assert_eq!(link.phase(), Phase::Authenticate);
        assert_eq!(link.stats().protocol(ProtocolKind::Ipcp).tx_packets.get(), 0);
    }
    assert!(pair.network_up_a().is_none());
    assert!(!pair
        .events_b
        .iter()
        .any(|e| matches!(e, LinkAction::NetworkUp(_))));
}

#[test]
fn test_scenario_d_peer_assigns_address() {
    let asking = "[link]\nname = \"dialup\"\n[lcp.local]\nmagic = true\n";
    let assigning = "[link]\nname = \"server\"\n[lcp.local]\nmagic = true\n\
                     [ipcp]\nlocal_address = \"10.0.0.1\"\npeer_address = \"10.0.0.5\"\n";
    let mut pair = Pair::new(asking, assigning);
    pair.run();

    let in_effect = &pair.a.ipcp().negotiator().local().in_effect;
    assert_eq!(in_effect.address, Ipv4Addr::new(10, 0, 0, 5));
    assert_eq!(pair.a.ipcp().state(), FsmState::Opened);

    let params = pair.network_up_a().expect("network came up");
    assert_eq!(params.local, Ipv4Addr::new(10, 0, 0, 5));
    assert_eq!(params.peer, Ipv4Addr::new(10, 0, 0, 1));
}

#[test]
fn test_quick_preset_negotiates_compression() {
    let mut a_cfg = ppplink::config::parse(
        "[link]\nname = \"a\"\n[ipcp]\nlocal_address = \"10.1.0.1\"\n",
    )
    .unwrap();
    let mut b_cfg = ppplink::config::parse(
        "[link]\nname = \"b\"\n[ipcp]\nlocal_address = \"10.1.0.2\"\n",
    )
    .unwrap();
    ppplink::config::apply_quick(&mut a_cfg);
    ppplink::config::apply_quick(&mut b_cfg);
    let a_toml = ppplink::config::to_toml(&a_cfg).unwrap();
    let b_toml = ppplink::config::to_toml(&b_cfg).unwrap();

    let mut pair = Pair::new(&a_toml, &b_toml);
    pair.run();

    let params = pair.network_up_a().expect("network came up");
    let vj = Some(VjParams {
        slots: 16,
        slot_compress: true,
    });
    assert_eq!(params.rx_compression, vj);
    assert_eq!(params.tx_compression, vj);

    let lcp = pair.a.lcp().negotiator();
    assert_eq!(lcp.local().in_effect.accm, 0);
    assert!(lcp.local().in_effect.pfc);
    assert!(lcp.remote().in_effect.acfc);
}

#[test]
fn test_lcp_drop_forces_ipcp_closed() {
    let mut pair = Pair::new(AUTHENTICATOR, &client("hunter2"));
    pair.run();
    assert!(pair.a.is_network_up());

    // Peer renegotiates LCP: everything above it goes down
    let request = ControlBuilder::configure_request(200).build();
    let out = pair.a.receive(protocols::LCP, &request);
    assert!(out.contains(&LinkAction::NetworkDown));
    assert_eq!(pair.a.ipcp().state(), FsmState::Closed);
    assert_eq!(pair.a.pap().state(), PapState::WaitingForLower);
    assert_eq!(pair.a.phase(), Phase::Establish);
}
