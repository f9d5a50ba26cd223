//! Invariants of the negotiation FSM, checked against scripted peers

use super::harness::{
    exchange, has_option, lcp_fsm, lcp_fsm_with, options_of, requests, sent, settings, start,
};
use ppplink::engine::lcp::{bits, LcpValues};
use ppplink::engine::negotiate::OptionValues;
use ppplink::engine::{CloseReason, FsmOutput, FsmState, Mode};
use ppplink::protocol::control::{codes, encode_option};
use ppplink::protocol::lcp::options;
use ppplink::protocol::{ControlBuilder, ControlPacket};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn magic_values() -> LcpValues {
    LcpValues {
        negotiate: bits::MRU | bits::MAGIC,
        mru: 1500,
        ..Default::default()
    }
}

fn ack_of(request: &[u8]) -> Vec<u8> {
    let packet = ControlPacket::parse(request).unwrap();
    ControlBuilder::configure_ack(packet.identifier())
        .raw_data(packet.data())
        .build()
}

fn magic_in(request: &[u8]) -> u32 {
    options_of(request)
        .into_iter()
        .find(|(t, _)| *t == options::MAGIC_NUMBER)
        .map(|(_, v)| u32::from_be_bytes([v[0], v[1], v[2], v[3]]))
        .expect("request carries a magic number")
}

#[test]
fn test_retry_exhaustion_after_three_retransmissions() {
    let mut fsm = lcp_fsm_with(
        "sl0",
        settings(Mode::Active, 3),
        magic_values(),
        bits::ALL,
        bits::ALL,
        1,
    );
    let first = requests(&start(&mut fsm));
    assert_eq!(first.len(), 1);

    let mut retransmissions = 0;
    loop {
        let deadline = fsm.timer().deadline().expect("timer armed while negotiating");
        let out = fsm.poll(deadline);
        let resent = requests(&out);
        if resent.is_empty() {
            assert!(out.contains(&FsmOutput::Finished(CloseReason::Timeout)));
            break;
        }
        assert_eq!(resent[0], first[0], "retransmission reuses id and content");
        retransmissions += 1;
        assert!(retransmissions <= 3);
    }
    assert_eq!(retransmissions, 3);
    assert_eq!(fsm.state(), FsmState::Closed);
    assert!(!fsm.timer().is_running());
}

/// Drive a fresh FSM into each reachable state
fn in_state(target: FsmState) -> ppplink::engine::LcpFsm {
    let mut fsm = lcp_fsm("sl0", Mode::Active, magic_values(), 1);
    if target == FsmState::Closed {
        return fsm;
    }
    if target == FsmState::Listening {
        fsm.open();
        return fsm;
    }
    let out = start(&mut fsm);
    let request = requests(&out).remove(0);
    let peer_request = ControlBuilder::configure_request(77).build();
    match target {
        FsmState::Negotiating => {}
        FsmState::PeerAccepted => {
            fsm.receive(&ack_of(&request)).unwrap();
        }
        FsmState::WeAccepted => {
            fsm.receive(&peer_request).unwrap();
        }
        FsmState::Opened => {
            fsm.receive(&ack_of(&request)).unwrap();
            fsm.receive(&peer_request).unwrap();
        }
        FsmState::Terminating => {
            fsm.close();
        }
        _ => unreachable!(),
    }
    assert_eq!(fsm.state(), target);
    fsm
}

#[test]
fn test_close_always_reaches_closed() {
    for state in [
        FsmState::Closed,
        FsmState::Listening,
        FsmState::Negotiating,
        FsmState::PeerAccepted,
        FsmState::WeAccepted,
        FsmState::Opened,
        FsmState::Terminating,
    ] {
        let mut fsm = in_state(state);
        fsm.close();
        fsm.close();
        let mut events = 0;
        while fsm.state() != FsmState::Closed {
            fsm.timeout();
            events += 1;
            assert!(events <= 3, "{:?} did not close", state);
        }
    }
}

#[test]
fn test_opened_reached_in_either_order() {
    // Our request acked first
    let mut fsm = lcp_fsm("sl0", Mode::Active, magic_values(), 1);
    let request = requests(&start(&mut fsm)).remove(0);
    fsm.receive(&ack_of(&request)).unwrap();
    assert_eq!(fsm.state(), FsmState::PeerAccepted);
    let out = fsm
        .receive(&ControlBuilder::configure_request(9).build())
        .unwrap();
    assert!(out.contains(&FsmOutput::LayerUp));

    // Peer's request acked first
    let mut fsm = lcp_fsm("sl0", Mode::Active, magic_values(), 1);
    let request = requests(&start(&mut fsm)).remove(0);
    fsm.receive(&ControlBuilder::configure_request(9).build())
        .unwrap();
    assert_eq!(fsm.state(), FsmState::WeAccepted);
    let out = fsm.receive(&ack_of(&request)).unwrap();
    assert!(out.contains(&FsmOutput::LayerUp));
    assert_eq!(fsm.state(), FsmState::Opened);
}

#[test]
fn test_opened_needs_both_acks() {
    let mut fsm = lcp_fsm("sl0", Mode::Active, magic_values(), 1);
    let request = requests(&start(&mut fsm)).remove(0);

    // Repeated acks of our own request alone never open the link
    fsm.receive(&ack_of(&request)).unwrap();
    fsm.receive(&ack_of(&request)).unwrap();
    assert_ne!(fsm.state(), FsmState::Opened);
}

#[test]
fn test_in_effect_stays_within_permitted() {
    let local_permit = bits::MRU | bits::MAGIC | bits::PFC;
    let remote_permit = bits::MRU | bits::ACCM;
    let mut fsm = lcp_fsm_with(
        "sl0",
        settings(Mode::Active, 10),
        LcpValues {
            negotiate: bits::ALL,
            mru: 1500,
            accm: 0,
            pfc: true,
            acfc: true,
            ..Default::default()
        },
        local_permit,
        remote_permit,
        3,
    );
    let mut rng = StdRng::seed_from_u64(0x5eed);
    let mut last_request = requests(&start(&mut fsm)).remove(0);
    assert!(!has_option(&last_request, options::ACFC));

    for round in 0..400u32 {
        let mut data = Vec::new();
        for _ in 0..rng.gen_range(0..5) {
            let opt_type = rng.gen_range(1..10u8);
            let len = rng.gen_range(0..5usize);
            let value: Vec<u8> = (0..len).map(|_| rng.gen()).collect();
            encode_option(&mut data, opt_type, &value);
        }
        let id = rng.gen();
        let packet = match rng.gen_range(0..4) {
            0 => ControlBuilder::configure_request(id).raw_data(&data).build(),
            1 => ack_of(&last_request),
            2 => {
                let last_id = ControlPacket::parse(&last_request).unwrap().identifier();
                ControlBuilder::configure_nak(last_id).raw_data(&data).build()
            }
            _ => ControlBuilder::configure_reject(id).raw_data(&data).build(),
        };
        if let Ok(out) = fsm.receive(&packet) {
            for request in requests(&out) {
                for (opt_type, _) in options_of(&request) {
                    assert_ne!(
                        local_permit & (1 << opt_type),
                        0,
                        "round {}: requested unpermitted option {}",
                        round,
                        opt_type
                    );
                }
                last_request = request;
            }
        }
        if fsm.state() == FsmState::Closed {
            if let Some(request) = requests(&fsm.open()).pop() {
                last_request = request;
            }
        }

        let negotiation = fsm.negotiator();
        assert_eq!(
            negotiation.local().in_effect.negotiate() & !local_permit,
            0,
            "round {}",
            round
        );
        assert_eq!(
            negotiation.remote().in_effect.negotiate() & !remote_permit,
            0,
            "round {}",
            round
        );
    }
}

#[test]
fn test_magic_loopback_changes_magic() {
    let mut fsm = lcp_fsm("sl0", Mode::Active, magic_values(), 4);
    let first = requests(&start(&mut fsm)).remove(0);
    let first_magic = magic_in(&first);

    // The line is looped back: we hear our own request
    let out = fsm.receive(&first).unwrap();
    let nak = sent(&out)
        .into_iter()
        .find(|p| p[0] == codes::CONFIGURE_NAK)
        .expect("loopback is naked");
    assert_ne!(magic_in(&nak), first_magic);

    let resent = requests(&fsm.timeout()).remove(0);
    assert_ne!(magic_in(&resent), first_magic);
    assert_eq!(fsm.negotiator().policy().loopbacks(), 1);

    // Each further echo moves the magic number again
    let mut previous = magic_in(&resent);
    for _ in 0..4 {
        let request = requests(&fsm.timeout()).remove(0);
        fsm.receive(&request).unwrap();
        let next = requests(&fsm.timeout());
        if let Some(next) = next.first() {
            assert_ne!(magic_in(next), previous);
            previous = magic_in(next);
        }
    }
}

#[test]
fn test_rejected_option_never_requested_again() {
    let mut fsm = lcp_fsm(
        "sl0",
        Mode::Active,
        LcpValues {
            negotiate: bits::MRU | bits::ACFC | bits::PFC,
            mru: 1500,
            pfc: true,
            acfc: true,
            ..Default::default()
        },
        5,
    );
    let request = requests(&start(&mut fsm)).remove(0);
    assert!(has_option(&request, options::ACFC));
    let id = ControlPacket::parse(&request).unwrap().identifier();

    let mut reject = Vec::new();
    encode_option(&mut reject, options::ACFC, &[]);
    let out = fsm
        .receive(&ControlBuilder::configure_reject(id).raw_data(&reject).build())
        .unwrap();

    let mut later = requests(&out);
    let mut nak = Vec::new();
    encode_option(&mut nak, options::MRU, &1400u16.to_be_bytes());
    for _ in 0..3 {
        let id = ControlPacket::parse(later.last().unwrap()).unwrap().identifier();
        later.extend(requests(
            &fsm.receive(&ControlBuilder::configure_nak(id).raw_data(&nak).build())
                .unwrap(),
        ));
        later.extend(requests(&fsm.timeout()));
    }
    assert!(later.len() >= 4);
    for request in &later {
        assert!(!has_option(request, options::ACFC));
        assert!(has_option(request, options::PFC));
    }
    assert_eq!(fsm.negotiator().local().desired.negotiate & bits::ACFC, 0);

    // A new connection starts from the configured values again
    fsm.lower_down();
    let request = requests(&fsm.lower_up()).remove(0);
    assert!(has_option(&request, options::ACFC));
}

#[test]
fn test_passive_peer_completes_in_two_round_trips() {
    let mut a = lcp_fsm("a", Mode::Active, magic_values(), 6);
    let mut b = lcp_fsm("b", Mode::Passive, magic_values(), 7);
    assert!(sent(&start(&mut b)).is_empty());

    let initial = start(&mut a);
    let half_trips = exchange(&mut a, &mut b, initial);
    assert!(half_trips <= 4, "took {} deliveries", half_trips);
    assert!(a.is_opened());
    assert!(b.is_opened());
}
