//! Read-only status display
//!
//! Renders a link's phase, counters and, per negotiated protocol, the values
//! in effect on each side. Each option carries a drift mark comparing what
//! is in effect with what is desired and permitted:
//!
//! - `*` the option is not permitted
//! - `+` in effect although not desired
//! - `-` desired but not in effect

use super::fsm::Fsm;
use super::ipcp::IpcpValues;
use super::lcp::LcpValues;
use super::link::{Link, ProtocolKind};
use super::negotiate::{option_bit, Negotiation, OptionPolicy, OptionSide, OptionValues};
use super::pap::PapState;
use crate::protocol::{ipcp, lcp};
use std::fmt::Write;

/// Human-readable value of one option
pub trait OptionDisplay {
    fn describe(&self, opt_type: u8) -> String;
}

impl OptionDisplay for LcpValues {
    fn describe(&self, opt_type: u8) -> String {
        match opt_type {
            lcp::options::MRU => self.mru.to_string(),
            lcp::options::ACCM => format!("0x{:08x}", self.accm),
            lcp::options::AUTH_PROTOCOL => match self.authentication {
                0 => "none".to_string(),
                lcp::auth::PAP => "PAP".to_string(),
                other => format!("0x{:04x}", other),
            },
            lcp::options::MAGIC_NUMBER => format!("0x{:08x}", self.magic_number),
            lcp::options::PFC => on_off(self.pfc),
            lcp::options::ACFC => on_off(self.acfc),
            _ => String::new(),
        }
    }
}

impl OptionDisplay for IpcpValues {
    fn describe(&self, opt_type: u8) -> String {
        match opt_type {
            ipcp::options::IP_ADDRESS => self.address.to_string(),
            ipcp::options::IP_COMPRESSION if self.compression == ipcp::VJ_COMPRESSION => {
                format!(
                    "VJ, {} slots{}",
                    self.slots,
                    if self.slot_compress {
                        ", slot compression"
                    } else {
                        ""
                    }
                )
            }
            ipcp::options::IP_COMPRESSION if self.compression == 0 => "none".to_string(),
            ipcp::options::IP_COMPRESSION => format!("0x{:04x}", self.compression),
            _ => String::new(),
        }
    }
}

fn on_off(flag: bool) -> String {
    String::from(if flag { "on" } else { "off" })
}

/// Drift mark for one option on one side
pub fn spot<V: OptionValues>(opt_type: u8, side: &OptionSide<V>) -> char {
    let bit = option_bit(opt_type);
    if side.permitted & bit == 0 {
        return '*';
    }
    let in_effect = side.in_effect.negotiate() & bit != 0;
    let desired = side.desired.negotiate() & bit != 0;
    match (in_effect, desired) {
        (true, false) => '+',
        (false, true) => '-',
        _ => ' ',
    }
}

fn render_side<P>(out: &mut String, label: &str, side: &OptionSide<P::Values>)
where
    P: OptionPolicy,
    P::Values: OptionDisplay,
{
    let _ = writeln!(out, "    {}:", label);
    for &opt_type in P::OPTIONS {
        let _ = writeln!(
            out,
            "     {}{:<16} {}",
            spot(opt_type, side),
            P::option_name(opt_type),
            side.in_effect.describe(opt_type)
        );
    }
}

/// Render one LCP or IPCP machine
pub fn render_fsm<P>(out: &mut String, fsm: &Fsm<Negotiation<P>>)
where
    P: OptionPolicy,
    P::Values: OptionDisplay,
{
    let limits = fsm.limits();
    let counters = fsm.counters();
    let _ = writeln!(out, "  {}: {}", P::NAME, fsm.state().description());
    let _ = writeln!(
        out,
        "    mode {:?}, timeout {}s, tries {}/{} nak {}/{} terminate {}/{}",
        fsm.mode(),
        fsm.timer().interval().as_secs(),
        counters.configure,
        limits.max_configure,
        counters.nak,
        limits.max_nak,
        counters.terminate,
        limits.max_terminate
    );
    if let Some(reason) = fsm.close_reason() {
        let _ = writeln!(out, "    last closed: {}", reason);
    }
    let negotiation = fsm.negotiator();
    render_side::<P>(out, "local", negotiation.local());
    render_side::<P>(out, "remote", negotiation.remote());
}

/// Full status of a link
pub fn render(link: &Link) -> String {
    let mut out = String::new();
    let _ = write!(out, "{}: phase {}", link.name(), link.phase());
    match link.up_since() {
        Some(since) => {
            let since = since.format("%Y-%m-%d %H:%M:%S UTC");
            let _ = writeln!(out, ", network up since {}", since);
        }
        None => {
            let _ = writeln!(out);
        }
    }

    let stats = link.stats();
    for kind in ProtocolKind::ALL {
        let s = stats.protocol(kind);
        let _ = writeln!(
            out,
            "  {:<5} rx {} ({} bytes, {} dropped)  tx {} ({} bytes)",
            kind.name(),
            s.rx_packets.get(),
            s.rx_bytes.get(),
            s.rx_dropped.get(),
            s.tx_packets.get(),
            s.tx_bytes.get()
        );
    }
    let _ = writeln!(
        out,
        "  unknown protocols {}, malformed {}, loopbacks {}",
        stats.rx_unknown.get(),
        stats.rx_malformed.get(),
        stats.loopbacks_detected.get()
    );

    render_fsm(&mut out, link.lcp());

    let pap = link.pap();
    let _ = write!(out, "  PAP: {}", pap.state());
    if matches!(
        pap.state(),
        PapState::SendingCredentials | PapState::AwaitingPeerCredentials
    ) {
        let _ = write!(out, " ({} retries left)", pap.attempts_remaining());
    }
    if pap.message().is_empty() {
        let _ = writeln!(out);
    } else {
        let _ = writeln!(out, " \"{}\"", pap.message());
    }

    render_fsm(&mut out, link.ipcp());
    out
}
