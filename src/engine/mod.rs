//! Negotiation engine
//!
//! [`fsm`] is the protocol-independent state machine, [`negotiate`] the
//! shared option algorithm, and [`lcp`], [`ipcp`] and [`pap`] the protocol
//! specializations. [`link`] ties one of each together.

pub mod fsm;
pub mod ipcp;
pub mod lcp;
pub mod link;
pub mod negotiate;
pub mod pap;
pub mod status;
pub mod timer;

pub use fsm::{CloseReason, Fsm, FsmOutput, FsmSettings, FsmState, Mode, RetryLimits};
pub use ipcp::{IpcpFsm, IpcpValues, NetworkParams, VjParams};
pub use lcp::{LcpFsm, LcpPolicy, LcpValues};
pub use link::{Link, LinkAction, Phase, ProtocolKind};
pub use negotiate::{Negotiation, Negotiator, OptionSide};
pub use pap::{CredentialValidator, Identity, Pap, PapState, StaticCredentials};
pub use timer::Timer;
