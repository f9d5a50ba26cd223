//! ppplink - PPP link negotiation engine
//!
//! Brings up, authenticates and tears down a point-to-point serial link by
//! negotiating LCP, PAP and IPCP with a remote peer. Framing, the carrier
//! driver and header compression live outside this crate; the engine only
//! consumes deframed `(protocol, payload)` pairs and emits replies.

pub mod config;
pub mod engine;
pub mod error;
pub mod protocol;
pub mod telemetry;

pub use error::{Error, Result};
