//! Wire codecs for the PPP control protocols
//!
//! Stateless parsing and building only. The negotiation state lives in
//! [`crate::engine`].

pub mod control;
pub mod ipcp;
pub mod lcp;
pub mod pap;
pub mod ppp;

pub use control::{ConfigOption, ControlBuilder, ControlPacket, CONTROL_HEADER_SIZE};
pub use ppp::{PppBuilder, PppFrame};
