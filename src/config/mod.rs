//! Configuration management
//!
//! A link is described by one TOML file: `[link]`, `[log]`, `[lcp]`,
//! `[pap]` and `[ipcp]` sections, every one optional. Timer and retry
//! settings of LCP and IPCP sit in their own `[lcp.fsm]` and `[ipcp.fsm]`
//! tables.

mod types;
mod validation;

pub use types::*;
pub use validation::{validate, ValidationResult};

use crate::engine::fsm::Mode;
use crate::{Error, Result};
use std::path::Path;

/// Load configuration from a TOML file
pub fn load<P: AsRef<Path>>(path: P) -> Result<Config> {
    let content = std::fs::read_to_string(path).map_err(Error::Io)?;
    parse(&content)
}

/// Parse configuration from TOML text
pub fn parse(content: &str) -> Result<Config> {
    toml::from_str(content).map_err(|e| Error::Config(e.to_string()))
}

/// Render configuration back to TOML
pub fn to_toml(config: &Config) -> Result<String> {
    toml::to_string_pretty(config).map_err(|e| Error::Config(e.to_string()))
}

/// The usual settings for a fast serial link: no escaping, loop
/// detection, both framing compressions and VJ header compression
pub fn apply_quick(config: &mut Config) {
    let local = &mut config.lcp.local;
    local.accm = Some(0);
    local.magic = true;
    local.pfc = true;
    local.acfc = true;

    let ipcp = &mut config.ipcp;
    ipcp.compression = Some(Compression::Vj);
    ipcp.slots = crate::protocol::ipcp::MAX_SLOTS;
    ipcp.slot_compress = true;
    ipcp.fsm.mode = Mode::Active;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::lcp::bits;

    #[test]
    fn test_parse_error_is_config_error() {
        let err = parse("[lcp\n").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_apply_quick() {
        let mut config = Config::default();
        config.ipcp.fsm.mode = Mode::Passive;
        apply_quick(&mut config);

        let values = config.lcp.local.values();
        assert_eq!(
            values.negotiate,
            bits::ACCM | bits::MAGIC | bits::PFC | bits::ACFC
        );
        assert_eq!(values.accm, 0);
        assert_eq!(config.ipcp.compression, Some(Compression::Vj));
        assert_eq!(config.ipcp.slots, 16);
        assert!(config.ipcp.slot_compress);
        assert_eq!(config.ipcp.fsm.mode, Mode::Active);
    }

    #[test]
    fn test_show_round_trips() {
        let mut config = Config::default();
        apply_quick(&mut config);
        let text = to_toml(&config).unwrap();
        let parsed = parse(&text).unwrap();
        assert_eq!(parsed.lcp, config.lcp);
        assert_eq!(parsed.ipcp, config.ipcp);
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let err = load("/nonexistent/ppplink.toml").unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }
}
