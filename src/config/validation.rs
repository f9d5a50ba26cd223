//! Configuration validation

use super::{Compression, Config, FsmConfig};
use crate::protocol::ipcp::{MAX_SLOTS, MIN_SLOTS};
use crate::protocol::lcp::{MAX_MRU, MIN_MRU};

#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self {
            warnings: Vec::new(),
            errors: Vec::new(),
        }
    }

    pub fn warn(&mut self, msg: impl Into<String>) {
        self.warnings.push(msg.into());
    }

    pub fn error(&mut self, msg: impl Into<String>) {
        self.errors.push(msg.into());
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn print_diagnostics(&self) {
        for warning in &self.warnings {
            println!("[WARN] {}", warning);
        }
        for error in &self.errors {
            println!("[ERROR] {}", error);
        }
    }
}

impl Default for ValidationResult {
    fn default() -> Self {
        Self::new()
    }
}

/// Validate configuration and return warnings/errors
pub fn validate(config: &Config) -> ValidationResult {
    let mut result = ValidationResult::new();

    if config.link.name.trim().is_empty() {
        result.error("link.name: must not be empty");
    }
    if config.log.parsed_level().is_none() {
        result.warn(format!(
            "log.level: unknown level '{}', using info",
            config.log.level
        ));
    }

    validate_fsm("lcp.fsm", &config.lcp.fsm, &mut result);
    validate_fsm("ipcp.fsm", &config.ipcp.fsm, &mut result);
    validate_lcp(config, &mut result);
    validate_pap(config, &mut result);
    validate_ipcp(config, &mut result);

    result
}

fn validate_fsm(section: &str, fsm: &FsmConfig, result: &mut ValidationResult) {
    if fsm.timeout_secs == 0 {
        result.error(format!("{}.timeout_secs: must be greater than 0", section));
    }
    for (name, value) in [
        ("max_configure", fsm.max_configure),
        ("max_nak", fsm.max_nak),
        ("max_terminate", fsm.max_terminate),
    ] {
        if value == 0 {
            result.error(format!("{}.{}: must be greater than 0", section, name));
        }
    }
}

fn validate_lcp(config: &Config, result: &mut ValidationResult) {
    for (side, cfg) in [("local", &config.lcp.local), ("remote", &config.lcp.remote)] {
        if let Some(mru) = cfg.mru {
            if !(MIN_MRU..=MAX_MRU).contains(&mru) {
                result.error(format!(
                    "lcp.{}.mru: {} outside {}..={}",
                    side, mru, MIN_MRU, MAX_MRU
                ));
            }
        }

        let desired = cfg.values().negotiate;
        let not_permitted = desired & !cfg.permitted();
        if not_permitted != 0 {
            result.warn(format!(
                "lcp.{}: options set but not in permit list will never be negotiated",
                side
            ));
        }
    }

    if config.lcp.remote.auth.is_some() {
        result.warn("lcp.remote.auth: ignored, the peer chooses what it asks for");
    }
}

fn validate_pap(config: &Config, result: &mut ValidationResult) {
    let pap = &config.pap;

    if config.lcp.local.auth.is_some() && pap.users.is_empty() {
        result.error("lcp.local.auth: peer must authenticate but pap.users is empty");
    }
    if pap.username.is_some() && pap.password.is_none() {
        result.error("pap.password: required when pap.username is set");
    }
    if pap.username.is_none() && config.lcp.remote.permitted() & crate::engine::lcp::bits::AUTH != 0
    {
        result.warn("pap.username: not set, authentication requested by the peer will fail");
    }
    if pap.timeout_secs == 0 {
        result.error("pap.timeout_secs: must be greater than 0");
    }
    if pap.max_attempts == 0 {
        result.error("pap.max_attempts: must be greater than 0");
    }
    for (i, user) in pap.users.iter().enumerate() {
        if user.username.len() > u8::MAX as usize || user.password.len() > u8::MAX as usize {
            result.error(format!("pap.users[{}]: fields longer than 255 bytes", i));
        }
    }
}

fn validate_ipcp(config: &Config, result: &mut ValidationResult) {
    let ipcp = &config.ipcp;

    if let Some(Compression::Vj) = ipcp.compression {
        if !(MIN_SLOTS..=MAX_SLOTS).contains(&ipcp.slots) {
            result.error(format!(
                "ipcp.slots: {} outside {}..={} with compression enabled",
                ipcp.slots, MIN_SLOTS, MAX_SLOTS
            ));
        }
    }

    match (ipcp.local_address, ipcp.peer_address) {
        (Some(local), Some(peer)) if local == peer => {
            result.error(format!(
                "ipcp: local_address and peer_address are both {}",
                local
            ));
        }
        (None, _) => {
            result.warn("ipcp.local_address: not set, the peer must assign one");
        }
        _ => {}
    }

    for addr in [ipcp.local_address, ipcp.peer_address].into_iter().flatten() {
        if addr.is_unspecified() || addr.is_broadcast() || addr.is_multicast() {
            result.error(format!("ipcp: {} is not a usable host address", addr));
        }
    }
}
