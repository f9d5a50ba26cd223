//! Configuration types

use crate::engine::fsm::{FsmSettings, Mode, RetryLimits};
use crate::engine::ipcp::{self, IpcpValues};
use crate::engine::lcp::{self, LcpValues};
use crate::engine::pap::{Identity, StaticCredentials};
use crate::protocol::ipcp::{DEFAULT_SLOTS, VJ_COMPRESSION};
use crate::protocol::lcp::auth;
use crate::telemetry::LogConfig;
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use std::time::Duration;

/// Link configuration file
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub link: LinkSection,
    #[serde(default)]
    pub log: LogConfig,
    #[serde(default)]
    pub lcp: LcpConfig,
    #[serde(default)]
    pub pap: PapConfig,
    #[serde(default)]
    pub ipcp: IpcpConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct LinkSection {
    pub name: String,
}

impl Default for LinkSection {
    fn default() -> Self {
        Self {
            name: "ppp0".to_string(),
        }
    }
}

/// Timer and retry settings shared by LCP and IPCP, the `fsm` table of
/// their sections
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct FsmConfig {
    pub mode: Mode,
    pub timeout_secs: u64,
    pub max_configure: u8,
    pub max_nak: u8,
    pub max_terminate: u8,
}

impl Default for FsmConfig {
    fn default() -> Self {
        let limits = RetryLimits::default();
        Self {
            mode: Mode::Active,
            timeout_secs: 3,
            max_configure: limits.max_configure,
            max_nak: limits.max_nak,
            max_terminate: limits.max_terminate,
        }
    }
}

impl FsmConfig {
    pub fn settings(&self) -> FsmSettings {
        FsmSettings {
            mode: self.mode,
            timeout: Duration::from_secs(self.timeout_secs),
            limits: RetryLimits {
                max_configure: self.max_configure,
                max_nak: self.max_nak,
                max_terminate: self.max_terminate,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthProtocol {
    Pap,
}

/// LCP options that can appear in a `permit` list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LcpOption {
    Mru,
    Accm,
    Auth,
    Magic,
    Pfc,
    Acfc,
}

impl LcpOption {
    pub fn bit(self) -> u16 {
        match self {
            LcpOption::Mru => lcp::bits::MRU,
            LcpOption::Accm => lcp::bits::ACCM,
            LcpOption::Auth => lcp::bits::AUTH,
            LcpOption::Magic => lcp::bits::MAGIC,
            LcpOption::Pfc => lcp::bits::PFC,
            LcpOption::Acfc => lcp::bits::ACFC,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IpcpOption {
    Address,
    Compression,
}

impl IpcpOption {
    pub fn bit(self) -> u16 {
        match self {
            IpcpOption::Address => ipcp::bits::ADDRESS,
            IpcpOption::Compression => ipcp::bits::COMPRESSION,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    Vj,
}

fn permit_mask<T: Copy>(permit: &Option<Vec<T>>, all: u16, bit: impl Fn(T) -> u16) -> u16 {
    match permit {
        Some(list) => list.iter().fold(0, |mask, &opt| mask | bit(opt)),
        None => all,
    }
}

/// Desired LCP values for one direction
///
/// `[lcp.local]` is what we ask for; `[lcp.remote]` is what we suggest to
/// the peer and which options it may ask for.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct LcpSideConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mru: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accm: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth: Option<AuthProtocol>,
    pub magic: bool,
    pub pfc: bool,
    pub acfc: bool,
    /// Options allowed at all; every option when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub permit: Option<Vec<LcpOption>>,
}

impl LcpSideConfig {
    pub fn values(&self) -> LcpValues {
        let mut values = LcpValues::default();
        if let Some(mru) = self.mru {
            values.negotiate |= lcp::bits::MRU;
            values.mru = mru;
        }
        if let Some(accm) = self.accm {
            values.negotiate |= lcp::bits::ACCM;
            values.accm = accm;
        }
        if let Some(AuthProtocol::Pap) = self.auth {
            values.negotiate |= lcp::bits::AUTH;
            values.authentication = auth::PAP;
        }
        if self.magic {
            values.negotiate |= lcp::bits::MAGIC;
        }
        if self.pfc {
            values.negotiate |= lcp::bits::PFC;
            values.pfc = true;
        }
        if self.acfc {
            values.negotiate |= lcp::bits::ACFC;
            values.acfc = true;
        }
        values
    }

    pub fn permitted(&self) -> u16 {
        permit_mask(&self.permit, lcp::bits::ALL, LcpOption::bit)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct LcpConfig {
    pub fsm: FsmConfig,
    pub local: LcpSideConfig,
    pub remote: LcpSideConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct IpcpConfig {
    pub fsm: FsmConfig,
    /// Our address; asked from the peer when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_address: Option<Ipv4Addr>,
    /// Address assigned to the peer
    #[serde(skip_serializing_if = "Option::is_none")]
    pub peer_address: Option<Ipv4Addr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compression: Option<Compression>,
    pub slots: u16,
    pub slot_compress: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub permit: Option<Vec<IpcpOption>>,
}

impl Default for IpcpConfig {
    fn default() -> Self {
        Self {
            fsm: FsmConfig::default(),
            local_address: None,
            peer_address: None,
            compression: None,
            slots: DEFAULT_SLOTS,
            slot_compress: false,
            permit: None,
        }
    }
}

impl IpcpConfig {
    fn compression_values(&self, values: &mut IpcpValues) {
        if let Some(Compression::Vj) = self.compression {
            values.compression = VJ_COMPRESSION;
            values.slots = self.slots;
            values.slot_compress = self.slot_compress;
        }
    }

    pub fn local_values(&self) -> IpcpValues {
        let mut values = IpcpValues {
            negotiate: ipcp::bits::ADDRESS,
            address: self.local_address.unwrap_or(Ipv4Addr::UNSPECIFIED),
            ..Default::default()
        };
        if self.compression.is_some() {
            values.negotiate |= ipcp::bits::COMPRESSION;
        }
        self.compression_values(&mut values);
        values
    }

    pub fn remote_values(&self) -> IpcpValues {
        let mut values = IpcpValues {
            address: self.peer_address.unwrap_or(Ipv4Addr::UNSPECIFIED),
            slots: self.slots,
            ..Default::default()
        };
        self.compression_values(&mut values);
        values
    }

    pub fn permitted(&self) -> u16 {
        permit_mask(&self.permit, ipcp::bits::ALL, IpcpOption::bit)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PapUser {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct PapConfig {
    /// Our peer-id, sent when the peer asks us to authenticate
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    pub timeout_secs: u64,
    pub max_attempts: u8,
    /// Accepted peer credentials
    pub users: Vec<PapUser>,
}

impl Default for PapConfig {
    fn default() -> Self {
        Self {
            username: None,
            password: None,
            timeout_secs: 3,
            max_attempts: RetryLimits::default().max_configure,
            users: Vec::new(),
        }
    }
}

impl PapConfig {
    pub fn identity(&self) -> Option<Identity> {
        let peer_id = self.username.clone()?;
        Some(Identity {
            peer_id,
            password: self.password.clone().unwrap_or_default(),
        })
    }

    pub fn validator(&self) -> StaticCredentials {
        StaticCredentials::new(
            self.users
                .iter()
                .map(|u| (u.username.clone(), u.password.clone()))
                .collect(),
        )
    }

    pub fn settings(&self) -> FsmSettings {
        FsmSettings {
            mode: Mode::Active,
            timeout: Duration::from_secs(self.timeout_secs),
            limits: RetryLimits {
                max_configure: self.max_attempts,
                ..Default::default()
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.link.name, "ppp0");
        assert_eq!(config.lcp.fsm.max_configure, 10);
        assert_eq!(config.lcp.fsm.max_nak, 5);
        assert_eq!(config.lcp.fsm.timeout_secs, 3);
        assert_eq!(config.ipcp.slots, 16);
        assert_eq!(config.lcp.local.permitted(), lcp::bits::ALL);
    }

    #[test]
    fn test_full_config() {
        let toml_str = r#"
[link]
name = "sl0"

[log]
level = "debug"
format = "compact"

[lcp.fsm]
mode = "passive"
timeout_secs = 5
max_configure = 4

[lcp.local]
mru = 1500
accm = 0
magic = true
auth = "pap"

[lcp.remote]
permit = ["mru", "magic"]

[pap]
username = "alice"
password = "secret"

[[pap.users]]
username = "bob"
password = "hunter2"

[ipcp]
local_address = "10.0.0.1"
peer_address = "10.0.0.2"
compression = "vj"
slots = 8
slot_compress = true
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.link.name, "sl0");
        assert_eq!(config.lcp.fsm.mode, Mode::Passive);
        assert_eq!(config.lcp.fsm.settings().timeout, Duration::from_secs(5));
        assert_eq!(config.lcp.fsm.max_configure, 4);

        let local = config.lcp.local.values();
        assert_eq!(
            local.negotiate,
            lcp::bits::MRU | lcp::bits::ACCM | lcp::bits::MAGIC | lcp::bits::AUTH
        );
        assert_eq!(local.accm, 0);
        assert_eq!(local.authentication, auth::PAP);
        assert_eq!(
            config.lcp.remote.permitted(),
            lcp::bits::MRU | lcp::bits::MAGIC
        );

        assert_eq!(config.pap.identity().unwrap().peer_id, "alice");
        assert_eq!(config.pap.users.len(), 1);

        let ipcp_local = config.ipcp.local_values();
        assert_eq!(ipcp_local.address, Ipv4Addr::new(10, 0, 0, 1));
        assert_eq!(ipcp_local.compression, VJ_COMPRESSION);
        assert_eq!(ipcp_local.slots, 8);
        assert!(ipcp_local.is_negotiated(ipcp::bits::COMPRESSION));
        assert_eq!(config.ipcp.remote_values().address, Ipv4Addr::new(10, 0, 0, 2));
    }

    #[test]
    fn test_unknown_section_rejected() {
        assert!(toml::from_str::<Config>("[chap]\nsecret = 1").is_err());
    }

    #[test]
    fn test_misspelled_fsm_key_rejected() {
        assert!(toml::from_str::<Config>("[lcp.fsm]\nmax_configur = 3").is_err());
        assert!(toml::from_str::<Config>("[ipcp.fsm]\ntimeout = 3").is_err());
        assert!(toml::from_str::<Config>("[lcp]\nmax_configure = 3").is_err());
        assert!(toml::from_str::<Config>("[ipcp]\nslot = 3").is_err());
    }

    #[test]
    fn test_missing_local_address_requests_assignment() {
        let config = IpcpConfig::default();
        let values = config.local_values();
        assert!(values.address.is_unspecified());
        assert!(values.is_negotiated(ipcp::bits::ADDRESS));
        assert!(!values.is_negotiated(ipcp::bits::COMPRESSION));
    }
}
