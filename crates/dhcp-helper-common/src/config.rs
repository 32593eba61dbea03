//! Relay configuration: interface groups and their member interfaces.
//!
//! The configuration file is JSON and is shared with the relay loop, so
//! keys this crate does not know about are ignored:
//!
//! ```json
//! {
//!   "groups": [
//!     { "name": "lan", "interfaces": ["br0-port1", "eth1"] }
//!   ]
//! }
//! ```
//!
//! Interface names are resolved to kernel indices once, at load time.

use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

use crate::error::{HelperError, HelperResult};

/// Default location of the relay configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/dhcp-helper.json";

/// Linux limit on interface name length (IFNAMSIZ - 1).
const MAX_IFNAME_LEN: usize = 15;

/// A configured interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interface {
    /// Interface name as written in the configuration.
    pub name: String,
    /// Kernel interface index.
    pub ifindex: u32,
}

/// An ordered set of interfaces sharing relay policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceGroup {
    pub name: String,
    pub interfaces: Vec<Interface>,
}

/// Loaded relay configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RelayConfig {
    pub groups: Vec<InterfaceGroup>,
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    #[serde(default)]
    groups: Vec<RawGroup>,
}

#[derive(Debug, Deserialize)]
struct RawGroup {
    name: String,
    #[serde(default)]
    interfaces: Vec<String>,
}

impl RelayConfig {
    /// Reads and resolves the configuration at `path`.
    ///
    /// Interface names are resolved against the running kernel.
    pub fn load(path: impl AsRef<Path>) -> HelperResult<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path).map_err(|source| HelperError::ConfigIo {
            path: path.to_path_buf(),
            source,
        })?;

        let config = Self::from_json_with(&json, kernel_ifindex)?;
        info!(
            path = %path.display(),
            groups = config.groups.len(),
            interfaces = config.interface_count(),
            "Loaded relay configuration"
        );
        Ok(config)
    }

    /// Parses `json`, resolving interface names with `resolve`.
    pub fn from_json_with<F>(json: &str, resolve: F) -> HelperResult<Self>
    where
        F: Fn(&str) -> Option<u32>,
    {
        let raw: RawConfig = serde_json::from_str(json)
            .map_err(|e| HelperError::invalid_config("config", e.to_string()))?;

        let mut seen_groups = HashSet::new();
        let mut groups = Vec::with_capacity(raw.groups.len());

        for group in raw.groups {
            if group.name.is_empty() {
                return Err(HelperError::invalid_config("groups.name", "empty group name"));
            }
            if !seen_groups.insert(group.name.clone()) {
                return Err(HelperError::invalid_config(
                    "groups.name",
                    format!("duplicate group '{}'", group.name),
                ));
            }
            if group.interfaces.is_empty() {
                return Err(HelperError::invalid_config(
                    format!("groups.{}.interfaces", group.name),
                    "group has no interfaces",
                ));
            }

            let mut seen_ifaces = HashSet::new();
            let mut interfaces = Vec::with_capacity(group.interfaces.len());
            for name in group.interfaces {
                validate_ifname(&group.name, &name)?;
                if !seen_ifaces.insert(name.clone()) {
                    return Err(HelperError::invalid_config(
                        format!("groups.{}.interfaces", group.name),
                        format!("interface '{}' listed twice", name),
                    ));
                }
                let ifindex = resolve(&name).ok_or_else(|| {
                    HelperError::invalid_config(
                        format!("groups.{}.interfaces", group.name),
                        format!("interface '{}' does not exist", name),
                    )
                })?;
                debug!(group = %group.name, interface = %name, ifindex, "Resolved interface");
                interfaces.push(Interface { name, ifindex });
            }

            groups.push(InterfaceGroup {
                name: group.name,
                interfaces,
            });
        }

        Ok(Self { groups })
    }

    /// Total number of configured interfaces across all groups.
    pub fn interface_count(&self) -> usize {
        self.groups.iter().map(|g| g.interfaces.len()).sum()
    }
}

fn validate_ifname(group: &str, name: &str) -> HelperResult<()> {
    if name.is_empty() || name.len() > MAX_IFNAME_LEN {
        return Err(HelperError::invalid_config(
            format!("groups.{}.interfaces", group),
            format!("invalid interface name '{}'", name),
        ));
    }
    if name.chars().any(|c| c.is_whitespace() || c == '/' || c == '"') {
        return Err(HelperError::invalid_config(
            format!("groups.{}.interfaces", group),
            format!("invalid character in interface name '{}'", name),
        ));
    }
    Ok(())
}

/// Resolves an interface name against the running kernel.
pub fn kernel_ifindex(name: &str) -> Option<u32> {
    nix::net::if_::if_nametoindex(name).ok().filter(|idx| *idx != 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    fn fake_resolver(name: &str) -> Option<u32> {
        match name {
            "br0-port1" => Some(5),
            "eth1" => Some(6),
            "eth2" => Some(7),
            _ => None,
        }
    }

    #[test]
    fn test_parse_groups_in_order() {
        let json = r#"{
            "groups": [
                { "name": "lan", "interfaces": ["br0-port1", "eth1"] },
                { "name": "dmz", "interfaces": ["eth2"], "servers": ["192.0.2.1"] }
            ]
        }"#;

        let config = RelayConfig::from_json_with(json, fake_resolver).unwrap();
        assert_eq!(config.groups.len(), 2);
        assert_eq!(config.groups[0].name, "lan");
        assert_eq!(
            config.groups[0].interfaces,
            vec![
                Interface {
                    name: "br0-port1".to_string(),
                    ifindex: 5
                },
                Interface {
                    name: "eth1".to_string(),
                    ifindex: 6
                },
            ]
        );
        assert_eq!(config.interface_count(), 3);
    }

    #[test]
    fn test_empty_config() {
        let config = RelayConfig::from_json_with("{}", fake_resolver).unwrap();
        assert!(config.groups.is_empty());
    }

    #[test]
    fn test_unknown_interface() {
        let json = r#"{ "groups": [ { "name": "lan", "interfaces": ["wlan9"] } ] }"#;
        let err = RelayConfig::from_json_with(json, fake_resolver).unwrap_err();
        assert!(err.to_string().contains("'wlan9' does not exist"));
    }

    #[test]
    fn test_duplicate_group() {
        let json = r#"{ "groups": [
            { "name": "lan", "interfaces": ["eth1"] },
            { "name": "lan", "interfaces": ["eth2"] }
        ] }"#;
        assert!(matches!(
            RelayConfig::from_json_with(json, fake_resolver),
            Err(HelperError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn test_duplicate_interface_in_group() {
        let json = r#"{ "groups": [ { "name": "lan", "interfaces": ["eth1", "eth1"] } ] }"#;
        let err = RelayConfig::from_json_with(json, fake_resolver).unwrap_err();
        assert!(err.to_string().contains("listed twice"));
    }

    #[test]
    fn test_empty_group_rejected() {
        let json = r#"{ "groups": [ { "name": "lan", "interfaces": [] } ] }"#;
        assert!(RelayConfig::from_json_with(json, fake_resolver).is_err());
    }

    #[test]
    fn test_bad_interface_name() {
        let json = r#"{ "groups": [ { "name": "lan", "interfaces": ["a-very-long-interface-name"] } ] }"#;
        let err = RelayConfig::from_json_with(json, fake_resolver).unwrap_err();
        assert!(err.to_string().contains("invalid interface name"));
    }

    #[test]
    fn test_malformed_json() {
        let err = RelayConfig::from_json_with("{ groups: ", fake_resolver).unwrap_err();
        assert!(matches!(err, HelperError::InvalidConfig { .. }));
    }

    #[test]
    fn test_load_reads_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "groups": [ {{ "name": "lo", "interfaces": ["lo"] }} ] }}"#).unwrap();

        let config = RelayConfig::load(file.path()).unwrap();
        assert_eq!(config.groups[0].interfaces[0].name, "lo");
        assert!(config.groups[0].interfaces[0].ifindex > 0);
    }

    #[test]
    fn test_load_missing_file() {
        let err = RelayConfig::load("/nonexistent/dhcp-helper.json").unwrap_err();
        assert!(matches!(err, HelperError::ConfigIo { .. }));
    }
}
