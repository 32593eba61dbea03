//! nftables rules suppressing looped DHCP traffic on bridge ports
//!
//! On a bridged deployment the relay sees a client broadcast twice: once
//! delivered locally and once more as a frame the bridge forwards. Two
//! chains in the `bridge filter` table drop UDP/67 arriving on configured
//! bridge ports:
//!
//! - `dhcpr-input` (hook input) drops all UDP/67 from the port;
//! - `dhcpr-forward` (hook forward) drops only broadcast UDP/67, so unicast
//!   DHCP traffic is still forwarded across the bridge.
//!
//! The script is written to a private, uniquely named temporary file, loaded
//! with a single `nft -f`, and the file is removed on every exit path.

use std::fmt;
use std::io::Write;
use tempfile::TempPath;
use tracing::{debug, error, info, instrument, warn};

use dhcp_helper_common::{HelperError, HelperResult, InterfaceGroup};

use crate::effects::KernelEffects;
use crate::topology;

/// nftables address family of the table
pub const NFT_FAMILY: &str = "bridge";

/// nftables table holding both chains
pub const NFT_TABLE: &str = "filter";

/// Chain hooked at bridge input
pub const INPUT_CHAIN: &str = "dhcpr-input";

/// Chain hooked at bridge forward
pub const FORWARD_CHAIN: &str = "dhcpr-forward";

/// Hook priority shared by both chains
pub const CHAIN_PRIORITY: i32 = -200;

/// DHCP server port
pub const DHCP_SERVER_PORT: u16 = 67;

const RULE_FILE_PREFIX: &str = "dhcp-helper.";

/// Rules compiled from the bridged interfaces of the configuration
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FirewallRuleSet {
    bridged: Vec<String>,
}

impl FirewallRuleSet {
    /// Builds a rule set for the given interface names.
    pub fn for_interfaces<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            bridged: names.into_iter().map(Into::into).collect(),
        }
    }

    /// Queries every configured interface and keeps the bridged ones, in
    /// configuration order. Interfaces whose name no longer resolves are
    /// skipped.
    pub fn compile<K: KernelEffects + ?Sized>(kernel: &K, groups: &[InterfaceGroup]) -> Self {
        let mut bridged = Vec::new();

        for group in groups {
            for iface in &group.interfaces {
                if !topology::is_bridged(kernel, iface.ifindex) {
                    debug!(
                        group = %group.name,
                        interface = %iface.name,
                        ifindex = iface.ifindex,
                        "Interface not bridged, no nftables rules"
                    );
                    continue;
                }

                match kernel.interface_name(iface.ifindex) {
                    Ok(name) => {
                        debug!(interface = %name, "Interface is bridged, setting up nftables");
                        bridged.push(name);
                    }
                    Err(e) => {
                        debug!(ifindex = iface.ifindex, error = %e, "Bridged interface vanished, skipping");
                    }
                }
            }
        }

        Self { bridged }
    }

    /// Names of the interfaces that get drop rules
    pub fn bridged_interfaces(&self) -> &[String] {
        &self.bridged
    }

    /// Rule statements for the input chain
    pub fn input_rules(&self) -> Vec<String> {
        self.bridged
            .iter()
            .map(|name| {
                format!(
                    "iif \"{}\" ip protocol udp udp dport {} drop",
                    name, DHCP_SERVER_PORT
                )
            })
            .collect()
    }

    /// Rule statements for the forward chain
    pub fn forward_rules(&self) -> Vec<String> {
        self.bridged
            .iter()
            .map(|name| {
                format!(
                    "pkttype broadcast iif \"{}\" ip protocol udp udp dport {} drop",
                    name, DHCP_SERVER_PORT
                )
            })
            .collect()
    }

    /// The complete `nft -f` script.
    pub fn render(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for FirewallRuleSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "table {} {} {{", NFT_FAMILY, NFT_TABLE)?;
        write_chain(f, INPUT_CHAIN, "input", &self.input_rules())?;
        write_chain(f, FORWARD_CHAIN, "forward", &self.forward_rules())?;
        writeln!(f, "}}")
    }
}

fn write_chain(f: &mut fmt::Formatter<'_>, chain: &str, hook: &str, rules: &[String]) -> fmt::Result {
    writeln!(f, "\tchain {} {{", chain)?;
    writeln!(f, "\t\ttype filter hook {} priority {};", hook, CHAIN_PRIORITY)?;
    for rule in rules {
        writeln!(f, "\t\t{}", rule)?;
    }
    writeln!(f, "\t}}")
}

/// Outcome of [`apply_firewall`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirewallReport {
    /// Interfaces that received drop rules
    pub bridged_interfaces: Vec<String>,
    /// Whether `nft` accepted the script
    pub applied: bool,
}

/// Outcome of [`remove_firewall`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TeardownReport {
    pub removed: Vec<&'static str>,
    pub failed: Vec<&'static str>,
}

impl TeardownReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Writes `script` to a fresh `dhcp-helper.XXXXXX` file in the temp dir.
///
/// The file is created 0600 and closed on return; dropping the returned
/// path deletes it.
fn write_rule_file(script: &str) -> HelperResult<TempPath> {
    let mut file = tempfile::Builder::new()
        .prefix(RULE_FILE_PREFIX)
        .rand_bytes(6)
        .tempfile()
        .map_err(|source| HelperError::TempFile { source })?;

    file.write_all(script.as_bytes())
        .and_then(|()| file.flush())
        .map_err(|source| HelperError::TempFile { source })?;

    Ok(file.into_temp_path())
}

/// Generates and loads the DHCP drop rules for `groups`.
///
/// Only a failure to create the rule file is returned as an error. An `nft`
/// failure is logged and reported through [`FirewallReport::applied`]; the
/// relay keeps running without suppression in that case.
#[instrument(skip_all, fields(groups = groups.len()))]
pub fn apply_firewall<K: KernelEffects + ?Sized>(
    kernel: &K,
    groups: &[InterfaceGroup],
) -> HelperResult<FirewallReport> {
    let rules = FirewallRuleSet::compile(kernel, groups);
    let rule_file = write_rule_file(&rules.render())?;

    let applied = match kernel.load_rules(&rule_file) {
        Ok(()) => {
            info!(
                bridged = rules.bridged_interfaces().len(),
                "Applied nftables rules"
            );
            true
        }
        Err(e) => {
            error!(error = %e, "Failed applying nftables rules");
            false
        }
    };

    if let Err(e) = rule_file.close() {
        warn!(error = %e, "Failed removing nftables rule file");
    }

    Ok(FirewallReport {
        bridged_interfaces: rules.bridged,
        applied,
    })
}

/// Deletes both chains. Each deletion is attempted regardless of the other
/// and of whether the chains exist; failures are logged only.
#[instrument(skip_all)]
pub fn remove_firewall<K: KernelEffects + ?Sized>(kernel: &K) -> TeardownReport {
    let mut report = TeardownReport::default();

    for (chain, what) in [(INPUT_CHAIN, "input"), (FORWARD_CHAIN, "forward")] {
        match kernel.delete_chain(NFT_FAMILY, NFT_TABLE, chain) {
            Ok(()) => {
                debug!(chain, "Deleted nftables chain");
                report.removed.push(chain);
            }
            Err(e) => {
                error!(chain, error = %e, "Failed deleting nftables {} rules", what);
                report.failed.push(chain);
            }
        }
    }

    report
}
