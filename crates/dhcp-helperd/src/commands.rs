//! Subcommand bodies, generic over the kernel backend

use anyhow::{bail, Context, Result};
use std::net::Ipv4Addr;
use tracing::{error, info, warn};

use dhcp_helper_common::{HelperError, RelayConfig};
use dhcp_helper_netsync::{
    FdbOutcome, FirewallReport, KernelEffects, MacAddress, NetSync, TeardownReport,
};

/// Applies the firewall for `config`.
///
/// A rule tool failure is not an error: the relay still works, it just
/// sees looped broadcasts twice.
pub fn apply<K: KernelEffects>(sync: &NetSync<K>, config: &RelayConfig) -> Result<FirewallReport> {
    let report = sync
        .apply_firewall(&config.groups)
        .context("Failed to set up DHCP firewall")?;

    if !report.applied {
        warn!("DHCP firewall not installed, relayed broadcasts may be seen twice");
    }
    Ok(report)
}

/// Deletes the firewall chains, logging what could not be removed.
pub fn teardown<K: KernelEffects>(sync: &NetSync<K>) -> TeardownReport {
    let report = sync.remove_firewall();
    if report.is_clean() {
        info!(removed = ?report.removed, "DHCP firewall removed");
    } else {
        warn!(failed = ?report.failed, "Some DHCP firewall chains were not removed");
    }
    report
}

/// What [`add_client`] did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientReport {
    pub fdb: FdbOutcome,
    pub arp: bool,
}

/// Per-client hooks: FDB acceleration, then an ARP entry when `ip` is known.
///
/// The ARP entry is attempted even when the FDB entry was rejected; the
/// first failure is returned after both have been tried.
pub fn add_client<K: KernelEffects>(
    sync: &NetSync<K>,
    ifindex: u32,
    mac: MacAddress,
    ip: Option<Ipv4Addr>,
) -> Result<ClientReport> {
    if mac.is_zero() || mac.is_multicast() {
        bail!("Refusing to program non-unicast MAC {}", mac);
    }

    let fdb = sync.add_forwarding_acceleration(ifindex, mac);
    let arp = match ip {
        Some(ip) => Some(sync.add_address_resolution_entry(ifindex, mac, ip)),
        None => None,
    };

    let fdb = fdb.with_context(|| format!("Failed to add FDB entry for {}", mac))?;
    let arp = match arp {
        Some(result) => {
            result.with_context(|| format!("Failed to add ARP entry for {}", mac))?;
            true
        }
        None => false,
    };

    info!(ifindex, %mac, fdb = ?fdb, arp, "Client programmed");
    Ok(ClientReport { fdb, arp })
}

/// Applies `config`, treating a concurrent reconfiguration as a skipped
/// attempt rather than an error.
pub fn reload<K: KernelEffects>(sync: &NetSync<K>, config: &RelayConfig) -> Result<()> {
    match sync.apply_firewall(&config.groups) {
        Ok(report) => {
            info!(bridged = ?report.bridged_interfaces, applied = report.applied, "Reloaded");
            Ok(())
        }
        Err(HelperError::ReconfigureInProgress) => {
            warn!("Reconfiguration already running, reload skipped");
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Reload failed");
            Err(e).context("Failed to reload DHCP firewall")
        }
    }
}
