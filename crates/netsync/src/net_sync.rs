//! NetSync - handle tying the relay's lifecycle hooks to one kernel backend

use parking_lot::Mutex;
use std::net::Ipv4Addr;
use tracing::{info, instrument, warn};

use dhcp_helper_common::{HelperError, HelperResult, InterfaceGroup};

use crate::effects::KernelEffects;
use crate::firewall::{self, FirewallReport, TeardownReport};
use crate::neighbor::{self, FdbOutcome};
use crate::topology::{self, BridgeMembership};
use crate::types::MacAddress;

/// Entry points for the relay: `apply_firewall` at startup or on
/// reconfiguration, the two neighbour hooks per new client, and
/// `remove_firewall` at shutdown.
///
/// Holds no topology state. The only lock serialises firewall
/// reconfiguration; the neighbour hooks can run from any number of threads.
pub struct NetSync<K> {
    kernel: K,
    reconfigure: Mutex<()>,
}

impl<K: KernelEffects> NetSync<K> {
    pub fn new(kernel: K) -> Self {
        Self {
            kernel,
            reconfigure: Mutex::new(()),
        }
    }

    /// The kernel backend
    pub fn kernel(&self) -> &K {
        &self.kernel
    }

    pub fn membership(&self, ifindex: u32) -> BridgeMembership {
        topology::membership(&self.kernel, ifindex)
    }

    pub fn is_bridged(&self, ifindex: u32) -> bool {
        topology::is_bridged(&self.kernel, ifindex)
    }

    /// Compiles and loads the DHCP drop rules for `groups`.
    ///
    /// Fails with [`HelperError::ReconfigureInProgress`] while another call
    /// is still running.
    #[instrument(skip_all)]
    pub fn apply_firewall(&self, groups: &[InterfaceGroup]) -> HelperResult<FirewallReport> {
        let Some(_guard) = self.reconfigure.try_lock() else {
            warn!("Firewall reconfiguration already running, rejecting");
            return Err(HelperError::ReconfigureInProgress);
        };

        let report = firewall::apply_firewall(&self.kernel, groups)?;
        info!(
            bridged = ?report.bridged_interfaces,
            applied = report.applied,
            "Firewall reconfigured"
        );
        Ok(report)
    }

    /// Deletes the DHCP drop chains. Safe to call when they do not exist.
    pub fn remove_firewall(&self) -> TeardownReport {
        firewall::remove_firewall(&self.kernel)
    }

    /// Per-client hook: pins `mac` to bridge port `ifindex`.
    pub fn add_forwarding_acceleration(
        &self,
        ifindex: u32,
        mac: MacAddress,
    ) -> HelperResult<FdbOutcome> {
        neighbor::add_forwarding_acceleration(&self.kernel, ifindex, mac)
    }

    /// Per-client hook: static ARP entry `ip -> mac` on `ifindex`.
    pub fn add_address_resolution_entry(
        &self,
        ifindex: u32,
        mac: MacAddress,
        ip: Ipv4Addr,
    ) -> HelperResult<()> {
        neighbor::add_address_resolution_entry(&self.kernel, ifindex, mac, ip)
    }
}
