//! Per-client neighbour programming: bridge FDB and static ARP entries
//!
//! If there is a switch core under the bridge it may implement DHCP
//! snooping, and then it will most likely not learn the client MAC by
//! itself. Adding the FDB entry on the bridge gets it offloaded to the
//! switch.

use std::net::Ipv4Addr;
use tracing::{debug, error, instrument, warn};

use dhcp_helper_common::HelperResult;

use crate::effects::KernelEffects;
use crate::topology::{self, BridgeMembership};
use crate::types::{ArpRecord, FdbRecord, MacAddress};

/// Result of [`add_forwarding_acceleration`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FdbOutcome {
    /// The FDB entry was created or refreshed
    Installed,
    /// The interface is not a bridge port; nothing was sent
    Skipped,
}

/// Pins `mac` to bridge port `ifindex` in the bridge FDB.
///
/// Returns [`FdbOutcome::Skipped`] without touching the kernel when
/// `ifindex` is not (or no longer) a bridge port, or its links cannot be
/// resolved. A route socket that cannot be opened and a kernel rejection are
/// returned as is; nothing is retried.
#[instrument(skip(kernel, mac), fields(mac = %mac))]
pub fn add_forwarding_acceleration<K: KernelEffects + ?Sized>(
    kernel: &K,
    ifindex: u32,
    mac: MacAddress,
) -> HelperResult<FdbOutcome> {
    let membership = topology::try_membership(kernel, ifindex).map_err(|e| {
        error!(ifindex, error = %e, "Cannot query bridge membership");
        e
    })?;

    let bridge = match membership {
        BridgeMembership::Bridged { bridge } => bridge,
        other => {
            debug!(ifindex, membership = ?other, "Interface is not bridged, skipping FDB entry");
            return Ok(FdbOutcome::Skipped);
        }
    };

    let record = FdbRecord::bridge_port(ifindex, mac);
    debug!(ifindex, bridge, "Adding MAC in bridge FDB");

    if let Err(e) = kernel.create_neighbor(&record) {
        error!(ifindex, error = %e, "Failed adding bridge FDB entry");
        return Err(e);
    }

    Ok(FdbOutcome::Installed)
}

/// Installs a static ARP entry `ip -> mac` on interface `ifindex`.
///
/// Works on any interface type; bridge membership is not consulted.
#[instrument(skip(kernel, mac, ip), fields(mac = %mac, ip = %ip))]
pub fn add_address_resolution_entry<K: KernelEffects + ?Sized>(
    kernel: &K,
    ifindex: u32,
    mac: MacAddress,
    ip: Ipv4Addr,
) -> HelperResult<()> {
    let ifname = kernel.interface_name(ifindex).map_err(|e| {
        warn!(ifindex, error = %e, "Cannot resolve interface for ARP entry");
        e
    })?;

    debug!(interface = %ifname, "Add arp entry");

    let record = ArpRecord {
        ifindex,
        ifname,
        ip,
        mac,
    };

    if let Err(e) = kernel.set_arp_entry(&record) {
        warn!(interface = %record.ifname, error = %e, "Failed adding arp entry");
        return Err(e);
    }

    debug!(interface = %record.ifname, "ARP cache entry successfully added");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::FakeKernel;
    use dhcp_helper_common::HelperError;

    const CLIENT_MAC: MacAddress = MacAddress::new([0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff]);

    #[test]
    fn test_fdb_skipped_when_not_bridged() {
        let kernel = FakeKernel::new().with_link(5, "eth1");
        let outcome = add_forwarding_acceleration(&kernel, 5, CLIENT_MAC).unwrap();
        assert_eq!(outcome, FdbOutcome::Skipped);
        assert!(kernel.neighbor_requests().is_empty());
    }

    #[test]
    fn test_fdb_skipped_when_link_unknown() {
        let kernel = FakeKernel::new();
        let outcome = add_forwarding_acceleration(&kernel, 9, CLIENT_MAC).unwrap();
        assert_eq!(outcome, FdbOutcome::Skipped);
        assert!(kernel.calls().is_empty());
    }

    #[test]
    fn test_fdb_socket_failure_is_returned() {
        let kernel = FakeKernel::new()
            .with_bridge(2, "br0")
            .with_port(5, "br0-port1", 2)
            .with_failing_route_socket();
        let err = add_forwarding_acceleration(&kernel, 5, CLIENT_MAC).unwrap_err();
        assert!(matches!(&err, HelperError::Netlink { operation, .. } if operation == "connect"));
        assert!(kernel.neighbor_requests().is_empty());
    }

    #[test]
    fn test_fdb_skipped_when_master_query_fails() {
        let kernel = FakeKernel::new()
            .with_bridge(2, "br0")
            .with_port(5, "br0-port1", 2)
            .with_failing_link_query(2);
        let outcome = add_forwarding_acceleration(&kernel, 5, CLIENT_MAC).unwrap();
        assert_eq!(outcome, FdbOutcome::Skipped);
        assert!(kernel.neighbor_requests().is_empty());
    }

    #[test]
    fn test_fdb_rejection_is_returned() {
        let kernel = FakeKernel::new()
            .with_bridge(2, "br0")
            .with_port(5, "br0-port1", 2)
            .with_failing_neighbor("Operation not supported");
        let err = add_forwarding_acceleration(&kernel, 5, CLIENT_MAC).unwrap_err();
        assert!(matches!(err, HelperError::Netlink { .. }));
        assert!(err.to_string().contains("Operation not supported"));
        assert_eq!(kernel.neighbor_requests().len(), 1);
    }

    #[test]
    fn test_arp_unknown_interface() {
        let kernel = FakeKernel::new();
        let err =
            add_address_resolution_entry(&kernel, 5, CLIENT_MAC, Ipv4Addr::new(192, 0, 2, 10))
                .unwrap_err();
        assert!(matches!(err, HelperError::InterfaceNotFound(5)));
        assert!(kernel.arp_requests().is_empty());
    }

    #[test]
    fn test_arp_kernel_rejection() {
        let kernel = FakeKernel::new()
            .with_link(5, "eth1")
            .with_failing_arp_request();
        let err =
            add_address_resolution_entry(&kernel, 5, CLIENT_MAC, Ipv4Addr::new(192, 0, 2, 10))
                .unwrap_err();
        assert!(matches!(err, HelperError::Kernel { .. }));
        assert_eq!(kernel.arp_requests().len(), 1);
    }
}
