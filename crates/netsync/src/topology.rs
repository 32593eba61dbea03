//! Bridge membership queries
//!
//! Nothing here is cached: every call asks the kernel again, so a port that
//! was enslaved or released since the last call is seen as it is now.

use tracing::{debug, trace};

use dhcp_helper_common::HelperResult;

use crate::effects::KernelEffects;

/// Whether an interface is a port of a bridge device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeMembership {
    /// Enslaved to bridge `bridge`
    Bridged { bridge: u32 },
    /// No master, or the master is not a bridge
    NotBridged,
    /// The link or its master could not be resolved
    Unknown,
}

impl BridgeMembership {
    /// Collapses `Unknown` to not bridged.
    ///
    /// A missing drop rule or FDB entry only costs a duplicate packet or a
    /// slower path, so unresolvable topology takes the non-bridged branch.
    pub fn is_bridged(self) -> bool {
        matches!(self, BridgeMembership::Bridged { .. })
    }
}

/// Queries the bridge membership of `ifindex`.
///
/// Any failure, including a route socket that cannot be opened, reads as
/// [`BridgeMembership::Unknown`].
pub fn membership<K: KernelEffects + ?Sized>(kernel: &K, ifindex: u32) -> BridgeMembership {
    try_membership(kernel, ifindex).unwrap_or_else(|e| {
        debug!(ifindex, error = %e, "Route socket unavailable");
        BridgeMembership::Unknown
    })
}

/// Like [`membership`], but returns socket setup failures as `Err`.
///
/// Links that are missing or fail to resolve are still `Unknown`.
pub fn try_membership<K: KernelEffects + ?Sized>(
    kernel: &K,
    ifindex: u32,
) -> HelperResult<BridgeMembership> {
    let link = match kernel.link(ifindex) {
        Ok(Some(link)) => link,
        Ok(None) => {
            debug!(ifindex, "Link not found");
            return Ok(BridgeMembership::Unknown);
        }
        Err(e) if e.is_socket_setup() => return Err(e),
        Err(e) => {
            debug!(ifindex, error = %e, "Link query failed");
            return Ok(BridgeMembership::Unknown);
        }
    };

    let Some(controller) = link.controller else {
        trace!(ifindex, "Link has no master");
        return Ok(BridgeMembership::NotBridged);
    };

    match kernel.link(controller) {
        Ok(Some(master)) if master.is_bridge() => {
            Ok(BridgeMembership::Bridged { bridge: controller })
        }
        Ok(Some(master)) => {
            trace!(ifindex, master = controller, kind = ?master.kind, "Master is not a bridge");
            Ok(BridgeMembership::NotBridged)
        }
        Ok(None) => {
            debug!(ifindex, master = controller, "Master link not found");
            Ok(BridgeMembership::Unknown)
        }
        Err(e) if e.is_socket_setup() => Err(e),
        Err(e) => {
            debug!(ifindex, master = controller, error = %e, "Master link query failed");
            Ok(BridgeMembership::Unknown)
        }
    }
}

/// True when `ifindex` is currently a bridge port.
pub fn is_bridged<K: KernelEffects + ?Sized>(kernel: &K, ifindex: u32) -> bool {
    membership(kernel, ifindex).is_bridged()
}
