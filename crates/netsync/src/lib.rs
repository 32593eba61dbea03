//! Kernel network-state synchronisation for the dhcp-helper relay
//!
//! The relay calls into this crate at three points of its lifecycle:
//!
//! - at startup and on reconfiguration, [`NetSync::apply_firewall`] installs
//!   nftables rules that drop the second copy of DHCP broadcasts looping
//!   back through a bridge;
//! - for every client it relays, [`NetSync::add_forwarding_acceleration`]
//!   pins the client MAC to its bridge port and
//!   [`NetSync::add_address_resolution_entry`] installs a static ARP entry;
//! - at shutdown, [`NetSync::remove_firewall`] deletes the rules again.
//!
//! # Architecture
//!
//! ```text
//! +-----------------+     +------------------+     +------------------+
//! |  dhcp-helperd   |     |     NetSync      |     |   Linux kernel   |
//! |                 |     |                  |     |                  |
//! |  config groups  |---->|  topology        |---->|  RTM_GETLINK     |
//! |  client events  |     |  firewall        |---->|  nft -f <file>   |
//! |                 |     |  neighbor        |---->|  RTM_NEWNEIGH    |
//! |                 |     |        |         |     |  SIOCSARP        |
//! +-----------------+     |  KernelEffects   |     +------------------+
//!                         +------------------+
//! ```
//!
//! Every side effect goes through [`KernelEffects`]. [`SystemKernel`] is the
//! Linux implementation; [`FakeKernel`] keeps state in memory for tests.
//! Topology is never cached: each decision re-queries the kernel.

pub mod effects;
pub mod fake;
pub mod firewall;
pub mod neighbor;
pub mod net_sync;
pub mod topology;
pub mod types;

#[cfg(target_os = "linux")]
mod arp;
#[cfg(target_os = "linux")]
mod netlink;
#[cfg(target_os = "linux")]
pub mod system;

pub use effects::KernelEffects;
pub use fake::{FakeKernel, KernelCall};
pub use firewall::{
    FirewallReport, FirewallRuleSet, TeardownReport, CHAIN_PRIORITY, DHCP_SERVER_PORT,
    FORWARD_CHAIN, INPUT_CHAIN, NFT_FAMILY, NFT_TABLE,
};
pub use neighbor::FdbOutcome;
pub use net_sync::NetSync;
#[cfg(target_os = "linux")]
pub use system::SystemKernel;
pub use topology::BridgeMembership;
pub use types::{ArpRecord, FdbRecord, LinkInfo, LinkKind, MacAddress, NeighborState};
