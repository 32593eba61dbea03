//! Kernel and rule-tool side effects
//!
//! Everything this crate does to the host goes through [`KernelEffects`]:
//! link queries, `nft` invocations, neighbour creation and the ARP ioctl.
//! [`crate::SystemKernel`] talks to the running kernel; [`crate::FakeKernel`]
//! records calls in memory.

use std::path::Path;

use dhcp_helper_common::HelperResult;

use crate::types::{ArpRecord, FdbRecord, LinkInfo};

pub trait KernelEffects {
    /// Looks up link `ifindex`. `Ok(None)` when no such link exists.
    fn link(&self, ifindex: u32) -> HelperResult<Option<LinkInfo>>;

    /// Resolves the current name of interface `ifindex`.
    fn interface_name(&self, ifindex: u32) -> HelperResult<String>;

    /// Loads an nft rule script from `path` (`nft -f`).
    fn load_rules(&self, path: &Path) -> HelperResult<()>;

    /// Deletes one chain (`nft delete chain <family> <table> <chain>`).
    fn delete_chain(&self, family: &str, table: &str, chain: &str) -> HelperResult<()>;

    /// Creates or updates a bridge FDB entry (RTM_NEWNEIGH, NLM_F_CREATE).
    fn create_neighbor(&self, record: &FdbRecord) -> HelperResult<()>;

    /// Installs a static ARP entry (SIOCSARP).
    fn set_arp_entry(&self, record: &ArpRecord) -> HelperResult<()>;
}

impl<K: KernelEffects + ?Sized> KernelEffects for &K {
    fn link(&self, ifindex: u32) -> HelperResult<Option<LinkInfo>> {
        (**self).link(ifindex)
    }

    fn interface_name(&self, ifindex: u32) -> HelperResult<String> {
        (**self).interface_name(ifindex)
    }

    fn load_rules(&self, path: &Path) -> HelperResult<()> {
        (**self).load_rules(path)
    }

    fn delete_chain(&self, family: &str, table: &str, chain: &str) -> HelperResult<()> {
        (**self).delete_chain(family, table, chain)
    }

    fn create_neighbor(&self, record: &FdbRecord) -> HelperResult<()> {
        (**self).create_neighbor(record)
    }

    fn set_arp_entry(&self, record: &ArpRecord) -> HelperResult<()> {
        (**self).set_arp_entry(record)
    }
}
