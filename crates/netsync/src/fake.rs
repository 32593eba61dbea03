//! In-memory kernel for tests and dry runs
//!
//! [`FakeKernel`] keeps a link table and an nft chain set, records every
//! effect it is asked to perform, and can be told to fail specific calls.
//! Rule loading reads the script from the given path, so a rule file that
//! was removed too early shows up as a failed load.

use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use dhcp_helper_common::{HelperError, HelperResult};

use crate::effects::KernelEffects;
use crate::types::{ArpRecord, FdbRecord, LinkInfo, LinkKind};

/// One recorded side effect
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KernelCall {
    LoadRules { path: PathBuf, script: String },
    DeleteChain { family: String, table: String, chain: String },
    CreateNeighbor(FdbRecord),
    SetArpEntry(ArpRecord),
}

#[derive(Debug, Default)]
struct FakeState {
    links: HashMap<u32, LinkInfo>,
    failing_links: HashSet<u32>,
    route_socket_down: bool,
    chains: BTreeSet<String>,
    calls: Vec<KernelCall>,
    link_queries: usize,
    fail_rule_load: bool,
    neighbor_error: Option<String>,
    fail_arp_socket: bool,
    fail_arp_request: bool,
}

#[derive(Debug, Default)]
pub struct FakeKernel {
    state: Mutex<FakeState>,
}

impl FakeKernel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a bridge device.
    pub fn with_bridge(self, ifindex: u32, name: &str) -> Self {
        let mut link = LinkInfo::new(ifindex);
        link.name = Some(name.to_string());
        link.kind = Some(LinkKind::Bridge);
        self.with_link_info(link)
    }

    /// Adds a plain link with no master.
    pub fn with_link(self, ifindex: u32, name: &str) -> Self {
        let mut link = LinkInfo::new(ifindex);
        link.name = Some(name.to_string());
        self.with_link_info(link)
    }

    /// Adds a link enslaved to `controller`.
    pub fn with_port(self, ifindex: u32, name: &str, controller: u32) -> Self {
        let mut link = LinkInfo::new(ifindex);
        link.name = Some(name.to_string());
        link.controller = Some(controller);
        self.with_link_info(link)
    }

    pub fn with_link_info(self, link: LinkInfo) -> Self {
        self.state.lock().links.insert(link.index, link);
        self
    }

    /// Makes link queries for `ifindex` fail.
    pub fn with_failing_link_query(self, ifindex: u32) -> Self {
        self.state.lock().failing_links.insert(ifindex);
        self
    }

    /// Makes every link query fail as if the route socket could not connect.
    pub fn with_failing_route_socket(self) -> Self {
        self.state.lock().route_socket_down = true;
        self
    }

    /// Makes `load_rules` fail as if `nft -f` exited non-zero.
    pub fn with_failing_rule_load(self) -> Self {
        self.state.lock().fail_rule_load = true;
        self
    }

    /// Makes the kernel reject neighbour creation with `message`.
    pub fn with_failing_neighbor(self, message: &str) -> Self {
        self.state.lock().neighbor_error = Some(message.to_string());
        self
    }

    /// Makes opening the ARP control socket fail.
    pub fn with_failing_arp_socket(self) -> Self {
        self.state.lock().fail_arp_socket = true;
        self
    }

    /// Makes the kernel reject SIOCSARP.
    pub fn with_failing_arp_request(self) -> Self {
        self.state.lock().fail_arp_request = true;
        self
    }

    /// Pre-creates an nft chain, as if left over from a previous run.
    pub fn with_chain(self, chain: &str) -> Self {
        self.state.lock().chains.insert(chain.to_string());
        self
    }

    /// Enslaves `ifindex` to `controller`, or releases it with `None`.
    pub fn set_controller(&self, ifindex: u32, controller: Option<u32>) {
        if let Some(link) = self.state.lock().links.get_mut(&ifindex) {
            link.controller = controller;
        }
    }

    /// Removes a link, as if the device had been deleted.
    pub fn remove_link(&self, ifindex: u32) {
        self.state.lock().links.remove(&ifindex);
    }

    /// All recorded effects in call order.
    pub fn calls(&self) -> Vec<KernelCall> {
        self.state.lock().calls.clone()
    }

    /// Scripts passed to `load_rules`.
    pub fn rule_scripts(&self) -> Vec<String> {
        self.state
            .lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                KernelCall::LoadRules { script, .. } => Some(script.clone()),
                _ => None,
            })
            .collect()
    }

    /// Rule file paths passed to `load_rules`.
    pub fn rule_paths(&self) -> Vec<PathBuf> {
        self.state
            .lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                KernelCall::LoadRules { path, .. } => Some(path.clone()),
                _ => None,
            })
            .collect()
    }

    /// FDB create requests sent to the kernel, accepted or not.
    pub fn neighbor_requests(&self) -> Vec<FdbRecord> {
        self.state
            .lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                KernelCall::CreateNeighbor(record) => Some(record.clone()),
                _ => None,
            })
            .collect()
    }

    /// SIOCSARP requests issued, accepted or not.
    pub fn arp_requests(&self) -> Vec<ArpRecord> {
        self.state
            .lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                KernelCall::SetArpEntry(record) => Some(record.clone()),
                _ => None,
            })
            .collect()
    }

    /// Chains currently present in the fake ruleset.
    pub fn chains(&self) -> Vec<String> {
        self.state.lock().chains.iter().cloned().collect()
    }

    /// Number of link lookups served.
    pub fn link_queries(&self) -> usize {
        self.state.lock().link_queries
    }
}

fn tool_failure(command: String, output: &str) -> HelperError {
    HelperError::ShellCommandFailed {
        command,
        exit_code: 1,
        output: output.to_string(),
    }
}

impl KernelEffects for FakeKernel {
    fn link(&self, ifindex: u32) -> HelperResult<Option<LinkInfo>> {
        let mut state = self.state.lock();
        if state.route_socket_down {
            return Err(HelperError::netlink("connect", "Connection refused"));
        }
        state.link_queries += 1;
        if state.failing_links.contains(&ifindex) {
            return Err(HelperError::netlink("RTM_GETLINK", "Connection refused"));
        }
        Ok(state.links.get(&ifindex).cloned())
    }

    fn interface_name(&self, ifindex: u32) -> HelperResult<String> {
        self.state
            .lock()
            .links
            .get(&ifindex)
            .and_then(|link| link.name.clone())
            .ok_or(HelperError::InterfaceNotFound(ifindex))
    }

    fn load_rules(&self, path: &Path) -> HelperResult<()> {
        let command = format!("nft -f {}", path.display());
        let script = fs::read_to_string(path).map_err(|e| HelperError::ShellExec {
            command: command.clone(),
            source: e,
        })?;

        let mut state = self.state.lock();
        state.calls.push(KernelCall::LoadRules {
            path: path.to_path_buf(),
            script: script.clone(),
        });
        if state.fail_rule_load {
            return Err(tool_failure(command, "Error: Could not process rule"));
        }

        for line in script.lines() {
            if let Some(rest) = line.trim_start().strip_prefix("chain ") {
                if let Some(name) = rest.split_whitespace().next() {
                    state.chains.insert(name.to_string());
                }
            }
        }
        Ok(())
    }

    fn delete_chain(&self, family: &str, table: &str, chain: &str) -> HelperResult<()> {
        let mut state = self.state.lock();
        state.calls.push(KernelCall::DeleteChain {
            family: family.to_string(),
            table: table.to_string(),
            chain: chain.to_string(),
        });
        if state.chains.remove(chain) {
            Ok(())
        } else {
            Err(tool_failure(
                format!("nft delete chain {} {} {}", family, table, chain),
                "Error: No such file or directory",
            ))
        }
    }

    fn create_neighbor(&self, record: &FdbRecord) -> HelperResult<()> {
        let mut state = self.state.lock();
        state.calls.push(KernelCall::CreateNeighbor(record.clone()));
        match &state.neighbor_error {
            Some(message) => Err(HelperError::netlink("RTM_NEWNEIGH", message)),
            None => Ok(()),
        }
    }

    fn set_arp_entry(&self, record: &ArpRecord) -> HelperResult<()> {
        let mut state = self.state.lock();
        if state.fail_arp_socket {
            return Err(HelperError::ControlSocket {
                source: io::Error::other("Too many open files"),
            });
        }
        state.calls.push(KernelCall::SetArpEntry(record.clone()));
        if state.fail_arp_request {
            return Err(HelperError::kernel(
                "SIOCSARP",
                io::Error::other("No such device"),
            ));
        }
        Ok(())
    }
}
