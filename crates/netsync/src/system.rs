//! Kernel backend for a running Linux host

use nix::net::if_::if_indextoname;
use std::path::Path;
use tracing::debug;

use dhcp_helper_common::shell::{self, shellquote, NFT_CMD};
use dhcp_helper_common::{HelperError, HelperResult};

use crate::arp;
use crate::effects::KernelEffects;
use crate::netlink::RouteSocket;
use crate::types::{ArpRecord, FdbRecord, LinkInfo};

/// Talks to the kernel over rtnetlink and ioctl, and runs `nft` for rules.
///
/// Stateless: every call opens and closes its own socket.
#[derive(Debug, Clone)]
pub struct SystemKernel {
    nft_cmd: String,
}

impl SystemKernel {
    pub fn new() -> Self {
        Self::with_nft(NFT_CMD)
    }

    /// Uses `nft_cmd` instead of the default `nft` binary.
    pub fn with_nft(nft_cmd: impl Into<String>) -> Self {
        Self {
            nft_cmd: nft_cmd.into(),
        }
    }

    pub fn nft_cmd(&self) -> &str {
        &self.nft_cmd
    }
}

impl Default for SystemKernel {
    fn default() -> Self {
        Self::new()
    }
}

impl KernelEffects for SystemKernel {
    fn link(&self, ifindex: u32) -> HelperResult<Option<LinkInfo>> {
        RouteSocket::connect()?.get_link(ifindex)
    }

    fn interface_name(&self, ifindex: u32) -> HelperResult<String> {
        let name = if_indextoname(ifindex).map_err(|errno| {
            debug!(ifindex, error = %errno, "if_indextoname failed");
            HelperError::InterfaceNotFound(ifindex)
        })?;
        // A vanished index can come back as an empty name rather than an error
        let name = name.to_string_lossy().into_owned();
        if name.is_empty() {
            debug!(ifindex, "if_indextoname returned an empty name");
            return Err(HelperError::InterfaceNotFound(ifindex));
        }
        Ok(name)
    }

    fn load_rules(&self, path: &Path) -> HelperResult<()> {
        let cmd = format!(
            "{} -f {}",
            self.nft_cmd,
            shellquote(&path.to_string_lossy())
        );
        shell::run(&cmd)?;
        Ok(())
    }

    fn delete_chain(&self, family: &str, table: &str, chain: &str) -> HelperResult<()> {
        let cmd = format!(
            "{} delete chain {} {} {}",
            self.nft_cmd,
            family,
            table,
            shellquote(chain)
        );
        shell::run(&cmd)?;
        Ok(())
    }

    fn create_neighbor(&self, record: &FdbRecord) -> HelperResult<()> {
        RouteSocket::connect()?.add_fdb_entry(record)
    }

    fn set_arp_entry(&self, record: &ArpRecord) -> HelperResult<()> {
        arp::set_arp_entry(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_nft_command() {
        assert_eq!(SystemKernel::default().nft_cmd(), NFT_CMD);
        assert_eq!(SystemKernel::with_nft("/bin/true").nft_cmd(), "/bin/true");
    }

    /// Stand-in for nft that logs its arguments, and the script for `-f`,
    /// next to itself. Fails unless `-f` names a readable file.
    const NFT_STUB: &str = r#"log="$(dirname "$0")/calls"
echo "$*" >> "$log"
if [ "$1" = "-f" ]; then
    test -r "$2" || exit 1
    cat "$2" >> "$log"
fi
"#;

    fn stub_kernel(dir: &tempfile::TempDir) -> SystemKernel {
        let stub = dir.path().join("nft");
        std::fs::write(&stub, NFT_STUB).unwrap();
        SystemKernel::with_nft(format!("/bin/sh {}", shellquote(&stub.to_string_lossy())))
    }

    #[test]
    fn test_load_rules_passes_file_to_tool() {
        let dir = tempfile::TempDir::new().unwrap();
        let kernel = stub_kernel(&dir);

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "table bridge filter {{}}").unwrap();
        kernel.load_rules(file.path()).unwrap();

        let calls = std::fs::read_to_string(dir.path().join("calls")).unwrap();
        assert_eq!(
            calls,
            format!("-f {}\ntable bridge filter {{}}\n", file.path().display())
        );
    }

    #[test]
    fn test_load_rules_missing_file_fails() {
        let dir = tempfile::TempDir::new().unwrap();
        let kernel = stub_kernel(&dir);
        let missing = dir.path().join("dhcp-helper.gone00");

        let err = kernel.load_rules(&missing).unwrap_err();
        assert!(matches!(err, HelperError::ShellCommandFailed { exit_code: 1, .. }));
    }

    #[test]
    fn test_delete_chain_arguments() {
        let dir = tempfile::TempDir::new().unwrap();
        let kernel = stub_kernel(&dir);
        kernel.delete_chain("bridge", "filter", "dhcpr-input").unwrap();

        let calls = std::fs::read_to_string(dir.path().join("calls")).unwrap();
        assert_eq!(calls, "delete chain bridge filter dhcpr-input\n");
    }

    #[test]
    fn test_tool_failure_is_returned() {
        let kernel = SystemKernel::with_nft("false");
        let err = kernel
            .delete_chain("bridge", "filter", "dhcpr-input")
            .unwrap_err();
        assert!(matches!(err, HelperError::ShellCommandFailed { .. }));
        assert!(err.is_external_tool());
    }

    #[test]
    fn test_loopback_name() {
        let lo = nix::net::if_::if_nametoindex("lo").unwrap();
        assert_eq!(SystemKernel::new().interface_name(lo).unwrap(), "lo");
    }

    #[test]
    fn test_unknown_interface_name() {
        let err = SystemKernel::new().interface_name(u32::MAX - 1).unwrap_err();
        assert!(matches!(err, HelperError::InterfaceNotFound(_)));
    }
}
