//! Command line options

use clap::{Parser, Subcommand, ValueEnum};
use std::net::Ipv4Addr;
use std::path::PathBuf;

use dhcp_helper_common::shell::NFT_CMD;
use dhcp_helper_common::DEFAULT_CONFIG_PATH;
use dhcp_helper_netsync::MacAddress;

/// Kernel-side helper for a bridged DHCP relay
#[derive(Parser, Debug)]
#[command(name = "dhcp-helperd")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Relay configuration file
    #[arg(short = 'c', long, default_value = DEFAULT_CONFIG_PATH, global = true)]
    pub config: PathBuf,

    /// nft binary used to load and delete rules
    #[arg(long, default_value = NFT_CMD, global = true)]
    pub nft: String,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(short = 'l', long, default_value = "info", global = true)]
    pub log_level: String,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Apply the firewall, then keep it until SIGINT/SIGTERM (default)
    Run,
    /// Apply the firewall once and exit
    Apply,
    /// Delete the firewall chains and exit
    Teardown,
    /// Program FDB and ARP entries for one client
    AddClient {
        /// Interface the client was seen on
        #[arg(short, long)]
        interface: String,
        /// Client MAC address
        #[arg(short, long)]
        mac: MacAddress,
        /// Client IPv4 address; installs a static ARP entry when given
        #[arg(long)]
        ip: Option<Ipv4Addr>,
    },
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

impl Cli {
    pub fn subcommand(&self) -> Command {
        self.command.clone().unwrap_or(Command::Run)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["dhcp-helperd"]).unwrap();
        assert_eq!(cli.subcommand(), Command::Run);
        assert_eq!(cli.config, PathBuf::from(DEFAULT_CONFIG_PATH));
        assert_eq!(cli.nft, NFT_CMD);
        assert_eq!(cli.log_level, "info");
        assert_eq!(cli.log_format, LogFormat::Text);
    }

    #[test]
    fn test_add_client() {
        let cli = Cli::try_parse_from([
            "dhcp-helperd",
            "add-client",
            "--interface",
            "br0-port1",
            "--mac",
            "aa:bb:cc:dd:ee:ff",
            "--ip",
            "192.0.2.10",
            "--log-format",
            "json",
        ])
        .unwrap();

        assert_eq!(cli.log_format, LogFormat::Json);
        assert_eq!(
            cli.subcommand(),
            Command::AddClient {
                interface: "br0-port1".to_string(),
                mac: MacAddress::new([0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff]),
                ip: Some(Ipv4Addr::new(192, 0, 2, 10)),
            }
        );
    }

    #[test]
    fn test_add_client_bad_mac() {
        let result = Cli::try_parse_from([
            "dhcp-helperd",
            "add-client",
            "-i",
            "eth1",
            "-m",
            "aa:bb:cc",
        ]);
        assert!(result.is_err());
    }
}
