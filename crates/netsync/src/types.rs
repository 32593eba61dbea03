//! Core types for kernel network-state synchronisation

use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

/// MAC address representation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MacAddress(pub [u8; 6]);

impl MacAddress {
    /// Zero MAC address
    pub const ZERO: Self = Self([0, 0, 0, 0, 0, 0]);

    /// Broadcast MAC address
    pub const BROADCAST: Self = Self([0xff, 0xff, 0xff, 0xff, 0xff, 0xff]);

    pub const fn new(bytes: [u8; 6]) -> Self {
        Self(bytes)
    }

    /// Raw address bytes
    pub fn octets(&self) -> [u8; 6] {
        self.0
    }

    /// Check if this is a zero MAC
    #[inline]
    pub fn is_zero(&self) -> bool {
        self.0 == Self::ZERO.0
    }

    /// Check if the group bit is set (broadcast included)
    #[inline]
    pub fn is_multicast(&self) -> bool {
        self.0[0] & 0x01 != 0
    }

    /// Parse MAC from a colon- or dash-separated string (e.g., "00:11:22:33:44:55")
    pub fn parse(s: &str) -> Option<Self> {
        let sep = if s.contains('-') { '-' } else { ':' };
        let parts: Vec<&str> = s.split(sep).collect();
        if parts.len() != 6 {
            return None;
        }
        let mut bytes = [0u8; 6];
        for (i, part) in parts.iter().enumerate() {
            if part.is_empty() || part.len() > 2 {
                return None;
            }
            bytes[i] = u8::from_str_radix(part, 16).ok()?;
        }
        Some(Self(bytes))
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            self.0[0], self.0[1], self.0[2], self.0[3], self.0[4], self.0[5]
        )
    }
}

impl FromStr for MacAddress {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| format!("invalid MAC address '{}'", s))
    }
}

/// Kernel neighbor state (NUD_* values from linux/neighbour.h)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum NeighborState {
    Reachable = 0x02,
}

impl NeighborState {
    /// Kernel NUD_* value
    pub fn to_kernel(self) -> u16 {
        self as u16
    }
}

/// Kind of a kernel link, from IFLA_INFO_KIND
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkKind {
    Bridge,
    Other(String),
}

/// Snapshot of one kernel link, as returned by an RTM_GETLINK query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkInfo {
    /// Interface index
    pub index: u32,
    /// Interface name, if the kernel reported one
    pub name: Option<String>,
    /// Index of the master device (IFLA_MASTER), if enslaved
    pub controller: Option<u32>,
    /// Link kind, absent for plain physical devices
    pub kind: Option<LinkKind>,
}

impl LinkInfo {
    /// Plain link with no master and no kind
    pub fn new(index: u32) -> Self {
        Self {
            index,
            name: None,
            controller: None,
            kind: None,
        }
    }

    pub fn is_bridge(&self) -> bool {
        matches!(self.kind, Some(LinkKind::Bridge))
    }
}

/// Bridge forwarding-database entry pinning a MAC to a bridge port
///
/// Sent as RTM_NEWNEIGH with family AF_BRIDGE and NTF_MASTER, so the bridge
/// (and any switch core under it) learns the address on `ifindex`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FdbRecord {
    /// Bridge port interface index
    pub ifindex: u32,
    /// Client MAC address
    pub mac: MacAddress,
    /// Entry state
    pub state: NeighborState,
    /// NTF_MASTER: program the entry into the bridge master
    pub master: bool,
}

impl FdbRecord {
    /// Reachable entry on bridge port `ifindex`, learned toward the master
    pub fn bridge_port(ifindex: u32, mac: MacAddress) -> Self {
        Self {
            ifindex,
            mac,
            state: NeighborState::Reachable,
            master: true,
        }
    }
}

/// Static IPv4 ARP cache entry, installed as a complete (ATF_COM) entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArpRecord {
    pub ifindex: u32,
    /// Device name the entry is bound to
    pub ifname: String,
    pub ip: Ipv4Addr,
    pub mac: MacAddress,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mac_address_display() {
        let mac = MacAddress([0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff]);
        assert_eq!(mac.to_string(), "aa:bb:cc:dd:ee:ff");
    }

    #[test]
    fn test_mac_address_parse() {
        let mac: MacAddress = "AA:BB:CC:DD:EE:FF".parse().unwrap();
        assert_eq!(mac.0, [0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff]);

        let dashed = MacAddress::parse("00-11-22-33-44-55").unwrap();
        assert_eq!(dashed.0, [0x00, 0x11, 0x22, 0x33, 0x44, 0x55]);
    }

    #[test]
    fn test_mac_address_parse_invalid() {
        assert!(MacAddress::parse("00:11:22:33:44").is_none());
        assert!(MacAddress::parse("00:11:22:33:44:gg").is_none());
        assert!(MacAddress::parse("000:11:22:33:44:55").is_none());
        assert!(MacAddress::parse("00:11:22::44:55").is_none());
        assert!("not-a-mac".parse::<MacAddress>().is_err());
    }

    #[test]
    fn test_mac_address_special() {
        assert!(MacAddress::ZERO.is_zero());
        assert!(MacAddress::BROADCAST.is_multicast());
        assert!(!MacAddress::new([0x02, 0, 0, 0, 0, 1]).is_multicast());
    }

    #[test]
    fn test_fdb_record_bridge_port() {
        let mac = MacAddress::new([0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff]);
        let record = FdbRecord::bridge_port(5, mac);
        assert_eq!(record.ifindex, 5);
        assert_eq!(record.state, NeighborState::Reachable);
        assert_eq!(record.state.to_kernel(), 0x02);
        assert!(record.master);
    }

    #[test]
    fn test_link_info_is_bridge() {
        let mut link = LinkInfo::new(2);
        assert!(!link.is_bridge());
        link.kind = Some(LinkKind::Other("bond".to_string()));
        assert!(!link.is_bridge());
        link.kind = Some(LinkKind::Bridge);
        assert!(link.is_bridge());
    }
}
