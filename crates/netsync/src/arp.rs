//! Static ARP entries through the SIOCSARP ioctl

use nix::sys::socket::{socket, AddressFamily, SockFlag, SockType};
use std::io;
use std::os::fd::AsRawFd;
use tracing::trace;

use dhcp_helper_common::{HelperError, HelperResult};

use crate::types::ArpRecord;

/// IFNAMSIZ including the terminating NUL
const IFNAMSIZ: usize = 16;

nix::ioctl_write_ptr_bad!(siocsarp, libc::SIOCSARP, libc::arpreq);

const fn empty_sockaddr() -> libc::sockaddr {
    libc::sockaddr {
        sa_family: 0,
        sa_data: [0; 14],
    }
}

/// Fills an `arpreq` for a complete IPv4 -> Ethernet mapping on the
/// record's device.
pub(crate) fn build_arpreq(record: &ArpRecord) -> HelperResult<libc::arpreq> {
    let name = record.ifname.as_bytes();
    if name.is_empty() || name.len() >= IFNAMSIZ {
        return Err(HelperError::kernel(
            "SIOCSARP",
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("invalid interface name '{}'", record.ifname),
            ),
        ));
    }

    let mut req = libc::arpreq {
        arp_pa: empty_sockaddr(),
        arp_ha: empty_sockaddr(),
        arp_flags: libc::ATF_COM,
        arp_netmask: empty_sockaddr(),
        arp_dev: [0; IFNAMSIZ],
    };

    // sockaddr_in layout inside sockaddr: port in sa_data[0..2], address in [2..6]
    req.arp_pa.sa_family = libc::AF_INET as libc::sa_family_t;
    for (dst, src) in req.arp_pa.sa_data[2..6].iter_mut().zip(record.ip.octets()) {
        *dst = src as libc::c_char;
    }

    req.arp_ha.sa_family = libc::ARPHRD_ETHER;
    for (dst, src) in req.arp_ha.sa_data.iter_mut().zip(record.mac.octets()) {
        *dst = src as libc::c_char;
    }

    for (dst, src) in req.arp_dev.iter_mut().zip(name) {
        *dst = *src as libc::c_char;
    }

    Ok(req)
}

/// Opens a throwaway AF_INET datagram socket and issues SIOCSARP on it.
pub fn set_arp_entry(record: &ArpRecord) -> HelperResult<()> {
    let req = build_arpreq(record)?;

    let fd = socket(
        AddressFamily::Inet,
        SockType::Datagram,
        SockFlag::SOCK_CLOEXEC,
        None,
    )
    .map_err(|errno| HelperError::ControlSocket {
        source: io::Error::from(errno),
    })?;

    trace!(interface = %record.ifname, ip = %record.ip, "Issuing SIOCSARP");

    // SAFETY: `req` is a fully initialised arpreq that outlives the call and
    // `fd` is an open socket owned by this frame.
    unsafe { siocsarp(fd.as_raw_fd(), &req) }
        .map_err(|errno| HelperError::kernel("SIOCSARP", io::Error::from(errno)))?;

    Ok(())
}
