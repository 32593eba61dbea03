//! Request/response NETLINK_ROUTE socket for link lookups and FDB writes
//!
//! A [`RouteSocket`] is opened per operation and dropped when it finishes,
//! so concurrent callers never share a socket or a sequence space.

use netlink_packet_core::{
    NetlinkHeader, NetlinkMessage, NetlinkPayload, NLM_F_ACK, NLM_F_CREATE, NLM_F_REQUEST,
};
use netlink_packet_route::link::{InfoKind, LinkAttribute, LinkInfo as NlLinkInfo, LinkMessage};
use netlink_packet_route::neighbour::{
    NeighbourAttribute, NeighbourFlags, NeighbourMessage, NeighbourState,
};
use netlink_packet_route::{AddressFamily, RouteNetlinkMessage};
use netlink_sys::{protocols::NETLINK_ROUTE, Socket, SocketAddr};
use std::io;
use tracing::{instrument, trace};

use dhcp_helper_common::{HelperError, HelperResult};

use crate::types::{FdbRecord, LinkInfo, LinkKind};

/// NTF_MASTER from linux/neighbour.h
const NTF_MASTER: u8 = 0x04;

/// Receive buffer; link replies with full stats fit comfortably
const RECV_BUFFER_SIZE: usize = 32 * 1024;

pub struct RouteSocket {
    socket: Socket,
    sequence: u32,
    buffer: Vec<u8>,
}

impl RouteSocket {
    /// Opens and connects a NETLINK_ROUTE socket to the kernel.
    pub fn connect() -> HelperResult<Self> {
        let mut socket = Socket::new(NETLINK_ROUTE)
            .map_err(|e| HelperError::netlink("socket", format!("Failed to create socket: {}", e)))?;
        socket
            .bind_auto()
            .map_err(|e| HelperError::netlink("bind", format!("Failed to bind socket: {}", e)))?;
        socket.connect(&SocketAddr::new(0, 0)).map_err(|e| {
            HelperError::netlink("connect", format!("Failed connecting to NETLINK_ROUTE: {}", e))
        })?;

        Ok(Self {
            socket,
            sequence: 0,
            buffer: vec![0u8; RECV_BUFFER_SIZE],
        })
    }

    /// RTM_GETLINK for one index. `Ok(None)` when the kernel has no such link.
    #[instrument(skip(self))]
    pub fn get_link(&mut self, ifindex: u32) -> HelperResult<Option<LinkInfo>> {
        let mut msg = LinkMessage::default();
        msg.header.index = ifindex;

        let request = RouteNetlinkMessage::GetLink(msg);
        let replies = match self.request(request, NLM_F_REQUEST | NLM_F_ACK) {
            Ok(replies) => replies,
            Err(e) if e.raw_os_error() == Some(libc::ENODEV) => return Ok(None),
            Err(e) => return Err(HelperError::netlink("RTM_GETLINK", e)),
        };

        Ok(replies.iter().find_map(|reply| match reply {
            RouteNetlinkMessage::NewLink(link) if link.header.index == ifindex => {
                Some(link_info_from(link))
            }
            _ => None,
        }))
    }

    /// RTM_NEWNEIGH in the bridge family, allowed to create the entry.
    #[instrument(skip(self, record), fields(ifindex = record.ifindex, mac = %record.mac))]
    pub fn add_fdb_entry(&mut self, record: &FdbRecord) -> HelperResult<()> {
        let msg = fdb_message(record);
        self.request(
            RouteNetlinkMessage::NewNeighbour(msg),
            NLM_F_REQUEST | NLM_F_ACK | NLM_F_CREATE,
        )
        .map_err(|e| HelperError::netlink("RTM_NEWNEIGH", e))?;
        Ok(())
    }

    /// Sends one request and collects the replies up to the kernel's
    /// acknowledgement. `flags` must include NLM_F_ACK. A negative error code
    /// in the acknowledgement comes back as the matching OS error.
    fn request(
        &mut self,
        payload: RouteNetlinkMessage,
        flags: u16,
    ) -> io::Result<Vec<RouteNetlinkMessage>> {
        self.sequence = self.sequence.wrapping_add(1);
        let sequence = self.sequence;

        let buf = encode_request(payload, flags, sequence);
        self.socket.send(&buf, 0)?;

        let mut replies = Vec::new();
        loop {
            let len = self.socket.recv(&mut &mut self.buffer[..], 0)?;
            let mut offset = 0;

            while offset < len {
                let msg = NetlinkMessage::<RouteNetlinkMessage>::deserialize(
                    &self.buffer[offset..len],
                )
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;

                let msg_len = msg.header.length as usize;
                if msg_len == 0 {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        "zero-length netlink message",
                    ));
                }
                // Align to 4 bytes (netlink alignment requirement)
                offset += (msg_len + 3) & !3;

                if msg.header.sequence_number != sequence {
                    trace!(
                        got = msg.header.sequence_number,
                        want = sequence,
                        "Ignoring stale netlink reply"
                    );
                    continue;
                }

                match msg.payload {
                    NetlinkPayload::Error(err) => {
                        return match err.code {
                            Some(code) => Err(io::Error::from_raw_os_error(-code.get())),
                            None => Ok(replies),
                        };
                    }
                    NetlinkPayload::Done(_) => return Ok(replies),
                    NetlinkPayload::InnerMessage(inner) => replies.push(inner),
                    _ => {}
                }
            }
        }
    }
}

fn encode_request(payload: RouteNetlinkMessage, flags: u16, sequence: u32) -> Vec<u8> {
    let mut header = NetlinkHeader::default();
    header.flags = flags;
    header.sequence_number = sequence;

    let mut packet = NetlinkMessage::new(header, NetlinkPayload::InnerMessage(payload));
    packet.finalize();

    let mut buf = vec![0u8; packet.buffer_len()];
    packet.serialize(&mut buf);
    buf
}

fn link_info_from(msg: &LinkMessage) -> LinkInfo {
    let mut info = LinkInfo::new(msg.header.index);

    for attr in &msg.attributes {
        match attr {
            LinkAttribute::IfName(name) => info.name = Some(name.clone()),
            LinkAttribute::Controller(index) if *index != 0 => info.controller = Some(*index),
            LinkAttribute::LinkInfo(infos) => {
                for nla in infos {
                    if let NlLinkInfo::Kind(kind) = nla {
                        info.kind = Some(match kind {
                            InfoKind::Bridge => LinkKind::Bridge,
                            other => LinkKind::Other(format!("{:?}", other).to_lowercase()),
                        });
                    }
                }
            }
            _ => {}
        }
    }

    info
}

fn fdb_message(record: &FdbRecord) -> NeighbourMessage {
    let mut msg = NeighbourMessage::default();
    msg.header.family = AddressFamily::from(libc::AF_BRIDGE as u8);
    msg.header.ifindex = record.ifindex;
    msg.header.state = NeighbourState::from(record.state.to_kernel());
    if record.master {
        msg.header.flags = NeighbourFlags::from_bits_retain(NTF_MASTER);
    }
    msg.attributes
        .push(NeighbourAttribute::LinkLocalAddress(record.mac.octets().to_vec()));
    msg
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{MacAddress, NeighborState};

    #[test]
    fn test_fdb_message_fields() {
        let mac = MacAddress::new([0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff]);
        let msg = fdb_message(&FdbRecord::bridge_port(5, mac));

        assert_eq!(msg.header.ifindex, 5);
        assert_eq!(msg.header.family, AddressFamily::from(libc::AF_BRIDGE as u8));
        assert_eq!(
            msg.header.state,
            NeighbourState::from(NeighborState::Reachable.to_kernel())
        );
        assert_eq!(msg.header.flags.bits(), NTF_MASTER);
        assert_eq!(
            msg.attributes,
            vec![NeighbourAttribute::LinkLocalAddress(mac.octets().to_vec())]
        );
    }

    #[test]
    fn test_fdb_request_header() {
        let mac = MacAddress::new([0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff]);
        let msg = RouteNetlinkMessage::NewNeighbour(fdb_message(&FdbRecord::bridge_port(5, mac)));
        let buf = encode_request(msg, NLM_F_REQUEST | NLM_F_ACK | NLM_F_CREATE, 7);

        // nlmsghdr: len u32, type u16, flags u16, seq u32, pid u32
        assert_eq!(u32::from_ne_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize, buf.len());
        assert_eq!(u16::from_ne_bytes([buf[4], buf[5]]), libc::RTM_NEWNEIGH);
        assert_eq!(u16::from_ne_bytes([buf[6], buf[7]]), 0x0001 | 0x0004 | 0x0400);
        assert_eq!(u32::from_ne_bytes([buf[8], buf[9], buf[10], buf[11]]), 7);
    }

    #[test]
    fn test_link_request_is_not_a_dump() {
        let mut msg = LinkMessage::default();
        msg.header.index = 5;
        let request = RouteNetlinkMessage::GetLink(msg);
        let buf = encode_request(request, NLM_F_REQUEST | NLM_F_ACK, 1);
        assert_eq!(u16::from_ne_bytes([buf[4], buf[5]]), libc::RTM_GETLINK);
        assert_eq!(u16::from_ne_bytes([buf[6], buf[7]]), 0x0001 | 0x0004);
    }

    #[test]
    fn test_link_info_from_bridge_port() {
        let mut msg = LinkMessage::default();
        msg.header.index = 5;
        msg.attributes.push(LinkAttribute::IfName("br0-port1".to_string()));
        msg.attributes.push(LinkAttribute::Controller(2));

        let info = link_info_from(&msg);
        assert_eq!(info.index, 5);
        assert_eq!(info.name.as_deref(), Some("br0-port1"));
        assert_eq!(info.controller, Some(2));
        assert!(!info.is_bridge());
    }

    #[test]
    fn test_link_info_from_bridge() {
        let mut msg = LinkMessage::default();
        msg.header.index = 2;
        msg.attributes
            .push(LinkAttribute::LinkInfo(vec![NlLinkInfo::Kind(InfoKind::Bridge)]));

        let info = link_info_from(&msg);
        assert!(info.is_bridge());
        assert_eq!(info.controller, None);
    }

    #[test]
    #[ignore = "requires a Linux host with a loopback device"]
    fn test_get_loopback_link() {
        let mut socket = RouteSocket::connect().unwrap();
        let index = nix::net::if_::if_nametoindex("lo").unwrap();
        let lo = socket.get_link(index).unwrap().unwrap();
        assert_eq!(lo.name.as_deref(), Some("lo"));
        assert_eq!(lo.controller, None);
        assert!(socket.get_link(u32::MAX - 1).unwrap().is_none());
    }
}
