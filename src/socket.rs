// Copyright 2020 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Raw ICMP sockets. `IcmpSocket` is the seam between `engine.rs` and
//! the kernel, so the main loop can be driven in tests without opening
//! a real raw socket (which needs CAP_NET_RAW).

use crate::error::EngineError;
use pnet::transport::{
    icmp_packet_iter, icmpv6_packet_iter, transport_channel, TransportChannelType,
    TransportProtocol, TransportReceiver, TransportSender,
};
use std::io;
use std::net::IpAddr;
use std::time::Duration;

/// A send-and-receive ICMP raw socket, or a test double standing in for one.
pub trait IcmpSocket {
    fn send_to(&mut self, addr: IpAddr, packet: &[u8]) -> io::Result<usize>;
    /// Blocks up to `timeout` for the next packet; `Ok(None)` is a timeout,
    /// not an error. Returns the packet bytes (ICMP header onward, no IP
    /// header) and the source address.
    fn recv(&mut self, timeout: Duration) -> io::Result<Option<(Vec<u8>, IpAddr)>>;

    /// Best-effort socket option calls (spec §6's `set_ttl`/`set_tos`/
    /// `set_df`/`set_mark`/`bind_iface`/`set_source_addr`). `pnet`'s
    /// transport channel does not expose the underlying file descriptor,
    /// so the default implementations log and decline rather than fail
    /// the whole run -- a missing option here never aborts a probe.
    fn set_ttl(&mut self, _ttl: u8) -> io::Result<()> {
        warn!("-H/--ttl: not supported on this transport, ignoring");
        Ok(())
    }
    fn set_tos(&mut self, _tos: u8) -> io::Result<()> {
        warn!("-O/--tos: not supported on this transport, ignoring");
        Ok(())
    }
    fn set_df(&mut self, _df: bool) -> io::Result<()> {
        warn!("-M/--dont-fragment: not supported on this transport, ignoring");
        Ok(())
    }
    fn set_mark(&mut self, _mark: u32) -> io::Result<()> {
        warn!("-k/--fwmark: not supported on this transport, ignoring");
        Ok(())
    }
    fn bind_iface(&mut self, _iface: &str) -> io::Result<()> {
        warn!("-I/--iface: not supported on this transport, ignoring");
        Ok(())
    }
    fn set_source_addr(&mut self, _addr: IpAddr) -> io::Result<()> {
        warn!("-S/--src: not supported on this transport, ignoring");
        Ok(())
    }
}

/// Real transport-channel-backed socket pair, one per address family.
pub struct RawIcmpSocket {
    tx: TransportSender,
    rx: TransportReceiver,
    v6: bool,
}

impl RawIcmpSocket {
    pub fn open_v4() -> Result<Self, EngineError> {
        let proto = TransportChannelType::Layer4(TransportProtocol::Ipv4(
            pnet::packet::ip::IpNextHeaderProtocols::Icmp,
        ));
        let (tx, rx) = transport_channel(4096, proto)
            .map_err(|e| EngineError::Allocation(format!("icmpv4 socket: {}", e)))?;
        Ok(Self { tx, rx, v6: false })
    }

    pub fn open_v6() -> Result<Self, EngineError> {
        let proto = TransportChannelType::Layer4(TransportProtocol::Ipv6(
            pnet::packet::ip::IpNextHeaderProtocols::Icmpv6,
        ));
        let (tx, rx) = transport_channel(4096, proto)
            .map_err(|e| EngineError::Allocation(format!("icmpv6 socket: {}", e)))?;
        Ok(Self { tx, rx, v6: true })
    }
}

impl IcmpSocket for RawIcmpSocket {
    fn send_to(&mut self, addr: IpAddr, packet: &[u8]) -> io::Result<usize> {
        use pnet::packet::icmp::IcmpPacket;
        use pnet::packet::icmpv6::Icmpv6Packet;
        if self.v6 {
            let pkt = Icmpv6Packet::new(packet)
                .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "short icmpv6 packet"))?;
            self.tx.send_to(pkt, addr)
        } else {
            let pkt = IcmpPacket::new(packet)
                .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "short icmp packet"))?;
            self.tx.send_to(pkt, addr)
        }
    }

    fn recv(&mut self, timeout: Duration) -> io::Result<Option<(Vec<u8>, IpAddr)>> {
        if self.v6 {
            let mut iter = icmpv6_packet_iter(&mut self.rx);
            match iter.next_with_timeout(timeout)? {
                Some((pkt, addr)) => Ok(Some((pkt.packet().to_vec(), addr))),
                None => Ok(None),
            }
        } else {
            let mut iter = icmp_packet_iter(&mut self.rx);
            match iter.next_with_timeout(timeout)? {
                Some((pkt, addr)) => Ok(Some((pkt.packet().to_vec(), addr))),
                None => Ok(None),
            }
        }
    }
}

#[cfg(test)]
pub mod fake {
    use super::*;
    use std::collections::VecDeque;

    /// In-memory stand-in for a socket, used by `engine.rs` unit tests.
    #[derive(Default)]
    pub struct FakeSocket {
        pub sent: Vec<(IpAddr, Vec<u8>)>,
        pub inbox: VecDeque<(Vec<u8>, IpAddr)>,
        pub fail_send: bool,
    }

    impl IcmpSocket for FakeSocket {
        fn send_to(&mut self, addr: IpAddr, packet: &[u8]) -> io::Result<usize> {
            if self.fail_send {
                return Err(io::Error::new(io::ErrorKind::Other, "simulated send failure"));
            }
            self.sent.push((addr, packet.to_vec()));
            Ok(packet.len())
        }

        fn recv(&mut self, _timeout: Duration) -> io::Result<Option<(Vec<u8>, IpAddr)>> {
            Ok(self.inbox.pop_front())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fake::FakeSocket;
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn fake_socket_records_sent_packets() {
        let mut s = FakeSocket::default();
        s.send_to(IpAddr::V4(Ipv4Addr::LOCALHOST), &[1, 2, 3]).unwrap();
        assert_eq!(s.sent.len(), 1);
        assert_eq!(s.sent[0].1, vec![1, 2, 3]);
    }

    #[test]
    fn fake_socket_recv_drains_inbox_in_order() {
        let mut s = FakeSocket::default();
        let a = IpAddr::V4(Ipv4Addr::LOCALHOST);
        s.inbox.push_back((vec![1], a));
        s.inbox.push_back((vec![2], a));
        assert_eq!(s.recv(Duration::ZERO).unwrap().unwrap().0, vec![1]);
        assert_eq!(s.recv(Duration::ZERO).unwrap().unwrap().0, vec![2]);
        assert!(s.recv(Duration::ZERO).unwrap().is_none());
    }

    #[test]
    fn fake_socket_send_failure_is_reported() {
        let mut s = FakeSocket { fail_send: true, ..Default::default() };
        assert!(s.send_to(IpAddr::V4(Ipv4Addr::LOCALHOST), &[1]).is_err());
    }
}
