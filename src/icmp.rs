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

//! Wire encoding and parsing of ICMP Echo and Timestamp packets.
//!
//! This module is the "duck-typed ICMP variant" of the spec (§9):
//! {Echo-v4, Echo-v6, Timestamp-v4}, each knowing how to encode a
//! request and recognize its own reply. It never touches a socket --
//! `socket.rs` owns the transport channels and calls into here for the
//! bytes.

use pnet::packet::icmp::echo_reply::EchoReplyPacket;
use pnet::packet::icmp::echo_request::MutableEchoRequestPacket;
use pnet::packet::icmp::{IcmpPacket, IcmpTypes};
use pnet::packet::icmpv6::echo_request::MutableEchoRequestPacket as MutableEchov6RequestPacket;
use pnet::packet::icmpv6::{Icmpv6Packet, Icmpv6Types};
use pnet::packet::Packet;
use pnet::util::checksum;

/// ICMP Timestamp payload is fixed regardless of `-b`.
pub const ICMP_TIMESTAMP_DATA_SIZE: usize = 12;
pub const DEFAULT_PING_DATA_SIZE: usize = 56;
/// 65507 = 65535 (max IPv4 packet) - 20 (IP header) - 8 (ICMP header).
pub const MAX_PING_DATA: usize = 65507;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeKind {
    Echo,
    Timestamp,
}

/// Builds an ICMPv4 Echo Request of `payload_len` bytes (zero-filled
/// unless `randomize` is set, in which case it is filled with `rand`).
pub fn encode_echo_v4(seq: u16, ident: u16, payload_len: usize, randomize: bool) -> Vec<u8> {
    let total = 8 + payload_len;
    let mut buf = vec![0u8; total];
    {
        let mut pkt = MutableEchoRequestPacket::new(&mut buf).unwrap();
        pkt.set_icmp_type(IcmpTypes::EchoRequest);
        pkt.set_sequence_number(seq);
        pkt.set_identifier(ident);
        if randomize {
            fill_random(pkt.payload_mut());
        }
        let csum = checksum(pkt.packet(), 1);
        pkt.set_checksum(csum);
    }
    buf
}

/// Builds an ICMPv6 Echo Request. IPv6 checksums are computed by the
/// kernel over a pseudo-header it alone knows, so the checksum field is
/// left at zero per the usual raw-socket convention.
pub fn encode_echo_v6(seq: u16, ident: u16, payload_len: usize, randomize: bool) -> Vec<u8> {
    let total = 8 + payload_len;
    let mut buf = vec![0u8; total];
    {
        let mut pkt = MutableEchov6RequestPacket::new(&mut buf).unwrap();
        pkt.set_icmpv6_type(Icmpv6Types::EchoRequest);
        pkt.set_sequence_number(seq);
        pkt.set_identifier(ident);
        if randomize {
            fill_random(pkt.payload_mut());
        }
    }
    buf
}

/// Builds an ICMPv4 Timestamp Request. Layout after the 4-byte ICMP
/// header: identifier(2) sequence(2) originate(4) receive(4)
/// transmit(4) -- the 12-byte "timestamp payload" of the spec is the
/// three 4-byte timestamps.
pub fn encode_timestamp_v4(seq: u16, ident: u16, originate_ms: u32) -> Vec<u8> {
    let mut buf = vec![0u8; 8 + ICMP_TIMESTAMP_DATA_SIZE];
    buf[0] = 13; // ICMP Timestamp
    buf[1] = 0;
    buf[4..6].copy_from_slice(&ident.to_be_bytes());
    buf[6..8].copy_from_slice(&seq.to_be_bytes());
    buf[8..12].copy_from_slice(&originate_ms.to_be_bytes());
    // receive/transmit timestamps are filled in by the replying host.
    let csum = checksum(&buf, 1);
    buf[2..4].copy_from_slice(&csum.to_be_bytes());
    buf
}

fn fill_random(payload: &mut [u8]) {
    use rand::RngCore;
    rand::thread_rng().fill_bytes(payload);
}

/// The fields the reply correlator needs out of a decoded packet.
#[derive(Debug, Clone, Copy)]
pub struct ParsedIcmp {
    pub icmp_type: u8,
    pub icmp_code: u8,
    pub id: u16,
    pub seq: u16,
    /// True only for an accepted Echo/Timestamp reply; false means this
    /// is some other ICMP message whose `id`/`seq` were recovered from
    /// its quoted original packet.
    pub is_reply: bool,
    /// Present only for a Timestamp Reply: (originate, receive, transmit).
    pub timestamps: Option<(u32, u32, u32)>,
}

/// Parse a raw ICMPv4 packet (as handed back by
/// `pnet::transport::icmp_packet_iter`, i.e. with any IP header already
/// stripped). Returns `None` if the buffer is too short to contain an
/// ICMP header, or if it's some other ICMP message we can't attribute
/// to a host of ours.
pub fn parse_v4(buf: &[u8], want: ProbeKind) -> Option<ParsedIcmp> {
    let pkt = IcmpPacket::new(buf)?;
    let icmp_type = pkt.get_icmp_type().0;
    let icmp_code = pkt.get_icmp_code().0;

    let want_reply_type = match want {
        ProbeKind::Echo => IcmpTypes::EchoReply.0,
        ProbeKind::Timestamp => 14, // ICMP Timestamp Reply
    };

    if icmp_type == want_reply_type {
        let reply = EchoReplyPacket::new(buf)?;
        let timestamps = if want == ProbeKind::Timestamp && buf.len() >= 8 + ICMP_TIMESTAMP_DATA_SIZE {
            let o = u32::from_be_bytes(buf[8..12].try_into().ok()?);
            let r = u32::from_be_bytes(buf[12..16].try_into().ok()?);
            let t = u32::from_be_bytes(buf[16..20].try_into().ok()?);
            Some((o, r, t))
        } else {
            None
        };
        return Some(ParsedIcmp {
            icmp_type,
            icmp_code,
            id: reply.get_identifier(),
            seq: reply.get_sequence_number(),
            is_reply: true,
            timestamps,
        });
    }

    // Other ICMP message: try to recover the quoted original packet's
    // id/seq so the caller can still attribute it to a host (spec §4.5
    // step 3). Quoted packet = IP header (>=20 bytes) + ICMP header.
    let icmp_hdr_len = 8;
    if buf.len() < icmp_hdr_len + 20 + 8 {
        return None;
    }
    let quoted = &buf[icmp_hdr_len + 20..];
    let quoted_type = quoted[0];
    let expect_sent_type = match want {
        ProbeKind::Echo => IcmpTypes::EchoRequest.0,
        ProbeKind::Timestamp => 13,
    };
    if quoted_type != expect_sent_type {
        return None;
    }
    let quoted_id = u16::from_be_bytes(quoted[4..6].try_into().ok()?);
    let quoted_seq = u16::from_be_bytes(quoted[6..8].try_into().ok()?);
    Some(ParsedIcmp {
        icmp_type,
        icmp_code,
        id: quoted_id,
        seq: quoted_seq,
        is_reply: false,
        timestamps: None,
    })
}

/// Parse a raw ICMPv6 packet. ICMPv6's "other message" quoting path is
/// not implemented: Destination Unreachable / Time Exceeded etc. are
/// simply dropped, matching the fact that the core only requires Echo
/// correlation to work end to end for IPv6.
pub fn parse_v6(buf: &[u8]) -> Option<ParsedIcmp> {
    let pkt = Icmpv6Packet::new(buf)?;
    let icmp_type = pkt.get_icmpv6_type().0;
    let icmp_code = pkt.get_icmpv6_code().0;
    if icmp_type != Icmpv6Types::EchoReply.0 {
        return None;
    }
    if buf.len() < 8 {
        return None;
    }
    let id = u16::from_be_bytes(buf[4..6].try_into().ok()?);
    let seq = u16::from_be_bytes(buf[6..8].try_into().ok()?);
    Some(ParsedIcmp {
        icmp_type,
        icmp_code,
        id,
        seq,
        is_reply: true,
        timestamps: None,
    })
}

/// Human name for an ICMPv4 type, for warning lines about "other" ICMP
/// packets received while probing (spec §4.5 step 3).
pub fn icmp_type_str(t: u8) -> &'static str {
    match t {
        0 => "ICMP Echo Reply",
        3 => "ICMP Unreachable",
        4 => "ICMP Source Quench",
        5 => "ICMP Redirect",
        8 => "ICMP Echo",
        9 => "ICMP Router Advertisement",
        10 => "ICMP Router Solicitation",
        11 => "ICMP Time Exceeded",
        12 => "ICMP Parameter Problem",
        13 => "ICMP Timestamp Request",
        14 => "ICMP Timestamp Reply",
        15 => "ICMP Information Request",
        16 => "ICMP Information Reply",
        17 => "ICMP Mask Request",
        18 => "ICMP Mask Reply",
        _ => "",
    }
}

pub fn icmp_unreach_str(code: u8) -> &'static str {
    const NAMES: [&str; 16] = [
        "ICMP Network Unreachable",
        "ICMP Host Unreachable",
        "ICMP Protocol Unreachable",
        "ICMP Port Unreachable",
        "ICMP Unreachable (Fragmentation Needed)",
        "ICMP Unreachable (Source Route Failed)",
        "ICMP Unreachable (Destination Network Unknown)",
        "ICMP Unreachable (Destination Host Unknown)",
        "ICMP Unreachable (Source Host Isolated)",
        "ICMP Unreachable (Communication with Network Prohibited)",
        "ICMP Unreachable (Communication with Host Prohibited)",
        "ICMP Unreachable (Network Unreachable For Type Of Service)",
        "ICMP Unreachable (Host Unreachable For Type Of Service)",
        "ICMP Unreachable (Communication Administratively Prohibited)",
        "ICMP Unreachable (Host Precedence Violation)",
        "ICMP Unreachable (Precedence cutoff in effect)",
    ];
    NAMES.get(code as usize).copied().unwrap_or("ICMP Unreachable (Invalid Code)")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn echo_v4_roundtrips_id_and_seq() {
        let buf = encode_echo_v4(42, 1234, 16, false);
        let pkt = EchoReplyPacket::new(&buf).unwrap(); // same layout as request
        assert_eq!(pkt.get_sequence_number(), 42);
        assert_eq!(pkt.get_identifier(), 1234);
    }

    #[test]
    fn echo_v4_default_payload_matches_traditional_ping() {
        let buf = encode_echo_v4(1, 1, DEFAULT_PING_DATA_SIZE, false);
        assert_eq!(buf.len(), 8 + DEFAULT_PING_DATA_SIZE);
    }

    #[test]
    fn zero_length_payload_is_accepted() {
        let buf = encode_echo_v4(1, 1, 0, false);
        assert_eq!(buf.len(), 8);
    }

    #[test]
    fn timestamp_payload_is_exactly_twelve_bytes_plus_header() {
        let buf = encode_timestamp_v4(7, 99, 12345);
        assert_eq!(buf.len(), 8 + ICMP_TIMESTAMP_DATA_SIZE);
        assert_eq!(buf[0], 13);
    }

    #[test]
    fn parse_v4_echo_reply_recovers_id_seq() {
        let mut buf = encode_echo_v4(42, 1234, 16, false);
        buf[0] = 0; // EchoReply
        let parsed = parse_v4(&buf, ProbeKind::Echo).unwrap();
        assert!(parsed.is_reply);
        assert_eq!(parsed.id, 1234);
        assert_eq!(parsed.seq, 42);
    }

    #[test]
    fn parse_v4_rejects_short_buffer() {
        assert!(parse_v4(&[0, 0], ProbeKind::Echo).is_none());
    }

    #[test]
    fn icmp_type_str_matches_known_names() {
        assert_eq!(icmp_type_str(8), "ICMP Echo");
        assert_eq!(icmp_type_str(255), "");
    }
}
