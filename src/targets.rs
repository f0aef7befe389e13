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

//! Target acquisition: positional arguments, `-f FILE`/stdin
//! tokenization, and `-g` CIDR/range expansion into literal target
//! name strings. Resolution to an actual `IpAddr` happens later, in
//! `resolve.rs` -- this module only ever produces strings.

use crate::error::TargetError;
use std::io::{BufRead, BufReader, Read};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// Maximum number of hosts that `-g` may generate.
pub const MAX_GENERATE: usize = 131072;
/// Maximum target name length accepted from a target file.
pub const MAX_TARGET_NAME_LEN: usize = 255;

/// Read target names, one per (possibly wrapped) line, skipping blank
/// lines and lines whose first word starts with `#`. Mirrors fping's
/// line tokenizer, minus its line-length-limited buffered-read quirks --
/// `BufRead::lines()` has no such limit, so only the name-length and
/// comment rules are reproduced.
pub fn read_target_file<R: Read>(r: R) -> Result<Vec<String>, TargetError> {
    let reader = BufReader::new(r);
    let mut out = vec![];
    for line in reader.lines() {
        let line = line.map_err(|_| TargetError::Unresolvable("<file>".into()))?;
        let first = match line.split_whitespace().next() {
            Some(w) => w,
            None => continue, // blank line
        };
        if first.starts_with('#') {
            continue;
        }
        if first.len() > MAX_TARGET_NAME_LEN {
            return Err(TargetError::NameTooLong(first.to_string(), MAX_TARGET_NAME_LEN));
        }
        out.push(first.to_string());
    }
    Ok(out)
}

/// Expand a CIDR prefix (e.g. `10.0.0.0/30`) into literal addresses.
/// For IPv4 prefixes shorter than /31, the network and broadcast
/// addresses are excluded; /31 and /32 include every address in range.
pub fn expand_cidr(spec: &str) -> Result<Vec<String>, TargetError> {
    let (addr_str, mask_str) = spec
        .rsplit_once('/')
        .ok_or_else(|| TargetError::InvalidRange(spec.to_string()))?;
    let mask: u32 = mask_str
        .parse()
        .map_err(|_| TargetError::InvalidRange(spec.to_string()))?;

    match addr_str.parse::<IpAddr>() {
        Ok(IpAddr::V4(addr)) => expand_cidr_v4(addr, mask),
        Ok(IpAddr::V6(addr)) => expand_cidr_v6(addr, mask),
        Err(_) => Err(TargetError::InvalidRange(spec.to_string())),
    }
}

fn expand_cidr_v4(addr: Ipv4Addr, mask: u32) -> Result<Vec<String>, TargetError> {
    if mask < 1 || mask > 32 {
        return Err(TargetError::InvalidRange(format!(
            "netmask must be between 1 and 32 (is: {})",
            mask
        )));
    }
    let bitmask: u32 = if mask == 0 { 0 } else { u32::MAX << (32 - mask) };
    let net_addr = u32::from(addr) & bitmask;
    let mut net_last = net_addr + (1u32 << (32 - mask)) - 1;
    let mut net_first = net_addr;
    if mask < 31 {
        net_last -= 1;
        net_first += 1;
    }
    expand_addr_range_v4(net_first, net_last)
}

fn expand_cidr_v6(addr: Ipv6Addr, mask: u32) -> Result<Vec<String>, TargetError> {
    if mask < 65 || mask > 128 {
        return Err(TargetError::InvalidRange(format!(
            "netmask must be between 65 and 128 (is: {})",
            mask
        )));
    }
    let octets = addr.octets();
    let upper = u64::from_be_bytes(octets[0..8].try_into().unwrap());
    let lower = u64::from_be_bytes(octets[8..16].try_into().unwrap());
    let bitmask_lower: u64 = u64::MAX << (128 - mask);
    let net_lower = lower & bitmask_lower;
    let last_lower = net_lower + (1u64 << (128 - mask)) - 1;
    expand_addr_range_v6(upper, net_lower, upper, last_lower)
}

/// Expand an explicit `start end` address pair (`-g start end`).
pub fn expand_range(start: &str, end: &str) -> Result<Vec<String>, TargetError> {
    let start_addr: IpAddr = start
        .parse()
        .map_err(|_| TargetError::InvalidRange(start.to_string()))?;
    let end_addr: IpAddr = end
        .parse()
        .map_err(|_| TargetError::InvalidRange(end.to_string()))?;
    match (start_addr, end_addr) {
        (IpAddr::V4(s), IpAddr::V4(e)) => expand_addr_range_v4(u32::from(s), u32::from(e)),
        (IpAddr::V6(s), IpAddr::V6(e)) => {
            let so = s.octets();
            let eo = e.octets();
            let su = u64::from_be_bytes(so[0..8].try_into().unwrap());
            let sl = u64::from_be_bytes(so[8..16].try_into().unwrap());
            let eu = u64::from_be_bytes(eo[0..8].try_into().unwrap());
            let el = u64::from_be_bytes(eo[8..16].try_into().unwrap());
            expand_addr_range_v6(su, sl, eu, el)
        }
        _ => Err(TargetError::FamilyMismatch(format!("{} / {}", start, end))),
    }
}

fn expand_addr_range_v4(start: u32, end: u32) -> Result<Vec<String>, TargetError> {
    if end < start {
        return Ok(vec![]);
    }
    if (end - start) as usize >= MAX_GENERATE {
        return Err(TargetError::TooManyGenerated(MAX_GENERATE));
    }
    Ok((start..=end).map(|n| Ipv4Addr::from(n).to_string()).collect())
}

fn expand_addr_range_v6(start_upper: u64, start_lower: u64, end_upper: u64, end_lower: u64) -> Result<Vec<String>, TargetError> {
    // Mirrors fping's overflow-safe bound check: reject ranges that
    // clearly exceed MAX_GENERATE without computing the (possibly huge)
    // exact count.
    let too_many = (start_upper + 1 < end_upper)
        || (start_upper + 1 == end_upper && end_lower >= start_lower)
        || (start_upper == end_upper
            && end_lower.checked_sub(MAX_GENERATE as u64).map_or(false, |v| v >= start_lower));
    if too_many {
        return Err(TargetError::TooManyGenerated(MAX_GENERATE));
    }
    let mut out = vec![];
    let mut upper = start_upper;
    let mut lower = start_lower;
    loop {
        if upper > end_upper || (upper == end_upper && lower > end_lower) {
            break;
        }
        let mut octets = [0u8; 16];
        octets[0..8].copy_from_slice(&upper.to_be_bytes());
        octets[8..16].copy_from_slice(&lower.to_be_bytes());
        out.push(Ipv6Addr::from(octets).to_string());
        if out.len() > MAX_GENERATE {
            return Err(TargetError::TooManyGenerated(MAX_GENERATE));
        }
        lower = lower.wrapping_add(1);
        if lower == 0 {
            upper += 1;
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn reads_targets_skipping_comments_and_blanks() {
        let input = "10.0.0.1\n# a comment\n\n  10.0.0.2  extra ignored\n";
        let out = read_target_file(Cursor::new(input)).unwrap();
        assert_eq!(out, vec!["10.0.0.1", "10.0.0.2"]);
    }

    #[test]
    fn rejects_overlong_target_name() {
        let long = "a".repeat(300);
        let err = read_target_file(Cursor::new(long)).unwrap_err();
        assert!(matches!(err, TargetError::NameTooLong(_, 255)));
    }

    #[test]
    fn cidr_slash_30_excludes_network_and_broadcast() {
        let hosts = expand_cidr("10.0.0.0/30").unwrap();
        assert_eq!(hosts, vec!["10.0.0.1", "10.0.0.2"]);
    }

    #[test]
    fn cidr_slash_31_includes_both_endpoints() {
        let hosts = expand_cidr("10.0.0.0/31").unwrap();
        assert_eq!(hosts, vec!["10.0.0.0", "10.0.0.1"]);
    }

    #[test]
    fn explicit_range_expands_inclusive() {
        let hosts = expand_range("10.0.0.1", "10.0.0.3").unwrap();
        assert_eq!(hosts, vec!["10.0.0.1", "10.0.0.2", "10.0.0.3"]);
    }

    #[test]
    fn range_rejects_mixed_families() {
        let err = expand_range("10.0.0.1", "::1").unwrap_err();
        assert!(matches!(err, TargetError::FamilyMismatch(_)));
    }

    #[test]
    fn cidr_rejects_out_of_bounds_mask() {
        let err = expand_cidr("10.0.0.0/33").unwrap_err();
        assert!(matches!(err, TargetError::InvalidRange(_)));
    }

    #[test]
    fn cidr_slash_32_is_single_host() {
        let hosts = expand_cidr("10.0.0.5/32").unwrap();
        assert_eq!(hosts, vec!["10.0.0.5"]);
    }
}
