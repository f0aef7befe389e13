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

//! Name <-> address resolution and display-name policy.
//!
//! The engine never sees a hostname: by the time a target reaches
//! `TargetTable`, it carries a resolved `IpAddr` and a precomputed
//! `display` label chosen according to `-n`/`-d`/`-A`.

use crate::error::TargetError;
use dns_lookup::{getaddrinfo, lookup_addr, AddrFamily};
use std::net::IpAddr;

/// Which label to show for a resolved target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayPolicy {
    /// Show the name as given (default when a name was typed).
    AsGiven,
    /// Force the literal numeric address (`-A`).
    Numeric,
    /// Force reverse-DNS lookup of the resolved address (`-d`).
    Reverse,
}

#[derive(Debug, Clone)]
pub struct Resolved {
    pub addr: IpAddr,
    pub display: String,
}

/// Family restriction requested via `-4`/`-6`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FamilyPref {
    Any,
    V4,
    V6,
}

/// Resolve one target name (hostname or literal address) to an address
/// and display label, honoring `-4`/`-6`, `-n`/`-d`/`-A`.
pub fn resolve(name: &str, family: FamilyPref, policy: DisplayPolicy) -> Result<Resolved, TargetError> {
    let addr = if let Ok(ip) = name.parse::<IpAddr>() {
        match (family, ip) {
            (FamilyPref::V4, IpAddr::V6(_)) | (FamilyPref::V6, IpAddr::V4(_)) => {
                return Err(TargetError::FamilyMismatch(name.to_string()))
            }
            _ => ip,
        }
    } else {
        let af = match family {
            FamilyPref::Any => None,
            FamilyPref::V4 => Some(AddrFamily::Inet),
            FamilyPref::V6 => Some(AddrFamily::Inet6),
        };
        let addrs = getaddrinfo(Some(name), None, None)
            .map_err(|_| TargetError::Unresolvable(name.to_string()))?;
        let mut chosen = None;
        for a in addrs.flatten() {
            let ip = a.sockaddr.ip();
            let matches = match af {
                None => true,
                Some(AddrFamily::Inet) => ip.is_ipv4(),
                Some(AddrFamily::Inet6) => ip.is_ipv6(),
                _ => true,
            };
            if matches {
                chosen = Some(ip);
                break;
            }
        }
        chosen.ok_or_else(|| TargetError::Unresolvable(name.to_string()))?
    };

    let display = match policy {
        DisplayPolicy::AsGiven => name.to_string(),
        DisplayPolicy::Numeric => addr.to_string(),
        DisplayPolicy::Reverse => lookup_addr(&addr).unwrap_or_else(|_| addr.to_string()),
    };

    Ok(Resolved { addr, display })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_ipv4_resolves_without_dns() {
        let r = resolve("127.0.0.1", FamilyPref::Any, DisplayPolicy::AsGiven).unwrap();
        assert_eq!(r.addr, "127.0.0.1".parse::<IpAddr>().unwrap());
        assert_eq!(r.display, "127.0.0.1");
    }

    #[test]
    fn numeric_policy_uses_address_even_for_literal_input() {
        let r = resolve("127.0.0.1", FamilyPref::Any, DisplayPolicy::Numeric).unwrap();
        assert_eq!(r.display, "127.0.0.1");
    }

    #[test]
    fn family_mismatch_on_literal_address_is_rejected() {
        let err = resolve("::1", FamilyPref::V4, DisplayPolicy::AsGiven).unwrap_err();
        assert!(matches!(err, TargetError::FamilyMismatch(_)));
    }

    #[test]
    fn ipv6_literal_with_v6_family_is_accepted() {
        let r = resolve("::1", FamilyPref::V6, DisplayPolicy::AsGiven).unwrap();
        assert!(r.addr.is_ipv6());
    }
}
