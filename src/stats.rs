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

//! Run-wide counters, separate from any one host's `HostStats`. These
//! back the final summary block and the `--reachable` exit-code check.

use crate::clock::TimeNs;

#[derive(Debug, Default, Clone, Copy)]
pub struct GlobalStats {
    pub num_hosts: u64,
    pub num_alive: u64,
    pub num_unreachable: u64,
    pub num_noaddress: u64,

    pub num_timeout: u64,
    pub num_pingsent: u64,
    pub num_pingreceived: u64,
    pub num_othericmprcvd: u64,

    pub min_reply_ns: TimeNs,
    pub max_reply_ns: TimeNs,
    pub total_replies: u64,
    pub sum_replies_ns: i128,
}

impl GlobalStats {
    /// Mirrors a host's `record_latency`: zero is "unset", not a real
    /// minimum/maximum. Only called for replies accepted past the
    /// duplicate/late checks -- `num_pingreceived` counts every
    /// recognized reply and is tracked separately, since it updates
    /// even for replies that are later discarded as duplicates or late.
    pub fn record_reply(&mut self, latency_ns: TimeNs) {
        self.total_replies += 1;
        self.sum_replies_ns += latency_ns as i128;
        if self.max_reply_ns == 0 || latency_ns > self.max_reply_ns {
            self.max_reply_ns = latency_ns;
        }
        if self.min_reply_ns == 0 || latency_ns < self.min_reply_ns {
            self.min_reply_ns = latency_ns;
        }
    }

    pub fn record_send(&mut self) {
        self.num_pingsent += 1;
    }

    pub fn record_timeout(&mut self) {
        self.num_timeout += 1;
    }

    pub fn record_other_icmp(&mut self) {
        self.num_othericmprcvd += 1;
    }

    pub fn avg_reply_ns(&self) -> Option<i128> {
        if self.total_replies == 0 {
            None
        } else {
            Some(self.sum_replies_ns / self.total_replies as i128)
        }
    }

    /// Finalizes per-host alive/unreachable/noaddress tallies. Called
    /// once at shutdown after every host's final state is known.
    /// `num_alive` is not derived here: `process_one_reply` already
    /// increments it exactly once per host on that host's first accepted
    /// reply. This only tallies `num_hosts`/`num_unreachable`/
    /// `num_noaddress` from each host's final state, matching `fping`'s
    /// shutdown loop, which likewise only increments `num_unreachable`.
    pub fn tally_hosts(&mut self, hosts: impl Iterator<Item = (bool, bool)>) {
        for (alive, has_address) in hosts {
            self.num_hosts += 1;
            if !has_address {
                self.num_noaddress += 1;
            } else if !alive {
                self.num_unreachable += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_reply_tracks_min_max_and_average() {
        let mut s = GlobalStats::default();
        s.record_reply(100);
        s.record_reply(50);
        s.record_reply(300);
        assert_eq!(s.min_reply_ns, 50);
        assert_eq!(s.max_reply_ns, 300);
        assert_eq!(s.avg_reply_ns(), Some(150));
    }

    #[test]
    fn avg_with_no_replies_is_none() {
        let s = GlobalStats::default();
        assert_eq!(s.avg_reply_ns(), None);
    }

    #[test]
    fn tally_hosts_splits_unreachable_noaddress_but_not_alive() {
        let mut s = GlobalStats::default();
        s.tally_hosts(vec![(true, true), (false, true), (false, false)].into_iter());
        assert_eq!(s.num_hosts, 3);
        // `num_alive` comes only from `process_one_reply`; a bare tally
        // of host states never touches it.
        assert_eq!(s.num_alive, 0);
        assert_eq!(s.num_unreachable, 1);
        assert_eq!(s.num_noaddress, 1);
    }
}
