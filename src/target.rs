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

//! The target table: one entry per host being probed, carrying address,
//! display name, cumulative/interval statistics and the per-trial buffer.

use crate::clock::TimeNs;
use std::net::IpAddr;

/// One slot of the per-trial response buffer used in count mode
/// (`-c`/`-C`). Normalizes every slot to `Unused` up front so index 0
/// is never confused with "received at 0ns" (see spec §9 open question).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RespSlot {
    Unused,
    Waiting,
    Error,
    Timeout,
    Rtt(TimeNs),
}

impl RespSlot {
    pub fn is_nonnegative_rtt(&self) -> bool {
        matches!(self, RespSlot::Rtt(_))
    }
}

/// Cumulative or interval statistics for one host.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostStats {
    pub num_sent: u64,
    pub num_recv: u64,
    pub num_recv_total: u64,
    pub min_reply_ns: TimeNs,
    pub max_reply_ns: TimeNs,
    pub total_time_ns: i128,
}

impl HostStats {
    pub fn reset(&mut self) {
        *self = HostStats::default();
    }

    pub fn avg_reply_ns(&self) -> Option<i128> {
        if self.num_recv == 0 {
            None
        } else {
            Some(self.total_time_ns / self.num_recv as i128)
        }
    }

    fn record_latency(&mut self, latency_ns: TimeNs) {
        if self.max_reply_ns == 0 || latency_ns > self.max_reply_ns {
            self.max_reply_ns = latency_ns;
        }
        if self.min_reply_ns == 0 || latency_ns < self.min_reply_ns {
            self.min_reply_ns = latency_ns;
        }
        self.total_time_ns += latency_ns as i128;
    }
}

#[derive(Debug, Clone)]
pub struct Host {
    pub index: usize,
    /// Name as given by the user (hostname, literal address, or file entry).
    pub name: String,
    /// Label used in reports: name, numeric address, or rDNS result,
    /// depending on -n/-d/-A (resolved ahead of time by `resolve.rs`).
    pub display: String,
    pub addr: IpAddr,
    /// ICMP identifier for this host's probes (low 16 bits of pid, shared
    /// across hosts of the same address family in the real engine; kept
    /// per-host here so tests can drive multiple fake identifiers).
    pub ident: u16,

    /// Time to wait for a response; grows under backoff, resets to
    /// `base_timeout_ns` on any accepted reply.
    pub timeout_ns: TimeNs,
    pub base_timeout_ns: TimeNs,
    pub last_send_time_ns: TimeNs,

    pub cumulative: HostStats,
    pub interval: HostStats,

    /// Count mode only: one slot per trial.
    pub resp_times: Vec<RespSlot>,

    pub alive: bool,
}

impl Host {
    pub fn new(index: usize, name: String, display: String, addr: IpAddr, ident: u16, timeout_ns: TimeNs) -> Self {
        Self {
            index,
            name,
            display,
            addr,
            ident,
            timeout_ns,
            base_timeout_ns: timeout_ns,
            last_send_time_ns: 0,
            cumulative: HostStats::default(),
            interval: HostStats::default(),
            resp_times: Vec::new(),
            alive: false,
        }
    }

    /// Allocate the per-trial buffer for count mode, all slots `Unused`.
    pub fn alloc_trials(&mut self, trials: usize) {
        self.resp_times = vec![RespSlot::Unused; trials];
    }

    pub fn is_count_mode(&self) -> bool {
        !self.resp_times.is_empty()
    }

    /// §4.7: record a probe outcome. `count_mode` controls whether
    /// `resp_times` is written; a `None` `ping_index` or an index past the
    /// buffer is ignored for that bookkeeping (shouldn't happen in
    /// practice, but keeps this infallible).
    pub fn record(&mut self, ping_index: u64, success: bool, latency_ns: TimeNs) {
        self.cumulative.num_sent += 1;
        self.interval.num_sent += 1;

        if !success {
            self.set_resp(ping_index, RespSlot::Timeout);
            return;
        }

        self.cumulative.num_recv += 1;
        self.interval.num_recv += 1;
        self.cumulative.record_latency(latency_ns);
        self.interval.record_latency(latency_ns);
        self.set_resp(ping_index, RespSlot::Rtt(latency_ns));
    }

    fn set_resp(&mut self, ping_index: u64, slot: RespSlot) {
        if let Some(s) = self.resp_times.get_mut(ping_index as usize) {
            *s = slot;
        }
    }

    pub fn mark_waiting(&mut self, ping_index: u64) {
        self.set_resp(ping_index, RespSlot::Waiting);
    }

    pub fn mark_error(&mut self, ping_index: u64) {
        self.set_resp(ping_index, RespSlot::Error);
    }

    pub fn reset_interval(&mut self) {
        self.interval.reset();
    }

    pub fn loss_percent(&self) -> f64 {
        if self.cumulative.num_sent == 0 {
            return 0.0;
        }
        100.0 * (self.cumulative.num_sent - self.cumulative.num_recv) as f64
            / self.cumulative.num_sent as f64
    }
}

/// The fixed-size ordered list of hosts being probed.
#[derive(Debug, Default)]
pub struct TargetTable {
    pub hosts: Vec<Host>,
}

impl TargetTable {
    pub fn new(hosts: Vec<Host>) -> Self {
        Self { hosts }
    }

    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn host() -> Host {
        Host::new(
            0,
            "h".into(),
            "h".into(),
            IpAddr::V4(Ipv4Addr::LOCALHOST),
            1234,
            500_000_000,
        )
    }

    #[test]
    fn record_success_updates_min_max_sum() {
        let mut h = host();
        h.record(0, true, 100);
        h.record(1, true, 50);
        h.record(2, true, 200);
        assert_eq!(h.cumulative.num_recv, 3);
        assert_eq!(h.cumulative.min_reply_ns, 50);
        assert_eq!(h.cumulative.max_reply_ns, 200);
        assert_eq!(h.cumulative.total_time_ns, 350);
    }

    #[test]
    fn record_failure_does_not_touch_recv_stats() {
        let mut h = host();
        h.record(0, false, 0);
        assert_eq!(h.cumulative.num_sent, 1);
        assert_eq!(h.cumulative.num_recv, 0);
    }

    #[test]
    fn resp_times_normalized_to_unused() {
        let mut h = host();
        h.alloc_trials(4);
        assert!(h.resp_times.iter().all(|s| *s == RespSlot::Unused));
    }

    #[test]
    fn resp_times_track_count_mode_slots() {
        let mut h = host();
        h.alloc_trials(3);
        h.mark_waiting(0);
        h.record(0, true, 10);
        h.record(1, false, 0);
        assert_eq!(h.resp_times[0], RespSlot::Rtt(10));
        assert_eq!(h.resp_times[1], RespSlot::Timeout);
        assert_eq!(h.resp_times[2], RespSlot::Unused);
    }

    #[test]
    fn interval_reset_zeroes_only_interval_counters() {
        let mut h = host();
        h.record(0, true, 10);
        h.reset_interval();
        assert_eq!(h.interval.num_sent, 0);
        assert_eq!(h.cumulative.num_sent, 1);
    }

    #[test]
    fn loss_percent_with_no_sends_is_zero() {
        let h = host();
        assert_eq!(h.loss_percent(), 0.0);
    }
}
