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

//! The core event loop: dispatches pings, correlates replies, retires
//! timeouts. Deliberately knows nothing about stdout/stderr -- every
//! reportable thing that happens during a `step()` is appended to the
//! returned `Vec<Notice>`, which `report.rs` turns into text.

use crate::clock::{Clock, TimeNs};
use crate::error::EngineError;
use crate::event::{slot_for, EventQueue};
use crate::icmp::{self, ProbeKind};
use crate::seqmap::SequenceMap;
use crate::socket::IcmpSocket;
use crate::stats::GlobalStats;
use crate::target::{RespSlot, TargetTable};
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// How many trials fping(8) schedules per host, and therefore how many
/// `event_storage_count` slots each host needs so a slot is never
/// reused while a prior trial is still outstanding. Mirrors the sizing
/// rule in `main()`: count mode needs one slot per trial; loop mode
/// needs enough slots to cover every retry that can be in flight at
/// once.
pub fn event_storage_count(count_mode: Option<u64>, loop_flag: bool, timeout_ns: TimeNs, perhost_interval_ns: TimeNs) -> usize {
    if let Some(count) = count_mode {
        return count.max(1) as usize;
    }
    if loop_flag {
        if perhost_interval_ns > timeout_ns {
            1
        } else {
            1 + (timeout_ns / perhost_interval_ns.max(1)) as usize
        }
    } else {
        1
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Family {
    V4,
    V6,
}

fn family_of(addr: IpAddr) -> Family {
    match addr {
        IpAddr::V4(_) => Family::V4,
        IpAddr::V6(_) => Family::V6,
    }
}

/// True iff a send error is `EHOSTDOWN`, the one send failure the spec
/// (§4.4 step 6, §7) calls out as a silent miss rather than a warning.
#[cfg(unix)]
fn is_host_down(e: &std::io::Error) -> bool {
    e.raw_os_error() == Some(libc::EHOSTDOWN)
}

#[cfg(not(unix))]
fn is_host_down(_e: &std::io::Error) -> bool {
    false
}

/// Configuration an `Engine` is built from. Kept separate from `Engine`
/// itself so `main.rs` can assemble it straight out of `cli.rs`.
pub struct EngineConfig {
    pub probe_kind: ProbeKind,
    pub payload_len: usize,
    pub randomize_payload: bool,
    pub timeout_ns: TimeNs,
    pub interval_ns: TimeNs,
    pub perhost_interval_ns: TimeNs,
    pub retry: u32,
    pub backoff: f64,
    pub loop_flag: bool,
    pub count: Option<u64>,
    pub report_interval_ns: Option<TimeNs>,
    pub check_source: bool,
    pub min_reachable: Option<u64>,
}

/// Things that happened during a `step()`, for `report.rs` to render.
#[derive(Debug, Clone)]
pub enum Notice {
    Sent { host_idx: usize },
    SendError { host_idx: usize, ping_index: u64 },
    Reply { host_idx: usize, ping_index: u64, rtt_ns: TimeNs, bytes: usize },
    Duplicate { host_idx: usize, ping_index: u64, rtt_ns: TimeNs },
    Timeout { host_idx: usize, ping_index: u64 },
    FirstAlive { host_idx: usize },
    OtherIcmp { icmp_type: u8, icmp_code: u8 },
    ReportDue,
}

pub struct Engine<S: IcmpSocket> {
    clock: Clock,
    pub targets: TargetTable,
    ping_queue: EventQueue,
    timeout_queue: EventQueue,
    seqmap: SequenceMap,
    event_storage_count: usize,
    cfg: EngineConfig,

    ident_v4: u16,
    ident_v6: u16,
    last_send_time_ns: TimeNs,
    next_report_time_ns: Option<TimeNs>,

    pub finish_requested: Arc<AtomicBool>,
    pub status_snapshot: Arc<AtomicBool>,

    pub stats: GlobalStats,

    socket_v4: Option<S>,
    socket_v6: Option<S>,
}

impl<S: IcmpSocket> Engine<S> {
    pub fn new(
        targets: TargetTable,
        cfg: EngineConfig,
        socket_v4: Option<S>,
        socket_v6: Option<S>,
        ident_v4: u16,
        ident_v6: u16,
    ) -> Result<Self, EngineError> {
        if socket_v4.is_none() && socket_v6.is_none() {
            return Err(EngineError::NoSocket);
        }
        let storage = event_storage_count(cfg.count, cfg.loop_flag, cfg.timeout_ns, cfg.perhost_interval_ns);
        let total_slots = targets.len().max(1) * storage;
        let max_age_ns = if cfg.loop_flag || cfg.count.is_some() {
            cfg.timeout_ns
        } else {
            let mut age = cfg.timeout_ns as f64;
            let mut factor = 1.0;
            for _ in 0..cfg.retry {
                factor *= cfg.backoff;
            }
            age *= factor;
            age as TimeNs
        };
        let clock = Clock::new();
        let now = clock.now_ns();
        let next_report_time_ns = cfg.report_interval_ns.map(|r| now + r);
        Ok(Self {
            clock,
            targets,
            ping_queue: EventQueue::new(total_slots),
            timeout_queue: EventQueue::new(total_slots),
            seqmap: SequenceMap::new(max_age_ns),
            event_storage_count: storage,
            cfg,
            ident_v4,
            ident_v6,
            last_send_time_ns: TimeNs::MIN / 2,
            next_report_time_ns,
            finish_requested: Arc::new(AtomicBool::new(false)),
            status_snapshot: Arc::new(AtomicBool::new(false)),
            stats: GlobalStats::default(),
            socket_v4,
            socket_v6,
        })
    }

    /// Queue every host's first ping, due immediately. Pacing against
    /// the global `interval` happens when these events are dispatched,
    /// not here.
    pub fn schedule_initial_pings(&mut self) {
        let now = self.clock.now_ns();
        let count = self.targets.len();
        for idx in 0..count {
            if self.targets.hosts[idx].is_count_mode() {
                let trials = self.targets.hosts[idx].resp_times.len();
                if trials == 0 {
                    continue;
                }
            }
            let slot = slot_for(idx, 0, self.event_storage_count);
            self.ping_queue.enqueue(slot, idx, 0, now);
        }
    }

    pub fn is_done(&self) -> bool {
        self.ping_queue.is_empty() && self.timeout_queue.is_empty()
    }

    fn socket_for(&mut self, family: Family) -> Option<&mut S> {
        match family {
            Family::V4 => self.socket_v4.as_mut(),
            Family::V6 => self.socket_v6.as_mut(),
        }
    }

    fn ident_for(&self, family: Family) -> u16 {
        match family {
            Family::V4 => self.ident_v4,
            Family::V6 => self.ident_v6,
        }
    }

    fn encode(&self, family: Family, seq: u16, ident: u16) -> Vec<u8> {
        match (family, self.cfg.probe_kind) {
            (Family::V4, ProbeKind::Echo) => icmp::encode_echo_v4(seq, ident, self.cfg.payload_len, self.cfg.randomize_payload),
            (Family::V4, ProbeKind::Timestamp) => {
                let originate_ms = (self.clock.now_ns() / 1_000_000) as u32;
                icmp::encode_timestamp_v4(seq, ident, originate_ms)
            }
            (Family::V6, _) => icmp::encode_echo_v6(seq, ident, self.cfg.payload_len, self.cfg.randomize_payload),
        }
    }

    /// §4.4: send one probe for `host_idx`/`ping_index`, scheduling its
    /// timeout, or recording a send error.
    fn send_ping(&mut self, host_idx: usize, ping_index: u64, notices: &mut Vec<Notice>) {
        let now = self.clock.now_ns();
        let family = family_of(self.targets.hosts[host_idx].addr);
        let ident = self.ident_for(family);
        let seq = self.seqmap.add(host_idx, ping_index, now);
        let packet = self.encode(family, seq, ident);
        let addr = self.targets.hosts[host_idx].addr;

        self.targets.hosts[host_idx].last_send_time_ns = now;
        self.last_send_time_ns = now;
        self.stats.record_send();

        let send_result = match self.socket_for(family) {
            Some(sock) => sock.send_to(addr, &packet),
            None => Err(std::io::Error::new(std::io::ErrorKind::AddrNotAvailable, "no socket for family")),
        };

        match send_result {
            Ok(_) => {
                let timeout_ns = self.targets.hosts[host_idx].timeout_ns;
                let slot = slot_for(host_idx, ping_index, self.event_storage_count);
                self.timeout_queue.enqueue(slot, host_idx, ping_index, now + timeout_ns);
                if self.targets.hosts[host_idx].is_count_mode() {
                    self.targets.hosts[host_idx].mark_waiting(ping_index);
                }
                notices.push(Notice::Sent { host_idx });
            }
            Err(e) => {
                self.targets.hosts[host_idx].cumulative.num_sent += 1;
                self.targets.hosts[host_idx].interval.num_sent += 1;
                if self.targets.hosts[host_idx].is_count_mode() {
                    self.targets.hosts[host_idx].mark_error(ping_index);
                }
                // §4.4 step 6 / §7: EHOSTDOWN is a regular miss, never a
                // warning; every other send error still gets one (unless
                // --quiet, enforced by report.rs).
                if !is_host_down(&e) {
                    notices.push(Notice::SendError { host_idx, ping_index });
                }
            }
        }
    }

    /// §4.6: a ping went unanswered. Retries (one-shot mode only, with
    /// backoff) are scheduled here; loop/count mode just records the
    /// loss.
    fn handle_timeout(&mut self, host_idx: usize, ping_index: u64, notices: &mut Vec<Notice>) {
        self.targets.hosts[host_idx].record(ping_index, false, 0);
        self.stats.record_timeout();
        notices.push(Notice::Timeout { host_idx, ping_index });

        if !self.cfg.loop_flag && self.cfg.count.is_none() {
            let sent = self.targets.hosts[host_idx].cumulative.num_sent;
            if sent < self.cfg.retry as u64 + 1 {
                self.targets.hosts[host_idx].timeout_ns =
                    ((self.targets.hosts[host_idx].timeout_ns as f64) * self.cfg.backoff) as TimeNs;
                self.send_ping(host_idx, ping_index, notices);
            }
        }
    }

    /// §4.8 main loop, one full iteration: drain due timeouts, dispatch
    /// at most one due ping (paced by the global interval), then sleep
    /// for the computed wait time and drain all replies that arrive
    /// within it. Returns the notices generated.
    pub fn step(&mut self) -> Vec<Notice> {
        let mut notices = Vec::new();
        let now = self.clock.now_ns();

        while let Some(ev) = self.timeout_queue.peek_first() {
            if ev.due_ns - now > 0 {
                break;
            }
            self.timeout_queue.pop_first();
            self.handle_timeout(ev.host_idx, ev.ping_index, &mut notices);
        }

        if let Some(ev) = self.ping_queue.peek_first() {
            if ev.due_ns - now <= 0 {
                let gap = now - self.last_send_time_ns;
                if gap >= self.cfg.interval_ns {
                    self.ping_queue.pop_first();
                    self.send_ping(ev.host_idx, ev.ping_index, &mut notices);

                    let next_index = ev.ping_index + 1;
                    let schedule_next = self.cfg.loop_flag
                        || matches!(self.cfg.count, Some(c) if next_index < c);
                    if schedule_next {
                        let slot = slot_for(ev.host_idx, next_index, self.event_storage_count);
                        self.ping_queue.enqueue(slot, ev.host_idx, next_index, ev.due_ns + self.cfg.perhost_interval_ns);
                    }
                }
            }
        }

        if self.status_snapshot.swap(false, Ordering::SeqCst) {
            notices.push(Notice::ReportDue);
        }

        let wait = self.compute_wait_ns(now);
        if let Some(w) = wait {
            if w > 0 {
                self.drain_replies(Duration::from_nanos(w as u64), &mut notices);
            } else {
                self.drain_replies(Duration::from_nanos(0), &mut notices);
            }
        }

        if let Some(next) = self.next_report_time_ns {
            let now2 = self.clock.now_ns();
            if now2 >= next {
                notices.push(Notice::ReportDue);
                let interval = self.cfg.report_interval_ns.unwrap_or(1);
                let mut n = next;
                while now2 >= n {
                    n += interval;
                }
                self.next_report_time_ns = Some(n);
            }
        }

        notices
    }

    fn compute_wait_ns(&self, now: TimeNs) -> Option<TimeNs> {
        let mut wait: Option<TimeNs> = None;

        if let Some(ev) = self.ping_queue.peek_first() {
            let mut w = (ev.due_ns - now).max(0);
            if w < self.cfg.interval_ns {
                let gap = now - self.last_send_time_ns;
                if gap < self.cfg.interval_ns {
                    w = self.cfg.interval_ns - gap;
                }
            }
            wait = Some(w);
        }

        if let Some(ev) = self.timeout_queue.peek_first() {
            let w = (ev.due_ns - now).max(0);
            wait = Some(match wait {
                Some(cur) if cur <= w => cur,
                _ => w,
            });
        }

        if let Some(next) = self.next_report_time_ns {
            let w = (next - now).max(0);
            wait = Some(match wait {
                Some(cur) if cur <= w => cur,
                _ => w,
            });
        }

        wait
    }

    /// Blocks up to `timeout` for the first reply, then keeps draining
    /// with a zero timeout until the socket has nothing left queued.
    fn drain_replies(&mut self, timeout: Duration, notices: &mut Vec<Notice>) {
        if self.process_one_reply(timeout, notices) {
            while self.process_one_reply(Duration::from_nanos(0), notices) {}
        }
    }

    fn process_one_reply(&mut self, timeout: Duration, notices: &mut Vec<Notice>) -> bool {
        let (family, packet, src) = match self.receive_any(timeout) {
            Some(v) => v,
            None => return false,
        };

        let want = self.cfg.probe_kind;
        let parsed = match family {
            Family::V4 => icmp::parse_v4(&packet, want),
            Family::V6 => icmp::parse_v6(&packet),
        };
        let parsed = match parsed {
            Some(p) => p,
            None => return true,
        };

        let ident = self.ident_for(family);
        if parsed.id != ident {
            return true;
        }

        if !parsed.is_reply {
            self.stats.record_other_icmp();
            notices.push(Notice::OtherIcmp { icmp_type: parsed.icmp_type, icmp_code: parsed.icmp_code });
            return true;
        }

        let now = self.clock.now_ns();
        let entry = match self.seqmap.fetch(parsed.seq, now) {
            Some(e) => e,
            None => return true,
        };
        let host_idx = entry.host_idx;
        let ping_index = entry.ping_index;
        let rtt_ns = now - entry.send_ns;

        self.targets.hosts[host_idx].cumulative.num_recv_total += 1;
        self.stats.num_pingreceived += 1;

        if self.cfg.check_source && src != self.targets.hosts[host_idx].addr {
            return true;
        }

        let is_count_mode = self.targets.hosts[host_idx].is_count_mode();
        if is_count_mode {
            if let Some(slot) = self.targets.hosts[host_idx].resp_times.get(ping_index as usize) {
                if slot.is_nonnegative_rtt() {
                    notices.push(Notice::Duplicate { host_idx, ping_index, rtt_ns });
                    return true;
                }
            }
        }

        if rtt_ns > self.targets.hosts[host_idx].timeout_ns {
            return true;
        }

        self.targets.hosts[host_idx].record(ping_index, true, rtt_ns);
        self.stats.record_reply(rtt_ns);
        self.targets.hosts[host_idx].timeout_ns = self.targets.hosts[host_idx].base_timeout_ns;

        let slot = slot_for(host_idx, ping_index, self.event_storage_count);
        self.timeout_queue.remove(slot);

        let was_first = self.targets.hosts[host_idx].cumulative.num_recv == 1;
        if was_first {
            self.targets.hosts[host_idx].alive = true;
            self.stats.num_alive += 1;
            notices.push(Notice::FirstAlive { host_idx });
            if let Some(min_reachable) = self.cfg.min_reachable {
                if self.stats.num_alive >= min_reachable {
                    self.finish_requested.store(true, Ordering::SeqCst);
                }
            }
        }

        notices.push(Notice::Reply { host_idx, ping_index, rtt_ns, bytes: packet.len() });
        true
    }

    fn receive_any(&mut self, timeout: Duration) -> Option<(Family, Vec<u8>, IpAddr)> {
        if let Some(sock) = self.socket_v4.as_mut() {
            if let Ok(Some((buf, addr))) = sock.recv(timeout) {
                return Some((Family::V4, buf, addr));
            }
        }
        if let Some(sock) = self.socket_v6.as_mut() {
            if let Ok(Some((buf, addr))) = sock.recv(Duration::from_nanos(0)) {
                return Some((Family::V6, buf, addr));
            }
        }
        None
    }

    pub fn finish_requested(&self) -> bool {
        self.finish_requested.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::socket::fake::FakeSocket;
    use crate::target::Host;
    use std::net::Ipv4Addr;

    fn cfg() -> EngineConfig {
        EngineConfig {
            probe_kind: ProbeKind::Echo,
            payload_len: 16,
            randomize_payload: false,
            timeout_ns: 500_000_000,
            interval_ns: 0,
            perhost_interval_ns: 1_000_000_000,
            retry: 3,
            backoff: 1.5,
            loop_flag: false,
            count: None,
            report_interval_ns: None,
            check_source: false,
            min_reachable: None,
        }
    }

    fn one_host_table() -> TargetTable {
        let h = Host::new(0, "h".into(), "h".into(), IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)), 1234, 500_000_000);
        TargetTable::new(vec![h])
    }

    #[test]
    fn event_storage_count_one_shot_is_one() {
        assert_eq!(event_storage_count(None, false, 500_000_000, 1_000_000_000), 1);
    }

    #[test]
    fn event_storage_count_loop_mode_scales_with_timeout_over_period() {
        assert_eq!(event_storage_count(None, true, 2_000_000_000, 1_000_000_000), 3);
    }

    #[test]
    fn event_storage_count_count_mode_matches_trial_count() {
        assert_eq!(event_storage_count(Some(10), false, 500_000_000, 1_000_000_000), 10);
    }

    #[test]
    fn schedule_and_send_first_ping() {
        let targets = one_host_table();
        let sock = FakeSocket::default();
        let mut engine = Engine::new(targets, cfg(), Some(sock), None, 1234, 1234).unwrap();
        engine.schedule_initial_pings();
        let notices = engine.step();
        assert!(notices.iter().any(|n| matches!(n, Notice::Sent { host_idx: 0 })));
        assert_eq!(engine.socket_v4.as_ref().unwrap().sent.len(), 1);
    }

    #[test]
    fn send_failure_is_reported() {
        let targets = one_host_table();
        let sock = FakeSocket { fail_send: true, ..Default::default() };
        let mut engine = Engine::new(targets, cfg(), Some(sock), None, 1234, 1234).unwrap();
        engine.schedule_initial_pings();
        let notices = engine.step();
        assert!(notices.iter().any(|n| matches!(n, Notice::SendError { .. })));
    }

    #[test]
    fn no_socket_for_either_family_is_an_error() {
        let targets = one_host_table();
        let result = Engine::<FakeSocket>::new(targets, cfg(), None, None, 1234, 1234);
        assert!(matches!(result, Err(EngineError::NoSocket)));
    }
}
