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

//! Turns `engine::Notice`s and the target table into the text (or
//! netdata) report lines. Kept separate from `Engine` so the core loop
//! never has an opinion about stdout/stderr.

use crate::clock::TimeNs;
use crate::engine::Notice;
use crate::stats::GlobalStats;
use crate::target::{RespSlot, TargetTable};
use chrono::{DateTime, Local};
use std::time::{Duration, SystemTime};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimestampFormat {
    None,
    Ctime,
    Iso,
    Rfc3339,
}

pub struct ReportOptions {
    pub per_recv: bool,
    pub verbose: bool,
    pub alive_only: bool,
    pub quiet: bool,
    pub show_all: bool,
    pub timestamp_format: TimestampFormat,
    pub max_hostname_len: usize,
    pub outage: bool,
    pub cumulative_stats: bool,
    /// `-s`/`-C`: print every individual RTT instead of the xmt/rcv/loss
    /// summary line (`fping.c:1945`).
    pub report_all_rtts: bool,
    /// Per-host send period, in ms, used to scale `-o`'s outage total
    /// (`fping.c:1959`).
    pub perhost_interval_ms: i64,
}

/// Milliseconds rendered with `fping`'s variable precision: more
/// decimals for small values, fewer as the value grows, scientific
/// notation past a million milliseconds.
pub fn sprint_tm(ns: TimeNs) -> String {
    let t = ns as f64 / 1e6;
    if t < 0.0 {
        format!("{:.2e}", t)
    } else if t < 1.0 {
        format!("{:.3}", t)
    } else if t < 10.0 {
        format!("{:.2}", t)
    } else if t < 100.0 {
        format!("{:.1}", t)
    } else if t < 1_000_000.0 {
        format!("{:.0}", t)
    } else {
        format!("{:.3e}", t)
    }
}

fn timestamp_prefix(format: TimestampFormat) -> String {
    let now: DateTime<Local> = SystemTime::now().into();
    match format {
        TimestampFormat::None => String::new(),
        TimestampFormat::Ctime => format!("[{}] ", now.format("%a %b %e %T %Y")),
        TimestampFormat::Iso => format!("[{}] ", now.format("%Y-%m-%dT%H:%M:%S%z")),
        TimestampFormat::Rfc3339 => format!("[{}] ", now.format("%Y-%m-%d %H:%M:%S")),
    }
}

/// Renders one `Notice` as a product-output line, appended to `out`.
/// Returns nothing visible for notices this configuration suppresses
/// (e.g. a `Reply` when `--quiet` and not `per_recv`).
pub fn render_notice(out: &mut String, notice: &Notice, targets: &TargetTable, opts: &ReportOptions) {
    match *notice {
        Notice::Reply { host_idx, ping_index, rtt_ns, bytes } => {
            if !opts.per_recv {
                return;
            }
            let h = &targets.hosts[host_idx];
            out.push_str(&timestamp_prefix(opts.timestamp_format));
            let avg = h.cumulative.avg_reply_ns();
            out.push_str(&format!(
                "{:width$} : [{}], {} bytes, {} ms",
                h.display,
                ping_index,
                bytes,
                sprint_tm(rtt_ns),
                width = opts.max_hostname_len
            ));
            match avg {
                Some(a) => out.push_str(&format!(" ({} avg, ", sprint_tm(a as TimeNs))),
                None => out.push_str(" (NaN avg, "),
            }
            if h.cumulative.num_recv <= h.cumulative.num_sent {
                let loss = if h.cumulative.num_sent > 0 {
                    (h.cumulative.num_sent - h.cumulative.num_recv) * 100 / h.cumulative.num_sent
                } else {
                    0
                };
                out.push_str(&format!("{}% loss)\n", loss));
            } else {
                let ret = h.cumulative.num_recv_total * 100 / h.cumulative.num_sent;
                out.push_str(&format!("{}% return)\n", ret));
            }
        }
        Notice::Timeout { host_idx, ping_index } => {
            if !opts.per_recv {
                return;
            }
            let h = &targets.hosts[host_idx];
            out.push_str(&timestamp_prefix(opts.timestamp_format));
            out.push_str(&format!(
                "{:width$} : [{}], timed out",
                h.display,
                ping_index,
                width = opts.max_hostname_len
            ));
            match h.cumulative.avg_reply_ns() {
                Some(a) => out.push_str(&format!(" ({} avg, ", sprint_tm(a as TimeNs))),
                None => out.push_str(" (NaN avg, "),
            }
            if h.cumulative.num_recv <= h.cumulative.num_sent && h.cumulative.num_sent > 0 {
                let loss = (h.cumulative.num_sent - h.cumulative.num_recv) * 100 / h.cumulative.num_sent;
                out.push_str(&format!("{}% loss)\n", loss));
            } else {
                out.push_str("0% loss)\n");
            }
        }
        Notice::FirstAlive { host_idx } => {
            if opts.verbose || opts.alive_only {
                let h = &targets.hosts[host_idx];
                if opts.verbose {
                    out.push_str(&format!("{} is alive\n", h.display));
                } else {
                    out.push_str(&format!("{}\n", h.display));
                }
            }
        }
        Notice::Duplicate { host_idx, ping_index, rtt_ns } => {
            if !opts.quiet && !opts.per_recv {
                let h = &targets.hosts[host_idx];
                out.push_str(&format!(
                    "{} : duplicate for [{}], {} ms\n",
                    h.display,
                    ping_index,
                    sprint_tm(rtt_ns)
                ));
            }
        }
        Notice::SendError { host_idx, .. } => {
            // §4.4 step 6: warn unless --quiet. `Engine` never emits this
            // notice at all for EHOSTDOWN, which is a silent miss.
            if !opts.quiet {
                let h = &targets.hosts[host_idx];
                out.push_str(&format!("{}: error while sending ping\n", h.display));
            }
        }
        Notice::OtherIcmp { icmp_type, icmp_code } => {
            if opts.verbose {
                out.push_str(&format!(
                    "{} ({})\n",
                    crate::icmp::icmp_type_str(icmp_type),
                    crate::icmp::icmp_unreach_str(icmp_code)
                ));
            }
        }
        Notice::Sent { .. } | Notice::ReportDue => {}
    }
}

/// §4.9 per-target summary block, written at end of run or on an
/// interval report (one line per host, interval counters unless
/// `cumulative_stats` is set).
pub fn render_per_target_summary(targets: &TargetTable, opts: &ReportOptions) -> String {
    let mut out = String::new();
    for h in &targets.hosts {
        if !opts.show_all && h.cumulative.num_recv == 0 {
            continue;
        }
        let stats = if opts.cumulative_stats { &h.cumulative } else { &h.interval };
        out.push_str(&format!("{:width$} :", h.display, width = opts.max_hostname_len));
        if opts.report_all_rtts {
            for slot in h.resp_times.iter().take(stats.num_sent as usize) {
                match slot {
                    RespSlot::Rtt(rtt) => out.push_str(&format!(" {}", sprint_tm(*rtt))),
                    _ => out.push_str(" -"),
                }
            }
            out.push('\n');
            continue;
        }
        if stats.num_recv <= stats.num_sent {
            let loss = if stats.num_sent > 0 {
                (stats.num_sent - stats.num_recv) * 100 / stats.num_sent
            } else {
                0
            };
            out.push_str(&format!(" xmt/rcv/%loss = {}/{}/{}%", stats.num_sent, stats.num_recv, loss));
            if opts.outage {
                let outage_ms = (stats.num_sent - stats.num_recv) as i64 * opts.perhost_interval_ms;
                out.push_str(&format!(", outage(ms) = {}", outage_ms));
            }
        } else {
            let ret = stats.num_recv * 100 / stats.num_sent.max(1);
            out.push_str(&format!(" xmt/rcv/%return = {}/{}/{}%", stats.num_sent, stats.num_recv, ret));
        }
        if stats.num_recv > 0 {
            let avg = stats.total_time_ns / stats.num_recv as i128;
            out.push_str(&format!(
                ", min/avg/max = {}/{}/{}",
                sprint_tm(stats.min_reply_ns),
                sprint_tm(avg as TimeNs),
                sprint_tm(stats.max_reply_ns)
            ));
        }
        out.push('\n');
    }
    out
}

/// §4.9 final global summary block, written once at shutdown.
pub fn render_global_summary(stats: &GlobalStats, elapsed: Duration) -> String {
    let mut out = String::new();
    out.push('\n');
    out.push_str(&format!(" {:7} targets\n", stats.num_hosts));
    out.push_str(&format!(" {:7} alive\n", stats.num_alive));
    out.push_str(&format!(" {:7} unreachable\n", stats.num_unreachable));
    out.push_str(&format!(" {:7} unknown addresses\n", stats.num_noaddress));
    out.push('\n');
    out.push_str(&format!(" {:7} timeouts (waiting for response)\n", stats.num_timeout));
    out.push_str(&format!(" {:7} ICMP Echos sent\n", stats.num_pingsent));
    out.push_str(&format!(" {:7} ICMP Echo Replies received\n", stats.num_pingreceived));
    out.push_str(&format!(" {:7} other ICMP received\n", stats.num_othericmprcvd));
    out.push('\n');
    let (min_ns, avg_ns, max_ns) = if stats.total_replies == 0 {
        (0, 0, 0)
    } else {
        (stats.min_reply_ns, (stats.sum_replies_ns / stats.total_replies as i128) as TimeNs, stats.max_reply_ns)
    };
    out.push_str(&format!(" {} ms (min round trip time)\n", sprint_tm(min_ns)));
    out.push_str(&format!(" {} ms (avg round trip time)\n", sprint_tm(avg_ns)));
    out.push_str(&format!(" {} ms (max round trip time)\n", sprint_tm(max_ns)));
    out.push_str(&format!(" {:12.3} sec (elapsed real time)\n", elapsed.as_secs_f64()));
    out.push('\n');
    out
}

/// netdata plugin output (`-N`), one chart/dimension set per host.
pub fn render_netdata(targets: &TargetTable, report_interval: Duration, charts_sent: bool) -> String {
    let mut out = String::new();
    let interval_secs = report_interval.as_secs_f64();
    for h in &targets.hosts {
        if !charts_sent {
            out.push_str(&format!(
                "CHART probe.{name}_packets '' 'Probe Packets' packets '{host}' probe.packets line 110020 {interval:.0}\n",
                name = h.display,
                host = h.display,
                interval = interval_secs
            ));
            out.push_str("DIMENSION xmt sent absolute 1 1\n");
            out.push_str("DIMENSION rcv received absolute 1 1\n");
        }
        out.push_str(&format!("BEGIN probe.{}_packets\n", h.display));
        out.push_str(&format!("SET xmt = {}\n", h.interval.num_sent));
        out.push_str(&format!("SET rcv = {}\n", h.interval.num_recv));
        out.push_str("END\n");

        if !charts_sent {
            out.push_str(&format!(
                "CHART probe.{name}_quality '' 'Probe Quality' percentage '{host}' probe.quality area 110010 {interval:.0}\n",
                name = h.display,
                host = h.display,
                interval = interval_secs
            ));
            out.push_str("DIMENSION returned '' absolute 1 1\n");
        }
        out.push_str(&format!("BEGIN probe.{}_quality\n", h.display));
        let ret = if h.interval.num_sent > 0 {
            h.interval.num_recv * 100 / h.interval.num_sent
        } else {
            0
        };
        out.push_str(&format!("SET returned = {}\n", ret));
        out.push_str("END\n");

        if !charts_sent {
            out.push_str(&format!(
                "CHART probe.{name}_latency '' 'Probe Latency' ms '{host}' probe.latency area 110000 {interval:.0}\n",
                name = h.display,
                host = h.display,
                interval = interval_secs
            ));
            out.push_str("DIMENSION min minimum absolute 1 1000000\n");
            out.push_str("DIMENSION max maximum absolute 1 1000000\n");
            out.push_str("DIMENSION avg average absolute 1 1000000\n");
        }
        out.push_str(&format!("BEGIN probe.{}_latency\n", h.display));
        if h.interval.num_recv > 0 {
            let avg = h.interval.total_time_ns / h.interval.num_recv as i128;
            out.push_str(&format!("SET min = {}\n", h.interval.min_reply_ns));
            out.push_str(&format!("SET avg = {}\n", avg));
            out.push_str(&format!("SET max = {}\n", h.interval.max_reply_ns));
        }
        out.push_str("END\n");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sprint_tm_uses_more_precision_for_small_values() {
        assert_eq!(sprint_tm(500_000), "0.500");
        assert_eq!(sprint_tm(5_000_000), "5.00");
        assert_eq!(sprint_tm(50_000_000), "50.0");
        assert_eq!(sprint_tm(500_000_000), "500");
    }

    #[test]
    fn global_summary_handles_zero_replies_without_dividing_by_zero() {
        let stats = GlobalStats::default();
        let out = render_global_summary(&stats, Duration::from_secs(1));
        assert!(out.contains("0.000 ms (min round trip time)"));
    }
}
