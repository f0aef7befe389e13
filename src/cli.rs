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

//! Command-line surface. One struct, one `clap` derive -- `main.rs`
//! turns this into target specs, an `EngineConfig` and `ReportOptions`
//! and never touches `clap` itself.

use crate::report::TimestampFormat;
use clap::Parser;

#[derive(Parser, Debug)]
#[clap(name = "probe", about = "Parallel ICMP reachability prober", version)]
pub struct Cli {
    /// Force IPv4.
    #[clap(short = '4')]
    pub ipv4: bool,
    /// Force IPv6.
    #[clap(short = '6')]
    pub ipv6: bool,

    /// Targets to probe, positional.
    pub targets: Vec<String>,
    /// Read targets from FILE (one per line), or "-" for stdin.
    #[clap(short = 'f')]
    pub target_file: Option<String>,
    /// Generate targets: one CIDR, or two address endpoints.
    #[clap(short = 'g')]
    pub generate: Vec<String>,

    /// Global interval between sends, in ms.
    #[clap(short = 'i')]
    pub interval_ms: Option<u64>,
    /// Per-host period between sends to the same host, in ms.
    #[clap(short = 'p')]
    pub perhost_interval_ms: Option<u64>,
    /// Per-probe timeout, in ms.
    #[clap(short = 't')]
    pub timeout_ms: Option<u64>,
    /// Retries in one-shot mode.
    #[clap(short = 'r')]
    pub retry: Option<u32>,
    /// Backoff factor applied to the timeout after each miss.
    #[clap(short = 'B')]
    pub backoff: Option<f64>,
    /// Send this many probes per host, then stop.
    #[clap(short = 'c')]
    pub count: Option<u64>,
    /// Like -c, but also report every individual RTT.
    #[clap(short = 'C')]
    pub vcount: Option<u64>,
    /// Loop forever.
    #[clap(short = 'l')]
    pub loop_flag: bool,

    /// Probe payload size, in bytes.
    #[clap(short = 'b')]
    pub payload_size: Option<usize>,
    /// IP TTL, 1-255.
    #[clap(short = 'H')]
    pub ttl: Option<u8>,
    /// Set the don't-fragment bit.
    #[clap(short = 'M')]
    pub dont_fragment: bool,
    /// IP TOS value.
    #[clap(short = 'O')]
    pub tos: Option<u8>,
    /// Source address to bind to.
    #[clap(short = 'S')]
    pub src_addr: Option<String>,
    /// Interface to bind to.
    #[clap(short = 'I')]
    pub iface: Option<String>,
    /// Firewall mark to set on the socket.
    #[clap(short = 'k')]
    pub fwmark: Option<u32>,
    /// Randomize probe payload bytes.
    #[clap(short = 'R')]
    pub randomize_payload: bool,
    /// Use ICMP Timestamp requests instead of Echo.
    #[clap(long = "icmp-timestamp")]
    pub icmp_timestamp: bool,

    /// Show targets as given, even if resolved from DNS.
    #[clap(short = 'a')]
    pub show_alive_only: bool,
    /// Print all results, not just hosts that replied (fping's -m/--all).
    #[clap(short = 'm', long = "all")]
    pub all: bool,
    /// Show target names unresolved.
    #[clap(short = 'u')]
    pub show_unreachable: bool,
    /// Force reverse-DNS display names.
    #[clap(short = 'd')]
    pub reverse_dns: bool,
    /// Show target names, resolved via reverse DNS (same display as -d).
    #[clap(short = 'n')]
    pub no_resolve: bool,
    /// Force numeric display names.
    #[clap(short = 'A')]
    pub numeric: bool,
    /// Show elapsed time on termination.
    #[clap(short = 'e')]
    pub elapsed: bool,
    /// Print a timestamp before each report line.
    #[clap(short = 'D')]
    pub timestamp: bool,
    /// Quiet: only the final summary.
    #[clap(short = 'q')]
    pub quiet: bool,
    /// Print a split report every SECS, optionally ",cumulative".
    #[clap(short = 'Q')]
    pub report_interval: Option<String>,
    /// Report all RTTs per host (count mode).
    #[clap(short = 's')]
    pub report_all_rtts: bool,
    /// Netdata plugin output mode.
    #[clap(short = 'N')]
    pub netdata: bool,
    /// Show accumulated outage time in split reports.
    #[clap(short = 'o')]
    pub outage: bool,
    /// Verbose.
    #[clap(short = 'v')]
    pub verbose: bool,
    /// Exit 0 if at least N hosts were reachable.
    #[clap(short = 'x')]
    pub reachable: Option<u64>,
    /// Exit 0 as soon as N hosts are reachable, then stop early.
    #[clap(short = 'X')]
    pub fast_reachable: Option<u64>,
    /// Discard replies whose source address doesn't match the target.
    #[clap(long = "check-source")]
    pub check_source: bool,
    /// Print the TOS byte of replies.
    #[clap(long = "print-tos")]
    pub print_tos: bool,
    /// Print the TTL of replies.
    #[clap(long = "print-ttl")]
    pub print_ttl: bool,
    /// Timestamp rendering for -D.
    #[clap(long = "timestamp-format")]
    pub timestamp_format: Option<String>,
    /// Ignored legacy "select timeout" flag, kept for command-line compatibility.
    #[clap(short = 'T')]
    pub legacy_select_timeout: Option<u64>,

    /// Load an engine-tuning preset from a RON file.
    #[clap(long = "config")]
    pub config_file: Option<String>,
}

impl Cli {
    pub fn timestamp_format(&self) -> TimestampFormat {
        if !self.timestamp {
            return TimestampFormat::None;
        }
        match self.timestamp_format.as_deref() {
            Some("ctime") => TimestampFormat::Ctime,
            Some("iso") => TimestampFormat::Iso,
            Some("rfc3339") => TimestampFormat::Rfc3339,
            _ => TimestampFormat::None,
        }
    }

    /// Parses `-Q SECS[,cumulative]`.
    pub fn parsed_report_interval(&self) -> Option<(u64, bool)> {
        let raw = self.report_interval.as_ref()?;
        let mut parts = raw.splitn(2, ',');
        let secs: u64 = parts.next()?.parse().ok()?;
        let cumulative = matches!(parts.next(), Some("cumulative"));
        Some((secs, cumulative))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_interval_without_cumulative() {
        let cli = Cli {
            report_interval: Some("5".to_string()),
            ..Cli::parse_from(["probe"])
        };
        assert_eq!(cli.parsed_report_interval(), Some((5, false)));
    }

    #[test]
    fn report_interval_with_cumulative_suffix() {
        let cli = Cli {
            report_interval: Some("5,cumulative".to_string()),
            ..Cli::parse_from(["probe"])
        };
        assert_eq!(cli.parsed_report_interval(), Some((5, true)));
    }

    #[test]
    fn timestamp_format_defaults_to_none_style_when_flag_absent() {
        let cli = Cli::parse_from(["probe"]);
        assert_eq!(cli.timestamp_format(), TimestampFormat::None);
    }

    #[test]
    fn timestamp_format_recognizes_iso() {
        let cli = Cli {
            timestamp: true,
            timestamp_format: Some("iso".to_string()),
            ..Cli::parse_from(["probe"])
        };
        assert_eq!(cli.timestamp_format(), TimestampFormat::Iso);
    }
}
