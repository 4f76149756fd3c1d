/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, warn};

use pathfinder_sched::config::TaskSetConfig;
use pathfinder_sched::eventlog::{self, FileSink};
use pathfinder_sched::scheduler::{Scheduler, SchedulerOptions};
use pathfinder_sched::sync::LockProtocol;
use pathfinder_sched::task::SchedPolicy;

// ── CLI argument definition ───────────────────────────────────────────────────

/// Fixed-priority periodic task scheduler.
///
/// Example:
///   sudo pathfinder-sched --cpu 0 -l log_file.log
///   pathfinder-sched --policy normal --cycles 40
///   pathfinder-sched --summarize log_file.log
#[derive(Debug, Parser)]
#[command(
    name = "pathfinder-sched",
    about = "Fixed-priority periodic task scheduler with priority-inheritance locking",
    long_about = None,
)]
struct Cli {
    /// Path to a YAML task table.  The built-in reference set is used when absent.
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    /// Event log file (appended to).
    #[arg(short = 'l', long = "log-file", default_value = "log_file.log")]
    log_file: PathBuf,

    /// Override every task's scheduling policy (normal, fifo, rr).
    #[arg(long = "policy")]
    policy: Option<SchedPolicy>,

    /// Pin every task to this CPU.
    #[arg(long = "cpu")]
    cpu: Option<u32>,

    /// Build plain mutexes instead of priority-inheritance mutexes.
    #[arg(long = "no-priority-inheritance", default_value_t = false)]
    no_priority_inheritance: bool,

    /// Lock all current and future memory pages before starting.
    #[arg(long = "lock-memory", default_value_t = false)]
    lock_memory: bool,

    /// Stop each task after this many activations instead of running forever.
    #[arg(long = "cycles")]
    cycles: Option<u64>,

    /// Print per-task deadline statistics from an existing event log and exit.
    #[arg(long = "summarize", value_name = "FILE")]
    summarize: Option<PathBuf>,
}

// ── Entry point ───────────────────────────────────────────────────────────────

fn main() {
    // Level is controlled by the RUST_LOG env-var (e.g. RUST_LOG=debug).
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_thread_names(true)
        .init();

    let cli = Cli::parse();

    if let Some(path) = &cli.summarize {
        if let Err(e) = print_summary(path) {
            error!("Failed to summarize event log: {:#}", e);
            process::exit(1);
        }
        return;
    }

    info!(
        config      = ?cli.config,
        log_file    = %cli.log_file.display(),
        policy      = ?cli.policy,
        cpu         = ?cli.cpu,
        inheritance = !cli.no_priority_inheritance,
        lock_memory = cli.lock_memory,
        cycles      = ?cli.cycles,
        "Configuration"
    );

    if let Err(e) = run(&cli) {
        error!("{:#}", e);
        process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<()> {
    // ── Load task set ─────────────────────────────────────────────────────────
    let mut config = match &cli.config {
        Some(path) => TaskSetConfig::load_from_file(path)?,
        None => {
            info!("No task table provided, using the built-in reference set");
            TaskSetConfig::reference()
        }
    };
    if let Some(policy) = cli.policy {
        config = config.with_policy(policy)?;
    }
    if let Some(cpu) = cli.cpu {
        config = config.pinned_to_cpu(cpu)?;
    }

    for t in config.tasks() {
        info!(
            "  [{id}] {name:<12} prio={prio} ({policy}) T={period}us C={wcet}us resource={res}",
            id = t.id,
            name = t.name,
            prio = t.priority,
            policy = t.policy,
            period = t.period_us,
            wcet = t.wcet_us,
            res = t.resource.as_deref().unwrap_or("-"),
        );
    }
    if config.tasks().iter().any(|t| t.policy.is_realtime()) {
        info!("real-time policy requested; this needs CAP_SYS_NICE or a non-zero RLIMIT_RTPRIO");
    }

    // ── Start ─────────────────────────────────────────────────────────────────
    let sink = FileSink::open(&cli.log_file)
        .with_context(|| format!("Cannot open event log: {}", cli.log_file.display()))?;

    let options = SchedulerOptions {
        protocol: if cli.no_priority_inheritance {
            LockProtocol::None
        } else {
            LockProtocol::Inherit
        },
        cycles: cli.cycles,
        lock_memory: cli.lock_memory,
        ..SchedulerOptions::default()
    };

    let scheduler = Scheduler::new(config, Arc::new(sink), options)?;
    let running = scheduler.start()?;
    if cli.cycles.is_none() {
        info!("Running until interrupted");
    }

    let outcomes = running.join()?;
    for o in &outcomes {
        if o.stats.missed > 0 {
            warn!(
                "Task {} ({}): {} met, {} missed ({:.1}%), {} fault(s), worst lateness {}us",
                o.id,
                o.name,
                o.stats.met,
                o.stats.missed,
                o.stats.miss_ratio() * 100.0,
                o.stats.faults,
                o.stats.worst_lateness_us
            );
        } else {
            info!("Task {} ({}): {} met, 0 missed", o.id, o.name, o.stats.met);
        }
    }
    Ok(())
}

fn print_summary(path: &Path) -> Result<()> {
    let file =
        File::open(path).with_context(|| format!("Cannot open event log: {}", path.display()))?;
    let summary = eventlog::summarize(BufReader::new(file))
        .with_context(|| format!("Cannot read event log: {}", path.display()))?;

    println!("{:>6} {:>10} {:>10} {:>10}", "task", "met", "missed", "resource");
    for (id, t) in &summary.tasks {
        println!(
            "{:>6} {:>10} {:>10} {:>10}",
            id, t.met, t.missed, t.resource_accesses
        );
    }
    if summary.skipped_lines > 0 {
        warn!("{} unparsable line(s) skipped", summary.skipped_lines);
    }
    Ok(())
}
