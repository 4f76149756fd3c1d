/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Append-only event log.
//!
//! Every resource access and every deadline verdict becomes one
//! [`LogRecord`], rendered as exactly one line:
//!
//! ```text
//! Thread 2: Accessing resource: now: 812 sec 4500123 nsec    next: 812 sec 25000000 nsec
//! Thread 2: Deadline    met: now: 812 sec 9871002 nsec    next: 812 sec 25000000 nsec
//! ```
//!
//! `next` is the deadline boundary of the activation in progress.  The format
//! is the only "wire format" of the system; [`parse_line`] and [`summarize`]
//! read it back for deadline-miss statistics.
//!
//! This log is separate from the diagnostic `tracing` output.

use std::collections::BTreeMap;
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, Write};
use std::path::Path;
use std::sync::{Mutex, PoisonError};

use thiserror::Error;
use tracing::warn;

use crate::time::Timestamp;

// ── EventKind ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Activation,
    ResourceAccessBegin,
    ResourceAccessEnd,
    DeadlineMet,
    DeadlineMissed,
}

impl EventKind {
    const ALL: [EventKind; 5] = [
        EventKind::Activation,
        EventKind::ResourceAccessBegin,
        EventKind::ResourceAccessEnd,
        EventKind::DeadlineMet,
        EventKind::DeadlineMissed,
    ];

    /// Label as printed in the log line.
    pub fn label(self) -> &'static str {
        match self {
            EventKind::Activation => "Activation",
            EventKind::ResourceAccessBegin => "Accessing resource",
            EventKind::ResourceAccessEnd => "Releasing resource",
            // Padded so "met" and "missed" records line up.
            EventKind::DeadlineMet => "Deadline    met",
            EventKind::DeadlineMissed => "Deadline missed",
        }
    }
}

// ── LogRecord ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogRecord {
    pub task_id: u32,
    pub kind: EventKind,
    /// When the event happened.
    pub now: Timestamp,
    /// Deadline of the activation the event belongs to.
    pub deadline: Timestamp,
}

impl fmt::Display for LogRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Thread {}: {}: now: {}    next: {}",
            self.task_id,
            self.kind.label(),
            self.now,
            self.deadline
        )
    }
}

// ── Parsing ───────────────────────────────────────────────────────────────────

#[derive(Debug, Error, PartialEq, Eq)]
#[error("malformed log line ({reason}): {line:?}")]
pub struct LogParseError {
    pub line: String,
    pub reason: &'static str,
}

/// Parse one line produced by [`LogRecord`]'s `Display`.
pub fn parse_line(line: &str) -> Result<LogRecord, LogParseError> {
    let err = |reason| LogParseError {
        line: line.to_owned(),
        reason,
    };

    let rest = line
        .trim_end()
        .strip_prefix("Thread ")
        .ok_or_else(|| err("missing 'Thread' prefix"))?;
    let (id, rest) = rest.split_once(": ").ok_or_else(|| err("missing task id"))?;
    let task_id = id.parse().map_err(|_| err("task id is not a number"))?;

    let (kind, rest) = EventKind::ALL
        .iter()
        .find_map(|k| {
            rest.strip_prefix(k.label())
                .and_then(|r| r.strip_prefix(": "))
                .map(|r| (*k, r))
        })
        .ok_or_else(|| err("unknown event kind"))?;

    let rest = rest.strip_prefix("now: ").ok_or_else(|| err("missing 'now'"))?;
    let (now, rest) = rest.split_once("    next: ").ok_or_else(|| err("missing 'next'"))?;
    let now = parse_timestamp(now).ok_or_else(|| err("bad 'now' timestamp"))?;
    let deadline = parse_timestamp(rest).ok_or_else(|| err("bad 'next' timestamp"))?;

    Ok(LogRecord {
        task_id,
        kind,
        now,
        deadline,
    })
}

/// `"<sec> sec <nsec> nsec"`
fn parse_timestamp(s: &str) -> Option<Timestamp> {
    let mut parts = s.split_whitespace();
    let secs = parts.next()?.parse().ok()?;
    (parts.next()? == "sec").then_some(())?;
    let nanos: u32 = parts.next()?.parse().ok()?;
    (parts.next()? == "nsec").then_some(())?;
    if parts.next().is_some() || u64::from(nanos) >= crate::time::NANOS_PER_SEC {
        return None;
    }
    Some(Timestamp::new(secs, nanos))
}

// ── Summary ───────────────────────────────────────────────────────────────────

/// Per-task deadline counts read back from a log.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskTally {
    pub met: u64,
    pub missed: u64,
    pub resource_accesses: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogSummary {
    /// Task id → tally, ordered by id.
    pub tasks: BTreeMap<u32, TaskTally>,
    /// Lines that did not parse.
    pub skipped_lines: u64,
}

/// Tally deadline verdicts per task from an event log.
///
/// Unparsable lines are counted and skipped, so a log cut off mid-line by a
/// killed process still summarises.
pub fn summarize(reader: impl BufRead) -> io::Result<LogSummary> {
    let mut summary = LogSummary::default();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match parse_line(&line) {
            Ok(rec) => {
                let tally = summary.tasks.entry(rec.task_id).or_default();
                match rec.kind {
                    EventKind::DeadlineMet => tally.met += 1,
                    EventKind::DeadlineMissed => tally.missed += 1,
                    EventKind::ResourceAccessBegin => tally.resource_accesses += 1,
                    EventKind::Activation | EventKind::ResourceAccessEnd => {}
                }
            }
            Err(_) => summary.skipped_lines += 1,
        }
    }
    Ok(summary)
}

// ── Sinks ─────────────────────────────────────────────────────────────────────

/// Destination for [`LogRecord`]s.
///
/// Shared by every task thread; implementations must never interleave two
/// records within one line.
pub trait LogSink: Send + Sync {
    fn record(&self, record: &LogRecord);
}

/// Appends one line per record to a file.
///
/// A failed write is reported through `tracing` and otherwise ignored: the
/// log must never stop a task.
#[derive(Debug)]
pub struct FileSink {
    file: Mutex<File>,
}

impl FileSink {
    /// Open `path` for appending, creating it if needed.
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }
}

impl LogSink for FileSink {
    fn record(&self, record: &LogRecord) {
        // One write per line so O_APPEND keeps lines whole even across
        // processes; the mutex covers threads.
        let line = format!("{record}\n");
        let mut file = self.file.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(e) = file.write_all(line.as_bytes()) {
            warn!(error = %e, task_id = record.task_id, "event log write failed");
        }
    }
}

/// Keeps records in memory, in arrival order.
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<LogRecord>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<LogRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl LogSink for MemorySink {
    fn record(&self, record: &LogRecord) {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(*record);
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
