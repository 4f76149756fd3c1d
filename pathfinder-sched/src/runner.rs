/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! One periodic task, end to end.
//!
//! ```text
//! TaskRunner ──start()──► RunningTask
//!  (Created)               (Initialized)
//!                               │
//!                               ▼
//!                  ┌──► WaitingActivation ──release──► Running ──┐
//!                  └──────────── deadline verdict logged ◄───────┘
//! ```
//!
//! Each activation: wait for the release, run the task body, optionally take
//! the task's resource lock around a critical section that bumps the shared
//! counter, then classify completion against the deadline.  Resource access
//! produces exactly two log records (begin, end) and the deadline verdict
//! exactly one.  Nothing in the loop is fatal: a miss is logged, a lock error
//! skips the critical section, and the task carries on.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, trace, warn};

use crate::activation::{Activation, PeriodicActivation};
use crate::deadline::{DeadlineMonitor, DeadlineOutcome, DeadlineStats, DeadlineVerdict};
use crate::eventlog::{EventKind, LogRecord, LogSink};
use crate::sync::SharedResource;
use crate::task::TaskSpec;
use crate::time::{Clock, Timestamp};
use crate::work::{SpinWork, Workload};

// ── Public types ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Initialized,
    WaitingActivation,
    Running,
}

/// Everything one call to [`RunningTask::step`] observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActivationReport {
    pub activation: Activation,
    /// When the activation completed (after the critical section, if any).
    pub finished: Timestamp,
    pub verdict: DeadlineVerdict,
    /// Counter value written by this activation's critical section.  `None`
    /// when the task has no resource or the lock could not be taken.
    pub resource_value: Option<u64>,
}

// ── Resource access ───────────────────────────────────────────────────────────

struct ResourceAccess {
    resource: Arc<SharedResource>,
    work: Box<dyn Workload>,
}

impl ResourceAccess {
    fn perform<C: Clock>(
        &mut self,
        task_id: u32,
        sink: &dyn LogSink,
        clock: &C,
        deadline: Timestamp,
    ) -> Option<u64> {
        let begin = clock.now();
        emit(sink, task_id, EventKind::ResourceAccessBegin, begin, deadline);

        let budget = self.resource.critical_section();
        let work = &mut self.work;
        let result = self.resource.access(|counter| {
            work.run(budget);
            *counter = counter.wrapping_add(1);
            *counter
        });

        let end = clock.now();
        emit(sink, task_id, EventKind::ResourceAccessEnd, end, deadline);

        match result {
            Ok(value) => {
                debug!(
                    task_id,
                    resource = self.resource.name(),
                    value,
                    section_us = end.saturating_micros_since(begin),
                    "resource released"
                );
                Some(value)
            }
            Err(e) => {
                error!(task_id, error = %e, "critical section skipped");
                None
            }
        }
    }
}

fn emit(sink: &dyn LogSink, task_id: u32, kind: EventKind, now: Timestamp, deadline: Timestamp) {
    sink.record(&LogRecord {
        task_id,
        kind,
        now,
        deadline,
    });
}

// ── TaskRunner (Created) ──────────────────────────────────────────────────────

/// A configured task that has not started its release grid yet.
///
/// The task body defaults to [`SpinWork`] sized by `wcet_us`.
pub struct TaskRunner<C: Clock> {
    spec: TaskSpec,
    clock: C,
    sink: Arc<dyn LogSink>,
    work: Box<dyn Workload>,
    access: Option<ResourceAccess>,
}

impl<C: Clock> TaskRunner<C> {
    pub fn new(spec: TaskSpec, clock: C, sink: Arc<dyn LogSink>) -> Self {
        Self {
            spec,
            clock,
            sink,
            work: Box::new(SpinWork),
            access: None,
        }
    }

    /// Replace the task body.
    pub fn with_work(mut self, work: impl Workload + 'static) -> Self {
        self.work = Box::new(work);
        self
    }

    /// Give the task a shared resource; `work` fills each critical section.
    pub fn with_resource(
        mut self,
        resource: Arc<SharedResource>,
        work: impl Workload + 'static,
    ) -> Self {
        self.access = Some(ResourceAccess {
            resource,
            work: Box::new(work),
        });
        self
    }

    pub fn spec(&self) -> &TaskSpec {
        &self.spec
    }

    /// Start the release grid now.
    pub fn start(self) -> RunningTask<C> {
        let epoch = self.clock.now();
        self.start_at(epoch)
    }

    /// Start the release grid at `epoch` (first release `epoch + offset`).
    pub fn start_at(self, epoch: Timestamp) -> RunningTask<C> {
        let activation = PeriodicActivation::start_at(self.spec.timing(), self.clock, epoch);
        debug!(
            task_id = self.spec.id,
            task = %self.spec.name,
            first_release = %activation.next_release(),
            "task initialized"
        );
        RunningTask {
            monitor: DeadlineMonitor::new(self.spec.max_dmiss),
            spec: self.spec,
            activation,
            sink: self.sink,
            work: self.work,
            access: self.access,
            state: TaskState::Initialized,
        }
    }
}

// ── RunningTask (Initialized → WaitingActivation ⇄ Running) ───────────────────

pub struct RunningTask<C: Clock> {
    spec: TaskSpec,
    activation: PeriodicActivation<C>,
    monitor: DeadlineMonitor,
    sink: Arc<dyn LogSink>,
    work: Box<dyn Workload>,
    access: Option<ResourceAccess>,
    state: TaskState,
}

impl<C: Clock> RunningTask<C> {
    /// Run exactly one activation.
    pub fn step(&mut self) -> ActivationReport {
        let task_id = self.spec.id;

        self.state = TaskState::WaitingActivation;
        let activation = self.activation.wait_next_activation();
        self.state = TaskState::Running;

        let clock = self.activation.clock();
        emit(
            &*self.sink,
            task_id,
            EventKind::Activation,
            clock.now(),
            activation.deadline,
        );
        trace!(task_id, index = activation.index, slept = activation.slept, "activation");

        self.work.run(Duration::from_micros(self.spec.wcet_us));

        let resource_value = match self.access.as_mut() {
            Some(access) => access.perform(task_id, &*self.sink, clock, activation.deadline),
            None => None,
        };

        let finished = clock.now();
        let verdict = self.monitor.observe(finished, activation.deadline);
        self.report(&activation, finished, &verdict);

        ActivationReport {
            activation,
            finished,
            verdict,
            resource_value,
        }
    }

    /// Run `n` activations.
    pub fn run_cycles(&mut self, n: u64) {
        for _ in 0..n {
            self.step();
        }
    }

    /// Run forever.
    pub fn run(&mut self) -> ! {
        loop {
            self.step();
        }
    }

    pub fn spec(&self) -> &TaskSpec {
        &self.spec
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    pub fn stats(&self) -> DeadlineStats {
        self.monitor.stats()
    }

    /// Deadline of the activation in progress (the next release).
    pub fn current_deadline(&self) -> Timestamp {
        self.activation.next_release()
    }

    fn report(&self, activation: &Activation, finished: Timestamp, verdict: &DeadlineVerdict) {
        let task_id = self.spec.id;
        let kind = match verdict.outcome {
            DeadlineOutcome::Met => EventKind::DeadlineMet,
            DeadlineOutcome::Missed => EventKind::DeadlineMissed,
        };
        emit(&*self.sink, task_id, kind, finished, activation.deadline);

        match verdict.outcome {
            DeadlineOutcome::Met => debug!(
                task_id,
                index = activation.index,
                deadline = %activation.deadline,
                "deadline met"
            ),
            DeadlineOutcome::Missed => warn!(
                task_id,
                index = activation.index,
                lateness_us = verdict.lateness_us,
                consecutive = verdict.consecutive_misses,
                deadline = %activation.deadline,
                "deadline missed"
            ),
        }

        if verdict.fault {
            error!(
                task_id,
                task = %self.spec.name,
                max_dmiss = self.spec.max_dmiss,
                "consecutive deadline misses reached max_dmiss"
            );
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
