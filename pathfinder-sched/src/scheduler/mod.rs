//! Task-set executive: one OS thread per task, started together.
//!
//! [`Scheduler`] owns the validated task set and the shared resources.
//! [`Scheduler::start`] runs the startup protocol:
//!
//! ```text
//! main                                  task thread (× N)
//! ────                                  ─────────────────
//! lock memory (optional)
//! spawn N named threads ──────────────► apply policy + priority + affinity
//!                                       report Ready(Ok | Err) ──┐
//! collect N reports ◄────────────────────────────────────────────┘
//!   any Err ─► abort gate, join, return the error (no task ever ran)
//!   all Ok  ─► epoch = now + START_DELAY, open gate ─► first release at
//!                                                       epoch + offset
//! ```
//!
//! Because every thread sees the same epoch, tasks with equal offsets are
//! released at the same instant and the fixed priorities alone decide who
//! runs first.
//!
//! # Design decisions
//!
//! | Topic | Choice |
//! |---|---|
//! | Priority setup | Applied by the task thread to itself, not inherited from an attribute object |
//! | Startup failure | Fatal for the whole set; the gate is aborted so no task starts |
//! | Resource creation | Fatal on error; a lock is never silently replaced by "no lock" |
//! | Run length | Forever by default, or a fixed number of activations per task |

pub mod error;
pub mod rt;

pub use error::SchedulerError;
pub use rt::{RtSetupError, ThreadParams};

use std::collections::BTreeMap;
use std::sync::mpsc;
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use tracing::{debug, error, info, warn};

use crate::config::TaskSetConfig;
use crate::deadline::DeadlineStats;
use crate::eventlog::LogSink;
use crate::runner::TaskRunner;
use crate::sync::{LockProtocol, SharedResource};
use crate::time::{Clock, MonotonicClock, Timestamp};
use crate::work::SpinWork;

// ── Constants ─────────────────────────────────────────────────────────────────

/// Gap between opening the start gate and the common epoch, µs.  Gives every
/// woken thread time to reach its first `clock_nanosleep`.
pub const START_DELAY_US: u64 = 10_000;

// ── Options ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerOptions {
    pub protocol: LockProtocol,
    /// `None` runs forever.
    pub cycles: Option<u64>,
    pub lock_memory: bool,
    pub start_delay_us: u64,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            protocol: LockProtocol::Inherit,
            cycles: None,
            lock_memory: false,
            start_delay_us: START_DELAY_US,
        }
    }
}

// ── Start gate ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GateState {
    Closed,
    Open(Timestamp),
    Aborted,
}

#[derive(Debug)]
struct StartGate {
    state: Mutex<GateState>,
    cond: Condvar,
}

impl StartGate {
    fn new() -> Self {
        Self {
            state: Mutex::new(GateState::Closed),
            cond: Condvar::new(),
        }
    }

    /// Block until the gate opens (`Some(epoch)`) or is aborted (`None`).
    fn wait(&self) -> Option<Timestamp> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            match *state {
                GateState::Closed => {
                    state = self
                        .cond
                        .wait(state)
                        .unwrap_or_else(PoisonError::into_inner);
                }
                GateState::Open(epoch) => return Some(epoch),
                GateState::Aborted => return None,
            }
        }
    }

    fn set(&self, next: GateState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = next;
        self.cond.notify_all();
    }
}

/// First message every task thread sends.
struct Ready {
    task: u32,
    result: Result<(), RtSetupError>,
}

// ── Scheduler ─────────────────────────────────────────────────────────────────

/// Per-task result returned by [`RunningScheduler::join`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskOutcome {
    pub id: u32,
    pub name: String,
    pub stats: DeadlineStats,
}

pub struct Scheduler {
    config: TaskSetConfig,
    resources: BTreeMap<String, Arc<SharedResource>>,
    sink: Arc<dyn LogSink>,
    options: SchedulerOptions,
}

impl Scheduler {
    /// Build every shared resource up front.
    ///
    /// # Errors
    /// [`SchedulerError::Lock`] if any resource lock cannot be initialised.
    pub fn new(
        config: TaskSetConfig,
        sink: Arc<dyn LogSink>,
        options: SchedulerOptions,
    ) -> Result<Self, SchedulerError> {
        let mut resources = BTreeMap::new();
        for r in config.resources() {
            let resource =
                SharedResource::new(r.name.clone(), r.critical_section_us, options.protocol)?;
            resources.insert(r.name.clone(), Arc::new(resource));
        }

        if options.protocol == LockProtocol::None && !resources.is_empty() {
            warn!("priority inheritance disabled: resource locks are plain mutexes");
        }

        info!(
            tasks = config.tasks().len(),
            resources = resources.len(),
            utilization = %format!("{:.1}%", config.total_utilization() * 100.0),
            "task set ready"
        );

        Ok(Self {
            config,
            resources,
            sink,
            options,
        })
    }

    pub fn config(&self) -> &TaskSetConfig {
        &self.config
    }

    pub fn resource(&self, name: &str) -> Option<&Arc<SharedResource>> {
        self.resources.get(name)
    }

    /// Spawn every task and release them on a common epoch.
    ///
    /// # Errors
    /// Any thread that cannot apply its attributes, or cannot be spawned,
    /// fails the whole start; no task runs an activation in that case.
    pub fn start(self) -> Result<RunningScheduler, SchedulerError> {
        if self.options.lock_memory {
            rt::lock_memory().map_err(SchedulerError::LockMemory)?;
            info!("process memory locked");
        }

        let gate = Arc::new(StartGate::new());
        let (ready_tx, ready_rx) = mpsc::channel::<Ready>();
        let mut handles: Vec<TaskHandle> = Vec::with_capacity(self.config.tasks().len());

        for spec in self.config.tasks() {
            let mut runner =
                TaskRunner::new(spec.clone(), MonotonicClock, Arc::clone(&self.sink));
            if let Some(name) = &spec.resource {
                let resource = match self.resources.get(name) {
                    Some(r) => Arc::clone(r),
                    None => {
                        let _ = abort_and_join(&gate, handles);
                        return Err(SchedulerError::UnknownResource {
                            task: spec.id,
                            resource: name.clone(),
                        });
                    }
                };
                runner = runner.with_resource(resource, SpinWork);
            }

            let params = ThreadParams::for_task(spec);
            let cycles = self.options.cycles;
            let task_gate = Arc::clone(&gate);
            let ready_tx = ready_tx.clone();
            let id = spec.id;

            let spawned = thread::Builder::new()
                .name(format!("task{id}"))
                .spawn(move || {
                    let result = params.apply_to_current_thread();
                    let failed = result.is_err();
                    // The receiver outlives every sender unless startup was
                    // already abandoned.
                    let _ = ready_tx.send(Ready { task: id, result });
                    drop(ready_tx);
                    if failed {
                        return None;
                    }

                    let epoch = task_gate.wait()?;
                    let mut task = runner.start_at(epoch);
                    match cycles {
                        Some(n) => {
                            task.run_cycles(n);
                            Some(task.stats())
                        }
                        None => task.run(),
                    }
                });

            match spawned {
                Ok(handle) => handles.push(TaskHandle {
                    id,
                    name: spec.name.clone(),
                    handle,
                }),
                Err(source) => {
                    error!(task_id = id, error = %source, "thread spawn failed");
                    let _ = abort_and_join(&gate, handles);
                    return Err(SchedulerError::ThreadSpawn { task: id, source });
                }
            }
        }
        drop(ready_tx);

        let mut failure = None;
        let mut reported = 0;
        while reported < handles.len() {
            match ready_rx.recv() {
                Ok(Ready { task, result }) => {
                    reported += 1;
                    match result {
                        Ok(()) => debug!(task_id = task, "task ready"),
                        Err(source) => {
                            error!(task_id = task, error = %source, "task setup failed");
                            if failure.is_none() {
                                failure = Some(SchedulerError::RtSetup { task, source });
                            }
                        }
                    }
                }
                // Every sender is gone: some thread died before reporting.
                Err(_) => break,
            }
        }

        if let Some(err) = failure {
            let _ = abort_and_join(&gate, handles);
            return Err(err);
        }
        if reported < handles.len() {
            let panicked = abort_and_join(&gate, handles);
            return Err(SchedulerError::TaskPanicked {
                task: panicked.unwrap_or_default(),
            });
        }

        let epoch = MonotonicClock.now().add_micros(self.options.start_delay_us);
        gate.set(GateState::Open(epoch));
        info!(epoch = %epoch, tasks = handles.len(), "start gate open");

        Ok(RunningScheduler {
            epoch,
            tasks: handles,
            resources: self.resources,
        })
    }

    /// `start()` followed by `join()`.
    pub fn run(self) -> Result<Vec<TaskOutcome>, SchedulerError> {
        self.start()?.join()
    }
}

struct TaskHandle {
    id: u32,
    name: String,
    handle: JoinHandle<Option<DeadlineStats>>,
}

/// Abort the gate and join every spawned thread.  Returns the first task
/// whose thread panicked, if any.
fn abort_and_join(gate: &StartGate, handles: Vec<TaskHandle>) -> Option<u32> {
    gate.set(GateState::Aborted);
    let mut panicked = None;
    for h in handles {
        if h.handle.join().is_err() {
            warn!(task_id = h.id, "task thread panicked during aborted startup");
            panicked = panicked.or(Some(h.id));
        }
    }
    panicked
}

// ── RunningScheduler ──────────────────────────────────────────────────────────

/// A started task set.
pub struct RunningScheduler {
    epoch: Timestamp,
    tasks: Vec<TaskHandle>,
    resources: BTreeMap<String, Arc<SharedResource>>,
}

impl RunningScheduler {
    /// The instant every task's release grid is anchored to.
    pub fn epoch(&self) -> Timestamp {
        self.epoch
    }

    pub fn resource(&self, name: &str) -> Option<&Arc<SharedResource>> {
        self.resources.get(name)
    }

    /// Wait for every task to finish.  Blocks forever when the set was
    /// started without a cycle limit.
    ///
    /// # Errors
    /// [`SchedulerError::TaskPanicked`] for the first task whose thread
    /// panicked; the remaining tasks are still joined.
    pub fn join(self) -> Result<Vec<TaskOutcome>, SchedulerError> {
        let mut outcomes = Vec::with_capacity(self.tasks.len());
        let mut failure = None;

        for t in self.tasks {
            match t.handle.join() {
                Ok(stats) => {
                    let stats = stats.unwrap_or_default();
                    info!(
                        task_id = t.id,
                        task = %t.name,
                        met = stats.met,
                        missed = stats.missed,
                        faults = stats.faults,
                        "task finished"
                    );
                    outcomes.push(TaskOutcome {
                        id: t.id,
                        name: t.name,
                        stats,
                    });
                }
                Err(_) => {
                    error!(task_id = t.id, "task thread panicked");
                    failure.get_or_insert(SchedulerError::TaskPanicked { task: t.id });
                }
            }
        }

        match failure {
            Some(err) => Err(err),
            None => Ok(outcomes),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
