//! Task-set configuration loading and validation.
//!
//! The task set is fixed before start.  It comes either from the built-in
//! reference table ([`TaskSetConfig::reference`]) or from a YAML file:
//!
//! ```yaml
//! resources:
//!   - name: data_bus
//!     critical_section_us: 100
//! tasks:
//!   - id: 1
//!     name: sched_bus
//!     priority: 90
//!     policy: fifo          # optional: normal | fifo | rr (default fifo)
//!     period_us: 25000
//!     offset_us: 0          # optional, default 0
//!     wcet_us: 5000
//!     resource: data_bus    # optional
//!     max_dmiss: 3          # optional, default 0 (no fault reporting)
//!     cpu: 0                # optional CPU pin
//! ```
//!
//! Every `TaskSetConfig` in existence has passed [`validate`], so downstream
//! code can rely on `period_us > 0`, `offset_us < period_us`, distinct ids,
//! distinct priorities and resolvable resource names.

pub mod error;

pub use error::ConfigError;

use std::collections::{HashMap, HashSet};
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::{debug, info};

use crate::task::{CpuAffinity, SchedPolicy, TaskSpec};

// ── Constants ─────────────────────────────────────────────────────────────────

/// Real-time priority range accepted by `SCHED_FIFO` / `SCHED_RR` on Linux.
pub const RT_PRIORITY_MIN: i32 = 1;
pub const RT_PRIORITY_MAX: i32 = 99;

/// Critical-section length used when a YAML resource entry omits it.
pub const DEFAULT_CRITICAL_SECTION_US: u64 = 100;

// ── Private YAML deserialization types ────────────────────────────────────────

/// Top-level wrapper that maps directly onto the YAML file layout.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TaskSetFile {
    #[serde(default)]
    resources: Vec<ResourceEntry>,
    tasks: Vec<TaskEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ResourceEntry {
    name: String,
    #[serde(default = "default_critical_section_us")]
    critical_section_us: u64,
}

fn default_critical_section_us() -> u64 {
    DEFAULT_CRITICAL_SECTION_US
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TaskEntry {
    id: u32,
    name: Option<String>,
    priority: i32,
    #[serde(default)]
    policy: SchedPolicy,
    period_us: u64,
    #[serde(default)]
    offset_us: u64,
    wcet_us: u64,
    resource: Option<String>,
    #[serde(default)]
    max_dmiss: u32,
    cpu: Option<u32>,
}

impl TaskEntry {
    fn into_spec(self) -> Result<TaskSpec, ConfigError> {
        let affinity = match self.cpu {
            None => CpuAffinity::Any,
            Some(cpu) if cpu < 64 => CpuAffinity::single(cpu),
            Some(cpu) => return Err(ConfigError::CpuOutOfRange { task: self.id, cpu }),
        };
        Ok(TaskSpec {
            id: self.id,
            name: self.name.unwrap_or_else(|| format!("task{}", self.id)),
            policy: self.policy,
            priority: self.priority,
            affinity,
            period_us: self.period_us,
            offset_us: self.offset_us,
            wcet_us: self.wcet_us,
            resource: self.resource,
            max_dmiss: self.max_dmiss,
        })
    }
}

// ── Public data structures ────────────────────────────────────────────────────

/// One shared-resource partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceSpec {
    pub name: String,
    /// How long each critical section holds the lock, µs.  Always `> 0`.
    pub critical_section_us: u64,
}

/// A validated, fixed task set plus its resource partitions.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskSetConfig {
    tasks: Vec<TaskSpec>,
    resources: Vec<ResourceSpec>,
}

impl TaskSetConfig {
    /// Validate and build a task set.
    pub fn new(tasks: Vec<TaskSpec>, resources: Vec<ResourceSpec>) -> Result<Self, ConfigError> {
        validate(&tasks, &resources)?;
        Ok(Self { tasks, resources })
    }

    /// The five-task reference system.
    ///
    /// | id | name      | prio | period | wcet | resource    |
    /// |----|-----------|------|--------|------|-------------|
    /// | 1  | sched_bus | 90   | 25 ms  | 5 ms | –           |
    /// | 2  | data      | 89   | 25 ms  | 5 ms | data_bus    |
    /// | 3  | control   | 88   | 50 ms  | 5 ms | control_bus |
    /// | 4  | radio     | 87   | 50 ms  | 5 ms | –           |
    /// | 5  | video     | 86   | 50 ms  | 5 ms | –           |
    pub fn reference() -> Self {
        let task = |id: u32, name: &str, priority, period_us, resource: Option<&str>| TaskSpec {
            id,
            name: name.to_string(),
            policy: SchedPolicy::Fifo,
            priority,
            affinity: CpuAffinity::Any,
            period_us,
            offset_us: 0,
            wcet_us: 5_000,
            resource: resource.map(str::to_string),
            max_dmiss: 3,
        };

        Self {
            tasks: vec![
                task(1, "sched_bus", 90, 25_000, None),
                task(2, "data", 89, 25_000, Some("data_bus")),
                task(3, "control", 88, 50_000, Some("control_bus")),
                task(4, "radio", 87, 50_000, None),
                task(5, "video", 86, 50_000, None),
            ],
            resources: vec![
                ResourceSpec {
                    name: "data_bus".into(),
                    critical_section_us: DEFAULT_CRITICAL_SECTION_US,
                },
                ResourceSpec {
                    name: "control_bus".into(),
                    critical_section_us: DEFAULT_CRITICAL_SECTION_US,
                },
            ],
        }
    }

    /// Parse and validate a YAML task table.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, the YAML is structurally
    /// invalid, or the task set violates a [`ConfigError`] rule.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        info!("Loading task set from: {}", path.display());

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Cannot open configuration file: {}", path.display()))?;

        Self::from_yaml_str(&content)
            .with_context(|| format!("Invalid task set in: {}", path.display()))
    }

    /// Parse and validate a YAML task table held in memory.
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let file: TaskSetFile =
            serde_yaml::from_str(content).context("Failed to parse task set YAML")?;

        let tasks = file
            .tasks
            .into_iter()
            .map(TaskEntry::into_spec)
            .collect::<Result<Vec<_>, _>>()?;
        let resources = file
            .resources
            .into_iter()
            .map(|r| ResourceSpec {
                name: r.name,
                critical_section_us: r.critical_section_us,
            })
            .collect();

        let config = Self::new(tasks, resources)?;
        for t in &config.tasks {
            debug!(
                "  Task {}: {} | prio {} ({}) | T={}us O={}us C={}us | resource: {:?}",
                t.id, t.name, t.priority, t.policy, t.period_us, t.offset_us, t.wcet_us, t.resource,
            );
        }
        Ok(config)
    }

    /// Force every task onto `policy`.
    ///
    /// # Errors
    /// Switching to a real-time policy re-checks the 1–99 priority range.
    pub fn with_policy(mut self, policy: SchedPolicy) -> Result<Self, ConfigError> {
        for t in &mut self.tasks {
            t.policy = policy;
        }
        validate(&self.tasks, &self.resources)?;
        Ok(self)
    }

    /// Pin every task to a single CPU.
    pub fn pinned_to_cpu(mut self, cpu: u32) -> Result<Self, ConfigError> {
        if cpu >= 64 {
            return Err(ConfigError::CpuOutOfRange { task: 0, cpu });
        }
        for t in &mut self.tasks {
            t.affinity = CpuAffinity::single(cpu);
        }
        Ok(self)
    }

    pub fn tasks(&self) -> &[TaskSpec] {
        &self.tasks
    }

    pub fn resources(&self) -> &[ResourceSpec] {
        &self.resources
    }

    pub fn resource(&self, name: &str) -> Option<&ResourceSpec> {
        self.resources.iter().find(|r| r.name == name)
    }

    /// Sum of `wcet / period` over all tasks.  Informational only.
    pub fn total_utilization(&self) -> f64 {
        self.tasks.iter().map(TaskSpec::utilization).sum()
    }
}

impl Default for TaskSetConfig {
    fn default() -> Self {
        Self::reference()
    }
}

// ── Validation ────────────────────────────────────────────────────────────────

/// Check every task-set rule; the first violation wins.
pub fn validate(tasks: &[TaskSpec], resources: &[ResourceSpec]) -> Result<(), ConfigError> {
    if tasks.is_empty() {
        return Err(ConfigError::NoTasks);
    }

    let mut resource_names = HashSet::new();
    for r in resources {
        if !resource_names.insert(r.name.as_str()) {
            return Err(ConfigError::DuplicateResource(r.name.clone()));
        }
        if r.critical_section_us == 0 {
            return Err(ConfigError::ZeroCriticalSection(r.name.clone()));
        }
    }

    let mut ids = HashSet::new();
    let mut priorities: HashMap<i32, u32> = HashMap::new();

    for t in tasks {
        if !ids.insert(t.id) {
            return Err(ConfigError::DuplicateTaskId(t.id));
        }
        if let Some(&first) = priorities.get(&t.priority) {
            return Err(ConfigError::DuplicatePriority {
                priority: t.priority,
                first,
                second: t.id,
            });
        }
        priorities.insert(t.priority, t.id);

        if t.period_us == 0 {
            return Err(ConfigError::ZeroPeriod { task: t.id });
        }
        if t.offset_us >= t.period_us {
            return Err(ConfigError::OffsetOutOfRange {
                task: t.id,
                offset_us: t.offset_us,
                period_us: t.period_us,
            });
        }
        if t.policy.is_realtime() && !(RT_PRIORITY_MIN..=RT_PRIORITY_MAX).contains(&t.priority) {
            return Err(ConfigError::PriorityOutOfRange {
                task: t.id,
                priority: t.priority,
                policy: t.policy,
            });
        }
        if let Some(name) = &t.resource {
            if !resource_names.contains(name.as_str()) {
                return Err(ConfigError::UnknownResource {
                    task: t.id,
                    resource: name.clone(),
                });
            }
        }
    }

    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
