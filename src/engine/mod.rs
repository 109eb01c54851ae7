//! Boundary to the simulation engine.
//!
//! The controller never models timing itself. It hands a finalized
//! [`InstantiationPlan`] to a [`SimEngine`], then asks the engine to advance
//! simulated time until a termination event. Any engine that implements the
//! trait can be driven; [`reference::ReferenceEngine`] is a small
//! deterministic one that ships with the crate.

pub mod program;
pub mod reference;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::component::ComponentDescriptor;
use crate::stats::StatsStore;
use crate::topology::{SystemParams, TopologyGraph};
use crate::types::Tick;
use crate::workload::{Workload, WorkloadSet};

pub use reference::ReferenceEngine;

/// Cause reported when `simulate()` stops at its tick limit.
pub const LIMIT_REACHED: &str = "simulate() limit reached";

/// Cause reported when a workload exits with status zero.
pub const EXITED_NORMALLY: &str = "exited normally";

/// Errors reported by an engine.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("cannot load `{path}`: {reason}")]
    Load { path: PathBuf, reason: String },

    #[error("instantiation failed: {0}")]
    Instantiate(String),

    #[error("simulation failed: {0}")]
    Runtime(String),

    #[error("engine has not been instantiated")]
    NotInstantiated,
}

/// Termination event returned by [`SimEngine::simulate`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExitEvent {
    /// Tick at which simulation stopped
    pub tick: Tick,
    /// Human-readable cause
    pub cause: String,
    /// Workload exit status
    pub exit_code: i32,
}

impl ExitEvent {
    /// Creates an exit event.
    pub fn new(tick: Tick, cause: impl Into<String>, exit_code: i32) -> Self {
        Self {
            tick,
            cause: cause.into(),
            exit_code,
        }
    }

    /// Returns true if simulation only stopped because of the tick limit.
    pub fn is_limit(&self) -> bool {
        self.cause == LIMIT_REACHED
    }
}

impl fmt::Display for ExitEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Exiting @ tick {} because {}", self.tick, self.cause)
    }
}

/// Opaque engine-side identifier of an instantiated component.
pub type HandleId = u64;

/// Engine handles keyed by component name.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineHandles {
    handles: BTreeMap<String, HandleId>,
}

impl EngineHandles {
    /// Creates an empty handle table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the handle of a component.
    pub fn insert(&mut self, component: impl Into<String>, handle: HandleId) {
        self.handles.insert(component.into(), handle);
    }

    /// Returns the handle of a component.
    pub fn get(&self, component: &str) -> Option<HandleId> {
        self.handles.get(component).copied()
    }

    /// Returns the number of handles.
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// Returns true if there are no handles.
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Iterates in component-name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, HandleId)> {
        self.handles.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

/// Everything an engine needs to build the simulated system.
///
/// The plan is a snapshot: later edits to the source graph do not reach an
/// engine that was already instantiated from it.
#[derive(Clone, Debug)]
pub struct InstantiationPlan {
    graph: TopologyGraph,
    workloads: Vec<Workload>,
}

impl InstantiationPlan {
    /// Snapshots a validated graph and its workloads.
    pub fn new(graph: &TopologyGraph, workloads: &WorkloadSet) -> Self {
        Self {
            graph: graph.clone(),
            workloads: workloads.iter().cloned().collect(),
        }
    }

    /// Returns the system parameters.
    pub fn system(&self) -> &SystemParams {
        self.graph.system()
    }

    /// Returns the wired graph.
    pub fn graph(&self) -> &TopologyGraph {
        &self.graph
    }

    /// Returns the components in insertion order.
    pub fn components(&self) -> &[ComponentDescriptor] {
        self.graph.components()
    }

    /// Returns the bound workloads.
    pub fn workloads(&self) -> &[Workload] {
        &self.workloads
    }
}

/// The operations the controller needs from a simulation engine.
///
/// # Lifecycle
///
/// `resolve_executable` may be called at any time. `instantiate` is called
/// once per engine. `simulate` blocks until the workload exits, a fatal
/// condition occurs, or `limit` ticks have elapsed, and may be called again
/// after a limit stop to continue from the current tick.
///
/// # Statistics
///
/// `reset_stats` zeroes all counters without touching simulated state.
/// `dump_stats` returns a snapshot and must not mutate the engine.
pub trait SimEngine: Send {
    /// Returns a short engine name for logs.
    fn name(&self) -> &str {
        "engine"
    }

    /// Checks that `path` names a loadable executable.
    fn resolve_executable(&self, path: &Path) -> Result<(), EngineError>;

    /// Builds the simulated system described by `plan`.
    fn instantiate(&mut self, plan: &InstantiationPlan) -> Result<EngineHandles, EngineError>;

    /// Advances simulated time.
    ///
    /// # Arguments
    /// * `limit` - Maximum number of ticks to advance; `None` runs until the
    ///   workload exits
    fn simulate(&mut self, limit: Option<Tick>) -> Result<ExitEvent, EngineError>;

    /// Zeroes all statistics counters.
    fn reset_stats(&mut self);

    /// Returns a snapshot of all statistics counters.
    fn dump_stats(&self) -> StatsStore;

    /// Returns the current simulated tick.
    fn cur_tick(&self) -> Tick;
}

impl<E: SimEngine + ?Sized> SimEngine for Box<E> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn resolve_executable(&self, path: &Path) -> Result<(), EngineError> {
        (**self).resolve_executable(path)
    }

    fn instantiate(&mut self, plan: &InstantiationPlan) -> Result<EngineHandles, EngineError> {
        (**self).instantiate(plan)
    }

    fn simulate(&mut self, limit: Option<Tick>) -> Result<ExitEvent, EngineError> {
        (**self).simulate(limit)
    }

    fn reset_stats(&mut self) {
        (**self).reset_stats()
    }

    fn dump_stats(&self) -> StatsStore {
        (**self).dump_stats()
    }

    fn cur_tick(&self) -> Tick {
        (**self).cur_tick()
    }
}
