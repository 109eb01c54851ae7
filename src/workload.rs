//! Workload bindings: which executable each CPU runs.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::engine::SimEngine;
use crate::error::{SimError, SimResult};
use crate::topology::TopologyGraph;

/// A program bound to one CPU in syscall-emulation mode.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workload {
    cpu: String,
    path: PathBuf,
    #[serde(default)]
    args: Vec<String>,
}

impl Workload {
    /// Creates a workload for `cpu`.
    pub fn new(cpu: impl Into<String>, path: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            cpu: cpu.into(),
            path: path.into(),
            args,
        }
    }

    /// Returns the CPU this workload runs on.
    pub fn cpu(&self) -> &str {
        &self.cpu
    }

    /// Returns the executable path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the arguments after the executable.
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Returns the full command line, executable first.
    pub fn cmd(&self) -> Vec<String> {
        std::iter::once(self.path.display().to_string())
            .chain(self.args.iter().cloned())
            .collect()
    }
}

/// The workloads of a session, at most one per CPU.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WorkloadSet {
    bindings: BTreeMap<String, Workload>,
}

impl WorkloadSet {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds an executable to a CPU of `graph`.
    ///
    /// The engine decides whether `path` can be loaded; a refusal is reported
    /// as `MissingExecutable`.
    pub fn bind<E: SimEngine + ?Sized>(
        &mut self,
        graph: &TopologyGraph,
        engine: &E,
        cpu: &str,
        path: impl Into<PathBuf>,
        args: Vec<String>,
    ) -> SimResult<&Workload> {
        let component = graph
            .component(cpu)
            .ok_or_else(|| SimError::UnknownComponent(cpu.to_string()))?;
        if !component.is_cpu() {
            return Err(SimError::NotACpu(cpu.to_string()));
        }
        if self.bindings.contains_key(cpu) {
            return Err(SimError::AlreadyBound(cpu.to_string()));
        }

        let path = path.into();
        engine
            .resolve_executable(&path)
            .map_err(|e| SimError::MissingExecutable {
                path: path.clone(),
                reason: e.to_string(),
            })?;

        tracing::debug!(cpu, path = %path.display(), "workload bound");
        let workload = Workload::new(cpu, path, args);
        Ok(self.bindings.entry(cpu.to_string()).or_insert(workload))
    }

    /// Returns the workload bound to `cpu`.
    pub fn get(&self, cpu: &str) -> Option<&Workload> {
        self.bindings.get(cpu)
    }

    /// Returns the first CPU of `graph` without a workload.
    pub fn first_unbound<'a>(&self, graph: &'a TopologyGraph) -> Option<&'a str> {
        graph
            .cpus()
            .map(|c| c.name())
            .find(|name| !self.bindings.contains_key(*name))
    }

    /// Iterates over the bindings in CPU-name order.
    pub fn iter(&self) -> impl Iterator<Item = &Workload> {
        self.bindings.values()
    }

    /// Returns the number of bound CPUs.
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    /// Returns true if nothing is bound.
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}
