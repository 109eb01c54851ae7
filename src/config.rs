//! Declarative system descriptions.
//!
//! A [`SystemConfig`] describes a whole session in YAML or JSON: system-wide
//! parameters, components (by kind and string attributes), links between
//! ports, workloads and session options.
//!
//! # Configuration File Structure
//!
//! ```yaml
//! session:
//!   name: hello
//!   max_ticks: 1000000000
//!
//! system:
//!   clock: 1GHz
//!   mem_mode: timing
//!   mem_ranges: ["512MB"]
//!
//! components:
//!   - name: cpu
//!     kind: Cpu
//!     attrs:
//!       model: TimingSimpleCPU
//!   - name: icache
//!     kind: CacheLevel
//!     attrs:
//!       size: 32kB
//!
//! links:
//!   - from: cpu.icache_port
//!     to: icache.cpu_side
//!
//! workloads:
//!   - cpu: cpu
//!     path: tests/hello
//! ```

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::component::ComponentKind;
use crate::controller::SimulationController;
use crate::engine::SimEngine;
use crate::error::SimError;
use crate::factory::ComponentFactory;
use crate::params::{parse_addr_range, Frequency};
use crate::topology::{MemMode, SystemParams, TopologyGraph};
use crate::types::Tick;

/// Errors that can occur during configuration loading.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unknown file format: {0}")]
    UnknownFormat(String),

    #[error("Build error: {0}")]
    Build(#[from] SimError),
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Options of one simulation session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionOptions {
    /// Session name used in logs and reports
    #[serde(default)]
    pub name: String,

    /// Tick limit for `run()`; `None` runs until the workload exits
    #[serde(default)]
    pub max_ticks: Option<Tick>,

    /// Ticks to simulate before statistics are reset
    #[serde(default)]
    pub warm_up_ticks: Tick,

    /// Logging level (trace, debug, info, warn, error) or a full
    /// `EnvFilter` directive, passed to `init_logging`
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            name: String::new(),
            max_ticks: None,
            warm_up_ticks: 0,
            log_level: default_log_level(),
        }
    }
}

/// System-wide parameters as written in a config file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SystemSection {
    /// System clock, e.g. `1GHz`
    #[serde(default = "default_clock")]
    pub clock: String,

    /// Voltage domain in volts
    #[serde(default = "default_voltage")]
    pub voltage: f64,

    /// Memory access mode
    #[serde(default)]
    pub mem_mode: MemMode,

    /// Declared physical ranges, e.g. `512MB` or `0x0:0x20000000`
    #[serde(default = "default_mem_ranges")]
    pub mem_ranges: Vec<String>,
}

fn default_clock() -> String {
    "1GHz".to_string()
}

fn default_voltage() -> f64 {
    1.0
}

fn default_mem_ranges() -> Vec<String> {
    vec!["512MB".to_string()]
}

impl Default for SystemSection {
    fn default() -> Self {
        Self {
            clock: default_clock(),
            voltage: default_voltage(),
            mem_mode: MemMode::default(),
            mem_ranges: default_mem_ranges(),
        }
    }
}

impl SystemSection {
    /// Parses the section into typed system parameters.
    pub fn to_params(&self) -> ConfigResult<SystemParams> {
        let clock: Frequency = self
            .clock
            .parse()
            .map_err(|e: String| ConfigError::Validation(format!("system clock: {}", e)))?;
        if clock.hz() == 0 {
            return Err(ConfigError::Validation("system clock must be > 0".into()));
        }
        if self.voltage <= 0.0 {
            return Err(ConfigError::Validation(format!(
                "system voltage must be > 0 (got {})",
                self.voltage
            )));
        }
        let mem_ranges = self
            .mem_ranges
            .iter()
            .map(|r| {
                parse_addr_range(r)
                    .map_err(|e| ConfigError::Validation(format!("system mem_ranges: {}", e)))
            })
            .collect::<ConfigResult<Vec<_>>>()?;
        if mem_ranges.is_empty() {
            return Err(ConfigError::Validation(
                "system declares no physical memory".into(),
            ));
        }
        Ok(SystemParams {
            clock,
            voltage: self.voltage,
            mem_mode: self.mem_mode,
            mem_ranges,
        })
    }
}

/// Configuration for one component.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ComponentConfig {
    /// Unique component name
    pub name: String,

    /// Component kind
    pub kind: ComponentKind,

    /// Parameter overrides as key-value pairs
    #[serde(default)]
    pub attrs: HashMap<String, String>,
}

/// A link between two ports, written `component.port`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkConfig {
    /// One end (either direction)
    pub from: String,
    /// The other end
    pub to: String,
}

/// A workload bound to a CPU.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadConfig {
    /// CPU name
    pub cpu: String,

    /// Executable path
    pub path: PathBuf,

    /// Arguments after the executable
    #[serde(default)]
    pub args: Vec<String>,
}

/// Complete description of a simulation session.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SystemConfig {
    /// Session options
    #[serde(default)]
    pub session: SessionOptions,

    /// System-wide parameters
    #[serde(default)]
    pub system: SystemSection,

    /// Component definitions
    #[serde(default)]
    pub components: Vec<ComponentConfig>,

    /// Link definitions
    #[serde(default)]
    pub links: Vec<LinkConfig>,

    /// Workload definitions
    #[serde(default)]
    pub workloads: Vec<WorkloadConfig>,
}

impl SystemConfig {
    /// Creates a new empty configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from a YAML file.
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Loads configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> ConfigResult<Self> {
        let config: SystemConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a JSON file.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Loads configuration from a JSON string.
    pub fn from_json(json: &str) -> ConfigResult<Self> {
        let config: SystemConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a file, auto-detecting format.
    pub fn from_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let path = path.as_ref();
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

        match ext.to_lowercase().as_str() {
            "yaml" | "yml" => Self::from_yaml_file(path),
            "json" => Self::from_json_file(path),
            _ => Err(ConfigError::UnknownFormat(ext.to_string())),
        }
    }

    /// Checks the description for problems that do not need the factory.
    ///
    /// Parameter constraints and graph invariants are checked later, when
    /// the graph is built and validated.
    pub fn validate(&self) -> ConfigResult<()> {
        self.system.to_params()?;
        tracing_subscriber::EnvFilter::try_new(&self.session.log_level).map_err(|e| {
            ConfigError::Validation(format!("Invalid log level `{}`: {}", self.session.log_level, e))
        })?;

        let mut names = HashSet::new();
        for component in &self.components {
            if !names.insert(component.name.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "Duplicate component name: {}",
                    component.name
                )));
            }
        }

        for link in &self.links {
            for end in [&link.from, &link.to] {
                let component = end.split_once('.').map(|(c, _)| c).ok_or_else(|| {
                    ConfigError::Validation(format!("Link end `{}` is not `component.port`", end))
                })?;
                if !names.contains(component) {
                    return Err(ConfigError::Validation(format!(
                        "Link references non-existent component: {}",
                        component
                    )));
                }
            }
        }

        let mut bound = HashSet::new();
        for workload in &self.workloads {
            if !names.contains(workload.cpu.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "Workload references non-existent CPU: {}",
                    workload.cpu
                )));
            }
            if !bound.insert(workload.cpu.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "CPU {} has more than one workload",
                    workload.cpu
                )));
            }
        }

        if let Some(max) = self.session.max_ticks {
            if self.session.warm_up_ticks >= max {
                tracing::warn!(
                    "warm-up of {} ticks is not shorter than the {} tick limit",
                    self.session.warm_up_ticks,
                    max
                );
            }
        }

        Ok(())
    }

    /// Builds the topology graph: components through the factory, then
    /// links in file order. The graph is not validated here.
    pub fn build_graph(&self) -> ConfigResult<TopologyGraph> {
        let mut graph = TopologyGraph::with_system(self.system.to_params()?);
        for component in &self.components {
            let descriptor =
                ComponentFactory::create(component.kind, component.name.as_str(), &component.attrs)?;
            graph.add_component(descriptor)?;
        }
        for link in &self.links {
            graph.connect(link.from.as_str(), link.to.as_str())?;
        }
        Ok(graph)
    }

    /// Builds an unbuilt session with every workload bound.
    pub fn session<E: SimEngine>(&self, engine: E) -> ConfigResult<SimulationController<E>> {
        let graph = self.build_graph()?;
        let mut controller = SimulationController::new(graph, engine).with_options(&self.session);
        for workload in &self.workloads {
            controller.bind(&workload.cpu, workload.path.clone(), workload.args.clone())?;
        }
        Ok(controller)
    }

    /// Saves configuration to a YAML file.
    pub fn to_yaml_file<P: AsRef<Path>>(&self, path: P) -> ConfigResult<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Saves configuration to a JSON file.
    pub fn to_json_file<P: AsRef<Path>>(&self, path: P) -> ConfigResult<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Converts to YAML string.
    pub fn to_yaml(&self) -> ConfigResult<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Converts to JSON string.
    pub fn to_json(&self) -> ConfigResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Finds a component configuration by name.
    pub fn find_component(&self, name: &str) -> Option<&ComponentConfig> {
        self.components.iter().find(|c| c.name == name)
    }
}

/// Builder for creating SystemConfig programmatically.
#[derive(Default)]
pub struct SystemConfigBuilder {
    config: SystemConfig,
}

impl SystemConfigBuilder {
    /// Creates a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts from the classic single-core SE system: a timing CPU with
    /// split 32 KB L1 caches on a system crossbar, interrupts wired to the
    /// crossbar, and one DDR3-1600 controller covering `[0, 512MB)`.
    pub fn single_core() -> Self {
        Self::new()
            .component("cpu", ComponentKind::Cpu, &[("model", "TimingSimpleCPU")])
            .component("icache", ComponentKind::CacheLevel, &[])
            .component("dcache", ComponentKind::CacheLevel, &[])
            .component("membus", ComponentKind::Interconnect, &[])
            .component(
                "mem_ctrl",
                ComponentKind::MemoryController,
                &[("range", "512MB"), ("medium", "DDR3_1600_8x8")],
            )
            .link("cpu.icache_port", "icache.cpu_side")
            .link("cpu.dcache_port", "dcache.cpu_side")
            .link("icache.mem_side", "membus.cpu_side_ports")
            .link("dcache.mem_side", "membus.cpu_side_ports")
            .link("cpu.interrupts.pio", "membus.mem_side_ports")
            .link("cpu.interrupts.int_requestor", "membus.cpu_side_ports")
            .link("membus.mem_side_ports", "mem_ctrl.port")
    }

    /// Sets the session name.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.session.name = name.into();
        self
    }

    /// Sets the tick limit.
    pub fn max_ticks(mut self, ticks: Tick) -> Self {
        self.config.session.max_ticks = Some(ticks);
        self
    }

    /// Sets the warm-up length.
    pub fn warm_up_ticks(mut self, ticks: Tick) -> Self {
        self.config.session.warm_up_ticks = ticks;
        self
    }

    /// Sets the log level.
    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.config.session.log_level = level.into();
        self
    }

    /// Sets the system clock, e.g. `"2GHz"`.
    pub fn clock(mut self, clock: impl Into<String>) -> Self {
        self.config.system.clock = clock.into();
        self
    }

    /// Sets the memory mode.
    pub fn mem_mode(mut self, mode: MemMode) -> Self {
        self.config.system.mem_mode = mode;
        self
    }

    /// Replaces the declared physical ranges.
    pub fn mem_ranges(mut self, ranges: &[&str]) -> Self {
        self.config.system.mem_ranges = ranges.iter().map(|r| r.to_string()).collect();
        self
    }

    /// Adds a component.
    pub fn component(
        mut self,
        name: impl Into<String>,
        kind: ComponentKind,
        attrs: &[(&str, &str)],
    ) -> Self {
        self.config.components.push(ComponentConfig {
            name: name.into(),
            kind,
            attrs: attrs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        });
        self
    }

    /// Sets one attribute of an already added component.
    pub fn attr(mut self, component: &str, key: &str, value: &str) -> Self {
        if let Some(c) = self.config.components.iter_mut().find(|c| c.name == component) {
            c.attrs.insert(key.to_string(), value.to_string());
        }
        self
    }

    /// Adds a link.
    pub fn link(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.config.links.push(LinkConfig {
            from: from.into(),
            to: to.into(),
        });
        self
    }

    /// Adds a workload.
    pub fn workload(mut self, cpu: impl Into<String>, path: impl Into<PathBuf>, args: &[&str]) -> Self {
        self.config.workloads.push(WorkloadConfig {
            cpu: cpu.into(),
            path: path.into(),
            args: args.iter().map(|a| a.to_string()).collect(),
        });
        self
    }

    /// Builds and validates the configuration.
    pub fn build(self) -> ConfigResult<SystemConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
