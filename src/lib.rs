//! # hwtopo
//!
//! Assemble a simulated computer from parameterized components, wire them
//! into a validated topology, bind workloads, and drive a simulation engine
//! through a strict session lifecycle.
//!
//! ## Design Principles
//!
//! - **Validated Construction**: Components are only produced by the
//!   [`ComponentFactory`], which rejects out-of-range parameters. A descriptor
//!   that exists is fully parameterized.
//! - **Graph as Source of Truth**: The [`TopologyGraph`] owns every descriptor
//!   and link. Validation checks completeness, connectivity, acyclic request
//!   paths and a partition of the physical address space before anything is
//!   handed to an engine.
//! - **Strict Lifecycle**: A [`SimulationController`] moves
//!   `Unbuilt → Instantiated → Running → Halted` and never re-executes a
//!   halted simulation.
//! - **Engine Boundary**: Timing models live behind the [`SimEngine`] trait.
//!   [`ReferenceEngine`] is a small deterministic engine shipped with the
//!   crate.
//!
//! ## Features
//!
//! - `parallel` - Run independent sessions of a batch on a rayon pool
//!
//! ## Quick Start
//!
//! ```rust
//! use hwtopo::config::SystemConfigBuilder;
//! use hwtopo::engine::program::{Program, ProgramCatalog};
//! use hwtopo::ReferenceEngine;
//!
//! let catalog = ProgramCatalog::new();
//! catalog.insert("tests/hello", Program::hello());
//!
//! let config = SystemConfigBuilder::single_core()
//!     .workload("cpu", "tests/hello", &[])
//!     .build()
//!     .unwrap();
//!
//! let mut session = config.session(ReferenceEngine::with_catalog(catalog)).unwrap();
//! session.instantiate().unwrap();
//! let exit = session.run().unwrap();
//! println!("{}", exit);
//! ```
//!
//! ## Configuration-Driven Setup
//!
//! ```rust,ignore
//! use hwtopo::config::SystemConfig;
//!
//! let config = SystemConfig::from_file("system.yaml")?;
//! let mut session = config.session(engine)?;
//! ```

pub mod types;
pub mod params;
pub mod component;
pub mod factory;
pub mod address;
pub mod topology;
pub mod workload;
pub mod engine;
pub mod controller;
pub mod stats;
pub mod config;
pub mod batch;
pub mod error;

// Re-export commonly used types
pub use types::{AddrRange, ComponentName, PortName, Tick, TICKS_PER_SECOND};
pub use params::{ByteSize, Frequency, ParamValue};
pub use component::{
    ComponentDescriptor, ComponentKind, CpuModel, PortArity, PortDecl, PortDirection, PortNetwork,
};
pub use factory::{
    presets, BranchPredictor, CacheParams, ComponentFactory, CpuParams, InterconnectParams,
    MediumParams, MediumSpec, MemCtrlParams,
};
pub use topology::{Link, MemMode, PortRef, SystemParams, TopologyGraph};
pub use workload::{Workload, WorkloadSet};
pub use engine::{EngineError, ExitEvent, ReferenceEngine, SimEngine};
pub use controller::{LifecycleState, SimulationController};
pub use stats::{SimulationReport, StatsStore, Timer};
pub use config::{ConfigError, SessionOptions, SystemConfig, SystemConfigBuilder};
pub use batch::{run_sessions, BatchRunner, JobError, JobResult};
pub use error::{ErrorClass, SimError, SimResult};

/// Initialize the tracing subscriber for logging.
///
/// Call this at the start of your program to enable logging. `RUST_LOG`
/// takes precedence over `level`.
///
/// # Example
///
/// ```rust,ignore
/// hwtopo::init_logging("info");
/// ```
pub fn init_logging(level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}
