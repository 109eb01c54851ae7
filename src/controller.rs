//! Simulation controller (session lifecycle).
//!
//! A [`SimulationController`] owns one topology graph, its workload bindings
//! and one engine. It moves through
//! `Unbuilt → Instantiated → Running → Halted`:
//!
//! - `instantiate()` validates the graph, checks that every CPU has a
//!   workload and hands the plan to the engine. A failure here poisons the
//!   session.
//! - `warm_up()` optionally advances the engine before measurement starts.
//! - `run()` resets statistics, blocks in the engine until a termination
//!   event and halts. Statistics are dumped on every halt, whatever the
//!   cause.
//! - `Halted` is terminal.
//!
//! # Example
//!
//! ```ignore
//! let mut ctrl = SimulationController::new(graph, ReferenceEngine::new());
//! ctrl.bind("cpu", "tests/hello.yaml", vec![])?;
//! ctrl.instantiate()?;
//! let exit = ctrl.run()?;
//! println!("{}", exit);
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use crate::config::SessionOptions;
use crate::engine::{EngineHandles, ExitEvent, InstantiationPlan, SimEngine};
use crate::error::{SimError, SimResult};
use crate::stats::{SimulationReport, StatsStore, Timer};
use crate::topology::TopologyGraph;
use crate::types::Tick;
use crate::workload::WorkloadSet;

/// Lifecycle state of a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LifecycleState {
    /// Graph is being built; nothing exists in the engine yet.
    Unbuilt,
    /// The engine holds the system; no measured run has started.
    Instantiated,
    /// Inside the engine's event loop.
    Running,
    /// Terminated; statistics have been dumped.
    Halted,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecycleState::Unbuilt => "unbuilt",
            LifecycleState::Instantiated => "instantiated",
            LifecycleState::Running => "running",
            LifecycleState::Halted => "halted",
        };
        f.write_str(name)
    }
}

/// Drives one simulation session against an engine.
pub struct SimulationController<E: SimEngine> {
    name: String,
    graph: TopologyGraph,
    workloads: WorkloadSet,
    engine: E,
    state: LifecycleState,
    poisoned: Option<String>,
    handles: EngineHandles,
    max_ticks: Option<Tick>,
    exit: Option<ExitEvent>,
    last_dump: Option<StatsStore>,
    wall_time_ms: f64,
}

impl<E: SimEngine> SimulationController<E> {
    /// Creates an unbuilt session over `graph`.
    pub fn new(graph: TopologyGraph, engine: E) -> Self {
        Self {
            name: String::new(),
            graph,
            workloads: WorkloadSet::new(),
            engine,
            state: LifecycleState::Unbuilt,
            poisoned: None,
            handles: EngineHandles::new(),
            max_ticks: None,
            exit: None,
            last_dump: None,
            wall_time_ms: 0.0,
        }
    }

    /// Applies session options (name and tick limit).
    pub fn with_options(mut self, options: &SessionOptions) -> Self {
        self.name = options.name.clone();
        self.max_ticks = options.max_ticks;
        self
    }

    /// Sets the session name used in logs and reports.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Caps `run()` at `ticks` simulated ticks.
    pub fn with_max_ticks(mut self, ticks: Tick) -> Self {
        self.max_ticks = Some(ticks);
        self
    }

    /// Returns the current state.
    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// Returns true if a failed instantiation abandoned this session.
    pub fn is_poisoned(&self) -> bool {
        self.poisoned.is_some()
    }

    /// Returns the topology graph.
    pub fn graph(&self) -> &TopologyGraph {
        &self.graph
    }

    /// Returns the graph for editing; only allowed before instantiation.
    pub fn graph_mut(&mut self) -> SimResult<&mut TopologyGraph> {
        self.require(LifecycleState::Unbuilt, "edit the topology")?;
        Ok(&mut self.graph)
    }

    /// Returns the workload bindings.
    pub fn workloads(&self) -> &WorkloadSet {
        &self.workloads
    }

    /// Returns the engine.
    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Returns the engine handles recorded at instantiation.
    pub fn handles(&self) -> &EngineHandles {
        &self.handles
    }

    /// Returns the current simulated tick.
    pub fn cur_tick(&self) -> Tick {
        self.engine.cur_tick()
    }

    /// Returns the termination event once halted.
    pub fn exit_event(&self) -> Option<&ExitEvent> {
        self.exit.as_ref()
    }

    /// Binds an executable to a CPU.
    ///
    /// # Arguments
    /// * `cpu` - Name of a CPU component in the graph
    /// * `path` - Executable path, checked by the engine's loader
    /// * `args` - Arguments passed after the executable
    pub fn bind(
        &mut self,
        cpu: &str,
        path: impl Into<PathBuf>,
        args: Vec<String>,
    ) -> SimResult<()> {
        self.require(LifecycleState::Unbuilt, "bind a workload")?;
        self.workloads
            .bind(&self.graph, &self.engine, cpu, path, args)
            .map(|_| ())
    }

    /// Moves `Unbuilt → Instantiated`.
    ///
    /// Any failure poisons the session: every later lifecycle call returns
    /// `SessionPoisoned`.
    pub fn instantiate(&mut self) -> SimResult<&EngineHandles> {
        self.require(LifecycleState::Unbuilt, "instantiate")?;

        if let Err(err) = self.prepare() {
            tracing::error!(session = %self.name, error = %err, "instantiation failed");
            self.poisoned = Some(err.to_string());
            return Err(err);
        }

        self.state = LifecycleState::Instantiated;
        tracing::info!(
            session = %self.name,
            engine = self.engine.name(),
            components = self.handles.len(),
            "system instantiated"
        );
        Ok(&self.handles)
    }

    fn prepare(&mut self) -> SimResult<()> {
        self.graph
            .validate()
            .map_err(|e| SimError::ValidationFailed(Box::new(e)))?;
        if let Some(cpu) = self.workloads.first_unbound(&self.graph) {
            return Err(SimError::UnboundCpu(cpu.to_string()));
        }
        let plan = InstantiationPlan::new(&self.graph, &self.workloads);
        self.handles = self
            .engine
            .instantiate(&plan)
            .map_err(|e| SimError::Engine(e.to_string()))?;
        Ok(())
    }

    /// Advances the engine by `ticks` before the measured run.
    ///
    /// Statistics are left alone; `run()` resets them. Returns the exit event
    /// if the workload terminated during warm-up, in which case the session
    /// has halted.
    pub fn warm_up(&mut self, ticks: Tick) -> SimResult<Option<ExitEvent>> {
        self.require(LifecycleState::Instantiated, "warm up")?;
        tracing::info!(session = %self.name, ticks, "warming up");

        match self.engine.simulate(Some(ticks)) {
            Ok(exit) if exit.is_limit() => Ok(None),
            Ok(exit) => {
                tracing::warn!(session = %self.name, cause = %exit.cause, "workload ended during warm-up");
                self.halt(exit.clone());
                Ok(Some(exit))
            }
            Err(err) => Err(self.halt_on_engine_error(err.to_string())),
        }
    }

    /// Moves `Instantiated → Running → Halted` and returns the termination
    /// event.
    ///
    /// Statistics are reset first. On `Halted` this fails with
    /// `SessionHalted` without touching the engine.
    pub fn run(&mut self) -> SimResult<ExitEvent> {
        if let Some(reason) = &self.poisoned {
            return Err(SimError::SessionPoisoned(reason.clone()));
        }
        match self.state {
            LifecycleState::Instantiated => {}
            LifecycleState::Halted => return Err(SimError::SessionHalted),
            state => {
                return Err(SimError::InvalidTransition {
                    operation: "run",
                    state,
                })
            }
        }

        self.engine.reset_stats();
        self.state = LifecycleState::Running;
        tracing::info!(session = %self.name, start_tick = self.engine.cur_tick(), "running");

        let timer = Timer::start();
        let result = self.engine.simulate(self.max_ticks);
        self.wall_time_ms = timer.elapsed_ms();

        match result {
            Ok(exit) => {
                self.halt(exit.clone());
                Ok(exit)
            }
            Err(err) => Err(self.halt_on_engine_error(err.to_string())),
        }
    }

    /// Returns the statistics.
    ///
    /// Once halted this is the store dumped at halt, so repeated calls return
    /// identical values. Before that it is a live snapshot from the engine.
    pub fn dump_statistics(&self) -> SimResult<StatsStore> {
        if let Some(reason) = &self.poisoned {
            return Err(SimError::SessionPoisoned(reason.clone()));
        }
        match (&self.last_dump, self.state) {
            (Some(dump), _) => Ok(dump.clone()),
            (None, LifecycleState::Unbuilt) => Err(SimError::InvalidTransition {
                operation: "dump statistics",
                state: self.state,
            }),
            (None, _) => Ok(self.engine.dump_stats()),
        }
    }

    /// Returns the final report; available once halted.
    pub fn report(&self) -> SimResult<SimulationReport> {
        if let Some(reason) = &self.poisoned {
            return Err(SimError::SessionPoisoned(reason.clone()));
        }
        match (&self.exit, &self.last_dump) {
            (Some(exit), Some(stats)) => Ok(SimulationReport {
                name: self.name.clone(),
                ticks: exit.tick,
                cause: exit.cause.clone(),
                exit_code: exit.exit_code,
                stats: stats.clone(),
                wall_time_ms: self.wall_time_ms,
            }),
            _ => Err(SimError::InvalidTransition {
                operation: "report",
                state: self.state,
            }),
        }
    }

    /// Consumes the session and returns its engine.
    pub fn into_engine(self) -> E {
        self.engine
    }

    fn require(&self, state: LifecycleState, operation: &'static str) -> SimResult<()> {
        if let Some(reason) = &self.poisoned {
            return Err(SimError::SessionPoisoned(reason.clone()));
        }
        if self.state == LifecycleState::Halted && state != LifecycleState::Halted {
            return Err(SimError::SessionHalted);
        }
        if self.state != state {
            return Err(SimError::InvalidTransition {
                operation,
                state: self.state,
            });
        }
        Ok(())
    }

    fn halt(&mut self, exit: ExitEvent) {
        self.last_dump = Some(self.engine.dump_stats());
        self.state = LifecycleState::Halted;
        tracing::info!(session = %self.name, "Exiting @ tick {} because {}", exit.tick, exit.cause);
        self.exit = Some(exit);
    }

    fn halt_on_engine_error(&mut self, message: String) -> SimError {
        tracing::error!(session = %self.name, error = %message, "engine error");
        let tick = self.engine.cur_tick();
        self.halt(ExitEvent::new(tick, format!("engine error: {}", message), -1));
        SimError::Engine(message)
    }
}

impl<E: SimEngine> fmt::Debug for SimulationController<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimulationController")
            .field("name", &self.name)
            .field("engine", &self.engine.name())
            .field("state", &self.state)
            .field("components", &self.graph.len())
            .field("exit", &self.exit)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::program::{Op, Program, ProgramCatalog};
    use crate::engine::{EngineError, ReferenceEngine, EXITED_NORMALLY};
    use crate::factory::presets;
    use crate::types::AddrRange;

    const MB: u64 = 1024 * 1024;

    fn graph() -> TopologyGraph {
        let mut g = TopologyGraph::new();
        g.add_component(presets::timing_cpu("cpu").unwrap()).unwrap();
        g.add_component(presets::l1_icache("icache").unwrap()).unwrap();
        g.add_component(presets::l1_dcache("dcache").unwrap()).unwrap();
        g.add_component(presets::system_xbar("membus").unwrap()).unwrap();
        g.add_component(presets::ddr3_1600_8x8("mem_ctrl", AddrRange::with_size(512 * MB)).unwrap())
            .unwrap();
        g.connect("cpu.icache_port", "icache.cpu_side").unwrap();
        g.connect("cpu.dcache_port", "dcache.cpu_side").unwrap();
        g.connect("icache.mem_side", "membus.cpu_side_ports").unwrap();
        g.connect("dcache.mem_side", "membus.cpu_side_ports").unwrap();
        g.connect("membus.mem_side_ports", "cpu.interrupts.pio").unwrap();
        g.connect("cpu.interrupts.int_requestor", "membus.cpu_side_ports").unwrap();
        g.connect("membus.mem_side_ports", "mem_ctrl.port").unwrap();
        g
    }

    fn engine(program: Program) -> ReferenceEngine {
        let catalog = ProgramCatalog::new();
        catalog.insert("prog", program);
        ReferenceEngine::with_catalog(catalog)
    }

    fn session(program: Program) -> SimulationController<ReferenceEngine> {
        let mut ctrl = SimulationController::new(graph(), engine(program)).with_name("test");
        ctrl.bind("cpu", "prog", vec![]).unwrap();
        ctrl
    }

    #[test]
    fn test_happy_path() {
        let mut ctrl = session(Program::new(vec![Op::Exit(0)]));
        assert_eq!(ctrl.state(), LifecycleState::Unbuilt);

        let handles = ctrl.instantiate().unwrap();
        assert_eq!(handles.len(), 5);
        assert_eq!(ctrl.state(), LifecycleState::Instantiated);

        let exit = ctrl.run().unwrap();
        assert_eq!(exit.cause, EXITED_NORMALLY);
        assert_eq!(ctrl.state(), LifecycleState::Halted);

        let report = ctrl.report().unwrap();
        assert_eq!(report.ticks, exit.tick);
        assert_eq!(report.name, "test");
        for name in ["cpu", "icache", "dcache", "membus", "mem_ctrl"] {
            assert!(report.stats.has_component(name), "no stats for {}", name);
        }
    }

    #[test]
    fn test_run_before_instantiate() {
        let mut ctrl = session(Program::hello());
        assert_eq!(
            ctrl.run(),
            Err(SimError::InvalidTransition {
                operation: "run",
                state: LifecycleState::Unbuilt
            })
        );
    }

    #[test]
    fn test_unbound_cpu_poisons() {
        let mut ctrl = SimulationController::new(graph(), engine(Program::hello()));
        assert_eq!(
            ctrl.instantiate().unwrap_err(),
            SimError::UnboundCpu("cpu".into())
        );
        assert!(ctrl.is_poisoned());
        assert!(matches!(ctrl.instantiate(), Err(SimError::SessionPoisoned(_))));
        assert!(matches!(ctrl.run(), Err(SimError::SessionPoisoned(_))));
    }

    #[test]
    fn test_validation_failure_is_wrapped() {
        let mut g = graph();
        g.set_mem_ranges(vec![AddrRange::with_size(1024 * MB)]);
        let mut ctrl = SimulationController::new(g, engine(Program::hello()));
        ctrl.bind("cpu", "prog", vec![]).unwrap();
        match ctrl.instantiate() {
            Err(SimError::ValidationFailed(inner)) => {
                assert!(matches!(*inner, SimError::AddressRangeOverlap(_)))
            }
            other => panic!("expected ValidationFailed, got {:?}", other),
        }
    }

    #[test]
    fn test_second_run_is_refused() {
        let mut ctrl = session(Program::hello());
        ctrl.instantiate().unwrap();
        let first = ctrl.run().unwrap();
        let tick = ctrl.cur_tick();

        assert_eq!(ctrl.run(), Err(SimError::SessionHalted));
        assert_eq!(ctrl.cur_tick(), tick);
        assert_eq!(ctrl.exit_event(), Some(&first));
    }

    #[test]
    fn test_dump_is_idempotent() {
        let mut ctrl = session(Program::hello());
        ctrl.instantiate().unwrap();
        ctrl.run().unwrap();
        assert_eq!(ctrl.dump_statistics().unwrap(), ctrl.dump_statistics().unwrap());
    }

    #[test]
    fn test_warm_up_counts_are_discarded() {
        let mut ctrl = session(Program::new(vec![Op::Compute(2_000)]));
        ctrl.instantiate().unwrap();
        assert_eq!(ctrl.warm_up(100_000).unwrap(), None);
        let warm = ctrl.dump_statistics().unwrap();
        let warm_insts = warm.metric("cpu", "committedInsts").unwrap();
        assert!(warm_insts > 0.0);

        ctrl.run().unwrap();
        let measured = ctrl.dump_statistics().unwrap();
        let total = measured.metric("cpu", "committedInsts").unwrap() + warm_insts;
        assert_eq!(total, 2_000.0);
    }

    #[test]
    fn test_exit_during_warm_up_halts() {
        let mut ctrl = session(Program::new(vec![Op::Compute(10), Op::Exit(3)]));
        ctrl.instantiate().unwrap();

        let exit = ctrl.warm_up(1_000_000_000).unwrap().expect("workload exits early");
        assert_eq!(exit.exit_code, 3);
        assert_eq!(ctrl.state(), LifecycleState::Halted);
        assert_eq!(ctrl.exit_event(), Some(&exit));

        // Dumped at halt, before any reset.
        let stats = ctrl.dump_statistics().unwrap();
        assert_eq!(stats.metric("cpu", "committedInsts"), Some(11.0));

        assert_eq!(ctrl.run(), Err(SimError::SessionHalted));
        assert_eq!(ctrl.dump_statistics().unwrap(), stats);
    }

    #[test]
    fn test_limit_halts_with_dump() {
        let mut ctrl = session(Program::new(vec![Op::Compute(1_000_000)])).with_max_ticks(10_000);
        ctrl.instantiate().unwrap();
        let exit = ctrl.run().unwrap();
        assert!(exit.is_limit());
        assert_eq!(ctrl.state(), LifecycleState::Halted);
        assert!(ctrl.report().is_ok());
    }

    struct FailingEngine;

    impl SimEngine for FailingEngine {
        fn resolve_executable(&self, _: &std::path::Path) -> Result<(), EngineError> {
            Ok(())
        }

        fn instantiate(&mut self, _: &InstantiationPlan) -> Result<EngineHandles, EngineError> {
            Ok(EngineHandles::new())
        }

        fn simulate(&mut self, _: Option<Tick>) -> Result<ExitEvent, EngineError> {
            Err(EngineError::Runtime("bad opcode at 0x400000".into()))
        }

        fn reset_stats(&mut self) {}

        fn dump_stats(&self) -> StatsStore {
            let mut stats = StatsStore::new();
            stats.set("cpu", "numCycles", 3.0);
            stats
        }

        fn cur_tick(&self) -> Tick {
            3000
        }
    }

    #[test]
    fn test_engine_error_still_dumps() {
        let mut ctrl = SimulationController::new(graph(), FailingEngine);
        ctrl.bind("cpu", "anything", vec![]).unwrap();
        ctrl.instantiate().unwrap();

        let err = ctrl.run().unwrap_err();
        assert_eq!(err, SimError::Engine("simulation failed: bad opcode at 0x400000".into()));
        assert_eq!(ctrl.state(), LifecycleState::Halted);

        let report = ctrl.report().unwrap();
        assert_eq!(report.ticks, 3000);
        assert!(report.cause.starts_with("engine error: "));
        assert_eq!(report.stats.metric("cpu", "numCycles"), Some(3.0));
    }
}
