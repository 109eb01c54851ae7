//! Deterministic reference engine.
//!
//! Each CPU executes its program one instruction at a time. An instruction
//! costs one CPU cycle plus the latency of its fetch and, for loads and
//! stores, its data access. Accesses walk the instantiated request path:
//!
//! - caches are set-associative with LRU replacement, write-allocate and
//!   write-back (dirty victims are written downstream off the critical path);
//! - interconnects route by physical address to the child that can reach the
//!   owning controller;
//! - controllers charge tCL + tRCD + tRP of their medium.
//!
//! In atomic memory mode every latency is zero and an instruction costs one
//! cycle. CPU wake-ups are kept in a time-ordered queue, so several CPUs
//! interleave deterministically (ties go to the lower CPU index).

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use super::program::{Op, Program, ProgramCatalog, INST_BYTES};
use super::{
    EngineError, EngineHandles, ExitEvent, InstantiationPlan, SimEngine, EXITED_NORMALLY,
    LIMIT_REACHED,
};
use crate::component::{ports, ComponentDescriptor, ComponentKind, PortNetwork};
use crate::params::ParamValue;
use crate::stats::StatsStore;
use crate::topology::{MemMode, TopologyGraph};
use crate::types::{AddrRange, Tick};

/// Cause reported when an access falls outside every memory controller.
pub const FATAL_OUT_OF_MEMORY: &str = "fatal: access outside physical memory";

/// Bytes moved by a CPU load or store.
const WORD_BYTES: u64 = 8;

#[derive(Clone, Copy, Debug)]
struct Request {
    addr: u64,
    size: u64,
    write: bool,
}

impl Request {
    fn read(addr: u64, size: u64) -> Self {
        Self {
            addr,
            size,
            write: false,
        }
    }

    fn write(addr: u64, size: u64) -> Self {
        Self {
            addr,
            size,
            write: true,
        }
    }
}

/// An access that no controller serves.
#[derive(Debug)]
struct Fault {
    addr: u64,
}

#[derive(Debug)]
struct Lookup {
    hit: bool,
    dirty_victim: Option<u64>,
}

/// Set-associative tag store. Each set keeps its ways in LRU order, most
/// recently used last.
#[derive(Debug)]
struct CacheModel {
    line_size: u64,
    num_sets: u64,
    assoc: usize,
    sets: Vec<Vec<(u64, bool)>>,
}

impl CacheModel {
    fn new(size: u64, assoc: u64, line_size: u64) -> Self {
        let num_sets = (size / (assoc * line_size)).max(1);
        Self {
            line_size,
            num_sets,
            assoc: assoc as usize,
            sets: (0..num_sets).map(|_| Vec::new()).collect(),
        }
    }

    fn line_addr(&self, addr: u64) -> u64 {
        addr - addr % self.line_size
    }

    fn lookup(&mut self, addr: u64, write: bool) -> Lookup {
        let line = addr / self.line_size;
        let set_idx = line % self.num_sets;
        let tag = line / self.num_sets;
        let set = &mut self.sets[set_idx as usize];

        if let Some(pos) = set.iter().position(|(t, _)| *t == tag) {
            let (t, dirty) = set.remove(pos);
            set.push((t, dirty || write));
            return Lookup {
                hit: true,
                dirty_victim: None,
            };
        }

        let mut dirty_victim = None;
        if set.len() >= self.assoc {
            let (victim_tag, dirty) = set.remove(0);
            if dirty {
                dirty_victim = Some((victim_tag * self.num_sets + set_idx) * self.line_size);
            }
        }
        set.push((tag, write));
        Lookup {
            hit: false,
            dirty_victim,
        }
    }
}

#[derive(Debug)]
enum Node {
    Cpu,
    Cache {
        model: CacheModel,
        lookup_ticks: Tick,
        data_ticks: Tick,
        response_ticks: Tick,
        down: Option<usize>,
    },
    Bus {
        ticks: Tick,
        routes: Vec<(AddrRange, usize)>,
    },
    Controller {
        range: AddrRange,
        latency: Tick,
        medium: Option<usize>,
    },
    Medium {
        latency: Tick,
    },
}

#[derive(Debug)]
struct Slot {
    name: String,
    node: Node,
}

enum Hop {
    Done(Tick),
    Forward {
        ticks: Tick,
        to: usize,
        req: Request,
        writeback: Option<Request>,
    },
}

/// The instantiated memory system and its counters.
#[derive(Debug, Default)]
struct Fabric {
    slots: Vec<Slot>,
    stats: StatsStore,
}

impl Fabric {
    /// Walks the request path from `idx` and returns the round-trip latency.
    fn access(&mut self, mut idx: usize, mut req: Request) -> Result<Tick, Fault> {
        let mut total: Tick = 0;
        loop {
            match self.visit(idx, req)? {
                Hop::Done(ticks) => return Ok(total.saturating_add(ticks)),
                Hop::Forward {
                    ticks,
                    to,
                    req: next,
                    writeback,
                } => {
                    if let Some(wb) = writeback {
                        self.access(to, wb)?;
                    }
                    total = total.saturating_add(ticks);
                    idx = to;
                    req = next;
                }
            }
        }
    }

    fn visit(&mut self, idx: usize, req: Request) -> Result<Hop, Fault> {
        let stats = &mut self.stats;
        let slot = &mut self.slots[idx];
        let name = slot.name.as_str();
        let fault = Fault { addr: req.addr };

        match &mut slot.node {
            Node::Cpu => Err(fault),
            Node::Cache {
                model,
                lookup_ticks,
                data_ticks,
                response_ticks,
                down,
            } => {
                stats.add(name, "accesses", 1.0);
                let outcome = model.lookup(req.addr, req.write);
                if outcome.hit {
                    stats.add(name, "hits", 1.0);
                    return Ok(Hop::Done(lookup_ticks.saturating_add(*data_ticks)));
                }
                stats.add(name, "misses", 1.0);
                let to = down.ok_or(fault)?;
                if outcome.dirty_victim.is_some() {
                    stats.add(name, "writebacks", 1.0);
                }
                Ok(Hop::Forward {
                    ticks: lookup_ticks.saturating_add(*response_ticks),
                    to,
                    req: Request::read(model.line_addr(req.addr), model.line_size),
                    writeback: outcome
                        .dirty_victim
                        .map(|addr| Request::write(addr, model.line_size)),
                })
            }
            Node::Bus { ticks, routes } => {
                stats.add(name, "transDist", 1.0);
                let to = routes
                    .iter()
                    .find(|(range, _)| range.contains(req.addr))
                    .map(|(_, to)| *to)
                    .ok_or(fault)?;
                Ok(Hop::Forward {
                    ticks: *ticks,
                    to,
                    req,
                    writeback: None,
                })
            }
            Node::Controller {
                range,
                latency,
                medium,
            } => {
                if !range.contains(req.addr) {
                    return Err(fault);
                }
                if req.write {
                    stats.add(name, "writeReqs", 1.0);
                    stats.add(name, "bytesWritten", req.size as f64);
                } else {
                    stats.add(name, "readReqs", 1.0);
                    stats.add(name, "bytesRead", req.size as f64);
                }
                Ok(match medium {
                    Some(to) => Hop::Forward {
                        ticks: 0,
                        to: *to,
                        req,
                        writeback: None,
                    },
                    None => Hop::Done(*latency),
                })
            }
            Node::Medium { latency } => {
                stats.add(name, "bytesAccessed", req.size as f64);
                Ok(Hop::Done(*latency))
            }
        }
    }
}

enum Inst {
    Alu,
    Load(u64),
    Store(u64),
    Exit(i32),
}

enum Step {
    Continue(Tick),
    Exited(Tick, i32),
}

#[derive(Debug)]
struct CpuCtx {
    name: String,
    period: Tick,
    program: Option<Program>,
    op: usize,
    done_in_op: u64,
    pc: u64,
    icache: usize,
    dcache: usize,
    exit_code: Option<i32>,
}

impl CpuCtx {
    fn next_inst(&mut self) -> Option<Inst> {
        let program = self.program.as_ref()?;
        while let Some(op) = program.ops.get(self.op) {
            match *op {
                Op::Compute(n) => {
                    if self.done_in_op < n {
                        self.done_in_op += 1;
                        return Some(Inst::Alu);
                    }
                    self.op += 1;
                    self.done_in_op = 0;
                }
                Op::Load(addr) => {
                    self.op += 1;
                    return Some(Inst::Load(addr));
                }
                Op::Store(addr) => {
                    self.op += 1;
                    return Some(Inst::Store(addr));
                }
                Op::Exit(code) => {
                    self.op += 1;
                    return Some(Inst::Exit(code));
                }
            }
        }
        None
    }
}

/// Small deterministic engine for tests and demos.
///
/// Programs are looked up in a [`ProgramCatalog`]; see
/// [`program`](super::program) for the format.
#[derive(Debug, Default)]
pub struct ReferenceEngine {
    catalog: ProgramCatalog,
    fabric: Fabric,
    cpus: Vec<CpuCtx>,
    /// CPU wake-ups keyed by tick
    queue: BTreeMap<Tick, Vec<usize>>,
    cur_tick: Tick,
    instantiated: bool,
    exit: Option<ExitEvent>,
}

impl ReferenceEngine {
    /// Creates an engine with an empty catalog; programs are read from disk.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an engine that resolves programs through `catalog` first.
    pub fn with_catalog(catalog: ProgramCatalog) -> Self {
        Self {
            catalog,
            ..Self::default()
        }
    }

    /// Returns the program catalog.
    pub fn catalog(&self) -> &ProgramCatalog {
        &self.catalog
    }

    fn schedule(&mut self, tick: Tick, cpu: usize) {
        self.queue.entry(tick).or_default().push(cpu);
    }

    fn pop_due(&mut self) -> Option<(Tick, usize)> {
        let mut entry = self.queue.first_entry()?;
        let tick = *entry.key();
        let cpus = entry.get_mut();
        let cpu = cpus.remove(0);
        if cpus.is_empty() {
            entry.remove();
        }
        Some((tick, cpu))
    }

    fn step(&mut self, i: usize, now: Tick) -> Result<Step, Fault> {
        let Some(inst) = self.cpus[i].next_inst() else {
            return Ok(Step::Exited(now, 0));
        };
        let (pc, period, icache, dcache) = {
            let cpu = &self.cpus[i];
            (cpu.pc, cpu.period, cpu.icache, cpu.dcache)
        };

        let fetch = self.fabric.access(icache, Request::read(pc, INST_BYTES))?;
        let mut ticks = fetch.saturating_add(period);
        let mut exit = None;
        match inst {
            Inst::Alu => {}
            Inst::Load(addr) => {
                let data = self.fabric.access(dcache, Request::read(addr, WORD_BYTES))?;
                ticks = ticks.saturating_add(data);
            }
            Inst::Store(addr) => {
                let data = self.fabric.access(dcache, Request::write(addr, WORD_BYTES))?;
                ticks = ticks.saturating_add(data);
            }
            Inst::Exit(code) => exit = Some(code),
        }

        let cycles = ticks.div_ceil(period);
        let cpu = &mut self.cpus[i];
        cpu.pc = cpu.pc.saturating_add(INST_BYTES);
        self.fabric.stats.add(&cpu.name, "numCycles", cycles as f64);
        self.fabric.stats.add(&cpu.name, "committedInsts", 1.0);

        let next = now.saturating_add(cycles.saturating_mul(period));
        Ok(match exit {
            Some(code) => Step::Exited(next, code),
            None => Step::Continue(next),
        })
    }

    fn all_exited(&self) -> Option<ExitEvent> {
        let mut codes = Vec::with_capacity(self.cpus.len());
        for cpu in &self.cpus {
            codes.push(cpu.exit_code?);
        }
        let code = codes.into_iter().find(|c| *c != 0).unwrap_or(0);
        let cause = if code == 0 {
            EXITED_NORMALLY.to_string()
        } else {
            format!("exited with code {}", code)
        };
        Some(ExitEvent::new(self.cur_tick, cause, code))
    }

    fn build(&mut self, plan: &InstantiationPlan) -> Result<EngineHandles, EngineError> {
        let graph = plan.graph();
        let system = plan.system();
        let sys_period = system
            .clock
            .period()
            .ok_or_else(|| EngineError::Instantiate("system clock is zero".into()))?;
        let timing = system.mem_mode == MemMode::Timing;
        let lat = |ticks: Tick| if timing { ticks } else { 0 };

        let index: HashMap<&str, usize> = graph
            .components()
            .iter()
            .enumerate()
            .map(|(i, c)| (c.name(), i))
            .collect();
        let target = |component: &str, port: &str| -> Option<usize> {
            graph
                .links_of(component, port)
                .find(|l| l.from.component == component && l.network == PortNetwork::Memory)
                .and_then(|l| index.get(l.to.component.as_str()).copied())
        };

        let mut memo = HashMap::new();
        let mut slots = Vec::with_capacity(graph.len());
        let mut stats = StatsStore::new();
        let mut handles = EngineHandles::new();

        for (i, desc) in graph.components().iter().enumerate() {
            let name = desc.name();
            handles.insert(name, i as u64);
            let node = match desc.kind() {
                ComponentKind::Cpu => {
                    stats.set(name, "numCycles", 0.0);
                    stats.set(name, "committedInsts", 0.0);
                    Node::Cpu
                }
                ComponentKind::CacheLevel => {
                    for metric in ["hits", "misses", "accesses", "writebacks"] {
                        stats.set(name, metric, 0.0);
                    }
                    let size = desc
                        .param("size")
                        .and_then(ParamValue::as_size)
                        .ok_or_else(|| missing(name, "size"))?;
                    Node::Cache {
                        model: CacheModel::new(
                            size.bytes(),
                            int(desc, "assoc")?,
                            int(desc, "line_size")?,
                        ),
                        lookup_ticks: lat(cycle_ticks(desc, "tag_latency", sys_period)?),
                        data_ticks: lat(cycle_ticks(desc, "data_latency", sys_period)?),
                        response_ticks: lat(cycle_ticks(desc, "response_latency", sys_period)?),
                        down: target(name, ports::MEM_SIDE),
                    }
                }
                ComponentKind::Interconnect => {
                    stats.set(name, "transDist", 0.0);
                    let ticks = checked_sum(
                        desc,
                        [
                            cycle_ticks(desc, "frontend_latency", sys_period)?,
                            cycle_ticks(desc, "forward_latency", sys_period)?,
                            cycle_ticks(desc, "response_latency", sys_period)?,
                        ],
                    )?;
                    let mut routes = Vec::new();
                    for link in graph.downstream_of(name) {
                        if let Some(&to) = index.get(link.to.component.as_str()) {
                            for range in ranges_below(graph, &link.to.component, &mut memo) {
                                routes.push((range, to));
                            }
                        }
                    }
                    Node::Bus {
                        ticks: lat(ticks),
                        routes,
                    }
                }
                ComponentKind::MemoryController => {
                    for metric in ["readReqs", "writeReqs", "bytesRead", "bytesWritten"] {
                        stats.set(name, metric, 0.0);
                    }
                    let range = desc.addr_range().ok_or_else(|| missing(name, "range"))?;
                    let medium = target(name, ports::DRAM);
                    let latency = if medium.is_some() { 0 } else { medium_latency(desc)? };
                    Node::Controller {
                        range,
                        latency: lat(latency),
                        medium,
                    }
                }
                ComponentKind::MemoryMedium => {
                    stats.set(name, "bytesAccessed", 0.0);
                    Node::Medium {
                        latency: lat(medium_latency(desc)?),
                    }
                }
            };
            slots.push(Slot {
                name: name.to_string(),
                node,
            });
        }

        let mut cpus = Vec::new();
        for desc in graph.cpus() {
            let name = desc.name();
            let period = match desc.param("clock").and_then(ParamValue::as_frequency) {
                Some(clock) => clock
                    .period()
                    .ok_or_else(|| EngineError::Instantiate(format!("`{}` clock is zero", name)))?,
                None => sys_period,
            };
            let program = match plan.workloads().iter().find(|w| w.cpu() == name) {
                Some(workload) => Some(self.catalog.resolve(workload.path())?),
                None => None,
            };
            let icache = target(name, ports::ICACHE_PORT)
                .ok_or_else(|| EngineError::Instantiate(format!("`{}` has no fetch path", name)))?;
            let dcache = target(name, ports::DCACHE_PORT)
                .ok_or_else(|| EngineError::Instantiate(format!("`{}` has no data path", name)))?;
            let pc = program.as_ref().map(|p| p.text_base).unwrap_or_default();
            cpus.push(CpuCtx {
                name: name.to_string(),
                period,
                program,
                op: 0,
                done_in_op: 0,
                pc,
                icache,
                dcache,
                exit_code: None,
            });
        }

        self.fabric = Fabric { slots, stats };
        self.cpus = cpus;
        self.queue.clear();
        for i in 0..self.cpus.len() {
            self.schedule(0, i);
        }
        Ok(handles)
    }
}

impl SimEngine for ReferenceEngine {
    fn name(&self) -> &str {
        "reference"
    }

    fn resolve_executable(&self, path: &Path) -> Result<(), EngineError> {
        self.catalog.resolve(path).map(|_| ())
    }

    fn instantiate(&mut self, plan: &InstantiationPlan) -> Result<EngineHandles, EngineError> {
        if self.instantiated {
            return Err(EngineError::Instantiate("engine is already instantiated".into()));
        }
        let handles = self.build(plan)?;
        self.instantiated = true;
        tracing::debug!(components = handles.len(), cpus = self.cpus.len(), "reference engine built");
        Ok(handles)
    }

    fn simulate(&mut self, limit: Option<Tick>) -> Result<ExitEvent, EngineError> {
        if !self.instantiated {
            return Err(EngineError::NotInstantiated);
        }
        if let Some(exit) = &self.exit {
            return Err(EngineError::Runtime(format!(
                "simulation already ended at tick {}",
                exit.tick
            )));
        }
        let end = limit.map(|l| self.cur_tick.saturating_add(l));

        loop {
            let next_tick = self.queue.keys().next().copied();
            let Some(tick) = next_tick else {
                let exit = self.all_exited().ok_or_else(|| {
                    EngineError::Runtime("no CPU is scheduled to run".into())
                })?;
                self.exit = Some(exit.clone());
                return Ok(exit);
            };
            // Events due at `end` or later belong to the next call.
            if let Some(end) = end.filter(|e| tick >= *e) {
                self.cur_tick = self.cur_tick.max(end);
                return Ok(ExitEvent::new(self.cur_tick, LIMIT_REACHED, 0));
            }
            let Some((tick, i)) = self.pop_due() else {
                continue;
            };
            self.cur_tick = self.cur_tick.max(tick);

            match self.step(i, tick) {
                Ok(Step::Continue(next)) => self.schedule(next, i),
                Ok(Step::Exited(at, code)) => {
                    self.cur_tick = self.cur_tick.max(at);
                    self.cpus[i].exit_code = Some(code);
                    tracing::debug!(cpu = %self.cpus[i].name, code, tick = at, "workload exited");
                }
                Err(fault) => {
                    tracing::warn!(
                        cpu = %self.cpus[i].name,
                        addr = %format!("{:#x}", fault.addr),
                        "access outside physical memory"
                    );
                    let exit = ExitEvent::new(self.cur_tick, FATAL_OUT_OF_MEMORY, 1);
                    self.exit = Some(exit.clone());
                    return Ok(exit);
                }
            }
        }
    }

    fn reset_stats(&mut self) {
        self.fabric.stats.reset();
    }

    fn dump_stats(&self) -> StatsStore {
        self.fabric.stats.clone()
    }

    fn cur_tick(&self) -> Tick {
        self.cur_tick
    }
}

fn missing(component: &str, option: &str) -> EngineError {
    EngineError::Instantiate(format!("`{}` has no `{}` parameter", component, option))
}

fn int(desc: &ComponentDescriptor, key: &str) -> Result<u64, EngineError> {
    desc.int_param(key)
        .and_then(|v| u64::try_from(v).ok())
        .ok_or_else(|| missing(desc.name(), key))
}

fn overflow(desc: &ComponentDescriptor, what: &str) -> EngineError {
    EngineError::Instantiate(format!("`{}` {} overflows the tick counter", desc.name(), what))
}

/// Converts a latency given in cycles to ticks.
fn cycle_ticks(desc: &ComponentDescriptor, key: &str, period: Tick) -> Result<Tick, EngineError> {
    int(desc, key)?
        .checked_mul(period)
        .ok_or_else(|| overflow(desc, key))
}

fn checked_sum<const N: usize>(
    desc: &ComponentDescriptor,
    parts: [Tick; N],
) -> Result<Tick, EngineError> {
    parts
        .into_iter()
        .try_fold(0 as Tick, |acc, t| acc.checked_add(t))
        .ok_or_else(|| overflow(desc, "latency"))
}

fn medium_latency(desc: &ComponentDescriptor) -> Result<Tick, EngineError> {
    checked_sum(
        desc,
        [int(desc, "t_cl_ps")?, int(desc, "t_rcd_ps")?, int(desc, "t_rp_ps")?],
    )
}

/// Controller ranges reachable downstream of `component`.
fn ranges_below<'a>(
    graph: &'a TopologyGraph,
    component: &'a str,
    memo: &mut HashMap<&'a str, Vec<AddrRange>>,
) -> Vec<AddrRange> {
    if let Some(known) = memo.get(component) {
        return known.clone();
    }
    let ranges = match graph.component(component) {
        Some(desc) if desc.kind() == ComponentKind::MemoryController => {
            desc.addr_range().into_iter().collect()
        }
        Some(_) => {
            let mut ranges = Vec::new();
            for link in graph.downstream_of(component) {
                ranges.extend(ranges_below(graph, &link.to.component, memo));
            }
            ranges
        }
        None => Vec::new(),
    };
    memo.insert(component, ranges.clone());
    ranges
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factory::{
        presets, CacheParams, ComponentFactory, CpuParams, MediumParams, MediumSpec, MemCtrlParams,
    };
    use crate::topology::SystemParams;
    use crate::workload::WorkloadSet;

    const MB: u64 = 1024 * 1024;

    fn system(mem_mode: MemMode) -> TopologyGraph {
        system_with_icache(mem_mode, presets::l1_icache("icache").unwrap())
    }

    fn system_with_icache(mem_mode: MemMode, icache: ComponentDescriptor) -> TopologyGraph {
        let mut g = TopologyGraph::with_system(SystemParams {
            mem_mode,
            ..SystemParams::default()
        });
        g.add_component(presets::timing_cpu("cpu").unwrap()).unwrap();
        g.add_component(icache).unwrap();
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
        g.validate().unwrap();
        g
    }

    fn engine_for(graph: &TopologyGraph, program: Program) -> ReferenceEngine {
        let catalog = ProgramCatalog::new();
        catalog.insert("prog", program);
        let mut engine = ReferenceEngine::with_catalog(catalog);
        let mut workloads = WorkloadSet::new();
        workloads.bind(graph, &engine, "cpu", "prog", vec![]).unwrap();
        engine
            .instantiate(&InstantiationPlan::new(graph, &workloads))
            .unwrap();
        engine
    }

    #[test]
    fn test_cache_lru() {
        // 2 sets, 2 ways, 64 byte lines
        let mut cache = CacheModel::new(256, 2, 64);
        assert!(!cache.lookup(0, false).hit);
        assert!(cache.lookup(8, false).hit);
        assert!(!cache.lookup(128, true).hit);
        // Touch line 0 so the dirty line at 128 becomes LRU.
        assert!(cache.lookup(0, false).hit);
        let evict = cache.lookup(256, false);
        assert!(!evict.hit);
        assert_eq!(evict.dirty_victim, Some(128));
    }

    #[test]
    fn test_hello_exits_normally() {
        let graph = system(MemMode::Timing);
        let mut engine = engine_for(&graph, Program::hello());
        let exit = engine.simulate(None).unwrap();

        assert_eq!(exit.cause, EXITED_NORMALLY);
        assert_eq!(exit.exit_code, 0);
        assert!(exit.tick > 0);
        assert_eq!(engine.cur_tick(), exit.tick);

        let stats = engine.dump_stats();
        assert_eq!(stats.metric("cpu", "committedInsts"), Some(82.0));
        assert!(stats.metric("icache", "hits").unwrap() > 0.0);
        assert!(stats.metric("icache", "misses").unwrap() > 0.0);
        assert_eq!(stats.metric("dcache", "misses"), Some(1.0));
        assert_eq!(stats.metric("dcache", "hits"), Some(1.0));
        assert!(stats.metric("membus", "transDist").unwrap() > 0.0);
        assert!(stats.metric("mem_ctrl", "readReqs").unwrap() > 0.0);
    }

    #[test]
    fn test_exit_code_and_rerun_refused() {
        let graph = system(MemMode::Timing);
        let mut engine = engine_for(&graph, Program::new(vec![Op::Compute(3), Op::Exit(7)]));
        let exit = engine.simulate(None).unwrap();
        assert_eq!(exit.cause, "exited with code 7");
        assert_eq!(exit.exit_code, 7);
        assert!(matches!(engine.simulate(None), Err(EngineError::Runtime(_))));
    }

    #[test]
    fn test_access_outside_memory_is_fatal() {
        let graph = system(MemMode::Timing);
        let mut engine = engine_for(&graph, Program::new(vec![Op::Load(1024 * MB)]));
        let exit = engine.simulate(None).unwrap();
        assert_eq!(exit.cause, FATAL_OUT_OF_MEMORY);
        assert_ne!(exit.exit_code, 0);
    }

    #[test]
    fn test_limit_then_resume() {
        let graph = system(MemMode::Timing);
        let mut engine = engine_for(&graph, Program::new(vec![Op::Compute(10_000)]));

        let first = engine.simulate(Some(1_000_000)).unwrap();
        assert!(first.is_limit());
        assert_eq!(first.tick, 1_000_000);

        let done = engine.simulate(None).unwrap();
        assert_eq!(done.cause, EXITED_NORMALLY);
        assert!(done.tick > first.tick);
    }

    #[test]
    fn test_zero_limit_executes_nothing() {
        let graph = system(MemMode::Timing);
        let mut engine = engine_for(&graph, Program::new(vec![Op::Compute(10)]));

        let stopped = engine.simulate(Some(0)).unwrap();
        assert!(stopped.is_limit());
        assert_eq!(stopped.tick, 0);
        assert_eq!(engine.dump_stats().metric("cpu", "committedInsts"), Some(0.0));

        let done = engine.simulate(None).unwrap();
        assert_eq!(done.cause, EXITED_NORMALLY);
        assert_eq!(engine.dump_stats().metric("cpu", "committedInsts"), Some(10.0));
    }

    #[test]
    fn test_huge_latency_fails_instantiate() {
        let icache = ComponentFactory::cache(
            "icache",
            CacheParams::default().with_tag_latency(100_000_000_000_000_000),
        )
        .unwrap();
        let graph = system_with_icache(MemMode::Timing, icache);

        let catalog = ProgramCatalog::new();
        catalog.insert("prog", Program::hello());
        let mut engine = ReferenceEngine::with_catalog(catalog);
        let mut workloads = WorkloadSet::new();
        workloads.bind(&graph, &engine, "cpu", "prog", vec![]).unwrap();

        match engine.instantiate(&InstantiationPlan::new(&graph, &workloads)) {
            Err(EngineError::Instantiate(msg)) => assert!(msg.contains("tag_latency"), "{}", msg),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_atomic_mode_is_one_cycle_per_instruction() {
        let graph = system(MemMode::Atomic);
        let mut engine = engine_for(&graph, Program::new(vec![Op::Compute(100)]));
        let exit = engine.simulate(None).unwrap();
        // 1 GHz clock: 1000 ticks per cycle.
        assert_eq!(exit.tick, 100 * 1000);
        assert_eq!(engine.dump_stats().metric("cpu", "numCycles"), Some(100.0));
    }

    #[test]
    fn test_reset_stats_keeps_state() {
        let graph = system(MemMode::Timing);
        let mut engine = engine_for(&graph, Program::new(vec![Op::Compute(500)]));
        engine.simulate(Some(50_000)).unwrap();
        let tick = engine.cur_tick();

        engine.reset_stats();
        assert_eq!(engine.cur_tick(), tick);
        assert_eq!(engine.dump_stats().metric("cpu", "committedInsts"), Some(0.0));
        assert!(engine.dump_stats().has_component("mem_ctrl"));
    }

    #[test]
    fn test_external_medium_counts_bytes() {
        let mut g = TopologyGraph::new();
        g.add_component(
            ComponentFactory::cpu("cpu", CpuParams::default().with_model(crate::component::CpuModel::Atomic))
                .unwrap(),
        )
        .unwrap();
        g.add_component(presets::system_xbar("membus").unwrap()).unwrap();
        g.add_component(
            ComponentFactory::memory_controller(
                "mem_ctrl",
                MemCtrlParams::new(AddrRange::with_size(512 * MB)).with_medium(MediumSpec::External),
            )
            .unwrap(),
        )
        .unwrap();
        g.add_component(ComponentFactory::memory_medium("dram", MediumParams::simple(1000)).unwrap())
            .unwrap();
        g.connect("cpu.icache_port", "membus.cpu_side_ports").unwrap();
        g.connect("cpu.dcache_port", "membus.cpu_side_ports").unwrap();
        g.connect("membus.mem_side_ports", "mem_ctrl.port").unwrap();
        g.connect("mem_ctrl.dram", "dram.port").unwrap();
        g.validate().unwrap();

        let mut engine = engine_for(&g, Program::new(vec![Op::Store(4096), Op::Exit(0)]));
        engine.simulate(None).unwrap();

        let stats = engine.dump_stats();
        assert_eq!(stats.metric("mem_ctrl", "writeReqs"), Some(1.0));
        assert_eq!(stats.metric("mem_ctrl", "readReqs"), Some(2.0));
        assert_eq!(stats.metric("dram", "bytesAccessed"), Some(16.0));
    }

    #[test]
    fn test_unknown_program_fails_resolution() {
        let engine = ReferenceEngine::new();
        assert!(engine.resolve_executable(Path::new("/no/such/program")).is_err());
    }
}
