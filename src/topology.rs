//! Topology graph: components wired together through their ports.
//!
//! The graph is built incrementally with [`TopologyGraph::add_component`] and
//! [`TopologyGraph::connect`], then checked as a whole by
//! [`TopologyGraph::validate`]. Validation must succeed before a session can
//! be instantiated.
//!
//! # Example
//!
//! ```
//! use hwtopo::factory::{CacheParams, ComponentFactory, CpuParams, InterconnectParams, MemCtrlParams};
//! use hwtopo::topology::TopologyGraph;
//! use hwtopo::types::AddrRange;
//!
//! let mut graph = TopologyGraph::new();
//! graph.add_component(ComponentFactory::cpu("cpu", CpuParams::default()).unwrap()).unwrap();
//! graph.add_component(ComponentFactory::cache("icache", CacheParams::default()).unwrap()).unwrap();
//! graph.add_component(ComponentFactory::cache("dcache", CacheParams::default()).unwrap()).unwrap();
//! graph.add_component(ComponentFactory::interconnect("membus", InterconnectParams::default()).unwrap()).unwrap();
//! graph.add_component(
//!     ComponentFactory::memory_controller("mem_ctrl", MemCtrlParams::new(AddrRange::with_size(512 << 20))).unwrap(),
//! ).unwrap();
//!
//! graph.connect("cpu.icache_port", "icache.cpu_side").unwrap();
//! graph.connect("cpu.dcache_port", "dcache.cpu_side").unwrap();
//! graph.connect("icache.mem_side", "membus.cpu_side_ports").unwrap();
//! graph.connect("dcache.mem_side", "membus.cpu_side_ports").unwrap();
//! graph.connect("membus.mem_side_ports", "cpu.interrupts.pio").unwrap();
//! graph.connect("cpu.interrupts.int_requestor", "membus.cpu_side_ports").unwrap();
//! graph.connect("membus.mem_side_ports", "mem_ctrl.port").unwrap();
//!
//! assert!(graph.validate().is_ok());
//! ```

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;

use crate::address::check_partition;
use crate::component::{
    ComponentDescriptor, ComponentKind, PortArity, PortDecl, PortDirection, PortNetwork,
};
use crate::error::{SimError, SimResult};
use crate::params::{ByteSize, Frequency};
use crate::types::AddrRange;

/// Reference to a port on a named component.
///
/// Written as `component.port`; vector slots as `component.port[i]`. The
/// component name ends at the first `.`, so port names may contain dots
/// (`cpu.interrupts.pio`).
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PortRef {
    /// Owning component
    pub component: String,
    /// Port name on that component
    pub port: String,
    /// Slot index for vector ports, assigned when the link is made
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<usize>,
}

impl PortRef {
    /// Creates a reference to `component.port`.
    pub fn new(component: impl Into<String>, port: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            port: port.into(),
            index: None,
        }
    }

    /// Parses `component.port`; a string without a dot names no port.
    pub fn parse(s: &str) -> Self {
        match s.split_once('.') {
            Some((component, port)) => Self::new(component, port),
            None => Self::new(s, ""),
        }
    }

    fn with_index(mut self, index: Option<usize>) -> Self {
        self.index = index;
        self
    }

    fn key(&self) -> (String, String) {
        (self.component.clone(), self.port.clone())
    }
}

impl From<&str> for PortRef {
    fn from(s: &str) -> Self {
        PortRef::parse(s)
    }
}

impl From<(&str, &str)> for PortRef {
    fn from((component, port): (&str, &str)) -> Self {
        PortRef::new(component, port)
    }
}

impl fmt::Display for PortRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.index {
            Some(i) => write!(f, "{}.{}[{}]", self.component, self.port, i),
            None => write!(f, "{}.{}", self.component, self.port),
        }
    }
}

/// A connection from a request-issuing port to a request-accepting port.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    /// The mem-side (request-issuing) end
    pub from: PortRef,
    /// The cpu-side (request-accepting) end
    pub to: PortRef,
    /// Interrupt if either end is an interrupt port
    pub network: PortNetwork,
}

impl fmt::Display for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.from, self.to)
    }
}

/// How the engine services memory accesses.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemMode {
    /// Detailed, latency-accurate accesses
    #[default]
    Timing,
    /// Fast functional accesses that complete immediately
    Atomic,
}

/// System-wide parameters of the simulated machine.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SystemParams {
    /// System clock domain
    pub clock: Frequency,
    /// Voltage domain in volts
    pub voltage: f64,
    /// Memory access mode
    pub mem_mode: MemMode,
    /// Declared physical address space
    pub mem_ranges: Vec<AddrRange>,
}

impl Default for SystemParams {
    /// 1 GHz, 1 V, timing mode, `[0, 512MB)`.
    fn default() -> Self {
        Self {
            clock: Frequency::ghz(1),
            voltage: 1.0,
            mem_mode: MemMode::Timing,
            mem_ranges: vec![AddrRange::with_size(ByteSize::mib(512).bytes())],
        }
    }
}

/// The set of component descriptors and the links between them.
#[derive(Clone, Debug, Default)]
pub struct TopologyGraph {
    system: SystemParams,
    components: Vec<ComponentDescriptor>,
    index: HashMap<String, usize>,
    links: Vec<Link>,
    /// Number of links attached to each (component, port)
    link_counts: HashMap<(String, String), usize>,
}

impl TopologyGraph {
    /// Creates an empty graph with default system parameters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty graph with the given system parameters.
    pub fn with_system(system: SystemParams) -> Self {
        Self {
            system,
            ..Self::default()
        }
    }

    /// Returns the system parameters.
    pub fn system(&self) -> &SystemParams {
        &self.system
    }

    /// Replaces the declared physical address space.
    pub fn set_mem_ranges(&mut self, ranges: Vec<AddrRange>) {
        self.system.mem_ranges = ranges;
    }

    /// Registers a descriptor.
    ///
    /// Fails with `DuplicateName` if a component of that name exists, or
    /// `InvalidParameter` if the name is empty or contains a `.`.
    pub fn add_component(&mut self, descriptor: ComponentDescriptor) -> SimResult<()> {
        let name = descriptor.name().to_string();
        if name.is_empty() || name.contains('.') {
            return Err(SimError::invalid_param(
                name,
                "name",
                "must be non-empty and contain no `.`",
            ));
        }
        if self.index.contains_key(&name) {
            return Err(SimError::DuplicateName(name));
        }
        tracing::debug!(component = %name, kind = %descriptor.kind(), "component added");
        self.index.insert(name, self.components.len());
        self.components.push(descriptor);
        Ok(())
    }

    /// Links two ports.
    ///
    /// The ports may be given in either order; the request-issuing end
    /// becomes the link source. Vector ports receive the next free slot.
    pub fn connect(&mut self, a: impl Into<PortRef>, b: impl Into<PortRef>) -> SimResult<Link> {
        let a = a.into();
        let b = b.into();
        let a_decl = self.resolve(&a)?.clone();
        let b_decl = self.resolve(&b)?.clone();

        if a.component == b.component {
            return Err(SimError::SelfLink(a.component));
        }
        if a_decl.direction == b_decl.direction {
            return Err(SimError::DirectionMismatch {
                from: a.to_string(),
                to: b.to_string(),
                direction: a_decl.direction,
            });
        }
        for (port, decl) in [(&a, &a_decl), (&b, &b_decl)] {
            if decl.arity == PortArity::Single && self.link_count(port) > 0 {
                return Err(SimError::AlreadyLinked(port.to_string()));
            }
        }

        let ((from, from_decl), (to, to_decl)) = if a_decl.direction == PortDirection::MemSide {
            ((a, a_decl), (b, b_decl))
        } else {
            ((b, b_decl), (a, a_decl))
        };
        let network = if from_decl.network == PortNetwork::Interrupt
            || to_decl.network == PortNetwork::Interrupt
        {
            PortNetwork::Interrupt
        } else {
            PortNetwork::Memory
        };

        let from_index = self.next_slot(&from, &from_decl);
        let to_index = self.next_slot(&to, &to_decl);
        *self.link_counts.entry(from.key()).or_insert(0) += 1;
        *self.link_counts.entry(to.key()).or_insert(0) += 1;

        let link = Link {
            from: from.with_index(from_index),
            to: to.with_index(to_index),
            network,
        };
        tracing::debug!(%link, "ports linked");
        self.links.push(link.clone());
        Ok(link)
    }

    /// Checks the graph invariants.
    ///
    /// Checks run in this order and the first failure is returned:
    /// `MissingRoot`, `DanglingPort`, `DisconnectedGraph`, `TransportCycle`,
    /// `AddressRangeOverlap`.
    pub fn validate(&self) -> SimResult<()> {
        let root = self
            .components
            .iter()
            .find(|c| c.is_cpu())
            .ok_or(SimError::MissingRoot)?;

        for component in &self.components {
            for port in component.ports() {
                let port_ref = PortRef::new(component.name(), port.name.as_str());
                if self.link_count(&port_ref) == 0 {
                    return Err(SimError::DanglingPort(port_ref.to_string()));
                }
            }
        }

        self.check_connected(root.name())?;
        self.check_requests_reach_memory()?;
        self.check_acyclic()?;

        let claims: Vec<(&str, AddrRange)> = self
            .memory_controllers()
            .filter_map(|c| c.addr_range().map(|r| (c.name(), r)))
            .collect();
        check_partition(&claims, &self.system.mem_ranges).map_err(SimError::AddressRangeOverlap)?;

        tracing::info!(
            components = self.components.len(),
            links = self.links.len(),
            "topology validated"
        );
        Ok(())
    }

    /// Returns a component by name.
    pub fn component(&self, name: &str) -> Option<&ComponentDescriptor> {
        self.index.get(name).map(|&i| &self.components[i])
    }

    /// Returns true if a component of that name is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Returns all components in insertion order.
    pub fn components(&self) -> &[ComponentDescriptor] {
        &self.components
    }

    /// Returns all links in creation order.
    pub fn links(&self) -> &[Link] {
        &self.links
    }

    /// Returns the CPUs in insertion order.
    pub fn cpus(&self) -> impl Iterator<Item = &ComponentDescriptor> {
        self.components.iter().filter(|c| c.is_cpu())
    }

    /// Returns the memory controllers in insertion order.
    pub fn memory_controllers(&self) -> impl Iterator<Item = &ComponentDescriptor> {
        self.components
            .iter()
            .filter(|c| c.kind() == ComponentKind::MemoryController)
    }

    /// Returns the links attached to `component.port`.
    pub fn links_of<'a>(&'a self, component: &'a str, port: &'a str) -> impl Iterator<Item = &'a Link> {
        self.links.iter().filter(move |l| {
            (l.from.component == component && l.from.port == port)
                || (l.to.component == component && l.to.port == port)
        })
    }

    /// Returns true if `component.port` carries at least one link.
    pub fn is_linked(&self, component: &str, port: &str) -> bool {
        self.link_count(&PortRef::new(component, port)) > 0
    }

    /// Returns the memory-network links leaving `component`.
    pub fn downstream_of<'a>(&'a self, component: &'a str) -> impl Iterator<Item = &'a Link> {
        self.links
            .iter()
            .filter(move |l| l.network == PortNetwork::Memory && l.from.component == component)
    }

    /// Returns the number of components.
    pub fn len(&self) -> usize {
        self.components.len()
    }

    /// Returns true if no component is registered.
    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    fn resolve(&self, port: &PortRef) -> SimResult<&PortDecl> {
        let component = self
            .component(&port.component)
            .ok_or_else(|| SimError::UnknownComponent(port.component.clone()))?;
        component.port(&port.port).ok_or_else(|| SimError::UnknownPort {
            component: port.component.clone(),
            port: port.port.clone(),
        })
    }

    fn link_count(&self, port: &PortRef) -> usize {
        self.link_counts.get(&port.key()).copied().unwrap_or(0)
    }

    fn next_slot(&self, port: &PortRef, decl: &PortDecl) -> Option<usize> {
        match decl.arity {
            PortArity::Vector => Some(self.link_count(port)),
            PortArity::Single => None,
        }
    }

    /// Every component must be reachable from the root over links of any
    /// direction and network.
    fn check_connected(&self, root: &str) -> SimResult<()> {
        let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();
        for link in &self.links {
            adjacency
                .entry(link.from.component.as_str())
                .or_default()
                .push(link.to.component.as_str());
            adjacency
                .entry(link.to.component.as_str())
                .or_default()
                .push(link.from.component.as_str());
        }

        let mut seen: HashSet<&str> = HashSet::new();
        let mut queue: VecDeque<&str> = VecDeque::new();
        seen.insert(root);
        queue.push_back(root);
        while let Some(node) = queue.pop_front() {
            for &next in adjacency.get(node).into_iter().flatten() {
                if seen.insert(next) {
                    queue.push_back(next);
                }
            }
        }

        match self.components.iter().find(|c| !seen.contains(c.name())) {
            Some(orphan) => Err(SimError::DisconnectedGraph(format!(
                "`{}` is unreachable from `{}`",
                orphan.name(),
                root
            ))),
            None => Ok(()),
        }
    }

    /// Every request-issuing memory port outside the memory controllers must
    /// lead to a memory controller.
    fn check_requests_reach_memory(&self) -> SimResult<()> {
        let mut reaches: HashMap<&str, bool> = HashMap::new();
        for component in &self.components {
            if component.kind() == ComponentKind::MemoryController {
                continue;
            }
            for port in component.ports() {
                if port.direction != PortDirection::MemSide || port.network != PortNetwork::Memory {
                    continue;
                }
                let ok = self
                    .links_of(component.name(), &port.name)
                    .filter(|l| l.network == PortNetwork::Memory)
                    .any(|l| self.reaches_controller(&l.to.component, &mut reaches));
                if !ok {
                    return Err(SimError::DisconnectedGraph(format!(
                        "`{}.{}` does not reach a memory controller",
                        component.name(),
                        port.name
                    )));
                }
            }
        }
        Ok(())
    }

    fn reaches_controller<'a>(&'a self, start: &'a str, memo: &mut HashMap<&'a str, bool>) -> bool {
        if let Some(&known) = memo.get(start) {
            return known;
        }
        let mut seen: HashSet<&str> = HashSet::new();
        let mut stack = vec![start];
        let mut found = false;
        while let Some(node) = stack.pop() {
            if !seen.insert(node) {
                continue;
            }
            if memo.get(node) == Some(&true)
                || self.component(node).map(|c| c.kind()) == Some(ComponentKind::MemoryController)
            {
                found = true;
                break;
            }
            stack.extend(self.downstream_of(node).map(|l| l.to.component.as_str()));
        }
        memo.insert(start, found);
        found
    }

    /// Memory-network links must not form a directed cycle (Kahn's algorithm).
    fn check_acyclic(&self) -> SimResult<()> {
        let mut in_degree: HashMap<&str, usize> =
            self.components.iter().map(|c| (c.name(), 0)).collect();
        let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();
        for link in self.links.iter().filter(|l| l.network == PortNetwork::Memory) {
            adjacency
                .entry(link.from.component.as_str())
                .or_default()
                .push(link.to.component.as_str());
            if let Some(deg) = in_degree.get_mut(link.to.component.as_str()) {
                *deg += 1;
            }
        }

        let mut queue: VecDeque<&str> = self
            .components
            .iter()
            .map(|c| c.name())
            .filter(|n| in_degree.get(n) == Some(&0))
            .collect();
        let mut visited = 0usize;
        while let Some(node) = queue.pop_front() {
            visited += 1;
            for &next in adjacency.get(node).into_iter().flatten() {
                if let Some(deg) = in_degree.get_mut(next) {
                    *deg -= 1;
                    if *deg == 0 {
                        queue.push_back(next);
                    }
                }
            }
        }

        if visited == self.components.len() {
            return Ok(());
        }
        let stuck = self
            .components
            .iter()
            .map(|c| c.name())
            .find(|n| in_degree.get(n).is_some_and(|d| *d > 0))
            .unwrap_or_default();
        Err(SimError::TransportCycle(stuck.to_string()))
    }
}
