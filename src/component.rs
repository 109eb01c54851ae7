//! Component descriptors and their ports.
//!
//! A [`ComponentDescriptor`] is the immutable configuration record of one
//! hardware element. Descriptors are only produced by the validating
//! [`ComponentFactory`](crate::factory::ComponentFactory), so a descriptor that
//! exists is always fully parameterized. The ports a component exposes are
//! fixed when it is built and follow from its kind and parameters.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::params::ParamValue;
use crate::types::{AddrRange, ComponentName, PortName};

/// Well-known port names.
pub mod ports {
    /// CPU instruction-fetch port
    pub const ICACHE_PORT: &str = "icache_port";
    /// CPU data port
    pub const DCACHE_PORT: &str = "dcache_port";
    /// Interrupt controller programmed-I/O port (accepts requests)
    pub const INT_PIO: &str = "interrupts.pio";
    /// Interrupt controller request port
    pub const INT_REQUESTOR: &str = "interrupts.int_requestor";
    /// Upstream side of a cache
    pub const CPU_SIDE: &str = "cpu_side";
    /// Downstream side of a cache
    pub const MEM_SIDE: &str = "mem_side";
    /// Upstream vector port of an interconnect
    pub const CPU_SIDE_PORTS: &str = "cpu_side_ports";
    /// Downstream vector port of an interconnect
    pub const MEM_SIDE_PORTS: &str = "mem_side_ports";
    /// Request-accepting port of a memory controller or medium
    pub const PORT: &str = "port";
    /// Controller port towards an external memory medium
    pub const DRAM: &str = "dram";
}

/// The kind of hardware element a descriptor configures.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ComponentKind {
    /// Processor core
    Cpu,
    /// One level of the cache hierarchy
    CacheLevel,
    /// Bus or crossbar
    Interconnect,
    /// Memory controller claiming a physical address range
    MemoryController,
    /// DRAM device or other backing medium behind a controller
    MemoryMedium,
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ComponentKind::Cpu => "CPU",
            ComponentKind::CacheLevel => "CacheLevel",
            ComponentKind::Interconnect => "Interconnect",
            ComponentKind::MemoryController => "MemoryController",
            ComponentKind::MemoryMedium => "MemoryMedium",
        };
        f.write_str(name)
    }
}

/// CPU models understood by the engine.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CpuModel {
    /// Single-issue in-order core with timing memory accesses
    #[default]
    TimingSimple,
    /// Functional core with atomic memory accesses
    Atomic,
    /// Out-of-order core
    #[serde(alias = "O3")]
    DerivO3,
}

impl CpuModel {
    /// Returns true if this model carries an interrupt controller that must
    /// be wired to the memory bus before the first instruction dispatches.
    pub fn supports_interrupts(&self) -> bool {
        matches!(self, CpuModel::TimingSimple | CpuModel::DerivO3)
    }

    /// Returns the canonical model name.
    pub fn name(&self) -> &'static str {
        match self {
            CpuModel::TimingSimple => "TimingSimpleCPU",
            CpuModel::Atomic => "AtomicSimpleCPU",
            CpuModel::DerivO3 => "DerivO3CPU",
        }
    }
}

impl std::str::FromStr for CpuModel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "TimingSimple" | "TimingSimpleCPU" => Ok(CpuModel::TimingSimple),
            "Atomic" | "AtomicSimple" | "AtomicSimpleCPU" => Ok(CpuModel::Atomic),
            "O3" | "DerivO3" | "DerivO3CPU" => Ok(CpuModel::DerivO3),
            other => Err(format!("unknown CPU model `{}`", other)),
        }
    }
}

/// Which way a port faces.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PortDirection {
    /// Upstream-facing; accepts requests.
    CpuSide,
    /// Downstream-facing; issues requests.
    MemSide,
}

impl PortDirection {
    /// Returns the opposite direction.
    pub fn opposite(&self) -> Self {
        match self {
            PortDirection::CpuSide => PortDirection::MemSide,
            PortDirection::MemSide => PortDirection::CpuSide,
        }
    }
}

impl fmt::Display for PortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortDirection::CpuSide => f.write_str("cpu-side (request-accepting)"),
            PortDirection::MemSide => f.write_str("mem-side (request-issuing)"),
        }
    }
}

/// How many links a port may carry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PortArity {
    /// At most one link.
    Single,
    /// Each link allocates a fresh indexed slot (`name[i]`).
    Vector,
}

/// The network a port belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PortNetwork {
    /// Ordinary memory request path
    Memory,
    /// Interrupt controller wiring
    Interrupt,
}

/// Declaration of a port on a component.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortDecl {
    /// Port name, unique within the component
    pub name: PortName,
    /// Request-accepting or request-issuing
    pub direction: PortDirection,
    /// Single or vector port
    pub arity: PortArity,
    /// Memory or interrupt network
    pub network: PortNetwork,
}

impl PortDecl {
    /// Declares a single memory-network port.
    pub fn new(name: impl Into<String>, direction: PortDirection) -> Self {
        Self {
            name: name.into(),
            direction,
            arity: PortArity::Single,
            network: PortNetwork::Memory,
        }
    }

    /// Turns this declaration into a vector port.
    pub fn vector(mut self) -> Self {
        self.arity = PortArity::Vector;
        self
    }

    /// Moves this port onto the interrupt network.
    pub fn interrupt(mut self) -> Self {
        self.network = PortNetwork::Interrupt;
        self
    }
}

/// Immutable configuration record of one hardware element.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ComponentDescriptor {
    name: ComponentName,
    kind: ComponentKind,
    cpu_model: Option<CpuModel>,
    params: BTreeMap<String, ParamValue>,
    ports: Vec<PortDecl>,
}

impl ComponentDescriptor {
    pub(crate) fn new(
        name: ComponentName,
        kind: ComponentKind,
        cpu_model: Option<CpuModel>,
        params: BTreeMap<String, ParamValue>,
        ports: Vec<PortDecl>,
    ) -> Self {
        Self {
            name,
            kind,
            cpu_model,
            params,
            ports,
        }
    }

    /// Returns the component name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the component kind.
    pub fn kind(&self) -> ComponentKind {
        self.kind
    }

    /// Returns the CPU model, if this is a CPU.
    pub fn cpu_model(&self) -> Option<CpuModel> {
        self.cpu_model
    }

    /// Returns true if this component is a CPU.
    pub fn is_cpu(&self) -> bool {
        self.kind == ComponentKind::Cpu
    }

    /// Returns true if this component is a CPU with an interrupt controller.
    pub fn supports_interrupts(&self) -> bool {
        self.cpu_model.is_some_and(|m| m.supports_interrupts())
    }

    /// Returns all parameters.
    pub fn params(&self) -> &BTreeMap<String, ParamValue> {
        &self.params
    }

    /// Returns one parameter.
    pub fn param(&self, key: &str) -> Option<&ParamValue> {
        self.params.get(key)
    }

    /// Returns an integer-valued parameter (`Int` or `Cycles`).
    pub fn int_param(&self, key: &str) -> Option<i64> {
        self.param(key).and_then(ParamValue::as_int)
    }

    /// Returns the declared ports.
    pub fn ports(&self) -> &[PortDecl] {
        &self.ports
    }

    /// Looks up a declared port.
    pub fn port(&self, name: &str) -> Option<&PortDecl> {
        self.ports.iter().find(|p| p.name == name)
    }

    /// Returns the physical range claimed by a memory controller.
    pub fn addr_range(&self) -> Option<AddrRange> {
        if self.kind != ComponentKind::MemoryController {
            return None;
        }
        self.param("range").and_then(ParamValue::as_range)
    }

    /// Returns a copy of this descriptor under a different name.
    ///
    /// Presets are shared as templates and copied into each graph this way.
    pub fn renamed(&self, name: impl Into<String>) -> Self {
        let mut copy = self.clone();
        copy.name = name.into();
        copy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ComponentDescriptor {
        let mut params = BTreeMap::new();
        params.insert("range".to_string(), ParamValue::Range(AddrRange::with_size(64)));
        ComponentDescriptor::new(
            "mem_ctrl".into(),
            ComponentKind::MemoryController,
            None,
            params,
            vec![PortDecl::new(ports::PORT, PortDirection::CpuSide)],
        )
    }

    #[test]
    fn test_cpu_model_capabilities() {
        assert!(CpuModel::TimingSimple.supports_interrupts());
        assert!(CpuModel::DerivO3.supports_interrupts());
        assert!(!CpuModel::Atomic.supports_interrupts());
        assert_eq!("DerivO3CPU".parse::<CpuModel>(), Ok(CpuModel::DerivO3));
        assert!("Z80".parse::<CpuModel>().is_err());
    }

    #[test]
    fn test_port_decl_builders() {
        let port = PortDecl::new(ports::CPU_SIDE_PORTS, PortDirection::CpuSide).vector();
        assert_eq!(port.arity, PortArity::Vector);
        assert_eq!(port.network, PortNetwork::Memory);

        let irq = PortDecl::new(ports::INT_PIO, PortDirection::CpuSide).interrupt();
        assert_eq!(irq.network, PortNetwork::Interrupt);
        assert_eq!(PortDirection::CpuSide.opposite(), PortDirection::MemSide);
    }

    #[test]
    fn test_descriptor_accessors() {
        let desc = sample();
        assert_eq!(desc.name(), "mem_ctrl");
        assert!(!desc.is_cpu());
        assert!(!desc.supports_interrupts());
        assert_eq!(desc.addr_range(), Some(AddrRange::with_size(64)));
        assert!(desc.port("port").is_some());
        assert!(desc.port("dram").is_none());
    }

    #[test]
    fn test_renamed_copy() {
        let desc = sample();
        let copy = desc.renamed("mem_ctrl1");
        assert_eq!(copy.name(), "mem_ctrl1");
        assert_eq!(copy.params(), desc.params());
        assert_eq!(desc.name(), "mem_ctrl");
    }
}
