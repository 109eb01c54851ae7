//! Validating factory for component descriptors.
//!
//! Each component kind has a typed parameter record (`CacheParams`,
//! `CpuParams`, ...) whose `Default` is the common preset. Callers override any
//! subset with the `with_*` methods and hand the record to
//! [`ComponentFactory`], which checks the kind-specific constraints and
//! produces an immutable [`ComponentDescriptor`]. Nothing is registered
//! anywhere; construction is pure.
//!
//! The string-attribute route ([`ComponentFactory::create`]) is what the
//! configuration loader uses: attributes are applied on top of the defaults
//! and go through the same checks.
//!
//! # Example
//!
//! ```
//! use hwtopo::factory::{CacheParams, ComponentFactory};
//!
//! let l1i = ComponentFactory::cache("l1i", CacheParams::default()).unwrap();
//! assert_eq!(l1i.int_param("assoc"), Some(2));
//!
//! let bad = ComponentFactory::cache("l1d", CacheParams::default().with_mshrs(0));
//! assert!(bad.is_err());
//! ```

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;

use crate::component::{
    ports, ComponentDescriptor, ComponentKind, CpuModel, PortDecl, PortDirection,
};
use crate::error::{SimError, SimResult};
use crate::params::{parse_addr_range, ByteSize, Frequency, ParamValue};
use crate::types::AddrRange;

/// Parameters of one cache level.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheParams {
    /// Total capacity
    pub size: ByteSize,
    /// Associativity (ways per set)
    pub assoc: i64,
    /// Line size in bytes; must be a power of two
    pub line_size: i64,
    /// Tag lookup latency in cycles
    pub tag_latency: i64,
    /// Data array latency in cycles
    pub data_latency: i64,
    /// Response latency in cycles
    pub response_latency: i64,
    /// Miss status holding registers
    pub mshrs: i64,
    /// Targets tracked per MSHR
    pub tgts_per_mshr: i64,
}

impl Default for CacheParams {
    /// 32 KB, 2-way, 2/2/2 cycle latencies, 4 MSHRs with 20 targets each.
    fn default() -> Self {
        Self {
            size: ByteSize::kib(32),
            assoc: 2,
            line_size: 64,
            tag_latency: 2,
            data_latency: 2,
            response_latency: 2,
            mshrs: 4,
            tgts_per_mshr: 20,
        }
    }
}

impl CacheParams {
    /// Unified second-level cache preset: 256 KB, 8-way, 20 cycle latencies.
    pub fn l2() -> Self {
        Self {
            size: ByteSize::kib(256),
            assoc: 8,
            line_size: 64,
            tag_latency: 20,
            data_latency: 20,
            response_latency: 20,
            mshrs: 20,
            tgts_per_mshr: 12,
        }
    }

    /// Overrides the capacity.
    pub fn with_size(mut self, size: ByteSize) -> Self {
        self.size = size;
        self
    }

    /// Overrides the associativity.
    pub fn with_assoc(mut self, assoc: i64) -> Self {
        self.assoc = assoc;
        self
    }

    /// Overrides the line size.
    pub fn with_line_size(mut self, line_size: i64) -> Self {
        self.line_size = line_size;
        self
    }

    /// Overrides the tag latency.
    pub fn with_tag_latency(mut self, cycles: i64) -> Self {
        self.tag_latency = cycles;
        self
    }

    /// Overrides the data latency.
    pub fn with_data_latency(mut self, cycles: i64) -> Self {
        self.data_latency = cycles;
        self
    }

    /// Overrides the response latency.
    pub fn with_response_latency(mut self, cycles: i64) -> Self {
        self.response_latency = cycles;
        self
    }

    /// Sets tag, data and response latency at once.
    pub fn with_latencies(self, tag: i64, data: i64, response: i64) -> Self {
        self.with_tag_latency(tag)
            .with_data_latency(data)
            .with_response_latency(response)
    }

    /// Overrides the MSHR count.
    pub fn with_mshrs(mut self, mshrs: i64) -> Self {
        self.mshrs = mshrs;
        self
    }

    /// Overrides the targets per MSHR.
    pub fn with_tgts_per_mshr(mut self, tgts: i64) -> Self {
        self.tgts_per_mshr = tgts;
        self
    }
}

/// Branch predictors a CPU may carry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BranchPredictor {
    /// Tournament of local and global predictors
    Tournament,
    /// Bi-mode predictor
    BiMode,
    /// Local history predictor
    Local,
}

impl FromStr for BranchPredictor {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Tournament" | "TournamentBP" => Ok(BranchPredictor::Tournament),
            "BiMode" | "BiModeBP" => Ok(BranchPredictor::BiMode),
            "Local" | "LocalBP" => Ok(BranchPredictor::Local),
            other => Err(format!("unknown branch predictor `{}`", other)),
        }
    }
}

/// Parameters of a CPU.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CpuParams {
    /// Core model
    pub model: CpuModel,
    /// Clock override; `None` uses the system clock
    pub clock: Option<Frequency>,
    /// Branch predictor, if any
    pub branch_predictor: Option<BranchPredictor>,
    /// Hardware threads (workload contexts)
    pub num_threads: i64,
}

impl Default for CpuParams {
    fn default() -> Self {
        Self {
            model: CpuModel::TimingSimple,
            clock: None,
            branch_predictor: Some(BranchPredictor::Tournament),
            num_threads: 1,
        }
    }
}

impl CpuParams {
    /// Overrides the core model.
    pub fn with_model(mut self, model: CpuModel) -> Self {
        self.model = model;
        self
    }

    /// Overrides the clock.
    pub fn with_clock(mut self, clock: Frequency) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Overrides the branch predictor.
    pub fn with_branch_predictor(mut self, bp: Option<BranchPredictor>) -> Self {
        self.branch_predictor = bp;
        self
    }

    /// Overrides the thread count.
    pub fn with_threads(mut self, threads: i64) -> Self {
        self.num_threads = threads;
        self
    }
}

/// Parameters of a bus or crossbar.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterconnectParams {
    /// Data path width in bytes
    pub width: i64,
    /// Cycles spent in the request frontend
    pub frontend_latency: i64,
    /// Cycles to forward a request downstream
    pub forward_latency: i64,
    /// Cycles to return a response upstream
    pub response_latency: i64,
    /// Whether a snoop filter is present
    pub snoop_filter: bool,
}

impl Default for InterconnectParams {
    /// System crossbar: 16 byte width, 3/4/2 cycle latencies.
    fn default() -> Self {
        Self {
            width: 16,
            frontend_latency: 3,
            forward_latency: 4,
            response_latency: 2,
            snoop_filter: true,
        }
    }
}

impl InterconnectParams {
    /// Overrides the width.
    pub fn with_width(mut self, width: i64) -> Self {
        self.width = width;
        self
    }

    /// Overrides the three latencies.
    pub fn with_latencies(mut self, frontend: i64, forward: i64, response: i64) -> Self {
        self.frontend_latency = frontend;
        self.forward_latency = forward;
        self.response_latency = response;
        self
    }
}

/// Parameters of a memory device.
///
/// Timings are in picoseconds so they stay independent of any clock domain.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediumParams {
    /// Device family name
    pub device: String,
    /// Capacity of one device
    pub device_size: ByteSize,
    /// Ranks per channel
    pub ranks: i64,
    /// Banks per rank
    pub banks_per_rank: i64,
    /// Burst length in beats
    pub burst_length: i64,
    /// CAS latency
    pub t_cl_ps: i64,
    /// RAS-to-CAS delay
    pub t_rcd_ps: i64,
    /// Row precharge time
    pub t_rp_ps: i64,
}

impl Default for MediumParams {
    fn default() -> Self {
        Self::ddr3_1600_8x8()
    }
}

impl MediumParams {
    /// DDR3-1600 with 8 x8 devices per rank.
    pub fn ddr3_1600_8x8() -> Self {
        Self {
            device: "DDR3_1600_8x8".to_string(),
            device_size: ByteSize::mib(512),
            ranks: 2,
            banks_per_rank: 8,
            burst_length: 8,
            t_cl_ps: 13_750,
            t_rcd_ps: 13_750,
            t_rp_ps: 13_750,
        }
    }

    /// Fixed-latency memory with no bank structure.
    pub fn simple(latency_ps: i64) -> Self {
        Self {
            device: "SimpleMemory".to_string(),
            device_size: ByteSize::mib(512),
            ranks: 1,
            banks_per_rank: 1,
            burst_length: 1,
            t_cl_ps: latency_ps,
            t_rcd_ps: 0,
            t_rp_ps: 0,
        }
    }
}

/// Where a memory controller's medium lives.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MediumSpec {
    /// The medium is configured inline on the controller.
    Integrated(MediumParams),
    /// The medium is a separate component linked to the `dram` port.
    External,
}

/// Parameters of a memory controller.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemCtrlParams {
    /// Physical range served by this controller
    pub range: AddrRange,
    /// Attached medium
    pub medium: MediumSpec,
}

impl MemCtrlParams {
    /// Controller for `range` with an inline DDR3-1600 medium.
    pub fn new(range: AddrRange) -> Self {
        Self {
            range,
            medium: MediumSpec::Integrated(MediumParams::default()),
        }
    }

    /// Overrides the medium.
    pub fn with_medium(mut self, medium: MediumSpec) -> Self {
        self.medium = medium;
        self
    }
}

/// Produces validated component descriptors.
#[derive(Clone, Copy, Debug, Default)]
pub struct ComponentFactory;

impl ComponentFactory {
    /// Builds a cache level.
    ///
    /// Fails with `InvalidParameter` if a latency is negative, `mshrs` or
    /// `tgts_per_mshr` is zero, or the geometry is inconsistent.
    pub fn cache(name: impl Into<String>, p: CacheParams) -> SimResult<ComponentDescriptor> {
        let name = name.into();
        let check = Check::new(&name);
        check.positive("size", p.size.bytes() as i64)?;
        check.positive("assoc", p.assoc)?;
        check.positive("line_size", p.line_size)?;
        if (p.line_size as u64).count_ones() != 1 {
            return Err(check.fail("line_size", "must be a power of two"));
        }
        check.non_negative("tag_latency", p.tag_latency)?;
        check.non_negative("data_latency", p.data_latency)?;
        check.non_negative("response_latency", p.response_latency)?;
        check.positive("mshrs", p.mshrs)?;
        check.positive("tgts_per_mshr", p.tgts_per_mshr)?;
        let lines = p.size.bytes() / (p.line_size as u64);
        if p.assoc as u64 > lines {
            return Err(check.fail(
                "assoc",
                format!("must not exceed size / line_size ({} lines)", lines),
            ));
        }
        let set_bytes = (p.assoc as u64)
            .checked_mul(p.line_size as u64)
            .ok_or_else(|| check.fail("assoc", "assoc * line_size overflows"))?;
        if p.size.bytes() % set_bytes != 0 {
            return Err(check.fail(
                "size",
                format!("must be a multiple of assoc * line_size ({} bytes)", set_bytes),
            ));
        }

        let mut params = BTreeMap::new();
        params.insert("size".into(), ParamValue::Size(p.size));
        params.insert("assoc".into(), ParamValue::Int(p.assoc));
        params.insert("line_size".into(), ParamValue::Int(p.line_size));
        params.insert("tag_latency".into(), ParamValue::Cycles(p.tag_latency));
        params.insert("data_latency".into(), ParamValue::Cycles(p.data_latency));
        params.insert("response_latency".into(), ParamValue::Cycles(p.response_latency));
        params.insert("mshrs".into(), ParamValue::Int(p.mshrs));
        params.insert("tgts_per_mshr".into(), ParamValue::Int(p.tgts_per_mshr));

        let ports = vec![
            PortDecl::new(ports::CPU_SIDE, PortDirection::CpuSide),
            PortDecl::new(ports::MEM_SIDE, PortDirection::MemSide),
        ];
        Ok(ComponentDescriptor::new(name, ComponentKind::CacheLevel, None, params, ports))
    }

    /// Builds a CPU. Interrupt controller ports are declared when the model
    /// supports interrupts.
    pub fn cpu(name: impl Into<String>, p: CpuParams) -> SimResult<ComponentDescriptor> {
        let name = name.into();
        let check = Check::new(&name);
        check.positive("num_threads", p.num_threads)?;
        if let Some(clock) = p.clock {
            check.positive("clock", clock.hz() as i64)?;
        }

        let mut params = BTreeMap::new();
        params.insert("model".into(), ParamValue::Text(p.model.name().to_string()));
        params.insert("num_threads".into(), ParamValue::Int(p.num_threads));
        if let Some(clock) = p.clock {
            params.insert("clock".into(), ParamValue::Frequency(clock));
        }
        if let Some(bp) = p.branch_predictor {
            params.insert("branch_predictor".into(), ParamValue::Text(format!("{:?}", bp)));
        }

        let mut ports = vec![
            PortDecl::new(ports::ICACHE_PORT, PortDirection::MemSide),
            PortDecl::new(ports::DCACHE_PORT, PortDirection::MemSide),
        ];
        if p.model.supports_interrupts() {
            ports.push(PortDecl::new(ports::INT_PIO, PortDirection::CpuSide).interrupt());
            ports.push(PortDecl::new(ports::INT_REQUESTOR, PortDirection::MemSide).interrupt());
        }
        Ok(ComponentDescriptor::new(name, ComponentKind::Cpu, Some(p.model), params, ports))
    }

    /// Builds a bus or crossbar with vector ports on both sides.
    pub fn interconnect(
        name: impl Into<String>,
        p: InterconnectParams,
    ) -> SimResult<ComponentDescriptor> {
        let name = name.into();
        let check = Check::new(&name);
        check.positive("width", p.width)?;
        check.non_negative("frontend_latency", p.frontend_latency)?;
        check.non_negative("forward_latency", p.forward_latency)?;
        check.non_negative("response_latency", p.response_latency)?;

        let mut params = BTreeMap::new();
        params.insert("width".into(), ParamValue::Int(p.width));
        params.insert("frontend_latency".into(), ParamValue::Cycles(p.frontend_latency));
        params.insert("forward_latency".into(), ParamValue::Cycles(p.forward_latency));
        params.insert("response_latency".into(), ParamValue::Cycles(p.response_latency));
        params.insert("snoop_filter".into(), ParamValue::Bool(p.snoop_filter));

        let ports = vec![
            PortDecl::new(ports::CPU_SIDE_PORTS, PortDirection::CpuSide).vector(),
            PortDecl::new(ports::MEM_SIDE_PORTS, PortDirection::MemSide).vector(),
        ];
        Ok(ComponentDescriptor::new(name, ComponentKind::Interconnect, None, params, ports))
    }

    /// Builds a memory controller for a non-empty physical range.
    pub fn memory_controller(
        name: impl Into<String>,
        p: MemCtrlParams,
    ) -> SimResult<ComponentDescriptor> {
        let name = name.into();
        let check = Check::new(&name);
        if p.range.is_empty() {
            return Err(check.fail("range", format!("{} is empty", p.range)));
        }

        let mut params = BTreeMap::new();
        params.insert("range".into(), ParamValue::Range(p.range));
        let mut ports = vec![PortDecl::new(ports::PORT, PortDirection::CpuSide)];
        match p.medium {
            MediumSpec::Integrated(medium) => {
                check_medium(&check, &medium)?;
                params.insert("medium".into(), ParamValue::Text(medium.device.clone()));
                insert_medium_params(&mut params, &medium);
            }
            MediumSpec::External => {
                params.insert("medium".into(), ParamValue::Text("external".into()));
                ports.push(PortDecl::new(ports::DRAM, PortDirection::MemSide));
            }
        }
        Ok(ComponentDescriptor::new(
            name,
            ComponentKind::MemoryController,
            None,
            params,
            ports,
        ))
    }

    /// Builds a standalone memory medium, linked behind a controller's
    /// `dram` port.
    pub fn memory_medium(
        name: impl Into<String>,
        p: MediumParams,
    ) -> SimResult<ComponentDescriptor> {
        let name = name.into();
        let check = Check::new(&name);
        check_medium(&check, &p)?;

        let mut params = BTreeMap::new();
        params.insert("device".into(), ParamValue::Text(p.device.clone()));
        insert_medium_params(&mut params, &p);
        let ports = vec![PortDecl::new(ports::PORT, PortDirection::CpuSide)];
        Ok(ComponentDescriptor::new(name, ComponentKind::MemoryMedium, None, params, ports))
    }

    /// Builds a descriptor of `kind` from string attributes applied over
    /// that kind's defaults.
    ///
    /// Unknown option names and unparsable values fail with
    /// `InvalidParameter`. Memory controllers require a `range` attribute.
    pub fn create(
        kind: ComponentKind,
        name: impl Into<String>,
        attrs: &HashMap<String, String>,
    ) -> SimResult<ComponentDescriptor> {
        let name = name.into();
        let check = Check::new(&name);
        // Sorted so the first reported error does not depend on hash order.
        let mut sorted: Vec<(&String, &String)> = attrs.iter().collect();
        sorted.sort();

        match kind {
            ComponentKind::CacheLevel => {
                let mut p = match attrs.get("preset").map(String::as_str) {
                    Some("l2") | Some("L2") => CacheParams::l2(),
                    _ => CacheParams::default(),
                };
                for (key, value) in sorted {
                    match key.as_str() {
                        "preset" => {}
                        "size" => p.size = check.parse(key, value)?,
                        "assoc" => p.assoc = check.parse(key, value)?,
                        "line_size" => p.line_size = check.parse(key, value)?,
                        "tag_latency" => p.tag_latency = check.parse(key, value)?,
                        "data_latency" => p.data_latency = check.parse(key, value)?,
                        "response_latency" => p.response_latency = check.parse(key, value)?,
                        "mshrs" => p.mshrs = check.parse(key, value)?,
                        "tgts_per_mshr" => p.tgts_per_mshr = check.parse(key, value)?,
                        _ => return Err(check.fail(key, "unknown option")),
                    }
                }
                Self::cache(name, p)
            }
            ComponentKind::Cpu => {
                let mut p = CpuParams::default();
                for (key, value) in sorted {
                    match key.as_str() {
                        "model" => p.model = check.parse(key, value)?,
                        "clock" => p.clock = Some(check.parse(key, value)?),
                        "branch_predictor" => {
                            p.branch_predictor = match value.as_str() {
                                "" | "none" | "None" => None,
                                other => Some(check.parse(key, other)?),
                            }
                        }
                        "num_threads" => p.num_threads = check.parse(key, value)?,
                        _ => return Err(check.fail(key, "unknown option")),
                    }
                }
                Self::cpu(name, p)
            }
            ComponentKind::Interconnect => {
                let mut p = InterconnectParams::default();
                for (key, value) in sorted {
                    match key.as_str() {
                        "width" => p.width = check.parse(key, value)?,
                        "frontend_latency" => p.frontend_latency = check.parse(key, value)?,
                        "forward_latency" => p.forward_latency = check.parse(key, value)?,
                        "response_latency" => p.response_latency = check.parse(key, value)?,
                        "snoop_filter" => p.snoop_filter = check.parse(key, value)?,
                        _ => return Err(check.fail(key, "unknown option")),
                    }
                }
                Self::interconnect(name, p)
            }
            ComponentKind::MemoryController => {
                let range = match attrs.get("range") {
                    Some(value) => parse_addr_range(value).map_err(|e| check.fail("range", e))?,
                    None => return Err(check.fail("range", "is required")),
                };
                let external = attrs.get("medium").is_some_and(|m| m == "external");
                let mut medium = match attrs.get("medium") {
                    Some(device) if !external => medium_preset(&check, device)?,
                    _ => MediumParams::default(),
                };
                for (key, value) in sorted {
                    match key.as_str() {
                        "range" | "medium" => {}
                        _ if external => {
                            return Err(check.fail(key, "not accepted with an external medium"))
                        }
                        _ => apply_medium_attr(&check, &mut medium, key, value)?,
                    }
                }
                let spec = if external {
                    MediumSpec::External
                } else {
                    MediumSpec::Integrated(medium)
                };
                Self::memory_controller(name, MemCtrlParams::new(range).with_medium(spec))
            }
            ComponentKind::MemoryMedium => {
                let mut medium = match attrs.get("device") {
                    Some(device) => medium_preset(&check, device)?,
                    None => MediumParams::default(),
                };
                for (key, value) in sorted {
                    if key != "device" {
                        apply_medium_attr(&check, &mut medium, key, value)?;
                    }
                }
                Self::memory_medium(name, medium)
            }
        }
    }
}

/// Ready-made descriptors for the common single-core system.
///
/// Each call returns a fresh descriptor, so a preset can be dropped into any
/// number of graphs.
pub mod presets {
    use super::*;

    /// 32 KB 2-way instruction cache.
    pub fn l1_icache(name: impl Into<String>) -> SimResult<ComponentDescriptor> {
        ComponentFactory::cache(name, CacheParams::default())
    }

    /// 32 KB 2-way data cache.
    pub fn l1_dcache(name: impl Into<String>) -> SimResult<ComponentDescriptor> {
        ComponentFactory::cache(name, CacheParams::default())
    }

    /// 256 KB 8-way unified cache.
    pub fn l2_cache(name: impl Into<String>) -> SimResult<ComponentDescriptor> {
        ComponentFactory::cache(name, CacheParams::l2())
    }

    /// Controller for `range` backed by DDR3-1600 x8x8.
    pub fn ddr3_1600_8x8(name: impl Into<String>, range: AddrRange) -> SimResult<ComponentDescriptor> {
        ComponentFactory::memory_controller(
            name,
            MemCtrlParams::new(range).with_medium(MediumSpec::Integrated(MediumParams::ddr3_1600_8x8())),
        )
    }

    /// Timing CPU with a tournament branch predictor.
    pub fn timing_cpu(name: impl Into<String>) -> SimResult<ComponentDescriptor> {
        ComponentFactory::cpu(name, CpuParams::default())
    }

    /// System crossbar.
    pub fn system_xbar(name: impl Into<String>) -> SimResult<ComponentDescriptor> {
        ComponentFactory::interconnect(name, InterconnectParams::default())
    }
}

/// Constraint checks bound to one component name.
struct Check<'a> {
    component: &'a str,
}

impl<'a> Check<'a> {
    fn new(component: &'a str) -> Self {
        Self { component }
    }

    fn fail(&self, option: &str, constraint: impl Into<String>) -> SimError {
        SimError::invalid_param(self.component, option, constraint)
    }

    fn positive(&self, option: &str, value: i64) -> SimResult<()> {
        if value > 0 {
            Ok(())
        } else {
            Err(self.fail(option, format!("must be > 0 (got {})", value)))
        }
    }

    fn non_negative(&self, option: &str, value: i64) -> SimResult<()> {
        if value >= 0 {
            Ok(())
        } else {
            Err(self.fail(option, format!("must be >= 0 (got {})", value)))
        }
    }

    fn parse<T: FromStr>(&self, option: &str, value: &str) -> SimResult<T> {
        value
            .trim()
            .parse()
            .map_err(|_| self.fail(option, format!("cannot parse `{}`", value)))
    }
}

fn check_medium(check: &Check<'_>, p: &MediumParams) -> SimResult<()> {
    check.positive("device_size", p.device_size.bytes() as i64)?;
    check.positive("ranks", p.ranks)?;
    check.positive("banks_per_rank", p.banks_per_rank)?;
    check.positive("burst_length", p.burst_length)?;
    check.non_negative("t_cl_ps", p.t_cl_ps)?;
    check.non_negative("t_rcd_ps", p.t_rcd_ps)?;
    check.non_negative("t_rp_ps", p.t_rp_ps)
}

fn insert_medium_params(params: &mut BTreeMap<String, ParamValue>, p: &MediumParams) {
    params.insert("device_size".into(), ParamValue::Size(p.device_size));
    params.insert("ranks".into(), ParamValue::Int(p.ranks));
    params.insert("banks_per_rank".into(), ParamValue::Int(p.banks_per_rank));
    params.insert("burst_length".into(), ParamValue::Int(p.burst_length));
    params.insert("t_cl_ps".into(), ParamValue::Int(p.t_cl_ps));
    params.insert("t_rcd_ps".into(), ParamValue::Int(p.t_rcd_ps));
    params.insert("t_rp_ps".into(), ParamValue::Int(p.t_rp_ps));
}

fn medium_preset(check: &Check<'_>, device: &str) -> SimResult<MediumParams> {
    match device {
        "DDR3_1600_8x8" => Ok(MediumParams::ddr3_1600_8x8()),
        "SimpleMemory" => Ok(MediumParams::simple(30_000)),
        other => Err(check.fail("device", format!("unknown memory device `{}`", other))),
    }
}

fn apply_medium_attr(
    check: &Check<'_>,
    medium: &mut MediumParams,
    key: &str,
    value: &str,
) -> SimResult<()> {
    match key {
        "device_size" => medium.device_size = check.parse(key, value)?,
        "ranks" => medium.ranks = check.parse(key, value)?,
        "banks_per_rank" => medium.banks_per_rank = check.parse(key, value)?,
        "burst_length" => medium.burst_length = check.parse(key, value)?,
        "t_cl_ps" => medium.t_cl_ps = check.parse(key, value)?,
        "t_rcd_ps" => medium.t_rcd_ps = check.parse(key, value)?,
        "t_rp_ps" => medium.t_rp_ps = check.parse(key, value)?,
        _ => return Err(check.fail(key, "unknown option")),
    }
    Ok(())
}
