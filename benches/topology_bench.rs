//! Performance benchmarks for hwtopo.
//!
//! Run with: `cargo bench`
//! Or for specific bench: `cargo bench --bench topology_bench`

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use hwtopo::config::SystemConfigBuilder;
use hwtopo::engine::program::{Op, Program, ProgramCatalog};
use hwtopo::{
    presets, run_sessions, AddrRange, ReferenceEngine, SimulationController, SystemConfig,
    TopologyGraph,
};

const MB: u64 = 1024 * 1024;

// ============================================================================
// Helpers
// ============================================================================

/// `num_cpus` cores with private L1s on one crossbar and one controller.
fn multi_core(num_cpus: usize) -> TopologyGraph {
    let mut g = TopologyGraph::new();
    g.add_component(presets::system_xbar("membus").unwrap()).unwrap();
    g.add_component(presets::ddr3_1600_8x8("mem_ctrl", AddrRange::with_size(512 * MB)).unwrap())
        .unwrap();
    g.connect("membus.mem_side_ports", "mem_ctrl.port").unwrap();

    for i in 0..num_cpus {
        let cpu = format!("cpu{}", i);
        let icache = format!("icache{}", i);
        let dcache = format!("dcache{}", i);
        g.add_component(presets::timing_cpu(cpu.as_str()).unwrap()).unwrap();
        g.add_component(presets::l1_icache(icache.as_str()).unwrap()).unwrap();
        g.add_component(presets::l1_dcache(dcache.as_str()).unwrap()).unwrap();

        g.connect((cpu.as_str(), "icache_port"), (icache.as_str(), "cpu_side"))
            .unwrap();
        g.connect((cpu.as_str(), "dcache_port"), (dcache.as_str(), "cpu_side"))
            .unwrap();
        g.connect((icache.as_str(), "mem_side"), ("membus", "cpu_side_ports"))
            .unwrap();
        g.connect((dcache.as_str(), "mem_side"), ("membus", "cpu_side_ports"))
            .unwrap();
        g.connect((cpu.as_str(), "interrupts.pio"), ("membus", "mem_side_ports"))
            .unwrap();
        g.connect((cpu.as_str(), "interrupts.int_requestor"), ("membus", "cpu_side_ports"))
            .unwrap();
    }
    g
}

/// A loop-free program touching `lines` distinct cache lines twice.
fn streaming_program(lines: u64) -> Program {
    let mut ops = Vec::new();
    for pass in 0..2 {
        for line in 0..lines {
            let addr = 0x10_0000 + line * 64;
            ops.push(if pass == 0 { Op::Store(addr) } else { Op::Load(addr) });
            ops.push(Op::Compute(4));
        }
    }
    ops.push(Op::Exit(0));
    Program::new(ops)
}

// ============================================================================
// Topology Benchmarks
// ============================================================================

fn bench_build_and_validate(c: &mut Criterion) {
    let mut group = c.benchmark_group("topology_validate");

    for num_cpus in [1, 8, 64].iter() {
        group.throughput(Throughput::Elements(*num_cpus as u64));
        group.bench_with_input(
            BenchmarkId::new("cpus", num_cpus),
            num_cpus,
            |b, &num_cpus| {
                b.iter(|| {
                    let g = multi_core(num_cpus);
                    black_box(g.validate().unwrap());
                });
            },
        );
    }

    group.finish();
}

// ============================================================================
// Engine Benchmarks
// ============================================================================

fn bench_reference_engine(c: &mut Criterion) {
    let mut group = c.benchmark_group("reference_engine");

    for lines in [64u64, 1024, 4096].iter() {
        let program = streaming_program(*lines);
        group.throughput(Throughput::Elements(program.instruction_count()));
        group.bench_with_input(BenchmarkId::new("lines", lines), &program, |b, program| {
            b.iter(|| {
                let catalog = ProgramCatalog::new();
                catalog.insert("bench", program.clone());
                let mut session =
                    SimulationController::new(multi_core(1), ReferenceEngine::with_catalog(catalog));
                session.bind("cpu0", "bench", vec![]).unwrap();
                session.instantiate().unwrap();
                black_box(session.run().unwrap());
            });
        });
    }

    group.finish();
}

// ============================================================================
// Batch Benchmarks
// ============================================================================

fn bench_batch_sessions(c: &mut Criterion) {
    let mut group = c.benchmark_group("batch");

    let catalog = ProgramCatalog::new();
    catalog.insert("bench", streaming_program(512));

    for jobs in [1usize, 4, 16].iter() {
        let configs: Vec<SystemConfig> = (0..*jobs)
            .map(|i| {
                SystemConfigBuilder::single_core()
                    .name(format!("job{}", i))
                    .workload("cpu", "bench", &[])
                    .build()
                    .unwrap()
            })
            .collect();

        group.throughput(Throughput::Elements(*jobs as u64));
        group.bench_with_input(BenchmarkId::new("jobs", jobs), &configs, |b, configs| {
            b.iter(|| black_box(run_sessions(configs, &catalog)));
        });
    }

    group.finish();
}

// ============================================================================
// Criterion Groups
// ============================================================================

criterion_group!(
    benches,
    bench_build_and_validate,
    bench_reference_engine,
    bench_batch_sessions,
);

criterion_main!(benches);
