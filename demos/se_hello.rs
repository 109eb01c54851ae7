//! Single-Core Hello World Example
//!
//! This example builds the classic syscall-emulation system:
//! - A timing CPU at 1GHz with split 32 KB L1 caches
//! - A system crossbar with the interrupt controller wired through it
//! - One DDR3-1600 controller covering `[0, 512MB)`
//!
//! It then runs a short workload to completion and prints the exit event and
//! the statistics dump.
//!
//! Run with: `cargo run --example se_hello [program.yaml]`

use hwtopo::config::SystemConfigBuilder;
use hwtopo::engine::program::{Program, ProgramCatalog};
use hwtopo::{LifecycleState, ReferenceEngine};

// ============================================================================
// Configuration
// ============================================================================

const BUILTIN_PROGRAM: &str = "tests/test-progs/hello/bin/x86/linux/hello";
const MAX_TICKS: u64 = 1_000_000_000;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // A program file on the command line replaces the built-in workload.
    let program = std::env::args()
        .nth(1)
        .unwrap_or_else(|| BUILTIN_PROGRAM.to_string());

    let catalog = ProgramCatalog::new();
    catalog.insert(BUILTIN_PROGRAM, Program::hello());

    let config = SystemConfigBuilder::single_core()
        .name("se_hello")
        .max_ticks(MAX_TICKS)
        .workload("cpu", program.as_str(), &[])
        .build()?;
    hwtopo::init_logging(&config.session.log_level);

    println!("=== Single-Core SE System ===");
    println!("Components: {}", config.components.len());
    println!("Links:      {}", config.links.len());
    println!();

    let mut session = config.session(ReferenceEngine::with_catalog(catalog))?;
    let handles = session.instantiate()?;
    println!("Instantiated {} components", handles.len());

    println!("Beginning simulation!");
    let exit = session.run()?;
    println!("{}", exit);
    debug_assert_eq!(session.state(), LifecycleState::Halted);
    println!();

    let report = session.report()?;
    println!("=== Statistics ===");
    print!("{}", report.stats.to_csv());
    println!();
    println!(
        "Simulated {:.6} s in {:.3} ms of wall time",
        report.sim_seconds(),
        report.wall_time_ms
    );

    Ok(())
}
