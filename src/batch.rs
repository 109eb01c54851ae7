//! Running many independent sessions.
//!
//! Every job gets its own graph, controller and engine; nothing simulated is
//! shared between jobs. With the `parallel` feature jobs run on a rayon pool,
//! otherwise one after another. Results come back in job order either way.

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use thiserror::Error;

use crate::config::{ConfigError, SystemConfig};
use crate::controller::SimulationController;
use crate::engine::program::ProgramCatalog;
use crate::engine::{ReferenceEngine, SimEngine};
use crate::error::SimError;
use crate::stats::SimulationReport;

/// Why a batch job did not produce a report.
#[derive(Error, Debug)]
pub enum JobError {
    /// The session could not be assembled from its configuration.
    #[error("cannot build session: {0}")]
    Build(#[from] ConfigError),

    /// The session was built but failed while instantiating or running.
    /// A session that halted keeps its dumped statistics in `report`.
    #[error("session failed: {error}")]
    Session {
        error: SimError,
        report: Option<Box<SimulationReport>>,
    },
}

impl JobError {
    /// Returns the report dumped when the failed session halted.
    pub fn report(&self) -> Option<&SimulationReport> {
        match self {
            JobError::Build(_) => None,
            JobError::Session { report, .. } => report.as_deref(),
        }
    }
}

/// Result of one batch job.
pub type JobResult = Result<SimulationReport, JobError>;

fn session_failed<E: SimEngine>(session: &SimulationController<E>, error: SimError) -> JobError {
    JobError::Session {
        error,
        report: session.report().ok().map(Box::new),
    }
}

/// Runs configured sessions to completion.
pub struct BatchRunner<F> {
    make_engine: F,
    num_threads: usize,
}

impl<F, E> BatchRunner<F>
where
    F: Fn() -> E + Sync,
    E: SimEngine,
{
    /// Creates a runner that builds one engine per job with `make_engine`.
    pub fn new(make_engine: F) -> Self {
        Self {
            make_engine,
            num_threads: 0,
        }
    }

    /// Sets the number of worker threads (0 = rayon default).
    ///
    /// Ignored without the `parallel` feature.
    pub fn with_threads(mut self, num_threads: usize) -> Self {
        self.num_threads = num_threads;
        self
    }

    /// Returns the configured number of worker threads.
    pub fn num_threads(&self) -> usize {
        self.num_threads
    }

    /// Runs one session: build, bind, instantiate, optional warm-up, run.
    ///
    /// A session that halts on an error still hands back its statistics
    /// through [`JobError::report`].
    pub fn run_one(&self, config: &SystemConfig) -> JobResult {
        let mut session = config.session((self.make_engine)())?;
        if let Err(error) = session.instantiate() {
            return Err(session_failed(&session, error));
        }

        let warm_up = config.session.warm_up_ticks;
        if warm_up > 0 {
            match session.warm_up(warm_up) {
                Ok(None) => {}
                Ok(Some(exit)) => {
                    tracing::debug!(session = %config.session.name, %exit, "job ended during warm-up");
                    return session.report().map_err(|e| session_failed(&session, e));
                }
                Err(error) => return Err(session_failed(&session, error)),
            }
        }

        match session.run() {
            Ok(exit) => {
                tracing::debug!(session = %config.session.name, %exit, "job finished");
                session.report().map_err(|e| session_failed(&session, e))
            }
            Err(error) => Err(session_failed(&session, error)),
        }
    }

    /// Runs all jobs sequentially.
    #[cfg(not(feature = "parallel"))]
    pub fn run(&self, jobs: &[SystemConfig]) -> Vec<JobResult> {
        tracing::info!(jobs = jobs.len(), "running batch");
        jobs.iter().map(|job| self.run_one(job)).collect()
    }

    /// Runs all jobs on a rayon pool.
    #[cfg(feature = "parallel")]
    pub fn run(&self, jobs: &[SystemConfig]) -> Vec<JobResult> {
        tracing::info!(jobs = jobs.len(), threads = self.num_threads, "running batch");
        let run_all = || {
            jobs.par_iter()
                .map(|job| self.run_one(job))
                .collect::<Vec<_>>()
        };

        if self.num_threads == 0 {
            return run_all();
        }
        match rayon::ThreadPoolBuilder::new()
            .num_threads(self.num_threads)
            .build()
        {
            Ok(pool) => pool.install(run_all),
            Err(err) => {
                tracing::warn!("cannot build a {} thread pool: {}", self.num_threads, err);
                run_all()
            }
        }
    }
}

/// Runs every job on its own [`ReferenceEngine`], all reading `catalog`.
pub fn run_sessions(
    jobs: &[SystemConfig],
    catalog: &ProgramCatalog,
) -> Vec<JobResult> {
    BatchRunner::new(|| ReferenceEngine::with_catalog(catalog.clone())).run(jobs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SystemConfigBuilder;
    use crate::engine::program::{Op, Program};
    use crate::engine::{EngineError, EngineHandles, ExitEvent, InstantiationPlan};
    use crate::stats::StatsStore;
    use crate::types::Tick;
    use std::path::Path;

    fn catalog() -> ProgramCatalog {
        let catalog = ProgramCatalog::new();
        catalog.insert("bin/hello", Program::hello());
        catalog.insert(
            "bin/fail",
            Program::new(vec![Op::Compute(10), Op::Exit(2)]),
        );
        catalog
    }

    fn job(name: &str, path: &str) -> SystemConfig {
        SystemConfigBuilder::single_core()
            .name(name)
            .workload("cpu", path, &[])
            .build()
            .unwrap()
    }

    #[test]
    fn test_results_keep_job_order() {
        let jobs = vec![job("a", "bin/hello"), job("b", "bin/fail"), job("c", "bin/hello")];
        let results = run_sessions(&jobs, &catalog());

        assert_eq!(results.len(), 3);
        let reports: Vec<_> = results.into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(reports[0].name, "a");
        assert_eq!(reports[1].exit_code, 2);
        assert_eq!(reports[2].name, "c");
        // Sessions do not share state, so identical jobs agree.
        assert_eq!(reports[0].ticks, reports[2].ticks);
        assert_eq!(reports[0].stats, reports[2].stats);
    }

    #[test]
    fn test_failed_job_does_not_stop_batch() {
        let jobs = vec![job("bad", "bin/absent"), job("good", "bin/hello")];
        let results = run_sessions(&jobs, &catalog());

        assert!(matches!(
            results[0],
            Err(JobError::Build(ConfigError::Build(SimError::MissingExecutable { .. })))
        ));
        assert!(results[0].as_ref().unwrap_err().report().is_none());
        assert!(results[1].is_ok());
    }

    #[test]
    fn test_warm_up_then_run() {
        let mut config = job("warm", "bin/hello");
        config.session.warm_up_ticks = 10_000;
        let runner = BatchRunner::new(|| ReferenceEngine::with_catalog(catalog())).with_threads(2);
        assert_eq!(runner.num_threads(), 2);

        let report = runner.run_one(&config).unwrap();
        let cold = runner.run_one(&job("cold", "bin/hello")).unwrap();
        assert_eq!(report.ticks, cold.ticks);
        assert!(
            report.stats.metric("cpu", "committedInsts")
                < cold.stats.metric("cpu", "committedInsts")
        );
    }

    #[test]
    fn test_exit_during_warm_up_reports_early() {
        let mut config = job("short", "bin/fail");
        config.session.warm_up_ticks = 1_000_000_000;
        let runner = BatchRunner::new(|| ReferenceEngine::with_catalog(catalog()));

        let report = runner.run_one(&config).unwrap();
        assert_eq!(report.exit_code, 2);
        assert_eq!(report.cause, "exited with code 2");
        // Warm-up counters are never reset when the workload ends early.
        assert_eq!(report.stats.metric("cpu", "committedInsts"), Some(11.0));
    }

    /// Engine that builds fine and fails as soon as it is asked to simulate.
    struct BrokenEngine;

    impl SimEngine for BrokenEngine {
        fn resolve_executable(&self, _: &Path) -> Result<(), EngineError> {
            Ok(())
        }

        fn instantiate(&mut self, _: &InstantiationPlan) -> Result<EngineHandles, EngineError> {
            Ok(EngineHandles::new())
        }

        fn simulate(&mut self, _: Option<Tick>) -> Result<ExitEvent, EngineError> {
            Err(EngineError::Runtime("boom".into()))
        }

        fn reset_stats(&mut self) {}

        fn dump_stats(&self) -> StatsStore {
            let mut stats = StatsStore::new();
            stats.set("cpu", "numCycles", 7.0);
            stats
        }

        fn cur_tick(&self) -> Tick {
            7000
        }
    }

    #[test]
    fn test_engine_failure_keeps_partial_report() {
        let runner = BatchRunner::new(|| BrokenEngine);
        let mut warm = job("warm", "bin/hello");
        warm.session.warm_up_ticks = 500;
        let results = runner.run(&[job("cold", "bin/hello"), warm]);

        for result in &results {
            let err = result.as_ref().unwrap_err();
            match err {
                JobError::Session { error, .. } => {
                    assert_eq!(*error, SimError::Engine("simulation failed: boom".into()))
                }
                other => panic!("unexpected error: {:?}", other),
            }
            let report = err.report().expect("halted session keeps its dump");
            assert_eq!(report.ticks, 7000);
            assert!(report.cause.starts_with("engine error: "));
            assert_eq!(report.stats.metric("cpu", "numCycles"), Some(7.0));
        }
    }
}
