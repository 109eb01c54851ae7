//! Statistics store and end-of-run report.
//!
//! The engine reports counters as a flat map keyed `component.metric`. The
//! controller snapshots that map when a session halts and wraps it in a
//! [`SimulationReport`] together with the exit tick and cause.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;
use std::path::Path;

use crate::types::{Tick, TICKS_PER_SECOND};

/// Flat statistics keyed `componentName.metricName`.
///
/// Keys are kept sorted so that exports are stable between runs.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatsStore {
    values: BTreeMap<String, f64>,
}

impl StatsStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `component.metric` to `value`.
    pub fn set(&mut self, component: &str, metric: &str, value: f64) {
        self.values.insert(format!("{}.{}", component, metric), value);
    }

    /// Adds `delta` to `component.metric`, creating it at zero first.
    pub fn add(&mut self, component: &str, metric: &str, delta: f64) {
        *self
            .values
            .entry(format!("{}.{}", component, metric))
            .or_insert(0.0) += delta;
    }

    /// Returns a value by full key.
    pub fn get(&self, key: &str) -> Option<f64> {
        self.values.get(key).copied()
    }

    /// Returns `component.metric`.
    pub fn metric(&self, component: &str, metric: &str) -> Option<f64> {
        self.get(&format!("{}.{}", component, metric))
    }

    /// Returns the metrics of one component, without the component prefix.
    pub fn component<'a>(&'a self, component: &'a str) -> impl Iterator<Item = (&'a str, f64)> {
        self.values.iter().filter_map(move |(key, value)| {
            key.strip_prefix(component)
                .and_then(|rest| rest.strip_prefix('.'))
                .map(|metric| (metric, *value))
        })
    }

    /// Returns the names of all components that reported a metric.
    pub fn components(&self) -> BTreeSet<&str> {
        self.values
            .keys()
            .filter_map(|k| k.split_once('.').map(|(c, _)| c))
            .collect()
    }

    /// Returns true if the component reported at least one metric.
    pub fn has_component(&self, component: &str) -> bool {
        self.component(component).next().is_some()
    }

    /// Zeroes every value while keeping the keys.
    pub fn reset(&mut self) {
        for value in self.values.values_mut() {
            *value = 0.0;
        }
    }

    /// Iterates over `(key, value)` in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.values.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Returns the number of metrics.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Exports to pretty JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Exports to YAML.
    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }

    /// Exports to CSV with a `metric,value` header.
    pub fn to_csv(&self) -> String {
        let mut csv = String::from("metric,value\n");
        for (key, value) in &self.values {
            csv.push_str(&format!("{},{}\n", key, value));
        }
        csv
    }
}

/// Final report of a halted session.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SimulationReport {
    /// Session name
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    /// Tick at which the session halted
    pub ticks: Tick,
    /// Human-readable exit cause
    pub cause: String,
    /// Workload exit code
    pub exit_code: i32,
    /// Statistics dumped at halt
    pub stats: StatsStore,
    /// Wall-clock time spent in `run()`, in milliseconds
    #[serde(default)]
    pub wall_time_ms: f64,
}

impl SimulationReport {
    /// Returns the simulated time in seconds.
    pub fn sim_seconds(&self) -> f64 {
        self.ticks as f64 / TICKS_PER_SECOND as f64
    }

    /// Exports to pretty JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Exports to a JSON file.
    pub fn to_json_file<P: AsRef<Path>>(&self, path: P) -> std::io::Result<()> {
        let json = self
            .to_json()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, json)
    }

    /// Exports to YAML.
    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }

    /// Exports to CSV: the exit fields followed by every statistic.
    pub fn to_csv(&self) -> String {
        let mut csv = String::from("metric,value\n");
        csv.push_str(&format!("sim_ticks,{}\n", self.ticks));
        csv.push_str(&format!("exit_code,{}\n", self.exit_code));
        for (key, value) in self.stats.iter() {
            csv.push_str(&format!("{},{}\n", key, value));
        }
        csv
    }

    /// Exports to a CSV file.
    pub fn to_csv_file<P: AsRef<Path>>(&self, path: P) -> std::io::Result<()> {
        std::fs::write(path, self.to_csv())
    }

    /// Writes a human-readable summary to a writer.
    pub fn write_summary<W: Write>(&self, mut w: W) -> std::io::Result<()> {
        writeln!(w, "=== Simulation Report ===")?;
        if !self.name.is_empty() {
            writeln!(w, "Name: {}", self.name)?;
        }
        writeln!(w, "Exiting @ tick {} because {}", self.ticks, self.cause)?;
        writeln!(w, "Exit code: {}", self.exit_code)?;
        writeln!(w, "Simulated time: {:.9} s", self.sim_seconds())?;
        writeln!(w, "Wall time: {:.2} ms", self.wall_time_ms)?;
        writeln!(w)?;

        for component in self.stats.components() {
            writeln!(w, "--- {} ---", component)?;
            for (metric, value) in self.stats.component(component) {
                writeln!(w, "  {:<20} {}", metric, value)?;
            }
        }
        Ok(())
    }

    /// Returns the summary as a string.
    pub fn summary(&self) -> String {
        let mut buf = Vec::new();
        // Writing into a Vec cannot fail.
        let _ = self.write_summary(&mut buf);
        String::from_utf8_lossy(&buf).into_owned()
    }
}

/// A simple timer for measuring wall-clock time.
#[derive(Debug)]
pub struct Timer {
    start: std::time::Instant,
}

impl Timer {
    /// Starts a new timer.
    pub fn start() -> Self {
        Self {
            start: std::time::Instant::now(),
        }
    }

    /// Returns elapsed time in milliseconds.
    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::start()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> StatsStore {
        let mut stats = StatsStore::new();
        stats.set("cpu", "numCycles", 1200.0);
        stats.set("cpu", "committedInsts", 40.0);
        stats.add("icache", "hits", 3.0);
        stats.add("icache", "hits", 2.0);
        stats.set("mem_ctrl", "readReqs", 7.0);
        stats
    }

    #[test]
    fn test_store_keys() {
        let stats = sample();
        assert_eq!(stats.get("cpu.numCycles"), Some(1200.0));
        assert_eq!(stats.metric("icache", "hits"), Some(5.0));
        assert_eq!(stats.len(), 4);

        let comps: Vec<&str> = stats.components().into_iter().collect();
        assert_eq!(comps, vec!["cpu", "icache", "mem_ctrl"]);
        assert!(stats.has_component("mem_ctrl"));
        assert!(!stats.has_component("mem"));
    }

    #[test]
    fn test_reset_keeps_keys() {
        let mut stats = sample();
        stats.reset();
        assert_eq!(stats.len(), 4);
        assert!(stats.iter().all(|(_, v)| v == 0.0));
    }

    #[test]
    fn test_store_exports() {
        let stats = sample();
        let csv = stats.to_csv();
        assert!(csv.starts_with("metric,value\n"));
        assert!(csv.contains("cpu.numCycles,1200"));

        let json = stats.to_json().unwrap();
        let parsed: StatsStore = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, stats);

        let yaml = stats.to_yaml().unwrap();
        assert!(yaml.contains("icache.hits"));
    }

    #[test]
    fn test_report_summary() {
        let report = SimulationReport {
            name: "hello".into(),
            ticks: 454_646_000,
            cause: "exited normally".into(),
            exit_code: 0,
            stats: sample(),
            wall_time_ms: 1.5,
        };

        let summary = report.summary();
        assert!(summary.contains("Exiting @ tick 454646000 because exited normally"));
        assert!(summary.contains("--- icache ---"));

        let csv = report.to_csv();
        assert!(csv.contains("sim_ticks,454646000"));
        assert!((report.sim_seconds() - 0.000454646).abs() < 1e-12);
    }

    #[test]
    fn test_timer() {
        let timer = Timer::start();
        std::thread::sleep(std::time::Duration::from_millis(5));
        assert!(timer.elapsed_ms() >= 5.0);
    }
}
