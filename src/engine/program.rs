//! Workload programs understood by the reference engine.
//!
//! A program is a straight-line list of operations. It is written in YAML or
//! JSON:
//!
//! ```yaml
//! ops:
//!   - compute: 100
//!   - store: 65536
//!   - load: 65536
//!   - exit: 0
//! ```
//!
//! Programs are found through a [`ProgramCatalog`], which holds in-memory
//! entries and falls back to reading the path from disk.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::EngineError;

/// Default base address of the instruction stream.
pub const DEFAULT_TEXT_BASE: u64 = 0x40_0000;

/// Bytes per instruction.
pub const INST_BYTES: u64 = 4;

/// One program operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Op {
    /// `n` ALU instructions
    Compute(u64),
    /// Read one word at an address
    Load(u64),
    /// Write one word at an address
    Store(u64),
    /// Terminate with a status code
    Exit(i32),
}

/// A workload program.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Program {
    /// Address of the first instruction
    #[serde(default = "default_text_base")]
    pub text_base: u64,
    /// Operations in program order
    pub ops: Vec<Op>,
}

fn default_text_base() -> u64 {
    DEFAULT_TEXT_BASE
}

impl Program {
    /// Creates a program at the default text base.
    pub fn new(ops: Vec<Op>) -> Self {
        Self {
            text_base: DEFAULT_TEXT_BASE,
            ops,
        }
    }

    /// A short program that touches memory once and exits normally.
    pub fn hello() -> Self {
        Self::new(vec![
            Op::Compute(64),
            Op::Store(0x10_0000),
            Op::Load(0x10_0000),
            Op::Compute(16),
        ])
    }

    /// Moves the instruction stream.
    pub fn with_text_base(mut self, base: u64) -> Self {
        self.text_base = base;
        self
    }

    /// Returns the number of dynamic instructions, counting up to and
    /// including the first `exit`.
    pub fn instruction_count(&self) -> u64 {
        let mut count = 0;
        for op in &self.ops {
            match op {
                Op::Compute(n) => count += n,
                Op::Load(_) | Op::Store(_) => count += 1,
                Op::Exit(_) => return count + 1,
            }
        }
        count
    }

    /// Parses a YAML program.
    pub fn from_yaml(yaml: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }

    /// Parses a JSON program.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Loads a program file; the format follows the extension and defaults
    /// to YAML.
    pub fn from_file(path: &Path) -> Result<Self, EngineError> {
        let load_err = |reason: String| EngineError::Load {
            path: path.to_path_buf(),
            reason,
        };
        let content = std::fs::read_to_string(path).map_err(|e| load_err(e.to_string()))?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json(&content).map_err(|e| load_err(e.to_string())),
            _ => Self::from_yaml(&content).map_err(|e| load_err(e.to_string())),
        }
    }
}

/// Shared table of known programs.
///
/// Cloning shares the table. Sessions running side by side only read it.
#[derive(Clone, Debug, Default)]
pub struct ProgramCatalog {
    programs: Arc<RwLock<HashMap<PathBuf, Program>>>,
}

impl ProgramCatalog {
    /// Creates an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a program under `path`, replacing any earlier entry.
    pub fn insert(&self, path: impl Into<PathBuf>, program: Program) {
        self.programs.write().insert(path.into(), program);
    }

    /// Returns true if `path` is registered in memory.
    pub fn contains(&self, path: &Path) -> bool {
        self.programs.read().contains_key(path)
    }

    /// Returns the number of in-memory entries.
    pub fn len(&self) -> usize {
        self.programs.read().len()
    }

    /// Returns true if there are no in-memory entries.
    pub fn is_empty(&self) -> bool {
        self.programs.read().is_empty()
    }

    /// Finds the program for `path`, reading it from disk if it is not
    /// registered.
    pub fn resolve(&self, path: &Path) -> Result<Program, EngineError> {
        if let Some(program) = self.programs.read().get(path) {
            return Ok(program.clone());
        }
        if !path.is_file() {
            return Err(EngineError::Load {
                path: path.to_path_buf(),
                reason: "no such program".to_string(),
            });
        }
        Program::from_file(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_yaml_program() {
        let program = Program::from_yaml(
            "ops:\n  - compute: 10\n  - load: 4096\n  - store: 4096\n  - exit: 3\n",
        )
        .unwrap();
        assert_eq!(program.text_base, DEFAULT_TEXT_BASE);
        assert_eq!(
            program.ops,
            vec![Op::Compute(10), Op::Load(4096), Op::Store(4096), Op::Exit(3)]
        );
        assert_eq!(program.instruction_count(), 13);
    }

    #[test]
    fn test_parse_json_program() {
        let program =
            Program::from_json(r#"{"text_base": 8192, "ops": [{"compute": 2}, {"exit": 0}]}"#)
                .unwrap();
        assert_eq!(program.text_base, 8192);
        assert_eq!(program.instruction_count(), 3);
    }

    #[test]
    fn test_instruction_count_stops_at_exit() {
        let program = Program::new(vec![Op::Compute(5), Op::Exit(0), Op::Compute(100)]);
        assert_eq!(program.instruction_count(), 6);
    }

    #[test]
    fn test_catalog_is_shared() {
        let catalog = ProgramCatalog::new();
        let view = catalog.clone();
        catalog.insert("bin/hello", Program::hello());

        assert!(view.contains(Path::new("bin/hello")));
        assert_eq!(view.resolve(Path::new("bin/hello")).unwrap(), Program::hello());
        assert!(matches!(
            view.resolve(Path::new("bin/absent")),
            Err(EngineError::Load { .. })
        ));
    }

    #[test]
    fn test_catalog_reads_from_disk() {
        let path = std::env::temp_dir().join(format!("hwtopo_prog_{}.yaml", std::process::id()));
        std::fs::write(&path, "ops:\n  - compute: 1\n").unwrap();

        let catalog = ProgramCatalog::new();
        let program = catalog.resolve(&path).unwrap();
        assert_eq!(program.ops, vec![Op::Compute(1)]);

        std::fs::remove_file(&path).ok();
    }
}
