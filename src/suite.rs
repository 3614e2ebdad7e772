//! Golden-output test runner.
//!
//! Every `.bf` file in a directory (and every `.bfc` file, compiled first) is
//! run on a fresh machine and its output compared against the sibling
//! `<stem>.out` file. Cases run in parallel, each on its own machine.

use std::fs;
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use tracing::{info, warn};

use crate::concat;
use crate::engine::{evaluate, status_of};
use crate::error::{HostError, STATUS_OK};
use crate::machine::{Bfpp, EngineConfig};
use crate::sink::LineSink;

/// Configuration for a suite run.
#[derive(Clone, Copy, Debug)]
pub struct SuiteConfig {
    /// Write the expectation file for cases that do not have one.
    pub bless: bool,
    /// Per-case instruction budget.
    pub step_limit: Option<u64>,
}

impl Default for SuiteConfig {
    fn default() -> Self {
        Self {
            bless: false,
            step_limit: Some(1 << 26),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    Passed,
    Failed { expected: String, actual: String },
    /// No expectation existed; one was written from this run.
    Blessed,
    /// No expectation exists and blessing is off.
    Missing,
    /// The program could not be loaded, or exited with a nonzero status.
    Errored(String),
}

#[derive(Clone, Debug)]
pub struct CaseReport {
    pub path: PathBuf,
    pub status: i32,
    pub outcome: Outcome,
}

impl CaseReport {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, Outcome::Passed | Outcome::Blessed)
    }
}

/// Program files in `dir`, sorted by name.
pub fn discover(dir: &Path) -> Result<Vec<PathBuf>, HostError> {
    let read_err = |source| HostError::Read {
        path: dir.to_owned(),
        source,
    };
    let mut cases = Vec::new();
    for entry in fs::read_dir(dir).map_err(read_err)? {
        let path = entry.map_err(read_err)?.path();
        let is_program = path
            .extension()
            .is_some_and(|ext| ext == "bf" || ext == "bfc");
        if is_program && path.is_file() {
            cases.push(path);
        }
    }
    cases.sort();
    Ok(cases)
}

/// Load a case's program, compiling `.bfc` sources.
fn load(path: &Path) -> Result<Vec<u8>, HostError> {
    let bytes = fs::read(path).map_err(|source| HostError::Read {
        path: path.to_owned(),
        source,
    })?;
    if path.extension().is_some_and(|ext| ext == "bfc") {
        let source = String::from_utf8_lossy(&bytes);
        let program = concat::compile(&source, false).map_err(|source| HostError::Compile {
            path: path.to_owned(),
            source,
        })?;
        return Ok(program.into_bytes());
    }
    Ok(bytes)
}

pub fn run_case(path: &Path, config: &SuiteConfig) -> CaseReport {
    let report = |status, outcome| CaseReport {
        path: path.to_owned(),
        status,
        outcome,
    };

    let program = match load(path) {
        Ok(program) => program,
        Err(e) => return report(e.status(), Outcome::Errored(e.to_string())),
    };

    let mut machine = Bfpp::with_config(EngineConfig {
        step_limit: config.step_limit,
        ..Default::default()
    });
    let mut sink = LineSink::new(Vec::new());
    let status = status_of(&evaluate(&mut machine, &program, &mut sink));
    let actual = match sink.finish() {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(e) => return report(status, Outcome::Errored(e.to_string())),
    };
    if status != STATUS_OK {
        return report(status, Outcome::Errored(actual));
    }

    let expected_path = path.with_extension("out");
    let outcome = match fs::read_to_string(&expected_path) {
        Ok(expected) if expected == actual => Outcome::Passed,
        Ok(expected) => Outcome::Failed { expected, actual },
        Err(_) if config.bless => match fs::write(&expected_path, &actual) {
            Ok(()) => Outcome::Blessed,
            Err(e) => Outcome::Errored(format!(
                "failed to write {}: {e}",
                expected_path.display()
            )),
        },
        Err(_) => Outcome::Missing,
    };
    report(status, outcome)
}

/// Run every case in `dir`.
pub fn run_suite(dir: &Path, config: &SuiteConfig) -> Result<Vec<CaseReport>, HostError> {
    let cases = discover(dir)?;
    info!(cases = cases.len(), dir = %dir.display(), "running suite");

    let reports: Vec<CaseReport> = cases.par_iter().map(|path| run_case(path, config)).collect();

    for r in reports.iter().filter(|r| !r.is_success()) {
        warn!(path = %r.path.display(), status = r.status, "case did not pass: {:?}", r.outcome);
    }
    Ok(reports)
}
