//! Conformance harness: compile Ruby cases with an external `mrbc`, take the
//! external `mruby` output as the expectation and compare it with ours.

use std::collections::VecDeque;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;

use log::{debug, info};
use parking_lot::Mutex;

use crate::capture::{run_and_capture, Captured};
use crate::config::VmConfig;

/// Locations of the reference compiler and interpreter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toolchain {
    pub mrbc: PathBuf,
    pub mruby: PathBuf,
}

impl Default for Toolchain {
    fn default() -> Self {
        Self {
            mrbc: PathBuf::from("mrbc"),
            mruby: PathBuf::from("mruby"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CheckOptions {
    pub dir: PathBuf,
    /// Only cases whose file name contains this.
    pub filter: Option<String>,
    pub toolchain: Toolchain,
    pub jobs: usize,
    pub config: VmConfig,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Pass,
    Mismatch { expected: String, given: String },
    /// Compilation, loading or execution failed.
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaseReport {
    pub name: String,
    /// Anything the case wrote to its error sink.
    pub stderr: String,
    pub outcome: Outcome,
}

impl CaseReport {
    pub fn passed(&self) -> bool {
        self.outcome == Outcome::Pass
    }
}

impl fmt::Display for CaseReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.stderr.is_empty() {
            writeln!(f, "[{}] stderr: {}", self.name, self.stderr.trim_end())?;
        }
        match &self.outcome {
            Outcome::Pass => write!(f, "[{}] ok", self.name),
            Outcome::Mismatch { expected, given } => write!(
                f,
                "[{}] given_out: {given:?}, expected: {expected:?}",
                self.name
            ),
            Outcome::Failed(reason) => write!(f, "[{}] {reason}", self.name),
        }
    }
}

/// The `*.rb` files in `dir`, sorted by name.
pub fn discover(dir: &Path, filter: Option<&str>) -> io::Result<Vec<PathBuf>> {
    let mut cases = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().is_none_or(|ext| ext != "rb") {
            continue;
        }
        let name = path.file_name().map(|n| n.to_string_lossy().into_owned());
        if let (Some(filter), Some(name)) = (filter, &name) {
            if !name.contains(filter) {
                continue;
            }
        }
        cases.push(path);
    }
    cases.sort();
    Ok(cases)
}

/// Judge a captured run against the reference output.
pub fn compare(expected: &str, captured: Captured) -> Outcome {
    match captured.result {
        Err(err) => Outcome::Failed(format!(
            "{err} (after output {:?})",
            captured.stdout
        )),
        Ok(()) if captured.stdout == expected => Outcome::Pass,
        Ok(()) => Outcome::Mismatch {
            expected: expected.to_string(),
            given: captured.stdout,
        },
    }
}

fn run_tool(command: &mut Command) -> Result<String, String> {
    debug!("running {command:?}");
    let output = command
        .output()
        .map_err(|err| format!("cannot run {command:?}: {err}"))?;
    if !output.status.success() {
        return Err(format!(
            "{command:?} exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim_end()
        ));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Compile, run both ways and compare one case.
pub fn run_case(rb_path: &Path, toolchain: &Toolchain, config: &VmConfig) -> CaseReport {
    let mrb_path = rb_path.with_extension("mrb");
    let name = mrb_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let failed = |reason: String| CaseReport {
        name: name.clone(),
        stderr: String::new(),
        outcome: Outcome::Failed(reason),
    };

    if let Err(reason) = run_tool(
        Command::new(&toolchain.mrbc)
            .arg("-o")
            .arg(&mrb_path)
            .arg(rb_path),
    ) {
        return failed(reason);
    }
    let expected =
        match run_tool(Command::new(&toolchain.mruby).arg("-b").arg(&mrb_path)) {
            Ok(expected) => expected,
            Err(reason) => return failed(reason),
        };
    let bytes = match fs::read(&mrb_path) {
        Ok(bytes) => bytes,
        Err(err) => return failed(format!("cannot read {}: {err}", mrb_path.display())),
    };
    let image = match bytecode::load(&bytes) {
        Ok(image) => image,
        Err(err) => return failed(format!("load failed: {err}")),
    };

    let captured = run_and_capture(&image, config);
    let stderr = captured.stderr.clone();
    CaseReport {
        name,
        stderr,
        outcome: compare(&expected, captured),
    }
}

/// Run every case in `opts.dir` on `opts.jobs` worker threads.
///
/// Reports come back in case-name order regardless of completion order.
pub fn check(opts: &CheckOptions) -> io::Result<Vec<CaseReport>> {
    let cases = discover(&opts.dir, opts.filter.as_deref())?;
    info!("{} conformance cases in {}", cases.len(), opts.dir.display());

    let queue = Mutex::new(VecDeque::from(cases));
    let reports = Mutex::new(Vec::new());
    let jobs = opts.jobs.max(1);

    std::thread::scope(|s| {
        for _ in 0..jobs {
            s.spawn(|| {
                loop {
                    let next = queue.lock().pop_front();
                    let Some(case) = next else { break };
                    let report = run_case(&case, &opts.toolchain, &opts.config);
                    debug!("{report}");
                    reports.lock().push(report);
                }
            });
        }
    });

    let mut reports = reports.into_inner();
    reports.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(reports)
}
