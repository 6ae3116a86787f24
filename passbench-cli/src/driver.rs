//! Two-Stage Compile Driver
//!
//! Orchestrates one benchmark configuration through the compiler:
//!
//! ```text
//! (input, pipeline)
//!        │
//!        ▼
//! ┌─────────────┐   stage-1 diagnostics
//! │  mlir-opt   │ ─────────────────────► script block + stage-1 time
//! └─────────────┘
//!        │ inject script (side file or inline splice)
//!        ▼
//! ┌───────────────────┐   stage-2 diagnostics
//! │ mlir-transform-opt│ ─────────────────────► stage-2 time
//! └───────────────────┘
//! ```
//!
//! All intermediate artifacts live in a per-run temp directory so repeated
//! or future-parallel runs can never race on shared fixed-name files.

use passbench_core::{Invocation, ProcessOutput, RunnerError, run};
use passbench_script::{ExtractError, extract_script_block, extract_timing};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;
use thiserror::Error;
use tracing::debug;

/// The TOSA lowering pipeline used when no pipeline arguments are given.
pub const DEFAULT_PIPELINE: &str = "--pass-pipeline=builtin.module(func.func(tosa-optional-decompositions), canonicalize, func.func(tosa-infer-shapes, tosa-make-broadcastable, tosa-to-linalg-named), canonicalize, func.func(tosa-layerwise-constant-fold, tosa-make-broadcastable), tosa-validate, func.func(tosa-to-linalg, tosa-to-arith, tosa-to-tensor), linalg-fuse-elementwise-ops, one-shot-bufferize)";

/// The two compiler stages, for error reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Stage 1: pass pipeline (`mlir-opt`).
    Pipeline,
    /// Stage 2: transform-script application (`mlir-transform-opt`).
    Transform,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Pipeline => write!(f, "pipeline"),
            Stage::Transform => write!(f, "transform"),
        }
    }
}

/// Driver failures for one configuration.
#[derive(Debug, Error)]
pub enum DriverError {
    /// Process launch or supervision failed.
    #[error(transparent)]
    Runner(#[from] RunnerError),

    /// The diagnostics did not contain the expected script block or timing.
    #[error(transparent)]
    Extract(#[from] ExtractError),

    /// A compiler stage exceeded its bound; its process tree was killed.
    #[error("{stage} stage timed out (process tree killed)")]
    StageTimeout {
        /// Which stage timed out.
        stage: Stage,
    },

    /// A compiler stage reported errors on its diagnostic channel.
    #[error("{stage} stage failed:\n{diagnostics}")]
    StageFailed {
        /// Which stage failed.
        stage: Stage,
        /// The diagnostic text it produced.
        diagnostics: String,
    },

    /// Staging an intermediate artifact failed.
    #[error("failed to stage intermediate artifact: {0}")]
    Staging(#[from] std::io::Error),
}

/// Where a configuration's module under test comes from.
#[derive(Debug, Clone)]
pub enum InputSource {
    /// An on-disk file, passed to the compiler by path.
    File(PathBuf),
    /// In-memory module text (batch segments), staged to a temp file.
    Text {
        /// Display label (directive / segment position).
        label: String,
        /// The module text itself.
        content: String,
    },
}

impl InputSource {
    /// Display label for logs and reports.
    pub fn label(&self) -> String {
        match self {
            InputSource::File(path) => path.display().to_string(),
            InputSource::Text { label, .. } => label.clone(),
        }
    }
}

/// One benchmark configuration.
#[derive(Debug, Clone)]
pub struct BenchConfig {
    /// Module under test.
    pub input: InputSource,
    /// Stage-1 pipeline arguments.
    pub pipeline: Vec<String>,
    /// Pre-supplied transform script; when set it replaces the extracted one
    /// for stage 2 (stage 1 must still produce a script block and a timing).
    pub transform_script: Option<String>,
}

/// Timings produced by a completed configuration run.
#[derive(Debug, Clone, Copy)]
pub struct DriverOutcome {
    /// Stage-1 time in seconds.
    pub stage1_seconds: f64,
    /// Stage-2 time in seconds; absent only when tolerated (batch mode).
    pub stage2_seconds: Option<f64>,
}

/// How the transform script reaches stage 2.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InjectionMode {
    /// Write the script to a side file and pass it by reference (default).
    ExternalScript,
    /// Splice the script into the module text and feed it via stdin.
    Inline,
}

/// The two-stage compile driver.
pub struct Driver {
    opt_tool: PathBuf,
    transform_tool: PathBuf,
    stage_timeout: Duration,
    dump_dir: Option<PathBuf>,
}

impl Driver {
    /// Create a driver over resolved tool paths.
    pub fn new(
        opt_tool: PathBuf,
        transform_tool: PathBuf,
        stage_timeout: Duration,
        dump_dir: Option<PathBuf>,
    ) -> Self {
        Self {
            opt_tool,
            transform_tool,
            stage_timeout,
            dump_dir,
        }
    }

    /// Stage-1 tool path.
    pub fn opt_tool(&self) -> &Path {
        &self.opt_tool
    }

    /// Stage-2 tool path.
    pub fn transform_tool(&self) -> &Path {
        &self.transform_tool
    }

    /// Per-stage timeout bound.
    pub fn stage_timeout(&self) -> Duration {
        self.stage_timeout
    }

    /// Run one configuration through both stages.
    ///
    /// `tolerate_missing_stage2` records an absent stage-2 timing instead of
    /// failing (batch mode); stage-1 extraction failures are always hard
    /// errors because a run without a stage-1 measurement is meaningless.
    pub fn run_config(
        &self,
        config: &BenchConfig,
        mode: InjectionMode,
        tolerate_missing_stage2: bool,
    ) -> Result<DriverOutcome, DriverError> {
        let workspace = TempDir::new()?;
        let input_path = self.stage_input(&workspace, &config.input)?;

        // Stage 1: pass pipeline.
        let invocation = Invocation::new(self.opt_tool.to_string_lossy())
            .arg(input_path.to_string_lossy())
            .args(config.pipeline.iter().cloned())
            .timeout(self.stage_timeout);
        let stage1 = run(&invocation)?;
        check_stage(Stage::Pipeline, &stage1, &["error", "Unknown"])?;

        if let Some(dir) = &self.dump_dir {
            std::fs::create_dir_all(dir)?;
            std::fs::write(dir.join("stage1_output.mlir"), &stage1.stdout)?;
        }

        let extracted = extract_script_block(&stage1.stderr)?;
        let stage1_seconds = extract_timing(&stage1.stderr)?;
        debug!(stage1_seconds, input = %config.input.label(), "stage 1 complete");

        let script = config
            .transform_script
            .clone()
            .unwrap_or(extracted);

        // Stage 2: transform application.
        let stage2 = match mode {
            InjectionMode::ExternalScript => {
                self.run_transform_external(&workspace, &input_path, &script)?
            }
            InjectionMode::Inline => self.run_transform_inline(&config.input, &script)?,
        };
        check_stage(Stage::Transform, &stage2, &["error"])?;

        let stage2_seconds = match extract_timing(&stage2.stderr) {
            Ok(time) => Some(time),
            Err(_) if tolerate_missing_stage2 => None,
            Err(e) => return Err(e.into()),
        };
        debug!(?stage2_seconds, "stage 2 complete");

        Ok(DriverOutcome {
            stage1_seconds,
            stage2_seconds,
        })
    }

    /// Resolve the input to an on-disk path, staging in-memory text into the
    /// run's temp directory.
    fn stage_input(
        &self,
        workspace: &TempDir,
        input: &InputSource,
    ) -> Result<PathBuf, DriverError> {
        match input {
            InputSource::File(path) => Ok(path.clone()),
            InputSource::Text { content, .. } => {
                let path = workspace.path().join("input.mlir");
                std::fs::write(&path, content)?;
                Ok(path)
            }
        }
    }

    /// External-script injection: wrap the script in a named-sequence module
    /// in a side file, pass it by reference.
    fn run_transform_external(
        &self,
        workspace: &TempDir,
        input_path: &Path,
        script: &str,
    ) -> Result<ProcessOutput, DriverError> {
        let script_file = workspace.path().join("transform_script.mlir");
        std::fs::write(&script_file, wrap_named_sequence(script))?;

        let invocation = Invocation::new(self.transform_tool.to_string_lossy())
            .arg(input_path.to_string_lossy())
            .arg(format!("--transform={}", script_file.display()))
            .timeout(self.stage_timeout);
        Ok(run(&invocation)?)
    }

    /// Inline injection: splice the named-sequence attribute and the script
    /// into the module text, feed the result via stdin.
    fn run_transform_inline(
        &self,
        input: &InputSource,
        script: &str,
    ) -> Result<ProcessOutput, DriverError> {
        let module_text = match input {
            InputSource::File(path) => std::fs::read_to_string(path)?,
            InputSource::Text { content, .. } => content.clone(),
        };
        let modified = splice_named_sequence(&module_text, script);

        if let Some(dir) = &self.dump_dir {
            std::fs::create_dir_all(dir)?;
            std::fs::write(dir.join("modified_module.mlir"), &modified)?;
        }

        let invocation = Invocation::new(self.transform_tool.to_string_lossy())
            .arg("-allow-unregistered-dialect")
            .stdin(modified)
            .timeout(self.stage_timeout);
        Ok(run(&invocation)?)
    }
}

/// Timeout and diagnostic-error checks shared by both stages.
fn check_stage(
    stage: Stage,
    output: &ProcessOutput,
    error_markers: &[&str],
) -> Result<(), DriverError> {
    if output.status.timed_out() {
        return Err(DriverError::StageTimeout { stage });
    }
    if error_markers.iter().any(|m| output.stderr.contains(m)) {
        return Err(DriverError::StageFailed {
            stage,
            diagnostics: output.stderr.clone(),
        });
    }
    Ok(())
}

/// Wrap a bare transform script in a module carrying the named-sequence
/// attribute, as stage 2 requires for `--transform=` side files.
pub fn wrap_named_sequence(script: &str) -> String {
    format!(
        "module attributes {{transform.with_named_sequence}} {{\n{}\n}}\n",
        script.trim_end_matches('\n')
    )
}

/// Splice the named-sequence attribute and a transform script into a module's
/// text: the module header gains `transform.with_named_sequence`, the final
/// closing brace is dropped, and the script plus a new closing brace are
/// appended.
pub fn splice_named_sequence(module_text: &str, script: &str) -> String {
    let mut lines: Vec<String> = module_text
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(str::to_string)
        .collect();

    if lines.is_empty() {
        return wrap_named_sequence(script);
    }

    let first = &lines[0];
    lines[0] = if first.starts_with("module attributes") {
        let prefix = first.strip_suffix("} {").unwrap_or(first);
        format!("{}, transform.with_named_sequence}} {{", prefix)
    } else {
        let prefix = first.strip_suffix('{').unwrap_or(first);
        format!("{}attributes {{transform.with_named_sequence}} {{", prefix)
    };

    // Closing brace of the module; the script brings its own.
    lines.pop();

    let mut modified = lines.join("\n");
    modified.push('\n');
    modified.push_str(script);
    modified.push_str("\n}");
    modified
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splices_into_a_plain_module_header() {
        let module = "module {\n  func.func @f() {\n    return\n  }\n}\n";
        let spliced = splice_named_sequence(module, "  script-line");
        let lines: Vec<&str> = spliced.lines().collect();
        assert_eq!(
            lines[0],
            "module attributes {transform.with_named_sequence} {"
        );
        assert_eq!(lines[lines.len() - 2], "  script-line");
        assert_eq!(lines[lines.len() - 1], "}");
        // The module's own closing brace was dropped, not duplicated.
        assert_eq!(spliced.matches("\n}").count(), 1);
    }

    #[test]
    fn extends_an_existing_attributes_clause() {
        let module = "module attributes {llvm.target = \"x86\"} {\n  body\n}\n";
        let spliced = splice_named_sequence(module, "  script-line");
        assert!(spliced.starts_with(
            "module attributes {llvm.target = \"x86\", transform.with_named_sequence} {"
        ));
        assert!(spliced.contains("  script-line"));
    }

    #[test]
    fn blank_lines_are_dropped_before_splicing() {
        let module = "module {\n\n  body\n\n}\n";
        let spliced = splice_named_sequence(module, "  s");
        assert!(!spliced.contains("\n\n"));
    }

    #[test]
    fn wrapped_script_carries_the_attribute() {
        let wrapped = wrap_named_sequence("  inner\n");
        assert_eq!(
            wrapped,
            "module attributes {transform.with_named_sequence} {\n  inner\n}\n"
        );
    }

    #[test]
    fn stage_timeout_is_reported_as_such() {
        use passbench_core::RunStatus;
        let output = ProcessOutput {
            stdout: String::new(),
            stderr: String::new(),
            status: RunStatus::TimedOut,
        };
        assert!(matches!(
            check_stage(Stage::Pipeline, &output, &["error"]),
            Err(DriverError::StageTimeout {
                stage: Stage::Pipeline
            })
        ));
    }

    #[test]
    fn diagnostic_error_markers_fail_the_stage() {
        use passbench_core::RunStatus;
        let output = ProcessOutput {
            stdout: String::new(),
            stderr: "loc(1:1): error: expected operation".to_string(),
            status: RunStatus::Completed { code: Some(0) },
        };
        match check_stage(Stage::Transform, &output, &["error"]) {
            Err(DriverError::StageFailed { stage, diagnostics }) => {
                assert_eq!(stage, Stage::Transform);
                assert!(diagnostics.contains("expected operation"));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn clean_diagnostics_pass_the_stage_check() {
        use passbench_core::RunStatus;
        let output = ProcessOutput {
            stdout: "module {}".to_string(),
            stderr: "Time taken: 1.0e0 seconds.".to_string(),
            status: RunStatus::Completed { code: Some(0) },
        };
        assert!(check_stage(Stage::Pipeline, &output, &["error", "Unknown"]).is_ok());
    }
}
