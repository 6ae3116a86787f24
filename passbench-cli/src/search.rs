//! Search Objective Adapter
//!
//! The autotuning search procedure is an external black box: it proposes
//! parameter assignments and consumes objective values. This module is the
//! callee side of that seam.
//!
//! `Objective::evaluate` maps one configuration to a measurement:
//! specialize the parametric script → persist it where the external build
//! expects it → build → execute → parse the reported runtime. Every failure
//! along the way — launch, timeout, non-zero exit, unparseable output — is
//! converted into `{runtime: 0.0, valid: 0}` instead of propagating, because
//! the search loop must keep exploring after invalid configurations.
//!
//! `serve` speaks the wire form of the seam: one JSON configuration object
//! per input line, one JSON outcome per output line.

use crate::config::SearchConfig;
use passbench_core::{Invocation, RunnerError, run};
use passbench_script::{SpecializeError, specialize};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Errors inside one objective evaluation. These never escape
/// [`Objective::evaluate`]; they exist so the failure can be logged with its
/// cause before being collapsed into the invalid sentinel.
#[derive(Debug, Error)]
pub enum SearchError {
    /// Script specialization failed.
    #[error(transparent)]
    Specialize(#[from] SpecializeError),

    /// Persisting the specialized script failed.
    #[error("failed to write specialized script: {0}")]
    PersistScript(#[from] std::io::Error),

    /// Launching a build/execute step failed.
    #[error(transparent)]
    Runner(#[from] RunnerError),

    /// The build step timed out or exited non-zero.
    #[error("build step failed:\n{diagnostics}")]
    BuildFailed {
        /// Captured build diagnostics.
        diagnostics: String,
    },

    /// The measurement binary timed out or exited non-zero.
    #[error("execution step failed:\n{diagnostics}")]
    ExecFailed {
        /// Captured execution diagnostics.
        diagnostics: String,
    },

    /// The measurement binary printed something other than a runtime.
    #[error("unparseable runtime output: {output:?}")]
    BadRuntime {
        /// What it printed instead.
        output: String,
    },
}

/// One objective measurement: the reported runtime and a validity flag
/// (`valid = 0` scores the configuration out without crashing the search).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ObjectiveOutcome {
    /// Reported runtime; 0.0 for invalid configurations.
    pub runtime: f64,
    /// 1 when the measurement is usable, 0 otherwise.
    pub valid: u8,
}

impl ObjectiveOutcome {
    /// A usable measurement.
    pub fn measured(runtime: f64) -> Self {
        Self { runtime, valid: 1 }
    }

    /// The sentinel for a failed configuration.
    pub fn invalid() -> Self {
        Self {
            runtime: 0.0,
            valid: 0,
        }
    }
}

/// The objective function over one parametric script.
pub struct Objective {
    template: String,
    script_path: PathBuf,
    build_dir: PathBuf,
    build_target: String,
    runtime_binary: PathBuf,
    build_timeout: Duration,
    exec_timeout: Duration,
}

impl Objective {
    /// Build an objective from a parametric script template and the search
    /// configuration.
    pub fn new(
        template: String,
        search: &SearchConfig,
        build_timeout: Duration,
        exec_timeout: Duration,
    ) -> Self {
        Self {
            template,
            script_path: search.script_path.clone(),
            build_dir: search.build_dir.clone(),
            build_target: search.build_target.clone(),
            runtime_binary: search.runtime_binary(),
            build_timeout,
            exec_timeout,
        }
    }

    /// Evaluate one configuration. Never fails; invalid configurations come
    /// back as the `{0.0, 0}` sentinel.
    pub fn evaluate(&self, bindings: &BTreeMap<String, String>) -> ObjectiveOutcome {
        match self.try_evaluate(bindings) {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(error = %e, "configuration scored invalid");
                ObjectiveOutcome::invalid()
            }
        }
    }

    fn try_evaluate(
        &self,
        bindings: &BTreeMap<String, String>,
    ) -> Result<ObjectiveOutcome, SearchError> {
        debug!(?bindings, "evaluating configuration");

        let specialized = specialize(&self.template, bindings)?;
        std::fs::write(&self.script_path, &specialized)?;

        // Stale objects would let a broken configuration inherit the previous
        // one's binary; a failing clean is not itself disqualifying.
        let clean = Invocation::new("make")
            .args(["clean", "-s", "-C"])
            .arg(self.build_dir.to_string_lossy())
            .timeout(self.build_timeout);
        let _ = run(&clean);

        let build = Invocation::new("make")
            .args(["-s", "-C"])
            .arg(self.build_dir.to_string_lossy())
            .arg(&self.build_target)
            .timeout(self.build_timeout);
        let build_output = run(&build)?;
        if !build_output.status.success() {
            return Err(SearchError::BuildFailed {
                diagnostics: build_output.stderr,
            });
        }

        let exec = Invocation::new(self.runtime_binary.to_string_lossy())
            .timeout(self.exec_timeout);
        let exec_output = run(&exec)?;
        if !exec_output.status.success() {
            return Err(SearchError::ExecFailed {
                diagnostics: exec_output.stderr,
            });
        }

        let runtime: f64 =
            exec_output
                .stdout
                .trim()
                .parse()
                .map_err(|_| SearchError::BadRuntime {
                    output: exec_output.stdout.clone(),
                })?;

        Ok(ObjectiveOutcome::measured(runtime))
    }
}

/// Convert one JSON configuration object into binding strings.
///
/// Numbers and booleans take their display form; strings pass through.
fn bindings_from_json(
    value: &serde_json::Value,
) -> Option<BTreeMap<String, String>> {
    let object = value.as_object()?;
    let mut bindings = BTreeMap::new();
    for (key, value) in object {
        let rendered = match value {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        bindings.insert(key.clone(), rendered);
    }
    Some(bindings)
}

/// Serve the objective over line-delimited JSON: one configuration object in
/// per line, one outcome out per line. Unparseable lines score invalid, like
/// any other bad configuration.
pub fn serve(
    objective: &Objective,
    input: impl BufRead,
    mut output: impl Write,
) -> std::io::Result<()> {
    for line in input.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        let outcome = serde_json::from_str::<serde_json::Value>(&line)
            .ok()
            .as_ref()
            .and_then(bindings_from_json)
            .map(|bindings| objective.evaluate(&bindings))
            .unwrap_or_else(|| {
                warn!(%line, "unparseable configuration line");
                ObjectiveOutcome::invalid()
            });

        // to_string cannot fail on this shape; fall back to the sentinel text.
        let rendered = serde_json::to_string(&outcome)
            .unwrap_or_else(|_| "{\"runtime\":0.0,\"valid\":0}".to_string());
        writeln!(output, "{}", rendered)?;
        output.flush()?;
    }
    Ok(())
}
