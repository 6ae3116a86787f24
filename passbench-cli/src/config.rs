//! Configuration loading from passbench.toml
//!
//! Configuration can be specified in a `passbench.toml` file in the project
//! root, discovered by walking up from the current directory. CLI flags
//! override file values.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Passbench configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PassbenchConfig {
    /// Compiler tool locations
    #[serde(default)]
    pub tools: ToolsConfig,
    /// Benchmark runner configuration
    #[serde(default)]
    pub runner: RunnerConfig,
    /// Autotuning search configuration
    #[serde(default)]
    pub search: SearchConfig,
    /// Artifact output configuration
    #[serde(default)]
    pub output: OutputConfig,
    /// Model download configuration
    #[serde(default)]
    pub models: ModelsConfig,
}

/// Explicit tool paths; anything left unset is discovered via `LLVM_DIR`,
/// common locations, and `PATH`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ToolsConfig {
    /// Stage-1 optimizer (`mlir-opt`)
    #[serde(default)]
    pub opt: Option<PathBuf>,
    /// Stage-2 transform interpreter (`mlir-transform-opt`)
    #[serde(default)]
    pub transform_opt: Option<PathBuf>,
    /// Flatbuffer-to-MLIR translator (model conversion)
    #[serde(default)]
    pub flatbuffer_translate: Option<PathBuf>,
    /// TensorFlow MLIR optimizer (model conversion)
    #[serde(default)]
    pub tf_opt: Option<PathBuf>,
}

/// Runner configuration for the benchmark loop
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Timeout for a single compiler stage (e.g., "15s")
    #[serde(default = "default_stage_timeout")]
    pub stage_timeout: String,
    /// Number of repetitions per configuration
    #[serde(default = "default_repetitions")]
    pub repetitions: usize,
    /// Default timeout for the standalone `exec` runner
    #[serde(default = "default_exec_timeout")]
    pub exec_timeout: String,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            stage_timeout: default_stage_timeout(),
            repetitions: default_repetitions(),
            exec_timeout: default_exec_timeout(),
        }
    }
}

fn default_stage_timeout() -> String {
    "15s".to_string()
}
fn default_repetitions() -> usize {
    10
}
fn default_exec_timeout() -> String {
    "60s".to_string()
}

/// Autotuning search configuration
///
/// The build system reads the specialized script at a fixed location of its
/// own choosing, so `script_path` is part of that external interface rather
/// than a harness-internal temp file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Directory holding the external build system
    #[serde(default = "default_build_dir")]
    pub build_dir: PathBuf,
    /// Build target producing the measurement binary
    #[serde(default = "default_build_target")]
    pub build_target: String,
    /// Measurement binary; defaults to `<build_dir>/<build_target>`
    #[serde(default)]
    pub runtime_binary: Option<PathBuf>,
    /// Where the build system expects the specialized transform script
    #[serde(default = "default_script_path")]
    pub script_path: PathBuf,
    /// Timeout for the build step
    #[serde(default = "default_build_timeout")]
    pub build_timeout: String,
    /// Timeout for one measurement execution
    #[serde(default = "default_exec_timeout")]
    pub exec_timeout: String,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            build_dir: default_build_dir(),
            build_target: default_build_target(),
            runtime_binary: None,
            script_path: default_script_path(),
            build_timeout: default_build_timeout(),
            exec_timeout: default_exec_timeout(),
        }
    }
}

impl SearchConfig {
    /// The measurement binary to execute after a successful build.
    pub fn runtime_binary(&self) -> PathBuf {
        self.runtime_binary
            .clone()
            .unwrap_or_else(|| self.build_dir.join(&self.build_target))
    }
}

fn default_build_dir() -> PathBuf {
    PathBuf::from("build")
}
fn default_build_target() -> String {
    "search_batch_matmul".to_string()
}
fn default_script_path() -> PathBuf {
    PathBuf::from("specialized_transform.mlir")
}
fn default_build_timeout() -> String {
    "120s".to_string()
}

/// Artifact output configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct OutputConfig {
    /// Directory for raw stage-1 output and modified-module dumps
    /// (no dumps when unset)
    #[serde(default)]
    pub dump_dir: Option<PathBuf>,
}

/// Model download configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelsConfig {
    /// Directory for downloaded and converted models
    #[serde(default = "default_models_dir")]
    pub dir: PathBuf,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            dir: default_models_dir(),
        }
    }
}

fn default_models_dir() -> PathBuf {
    PathBuf::from("models")
}

impl PassbenchConfig {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Try to discover and load configuration by walking up from the current
    /// directory
    pub fn discover() -> Option<Self> {
        let mut dir = std::env::current_dir().ok()?;
        loop {
            let config_path = dir.join("passbench.toml");
            if config_path.exists() {
                return Self::load(&config_path).ok();
            }
            if !dir.pop() {
                break;
            }
        }
        None
    }
}

/// Parse a duration string (e.g., "15s", "500ms", "2m")
pub fn parse_duration(s: &str) -> anyhow::Result<Duration> {
    let s = s.trim();
    if s.is_empty() {
        return Err(anyhow::anyhow!("Empty duration string"));
    }

    let (num_part, unit_part) = s
        .char_indices()
        .find(|(_, c)| c.is_alphabetic())
        .map(|(i, _)| s.split_at(i))
        .unwrap_or((s, "s"));

    let value: f64 = num_part
        .parse()
        .map_err(|_| anyhow::anyhow!("Invalid duration number: {}", num_part))?;
    if value < 0.0 {
        return Err(anyhow::anyhow!("Negative duration: {}", s));
    }

    let nanos: f64 = match unit_part.to_lowercase().as_str() {
        "ns" => 1.0,
        "us" | "µs" => 1e3,
        "ms" => 1e6,
        "s" | "" => 1e9,
        "m" | "min" => 60.0 * 1e9,
        _ => return Err(anyhow::anyhow!("Unknown duration unit: {}", unit_part)),
    };

    Ok(Duration::from_nanos((value * nanos) as u64))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = PassbenchConfig::default();
        assert_eq!(config.runner.stage_timeout, "15s");
        assert_eq!(config.runner.repetitions, 10);
        assert!(config.output.dump_dir.is_none());
        assert_eq!(
            config.search.runtime_binary(),
            PathBuf::from("build/search_batch_matmul")
        );
    }

    #[test]
    fn parse_durations() {
        assert_eq!(parse_duration("15s").unwrap(), Duration::from_secs(15));
        assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
        assert_eq!(parse_duration("100us").unwrap(), Duration::from_micros(100));
        assert_eq!(parse_duration("2m").unwrap(), Duration::from_secs(120));
        assert_eq!(
            parse_duration("1.5s").unwrap(),
            Duration::from_millis(1500)
        );
        assert!(parse_duration("").is_err());
        assert!(parse_duration("5 fortnights").is_err());
    }

    #[test]
    fn parse_partial_toml_keeps_defaults() {
        let toml_str = r#"
            [runner]
            repetitions = 3

            [tools]
            opt = "/opt/llvm/bin/mlir-opt"
        "#;

        let config: PassbenchConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.runner.repetitions, 3);
        assert_eq!(config.runner.stage_timeout, "15s");
        assert_eq!(
            config.tools.opt,
            Some(PathBuf::from("/opt/llvm/bin/mlir-opt"))
        );
        assert_eq!(config.search.build_target, "search_batch_matmul");
    }
}
