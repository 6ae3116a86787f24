//! Model Download and Conversion
//!
//! Fetches `.tflite` models and converts them to TOSA MLIR for use as
//! benchmark inputs:
//! 1. download (or export, for models without a direct URL)
//! 2. `flatbuffer_translate --tflite-flatbuffer-to-mlir`
//! 3. `tf-opt --tfl-to-tosa-pipeline`
//!
//! The converters run through the core process runner with a generous bound;
//! a wedged converter must not hang the harness.

use crate::config::{ModelsConfig, ToolsConfig};
use passbench_core::{Invocation, RunnerError, ToolError, find_tool, run};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::info;

/// Downloadable models. `bert` is exported via `optimum-cli` instead and is
/// handled separately.
pub const MODEL_URLS: &[(&str, &str)] = &[
    (
        "squeezenet",
        "https://huggingface.co/qualcomm/SqueezeNet-1_1/resolve/main/SqueezeNet-1_1.tflite?download=true",
    ),
    (
        "whisper",
        "https://huggingface.co/qualcomm/Whisper-Base-En/resolve/main/WhisperDecoder.tflite?download=true",
    ),
    (
        "gpt2",
        "https://huggingface.co/openai-community/gpt2/resolve/main/64.tflite?download=true",
    ),
];

/// Bound on each download or conversion step.
const FETCH_TIMEOUT: Duration = Duration::from_secs(600);

/// Model fetching failures.
#[derive(Debug, Error)]
pub enum ModelError {
    /// The requested model is not in the table.
    #[error("model {0} is not available")]
    UnknownModel(String),

    /// The download failed at the HTTP layer.
    #[error("download failed for {model}: {source}")]
    Http {
        /// Model being fetched.
        model: String,
        /// Underlying HTTP error.
        #[source]
        source: reqwest::Error,
    },

    /// The server answered with a non-success status.
    #[error("download failed for {model}: HTTP status {status}")]
    Download {
        /// Model being fetched.
        model: String,
        /// Status code returned.
        status: u16,
    },

    /// Local file I/O failed.
    #[error("model file i/o failed: {0}")]
    Io(#[from] std::io::Error),

    /// A converter tool could not be located.
    #[error(transparent)]
    Tool(#[from] ToolError),

    /// A converter or exporter process could not be run.
    #[error(transparent)]
    Runner(#[from] RunnerError),

    /// A conversion step reported failure.
    #[error("conversion step {step} failed for {model}:\n{diagnostics}")]
    Convert {
        /// Model being converted.
        model: String,
        /// Which converter failed.
        step: String,
        /// Its diagnostic output.
        diagnostics: String,
    },
}

/// Downloads models and converts them to TOSA MLIR.
pub struct ModelFetcher {
    dir: PathBuf,
    flatbuffer_translate: Option<PathBuf>,
    tf_opt: Option<PathBuf>,
}

impl ModelFetcher {
    /// Build a fetcher from the models and tools configuration.
    pub fn new(models: &ModelsConfig, tools: &ToolsConfig) -> Self {
        Self {
            dir: models.dir.clone(),
            flatbuffer_translate: tools.flatbuffer_translate.clone(),
            tf_opt: tools.tf_opt.clone(),
        }
    }

    /// Every model name this fetcher knows.
    pub fn available_models() -> Vec<&'static str> {
        let mut names = vec!["bert"];
        names.extend(MODEL_URLS.iter().map(|(name, _)| *name));
        names
    }

    /// Fetch one model and convert it to TOSA MLIR.
    pub fn fetch_and_convert(&self, model: &str) -> Result<(), ModelError> {
        std::fs::create_dir_all(&self.dir)?;
        let tflite_file = self.dir.join(format!("{}.tflite", model));

        if model == "bert" {
            self.export_bert(&tflite_file)?;
        } else {
            let url = MODEL_URLS
                .iter()
                .find(|(name, _)| *name == model)
                .map(|(_, url)| *url)
                .ok_or_else(|| ModelError::UnknownModel(model.to_string()))?;
            self.download(model, url, &tflite_file)?;
        }
        info!(model, "downloaded");

        self.convert(model, &tflite_file)
    }

    fn download(&self, model: &str, url: &str, destination: &Path) -> Result<(), ModelError> {
        let response = reqwest::blocking::get(url).map_err(|source| ModelError::Http {
            model: model.to_string(),
            source,
        })?;
        if !response.status().is_success() {
            return Err(ModelError::Download {
                model: model.to_string(),
                status: response.status().as_u16(),
            });
        }
        let bytes = response.bytes().map_err(|source| ModelError::Http {
            model: model.to_string(),
            source,
        })?;
        std::fs::write(destination, &bytes)?;
        Ok(())
    }

    /// Export bert with `optimum-cli` (no direct download exists) and move
    /// the result into place.
    fn export_bert(&self, destination: &Path) -> Result<(), ModelError> {
        let export_dir = self.dir.join("bert_tflite");
        let invocation = Invocation::new("optimum-cli")
            .args([
                "export",
                "tflite",
                "--model",
                "google-bert/bert-base-uncased",
                "--sequence_length",
                "128",
            ])
            .arg(export_dir.to_string_lossy())
            .timeout(FETCH_TIMEOUT);
        let output = run(&invocation)?;
        if !output.status.success() {
            return Err(ModelError::Convert {
                model: "bert".to_string(),
                step: "optimum-cli export".to_string(),
                diagnostics: output.stderr,
            });
        }

        std::fs::copy(export_dir.join("model.tflite"), destination)?;
        std::fs::remove_dir_all(&export_dir)?;
        Ok(())
    }

    fn convert(&self, model: &str, tflite_file: &Path) -> Result<(), ModelError> {
        info!(model, "converting flatbuffer model to mlir");

        let translate = find_tool("flatbuffer_translate", self.flatbuffer_translate.as_deref())?;
        let tflite_mlir = self.dir.join(format!("{}_tflite.mlir", model));
        self.run_converter(
            model,
            "flatbuffer_translate",
            Invocation::new(translate.to_string_lossy())
                .arg("--tflite-flatbuffer-to-mlir")
                .arg(tflite_file.to_string_lossy()),
            &tflite_mlir,
        )?;

        let tf_opt = find_tool("tf-opt", self.tf_opt.as_deref())?;
        let tosa_mlir = self.dir.join(format!("{}_tosa.mlir", model));
        self.run_converter(
            model,
            "tf-opt",
            Invocation::new(tf_opt.to_string_lossy())
                .arg("--tfl-to-tosa-pipeline")
                .arg(tflite_mlir.to_string_lossy()),
            &tosa_mlir,
        )?;

        info!(model, output = %tosa_mlir.display(), "conversion complete");
        Ok(())
    }

    fn run_converter(
        &self,
        model: &str,
        step: &str,
        invocation: Invocation,
        output_file: &Path,
    ) -> Result<(), ModelError> {
        let output = run(&invocation.timeout(FETCH_TIMEOUT))?;
        if !output.status.success() {
            return Err(ModelError::Convert {
                model: model.to_string(),
                step: step.to_string(),
                diagnostics: output.stderr,
            });
        }
        std::fs::write(output_file, &output.stdout)?;
        Ok(())
    }
}
