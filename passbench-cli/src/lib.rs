#![warn(missing_docs)]
//! Passbench CLI
//!
//! Command-line surface of the harness:
//! - `run` — benchmark one input module through both compiler stages
//! - `test` — batch mode over a `// RUN:` directive file
//! - `search` — serve the autotuning objective to an external optimizer
//! - `exec` — run an arbitrary command under the tree-killing timeout runner
//! - `fetch-models` — download and convert benchmark input models

mod aggregate;
mod batch;
mod config;
mod driver;
mod models;
mod search;

pub use aggregate::{AggregateSettings, format_human_output, repeat_and_aggregate};
pub use batch::preprocess_directive_file;
pub use config::{
    ModelsConfig, OutputConfig, PassbenchConfig, RunnerConfig, SearchConfig, ToolsConfig,
    parse_duration,
};
pub use driver::{
    BenchConfig, DEFAULT_PIPELINE, Driver, DriverError, DriverOutcome, InjectionMode, InputSource,
    Stage, splice_named_sequence, wrap_named_sequence,
};
pub use models::{ModelError, ModelFetcher};
pub use search::{Objective, ObjectiveOutcome, SearchError, serve};

use clap::{Parser, Subcommand};
use passbench_core::{Invocation, RunStatus, find_tool};
use passbench_report::{Report, generate_json_report};
use std::path::PathBuf;
use tracing::{info, warn};

/// Passbench CLI arguments
#[derive(Parser, Debug)]
#[command(name = "passbench")]
#[command(author, version, about = "Passbench - benchmarking harness for MLIR pass pipelines")]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Explicit configuration file (skips passbench.toml discovery)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Benchmark one input module through both compiler stages
    Run {
        /// Input module file
        input: PathBuf,

        /// Stage-1 pipeline arguments (built-in TOSA pipeline when empty)
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        pipeline: Vec<String>,

        /// Use this transform script for stage 2 instead of the extracted one
        #[arg(long)]
        transform_script: Option<PathBuf>,

        /// Number of repetitions (default from passbench.toml)
        #[arg(long)]
        repeat: Option<usize>,

        /// Splice the script into the module and feed stage 2 via stdin
        /// instead of passing a side file
        #[arg(long)]
        inline: bool,

        /// Output format: human, json
        #[arg(long, default_value = "human")]
        format: String,

        /// Output file (stdout if not specified)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Batch mode: benchmark every run directive in a test file
    Test {
        /// Directive file (`// RUN:` lines)
        file: PathBuf,

        /// Number of repetitions (default from passbench.toml)
        #[arg(long)]
        repeat: Option<usize>,

        /// Output format: human, json
        #[arg(long, default_value = "human")]
        format: String,

        /// Output file (stdout if not specified)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Serve the autotuning objective over line-delimited JSON on stdin/stdout
    Search {
        /// Search-space settings descriptor (JSON)
        #[arg(long)]
        settings: PathBuf,

        /// Parametric transform script template
        #[arg(long)]
        script: PathBuf,
    },

    /// Run a command under the tree-killing timeout runner
    Exec {
        /// Timeout bound (e.g., "30s"; default from passbench.toml)
        #[arg(long)]
        timeout: Option<String>,

        /// Command and arguments
        #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
        command: Vec<String>,
    },

    /// Download benchmark models and convert them to TOSA MLIR
    FetchModels {
        /// Fetch every available model
        #[arg(long)]
        all: bool,

        /// Comma-separated model names (e.g., --models bert,squeezenet)
        #[arg(long, value_delimiter = ',')]
        models: Vec<String>,
    },
}

/// Run the passbench CLI. This is the entry point for the binary.
pub fn run() -> anyhow::Result<()> {
    run_with_cli(Cli::parse())
}

/// Run the passbench CLI with pre-parsed arguments.
pub fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    if cli.verbose {
        tracing_subscriber::fmt()
            .with_env_filter("passbench=debug")
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter("passbench=info")
            .init();
    }

    let config = match &cli.config {
        Some(path) => PassbenchConfig::load(path)?,
        None => PassbenchConfig::discover().unwrap_or_default(),
    };

    match cli.command {
        Commands::Run {
            input,
            pipeline,
            transform_script,
            repeat,
            inline,
            format,
            output,
        } => cmd_run(
            &config,
            input,
            pipeline,
            transform_script,
            repeat,
            inline,
            &format,
            output,
        ),
        Commands::Test {
            file,
            repeat,
            format,
            output,
        } => cmd_test(&config, file, repeat, &format, output),
        Commands::Search { settings, script } => cmd_search(&config, settings, script),
        Commands::Exec { timeout, command } => cmd_exec(&config, timeout, command),
        Commands::FetchModels { all, models } => cmd_fetch_models(&config, all, models),
    }
}

/// Resolve both compiler tools and assemble the driver.
fn build_driver(config: &PassbenchConfig) -> anyhow::Result<Driver> {
    let opt_tool = find_tool("mlir-opt", config.tools.opt.as_deref())?;
    let transform_tool = find_tool("mlir-transform-opt", config.tools.transform_opt.as_deref())?;
    let stage_timeout = parse_duration(&config.runner.stage_timeout)?;

    Ok(Driver::new(
        opt_tool,
        transform_tool,
        stage_timeout,
        config.output.dump_dir.clone(),
    ))
}

/// Render and deliver a report per `--format` / `--output`.
fn emit_report(report: &Report, format: &str, output: Option<PathBuf>) -> anyhow::Result<()> {
    let rendered = match format {
        "json" => generate_json_report(report)?,
        "human" => format_human_output(report),
        other => anyhow::bail!("unknown output format: {other} (expected human or json)"),
    };

    match output {
        Some(path) => {
            std::fs::write(&path, rendered)?;
            println!("Report written to: {}", path.display());
        }
        None => print!("{}", rendered),
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn cmd_run(
    config: &PassbenchConfig,
    input: PathBuf,
    pipeline: Vec<String>,
    transform_script: Option<PathBuf>,
    repeat: Option<usize>,
    inline: bool,
    format: &str,
    output: Option<PathBuf>,
) -> anyhow::Result<()> {
    if !input.is_file() {
        anyhow::bail!("{} is not a valid file", input.display());
    }

    let driver = build_driver(config)?;

    let pipeline = if pipeline.is_empty() {
        vec![DEFAULT_PIPELINE.to_string()]
    } else {
        pipeline
    };
    let transform_script = transform_script
        .map(std::fs::read_to_string)
        .transpose()?;

    let configs = vec![BenchConfig {
        input: InputSource::File(input),
        pipeline,
        transform_script,
    }];

    let settings = AggregateSettings {
        repetitions: repeat.unwrap_or(config.runner.repetitions),
        mode: if inline {
            InjectionMode::Inline
        } else {
            InjectionMode::ExternalScript
        },
        batch: false,
    };

    let report = repeat_and_aggregate(&driver, &configs, settings)?;
    emit_report(&report, format, output)
}

fn cmd_test(
    config: &PassbenchConfig,
    file: PathBuf,
    repeat: Option<usize>,
    format: &str,
    output: Option<PathBuf>,
) -> anyhow::Result<()> {
    let text = std::fs::read_to_string(&file)
        .map_err(|e| anyhow::anyhow!("cannot read {}: {}", file.display(), e))?;

    let configs = preprocess_directive_file(&text);
    if configs.is_empty() {
        anyhow::bail!("{} contains no usable run directives", file.display());
    }
    info!(configs = configs.len(), "preprocessed directive file");

    let driver = build_driver(config)?;
    let settings = AggregateSettings {
        repetitions: repeat.unwrap_or(config.runner.repetitions),
        mode: InjectionMode::ExternalScript,
        batch: true,
    };

    let report = repeat_and_aggregate(&driver, &configs, settings)?;
    emit_report(&report, format, output)
}

fn cmd_search(
    config: &PassbenchConfig,
    settings: PathBuf,
    script: PathBuf,
) -> anyhow::Result<()> {
    let settings_text = std::fs::read_to_string(&settings)
        .map_err(|e| anyhow::anyhow!("cannot read {}: {}", settings.display(), e))?;
    let settings_json: serde_json::Value = serde_json::from_str(&settings_text)
        .map_err(|e| anyhow::anyhow!("invalid search settings {}: {}", settings.display(), e))?;
    if let Some(parameters) = settings_json
        .get("input_parameters")
        .and_then(|v| v.as_object())
    {
        info!(parameters = ?parameters.keys().collect::<Vec<_>>(), "search space loaded");
    }

    let template = std::fs::read_to_string(&script)
        .map_err(|e| anyhow::anyhow!("cannot read {}: {}", script.display(), e))?;

    let objective = Objective::new(
        template,
        &config.search,
        parse_duration(&config.search.build_timeout)?,
        parse_duration(&config.search.exec_timeout)?,
    );

    info!("serving objective; one JSON configuration per stdin line");
    let stdin = std::io::stdin();
    serve(&objective, stdin.lock(), std::io::stdout())?;
    Ok(())
}

fn cmd_exec(
    config: &PassbenchConfig,
    timeout: Option<String>,
    command: Vec<String>,
) -> anyhow::Result<()> {
    let timeout_str = timeout.unwrap_or_else(|| config.runner.exec_timeout.clone());
    let timeout = parse_duration(&timeout_str)?;

    let (program, args) = command
        .split_first()
        .ok_or_else(|| anyhow::anyhow!("no command given"))?;
    let invocation = Invocation::new(program)
        .args(args.iter().cloned())
        .timeout(timeout);

    let output = passbench_core::run(&invocation)?;
    print!("{}", output.stdout);
    eprint!("{}", output.stderr);

    match output.status {
        RunStatus::TimedOut => {
            anyhow::bail!("command timed out after {timeout_str}; process tree killed")
        }
        RunStatus::Completed { code } => {
            let code = code.unwrap_or(1);
            if code != 0 {
                std::process::exit(code);
            }
        }
    }
    Ok(())
}

fn cmd_fetch_models(
    config: &PassbenchConfig,
    all: bool,
    models: Vec<String>,
) -> anyhow::Result<()> {
    if !all && models.is_empty() {
        anyhow::bail!("specify either --all or --models");
    }

    let names: Vec<String> = if all {
        ModelFetcher::available_models()
            .into_iter()
            .map(str::to_string)
            .collect()
    } else {
        models
    };

    let fetcher = ModelFetcher::new(&config.models, &config.tools);
    for name in &names {
        match fetcher.fetch_and_convert(name.trim()) {
            Ok(()) => {}
            Err(ModelError::UnknownModel(name)) => {
                warn!(model = %name, "model is not available, skipping");
            }
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}
