#![warn(missing_docs)]
//! TestGrid Engine
//!
//! Resolution and execution for TestGrid tests, plus the CLI used by the
//! `testgrid` binary. Use `testgrid::run()` (or `testgrid_engine::run()`) in
//! a main function to get the full CLI over every linked test.
//!
//! # Example
//!
//! ```ignore
//! use testgrid::prelude::*;
//!
//! /// Number of rows in the dataset
//! #[register_test(id = "my_tests.data.RowCount", tags = "tabular_data")]
//! fn row_count(dataset: &Dataset) -> f64 {
//!     dataset.len() as f64
//! }
//!
//! fn main() -> anyhow::Result<()> {
//!     testgrid::run()
//! }
//! ```

mod catalog;
mod config;
mod executor;
mod loader;
mod provider;
mod store;

pub use catalog::{ListFilter, TestDescriptor, all_ids, describe, list};
pub use config::*;
pub use executor::*;
pub use loader::{DEFAULT_RESOLUTION_ORDER, ResolverKind, TestLoader};
pub use provider::{LocalTestProvider, ProviderRegistry, TestProvider};
pub use store::TestStore;

use anyhow::Context;
use clap::{Parser, Subcommand};
use indexmap::IndexMap;
use serde_json::Value;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use testgrid_core::{BoundInputs, Dataset, InputObject, InputValue, Params, TestResult};
use testgrid_report::{JsonDirSink, OutputFormat, ResultSink, format_result, log_all};

/// TestGrid CLI arguments
#[derive(Parser, Debug)]
#[command(name = "testgrid")]
#[command(author, version, about = "TestGrid - registry and runner for model-validation tests")]
pub struct Cli {
    /// Subcommand
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file (discovered from the current directory otherwise)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List available tests
    List {
        /// Case-insensitive substring over ids, tasks and tags
        filter: Option<String>,
        /// Only tests for this task type
        #[arg(long)]
        task: Option<String>,
        /// Only tests carrying this tag (repeatable)
        #[arg(long = "tag")]
        tags: Vec<String>,
        /// Print descriptors as JSON
        #[arg(long)]
        json: bool,
    },
    /// Describe a test without running it
    Describe {
        /// Test identifier
        #[arg(name = "ID")]
        id: String,
        /// Print the descriptor as JSON
        #[arg(long)]
        json: bool,
    },
    /// Run a single test
    Run {
        /// Test identifier, optionally with a `:suffix`
        #[arg(name = "ID")]
        id: String,
        #[command(flatten)]
        args: RunArgs,
        /// Unit metrics making up a composite metric (repeatable)
        #[arg(long = "unit-metric")]
        unit_metrics: Vec<String>,
    },
    /// Run a test over input and param grids and merge the results
    Compare {
        /// Test identifier, optionally with a `:suffix`
        #[arg(name = "ID")]
        id: String,
        #[command(flatten)]
        args: RunArgs,
        /// Input grid axis: role=path1.json,path2.json (repeatable)
        #[arg(long = "input-grid")]
        input_grid: Vec<String>,
        /// Param grid axis: name=v1,v2 with JSON values (repeatable)
        #[arg(long = "param-grid")]
        param_grid: Vec<String>,
    },
    /// Run several tests against the same inputs, logging every result
    Suite {
        /// Test identifiers, run in order
        #[arg(name = "IDS", required = true)]
        ids: Vec<String>,
        #[command(flatten)]
        args: RunArgs,
        /// Stop at the first test that does not pass
        #[arg(long)]
        fail_fast: bool,
    },
    /// Write a default testgrid.toml
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

/// Arguments shared by `run` and `compare`
#[derive(clap::Args, Debug, Default)]
pub struct RunArgs {
    /// Bind an input: role=path.json, or role=a.json,b.json for a list (repeatable)
    #[arg(long = "input")]
    pub inputs: Vec<String>,

    /// Override a parameter: name=<json value> (repeatable)
    #[arg(long = "param")]
    pub params: Vec<String>,

    /// Output template rendered by the human format
    #[arg(long)]
    pub template: Option<String>,

    /// Output format: human, json, csv, markdown
    #[arg(long)]
    pub format: Option<String>,

    /// Output file (stdout if not specified)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Write the result payload as JSON into this directory
    #[arg(long)]
    pub log_dir: Option<PathBuf>,
}

/// Run the TestGrid CLI with the process arguments.
/// This is the main entry point for the `testgrid` binary.
pub fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    run_with_cli(cli)
}

/// Run the TestGrid CLI with pre-parsed arguments.
pub fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    // Initialize logging
    if cli.verbose {
        tracing_subscriber::fmt()
            .with_env_filter("testgrid=debug")
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter("testgrid=info")
            .init();
    }

    // Explicit --config wins over discovery
    let config = match &cli.config {
        Some(path) => GridConfig::load(path)?,
        None => GridConfig::discover().unwrap_or_default(),
    };

    match cli.command {
        Commands::List {
            filter,
            task,
            tags,
            json,
        } => {
            let mut engine = Engine::from_config(&config);
            let filter = ListFilter { filter, task, tags };
            list_tests(&mut engine, &filter, json)?;
        }
        Commands::Describe { id, json } => {
            let mut engine = Engine::from_config(&config);
            describe_test(&mut engine, &id, json)?;
        }
        Commands::Run {
            id,
            args,
            unit_metrics,
        } => {
            let mut engine = Engine::from_config(&config);
            let mut request = RunRequest::new(&id)
                .inputs(bind_inputs(&mut engine, &args.inputs)?)
                .params(parse_params(&args.params)?);
            request.output_template = args.template.clone();
            if !unit_metrics.is_empty() {
                request = request.unit_metrics(unit_metrics);
            }
            let result = engine.run(request)?;
            emit_result(&result, &args, &config)?;
        }
        Commands::Compare {
            id,
            args,
            input_grid,
            param_grid,
        } => {
            let mut engine = Engine::from_config(&config);
            let mut request = ComparisonRequest::new(&id);
            request.inputs = bind_inputs(&mut engine, &args.inputs)?;
            request.params = parse_params(&args.params)?;
            request.output_template = args.template.clone();
            if !input_grid.is_empty() {
                request.input_grid = Some(parse_input_grid(&mut engine, &input_grid)?);
            }
            if !param_grid.is_empty() {
                request.param_grid = Some(parse_param_grid(&param_grid)?);
            }
            let result = engine.run_comparison(request)?;
            emit_result(&result, &args, &config)?;
        }
        Commands::Suite {
            ids,
            args,
            fail_fast,
        } => {
            let mut engine = Engine::from_config(&config);
            let inputs = bind_inputs(&mut engine, &args.inputs)?;
            let params = parse_params(&args.params)?;
            let requests = ids
                .iter()
                .map(|id| {
                    RunRequest::new(id)
                        .inputs(inputs.clone())
                        .params(params.clone())
                })
                .collect();
            let report = engine.run_suite(requests, fail_fast || config.runner.fail_fast);
            let log_dir = args.log_dir.clone().unwrap_or(config.output.directory.clone());
            print_suite(&report, &log_dir)?;
            if !report.all_passed() {
                std::process::exit(1);
            }
        }
        Commands::Init { force } => {
            init_config(Path::new(CONFIG_FILE_NAME), force)?;
        }
    }

    Ok(())
}

fn list_tests(engine: &mut Engine, filter: &ListFilter, json: bool) -> anyhow::Result<()> {
    let descriptors = engine.list(filter);
    if json {
        println!("{}", serde_json::to_string_pretty(&descriptors)?);
        return Ok(());
    }

    println!("TestGrid Catalog:");
    for descriptor in &descriptors {
        let tags = if descriptor.tags.is_empty() {
            String::new()
        } else {
            format!(" [{}]", descriptor.tags.join(", "))
        };
        println!("├── {}{}", descriptor.id, tags);
        if let Some(line) = descriptor.description.lines().find(|l| !l.trim().is_empty()) {
            println!("│     {}", line.trim());
        }
    }
    println!("{} tests found.", descriptors.len());

    // Tags across the whole catalog, so users can discover what to filter by
    let mut tag_counts: std::collections::BTreeMap<String, usize> = std::collections::BTreeMap::new();
    for descriptor in engine.list(&ListFilter::default()) {
        for tag in descriptor.tags {
            *tag_counts.entry(tag).or_default() += 1;
        }
    }
    if !tag_counts.is_empty() {
        let tags_display: Vec<String> = tag_counts
            .iter()
            .map(|(tag, count)| format!("{} ({})", tag, count))
            .collect();
        println!("Tags: {}", tags_display.join(", "));
    }
    Ok(())
}

fn describe_test(engine: &mut Engine, id: &str, json: bool) -> anyhow::Result<()> {
    let descriptor = engine.describe(id)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&descriptor)?);
        return Ok(());
    }
    println!("ID:              {}", descriptor.id);
    println!("Name:            {}", descriptor.name);
    println!("Required Inputs: {}", descriptor.required_inputs.join(", "));
    println!("Params:          {}", serde_json::to_string(&descriptor.params)?);
    if !descriptor.tasks.is_empty() {
        println!("Tasks:           {}", descriptor.tasks.join(", "));
    }
    if !descriptor.tags.is_empty() {
        println!("Tags:            {}", descriptor.tags.join(", "));
    }
    println!("Description:     {}", descriptor.description);
    Ok(())
}

fn emit_result(result: &TestResult, args: &RunArgs, config: &GridConfig) -> anyhow::Result<()> {
    let format = match &args.format {
        Some(format) => format.parse().map_err(anyhow::Error::msg)?,
        None => config.output.format,
    };
    let output = format_result(result, format)?;

    if let Some(ref path) = args.output {
        let mut file = std::fs::File::create(path)?;
        file.write_all(output.as_bytes())?;
        println!("Result written to: {}", path.display());
    } else if format == OutputFormat::Human {
        println!("{}", output);
    } else {
        print!("{}", output);
    }

    if let Some(dir) = &args.log_dir {
        let sink = JsonDirSink::new(dir);
        let payload = result.to_payload();
        sink.log(&payload)?;
        println!("Payload logged to: {}", sink.path_for(&payload.id).display());
    }

    if result.passed() == Some(false) {
        eprintln!("\nTest '{}' did not pass", result.result_id());
        std::process::exit(1);
    }
    Ok(())
}

fn print_suite(report: &SuiteReport, log_dir: &Path) -> anyhow::Result<()> {
    println!("TestGrid Suite:");
    for outcome in &report.outcomes {
        let marker = match outcome.status {
            SuiteStatus::Passed => "✓",
            SuiteStatus::Failed => "✗",
            SuiteStatus::Errored => "!",
        };
        println!("├── {} {} ({} ms)", marker, outcome.test_id, outcome.duration_ms);
        if let Some(error) = &outcome.error {
            println!("│     {}", error);
        }
    }
    println!(
        "{} passed, {} failed, {} errored{}",
        report.count(SuiteStatus::Passed),
        report.count(SuiteStatus::Failed),
        report.count(SuiteStatus::Errored),
        if report.stopped_early { " (stopped early)" } else { "" }
    );

    let payloads: Vec<_> = report
        .outcomes
        .iter()
        .filter_map(|o| o.result.as_ref().map(TestResult::to_payload))
        .collect();
    if payloads.is_empty() {
        return Ok(());
    }
    let count = payloads.len();
    let sink: Arc<dyn ResultSink> = Arc::new(JsonDirSink::new(log_dir));
    let runtime = tokio::runtime::Runtime::new()?;
    for outcome in runtime.block_on(log_all(sink, payloads)) {
        outcome?;
    }
    println!("{} payloads logged to: {}", count, log_dir.display());
    Ok(())
}

fn init_config(path: &Path, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!("{} already exists (use --force to overwrite)", path.display());
    }
    std::fs::write(path, GridConfig::default_toml())
        .with_context(|| format!("Failed to write {}", path.display()))?;
    println!("Wrote {}", path.display());
    Ok(())
}

// ============================================================================
// Argument parsing
// ============================================================================

/// Split `key=value` on the first `=`
fn parse_assignment(raw: &str) -> anyhow::Result<(String, String)> {
    let (key, value) = raw
        .split_once('=')
        .with_context(|| format!("Expected key=value, got '{}'", raw))?;
    let key = key.trim();
    if key.is_empty() {
        anyhow::bail!("Empty key in '{}'", raw);
    }
    Ok((key.to_string(), value.to_string()))
}

/// JSON if it parses, the raw text as a string otherwise
fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

fn parse_params(raw: &[String]) -> anyhow::Result<Params> {
    let mut params = Params::new();
    for entry in raw {
        let (name, value) = parse_assignment(entry)?;
        params.insert(name, parse_value(&value));
    }
    Ok(params)
}

fn parse_param_grid(raw: &[String]) -> anyhow::Result<ParamGrid> {
    let mut grid = ParamGrid::product();
    for entry in raw {
        let (name, values) = parse_assignment(entry)?;
        grid = grid.axis(name, values.split(',').map(|v| parse_value(v.trim())));
    }
    Ok(grid)
}

/// Load a JSON dataset (its input id is the file stem) and register it
fn load_dataset(engine: &mut Engine, path: &str) -> anyhow::Result<InputObject> {
    let path = Path::new(path.trim());
    let input_id = path
        .file_stem()
        .and_then(|s| s.to_str())
        .with_context(|| format!("Cannot derive an input id from '{}'", path.display()))?;
    let dataset = Dataset::from_json_file(input_id, path)?;
    let object = InputObject::from(dataset);
    engine.register_input(object.clone());
    Ok(object)
}

fn bind_inputs(engine: &mut Engine, raw: &[String]) -> anyhow::Result<BoundInputs> {
    let mut inputs = BoundInputs::new();
    for entry in raw {
        let (role, paths) = parse_assignment(entry)?;
        let objects = paths
            .split(',')
            .map(|p| load_dataset(engine, p))
            .collect::<anyhow::Result<Vec<_>>>()?;
        let value = match <[InputObject; 1]>::try_from(objects) {
            Ok([single]) => InputValue::One(single),
            Err(many) => InputValue::Many(many),
        };
        inputs.bind(role, value);
    }
    Ok(inputs)
}

fn parse_input_grid(engine: &mut Engine, raw: &[String]) -> anyhow::Result<InputGrid> {
    let mut axes: IndexMap<String, Vec<InputValue>> = IndexMap::new();
    for entry in raw {
        let (role, paths) = parse_assignment(entry)?;
        let values = paths
            .split(',')
            .map(|p| load_dataset(engine, p).map(InputValue::One))
            .collect::<anyhow::Result<Vec<_>>>()?;
        axes.insert(role, values);
    }
    Ok(Grid::Product(axes))
}
