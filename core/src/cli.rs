use std::env;
use std::fs;
use std::path::PathBuf;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing_subscriber::EnvFilter;

use crate::config::{Config, CONFIG_PATH_ENV};
use crate::environment::{standard_registry, DungeonConfig};
use crate::ids;
use crate::interpreter::{Diagnostic, Interpreter};
use crate::parser::parse_document;
use crate::program::{load_sources, Program};
use crate::types::{DslType, Registry};


#[derive(Parser)]
#[command(name = "dungeon-dsl")]
#[command(about = "Dungeon DSL - check and run dungeon configuration files", long_about = None)]
pub struct Cli {
    /// Path to config file (overrides default search)
    #[arg(long, global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Load and analyze source files, reporting every rejected file
    Check {
        /// Files or directories (default: configured source paths)
        paths: Vec<PathBuf>,
    },

    /// Interpret a dungeon_config entry point
    Run {
        /// Entry point to evaluate
        #[arg(short = 'e', long = "entry")]
        entry: Option<String>,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,

        /// Files or directories (default: configured source paths)
        paths: Vec<PathBuf>,
    },

    /// Print the syntax tree of a file as JSON
    Ast {
        file: PathBuf,
    },

    /// List the types, collection types and functions the DSL knows
    Types,

    /// Print the effective configuration
    Config,
}

/// Run the CLI by parsing process arguments
pub fn run_cli() -> Result<()> {
    let cli = Cli::parse();
    run_cli_with_args(cli)
}

/// Run the CLI with explicit arguments
pub fn run_cli_from_args(args: Vec<String>) -> Result<()> {
    let cli = Cli::parse_from(args);
    run_cli_with_args(cli)
}

fn run_cli_with_args(cli: Cli) -> Result<()> {
    if let Some(config_path) = &cli.config {
        env::set_var(CONFIG_PATH_ENV, config_path);
    }

    // Load configuration before anything else so errors show up first
    let config = match &cli.command {
        Commands::Check { paths } | Commands::Run { paths, .. } => {
            let mut builder = Config::builder();
            for path in paths {
                builder = builder.source_path(path);
            }
            if let Commands::Run { entry, .. } = &cli.command {
                builder = builder.entry_point(entry.clone());
            }
            builder.build()?
        }
        _ => Config::load()?,
    };
    init_logging(&config.logging.filter);

    match cli.command {
        Commands::Check { .. } => {
            let registry = standard_registry()?;
            let program = compile(&registry, &config)?;

            for file in program.files() {
                println!("ok      {} ({} definitions)", file.file, file.definitions.len());
            }
            for (file, err) in program.failures() {
                println!("failed  {}", file);
                println!("        {}", err);
            }

            if !program.is_ok() {
                bail!("{} of {} files failed", program.failures().len(), program.sources().len());
            }
            println!("\n{} entry points in {} files", program.entry_points().len(), program.sources().len());
        }

        Commands::Run { json, .. } => {
            let registry = standard_registry()?;
            let program = compile(&registry, &config)?;
            for (file, err) in program.failures() {
                eprintln!("Skipping {}: {}", file, err);
            }

            let entry = select_entry(&program, config.interpreter.entry_point.as_deref())?;
            let mut interpreter = Interpreter::new(&registry, &program, ids::global());
            let result = interpreter.run(&entry)?;

            if json {
                let document = render_json(&entry, &result, interpreter.diagnostics());
                println!("{}", serde_json::to_string_pretty(&document)?);
            } else {
                print_config(&entry, &result, interpreter.diagnostics());
            }
        }

        Commands::Ast { file } => {
            let source = fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let document = parse_document(&source).with_context(|| format!("Failed to parse {}", file.display()))?;
            println!("{}", serde_json::to_string_pretty(&document)?);
        }

        Commands::Types => {
            let registry = standard_registry()?;
            print!("{}", registry_listing(&registry));
        }

        Commands::Config => {
            print!("{}", config.to_toml()?);
        }
    }

    Ok(())
}

/// Install the global subscriber; `RUST_LOG` wins over the configured filter
fn init_logging(filter: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn compile(registry: &Registry, config: &Config) -> Result<Program> {
    let sources = load_sources(&config.sources.paths, &config.sources.extension)?;
    if sources.is_empty() {
        bail!("No .{} source files found", config.sources.extension);
    }
    Ok(Program::compile(registry, sources))
}

/// The requested entry point, or the only `dungeon_config` in the program
fn select_entry(program: &Program, requested: Option<&str>) -> Result<String> {
    if let Some(entry) = requested {
        return Ok(entry.to_string());
    }

    let config_type = DslType::Aggregate("dungeon_config".to_string());
    let candidates: Vec<&str> = program
        .entry_points()
        .entries()
        .filter(|entry| entry.ty == config_type)
        .map(|entry| entry.name.as_str())
        .collect();

    match candidates.as_slice() {
        [only] => Ok(only.to_string()),
        [] => Err(anyhow!("No dungeon_config definition found")),
        many => Err(anyhow!(
            "Several dungeon_config definitions found ({}); choose one with --entry",
            many.join(", ")
        )),
    }
}

fn registry_listing(registry: &Registry) -> String {
    let mut out = String::from("Types:\n");
    for descriptor in registry.types() {
        let ty = descriptor.dsl_type();
        out.push_str(&format!("  {} | {:?} | {}\n", ty.name(), ty.kind(), descriptor.host_name()));
    }

    if !registry.collection_types().is_empty() {
        out.push_str("Collections:\n");
        for ty in registry.collection_types() {
            out.push_str(&format!("  {} | {:?}\n", ty.name(), ty.kind()));
        }
    }

    out.push_str("Functions:\n");
    for function in registry.functions() {
        out.push_str(&format!("  {} | {}\n", function.name, function.dsl_type().name()));
    }
    out
}

fn print_config(entry: &str, config: &DungeonConfig, diagnostics: &[Diagnostic]) {
    let graph = &config.dependency_graph;
    println!("Configuration: {} ({})", config.display_name, entry);
    println!("Tasks: {}", graph.len());
    for task in graph.topological_order() {
        println!("  [{}] {}: {}", task.id, task.name, task.payload.describe());
    }
    if graph.edge_count() > 0 {
        println!("Dependencies:");
        for (dependent, dependency, kind) in graph.edges() {
            println!("  {} -> {} ({})", dependent, dependency, kind);
        }
    }
    if !diagnostics.is_empty() {
        println!("Diagnostics:");
        for diagnostic in diagnostics {
            println!("  {}", diagnostic);
        }
    }
}

fn render_json(entry: &str, config: &DungeonConfig, diagnostics: &[Diagnostic]) -> serde_json::Value {
    let graph = &config.dependency_graph;
    let tasks: Vec<serde_json::Value> = graph
        .topological_order()
        .into_iter()
        .map(|task| {
            let depends_on: Vec<&str> = graph.dependencies(&task.name).iter().map(|t| t.name.as_str()).collect();
            json!({
                "id": task.id,
                "name": task.name,
                "value": task.payload.describe(),
                "depends_on": depends_on,
            })
        })
        .collect();
    let edges: Vec<serde_json::Value> = graph
        .edges()
        .map(|(from, to, kind)| json!({ "from": from, "to": to, "type": kind }))
        .collect();
    let diagnostics: Vec<String> = diagnostics.iter().map(ToString::to_string).collect();

    json!({
        "entry": entry,
        "display_name": config.display_name,
        "tasks": tasks,
        "edges": edges,
        "diagnostics": diagnostics,
    })
}
