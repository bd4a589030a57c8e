//! keel compiler CLI
//!
//! Reads a bound tree (JSON, as produced by the binder front end), lowers it
//! to the operation graph and reports diagnostics.

mod config;

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use config::{load_program, read, CliError, Config};
use keel_error::{DiagnosticRenderer, Diagnostics, SourceCache};
use keel_ir::{build_with_options, find_references, lint, DeclarationOperation, OperationGraph};
use keel_semantic::{BoundProgram, SemanticModel, SymbolKind};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Output format of `keel lower`
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
enum Format {
    /// Indented operation tree (default)
    #[default]
    Text,
    /// The graph serialized as JSON
    Json,
}

#[derive(Parser)]
#[command(name = "keel")]
#[command(version)]
#[command(about = "keel infrastructure compiler", long_about = None)]
struct Cli {
    /// More logging (-v info, -vv debug, -vvv trace); `KEEL_LOG` overrides
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// JSON configuration file
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Lowers a bound tree to its operation graph
    Lower {
        /// Bound tree (JSON)
        #[arg(value_name = "TREE")]
        input: PathBuf,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: Format,

        /// Source text, for diagnostic snippets
        #[arg(long, value_name = "FILE")]
        source: Option<PathBuf>,
    },

    /// Lists every reference to a declaration
    References {
        /// Bound tree (JSON)
        #[arg(value_name = "TREE")]
        input: PathBuf,

        /// Declaration name (`parent::child` for nested resources)
        name: String,
    },

    /// Runs the lint rules
    Lint {
        /// Bound tree (JSON)
        #[arg(value_name = "TREE")]
        input: PathBuf,

        /// Source text, for diagnostic snippets
        #[arg(long, value_name = "FILE")]
        source: Option<PathBuf>,
    },
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_env("KEEL_LOG").unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// A bound and lowered compilation unit
struct Unit {
    model: SemanticModel,
    graph: OperationGraph,
    /// Binding diagnostics followed by lowering diagnostics
    diagnostics: Diagnostics,
}

/// JSON shape of `keel lower --format json`
#[derive(Serialize)]
struct LoweredUnit<'a> {
    declarations: &'a [DeclarationOperation],
    diagnostics: &'a Diagnostics,
}

fn compile(program: &BoundProgram, config: &Config) -> Unit {
    let model = SemanticModel::bind(program);
    let graph = build_with_options(program, &model, &config.build);

    let mut diagnostics = model.diagnostics().clone();
    diagnostics.extend(graph.diagnostics().clone());
    Unit {
        model,
        graph,
        diagnostics,
    }
}

fn source_cache(source: Option<&Path>) -> Result<SourceCache, CliError> {
    let mut cache = SourceCache::new();
    if let Some(path) = source {
        cache.add(path.display().to_string(), read(path)?);
    }
    Ok(cache)
}

/// Prints diagnostics to stderr; the exit code reflects whether any is an error
fn report(diagnostics: &Diagnostics, cache: &SourceCache) -> ExitCode {
    let renderer = DiagnosticRenderer::new(cache);
    for diagnostic in diagnostics {
        eprintln!("{}", renderer.render(diagnostic));
    }
    if diagnostics.has_errors() {
        eprintln!("{} error(s) found", diagnostics.error_count());
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

fn run(cli: Cli) -> Result<ExitCode, CliError> {
    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Lower {
            input,
            format,
            source,
        } => {
            let program = load_program(&input)?;
            let unit = compile(&program, &config);
            match format {
                Format::Text => print!("{}", unit.graph),
                Format::Json => {
                    let lowered = LoweredUnit {
                        declarations: unit.graph.declarations(),
                        diagnostics: &unit.diagnostics,
                    };
                    println!("{}", serde_json::to_string_pretty(&lowered)?);
                }
            }
            Ok(report(&unit.diagnostics, &source_cache(source.as_deref())?))
        }

        Commands::References { input, name } => {
            let program = load_program(&input)?;
            let unit = compile(&program, &config);
            let symbol = unit
                .model
                .symbols()
                .find(|s| s.name == name && !matches!(s.kind, SymbolKind::Local { .. }))
                .cloned()
                .ok_or_else(|| CliError::UnknownSymbol(name.clone()))?;

            for reference in find_references(&unit.graph, &symbol) {
                match reference.index {
                    Some(kind) => println!("{} {} ({} index)", reference.span, reference.syntax, kind),
                    None => println!("{} {}", reference.span, reference.syntax),
                }
            }
            Ok(ExitCode::SUCCESS)
        }

        Commands::Lint { input, source } => {
            let program = load_program(&input)?;
            let unit = compile(&program, &config);
            let mut diagnostics = unit.diagnostics;
            diagnostics.extend(lint(&unit.graph, &config.lint));
            Ok(report(&diagnostics, &source_cache(source.as_deref())?))
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {}", err);
            ExitCode::from(2)
        }
    }
}
