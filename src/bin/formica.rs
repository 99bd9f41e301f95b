//! Formica CLI
//!
//! Inspect how a schema is prepared and what form model it produces for a
//! given data document.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use formica::{
    load_data, load_schema, prepare_static, run_pipeline, CombinatorSelections, PipelineConfig,
};
use serde_json::Value;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "formica")]
#[command(about = "Build reactive form models from JSON Schema")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the schema after the static stages (normalize, refs, allOf)
    Prepare {
        /// Schema file
        schema: PathBuf,

        /// Output file (stdout if not specified)
        #[arg(long)]
        output: Option<PathBuf>,

        /// Pretty-print JSON output
        #[arg(long)]
        pretty: bool,
    },

    /// Run the full pipeline and print the resulting form model
    Build {
        /// Schema file
        schema: PathBuf,

        /// Instance data file (absent data if not specified)
        #[arg(long)]
        data: Option<PathBuf>,

        /// Pin a oneOf/anyOf branch, as POINTER=INDEX (use "=1" for the root)
        #[arg(long = "select", value_parser = parse_selection)]
        selections: Vec<(String, usize)>,

        /// Attach validation errors to failing fields
        #[arg(long)]
        validate: bool,

        /// Print the flat path index instead of the nested tree
        #[arg(long)]
        index: bool,

        /// Output file (stdout if not specified)
        #[arg(long)]
        output: Option<PathBuf>,

        /// Pretty-print JSON output
        #[arg(long)]
        pretty: bool,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Prepare {
            schema,
            output,
            pretty,
        } => run_prepare(schema, output, pretty),

        Commands::Build {
            schema,
            data,
            selections,
            validate,
            index,
            output,
            pretty,
        } => run_build(BuildArgs {
            schema,
            data,
            selections,
            validate,
            index,
            output,
            pretty,
        }),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(code) => ExitCode::from(code),
    }
}

fn run_prepare(schema_path: PathBuf, output: Option<PathBuf>, pretty: bool) -> Result<(), u8> {
    let schema = load_schema(&schema_path).map_err(|e| {
        eprintln!("Error: {}", e);
        e.exit_code() as u8
    })?;

    let prepared = prepare_static(&schema, &PipelineConfig::default()).map_err(|e| {
        eprintln!("Error: {}", e);
        e.exit_code() as u8
    })?;

    write_output(&prepared.schema, output, pretty)
}

struct BuildArgs {
    schema: PathBuf,
    data: Option<PathBuf>,
    selections: Vec<(String, usize)>,
    validate: bool,
    index: bool,
    output: Option<PathBuf>,
    pretty: bool,
}

fn run_build(args: BuildArgs) -> Result<(), u8> {
    let schema = load_schema(&args.schema).map_err(|e| {
        eprintln!("Error: {}", e);
        e.exit_code() as u8
    })?;

    let data = args
        .data
        .as_deref()
        .map(load_data)
        .transpose()
        .map_err(|e| {
            eprintln!("Error loading data: {}", e);
            e.exit_code() as u8
        })?;

    let config = build_config(args.validate)?;
    let selections: CombinatorSelections = args.selections.into_iter().collect();

    let model = run_pipeline(&schema, data.as_ref(), &config, &selections).map_err(|e| {
        eprintln!("Error: {}", e);
        e.exit_code() as u8
    })?;

    let rendered = if args.index {
        serde_json::to_value(&model).map_err(|e| {
            eprintln!("Error serializing output: {}", e);
            2u8
        })?
    } else {
        model.to_tree_json()
    };

    write_output(&rendered, args.output, args.pretty)
}

#[cfg(feature = "validation")]
fn build_config(validate: bool) -> Result<PipelineConfig, u8> {
    let config = PipelineConfig::new();
    Ok(if validate {
        config.with_enrichment(formica::validation_enrichment())
    } else {
        config
    })
}

#[cfg(not(feature = "validation"))]
fn build_config(validate: bool) -> Result<PipelineConfig, u8> {
    if validate {
        eprintln!("Error: --validate requires the `validation` feature");
        return Err(2);
    }
    Ok(PipelineConfig::new())
}

fn parse_selection(raw: &str) -> Result<(String, usize), String> {
    let (path, index) = raw
        .rsplit_once('=')
        .ok_or_else(|| format!("expected POINTER=INDEX, got \"{}\"", raw))?;
    if !path.is_empty() && !path.starts_with('/') {
        return Err(format!("\"{}\" is not a JSON Pointer", path));
    }
    let index = index
        .parse::<usize>()
        .map_err(|_| format!("\"{}\" is not a branch index", index))?;
    Ok((path.to_string(), index))
}

fn write_output(value: &Value, output: Option<PathBuf>, pretty: bool) -> Result<(), u8> {
    let json_output = if pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    }
    .map_err(|e| {
        eprintln!("Error serializing output: {}", e);
        2u8
    })?;

    match output {
        Some(path) => {
            std::fs::write(&path, &json_output).map_err(|e| {
                eprintln!("Error writing to {}: {}", path.display(), e);
                3u8
            })?;
        }
        None => {
            println!("{}", json_output);
        }
    }

    Ok(())
}
