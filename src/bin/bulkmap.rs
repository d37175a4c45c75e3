//! bulkmap CLI - convert source records with a mapping and rehearse imports
//!
//! Logging goes to stderr and is configured with `BULKMAP_LOG` (default `info`).

use clap::{Parser, Subcommand};
use indexmap::IndexMap;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use bulkmap::import::{
    CheckLog, FailurePolicy, ImportConfig, ImportOrchestrator, JsonlCheckLog, MemoryCheckLog, MemoryGateway,
    VecReader,
};
use bulkmap::mapping::{DirectoryLoader, Mapping, MappingBuilder, MappingSource};
use bulkmap::serialization::{JsonArrayWriter, NdjsonWriter};
use bulkmap::{FilterRegistry, MetaMapper, SourceReader};

#[derive(Parser)]
#[command(name = "bulkmap")]
#[command(version, about = "Declarative record mapping and three-pass bulk import", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert records with a mapping and print the resources
    Convert {
        /// Mapping file (ini, xml, json or yaml)
        #[arg(short, long)]
        mapping: PathBuf,

        /// Records: a JSON array or NDJSON
        #[arg(short, long)]
        input: PathBuf,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Write one JSON array instead of NDJSON
        #[arg(long)]
        array: bool,

        /// Extra parameter visible to patterns, as key=value
        #[arg(short, long = "param", value_parser = parse_param)]
        params: Vec<(String, String)>,
    },

    /// Validate mapping files without converting anything
    Validate {
        /// Mapping files
        #[arg(required = true)]
        mappings: Vec<PathBuf>,
    },

    /// Run the listing and checking passes only
    Check {
        #[arg(short, long)]
        mapping: PathBuf,

        #[arg(short, long)]
        input: PathBuf,

        /// Import configuration (YAML)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Store checkpoints in this JSON Lines file
        #[arg(long)]
        checkpoints: Option<PathBuf>,
    },

    /// Run a full import into an in-memory store and print what was stored
    Import {
        #[arg(short, long)]
        mapping: PathBuf,

        #[arg(short, long)]
        input: PathBuf,

        /// Import configuration (YAML)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Store checkpoints in this JSON Lines file
        #[arg(long)]
        checkpoints: Option<PathBuf>,

        /// Commit from the existing checkpoints instead of checking again
        #[arg(long, requires = "checkpoints")]
        resume: bool,

        /// Output file for stored resources (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn parse_param(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{}'", raw))?;
    Ok((key.trim().to_string(), value.to_string()))
}

fn main() {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_env("BULKMAP_LOG").unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Convert {
            mapping,
            input,
            output,
            array,
            params,
        } => convert(mapping, input, output, array, params),
        Commands::Validate { mappings } => validate(mappings),
        Commands::Check {
            mapping,
            input,
            config,
            checkpoints,
        } => check(mapping, input, config, checkpoints),
        Commands::Import {
            mapping,
            input,
            config,
            checkpoints,
            resume,
            output,
        } => import(mapping, input, config, checkpoints, resume, output),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

/// Build a mapping from a file, resolving includes next to it.
fn load_mapping(path: &Path) -> Result<Mapping, String> {
    let source = MappingSource::from_file(path)?;
    let base = path.parent().map(Path::to_path_buf).unwrap_or_default();
    let loader = DirectoryLoader::new(base);
    let name = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "mapping".to_string());

    Ok(MappingBuilder::new().with_loader(&loader).build(&name, source))
}

fn load_mapper(path: &Path) -> Result<MetaMapper, String> {
    let mapping = load_mapping(path)?;
    if let Some(error) = &mapping.has_error {
        return Err(format!("Mapping {} is invalid: {}", path.display(), error));
    }
    Ok(MetaMapper::new(Arc::new(mapping), Arc::new(FilterRegistry::with_builtins())))
}

fn load_config(path: Option<PathBuf>) -> Result<ImportConfig, String> {
    let config = match path {
        Some(path) => ImportConfig::load_from_file(&path)?,
        None => ImportConfig::default(),
    };
    config.validate()?;
    Ok(config)
}

fn open_output(output: Option<PathBuf>) -> Result<Box<dyn Write>, String> {
    match output {
        Some(path) => {
            let file = File::create(&path)
                .map_err(|e| format!("Failed to create {}: {}", path.display(), e))?;
            Ok(Box::new(BufWriter::new(file)))
        }
        None => Ok(Box::new(BufWriter::new(io::stdout()))),
    }
}

fn convert(
    mapping: PathBuf,
    input: PathBuf,
    output: Option<PathBuf>,
    array: bool,
    params: Vec<(String, String)>,
) -> Result<(), String> {
    let mapper = load_mapper(&mapping)?.with_params(params.into_iter().collect::<IndexMap<_, _>>());
    let reader = VecReader::from_file(&input)?;
    let out = open_output(output)?;

    let mut converted = 0;
    let mut empty = 0;
    if array {
        let mut writer = JsonArrayWriter::new(out).map_err(|e| e.to_string())?;
        for record in reader.records() {
            let resource = mapper.convert(&record);
            if resource.is_empty() {
                empty += 1;
            }
            writer.write(&resource).map_err(|e| e.to_string())?;
            converted += 1;
        }
        writer.finish().map_err(|e| e.to_string())?;
    } else {
        let mut writer = NdjsonWriter::new(out);
        for record in reader.records() {
            let resource = mapper.convert(&record);
            if resource.is_empty() {
                empty += 1;
            }
            writer.write(&resource).map_err(|e| e.to_string())?;
        }
        converted = writer.written();
        writer.flush().map_err(|e| e.to_string())?;
    }

    tracing::info!(mapping = %mapping.display(), converted, empty, "Conversion finished");
    Ok(())
}

fn validate(mappings: Vec<PathBuf>) -> Result<(), String> {
    let mut invalid = 0;
    for path in &mappings {
        let mapping = load_mapping(path)?;
        match &mapping.has_error {
            None => println!("✓ {}: {} entries", path.display(), mapping.default.len() + mapping.maps.len()),
            Some(error) => {
                println!("✗ {}: {}", path.display(), error);
                invalid += 1;
            }
        }
    }

    if invalid > 0 {
        return Err(format!("{} of {} mappings are invalid", invalid, mappings.len()));
    }
    Ok(())
}

fn open_check_log(checkpoints: Option<PathBuf>) -> Result<Box<dyn CheckLog>, String> {
    match checkpoints {
        Some(path) => {
            let log = JsonlCheckLog::open(&path).map_err(|e| format!("Failed to open {}: {}", path.display(), e))?;
            Ok(Box::new(log))
        }
        None => Ok(Box::new(MemoryCheckLog::new())),
    }
}

fn check(
    mapping: PathBuf,
    input: PathBuf,
    config: Option<PathBuf>,
    checkpoints: Option<PathBuf>,
) -> Result<(), String> {
    let config = load_config(config)?.with_policy(FailurePolicy::DryRun);
    let mapper = load_mapper(&mapping)?;
    let reader = VecReader::from_file(&input)?;
    let mut gateway = MemoryGateway::new(config.identifier_names.clone());
    let mut check_log = open_check_log(checkpoints)?;

    let report = ImportOrchestrator::new(config, mapper, &reader, &mut gateway, check_log.as_mut())
        .run()
        .map_err(|e| e.to_string())?;

    let json = serde_json::to_string_pretty(&report).map_err(|e| e.to_string())?;
    println!("{}", json);

    let errors = report.passes.iter().map(|pass| pass.errors).max().unwrap_or(0);
    if errors > 0 {
        return Err(format!("{} rows have errors", errors));
    }
    Ok(())
}

fn import(
    mapping: PathBuf,
    input: PathBuf,
    config: Option<PathBuf>,
    checkpoints: Option<PathBuf>,
    resume: bool,
    output: Option<PathBuf>,
) -> Result<(), String> {
    let config = load_config(config)?;
    let mapper = load_mapper(&mapping)?;
    let reader = VecReader::from_file(&input)?;
    let mut gateway = MemoryGateway::new(config.identifier_names.clone());
    let mut check_log = open_check_log(checkpoints)?;

    let report = {
        let mut orchestrator =
            ImportOrchestrator::new(config, mapper, &reader, &mut gateway, check_log.as_mut());
        let result = if resume {
            orchestrator.resume_commit()
        } else {
            orchestrator.run()
        };
        result.map_err(|e| e.to_string())?
    };

    let mut writer = NdjsonWriter::new(open_output(output)?);
    for (_, resource) in gateway.entities() {
        writer.write(resource).map_err(|e| e.to_string())?;
    }
    writer.flush().map_err(|e| e.to_string())?;

    let json = serde_json::to_string_pretty(&report).map_err(|e| e.to_string())?;
    eprintln!("{}", json);
    Ok(())
}
