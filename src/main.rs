use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use std::collections::HashSet;
use std::io::{self, BufRead, Read, Write};
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use simlayout::config::{Number, Settings};
use simlayout::embedder::{Encoder, HashingEncoder};
use simlayout::reduce::{AlgorithmKind, LayoutReducer, TsneInit};
use simlayout::{files, store, Dataset, DocumentRecord};

#[derive(Parser)]
#[command(name = "simlayout")]
#[command(version)]
#[command(about = "Lay out documents in 2-D by embedding similarity", long_about = None)]
struct Cli {
    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Encode JSON lines {"id", "text"} from stdin into store records
    Embed {
        /// Append records to this store file instead of printing them
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Width of the hashed vectors
        #[arg(long)]
        dimensions: Option<usize>,
    },
    /// Reduce a store file to node positions and print them as JSON
    Layout {
        /// Store file; falls back to the configured path, then stdin
        path: Option<PathBuf>,

        #[arg(short, long)]
        algorithm: Option<AlgorithmKind>,

        #[arg(long)]
        perplexity: Option<Number>,

        #[arg(long)]
        learning_rate: Option<Number>,

        #[arg(long)]
        iterations: Option<usize>,

        /// Fix the t-SNE seed for reproducible output
        #[arg(long)]
        seed: Option<u64>,

        #[arg(long)]
        init: Option<TsneInit>,

        /// Multiplier applied to every coordinate
        #[arg(long)]
        scale: Option<Number>,
    },
    /// Validate a store file and report its shape
    Inspect {
        path: Option<PathBuf>,
    },
    /// Print the resolved configuration
    Config,
}

#[derive(Deserialize)]
struct EmbedInput {
    id: String,
    text: String,
}

fn init_tracing(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact().with_target(false).with_writer(io::stderr))
        .init();
}

fn load_dataset(path: Option<PathBuf>, settings: &Settings) -> Result<Dataset> {
    match path.or_else(|| settings.embeddings_path.as_ref().map(PathBuf::from)) {
        Some(path) => files::read_dataset(&path)
            .with_context(|| format!("Failed to load embeddings from '{}'", path.display())),
        None => {
            let mut text = String::new();
            io::stdin()
                .read_to_string(&mut text)
                .context("Failed to read embeddings from stdin")?;
            store::deserialize_str(&text).context("Failed to parse embeddings from stdin")
        }
    }
}

fn embed_command(
    settings: &Settings,
    output: Option<PathBuf>,
    dimensions: Option<usize>,
) -> Result<()> {
    let encoder = HashingEncoder::new(dimensions.unwrap_or(settings.dimensions))?;
    let stdin = io::stdin();
    let reader = stdin.lock();
    let mut added_ids = match &output {
        Some(path) => files::stored_ids(path)
            .with_context(|| format!("Failed to read existing ids from '{}'", path.display()))?,
        None => HashSet::new(),
    };

    reader.lines().try_for_each(|line_result| -> Result<()> {
        let line = line_result?;
        if line.trim().is_empty() {
            return Ok(());
        }
        let input: EmbedInput =
            serde_json::from_str(&line).context("Failed to parse JSON input")?;
        if added_ids.contains(&input.id) {
            warn!("Duplicate id '{}' found. Skipping.", input.id);
            return Ok(());
        }

        let record = DocumentRecord::new(input.id, encoder.encode(&input.text)?);
        match &output {
            Some(path) => files::append_records(path, std::slice::from_ref(&record))
                .with_context(|| format!("Failed to append to '{}'", path.display()))?,
            None => println!("{}", store::serialize_record(&record)?),
        }
        info!("Embedded '{}'", record.id);
        added_ids.insert(record.id);
        Ok(())
    })
}

#[allow(clippy::too_many_arguments)]
fn layout_command(
    mut settings: Settings,
    path: Option<PathBuf>,
    algorithm: Option<AlgorithmKind>,
    perplexity: Option<Number>,
    learning_rate: Option<Number>,
    iterations: Option<usize>,
    seed: Option<u64>,
    init: Option<TsneInit>,
    scale: Option<Number>,
) -> Result<()> {
    if let Some(algorithm) = algorithm {
        settings.algorithm = algorithm;
    }
    if let Some(perplexity) = perplexity {
        settings.tsne.perplexity = perplexity;
    }
    if let Some(learning_rate) = learning_rate {
        settings.tsne.learning_rate = learning_rate;
    }
    if let Some(iterations) = iterations {
        settings.tsne.iterations = iterations;
    }
    if seed.is_some() {
        settings.tsne.seed = seed;
    }
    if let Some(init) = init {
        settings.tsne.init = init;
    }
    if let Some(scale) = scale {
        settings.scale = scale;
    }

    let dataset = load_dataset(path, &settings)?;
    let layout = LayoutReducer::new(settings.reduction())
        .with_scale(settings.scale)
        .reduce(&dataset)
        .context("Failed to compute layout")?;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    layout.write_json_pretty(&mut out)?;
    writeln!(out)?;
    Ok(())
}

fn inspect_command(settings: &Settings, path: Option<PathBuf>) -> Result<()> {
    let dataset = load_dataset(path, settings)?;
    let output = serde_json::json!({
        "records": dataset.len(),
        "dimensions": dataset.dimensions(),
        "max_perplexity": dataset.len().saturating_sub(1),
    });
    println!("{}", serde_json::to_string(&output)?);
    Ok(())
}

fn config_command(settings: &Settings) -> Result<()> {
    settings.print_config();
    Ok(())
}

fn main() -> Result<()> {
    let args = Cli::parse();
    let settings = Settings::new()?;

    init_tracing(args.log_level.as_deref().unwrap_or(&settings.log_level));

    match args.command {
        Commands::Embed { output, dimensions } => embed_command(&settings, output, dimensions)?,
        Commands::Layout {
            path,
            algorithm,
            perplexity,
            learning_rate,
            iterations,
            seed,
            init,
            scale,
        } => layout_command(
            settings,
            path,
            algorithm,
            perplexity,
            learning_rate,
            iterations,
            seed,
            init,
            scale,
        )?,
        Commands::Inspect { path } => inspect_command(&settings, path)?,
        Commands::Config => config_command(&settings)?,
    }
    Ok(())
}
