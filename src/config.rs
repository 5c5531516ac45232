use anyhow::{Context, Result};
use config::{Config, ConfigError, Environment, File as ConfigFile};
use serde::Deserialize;

use crate::reduce::{Algorithm, AlgorithmKind, TsneInit, TsneParams};

pub type Number = f64;

pub const EPSILON: Number = 1e-12;

/// Multiplier applied to every reduced coordinate before it is emitted.
pub const DEFAULT_SCALE: Number = 100.0;
/// Width of vectors produced by the hashing encoder.
pub const DEFAULT_DIMENSIONS: usize = 768;

const CONFIG_FILE: &str = "simlayout_config";
const ENV_PREFIX: &str = "SIMLAYOUT";

#[derive(Deserialize)]
pub struct LayoutConfig {
    pub embeddings_path: Option<String>,
    pub algorithm: Option<String>,
    pub perplexity: Option<Number>,
    pub learning_rate: Option<Number>,
    pub iterations: Option<usize>,
    pub early_exaggeration: Option<Number>,
    pub init: Option<String>,
    pub seed: Option<u64>,
    pub scale: Option<Number>,
    pub dimensions: Option<usize>,
    pub log_level: Option<String>,
}

impl LayoutConfig {
    pub fn try_from(config: &Config) -> Result<Self, ConfigError> {
        Ok(LayoutConfig {
            embeddings_path: config.get("embeddings_path").ok(),
            algorithm: config.get("algorithm").ok(),
            perplexity: config.get("perplexity").ok(),
            learning_rate: config.get("learning_rate").ok(),
            iterations: config.get("iterations").ok(),
            early_exaggeration: config.get("early_exaggeration").ok(),
            init: config.get("init").ok(),
            seed: config.get("seed").ok(),
            scale: config.get("scale").ok(),
            dimensions: config.get("dimensions").ok(),
            log_level: config.get("log_level").ok(),
        })
    }
}

/// Resolved pipeline settings: config file, then environment, then defaults.
#[derive(Debug, Clone)]
pub struct Settings {
    pub embeddings_path: Option<String>,
    pub algorithm: AlgorithmKind,
    pub tsne: TsneParams,
    pub scale: Number,
    pub dimensions: usize,
    pub log_level: String,
}

impl Settings {
    pub fn new() -> Result<Self> {
        let config = Config::builder()
            .add_source(ConfigFile::with_name(CONFIG_FILE).required(false))
            .add_source(Environment::with_prefix(ENV_PREFIX))
            .build()
            .context("Failed to load configuration")?;
        Self::from_config(&config)
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let raw = LayoutConfig::try_from(config)?;
        let defaults = TsneParams::default();

        let algorithm = match raw.algorithm {
            Some(name) => name
                .parse()
                .with_context(|| format!("Invalid algorithm '{}' in configuration", name))?,
            None => AlgorithmKind::Tsne,
        };

        let init = match raw.init {
            Some(name) => name
                .parse()
                .with_context(|| format!("Invalid t-SNE init '{}' in configuration", name))?,
            None => defaults.init,
        };

        let tsne = TsneParams {
            perplexity: raw.perplexity.unwrap_or(defaults.perplexity),
            learning_rate: raw.learning_rate.unwrap_or(defaults.learning_rate),
            iterations: raw.iterations.unwrap_or(defaults.iterations),
            early_exaggeration: raw
                .early_exaggeration
                .unwrap_or(defaults.early_exaggeration),
            init,
            seed: raw.seed,
        };

        let dimensions = raw.dimensions.unwrap_or(DEFAULT_DIMENSIONS);
        if dimensions == 0 {
            anyhow::bail!("SIMLAYOUT_DIMENSIONS must be at least 1.");
        }

        Ok(Self {
            embeddings_path: raw.embeddings_path,
            algorithm,
            tsne,
            scale: raw.scale.unwrap_or(DEFAULT_SCALE),
            dimensions,
            log_level: raw.log_level.unwrap_or_else(|| "info".to_string()),
        })
    }

    /// Reduction algorithm with its parameters, as selected by these settings.
    pub fn reduction(&self) -> Algorithm {
        match self.algorithm {
            AlgorithmKind::Pca => Algorithm::LinearProjection,
            AlgorithmKind::Tsne => Algorithm::StochasticNeighborEmbedding(self.tsne.clone()),
        }
    }

    pub fn print_config(&self) {
        println!(
            "embeddings_path={}",
            self.embeddings_path.as_deref().unwrap_or("<stdin>")
        );
        println!("algorithm={}", self.algorithm);
        println!("perplexity={}", self.tsne.perplexity);
        println!("learning_rate={}", self.tsne.learning_rate);
        println!("iterations={}", self.tsne.iterations);
        println!("early_exaggeration={}", self.tsne.early_exaggeration);
        println!("init={}", self.tsne.init);
        match self.tsne.seed {
            Some(seed) => println!("seed={}", seed),
            None => println!("seed=<random>"),
        }
        println!("scale={}", self.scale);
        println!("dimensions={}", self.dimensions);
        println!("log_level={}", self.log_level);
    }
}
