//! Dimensionality reduction from embedding space to graph coordinates.

mod pca;
mod tsne;

pub use pca::{Pca, PcaFit};
pub use tsne::{Tsne, TsneInit, TsneParams};

use crate::config::{Number, DEFAULT_SCALE};
use crate::error::{Error, Result};
use crate::record::{Dataset, Layout, NodePosition};
use std::fmt;
use std::str::FromStr;
use std::time::Instant;
use tracing::{debug, info};

/// Unscaled reduced coordinate.
pub type Point = [Number; 2];

/// Contract for dimensionality reduction backends.
///
/// Implementations must return exactly one point per input record, in input
/// order.
pub trait DimensionReducer {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Fit on the whole dataset and return 2D projections for all records.
    fn fit_transform(&self, dataset: &Dataset) -> Result<Vec<Point>>;
}

/// Algorithm selector as it appears on the command line and in config.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlgorithmKind {
    Pca,
    Tsne,
}

impl FromStr for AlgorithmKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "pca" | "linear-projection" => Ok(AlgorithmKind::Pca),
            "tsne" | "t-sne" | "stochastic-neighbor-embedding" => Ok(AlgorithmKind::Tsne),
            other => Err(Error::invalid_parameter(
                "algorithm",
                format!("unknown method '{}', expected one of: pca, tsne", other),
            )),
        }
    }
}

impl fmt::Display for AlgorithmKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlgorithmKind::Pca => f.write_str("pca"),
            AlgorithmKind::Tsne => f.write_str("tsne"),
        }
    }
}

/// A reduction algorithm together with its parameters.
#[derive(Debug, Clone)]
pub enum Algorithm {
    /// Principal-component projection. Deterministic.
    LinearProjection,
    /// Exact t-SNE. Non-deterministic unless `TsneParams::seed` is set.
    StochasticNeighborEmbedding(TsneParams),
}

impl Algorithm {
    pub fn reducer(&self) -> Box<dyn DimensionReducer> {
        match self {
            Algorithm::LinearProjection => Box::new(Pca),
            Algorithm::StochasticNeighborEmbedding(params) => Box::new(Tsne::new(params.clone())),
        }
    }
}

/// Runs a reduction and turns its output into scaled node positions.
#[derive(Debug, Clone)]
pub struct LayoutReducer {
    algorithm: Algorithm,
    scale: Number,
}

impl LayoutReducer {
    pub fn new(algorithm: Algorithm) -> Self {
        Self {
            algorithm,
            scale: DEFAULT_SCALE,
        }
    }

    pub fn with_scale(mut self, scale: Number) -> Self {
        self.scale = scale;
        self
    }

    pub fn scale(&self) -> Number {
        self.scale
    }

    /// Reduce the whole dataset and emit one position per record, in order.
    pub fn reduce(&self, dataset: &Dataset) -> Result<Layout> {
        if !self.scale.is_finite() {
            return Err(Error::invalid_parameter(
                "scale",
                format!("must be finite, got {}", self.scale),
            ));
        }

        let reducer = self.algorithm.reducer();
        info!(
            "{} reduction: {} records of dimension {}",
            reducer.name(),
            dataset.len(),
            dataset.dimensions()
        );

        let start = Instant::now();
        let points = reducer.fit_transform(dataset)?;
        let fit_ms = start.elapsed().as_millis() as u64;

        info!(
            "{} fit complete: {} points in {}ms",
            reducer.name(),
            points.len(),
            fit_ms
        );

        scale_positions(dataset, &points, self.scale)
    }
}

/// Pairs each reduced point with its record id and multiplies by `scale`.
pub fn scale_positions(dataset: &Dataset, points: &[Point], scale: Number) -> Result<Layout> {
    if points.len() != dataset.len() {
        return Err(Error::invalid_parameter(
            "points",
            format!(
                "reducer returned {} points for {} records",
                points.len(),
                dataset.len()
            ),
        ));
    }

    let node_positions = dataset
        .ids()
        .zip(points)
        .map(|(id, [x, y])| NodePosition {
            id: id.to_string(),
            x: x * scale,
            y: y * scale,
        })
        .collect::<Vec<_>>();

    debug!("Scaled {} positions by {}", node_positions.len(), scale);
    Ok(Layout { node_positions })
}
