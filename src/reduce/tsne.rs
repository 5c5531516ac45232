use rand::prelude::*;
use rand_distr::{Distribution, StandardNormal};
use rayon::prelude::*;
use statrs::statistics::Statistics;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info};

use super::pca::Pca;
use super::{DimensionReducer, Point};
use crate::config::Number;
use crate::error::{Error, Result};
use crate::record::Dataset;
use crate::vector_ops::squared_distance_simd;

const MACHINE_EPSILON: Number = Number::EPSILON;
/// Floor for a row's kernel sum while searching for its precision.
const MIN_KERNEL_SUM: Number = 1e-8;
const PERPLEXITY_TOLERANCE: Number = 1e-5;
const PERPLEXITY_STEPS: usize = 100;

const EXPLORATION_ITERATIONS: usize = 250;
const EXPLORATION_MOMENTUM: Number = 0.5;
const FINAL_MOMENTUM: Number = 0.8;
const MIN_GAIN: Number = 0.01;
const MIN_GRAD_NORM: Number = 1e-7;
const CHECK_INTERVAL: usize = 50;
const MAX_ITERATIONS_WITHOUT_PROGRESS: usize = 300;

const INIT_STD: Number = 1e-4;

/// How the low-dimensional embedding is seeded before optimisation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TsneInit {
    /// Gaussian noise with standard deviation 1e-4, drawn from the seed.
    Random,
    /// PCA projection rescaled so the first axis has standard deviation 1e-4.
    Pca,
}

impl FromStr for TsneInit {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "random" => Ok(TsneInit::Random),
            "pca" => Ok(TsneInit::Pca),
            other => Err(Error::invalid_parameter(
                "init",
                format!("unknown init '{}', expected one of: random, pca", other),
            )),
        }
    }
}

impl fmt::Display for TsneInit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TsneInit::Random => f.write_str("random"),
            TsneInit::Pca => f.write_str("pca"),
        }
    }
}

/// Parameters for exact t-SNE.
///
/// With `seed: None` a fresh seed is drawn on every run, so two runs over the
/// same input produce different (though similarly clustered) layouts. Set a
/// seed to make the output bit-identical across runs.
#[derive(Debug, Clone, PartialEq)]
pub struct TsneParams {
    pub perplexity: Number,
    pub learning_rate: Number,
    pub iterations: usize,
    pub early_exaggeration: Number,
    pub init: TsneInit,
    pub seed: Option<u64>,
}

impl Default for TsneParams {
    fn default() -> Self {
        Self {
            perplexity: 10.0,
            learning_rate: 200.0,
            iterations: 1000,
            early_exaggeration: 12.0,
            init: TsneInit::Random,
            seed: None,
        }
    }
}

impl TsneParams {
    /// Checks parameters against a dataset of `samples` records.
    pub fn validate(&self, samples: usize) -> Result<()> {
        if !(self.perplexity.is_finite() && self.perplexity > 0.0) {
            return Err(Error::invalid_parameter(
                "perplexity",
                format!("must be positive, got {}", self.perplexity),
            ));
        }
        if (samples as Number) <= self.perplexity {
            return Err(Error::InsufficientSamples {
                samples,
                perplexity: self.perplexity,
            });
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(Error::invalid_parameter(
                "learning_rate",
                format!("must be positive, got {}", self.learning_rate),
            ));
        }
        if self.iterations == 0 {
            return Err(Error::invalid_parameter("iterations", "must be at least 1"));
        }
        if !(self.early_exaggeration.is_finite() && self.early_exaggeration >= 1.0) {
            return Err(Error::invalid_parameter(
                "early_exaggeration",
                format!("must be at least 1, got {}", self.early_exaggeration),
            ));
        }
        Ok(())
    }
}

/// Exact t-SNE over the full pairwise affinity matrix.
///
/// Memory is O(N²); intended for note collections, not millions of points.
#[derive(Debug, Clone)]
pub struct Tsne {
    params: TsneParams,
}

impl Tsne {
    pub fn new(params: TsneParams) -> Self {
        Self { params }
    }
}

impl DimensionReducer for Tsne {
    fn name(&self) -> &'static str {
        "tsne"
    }

    fn fit_transform(&self, dataset: &Dataset) -> Result<Vec<Point>> {
        let params = &self.params;
        params.validate(dataset.len())?;

        let n = dataset.len();
        let seed = params.seed.unwrap_or_else(|| thread_rng().gen());
        info!(
            "t-SNE: perplexity {}, learning rate {}, {} iterations, seed {}",
            params.perplexity, params.learning_rate, params.iterations, seed
        );

        let distances = pairwise_squared_distances(dataset);
        let p = joint_probabilities(&distances, n, params.perplexity);
        drop(distances);

        let mut embedding = initial_embedding(dataset, params.init, seed);
        optimize(&p, &mut embedding, n, params);

        Ok(embedding.chunks_exact(2).map(|c| [c[0], c[1]]).collect())
    }
}

/// Dense row-major N×N matrix of squared Euclidean distances.
fn pairwise_squared_distances(dataset: &Dataset) -> Vec<Number> {
    let rows: Vec<&[Number]> = dataset.vectors().collect();
    let n = rows.len();
    let mut distances = vec![0.0; n * n];
    distances
        .par_chunks_mut(n)
        .enumerate()
        .for_each(|(i, out)| {
            for (j, d) in out.iter_mut().enumerate() {
                if i != j {
                    *d = squared_distance_simd(rows[i], rows[j]);
                }
            }
        });
    distances
}

/// Conditional probabilities P(j|i) with a per-row Gaussian precision chosen
/// by binary search so each row's entropy equals `ln(perplexity)`.
fn conditional_probabilities(distances: &[Number], n: usize, perplexity: Number) -> Vec<Number> {
    let desired_entropy = perplexity.ln();
    let mut conditional = vec![0.0; n * n];

    conditional
        .par_chunks_mut(n)
        .enumerate()
        .for_each(|(i, row)| {
            let dist = &distances[i * n..(i + 1) * n];
            let mut beta: Number = 1.0;
            let mut beta_min = Number::NEG_INFINITY;
            let mut beta_max = Number::INFINITY;

            for _ in 0..PERPLEXITY_STEPS {
                let mut sum_p = 0.0;
                for (j, p) in row.iter_mut().enumerate() {
                    *p = if j == i { 0.0 } else { (-dist[j] * beta).exp() };
                    sum_p += *p;
                }
                if sum_p == 0.0 {
                    sum_p = MIN_KERNEL_SUM;
                }

                let mut sum_dist_p = 0.0;
                for (p, d) in row.iter_mut().zip(dist) {
                    *p /= sum_p;
                    sum_dist_p += d * *p;
                }

                let entropy = sum_p.ln() + beta * sum_dist_p;
                let diff = entropy - desired_entropy;
                if diff.abs() <= PERPLEXITY_TOLERANCE {
                    break;
                }

                if diff > 0.0 {
                    beta_min = beta;
                    beta = if beta_max == Number::INFINITY {
                        beta * 2.0
                    } else {
                        (beta + beta_max) / 2.0
                    };
                } else {
                    beta_max = beta;
                    beta = if beta_min == Number::NEG_INFINITY {
                        beta / 2.0
                    } else {
                        (beta + beta_min) / 2.0
                    };
                }
            }
        });

    conditional
}

/// Symmetrised joint probabilities `(P(j|i) + P(i|j)) / Σ`, zero diagonal.
fn joint_probabilities(distances: &[Number], n: usize, perplexity: Number) -> Vec<Number> {
    let conditional = conditional_probabilities(distances, n, perplexity);

    let mut joint = vec![0.0; n * n];
    joint.par_chunks_mut(n).enumerate().for_each(|(i, row)| {
        for (j, p) in row.iter_mut().enumerate() {
            if i != j {
                *p = conditional[i * n + j] + conditional[j * n + i];
            }
        }
    });

    let total = joint.iter().sum::<Number>().max(MACHINE_EPSILON);
    joint.par_chunks_mut(n).enumerate().for_each(|(i, row)| {
        for (j, p) in row.iter_mut().enumerate() {
            if i != j {
                *p = (*p / total).max(MACHINE_EPSILON);
            }
        }
    });
    joint
}

/// Flat `[x0, y0, x1, y1, ...]` starting layout.
fn initial_embedding(dataset: &Dataset, init: TsneInit, seed: u64) -> Vec<Number> {
    if init == TsneInit::Pca {
        let points = Pca.fit(dataset).points;
        let std = points.iter().map(|p| p[0]).population_std_dev();
        if std.is_finite() && std > 0.0 {
            return points
                .iter()
                .flat_map(|p| [p[0] / std * INIT_STD, p[1] / std * INIT_STD])
                .collect();
        }
        debug!("PCA init has no spread, falling back to random init");
    }

    let mut rng = StdRng::seed_from_u64(seed);
    StandardNormal
        .sample_iter(&mut rng)
        .take(dataset.len() * 2)
        .map(|x: Number| x * INIT_STD)
        .collect()
}

/// Gradient descent with momentum and adaptive gains, in two phases: an
/// exploration phase under early exaggeration, then the main phase.
fn optimize(p: &[Number], embedding: &mut [Number], n: usize, params: &TsneParams) {
    let exploration = EXPLORATION_ITERATIONS.min(params.iterations);

    let exaggerated: Vec<Number> = p.iter().map(|x| x * params.early_exaggeration).collect();
    let completed = descend(
        &exaggerated,
        embedding,
        n,
        Phase {
            start: 0,
            end: exploration,
            momentum: EXPLORATION_MOMENTUM,
            learning_rate: params.learning_rate,
            patience: EXPLORATION_ITERATIONS,
        },
    );
    drop(exaggerated);
    debug!("t-SNE exploration phase finished after {} iterations", completed);

    if params.iterations > exploration {
        let completed = descend(
            p,
            embedding,
            n,
            Phase {
                start: exploration,
                end: params.iterations,
                momentum: FINAL_MOMENTUM,
                learning_rate: params.learning_rate,
                patience: MAX_ITERATIONS_WITHOUT_PROGRESS,
            },
        );
        debug!("t-SNE optimisation finished after {} iterations", completed);
    }
}

struct Phase {
    start: usize,
    end: usize,
    momentum: Number,
    learning_rate: Number,
    patience: usize,
}

/// Runs one optimisation phase; returns the last iteration index reached.
fn descend(p: &[Number], embedding: &mut [Number], n: usize, phase: Phase) -> usize {
    let mut update: Vec<Number> = vec![0.0; embedding.len()];
    let mut gains: Vec<Number> = vec![1.0; embedding.len()];
    let mut best_error = Number::INFINITY;
    let mut best_iteration = phase.start;
    let mut iteration = phase.start;

    while iteration < phase.end {
        let check = (iteration + 1) % CHECK_INTERVAL == 0;
        let (error, mut grad) = kl_gradient(p, embedding, n, check);

        for ((g, u), gain) in grad.iter_mut().zip(&update).zip(gains.iter_mut()) {
            *gain = if *u * *g < 0.0 { *gain + 0.2 } else { *gain * 0.8 };
            *gain = gain.max(MIN_GAIN);
            *g *= *gain;
        }
        for ((e, u), g) in embedding.iter_mut().zip(update.iter_mut()).zip(&grad) {
            *u = phase.momentum * *u - phase.learning_rate * g;
            *e += *u;
        }

        let grad_norm = grad.iter().map(|g| g * g).sum::<Number>().sqrt();
        iteration += 1;

        if check {
            debug!(
                "t-SNE iteration {}: KL divergence {:.6}, gradient norm {:.3e}",
                iteration, error, grad_norm
            );
            if error < best_error {
                best_error = error;
                best_iteration = iteration;
            } else if iteration - best_iteration > phase.patience {
                debug!(
                    "t-SNE stopped after {} iterations without progress",
                    phase.patience
                );
                break;
            }
        }
        if grad_norm < MIN_GRAD_NORM {
            debug!("t-SNE gradient norm {:.3e} below threshold", grad_norm);
            break;
        }
    }
    iteration
}

/// Gradient of KL(P || Q) with a Student-t kernel, and the divergence itself
/// when `with_error` is set.
fn kl_gradient(
    p: &[Number],
    embedding: &[Number],
    n: usize,
    with_error: bool,
) -> (Number, Vec<Number>) {
    // Unnormalised kernel 1 / (1 + |yi - yj|²), zero diagonal.
    let mut kernel = vec![0.0; n * n];
    kernel.par_chunks_mut(n).enumerate().for_each(|(i, row)| {
        let (xi, yi) = (embedding[2 * i], embedding[2 * i + 1]);
        for (j, q) in row.iter_mut().enumerate() {
            if i != j {
                let dx = xi - embedding[2 * j];
                let dy = yi - embedding[2 * j + 1];
                *q = 1.0 / (1.0 + dx * dx + dy * dy);
            }
        }
    });

    // Row sums in parallel, total in a fixed order.
    let row_sums: Vec<Number> = kernel
        .par_chunks(n)
        .map(|row| row.iter().sum::<Number>())
        .collect();
    let total = row_sums.iter().sum::<Number>().max(MACHINE_EPSILON);

    let mut grad = vec![0.0; 2 * n];
    grad.par_chunks_mut(2).enumerate().for_each(|(i, g)| {
        let (xi, yi) = (embedding[2 * i], embedding[2 * i + 1]);
        let mut gx = 0.0;
        let mut gy = 0.0;
        for j in 0..n {
            if i == j {
                continue;
            }
            let k = kernel[i * n + j];
            let coeff = (p[i * n + j] - k / total) * k;
            gx += coeff * (xi - embedding[2 * j]);
            gy += coeff * (yi - embedding[2 * j + 1]);
        }
        g[0] = 4.0 * gx;
        g[1] = 4.0 * gy;
    });

    let error = if with_error {
        let row_errors: Vec<Number> = (0..n)
            .into_par_iter()
            .map(|i| {
                (0..n)
                    .filter(|&j| j != i)
                    .map(|j| {
                        let pij = p[i * n + j];
                        let qij = (kernel[i * n + j] / total).max(MACHINE_EPSILON);
                        pij * (pij.max(MACHINE_EPSILON) / qij).ln()
                    })
                    .sum::<Number>()
            })
            .collect();
        row_errors.iter().sum()
    } else {
        Number::NAN
    };

    (error, grad)
}
