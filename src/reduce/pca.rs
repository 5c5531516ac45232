use rand::prelude::*;
use rand_distr::{Distribution, StandardNormal};
use statrs::statistics::Statistics;
use tracing::debug;

use super::{DimensionReducer, Point};
use crate::config::Number;
use crate::error::Result;
use crate::record::Dataset;
use crate::vector_ops::{dot_simd, norm};

const SEED: u64 = 42;
const MAX_ITERATIONS: usize = 1000;
/// Largest per-column drift of the block between two iterations at which it
/// counts as converged.
const CONVERGENCE_TOLERANCE: Number = 1e-14;
/// Share of the total variance below which a direction carries nothing.
const RELATIVE_TOLERANCE: Number = 1e-12;
const COMPONENTS: usize = 2;

/// Principal-component projection onto the two directions of maximal
/// variance.
///
/// A two-column block is driven into the dominant eigenspace of the covariance
/// by subspace iteration, applied implicitly as `Xᵀ(Xv)` so no D×D matrix is
/// ever built. A final Rayleigh-Ritz step rotates the block onto the exact
/// eigenvectors it spans, so the axes come out in descending variance even
/// when the top two variances nearly tie. Start vectors are drawn from a fixed
/// seed and every component's sign is normalised, which makes the output
/// identical across runs. All thresholds are relative to the data's total
/// variance, so scaling the input only scales the output.
#[derive(Debug, Clone, Copy, Default)]
pub struct Pca;

/// Result of a principal-component fit.
#[derive(Debug, Clone)]
pub struct PcaFit {
    /// Projected coordinates, one per record.
    pub points: Vec<Point>,
    /// Unit-length principal axes in input space, by descending variance.
    pub components: Vec<Vec<Number>>,
    /// Variance captured by each component.
    pub explained_variance: Vec<Number>,
    /// Total variance of the centred data.
    pub total_variance: Number,
}

impl Pca {
    pub fn fit(&self, dataset: &Dataset) -> PcaFit {
        let n = dataset.len();
        let dims = dataset.dimensions();
        if n == 0 {
            return PcaFit {
                points: Vec::new(),
                components: Vec::new(),
                explained_variance: Vec::new(),
                total_variance: 0.0,
            };
        }

        let rows: Vec<&[Number]> = dataset.vectors().collect();
        let means: Vec<Number> = (0..dims)
            .map(|j| rows.iter().map(|row| row[j]).mean())
            .collect();
        let centered: Vec<Vec<Number>> = rows
            .iter()
            .map(|row| row.iter().zip(&means).map(|(x, m)| x - m).collect())
            .collect();

        let total_variance = if n > 1 {
            (0..dims)
                .map(|j| centered.iter().map(|row| row[j]).variance())
                .sum()
        } else {
            0.0
        };

        let mut rng = StdRng::seed_from_u64(SEED);
        let rank = COMPONENTS.min(dims);
        let block = principal_subspace(
            &centered,
            dims,
            rank,
            total_variance * RELATIVE_TOLERANCE,
            &mut rng,
        );
        let (mut components, mut explained_variance) = rayleigh_ritz(&centered, dims, &block);
        for component in components.iter_mut() {
            flip_sign(component);
        }
        // Fewer input dimensions than output ones: the extra axis carries nothing.
        while components.len() < COMPONENTS {
            components.push(vec![0.0; dims]);
            explained_variance.push(0.0);
        }

        for (k, variance) in explained_variance.iter().enumerate() {
            debug!(
                "PCA component {}: variance {:.6e} ({:.2}% of total)",
                k,
                variance,
                if total_variance > 0.0 {
                    100.0 * variance / total_variance
                } else {
                    0.0
                }
            );
        }

        let points = centered
            .iter()
            .map(|row| {
                [
                    dot_simd(row, &components[0]),
                    dot_simd(row, &components[1]),
                ]
            })
            .collect();

        PcaFit {
            points,
            components,
            explained_variance,
            total_variance,
        }
    }
}

impl DimensionReducer for Pca {
    fn name(&self) -> &'static str {
        "pca"
    }

    fn fit_transform(&self, dataset: &Dataset) -> Result<Vec<Point>> {
        Ok(self.fit(dataset).points)
    }
}

/// Covariance times `v`, computed as `Xᵀ(Xv) / (n - 1)`.
fn covariance_apply(centered: &[Vec<Number>], dims: usize, v: &[Number]) -> Vec<Number> {
    let denom = (centered.len().max(2) - 1) as Number;
    let mut out = vec![0.0; dims];
    for row in centered {
        let coeff = dot_simd(row, v);
        for (o, x) in out.iter_mut().zip(row) {
            *o += coeff * x;
        }
    }
    for o in out.iter_mut() {
        *o /= denom;
    }
    out
}

/// Orthonormal basis of the `rank` most dominant covariance directions.
fn principal_subspace(
    centered: &[Vec<Number>],
    dims: usize,
    rank: usize,
    floor: Number,
    rng: &mut StdRng,
) -> Vec<Vec<Number>> {
    let start: Vec<Vec<Number>> = (0..rank)
        .map(|_| {
            StandardNormal
                .sample_iter(&mut *rng)
                .take(dims)
                .collect::<Vec<Number>>()
        })
        .collect();
    let mut block = orthonormalize(start, &[], 0.0);

    for iteration in 0..MAX_ITERATIONS {
        let applied: Vec<Vec<Number>> = block
            .iter()
            .map(|q| covariance_apply(centered, dims, q))
            .collect();
        let next = orthonormalize(applied, &block, floor);
        let drift = next
            .iter()
            .map(|v| {
                let kept: Number = block.iter().map(|q| dot_simd(v, q).powi(2)).sum();
                1.0 - kept
            })
            .fold(0.0, Number::max);
        block = next;
        if drift < CONVERGENCE_TOLERANCE {
            debug!("PCA subspace converged after {} iterations", iteration + 1);
            break;
        }
    }
    block
}

/// Gram-Schmidt over `columns`. A column whose remainder is at most `floor`
/// carries no variance and is replaced by a unit direction orthogonal to the
/// columns before it, taken from `fallback` when one of those qualifies.
fn orthonormalize(
    columns: Vec<Vec<Number>>,
    fallback: &[Vec<Number>],
    floor: Number,
) -> Vec<Vec<Number>> {
    let dims = columns.first().map_or(0, Vec::len);
    let mut basis: Vec<Vec<Number>> = Vec::with_capacity(columns.len());
    for mut v in columns {
        let magnitude = reject(&mut v, &basis);
        if magnitude > floor {
            rescale(&mut v, magnitude);
        } else {
            v = orthogonal_direction(&basis, fallback, dims);
        }
        basis.push(v);
    }
    basis
}

/// Removes the parts of `v` along `basis`, twice over for accuracy, and
/// returns the norm of what is left.
fn reject(v: &mut [Number], basis: &[Vec<Number>]) -> Number {
    for _ in 0..2 {
        for b in basis {
            let coeff = dot_simd(v, b);
            for (x, y) in v.iter_mut().zip(b) {
                *x -= coeff * y;
            }
        }
    }
    norm(v)
}

fn rescale(v: &mut [Number], magnitude: Number) {
    for x in v.iter_mut() {
        *x /= magnitude;
    }
}

/// Unit vector orthogonal to `basis`, which must span fewer than `dims`
/// directions.
fn orthogonal_direction(
    basis: &[Vec<Number>],
    fallback: &[Vec<Number>],
    dims: usize,
) -> Vec<Number> {
    for candidate in fallback {
        let mut v = candidate.clone();
        let magnitude = reject(&mut v, basis);
        if magnitude > 0.5 {
            rescale(&mut v, magnitude);
            return v;
        }
    }

    let mut best = (0.0, vec![0.0; dims]);
    for axis in 0..dims {
        let mut v = vec![0.0; dims];
        v[axis] = 1.0;
        let magnitude = reject(&mut v, basis);
        if magnitude > best.0 {
            best = (magnitude, v);
        }
    }
    let (magnitude, mut v) = best;
    if magnitude > 0.0 {
        rescale(&mut v, magnitude);
    }
    v
}

/// Rotates an orthonormal block onto the covariance eigenvectors inside its
/// span. Returns the axes with their variances, largest first.
fn rayleigh_ritz(
    centered: &[Vec<Number>],
    dims: usize,
    block: &[Vec<Number>],
) -> (Vec<Vec<Number>>, Vec<Number>) {
    let applied: Vec<Vec<Number>> = block
        .iter()
        .map(|q| covariance_apply(centered, dims, q))
        .collect();

    match block {
        [q] => (vec![q.clone()], vec![dot_simd(q, &applied[0]).max(0.0)]),
        [q1, q2] => {
            // Projected covariance [[a, b], [b, d]].
            let a = dot_simd(q1, &applied[0]);
            let b = 0.5 * (dot_simd(q1, &applied[1]) + dot_simd(q2, &applied[0]));
            let d = dot_simd(q2, &applied[1]);

            let half_gap = (0.5 * (a - d)).hypot(b);
            let mid = 0.5 * (a + d);
            let theta = 0.5 * (2.0 * b).atan2(a - d);
            let (s, c) = theta.sin_cos();

            let major = q1.iter().zip(q2).map(|(x, y)| c * x + s * y).collect();
            let minor = q1.iter().zip(q2).map(|(x, y)| c * y - s * x).collect();
            (
                vec![major, minor],
                vec![(mid + half_gap).max(0.0), (mid - half_gap).max(0.0)],
            )
        }
        _ => (Vec::new(), Vec::new()),
    }
}

/// Makes the largest-magnitude loading positive.
fn flip_sign(v: &mut [Number]) {
    let pivot = v
        .iter()
        .copied()
        .fold(0.0, |best: Number, x| if x.abs() > best.abs() { x } else { best });
    if pivot < 0.0 {
        for x in v.iter_mut() {
            *x = -*x;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::DocumentRecord;

    fn dataset(rows: Vec<Vec<Number>>) -> Dataset {
        Dataset::new(
            rows.into_iter()
                .enumerate()
                .map(|(i, v)| DocumentRecord::new(format!("doc-{}.md", i), v))
                .collect(),
        )
        .unwrap()
    }

    fn distance(a: &Point, b: &Point) -> Number {
        ((a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2)).sqrt()
    }

    #[test]
    fn two_dimensional_input_is_only_rotated() {
        let data = dataset(vec![vec![0.0, 0.0], vec![1.0, 1.0]]);
        let points = Pca.fit_transform(&data).unwrap();

        assert_eq!(points.len(), 2);
        assert!((distance(&points[0], &points[1]) - 2f64.sqrt()).abs() < 1e-9);
        // centred: the centroid sits at the origin
        assert!((points[0][0] + points[1][0]).abs() < 1e-9);
        assert!((points[0][1] + points[1][1]).abs() < 1e-9);
        assert!(points[0][1].abs() < 1e-9);
    }

    #[test]
    fn planar_input_keeps_all_pairwise_distances() {
        let rows = vec![
            vec![0.0, 0.0],
            vec![2.0, 1.0],
            vec![-1.0, 3.0],
            vec![4.0, -2.0],
            vec![0.5, 0.5],
        ];
        let data = dataset(rows.clone());
        let points = Pca.fit_transform(&data).unwrap();

        for i in 0..rows.len() {
            for j in 0..rows.len() {
                let original = ((rows[i][0] - rows[j][0]).powi(2)
                    + (rows[i][1] - rows[j][1]).powi(2))
                .sqrt();
                assert!(
                    (distance(&points[i], &points[j]) - original).abs() < 1e-8,
                    "pair ({}, {})",
                    i,
                    j
                );
            }
        }
    }

    #[test]
    fn finds_dominant_direction_first() {
        let fit = Pca.fit(&dataset(dominant_grid(1.0)));

        let axis = &fit.components[0];
        assert!((axis[0] - 0.6).abs() < 1e-6, "{:?}", axis);
        assert!((axis[1] - 0.8).abs() < 1e-6, "{:?}", axis);
        assert!(axis[2].abs() < 1e-6, "{:?}", axis);
        assert!(fit.explained_variance[0] > fit.explained_variance[1]);
        assert!(fit.explained_variance[0] <= fit.total_variance + 1e-9);

        let spread_x: Number = fit.points.iter().map(|p| p[0].abs()).sum();
        let spread_y: Number = fit.points.iter().map(|p| p[1].abs()).sum();
        assert!(spread_x > spread_y);
    }

    /// Grid along (3, 4, 0) with a little uncorrelated spread on z.
    fn dominant_grid(factor: Number) -> Vec<Vec<Number>> {
        let mut rows = Vec::new();
        for t in [-2.0, -1.0, 1.0, 2.0] {
            for z in [-0.1, 0.1] {
                rows.push(vec![3.0 * t * factor, 4.0 * t * factor, z * factor]);
            }
        }
        rows
    }

    #[test]
    fn scaling_the_input_only_scales_the_output() {
        let factor = 1e-7;
        let base = Pca.fit(&dataset(dominant_grid(1.0)));
        let tiny = Pca.fit(&dataset(dominant_grid(factor)));

        let axis = &tiny.components[0];
        assert!((axis[0] - 0.6).abs() < 1e-6, "{:?}", axis);
        assert!((axis[1] - 0.8).abs() < 1e-6, "{:?}", axis);
        assert!(axis[2].abs() < 1e-6, "{:?}", axis);
        assert!(tiny.explained_variance[0] > tiny.explained_variance[1]);

        for (small, large) in tiny.points.iter().zip(&base.points) {
            for k in 0..2 {
                assert!(
                    (small[k] / factor - large[k]).abs() < 1e-6,
                    "{:?} vs {:?}",
                    small,
                    large
                );
            }
        }
        for (small, large) in tiny.explained_variance.iter().zip(&base.explained_variance) {
            assert!((small / (factor * factor) - large).abs() < 1e-6 * large.max(1.0));
        }
    }

    #[test]
    fn nearly_tied_variances_keep_descending_order() {
        // Axis-aligned product grid: x spread 1.0, y spread 0.9999, z spread 0.1.
        let mut rows = Vec::new();
        for x in [-1.0, 1.0] {
            for y in [-1.0, 1.0] {
                for z in [-1.0, 1.0] {
                    rows.push(vec![x, 0.9999 * y, 0.1 * z]);
                }
            }
        }
        let fit = Pca.fit(&dataset(rows));

        let expected_x = 8.0 / 7.0;
        let expected_y = 8.0 / 7.0 * 0.9999 * 0.9999;
        let explained = &fit.explained_variance;
        assert!((explained[0] - expected_x).abs() < 1e-9, "{:?}", explained);
        assert!((explained[1] - expected_y).abs() < 1e-9, "{:?}", explained);
        assert!(fit.explained_variance[0] > fit.explained_variance[1]);

        let (first, second) = (&fit.components[0], &fit.components[1]);
        assert!((first[0] - 1.0).abs() < 1e-6, "{:?}", first);
        assert!(first[1].abs() < 1e-3 && first[2].abs() < 1e-6, "{:?}", first);
        assert!((second[1] - 1.0).abs() < 1e-6, "{:?}", second);
        assert!(second[0].abs() < 1e-3 && second[2].abs() < 1e-6, "{:?}", second);
    }

    #[test]
    fn identical_input_gives_identical_output() {
        let rows: Vec<Vec<Number>> = (0..12)
            .map(|i| {
                let t = i as Number;
                vec![t.sin(), t.cos(), (t * 0.3).sin() * 2.0, t * 0.01, 1.0]
            })
            .collect();
        let first = Pca.fit_transform(&dataset(rows.clone())).unwrap();
        let second = Pca.fit_transform(&dataset(rows)).unwrap();
        for (a, b) in first.iter().zip(&second) {
            assert_eq!(a[0].to_bits(), b[0].to_bits());
            assert_eq!(a[1].to_bits(), b[1].to_bits());
        }
    }

    #[test]
    fn one_dimensional_input_has_flat_y() {
        let data = dataset(vec![vec![1.0], vec![2.0], vec![4.0]]);
        let points = Pca.fit_transform(&data).unwrap();
        assert_eq!(points.len(), 3);
        assert!(points.iter().all(|p| p[1] == 0.0));
        assert!((distance(&points[0], &points[2]) - 3.0).abs() < 1e-9);
    }

    #[test]
    fn single_record_lands_on_origin() {
        let points = Pca
            .fit_transform(&dataset(vec![vec![5.0, -3.0, 2.0]]))
            .unwrap();
        assert_eq!(points.len(), 1);
        assert!(points[0][0].abs() < 1e-12 && points[0][1].abs() < 1e-12);
    }

    #[test]
    fn empty_dataset_gives_no_points() {
        let points = Pca.fit_transform(&Dataset::default()).unwrap();
        assert!(points.is_empty());
    }
}
