use crate::config::{Number, EPSILON};
use wide::f64x4;

const LANES: usize = 4;

/// Squared Euclidean distance between two equal-length vectors using SIMD
/// operations.
pub fn squared_distance_simd(a: &[Number], b: &[Number]) -> Number {
    debug_assert_eq!(a.len(), b.len(), "vector length mismatch");

    let len = a.len().min(b.len());
    let simd_len = len - (len % LANES);
    let mut acc = f64x4::splat(0.0);

    // SIMD loop
    for i in (0..simd_len).step_by(LANES) {
        let va = f64x4::new([a[i], a[i + 1], a[i + 2], a[i + 3]]);
        let vb = f64x4::new([b[i], b[i + 1], b[i + 2], b[i + 3]]);
        let diff = va - vb;
        acc += diff * diff;
    }

    let mut sum = acc.reduce_add();

    // Handle remaining elements
    for i in simd_len..len {
        let diff = a[i] - b[i];
        sum += diff * diff;
    }

    sum
}

/// Dot product of two equal-length vectors using SIMD operations.
pub fn dot_simd(a: &[Number], b: &[Number]) -> Number {
    debug_assert_eq!(a.len(), b.len(), "vector length mismatch");

    let len = a.len().min(b.len());
    let simd_len = len - (len % LANES);
    let mut acc = f64x4::splat(0.0);

    for i in (0..simd_len).step_by(LANES) {
        let va = f64x4::new([a[i], a[i + 1], a[i + 2], a[i + 3]]);
        let vb = f64x4::new([b[i], b[i + 1], b[i + 2], b[i + 3]]);
        acc += va * vb;
    }

    let mut sum = acc.reduce_add();
    for i in simd_len..len {
        sum += a[i] * b[i];
    }
    sum
}

pub fn norm(vector: &[Number]) -> Number {
    dot_simd(vector, vector).sqrt()
}

/// Scales `vector` to unit length in place. Near-zero vectors are left as is.
pub fn normalize_vector(vector: &mut [Number]) {
    let magnitude = norm(vector);
    if magnitude > EPSILON {
        for x in vector.iter_mut() {
            *x /= magnitude;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn squared_distance_matches_scalar() {
        let a: Vec<Number> = (0..11).map(|i| i as Number * 0.5).collect();
        let b: Vec<Number> = (0..11).map(|i| (i as Number).sin()).collect();
        let expected: Number = a.iter().zip(&b).map(|(x, y)| (x - y) * (x - y)).sum();
        assert!((squared_distance_simd(&a, &b) - expected).abs() < 1e-9);
    }

    #[test]
    fn short_vectors_use_the_scalar_tail() {
        assert_eq!(squared_distance_simd(&[0.0, 0.0], &[1.0, 1.0]), 2.0);
        assert_eq!(dot_simd(&[2.0], &[3.0]), 6.0);
    }

    #[test]
    fn normalize_gives_unit_length() {
        let mut v = vec![3.0, 4.0, 0.0, 0.0, 0.0];
        normalize_vector(&mut v);
        assert!((norm(&v) - 1.0).abs() < 1e-12);
        assert!((v[0] - 0.6).abs() < 1e-12);
    }

    #[test]
    fn normalize_leaves_zero_vector() {
        let mut v = vec![0.0; 6];
        normalize_vector(&mut v);
        assert!(v.iter().all(|&x| x == 0.0));
    }
}
