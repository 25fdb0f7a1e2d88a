use pulp::{Arch, Simd, WithSimd};

use crate::error::Error;

/// Distance function used to order candidates during construction and
/// search. Only `Cosine` is required by the specification, but the trait
/// seam keeps a second metric a matter of adding a small struct, not a
/// rewrite of the graph algorithms.
pub trait Metric: Send + Sync + Copy {
    fn distance(&self, a: &[f32], b: &[f32]) -> Result<f32, Error>;
}

/// Cosine distance: `1 - (a·b)/(‖a‖·‖b‖)`.
///
/// Zero vectors are defined to have distance 1 to every other vector: the
/// denominator is clamped to a small positive epsilon rather than dividing
/// by zero.
#[derive(Debug, Clone, Copy, Default)]
pub struct Cosine;

const MAGNITUDE_EPSILON: f64 = 1e-12;

impl Metric for Cosine {
    #[tracing::instrument(skip_all)]
    fn distance(&self, a: &[f32], b: &[f32]) -> Result<f32, Error> {
        if a.len() != b.len() {
            return Err(Error::DimensionMismatch {
                expected: a.len(),
                found: b.len(),
            });
        }

        let arch = Arch::new();
        let dot = arch.dispatch(DotProduct { first: a, second: b }) as f64;
        let (sq_a, sq_b) = arch.dispatch(SquaredMagnitude { first: a, second: b });

        // The SIMD reduction stays in f32 lanes for throughput; the final
        // combination, which is what cancellation error actually bites,
        // is widened to f64 before the division.
        let magnitude = (sq_a as f64).sqrt() * (sq_b as f64).sqrt();
        let magnitude = magnitude.max(MAGNITUDE_EPSILON);

        Ok((1.0 - (dot / magnitude)) as f32)
    }
}

struct SquaredMagnitude<'a> {
    first: &'a [f32],
    second: &'a [f32],
}

impl WithSimd for SquaredMagnitude<'_> {
    type Output = (f32, f32);

    #[inline(always)]
    fn with_simd<S: Simd>(self, simd: S) -> Self::Output {
        let (first_head, first_tail) = S::as_simd_f32s(self.first);
        let (second_head, second_tail) = S::as_simd_f32s(self.second);

        let mut mag_first = simd.splat_f32s(0.0);
        let mut mag_second = simd.splat_f32s(0.0);

        for (&chunk_first, &chunk_second) in first_head.iter().zip(second_head) {
            mag_first = simd.mul_add_f32s(chunk_first, chunk_first, mag_first);
            mag_second = simd.mul_add_f32s(chunk_second, chunk_second, mag_second);
        }

        let mut mag_first = simd.reduce_sum_f32s(mag_first);
        let mut mag_second = simd.reduce_sum_f32s(mag_second);

        for (&x, &y) in first_tail.iter().zip(second_tail) {
            mag_first += x * x;
            mag_second += y * y;
        }

        (mag_first, mag_second)
    }
}

struct DotProduct<'a> {
    first: &'a [f32],
    second: &'a [f32],
}

impl WithSimd for DotProduct<'_> {
    type Output = f32;

    #[inline(always)]
    fn with_simd<S: Simd>(self, simd: S) -> Self::Output {
        let (first_head, first_tail) = S::as_simd_f32s(self.first);
        let (second_head, second_tail) = S::as_simd_f32s(self.second);

        let mut sum = simd.splat_f32s(0.0);
        for (&chunk_first, &chunk_second) in first_head.iter().zip(second_head) {
            sum = simd.mul_add_f32s(chunk_first, chunk_second, sum);
        }

        let mut sum = simd.reduce_sum_f32s(sum);
        sum += first_tail
            .iter()
            .zip(second_tail)
            .map(|(&x, &y)| x * y)
            .sum::<f32>();
        sum
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_vectors_have_near_zero_distance() {
        let v = vec![0.3, -1.2, 4.0, 0.0];
        let d = Cosine.distance(&v, &v).unwrap();
        assert!(d.abs() < 1e-6, "got {d}");
    }

    #[test]
    fn distance_is_symmetric() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![0.0, 1.0, 0.0];
        let d1 = Cosine.distance(&a, &b).unwrap();
        let d2 = Cosine.distance(&b, &a).unwrap();
        assert!((d1 - d2).abs() < 1e-6);
    }

    #[test]
    fn distance_is_bounded() {
        let a = vec![1.0, 2.0, -3.0];
        let b = vec![-4.0, 0.5, 9.0];
        let d = Cosine.distance(&a, &b).unwrap();
        assert!((0.0..=2.0).contains(&d), "got {d}");
    }

    #[test]
    fn zero_vector_is_maximally_distant() {
        let zero = vec![0.0, 0.0, 0.0];
        let other = vec![1.0, 2.0, 3.0];
        let d = Cosine.distance(&zero, &other).unwrap();
        assert!((d - 1.0).abs() < 1e-4, "got {d}");
    }

    #[test]
    fn dimension_mismatch_is_an_error() {
        let a = vec![1.0, 2.0];
        let b = vec![1.0, 2.0, 3.0];
        assert!(matches!(
            Cosine.distance(&a, &b),
            Err(Error::DimensionMismatch { expected: 2, found: 3 })
        ));
    }
}
