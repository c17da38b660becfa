//! Composite Simpson quadrature over the radial index axis.

use super::rtransform::RadialTransform;
use std::f64::consts::PI;

/// Composite Simpson weights for `npoint` equally spaced samples (unit step).
///
/// For an even number of points the last interval falls back to the
/// trapezoidal rule, so any `npoint >= 2` integrates consistently.
pub fn simpson_weights(npoint: usize) -> Vec<f64> {
    match npoint {
        0 => Vec::new(),
        1 => vec![1.0],
        2 => vec![0.5, 0.5],
        _ => {
            let odd_count = if npoint % 2 == 1 { npoint } else { npoint - 1 };
            let mut weights = vec![0.0; npoint];
            for (k, w) in weights.iter_mut().enumerate().take(odd_count) {
                *w = if k == 0 || k == odd_count - 1 {
                    1.0 / 3.0
                } else if k % 2 == 1 {
                    4.0 / 3.0
                } else {
                    2.0 / 3.0
                };
            }
            if npoint % 2 == 0 {
                weights[npoint - 2] += 0.5;
                weights[npoint - 1] = 0.5;
            }
            weights
        }
    }
}

/// Radial integration weights `4 pi r^2 * simpson * dr/dk` for a transform.
///
/// Dotting these against a spherically averaged density tabulated on the
/// same radii yields its three-dimensional integral. Positivity of the
/// result is the caller's check; a degenerate transform shows up here as
/// zero, negative, or non-finite entries.
pub fn radial_weights(rtf: &RadialTransform) -> Vec<f64> {
    let simpson = simpson_weights(rtf.npoint());
    rtf.radii()
        .iter()
        .zip(rtf.volume_elements())
        .zip(simpson)
        .map(|((r, vol), s)| 4.0 * PI * r * r * s * vol)
        .collect()
}

/// Weighted dot product of two tabulated radial functions.
pub fn radial_dot(weights: &[f64], y0: &[f64], y1: &[f64]) -> f64 {
    weights
        .iter()
        .zip(y0)
        .zip(y1)
        .map(|((w, a), b)| w * a * b)
        .sum()
}
