// ─────────────────────────────────────────────────────────────────────
// GenHyBR — Noise Estimation
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Noise standard deviation from the finest Haar wavelet scale.

use ndarray::Array1;

/// Median absolute deviation of Gaussian noise: Φ⁻¹(3/4).
const MAD_GAUSSIAN: f64 = 0.6745;

/// Estimate σ of additive white noise in `b`.
///
/// Uses the finest-scale Haar detail coefficients
/// `(b[2i] - b[2i+1]) / √2`, whose median absolute value is a robust
/// σ·0.6745 for piecewise-smooth signals.  Returns 0 for fewer than two
/// samples.
pub fn estimate_noise_haar(b: &Array1<f64>) -> f64 {
    let pairs = b.len() / 2;
    if pairs == 0 {
        return 0.0;
    }
    let mut details: Vec<f64> = (0..pairs)
        .map(|i| ((b[2 * i] - b[2 * i + 1]) / std::f64::consts::SQRT_2).abs())
        .collect();
    details.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let median = if pairs % 2 == 1 {
        details[pairs / 2]
    } else {
        0.5 * (details[pairs / 2 - 1] + details[pairs / 2])
    };
    median / MAD_GAUSSIAN
}
