// ─────────────────────────────────────────────────────────────────────
// GenHyBR — Ground-Truth Error Tracking
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Relative error of an iterate against a known solution.
//!
//! The first `n - bias_len` entries of x form the field; trailing bias
//! coefficients never enter the error.  An optional mask selects the
//! field entries that are compared.

use genhybr_math::linalg::vec_norm;
use genhybr_types::error::{HybridError, HybridResult};
use ndarray::Array1;

#[derive(Debug, Clone)]
pub struct GroundTruth {
    truth: Array1<f64>,
    mask: Option<Vec<bool>>,
    field_len: usize,
    truth_norm: f64,
}

impl GroundTruth {
    /// `x_true` holds either one value per selected field entry, or one
    /// per field entry (the mask is then applied to it as well).
    pub fn new(
        x_true: &[f64],
        mask: Option<&[bool]>,
        n: usize,
        bias_len: usize,
    ) -> HybridResult<Self> {
        if bias_len >= n {
            return Err(HybridError::ConfigError(format!(
                "bias_len ({bias_len}) must be smaller than the unknown count ({n})"
            )));
        }
        let field_len = n - bias_len;
        if let Some(mask) = mask {
            if mask.len() != field_len {
                return Err(HybridError::ConfigError(format!(
                    "mask has {} entries, field has {field_len}",
                    mask.len()
                )));
            }
        }
        let selected = mask.map_or(field_len, |m| m.iter().filter(|&&keep| keep).count());

        let truth: Array1<f64> = if x_true.len() == selected {
            Array1::from(x_true.to_vec())
        } else if x_true.len() == field_len {
            select(x_true.iter().copied(), mask)
        } else {
            return Err(HybridError::ConfigError(format!(
                "x_true has {} entries, expected {selected} (masked) or {field_len} (field)",
                x_true.len()
            )));
        };

        let truth_norm = vec_norm(truth.view());
        Ok(GroundTruth {
            truth,
            mask: mask.map(|m| m.to_vec()),
            field_len,
            truth_norm,
        })
    }

    /// ‖x_field − x_true‖ / ‖x_true‖, absolute when the truth is zero.
    pub fn relative_error(&self, x: &Array1<f64>) -> f64 {
        let field = select(x.iter().take(self.field_len).copied(), self.mask.as_deref());
        let diff = &field - &self.truth;
        let err = vec_norm(diff.view());
        if self.truth_norm > 0.0 {
            err / self.truth_norm
        } else {
            err
        }
    }
}

fn select<I: Iterator<Item = f64>>(values: I, mask: Option<&[bool]>) -> Array1<f64> {
    match mask {
        Some(mask) => values
            .zip(mask.iter())
            .filter_map(|(v, &keep)| keep.then_some(v))
            .collect(),
        None => values.collect(),
    }
}
