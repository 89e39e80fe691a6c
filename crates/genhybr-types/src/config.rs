// ─────────────────────────────────────────────────────────────────────
// GenHyBR — Config
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{HybridError, HybridResult};

/// Hard ceiling on the default iteration count.
pub const DEFAULT_ITERATION_CEILING: usize = 100;

/// Solver applied to the projected (k+1)×k problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum InnerSolverKind {
    /// Unregularized bidiagonal least squares.
    None,
    /// Truncated SVD; alpha is a truncation level.
    Tsvd,
    #[default]
    Tikhonov,
}

impl InnerSolverKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            InnerSolverKind::None => "none",
            InnerSolverKind::Tsvd => "tsvd",
            InnerSolverKind::Tikhonov => "tikhonov",
        }
    }

    pub fn is_regularizing(&self) -> bool {
        !matches!(self, InnerSolverKind::None)
    }
}

impl fmt::Display for InnerSolverKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InnerSolverKind {
    type Err = HybridError;

    fn from_str(s: &str) -> HybridResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(InnerSolverKind::None),
            "tsvd" => Ok(InnerSolverKind::Tsvd),
            "tikhonov" => Ok(InnerSolverKind::Tikhonov),
            other => Err(HybridError::UnsupportedSolver(other.to_string())),
        }
    }
}

impl TryFrom<String> for InnerSolverKind {
    type Error = HybridError;

    fn try_from(value: String) -> HybridResult<Self> {
        value.parse()
    }
}

impl From<InnerSolverKind> for String {
    fn from(kind: InnerSolverKind) -> Self {
        kind.as_str().to_string()
    }
}

/// JSON shape shared by the "number or keyword" options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScalarOrName {
    Value(f64),
    Name(String),
}

/// How the projected solver picks its regularization parameter.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(try_from = "ScalarOrName", into = "ScalarOrName")]
pub enum RegParam {
    /// User-supplied alpha (or truncation level for TSVD).
    Fixed(f64),
    DiscrepancyPrinciple,
    Gcv,
    #[default]
    WeightedGcv,
    /// Minimizes the error against `x_true`.
    Optimal,
}

impl TryFrom<ScalarOrName> for RegParam {
    type Error = HybridError;

    fn try_from(value: ScalarOrName) -> HybridResult<Self> {
        match value {
            ScalarOrName::Value(v) => Ok(RegParam::Fixed(v)),
            ScalarOrName::Name(name) => match name.to_ascii_lowercase().as_str() {
                "dp" | "discrepancy" => Ok(RegParam::DiscrepancyPrinciple),
                "gcv" => Ok(RegParam::Gcv),
                "wgcv" => Ok(RegParam::WeightedGcv),
                "optimal" => Ok(RegParam::Optimal),
                other => Err(HybridError::ConfigError(format!(
                    "unknown regularization parameter method '{other}'"
                ))),
            },
        }
    }
}

impl From<RegParam> for ScalarOrName {
    fn from(value: RegParam) -> Self {
        match value {
            RegParam::Fixed(v) => ScalarOrName::Value(v),
            RegParam::DiscrepancyPrinciple => ScalarOrName::Name("dp".to_string()),
            RegParam::Gcv => ScalarOrName::Name("gcv".to_string()),
            RegParam::WeightedGcv => ScalarOrName::Name("wgcv".to_string()),
            RegParam::Optimal => ScalarOrName::Name("optimal".to_string()),
        }
    }
}

/// Noise standard deviation used by the discrepancy principle.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(try_from = "ScalarOrName", into = "ScalarOrName")]
pub enum NoiseLevel {
    Fixed(f64),
    #[default]
    Estimated,
}

impl TryFrom<ScalarOrName> for NoiseLevel {
    type Error = HybridError;

    fn try_from(value: ScalarOrName) -> HybridResult<Self> {
        match value {
            ScalarOrName::Value(v) => Ok(NoiseLevel::Fixed(v)),
            ScalarOrName::Name(name) if name.eq_ignore_ascii_case("est") => {
                Ok(NoiseLevel::Estimated)
            }
            ScalarOrName::Name(other) => Err(HybridError::ConfigError(format!(
                "unknown noise level mode '{other}'"
            ))),
        }
    }
}

impl From<NoiseLevel> for ScalarOrName {
    fn from(value: NoiseLevel) -> Self {
        match value {
            NoiseLevel::Fixed(v) => ScalarOrName::Value(v),
            NoiseLevel::Estimated => ScalarOrName::Name("est".to_string()),
        }
    }
}

/// Weight of the weighted-GCV trace term.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(try_from = "ScalarOrName", into = "ScalarOrName")]
pub enum OmegaMode {
    Fixed(f64),
    /// Running mean of per-iteration estimates.
    #[default]
    Adaptive,
}

impl TryFrom<ScalarOrName> for OmegaMode {
    type Error = HybridError;

    fn try_from(value: ScalarOrName) -> HybridResult<Self> {
        match value {
            ScalarOrName::Value(v) => Ok(OmegaMode::Fixed(v)),
            ScalarOrName::Name(name) if name.eq_ignore_ascii_case("adapt") => {
                Ok(OmegaMode::Adaptive)
            }
            ScalarOrName::Name(other) => Err(HybridError::ConfigError(format!(
                "unknown omega mode '{other}'"
            ))),
        }
    }
}

impl From<OmegaMode> for ScalarOrName {
    fn from(value: OmegaMode) -> Self {
        match value {
            OmegaMode::Fixed(v) => ScalarOrName::Value(v),
            OmegaMode::Adaptive => ScalarOrName::Name("adapt".to_string()),
        }
    }
}

/// Settings for one hybrid solve.
///
/// Field names follow the JSON schema; every field is optional in JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HybridConfig {
    pub inner_solver: InnerSolverKind,
    pub reg_param: RegParam,
    pub noise_level: NoiseLevel,
    pub omega: OmegaMode,
    /// `None` resolves to min(m, n, 100).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_iterations: Option<usize>,
    pub reorthogonalize: bool,
    /// Ground truth over the (masked) field entries.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x_true: Option<Vec<f64>>,
    /// Driver step at which regularization switches on. Step 1 only
    /// initializes the basis, so the first regularized iteration is
    /// `begin_reg - 1`.
    pub begin_reg: usize,
    pub flat_tol: f64,
    /// Window length used to confirm a GCV minimum.
    pub min_tol: usize,
    /// (atol, btol) of the residual stopping test.
    pub res_tol: [f64; 2],
    /// Trailing bias coefficients excluded from error norms (nbeta).
    pub bias_len: usize,
    /// Safety factor of the discrepancy principle.
    pub discrepancy_safety: f64,
    /// Keep U, V and B in the output record.
    pub keep_basis: bool,
}

impl Default for HybridConfig {
    fn default() -> Self {
        HybridConfig {
            inner_solver: InnerSolverKind::Tikhonov,
            reg_param: RegParam::WeightedGcv,
            noise_level: NoiseLevel::Estimated,
            omega: OmegaMode::Adaptive,
            max_iterations: None,
            reorthogonalize: false,
            x_true: None,
            begin_reg: 2,
            flat_tol: 1e-6,
            min_tol: 4,
            res_tol: [1e-6, 1e-6],
            bias_len: 0,
            discrepancy_safety: 1.01,
            keep_basis: true,
        }
    }
}

impl HybridConfig {
    /// Load from a JSON file.
    pub fn from_file(path: &str) -> HybridResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    pub fn from_json_str(contents: &str) -> HybridResult<Self> {
        let config: Self = serde_json::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Iteration cap for an m×n problem.
    pub fn resolved_max_iterations(&self, m: usize, n: usize) -> usize {
        self.max_iterations
            .unwrap_or_else(|| m.min(n).min(DEFAULT_ITERATION_CEILING))
    }

    pub fn validate(&self) -> HybridResult<()> {
        if self.max_iterations == Some(0) {
            return Err(HybridError::ConfigError(
                "max_iterations must be >= 1".to_string(),
            ));
        }
        if self.begin_reg < 2 {
            return Err(HybridError::ConfigError(
                "begin_reg must be >= 2".to_string(),
            ));
        }
        if self.min_tol == 0 {
            return Err(HybridError::ConfigError(
                "min_tol must be >= 1".to_string(),
            ));
        }
        if !self.flat_tol.is_finite() || self.flat_tol < 0.0 {
            return Err(HybridError::ConfigError(
                "flat_tol must be finite and >= 0".to_string(),
            ));
        }
        if self.res_tol.iter().any(|t| !t.is_finite() || *t < 0.0) {
            return Err(HybridError::ConfigError(
                "res_tol entries must be finite and >= 0".to_string(),
            ));
        }
        if !self.discrepancy_safety.is_finite() || self.discrepancy_safety <= 0.0 {
            return Err(HybridError::ConfigError(
                "discrepancy_safety must be finite and > 0".to_string(),
            ));
        }
        if let RegParam::Fixed(alpha) = self.reg_param {
            if !alpha.is_finite() || alpha < 0.0 {
                return Err(HybridError::ConfigError(
                    "fixed reg_param must be finite and >= 0".to_string(),
                ));
            }
        }
        if let OmegaMode::Fixed(omega) = self.omega {
            if !omega.is_finite() || omega < 0.0 {
                return Err(HybridError::ConfigError(
                    "fixed omega must be finite and >= 0".to_string(),
                ));
            }
        }
        if let NoiseLevel::Fixed(level) = self.noise_level {
            if !level.is_finite() || level < 0.0 {
                return Err(HybridError::ConfigError(
                    "fixed noise_level must be finite and >= 0".to_string(),
                ));
            }
        }
        if self.reg_param == RegParam::Optimal && self.x_true.is_none() {
            return Err(HybridError::ConfigError(
                "reg_param 'optimal' requires x_true".to_string(),
            ));
        }
        Ok(())
    }
}
