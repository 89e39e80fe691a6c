// ─────────────────────────────────────────────────────────────────────
// GenHyBR — Error
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
use thiserror::Error;

#[derive(Error, Debug)]
pub enum HybridError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Unsupported inner solver: {0}")]
    UnsupportedSolver(String),

    #[error("Dimension mismatch in {context}: expected {expected}, found {found}")]
    DimensionMismatch {
        context: String,
        expected: usize,
        found: usize,
    },

    #[error("Operator error: {0}")]
    Operator(String),

    #[error("Linear algebra error: {0}")]
    LinAlg(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type HybridResult<T> = Result<T, HybridError>;

/// Check that a vector length matches what an operator expects.
pub fn ensure_len(context: &str, expected: usize, found: usize) -> HybridResult<()> {
    if expected != found {
        return Err(HybridError::DimensionMismatch {
            context: context.to_string(),
            expected,
            found,
        });
    }
    Ok(())
}
