//! Generalized hybrid projection solver for large linear inverse problems.
//!
//! Iterates gen-GK bidiagonalization, regularizes each projected problem
//! with TSVD or Tikhonov, and stops on GCV-based rules.

pub mod bidiag;
pub mod driver;
pub mod gcv;
pub mod omega;
pub mod projected;
pub mod record;
pub mod stopping;
pub mod truth;

pub use driver::{HybridProblem, HybridProblemBuilder, HybridSolver};
pub use record::{HybridOutput, IterationSnapshot, OutputRecord};
pub use stopping::StopFlag;
