//! Numerical building blocks for GenHyBR.

pub mod linalg;
pub mod minimize;
pub mod noise;
pub mod operator;
