//! Two-level (individual-within-neighborhood) modeling of survey
//! attitudes: a nested sequence of REML random-intercept fits, the
//! variance decomposition (ICC), collinearity/residual/random-effect
//! diagnostics, and sensitivity re-estimation across alternative outcome
//! definitions and subsamples.

pub mod data;
pub mod engine;
pub mod error;
pub mod lmm;
pub mod matrix;
pub mod model;
pub mod types;

pub use error::{MlmError, Result};
