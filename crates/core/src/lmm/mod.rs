mod fit;
mod mme;
mod reml;

pub use fit::{AreaEffect, Coefficient, FittedModel, MixedModelEstimator, RemlEstimator, RemlFit};
pub use mme::MixedModelEquations;
pub use reml::EmReml;
