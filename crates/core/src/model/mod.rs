mod design;
mod spec;

pub use design::{build_fixed_design, build_random_design, FixedEffectLabel};
pub use spec::{CovariateCandidate, FixedTerm, InclusionPolicy, ModelSpec, TermRole};
