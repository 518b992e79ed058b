//! Column names of the analysis-dataset contract.
//!
//! The engine consumes a table produced by an upstream transformation
//! stage; these are the names that stage guarantees. Optional columns are
//! probed with `DataFrame::has_column` before use.

use crate::model::CovariateCandidate;

/// Primary outcome: single-item redistribution support, 0-100 scale.
pub const OUTCOME: &str = "DV_single";

/// Alternative outcome: 2-item composite, rescaled to 0-100. Optional.
pub const OUTCOME_2ITEM: &str = "DV_2item_scaled";

/// Alternative outcome: 3-item composite, rescaled to 0-100. Optional.
pub const OUTCOME_3ITEM: &str = "DV_3item_scaled";

/// Key area-level predictor: share of households in the bottom-40% income
/// bracket.
pub const KEY_PREDICTOR: &str = "b_perc_low40_hh";

/// Area (neighborhood) identifier; must be non-missing on every fitted row.
pub const AREA_ID: &str = "buurt_id";

/// Nativity indicator (1 = born in the Netherlands). Doubles as an
/// individual control and as the Dutch-born subsample filter.
pub const NATIVITY: &str = "born_in_nl";

/// Optional occupation category, threshold-gated into the individual tier.
pub const OCCUPATION: &str = "occupation";

/// A covariate enters a model tier only when more than this many
/// observations carry it.
pub const MIN_NON_MISSING: usize = 100;

/// Dutch-born subsamples below this size are not refit.
pub const MIN_SUBSAMPLE: usize = 100;

/// Individual-level controls that the contract requires (demographics and
/// socioeconomic position).
pub const INDIVIDUAL_CONTROLS: [CovariateCandidate; 5] = [
    CovariateCandidate::covariate("age"),
    CovariateCandidate::factor("sex"),
    CovariateCandidate::covariate("education"),
    CovariateCandidate::factor("employment_status"),
    CovariateCandidate::covariate(NATIVITY),
];

/// Area-level control candidates; each enters only if present and
/// sufficiently observed.
pub const AREA_CONTROLS: [CovariateCandidate; 5] = [
    CovariateCandidate::covariate("b_pop_dens"),
    CovariateCandidate::covariate("b_pop_over_65"),
    CovariateCandidate::covariate("b_pop_nonwest"),
    CovariateCandidate::covariate("b_perc_low_inc_hh"),
    CovariateCandidate::covariate("b_perc_soc_min_hh"),
];

/// Numeric predictors considered for the collinearity table.
pub const VIF_CANDIDATES: [&str; 8] = [
    KEY_PREDICTOR,
    "age",
    "education",
    "b_pop_dens",
    "b_pop_over_65",
    "b_pop_nonwest",
    "b_perc_low_inc_hh",
    "b_perc_soc_min_hh",
];
