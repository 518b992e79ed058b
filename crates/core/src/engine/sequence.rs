use crate::data::DataFrame;
use crate::error::{MlmError, Result};
use crate::lmm::{Coefficient, FittedModel, MixedModelEstimator};
use crate::model::{FixedTerm, InclusionPolicy, ModelSpec};

use super::columns::{
    AREA_CONTROLS, AREA_ID, INDIVIDUAL_CONTROLS, KEY_PREDICTOR, MIN_NON_MISSING, OCCUPATION,
    OUTCOME,
};

/// The four nested random-intercept fits, in increasing covariate
/// richness. All four share the outcome, the grouping column, and the
/// exact same fitting rows, so their sample and group counts are directly
/// comparable.
#[derive(Debug)]
pub struct ModelSequence {
    /// Intercept only; the basis for the variance decomposition.
    pub m0_empty: Box<dyn FittedModel>,
    /// Adds the key area-level predictor.
    pub m1_key: Box<dyn FittedModel>,
    /// Adds the individual (demographic and socioeconomic) controls.
    pub m2_individual: Box<dyn FittedModel>,
    /// Adds the admitted area-level controls; the richest model.
    pub m3_area: Box<dyn FittedModel>,
}

impl ModelSequence {
    /// The four models in fitting order.
    pub fn models(&self) -> [&dyn FittedModel; 4] {
        [
            self.m0_empty.as_ref(),
            self.m1_key.as_ref(),
            self.m2_individual.as_ref(),
            self.m3_area.as_ref(),
        ]
    }

    /// The key predictor's coefficient in the richest model.
    ///
    /// Absence is a hard error: after a successful m3 fit the key
    /// coefficient can only be missing through a specification bug.
    pub fn key_coefficient(&self) -> Result<&Coefficient> {
        self.m3_area
            .coefficient(KEY_PREDICTOR)
            .ok_or_else(|| MlmError::MissingCoefficient {
                model: self.m3_area.label().to_string(),
                term: KEY_PREDICTOR.to_string(),
            })
    }

    /// Render a comparison of the four fits.
    pub fn summary(&self) -> String {
        let mut s = String::new();
        s.push_str("=== Two-Level Model Sequence (REML) ===\n\n");
        for model in self.models() {
            s.push_str(&format!(
                "{:<16} N={:<6} areas={:<5} fixed params={:<3} var(area)={:.4} var(resid)={:.4}\n",
                model.label(),
                model.n_obs(),
                model.n_groups(),
                model.coefficients().len(),
                model.group_variance(),
                model.residual_variance(),
            ));
        }
        if let Ok(coef) = self.key_coefficient() {
            s.push_str(&format!(
                "\nKey predictor ({}): {:.4} (SE {:.4})\n",
                coef.name, coef.estimate, coef.se
            ));
        }
        s
    }
}

/// Fit the four-model sequence on a shared complete-case row set.
///
/// The rows are determined once, from the union of every column the
/// richest specification reads (outcome, grouping column, and all
/// admitted covariates), so listwise deletion cannot make the four
/// samples drift apart. Rows with a missing area identifier are excluded
/// by the same rule. Any estimation failure here is fatal — the rest of
/// the pipeline depends on every model existing.
pub fn fit_model_sequence(
    df: &DataFrame,
    estimator: &dyn MixedModelEstimator,
) -> Result<ModelSequence> {
    // Copy, then coerce the grouping column to a factor; mixed-effects
    // estimation needs discrete group labels, not floating area codes.
    let mut df = df.clone();
    df.as_factor(AREA_ID)?;

    let policy = InclusionPolicy::new(MIN_NON_MISSING);

    let m0_spec = ModelSpec::new("m0_empty", OUTCOME, AREA_ID);

    let m1_spec = m0_spec
        .clone()
        .relabeled("m1_key_predictor")
        .with_term(FixedTerm::Covariate(KEY_PREDICTOR.to_string()));

    // Individual controls are part of the dataset contract and enter
    // unconditionally; occupation is optional and threshold-gated.
    let mut m2_spec = m1_spec
        .clone()
        .relabeled("m2_individual_controls")
        .with_terms(INDIVIDUAL_CONTROLS.iter().map(|c| c.term()));
    if policy.admits(&df, OCCUPATION) {
        m2_spec = m2_spec.with_term(FixedTerm::Factor(OCCUPATION.to_string()));
    } else if df.has_column(OCCUPATION) {
        log::info!(
            "occupation present but under-observed; excluded from the individual tier"
        );
    }

    let m3_spec = m2_spec
        .clone()
        .relabeled("m3_area_controls")
        .with_terms(policy.select(&df, &AREA_CONTROLS));

    // One shared row set, derived from the richest model's columns.
    let rows = df.complete_rows(&m3_spec.columns())?;
    log::info!(
        "fitting two-level models on {} of {} rows",
        rows.len(),
        df.nrows()
    );

    let mut fits = Vec::with_capacity(4);
    for spec in [&m0_spec, &m1_spec, &m2_spec, &m3_spec] {
        log::info!("fitting {} ({} terms)", spec.label, spec.terms.len());
        fits.push(estimator.fit(&df, spec, &rows)?);
    }

    let m3_area = fits.pop().unwrap();
    let m2_individual = fits.pop().unwrap();
    let m1_key = fits.pop().unwrap();
    let m0_empty = fits.pop().unwrap();

    let sequence = ModelSequence {
        m0_empty,
        m1_key,
        m2_individual,
        m3_area,
    };

    // The key coefficient must exist in the richest model.
    let coef = sequence.key_coefficient()?;
    log::info!(
        "key predictor (m3): {} = {:.3} (SE={:.3})",
        coef.name,
        coef.estimate,
        coef.se
    );

    Ok(sequence)
}
