use crate::data::DataFrame;
use crate::error::{MlmError, Result};
use crate::lmm::MixedModelEstimator;
use crate::model::{FixedTerm, ModelSpec};

use super::columns::{
    AREA_CONTROLS, AREA_ID, INDIVIDUAL_CONTROLS, KEY_PREDICTOR, MIN_SUBSAMPLE, NATIVITY,
    OUTCOME, OUTCOME_2ITEM, OUTCOME_3ITEM,
};
use super::config::EngineConfig;

/// One estimated sensitivity specification. Coefficient and standard
/// error are reportable absences (`None`) when the key predictor did not
/// survive into the fitted parameter set.
#[derive(Debug, Clone)]
pub struct SensitivityRow {
    pub specification: String,
    pub n_obs: usize,
    pub coefficient: Option<f64>,
    pub se: Option<f64>,
    pub significant: bool,
}

/// A specification that was attempted but could not be estimated.
#[derive(Debug, Clone)]
pub struct SpecFailure {
    pub specification: String,
    pub reason: String,
}

/// Robustness comparison of the key coefficient across alternative
/// outcome definitions and subsamples. Failed specifications contribute
/// no row — they are collected separately so reporting can say why.
#[derive(Debug, Clone, Default)]
pub struct SensitivityTable {
    pub rows: Vec<SensitivityRow>,
    pub failures: Vec<SpecFailure>,
}

impl SensitivityTable {
    pub fn summary(&self) -> String {
        let mut s = String::new();
        s.push_str("=== Sensitivity Analyses ===\n\n");
        s.push_str(&format!(
            "{:<24} {:>6} {:>12} {:>10} {:>6}\n",
            "specification", "N", "coefficient", "SE", "sig"
        ));
        for row in &self.rows {
            let coef = row
                .coefficient
                .map(|c| format!("{:.4}", c))
                .unwrap_or_else(|| "--".to_string());
            let se = row
                .se
                .map(|s| format!("{:.4}", s))
                .unwrap_or_else(|| "--".to_string());
            s.push_str(&format!(
                "{:<24} {:>6} {:>12} {:>10} {:>6}\n",
                row.specification,
                row.n_obs,
                coef,
                se,
                if row.significant { "*" } else { "" }
            ));
        }
        for failure in &self.failures {
            s.push_str(&format!(
                "(failed) {:<24} {}\n",
                failure.specification, failure.reason
            ));
        }
        s
    }
}

/// Two-sided z-test for the key coefficient. False whenever either
/// quantity is unavailable: an absent coefficient can never be
/// significant, only absent.
pub fn significant(coefficient: Option<f64>, se: Option<f64>, z_crit: f64) -> bool {
    match (coefficient, se) {
        (Some(c), Some(s)) if s > 0.0 => (c / s).abs() > z_crit,
        _ => false,
    }
}

/// One planned specification: a model plus an optional subsample filter.
struct SpecRun {
    spec: ModelSpec,
    native_only: bool,
}

/// Run the sensitivity analyses.
///
/// The shared control set is built independently of the main fitting
/// sequence: every individual control plus every area control that is
/// present, with no minimum-observation gating — this table probes
/// outcome-definition robustness, not covariate availability. Each
/// specification is attempted on its own complete-case rows; a failure is
/// logged and recorded but never aborts the remaining specifications.
pub fn run_sensitivity(
    df: &DataFrame,
    estimator: &dyn MixedModelEstimator,
    config: &EngineConfig,
) -> Result<SensitivityTable> {
    let mut df = df.clone();
    df.as_factor(AREA_ID)?;

    let z_crit = config.critical_z();

    // Base controls: individual set plus whichever area controls exist.
    let mut base_terms: Vec<FixedTerm> = vec![FixedTerm::Covariate(KEY_PREDICTOR.to_string())];
    base_terms.extend(INDIVIDUAL_CONTROLS.iter().map(|c| c.term()));
    base_terms.extend(
        AREA_CONTROLS
            .iter()
            .filter(|c| df.has_column(c.name))
            .map(|c| c.term()),
    );

    let base_spec = |label: &str, outcome: &str| {
        ModelSpec::new(label, outcome, AREA_ID).with_terms(base_terms.iter().cloned())
    };

    let mut runs = vec![SpecRun {
        spec: base_spec("Base (DV_single)", OUTCOME),
        native_only: false,
    }];

    if df.has_column(OUTCOME_2ITEM) {
        runs.push(SpecRun {
            spec: base_spec("2-item composite", OUTCOME_2ITEM),
            native_only: false,
        });
    }
    if df.has_column(OUTCOME_3ITEM) {
        runs.push(SpecRun {
            spec: base_spec("3-item composite", OUTCOME_3ITEM),
            native_only: false,
        });
    }
    if df.has_column(NATIVITY) {
        runs.push(SpecRun {
            spec: base_spec("Dutch-born only", OUTCOME),
            native_only: true,
        });
    }

    // Fold over the specifications, accumulating rows and failures.
    let mut table = SensitivityTable::default();
    for run in runs {
        let label = run.spec.label.clone();
        match attempt(&df, estimator, &run, z_crit) {
            Ok(Some(row)) => table.rows.push(row),
            Ok(None) => {
                log::info!("specification '{}' skipped: subsample too small", label);
            }
            Err(e) => {
                log::warn!("specification '{}' failed: {}", label, e);
                table.failures.push(SpecFailure {
                    specification: label,
                    reason: e.to_string(),
                });
            }
        }
    }

    Ok(table)
}

/// Fit one specification and extract its key-coefficient row.
/// `Ok(None)` means the specification was skipped by its own guard (a
/// restricted subsample below the minimum), which is not a failure.
fn attempt(
    df: &DataFrame,
    estimator: &dyn MixedModelEstimator,
    run: &SpecRun,
    z_crit: f64,
) -> Result<Option<SensitivityRow>> {
    let mut rows = df.complete_rows(&run.spec.columns())?;

    if run.native_only {
        let born = df.get_float(NATIVITY)?;
        rows.retain(|&i| born[i] == 1.0);
        if rows.len() <= MIN_SUBSAMPLE {
            return Ok(None);
        }
    }

    if rows.is_empty() {
        return Err(MlmError::ModelSpec(format!(
            "no complete rows for '{}'",
            run.spec.label
        )));
    }

    let fit = estimator.fit(df, &run.spec, &rows)?;

    let coef = fit.coefficient(KEY_PREDICTOR);
    if coef.is_none() {
        // Reportable absence, but worth flagging: it usually means the
        // specification lost the key predictor while being built.
        log::warn!(
            "key predictor '{}' absent from fitted model '{}'",
            KEY_PREDICTOR,
            fit.label()
        );
    }
    let coefficient = coef.map(|c| c.estimate);
    let se = coef.map(|c| c.se);

    Ok(Some(SensitivityRow {
        specification: run.spec.label.clone(),
        n_obs: fit.n_obs(),
        significant: significant(coefficient, se, z_crit),
        coefficient,
        se,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testdata::survey_df;
    use crate::lmm::{FittedModel, RemlEstimator};

    #[test]
    fn test_base_and_native_rows_only_without_composites() {
        let df = survey_df();
        let table =
            run_sensitivity(&df, &RemlEstimator::default(), &EngineConfig::default()).unwrap();

        let labels: Vec<&str> = table.rows.iter().map(|r| r.specification.as_str()).collect();
        assert_eq!(labels, vec!["Base (DV_single)", "Dutch-born only"]);
        assert!(table.failures.is_empty());

        // 20 of 200 respondents are non-native.
        assert_eq!(table.rows[0].n_obs, 200);
        assert_eq!(table.rows[1].n_obs, 180);
    }

    #[test]
    fn test_composite_rows_when_present() {
        let mut df = survey_df();
        let outcome = df.get_float(OUTCOME).unwrap().to_vec();
        let two_item: Vec<f64> = outcome
            .iter()
            .enumerate()
            .map(|(i, v)| if i % 4 == 0 { f64::NAN } else { v * 0.9 + 2.0 })
            .collect();
        let three_item: Vec<f64> = outcome.iter().map(|v| v * 1.05 - 1.0).collect();
        df.add_float_column(OUTCOME_2ITEM, two_item).unwrap();
        df.add_float_column(OUTCOME_3ITEM, three_item).unwrap();

        let table =
            run_sensitivity(&df, &RemlEstimator::default(), &EngineConfig::default()).unwrap();

        let labels: Vec<&str> = table.rows.iter().map(|r| r.specification.as_str()).collect();
        assert_eq!(
            labels,
            vec![
                "Base (DV_single)",
                "2-item composite",
                "3-item composite",
                "Dutch-born only"
            ]
        );

        // Rows missing the composite outcome are excluded from that fit only.
        assert_eq!(table.rows[0].n_obs, 200);
        assert_eq!(table.rows[1].n_obs, 150);
        assert_eq!(table.rows[2].n_obs, 200);
    }

    #[test]
    fn test_small_native_subsample_skipped_silently() {
        let base = survey_df();
        // Flip nativity so only 20 respondents are native-born.
        let born: Vec<f64> = base
            .get_float(NATIVITY)
            .unwrap()
            .iter()
            .map(|v| 1.0 - v)
            .collect();
        let mut df = DataFrame::new();
        for name in base.column_names() {
            if name == NATIVITY {
                df.add_float_column(name, born.clone()).unwrap();
                continue;
            }
            match base.get_column(name).unwrap() {
                crate::data::Column::Float(v) => df.add_float_column(name, v.clone()).unwrap(),
                crate::data::Column::Factor(f) => {
                    let vals: Vec<Option<&str>> = f
                        .codes()
                        .iter()
                        .map(|code| code.map(|c| f.level_name(c).unwrap()))
                        .collect();
                    df.add_factor_column_with_missing(name, &vals).unwrap();
                }
            }
        }

        let table =
            run_sensitivity(&df, &RemlEstimator::default(), &EngineConfig::default()).unwrap();
        let labels: Vec<&str> = table.rows.iter().map(|r| r.specification.as_str()).collect();
        assert_eq!(labels, vec!["Base (DV_single)"]);
        // A skipped subsample is not a failure.
        assert!(table.failures.is_empty());
    }

    /// Delegates to REML but refuses one labelled specification, to test
    /// the partial-failure fold.
    struct FailOne {
        inner: RemlEstimator,
        fail_label: &'static str,
    }

    impl MixedModelEstimator for FailOne {
        fn fit(
            &self,
            df: &DataFrame,
            spec: &ModelSpec,
            rows: &[usize],
        ) -> crate::error::Result<Box<dyn FittedModel>> {
            if spec.label == self.fail_label {
                return Err(MlmError::NotConverged {
                    iterations: 7,
                    change: 0.5,
                });
            }
            self.inner.fit(df, spec, rows)
        }
    }

    #[test]
    fn test_one_failure_does_not_abort_the_rest() {
        let mut df = survey_df();
        let outcome = df.get_float(OUTCOME).unwrap().to_vec();
        df.add_float_column(OUTCOME_2ITEM, outcome.iter().map(|v| v * 0.9).collect())
            .unwrap();

        let estimator = FailOne {
            inner: RemlEstimator::default(),
            fail_label: "2-item composite",
        };
        let table = run_sensitivity(&df, &estimator, &EngineConfig::default()).unwrap();

        let labels: Vec<&str> = table.rows.iter().map(|r| r.specification.as_str()).collect();
        assert_eq!(labels, vec!["Base (DV_single)", "Dutch-born only"]);
        assert_eq!(table.failures.len(), 1);
        assert_eq!(table.failures[0].specification, "2-item composite");
        assert!(table.failures[0].reason.contains("converge"));
    }

    #[test]
    fn test_significance_flag_monotonic_in_se() {
        let z = 1.96;
        let coef = Some(2.0);
        // Shrinking the SE can only turn the flag on, never off.
        let mut last = significant(coef, Some(10.0), z);
        for se in [5.0, 2.0, 1.5, 1.01, 0.5, 0.1] {
            let now = significant(coef, Some(se), z);
            assert!(now || !last, "significance lost when SE shrank to {}", se);
            last = now;
        }
        assert!(last);
    }

    #[test]
    fn test_significance_unavailable_is_false() {
        assert!(!significant(None, Some(1.0), 1.96));
        assert!(!significant(Some(5.0), None, 1.96));
        assert!(!significant(Some(5.0), Some(0.0), 1.96));
    }
}
