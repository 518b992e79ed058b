use crate::data::DataFrame;
use crate::error::{MlmError, Result};
use crate::model::{build_fixed_design, build_random_design, ModelSpec};

use super::reml::EmReml;

/// A named fixed-effect estimate with its standard error.
#[derive(Debug, Clone)]
pub struct Coefficient {
    pub name: String,
    pub estimate: f64,
    pub se: f64,
}

/// The estimated random intercept for one area.
#[derive(Debug, Clone)]
pub struct AreaEffect {
    pub area: String,
    pub estimate: f64,
}

/// The result of one mixed-effects estimation, as consumed by the engine.
///
/// This trait is the capability boundary around the estimation backend: it
/// exposes exactly the quantities the downstream computations read —
/// coefficients with standard errors, residuals, per-area random
/// intercepts, the two variance components, and the sample dimensions —
/// so the backend is swappable. Implementations are immutable once
/// created; the engine only ever reads them.
pub trait FittedModel: std::fmt::Debug {
    /// The specification label this model was fit under.
    fn label(&self) -> &str;

    /// All fixed-effect coefficients in design order.
    fn coefficients(&self) -> &[Coefficient];

    /// Look up a single coefficient by name. Absence is reported, not
    /// defaulted: the caller decides whether a missing coefficient is
    /// fatal.
    fn coefficient(&self, name: &str) -> Option<&Coefficient> {
        self.coefficients().iter().find(|c| c.name == name)
    }

    /// Conditional residuals, one per observation used in the fit.
    fn residuals(&self) -> &[f64];

    /// Estimated random intercepts, one per area in the fit.
    fn random_intercepts(&self) -> &[AreaEffect];

    /// Between-group (random-intercept) variance component.
    fn group_variance(&self) -> f64;

    /// Within-group (residual) variance component.
    fn residual_variance(&self) -> f64;

    /// Number of observations used in the fit.
    fn n_obs(&self) -> usize;

    /// Number of distinct groups (areas) in the fit.
    fn n_groups(&self) -> usize;
}

/// A mixed-effects estimation capability: turns a model specification plus
/// a row subset of a DataFrame into a fitted model, or errors on
/// non-convergence, singular designs, and input-contract violations.
///
/// The row subset is supplied by the caller so that a sequence of nested
/// models can be fit on the identical rows.
pub trait MixedModelEstimator {
    fn fit(
        &self,
        df: &DataFrame,
        spec: &ModelSpec,
        rows: &[usize],
    ) -> Result<Box<dyn FittedModel>>;
}

/// REML fit of a random-intercept model, produced by [`RemlEstimator`].
#[derive(Debug, Clone)]
pub struct RemlFit {
    label: String,
    coefficients: Vec<Coefficient>,
    residuals: Vec<f64>,
    random_intercepts: Vec<AreaEffect>,
    sigma2_group: f64,
    sigma2_resid: f64,
    n_obs: usize,
    /// REML iterations the fit took, kept for logging.
    pub n_iterations: usize,
    /// Restricted log-likelihood at convergence.
    pub log_likelihood: f64,
}

impl FittedModel for RemlFit {
    fn label(&self) -> &str {
        &self.label
    }

    fn coefficients(&self) -> &[Coefficient] {
        &self.coefficients
    }

    fn residuals(&self) -> &[f64] {
        &self.residuals
    }

    fn random_intercepts(&self) -> &[AreaEffect] {
        &self.random_intercepts
    }

    fn group_variance(&self) -> f64 {
        self.sigma2_group
    }

    fn residual_variance(&self) -> f64 {
        self.sigma2_resid
    }

    fn n_obs(&self) -> usize {
        self.n_obs
    }

    fn n_groups(&self) -> usize {
        self.random_intercepts.len()
    }
}

/// The concrete estimation backend: EM-REML over Henderson's mixed model
/// equations, always with a single random intercept per group.
#[derive(Debug, Clone)]
pub struct RemlEstimator {
    pub max_iter: usize,
    pub tol: f64,
    /// Scoped verbosity: per-iteration progress goes to `debug!` only when
    /// set, and only for fits run through this estimator instance.
    pub log_progress: bool,
}

impl Default for RemlEstimator {
    fn default() -> Self {
        Self {
            max_iter: 500,
            tol: 1e-6,
            log_progress: false,
        }
    }
}

impl MixedModelEstimator for RemlEstimator {
    fn fit(
        &self,
        df: &DataFrame,
        spec: &ModelSpec,
        rows: &[usize],
    ) -> Result<Box<dyn FittedModel>> {
        if rows.is_empty() {
            return Err(MlmError::ModelSpec(format!(
                "No usable rows for model '{}'",
                spec.label
            )));
        }

        // Response over the fitting rows; a NaN here means the caller's
        // row filtering missed the outcome column.
        let outcome = df.get_float(&spec.outcome)?;
        let mut y = Vec::with_capacity(rows.len());
        for &i in rows {
            let v = outcome[i];
            if v.is_nan() {
                return Err(MlmError::Data(format!(
                    "Outcome '{}' has a missing value inside the fitting rows of model '{}'",
                    spec.outcome, spec.label
                )));
            }
            y.push(v);
        }

        let (x, labels) = build_fixed_design(df, &spec.terms, rows)?;
        let (z, areas) = build_random_design(df, &spec.group, rows)?;

        let reml = EmReml {
            max_iter: self.max_iter,
            tol: self.tol,
            log_progress: self.log_progress,
        };
        let est = reml.fit(&y, &x, &z).map_err(|e| match e {
            MlmError::NotPositiveDefinite => MlmError::SingularMatrix {
                context: format!("mixed model equations of model '{}'", spec.label),
            },
            other => other,
        })?;

        let coefficients = labels
            .iter()
            .zip(est.fixed.iter().zip(est.fixed_se.iter()))
            .map(|(label, (&estimate, &se))| Coefficient {
                name: label.name(),
                estimate,
                se,
            })
            .collect();

        let random_intercepts = areas
            .into_iter()
            .zip(est.random.iter())
            .map(|(area, &estimate)| AreaEffect { area, estimate })
            .collect();

        log::debug!(
            "model '{}': N={}, logl={:.4}, {} iterations",
            spec.label,
            rows.len(),
            est.log_likelihood,
            est.n_iterations
        );

        Ok(Box::new(RemlFit {
            label: spec.label.clone(),
            coefficients,
            residuals: est.residuals,
            random_intercepts,
            sigma2_group: est.sigma2_group,
            sigma2_resid: est.sigma2_resid,
            n_obs: rows.len(),
            n_iterations: est.n_iterations,
            log_likelihood: est.log_likelihood,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::FixedTerm;
    use approx::assert_relative_eq;

    fn sample_df() -> DataFrame {
        let mut df = DataFrame::new();
        df.add_float_column(
            "support",
            vec![10.2, 9.8, 10.1, 9.9, 6.1, 5.9, 6.2, 5.8],
        )
        .unwrap();
        df.add_float_column("deprivation", vec![1.0, 1.0, 1.0, 1.0, 3.0, 3.0, 3.0, 3.0])
            .unwrap();
        df.add_factor_column(
            "area",
            &["A1", "A1", "A1", "A1", "A2", "A2", "A2", "A2"],
        )
        .unwrap();
        df
    }

    #[test]
    fn test_reml_estimator_empty_model() {
        let df = sample_df();
        let rows: Vec<usize> = (0..8).collect();
        let spec = ModelSpec::new("m0_empty", "support", "area");

        let fit = RemlEstimator::default().fit(&df, &spec, &rows).unwrap();

        assert_eq!(fit.label(), "m0_empty");
        assert_eq!(fit.n_obs(), 8);
        assert_eq!(fit.n_groups(), 2);
        assert_eq!(fit.coefficients().len(), 1);
        assert_eq!(fit.coefficients()[0].name, "intercept");
        assert!(fit.group_variance() > 0.0);
        assert!(fit.residual_variance() > 0.0);
        assert_eq!(fit.residuals().len(), 8);
        assert_eq!(fit.random_intercepts().len(), 2);
        assert_eq!(fit.random_intercepts()[0].area, "A1");
    }

    #[test]
    fn test_coefficient_lookup() {
        let df = sample_df();
        let rows: Vec<usize> = (0..8).collect();
        let spec = ModelSpec::new("m1", "support", "area")
            .with_term(FixedTerm::Covariate("deprivation".into()));

        let fit = RemlEstimator::default().fit(&df, &spec, &rows).unwrap();

        let coef = fit.coefficient("deprivation").unwrap();
        // Support drops ~4 points per 2 units of deprivation.
        assert!(coef.estimate < 0.0);
        assert!(coef.se >= 0.0);
        assert!(fit.coefficient("not_a_term").is_none());
    }

    #[test]
    fn test_residuals_reconstruct_outcome_scale() {
        let df = sample_df();
        let rows: Vec<usize> = (0..8).collect();
        let spec = ModelSpec::new("m0_empty", "support", "area");
        let fit = RemlEstimator::default().fit(&df, &spec, &rows).unwrap();

        let resid_sum: f64 = fit.residuals().iter().sum();
        assert_relative_eq!(resid_sum, 0.0, epsilon = 1e-6);
    }

    #[test]
    fn test_empty_rows_is_spec_error() {
        let df = sample_df();
        let spec = ModelSpec::new("m0_empty", "support", "area");
        let err = RemlEstimator::default().fit(&df, &spec, &[]).unwrap_err();
        assert!(matches!(err, MlmError::ModelSpec(_)));
    }

    #[test]
    fn test_missing_outcome_column_is_fatal() {
        let df = sample_df();
        let rows: Vec<usize> = (0..8).collect();
        let spec = ModelSpec::new("m0_empty", "nope", "area");
        let err = RemlEstimator::default().fit(&df, &spec, &rows).unwrap_err();
        assert!(matches!(err, MlmError::ColumnNotFound(_)));
    }
}
