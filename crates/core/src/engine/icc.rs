use crate::error::{MlmError, Result};
use crate::lmm::FittedModel;

/// Estimation backends floor variance components near 1e-10 rather than
/// letting them reach zero exactly; a total at this scale still means a
/// degenerate fit.
const DEGENERATE_TOTAL: f64 = 1e-8;

/// Decomposition of the outcome variance into between-area and within-area
/// components, from the empty model.
#[derive(Debug, Clone, Copy)]
pub struct VarianceDecomposition {
    /// Between-area (random-intercept) variance.
    pub between: f64,
    /// Within-area (residual) variance.
    pub within: f64,
    /// `between + within`, exactly.
    pub total: f64,
    /// Intraclass correlation: `between / total`, in [0, 1].
    pub icc: f64,
    /// Between share as a percentage; sums to 100 with `pct_within`.
    pub pct_between: f64,
    /// Within share as a percentage.
    pub pct_within: f64,
}

impl VarianceDecomposition {
    pub fn summary(&self) -> String {
        format!(
            "=== Variance Decomposition ===\n\n\
             Variance (area):     {:.4} ({:.1}%)\n\
             Variance (residual): {:.4} ({:.1}%)\n\
             ICC: {:.4}\n\
             {:.1}% of outcome variance lies between neighborhoods\n",
            self.between, self.pct_between, self.within, self.pct_within, self.icc, self.pct_between
        )
    }
}

/// Compute the intraclass correlation from the empty model.
///
/// ICC = sigma^2_area / (sigma^2_area + sigma^2_residual): the share of
/// outcome variance attributable to differences between areas rather than
/// between individuals within an area. The model passed in must be the
/// intercept-only fit; richer models condition the variance components on
/// their covariates and would not decompose the raw outcome.
///
/// # Errors
/// [`MlmError::DegenerateVariance`] if the total variance is zero (or not
/// finite) — there is no meaningful answer, and returning NaN silently
/// would poison everything downstream.
pub fn variance_decomposition(m0: &dyn FittedModel) -> Result<VarianceDecomposition> {
    let between = m0.group_variance();
    let within = m0.residual_variance();

    if between < 0.0 || within < 0.0 {
        return Err(MlmError::InvalidParameter(format!(
            "negative variance component from model '{}': between={}, within={}",
            m0.label(),
            between,
            within
        )));
    }

    let total = between + within;
    if !(total > DEGENERATE_TOTAL) {
        return Err(MlmError::DegenerateVariance {
            context: format!("model '{}'", m0.label()),
        });
    }

    let icc = between / total;
    log::info!(
        "ICC = {:.4} (between {:.2}, within {:.2})",
        icc,
        between,
        within
    );

    Ok(VarianceDecomposition {
        between,
        within,
        total,
        icc,
        pct_between: 100.0 * between / total,
        pct_within: 100.0 * within / total,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lmm::{AreaEffect, Coefficient};
    use approx::assert_relative_eq;

    /// Minimal stand-in fitted model with settable variance components.
    #[derive(Debug)]
    struct StubModel {
        between: f64,
        within: f64,
    }

    impl FittedModel for StubModel {
        fn label(&self) -> &str {
            "m0_empty"
        }
        fn coefficients(&self) -> &[Coefficient] {
            &[]
        }
        fn residuals(&self) -> &[f64] {
            &[]
        }
        fn random_intercepts(&self) -> &[AreaEffect] {
            &[]
        }
        fn group_variance(&self) -> f64 {
            self.between
        }
        fn residual_variance(&self) -> f64 {
            self.within
        }
        fn n_obs(&self) -> usize {
            0
        }
        fn n_groups(&self) -> usize {
            0
        }
    }

    #[test]
    fn test_decomposition_basic() {
        let m0 = StubModel {
            between: 25.0,
            within: 75.0,
        };
        let vd = variance_decomposition(&m0).unwrap();
        assert_relative_eq!(vd.icc, 0.25);
        assert_relative_eq!(vd.total, 100.0);
        assert_relative_eq!(vd.pct_between, 25.0);
        assert_relative_eq!(vd.pct_within, 75.0);
        assert_relative_eq!(vd.pct_between + vd.pct_within, 100.0);
        assert_relative_eq!(vd.between + vd.within, vd.total);
    }

    #[test]
    fn test_icc_bounds() {
        let all_between = StubModel {
            between: 10.0,
            within: 0.0,
        };
        assert_relative_eq!(variance_decomposition(&all_between).unwrap().icc, 1.0);

        let all_within = StubModel {
            between: 0.0,
            within: 10.0,
        };
        assert_relative_eq!(variance_decomposition(&all_within).unwrap().icc, 0.0);
    }

    #[test]
    fn test_degenerate_errors() {
        let degenerate = StubModel {
            between: 0.0,
            within: 0.0,
        };
        let err = variance_decomposition(&degenerate).unwrap_err();
        assert!(matches!(err, MlmError::DegenerateVariance { .. }));
    }

    #[test]
    fn test_floored_variances_still_degenerate() {
        // A backend that floors its components at 1e-10 reports these for
        // a constant outcome; they must not produce ICC = 0.5.
        let degenerate = StubModel {
            between: 1e-10,
            within: 1e-10,
        };
        let err = variance_decomposition(&degenerate).unwrap_err();
        assert!(matches!(err, MlmError::DegenerateVariance { .. }));
    }

    #[test]
    fn test_nan_variance_errors() {
        let bad = StubModel {
            between: f64::NAN,
            within: 1.0,
        };
        assert!(variance_decomposition(&bad).is_err());
    }

    #[test]
    fn test_negative_variance_errors() {
        let bad = StubModel {
            between: -1.0,
            within: 2.0,
        };
        let err = variance_decomposition(&bad).unwrap_err();
        assert!(matches!(err, MlmError::InvalidParameter(_)));
    }
}
