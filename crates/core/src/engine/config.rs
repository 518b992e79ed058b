use crate::error::{MlmError, Result};

/// Engine tunables, read once at engine start.
#[derive(Debug, Clone, Copy)]
pub struct EngineConfig {
    /// A predictor with a VIF above this is flagged as practically
    /// unusable (its coefficient variance is badly inflated).
    pub vif_threshold: f64,
    /// Two-sided confidence level for the sensitivity significance flag.
    pub confidence_level: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            vif_threshold: 5.0,
            confidence_level: 0.95,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.vif_threshold >= 1.0) {
            return Err(MlmError::InvalidParameter(format!(
                "vif_threshold must be >= 1, got {}",
                self.vif_threshold
            )));
        }
        if !(self.confidence_level > 0.0 && self.confidence_level < 1.0) {
            return Err(MlmError::InvalidParameter(format!(
                "confidence_level must be in (0, 1), got {}",
                self.confidence_level
            )));
        }
        Ok(())
    }

    /// The two-sided critical z-value for the configured confidence level
    /// (1.96 at 0.95).
    pub fn critical_z(&self) -> f64 {
        normal_quantile(1.0 - (1.0 - self.confidence_level) / 2.0)
    }
}

/// Quantile function of the standard normal distribution.
///
/// Acklam's rational approximation: relative error below 1.15e-9 over the
/// whole open unit interval, far tighter than anything a significance
/// threshold needs.
pub(crate) fn normal_quantile(p: f64) -> f64 {
    debug_assert!(p > 0.0 && p < 1.0);

    const A: [f64; 6] = [
        -3.969683028665376e+01,
        2.209460984245205e+02,
        -2.759285104469687e+02,
        1.383577518672690e+02,
        -3.066479806614716e+01,
        2.506628277459239e+00,
    ];
    const B: [f64; 5] = [
        -5.447609879822406e+01,
        1.615858368580409e+02,
        -1.556989798598866e+02,
        6.680131188771972e+01,
        -1.328068155288572e+01,
    ];
    const C: [f64; 6] = [
        -7.784894002430293e-03,
        -3.223964580411365e-01,
        -2.400758277161838e+00,
        -2.549732539343734e+00,
        4.374664141464968e+00,
        2.938163982698783e+00,
    ];
    const D: [f64; 4] = [
        7.784695709041462e-03,
        3.224671290700398e-01,
        2.445134137142996e+00,
        3.754408661907416e+00,
    ];

    const P_LOW: f64 = 0.02425;
    const P_HIGH: f64 = 1.0 - P_LOW;

    if p < P_LOW {
        let q = (-2.0 * p.ln()).sqrt();
        (((((C[0] * q + C[1]) * q + C[2]) * q + C[3]) * q + C[4]) * q + C[5])
            / ((((D[0] * q + D[1]) * q + D[2]) * q + D[3]) * q + 1.0)
    } else if p <= P_HIGH {
        let q = p - 0.5;
        let r = q * q;
        (((((A[0] * r + A[1]) * r + A[2]) * r + A[3]) * r + A[4]) * r + A[5]) * q
            / (((((B[0] * r + B[1]) * r + B[2]) * r + B[3]) * r + B[4]) * r + 1.0)
    } else {
        let q = (-2.0 * (1.0 - p).ln()).sqrt();
        -(((((C[0] * q + C[1]) * q + C[2]) * q + C[3]) * q + C[4]) * q + C[5])
            / ((((D[0] * q + D[1]) * q + D[2]) * q + D[3]) * q + 1.0)
    }
}
