use crate::error::{MlmError, Result};
use crate::matrix::sparse::{spmv, xt_y};
use crate::types::SparseMat;

use super::mme::MixedModelEquations;

/// Variance estimates never drop below this floor, so a boundary fit
/// (a variance component shrinking to zero) stays numerically solvable.
const VAR_FLOOR: f64 = 1e-10;

/// REML engine using the EM algorithm for the two variance components of a
/// random-intercept model.
///
/// EM-REML update formulas (Henderson Method III):
///
///   sigma^2_u = (u'u + tr(C^{-1}_{uu})) / q
///   sigma^2_e = y'e_hat / (n - p)
///
/// where e_hat = y - X*b_hat - Z*u_hat and C^{-1} is the inverse of the
/// MME coefficient matrix.
///
/// Convergence is declared when either the relative change in the variance
/// parameters or the relative change in the restricted log-likelihood
/// drops below the tolerance; the likelihood criterion is what terminates
/// boundary fits, where a variance component decays toward zero only
/// sublinearly in the parameter metric.
#[derive(Debug, Clone)]
pub struct EmReml {
    pub max_iter: usize,
    pub tol: f64,
    /// Emit per-iteration progress at `debug` level. Off by default so a
    /// fit inside a larger pipeline stays quiet without touching any
    /// global logger state.
    pub log_progress: bool,
}

impl Default for EmReml {
    fn default() -> Self {
        Self {
            max_iter: 500,
            tol: 1e-6,
            log_progress: false,
        }
    }
}

/// Raw output of one REML estimation, consumed by the fitted-model layer.
#[derive(Debug, Clone)]
pub struct RemlEstimate {
    pub fixed: Vec<f64>,
    pub fixed_se: Vec<f64>,
    pub random: Vec<f64>,
    pub sigma2_group: f64,
    pub sigma2_resid: f64,
    pub residuals: Vec<f64>,
    pub log_likelihood: f64,
    pub n_iterations: usize,
}

impl EmReml {
    pub fn new(max_iter: usize, tol: f64) -> Self {
        Self {
            max_iter,
            tol,
            log_progress: false,
        }
    }

    /// Fit a random-intercept model by EM-REML.
    ///
    /// # Errors
    /// - [`MlmError::NotConverged`] if the tolerance is not reached within
    ///   `max_iter` iterations.
    /// - [`MlmError::NotPositiveDefinite`] if the MME system is singular.
    /// - [`MlmError::ModelSpec`] if there are no residual degrees of
    ///   freedom or no groups.
    pub fn fit(&self, y: &[f64], x: &SparseMat, z: &SparseMat) -> Result<RemlEstimate> {
        let n = y.len();
        let p = x.cols();
        let q = z.cols();

        if q == 0 {
            return Err(MlmError::ModelSpec(
                "Random-intercept fit requires at least one group".into(),
            ));
        }
        if n <= p {
            return Err(MlmError::ModelSpec(format!(
                "{} observations cannot support {} fixed-effect parameters",
                n, p
            )));
        }
        let n_eff = (n - p) as f64;

        // Initialize by splitting the sample variance between components.
        let y_mean: f64 = y.iter().sum::<f64>() / n as f64;
        let y_var: f64 =
            y.iter().map(|&yi| (yi - y_mean).powi(2)).sum::<f64>() / (n - 1).max(1) as f64;
        let init_var = (y_var / 2.0).max(0.01);

        let mut sigma2_u = init_var;
        let mut sigma2_e = init_var;

        let y_dot_y: f64 = y.iter().map(|yi| yi * yi).sum();
        let xty = xt_y(x, y);
        let zty = xt_y(z, y);

        let mut prev_logl = f64::NEG_INFINITY;
        let mut last_change = f64::INFINITY;
        let mut converged = false;
        let mut n_iterations = 0;

        for iter in 0..self.max_iter {
            let mme =
                MixedModelEquations::assemble(x, z, y, 1.0 / sigma2_e, 1.0 / sigma2_u);
            let sol = mme.solve()?;

            let old_sigma2_u = sigma2_u;
            let old_sigma2_e = sigma2_e;

            // --- EM update for the residual variance ---
            // y'e_hat = y'y - b'X'y - u'Z'y
            let mut y_e_hat = y_dot_y;
            for i in 0..p {
                y_e_hat -= sol.fixed_effects[i] * xty[i];
            }
            for j in 0..q {
                y_e_hat -= sol.random_effects[j] * zty[j];
            }
            sigma2_e = (y_e_hat / n_eff).max(VAR_FLOOR);

            // --- EM update for the group variance ---
            let u_quadratic: f64 = sol.random_effects.iter().map(|u| u * u).sum();
            let trace_term: f64 = (0..q).map(|i| sol.c_inv[(p + i, p + i)]).sum();
            sigma2_u = ((u_quadratic + trace_term) / q as f64).max(VAR_FLOOR);

            // Restricted log-likelihood at the old parameter values.
            let logl = restricted_logl(
                y_dot_y,
                &sol.solution,
                &mme.rhs,
                sol.log_det_c,
                old_sigma2_e,
                old_sigma2_u,
                n,
                q,
                n_eff,
            );

            // Relative change in the parameter vector.
            let param_diff = ((sigma2_u - old_sigma2_u).powi(2)
                + (sigma2_e - old_sigma2_e).powi(2))
            .sqrt();
            let param_norm = (old_sigma2_u.powi(2) + old_sigma2_e.powi(2))
                .sqrt()
                .max(1e-10);
            let rel_change = param_diff / param_norm;

            // Relative change in the log-likelihood.
            let logl_change = (logl - prev_logl).abs() / (1.0 + logl.abs());
            prev_logl = logl;

            last_change = rel_change;
            n_iterations = iter + 1;

            if self.log_progress {
                log::debug!(
                    "REML iter {}: logl={:.4} sigma2_u={:.6} sigma2_e={:.6} change={:.2e}",
                    n_iterations,
                    logl,
                    sigma2_u,
                    sigma2_e,
                    rel_change
                );
            }

            if iter > 0 && (rel_change < self.tol || logl_change < self.tol) {
                converged = true;
                break;
            }
        }

        if !converged {
            return Err(MlmError::NotConverged {
                iterations: n_iterations,
                change: last_change,
            });
        }

        // Final solve with the converged parameters.
        let mme = MixedModelEquations::assemble(x, z, y, 1.0 / sigma2_e, 1.0 / sigma2_u);
        let sol = mme.solve()?;

        let log_likelihood = restricted_logl(
            y_dot_y,
            &sol.solution,
            &mme.rhs,
            sol.log_det_c,
            sigma2_e,
            sigma2_u,
            n,
            q,
            n_eff,
        );

        let fixed_se: Vec<f64> = (0..p).map(|i| sol.c_inv[(i, i)].sqrt()).collect();

        // Residuals: e = y - Xb - Zu.
        let xb = spmv(x, &sol.fixed_effects);
        let zu = spmv(z, &sol.random_effects);
        let residuals: Vec<f64> = (0..n).map(|i| y[i] - xb[i] - zu[i]).collect();

        Ok(RemlEstimate {
            fixed: sol.fixed_effects,
            fixed_se,
            random: sol.random_effects,
            sigma2_group: sigma2_u,
            sigma2_resid: sigma2_e,
            residuals,
            log_likelihood,
            n_iterations,
        })
    }
}

/// REML log-likelihood:
/// -0.5 * (n_eff*ln(2pi) + ln|R| + ln|G| + ln|C| + y'Py)
#[allow(clippy::too_many_arguments)]
fn restricted_logl(
    y_dot_y: f64,
    solution: &[f64],
    rhs: &[f64],
    log_det_c: f64,
    sigma2_e: f64,
    sigma2_u: f64,
    n: usize,
    q: usize,
    n_eff: f64,
) -> f64 {
    let y_r_inv_y = y_dot_y / sigma2_e;
    let sol_rhs: f64 = solution.iter().zip(rhs.iter()).map(|(s, r)| s * r).sum();
    let y_p_y = y_r_inv_y - sol_rhs;

    let log_det_r = n as f64 * sigma2_e.ln();
    let log_det_g = q as f64 * sigma2_u.ln();
    let log_2_pi = (2.0 * std::f64::consts::PI).ln();

    -0.5 * (n_eff * log_2_pi + log_det_r + log_det_g + log_det_c + y_p_y)
}
