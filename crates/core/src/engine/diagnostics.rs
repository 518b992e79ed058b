use nalgebra::DMatrix;

use crate::data::DataFrame;
use crate::error::Result;
use crate::lmm::FittedModel;
use crate::matrix::dense::solve_spd;

use super::columns::{AREA_ID, VIF_CANDIDATES};
use super::config::EngineConfig;

/// One row of the collinearity table. `vif` is `None` when the score is
/// undefined for that predictor (zero variance, or perfectly explained by
/// the other candidates).
#[derive(Debug, Clone)]
pub struct VifEntry {
    pub variable: String,
    pub vif: Option<f64>,
}

/// Distribution summary of the model residuals (population moments).
#[derive(Debug, Clone, Copy)]
pub struct MomentSummary {
    pub mean: f64,
    pub sd: f64,
    pub skewness: f64,
    /// Excess kurtosis (0 for a normal distribution).
    pub kurtosis: f64,
}

/// Distribution summary of the per-area random intercepts.
#[derive(Debug, Clone, Copy)]
pub struct RandomEffectSummary {
    pub mean: f64,
    pub sd: f64,
    pub min: f64,
    pub max: f64,
    /// Number of areas the estimates cover.
    pub count: usize,
}

/// Diagnostics for the richest model of the sequence.
#[derive(Debug, Clone)]
pub struct DiagnosticsReport {
    /// Collinearity table, one row per usable numeric predictor. Empty
    /// when fewer than two candidates are usable.
    pub vif: Vec<VifEntry>,
    /// Candidates whose VIF exceeds the configured threshold.
    pub high_vif: Vec<String>,
    pub residual_stats: MomentSummary,
    pub random_effect_stats: RandomEffectSummary,
    /// Distinct areas in the dataset, counted independently of the model.
    pub n_clusters: usize,
    /// Rows in the dataset, counted independently of the model.
    pub n_obs: usize,
}

impl DiagnosticsReport {
    pub fn summary(&self) -> String {
        let mut s = String::new();
        s.push_str("=== Model Diagnostics ===\n\n");

        s.push_str("--- Collinearity (VIF) ---\n");
        if self.vif.is_empty() {
            s.push_str("  (fewer than two usable predictors)\n");
        }
        for entry in &self.vif {
            match entry.vif {
                Some(v) => s.push_str(&format!("  {:<20} {:8.2}\n", entry.variable, v)),
                None => s.push_str(&format!("  {:<20} undefined\n", entry.variable)),
            }
        }
        if !self.high_vif.is_empty() {
            s.push_str(&format!("  High VIF: {}\n", self.high_vif.join(", ")));
        }

        s.push_str(&format!(
            "\n--- Residuals ---\n  mean={:.4} sd={:.4} skewness={:.2} kurtosis={:.2}\n",
            self.residual_stats.mean,
            self.residual_stats.sd,
            self.residual_stats.skewness,
            self.residual_stats.kurtosis
        ));

        let re = &self.random_effect_stats;
        s.push_str(&format!(
            "\n--- Random Effects ({} areas) ---\n  mean={:.4} sd={:.4} range=[{:.2}, {:.2}]\n",
            re.count, re.mean, re.sd, re.min, re.max
        ));

        s.push_str(&format!(
            "\nClusters: {}   Observations: {}\n",
            self.n_clusters, self.n_obs
        ));
        s
    }
}

/// Run the diagnostics suite against the richest model and the dataset.
///
/// The cluster and observation counts come from the dataset itself, not
/// from the model object, so reporting can cross-check the two.
pub fn run_diagnostics(
    m3: &dyn FittedModel,
    df: &DataFrame,
    config: &EngineConfig,
) -> Result<DiagnosticsReport> {
    let candidates: Vec<&str> = VIF_CANDIDATES
        .iter()
        .copied()
        .filter(|name| df.get_float(name).is_ok())
        .collect();
    let (vif, high_vif) = collinearity_table(df, &candidates, config.vif_threshold)?;

    if high_vif.is_empty() {
        log::info!("VIF OK (all < {})", config.vif_threshold);
    } else {
        log::warn!(
            "High VIF (>{}): {}",
            config.vif_threshold,
            high_vif.join(", ")
        );
    }

    let residual_stats = moments(m3.residuals());

    let re_values: Vec<f64> = m3
        .random_intercepts()
        .iter()
        .map(|e| e.estimate)
        .collect();
    let re_moments = moments(&re_values);
    let random_effect_stats = RandomEffectSummary {
        mean: re_moments.mean,
        sd: re_moments.sd,
        min: re_values.iter().cloned().fold(f64::INFINITY, f64::min),
        max: re_values.iter().cloned().fold(f64::NEG_INFINITY, f64::max),
        count: re_values.len(),
    };

    Ok(DiagnosticsReport {
        vif,
        high_vif,
        residual_stats,
        random_effect_stats,
        n_clusters: df.distinct_count(AREA_ID)?,
        n_obs: df.nrows(),
    })
}

/// Compute the collinearity table over a candidate list.
///
/// Rows with any missing candidate value are dropped, locally to this
/// computation. Each VIF comes from an auxiliary ordinary regression of
/// one candidate on the others (plus an intercept): VIF = 1 / (1 - R²).
/// A candidate with zero variance, or one perfectly explained by the
/// others, gets an undefined score instead of a division blow-up. With
/// fewer than two usable candidates the table is empty — that is not an
/// error.
pub fn collinearity_table(
    df: &DataFrame,
    candidates: &[&str],
    threshold: f64,
) -> Result<(Vec<VifEntry>, Vec<String>)> {
    if candidates.len() < 2 {
        return Ok((Vec::new(), Vec::new()));
    }

    let rows = df.complete_rows(candidates)?;
    if rows.is_empty() {
        return Ok((Vec::new(), Vec::new()));
    }

    // Gather the candidate columns over the complete rows.
    let mut data: Vec<Vec<f64>> = Vec::with_capacity(candidates.len());
    for name in candidates {
        let col = df.get_float(name)?;
        data.push(rows.iter().map(|&i| col[i]).collect());
    }

    let mut table = Vec::with_capacity(candidates.len());
    let mut high = Vec::new();

    for (j, name) in candidates.iter().enumerate() {
        let vif = auxiliary_vif(&data, j);
        if let Some(v) = vif {
            if v > threshold {
                high.push((*name).to_string());
            }
        }
        table.push(VifEntry {
            variable: (*name).to_string(),
            vif,
        });
    }

    Ok((table, high))
}

/// VIF of candidate `target` from an auxiliary OLS on the remaining
/// candidates. Returns `None` where the score is undefined.
fn auxiliary_vif(data: &[Vec<f64>], target: usize) -> Option<f64> {
    let n = data[0].len();
    let y = &data[target];

    let y_mean = y.iter().sum::<f64>() / n as f64;
    let sst: f64 = y.iter().map(|v| (v - y_mean).powi(2)).sum();
    if sst <= 1e-12 {
        // Zero-variance candidate: R² has no meaning here.
        return None;
    }

    // Design: intercept plus every other candidate.
    let others: Vec<&Vec<f64>> = data
        .iter()
        .enumerate()
        .filter(|(j, _)| *j != target)
        .map(|(_, col)| col)
        .collect();
    let k = others.len() + 1;

    let x = DMatrix::from_fn(n, k, |i, j| if j == 0 { 1.0 } else { others[j - 1][i] });
    let xtx = x.transpose() * &x;
    let xty: Vec<f64> = (0..k)
        .map(|j| (0..n).map(|i| x[(i, j)] * y[i]).sum())
        .collect();

    let beta = solve_spd(&xtx, &xty)?;

    let mut ssr = 0.0;
    for i in 0..n {
        let fitted: f64 = (0..k).map(|j| x[(i, j)] * beta[j]).sum();
        ssr += (y[i] - fitted).powi(2);
    }

    let r2 = (1.0 - ssr / sst).clamp(0.0, 1.0);
    if 1.0 - r2 <= 1e-12 {
        // Perfectly explained by the other candidates.
        return None;
    }
    Some(1.0 / (1.0 - r2))
}

/// Population moments: mean, sd, skewness, excess kurtosis.
fn moments(values: &[f64]) -> MomentSummary {
    let n = values.len();
    if n == 0 {
        return MomentSummary {
            mean: 0.0,
            sd: 0.0,
            skewness: 0.0,
            kurtosis: 0.0,
        };
    }

    let mean = values.iter().sum::<f64>() / n as f64;
    let m2 = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n as f64;
    if m2 <= 0.0 {
        return MomentSummary {
            mean,
            sd: 0.0,
            skewness: 0.0,
            kurtosis: 0.0,
        };
    }
    let m3 = values.iter().map(|v| (v - mean).powi(3)).sum::<f64>() / n as f64;
    let m4 = values.iter().map(|v| (v - mean).powi(4)).sum::<f64>() / n as f64;

    MomentSummary {
        mean,
        sd: m2.sqrt(),
        skewness: m3 / m2.powf(1.5),
        kurtosis: m4 / (m2 * m2) - 3.0,
    }
}
