//! The multilevel modeling and diagnostics engine.
//!
//! Consumes one analysis-ready [`DataFrame`](crate::data::DataFrame) and
//! produces four in-memory result objects: the nested model sequence, the
//! variance decomposition, the diagnostics report, and the sensitivity
//! table. No file I/O happens here.

pub mod columns;
mod config;
mod diagnostics;
mod icc;
mod sensitivity;
mod sequence;

pub use config::EngineConfig;
pub use diagnostics::{
    collinearity_table, run_diagnostics, DiagnosticsReport, MomentSummary, RandomEffectSummary,
    VifEntry,
};
pub use icc::{variance_decomposition, VarianceDecomposition};
pub use sensitivity::{run_sensitivity, SensitivityRow, SensitivityTable, SpecFailure};
pub use sequence::{fit_model_sequence, ModelSequence};

use crate::data::DataFrame;
use crate::error::Result;
use crate::lmm::RemlEstimator;

/// The combined output of a full engine run.
pub struct AnalysisReport {
    pub models: ModelSequence,
    pub icc: VarianceDecomposition,
    pub diagnostics: DiagnosticsReport,
    pub sensitivity: SensitivityTable,
}

/// Run the whole pipeline: the four nested fits, then the variance
/// decomposition and diagnostics they feed, then the sensitivity table
/// (which re-fits independently of the main sequence).
///
/// Fatal conditions in the main sequence, the decomposition, or the
/// diagnostics propagate; sensitivity specifications fail individually
/// and are reported in the table's failure list instead.
pub fn analyze(df: &DataFrame, config: &EngineConfig) -> Result<AnalysisReport> {
    config.validate()?;
    let estimator = RemlEstimator::default();

    let models = fit_model_sequence(df, &estimator)?;
    let icc = variance_decomposition(models.m0_empty.as_ref())?;
    let diagnostics = run_diagnostics(models.m3_area.as_ref(), df, config)?;
    let sensitivity = run_sensitivity(df, &estimator, config)?;

    Ok(AnalysisReport {
        models,
        icc,
        diagnostics,
        sensitivity,
    })
}

#[cfg(test)]
pub(crate) mod testdata {
    use super::columns::{AREA_ID, KEY_PREDICTOR, OUTCOME};
    use crate::data::DataFrame;

    /// Synthetic survey: 10 areas x 20 respondents with all contract
    /// columns, genuine area-level variation, and deterministic noise.
    pub(crate) fn survey_df() -> DataFrame {
        let key_by_area = [12.0, 30.0, 18.0, 44.0, 25.0, 37.0, 9.0, 51.0, 21.0, 33.0];
        let dens = [
            520.0, 780.0, 1300.0, 450.0, 980.0, 1600.0, 610.0, 2100.0, 870.0, 1150.0,
        ];
        let over65 = [12.0, 19.0, 9.0, 22.0, 15.0, 11.0, 25.0, 8.0, 17.0, 14.0];
        let nonwest = [5.0, 14.0, 22.0, 3.0, 9.0, 31.0, 6.0, 27.0, 12.0, 18.0];
        let low_inc = [45.0, 22.0, 39.0, 31.0, 55.0, 28.0, 47.0, 36.0, 51.0, 25.0];
        let soc_min = [11.0, 4.0, 14.0, 6.0, 3.0, 9.0, 12.0, 7.0, 15.0, 5.0];
        let area_shift = [4.0, -3.0, 2.0, -5.0, 6.0, -1.0, 3.0, -4.0, 1.0, -2.0];

        let n_areas = 10;
        let per_area = 20;

        let mut outcome = Vec::new();
        let mut key = Vec::new();
        let mut age = Vec::new();
        let mut education = Vec::new();
        let mut born = Vec::new();
        let mut sex = Vec::new();
        let mut employment = Vec::new();
        let mut area = Vec::new();
        let mut b_dens = Vec::new();
        let mut b_over65 = Vec::new();
        let mut b_nonwest = Vec::new();
        let mut b_low_inc = Vec::new();
        let mut b_soc_min = Vec::new();

        for a in 0..n_areas {
            for i in 0..per_area {
                let age_v = 20.0 + ((a * 7 + i * 3) % 50) as f64;
                let edu_v = ((a + i) % 5) as f64;
                let noise = (((a * 31 + i * 17) % 11) as f64 - 5.0) * 0.8;

                outcome.push(
                    70.0 - 0.6 * key_by_area[a] + 0.05 * age_v + 1.2 * edu_v
                        + area_shift[a]
                        + noise,
                );
                key.push(key_by_area[a]);
                age.push(age_v);
                education.push(edu_v);
                born.push(if i % 10 == 0 { 0.0 } else { 1.0 });
                sex.push(if i % 2 == 0 { "f" } else { "m" });
                employment.push(["employed", "unemployed", "retired"][(a + i) % 3]);
                area.push(format!("BU{:04}", a));
                b_dens.push(dens[a]);
                b_over65.push(over65[a]);
                b_nonwest.push(nonwest[a]);
                b_low_inc.push(low_inc[a]);
                b_soc_min.push(soc_min[a]);
            }
        }

        let area_refs: Vec<&str> = area.iter().map(|s| s.as_str()).collect();

        let mut df = DataFrame::new();
        df.add_float_column(OUTCOME, outcome).unwrap();
        df.add_float_column(KEY_PREDICTOR, key).unwrap();
        df.add_float_column("age", age).unwrap();
        df.add_float_column("education", education).unwrap();
        df.add_float_column("born_in_nl", born).unwrap();
        df.add_factor_column("sex", &sex).unwrap();
        df.add_factor_column("employment_status", &employment)
            .unwrap();
        df.add_factor_column(AREA_ID, &area_refs).unwrap();
        df.add_float_column("b_pop_dens", b_dens).unwrap();
        df.add_float_column("b_pop_over_65", b_over65).unwrap();
        df.add_float_column("b_pop_nonwest", b_nonwest).unwrap();
        df.add_float_column("b_perc_low_inc_hh", b_low_inc).unwrap();
        df.add_float_column("b_perc_soc_min_hh", b_soc_min).unwrap();
        df
    }
}
