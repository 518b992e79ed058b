use sprs::TriMat;

use crate::data::{DataFrame, FactorColumn};
use crate::error::{MlmError, Result};
use crate::types::SparseMat;

use super::spec::FixedTerm;

/// Label for a single column in the fixed-effects design matrix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixedEffectLabel {
    /// The term this column belongs to ("intercept", a covariate name, or
    /// a factor name).
    pub term: String,
    /// The factor level this dummy column encodes, `None` for the
    /// intercept and for covariates.
    pub level: Option<String>,
}

impl FixedEffectLabel {
    /// Coefficient display name: "age", "sex[f]", "intercept".
    pub fn name(&self) -> String {
        match &self.level {
            Some(level) => format!("{}[{}]", self.term, level),
            None => self.term.clone(),
        }
    }
}

/// Levels of a factor actually observed within a row subset, in level-code
/// order, as (code, name) pairs.
fn observed_levels(factor: &FactorColumn, rows: &[usize], column: &str) -> Result<Vec<(usize, String)>> {
    let mut seen = vec![false; factor.n_levels()];
    for &i in rows {
        match factor.codes()[i] {
            Some(code) => seen[code] = true,
            None => {
                return Err(MlmError::Data(format!(
                    "Column '{}' has a missing value inside the fitting rows",
                    column
                )));
            }
        }
    }
    Ok(seen
        .iter()
        .enumerate()
        .filter(|(_, s)| **s)
        .map(|(code, _)| (code, factor.level_name(code).unwrap_or("").to_string()))
        .collect())
}

/// Build a fixed-effects design matrix (X) over a row subset.
///
/// - `Intercept` adds a column of ones.
/// - `Covariate` adds the column's values; a `NAN` inside the subset is a
///   data error (the caller owns listwise deletion).
/// - `Factor` expands into dummy variables over the levels observed in the
///   subset. When the term list contains an intercept, the first observed
///   level is the reference and gets no column, keeping the design full
///   rank; without an intercept every observed level gets a column.
///
/// Returns a sparse matrix of dimension (rows.len() x p) plus one label
/// per column.
pub fn build_fixed_design(
    df: &DataFrame,
    terms: &[FixedTerm],
    rows: &[usize],
) -> Result<(SparseMat, Vec<FixedEffectLabel>)> {
    let n = rows.len();
    if n == 0 {
        return Err(MlmError::Data("No observations to build design from".into()));
    }

    let has_intercept = terms.iter().any(|t| matches!(t, FixedTerm::Intercept));

    // First pass: count columns and collect labels.
    let mut total_cols = 0;
    let mut labels = Vec::new();

    for term in terms {
        match term {
            FixedTerm::Intercept => {
                labels.push(FixedEffectLabel {
                    term: "intercept".to_string(),
                    level: None,
                });
                total_cols += 1;
            }
            FixedTerm::Covariate(col_name) => {
                df.get_float(col_name)?;
                labels.push(FixedEffectLabel {
                    term: col_name.clone(),
                    level: None,
                });
                total_cols += 1;
            }
            FixedTerm::Factor(col_name) => {
                let factor = df.get_factor(col_name)?;
                let levels = observed_levels(factor, rows, col_name)?;
                let skip = usize::from(has_intercept);
                for (_, level_name) in levels.iter().skip(skip) {
                    labels.push(FixedEffectLabel {
                        term: col_name.clone(),
                        level: Some(level_name.clone()),
                    });
                    total_cols += 1;
                }
            }
        }
    }

    // Second pass: fill the triplets.
    let mut tri = TriMat::new((n, total_cols));
    let mut col_offset = 0;

    for term in terms {
        match term {
            FixedTerm::Intercept => {
                for i in 0..n {
                    tri.add_triplet(i, col_offset, 1.0);
                }
                col_offset += 1;
            }
            FixedTerm::Covariate(col_name) => {
                let values = df.get_float(col_name)?;
                for (i, &row) in rows.iter().enumerate() {
                    let val = values[row];
                    if val.is_nan() {
                        return Err(MlmError::Data(format!(
                            "Column '{}' has a missing value inside the fitting rows",
                            col_name
                        )));
                    }
                    if val != 0.0 {
                        tri.add_triplet(i, col_offset, val);
                    }
                }
                col_offset += 1;
            }
            FixedTerm::Factor(col_name) => {
                let factor = df.get_factor(col_name)?;
                let levels = observed_levels(factor, rows, col_name)?;
                let skip = usize::from(has_intercept);
                // Map level code -> dummy column index (reference level: none).
                let mut code_to_col = vec![None; factor.n_levels()];
                for (j, (code, _)) in levels.iter().enumerate().skip(skip) {
                    code_to_col[*code] = Some(col_offset + j - skip);
                }
                for (i, &row) in rows.iter().enumerate() {
                    let code = factor.codes()[row].expect("checked by observed_levels");
                    if let Some(col) = code_to_col[code] {
                        tri.add_triplet(i, col, 1.0);
                    }
                }
                col_offset += levels.len() - skip.min(levels.len());
            }
        }
    }

    Ok((tri.to_csc(), labels))
}

/// Build a random-effects design matrix (Z) for the grouping column over a
/// row subset.
///
/// Z is an incidence matrix mapping observations to group levels: for
/// observation i in group k, Z[i, k] = 1. Only levels observed within the
/// subset get a column, so the matrix never carries empty groups.
///
/// Returns a sparse matrix of dimension (rows.len() x q) and the q level
/// names in column order.
pub fn build_random_design(
    df: &DataFrame,
    column: &str,
    rows: &[usize],
) -> Result<(SparseMat, Vec<String>)> {
    let factor = match df.get_column(column)? {
        crate::data::Column::Factor(f) => f,
        _ => {
            return Err(MlmError::Data(format!(
                "Grouping column '{}' must be a Factor (coerce with as_factor before fitting)",
                column
            )));
        }
    };

    let levels = observed_levels(factor, rows, column)?;
    let q = levels.len();

    let mut code_to_col = vec![None; factor.n_levels()];
    for (j, (code, _)) in levels.iter().enumerate() {
        code_to_col[*code] = Some(j);
    }

    let mut tri = TriMat::new((rows.len(), q));
    for (i, &row) in rows.iter().enumerate() {
        let code = factor.codes()[row].expect("checked by observed_levels");
        tri.add_triplet(i, code_to_col[code].unwrap(), 1.0);
    }

    let level_names: Vec<String> = levels.into_iter().map(|(_, name)| name).collect();
    Ok((tri.to_csc(), level_names))
}
