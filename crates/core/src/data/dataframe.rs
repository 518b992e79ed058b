use indexmap::IndexMap;
use std::collections::BTreeSet;

use super::factor::FactorColumn;
use crate::error::{MlmError, Result};

/// A single column in a [`DataFrame`]: floating-point or categorical.
///
/// Float columns use `f64::NAN` to mark a missing observation; factor
/// columns carry `None` codes. There is no separate integer type — survey
/// indicators like a 0/1 nativity flag are stored as floats, matching how
/// the analysis treats them.
#[derive(Debug, Clone)]
pub enum Column {
    /// A column of 64-bit floating-point values (`NAN` = missing).
    Float(Vec<f64>),
    /// A categorical column with string levels mapped to integer codes.
    Factor(FactorColumn),
}

impl Column {
    /// Returns the number of elements in the column.
    pub fn len(&self) -> usize {
        match self {
            Column::Float(v) => v.len(),
            Column::Factor(f) => f.len(),
        }
    }

    /// Returns `true` if the column is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `true` if the observation at `row` is present (non-missing).
    pub fn is_present(&self, row: usize) -> bool {
        match self {
            Column::Float(v) => !v[row].is_nan(),
            Column::Factor(f) => f.codes()[row].is_some(),
        }
    }
}

/// A lightweight columnar DataFrame for multilevel survey data.
///
/// Columns are stored in insertion order using an [`IndexMap`]. All columns
/// must have the same number of rows. The frame is the engine's read-only
/// input: every operation that needs a modified frame clones first.
#[derive(Debug, Clone)]
pub struct DataFrame {
    /// Ordered map of column name -> column data.
    pub(crate) columns: IndexMap<String, Column>,
    /// Number of rows (observations). Zero when the DataFrame is empty.
    pub(crate) nrows: usize,
}

impl DataFrame {
    /// Create an empty DataFrame with no columns and no rows.
    pub fn new() -> Self {
        DataFrame {
            columns: IndexMap::new(),
            nrows: 0,
        }
    }

    /// Add a floating-point column. `NAN` entries count as missing.
    ///
    /// # Errors
    /// Returns an error if the column length does not match existing rows,
    /// or if a column with the same name already exists.
    pub fn add_float_column(&mut self, name: &str, data: Vec<f64>) -> Result<()> {
        self.validate_and_insert(name, Column::Float(data))
    }

    /// Add a factor (categorical) column from a slice of string values.
    ///
    /// Levels are auto-discovered in order of first appearance.
    ///
    /// # Errors
    /// Returns an error if the column length does not match existing rows,
    /// or if a column with the same name already exists.
    pub fn add_factor_column(&mut self, name: &str, data: &[&str]) -> Result<()> {
        let factor = FactorColumn::new(data);
        self.validate_and_insert(name, Column::Factor(factor))
    }

    /// Add a factor column where `None` marks a missing observation.
    pub fn add_factor_column_with_missing(
        &mut self,
        name: &str,
        data: &[Option<&str>],
    ) -> Result<()> {
        let factor = FactorColumn::from_options(data);
        self.validate_and_insert(name, Column::Factor(factor))
    }

    /// Retrieve a column by name.
    ///
    /// # Errors
    /// Returns [`MlmError::ColumnNotFound`] if no column with the given name exists.
    pub fn get_column(&self, name: &str) -> Result<&Column> {
        self.columns
            .get(name)
            .ok_or_else(|| MlmError::ColumnNotFound(name.to_string()))
    }

    /// Retrieve a float column's data as a slice.
    ///
    /// # Errors
    /// Returns an error if the column does not exist or is not a `Float` column.
    pub fn get_float(&self, name: &str) -> Result<&[f64]> {
        match self.get_column(name)? {
            Column::Float(v) => Ok(v.as_slice()),
            _ => Err(MlmError::Data(format!(
                "Column '{}' is not a Float column",
                name
            ))),
        }
    }

    /// Retrieve a factor column reference.
    ///
    /// # Errors
    /// Returns an error if the column does not exist or is not a `Factor` column.
    pub fn get_factor(&self, name: &str) -> Result<&FactorColumn> {
        match self.get_column(name)? {
            Column::Factor(f) => Ok(f),
            _ => Err(MlmError::Data(format!(
                "Column '{}' is not a Factor column",
                name
            ))),
        }
    }

    /// Returns `true` if a column with the given name exists.
    pub fn has_column(&self, name: &str) -> bool {
        self.columns.contains_key(name)
    }

    /// Returns the number of rows.
    pub fn nrows(&self) -> usize {
        self.nrows
    }

    /// Returns the number of columns.
    pub fn ncols(&self) -> usize {
        self.columns.len()
    }

    /// Returns a vector of column names in insertion order.
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.keys().map(|s| s.as_str()).collect()
    }

    /// Number of non-missing observations in a column.
    pub fn non_missing_count(&self, name: &str) -> Result<usize> {
        Ok(match self.get_column(name)? {
            Column::Float(v) => v.iter().filter(|x| !x.is_nan()).count(),
            Column::Factor(f) => f.non_missing_count(),
        })
    }

    /// Number of distinct observed values in a column (missing excluded).
    ///
    /// For factors this is the number of levels actually observed; for
    /// floats, the number of distinct non-NaN values.
    pub fn distinct_count(&self, name: &str) -> Result<usize> {
        Ok(match self.get_column(name)? {
            Column::Factor(f) => f.distinct_observed(),
            Column::Float(v) => {
                let set: BTreeSet<u64> = v
                    .iter()
                    .filter(|x| !x.is_nan())
                    .map(|x| x.to_bits())
                    .collect();
                set.len()
            }
        })
    }

    /// Row indices where every named column is non-missing.
    ///
    /// This is listwise deletion expressed as a row-index set: the frame is
    /// never mutated, and the set is local to whatever computation asked
    /// for it.
    ///
    /// # Errors
    /// Returns [`MlmError::ColumnNotFound`] if any named column is absent.
    pub fn complete_rows(&self, names: &[&str]) -> Result<Vec<usize>> {
        let cols: Vec<&Column> = names
            .iter()
            .map(|n| self.get_column(n))
            .collect::<Result<_>>()?;

        Ok((0..self.nrows)
            .filter(|&i| cols.iter().all(|c| c.is_present(i)))
            .collect())
    }

    /// Coerce an existing column to a `Factor` column in-place.
    ///
    /// - If the column is already a `Factor`, this is a no-op.
    /// - If the column is `Float`, every non-missing value must be integral;
    ///   each distinct value becomes a level (sorted numerically, so the
    ///   level ordering is deterministic) and `NAN` entries become missing
    ///   codes. Fractional values are a data error, never truncated.
    ///
    /// Mixed-effects estimation requires discrete group labels, so the
    /// grouping column goes through this before any fit.
    ///
    /// # Errors
    /// Returns an error if the column does not exist or holds fractional values.
    pub fn as_factor(&mut self, name: &str) -> Result<()> {
        let col = self
            .columns
            .get(name)
            .ok_or_else(|| MlmError::ColumnNotFound(name.to_string()))?;

        let new_col = match col {
            Column::Factor(_) => return Ok(()),
            Column::Float(vals) => {
                let mut unique: Vec<i64> = Vec::new();
                for &v in vals.iter() {
                    if v.is_nan() {
                        continue;
                    }
                    if v.fract() != 0.0 {
                        return Err(MlmError::Data(format!(
                            "Cannot coerce column '{}' to Factor: non-integral value {}",
                            name, v
                        )));
                    }
                    unique.push(v as i64);
                }
                unique.sort_unstable();
                unique.dedup();

                let mut levels = IndexMap::new();
                for (i, &val) in unique.iter().enumerate() {
                    levels.insert(val.to_string(), i);
                }

                let codes: Vec<Option<usize>> = vals
                    .iter()
                    .map(|v| {
                        if v.is_nan() {
                            None
                        } else {
                            Some(levels[&(*v as i64).to_string()])
                        }
                    })
                    .collect();

                Column::Factor(FactorColumn::from_parts(levels, codes))
            }
        };

        // Replace the column in the map.
        *self.columns.get_mut(name).unwrap() = new_col;
        Ok(())
    }

    // ---- internal helpers ----

    /// Validate column length and name uniqueness, then insert.
    pub(crate) fn validate_and_insert(&mut self, name: &str, column: Column) -> Result<()> {
        if self.columns.contains_key(name) {
            return Err(MlmError::Data(format!(
                "Column '{}' already exists in DataFrame",
                name
            )));
        }

        let col_len = column.len();

        if self.columns.is_empty() {
            self.nrows = col_len;
        } else if col_len != self.nrows {
            return Err(MlmError::DimensionMismatch {
                expected: self.nrows,
                got: col_len,
                context: format!("adding column '{}'", name),
            });
        }

        self.columns.insert(name.to_string(), column);
        Ok(())
    }
}

impl Default for DataFrame {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_df() -> DataFrame {
        let mut df = DataFrame::new();
        df.add_float_column("support", vec![52.0, 31.0, f64::NAN, 47.0])
            .unwrap();
        df.add_float_column("area_code", vec![12.0, 3.0, 12.0, 3.0])
            .unwrap();
        df.add_factor_column("sex", &["f", "m", "f", "m"]).unwrap();
        df
    }

    #[test]
    fn test_new_is_empty() {
        let df = DataFrame::new();
        assert_eq!(df.nrows(), 0);
        assert_eq!(df.ncols(), 0);
        assert!(df.column_names().is_empty());
    }

    #[test]
    fn test_add_columns_and_dimensions() {
        let df = sample_df();
        assert_eq!(df.nrows(), 4);
        assert_eq!(df.ncols(), 3);
        assert_eq!(df.column_names(), vec!["support", "area_code", "sex"]);
    }

    #[test]
    fn test_get_float() {
        let df = sample_df();
        let vals = df.get_float("area_code").unwrap();
        assert_eq!(vals, &[12.0, 3.0, 12.0, 3.0]);
    }

    #[test]
    fn test_get_column_not_found() {
        let df = sample_df();
        let err = df.get_column("missing").unwrap_err();
        assert!(matches!(err, MlmError::ColumnNotFound(_)));
    }

    #[test]
    fn test_get_float_wrong_type() {
        let df = sample_df();
        let err = df.get_float("sex").unwrap_err();
        assert!(matches!(err, MlmError::Data(_)));
    }

    #[test]
    fn test_has_column() {
        let df = sample_df();
        assert!(df.has_column("sex"));
        assert!(!df.has_column("occupation"));
    }

    #[test]
    fn test_non_missing_count() {
        let df = sample_df();
        assert_eq!(df.non_missing_count("support").unwrap(), 3);
        assert_eq!(df.non_missing_count("sex").unwrap(), 4);
    }

    #[test]
    fn test_distinct_count() {
        let df = sample_df();
        assert_eq!(df.distinct_count("area_code").unwrap(), 2);
        assert_eq!(df.distinct_count("sex").unwrap(), 2);
        assert_eq!(df.distinct_count("support").unwrap(), 3);
    }

    #[test]
    fn test_complete_rows() {
        let df = sample_df();
        let rows = df.complete_rows(&["support", "sex"]).unwrap();
        assert_eq!(rows, vec![0, 1, 3]);
    }

    #[test]
    fn test_complete_rows_with_missing_factor() {
        let mut df = DataFrame::new();
        df.add_float_column("y", vec![1.0, 2.0, 3.0]).unwrap();
        df.add_factor_column_with_missing("g", &[Some("a"), None, Some("b")])
            .unwrap();
        let rows = df.complete_rows(&["y", "g"]).unwrap();
        assert_eq!(rows, vec![0, 2]);
    }

    #[test]
    fn test_complete_rows_unknown_column() {
        let df = sample_df();
        let err = df.complete_rows(&["support", "nope"]).unwrap_err();
        assert!(matches!(err, MlmError::ColumnNotFound(_)));
    }

    #[test]
    fn test_dimension_mismatch() {
        let mut df = DataFrame::new();
        df.add_float_column("a", vec![1.0, 2.0]).unwrap();
        let err = df.add_float_column("b", vec![1.0, 2.0, 3.0]).unwrap_err();
        assert!(matches!(err, MlmError::DimensionMismatch { .. }));
    }

    #[test]
    fn test_duplicate_column_name() {
        let mut df = DataFrame::new();
        df.add_float_column("x", vec![1.0]).unwrap();
        let err = df.add_float_column("x", vec![2.0]).unwrap_err();
        assert!(matches!(err, MlmError::Data(_)));
    }

    #[test]
    fn test_as_factor_from_float_codes() {
        let mut df = sample_df();
        df.as_factor("area_code").unwrap();

        let factor = df.get_factor("area_code").unwrap();
        // Levels sorted numerically: "3" -> 0, "12" -> 1
        assert_eq!(factor.n_levels(), 2);
        assert_eq!(factor.level_name(0), Some("3"));
        assert_eq!(factor.level_name(1), Some("12"));
        assert_eq!(
            factor.codes(),
            &[Some(1), Some(0), Some(1), Some(0)]
        );
    }

    #[test]
    fn test_as_factor_preserves_missing() {
        let mut df = DataFrame::new();
        df.add_float_column("g", vec![1.0, f64::NAN, 2.0]).unwrap();
        df.as_factor("g").unwrap();
        let factor = df.get_factor("g").unwrap();
        assert_eq!(factor.codes(), &[Some(0), None, Some(1)]);
    }

    #[test]
    fn test_as_factor_fractional_errors() {
        let mut df = DataFrame::new();
        df.add_float_column("g", vec![1.5, 2.0]).unwrap();
        let err = df.as_factor("g").unwrap_err();
        assert!(matches!(err, MlmError::Data(_)));
    }

    #[test]
    fn test_as_factor_already_factor() {
        let mut df = sample_df();
        df.as_factor("sex").unwrap();
        let sex = df.get_factor("sex").unwrap();
        assert_eq!(sex.n_levels(), 2);
    }

    #[test]
    fn test_as_factor_not_found() {
        let mut df = DataFrame::new();
        let err = df.as_factor("nope").unwrap_err();
        assert!(matches!(err, MlmError::ColumnNotFound(_)));
    }
}
