use std::path::Path;

use crate::error::{MlmError, Result};

use super::dataframe::{Column, DataFrame};
use super::factor::FactorColumn;

/// Cell values treated as missing on CSV input.
fn is_missing_cell(s: &str) -> bool {
    s.is_empty() || s.eq_ignore_ascii_case("na") || s.eq_ignore_ascii_case("nan")
}

impl DataFrame {
    /// Read a CSV file into a DataFrame.
    ///
    /// The first row is treated as a header. Each column is auto-detected:
    /// - If every non-missing value parses as `f64`, it becomes a `Float`
    ///   column, with missing cells stored as `NAN`.
    /// - Otherwise it becomes a `Factor` column with missing cells as
    ///   `None` codes.
    ///
    /// Empty cells and the literals `NA`/`NaN` (any case) count as missing.
    /// A column that is entirely missing is stored as all-`NAN` Float.
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened, if the CSV is
    /// malformed, or if rows have inconsistent numbers of fields.
    ///
    /// # Examples
    /// ```no_run
    /// use neighborhood_mlm_core::data::DataFrame;
    ///
    /// let df = DataFrame::from_csv("analysis_sample.csv").unwrap();
    /// println!("rows = {}, cols = {}", df.nrows(), df.ncols());
    /// ```
    pub fn from_csv<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(false)
            .trim(csv::Trim::All)
            .from_path(path)?;

        // Collect headers.
        let headers: Vec<String> = reader
            .headers()?
            .iter()
            .map(|h| h.to_string())
            .collect();

        if headers.is_empty() {
            return Ok(DataFrame::new());
        }

        let ncols = headers.len();

        // Read all records into column-oriented vectors of strings.
        let mut string_columns: Vec<Vec<String>> = vec![Vec::new(); ncols];

        for result in reader.records() {
            let record = result?;
            if record.len() != ncols {
                return Err(MlmError::Data(format!(
                    "Row has {} fields but header has {} columns",
                    record.len(),
                    ncols
                )));
            }
            for (i, field) in record.iter().enumerate() {
                string_columns[i].push(field.to_string());
            }
        }

        let nrows = string_columns[0].len();
        if nrows == 0 {
            return Ok(DataFrame::new());
        }

        // Auto-detect column types and build the DataFrame.
        let mut df = DataFrame::new();

        for (col_idx, header) in headers.iter().enumerate() {
            let raw = &string_columns[col_idx];

            // Try to parse every non-missing value as f64.
            let mut float_values = Vec::with_capacity(nrows);
            let mut all_numeric = true;
            for s in raw {
                if is_missing_cell(s) {
                    float_values.push(f64::NAN);
                } else {
                    match s.parse::<f64>() {
                        Ok(v) => float_values.push(v),
                        Err(_) => {
                            all_numeric = false;
                            break;
                        }
                    }
                }
            }

            if all_numeric {
                df.add_float_column(header, float_values)?;
            } else {
                let opts: Vec<Option<&str>> = raw
                    .iter()
                    .map(|s| {
                        if is_missing_cell(s) {
                            None
                        } else {
                            Some(s.as_str())
                        }
                    })
                    .collect();
                let factor = FactorColumn::from_options(&opts);
                df.validate_and_insert(header, Column::Factor(factor))?;
            }
        }

        Ok(df)
    }
}
