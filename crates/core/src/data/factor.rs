use indexmap::IndexMap;

/// A categorical (factor) column that maps string levels to integer codes.
///
/// Levels are discovered in order of first appearance and assigned 0-based
/// codes. Observations may be missing (`None`), which is how survey items
/// that a respondent skipped are represented; missing observations do not
/// create a level.
#[derive(Debug, Clone)]
pub struct FactorColumn {
    /// Maps level string -> integer code (0-based), ordered by first appearance.
    levels: IndexMap<String, usize>,
    /// The integer code for each observation, `None` where missing.
    codes: Vec<Option<usize>>,
}

impl FactorColumn {
    /// Create a new `FactorColumn` from a slice of string values with no
    /// missing observations.
    ///
    /// # Examples
    /// ```
    /// use neighborhood_mlm_core::data::FactorColumn;
    ///
    /// let col = FactorColumn::new(&["A", "B", "A", "C", "B"]);
    /// assert_eq!(col.n_levels(), 3);
    /// assert_eq!(col.codes(), &[Some(0), Some(1), Some(0), Some(2), Some(1)]);
    /// ```
    pub fn new(values: &[&str]) -> Self {
        Self::from_options(&values.iter().map(|v| Some(*v)).collect::<Vec<_>>())
    }

    /// Create a `FactorColumn` from values where `None` marks a missing
    /// observation. Levels are auto-discovered over the non-missing values
    /// in order of first appearance.
    pub fn from_options(values: &[Option<&str>]) -> Self {
        let mut levels = IndexMap::new();
        let mut codes = Vec::with_capacity(values.len());

        for val in values {
            match val {
                Some(v) => {
                    let next_code = levels.len();
                    let code = *levels.entry((*v).to_string()).or_insert(next_code);
                    codes.push(Some(code));
                }
                None => codes.push(None),
            }
        }

        FactorColumn { levels, codes }
    }

    /// Create a `FactorColumn` from a pre-built level map and codes.
    ///
    /// Used internally when coercing numeric columns to factors.
    pub(crate) fn from_parts(levels: IndexMap<String, usize>, codes: Vec<Option<usize>>) -> Self {
        FactorColumn { levels, codes }
    }

    /// Returns the number of distinct levels.
    pub fn n_levels(&self) -> usize {
        self.levels.len()
    }

    /// Returns a slice of the integer codes, `None` where missing.
    pub fn codes(&self) -> &[Option<usize>] {
        &self.codes
    }

    /// Returns a reference to the ordered level map (level name -> code).
    pub fn levels(&self) -> &IndexMap<String, usize> {
        &self.levels
    }

    /// Returns the level name for a given integer code, or `None` if the
    /// code is out of range.
    pub fn level_name(&self, code: usize) -> Option<&str> {
        self.levels
            .iter()
            .find(|(_, &c)| c == code)
            .map(|(name, _)| name.as_str())
    }

    /// Number of non-missing observations.
    pub fn non_missing_count(&self) -> usize {
        self.codes.iter().filter(|c| c.is_some()).count()
    }

    /// Number of distinct levels actually observed (missing excluded).
    pub fn distinct_observed(&self) -> usize {
        let mut seen = vec![false; self.levels.len()];
        for code in self.codes.iter().flatten() {
            seen[*code] = true;
        }
        seen.iter().filter(|s| **s).count()
    }

    /// Returns the number of observations (rows).
    pub fn len(&self) -> usize {
        self.codes.len()
    }

    /// Returns `true` if the column has no observations.
    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }
}
