use crate::data::DataFrame;

/// A single fixed-effect term in a model specification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FixedTerm {
    /// An intercept (column of ones).
    Intercept,
    /// A continuous covariate.
    Covariate(String),
    /// A factor column, expanded to dummy variables at design time.
    Factor(String),
}

impl FixedTerm {
    /// The DataFrame column this term reads, if any.
    pub fn column(&self) -> Option<&str> {
        match self {
            FixedTerm::Intercept => None,
            FixedTerm::Covariate(name) | FixedTerm::Factor(name) => Some(name),
        }
    }
}

/// A fully explicit mixed-model specification: outcome, grouping column,
/// and an ordered list of fixed-effect terms.
///
/// Specs are plain data handed to an estimation backend; they never touch
/// the DataFrame themselves. The label identifies the model in errors and
/// reports ("m0_empty", "2-item composite", ...).
#[derive(Debug, Clone)]
pub struct ModelSpec {
    pub label: String,
    pub outcome: String,
    pub group: String,
    pub terms: Vec<FixedTerm>,
}

impl ModelSpec {
    /// Create a spec with an intercept and no other fixed effects —
    /// the empty (variance-decomposition) model.
    pub fn new(label: &str, outcome: &str, group: &str) -> Self {
        ModelSpec {
            label: label.to_string(),
            outcome: outcome.to_string(),
            group: group.to_string(),
            terms: vec![FixedTerm::Intercept],
        }
    }

    /// Append a fixed-effect term, builder style.
    pub fn with_term(mut self, term: FixedTerm) -> Self {
        self.terms.push(term);
        self
    }

    /// Append several fixed-effect terms.
    pub fn with_terms<I: IntoIterator<Item = FixedTerm>>(mut self, terms: I) -> Self {
        self.terms.extend(terms);
        self
    }

    /// Same spec under a new label; used when one tier extends another.
    pub fn relabeled(mut self, label: &str) -> Self {
        self.label = label.to_string();
        self
    }

    /// Every DataFrame column the spec reads: outcome, group, and each
    /// term's column. Used to build the complete-case row set.
    pub fn columns(&self) -> Vec<&str> {
        let mut cols = vec![self.outcome.as_str(), self.group.as_str()];
        cols.extend(self.terms.iter().filter_map(|t| t.column()));
        cols
    }

    /// Names of the predictor columns (intercept excluded).
    pub fn predictor_names(&self) -> Vec<&str> {
        self.terms.iter().filter_map(|t| t.column()).collect()
    }

    /// Whether this spec's predictor set is a (non-strict) superset of
    /// `other`'s, with the same outcome and grouping column. Nested model
    /// sequences satisfy this pairwise in order.
    pub fn extends(&self, other: &ModelSpec) -> bool {
        self.outcome == other.outcome
            && self.group == other.group
            && other.terms.iter().all(|t| self.terms.contains(t))
    }
}

/// The role a candidate covariate plays in the design matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TermRole {
    Covariate,
    Factor,
}

/// A candidate covariate: a column name plus its design role.
#[derive(Debug, Clone, Copy)]
pub struct CovariateCandidate {
    pub name: &'static str,
    pub role: TermRole,
}

impl CovariateCandidate {
    pub const fn covariate(name: &'static str) -> Self {
        CovariateCandidate {
            name,
            role: TermRole::Covariate,
        }
    }

    pub const fn factor(name: &'static str) -> Self {
        CovariateCandidate {
            name,
            role: TermRole::Factor,
        }
    }

    /// The fixed-effect term this candidate contributes when admitted.
    pub fn term(&self) -> FixedTerm {
        match self.role {
            TermRole::Covariate => FixedTerm::Covariate(self.name.to_string()),
            TermRole::Factor => FixedTerm::Factor(self.name.to_string()),
        }
    }
}

/// Declarative covariate-inclusion policy: a candidate enters a model tier
/// only if its column is present AND its non-missing count exceeds the
/// minimum. Fitting on a mostly-missing covariate would silently shrink
/// the working sample via listwise deletion, so such candidates are
/// dropped up front instead.
#[derive(Debug, Clone, Copy)]
pub struct InclusionPolicy {
    pub min_non_missing: usize,
}

impl InclusionPolicy {
    pub fn new(min_non_missing: usize) -> Self {
        InclusionPolicy { min_non_missing }
    }

    /// The inclusion predicate for a single candidate column.
    pub fn admits(&self, df: &DataFrame, name: &str) -> bool {
        df.has_column(name)
            && df.non_missing_count(name).unwrap_or(0) > self.min_non_missing
    }

    /// Evaluate the predicate over a candidate list, producing the terms
    /// that enter the model tier, in candidate order.
    pub fn select(&self, df: &DataFrame, candidates: &[CovariateCandidate]) -> Vec<FixedTerm> {
        candidates
            .iter()
            .filter(|c| self.admits(df, c.name))
            .map(|c| c.term())
            .collect()
    }
}
