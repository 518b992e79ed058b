use sprs::CsMat;

use crate::error::{MlmError, Result};
use crate::matrix::sparse::xt_y;
use crate::types::DenseMatrix;

/// Henderson's Mixed Model Equations for a single random-intercept term
/// with identity covariance structure:
///
/// ```text
/// [X'X/σe²          X'Z/σe²          ] [b]   [X'y/σe²]
/// [Z'X/σe²          Z'Z/σe² + I/σu²  ] [u] = [Z'y/σe²]
/// ```
///
/// The coefficient matrix C is symmetric positive definite. The systems
/// this engine solves are small — a handful of fixed effects plus one
/// intercept per area — so C is assembled and factorized dense.
#[derive(Debug)]
pub struct MixedModelEquations {
    /// The full coefficient matrix C.
    pub coeff_matrix: DenseMatrix,
    /// The right-hand side vector.
    pub rhs: Vec<f64>,
    /// Number of fixed effect parameters.
    pub n_fixed: usize,
    /// Number of random-intercept levels (areas).
    pub n_random: usize,
    /// Total dimension of the system.
    pub dim: usize,
}

impl MixedModelEquations {
    /// Assemble the MME from the design matrices and current variance
    /// parameters.
    ///
    /// # Arguments
    /// - `x`: fixed-effects design matrix (n x p)
    /// - `z`: random-intercept incidence matrix (n x q)
    /// - `y`: response vector (length n)
    /// - `r_inv_scale`: 1/σe²
    /// - `g_inv_scale`: 1/σu²
    pub fn assemble(
        x: &CsMat<f64>,
        z: &CsMat<f64>,
        y: &[f64],
        r_inv_scale: f64,
        g_inv_scale: f64,
    ) -> Self {
        let p = x.cols();
        let q = z.cols();
        let dim = p + q;

        let mut c = DenseMatrix::zeros(dim, dim);
        let mut rhs = vec![0.0; dim];

        // X'X/σe² block (top-left, p x p).
        let xtx = cross_product_scaled(x, x, r_inv_scale);
        for i in 0..p {
            for j in 0..p {
                c[(i, j)] = xtx[(i, j)];
            }
        }

        // X'Z/σe² (top-right) and its transpose (bottom-left).
        let xtz = cross_product_scaled(x, z, r_inv_scale);
        for i in 0..p {
            for j in 0..q {
                c[(i, p + j)] = xtz[(i, j)];
                c[(p + j, i)] = xtz[(i, j)];
            }
        }

        // Z'Z/σe² + I/σu² (bottom-right).
        let ztz = cross_product_scaled(z, z, r_inv_scale);
        for i in 0..q {
            for j in 0..q {
                c[(p + i, p + j)] = ztz[(i, j)];
            }
            c[(p + i, p + i)] += g_inv_scale;
        }

        // RHS: [X'y/σe²; Z'y/σe²].
        for (i, v) in xt_y(x, y).iter().enumerate() {
            rhs[i] = v * r_inv_scale;
        }
        for (j, v) in xt_y(z, y).iter().enumerate() {
            rhs[p + j] = v * r_inv_scale;
        }

        Self {
            coeff_matrix: c,
            rhs,
            n_fixed: p,
            n_random: q,
            dim,
        }
    }

    /// Solve the MME system C * sol = rhs using dense Cholesky.
    pub fn solve(&self) -> Result<MmeSolution> {
        let chol = self
            .coeff_matrix
            .clone()
            .cholesky()
            .ok_or(MlmError::NotPositiveDefinite)?;

        let rhs_vec = nalgebra::DVector::from_column_slice(&self.rhs);
        let sol = chol.solve(&rhs_vec);
        let sol_vec: Vec<f64> = sol.as_slice().to_vec();

        let fixed_effects = sol_vec[..self.n_fixed].to_vec();
        let random_effects = sol_vec[self.n_fixed..].to_vec();

        // log|C| = 2 * sum(log(diag(L)))
        let l = chol.l();
        let log_det_c = 2.0 * (0..self.dim).map(|i| l[(i, i)].ln()).sum::<f64>();

        // C^{-1} for standard errors and the EM trace term.
        let c_inv = chol.inverse();

        Ok(MmeSolution {
            solution: sol_vec,
            fixed_effects,
            random_effects,
            log_det_c,
            c_inv,
        })
    }
}

/// Solution of the Mixed Model Equations.
pub struct MmeSolution {
    /// Full solution vector [b; u].
    pub solution: Vec<f64>,
    /// Fixed effects (BLUE): b-hat.
    pub fixed_effects: Vec<f64>,
    /// Random intercepts (BLUP): u-hat, one per area.
    pub random_effects: Vec<f64>,
    /// Log-determinant of the coefficient matrix: log|C|.
    pub log_det_c: f64,
    /// Full C^{-1} (for standard errors and trace computations).
    pub c_inv: DenseMatrix,
}

/// Compute A'B scaled by a scalar, via CSC column dot products.
fn cross_product_scaled(a: &CsMat<f64>, b: &CsMat<f64>, scale: f64) -> DenseMatrix {
    let p = a.cols();
    let q = b.cols();
    let mut result = DenseMatrix::zeros(p, q);

    let a_csc = if a.is_csc() { a.clone() } else { a.to_csc() };
    let b_csc = if b.is_csc() { b.clone() } else { b.to_csc() };

    for i in 0..p {
        if let Some(col_a) = a_csc.outer_view(i) {
            for j in 0..q {
                if let Some(col_b) = b_csc.outer_view(j) {
                    result[(i, j)] = col_a.dot(&col_b) * scale;
                }
            }
        }
    }

    result
}
