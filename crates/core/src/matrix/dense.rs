use nalgebra::DMatrix;

/// Solve a symmetric positive-definite system A*x = b via Cholesky decomposition.
/// Returns x, or None if Cholesky fails (matrix not SPD).
pub fn solve_spd(a: &DMatrix<f64>, b: &[f64]) -> Option<Vec<f64>> {
    let chol = a.clone().cholesky()?;
    let b_vec = nalgebra::DVector::from_column_slice(b);
    let x = chol.solve(&b_vec);
    Some(x.as_slice().to_vec())
}

/// Compute the inverse of an SPD matrix via Cholesky.
pub fn inverse_spd(a: &DMatrix<f64>) -> Option<DMatrix<f64>> {
    let chol = a.clone().cholesky()?;
    Some(chol.inverse())
}
