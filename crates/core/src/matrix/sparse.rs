use sprs::CsMat;

/// Multiply a sparse matrix by a dense vector: result = A * x.
pub fn spmv(a: &CsMat<f64>, x: &[f64]) -> Vec<f64> {
    assert_eq!(a.cols(), x.len());
    let mut result = vec![0.0; a.rows()];

    // Iterate over non-zero entries. CsMat is CSC by default.
    for (val, (row, col)) in a.iter() {
        result[row] += val * x[col];
    }

    result
}

/// Compute X' * y for a sparse matrix X and dense vector y.
pub fn xt_y(x: &CsMat<f64>, y: &[f64]) -> Vec<f64> {
    let ncol = x.cols();
    let mut result = vec![0.0; ncol];

    for (val, (row, col)) in x.iter() {
        result[col] += val * y[row];
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use sprs::TriMat;

    #[test]
    fn test_spmv() {
        // 2x3 matrix: [[1, 0, 2], [0, 3, 0]]
        let mut tri = TriMat::new((2, 3));
        tri.add_triplet(0, 0, 1.0);
        tri.add_triplet(0, 2, 2.0);
        tri.add_triplet(1, 1, 3.0);
        let mat = tri.to_csc();

        let x = vec![1.0, 2.0, 3.0];
        let result = spmv(&mat, &x);
        assert!((result[0] - 7.0).abs() < 1e-10); // 1*1 + 2*3 = 7
        assert!((result[1] - 6.0).abs() < 1e-10); // 3*2 = 6
    }

    #[test]
    fn test_xt_y() {
        // X = [[1, 0], [1, 1], [0, 1]], y = [2, 3, 4]
        // X'y = [5, 7]
        let mut tri = TriMat::new((3, 2));
        tri.add_triplet(0, 0, 1.0);
        tri.add_triplet(1, 0, 1.0);
        tri.add_triplet(1, 1, 1.0);
        tri.add_triplet(2, 1, 1.0);
        let x = tri.to_csc();

        let result = xt_y(&x, &[2.0, 3.0, 4.0]);
        assert_eq!(result, vec![5.0, 7.0]);
    }

    #[test]
    fn test_spmv_duplicate_triplets_sum() {
        let mut tri = TriMat::new((2, 2));
        tri.add_triplet(0, 0, 1.5);
        tri.add_triplet(0, 0, 2.5);
        let mat = tri.to_csc();
        let result = spmv(&mat, &[1.0, 0.0]);
        assert!((result[0] - 4.0).abs() < 1e-10);
    }
}
