use super::DenseMatrix;

const RANK_RELATIVE_EPSILON: f64 = 1.0e-12;
const JACOBI_ORTHOGONALITY_EPSILON: f64 = 1.0e-15;
const JACOBI_MAX_SWEEPS: usize = 60;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LeastSquaresError {
    #[error("least squares requires a non-empty matrix and column selection")]
    EmptyMatrix,
    #[error("right-hand side length mismatch: expected {expected}, got {actual}")]
    RhsLengthMismatch { expected: usize, actual: usize },
    #[error("column {column} is out of bounds for a matrix with {cols} columns")]
    ColumnOutOfBounds { column: usize, cols: usize },
    #[error("least squares is underdetermined: {rows} rows for {cols} columns")]
    Underdetermined { rows: usize, cols: usize },
    #[error("matrix column {column} is linearly dependent on the preceding columns")]
    RankDeficient { column: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SvdError {
    #[error("SVD requires a non-empty matrix")]
    EmptyMatrix,
    #[error("Jacobi SVD did not converge after {sweeps} sweeps")]
    NotConverged { sweeps: usize },
}

/// Solves `min ||A[:, columns] * z - rhs||` with Householder QR. The returned
/// vector is ordered like `columns`.
pub fn least_squares_columns(
    matrix: &DenseMatrix,
    columns: &[usize],
    rhs: &[f64],
) -> Result<Vec<f64>, LeastSquaresError> {
    let rows = matrix.nrows();
    if rows == 0 || matrix.ncols() == 0 || columns.is_empty() {
        return Err(LeastSquaresError::EmptyMatrix);
    }
    if rhs.len() != rows {
        return Err(LeastSquaresError::RhsLengthMismatch {
            expected: rows,
            actual: rhs.len(),
        });
    }
    if let Some(&column) = columns.iter().find(|column| **column >= matrix.ncols()) {
        return Err(LeastSquaresError::ColumnOutOfBounds {
            column,
            cols: matrix.ncols(),
        });
    }

    let cols = columns.len();
    if rows < cols {
        return Err(LeastSquaresError::Underdetermined { rows, cols });
    }

    let mut a = DenseMatrix::zeros(rows, cols);
    for (local, &column) in columns.iter().enumerate() {
        for row in 0..rows {
            a[(row, local)] = matrix[(row, column)];
        }
    }
    let mut b = rhs.to_vec();
    let initial_norms: Vec<f64> = (0..cols).map(|col| column_norm(&a, col, 0)).collect();

    let mut reflector = vec![0.0; rows];
    for pivot in 0..cols {
        let norm = column_norm(&a, pivot, pivot);
        if norm <= RANK_RELATIVE_EPSILON * initial_norms[pivot] || initial_norms[pivot] == 0.0 {
            return Err(LeastSquaresError::RankDeficient {
                column: columns[pivot],
            });
        }

        let alpha = if a[(pivot, pivot)] > 0.0 { -norm } else { norm };
        let length = rows - pivot;
        for offset in 0..length {
            reflector[offset] = a[(pivot + offset, pivot)];
        }
        reflector[0] -= alpha;
        let reflector_norm_sq: f64 = reflector[..length].iter().map(|v| v * v).sum();

        if reflector_norm_sq > 0.0 {
            for col in (pivot + 1)..cols {
                let mut dot = 0.0;
                for offset in 0..length {
                    dot += reflector[offset] * a[(pivot + offset, col)];
                }
                let scale = 2.0 * dot / reflector_norm_sq;
                for offset in 0..length {
                    a[(pivot + offset, col)] -= scale * reflector[offset];
                }
            }

            let mut dot = 0.0;
            for offset in 0..length {
                dot += reflector[offset] * b[pivot + offset];
            }
            let scale = 2.0 * dot / reflector_norm_sq;
            for offset in 0..length {
                b[pivot + offset] -= scale * reflector[offset];
            }
        }

        a[(pivot, pivot)] = alpha;
        for row in (pivot + 1)..rows {
            a[(row, pivot)] = 0.0;
        }
    }

    let mut solution = vec![0.0; cols];
    for row in (0..cols).rev() {
        let mut value = b[row];
        for col in (row + 1)..cols {
            value -= a[(row, col)] * solution[col];
        }
        solution[row] = value / a[(row, row)];
    }

    Ok(solution)
}

#[derive(Debug, Clone, PartialEq)]
pub struct SvdDecomposition {
    u: DenseMatrix,
    singular_values: Vec<f64>,
    v: DenseMatrix,
    sweeps: usize,
}

impl SvdDecomposition {
    pub fn u(&self) -> &DenseMatrix {
        &self.u
    }

    pub fn singular_values(&self) -> &[f64] {
        &self.singular_values
    }

    pub fn v(&self) -> &DenseMatrix {
        &self.v
    }

    pub fn sweeps(&self) -> usize {
        self.sweeps
    }

    /// Moore-Penrose pseudo-inverse `V * diag(1/s) * U^T`, dropping singular
    /// values at or below `relative_cutoff * s_max`.
    pub fn pseudo_inverse(&self, relative_cutoff: f64) -> DenseMatrix {
        let rows = self.u.nrows();
        let cols = self.v.nrows();
        let largest = self
            .singular_values
            .iter()
            .copied()
            .fold(0.0_f64, f64::max);
        let threshold = largest * relative_cutoff;

        let mut inverse = DenseMatrix::zeros(cols, rows);
        for (k, &sigma) in self.singular_values.iter().enumerate() {
            if sigma <= threshold || sigma == 0.0 {
                continue;
            }
            let reciprocal = 1.0 / sigma;
            for i in 0..cols {
                let vik = self.v[(i, k)] * reciprocal;
                if vik == 0.0 {
                    continue;
                }
                for j in 0..rows {
                    inverse[(i, j)] += vik * self.u[(j, k)];
                }
            }
        }
        inverse
    }
}

/// One-sided Jacobi SVD of an `m x n` matrix. Produces `n` singular values.
pub fn svd_decompose(matrix: &DenseMatrix) -> Result<SvdDecomposition, SvdError> {
    let rows = matrix.nrows();
    let cols = matrix.ncols();
    if rows == 0 || cols == 0 {
        return Err(SvdError::EmptyMatrix);
    }

    let mut u = matrix.clone();
    let mut v = DenseMatrix::zeros(cols, cols);
    for index in 0..cols {
        v[(index, index)] = 1.0;
    }

    let mut sweeps = 0;
    loop {
        if sweeps == JACOBI_MAX_SWEEPS {
            return Err(SvdError::NotConverged { sweeps });
        }
        sweeps += 1;

        let mut rotated = false;
        for p in 0..cols {
            for q in (p + 1)..cols {
                let mut alpha = 0.0;
                let mut beta = 0.0;
                let mut gamma = 0.0;
                for row in 0..rows {
                    let up = u[(row, p)];
                    let uq = u[(row, q)];
                    alpha += up * up;
                    beta += uq * uq;
                    gamma += up * uq;
                }

                if gamma.abs() <= JACOBI_ORTHOGONALITY_EPSILON * (alpha * beta).sqrt()
                    || gamma == 0.0
                {
                    continue;
                }
                rotated = true;

                let zeta = (beta - alpha) / (2.0 * gamma);
                let t = zeta.signum() / (zeta.abs() + (1.0 + zeta * zeta).sqrt());
                let c = 1.0 / (1.0 + t * t).sqrt();
                let s = c * t;

                rotate_columns(&mut u, p, q, c, s);
                rotate_columns(&mut v, p, q, c, s);
            }
        }

        if !rotated {
            break;
        }
    }

    let mut singular_values = vec![0.0; cols];
    for col in 0..cols {
        let sigma = column_norm(&u, col, 0);
        singular_values[col] = sigma;
        if sigma > 0.0 {
            for row in 0..rows {
                u[(row, col)] /= sigma;
            }
        }
    }

    Ok(SvdDecomposition {
        u,
        singular_values,
        v,
        sweeps,
    })
}

pub fn matvec(matrix: &DenseMatrix, vector: &[f64]) -> Vec<f64> {
    let mut output = vec![0.0; matrix.nrows()];
    for col in 0..matrix.ncols().min(vector.len()) {
        let scale = vector[col];
        if scale == 0.0 {
            continue;
        }
        for (row, value) in output.iter_mut().enumerate() {
            *value += matrix[(row, col)] * scale;
        }
    }
    output
}

fn rotate_columns(matrix: &mut DenseMatrix, p: usize, q: usize, c: f64, s: f64) {
    for row in 0..matrix.nrows() {
        let mp = matrix[(row, p)];
        let mq = matrix[(row, q)];
        matrix[(row, p)] = c * mp - s * mq;
        matrix[(row, q)] = s * mp + c * mq;
    }
}

fn column_norm(matrix: &DenseMatrix, col: usize, first_row: usize) -> f64 {
    let mut sum = 0.0;
    for row in first_row..matrix.nrows() {
        let value = matrix[(row, col)];
        sum += value * value;
    }
    sum.sqrt()
}

#[cfg(test)]
mod tests {
    use super::{LeastSquaresError, least_squares_columns, matvec, svd_decompose};
    use crate::numerics::DenseMatrix;

    #[test]
    fn least_squares_recovers_exact_solution() {
        let matrix = dense_matrix(&[
            vec![2.0, 1.0],
            vec![1.0, 3.0],
            vec![0.5, -1.0],
            vec![1.0, 0.0],
        ]);
        let expected = [1.5, -0.25];
        let rhs = matvec(&matrix, &expected);

        let actual = least_squares_columns(&matrix, &[0, 1], &rhs).expect("solve");
        assert_vector_close(&expected, &actual, 1.0e-12);
    }

    #[test]
    fn least_squares_respects_column_selection_order() {
        let matrix = dense_matrix(&[
            vec![1.0, 0.0, 0.0],
            vec![0.0, 1.0, 0.0],
            vec![0.0, 0.0, 1.0],
        ]);
        let actual =
            least_squares_columns(&matrix, &[2, 0], &[4.0, 5.0, 6.0]).expect("solve");
        assert_vector_close(&[6.0, 4.0], &actual, 1.0e-14);
    }

    #[test]
    fn least_squares_minimizes_overdetermined_residual() {
        let matrix = dense_matrix(&[vec![1.0], vec![1.0], vec![1.0]]);
        let actual = least_squares_columns(&matrix, &[0], &[1.0, 2.0, 6.0]).expect("solve");
        assert_vector_close(&[3.0], &actual, 1.0e-14);
    }

    #[test]
    fn least_squares_reports_dependent_columns() {
        let matrix = dense_matrix(&[vec![1.0, 2.0], vec![2.0, 4.0], vec![3.0, 6.0]]);
        let error = least_squares_columns(&matrix, &[0, 1], &[1.0, 1.0, 1.0])
            .expect_err("dependent columns should fail");
        assert_eq!(error, LeastSquaresError::RankDeficient { column: 1 });
    }

    #[test]
    fn least_squares_validates_shapes() {
        let matrix = dense_matrix(&[vec![1.0, 0.0], vec![0.0, 1.0]]);
        assert_eq!(
            least_squares_columns(&matrix, &[0], &[1.0]).expect_err("rhs mismatch"),
            LeastSquaresError::RhsLengthMismatch {
                expected: 2,
                actual: 1
            }
        );
        assert_eq!(
            least_squares_columns(&matrix, &[3], &[1.0, 1.0]).expect_err("bad column"),
            LeastSquaresError::ColumnOutOfBounds { column: 3, cols: 2 }
        );
        assert_eq!(
            least_squares_columns(&matrix, &[], &[1.0, 1.0]).expect_err("empty selection"),
            LeastSquaresError::EmptyMatrix
        );
    }

    #[test]
    fn svd_reconstructs_original_matrix() {
        let matrix = dense_matrix(&[
            vec![3.0, 1.0, 0.5],
            vec![1.0, 2.0, -1.0],
            vec![0.0, 1.0, 4.0],
            vec![2.0, -0.5, 1.0],
        ]);
        let svd = svd_decompose(&matrix).expect("svd");

        for row in 0..matrix.nrows() {
            for col in 0..matrix.ncols() {
                let mut value = 0.0;
                for k in 0..svd.singular_values().len() {
                    value += svd.u()[(row, k)] * svd.singular_values()[k] * svd.v()[(col, k)];
                }
                assert!(
                    (value - matrix[(row, col)]).abs() <= 1.0e-10,
                    "entry ({row},{col}) expected {} got {}",
                    matrix[(row, col)],
                    value
                );
            }
        }
    }

    #[test]
    fn pseudo_inverse_solves_full_rank_least_squares() {
        let matrix = dense_matrix(&[
            vec![2.0, 1.0],
            vec![1.0, 3.0],
            vec![0.5, -1.0],
        ]);
        let expected = [0.75, 2.0];
        let rhs = matvec(&matrix, &expected);

        let pinv = svd_decompose(&matrix)
            .expect("svd")
            .pseudo_inverse(1.0e-12);
        assert_eq!(pinv.nrows(), 2);
        assert_eq!(pinv.ncols(), 3);
        let actual = matvec(&pinv, &rhs);
        assert_vector_close(&expected, &actual, 1.0e-10);
    }

    #[test]
    fn pseudo_inverse_drops_null_directions() {
        let matrix = dense_matrix(&[vec![1.0, 1.0], vec![1.0, 1.0]]);
        let svd = svd_decompose(&matrix).expect("svd");
        let pinv = svd.pseudo_inverse(1.0e-12);
        let actual = matvec(&pinv, &[2.0, 2.0]);
        assert_vector_close(&[1.0, 1.0], &actual, 1.0e-10);
    }

    fn dense_matrix(rows: &[Vec<f64>]) -> DenseMatrix {
        let nrows = rows.len();
        let ncols = rows.first().map_or(0, |row| row.len());
        let mut matrix = DenseMatrix::zeros(nrows, ncols);
        for (row_index, row) in rows.iter().enumerate() {
            for (col_index, value) in row.iter().enumerate() {
                matrix[(row_index, col_index)] = *value;
            }
        }
        matrix
    }

    fn assert_vector_close(expected: &[f64], actual: &[f64], abs_tol: f64) {
        assert_eq!(expected.len(), actual.len(), "vector length mismatch");
        for (index, (expected_value, actual_value)) in expected.iter().zip(actual).enumerate() {
            assert!(
                (expected_value - actual_value).abs() <= abs_tol,
                "entry {index} expected={expected_value:.15e} actual={actual_value:.15e}"
            );
        }
    }
}
