//! Lawson-Hanson active-set non-negative least squares.
//!
//! Variables start inactive (held at zero). Each outer iteration activates the
//! inactive variable with the largest positive gradient of `-0.5 ||Ax - b||^2`,
//! then the inner loop re-solves the unconstrained problem on the active set and
//! steps back toward feasibility whenever an active variable would go negative.
//! Both outer and inner passes count against `max_iterations`.

use super::DenseMatrix;
use super::linalg::least_squares_columns;

const KKT_RELATIVE_TOLERANCE: f64 = 1.0e-10;
const KKT_ABSOLUTE_TOLERANCE: f64 = 1.0e-300;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NnlsError {
    #[error("NNLS requires a non-empty matrix")]
    EmptyMatrix,
    #[error("right-hand side length mismatch: expected {expected}, got {actual}")]
    RhsLengthMismatch { expected: usize, actual: usize },
}

#[derive(Debug, Clone, PartialEq)]
pub struct NnlsSolution {
    pub x: Vec<f64>,
    pub iterations: usize,
    pub converged: bool,
    /// Norm of the projected gradient at `x`.
    pub kkt_residual: f64,
    /// `||Ax - b||`.
    pub residual_norm: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NnlsSolver {
    max_iterations: usize,
    relative_tolerance: f64,
}

impl NnlsSolver {
    pub fn new(max_iterations: usize) -> Self {
        Self {
            max_iterations,
            relative_tolerance: KKT_RELATIVE_TOLERANCE,
        }
    }

    pub fn with_relative_tolerance(mut self, relative_tolerance: f64) -> Self {
        self.relative_tolerance = relative_tolerance;
        self
    }

    pub fn max_iterations(&self) -> usize {
        self.max_iterations
    }

    pub fn solve(&self, matrix: &DenseMatrix, rhs: &[f64]) -> Result<NnlsSolution, NnlsError> {
        let rows = matrix.nrows();
        let cols = matrix.ncols();
        if rows == 0 || cols == 0 {
            return Err(NnlsError::EmptyMatrix);
        }
        if rhs.len() != rows {
            return Err(NnlsError::RhsLengthMismatch {
                expected: rows,
                actual: rhs.len(),
            });
        }

        let tolerance = self.gradient_tolerance(matrix, rhs);
        let mut x = vec![0.0; cols];
        let mut active = vec![false; cols];
        let mut excluded = vec![false; cols];
        let mut iterations = 0;
        let mut converged = false;

        'outer: loop {
            let gradient = negative_gradient(matrix, rhs, &x);
            let candidate = (0..cols)
                .filter(|&col| !active[col] && !excluded[col] && gradient[col] > tolerance)
                .max_by(|&left, &right| gradient[left].total_cmp(&gradient[right]));

            let Some(entering) = candidate else {
                converged = true;
                break;
            };
            if iterations >= self.max_iterations {
                break;
            }
            iterations += 1;
            active[entering] = true;

            let mut first_pass = true;
            loop {
                let columns: Vec<usize> = (0..cols).filter(|&col| active[col]).collect();
                if columns.is_empty() {
                    break;
                }

                let Ok(z) = least_squares_columns(matrix, &columns, rhs) else {
                    tracing::trace!(column = entering, "dropping dependent NNLS column");
                    active[entering] = false;
                    excluded[entering] = true;
                    x[entering] = 0.0;
                    continue 'outer;
                };

                if first_pass {
                    let entering_local = columns.iter().position(|&col| col == entering);
                    if entering_local.is_some_and(|local| !(z[local] > 0.0)) {
                        active[entering] = false;
                        excluded[entering] = true;
                        continue 'outer;
                    }
                    first_pass = false;
                }

                if z.iter().all(|value| *value > 0.0) {
                    for (local, &col) in columns.iter().enumerate() {
                        x[col] = z[local];
                    }
                    break;
                }

                let mut step = f64::INFINITY;
                let mut blocking = columns[0];
                for (local, &col) in columns.iter().enumerate() {
                    if z[local] <= 0.0 {
                        let denominator = x[col] - z[local];
                        let ratio = if denominator > 0.0 {
                            x[col] / denominator
                        } else {
                            0.0
                        };
                        if ratio < step {
                            step = ratio;
                            blocking = col;
                        }
                    }
                }

                for (local, &col) in columns.iter().enumerate() {
                    x[col] += step * (z[local] - x[col]);
                }
                x[blocking] = 0.0;
                for &col in &columns {
                    if x[col] <= 0.0 {
                        x[col] = 0.0;
                        active[col] = false;
                    }
                }

                if iterations >= self.max_iterations {
                    break 'outer;
                }
                iterations += 1;
            }
        }

        let gradient = negative_gradient(matrix, rhs, &x);
        let kkt_residual = projected_gradient_norm(&gradient, &x);
        let residual_norm = residual(matrix, rhs, &x)
            .iter()
            .map(|value| value * value)
            .sum::<f64>()
            .sqrt();

        Ok(NnlsSolution {
            x,
            iterations,
            converged,
            kkt_residual,
            residual_norm,
        })
    }

    fn gradient_tolerance(&self, matrix: &DenseMatrix, rhs: &[f64]) -> f64 {
        let mut largest_column = 0.0_f64;
        for col in 0..matrix.ncols() {
            let mut sum = 0.0;
            for row in 0..matrix.nrows() {
                sum += matrix[(row, col)] * matrix[(row, col)];
            }
            largest_column = largest_column.max(sum.sqrt());
        }
        let rhs_norm = rhs.iter().map(|value| value * value).sum::<f64>().sqrt();
        (self.relative_tolerance * largest_column * rhs_norm).max(KKT_ABSOLUTE_TOLERANCE)
    }
}

fn residual(matrix: &DenseMatrix, rhs: &[f64], x: &[f64]) -> Vec<f64> {
    let mut output = rhs.to_vec();
    for (col, &value) in x.iter().enumerate() {
        if value == 0.0 {
            continue;
        }
        for (row, entry) in output.iter_mut().enumerate() {
            *entry -= matrix[(row, col)] * value;
        }
    }
    output
}

/// `A^T (b - Ax)`.
fn negative_gradient(matrix: &DenseMatrix, rhs: &[f64], x: &[f64]) -> Vec<f64> {
    let r = residual(matrix, rhs, x);
    (0..matrix.ncols())
        .map(|col| {
            (0..matrix.nrows())
                .map(|row| matrix[(row, col)] * r[row])
                .sum()
        })
        .collect()
}

fn projected_gradient_norm(negative_gradient: &[f64], x: &[f64]) -> f64 {
    negative_gradient
        .iter()
        .zip(x)
        .map(|(&w, &value)| {
            let projected = if value > 0.0 { w } else { w.max(0.0) };
            projected * projected
        })
        .sum::<f64>()
        .sqrt()
}
