pub mod linalg;
pub mod nnls;

pub use linalg::{
    LeastSquaresError, SvdDecomposition, SvdError, least_squares_columns, matvec, svd_decompose,
};
pub use nnls::{NnlsError, NnlsSolution, NnlsSolver};

use faer::Mat;

pub type DenseMatrix = Mat<f64>;
