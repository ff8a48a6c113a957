//! Row-major feature matrix.

use crate::error::KnnError;

/// An immutable `n_rows × n_dims` matrix of finite `f64` features.
///
/// Rows are stored contiguously: row `i` occupies
/// `[i × n_dims, (i + 1) × n_dims)` of [`FeatureMatrix::as_flat`]. This is the
/// layout device kernels consume directly.
///
/// # Example
///
/// ```
/// use cadenza_knn::FeatureMatrix;
///
/// let m = FeatureMatrix::from_rows(vec![vec![0.0, 1.0], vec![2.0, 3.0]]).unwrap();
/// assert_eq!(m.n_rows(), 2);
/// assert_eq!(m.row(1), &[2.0, 3.0]);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    data: Vec<f64>,
    n_rows: usize,
    n_dims: usize,
}

impl FeatureMatrix {
    /// Builds a matrix from one `Vec` per row.
    ///
    /// # Errors
    ///
    /// [`KnnError::EmptyMatrix`] for no rows, [`KnnError::ZeroDimension`] for
    /// empty rows, [`KnnError::DimensionMismatch`] naming the first ragged
    /// row, [`KnnError::NonFiniteInput`] for NaN or infinite values.
    pub fn from_rows(rows: Vec<Vec<f64>>) -> Result<Self, KnnError> {
        let first = rows.first().ok_or(KnnError::EmptyMatrix)?;
        let n_dims = first.len();
        if n_dims == 0 {
            return Err(KnnError::ZeroDimension);
        }
        if let Some((row, r)) = rows.iter().enumerate().find(|(_, r)| r.len() != n_dims) {
            return Err(KnnError::DimensionMismatch {
                expected: n_dims,
                actual: r.len(),
                row: Some(row),
            });
        }

        let n_rows = rows.len();
        let mut data = Vec::with_capacity(n_rows * n_dims);
        for r in rows {
            data.extend(r);
        }
        Self::checked(data, n_rows, n_dims)
    }

    /// Builds a matrix from a flat row-major buffer.
    ///
    /// # Errors
    ///
    /// [`KnnError::ZeroDimension`] if `n_dims == 0`, [`KnnError::EmptyMatrix`]
    /// for an empty buffer, [`KnnError::DimensionMismatch`] if the buffer
    /// length is not a multiple of `n_dims` (the trailing partial row is
    /// reported), [`KnnError::NonFiniteInput`] for NaN or infinite values.
    pub fn from_flat(data: Vec<f64>, n_dims: usize) -> Result<Self, KnnError> {
        if n_dims == 0 {
            return Err(KnnError::ZeroDimension);
        }
        if data.is_empty() {
            return Err(KnnError::EmptyMatrix);
        }
        if !data.len().is_multiple_of(n_dims) {
            return Err(KnnError::DimensionMismatch {
                expected: n_dims,
                actual: data.len() % n_dims,
                row: Some(data.len() / n_dims),
            });
        }
        let n_rows = data.len() / n_dims;
        Self::checked(data, n_rows, n_dims)
    }

    fn checked(data: Vec<f64>, n_rows: usize, n_dims: usize) -> Result<Self, KnnError> {
        if data.iter().any(|v| !v.is_finite()) {
            return Err(KnnError::NonFiniteInput { input: "matrix" });
        }
        Ok(Self {
            data,
            n_rows,
            n_dims,
        })
    }

    /// Number of rows (candidates).
    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    /// Number of features per row.
    pub fn n_dims(&self) -> usize {
        self.n_dims
    }

    /// Row `i`.
    ///
    /// # Panics
    ///
    /// Panics if `i >= n_rows()`.
    pub fn row(&self, i: usize) -> &[f64] {
        &self.data[i * self.n_dims..(i + 1) * self.n_dims]
    }

    /// Iterates over rows in order.
    pub fn rows(&self) -> impl ExactSizeIterator<Item = &[f64]> + '_ {
        self.data.chunks_exact(self.n_dims)
    }

    /// The flat row-major buffer.
    pub fn as_flat(&self) -> &[f64] {
        &self.data
    }
}
