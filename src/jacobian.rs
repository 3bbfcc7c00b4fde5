use core::fmt;
use core::ops::Range;
use std::sync::Arc;

/// Column-compressed sparsity pattern for a Jacobian J(x).
///
/// Indices are zero-based; each column's row indices must be sorted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JacobianPattern {
    nrows: usize,
    ncols: usize,
    col_ptrs: Vec<usize>,
    row_indices: Vec<usize>,
}

/// Validation errors for a JacobianPattern or its values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatternError {
    /// col_ptrs length is not ncols + 1.
    ColPtrLen { expected: usize, actual: usize },
    /// col_ptrs[0] is not 0.
    ColPtrStart { value: usize },
    /// col_ptrs is not non-decreasing.
    ColPtrNotMonotonic { col: usize, prev: usize, next: usize },
    /// col_ptrs[ncols] does not match row_indices length.
    ColPtrOutOfBounds { last: usize, row_indices_len: usize },
    /// A row index is >= nrows.
    RowIndexOutOfBounds { col: usize, row: usize, nrows: usize },
    /// Row indices in a column are not sorted.
    RowIndexNotSorted { col: usize, prev: usize, next: usize },
    /// A value buffer does not match the pattern.
    ValuesLen { expected: usize, actual: usize },
}

impl fmt::Display for PatternError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ColPtrLen { expected, actual } => {
                write!(f, "col_ptrs length {actual} does not match expected {expected}")
            }
            Self::ColPtrStart { value } => write!(f, "col_ptrs must start at 0 (got {value})"),
            Self::ColPtrNotMonotonic { col, prev, next } => {
                write!(f, "col_ptrs not monotonic at col {col}: {prev} > {next}")
            }
            Self::ColPtrOutOfBounds {
                last,
                row_indices_len,
            } => write!(
                f,
                "col_ptrs end {last} does not match row_indices length {row_indices_len}"
            ),
            Self::RowIndexOutOfBounds { col, row, nrows } => {
                write!(f, "row index {row} in col {col} exceeds nrows {nrows}")
            }
            Self::RowIndexNotSorted { col, prev, next } => {
                write!(f, "row indices not sorted in col {col}: {prev} >= {next}")
            }
            Self::ValuesLen { expected, actual } => {
                write!(f, "values length {actual} does not match expected {expected}")
            }
        }
    }
}

impl std::error::Error for PatternError {}

impl JacobianPattern {
    /// Creates a validated column-compressed sparsity pattern.
    ///
    /// Requirements:
    /// - `col_ptrs.len() == ncols + 1`
    /// - `col_ptrs` is non-decreasing and starts at `0`
    /// - `col_ptrs[ncols] == row_indices.len()`
    /// - row indices are strictly increasing and `< nrows` within each column
    pub fn new(
        nrows: usize,
        ncols: usize,
        col_ptrs: Vec<usize>,
        row_indices: Vec<usize>,
    ) -> Result<Self, PatternError> {
        if col_ptrs.len() != ncols + 1 {
            return Err(PatternError::ColPtrLen {
                expected: ncols + 1,
                actual: col_ptrs.len(),
            });
        }
        if col_ptrs[0] != 0 {
            return Err(PatternError::ColPtrStart { value: col_ptrs[0] });
        }
        for (col, pair) in col_ptrs.windows(2).enumerate() {
            if pair[0] > pair[1] {
                return Err(PatternError::ColPtrNotMonotonic {
                    col,
                    prev: pair[0],
                    next: pair[1],
                });
            }
        }
        let last = col_ptrs[ncols];
        if last != row_indices.len() {
            return Err(PatternError::ColPtrOutOfBounds {
                last,
                row_indices_len: row_indices.len(),
            });
        }

        for col in 0..ncols {
            let rows = &row_indices[col_ptrs[col]..col_ptrs[col + 1]];
            if let Some(&row) = rows.iter().find(|&&row| row >= nrows) {
                return Err(PatternError::RowIndexOutOfBounds { col, row, nrows });
            }
            if let Some(pair) = rows.windows(2).find(|pair| pair[0] >= pair[1]) {
                return Err(PatternError::RowIndexNotSorted {
                    col,
                    prev: pair[0],
                    next: pair[1],
                });
            }
        }

        Ok(Self {
            nrows,
            ncols,
            col_ptrs,
            row_indices,
        })
    }

    /// Pattern listing every entry of an `nrows x ncols` matrix.
    pub fn dense(nrows: usize, ncols: usize) -> Self {
        let col_ptrs = (0..=ncols).map(|col| col * nrows).collect();
        let row_indices = (0..ncols).flat_map(|_| 0..nrows).collect();
        Self {
            nrows,
            ncols,
            col_ptrs,
            row_indices,
        }
    }

    /// Number of constraints (rows in J).
    pub fn nrows(&self) -> usize {
        self.nrows
    }

    /// Number of variables (columns in J).
    pub fn ncols(&self) -> usize {
        self.ncols
    }

    /// Number of stored entries.
    pub fn nnz(&self) -> usize {
        self.row_indices.len()
    }

    pub fn col_ptrs(&self) -> &[usize] {
        &self.col_ptrs
    }

    pub fn row_indices(&self) -> &[usize] {
        &self.row_indices
    }

    /// Index range in row_indices for the given column.
    pub fn col_range(&self, col: usize) -> Range<usize> {
        self.col_ptrs[col]..self.col_ptrs[col + 1]
    }

    /// Sorted row indices for the given column.
    pub fn row_indices_of_col(&self, col: usize) -> &[usize] {
        &self.row_indices[self.col_range(col)]
    }

    fn position(&self, row: usize, col: usize) -> Option<usize> {
        let range = self.col_range(col);
        let offset = self.row_indices[range.clone()].binary_search(&row).ok()?;
        Some(range.start + offset)
    }
}

/// Jacobian values on a fixed sparsity pattern.
///
/// The pattern is shared between every Jacobian derived from the same penalty;
/// the values are owned.
#[derive(Debug, Clone)]
pub struct Jacobian {
    pattern: Arc<JacobianPattern>,
    values: Vec<f64>,
}

impl Jacobian {
    /// All-zero values on the given pattern.
    pub fn zeros(pattern: impl Into<Arc<JacobianPattern>>) -> Self {
        let pattern = pattern.into();
        let values = vec![0.0; pattern.nnz()];
        Self { pattern, values }
    }

    /// Values in column order, aligned with `pattern.row_indices()`.
    pub fn from_values(
        pattern: impl Into<Arc<JacobianPattern>>,
        values: Vec<f64>,
    ) -> Result<Self, PatternError> {
        let pattern = pattern.into();
        if values.len() != pattern.nnz() {
            return Err(PatternError::ValuesLen {
                expected: pattern.nnz(),
                actual: values.len(),
            });
        }
        Ok(Self { pattern, values })
    }

    /// Dense matrix given in row-major order.
    pub fn from_dense(nrows: usize, ncols: usize, row_major: &[f64]) -> Result<Self, PatternError> {
        if row_major.len() != nrows * ncols {
            return Err(PatternError::ValuesLen {
                expected: nrows * ncols,
                actual: row_major.len(),
            });
        }
        let pattern = JacobianPattern::dense(nrows, ncols);
        let values = (0..ncols)
            .flat_map(|col| (0..nrows).map(move |row| row_major[row * ncols + col]))
            .collect();
        Ok(Self {
            pattern: Arc::new(pattern),
            values,
        })
    }

    /// Zero values on the same (shared) pattern.
    pub fn zeros_like(&self) -> Self {
        Self {
            pattern: Arc::clone(&self.pattern),
            values: vec![0.0; self.values.len()],
        }
    }

    pub fn pattern(&self) -> &JacobianPattern {
        &self.pattern
    }

    pub fn nrows(&self) -> usize {
        self.pattern.nrows
    }

    pub fn ncols(&self) -> usize {
        self.pattern.ncols
    }

    /// Values in column order.
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Value at `(row, col)`; zero outside the pattern.
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.pattern
            .position(row, col)
            .map_or(0.0, |pos| self.values[pos])
    }

    /// Mutable view for callbacks.
    pub fn values_mut(&mut self) -> JacobianValuesMut<'_> {
        JacobianValuesMut {
            values: &mut self.values,
            pattern: &self.pattern,
        }
    }

    /// out = A x + b.
    pub fn mul_add(&self, x: &[f64], b: &[f64], out: &mut [f64]) {
        out.copy_from_slice(b);
        self.accumulate(x, out);
    }

    /// out = A x.
    pub fn mul(&self, x: &[f64], out: &mut [f64]) {
        out.fill(0.0);
        self.accumulate(x, out);
    }

    fn accumulate(&self, x: &[f64], out: &mut [f64]) {
        for col in 0..self.ncols() {
            let xc = x[col];
            if xc == 0.0 {
                continue;
            }
            let range = self.pattern.col_range(col);
            for idx in range {
                out[self.pattern.row_indices[idx]] += self.values[idx] * xc;
            }
        }
    }

    /// out = A^T s.
    pub fn mul_transpose(&self, s: &[f64], out: &mut [f64]) {
        for (col, slot) in out.iter_mut().enumerate() {
            let mut sum = 0.0;
            for idx in self.pattern.col_range(col) {
                sum += self.values[idx] * s[self.pattern.row_indices[idx]];
            }
            *slot = sum;
        }
    }

    /// ||A||_F^2, which is also trace(A A^T).
    pub fn frobenius_norm_sq(&self) -> f64 {
        self.values.iter().map(|v| v * v).sum()
    }

    pub fn is_finite(&self) -> bool {
        self.values.iter().all(|v| v.is_finite())
    }
}

/// Mutable view of Jacobian values matching the sparsity pattern.
pub struct JacobianValuesMut<'a> {
    values: &'a mut [f64],
    pattern: &'a JacobianPattern,
}

impl<'a> JacobianValuesMut<'a> {
    /// Number of constraints (rows in J).
    pub fn nrows(&self) -> usize {
        self.pattern.nrows
    }

    /// Number of variables (columns in J).
    pub fn ncols(&self) -> usize {
        self.pattern.ncols
    }

    /// Sorted row indices for the given column.
    pub fn row_indices_of_col(&self, col: usize) -> &[usize] {
        self.pattern.row_indices_of_col(col)
    }

    /// Mutable values for the given column, aligned with row_indices_of_col.
    pub fn values_of_col_mut(&mut self, col: usize) -> &mut [f64] {
        let range = self.pattern.col_range(col);
        &mut self.values[range]
    }

    /// Entry at `(row, col)`, or `None` if it is not in the pattern.
    pub fn entry_mut(&mut self, row: usize, col: usize) -> Option<&mut f64> {
        let pos = self.pattern.position(row, col)?;
        Some(&mut self.values[pos])
    }

    pub fn fill_zero(&mut self) {
        self.values.fill(0.0);
    }
}
