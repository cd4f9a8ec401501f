//! Compressed sparse matrices.
//!
//! [`CsrMatrix`] is the canonical form: each row stores strictly increasing
//! column indices and no explicit zeros. [`CscMatrix`] is the column-major
//! twin used when a computation only needs a few columns, and
//! [`CooMatrix`] collects unordered triplets.

use serde::{Deserialize, Serialize};

use crate::{ModelError, Result, TermId};

/// Which axis an L2 normalization runs along.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Normalization {
    #[default]
    None,
    /// Every topic row gets unit length.
    Rows,
    /// Every term column gets unit length.
    Columns,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CsrMatrix {
    rows: usize,
    cols: usize,
    indptr: Vec<usize>,
    indices: Vec<TermId>,
    data: Vec<f64>,
}

impl CsrMatrix {
    /// Builds a matrix from raw CSR arrays, checking that they are canonical.
    pub fn new(shape: (usize, usize), indptr: Vec<usize>, indices: Vec<TermId>, data: Vec<f64>) -> Result<Self> {
        let (rows, cols) = shape;
        check_compressed(rows, cols, &indptr, &indices, data.len())?;
        if let Some(v) = data.iter().find(|v| !v.is_finite() || **v == 0.0) {
            return Err(ModelError::Format(format!("non-canonical stored value {v}")));
        }
        Ok(Self { rows, cols, indptr, indices, data })
    }

    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self { rows, cols, indptr: vec![0; rows + 1], indices: Vec::new(), data: Vec::new() }
    }

    /// Builds a matrix from per-row entry lists in any order. Duplicate
    /// columns are summed and zero results dropped.
    pub fn from_rows(cols: usize, rows: Vec<Vec<(TermId, f64)>>) -> Result<Self> {
        let mut indptr = Vec::with_capacity(rows.len() + 1);
        let mut indices = Vec::new();
        let mut data = Vec::new();
        indptr.push(0);
        for (i, mut row) in rows.into_iter().enumerate() {
            row.sort_by_key(|&(c, _)| c);
            let start = indices.len();
            for (c, v) in row {
                if c as usize >= cols {
                    return Err(ModelError::Dimension(format!("row {i} has column {c} >= {cols}")));
                }
                if indices.len() > start && indices.last() == Some(&c) {
                    if let Some(last) = data.last_mut() {
                        *last += v;
                    }
                } else {
                    indices.push(c);
                    data.push(v);
                }
            }
            // Drop entries that summed (or started) at zero.
            let mut keep = start;
            for k in start..indices.len() {
                if data[k] != 0.0 {
                    indices[keep] = indices[k];
                    data[keep] = data[k];
                    keep += 1;
                }
            }
            indices.truncate(keep);
            data.truncate(keep);
            indptr.push(indices.len());
        }
        Ok(Self { rows: indptr.len() - 1, cols, indptr, indices, data })
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn nnz(&self) -> usize {
        self.data.len()
    }

    pub fn indptr(&self) -> &[usize] {
        &self.indptr
    }

    pub fn indices(&self) -> &[TermId] {
        &self.indices
    }

    pub fn data(&self) -> &[f64] {
        &self.data
    }

    /// Column indices and values of row `i`.
    pub fn row(&self, i: usize) -> (&[TermId], &[f64]) {
        let span = self.indptr[i]..self.indptr[i + 1];
        (&self.indices[span.clone()], &self.data[span])
    }

    pub fn get(&self, row: usize, col: TermId) -> f64 {
        let (cols, vals) = self.row(row);
        cols.binary_search(&col).map(|k| vals[k]).unwrap_or(0.0)
    }

    /// Sum of stored values per row.
    pub fn row_sums(&self) -> Vec<f64> {
        (0..self.rows).map(|i| self.row(i).1.iter().sum()).collect()
    }

    /// Number of rows with a stored entry in each column.
    pub fn column_counts(&self) -> Vec<usize> {
        let mut counts = vec![0usize; self.cols];
        for &c in &self.indices {
            counts[c as usize] += 1;
        }
        counts
    }

    /// Applies `f(row, value)` to every stored value in place.
    pub fn map_values(&mut self, mut f: impl FnMut(usize, f64) -> f64) {
        for i in 0..self.rows {
            for v in &mut self.data[self.indptr[i]..self.indptr[i + 1]] {
                *v = f(i, *v);
            }
        }
    }

    /// Multiplies column `j` by `weights[j]`; the sparse form of `X * diag(weights)`.
    pub fn scale_columns(&mut self, weights: &[f64]) -> Result<()> {
        if weights.len() != self.cols {
            return Err(ModelError::DimensionMismatch { expected: weights.len(), found: self.cols });
        }
        for (v, &c) in self.data.iter_mut().zip(&self.indices) {
            *v *= weights[c as usize];
        }
        self.prune_zeros();
        Ok(())
    }

    /// Returns a copy scaled to unit L2 norm along the given axis. Empty
    /// rows or columns stay empty.
    pub fn normalized(&self, axis: Normalization) -> Self {
        let mut out = self.clone();
        match axis {
            Normalization::None => {}
            Normalization::Rows => {
                let norms: Vec<f64> = (0..self.rows)
                    .map(|i| self.row(i).1.iter().map(|v| v * v).sum::<f64>().sqrt())
                    .collect();
                out.map_values(|i, v| v / norms[i]);
            }
            Normalization::Columns => {
                let mut norms = vec![0.0f64; self.cols];
                for (v, &c) in self.data.iter().zip(&self.indices) {
                    norms[c as usize] += v * v;
                }
                for (v, &c) in out.data.iter_mut().zip(&out.indices) {
                    *v /= norms[c as usize].sqrt();
                }
            }
        }
        out
    }

    pub fn to_csc(&self) -> CscMatrix {
        let mut indptr = vec![0usize; self.cols + 1];
        for &c in &self.indices {
            indptr[c as usize + 1] += 1;
        }
        for j in 0..self.cols {
            indptr[j + 1] += indptr[j];
        }
        let mut next = indptr.clone();
        let mut indices = vec![0usize; self.nnz()];
        let mut data = vec![0.0f64; self.nnz()];
        // Rows are visited in order, so each column's row list comes out sorted.
        for i in 0..self.rows {
            let (cols, vals) = self.row(i);
            for (&c, &v) in cols.iter().zip(vals) {
                let slot = next[c as usize];
                indices[slot] = i;
                data[slot] = v;
                next[c as usize] += 1;
            }
        }
        CscMatrix { rows: self.rows, cols: self.cols, indptr, indices, data }
    }

    pub fn to_coo(&self) -> CooMatrix {
        let mut row = Vec::with_capacity(self.nnz());
        for i in 0..self.rows {
            row.extend(std::iter::repeat(i).take(self.indptr[i + 1] - self.indptr[i]));
        }
        CooMatrix {
            rows: self.rows,
            cols: self.cols,
            row,
            col: self.indices.iter().map(|&c| c as usize).collect(),
            data: self.data.clone(),
        }
    }

    fn prune_zeros(&mut self) {
        if self.data.iter().all(|v| *v != 0.0) {
            return;
        }
        let mut keep = 0;
        let mut start = 0;
        for i in 0..self.rows {
            let end = self.indptr[i + 1];
            for k in start..end {
                if self.data[k] != 0.0 {
                    self.indices[keep] = self.indices[k];
                    self.data[keep] = self.data[k];
                    keep += 1;
                }
            }
            start = end;
            self.indptr[i + 1] = keep;
        }
        self.indices.truncate(keep);
        self.data.truncate(keep);
    }
}

/// Column-major sparse matrix: `indices` holds row numbers.
#[derive(Debug, Clone, PartialEq)]
pub struct CscMatrix {
    rows: usize,
    cols: usize,
    indptr: Vec<usize>,
    indices: Vec<usize>,
    data: Vec<f64>,
}

impl CscMatrix {
    pub fn new(shape: (usize, usize), indptr: Vec<usize>, indices: Vec<usize>, data: Vec<f64>) -> Result<Self> {
        let (rows, cols) = shape;
        check_compressed(cols, rows, &indptr, &indices, data.len())?;
        Ok(Self { rows, cols, indptr, indices, data })
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    pub fn indptr(&self) -> &[usize] {
        &self.indptr
    }

    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    pub fn data(&self) -> &[f64] {
        &self.data
    }

    /// Row indices and values of column `j`.
    pub fn column(&self, j: usize) -> (&[usize], &[f64]) {
        let span = self.indptr[j]..self.indptr[j + 1];
        (&self.indices[span.clone()], &self.data[span])
    }

    pub fn to_csr(&self) -> Result<CsrMatrix> {
        let mut rows = row_buckets(self.rows)?;
        for j in 0..self.cols {
            let (ris, vals) = self.column(j);
            for (&r, &v) in ris.iter().zip(vals) {
                rows[r].push((to_term_id(j)?, v));
            }
        }
        CsrMatrix::from_rows(self.cols, rows)
    }
}

/// Coordinate-format triplets. Duplicates are summed on conversion.
#[derive(Debug, Clone, PartialEq)]
pub struct CooMatrix {
    pub rows: usize,
    pub cols: usize,
    pub row: Vec<usize>,
    pub col: Vec<usize>,
    pub data: Vec<f64>,
}

impl CooMatrix {
    pub fn to_csr(&self) -> Result<CsrMatrix> {
        if self.row.len() != self.data.len() || self.col.len() != self.data.len() {
            return Err(ModelError::Format(format!(
                "coo arrays differ in length: row={} col={} data={}",
                self.row.len(),
                self.col.len(),
                self.data.len()
            )));
        }
        let mut rows = row_buckets(self.rows)?;
        for ((&r, &c), &v) in self.row.iter().zip(&self.col).zip(&self.data) {
            if r >= self.rows || c >= self.cols {
                return Err(ModelError::Format(format!(
                    "coo entry ({r}, {c}) outside shape ({}, {})",
                    self.rows, self.cols
                )));
            }
            rows[r].push((to_term_id(c)?, v));
        }
        CsrMatrix::from_rows(self.cols, rows)
    }
}

/// One empty entry list per row; a shape too large to allocate is a format error.
fn row_buckets(rows: usize) -> Result<Vec<Vec<(TermId, f64)>>> {
    let mut buckets = Vec::new();
    buckets
        .try_reserve_exact(rows)
        .map_err(|e| ModelError::Format(format!("cannot allocate {rows} rows: {e}")))?;
    buckets.resize_with(rows, Vec::new);
    Ok(buckets)
}

fn to_term_id(c: usize) -> Result<TermId> {
    TermId::try_from(c).map_err(|_| ModelError::Format(format!("column index {c} overflows a term id")))
}

/// Validates compressed arrays along `major` with minor dimension `minor`.
fn check_compressed<I: Copy + TryInto<usize>>(
    major: usize,
    minor: usize,
    indptr: &[usize],
    indices: &[I],
    nnz: usize,
) -> Result<()> {
    let expected = major
        .checked_add(1)
        .ok_or_else(|| ModelError::Format(format!("major dimension {major} is too large")))?;
    if indptr.len() != expected {
        return Err(ModelError::Format(format!("indptr has length {}, expected {expected}", indptr.len())));
    }
    if indices.len() != nnz {
        return Err(ModelError::Format(format!("indices has length {}, data has length {nnz}", indices.len())));
    }
    if indptr[0] != 0 || indptr[major] != nnz {
        return Err(ModelError::Format("indptr must start at 0 and end at nnz".into()));
    }
    // Every pointer must be in range before any slice is taken.
    if let Some(p) = indptr.iter().find(|&&p| p > nnz) {
        return Err(ModelError::Format(format!("indptr entry {p} exceeds nnz {nnz}")));
    }
    if indptr.windows(2).any(|w| w[0] > w[1]) {
        return Err(ModelError::Format("indptr is not monotone".into()));
    }
    for w in indptr.windows(2) {
        let mut prev: Option<usize> = None;
        for &raw in &indices[w[0]..w[1]] {
            let idx: usize = raw.try_into().unwrap_or(usize::MAX);
            if idx >= minor {
                return Err(ModelError::Format(format!("index {idx} out of bounds for {minor}")));
            }
            if prev.is_some_and(|p| p >= idx) {
                return Err(ModelError::Format("indices are not strictly increasing".into()));
            }
            prev = Some(idx);
        }
    }
    Ok(())
}
