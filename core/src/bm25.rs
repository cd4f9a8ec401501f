//! BM25 weighting of term-frequency matrices.
//!
//! Fitting learns one smoothed IDF weight per column:
//!
//! ```text
//! idf[j] = ln(1 + (n_docs - df[j] + 0.5) / (df[j] + 0.5))
//! ```
//!
//! Transforming replaces every stored count with its saturated,
//! length-normalized term frequency and, when IDF is enabled, scales each
//! column by its weight. Zero entries are never materialized.

use serde::{Deserialize, Serialize};

use crate::config::Bm25Params;
use crate::sparse::CsrMatrix;
use crate::{ModelError, Result};

/// A BM25 transformer and, once fitted, its IDF vector.
///
/// Fitting never mutates: [`fit`](Self::fit) returns a new value, so a
/// fitted transformer can be shared freely across threads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bm25Transformer {
    params: Bm25Params,
    idf: Option<Vec<f64>>,
}

impl Bm25Transformer {
    pub fn new(params: Bm25Params) -> Result<Self> {
        params.validate()?;
        Ok(Self { params, idf: None })
    }

    pub fn params(&self) -> &Bm25Params {
        &self.params
    }

    pub fn idf(&self) -> Option<&[f64]> {
        self.idf.as_deref()
    }

    pub fn is_fitted(&self) -> bool {
        self.idf.is_some()
    }

    /// Learns the IDF vector from a term-frequency matrix. Without
    /// `use_idf` this returns the transformer unchanged.
    pub fn fit(&self, x: &CsrMatrix) -> Result<Self> {
        let (n_docs, n_terms) = x.shape();
        if n_terms == 0 {
            return Err(ModelError::Dimension("cannot fit on a matrix with zero columns".into()));
        }
        if !self.params.use_idf {
            return Ok(self.clone());
        }
        let n = n_docs as f64;
        let idf = x
            .column_counts()
            .into_iter()
            .map(|df| {
                let df = df as f64;
                (1.0 + (n - df + 0.5) / (df + 0.5)).ln()
            })
            .collect();
        Ok(Self { params: self.params, idf: Some(idf) })
    }

    /// Returns the BM25-weighted copy of `x`.
    pub fn transform(&self, x: &CsrMatrix) -> Result<CsrMatrix> {
        let mut out = x.clone();
        self.transform_in_place(&mut out)?;
        Ok(out)
    }

    /// Weights `x` in place. On error `x` is left untouched.
    pub fn transform_in_place(&self, x: &mut CsrMatrix) -> Result<()> {
        let idf = if self.params.use_idf {
            let idf = self.idf.as_deref().ok_or(ModelError::NotFitted)?;
            if x.cols() != idf.len() {
                return Err(ModelError::DimensionMismatch { expected: idf.len(), found: x.cols() });
            }
            Some(idf)
        } else {
            None
        };

        let dl = x.row_sums();
        let avgdl = average_doc_len(&dl);
        let Bm25Params { k1, b, .. } = self.params;
        x.map_values(|i, count| count * (k1 + 1.0) / (count + k1 * (1.0 - b + b * dl[i] / avgdl)));

        if let Some(idf) = idf {
            x.scale_columns(idf)?;
        }
        Ok(())
    }

    pub fn fit_transform(&self, x: &CsrMatrix) -> Result<(Self, CsrMatrix)> {
        let fitted = self.fit(x)?;
        let weighted = fitted.transform(x)?;
        Ok((fitted, weighted))
    }
}

/// Mean row length. An empty or all-zero corpus falls back to 1.0 so the
/// length ratio stays finite.
fn average_doc_len(dl: &[f64]) -> f64 {
    let avgdl = if dl.is_empty() { 0.0 } else { dl.iter().sum::<f64>() / dl.len() as f64 };
    if avgdl > 0.0 {
        avgdl
    } else {
        tracing::warn!(rows = dl.len(), "average document length is zero; using 1.0");
        1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counts() -> CsrMatrix {
        // "first about cats" / "second about cats and dogs" over
        // [about, and, cats, dogs, first, second]
        CsrMatrix::from_rows(
            6,
            vec![
                vec![(0, 1.0), (2, 1.0), (4, 1.0)],
                vec![(0, 1.0), (1, 1.0), (2, 1.0), (3, 1.0), (5, 1.0)],
            ],
        )
        .unwrap()
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-12
    }

    #[test]
    fn idf_matches_okapi_smoothing() {
        let t = Bm25Transformer::new(Bm25Params::default()).unwrap().fit(&counts()).unwrap();
        let idf = t.idf().unwrap();
        // df = 2 of 2 docs
        assert!(close(idf[0], (1.0f64 + 0.5 / 2.5).ln()));
        // df = 1 of 2 docs
        assert!(close(idf[1], (1.0f64 + 1.5 / 1.5).ln()));
        assert!(idf.iter().all(|&w| w > 0.0));
    }

    #[test]
    fn transform_values_match_formula() {
        let params = Bm25Params::default();
        let (_, w) = Bm25Transformer::new(params).unwrap().fit_transform(&counts()).unwrap();
        let avgdl = 4.0;
        let tf = |dl: f64| (params.k1 + 1.0) / (1.0 + params.k1 * (1.0 - params.b + params.b * dl / avgdl));
        let idf_shared = (1.0f64 + 0.5 / 2.5).ln();
        assert!(close(w.get(0, 2), tf(3.0) * idf_shared));
        assert!(close(w.get(1, 2), tf(5.0) * idf_shared));
        // The longer document's shared terms are down-weighted.
        assert!(w.get(1, 2) < w.get(0, 2));
        assert!(w.get(1, 0) < w.get(0, 0));
    }

    #[test]
    fn not_fitted_is_reported() {
        let t = Bm25Transformer::new(Bm25Params::default()).unwrap();
        assert!(matches!(t.transform(&counts()), Err(ModelError::NotFitted)));
    }

    #[test]
    fn column_mismatch_is_reported() {
        let t = Bm25Transformer::new(Bm25Params::default()).unwrap().fit(&counts()).unwrap();
        let narrow = CsrMatrix::from_rows(5, vec![vec![(0, 1.0)]]).unwrap();
        assert!(matches!(
            t.transform(&narrow),
            Err(ModelError::DimensionMismatch { expected: 6, found: 5 })
        ));
    }

    #[test]
    fn fit_rejects_zero_columns() {
        let t = Bm25Transformer::new(Bm25Params::default()).unwrap();
        assert!(matches!(t.fit(&CsrMatrix::zeros(3, 0)), Err(ModelError::Dimension(_))));
    }

    #[test]
    fn without_idf_fit_is_noop_and_transform_needs_no_fit() {
        let params = Bm25Params { use_idf: false, ..Default::default() };
        let t = Bm25Transformer::new(params).unwrap();
        let fitted = t.fit(&counts()).unwrap();
        assert_eq!(fitted, t);
        let w = t.transform(&counts()).unwrap();
        assert_eq!(w.indices(), counts().indices());
        assert!(w.data().iter().all(|&v| v > 0.0));
    }

    #[test]
    fn all_empty_rows_stay_empty() {
        let params = Bm25Params { use_idf: false, ..Default::default() };
        let t = Bm25Transformer::new(params).unwrap();
        let w = t.transform(&CsrMatrix::zeros(4, 3)).unwrap();
        assert_eq!(w.nnz(), 0);
        assert_eq!(w.shape(), (4, 3));
    }
}
