//! Vocabulary construction and term counting.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::config::VectorizerConfig;
use crate::sparse::CsrMatrix;
use crate::{ModelError, Result, TermId};

/// Frozen bijection between terms and dense column indices `0..len`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct Vocabulary {
    terms: Vec<String>,
    index: HashMap<String, TermId>,
}

impl Vocabulary {
    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn get(&self, term: &str) -> Option<TermId> {
        self.index.get(term).copied()
    }

    pub fn term(&self, id: TermId) -> Option<&str> {
        self.terms.get(id as usize).map(String::as_str)
    }

    pub fn terms(&self) -> &[String] {
        &self.terms
    }

    /// Column indices of the tokens present in the vocabulary, in order and
    /// with repeats. Unknown tokens are dropped.
    pub fn resolve<S: AsRef<str>>(&self, tokens: &[S]) -> Vec<TermId> {
        tokens.iter().filter_map(|t| self.get(t.as_ref())).collect()
    }
}

impl TryFrom<Vec<String>> for Vocabulary {
    type Error = ModelError;

    fn try_from(terms: Vec<String>) -> Result<Self> {
        if TermId::try_from(terms.len()).is_err() {
            return Err(ModelError::Format(format!("{} terms overflow a term id", terms.len())));
        }
        let mut index = HashMap::with_capacity(terms.len());
        for (i, term) in terms.iter().enumerate() {
            if index.insert(term.clone(), i as TermId).is_some() {
                return Err(ModelError::Format(format!("duplicate vocabulary term {term:?}")));
            }
        }
        Ok(Self { terms, index })
    }
}

impl From<Vocabulary> for Vec<String> {
    fn from(vocab: Vocabulary) -> Self {
        vocab.terms
    }
}

/// Counts terms per document; learns a [`Vocabulary`] in fit mode and
/// reuses a frozen one in transform mode.
#[derive(Debug, Clone)]
pub struct Vectorizer {
    config: VectorizerConfig,
}

impl Vectorizer {
    pub fn new(config: VectorizerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &VectorizerConfig {
        &self.config
    }

    /// Learns the vocabulary from analyzed documents and returns it together
    /// with the documents' term-frequency matrix.
    ///
    /// Terms are kept when `min_df <= df <= max_df * n_docs`. With
    /// `max_features`, the highest-df terms win, ties broken lexicographically.
    /// Column indices follow lexicographic term order.
    pub fn fit<D: AsRef<[String]>>(&self, corpus: &[D]) -> Result<(Vocabulary, CsrMatrix)> {
        let n_docs = corpus.len();
        let max_doc_count = self.config.max_df * n_docs as f64;
        if max_doc_count < self.config.min_df as f64 && n_docs > 0 {
            return Err(ModelError::invalid("max_df", "max_df corresponds to fewer documents than min_df"));
        }

        // Provisional ids in first-seen order.
        let mut dictionary: HashMap<String, usize> = HashMap::new();
        let mut df: Vec<usize> = Vec::new();
        let mut doc_counts: Vec<Vec<(usize, u32)>> = Vec::with_capacity(n_docs);
        for doc in corpus {
            let mut tf_counts: HashMap<usize, u32> = HashMap::new();
            for feature in self.features(doc.as_ref()) {
                let next = dictionary.len();
                let id = *dictionary.entry(feature).or_insert(next);
                if id == df.len() {
                    df.push(0);
                }
                let count = tf_counts.entry(id).or_insert(0);
                if *count == 0 {
                    df[id] += 1;
                }
                *count += 1;
            }
            doc_counts.push(tf_counts.into_iter().collect());
        }

        let mut kept: Vec<(&str, usize)> = dictionary
            .iter()
            .filter(|(_, &id)| df[id] >= self.config.min_df && df[id] as f64 <= max_doc_count)
            .map(|(term, &id)| (term.as_str(), id))
            .collect();
        let pruned = dictionary.len() - kept.len();
        if let Some(limit) = self.config.max_features {
            kept.sort_by(|a, b| df[b.1].cmp(&df[a.1]).then_with(|| a.0.cmp(b.0)));
            kept.truncate(limit);
        }
        kept.sort_by(|a, b| a.0.cmp(b.0));
        tracing::debug!(seen = dictionary.len(), pruned, kept = kept.len(), "vocabulary pruned");
        if kept.is_empty() {
            return Err(ModelError::EmptyVocabulary);
        }

        let mut remap: Vec<Option<TermId>> = vec![None; dictionary.len()];
        for (new_id, &(_, old_id)) in kept.iter().enumerate() {
            remap[old_id] = Some(new_id as TermId);
        }
        let vocab = Vocabulary::try_from(kept.iter().map(|(t, _)| t.to_string()).collect::<Vec<_>>())?;
        let rows: Vec<Vec<(TermId, f64)>> = doc_counts
            .into_iter()
            .map(|counts| {
                counts
                    .into_iter()
                    .filter_map(|(old, c)| remap[old].map(|id| (id, f64::from(c))))
                    .collect()
            })
            .collect();
        let matrix = CsrMatrix::from_rows(vocab.len(), rows)?;
        Ok((vocab, matrix))
    }

    /// Counts one document's features against a frozen vocabulary. Unknown
    /// features are dropped; the vocabulary never grows.
    pub fn transform(&self, tokens: &[String], vocab: &Vocabulary) -> Vec<(TermId, f64)> {
        let mut counts: HashMap<TermId, u32> = HashMap::new();
        for feature in self.features(tokens) {
            if let Some(id) = vocab.get(&feature) {
                *counts.entry(id).or_insert(0) += 1;
            }
        }
        let mut row: Vec<(TermId, f64)> = counts.into_iter().map(|(id, c)| (id, f64::from(c))).collect();
        row.sort_by_key(|&(id, _)| id);
        row
    }

    /// Term-frequency matrix for many documents against a frozen vocabulary.
    pub fn transform_many<D: AsRef<[String]>>(&self, corpus: &[D], vocab: &Vocabulary) -> Result<CsrMatrix> {
        let rows: Vec<Vec<(TermId, f64)>> = corpus.iter().map(|doc| self.transform(doc.as_ref(), vocab)).collect();
        CsrMatrix::from_rows(vocab.len(), rows)
    }

    /// Unigrams, or space-joined n-grams for every n in the configured range.
    pub fn features(&self, tokens: &[String]) -> Vec<String> {
        let (lo, hi) = self.config.ngram_range;
        if (lo, hi) == (1, 1) {
            return tokens.to_vec();
        }
        let mut out = Vec::new();
        for n in lo..=hi.min(tokens.len()) {
            out.extend(tokens.windows(n).map(|w| w.join(" ")));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn docs(texts: &[&str]) -> Vec<Vec<String>> {
        texts.iter().map(|t| t.split_whitespace().map(str::to_string).collect()).collect()
    }

    #[test]
    fn fit_assigns_lexicographic_indices() {
        let v = Vectorizer::new(VectorizerConfig::default()).unwrap();
        let (vocab, x) = v.fit(&docs(&["first about cats", "second about cats and dogs"])).unwrap();
        assert_eq!(vocab.terms(), &["about", "and", "cats", "dogs", "first", "second"]);
        assert_eq!(x.shape(), (2, 6));
        assert_eq!(x.row_sums(), vec![3.0, 5.0]);
        assert_eq!(vocab.get("cats"), Some(2));
        assert_eq!(vocab.term(5), Some("second"));
    }

    #[test]
    fn prunes_by_document_frequency() {
        let cfg = VectorizerConfig { min_df: 2, max_df: 0.9, ..Default::default() };
        let v = Vectorizer::new(cfg).unwrap();
        let corpus = docs(&["cat dog", "cat fish", "cat dog", "bird"]);
        let (vocab, x) = v.fit(&corpus).unwrap();
        // cat is in 3/4 docs (<= 3.6) and kept; fish and bird are below min_df.
        assert_eq!(vocab.terms(), &["cat", "dog"]);
        assert_eq!(x.row(3).0.len(), 0);
    }

    #[test]
    fn max_features_prefers_frequent_then_lexicographic() {
        let cfg = VectorizerConfig { max_features: Some(2), ..Default::default() };
        let v = Vectorizer::new(cfg).unwrap();
        let (vocab, _) = v.fit(&docs(&["zeta beta alpha", "zeta beta", "zeta"])).unwrap();
        assert_eq!(vocab.terms(), &["beta", "zeta"]);
        let cfg = VectorizerConfig { max_features: Some(1), ..Default::default() };
        let (vocab, _) = Vectorizer::new(cfg).unwrap().fit(&docs(&["b a", "a b"])).unwrap();
        assert_eq!(vocab.terms(), &["a"]);
    }

    #[test]
    fn empty_corpus_has_no_vocabulary() {
        let v = Vectorizer::new(VectorizerConfig::default()).unwrap();
        let empty: Vec<Vec<String>> = Vec::new();
        assert!(matches!(v.fit(&empty), Err(ModelError::EmptyVocabulary)));
        assert!(matches!(v.fit(&docs(&["", ""])), Err(ModelError::EmptyVocabulary)));
    }

    #[test]
    fn transform_drops_unknown_terms() {
        let v = Vectorizer::new(VectorizerConfig::default()).unwrap();
        let (vocab, _) = v.fit(&docs(&["cats dogs"])).unwrap();
        let row = v.transform(&docs(&["cats at home cats"])[0], &vocab);
        assert_eq!(row, vec![(0, 2.0)]);
        assert_eq!(vocab.len(), 2);
    }

    #[test]
    fn bigrams_are_counted() {
        let cfg = VectorizerConfig { ngram_range: (1, 2), ..Default::default() };
        let v = Vectorizer::new(cfg).unwrap();
        let (vocab, _) = v.fit(&docs(&["new york city"])).unwrap();
        assert!(vocab.get("new york").is_some());
        assert!(vocab.get("york city").is_some());
        assert!(vocab.get("city").is_some());
    }

    #[test]
    fn vocabulary_serializes_as_term_list() {
        let vocab = Vocabulary::try_from(vec!["a".to_string(), "b".to_string()]).unwrap();
        let json = serde_json::to_string(&vocab).unwrap();
        assert_eq!(json, r#"["a","b"]"#);
        let back: Vocabulary = serde_json::from_str(&json).unwrap();
        assert_eq!(back, vocab);
        assert!(serde_json::from_str::<Vocabulary>(r#"["a","a"]"#).is_err());
    }
}
