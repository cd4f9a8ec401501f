//! The immutable model artifact and the queries it answers.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::bm25::Bm25Transformer;
use crate::config::ModelConfig;
use crate::ranking::{self, top_terms};
use crate::sparse::{CscMatrix, CsrMatrix};
use crate::tokenizer::Analyzer;
use crate::vocabulary::{Vectorizer, Vocabulary};
use crate::{ModelError, Result, TermId, TopicId};

/// One ranked topic: its metadata fields flattened next to its score.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopicHit {
    #[serde(skip)]
    pub topic: TopicId,
    #[serde(flatten)]
    pub metadata: Map<String, Value>,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TermWeight {
    pub term: String,
    pub score: f64,
}

/// A query token matched against one topic's weights.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Explanation {
    pub full_token: String,
    pub token: String,
    pub score: f64,
}

/// Vocabulary, fitted weights and topic metadata, row-aligned and frozen.
///
/// Everything is read-only after construction, so one artifact can serve
/// any number of threads and several artifacts can live side by side.
#[derive(Debug)]
pub struct ModelArtifact {
    config: ModelConfig,
    analyzer: Analyzer,
    vectorizer: Vectorizer,
    vocabulary: Vocabulary,
    bm25: Bm25Transformer,
    topics: Vec<Map<String, Value>>,
    weights: CsrMatrix,
    by_term: CscMatrix,
}

impl ModelArtifact {
    /// Assembles an artifact, checking that every part describes the same
    /// topics and terms.
    pub fn new(
        config: ModelConfig,
        vocabulary: Vocabulary,
        bm25: Bm25Transformer,
        topics: Vec<Map<String, Value>>,
        weights: CsrMatrix,
    ) -> Result<Self> {
        config.validate()?;
        bm25.params().validate()?;
        if *bm25.params() != config.bm25 {
            return Err(ModelError::Misaligned(format!(
                "transformer parameters {:?} differ from configured {:?}",
                bm25.params(),
                config.bm25
            )));
        }
        let (n_topics, n_terms) = weights.shape();
        if topics.len() != n_topics {
            return Err(ModelError::Misaligned(format!(
                "{} metadata rows for {n_topics} matrix rows",
                topics.len()
            )));
        }
        if vocabulary.len() != n_terms {
            return Err(ModelError::DimensionMismatch { expected: vocabulary.len(), found: n_terms });
        }
        if bm25.params().use_idf {
            let idf = bm25.idf().ok_or(ModelError::NotFitted)?;
            if idf.len() != n_terms {
                return Err(ModelError::DimensionMismatch { expected: idf.len(), found: n_terms });
            }
        }
        let analyzer = Analyzer::new(config.analyzer.clone())?;
        let vectorizer = Vectorizer::new(config.vectorizer.clone())?;
        let by_term = weights.to_csc();
        tracing::info!(topics = n_topics, tokens = n_terms, "creating explicit topic model");
        Ok(Self { config, analyzer, vectorizer, vocabulary, bm25, topics, weights, by_term })
    }

    /// Fits a model on `(metadata, text)` documents, one per topic. Returns
    /// the artifact and the raw term-frequency matrix it was weighted from.
    pub fn train(config: ModelConfig, documents: Vec<(Map<String, Value>, String)>) -> Result<(Self, CsrMatrix)> {
        config.validate()?;
        let analyzer = Analyzer::new(config.analyzer.clone())?;
        let vectorizer = Vectorizer::new(config.vectorizer.clone())?;
        let (topics, texts): (Vec<_>, Vec<_>) = documents.into_iter().unzip();
        let corpus: Vec<Vec<String>> = texts.iter().map(|t| analyzer.analyze(t)).collect();
        let (vocabulary, counts) = vectorizer.fit(&corpus)?;
        let (bm25, weights) = Bm25Transformer::new(config.bm25)?.fit_transform(&counts)?;
        let model = Self::new(config, vocabulary, bm25, topics, weights)?;
        Ok((model, counts))
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocabulary
    }

    pub fn bm25(&self) -> &Bm25Transformer {
        &self.bm25
    }

    pub fn topics(&self) -> &[Map<String, Value>] {
        &self.topics
    }

    pub fn weights(&self) -> &CsrMatrix {
        &self.weights
    }

    pub fn num_topics(&self) -> usize {
        self.topics.len()
    }

    /// Analyzed features of `text`, exactly as documents were analyzed at fit time.
    pub fn analyze(&self, text: &str) -> Vec<String> {
        self.vectorizer.features(&self.analyzer.analyze(text))
    }

    pub fn topic_vector<S: AsRef<str>>(&self, tokens: &[S]) -> Result<Vec<f64>> {
        let token_indices: Vec<TermId> = self.vocabulary.resolve(tokens);
        ranking::topic_scores(&self.by_term, &token_indices)
    }

    pub fn topics_from_tokens<S: AsRef<str>>(&self, tokens: &[S], topn: usize, thresh: f64) -> Result<Vec<TopicHit>> {
        let scores = self.topic_vector(tokens)?;
        let hits = ranking::top_topics(&scores, topn, thresh)
            .into_iter()
            .map(|(topic, score)| TopicHit { topic, metadata: self.topics[topic].clone(), score })
            .collect();
        Ok(hits)
    }

    /// Ranks topics for free text.
    pub fn search(&self, text: &str, topn: usize, thresh: f64) -> Result<Vec<TopicHit>> {
        let tokens = self.analyze(text);
        self.topics_from_tokens(tokens.as_slice(), topn, thresh)
    }

    /// Row of the first topic whose title field equals `title`.
    pub fn topic_index(&self, title: &str) -> Result<TopicId> {
        let field = &self.config.title_field;
        self.topics
            .iter()
            .position(|t| t.get(field).and_then(Value::as_str) == Some(title))
            .ok_or_else(|| ModelError::UnknownTopic(title.to_string()))
    }

    pub fn top_terms_for(&self, topic: TopicId, topn: usize) -> Result<Vec<TermWeight>> {
        if topic >= self.num_topics() {
            return Err(ModelError::UnknownTopic(format!("row {topic}")));
        }
        let (terms, weights) = self.weights.row(topic);
        Ok(top_terms(terms, weights, topn)
            .into_iter()
            .filter_map(|(id, score)| self.vocabulary.term(id).map(|t| TermWeight { term: t.to_string(), score }))
            .collect())
    }

    /// Highest-weighted terms of the topic titled `title`.
    pub fn top_terms(&self, title: &str, topn: usize) -> Result<Vec<TermWeight>> {
        self.top_terms_for(self.topic_index(title)?, topn)
    }

    /// Which tokens of `text` tie it to the topic titled `title`, strongest first.
    pub fn explain(&self, text: &str, title: &str) -> Result<Vec<Explanation>> {
        let topic = self.topic_index(title)?;
        let mut out: Vec<Explanation> = self
            .analyzer
            .tokenize(text)
            .into_iter()
            .filter_map(|full_token| {
                let token = self.analyzer.stem(&full_token);
                let id = self.vocabulary.get(&token)?;
                let score = self.weights.get(topic, id);
                (score > 0.0).then_some(Explanation { full_token, token, score })
            })
            .collect();
        out.sort_by(|a, b| b.score.total_cmp(&a.score));
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Scope, StemmerKind};
    use crate::tokenizer::english_stop_words;
    use serde_json::json;

    fn doc(title: &str, text: &str) -> (Map<String, Value>, String) {
        let meta = json!({ "page_title": title }).as_object().cloned().unwrap();
        (meta, text.to_string())
    }

    fn model() -> ModelArtifact {
        let mut config = ModelConfig::new("test", Scope::Page);
        config.analyzer.stemmer = StemmerKind::English;
        config.analyzer.stop_words = english_stop_words();
        let docs = vec![
            doc("Cat", "Cats are small carnivorous mammals. Cats purr and hunt mice."),
            doc("Dog", "Dogs are domesticated wolves. Dogs bark and fetch."),
            doc("Mouse", "Mice are small rodents hunted by cats."),
        ];
        ModelArtifact::train(config, docs).unwrap().0
    }

    #[test]
    fn search_ranks_relevant_topics_first() {
        let m = model();
        let hits = m.search("my cat purrs", 10, 0.0).unwrap();
        assert_eq!(hits[0].metadata["page_title"], "Cat");
        assert!(hits.iter().all(|h| h.score > 0.0));
        assert!(hits.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[test]
    fn unknown_query_returns_nothing() {
        let m = model();
        assert!(m.search("quantum chromodynamics", 10, 0.0).unwrap().is_empty());
        assert!(m.search("", 10, 0.0).unwrap().is_empty());
    }

    #[test]
    fn hits_serialize_flat() {
        let m = model();
        let hits = m.search("dogs bark", 1, 0.0).unwrap();
        let v = serde_json::to_value(&hits).unwrap();
        assert_eq!(v[0]["page_title"], "Dog");
        assert!(v[0]["score"].as_f64().unwrap() > 0.0);
        assert!(v[0].get("topic").is_none());
    }

    #[test]
    fn top_terms_and_explain() {
        let m = model();
        let terms = m.top_terms("Dog", 2).unwrap();
        assert_eq!(terms.len(), 2);
        assert!(terms.iter().any(|t| t.term == "dog"));
        let why = m.explain("the dogs barked loudly", "Dog").unwrap();
        assert_eq!(why[0].token, "dog");
        assert_eq!(why[0].full_token, "dogs");
        assert!(matches!(m.top_terms("Unicorn", 3), Err(ModelError::UnknownTopic(_))));
    }

    #[test]
    fn misaligned_metadata_is_rejected() {
        let m = model();
        let mut topics = m.topics().to_vec();
        topics.pop();
        let err = ModelArtifact::new(m.config().clone(), m.vocabulary().clone(), m.bm25().clone(), topics, m.weights().clone());
        assert!(matches!(err, Err(ModelError::Misaligned(_))));
    }

    #[test]
    fn unfitted_transformer_is_rejected() {
        let m = model();
        let bm25 = Bm25Transformer::new(m.config().bm25).unwrap();
        let err = ModelArtifact::new(m.config().clone(), m.vocabulary().clone(), bm25, m.topics().to_vec(), m.weights().clone());
        assert!(matches!(err, Err(ModelError::NotFitted)));
    }

    #[test]
    fn transformer_parameters_must_match_config() {
        let m = model();
        let mut config = m.config().clone();
        config.bm25.k1 = 2.0;
        let err = ModelArtifact::new(config, m.vocabulary().clone(), m.bm25().clone(), m.topics().to_vec(), m.weights().clone());
        assert!(matches!(err, Err(ModelError::Misaligned(msg)) if msg.contains("k1")));
    }
}
