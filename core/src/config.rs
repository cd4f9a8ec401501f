//! Configuration carried inside a model artifact.
//!
//! Every value that changes how text becomes a weighted matrix is recorded
//! here, so that query-time analysis can be rebuilt exactly as it was at
//! training time. Paths, worker counts and log levels belong to the binaries.

use std::fmt;
use std::str::FromStr;

use rust_stemmers::Algorithm;
use serde::{Deserialize, Serialize};

use crate::{ModelError, Result};

/// BM25 term-frequency saturation parameter.
pub const DEFAULT_K1: f64 = 1.2;
/// BM25 document length normalization parameter.
pub const DEFAULT_B: f64 = 0.75;
/// Number of topics returned when the caller does not ask for a count.
pub const DEFAULT_TOPN: usize = 10;
/// Scores must be strictly greater than this to be returned.
pub const DEFAULT_THRESH: f64 = 0.0;
/// Metadata column used to look topics up by name.
pub const DEFAULT_TITLE_FIELD: &str = "page_title";

/// Which stemming algorithm reduces tokens to stems.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StemmerKind {
    None,
    #[serde(alias = "snowball")]
    English,
    Danish,
    Dutch,
    Finnish,
    French,
    German,
    Hungarian,
    Italian,
    Norwegian,
    Portuguese,
    Romanian,
    Russian,
    Spanish,
    Swedish,
    Turkish,
}

impl StemmerKind {
    pub fn algorithm(self) -> Option<Algorithm> {
        let algo = match self {
            Self::None => return None,
            Self::English => Algorithm::English,
            Self::Danish => Algorithm::Danish,
            Self::Dutch => Algorithm::Dutch,
            Self::Finnish => Algorithm::Finnish,
            Self::French => Algorithm::French,
            Self::German => Algorithm::German,
            Self::Hungarian => Algorithm::Hungarian,
            Self::Italian => Algorithm::Italian,
            Self::Norwegian => Algorithm::Norwegian,
            Self::Portuguese => Algorithm::Portuguese,
            Self::Romanian => Algorithm::Romanian,
            Self::Russian => Algorithm::Russian,
            Self::Spanish => Algorithm::Spanish,
            Self::Swedish => Algorithm::Swedish,
            Self::Turkish => Algorithm::Turkish,
        };
        Some(algo)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::English => "english",
            Self::Danish => "danish",
            Self::Dutch => "dutch",
            Self::Finnish => "finnish",
            Self::French => "french",
            Self::German => "german",
            Self::Hungarian => "hungarian",
            Self::Italian => "italian",
            Self::Norwegian => "norwegian",
            Self::Portuguese => "portuguese",
            Self::Romanian => "romanian",
            Self::Russian => "russian",
            Self::Spanish => "spanish",
            Self::Swedish => "swedish",
            Self::Turkish => "turkish",
        }
    }
}

impl FromStr for StemmerKind {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self> {
        let kind = match s.trim().to_lowercase().as_str() {
            "none" => Self::None,
            "snowball" | "english" => Self::English,
            "danish" => Self::Danish,
            "dutch" => Self::Dutch,
            "finnish" => Self::Finnish,
            "french" => Self::French,
            "german" => Self::German,
            "hungarian" => Self::Hungarian,
            "italian" => Self::Italian,
            "norwegian" => Self::Norwegian,
            "portuguese" => Self::Portuguese,
            "romanian" => Self::Romanian,
            "russian" => Self::Russian,
            "spanish" => Self::Spanish,
            "swedish" => Self::Swedish,
            "turkish" => Self::Turkish,
            other => return Err(ModelError::invalid("stemmer", format!("unknown stemmer {other:?}"))),
        };
        Ok(kind)
    }
}

impl fmt::Display for StemmerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How much of each page is concatenated into one training document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    /// The first surviving paragraph only.
    Paragraph,
    /// Every paragraph of the lead section.
    Intro,
    /// Every surviving paragraph.
    Page,
}

impl FromStr for Scope {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "paragraph" => Ok(Self::Paragraph),
            "intro" => Ok(Self::Intro),
            "page" => Ok(Self::Page),
            other => Err(ModelError::invalid(
                "scope",
                format!("scope must be one of [paragraph, intro, page], got {other:?}"),
            )),
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Paragraph => "paragraph",
            Self::Intro => "intro",
            Self::Page => "page",
        };
        f.write_str(s)
    }
}

/// Text analysis settings: token shape, stop words and stemming.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyzerConfig {
    pub stemmer: StemmerKind,
    pub min_token_len: usize,
    pub max_token_len: usize,
    /// Raw or stemmed stop words; both forms are checked.
    #[serde(default)]
    pub stop_words: Vec<String>,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self { stemmer: StemmerKind::None, min_token_len: 2, max_token_len: 25, stop_words: Vec::new() }
    }
}

impl AnalyzerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.min_token_len == 0 || self.min_token_len > self.max_token_len {
            return Err(ModelError::invalid(
                "token_len",
                format!("need 1 <= min ({}) <= max ({})", self.min_token_len, self.max_token_len),
            ));
        }
        Ok(())
    }
}

/// Vocabulary pruning and n-gram settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorizerConfig {
    /// Minimum number of documents a term must appear in.
    pub min_df: usize,
    /// Maximum fraction of documents a term may appear in.
    pub max_df: f64,
    pub max_features: Option<usize>,
    pub ngram_range: (usize, usize),
}

impl Default for VectorizerConfig {
    fn default() -> Self {
        Self { min_df: 1, max_df: 1.0, max_features: None, ngram_range: (1, 1) }
    }
}

impl VectorizerConfig {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.max_df) {
            return Err(ModelError::invalid("max_df", format!("{} is not a fraction in [0, 1]", self.max_df)));
        }
        let (lo, hi) = self.ngram_range;
        if lo == 0 || lo > hi {
            return Err(ModelError::invalid("ngram_range", format!("invalid range ({lo}, {hi})")));
        }
        if self.max_features == Some(0) {
            return Err(ModelError::invalid("max_features", "must be positive"));
        }
        Ok(())
    }
}

/// BM25 weighting parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bm25Params {
    pub use_idf: bool,
    pub k1: f64,
    pub b: f64,
}

impl Default for Bm25Params {
    fn default() -> Self {
        Self { use_idf: true, k1: DEFAULT_K1, b: DEFAULT_B }
    }
}

impl Bm25Params {
    pub fn validate(&self) -> Result<()> {
        if !(self.k1 > 0.0 && self.k1.is_finite()) {
            return Err(ModelError::invalid("k1", format!("{} must be > 0", self.k1)));
        }
        if !(0.0..=1.0).contains(&self.b) {
            return Err(ModelError::invalid("b", format!("{} must be in [0, 1]", self.b)));
        }
        Ok(())
    }
}

/// Everything needed to reproduce how a model was trained.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub corpus_name: String,
    pub scope: Scope,
    pub analyzer: AnalyzerConfig,
    pub vectorizer: VectorizerConfig,
    pub bm25: Bm25Params,
    #[serde(default = "default_title_field")]
    pub title_field: String,
}

fn default_title_field() -> String {
    DEFAULT_TITLE_FIELD.to_string()
}

impl ModelConfig {
    pub fn new(corpus_name: impl Into<String>, scope: Scope) -> Self {
        Self {
            corpus_name: corpus_name.into(),
            scope,
            analyzer: AnalyzerConfig::default(),
            vectorizer: VectorizerConfig::default(),
            bm25: Bm25Params::default(),
            title_field: default_title_field(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.analyzer.validate()?;
        self.vectorizer.validate()?;
        self.bm25.validate()
    }

    /// Directory name used for a trained model, e.g. `good-intro-ngram11-english`.
    pub fn model_name(&self) -> String {
        let (lo, hi) = self.vectorizer.ngram_range;
        format!("{}-{}-ngram{}{}-{}", self.corpus_name, self.scope, lo, hi, self.analyzer.stemmer)
    }
}
