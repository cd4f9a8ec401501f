use lazy_static::lazy_static;
use regex::Regex;
use rust_stemmers::Stemmer;
use unicode_normalization::UnicodeNormalization;
use std::collections::HashSet;

use crate::config::AnalyzerConfig;
use crate::Result;

lazy_static! {
    // Alphabetic word runs; digits and punctuation break tokens.
    static ref RE: Regex = Regex::new(r"\b[^\d\W]+\b").expect("valid regex");
    static ref ENGLISH_STOP_WORDS: Vec<&'static str> = vec![
        "a","about","above","after","again","against","all","am","an","and","any","are","as","at",
        "be","because","been","before","being","below","between","both","but","by",
        "can","cannot","could",
        "did","do","does","doing","down","during",
        "each","few","for","from","further",
        "had","has","have","having","he","her","here","hers","herself","him","himself","his","how",
        "i","if","in","into","is","it","its","itself",
        "me","more","most","my","myself",
        "no","nor","not","of","off","on","once","only","or","other","ought","our","ours","ourselves","out","over","own",
        "same","she","should","so","some","such",
        "than","that","the","their","theirs","them","themselves","then","there","these","they","this","those","through","to","too",
        "under","until","up","very",
        "was","we","were","what","when","where","which","while","who","whom","why","with","would",
        "you","your","yours","yourself","yourselves"
    ];
}

/// The built-in English stop-word list.
pub fn english_stop_words() -> Vec<String> {
    ENGLISH_STOP_WORDS.iter().map(|w| w.to_string()).collect()
}

/// Turns raw text into stems. Built once from an [`AnalyzerConfig`] and
/// shared read-only afterwards.
pub struct Analyzer {
    config: AnalyzerConfig,
    stemmer: Option<Stemmer>,
    stop_words: HashSet<String>,
}

impl std::fmt::Debug for Analyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Analyzer").field("config", &self.config).finish()
    }
}

impl Analyzer {
    pub fn new(config: AnalyzerConfig) -> Result<Self> {
        config.validate()?;
        let stemmer = config.stemmer.algorithm().map(Stemmer::create);
        let mut stop_words = HashSet::new();
        for word in &config.stop_words {
            let word = word.to_lowercase();
            if let Some(stemmer) = &stemmer {
                stop_words.insert(stemmer.stem(&word).into_owned());
            }
            stop_words.insert(word);
        }
        Ok(Self { config, stemmer, stop_words })
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    /// Surface tokens: NFKC-normalized, lower-cased, length-filtered, stop words removed.
    pub fn tokenize(&self, text: &str) -> Vec<String> {
        let normalized = text.nfkc().collect::<String>().to_lowercase();
        RE.find_iter(&normalized)
            .map(|m| m.as_str())
            .filter(|tok| self.keep_len(tok) && !self.stop_words.contains(*tok))
            .map(str::to_string)
            .collect()
    }

    /// Stemmed tokens, in input order. Stems that land on a stop word are dropped too.
    pub fn analyze(&self, text: &str) -> Vec<String> {
        self.tokenize(text)
            .into_iter()
            .filter_map(|tok| {
                let stem = self.stem(&tok);
                (!self.stop_words.contains(&stem)).then_some(stem)
            })
            .collect()
    }

    pub fn stem(&self, token: &str) -> String {
        match &self.stemmer {
            Some(stemmer) => stemmer.stem(token).into_owned(),
            None => token.to_string(),
        }
    }

    fn keep_len(&self, token: &str) -> bool {
        let n = token.chars().count();
        n >= self.config.min_token_len && n <= self.config.max_token_len
    }
}
