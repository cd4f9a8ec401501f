pub mod bm25;
pub mod config;
pub mod corpus;
pub mod error;
pub mod model;
pub mod persist;
pub mod ranking;
pub mod sparse;
pub mod tokenizer;
pub mod vocabulary;

pub use error::{ModelError, Result};
pub use model::{ModelArtifact, TopicHit};

/// Dense column index into the vocabulary.
pub type TermId = u32;
/// Row index into the weighted matrix and the metadata table.
pub type TopicId = usize;
