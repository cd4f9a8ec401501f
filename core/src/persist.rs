use crate::bm25::Bm25Transformer;
use crate::config::ModelConfig;
use crate::sparse::{CooMatrix, CscMatrix, CsrMatrix, Normalization};
use crate::vocabulary::Vocabulary;
use crate::{ModelArtifact, ModelError, Result, TermId};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::fs::{create_dir_all, File};
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaFile {
    pub num_topics: usize,
    pub num_terms: usize,
    pub created_at: String,
    pub version: u32,
}

/// Fitted state stored next to the matrices: what maps text to columns and
/// how counts were weighted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorizerBlob {
    pub vocabulary: Vocabulary,
    pub bm25: Bm25Transformer,
}

pub struct ModelPaths {
    pub root: PathBuf,
}

impl ModelPaths {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self { root: root.as_ref().to_path_buf() }
    }
    pub fn config(&self) -> PathBuf { self.root.join("config.json") }
    pub fn vectorizer(&self) -> PathBuf { self.root.join("vectorizer.bin") }
    pub fn topics(&self) -> PathBuf { self.root.join("topics.jsonl") }
    pub fn counts(&self) -> PathBuf { self.root.join("counts.bin") }
    pub fn weights(&self) -> PathBuf { self.root.join("weights.bin") }
    pub fn meta(&self) -> PathBuf { self.root.join("meta.json") }
}

/// Sparse layouts a stored matrix may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatrixFormat {
    Csr,
    Csc,
    Coo,
}

impl MatrixFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Csr => "csr",
            Self::Csc => "csc",
            Self::Coo => "coo",
        }
    }
}

impl FromStr for MatrixFormat {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "csr" => Ok(Self::Csr),
            "csc" => Ok(Self::Csc),
            "coo" => Ok(Self::Coo),
            other => Err(ModelError::Format(format!("unknown matrix format {other:?}"))),
        }
    }
}

impl fmt::Display for MatrixFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Self-describing on-disk sparse matrix. Compressed formats fill
/// `indices`/`indptr`; coordinate format fills `row`/`col`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredMatrix {
    pub format: String,
    pub shape: (u64, u64),
    pub data: Vec<f64>,
    #[serde(default)]
    pub indices: Vec<u64>,
    #[serde(default)]
    pub indptr: Vec<u64>,
    #[serde(default)]
    pub row: Vec<u64>,
    #[serde(default)]
    pub col: Vec<u64>,
}

impl StoredMatrix {
    pub fn encode(m: &CsrMatrix, format: MatrixFormat) -> Self {
        let (rows, cols) = m.shape();
        let mut out = Self {
            format: format.as_str().to_string(),
            shape: (rows as u64, cols as u64),
            data: Vec::new(),
            indices: Vec::new(),
            indptr: Vec::new(),
            row: Vec::new(),
            col: Vec::new(),
        };
        match format {
            MatrixFormat::Csr => {
                out.data = m.data().to_vec();
                out.indices = m.indices().iter().map(|&c| u64::from(c)).collect();
                out.indptr = m.indptr().iter().map(|&p| p as u64).collect();
            }
            MatrixFormat::Csc => {
                let csc = m.to_csc();
                out.data = csc.data().to_vec();
                out.indices = csc.indices().iter().map(|&r| r as u64).collect();
                out.indptr = csc.indptr().iter().map(|&p| p as u64).collect();
            }
            MatrixFormat::Coo => {
                let coo = m.to_coo();
                out.data = coo.data;
                out.row = coo.row.into_iter().map(|r| r as u64).collect();
                out.col = coo.col.into_iter().map(|c| c as u64).collect();
            }
        }
        out
    }

    /// Rebuilds the canonical row-major matrix. Unknown tags and
    /// inconsistent arrays are format errors.
    pub fn decode(&self) -> Result<CsrMatrix> {
        let format: MatrixFormat = self.format.parse()?;
        let shape = (to_usize(self.shape.0)?, to_usize(self.shape.1)?);
        match format {
            MatrixFormat::Csr => {
                let indices = self
                    .indices
                    .iter()
                    .map(|&c| TermId::try_from(c).map_err(|_| ModelError::Format(format!("column {c} overflows"))))
                    .collect::<Result<Vec<_>>>()?;
                CsrMatrix::new(shape, to_usizes(&self.indptr)?, indices, self.data.clone())
            }
            MatrixFormat::Csc => {
                CscMatrix::new(shape, to_usizes(&self.indptr)?, to_usizes(&self.indices)?, self.data.clone())?
                    .to_csr()
            }
            MatrixFormat::Coo => CooMatrix {
                rows: shape.0,
                cols: shape.1,
                row: to_usizes(&self.row)?,
                col: to_usizes(&self.col)?,
                data: self.data.clone(),
            }
            .to_csr(),
        }
    }
}

fn to_usize(v: u64) -> Result<usize> {
    usize::try_from(v).map_err(|_| ModelError::Format(format!("{v} does not fit in usize")))
}

fn to_usizes(vs: &[u64]) -> Result<Vec<usize>> {
    vs.iter().map(|&v| to_usize(v)).collect()
}

pub fn save_matrix(path: &Path, m: &CsrMatrix, format: MatrixFormat) -> Result<()> {
    let mut f = File::create(path)?;
    let bytes = bincode::serialize(&StoredMatrix::encode(m, format))?;
    f.write_all(&bytes)?;
    Ok(())
}

pub fn load_matrix(path: &Path) -> Result<CsrMatrix> {
    let mut f = File::open(path)?;
    let mut buf = Vec::new();
    f.read_to_end(&mut buf)?;
    let stored: StoredMatrix = bincode::deserialize(&buf)
        .map_err(|e| ModelError::Format(format!("{} is not a stored sparse matrix: {e}", path.display())))?;
    stored.decode()
}

pub fn save_config(paths: &ModelPaths, config: &ModelConfig) -> Result<()> {
    create_dir_all(&paths.root)?;
    let mut f = File::create(paths.config())?;
    let json = serde_json::to_string_pretty(config)?;
    f.write_all(json.as_bytes())?;
    Ok(())
}

pub fn load_config(paths: &ModelPaths) -> Result<ModelConfig> {
    let mut f = File::open(paths.config())?;
    let mut buf = String::new();
    f.read_to_string(&mut buf)?;
    let config: ModelConfig = serde_json::from_str(&buf)
        .map_err(|e| ModelError::Format(format!("{}: {e}", paths.config().display())))?;
    Ok(config)
}

pub fn save_vectorizer(paths: &ModelPaths, blob: &VectorizerBlob) -> Result<()> {
    let mut f = File::create(paths.vectorizer())?;
    let bytes = bincode::serialize(blob)?;
    f.write_all(&bytes)?;
    Ok(())
}

pub fn load_vectorizer(paths: &ModelPaths) -> Result<VectorizerBlob> {
    let mut f = File::open(paths.vectorizer())?;
    let mut buf = Vec::new();
    f.read_to_end(&mut buf)?;
    let blob = bincode::deserialize(&buf)
        .map_err(|e| ModelError::Format(format!("{}: {e}", paths.vectorizer().display())))?;
    Ok(blob)
}

/// Writes one JSON object per line, in row order.
pub fn save_topics(paths: &ModelPaths, topics: &[Map<String, Value>]) -> Result<()> {
    let mut w = BufWriter::new(File::create(paths.topics())?);
    for record in topics {
        serde_json::to_writer(&mut w, record)?;
        w.write_all(b"\n")?;
    }
    w.flush()?;
    Ok(())
}

pub fn load_topics(paths: &ModelPaths) -> Result<Vec<Map<String, Value>>> {
    let reader = BufReader::new(File::open(paths.topics())?);
    let mut topics = Vec::new();
    for (n, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() { continue; }
        let record: Map<String, Value> = serde_json::from_str(&line)
            .map_err(|e| ModelError::Format(format!("topics line {}: {e}", n + 1)))?;
        topics.push(record);
    }
    Ok(topics)
}

pub fn save_meta(paths: &ModelPaths, meta: &MetaFile) -> Result<()> {
    create_dir_all(&paths.root)?;
    let mut f = File::create(paths.meta())?;
    let json = serde_json::to_string_pretty(meta)?;
    f.write_all(json.as_bytes())?;
    Ok(())
}

pub fn load_meta(paths: &ModelPaths) -> Result<MetaFile> {
    let mut f = File::open(paths.meta())?;
    let mut buf = String::new();
    f.read_to_string(&mut buf)?;
    let meta: MetaFile = serde_json::from_str(&buf)?;
    Ok(meta)
}

/// Writes every part of a model artifact; `counts` is the raw
/// term-frequency matrix when the caller still has it.
pub fn save_model(paths: &ModelPaths, model: &ModelArtifact, counts: Option<&CsrMatrix>) -> Result<()> {
    save_config(paths, model.config())?;
    let blob = VectorizerBlob { vocabulary: model.vocabulary().clone(), bm25: model.bm25().clone() };
    save_vectorizer(paths, &blob)?;
    save_topics(paths, model.topics())?;
    save_matrix(&paths.weights(), model.weights(), MatrixFormat::Csr)?;
    if let Some(counts) = counts {
        save_matrix(&paths.counts(), counts, MatrixFormat::Csr)?;
    }
    let meta = MetaFile {
        num_topics: model.num_topics(),
        num_terms: model.vocabulary().len(),
        created_at: time::OffsetDateTime::now_utc()
            .format(&time::format_description::well_known::Rfc3339)
            .unwrap_or_default(),
        version: FORMAT_VERSION,
    };
    save_meta(paths, &meta)?;
    tracing::info!(path = %paths.root.display(), "model artifact written");
    Ok(())
}

/// Loads a model artifact, optionally L2-normalizing its weights.
pub fn load_model(paths: &ModelPaths, normalization: Normalization) -> Result<ModelArtifact> {
    for required in [paths.meta(), paths.config(), paths.vectorizer(), paths.topics(), paths.weights()] {
        if !required.is_file() {
            return Err(ModelError::Format(format!("model directory is missing {}", required.display())));
        }
    }
    let meta = load_meta(paths)?;
    if meta.version != FORMAT_VERSION {
        return Err(ModelError::Format(format!("unsupported artifact version {}", meta.version)));
    }
    let config = load_config(paths)?;
    let VectorizerBlob { vocabulary, bm25 } = load_vectorizer(paths)?;
    let topics = load_topics(paths)?;
    let weights = load_matrix(&paths.weights())?.normalized(normalization);
    let model = ModelArtifact::new(config, vocabulary, bm25, topics, weights)?;
    if meta.num_topics != model.num_topics() || meta.num_terms != model.vocabulary().len() {
        return Err(ModelError::Misaligned(format!(
            "meta.json records {} topics and {} terms, artifact has {} and {}",
            meta.num_topics,
            meta.num_terms,
            model.num_topics(),
            model.vocabulary().len()
        )));
    }
    Ok(model)
}
