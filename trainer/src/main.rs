use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use etm_core::config::{Bm25Params, ModelConfig, Scope, StemmerKind};
use etm_core::corpus::Page;
use etm_core::persist::{save_model, ModelPaths};
use etm_core::tokenizer::english_stop_words;
use etm_core::ModelArtifact;
use serde_json::{Map, Value};
use tracing_subscriber::{EnvFilter, fmt};
use walkdir::WalkDir;

use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

type Document = (Map<String, Value>, String);

#[derive(Parser)]
#[command(name = "trainer")]
#[command(about = "Train explicit topic models from page corpora", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fit a model from JSON/JSONL page files or a directory of them
    Build(BuildArgs),
}

#[derive(Args)]
struct BuildArgs {
    /// Input path (file or directory)
    #[arg(long)]
    input: String,
    /// Directory the model directory is created in
    #[arg(long)]
    output: String,
    /// Corpus name recorded in the model config
    #[arg(long, default_value = "base")]
    corpus_name: String,
    /// How much of each page forms a document: paragraph, intro or page
    #[arg(long, default_value = "intro")]
    scope: Scope,
    /// Stemming algorithm (none, snowball/english, or another snowball language)
    #[arg(long, default_value = "english")]
    stemmer: StemmerKind,
    /// JSON list of stop words; defaults to the built-in English list
    #[arg(long)]
    stop_words: Option<PathBuf>,
    /// Disable stop-word filtering entirely
    #[arg(long, default_value_t = false)]
    no_stop_words: bool,
    #[arg(long, default_value_t = 3)]
    min_df: usize,
    #[arg(long, default_value_t = 0.85)]
    max_df: f64,
    #[arg(long, default_value_t = 500_000)]
    max_features: usize,
    #[arg(long, default_value_t = 1)]
    ngram_min: usize,
    #[arg(long, default_value_t = 1)]
    ngram_max: usize,
    #[arg(long, default_value_t = etm_core::config::DEFAULT_K1)]
    k1: f64,
    #[arg(long, default_value_t = etm_core::config::DEFAULT_B)]
    b: f64,
    /// Weight by saturated term frequency only
    #[arg(long, default_value_t = false)]
    no_idf: bool,
    /// Metadata field holding the topic title
    #[arg(long, default_value = etm_core::config::DEFAULT_TITLE_FIELD)]
    title_field: String,
}

fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Build(args) => build_model(args).map(|_| ()),
    }
}

fn model_config(args: &BuildArgs) -> Result<ModelConfig> {
    let mut config = ModelConfig::new(args.corpus_name.clone(), args.scope);
    config.analyzer.stemmer = args.stemmer;
    config.analyzer.stop_words = match (&args.stop_words, args.no_stop_words) {
        (_, true) => Vec::new(),
        (Some(path), false) => {
            let file = File::open(path).with_context(|| format!("opening stop words {}", path.display()))?;
            serde_json::from_reader(BufReader::new(file))?
        }
        (None, false) => english_stop_words(),
    };
    config.vectorizer.min_df = args.min_df;
    config.vectorizer.max_df = args.max_df;
    config.vectorizer.max_features = Some(args.max_features);
    config.vectorizer.ngram_range = (args.ngram_min, args.ngram_max);
    config.bm25 = Bm25Params { use_idf: !args.no_idf, k1: args.k1, b: args.b };
    config.title_field = args.title_field.clone();
    config.validate()?;
    Ok(config)
}

fn build_model(args: BuildArgs) -> Result<PathBuf> {
    let config = model_config(&args)?;
    let out_dir = Path::new(&args.output).join(config.model_name());
    fs::create_dir_all(&out_dir)?;

    let mut documents: Vec<Document> = Vec::new();
    for file in input_files(Path::new(&args.input)) {
        if file.extension().and_then(|s| s.to_str()) == Some("jsonl") {
            read_jsonl(&file, config.scope, &mut documents)?;
        } else {
            read_json(&file, config.scope, &mut documents)?;
        }
    }
    tracing::info!(num_docs = documents.len(), scope = %config.scope, "ingested pages");

    let (model, counts) = ModelArtifact::train(config, documents)?;
    tracing::info!(num_topics = model.num_topics(), num_terms = model.vocabulary().len(), "model fitted");

    save_model(&ModelPaths::new(&out_dir), &model, Some(&counts))?;
    tracing::info!(output = %out_dir.display(), "model build complete");
    Ok(out_dir)
}

/// JSON/JSONL files under `input`, in path order so row numbering is stable.
fn input_files(input: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = Vec::new();
    if input.is_dir() {
        for entry in WalkDir::new(input).sort_by_file_name().into_iter().filter_map(|e| e.ok()) {
            let p = entry.path();
            if p.is_file() {
                if let Some(ext) = p.extension().and_then(|s| s.to_str()) {
                    if matches!(ext, "json" | "jsonl") {
                        files.push(p.to_path_buf());
                    }
                }
            }
        }
    } else if input.is_file() {
        files.push(input.to_path_buf());
    }
    files
}

fn read_jsonl(file: &Path, scope: Scope, documents: &mut Vec<Document>) -> Result<()> {
    let f = File::open(file)?;
    let reader = BufReader::new(f);
    for (n, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() { continue; }
        let page: Page = serde_json::from_str(&line)
            .with_context(|| format!("{}:{}", file.display(), n + 1))?;
        documents.push(page.into_parts(scope));
    }
    Ok(())
}

fn read_json(file: &Path, scope: Scope, documents: &mut Vec<Document>) -> Result<()> {
    let f = File::open(file)?;
    let reader = BufReader::new(f);
    let json: Value = serde_json::from_reader(reader)?;
    match json {
        Value::Array(arr) => {
            for v in arr {
                let page: Page = serde_json::from_value(v)?;
                documents.push(page.into_parts(scope));
            }
        }
        Value::Object(_) => {
            let page: Page = serde_json::from_value(json)?;
            documents.push(page.into_parts(scope));
        }
        _ => tracing::warn!(file = %file.display(), "skipping non-object json"),
    }
    Ok(())
}
