use anyhow::{bail, Context, Result};
use axum::{extract::{Path, Query, State}, http::StatusCode, routing::get, Json, Router};
use etm_core::config::{DEFAULT_THRESH, DEFAULT_TOPN};
use etm_core::model::{Explanation, TermWeight};
use etm_core::persist::{load_model, ModelPaths};
use etm_core::sparse::Normalization;
use etm_core::{ModelArtifact, ModelError, TopicHit};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer, AllowOrigin};
use tower_http::trace::TraceLayer;

const MAX_TOPN: usize = 100;

/// A model directory to serve, optionally under an explicit name.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelSpec {
    pub name: String,
    pub path: PathBuf,
}

impl std::str::FromStr for ModelSpec {
    type Err = String;

    /// Accepts `name=dir` or a bare `dir`, which is named after its last component.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, path) = match s.split_once('=') {
            Some((name, path)) => (name.trim().to_string(), PathBuf::from(path.trim())),
            None => {
                let path = PathBuf::from(s.trim());
                let name = path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .ok_or_else(|| format!("cannot derive a model name from {s:?}"))?
                    .to_string();
                (name, path)
            }
        };
        if name.is_empty() {
            return Err(format!("empty model name in {s:?}"));
        }
        Ok(Self { name, path })
    }
}

#[derive(Deserialize)]
pub struct SearchParams {
    pub q: String,
    #[serde(default = "default_k")]
    pub k: usize,
    #[serde(default = "default_thresh")]
    pub thresh: f64,
    pub model: Option<String>,
}
fn default_k() -> usize { DEFAULT_TOPN }
fn default_thresh() -> f64 { DEFAULT_THRESH }

#[derive(Deserialize)]
pub struct ExplainParams {
    pub q: String,
    pub title: String,
    pub model: Option<String>,
}

#[derive(Deserialize)]
pub struct TopicParams {
    #[serde(default = "default_k")]
    pub k: usize,
    pub model: Option<String>,
}

#[derive(Serialize)]
pub struct TopicResponse {
    pub row: usize,
    pub metadata: Map<String, Value>,
    pub top_terms: Vec<TermWeight>,
}

#[derive(Serialize)]
pub struct ModelInfo {
    pub name: String,
    pub num_topics: usize,
    pub num_terms: usize,
    pub default: bool,
}

/// Models loaded once at startup; never mutated afterwards.
#[derive(Clone)]
pub struct AppState {
    pub models: Arc<BTreeMap<String, Arc<ModelArtifact>>>,
    pub default_model: String,
}

type ApiError = (StatusCode, Json<Value>);

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (status, Json(serde_json::json!({ "error": message.into() })))
}

impl AppState {
    /// Loads every model directory. The first one is the default.
    pub fn load(specs: &[ModelSpec], normalization: Normalization) -> Result<Self> {
        let Some(first) = specs.first() else { bail!("at least one model is required") };
        let mut models = BTreeMap::new();
        for spec in specs {
            let model = load_model(&ModelPaths::new(&spec.path), normalization)
                .with_context(|| format!("loading model {} from {}", spec.name, spec.path.display()))?;
            if models.insert(spec.name.clone(), Arc::new(model)).is_some() {
                bail!("model name {} given twice", spec.name);
            }
        }
        Ok(Self { models: Arc::new(models), default_model: first.name.clone() })
    }

    fn model(&self, name: Option<&str>) -> Result<&Arc<ModelArtifact>, ApiError> {
        let name = name.unwrap_or(&self.default_model);
        self.models
            .get(name)
            .ok_or_else(|| api_error(StatusCode::NOT_FOUND, format!("unknown model {name}")))
    }
}

pub fn build_app(state: AppState) -> Router {
    // CORS: read CORS_ALLOW_ORIGIN (comma-separated) or allow Any by default
    let cors = match std::env::var("CORS_ALLOW_ORIGIN") {
        Ok(val) => {
            let origins: Vec<_> = val
                .split(',')
                .filter_map(|s| s.trim().parse().ok())
                .collect();
            if origins.is_empty() {
                CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)
            } else {
                CorsLayer::new().allow_origin(AllowOrigin::list(origins)).allow_methods(Any).allow_headers(Any)
            }
        }
        Err(_) => CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any),
    };

    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/models", get(models_handler))
        .route("/search", get(search_handler))
        .route("/explain", get(explain_handler))
        .route("/topics/:row", get(topic_handler))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

fn model_error(e: ModelError) -> ApiError {
    match e {
        ModelError::UnknownTopic(_) => api_error(StatusCode::NOT_FOUND, e.to_string()),
        _ => api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

pub async fn search_handler(State(state): State<AppState>, Query(params): Query<SearchParams>) -> Result<Json<Vec<TopicHit>>, ApiError> {
    let start = std::time::Instant::now();
    let model = state.model(params.model.as_deref())?;
    let k = params.k.min(MAX_TOPN);
    let hits = model.search(&params.q, k, params.thresh).map_err(model_error)?;
    tracing::debug!(query = %params.q, hits = hits.len(), took_s = start.elapsed().as_secs_f64(), "search");
    Ok(Json(hits))
}

pub async fn explain_handler(State(state): State<AppState>, Query(params): Query<ExplainParams>) -> Result<Json<Vec<Explanation>>, ApiError> {
    let model = state.model(params.model.as_deref())?;
    let explanation = model.explain(&params.q, &params.title).map_err(model_error)?;
    Ok(Json(explanation))
}

pub async fn topic_handler(State(state): State<AppState>, Path(row): Path<usize>, Query(params): Query<TopicParams>) -> Result<Json<TopicResponse>, ApiError> {
    let model = state.model(params.model.as_deref())?;
    let top_terms = model.top_terms_for(row, params.k.min(MAX_TOPN)).map_err(model_error)?;
    Ok(Json(TopicResponse { row, metadata: model.topics()[row].clone(), top_terms }))
}

pub async fn models_handler(State(state): State<AppState>) -> Json<Vec<ModelInfo>> {
    let infos = state
        .models
        .iter()
        .map(|(name, m)| ModelInfo {
            name: name.clone(),
            num_topics: m.num_topics(),
            num_terms: m.vocabulary().len(),
            default: *name == state.default_model,
        })
        .collect();
    Json(infos)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_model_specs() {
        let named: ModelSpec = "en=/data/models/good-intro".parse().unwrap();
        assert_eq!(named, ModelSpec { name: "en".into(), path: PathBuf::from("/data/models/good-intro") });
        let bare: ModelSpec = "/data/models/good-intro".parse().unwrap();
        assert_eq!(bare.name, "good-intro");
        assert!("=/tmp".parse::<ModelSpec>().is_err());
    }
}
