use etm_core::config::{ModelConfig, Scope, StemmerKind};
use etm_core::persist::{load_matrix, load_model, save_model, ModelPaths};
use etm_core::sparse::{CsrMatrix, Normalization};
use etm_core::tokenizer::english_stop_words;
use etm_core::ModelArtifact;
use serde_json::{json, Map, Value};

fn titled(title: &str, text: &str) -> (Map<String, Value>, String) {
    let meta = json!({ "page_title": title, "page_id": title.len() }).as_object().cloned().unwrap();
    (meta, text.to_string())
}

fn cats_and_dogs(config: ModelConfig) -> (ModelArtifact, CsrMatrix) {
    ModelArtifact::train(
        config,
        vec![titled("First", "first about cats"), titled("Second", "second about cats and dogs")],
    )
    .unwrap()
}

#[test]
fn unfiltered_scenario_matches_hand_computation() {
    let (model, counts) = cats_and_dogs(ModelConfig::new("toy", Scope::Page));
    assert_eq!(model.vocabulary().terms(), &["about", "and", "cats", "dogs", "first", "second"]);
    assert_eq!(counts.row_sums(), vec![3.0, 5.0]);

    let w = model.weights();
    assert_eq!(w.shape(), (2, 6));
    // Same non-zero pattern as the counts.
    assert_eq!(w.indices(), counts.indices());
    assert_eq!(w.indptr(), counts.indptr());

    let cats = model.vocabulary().get("cats").unwrap();
    let idf = model.bm25().idf().unwrap();
    let expected_idf = (1.0f64 + 0.5 / 2.5).ln();
    assert!((idf[cats as usize] - expected_idf).abs() < 1e-12);
    let tf = |dl: f64| 2.2 / (1.0 + 1.2 * (0.25 + 0.75 * dl / 4.0));
    assert!((w.get(0, cats) - tf(3.0) * expected_idf).abs() < 1e-12);
    assert!((w.get(1, cats) - tf(5.0) * expected_idf).abs() < 1e-12);
    assert!(w.get(1, cats) < w.get(0, cats));
}

#[test]
fn stop_word_scenario_drops_about_and_and() {
    let mut config = ModelConfig::new("toy", Scope::Page);
    config.analyzer.stop_words = english_stop_words();
    let (model, _) = cats_and_dogs(config);
    assert_eq!(model.vocabulary().terms(), &["cats", "dogs", "first", "second"]);
    assert_eq!(model.weights().shape(), (2, 4));
}

#[test]
fn query_resolves_only_known_tokens() {
    let (model, _) = cats_and_dogs(ModelConfig::new("toy", Scope::Page));
    let tokens = model.analyze("cats at home");
    assert_eq!(tokens, vec!["cats", "at", "home"]);
    let cats = model.vocabulary().get("cats").unwrap();

    // norm = 1: scores are exactly the "cats" column.
    let scores = model.topic_vector(tokens.as_slice()).unwrap();
    assert_eq!(scores, vec![model.weights().get(0, cats), model.weights().get(1, cats)]);

    let hits = model.search("cats at home", 10, 0.0).unwrap();
    let titles: Vec<&str> = hits.iter().map(|h| h.metadata["page_title"].as_str().unwrap()).collect();
    assert_eq!(titles, vec!["First", "Second"]);
}

#[test]
fn ranking_is_reproducible() {
    let (model, _) = cats_and_dogs(ModelConfig::new("toy", Scope::Page));
    let a = model.search("cats and dogs", 10, 0.0).unwrap();
    let b = model.search("cats and dogs", 10, 0.0).unwrap();
    assert_eq!(a, b);
    for (x, y) in a.iter().zip(&b) {
        assert_eq!(x.score.to_bits(), y.score.to_bits());
    }
}

#[test]
fn threshold_above_every_score_returns_nothing() {
    let (model, _) = cats_and_dogs(ModelConfig::new("toy", Scope::Page));
    let best = model.search("cats", 10, 0.0).unwrap()[0].score;
    assert!(model.search("cats", 10, best).unwrap().is_empty());
    assert_eq!(model.search("cats", 1, 0.0).unwrap().len(), 1);
}

#[test]
fn artifact_round_trips_losslessly() {
    let mut config = ModelConfig::new("toy", Scope::Intro);
    config.analyzer.stemmer = StemmerKind::English;
    let (model, counts) = cats_and_dogs(config);
    let dir = tempfile::tempdir().unwrap();
    let paths = ModelPaths::new(dir.path());
    save_model(&paths, &model, Some(&counts)).unwrap();

    let loaded = load_model(&paths, Normalization::None).unwrap();
    assert_eq!(loaded.config(), model.config());
    assert_eq!(loaded.vocabulary(), model.vocabulary());
    assert_eq!(loaded.bm25().idf(), model.bm25().idf());
    assert_eq!(loaded.weights(), model.weights());
    assert_eq!(loaded.topics(), model.topics());
    assert_eq!(load_matrix(&paths.counts()).unwrap(), counts);
    assert_eq!(loaded.search("cat", 10, 0.0).unwrap(), model.search("cat", 10, 0.0).unwrap());
}

#[test]
fn normalized_load_gives_unit_rows() {
    let (model, _) = cats_and_dogs(ModelConfig::new("toy", Scope::Page));
    let dir = tempfile::tempdir().unwrap();
    let paths = ModelPaths::new(dir.path());
    save_model(&paths, &model, None).unwrap();
    let loaded = load_model(&paths, Normalization::Rows).unwrap();
    for i in 0..loaded.num_topics() {
        let norm: f64 = loaded.weights().row(i).1.iter().map(|v| v * v).sum();
        assert!((norm - 1.0).abs() < 1e-9);
    }
}

#[test]
fn transform_without_idf_preserves_sparsity_and_zero_rows() {
    use etm_core::bm25::Bm25Transformer;
    use etm_core::config::Bm25Params;

    let x = CsrMatrix::from_rows(
        4,
        vec![vec![(0, 3.0), (2, 1.0)], vec![], vec![(1, 7.0), (3, 2.0), (0, 1.0)]],
    )
    .unwrap();
    let t = Bm25Transformer::new(Bm25Params { use_idf: false, ..Default::default() }).unwrap();
    let w = t.transform(&x).unwrap();
    assert_eq!(w.shape(), x.shape());
    assert_eq!(w.indptr(), x.indptr());
    assert_eq!(w.indices(), x.indices());
    assert!(w.data().iter().all(|&v| v > 0.0));
    assert_eq!(w.row(1).0.len(), 0);
}

#[test]
fn idf_never_increases_with_document_frequency() {
    use etm_core::bm25::Bm25Transformer;
    use etm_core::config::Bm25Params;

    // Column j appears in the first j + 1 of 6 documents.
    let n_docs = 6;
    let rows: Vec<Vec<(u32, f64)>> = (0..n_docs)
        .map(|i| (i as u32..n_docs as u32).map(|j| (j, 1.0)).collect())
        .collect();
    let x = CsrMatrix::from_rows(n_docs, rows).unwrap();
    let t = Bm25Transformer::new(Bm25Params::default()).unwrap().fit(&x).unwrap();
    let idf = t.idf().unwrap();
    assert!(idf.iter().all(|&w| w >= 0.0));
    assert!(idf.windows(2).all(|w| w[0] >= w[1]));
}
