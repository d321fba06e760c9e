use std::path::Path;

use ragdb_core::config::{
    expand_path, resolve_with_base, Config, DedupKey, EmbeddingProviderKind, Settings, VectorBackend,
};
use ragdb_core::Error;

#[test]
fn empty_document_yields_defaults() {
    let settings = Config::from_toml_str("").settings().unwrap();
    assert_eq!(settings, Settings::default());
    assert_eq!(settings.chunking.size, 800);
    assert_eq!(settings.chunking.overlap, 200);
    assert_eq!(settings.chunking.tokenizer, "cl100k_base");
    assert_eq!(settings.retrieval.vector_weight, 0.7);
    assert_eq!(settings.retrieval.bm25_weight, 0.3);
    assert_eq!(settings.retrieval.rrf_k, 60);
    assert_eq!(settings.retrieval.dedup, DedupKey::Text);
    assert!(!settings.retrieval.degraded_mode);
    assert_eq!(settings.embedding.provider, EmbeddingProviderKind::OpenAi);
    assert_eq!(settings.vector_store.backend, VectorBackend::Memory);
}

#[test]
fn toml_overrides_nested_sections() {
    let cfg = Config::from_toml_str(
        r#"
        [chunking]
        size = 256
        overlap = 32

        [retrieval]
        dedup = "chunk"
        degraded_mode = true

        [embedding]
        provider = "fake"
        dimension = 8
        "#,
    );
    let settings = cfg.settings().unwrap();
    assert_eq!(settings.chunking.size, 256);
    assert_eq!(settings.chunking.overlap, 32);
    assert_eq!(settings.chunking.tokenizer, "cl100k_base", "unset keys keep defaults");
    assert_eq!(settings.retrieval.dedup, DedupKey::Chunk);
    assert!(settings.retrieval.degraded_mode);
    assert_eq!(settings.embedding.provider, EmbeddingProviderKind::Fake);
    assert_eq!(settings.embedding.dimension, 8);
    assert_eq!(cfg.get::<usize>("chunking.size").unwrap(), 256);
}

#[test]
fn overlap_not_smaller_than_size_is_rejected() {
    let cfg = Config::from_toml_str("[chunking]\nsize = 100\noverlap = 100\n");
    assert!(matches!(cfg.settings(), Err(Error::InvalidConfig(_))));
}

#[test]
fn negative_weight_is_rejected() {
    let cfg = Config::from_toml_str("[retrieval]\nvector_weight = -0.5\n");
    assert!(matches!(cfg.settings(), Err(Error::InvalidConfig(_))));
}

#[test]
fn out_of_range_b_is_rejected() {
    let cfg = Config::from_toml_str("[retrieval]\nbm25_b = 1.5\n");
    assert!(matches!(cfg.settings(), Err(Error::InvalidConfig(_))));
}

#[test]
fn negative_or_non_finite_epsilon_is_rejected() {
    let cfg = Config::from_toml_str("[retrieval]\nbm25_epsilon = -0.25\n");
    assert!(matches!(cfg.settings(), Err(Error::InvalidConfig(msg)) if msg.contains("bm25_epsilon")));

    let mut settings = Settings::default();
    settings.retrieval.bm25_epsilon = f64::NAN;
    assert!(matches!(settings.validate(), Err(Error::InvalidConfig(_))));
    settings.retrieval.bm25_epsilon = 0.0;
    assert!(settings.validate().is_ok());
}

#[test]
fn missing_key_reports_invalid_config() {
    let cfg = Config::from_toml_str("");
    assert!(matches!(cfg.get::<String>("nope.missing"), Err(Error::InvalidConfig(_))));
}

#[test]
fn relative_paths_resolve_against_base() {
    let base = Path::new("/srv/ragdb");
    assert_eq!(resolve_with_base(base, "data"), Path::new("/srv/ragdb/data"));
    assert_eq!(resolve_with_base(base, "/abs/data"), Path::new("/abs/data"));
    assert_eq!(expand_path("plain/path"), Path::new("plain/path"));
}
