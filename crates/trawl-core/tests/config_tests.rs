use std::fs;

use trawl_core::config::{resolve_with_base, Config, Provider, StorageBackend};
use trawl_core::ModelType;

#[test]
fn defaults_apply_without_any_file() {
    let tmp = tempfile::tempdir().unwrap();
    let settings = Config::load_from(tmp.path(), "test").unwrap().settings().unwrap();

    assert_eq!(settings.storage.backend, StorageBackend::Tantivy);
    assert!(settings.storage.path.is_none());
    assert_eq!(settings.search.k, 4);
    assert_eq!(settings.search.rff_k, 20);
    assert_eq!(settings.search.num_candidates, 200);
    assert_eq!(settings.embeddings.batch_size, 48);
    assert_eq!(settings.embeddings.max_attempts, 3);
    assert_eq!(settings.embeddings.retry_delay_ms, 2_000);
    assert!(settings.models.is_empty());
}

#[test]
fn env_file_overrides_base_file() {
    let tmp = tempfile::tempdir().unwrap();
    fs::write(
        tmp.path().join("trawl.toml"),
        r#"
[storage]
backend = "tantivy"
path = "data"

[search]
rff_k = 60

[[models]]
id = "bge-m3"
type = "text-embeddings-inference"
url = "http://localhost:8080/v1/"
aliases = ["embeddings"]
"#,
    )
    .unwrap();
    fs::write(
        tmp.path().join("trawl.test.toml"),
        r#"
[storage]
backend = "vector"
"#,
    )
    .unwrap();

    let config = Config::load_from(tmp.path(), "test").unwrap();
    let settings = config.settings().unwrap();
    assert_eq!(settings.storage.backend, StorageBackend::Vector);
    assert_eq!(settings.storage.resolved_path(tmp.path()), Some(tmp.path().join("data")));
    assert_eq!(settings.search.rff_k, 60);
    assert_eq!(settings.search.k, 4);

    let model = &settings.models[0];
    assert_eq!(model.model_type, ModelType::Embeddings);
    assert_eq!(model.provider, Provider::OpenAi);
    assert_eq!(model.timeout_secs, 10);
    assert_eq!(model.to_config().base_url, "http://localhost:8080/v1/");

    let rff_k: usize = config.get("search.rff_k").unwrap();
    assert_eq!(rff_k, 60);
}

#[test]
fn invalid_settings_are_rejected() {
    let tmp = tempfile::tempdir().unwrap();
    fs::write(tmp.path().join("trawl.toml"), "[embeddings]\nbatch_size = 0\n").unwrap();
    assert!(Config::load_from(tmp.path(), "test").unwrap().settings().is_err());

    fs::write(
        tmp.path().join("trawl.toml"),
        "[[models]]\nid = \"remote\"\ntype = \"text-generation\"\n",
    )
    .unwrap();
    assert!(Config::load_from(tmp.path(), "test").unwrap().settings().is_err());

    assert!(Config::load_from(tmp.path(), "staging").is_err());
}

#[test]
fn relative_paths_resolve_against_base() {
    let base = std::path::Path::new("/srv/trawl");
    assert_eq!(resolve_with_base(base, "indexes"), base.join("indexes"));
    assert_eq!(resolve_with_base(base, "/var/lib/trawl"), std::path::PathBuf::from("/var/lib/trawl"));
}
