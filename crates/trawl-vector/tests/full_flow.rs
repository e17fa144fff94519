use std::fs;
use std::path::Path;
use std::sync::Arc;

use trawl_core::query::{SearchRequest, TextMatch};
use trawl_core::storage::{ChunkFilter, ChunkRecord, IndexPattern, IndexSchema};
use trawl_core::{ChunkMetadata, CollectionMeta, CollectionType, Error, StorageEngine};
use trawl_embed::HashEmbedder;
use trawl_vector::{SemanticSearchEngine, VectorStore};

fn meta() -> CollectionMeta {
    CollectionMeta {
        name: "docs".to_string(),
        collection_type: CollectionType::Public,
        model: "embed".to_string(),
        user: "root".to_string(),
        description: Some("reference docs".to_string()),
        created_at: 1_700_000_000,
        documents: 0,
    }
}

fn record(document_id: &str, part: u32, body: &str, embedding: Vec<f32>) -> ChunkRecord {
    ChunkRecord {
        id: format!("{document_id}-{part}"),
        body: body.to_string(),
        embedding,
        metadata: ChunkMetadata {
            document_id: document_id.to_string(),
            document_name: Some(format!("{document_id}.md")),
            document_part: part,
            ..Default::default()
        },
    }
}

fn corpus() -> Vec<ChunkRecord> {
    vec![
        record("rust", 0, "The borrow checker enforces ownership rules", vec![1.0, 0.0, 0.0]),
        record("rust", 1, "Lifetimes describe how long a borrow lives", vec![0.9, 0.1, 0.0]),
        record("rust", 2, "Cargo builds crates", vec![0.5, 0.5, 0.0]),
        record("bread", 0, "Sourdough needs a healthy starter", vec![0.0, 1.0, 0.0]),
    ]
}

async fn seeded(store: &VectorStore) {
    store.create_index("docs", &IndexSchema { vector_size: 3 }, &meta()).await.unwrap();
    store.bulk_upsert("docs", corpus()).await.unwrap();
}

fn ids(hits: &[trawl_core::storage::Hit]) -> Vec<&str> {
    hits.iter().map(|h| h.id.as_str()).collect()
}

#[tokio::test]
async fn match_scores_text_with_typo_tolerance() {
    let store = VectorStore::in_memory();
    seeded(&store).await;

    let hits = store
        .search(&["docs".into()], &SearchRequest::Match { clause: TextMatch::for_prompt("borrow checker"), size: 10 })
        .await
        .unwrap();
    assert_eq!(ids(&hits), vec!["rust-0", "rust-1"]);

    let hits = store
        .search(&["docs".into()], &SearchRequest::Match { clause: TextMatch::for_prompt("sourdoug"), size: 10 })
        .await
        .unwrap();
    assert_eq!(ids(&hits), vec!["bread-0"]);

    let hits = store
        .search(&["docs".into()], &SearchRequest::Match { clause: TextMatch::for_prompt("bread"), size: 10 })
        .await
        .unwrap();
    assert_eq!(ids(&hits), vec!["bread-0"]);
}

#[tokio::test]
async fn knn_honours_filter_and_k() {
    let store = VectorStore::in_memory();
    seeded(&store).await;

    let request = SearchRequest::Knn { vector: vec![0.0, 1.0, 0.0], k: 2, num_candidates: 200, filter: None };
    let hits = store.search(&["docs".into()], &request).await.unwrap();
    assert_eq!(ids(&hits), vec!["bread-0", "rust-2"]);

    let request = SearchRequest::Knn {
        vector: vec![0.0, 1.0, 0.0],
        k: 4,
        num_candidates: 200,
        filter: Some(TextMatch::for_prompt("borrow")),
    };
    let hits = store.search(&["docs".into()], &request).await.unwrap();
    assert_eq!(ids(&hits), vec!["rust-1", "rust-0"]);

    let request = SearchRequest::Knn { vector: vec![1.0, 0.0], k: 4, num_candidates: 200, filter: None };
    let err = store.search(&["docs".into()], &request).await.unwrap_err();
    assert!(matches!(err, Error::DimensionMismatch { expected: 3, found: 2 }));

    let err = store.search(&["missing".into()], &request).await.unwrap_err();
    assert!(matches!(err, Error::CollectionNotFound));
}

#[tokio::test]
async fn documents_are_paged_counted_and_deleted() {
    let store = VectorStore::in_memory();
    seeded(&store).await;

    let request = SearchRequest::Document { document_id: "rust".into(), limit: 2, offset: 1 };
    let hits = store.search(&["docs".into()], &request).await.unwrap();
    assert_eq!(ids(&hits), vec!["rust-1", "rust-2"]);

    assert_eq!(store.count_documents("docs").await.unwrap(), 2);
    let buckets = store.document_buckets("docs", 1, 0).await.unwrap();
    assert_eq!(buckets.len(), 1);
    assert_eq!(buckets[0].document_id, "rust");
    assert_eq!(buckets[0].chunk_count, 3);

    assert_eq!(store.delete_by_filter("docs", &ChunkFilter::Document("rust".into())).await.unwrap(), 3);
    assert_eq!(store.count_documents("docs").await.unwrap(), 1);
    let hits = store
        .search(&["docs".into()], &SearchRequest::Match { clause: TextMatch::for_prompt("borrow"), size: 10 })
        .await
        .unwrap();
    assert!(hits.is_empty());
}

#[tokio::test]
async fn upsert_replaces_and_validates() {
    let store = VectorStore::in_memory();
    seeded(&store).await;
    assert!(!store.create_index("docs", &IndexSchema { vector_size: 9 }, &meta()).await.unwrap());

    store.bulk_upsert("docs", vec![record("bread", 0, "Rye rises slowly", vec![0.0, 1.0, 0.0])]).await.unwrap();
    let hits = store
        .search(&["docs".into()], &SearchRequest::Match { clause: TextMatch::for_prompt("starter"), size: 10 })
        .await
        .unwrap();
    assert!(hits.is_empty());

    let err = store.bulk_upsert("docs", vec![record("x", 0, "x", vec![1.0])]).await.unwrap_err();
    assert!(matches!(err, Error::DimensionMismatch { expected: 3, found: 1 }));
}

#[tokio::test]
async fn snapshots_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    {
        let store = VectorStore::open(dir.path()).unwrap();
        seeded(&store).await;
    }
    let store = VectorStore::open(dir.path()).unwrap();
    let metas = store.list_index_meta(&IndexPattern::All).await.unwrap();
    assert_eq!(metas["docs"].description.as_deref(), Some("reference docs"));
    assert_eq!(store.count_documents("docs").await.unwrap(), 2);

    let hits = store
        .search(&["docs".into()], &SearchRequest::Match { clause: TextMatch::for_prompt("ownership"), size: 10 })
        .await
        .unwrap();
    assert_eq!(ids(&hits), vec!["rust-0"]);

    store.drop_index("docs").await.unwrap();
    assert!(!dir.path().join("docs.json").exists());
    assert!(VectorStore::open(dir.path()).unwrap().list_index_meta(&IndexPattern::All).await.unwrap().is_empty());
}

fn file_len(path: &Path) -> u64 {
    fs::metadata(path).map(|m| m.len()).unwrap_or(0)
}

fn body_of(hits: &[trawl_core::storage::Hit], id: &str) -> Option<String> {
    hits.iter().find(|h| h.id == id).map(|h| h.body.clone())
}

#[tokio::test]
async fn mutations_append_to_the_journal_and_replay_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let snapshot = dir.path().join("docs.json");
    let log = dir.path().join("docs.log");
    {
        let store = VectorStore::open(dir.path()).unwrap();
        store.create_index("docs", &IndexSchema { vector_size: 3 }, &meta()).await.unwrap();
        let empty_snapshot = file_len(&snapshot);
        assert_eq!(file_len(&log), 0);

        let mut last = 0;
        for record in corpus() {
            store.bulk_upsert("docs", vec![record]).await.unwrap();
            assert!(file_len(&log) > last);
            last = file_len(&log);
        }
        store.delete_by_filter("docs", &ChunkFilter::Document("bread".into())).await.unwrap();
        store.bulk_upsert("docs", vec![record("bread", 0, "Rye rises slowly", vec![0.0, 1.0, 0.0])]).await.unwrap();
        // Deleting nothing writes nothing.
        let before = file_len(&log);
        assert_eq!(store.delete_by_filter("docs", &ChunkFilter::Document("none".into())).await.unwrap(), 0);
        assert_eq!(file_len(&log), before);

        assert_eq!(file_len(&snapshot), empty_snapshot);
    }

    let store = VectorStore::open(dir.path()).unwrap();
    assert_eq!(file_len(&log), 0);
    assert_eq!(store.count_documents("docs").await.unwrap(), 2);
    let request = SearchRequest::Document { document_id: "bread".into(), limit: 10, offset: 0 };
    let hits = store.search(&["docs".into()], &request).await.unwrap();
    assert_eq!(body_of(&hits, "bread-0").as_deref(), Some("Rye rises slowly"));
}

#[tokio::test]
async fn torn_journal_tail_is_dropped_on_open() {
    let dir = tempfile::tempdir().unwrap();
    {
        let store = VectorStore::open(dir.path()).unwrap();
        seeded(&store).await;
    }
    let log = dir.path().join("docs.log");
    let mut raw = fs::read(&log).unwrap();
    raw.extend_from_slice(b"{\"op\":\"upsert\",\"rec");
    fs::write(&log, raw).unwrap();

    let store = VectorStore::open(dir.path()).unwrap();
    assert_eq!(store.count_documents("docs").await.unwrap(), 2);
    assert_eq!(file_len(&log), 0);
}

#[tokio::test]
async fn large_journals_fold_into_the_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("docs.log");
    {
        let store = VectorStore::open(dir.path()).unwrap().with_compaction_threshold(1);
        seeded(&store).await;
        assert_eq!(file_len(&log), 0);
        let snapshot = fs::read_to_string(dir.path().join("docs.json")).unwrap();
        assert!(snapshot.contains("Sourdough needs a healthy starter"));
    }
    let store = VectorStore::open(dir.path()).unwrap();
    assert_eq!(store.count_documents("docs").await.unwrap(), 2);

    store.drop_index("docs").await.unwrap();
    assert!(!log.exists());
}

#[tokio::test]
async fn semantic_engine_ranks_by_similarity_within_text_matches() {
    let embedder = HashEmbedder::new(64);
    let store = Arc::new(VectorStore::in_memory());
    store.create_index("notes", &IndexSchema { vector_size: 64 }, &meta()).await.unwrap();
    let bodies = [
        ("a", "tokio runtime spawns async tasks"),
        ("b", "async closures and the tokio runtime"),
        ("c", "kneading sourdough by hand"),
    ];
    let records = bodies
        .iter()
        .map(|(doc, body)| record(doc, 0, body, embedder.embed_text(body)))
        .collect();
    store.bulk_upsert("notes", records).await.unwrap();

    let engine = SemanticSearchEngine::new(store.clone());
    let prompt = "tokio runtime spawns async tasks";
    let results = engine.search(prompt, &embedder.embed_text(prompt), &["notes".into()], 4).await.unwrap();

    assert_eq!(results.len(), 2);
    assert_eq!(results[0].chunk.id, "a-0");
    assert!((results[0].score - 1.0).abs() < 1e-6);
    assert!(results.iter().all(|r| r.method == "semantic"));
    assert!(engine.search(prompt, &embedder.embed_text(prompt), &[], 4).await.unwrap().is_empty());
}
