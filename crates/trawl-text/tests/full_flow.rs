use std::sync::Arc;

use trawl_core::query::{Fuzziness, SearchRequest, TextMatch};
use trawl_core::storage::{ChunkFilter, ChunkRecord, IndexPattern, IndexSchema};
use trawl_core::{ChunkMetadata, CollectionMeta, CollectionType, Error, StorageEngine};
use trawl_text::{LexicalSearchEngine, TantivyStore};

fn meta(name: &str) -> CollectionMeta {
	CollectionMeta {
		name: name.to_string(),
		collection_type: CollectionType::Private,
		model: "embed".to_string(),
		user: "alice".to_string(),
		description: None,
		created_at: 1_700_000_000,
		documents: 0,
	}
}

fn record(document_id: &str, part: u32, body: &str, embedding: [f32; 3]) -> ChunkRecord {
	ChunkRecord {
		id: format!("{document_id}-{part}"),
		body: body.to_string(),
		embedding: embedding.to_vec(),
		metadata: ChunkMetadata {
			document_id: document_id.to_string(),
			document_name: Some(format!("{document_id}.md")),
			document_part: part,
			..Default::default()
		},
	}
}

async fn seeded(store: &TantivyStore) {
	store.create_index("docs", &IndexSchema { vector_size: 3 }, &meta("docs")).await.unwrap();
	store
		.bulk_upsert(
			"docs",
			vec![
				record("rust", 0, "The borrow checker enforces ownership rules", [1.0, 0.0, 0.0]),
				record("rust", 1, "Lifetimes describe how long a borrow lives", [0.9, 0.1, 0.0]),
				record("rust", 2, "Cargo builds crates", [0.5, 0.5, 0.0]),
				record("bread", 0, "Sourdough needs a healthy starter", [0.0, 1.0, 0.0]),
			],
		)
		.await
		.unwrap();
}

fn text(prompt: &str) -> TextMatch {
	TextMatch::for_prompt(prompt)
}

#[tokio::test]
async fn create_is_idempotent_and_listed() {
	let store = TantivyStore::in_memory();
	assert!(store.create_index("docs", &IndexSchema { vector_size: 3 }, &meta("docs")).await.unwrap());
	assert!(!store.create_index("docs", &IndexSchema { vector_size: 8 }, &meta("other")).await.unwrap());

	let metas = store.list_index_meta(&IndexPattern::Ids(vec!["docs".into(), "missing".into()])).await.unwrap();
	assert_eq!(metas.len(), 1);
	assert_eq!(metas["docs"].name, "docs");

	store.drop_index("docs").await.unwrap();
	store.drop_index("docs").await.unwrap();
	assert!(!store.index_exists("docs").await.unwrap());
}

#[tokio::test]
async fn match_ranks_exact_terms_and_tolerates_typos() {
	let store = TantivyStore::in_memory();
	seeded(&store).await;

	let hits = store.search(&["docs".into()], &SearchRequest::Match { clause: text("borrow checker"), size: 10 }).await.unwrap();
	assert_eq!(hits[0].id, "rust-0");
	assert!(hits.iter().all(|h| h.metadata.document_id == "rust"));
	for pair in hits.windows(2) {
		assert!(pair[0].score >= pair[1].score);
	}

	let hits = store.search(&["docs".into()], &SearchRequest::Match { clause: text("sourdoug"), size: 10 }).await.unwrap();
	assert_eq!(hits.len(), 1);
	assert_eq!(hits[0].id, "bread-0");

	let exact = TextMatch { query: "sourdoug".into(), fuzziness: Fuzziness::Off };
	let hits = store.search(&["docs".into()], &SearchRequest::Match { clause: exact, size: 10 }).await.unwrap();
	assert!(hits.is_empty());

	let hits = store.search(&["docs".into()], &SearchRequest::Match { clause: text("borrow"), size: 1 }).await.unwrap();
	assert_eq!(hits.len(), 1);
}

#[tokio::test]
async fn document_name_is_searchable() {
	let store = TantivyStore::in_memory();
	seeded(&store).await;
	let hits = store.search(&["docs".into()], &SearchRequest::Match { clause: text("bread"), size: 10 }).await.unwrap();
	assert_eq!(hits.len(), 1);
	assert_eq!(hits[0].metadata.document_name.as_deref(), Some("bread.md"));
}

#[tokio::test]
async fn knn_is_filtered_by_the_text_clause() {
	let store = TantivyStore::in_memory();
	seeded(&store).await;

	let unfiltered = SearchRequest::Knn { vector: vec![0.0, 1.0, 0.0], k: 2, num_candidates: 200, filter: None };
	let hits = store.search(&["docs".into()], &unfiltered).await.unwrap();
	assert_eq!(hits[0].id, "bread-0");
	assert!((hits[0].score - 1.0).abs() < 1e-6);
	assert_eq!(hits.len(), 2);

	let filtered = SearchRequest::Knn { vector: vec![0.0, 1.0, 0.0], k: 4, num_candidates: 200, filter: Some(text("borrow")) };
	let ids: Vec<String> = store.search(&["docs".into()], &filtered).await.unwrap().into_iter().map(|h| h.id).collect();
	assert_eq!(ids, vec!["rust-1".to_string(), "rust-0".to_string()]);

	let wrong = SearchRequest::Knn { vector: vec![1.0; 5], k: 4, num_candidates: 200, filter: None };
	assert!(matches!(store.search(&["docs".into()], &wrong).await.unwrap_err(), Error::DimensionMismatch { expected: 3, found: 5 }));
}

#[tokio::test]
async fn upsert_replaces_by_id_and_checks_dimensions() {
	let store = TantivyStore::in_memory();
	seeded(&store).await;

	store.bulk_upsert("docs", vec![record("bread", 0, "Rye bread rises slowly", [0.0, 1.0, 0.0])]).await.unwrap();
	let chunks = store.search(&["docs".into()], &SearchRequest::Document { document_id: "bread".into(), limit: 10, offset: 0 }).await.unwrap();
	assert_eq!(chunks.len(), 1);
	assert_eq!(chunks[0].body, "Rye bread rises slowly");

	let mut bad = record("bread", 1, "crumb", [0.0, 0.0, 1.0]);
	bad.embedding.push(1.0);
	let err = store.bulk_upsert("docs", vec![bad]).await.unwrap_err();
	assert!(matches!(err, Error::DimensionMismatch { expected: 3, found: 4 }));
	assert!(matches!(store.bulk_upsert("nope", vec![]).await.unwrap_err(), Error::CollectionNotFound));
}

#[tokio::test]
async fn document_chunks_are_paged_in_part_order() {
	let store = TantivyStore::in_memory();
	seeded(&store).await;

	let page = |offset| SearchRequest::Document { document_id: "rust".into(), limit: 2, offset };
	let first: Vec<u32> = store.search(&["docs".into()], &page(0)).await.unwrap().iter().map(|h| h.metadata.document_part).collect();
	let second: Vec<u32> = store.search(&["docs".into()], &page(2)).await.unwrap().iter().map(|h| h.metadata.document_part).collect();
	assert_eq!(first, vec![0, 1]);
	assert_eq!(second, vec![2]);
}

#[tokio::test]
async fn documents_are_counted_and_bucketed() {
	let store = TantivyStore::in_memory();
	seeded(&store).await;

	assert_eq!(store.count_documents("docs").await.unwrap(), 2);
	let buckets = store.document_buckets("docs", 10, 0).await.unwrap();
	assert_eq!(buckets.len(), 2);
	assert_eq!(buckets[0].document_id, "rust");
	assert_eq!(buckets[0].chunk_count, 3);
	assert_eq!(buckets[0].metadata.document_part, 0);
	assert_eq!(store.document_buckets("docs", 10, 1).await.unwrap()[0].document_id, "bread");

	assert_eq!(store.delete_by_filter("docs", &ChunkFilter::Document("rust".into())).await.unwrap(), 3);
	assert_eq!(store.delete_by_filter("docs", &ChunkFilter::Document("rust".into())).await.unwrap(), 0);
	assert_eq!(store.count_documents("docs").await.unwrap(), 1);
}

#[tokio::test]
async fn collections_survive_reopen() {
	let dir = tempfile::tempdir().unwrap();
	{
		let store = TantivyStore::open(dir.path()).unwrap();
		seeded(&store).await;
	}

	let store = TantivyStore::open(dir.path()).unwrap();
	let metas = store.list_index_meta(&IndexPattern::All).await.unwrap();
	assert_eq!(metas["docs"].created_at, 1_700_000_000);
	assert_eq!(store.count_documents("docs").await.unwrap(), 2);

	store.drop_index("docs").await.unwrap();
	assert!(!dir.path().join("docs").exists());
	assert!(matches!(
		store.create_index("../escape", &IndexSchema { vector_size: 3 }, &meta("x")).await.unwrap_err(),
		Error::InvalidConfig(_)
	));
}

#[tokio::test]
async fn lexical_engine_tags_results() {
	let store = Arc::new(TantivyStore::in_memory());
	seeded(&store).await;
	let engine = LexicalSearchEngine::new(store);

	let results = engine.search("ownership", &["docs".into()], 4).await.unwrap();
	assert_eq!(results.len(), 1);
	assert_eq!(results[0].method, "lexical");
	assert_eq!(results[0].chunk.id, "rust-0");
	assert!(engine.search("ownership", &[], 4).await.unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_creates_on_disk_make_one_index() {
	let dir = tempfile::tempdir().unwrap();
	let store = Arc::new(TantivyStore::open(dir.path()).unwrap());

	let tasks: Vec<_> = (0..4)
		.map(|i| {
			let store = Arc::clone(&store);
			tokio::spawn(async move { store.create_index("docs", &IndexSchema { vector_size: 3 }, &meta(&format!("docs-{i}"))).await })
		})
		.collect();
	let mut created = 0;
	for task in tasks {
		if task.await.unwrap().unwrap() {
			created += 1;
		}
	}
	assert_eq!(created, 1);

	store.bulk_upsert("docs", vec![record("rust", 0, "Cargo builds crates", [1.0, 0.0, 0.0])]).await.unwrap();
	assert_eq!(store.delete_by_filter("docs", &ChunkFilter::Document("rust".into())).await.unwrap(), 1);
	assert_eq!(store.count_documents("docs").await.unwrap(), 0);
}
