//! Tantivy-backed [`StorageEngine`]: one tantivy index per collection, each
//! holding chunk text, metadata and embedding. Lexical queries run on the
//! inverted index; kNN scores the stored vectors of the filter's matches.

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tantivy::collector::{Count, DocSetCollector, TopDocs};
use tantivy::query::{AllQuery, BooleanQuery, BoostQuery, FuzzyTermQuery, Occur, Query, TermQuery};
use tantivy::schema::{IndexRecordOption, Value};
use tantivy::tokenizer::TokenStream;
use tantivy::{doc, Index, IndexReader, IndexWriter, ReloadPolicy, Searcher, TantivyDocument, Term};
use tracing::{debug, info};
use walkdir::WalkDir;

use trawl_core::query::{SearchRequest, TextMatch};
use trawl_core::similarity::knn_score;
use trawl_core::storage::{sort_buckets, sort_hits, validate_index_id, ChunkFilter, ChunkRecord, DocumentBucket, Hit, IndexPattern, IndexSchema};
use trawl_core::{ChunkMetadata, CollectionMeta, Error, Result, StorageEngine};

use crate::tantivy_utils::{build_schema, decode_embedding, encode_embedding, register_tokenizer, Fields};

const SIDECAR: &str = "collection.json";
const WRITER_MEMORY: usize = 20_000_000;
/// Fuzzy expansions rank below exact term matches.
const FUZZY_BOOST: f32 = 0.5;

fn storage(e: impl std::fmt::Display) -> Error {
	Error::Storage(e.to_string())
}

/// Commits and filesystem work run on the blocking pool.
async fn blocking<T, F>(work: F) -> Result<T>
where
	T: Send + 'static,
	F: FnOnce() -> Result<T> + Send + 'static,
{
	tokio::task::spawn_blocking(work).await.map_err(|e| storage(format!("storage task failed: {e}")))?
}

#[derive(Debug, Serialize, Deserialize)]
struct Sidecar {
	schema: IndexSchema,
	meta: CollectionMeta,
}

struct CollectionIndex {
	index: Index,
	reader: IndexReader,
	writer: Mutex<IndexWriter>,
	fields: Fields,
	schema: IndexSchema,
	meta: CollectionMeta,
	dir: Option<PathBuf>,
}

impl CollectionIndex {
	fn new(index: Index, sidecar: Sidecar, dir: Option<PathBuf>) -> Result<Self> {
		register_tokenizer(&index);
		let fields = Fields::resolve(&index.schema()).map_err(storage)?;
		let reader: IndexReader = index.reader_builder().reload_policy(ReloadPolicy::Manual).try_into().map_err(storage)?;
		let writer: IndexWriter = index.writer_with_num_threads(1, WRITER_MEMORY).map_err(storage)?;
		Ok(Self { index, reader, writer: Mutex::new(writer), fields, schema: sidecar.schema, meta: sidecar.meta, dir })
	}

	/// Analyzed prompt tokens matched against name and body, each with a
	/// boosted-down fuzzy twin when the clause allows it. `None` when the
	/// prompt has no indexable token, in which case nothing matches.
	fn text_query(&self, clause: &TextMatch) -> Result<Option<Box<dyn Query>>> {
		let mut analyzer = self.index.tokenizer_for_field(self.fields.body).map_err(storage)?;
		let mut tokens = Vec::new();
		let mut stream = analyzer.token_stream(&clause.query);
		while stream.advance() {
			tokens.push(stream.token().text.clone());
		}
		if tokens.is_empty() {
			return Ok(None);
		}

		let mut clauses: Vec<(Occur, Box<dyn Query>)> = Vec::new();
		for field in [self.fields.body, self.fields.document_name] {
			for token in &tokens {
				let term = Term::from_field_text(field, token);
				clauses.push((Occur::Should, Box::new(TermQuery::new(term.clone(), IndexRecordOption::WithFreqs))));
				let distance = clause.fuzziness.distance_for(token);
				if distance > 0 {
					let fuzzy = FuzzyTermQuery::new(term, distance, true);
					clauses.push((Occur::Should, Box::new(BoostQuery::new(Box::new(fuzzy), FUZZY_BOOST))));
				}
			}
		}
		Ok(Some(Box::new(BooleanQuery::new(clauses))))
	}

	fn matching_docs(&self, searcher: &Searcher, query: &dyn Query) -> Result<Vec<TantivyDocument>> {
		let mut addresses: Vec<_> = searcher.search(query, &DocSetCollector).map_err(storage)?.into_iter().collect();
		addresses.sort();
		addresses.into_iter().map(|addr| searcher.doc(addr).map_err(storage)).collect()
	}

	fn document_term(&self, document_id: &str) -> Term {
		Term::from_field_text(self.fields.document_id, document_id)
	}

	fn to_document(&self, record: &ChunkRecord) -> Result<TantivyDocument> {
		let f = &self.fields;
		let metadata = serde_json::to_string(&record.metadata).map_err(storage)?;
		Ok(doc!(
			f.id => record.id.clone(),
			f.body => record.body.clone(),
			f.document_name => record.metadata.document_name.clone().unwrap_or_default(),
			f.document_id => record.metadata.document_id.clone(),
			f.metadata => metadata,
			f.embedding => encode_embedding(&record.embedding),
		))
	}

	fn metadata_of(&self, doc: &TantivyDocument) -> Result<ChunkMetadata> {
		let raw = doc.get_first(self.fields.metadata).and_then(|v| v.as_str()).unwrap_or("{}");
		serde_json::from_str(raw).map_err(storage)
	}

	fn embedding_of(&self, doc: &TantivyDocument) -> Vec<f32> {
		doc.get_first(self.fields.embedding).and_then(|v| v.as_bytes()).map(decode_embedding).unwrap_or_default()
	}

	fn to_hit(&self, index_id: &str, score: f32, doc: &TantivyDocument) -> Result<Hit> {
		let text = |field: tantivy::schema::Field| doc.get_first(field).and_then(|v| v.as_str()).unwrap_or("").to_string();
		Ok(Hit {
			id: text(self.fields.id),
			index: index_id.to_string(),
			score,
			body: text(self.fields.body),
			metadata: self.metadata_of(doc)?,
		})
	}

	fn commit(&self, writer: &mut IndexWriter) -> Result<()> {
		writer.commit().map_err(storage)?;
		self.reader.reload().map_err(storage)
	}
}

/// Chunk store with one tantivy index per collection, in RAM or under a
/// root directory (`<root>/<collection>/` plus a `collection.json` sidecar).
pub struct TantivyStore {
	root: Option<PathBuf>,
	indices: RwLock<BTreeMap<String, Arc<CollectionIndex>>>,
	/// Serializes creation so a re-issued create never races the first.
	creating: tokio::sync::Mutex<()>,
}

impl TantivyStore {
	pub fn in_memory() -> Self {
		Self { root: None, indices: RwLock::new(BTreeMap::new()), creating: tokio::sync::Mutex::new(()) }
	}

	/// Opens (creating if needed) a store rooted at `root`, loading every
	/// collection found there.
	pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
		let root = root.into();
		fs::create_dir_all(&root).map_err(storage)?;
		let mut indices = BTreeMap::new();
		for entry in WalkDir::new(&root).min_depth(1).max_depth(1).into_iter().filter_map(|e| e.ok()) {
			let dir = entry.path().to_path_buf();
			let sidecar_path = dir.join(SIDECAR);
			if !entry.file_type().is_dir() || !sidecar_path.is_file() {
				continue;
			}
			let sidecar: Sidecar = serde_json::from_str(&fs::read_to_string(&sidecar_path).map_err(storage)?).map_err(storage)?;
			let index = Index::open_in_dir(&dir).map_err(storage)?;
			let id = entry.file_name().to_string_lossy().to_string();
			indices.insert(id, Arc::new(CollectionIndex::new(index, sidecar, Some(dir))?));
		}
		info!(path = %root.display(), collections = indices.len(), "tantivy store opened");
		Ok(Self { root: Some(root), indices: RwLock::new(indices), creating: tokio::sync::Mutex::new(()) })
	}

	fn get(&self, id: &str) -> Result<Arc<CollectionIndex>> {
		self.indices.read().get(id).cloned().ok_or(Error::CollectionNotFound)
	}

	fn targets(&self, ids: &[String]) -> Result<Vec<(String, Arc<CollectionIndex>)>> {
		ids.iter().map(|id| Ok((id.clone(), self.get(id)?))).collect()
	}
}

#[async_trait]
impl StorageEngine for TantivyStore {
	async fn create_index(&self, id: &str, schema: &IndexSchema, meta: &CollectionMeta) -> Result<bool> {
		let _creating = self.creating.lock().await;
		if self.indices.read().contains_key(id) {
			return Ok(false);
		}
		let sidecar = Sidecar { schema: *schema, meta: meta.clone() };
		let col = match &self.root {
			Some(root) => {
				validate_index_id(id)?;
				let dir = root.join(id);
				blocking(move || {
					fs::create_dir_all(&dir).map_err(storage)?;
					let index = Index::create_in_dir(&dir, build_schema()).map_err(storage)?;
					fs::write(dir.join(SIDECAR), serde_json::to_vec_pretty(&sidecar).map_err(storage)?).map_err(storage)?;
					CollectionIndex::new(index, sidecar, Some(dir))
				})
				.await?
			}
			None => CollectionIndex::new(Index::create_in_ram(build_schema()), sidecar, None)?,
		};
		self.indices.write().insert(id.to_string(), Arc::new(col));
		Ok(true)
	}

	async fn drop_index(&self, id: &str) -> Result<()> {
		let removed = self.indices.write().remove(id);
		if let Some(dir) = removed.and_then(|c| c.dir.clone()) {
			let path = dir.display().to_string();
			blocking(move || if dir.exists() { fs::remove_dir_all(&dir).map_err(storage) } else { Ok(()) }).await?;
			debug!(collection = %id, path = %path, "index directory removed");
		}
		Ok(())
	}

	async fn index_exists(&self, id: &str) -> Result<bool> {
		Ok(self.indices.read().contains_key(id))
	}

	async fn list_index_meta(&self, pattern: &IndexPattern) -> Result<BTreeMap<String, CollectionMeta>> {
		let indices = self.indices.read();
		let metas = match pattern {
			IndexPattern::All => indices.iter().map(|(id, c)| (id.clone(), c.meta.clone())).collect(),
			IndexPattern::Ids(ids) => ids
				.iter()
				.filter_map(|id| indices.get(id).map(|c| (id.clone(), c.meta.clone())))
				.collect(),
		};
		Ok(metas)
	}

	async fn search(&self, indices: &[String], request: &SearchRequest) -> Result<Vec<Hit>> {
		let targets = self.targets(indices)?;
		let mut hits = Vec::new();
		match request {
			SearchRequest::Match { clause, size } => {
				if *size == 0 {
					return Ok(hits);
				}
				for (id, col) in &targets {
					let Some(query) = col.text_query(clause)? else { continue };
					let searcher = col.reader.searcher();
					for (score, addr) in searcher.search(query.as_ref(), &TopDocs::with_limit(*size)).map_err(storage)? {
						let doc: TantivyDocument = searcher.doc(addr).map_err(storage)?;
						hits.push(col.to_hit(id, score, &doc)?);
					}
				}
				sort_hits(&mut hits);
				hits.truncate(*size);
			}
			SearchRequest::Knn { vector, k, num_candidates, filter } => {
				for (id, col) in &targets {
					if vector.len() != col.schema.vector_size {
						return Err(Error::DimensionMismatch { expected: col.schema.vector_size, found: vector.len() });
					}
					let query: Box<dyn Query> = match filter {
						Some(clause) => match col.text_query(clause)? {
							Some(query) => query,
							None => continue,
						},
						None => Box::new(AllQuery),
					};
					let searcher = col.reader.searcher();
					let mut candidates = Vec::new();
					for doc in col.matching_docs(&searcher, query.as_ref())? {
						let score = knn_score(vector, &col.embedding_of(&doc));
						candidates.push(col.to_hit(id, score, &doc)?);
					}
					sort_hits(&mut candidates);
					candidates.truncate((*k).min(*num_candidates));
					hits.extend(candidates);
				}
				sort_hits(&mut hits);
				hits.truncate(*k);
			}
			SearchRequest::Document { document_id, limit, offset } => {
				let mut parts = Vec::new();
				for (id, col) in &targets {
					let searcher = col.reader.searcher();
					let query = TermQuery::new(col.document_term(document_id), IndexRecordOption::Basic);
					for doc in col.matching_docs(&searcher, &query)? {
						parts.push(col.to_hit(id, 1.0, &doc)?);
					}
				}
				parts.sort_by(|a, b| a.metadata.document_part.cmp(&b.metadata.document_part).then_with(|| a.id.cmp(&b.id)));
				hits = parts.into_iter().skip(*offset).take(*limit).collect();
			}
		}
		Ok(hits)
	}

	async fn count_documents(&self, index: &str) -> Result<u64> {
		let col = self.get(index)?;
		let searcher = col.reader.searcher();
		let mut ids: Vec<String> = col
			.matching_docs(&searcher, &AllQuery)?
			.iter()
			.filter_map(|doc| doc.get_first(col.fields.document_id).and_then(|v| v.as_str()).map(str::to_string))
			.collect();
		ids.sort();
		ids.dedup();
		Ok(ids.len() as u64)
	}

	async fn document_buckets(&self, index: &str, limit: usize, offset: usize) -> Result<Vec<DocumentBucket>> {
		let col = self.get(index)?;
		let searcher = col.reader.searcher();
		let mut buckets: BTreeMap<String, DocumentBucket> = BTreeMap::new();
		for doc in col.matching_docs(&searcher, &AllQuery)? {
			let metadata = col.metadata_of(&doc)?;
			match buckets.get_mut(&metadata.document_id) {
				Some(bucket) => {
					bucket.chunk_count += 1;
					if metadata.document_part < bucket.metadata.document_part {
						bucket.metadata = metadata;
					}
				}
				None => {
					let document_id = metadata.document_id.clone();
					buckets.insert(document_id.clone(), DocumentBucket { document_id, chunk_count: 1, metadata });
				}
			}
		}
		let mut buckets: Vec<DocumentBucket> = buckets.into_values().collect();
		sort_buckets(&mut buckets);
		Ok(buckets.into_iter().skip(offset).take(limit).collect())
	}

	async fn bulk_upsert(&self, index: &str, records: Vec<ChunkRecord>) -> Result<()> {
		let col = self.get(index)?;
		let expected = col.schema.vector_size;
		if let Some(record) = records.iter().find(|r| r.embedding.len() != expected) {
			return Err(Error::DimensionMismatch { expected, found: record.embedding.len() });
		}
		let docs = records
			.iter()
			.map(|r| Ok((Term::from_field_text(col.fields.id, &r.id), col.to_document(r)?)))
			.collect::<Result<Vec<_>>>()?;

		blocking(move || {
			let mut writer = col.writer.lock();
			for (id_term, doc) in docs {
				writer.delete_term(id_term);
				writer.add_document(doc).map_err(storage)?;
			}
			col.commit(&mut writer)
		})
		.await?;
		debug!(collection = %index, chunks = records.len(), "chunks upserted");
		Ok(())
	}

	async fn delete_by_filter(&self, index: &str, filter: &ChunkFilter) -> Result<u64> {
		let col = self.get(index)?;
		let term = match filter {
			ChunkFilter::Document(document_id) => col.document_term(document_id),
		};
		blocking(move || {
			let searcher = col.reader.searcher();
			let removed = searcher.search(&TermQuery::new(term.clone(), IndexRecordOption::Basic), &Count).map_err(storage)? as u64;
			if removed > 0 {
				let mut writer = col.writer.lock();
				writer.delete_term(term);
				col.commit(&mut writer)?;
			}
			Ok(removed)
		})
		.await
	}
}
