//! In-process vector store. Chunks live in memory per collection, with a
//! BM25 index over body and document name for text clauses; kNN is exact
//! cosine over the collection. With a data directory, each collection is a
//! `<id>.json` snapshot plus an `<id>.log` journal of later mutations.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use trawl_core::query::{SearchRequest, TextMatch};
use trawl_core::similarity::knn_score;
use trawl_core::storage::{sort_buckets, sort_hits, validate_index_id, ChunkFilter, ChunkRecord, DocumentBucket, Hit, IndexPattern, IndexSchema};
use trawl_core::types::ChunkId;
use trawl_core::{CollectionMeta, Error, Result, StorageEngine};

use crate::analysis::tokenize;
use crate::bm25::InvertedIndex;
use crate::journal::{replay, Entry, Journal};

const SNAPSHOT_EXT: &str = "json";
const JOURNAL_EXT: &str = "log";
/// Journal size at which a collection is folded into a fresh snapshot.
const COMPACT_AFTER_BYTES: u64 = 64 * 1024 * 1024;

pub(crate) fn storage(e: impl std::fmt::Display) -> Error {
    Error::Storage(e.to_string())
}

/// Journal and snapshot writes run on the blocking pool.
async fn blocking<T, F>(work: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(work).await.map_err(|e| storage(format!("storage task failed: {e}")))?
}

#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    schema: IndexSchema,
    meta: CollectionMeta,
    chunks: Vec<ChunkRecord>,
}

struct CollectionData {
    schema: IndexSchema,
    meta: CollectionMeta,
    chunks: BTreeMap<ChunkId, ChunkRecord>,
    body: InvertedIndex,
    names: InvertedIndex,
}

impl CollectionData {
    fn new(schema: IndexSchema, meta: CollectionMeta) -> Self {
        Self { schema, meta, chunks: BTreeMap::new(), body: InvertedIndex::new(), names: InvertedIndex::new() }
    }

    fn from_snapshot(snapshot: Snapshot) -> Self {
        let mut data = Self::new(snapshot.schema, snapshot.meta);
        for record in snapshot.chunks {
            data.insert(record);
        }
        data
    }

    fn snapshot(&self) -> Snapshot {
        Snapshot { schema: self.schema, meta: self.meta.clone(), chunks: self.chunks.values().cloned().collect() }
    }

    fn insert(&mut self, record: ChunkRecord) {
        self.body.add_document(&record.id, &record.body);
        self.names.add_document(&record.id, record.metadata.document_name.as_deref().unwrap_or(""));
        self.chunks.insert(record.id.clone(), record);
    }

    fn remove(&mut self, id: &str) {
        self.body.remove_document(id);
        self.names.remove_document(id);
        self.chunks.remove(id);
    }

    /// Applies one mutation; returns the number of chunks it touched.
    fn apply(&mut self, entry: Entry) -> u64 {
        match entry {
            Entry::Upsert { records } => {
                let count = records.len() as u64;
                for record in records {
                    self.insert(record);
                }
                count
            }
            Entry::DeleteDocument { document_id } => {
                let doomed: Vec<ChunkId> = self
                    .chunks
                    .values()
                    .filter(|r| r.metadata.document_id == document_id)
                    .map(|r| r.id.clone())
                    .collect();
                for id in &doomed {
                    self.remove(id);
                }
                doomed.len() as u64
            }
        }
    }

    /// Text relevance of every chunk matching `clause`.
    fn text_scores(&self, clause: &TextMatch) -> HashMap<ChunkId, f32> {
        let tokens = tokenize(&clause.query);
        let mut scores = HashMap::new();
        self.body.score_into(&tokens, clause.fuzziness, &mut scores);
        self.names.score_into(&tokens, clause.fuzziness, &mut scores);
        scores
    }

    fn hit(&self, index_id: &str, record: &ChunkRecord, score: f32) -> Hit {
        Hit {
            id: record.id.clone(),
            index: index_id.to_string(),
            score,
            body: record.body.clone(),
            metadata: record.metadata.clone(),
        }
    }

    fn document_ids(&self) -> impl Iterator<Item = &str> {
        self.chunks.values().map(|r| r.metadata.document_id.as_str())
    }
}

type Collections = Arc<RwLock<BTreeMap<String, CollectionData>>>;

pub struct VectorStore {
    dir: Option<PathBuf>,
    collections: Collections,
    journals: RwLock<HashMap<String, Arc<Journal>>>,
    /// Serializes creation so a re-issued create never races the first.
    creating: tokio::sync::Mutex<()>,
    compact_after: u64,
}

impl VectorStore {
    pub fn in_memory() -> Self {
        Self::with_collections(None, BTreeMap::new(), HashMap::new())
    }

    /// Opens a store persisted under `dir`. Each snapshot found there is
    /// loaded, its journal replayed on top, and the result written back as
    /// the new snapshot with an empty journal.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(storage)?;
        let mut collections = BTreeMap::new();
        let mut journals = HashMap::new();
        for entry in fs::read_dir(&dir).map_err(storage)? {
            let path = entry.map_err(storage)?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(SNAPSHOT_EXT) {
                continue;
            }
            let Some(id) = path.file_stem().and_then(|s| s.to_str()).map(str::to_string) else { continue };
            let mut data = match read_snapshot(&path) {
                Ok(snapshot) => CollectionData::from_snapshot(snapshot),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping unreadable snapshot");
                    continue;
                }
            };

            let log = path.with_extension(JOURNAL_EXT);
            let entries = replay(&log)?;
            if !entries.is_empty() {
                let replayed = entries.len();
                for entry in entries {
                    data.apply(entry);
                }
                write_snapshot(&path, &data.snapshot())?;
                debug!(collection = %id, entries = replayed, "journal folded into snapshot");
            }
            let journal = Journal::open(log)?;
            journal.lock().truncate()?;

            journals.insert(id.clone(), Arc::new(journal));
            collections.insert(id, data);
        }
        info!(path = %dir.display(), collections = collections.len(), "vector store opened");
        Ok(Self::with_collections(Some(dir), collections, journals))
    }

    fn with_collections(
        dir: Option<PathBuf>,
        collections: BTreeMap<String, CollectionData>,
        journals: HashMap<String, Arc<Journal>>,
    ) -> Self {
        Self {
            dir,
            collections: Arc::new(RwLock::new(collections)),
            journals: RwLock::new(journals),
            creating: tokio::sync::Mutex::new(()),
            compact_after: COMPACT_AFTER_BYTES,
        }
    }

    /// Journal size, in bytes, past which a mutation also rewrites the snapshot.
    pub fn with_compaction_threshold(mut self, bytes: u64) -> Self {
        self.compact_after = bytes;
        self
    }

    fn snapshot_path(&self, id: &str) -> Option<PathBuf> {
        self.dir.as_ref().map(|d| d.join(format!("{id}.{SNAPSHOT_EXT}")))
    }

    fn check_dimensions(&self, index: &str, records: &[ChunkRecord]) -> Result<()> {
        let collections = self.collections.read();
        let data = collections.get(index).ok_or(Error::CollectionNotFound)?;
        let expected = data.schema.vector_size;
        match records.iter().find(|r| r.embedding.len() != expected) {
            Some(record) => Err(Error::DimensionMismatch { expected, found: record.embedding.len() }),
            None => Ok(()),
        }
    }

    fn document_chunks(&self, index: &str, document_id: &str) -> Result<usize> {
        let collections = self.collections.read();
        let data = collections.get(index).ok_or(Error::CollectionNotFound)?;
        Ok(data.chunks.values().filter(|r| r.metadata.document_id == document_id).count())
    }

    /// Applies `entry` to collection `index`. Persisted collections log it
    /// first, under the journal lock, so replay sees mutations in the order
    /// they were applied.
    async fn commit(&self, index: &str, entry: Entry) -> Result<u64> {
        let journal = self.journals.read().get(index).cloned();
        let Some(journal) = journal else {
            let mut collections = self.collections.write();
            let data = collections.get_mut(index).ok_or(Error::CollectionNotFound)?;
            return Ok(data.apply(entry));
        };

        let collections = Arc::clone(&self.collections);
        let index = index.to_string();
        let compact_after = self.compact_after;
        blocking(move || {
            let mut log = journal.lock();
            log.append(&entry)?;
            let (applied, snapshot) = {
                let mut collections = collections.write();
                let data = collections.get_mut(&index).ok_or(Error::CollectionNotFound)?;
                let applied = data.apply(entry);
                (applied, (log.bytes() >= compact_after).then(|| data.snapshot()))
            };
            if let Some(snapshot) = snapshot {
                write_snapshot(&journal.path().with_extension(SNAPSHOT_EXT), &snapshot)?;
                log.truncate()?;
                debug!(collection = %index, "journal compacted");
            }
            Ok(applied)
        })
        .await
    }
}

fn read_snapshot(path: &Path) -> Result<Snapshot> {
    let raw = fs::read_to_string(path).map_err(storage)?;
    serde_json::from_str(&raw).map_err(storage)
}

fn write_snapshot(path: &Path, snapshot: &Snapshot) -> Result<()> {
    let tmp = path.with_extension("json.tmp");
    let bytes = serde_json::to_vec(snapshot).map_err(storage)?;
    fs::write(&tmp, bytes).map_err(storage)?;
    fs::rename(&tmp, path).map_err(storage)
}

#[async_trait]
impl StorageEngine for VectorStore {
    async fn create_index(&self, id: &str, schema: &IndexSchema, meta: &CollectionMeta) -> Result<bool> {
        let data = CollectionData::new(*schema, meta.clone());
        let Some(snapshot_path) = self.snapshot_path(id) else {
            let mut collections = self.collections.write();
            if collections.contains_key(id) {
                return Ok(false);
            }
            collections.insert(id.to_string(), data);
            return Ok(true);
        };

        validate_index_id(id)?;
        let _creating = self.creating.lock().await;
        if self.collections.read().contains_key(id) {
            return Ok(false);
        }
        let snapshot = data.snapshot();
        let journal = blocking(move || {
            write_snapshot(&snapshot_path, &snapshot)?;
            let journal = Journal::open(snapshot_path.with_extension(JOURNAL_EXT))?;
            // A leftover log from an earlier collection of the same id.
            journal.lock().truncate()?;
            Ok(journal)
        })
        .await?;
        self.journals.write().insert(id.to_string(), Arc::new(journal));
        self.collections.write().insert(id.to_string(), data);
        Ok(true)
    }

    async fn drop_index(&self, id: &str) -> Result<()> {
        let removed = self.collections.write().remove(id);
        self.journals.write().remove(id);
        if removed.is_none() {
            return Ok(());
        }
        if let Some(snapshot_path) = self.snapshot_path(id) {
            let log_path = snapshot_path.with_extension(JOURNAL_EXT);
            blocking(move || {
                for path in [snapshot_path, log_path] {
                    if path.exists() {
                        fs::remove_file(&path).map_err(storage)?;
                    }
                }
                Ok(())
            })
            .await?;
        }
        debug!(collection = %id, "collection dropped");
        Ok(())
    }

    async fn index_exists(&self, id: &str) -> Result<bool> {
        Ok(self.collections.read().contains_key(id))
    }

    async fn list_index_meta(&self, pattern: &IndexPattern) -> Result<BTreeMap<String, CollectionMeta>> {
        let collections = self.collections.read();
        let metas = match pattern {
            IndexPattern::All => collections.iter().map(|(id, c)| (id.clone(), c.meta.clone())).collect(),
            IndexPattern::Ids(ids) => ids
                .iter()
                .filter_map(|id| collections.get(id).map(|c| (id.clone(), c.meta.clone())))
                .collect(),
        };
        Ok(metas)
    }

    async fn search(&self, indices: &[String], request: &SearchRequest) -> Result<Vec<Hit>> {
        let collections = self.collections.read();
        let mut targets = Vec::with_capacity(indices.len());
        for id in indices {
            targets.push((id.as_str(), collections.get(id).ok_or(Error::CollectionNotFound)?));
        }

        let mut hits = Vec::new();
        match request {
            SearchRequest::Match { clause, size } => {
                for (id, data) in &targets {
                    // BTreeMap order keeps ties stable across runs.
                    let scores: BTreeMap<ChunkId, f32> = data.text_scores(clause).into_iter().collect();
                    for (chunk_id, score) in scores {
                        if let Some(record) = data.chunks.get(&chunk_id) {
                            hits.push(data.hit(id, record, score));
                        }
                    }
                }
                sort_hits(&mut hits);
                hits.truncate(*size);
            }
            SearchRequest::Knn { vector, k, num_candidates, filter } => {
                for (id, data) in &targets {
                    if vector.len() != data.schema.vector_size {
                        return Err(Error::DimensionMismatch { expected: data.schema.vector_size, found: vector.len() });
                    }
                    let allowed = filter.as_ref().map(|clause| data.text_scores(clause));
                    let mut candidates: Vec<Hit> = data
                        .chunks
                        .values()
                        .filter(|r| allowed.as_ref().map_or(true, |a| a.contains_key(&r.id)))
                        .map(|r| data.hit(id, r, knn_score(vector, &r.embedding)))
                        .collect();
                    sort_hits(&mut candidates);
                    candidates.truncate((*k).min(*num_candidates));
                    hits.extend(candidates);
                }
                sort_hits(&mut hits);
                hits.truncate(*k);
            }
            SearchRequest::Document { document_id, limit, offset } => {
                for (id, data) in &targets {
                    hits.extend(
                        data.chunks
                            .values()
                            .filter(|r| &r.metadata.document_id == document_id)
                            .map(|r| data.hit(id, r, 1.0)),
                    );
                }
                hits.sort_by(|a, b| a.metadata.document_part.cmp(&b.metadata.document_part).then_with(|| a.id.cmp(&b.id)));
                hits = hits.into_iter().skip(*offset).take(*limit).collect();
            }
        }
        Ok(hits)
    }

    async fn count_documents(&self, index: &str) -> Result<u64> {
        let collections = self.collections.read();
        let data = collections.get(index).ok_or(Error::CollectionNotFound)?;
        let mut ids: Vec<&str> = data.document_ids().collect();
        ids.sort_unstable();
        ids.dedup();
        Ok(ids.len() as u64)
    }

    async fn document_buckets(&self, index: &str, limit: usize, offset: usize) -> Result<Vec<DocumentBucket>> {
        let collections = self.collections.read();
        let data = collections.get(index).ok_or(Error::CollectionNotFound)?;
        let mut buckets: BTreeMap<&str, DocumentBucket> = BTreeMap::new();
        for record in data.chunks.values() {
            let metadata = &record.metadata;
            let bucket = buckets.entry(metadata.document_id.as_str()).or_insert_with(|| DocumentBucket {
                document_id: metadata.document_id.clone(),
                chunk_count: 0,
                metadata: metadata.clone(),
            });
            bucket.chunk_count += 1;
            if metadata.document_part < bucket.metadata.document_part {
                bucket.metadata = metadata.clone();
            }
        }
        let mut buckets: Vec<DocumentBucket> = buckets.into_values().collect();
        sort_buckets(&mut buckets);
        Ok(buckets.into_iter().skip(offset).take(limit).collect())
    }

    async fn bulk_upsert(&self, index: &str, records: Vec<ChunkRecord>) -> Result<()> {
        self.check_dimensions(index, &records)?;
        if records.is_empty() {
            return Ok(());
        }
        let count = self.commit(index, Entry::Upsert { records }).await?;
        debug!(collection = %index, chunks = count, "chunks upserted");
        Ok(())
    }

    async fn delete_by_filter(&self, index: &str, filter: &ChunkFilter) -> Result<u64> {
        let document_id = match filter {
            ChunkFilter::Document(document_id) => document_id,
        };
        if self.document_chunks(index, document_id)? == 0 {
            return Ok(0);
        }
        self.commit(index, Entry::DeleteDocument { document_id: document_id.clone() }).await
    }
}
