//! Collection lifecycle and visibility.
//!
//! Every access to a collection goes through [`CollectionRegistry::resolve`],
//! so callers inherit tenant isolation: a private collection owned by someone
//! else is indistinguishable from one that does not exist.

use std::sync::Arc;

use chrono::Utc;
use futures::future::try_join_all;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::models::{ModelRegistry, ModelType};
use crate::storage::{IndexPattern, IndexSchema};
use crate::traits::StorageEngine;
use crate::types::{Collection, CollectionMeta, CollectionType, User};

/// Parameters of a collection creation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCollection {
    pub id: String,
    pub name: String,
    /// Model id or alias; replaced by the canonical id on creation.
    pub model: String,
    pub collection_type: CollectionType,
    pub description: Option<String>,
}

impl NewCollection {
    pub fn new(id: impl Into<String>, name: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            model: model.into(),
            collection_type: CollectionType::Private,
            description: None,
        }
    }

    pub fn collection_type(mut self, collection_type: CollectionType) -> Self {
        self.collection_type = collection_type;
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

pub struct CollectionRegistry {
    storage: Arc<dyn StorageEngine>,
    models: Arc<ModelRegistry>,
}

impl CollectionRegistry {
    pub fn new(storage: Arc<dyn StorageEngine>, models: Arc<ModelRegistry>) -> Self {
        Self { storage, models }
    }

    pub fn storage(&self) -> &Arc<dyn StorageEngine> {
        &self.storage
    }

    pub fn models(&self) -> &Arc<ModelRegistry> {
        &self.models
    }

    /// Resolves `collection_ids` (all collections when empty) to the
    /// collections visible to `user`, with live document counts.
    pub async fn resolve(&self, collection_ids: &[String], user: &User) -> Result<Vec<Collection>> {
        let mut requested: Vec<&String> = Vec::with_capacity(collection_ids.len());
        for id in collection_ids {
            if !requested.contains(&id) {
                requested.push(id);
            }
        }

        let pattern = if requested.is_empty() {
            IndexPattern::All
        } else {
            IndexPattern::Ids(requested.iter().map(|id| id.to_string()).collect())
        };
        let mut metas = self.storage.list_index_meta(&pattern).await?;

        let mut collections: Vec<Collection> = if requested.is_empty() {
            metas.into_iter().map(|(id, meta)| Collection::from_meta(id, meta)).collect()
        } else {
            let mut ordered = Vec::with_capacity(requested.len());
            for id in &requested {
                let meta = metas.remove(id.as_str()).ok_or(Error::CollectionNotFound)?;
                ordered.push(Collection::from_meta(id.as_str(), meta));
            }
            ordered
        };

        collections.retain(|c| c.is_visible_to(user));
        if collections.len() < requested.len() {
            debug!(user = %user.id, "requested collection hidden from caller");
            return Err(Error::CollectionNotFound);
        }

        let counts = try_join_all(collections.iter().map(|c| self.storage.count_documents(&c.id))).await?;
        for (collection, documents) in collections.iter_mut().zip(counts) {
            collection.documents = documents;
        }
        Ok(collections)
    }

    pub async fn resolve_one(&self, collection_id: &str, user: &User) -> Result<Collection> {
        self.resolve(&[collection_id.to_string()], user)
            .await?
            .pop()
            .ok_or(Error::CollectionNotFound)
    }

    /// Creates the backing index with its dimensionality, owner, type and
    /// creation time pinned. Re-issuing a create for an existing index leaves
    /// it untouched.
    pub async fn create(&self, request: NewCollection, user: &User) -> Result<Collection> {
        let model = self.models.resolve(&request.model)?;
        model.require(ModelType::Embeddings)?;

        if request.collection_type == CollectionType::Public && !user.is_admin() {
            return Err(Error::InsufficientRights);
        }

        let schema = IndexSchema { vector_size: model.vector_size()? };
        let meta = CollectionMeta {
            name: request.name,
            collection_type: request.collection_type,
            model: model.id().to_string(),
            user: user.id.clone(),
            description: request.description,
            created_at: Utc::now().timestamp(),
            documents: 0,
        };

        if self.storage.create_index(&request.id, &schema, &meta).await? {
            info!(collection = %request.id, model = %meta.model, dims = schema.vector_size, "collection created");
            return Ok(Collection::from_meta(request.id, meta));
        }

        // The existing index keeps its model and owner; report those.
        debug!(collection = %request.id, "collection already exists");
        let mut stored = self.storage.list_index_meta(&IndexPattern::Ids(vec![request.id.clone()])).await?;
        let meta = stored.remove(&request.id).ok_or(Error::CollectionNotFound)?;
        let existing = Collection::from_meta(request.id, meta);
        if !existing.is_visible_to(user) {
            return Err(Error::InsufficientRights);
        }
        Ok(existing)
    }

    pub async fn delete(&self, collection_id: &str, user: &User) -> Result<()> {
        let collection = self.resolve_one(collection_id, user).await?;
        collection.check_write_access(user)?;

        self.storage.drop_index(&collection.id).await?;
        info!(collection = %collection.id, "collection deleted");
        Ok(())
    }
}
