//! trawl-core
//!
//! Domain types, the error taxonomy, configuration, the storage and model
//! backend seams, and the collection registry that every search path goes
//! through for authorization.

pub mod config;
pub mod error;
pub mod models;
pub mod query;
pub mod registry;
pub mod similarity;
pub mod storage;
pub mod traits;
pub mod types;

pub use error::{Error, ModelError, Result};
pub use models::{ModelConfig, ModelHandle, ModelRegistry, ModelType};
pub use registry::{CollectionRegistry, NewCollection};
pub use traits::{ModelBackend, StorageEngine};
pub use types::{
    Chunk, ChunkMetadata, Collection, CollectionMeta, CollectionType, Document, Message, Role,
    SearchMethod, SearchQuery, SearchResult, User,
};
