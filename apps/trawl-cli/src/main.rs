//! trawl: command line front end of the retrieval service.
//!
//! ```bash
//! trawl collections create docs --model embeddings
//! trawl ingest docs ./chunks/
//! trawl search "borrow checker" -c docs --method hybrid -k 5
//! trawl ask "how are lifetimes checked?" -c docs --model chat
//! trawl rerank "sourdough" --model chat "flour and water" "tomato soup"
//! ```

mod args;
mod ingest;
mod output;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use trawl_core::config::{Config, Settings, StorageBackend};
use trawl_core::{CollectionType, NewCollection, Role, SearchQuery, StorageEngine, User};
use trawl_embed::{connect_models, EmbeddingGateway, RetryPolicy};
use trawl_hybrid::RetrievalService;
use trawl_text::TantivyStore;
use trawl_vector::VectorStore;

use args::{Cli, CollectionsCommand, Command, DocumentsCommand, SearchArgs};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = Config::load_from(&cli.config_dir, &cli.environment).context("loading configuration")?;
    let settings = config.settings().context("reading settings")?;
    let service = build_service(&cli, &settings).await?;
    let user = User::new(cli.user.clone(), if cli.admin { Role::Admin } else { Role::User });

    let text = match cli.command {
        Command::Collections(CollectionsCommand::List { ids }) => {
            let collections = service.list_collections(&user, &ids).await?;
            if cli.json { output::json(&collections)? } else { output::collections(&collections) }
        }
        Command::Collections(CollectionsCommand::Create { id, name, model, public, description }) => {
            let name = name.unwrap_or_else(|| id.clone());
            let mut request = NewCollection::new(id, name, model);
            if public {
                request = request.collection_type(CollectionType::Public);
            }
            if let Some(description) = description {
                request = request.description(description);
            }
            let collection = service.create_collection(request, &user).await?;
            if cli.json { output::json(&collection)? } else { format!("Created {}", collection.id) }
        }
        Command::Collections(CollectionsCommand::Delete { id }) => {
            service.delete_collection(&id, &user).await?;
            format!("Deleted {id}")
        }
        Command::Documents(DocumentsCommand::List { collection, limit, offset }) => {
            let documents = service.get_documents(&collection, &user, limit, offset).await?;
            if cli.json { output::json(&documents)? } else { output::documents(&documents) }
        }
        Command::Documents(DocumentsCommand::Delete { collection, document }) => {
            service.delete_document(&collection, &document, &user).await?;
            format!("Deleted {document} from {collection}")
        }
        Command::Chunks { collection, document, limit, offset } => {
            let chunks = service.get_chunks(&collection, &document, &user, limit, offset).await?;
            if cli.json { output::json(&chunks)? } else { output::chunks(&chunks) }
        }
        Command::Ingest { collection, paths } => {
            let count = ingest::ingest(&service, &collection, &paths, &user).await?;
            info!(collection = %collection, chunks = count, "ingest finished");
            format!("Indexed {count} chunks into {collection}")
        }
        Command::Search(search) => {
            let query = search_query(search, &settings);
            let results = service.query(&query, &user).await?;
            if cli.json { output::json(&results)? } else { output::results(&query.prompt, &results) }
        }
        Command::Ask { model, search } => {
            let query = search_query(search, &settings);
            let answer = service.answer(&query, &model, &user).await?;
            if cli.json { output::json(&answer)? } else { output::answer(&answer) }
        }
        Command::Rerank { prompt, model, inputs } => {
            let ranked = service.rerank(&prompt, &inputs, &model).await?;
            if cli.json { output::json(&ranked)? } else { output::reranks(&inputs, &ranked) }
        }
        Command::Models => {
            let models = service.gateway().models().configs();
            if cli.json { output::json(&models)? } else { output::models(&models) }
        }
    };
    println!("{text}");
    Ok(())
}

async fn build_service(cli: &Cli, settings: &Settings) -> Result<RetrievalService> {
    let path = settings.storage.resolved_path(&cli.config_dir);
    let storage: Arc<dyn StorageEngine> = match (settings.storage.backend, path) {
        (StorageBackend::Tantivy, Some(path)) => {
            Arc::new(TantivyStore::open(path.clone()).with_context(|| format!("opening {}", path.display()))?)
        }
        (StorageBackend::Vector, Some(path)) => {
            Arc::new(VectorStore::open(path.clone()).with_context(|| format!("opening {}", path.display()))?)
        }
        (backend, None) => {
            warn!("storage.path is not set; the {backend:?} store lives in memory and is lost on exit");
            match backend {
                StorageBackend::Tantivy => Arc::new(TantivyStore::in_memory()),
                StorageBackend::Vector => Arc::new(VectorStore::in_memory()),
            }
        }
    };

    let models = connect_models(&settings.models).await.context("connecting models")?;
    let gateway = EmbeddingGateway::new(Arc::new(models))
        .with_policy(RetryPolicy::from(&settings.embeddings))
        .with_batch_size(settings.embeddings.batch_size);
    Ok(RetrievalService::with_num_candidates(storage, gateway, settings.search.num_candidates))
}

fn search_query(args: SearchArgs, settings: &Settings) -> SearchQuery {
    SearchQuery::new(args.prompt)
        .collections(args.collections)
        .method(args.method)
        .k(Some(args.k.unwrap_or(settings.search.k)))
        .rff_k(args.rff_k.unwrap_or(settings.search.rff_k))
}
