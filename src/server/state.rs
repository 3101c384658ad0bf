use axum::extract::FromRef;

use crate::ingest::IngestManager;
use crate::library_store::LibraryStore;
use crate::object_store::ObjectStore;
use std::sync::Arc;
use std::time::Instant;

use super::ServerConfig;

pub type GuardedLibraryStore = Arc<dyn LibraryStore>;
pub type GuardedObjectStore = Arc<dyn ObjectStore>;
pub type GuardedIngestManager = Arc<IngestManager>;

#[derive(Clone)]
pub struct ServerState {
    pub config: ServerConfig,
    pub start_time: Instant,
    pub library_store: GuardedLibraryStore,
    pub object_store: GuardedObjectStore,
    pub ingest_manager: GuardedIngestManager,
    pub hash: String,
}

impl FromRef<ServerState> for GuardedLibraryStore {
    fn from_ref(input: &ServerState) -> Self {
        input.library_store.clone()
    }
}

impl FromRef<ServerState> for GuardedObjectStore {
    fn from_ref(input: &ServerState) -> Self {
        input.object_store.clone()
    }
}

impl FromRef<ServerState> for GuardedIngestManager {
    fn from_ref(input: &ServerState) -> Self {
        input.ingest_manager.clone()
    }
}

impl FromRef<ServerState> for ServerConfig {
    fn from_ref(input: &ServerState) -> Self {
        input.config.clone()
    }
}
