//! Test server lifecycle management
//!
//! This module manages spawning and shutting down test HTTP servers.
//! Each test gets an isolated server with its own object store and database.

use super::constants::*;
use phonoteca_server::object_store::FilesystemStore;
use phonoteca_server::server::{make_app, RequestsLoggingLevel, ServerConfig};
use phonoteca_server::{LibraryStore, ObjectStore, SqliteLibraryStore};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpListener;

/// Test server instance with an isolated object store and library database
///
/// When dropped, the server gracefully shuts down and temp resources are
/// cleaned up. The stores are exposed for direct assertions (listing `temp/`,
/// checking reference counts) and for driving the lifecycle sweeper.
pub struct TestServer {
    /// Base URL for making requests (e.g., "http://127.0.0.1:12345")
    pub base_url: String,

    /// The port the server is listening on
    pub port: u16,

    pub object_store: Arc<dyn ObjectStore>,
    pub library_store: Arc<dyn LibraryStore>,

    // Private fields - keep resources alive until drop
    _temp_dir: TempDir,
    _shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

impl TestServer {
    /// Spawns a new test server on a random port with no storage quota.
    pub async fn spawn() -> Self {
        Self::spawn_with_quota(None).await
    }

    /// Spawns a test server with a cap over total stored bytes.
    pub async fn spawn_with_quota(quota_max_total_bytes: Option<u64>) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");

        let object_store: Arc<dyn ObjectStore> = Arc::new(
            FilesystemStore::new(temp_dir.path().join("objects"))
                .await
                .expect("Failed to create object store"),
        );
        let library_store: Arc<dyn LibraryStore> = Arc::new(
            SqliteLibraryStore::new(temp_dir.path().join("library.db"))
                .expect("Failed to open library store"),
        );

        // Bind to random port
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind to random port");
        let port = listener
            .local_addr()
            .expect("Failed to get local address")
            .port();
        let base_url = format!("http://127.0.0.1:{}", port);

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

        let config = ServerConfig {
            port,
            requests_logging_level: RequestsLoggingLevel::None,
            api_token: TEST_API_TOKEN.to_string(),
            frontend_dir_path: None,
            max_upload_bytes: 64 * 1024 * 1024,
            quota_max_total_bytes,
        };

        let app = make_app(config, object_store.clone(), library_store.clone())
            .expect("Failed to build app");

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
                .expect("Server failed");
        });

        let server = Self {
            base_url,
            port,
            object_store,
            library_store,
            _temp_dir: temp_dir,
            _shutdown_tx: Some(shutdown_tx),
        };

        server.wait_for_ready().await;

        server
    }

    /// Keys currently present under `temp/` in the object store.
    pub async fn temp_objects(&self) -> Vec<String> {
        self.object_store
            .list_objects("temp/")
            .await
            .expect("Failed to list temp objects")
    }

    /// Keys currently present under `files/` in the object store.
    pub async fn stored_objects(&self) -> Vec<String> {
        self.object_store
            .list_objects("files/")
            .await
            .expect("Failed to list stored objects")
    }

    /// Waits for the server to become ready by polling the home endpoint
    async fn wait_for_ready(&self) {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(100))
            .build()
            .expect("Failed to build reqwest client");

        let start = std::time::Instant::now();
        let timeout = Duration::from_millis(SERVER_READY_TIMEOUT_MS);

        loop {
            if start.elapsed() > timeout {
                panic!(
                    "Server did not become ready within {}ms",
                    SERVER_READY_TIMEOUT_MS
                );
            }

            match client.get(format!("{}/", self.base_url)).send().await {
                Ok(response) if response.status().is_success() => {
                    return;
                }
                _ => {
                    tokio::time::sleep(Duration::from_millis(SERVER_READY_POLL_INTERVAL_MS)).await;
                }
            }
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self._shutdown_tx.take() {
            let _ = tx.send(());
        }
        // TempDir cleans up objects and database automatically
    }
}
