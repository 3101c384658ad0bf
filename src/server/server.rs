use anyhow::Result;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::ingest::IngestManager;
use crate::library_store::LibraryStore;
use crate::object_store::ObjectStore;
use crate::quota::StorageQuota;
use tower_http::services::ServeDir;

use axum::{
    extract::State,
    middleware,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Serialize;

use super::songs_routes::songs_routes;
use super::{log_requests, session::Session, state::*, ServerConfig};

#[derive(Serialize)]
struct ServerStats {
    pub uptime: String,
    pub hash: String,
    pub storage_backend: &'static str,
    pub authenticated: bool,
}

fn format_uptime(duration: Duration) -> String {
    let total_seconds = duration.as_secs();

    let days = total_seconds / 86_400;
    let hours = (total_seconds % 86_400) / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    format!("{}d {:02}:{:02}:{:02}", days, hours, minutes, seconds)
}

async fn home(session: Option<Session>, State(state): State<ServerState>) -> impl IntoResponse {
    let stats = ServerStats {
        uptime: format_uptime(state.start_time.elapsed()),
        hash: state.hash.clone(),
        storage_backend: state.object_store.backend_name(),
        authenticated: session.is_some(),
    };
    Json(stats)
}

pub fn make_app(
    config: ServerConfig,
    object_store: Arc<dyn ObjectStore>,
    library_store: Arc<dyn LibraryStore>,
) -> Result<Router> {
    let quota = match config.quota_max_total_bytes {
        Some(max) => StorageQuota::with_cap(max),
        None => StorageQuota::disabled(),
    };
    let ingest_manager = Arc::new(IngestManager::new(
        object_store.clone(),
        library_store.clone(),
        quota,
    ));

    let state = ServerState {
        config: config.clone(),
        start_time: Instant::now(),
        library_store,
        object_store,
        ingest_manager,
        hash: env!("GIT_HASH").to_string(),
    };

    let content_routes: Router = songs_routes(state.clone()).with_state(state.clone());

    let home_router: Router = match config.frontend_dir_path {
        Some(frontend_path) => {
            let static_files_service =
                ServeDir::new(frontend_path).append_index_html_on_directories(true);
            Router::new().fallback_service(static_files_service)
        }
        None => Router::new()
            .route("/", get(home))
            .with_state(state.clone()),
    };

    let mut app: Router = home_router.nest("/v1", content_routes);

    app = app.layer(middleware::from_fn_with_state(state.clone(), log_requests));

    Ok(app)
}

pub async fn run_server(
    config: ServerConfig,
    object_store: Arc<dyn ObjectStore>,
    library_store: Arc<dyn LibraryStore>,
) -> Result<()> {
    let port = config.port;
    let app = make_app(config, object_store, library_store)?;

    let listener = tokio::net::TcpListener::bind(format!("127.0.0.1:{}", port)).await?;

    Ok(axum::serve(listener, app).await?)
}
