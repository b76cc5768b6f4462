//! Route modules for the Ingest server

pub mod health;
pub mod raw;
pub mod stream;
pub mod upload;

use axum::{extract::DefaultBodyLimit, http::header, routing::get, Json, Router};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::error::{AppError, Result};
use crate::state::AppState;
use crate::tus;

/// Largest single request body outside the relay route (chunks and parts)
pub const MAX_BODY_BYTES: usize = 128 * 1024 * 1024;

/// Success envelope: `{"success": true, ...payload}`
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    success: bool,
    #[serde(flatten)]
    data: T,
}

pub fn ok<T: Serialize>(data: T) -> Json<ApiResponse<T>> {
    Json(ApiResponse {
        success: true,
        data,
    })
}

/// Validate a client-declared file size against `MAX_UPLOAD_SIZE`
pub(crate) fn declared_size(state: &AppState, file_size: i64) -> Result<u64> {
    if file_size <= 0 {
        return Err(AppError::InvalidInput(format!(
            "fileSize must be positive, got {}",
            file_size
        )));
    }
    let max = state.config().upload.max_upload_size;
    if file_size as u64 > max {
        return Err(AppError::InvalidInput(format!(
            "fileSize {} exceeds the maximum of {} bytes",
            file_size, max
        )));
    }
    Ok(file_size as u64)
}

/// Build the full application router
pub fn app(state: AppState) -> Router {
    // Browsers need the resumable headers exposed to read offsets back
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
        .expose_headers([
            tus::UPLOAD_OFFSET,
            tus::UPLOAD_LENGTH,
            tus::TUS_RESUMABLE,
            header::LOCATION,
        ]);

    Router::new()
        .route("/health", get(health::health_check))
        .route("/api/health", get(health::health_check))
        .nest("/api/upload", upload::router())
        .nest("/api/upload/r2", raw::router())
        .nest("/api/stream", stream::router())
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use axum_test::TestServer;
    use tempfile::TempDir;

    use crate::config::Config;
    use crate::state::AppState;
    use crate::storage::{memory::MemoryBackend, MultipartManager};
    use crate::stream::{MockTarget, RelayUploader, StreamClient};
    use crate::upload::{FsSessionStore, SessionManager};

    pub struct TestApp {
        pub server: TestServer,
        pub state: AppState,
        pub backend: Arc<MemoryBackend>,
        pub target: Arc<MockTarget>,
        pub dir: TempDir,
    }

    /// App over a temp directory, an in-memory object store and a scripted relay target
    pub async fn test_app() -> TestApp {
        let dir = TempDir::new().unwrap();

        let mut config = Config::default();
        config.upload.temp_dir = dir.path().join("temp");
        config.upload.final_dir = dir.path().join("projects");
        config.stream.account_id = String::new();
        config.stream.api_token = String::new();

        let store = FsSessionStore::open(&config.upload.temp_dir).await.unwrap();
        let sessions = SessionManager::new(Arc::new(store), config.upload.max_upload_size);

        let backend = Arc::new(MemoryBackend::new("raw-bucket"));
        let multipart = MultipartManager::new(backend.clone());

        let stream = StreamClient::new(&config.stream, config.timeouts).unwrap();
        let target = Arc::new(MockTarget::new());
        let relay = RelayUploader::new(target.clone(), 3600).with_chunk_size(4);

        let state = AppState::new(config, sessions, multipart, stream, relay);
        let server = TestServer::new(super::app(state.clone())).unwrap();

        TestApp {
            server,
            state,
            backend,
            target,
            dir,
        }
    }
}
