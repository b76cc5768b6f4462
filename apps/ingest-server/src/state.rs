//! Application state management

use std::sync::Arc;

use crate::config::Config;
use crate::format::FormatRouter;
use crate::probe::MediaProbe;
use crate::storage::MultipartManager;
use crate::stream::{RelayUploader, StreamClient};
use crate::upload::SessionManager;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: Config,
    format_router: FormatRouter,
    sessions: SessionManager,
    multipart: MultipartManager,
    stream: StreamClient,
    relay: RelayUploader,
    probe: Option<MediaProbe>,
}

impl AppState {
    /// Create a new application state
    ///
    /// Media probing is only wired up when `PROBE_ON_FINALIZE` is set.
    pub fn new(
        config: Config,
        sessions: SessionManager,
        multipart: MultipartManager,
        stream: StreamClient,
        relay: RelayUploader,
    ) -> Self {
        let format_router = FormatRouter::new(config.upload.unknown_format);
        let probe = config
            .upload
            .probe_on_finalize
            .then(|| MediaProbe::new(config.timeouts.transfer()));

        Self {
            inner: Arc::new(AppStateInner {
                config,
                format_router,
                sessions,
                multipart,
                stream,
                relay,
                probe,
            }),
        }
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub fn format_router(&self) -> &FormatRouter {
        &self.inner.format_router
    }

    /// Chunked upload sessions
    pub fn sessions(&self) -> &SessionManager {
        &self.inner.sessions
    }

    /// Object-store multipart uploads
    pub fn multipart(&self) -> &MultipartManager {
        &self.inner.multipart
    }

    /// Media platform client
    pub fn stream(&self) -> &StreamClient {
        &self.inner.stream
    }

    pub fn relay(&self) -> &RelayUploader {
        &self.inner.relay
    }

    pub fn probe(&self) -> Option<&MediaProbe> {
        self.inner.probe.as_ref()
    }
}
