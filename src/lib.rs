//! Paper desk library - re-exports for testing and external use.
//!
//! The front end for the paper-reading backend: API client, SSE stream
//! reader, session/view state, and the HTML renderers the handlers use.

use std::sync::Arc;

pub mod api;
pub mod chat;
pub mod config;
pub mod diagram;
pub mod error;
pub mod handlers;
pub mod markdown;
pub mod models;
pub mod papers;
pub mod session;
pub mod sse;
pub mod store;
pub mod templates;
pub mod view;

// ============================================================================
// Application State
// ============================================================================

/// Largest upload accepted from the browser.
pub const UPLOAD_LIMIT_BYTES: usize = 50 * 1024 * 1024;

pub struct AppState {
    pub config: Config,
    pub api: ApiClient,
    pub sessions: SessionStore,
    pub diagrams: MermaidRenderer,
}

impl AppState {
    pub fn new(config: Config) -> Result<Self, ClientError> {
        let api = ApiClient::new(&config)?;
        let sessions = SessionStore::new(config.default_user_id);
        Ok(Self {
            config,
            api,
            sessions,
            diagrams: MermaidRenderer,
        })
    }

    pub fn shared(config: Config) -> Result<Arc<Self>, ClientError> {
        Self::new(config).map(Arc::new)
    }
}

// Re-export commonly used types
pub use api::ApiClient;
pub use chat::{render_assistant, LiveMessage, MessageHandle, Transcript, THINKING_PLACEHOLDER};
pub use config::{Config, ConfigError};
pub use diagram::{
    download_file_name, enlarge_document, validate_mermaid, SVG_SLOT, DiagramError, DiagramRenderer,
    MermaidRenderer,
};
pub use error::ClientError;
pub use markdown::{format_timestamp, html_escape, render_markdown};
pub use models::{
    ChatHistoryEntry, ChatMessage, Diagram, Paper, PaperId, ProcessingStatus, RelatedPapers,
    Sender, StreamOp, StreamPayload, User, UserId,
};
pub use papers::{owned_by, render_detail, render_paper_grid, render_related_papers, status_label};
pub use session::{
    Effect, LoadingGuard, LoadingOverlay, Notification, NotificationKind, Session, Tab,
    ViewState, ViewerSection,
};
pub use store::{SessionHandle, SessionId, SessionStore, SESSION_COOKIE};
pub use sse::{classify, parse_block, read_stream, SseDecoder, StreamOutcome, StreamSink, StreamUpdate};
pub use view::{PageView, Slot, ViewBinding};
