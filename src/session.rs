//! Page session and view state.
//!
//! Everything one browser needs remembered between requests lives in its
//! `Session` and only changes through the named transitions below. Transitions that
//! need backend data return an `Effect` for the caller to run; the session
//! itself never does I/O.

use chrono::{DateTime, Duration, Utc};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::chat::Transcript;
use crate::models::{Paper, PaperId, User, UserId};

/// How long a notification banner stays up.
pub const NOTIFICATION_TTL_SECS: i64 = 5;

// ============================================================================
// Tabs
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tab {
    Upload,
    Papers,
    Chat,
    Viewer,
}

impl Tab {
    pub const ALL: [Tab; 4] = [Tab::Upload, Tab::Papers, Tab::Chat, Tab::Viewer];

    pub fn as_str(&self) -> &'static str {
        match self {
            Tab::Upload => "upload",
            Tab::Papers => "papers",
            Tab::Chat => "chat",
            Tab::Viewer => "viewer",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Tab::Upload => "上传论文",
            Tab::Papers => "论文列表",
            Tab::Chat => "智能问答",
            Tab::Viewer => "论文阅读",
        }
    }
}

impl FromStr for Tab {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Tab::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown tab: {}", s))
    }
}

impl fmt::Display for Tab {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViewerSection {
    Overview,
    KeyContent,
    Translation,
    Terminology,
    ResearchContext,
    RelatedPapers,
    Chat,
}

impl ViewerSection {
    pub const ALL: [ViewerSection; 7] = [
        ViewerSection::Overview,
        ViewerSection::KeyContent,
        ViewerSection::Translation,
        ViewerSection::Terminology,
        ViewerSection::ResearchContext,
        ViewerSection::RelatedPapers,
        ViewerSection::Chat,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ViewerSection::Overview => "overview",
            ViewerSection::KeyContent => "key-content",
            ViewerSection::Translation => "translation",
            ViewerSection::Terminology => "terminology",
            ViewerSection::ResearchContext => "research-context",
            ViewerSection::RelatedPapers => "related-papers",
            ViewerSection::Chat => "chat",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ViewerSection::Overview => "基本信息",
            ViewerSection::KeyContent => "关键内容",
            ViewerSection::Translation => "中文翻译",
            ViewerSection::Terminology => "术语解释",
            ViewerSection::ResearchContext => "研究脉络",
            ViewerSection::RelatedPapers => "相关论文",
            ViewerSection::Chat => "论文问答",
        }
    }
}

impl FromStr for ViewerSection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ViewerSection::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown viewer section: {}", s))
    }
}

/// Which tab and viewer section are showing. Exactly one of each is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewState {
    tab: Tab,
    section: ViewerSection,
}

impl Default for ViewState {
    fn default() -> Self {
        Self {
            tab: Tab::Upload,
            section: ViewerSection::Overview,
        }
    }
}

impl ViewState {
    pub fn tab(&self) -> Tab {
        self.tab
    }

    pub fn section(&self) -> ViewerSection {
        self.section
    }

    pub fn is_active(&self, tab: Tab) -> bool {
        self.tab == tab
    }

    /// A section only counts as active while the viewer is showing.
    pub fn is_section_active(&self, section: ViewerSection) -> bool {
        self.tab == Tab::Viewer && self.section == section
    }
}

/// Work a transition asks the caller to perform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    None,
    RefreshPapers,
    /// Fetch detail and chat history for this paper.
    LoadPaper(PaperId),
}

// ============================================================================
// Notifications
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    Info,
    Success,
    Error,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::Info => "info",
            NotificationKind::Success => "success",
            NotificationKind::Error => "error",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Notification {
    pub kind: NotificationKind,
    pub message: String,
    pub expires_at: DateTime<Utc>,
}

// ============================================================================
// Loading overlay
// ============================================================================

/// Count of running operations behind the loading overlay. The overlay
/// shows while any of them is still running.
#[derive(Debug, Clone, Default)]
pub struct LoadingOverlay(Arc<AtomicUsize>);

impl LoadingOverlay {
    /// Shows the overlay until the returned guard is dropped.
    pub fn show(&self) -> LoadingGuard {
        self.0.fetch_add(1, Ordering::SeqCst);
        LoadingGuard(self.0.clone())
    }

    pub fn is_visible(&self) -> bool {
        self.0.load(Ordering::SeqCst) > 0
    }
}

pub struct LoadingGuard(Arc<AtomicUsize>);

impl Drop for LoadingGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

// ============================================================================
// Session
// ============================================================================

pub struct Session {
    view: ViewState,
    placeholder_user: UserId,
    user: Option<User>,
    current_paper: Option<PaperId>,
    papers: Vec<Paper>,
    detail: Option<Paper>,
    notification: Option<Notification>,
    chat_turn: Option<CancellationToken>,
    loading: LoadingOverlay,
    /// Chat about the open paper.
    pub transcript: Transcript,
    /// Free-form streamed chat on the chat tab.
    pub quick_chat: Transcript,
}

impl Session {
    pub fn new(placeholder_user: UserId) -> Self {
        Self {
            view: ViewState::default(),
            placeholder_user,
            user: None,
            current_paper: None,
            papers: Vec::new(),
            detail: None,
            notification: None,
            chat_turn: None,
            loading: LoadingOverlay::default(),
            transcript: Transcript::new(),
            quick_chat: Transcript::new(),
        }
    }

    pub fn view(&self) -> ViewState {
        self.view
    }

    /// Logged-in user's id, or the placeholder until someone logs in.
    pub fn user_id(&self) -> UserId {
        self.user.as_ref().map(|u| u.id).unwrap_or(self.placeholder_user)
    }

    pub fn user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    pub fn current_paper(&self) -> Option<PaperId> {
        self.current_paper
    }

    pub fn papers(&self) -> &[Paper] {
        &self.papers
    }

    pub fn detail(&self) -> Option<&Paper> {
        self.detail.as_ref()
    }

    pub fn loading(&self) -> &LoadingOverlay {
        &self.loading
    }

    pub fn switch_tab(&mut self, tab: Tab) -> Effect {
        info!(from = %self.view.tab, to = %tab, "switch tab");
        self.view.tab = tab;
        match tab {
            Tab::Papers | Tab::Chat => Effect::RefreshPapers,
            Tab::Upload => Effect::None,
            Tab::Viewer => match self.current_paper {
                Some(_) => Effect::None,
                None => {
                    // nothing to show yet; fall back to the list
                    self.view.tab = Tab::Papers;
                    Effect::RefreshPapers
                }
            },
        }
    }

    /// Enters the viewer for `paper_id`. Switching papers clears the
    /// previous paper's transcript and detail.
    pub fn open_paper(&mut self, paper_id: PaperId) -> Effect {
        info!(paper_id, "open paper");
        if self.current_paper != Some(paper_id) {
            self.cancel_chat_turn();
            self.transcript.clear();
            self.detail = None;
        }
        self.current_paper = Some(paper_id);
        self.view.tab = Tab::Viewer;
        self.view.section = ViewerSection::Overview;
        Effect::LoadPaper(paper_id)
    }

    /// Local visibility toggle; never triggers a fetch.
    pub fn select_section(&mut self, section: ViewerSection) {
        self.view.section = section;
    }

    pub fn set_papers(&mut self, papers: Vec<Paper>) {
        self.papers = papers;
    }

    /// Stores a fetched detail snapshot if it still belongs to the open paper.
    pub fn set_detail(&mut self, paper: Paper) -> bool {
        if self.current_paper == Some(paper.id) {
            self.detail = Some(paper);
            true
        } else {
            false
        }
    }

    pub fn login(&mut self, user: User) {
        info!(user_id = user.id, username = %user.username, "logged in");
        self.user = Some(user);
        self.papers.clear();
    }

    pub fn logout(&mut self) {
        self.cancel_chat_turn();
        self.user = None;
        self.current_paper = None;
        self.detail = None;
        self.papers.clear();
        self.transcript.clear();
        self.quick_chat.clear();
        self.view = ViewState::default();
    }

    // ------------------------------------------------------------------------
    // Notifications
    // ------------------------------------------------------------------------

    pub fn notify(&mut self, kind: NotificationKind, message: impl Into<String>) {
        self.notify_at(kind, message, Utc::now());
    }

    pub fn notify_at(&mut self, kind: NotificationKind, message: impl Into<String>, now: DateTime<Utc>) {
        self.notification = Some(Notification {
            kind,
            message: message.into(),
            expires_at: now + Duration::seconds(NOTIFICATION_TTL_SECS),
        });
    }

    /// Current banner, dropping it once its time is up.
    pub fn notification_at(&mut self, now: DateTime<Utc>) -> Option<&Notification> {
        if matches!(&self.notification, Some(n) if n.expires_at <= now) {
            self.notification = None;
        }
        self.notification.as_ref()
    }

    pub fn dismiss_notification(&mut self) {
        self.notification = None;
    }

    // ------------------------------------------------------------------------
    // Chat turns
    // ------------------------------------------------------------------------

    /// Cancels any in-flight turn and hands out the token for a new one.
    pub fn begin_chat_turn(&mut self) -> CancellationToken {
        self.cancel_chat_turn();
        let token = CancellationToken::new();
        self.chat_turn = Some(token.clone());
        token
    }

    pub fn cancel_chat_turn(&mut self) {
        if let Some(token) = self.chat_turn.take() {
            token.cancel();
        }
    }
}
