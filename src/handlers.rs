//! HTTP route handlers for the paper desk.
//!
//! Each handler resolves the browser's own session from its cookie,
//! performs one user action (transition the session, run whatever backend
//! call the transition asks for) and sends the browser back to the page.
//! Failures end up in the notification banner or inline in the transcript,
//! never as an error page.

use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        Html, IntoResponse, Redirect, Response,
    },
    Form,
};
use axum_extra::extract::CookieJar;
use chrono::Utc;
use futures_util::StreamExt;
use serde::Deserialize;
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::mpsc::{unbounded_channel, UnboundedSender};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::chat::{LiveMessage, MessageHandle, THINKING_PLACEHOLDER};
use crate::error::ClientError;
use crate::models::{PaperId, Sender};
use crate::papers::render_detail;
use crate::session::{Effect, NotificationKind, Tab, ViewerSection};
use crate::sse::{read_stream, StreamOutcome, StreamSink};
use crate::store::SessionHandle;
use crate::templates::{base_html, chat_tab, papers_tab, upload_tab, viewer_tab, PageChrome};
use crate::view::PageView;
use crate::AppState;

const PAGE_TITLE: &str = "论文阅读助手";

fn back_home(jar: CookieJar) -> (CookieJar, Redirect) {
    (jar, Redirect::to("/"))
}

// ============================================================================
// Page
// ============================================================================

pub async fn index(State(state): State<Arc<AppState>>, jar: CookieJar) -> (CookieJar, Html<String>) {
    let (jar, session) = state.sessions.resolve(jar);
    (jar, Html(render_page(&state, &session)))
}

/// Renders every tab from the browser's session; only the active one shows.
pub fn render_page(state: &AppState, session: &SessionHandle) -> String {
    let now = Utc::now();
    let mut session = session.lock();
    let notification = session.notification_at(now).cloned();
    let remaining_ms = notification
        .as_ref()
        .map(|n| (n.expires_at - now).num_milliseconds())
        .unwrap_or(0);
    let view = session.view();
    let user_id = session.user_id();

    let mut page = PageView::new();
    if let Some(paper) = session.detail() {
        render_detail(paper, &state.api.pdf_url(paper), &mut page);
    }

    let content = [
        upload_tab(&view),
        papers_tab(&view, session.papers(), user_id),
        chat_tab(
            &view,
            session.papers(),
            user_id,
            &state.config.chain,
            &session.quick_chat.to_html(),
        ),
        viewer_tab(&view, session.current_paper(), &page, &session.transcript.to_html()),
    ]
    .concat();

    let chrome = PageChrome {
        view: &view,
        user: session.user(),
        notification: notification.as_ref(),
        loading: session.loading().is_visible(),
        notification_remaining_ms: remaining_ms,
    };
    base_html(PAGE_TITLE, &content, &chrome)
}

// ============================================================================
// Effects
// ============================================================================

async fn run_effect(state: &AppState, session: &SessionHandle, effect: Effect) {
    match effect {
        Effect::None => {}
        Effect::RefreshPapers => refresh_papers(state, session).await,
        Effect::LoadPaper(paper_id) => load_paper(state, session, paper_id).await,
    }
}

async fn refresh_papers(state: &AppState, session: &SessionHandle) {
    let user_id = session.lock().user_id();
    let result = state.api.list_papers(user_id).await;
    let mut session = session.lock();
    match result {
        Ok(papers) => session.set_papers(papers),
        Err(e) => {
            warn!(error = %e, "paper list refresh failed");
            session.notify(NotificationKind::Error, "加载论文列表失败");
        }
    }
}

/// One detail fetch fills every viewer section; history is fetched next to
/// it so the chat section is ready too.
async fn load_paper(state: &AppState, session: &SessionHandle, paper_id: PaperId) {
    let user_id = session.lock().user_id();
    let (detail, history) = tokio::join!(
        state.api.get_paper(paper_id),
        state.api.chat_history(paper_id, user_id)
    );

    let mut session = session.lock();
    match detail {
        Ok(paper) => {
            if !session.set_detail(paper) {
                info!(paper_id, "discarding detail for a paper no longer open");
                return;
            }
        }
        Err(e) => {
            warn!(paper_id, error = %e, "paper detail failed");
            session.notify(NotificationKind::Error, "加载论文详情失败");
            return;
        }
    }
    match history {
        Ok(history) => session.transcript.load_history(&history, &state.diagrams),
        Err(e) => warn!(paper_id, error = %e, "chat history failed"),
    }
}

// ============================================================================
// Navigation
// ============================================================================

pub async fn switch_tab(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Path(name): Path<String>,
) -> Response {
    let Ok(tab) = name.parse::<Tab>() else {
        return (StatusCode::NOT_FOUND, "unknown tab").into_response();
    };
    let (jar, session) = state.sessions.resolve(jar);
    let effect = session.lock().switch_tab(tab);
    run_effect(&state, &session, effect).await;
    back_home(jar).into_response()
}

pub async fn open_paper(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Path(paper_id): Path<PaperId>,
) -> (CookieJar, Redirect) {
    let (jar, session) = state.sessions.resolve(jar);
    let effect = session.lock().open_paper(paper_id);
    run_effect(&state, &session, effect).await;
    back_home(jar)
}

/// Sub-section switch. Only loads the paper if it isn't the open one yet.
pub async fn select_section(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Path((paper_id, name)): Path<(PaperId, String)>,
) -> Response {
    let Ok(section) = name.parse::<ViewerSection>() else {
        return (StatusCode::NOT_FOUND, "unknown section").into_response();
    };
    let (jar, session) = state.sessions.resolve(jar);
    let effect = {
        let mut session = session.lock();
        if session.current_paper() == Some(paper_id) && session.detail().is_some() {
            let _ = session.switch_tab(Tab::Viewer);
            Effect::None
        } else {
            session.open_paper(paper_id)
        }
    };
    run_effect(&state, &session, effect).await;
    session.lock().select_section(section);
    back_home(jar).into_response()
}

pub async fn dismiss_notification(State(state): State<Arc<AppState>>, jar: CookieJar) -> (CookieJar, StatusCode) {
    let (jar, session) = state.sessions.resolve(jar);
    session.lock().dismiss_notification();
    (jar, StatusCode::NO_CONTENT)
}

// ============================================================================
// Upload
// ============================================================================

struct PdfUpload {
    name: String,
    bytes: Vec<u8>,
}

pub fn is_pdf(file_name: &str, content_type: &str) -> bool {
    let named_pdf = file_name.to_ascii_lowercase().ends_with(".pdf");
    let typed_pdf = matches!(content_type, "" | "application/pdf" | "application/octet-stream");
    named_pdf && typed_pdf
}

async fn read_pdf_field(multipart: &mut Multipart) -> Result<PdfUpload, ClientError> {
    let missing = || ClientError::Validation("请先选择一个 PDF 文件".to_string());
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ClientError::Validation(format!("上传数据无效: {}", e)))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let name = field.file_name().unwrap_or_default().to_string();
        let content_type = field.content_type().unwrap_or_default().to_string();
        if name.is_empty() {
            return Err(missing());
        }
        if !is_pdf(&name, &content_type) {
            return Err(ClientError::Validation("请选择PDF文件".to_string()));
        }
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ClientError::Validation(format!("上传数据无效: {}", e)))?;
        if bytes.is_empty() {
            return Err(missing());
        }
        return Ok(PdfUpload {
            name,
            bytes: bytes.to_vec(),
        });
    }
    Err(missing())
}

/// Upload then analyze, with the loading overlay up for the whole run.
pub async fn upload(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    mut multipart: Multipart,
) -> (CookieJar, Redirect) {
    let (jar, session) = state.sessions.resolve(jar);
    let file = match read_pdf_field(&mut multipart).await {
        Ok(file) => file,
        Err(e) => {
            session.lock().notify(NotificationKind::Error, e.user_message());
            return back_home(jar);
        }
    };

    let (overlay, user_id) = {
        let session = session.lock();
        (session.loading().clone(), session.user_id())
    };
    let _loading = overlay.show();

    let uploaded = match state.api.upload_paper(&file.name, file.bytes, user_id).await {
        Ok(uploaded) => uploaded,
        Err(e) => {
            session.lock().notify(NotificationKind::Error, e.user_message());
            return back_home(jar);
        }
    };
    session
        .lock()
        .notify(NotificationKind::Success, "文件上传成功！开始分析...");

    let analysis = state.api.analyze_paper(uploaded.paper_id).await;
    {
        let mut session = session.lock();
        match analysis {
            Ok(_) => session.notify(NotificationKind::Success, "论文分析完成！"),
            Err(e) => session.notify(NotificationKind::Error, e.user_message()),
        }
    }

    let effect = session.lock().switch_tab(Tab::Papers);
    run_effect(&state, &session, effect).await;
    back_home(jar)
}

// ============================================================================
// Chat
// ============================================================================

#[derive(Deserialize)]
pub struct ChatForm {
    pub question: String,
}

/// Question about the open paper. The thinking placeholder is retracted
/// once the backend answers, fails, or a newer turn takes over.
pub async fn send_chat(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Form(form): Form<ChatForm>,
) -> (CookieJar, Redirect) {
    let (jar, session) = state.sessions.resolve(jar);
    let question = form.question.trim().to_string();

    let (paper_id, user_id, placeholder, turn) = {
        let mut session = session.lock();
        let Some(paper_id) = session.current_paper() else {
            session.notify(NotificationKind::Error, "请先选择一篇论文");
            return back_home(jar);
        };
        if question.is_empty() {
            return back_home(jar);
        }
        let turn = session.begin_chat_turn();
        session.select_section(ViewerSection::Chat);
        session
            .transcript
            .render(&question, Sender::User, false, &state.diagrams);
        let placeholder =
            session
                .transcript
                .render(THINKING_PLACEHOLDER, Sender::Assistant, true, &state.diagrams);
        (paper_id, session.user_id(), placeholder, turn)
    };

    let reply = tokio::select! {
        _ = turn.cancelled() => None,
        reply = state.api.ask(paper_id, &question, user_id) => Some(reply),
    };

    let mut session = session.lock();
    session.transcript.remove(placeholder);
    let content = match reply {
        None => {
            info!(paper_id, "chat turn superseded");
            return back_home(jar);
        }
        Some(Ok(reply)) => reply.answer,
        Some(Err(e)) if e.is_network() => "抱歉，网络错误，请稍后重试。".to_string(),
        Some(Err(e)) => format!("抱歉，回答问题时出现错误: {}", e.user_message()),
    };
    session
        .transcript
        .render(&content, Sender::Assistant, false, &state.diagrams);
    back_home(jar)
}

#[derive(Deserialize)]
pub struct StreamQuery {
    pub input: String,
}

/// Writes one streamed reply into the session's quick-chat transcript and
/// forwards the whole rendered message to the browser after every change.
struct RelaySink {
    session: SessionHandle,
    message: MessageHandle,
    tx: UnboundedSender<Event>,
    turn: CancellationToken,
}

impl RelaySink {
    fn apply(&self, update: impl FnOnce(&mut LiveMessage)) {
        let html = {
            let mut session = self.session.lock();
            session.quick_chat.live_mut(self.message).map(|live| {
                update(live);
                live.to_html()
            })
        };
        let Some(html) = html else {
            // entry is gone (logout); nothing left to write into
            self.turn.cancel();
            return;
        };
        match Event::default().event("update").json_data(html) {
            Ok(event) => {
                if self.tx.send(event).is_err() {
                    // browser went away; stop reading upstream
                    self.turn.cancel();
                }
            }
            Err(e) => warn!(error = %e, "could not encode stream update"),
        }
    }
}

impl StreamSink for RelaySink {
    fn append(&mut self, markdown: &str) {
        self.apply(|live| live.append(markdown));
    }

    fn replace(&mut self, markdown: &str) {
        self.apply(|live| live.replace(markdown));
    }

    fn error(&mut self, message: &str) {
        self.apply(|live| live.error(message));
    }

    fn finish(&mut self) {
        self.apply(|live| live.finish());
    }
}

async fn relay_stream(
    state: Arc<AppState>,
    session: SessionHandle,
    input: String,
    tx: UnboundedSender<Event>,
) -> StreamOutcome {
    let outcome = if input.is_empty() {
        StreamOutcome::Completed
    } else {
        let (turn, message) = {
            let mut session = session.lock();
            let turn = session.begin_chat_turn();
            session
                .quick_chat
                .render(&input, Sender::User, false, &state.diagrams);
            (turn, session.quick_chat.begin_stream())
        };
        let mut relay = RelaySink {
            session: session.clone(),
            message,
            tx: tx.clone(),
            turn: turn.clone(),
        };
        match state.api.stream_log(&state.config.chain, &input).await {
            Ok(body) => read_stream(body, &mut relay, &turn).await,
            Err(e) => {
                relay.error(&format!("请求失败: {}", e.user_message()));
                relay.finish();
                StreamOutcome::Failed
            }
        }
    };

    info!(?outcome, "stream turn ended");
    let name = match outcome {
        StreamOutcome::Cancelled => "cancelled",
        StreamOutcome::Completed | StreamOutcome::Failed => "done",
    };
    let _ = tx.send(Event::default().event(name).data(name));
    outcome
}

pub async fn chat_stream(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Query(query): Query<StreamQuery>,
) -> impl IntoResponse {
    let (jar, session) = state.sessions.resolve(jar);
    let (tx, rx) = unbounded_channel();
    let input = query.input.trim().to_string();
    tokio::spawn(relay_stream(state, session, input, tx));

    let events = UnboundedReceiverStream::new(rx).map(Ok::<_, Infallible>);
    (jar, Sse::new(events).keep_alive(KeepAlive::default()))
}

// ============================================================================
// Users
// ============================================================================

#[derive(Deserialize)]
pub struct CredentialsForm {
    pub username: String,
    pub email: String,
}

fn credentials(form: &CredentialsForm) -> Result<(&str, &str), ClientError> {
    let username = form.username.trim();
    let email = form.email.trim();
    if username.is_empty() || email.is_empty() {
        return Err(ClientError::Validation("请输入用户名和邮箱".to_string()));
    }
    Ok((username, email))
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Form(form): Form<CredentialsForm>,
) -> (CookieJar, Redirect) {
    let (jar, session) = state.sessions.resolve(jar);
    let (username, email) = match credentials(&form) {
        Ok(c) => c,
        Err(e) => {
            session.lock().notify(NotificationKind::Error, e.user_message());
            return back_home(jar);
        }
    };

    let result = state.api.login(username, email).await;
    let effect = {
        let mut session = session.lock();
        match result {
            Ok(user) => {
                let greeting = format!("欢迎回来，{}", user.username);
                session.login(user);
                session.notify(NotificationKind::Success, greeting);
                session.switch_tab(Tab::Papers)
            }
            Err(e) => {
                session.notify(NotificationKind::Error, e.user_message());
                Effect::None
            }
        }
    };
    run_effect(&state, &session, effect).await;
    back_home(jar)
}

pub async fn register(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Form(form): Form<CredentialsForm>,
) -> (CookieJar, Redirect) {
    let (jar, session) = state.sessions.resolve(jar);
    let (username, email) = match credentials(&form) {
        Ok(c) => c,
        Err(e) => {
            session.lock().notify(NotificationKind::Error, e.user_message());
            return back_home(jar);
        }
    };

    let result = state.api.register(username, email).await;
    let mut session = session.lock();
    match result {
        Ok(user) => session.notify(
            NotificationKind::Success,
            format!("注册成功：{}，请登录", user.username),
        ),
        Err(e) => session.notify(NotificationKind::Error, e.user_message()),
    }
    back_home(jar)
}

pub async fn logout(State(state): State<Arc<AppState>>, jar: CookieJar) -> (CookieJar, Redirect) {
    let (jar, session) = state.sessions.resolve(jar);
    session.lock().logout();
    back_home(jar)
}
