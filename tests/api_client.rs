//! Client and handler tests against an in-process mock backend.

use axum::{
    body::Body,
    extract::{FromRequest, Multipart, Path, Query, State},
    http::{header, Request, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use axum_extra::extract::CookieJar;
use chrono::Utc;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use url::Url;

use paperdesk::handlers;
use paperdesk::{
    read_stream, ApiClient, AppState, ClientError, Config, LiveMessage, NotificationKind,
    SessionHandle, StreamOutcome, Tab,
};

async fn spawn_backend(app: Router) -> Url {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    Url::parse(&format!("http://{}", addr)).unwrap()
}

fn config(base: Url) -> Config {
    Config {
        api_base: base,
        ..Config::default()
    }
}

fn paper_json(id: i64, user_id: i64, title: &str) -> Value {
    json!({
        "id": id,
        "user_id": user_id,
        "filename": format!("{}_{}.pdf", id, title),
        "original_filename": format!("{}.pdf", title),
        "title": title,
        "processing_status": "completed",
        "upload_time": "2024-03-01T08:30:00"
    })
}

async fn list_papers(Query(q): Query<HashMap<String, String>>) -> Json<Value> {
    let user_id: i64 = q.get("user_id").and_then(|u| u.parse().ok()).unwrap_or(0);
    Json(json!([paper_json(1, user_id, "Attention"), paper_json(2, user_id, "ResNet")]))
}

async fn get_paper(Path(id): Path<i64>) -> impl IntoResponse {
    if id == 404 {
        return (StatusCode::NOT_FOUND, Json(json!({"detail": "论文不存在"}))).into_response();
    }
    Json(paper_json(id, 1, "Attention")).into_response()
}

async fn chat_history(Path(_id): Path<i64>) -> Json<Value> {
    Json(json!([{"question": "what is it?", "answer": "a **transformer** paper", "timestamp": null}]))
}

async fn ask(Path(_id): Path<i64>, Json(body): Json<Value>) -> impl IntoResponse {
    if body["question"] == "boom" {
        return (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({"error": "模型超时"}))).into_response();
    }
    Json(json!({"answer": format!("echo: {}", body["question"].as_str().unwrap_or("")), "id": 3}))
        .into_response()
}

async fn upload(mut multipart: Multipart) -> impl IntoResponse {
    let mut file_name = None;
    let mut user_id = None;
    while let Some(field) = multipart.next_field().await.unwrap() {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") => {
                assert_eq!(field.content_type(), Some("application/pdf"));
                file_name = field.file_name().map(str::to_string);
                assert!(!field.bytes().await.unwrap().is_empty());
            }
            Some("user_id") => user_id = Some(field.text().await.unwrap()),
            _ => {}
        }
    }
    assert_eq!(user_id.as_deref(), Some("1"));
    match file_name.as_deref() {
        Some("dup.pdf") => {
            (StatusCode::BAD_REQUEST, Json(json!({"error": "文件已存在"}))).into_response()
        }
        Some("broken.pdf") => Json(json!({"paper_id": 13, "filename": file_name})).into_response(),
        _ => Json(json!({"paper_id": 9, "filename": file_name, "message": "ok"})).into_response(),
    }
}

async fn analyze(Path(id): Path<i64>) -> impl IntoResponse {
    if id == 13 {
        return (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({"error": "模型不可用"}))).into_response();
    }
    Json(json!({"message": "分析完成", "paper": paper_json(id, 1, "Attention")})).into_response()
}

async fn stream_log(Path(chain): Path<String>, Json(body): Json<Value>) -> impl IntoResponse {
    if chain != "summarize" {
        return (StatusCode::NOT_FOUND, Json(json!({"detail": "Not Found"}))).into_response();
    }
    assert_eq!(body["input"]["input"], "hi");
    let sse = concat!(
        "event: data\n",
        "data: {\"ops\":[{\"op\":\"add\",\"path\":\"/streamed_output_str/-\",\"value\":\"Hel\"}]}\n\n",
        "event: data\r\n",
        "data: {\"ops\":[{\"op\":\"add\",\"path\":\"/streamed_output_str/-\",\"value\":\"lo\"}]}\r\n\r\n",
        "event: end\n\n",
    );
    ([(header::CONTENT_TYPE, "text/event-stream")], sse).into_response()
}

fn backend() -> Router {
    Router::new()
        .route("/api/papers", get(list_papers))
        .route("/api/papers/upload", post(upload))
        .route("/api/papers/{id}", get(get_paper))
        .route("/api/papers/{id}/analyze", post(analyze))
        .route("/api/papers/{id}/chat", post(ask))
        .route("/api/papers/{id}/chat/history", get(chat_history))
        .route("/chain/{chain}/stream_log", post(stream_log))
}

async fn client() -> ApiClient {
    let base = spawn_backend(backend()).await;
    ApiClient::new(&config(base)).unwrap()
}

// ============================================================================
// Client
// ============================================================================

#[tokio::test]
async fn lists_papers_for_user() {
    let api = client().await;
    let papers = api.list_papers(7).await.unwrap();
    assert_eq!(papers.len(), 2);
    assert!(papers.iter().all(|p| p.user_id == 7));
    assert_eq!(papers[0].display_title(), "Attention");
}

#[tokio::test]
async fn uploads_pdf_as_multipart() {
    let api = client().await;
    let uploaded = api.upload_paper("a.pdf", b"%PDF-1.4".to_vec(), 1).await.unwrap();
    assert_eq!(uploaded.paper_id, 9);
    assert_eq!(uploaded.filename.as_deref(), Some("a.pdf"));
}

#[tokio::test]
async fn backend_error_text_is_kept() {
    let api = client().await;
    match api.ask(1, "boom", 1).await {
        Err(ClientError::Backend { status, message }) => {
            assert_eq!(status, 500);
            assert_eq!(message, "模型超时");
        }
        other => panic!("expected backend error, got {:?}", other.map(|r| r.answer)),
    }

    let missing = api.get_paper(404).await.unwrap_err();
    assert_eq!(missing.user_message(), "论文不存在");
}

#[tokio::test]
async fn refused_connection_is_a_network_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let api = ApiClient::new(&config(Url::parse(&format!("http://{}", addr)).unwrap())).unwrap();
    let err = api.list_papers(1).await.unwrap_err();
    assert!(err.is_network());
    assert_eq!(err.user_message(), "网络错误，请稍后重试");
}

#[tokio::test]
async fn stream_log_feeds_live_message() {
    let api = client().await;
    let body = api.stream_log("summarize", "hi").await.unwrap();
    let mut live = LiveMessage::default();
    let outcome = read_stream(body, &mut live, &CancellationToken::new()).await;
    assert_eq!(outcome, StreamOutcome::Completed);
    assert_eq!(live.text(), "Hello");
    assert!(live.is_finished());
}

#[tokio::test]
async fn stream_log_rejects_unknown_chain() {
    let api = client().await;
    let err = api.stream_log("missing", "hi").await.err().unwrap();
    assert!(matches!(err, ClientError::Backend { status: 404, .. }));
}

// ============================================================================
// Handlers
// ============================================================================

async fn app_state() -> Arc<AppState> {
    let base = spawn_backend(backend()).await;
    AppState::shared(config(base)).unwrap()
}

fn browser(state: &AppState) -> (CookieJar, SessionHandle) {
    state.sessions.resolve(CookieJar::new())
}

async fn pdf_form(file_name: &str) -> Multipart {
    let boundary = "paperdesk-test-boundary";
    let body = format!(
        "--{b}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{f}\"\r\n\
         Content-Type: application/pdf\r\n\r\n%PDF-1.4\r\n--{b}--\r\n",
        b = boundary,
        f = file_name,
    );
    let request = Request::builder()
        .method("POST")
        .uri("/upload")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", boundary),
        )
        .body(Body::from(body))
        .unwrap();
    Multipart::from_request(request, &()).await.unwrap()
}

#[tokio::test]
async fn opening_a_paper_loads_detail_and_history() {
    let state = app_state().await;
    let (jar, session) = browser(&state);
    handlers::open_paper(State(state.clone()), jar, Path(1)).await;

    {
        let session = session.lock();
        assert_eq!(session.current_paper(), Some(1));
        assert_eq!(session.detail().map(|p| p.id), Some(1));
        assert_eq!(session.transcript.len(), 2);
    }

    let html = handlers::render_page(&state, &session);
    assert!(html.contains("<strong>transformer</strong>"));
    assert!(html.contains("2024-03-01 08:30:00"));
    assert!(html.contains("/uploads/1_Attention.pdf"));
}

#[tokio::test]
async fn failed_detail_load_notifies() {
    let state = app_state().await;
    let (jar, session) = browser(&state);
    handlers::open_paper(State(state.clone()), jar, Path(404)).await;

    let mut session = session.lock();
    assert!(session.detail().is_none());
    let note = session.notification_at(Utc::now()).cloned().unwrap();
    assert_eq!(note.kind, NotificationKind::Error);
}

#[tokio::test]
async fn chat_turn_replaces_placeholder_with_answer() {
    let state = app_state().await;
    let (jar, session) = browser(&state);
    handlers::open_paper(State(state.clone()), jar.clone(), Path(1)).await;
    handlers::send_chat(
        State(state.clone()),
        jar,
        axum::Form(handlers::ChatForm { question: "why?".into() }),
    )
    .await;

    let html = session.lock().transcript.to_html();
    assert!(html.contains("echo: why?"));
    assert!(!html.contains("正在思考中..."));
}

#[tokio::test]
async fn failed_chat_turn_shows_error_reply() {
    let state = app_state().await;
    let (jar, session) = browser(&state);
    handlers::open_paper(State(state.clone()), jar.clone(), Path(1)).await;
    handlers::send_chat(
        State(state.clone()),
        jar,
        axum::Form(handlers::ChatForm { question: "boom".into() }),
    )
    .await;

    let html = session.lock().transcript.to_html();
    assert!(html.contains("抱歉，回答问题时出现错误: 模型超时"));
}

#[tokio::test]
async fn papers_tab_refreshes_list() {
    let state = app_state().await;
    let (jar, session) = browser(&state);
    handlers::switch_tab(State(state.clone()), jar, Path("papers".to_string())).await;
    assert_eq!(session.lock().papers().len(), 2);
}

#[tokio::test]
async fn sessions_follow_the_cookie() {
    let state = app_state().await;
    let (alice_jar, alice) = browser(&state);
    let (bob_jar, bob) = browser(&state);

    handlers::open_paper(State(state.clone()), alice_jar.clone(), Path(1)).await;
    handlers::switch_tab(State(state.clone()), bob_jar, Path("papers".to_string())).await;

    assert_eq!(alice.lock().current_paper(), Some(1));
    assert!(bob.lock().current_paper().is_none());
    assert!(handlers::render_page(&state, &alice).contains(r#"id="viewer-tab" class="tab-content active""#));
    assert!(handlers::render_page(&state, &bob).contains(r#"id="papers-tab" class="tab-content active""#));

    // the same cookie finds the same session again
    let (_, again) = state.sessions.resolve(alice_jar);
    assert_eq!(again.lock().current_paper(), Some(1));
    assert_eq!(state.sessions.len(), 2);
}

#[tokio::test]
async fn upload_analyzes_and_shows_paper_list() {
    let state = app_state().await;
    let (jar, session) = browser(&state);
    handlers::upload(State(state.clone()), jar, pdf_form("a.pdf").await).await;

    let mut session = session.lock();
    let note = session.notification_at(Utc::now()).cloned().unwrap();
    assert_eq!(note.kind, NotificationKind::Success);
    assert_eq!(note.message, "论文分析完成！");
    assert!(!session.loading().is_visible());
    assert_eq!(session.view().tab(), Tab::Papers);
    assert_eq!(session.papers().len(), 2);
}

#[tokio::test]
async fn rejected_upload_releases_overlay() {
    let state = app_state().await;
    let (jar, session) = browser(&state);
    handlers::upload(State(state.clone()), jar, pdf_form("dup.pdf").await).await;

    let mut session = session.lock();
    let note = session.notification_at(Utc::now()).cloned().unwrap();
    assert_eq!(note.kind, NotificationKind::Error);
    assert_eq!(note.message, "文件已存在");
    assert!(!session.loading().is_visible());
    assert_eq!(session.view().tab(), Tab::Upload);
}

#[tokio::test]
async fn failed_analysis_still_lands_on_paper_list() {
    let state = app_state().await;
    let (jar, session) = browser(&state);
    handlers::upload(State(state.clone()), jar, pdf_form("broken.pdf").await).await;

    let mut session = session.lock();
    let note = session.notification_at(Utc::now()).cloned().unwrap();
    assert_eq!(note.kind, NotificationKind::Error);
    assert_eq!(note.message, "模型不可用");
    assert!(!session.loading().is_visible());
    assert_eq!(session.view().tab(), Tab::Papers);
    assert_eq!(session.papers().len(), 2);
}

#[tokio::test]
async fn chat_stream_relays_updates_into_quick_chat() {
    let state = app_state().await;
    let (jar, session) = browser(&state);
    let response = handlers::chat_stream(
        State(state.clone()),
        jar,
        Query(handlers::StreamQuery { input: "hi".into() }),
    )
    .await
    .into_response();
    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = String::from_utf8(body.to_vec()).unwrap();
    assert!(body.contains("event: update"));
    assert!(body.contains("Hello"));
    assert!(body.trim_end().ends_with("data: done"));
    assert!(!body.contains("event: cancelled"));

    let html = session.lock().quick_chat.to_html();
    assert!(html.contains(r#"<div class="message user""#));
    assert!(html.contains("<p>Hello</p>"));
    assert!(html.contains("tool-bar"));
}

#[tokio::test]
async fn chat_stream_failure_is_shown_inline() {
    let state = AppState::shared(Config {
        chain: "missing".into(),
        ..config(spawn_backend(backend()).await)
    })
    .unwrap();
    let (jar, session) = browser(&state);
    let response = handlers::chat_stream(
        State(state.clone()),
        jar,
        Query(handlers::StreamQuery { input: "hi".into() }),
    )
    .await
    .into_response();

    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = String::from_utf8(body.to_vec()).unwrap();
    assert!(body.contains("event: done"));
    assert!(session.lock().quick_chat.to_html().contains(r#"class="error""#));
}
