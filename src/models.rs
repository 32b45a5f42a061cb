//! Data models shared by the API client, session and renderers.
//!
//! Everything here mirrors the JSON the backend sends or expects. The client
//! never mutates papers; it only holds the latest snapshot it fetched.

use serde::{Deserialize, Serialize};
use std::fmt;

pub type PaperId = i64;
pub type UserId = i64;

// ============================================================================
// Papers
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Paper {
    pub id: PaperId,
    #[serde(default)]
    pub user_id: UserId,
    /// Stored name on the backend (uuid-prefixed); used for the PDF frame.
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub original_filename: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub authors: Option<String>,
    #[serde(default, rename = "abstract")]
    pub abstract_text: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub key_content: Option<String>,
    #[serde(default)]
    pub translation: Option<String>,
    #[serde(default)]
    pub terminology: Option<String>,
    #[serde(default)]
    pub research_context: Option<String>,
    #[serde(default)]
    pub processing_status: ProcessingStatus,
    /// Raw timestamp as sent by the backend (RFC 3339 or naive ISO 8601).
    #[serde(default)]
    pub upload_time: Option<String>,
    #[serde(default)]
    pub related_papers_json: Option<String>,
}

impl Paper {
    /// Title if the analysis extracted one, else the uploaded file name.
    pub fn display_title(&self) -> &str {
        match self.title.as_deref() {
            Some(t) if !t.trim().is_empty() => t,
            _ => &self.original_filename,
        }
    }
}

/// Lifecycle stage of backend analysis. Unknown values are kept verbatim;
/// a null status reads as `Uploaded`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Option<String>", into = "String")]
pub enum ProcessingStatus {
    Uploaded,
    Processing,
    Completed,
    Failed,
    Other(String),
}

impl Default for ProcessingStatus {
    fn default() -> Self {
        ProcessingStatus::Uploaded
    }
}

impl ProcessingStatus {
    pub fn as_str(&self) -> &str {
        match self {
            ProcessingStatus::Uploaded => "uploaded",
            ProcessingStatus::Processing => "processing",
            ProcessingStatus::Completed => "completed",
            ProcessingStatus::Failed => "failed",
            ProcessingStatus::Other(s) => s,
        }
    }
}

impl From<String> for ProcessingStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "uploaded" => ProcessingStatus::Uploaded,
            "processing" => ProcessingStatus::Processing,
            "completed" => ProcessingStatus::Completed,
            "failed" => ProcessingStatus::Failed,
            _ => ProcessingStatus::Other(s),
        }
    }
}

impl From<Option<String>> for ProcessingStatus {
    fn from(s: Option<String>) -> Self {
        s.map(ProcessingStatus::from).unwrap_or_default()
    }
}

impl From<ProcessingStatus> for String {
    fn from(s: ProcessingStatus) -> Self {
        s.as_str().to_string()
    }
}

impl fmt::Display for ProcessingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct UploadResponse {
    pub paper_id: PaperId,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Body of a successful `POST /api/papers/{id}/analyze`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AnalysisResult {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub paper: Option<Paper>,
}

// ============================================================================
// Related Papers (Semantic Scholar data attached by the backend)
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RelatedPapers {
    #[serde(default)]
    pub citations: Option<Vec<RelatedPaper>>,
    #[serde(default)]
    pub references: Option<Vec<RelatedPaper>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelatedPaper {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub publication_date: Option<String>,
    #[serde(default)]
    pub citation_count: Option<u64>,
}

// ============================================================================
// Users
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub id: UserId,
    pub username: String,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub email: String,
}

// ============================================================================
// Chat
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Assistant,
}

impl Sender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sender::User => "user",
            Sender::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatMessage {
    pub sender: Sender,
    pub content: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct QuestionRequest<'a> {
    pub question: &'a str,
    pub user_id: UserId,
}

/// Body of a successful `POST /api/papers/{id}/chat`.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatReply {
    pub answer: String,
    #[serde(default)]
    pub id: Option<i64>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ChatHistoryEntry {
    pub question: String,
    pub answer: String,
    #[serde(default)]
    pub timestamp: Option<String>,
}

impl ChatHistoryEntry {
    /// The stored question and answer as transcript messages, in order.
    pub fn messages(&self) -> [ChatMessage; 2] {
        [
            ChatMessage {
                sender: Sender::User,
                content: self.question.clone(),
            },
            ChatMessage {
                sender: Sender::Assistant,
                content: self.answer.clone(),
            },
        ]
    }
}

/// Assistant answer carrying an optional diagram, serialized as JSON inside
/// the `answer` string.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StructuredAnswer {
    #[serde(default)]
    pub answer: Option<String>,
    #[serde(default)]
    pub diagram: Option<Diagram>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Diagram {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub title: Option<String>,
}

// ============================================================================
// Streaming chain (stream_log)
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct StreamLogRequest {
    pub input: StreamLogInput,
    pub config: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StreamLogInput {
    pub input: String,
}

impl StreamLogRequest {
    pub fn new(input: impl Into<String>) -> Self {
        Self {
            input: StreamLogInput { input: input.into() },
            config: serde_json::Map::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StreamPayload {
    #[serde(default)]
    pub ops: Vec<StreamOp>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StreamOp {
    #[serde(default)]
    pub op: Option<String>,
    pub path: String,
    #[serde(default)]
    pub value: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paper_deserializes_backend_shape() {
        let json = r#"{
            "id": 3, "filename": "abc_paper.pdf", "original_filename": "paper.pdf",
            "file_path": "/data/uploads/abc_paper.pdf", "upload_time": "2024-05-01T12:30:00.123456",
            "user_id": 1, "title": "Attention", "authors": null, "abstract": "We propose...",
            "summary": null, "key_content": null, "translation": null, "terminology": null,
            "research_context": null, "processing_status": "completed"
        }"#;
        let paper: Paper = serde_json::from_str(json).unwrap();
        assert_eq!(paper.id, 3);
        assert_eq!(paper.abstract_text.as_deref(), Some("We propose..."));
        assert_eq!(paper.processing_status, ProcessingStatus::Completed);
        assert!(paper.related_papers_json.is_none());
    }

    #[test]
    fn unknown_status_is_preserved() {
        let status: ProcessingStatus = serde_json::from_str(r#""queued""#).unwrap();
        assert_eq!(status, ProcessingStatus::Other("queued".into()));
        assert_eq!(serde_json::to_string(&status).unwrap(), r#""queued""#);
    }

    #[test]
    fn display_title_falls_back_to_filename() {
        let paper = Paper {
            original_filename: "draft.pdf".into(),
            title: Some("   ".into()),
            ..Default::default()
        };
        assert_eq!(paper.display_title(), "draft.pdf");
    }

    #[test]
    fn stream_log_request_shape() {
        let body = serde_json::to_value(StreamLogRequest::new("hi")).unwrap();
        assert_eq!(body, serde_json::json!({"input": {"input": "hi"}, "config": {}}));
    }
}
