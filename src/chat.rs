//! Chat transcript rendering.
//!
//! The transcript is an ordered list of entries. Each `render` call appends
//! one and returns a handle so a transient entry (the "thinking" placeholder)
//! can be retracted once the real reply arrives.

use crate::diagram::{is_supported, render_panel, DiagramRenderer};
use crate::markdown::{html_escape, render_markdown};
use crate::models::{ChatHistoryEntry, Sender, StructuredAnswer};
use crate::sse::StreamSink;

pub const THINKING_PLACEHOLDER: &str = "正在思考中...";

const TOOLBAR_HTML: &str = r#"<div class="tool-bar">
    <span class="iconfont icon-fuzhi" title="复制"></span>
    <span class="iconfont icon-shuaxin" title="重新生成"></span>
    <span class="iconfont icon-cai" title="反馈"></span>
</div>"#;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageHandle(u64);

#[derive(Debug, Clone)]
enum Body {
    /// Finished markup.
    Html(String),
    /// Assistant reply still being streamed.
    Live(LiveMessage),
}

#[derive(Debug, Clone)]
struct Entry {
    handle: MessageHandle,
    sender: Sender,
    loading: bool,
    body: Body,
}

#[derive(Debug, Clone, Default)]
pub struct Transcript {
    entries: Vec<Entry>,
    next_id: u64,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    fn push(&mut self, sender: Sender, loading: bool, body: Body) -> MessageHandle {
        let handle = MessageHandle(self.next_id);
        self.next_id += 1;
        self.entries.push(Entry {
            handle,
            sender,
            loading,
            body,
        });
        handle
    }

    /// Appends one message. Assistant replies that carry a Mermaid diagram
    /// get a diagram panel; everything else is formatted text.
    pub fn render(
        &mut self,
        content: &str,
        sender: Sender,
        is_loading: bool,
        diagrams: &dyn DiagramRenderer,
    ) -> MessageHandle {
        let html = if sender == Sender::Assistant && !is_loading {
            render_assistant(content, diagrams)
        } else {
            render_markdown(content)
        };
        self.push(sender, is_loading, Body::Html(html))
    }

    /// Removes an entry; returns false if it was already gone.
    pub fn remove(&mut self, handle: MessageHandle) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.handle != handle);
        self.entries.len() != before
    }

    /// Replaces the transcript with a paper's stored history. An empty
    /// history leaves the transcript alone so a turn in progress survives
    /// a reload of the same paper.
    pub fn load_history(&mut self, history: &[ChatHistoryEntry], diagrams: &dyn DiagramRenderer) {
        if history.is_empty() {
            return;
        }
        self.clear();
        for message in history.iter().flat_map(ChatHistoryEntry::messages) {
            self.render(&message.content, message.sender, false, diagrams);
        }
    }

    /// Starts an empty assistant entry that a stream writes into.
    pub fn begin_stream(&mut self) -> MessageHandle {
        self.push(Sender::Assistant, false, Body::Live(LiveMessage::default()))
    }

    pub fn live_mut(&mut self, handle: MessageHandle) -> Option<&mut LiveMessage> {
        self.entries.iter_mut().find(|e| e.handle == handle).and_then(|e| match &mut e.body {
            Body::Live(live) => Some(live),
            Body::Html(_) => None,
        })
    }

    pub fn to_html(&self) -> String {
        let mut html = String::new();
        for entry in &self.entries {
            let body = match &entry.body {
                Body::Html(h) => h.clone(),
                Body::Live(live) => live.to_html(),
            };
            html.push_str(&format!(
                r#"<div class="message {sender}{loading}" data-message-id="{id}"><div class="message-content">{body}</div></div>"#,
                sender = entry.sender.as_str(),
                loading = if entry.loading { " loading" } else { "" },
                id = entry.handle.0,
                body = body,
            ));
        }
        html
    }
}

/// Assistant content is tried as structured JSON first; plain text (or JSON
/// without a usable diagram) falls back to markdown of the answer.
pub fn render_assistant(content: &str, diagrams: &dyn DiagramRenderer) -> String {
    let parsed = match serde_json::from_str::<serde_json::Value>(content) {
        Ok(value) if value.is_object() => serde_json::from_value::<StructuredAnswer>(value).ok(),
        _ => None,
    };
    let Some(structured) = parsed else {
        return render_markdown(content);
    };

    let answer = structured.answer.as_deref().filter(|a| !a.trim().is_empty());
    match structured.diagram.as_ref().filter(|d| is_supported(d)) {
        Some(diagram) => {
            let mut html = answer.map(render_markdown).unwrap_or_default();
            html.push_str(&render_panel(diagram, diagrams));
            html
        }
        None => render_markdown(answer.unwrap_or(content)),
    }
}

// ============================================================================
// Streamed assistant message
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
enum Fragment {
    Markdown(String),
    Error(String),
}

/// An assistant message fed by the SSE reader. Markdown is append-only until
/// a final replace; errors show inline where they happened.
#[derive(Debug, Clone, Default)]
pub struct LiveMessage {
    fragments: Vec<Fragment>,
    finished: bool,
}

impl LiveMessage {
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Markdown source received so far, without error fragments.
    pub fn text(&self) -> String {
        self.fragments
            .iter()
            .filter_map(|f| match f {
                Fragment::Markdown(md) => Some(md.as_str()),
                Fragment::Error(_) => None,
            })
            .collect()
    }

    pub fn to_html(&self) -> String {
        let mut html = String::new();
        for fragment in &self.fragments {
            match fragment {
                Fragment::Markdown(md) => html.push_str(&render_markdown(md)),
                Fragment::Error(msg) => {
                    html.push_str(&format!(r#"<span class="error">{}</span>"#, html_escape(msg)))
                }
            }
        }
        if self.finished {
            html.push_str(TOOLBAR_HTML);
        }
        html
    }
}

impl StreamSink for LiveMessage {
    fn append(&mut self, markdown: &str) {
        match self.fragments.last_mut() {
            Some(Fragment::Markdown(md)) => md.push_str(markdown),
            _ => self.fragments.push(Fragment::Markdown(markdown.to_string())),
        }
    }

    fn replace(&mut self, markdown: &str) {
        self.fragments = vec![Fragment::Markdown(markdown.to_string())];
    }

    fn error(&mut self, message: &str) {
        self.fragments.push(Fragment::Error(message.to_string()));
    }

    fn finish(&mut self) {
        self.finished = true;
    }
}
