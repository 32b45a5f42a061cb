//! Bodies of the four top-level tabs.

use crate::markdown::html_escape;
use crate::models::{Paper, PaperId, UserId};
use crate::papers::{render_paper_grid, render_paper_picker};
use crate::session::{Tab, ViewState, ViewerSection};
use crate::view::{PageView, Slot};

fn tab_wrapper(tab: Tab, view: &ViewState, inner: &str) -> String {
    format!(
        r#"<section id="{name}-tab" class="tab-content{active}">{inner}</section>"#,
        name = tab.as_str(),
        active = if view.is_active(tab) { " active" } else { "" },
        inner = inner,
    )
}

// ============================================================================
// Upload
// ============================================================================

pub fn upload_tab(view: &ViewState) -> String {
    let inner = r#"<h2>上传论文</h2>
    <form method="post" action="/upload" enctype="multipart/form-data" data-loading>
        <label class="upload-area" id="upload-area">
            <span id="upload-hint">点击或拖拽文件到此处</span>
            <input type="file" id="file-input" name="file" accept="application/pdf,.pdf" hidden>
        </label>
        <p><button class="btn" id="upload-btn" type="submit" disabled>上传并分析</button></p>
    </form>
    <script>
    (function() {
        const area = document.getElementById('upload-area');
        const input = document.getElementById('file-input');
        const btn = document.getElementById('upload-btn');
        function picked() {
            const file = input.files[0];
            if (!file) return;
            btn.disabled = false;
            document.getElementById('upload-hint').textContent = '已选择: ' + file.name;
        }
        area.addEventListener('dragover', e => { e.preventDefault(); area.classList.add('dragover'); });
        area.addEventListener('dragleave', () => area.classList.remove('dragover'));
        area.addEventListener('drop', e => {
            e.preventDefault();
            area.classList.remove('dragover');
            if (e.dataTransfer.files.length > 0) { input.files = e.dataTransfer.files; picked(); }
        });
        input.addEventListener('change', picked);
    })();
    </script>"#;
    tab_wrapper(Tab::Upload, view, inner)
}

// ============================================================================
// Paper list
// ============================================================================

pub fn papers_tab(view: &ViewState, papers: &[Paper], user_id: UserId) -> String {
    let inner = format!(
        r#"<h2>我的论文 <a class="btn secondary" id="refresh-papers" href="/tab/papers">刷新</a></h2>
        {grid}"#,
        grid = render_paper_grid(papers, user_id),
    );
    tab_wrapper(Tab::Papers, view, &inner)
}

// ============================================================================
// Chat
// ============================================================================

pub fn chat_tab(view: &ViewState, papers: &[Paper], user_id: UserId, chain: &str, quick_chat_html: &str) -> String {
    let inner = format!(
        r#"<h2>选择论文进行问答</h2>
        {picker}
        <h2>快速对话 <small>({chain})</small></h2>
        <div class="chat-messages" id="res-log">{log}</div>
        <form class="chat-form" id="stream-form">
            <input type="text" id="input-chat" placeholder="输入问题，回车发送" autocomplete="off">
            <button class="btn" type="submit" id="input-send">发送</button>
        </form>
        <script>{stream_js}</script>"#,
        picker = render_paper_picker(papers, user_id),
        chain = html_escape(chain),
        log = quick_chat_html,
        stream_js = STREAM_JS,
    );
    tab_wrapper(Tab::Chat, view, &inner)
}

/// Browser half of the streamed chat: one EventSource per turn. A newer
/// turn closes the older one; the server cancels the upstream read too.
const STREAM_JS: &str = r#"
(function() {
    let current = null;
    const log = document.getElementById('res-log');
    document.getElementById('stream-form').addEventListener('submit', (e) => {
        e.preventDefault();
        const input = document.getElementById('input-chat');
        const text = input.value.trim();
        if (!text) return;
        input.value = '';
        if (current) current.close();

        const self = document.createElement('div');
        self.className = 'message user';
        self.textContent = text;
        log.appendChild(self);
        const reply = document.createElement('div');
        reply.className = 'message assistant';
        reply.innerHTML = '<div class="message-content"></div>';
        log.appendChild(reply);
        const body = reply.querySelector('.message-content');

        const source = new EventSource('/chat/stream?input=' + encodeURIComponent(text));
        current = source;
        source.addEventListener('update', (ev) => {
            body.innerHTML = JSON.parse(ev.data);
            log.scrollTop = log.scrollHeight;
        });
        const stop = () => { source.close(); if (current === source) current = null; };
        source.addEventListener('done', stop);
        source.addEventListener('cancelled', stop);
        source.onerror = () => {
            if (source.readyState !== EventSource.CLOSED) {
                body.insertAdjacentHTML('beforeend', '<span class="error">连接中断</span>');
            }
            stop();
        };
    });
})();
"#;

// ============================================================================
// Viewer
// ============================================================================

fn section_body(section: ViewerSection, page: &PageView, transcript_html: &str) -> String {
    match section {
        ViewerSection::Overview => format!(
            r#"<h3>标题</h3><div id="viewer-title">{}</div>
            <h3>作者</h3><div id="viewer-authors">{}</div>
            <h3>上传时间</h3><div id="viewer-upload-time">{}</div>
            <h3>摘要</h3><div id="viewer-abstract">{}</div>
            <h3>总结</h3><div id="viewer-summary">{}</div>"#,
            page.get(Slot::Title),
            page.get(Slot::Authors),
            page.get(Slot::UploadTime),
            page.get(Slot::Abstract),
            page.get(Slot::Summary),
        ),
        ViewerSection::KeyContent => page.get(Slot::KeyContent).to_string(),
        ViewerSection::Translation => page.get(Slot::Translation).to_string(),
        ViewerSection::Terminology => page.get(Slot::Terminology).to_string(),
        ViewerSection::ResearchContext => page.get(Slot::ResearchContext).to_string(),
        ViewerSection::RelatedPapers => page.get(Slot::RelatedPapers).to_string(),
        ViewerSection::Chat => format!(
            r#"<div class="chat-messages" id="chat-messages">{}</div>
            <form class="chat-form" method="post" action="/chat">
                <input type="text" id="chat-input" name="question" placeholder="针对这篇论文提问..." autocomplete="off" required>
                <button class="btn" id="send-btn" type="submit">发送</button>
            </form>"#,
            transcript_html
        ),
    }
}

/// PDF frame on the left, sub-sections on the right. All sections are in
/// the page; switching only changes which one is marked active.
pub fn viewer_tab(view: &ViewState, paper_id: Option<PaperId>, page: &PageView, transcript_html: &str) -> String {
    let Some(paper_id) = paper_id else {
        return tab_wrapper(Tab::Viewer, view, r#"<div class="empty-state">请先在论文列表中选择一篇论文</div>"#);
    };
    if !page.is_set(Slot::Title) {
        return tab_wrapper(Tab::Viewer, view, r#"<div class="empty-state">论文详情加载失败，请返回列表重试</div>"#);
    }

    let mut buttons = String::new();
    let mut sections = String::new();
    for section in ViewerSection::ALL {
        let active = if view.is_section_active(section) { " active" } else { "" };
        buttons.push_str(&format!(
            r#"<a class="viewer-tab-btn{active}" data-target="{name}" href="/papers/{id}/section/{name}">{label}</a>"#,
            active = active,
            name = section.as_str(),
            id = paper_id,
            label = section.label(),
        ));
        sections.push_str(&format!(
            r#"<div class="viewer-section{active}" data-section="{name}">{body}</div>"#,
            active = active,
            name = section.as_str(),
            body = section_body(section, page, transcript_html),
        ));
    }

    let inner = format!(
        r#"<div class="viewer-layout">
            <iframe id="pdf-frame" src="{pdf}" title="PDF"></iframe>
            <div class="viewer-panel">
                <nav class="viewer-tabs">{buttons}</nav>
                {sections}
            </div>
        </div>"#,
        pdf = html_escape(page.get(Slot::PdfSource)),
        buttons = buttons,
        sections = sections,
    );
    tab_wrapper(Tab::Viewer, view, &inner)
}
