//! CSS styles for the paper desk front end.

// ============================================================================
// CSS Styles
// ============================================================================

pub const STYLE: &str = r#"
:root {
    --bg: #f6f7fb;
    --panel: #ffffff;
    --text: #1f2933;
    --muted: #6b7280;
    --border: #e3e6ee;
    --accent: #3b6cf6;
    --accent-soft: #e8eefe;
    --success: #1f9d55;
    --warning: #d97706;
    --error: #dc2626;
}

* { box-sizing: border-box; }

body {
    margin: 0;
    font-family: -apple-system, BlinkMacSystemFont, "PingFang SC", "Microsoft YaHei", sans-serif;
    background: var(--bg);
    color: var(--text);
    line-height: 1.6;
}

/* Navigation */
.nav-bar {
    display: flex;
    align-items: center;
    gap: 4px;
    padding: 10px 24px;
    background: var(--panel);
    border-bottom: 1px solid var(--border);
}
.nav-bar .brand { font-weight: 700; margin-right: 20px; }
.nav-btn {
    padding: 6px 14px;
    border-radius: 6px;
    color: var(--muted);
    text-decoration: none;
}
.nav-btn.active { background: var(--accent-soft); color: var(--accent); font-weight: 600; }
.nav-bar .spacer { flex: 1; }
.user-box { display: flex; gap: 6px; align-items: center; font-size: 14px; }
.user-box input { width: 120px; padding: 4px 6px; border: 1px solid var(--border); border-radius: 4px; }

.container { max-width: 1200px; margin: 24px auto; padding: 0 24px; }
.tab-content { display: none; }
.tab-content.active { display: block; }

.btn {
    display: inline-block;
    padding: 8px 16px;
    border: none;
    border-radius: 6px;
    background: var(--accent);
    color: #fff;
    cursor: pointer;
    text-decoration: none;
    font-size: 14px;
}
.btn.secondary { background: var(--border); color: var(--text); }
.btn:disabled { opacity: .5; cursor: not-allowed; }

/* Upload */
.upload-area {
    border: 2px dashed var(--border);
    border-radius: 12px;
    padding: 48px;
    text-align: center;
    background: var(--panel);
}
.upload-area.dragover { border-color: var(--accent); background: var(--accent-soft); }

/* Paper list */
.papers-grid { display: grid; grid-template-columns: repeat(auto-fill, minmax(260px, 1fr)); gap: 16px; }
.paper-card {
    display: block;
    padding: 16px;
    background: var(--panel);
    border: 1px solid var(--border);
    border-radius: 10px;
    color: inherit;
    text-decoration: none;
}
.paper-card:hover { border-color: var(--accent); }
.paper-title { font-weight: 600; margin-bottom: 6px; }
.paper-meta { color: var(--muted); font-size: 13px; }
.paper-status { display: inline-block; margin-top: 8px; padding: 2px 8px; border-radius: 10px; font-size: 12px; background: var(--border); }
.status-completed { background: #dcfce7; color: var(--success); }
.status-processing { background: #fef3c7; color: var(--warning); }
.status-failed { background: #fee2e2; color: var(--error); }
.empty-state { padding: 48px; text-align: center; color: var(--muted); }
.paper-picker li { margin: 6px 0; }

/* Viewer */
.viewer-layout { display: grid; grid-template-columns: 1fr 1fr; gap: 16px; height: calc(100vh - 140px); }
.viewer-layout iframe { width: 100%; height: 100%; border: 1px solid var(--border); border-radius: 8px; background: #fff; }
.viewer-panel { display: flex; flex-direction: column; background: var(--panel); border: 1px solid var(--border); border-radius: 8px; overflow: hidden; }
.viewer-tabs { display: flex; flex-wrap: wrap; border-bottom: 1px solid var(--border); }
.viewer-tab-btn { padding: 8px 12px; color: var(--muted); text-decoration: none; font-size: 14px; }
.viewer-tab-btn.active { color: var(--accent); border-bottom: 2px solid var(--accent); }
.viewer-section { display: none; padding: 16px; overflow-y: auto; flex: 1; }
.viewer-section.active { display: block; }
.viewer-section h3 { margin-top: 0; }
.related-list { padding-left: 18px; }
.related-meta { color: var(--muted); font-size: 13px; }
.related-empty { color: var(--muted); }

/* Chat */
.chat-messages { display: flex; flex-direction: column; gap: 10px; max-height: 60vh; overflow-y: auto; padding: 8px 0; }
.message { max-width: 85%; padding: 8px 12px; border-radius: 10px; }
.message.user { align-self: flex-end; background: var(--accent); color: #fff; }
.message.assistant { align-self: flex-start; background: var(--bg); border: 1px solid var(--border); }
.message.loading { color: var(--muted); font-style: italic; }
.message-content p:first-child { margin-top: 0; }
.message-content p:last-child { margin-bottom: 0; }
.chat-form { display: flex; gap: 8px; margin-top: 12px; }
.chat-form input[type=text] { flex: 1; padding: 8px 10px; border: 1px solid var(--border); border-radius: 6px; }
.tool-bar { display: flex; gap: 10px; margin-top: 6px; color: var(--muted); font-size: 13px; }
.error { color: var(--error); }

/* Diagrams */
.diagram-panel { margin-top: 10px; border: 1px solid var(--border); border-radius: 8px; background: #fff; }
.diagram-header { display: flex; justify-content: space-between; align-items: center; padding: 6px 10px; border-bottom: 1px solid var(--border); }
.diagram-title { font-weight: 600; }
.diagram-actions button { margin-left: 6px; font-size: 12px; padding: 2px 8px; border: 1px solid var(--border); border-radius: 4px; background: var(--panel); cursor: pointer; }
.diagram-body { padding: 10px; overflow-x: auto; }
.diagram-error { color: var(--error); font-size: 13px; }

/* Notification + loading */
.notification {
    position: fixed;
    top: 16px;
    right: 16px;
    min-width: 240px;
    padding: 12px 36px 12px 16px;
    border-radius: 8px;
    color: #fff;
    background: var(--accent);
    box-shadow: 0 4px 16px rgba(0,0,0,.15);
    display: none;
}
.notification.show { display: block; }
.notification.success { background: var(--success); }
.notification.error { background: var(--error); }
.notification button { position: absolute; top: 6px; right: 8px; background: none; border: none; color: #fff; font-size: 18px; cursor: pointer; }
.loading {
    position: fixed;
    inset: 0;
    background: rgba(255,255,255,.7);
    display: none;
    align-items: center;
    justify-content: center;
    flex-direction: column;
    gap: 12px;
}
.loading.show { display: flex; }
.spinner { width: 36px; height: 36px; border: 4px solid var(--border); border-top-color: var(--accent); border-radius: 50%; animation: spin 1s linear infinite; }
@keyframes spin { to { transform: rotate(360deg); } }
"#;
