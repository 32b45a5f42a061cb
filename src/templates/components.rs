//! Shared HTML components: navigation tabs, notification banner, loading
//! overlay and the base page.

use crate::diagram::diagram_script;
use crate::markdown::html_escape;
use crate::models::User;
use crate::session::{Notification, Tab, ViewState};

use super::styles::STYLE;

const MERMAID_CDN: &str = "https://cdn.jsdelivr.net/npm/mermaid@10/dist/mermaid.min.js";

// ============================================================================
// Navigation Bar
// ============================================================================

pub fn nav_bar(view: &ViewState, user: Option<&User>) -> String {
    let mut tabs = String::new();
    for tab in Tab::ALL {
        // the viewer is entered by opening a paper, not from the nav
        if tab == Tab::Viewer && !view.is_active(Tab::Viewer) {
            continue;
        }
        tabs.push_str(&format!(
            r#"<a class="nav-btn{active}" data-tab="{name}" href="/tab/{name}">{label}</a>"#,
            active = if view.is_active(tab) { " active" } else { "" },
            name = tab.as_str(),
            label = tab.label(),
        ));
    }

    let user_box = match user {
        Some(u) => format!(
            r#"<span>{}</span>
            <form method="post" action="/logout"><button class="btn secondary" type="submit">退出</button></form>"#,
            html_escape(&u.username)
        ),
        None => r#"<form method="post" action="/login" class="user-box">
                <input type="text" name="username" placeholder="用户名" required>
                <input type="email" name="email" placeholder="邮箱" required>
                <button class="btn" type="submit">登录</button>
                <button class="btn secondary" type="submit" formaction="/register">注册</button>
            </form>"#
            .to_string(),
    };

    format!(
        r#"<nav class="nav-bar">
            <span class="brand">论文阅读助手</span>
            {tabs}
            <span class="spacer"></span>
            <div class="user-box">{user_box}</div>
        </nav>"#,
        tabs = tabs,
        user_box = user_box,
    )
}

// ============================================================================
// Notification + Loading
// ============================================================================

pub fn notification_html(notification: Option<&Notification>) -> String {
    let (class, text) = match notification {
        Some(n) => (format!("notification {} show", n.kind.as_str()), html_escape(&n.message)),
        None => ("notification".to_string(), String::new()),
    };
    format!(
        r#"<div id="notification" class="{class}">
            <span id="notification-text">{text}</span>
            <button id="notification-close" type="button">&times;</button>
        </div>"#,
        class = class,
        text = text,
    )
}

pub fn loading_html(visible: bool) -> String {
    format!(
        r#"<div id="loading" class="loading{}"><div class="spinner"></div><span>处理中，请稍候...</span></div>"#,
        if visible { " show" } else { "" }
    )
}

// ============================================================================
// Base Template
// ============================================================================

pub struct PageChrome<'a> {
    pub view: &'a ViewState,
    pub user: Option<&'a User>,
    pub notification: Option<&'a Notification>,
    pub loading: bool,
    /// Milliseconds the banner has left before it hides itself.
    pub notification_remaining_ms: i64,
}

pub fn base_html(title: &str, content: &str, chrome: &PageChrome<'_>) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="zh-CN">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>{title}</title>
    <style>{STYLE}</style>
    <script src="{mermaid}"></script>
</head>
<body>
    {nav}
    <div class="container">
        {content}
    </div>
    {notification}
    {loading}
    <script>
    function hideNotification() {{
        const n = document.getElementById('notification');
        if (!n.classList.contains('show')) return;
        n.classList.remove('show');
        fetch('/notification/dismiss', {{ method: 'POST' }}).catch(() => {{}});
    }}
    document.getElementById('notification-close').addEventListener('click', hideNotification);
    if ({remaining} > 0) setTimeout(hideNotification, {remaining});

    // upload/analyze can take a while; keep the overlay up until the page returns
    document.querySelectorAll('form[data-loading]').forEach(form => {{
        form.addEventListener('submit', () => document.getElementById('loading').classList.add('show'));
    }});
    </script>
    <script>{diagram_js}</script>
</body>
</html>"#,
        title = html_escape(title),
        STYLE = STYLE,
        mermaid = MERMAID_CDN,
        nav = nav_bar(chrome.view, chrome.user),
        content = content,
        notification = notification_html(chrome.notification),
        loading = loading_html(chrome.loading),
        remaining = chrome.notification_remaining_ms.max(0),
        diagram_js = diagram_script(),
    )
}
