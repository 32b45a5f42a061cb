//! Diagram panels for assistant answers.
//!
//! The server validates Mermaid source and emits a panel; the browser's
//! Mermaid runtime turns the source into SVG. The enlarge and download
//! actions run in the browser too, but their page template and file names
//! are produced here so there is one definition of each.

use regex::Regex;
use std::sync::OnceLock;
use thiserror::Error;

use crate::markdown::html_escape;
use crate::models::Diagram;

/// Padding around the rasterized diagram, in CSS pixels.
pub const DOWNLOAD_PADDING_PX: u32 = 20;

/// Spot in an enlarge page where the browser puts the rendered SVG.
pub const SVG_SLOT: &str = "@@diagram-svg@@";

const MERMAID_KEYWORDS: &[&str] = &[
    "graph",
    "flowchart",
    "sequenceDiagram",
    "classDiagram",
    "stateDiagram",
    "stateDiagram-v2",
    "erDiagram",
    "journey",
    "gantt",
    "pie",
    "quadrantChart",
    "requirementDiagram",
    "gitGraph",
    "mindmap",
    "timeline",
    "sankey-beta",
    "xychart-beta",
    "block-beta",
    "C4Context",
];

#[derive(Debug, Error, PartialEq)]
pub enum DiagramError {
    #[error("图表代码为空")]
    Empty,
    #[error("无法识别的图表类型: {0}")]
    UnknownKind(String),
}

/// Turns diagram source into panel body markup.
pub trait DiagramRenderer {
    fn render(&self, diagram: &Diagram) -> Result<String, DiagramError>;
}

/// Validates Mermaid source and hands it to the browser runtime.
#[derive(Debug, Clone, Copy, Default)]
pub struct MermaidRenderer;

impl DiagramRenderer for MermaidRenderer {
    fn render(&self, diagram: &Diagram) -> Result<String, DiagramError> {
        validate_mermaid(&diagram.code)?;
        Ok(format!(
            r#"<pre class="mermaid">{}</pre>"#,
            html_escape(diagram.code.trim())
        ))
    }
}

/// Only Mermaid diagrams are rendered; anything else is treated as text.
pub fn is_supported(diagram: &Diagram) -> bool {
    diagram.kind.eq_ignore_ascii_case("mermaid")
}

fn header_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^([A-Za-z][A-Za-z0-9-]*)").expect("valid header regex"))
}

/// Checks for a known diagram keyword on the first meaningful line. Syntax
/// errors beyond that are left to the browser's Mermaid runtime, which
/// reports them inline.
pub fn validate_mermaid(code: &str) -> Result<(), DiagramError> {
    let mut lines = code.lines().map(str::trim).filter(|l| !l.is_empty());
    let mut in_front_matter = false;
    let header = loop {
        let Some(line) = lines.next() else {
            return Err(DiagramError::Empty);
        };
        if line == "---" {
            in_front_matter = !in_front_matter;
            continue;
        }
        if in_front_matter || line.starts_with("%%") {
            continue;
        }
        break line;
    };

    let keyword = header_regex()
        .captures(header)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .unwrap_or("");
    if !MERMAID_KEYWORDS.contains(&keyword) {
        let shown: String = header.chars().take(40).collect();
        return Err(DiagramError::UnknownKind(shown));
    }
    Ok(())
}

/// File name for the PNG download: the title with anything but letters,
/// digits, `-` and `_` collapsed to `_`.
pub fn download_file_name(title: &str) -> String {
    let mut out = String::new();
    let mut last_was_sep = false;
    for c in title.chars() {
        if c.is_alphanumeric() || c == '-' || c == '_' {
            out.push(c);
            last_was_sep = false;
        } else if !last_was_sep {
            out.push('_');
            last_was_sep = true;
        }
    }
    let trimmed = out.trim_matches('_');
    let stem = if trimmed.is_empty() { "diagram" } else { trimmed };
    format!("{}.png", stem)
}

/// Standalone page showing `svg` centered on a neutral background.
///
/// Panels carry this page with `SVG_SLOT` in place of the SVG; the browser
/// only splices the rendered markup into that slot.
pub fn enlarge_document(title: &str, svg: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="zh-CN">
<head>
<meta charset="UTF-8">
<title>{title}</title>
<style>
html, body {{ margin: 0; height: 100%; }}
body {{ display: flex; align-items: center; justify-content: center; background: #f5f5f5; }}
svg {{ max-width: 95vw; max-height: 95vh; background: #ffffff; padding: 16px; box-shadow: 0 2px 12px rgba(0,0,0,.15); }}
</style>
</head>
<body>{svg}</body>
</html>"#,
        title = html_escape(title),
        svg = svg,
    )
}

/// One diagram panel: title bar with the two actions, then either the
/// rendered body or an inline failure message.
pub fn render_panel(diagram: &Diagram, renderer: &dyn DiagramRenderer) -> String {
    let title = diagram
        .title
        .as_deref()
        .filter(|t| !t.trim().is_empty())
        .unwrap_or("图表");
    let body = match renderer.render(diagram) {
        Ok(markup) => markup,
        Err(e) => {
            tracing::warn!(error = %e, "diagram render failed");
            format!(
                r#"<div class="diagram-error">图表渲染失败: {}</div>"#,
                html_escape(&e.to_string())
            )
        }
    };
    format!(
        r#"<div class="diagram-panel" data-download-name="{download}" data-enlarge-page="{page}">
    <div class="diagram-header">
        <span class="diagram-title">{title}</span>
        <span class="diagram-actions">
            <button type="button" class="diagram-enlarge">放大查看</button>
            <button type="button" class="diagram-download">下载图片</button>
        </span>
    </div>
    <div class="diagram-body">{body}</div>
</div>"#,
        download = html_escape(&download_file_name(title)),
        page = html_escape(&enlarge_document(title, SVG_SLOT)),
        title = html_escape(title),
        body = body,
    )
}

/// Browser side of the panels: Mermaid rendering plus enlarge/download.
pub fn diagram_script() -> String {
    let slot = serde_json::to_string(SVG_SLOT).unwrap_or_else(|_| "\"\"".to_string());
    DIAGRAM_JS
        .replace("__SVG_SLOT__", &slot)
        .replace("__PADDING__", &DOWNLOAD_PADDING_PX.to_string())
}

const DIAGRAM_JS: &str = r#"
const SVG_SLOT = __SVG_SLOT__;
const DOWNLOAD_PADDING = __PADDING__;
let diagramSeq = 0;

async function renderDiagrams(root) {
    if (typeof mermaid === 'undefined') return;
    for (const pre of (root || document).querySelectorAll('pre.mermaid:not([data-rendered])')) {
        pre.dataset.rendered = '1';
        const id = 'diagram-' + (++diagramSeq);
        try {
            const { svg } = await mermaid.render(id, pre.textContent);
            pre.outerHTML = '<div class="diagram-svg">' + svg + '</div>';
        } catch (e) {
            const err = document.createElement('div');
            err.className = 'diagram-error';
            err.textContent = '图表渲染失败: ' + (e && e.message ? e.message : e);
            pre.replaceWith(err);
            const stray = document.getElementById('d' + id);
            if (stray) stray.remove();
        }
    }
}

function panelSvg(button) {
    const panel = button.closest('.diagram-panel');
    return panel ? panel.querySelector('.diagram-body svg') : null;
}

function enlargeDiagram(button) {
    const svg = panelSvg(button);
    if (!svg) { alert('未找到可放大的图表'); return; }
    const win = window.open('', '_blank');
    if (!win) { alert('弹出窗口被浏览器拦截，请允许弹出窗口后重试'); return; }
    // page comes from the server with the title already escaped
    const page = button.closest('.diagram-panel').dataset.enlargePage || SVG_SLOT;
    const at = page.lastIndexOf(SVG_SLOT);
    win.document.open();
    win.document.write(page.slice(0, at) + svg.outerHTML + page.slice(at + SVG_SLOT.length));
    win.document.close();
}

function downloadDiagram(button) {
    const svg = panelSvg(button);
    if (!svg) { alert('未找到SVG图表，无法下载'); return; }
    const name = button.closest('.diagram-panel').dataset.downloadName || 'diagram.png';
    const box = svg.getBoundingClientRect();
    const width = Math.ceil(box.width), height = Math.ceil(box.height);
    const data = new XMLSerializer().serializeToString(svg);
    const img = new Image();
    img.onload = () => {
        const canvas = document.createElement('canvas');
        canvas.width = width + DOWNLOAD_PADDING * 2;
        canvas.height = height + DOWNLOAD_PADDING * 2;
        const ctx = canvas.getContext('2d');
        ctx.fillStyle = '#ffffff';
        ctx.fillRect(0, 0, canvas.width, canvas.height);
        ctx.drawImage(img, DOWNLOAD_PADDING, DOWNLOAD_PADDING, width, height);
        const link = document.createElement('a');
        link.download = name;
        link.href = canvas.toDataURL('image/png');
        link.click();
    };
    img.onerror = () => alert('图表转换为图片失败');
    img.src = 'data:image/svg+xml;charset=utf-8,' + encodeURIComponent(data);
}

document.addEventListener('click', (e) => {
    const enlarge = e.target.closest('.diagram-enlarge');
    if (enlarge) { enlargeDiagram(enlarge); return; }
    const download = e.target.closest('.diagram-download');
    if (download) downloadDiagram(download);
});

document.addEventListener('DOMContentLoaded', () => {
    if (typeof mermaid !== 'undefined') mermaid.initialize({ startOnLoad: false });
    renderDiagrams(document);
});
"#;

#[cfg(test)]
mod tests {
    use super::*;

    fn mermaid(code: &str, title: Option<&str>) -> Diagram {
        Diagram {
            kind: "mermaid".into(),
            code: code.into(),
            title: title.map(String::from),
        }
    }

    #[test]
    fn accepts_common_diagrams() {
        assert!(validate_mermaid("graph TD;A-->B").is_ok());
        assert!(validate_mermaid("%% generated\nmindmap\n  root((论文))\n    方法").is_ok());
        assert!(validate_mermaid("---\ntitle: x\n---\nflowchart LR\n  A[\"a (b\"] --> B").is_ok());
    }

    #[test]
    fn bracket_heavy_syntax_is_left_to_the_browser() {
        assert!(validate_mermaid("erDiagram\n  CUSTOMER ||--o{ ORDER : places").is_ok());
        assert!(validate_mermaid("graph LR\n  A>flag] --> B").is_ok());
        assert!(validate_mermaid("sequenceDiagram\n  Alice->>Bob: see note 1)").is_ok());
        let html = render_panel(&mermaid("erDiagram\n  CUSTOMER ||--o{ ORDER : places", Some("ER")), &MermaidRenderer);
        assert!(html.contains("<pre class=\"mermaid\">"));
        assert!(!html.contains("diagram-error"));
    }

    #[test]
    fn rejects_malformed_source() {
        assert_eq!(validate_mermaid("   \n"), Err(DiagramError::Empty));
        assert!(matches!(validate_mermaid("hello world"), Err(DiagramError::UnknownKind(_))));
    }

    #[test]
    fn panel_degrades_to_inline_error() {
        let html = render_panel(&mermaid("flow chart A->B", Some("Flow")), &MermaidRenderer);
        assert!(html.contains("diagram-error"));
        assert!(html.contains("图表渲染失败"));
        assert!(html.contains(r#"<span class="diagram-title">Flow</span>"#));
        assert!(!html.contains("<pre class=\"mermaid\">"));
    }

    #[test]
    fn panel_escapes_source() {
        let html = render_panel(&mermaid("graph TD;A-->B", Some("Flow")), &MermaidRenderer);
        assert!(html.contains("<pre class=\"mermaid\">graph TD;A--&gt;B</pre>"));
        assert!(html.contains(r#"data-download-name="Flow.png""#));
    }

    #[test]
    fn download_names_are_sanitized() {
        assert_eq!(download_file_name("Flow"), "Flow.png");
        assert_eq!(download_file_name("模型 架构/v2: 总览"), "模型_架构_v2_总览.png");
        assert_eq!(download_file_name("***"), "diagram.png");
    }

    #[test]
    fn enlarge_page_centers_svg() {
        let doc = enlarge_document("A <b>", "<svg></svg>");
        assert!(doc.contains("<body><svg></svg></body>"));
        assert!(doc.contains("background: #f5f5f5"));
        assert!(doc.contains("<title>A &lt;b&gt;</title>"));
    }

    #[test]
    fn panel_carries_escaped_enlarge_page() {
        let title = "</title><script>alert(1)</script> $&";
        let html = render_panel(&mermaid("graph TD;A-->B", Some(title)), &MermaidRenderer);
        // attribute holds the page escaped once more; unescaping yields
        // enlarge_document's output with the slot still empty
        let expected = html_escape(&enlarge_document(title, SVG_SLOT));
        assert!(html.contains(&format!(r#"data-enlarge-page="{}""#, expected)));
        assert!(!html.contains("<script>alert"));
        assert!(enlarge_document(title, SVG_SLOT).contains("&lt;/title&gt;&lt;script&gt;"));
    }

    #[test]
    fn script_splices_svg_without_string_replace() {
        let js = diagram_script();
        assert!(js.contains("const DOWNLOAD_PADDING = 20;"));
        assert!(js.contains(r#"const SVG_SLOT = "@@diagram-svg@@";"#));
        assert!(!js.contains("__SVG_SLOT__"));
        assert!(!js.contains(".replace('{{"));
    }

    #[test]
    fn only_mermaid_is_supported() {
        assert!(is_supported(&mermaid("graph TD", None)));
        let other = Diagram { kind: "plantuml".into(), code: String::new(), title: None };
        assert!(!is_supported(&other));
    }
}
