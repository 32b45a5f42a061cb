//! Paper list and detail rendering.

use crate::markdown::{format_timestamp, html_escape, render_markdown};
use crate::models::{Paper, RelatedPaper, RelatedPapers, UserId};
use crate::view::{Slot, ViewBinding};

pub const EMPTY_PAPERS: &str = "暂无论文，请先上传论文";
/// Substring of the backend's "paper not on Semantic Scholar" sentence.
pub const RELATED_NOT_FOUND_MARKER: &str = "无法查询到该论文";
pub const RELATED_NOTHING_FOUND: &str = "未找到相关论文";
pub const RELATED_PARSE_FAILED: &str = "相关论文数据解析失败";
pub const RELATED_MISSING: &str = "暂无相关论文信息";

pub fn status_label(status: &str) -> &str {
    match status {
        "uploaded" => "已上传",
        "processing" => "分析中",
        "completed" => "已完成",
        "failed" => "分析失败",
        other => other,
    }
}

pub fn owned_by(papers: &[Paper], user_id: UserId) -> Vec<&Paper> {
    papers.iter().filter(|p| p.user_id == user_id).collect()
}

// ============================================================================
// List
// ============================================================================

fn render_card(paper: &Paper) -> String {
    let status = paper.processing_status.as_str();
    format!(
        r#"<a class="paper-card" href="/papers/{id}">
    <div class="paper-title">{title}</div>
    <div class="paper-meta">上传时间: {time}</div>
    <div class="paper-status status-{status_class}">{label}</div>
</a>"#,
        id = paper.id,
        title = html_escape(paper.display_title()),
        time = html_escape(&paper.upload_time.as_deref().map(format_timestamp).unwrap_or_default()),
        status_class = html_escape(status),
        label = html_escape(status_label(status)),
    )
}

/// Cards for the current user's papers, or the empty-state message.
pub fn render_paper_grid(papers: &[Paper], user_id: UserId) -> String {
    let mine = owned_by(papers, user_id);
    if mine.is_empty() {
        return format!(r#"<div class="empty-state">{}</div>"#, EMPTY_PAPERS);
    }
    let cards: Vec<String> = mine.into_iter().map(render_card).collect();
    format!(r#"<div class="papers-grid">{}</div>"#, cards.join("\n"))
}

/// Compact list used on the chat tab to pick a paper.
pub fn render_paper_picker(papers: &[Paper], user_id: UserId) -> String {
    let mine = owned_by(papers, user_id);
    if mine.is_empty() {
        return format!(r#"<div class="empty-state">{}</div>"#, EMPTY_PAPERS);
    }
    let mut html = String::from(r#"<ul class="paper-picker">"#);
    for paper in mine {
        html.push_str(&format!(
            r#"<li><a href="/papers/{}/section/chat">{}</a> <span class="paper-status status-{}">{}</span></li>"#,
            paper.id,
            html_escape(paper.display_title()),
            html_escape(paper.processing_status.as_str()),
            html_escape(status_label(paper.processing_status.as_str())),
        ));
    }
    html.push_str("</ul>");
    html
}

// ============================================================================
// Detail
// ============================================================================

fn markdown_or(value: Option<&str>, fallback: &str) -> String {
    match value {
        Some(v) if !v.trim().is_empty() => render_markdown(v),
        _ => render_markdown(fallback),
    }
}

/// Fills every detail region from one fetched snapshot. Each field falls
/// back independently.
pub fn render_detail(paper: &Paper, pdf_url: &str, view: &mut dyn ViewBinding) {
    view.set_section(Slot::Title, markdown_or(paper.title.as_deref(), "未提取标题"));
    view.set_section(Slot::Authors, markdown_or(paper.authors.as_deref(), "未提取作者"));
    view.set_section(
        Slot::UploadTime,
        html_escape(&paper.upload_time.as_deref().map(format_timestamp).unwrap_or_default()),
    );
    view.set_section(Slot::Abstract, markdown_or(paper.abstract_text.as_deref(), "暂无摘要"));
    view.set_section(Slot::Summary, markdown_or(paper.summary.as_deref(), "暂无总结"));
    view.set_section(Slot::KeyContent, markdown_or(paper.key_content.as_deref(), "暂无关键内容"));
    view.set_section(Slot::Translation, markdown_or(paper.translation.as_deref(), "未生成翻译"));
    view.set_section(Slot::Terminology, markdown_or(paper.terminology.as_deref(), "未生成术语解释"));
    view.set_section(
        Slot::ResearchContext,
        markdown_or(paper.research_context.as_deref(), "未生成研究脉络"),
    );
    view.set_section(
        Slot::RelatedPapers,
        render_related_papers(paper.related_papers_json.as_deref()),
    );
    view.set_section(Slot::PdfSource, pdf_url.to_string());
}

fn notice(class: &str, text: &str) -> String {
    format!(r#"<p class="{}">{}</p>"#, class, html_escape(text))
}

fn related_list(heading: &str, items: &[RelatedPaper]) -> String {
    let mut html = format!("<h4>{}</h4><ul class=\"related-list\">", heading);
    for item in items {
        let year = item
            .publication_date
            .as_deref()
            .and_then(|d| d.get(..4))
            .unwrap_or("N/A");
        html.push_str(&format!(
            r#"<li><span class="related-title">{}</span> <span class="related-meta">({} · 被引 {})</span></li>"#,
            html_escape(item.title.as_deref().unwrap_or("N/A")),
            html_escape(year),
            item.citation_count.unwrap_or(0),
        ));
    }
    html.push_str("</ul>");
    html
}

pub fn render_related_papers(payload: Option<&str>) -> String {
    let Some(payload) = payload.filter(|p| !p.trim().is_empty()) else {
        return notice("related-empty", RELATED_MISSING);
    };
    if payload.contains(RELATED_NOT_FOUND_MARKER) {
        return notice("error", payload);
    }
    let related: RelatedPapers = match serde_json::from_str(payload) {
        Ok(r) => r,
        Err(e) => {
            tracing::warn!(error = %e, "related papers payload unparseable");
            return notice("error", RELATED_PARSE_FAILED);
        }
    };

    let mut html = String::new();
    if let Some(citations) = related.citations.as_deref().filter(|c| !c.is_empty()) {
        html.push_str(&related_list("引用本文的论文 (Citations)", citations));
    }
    if let Some(references) = related.references.as_deref().filter(|r| !r.is_empty()) {
        html.push_str(&related_list("参考文献 (References)", references));
    }
    if html.is_empty() {
        return notice("related-empty", RELATED_NOTHING_FOUND);
    }
    html
}
