use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use std::sync::Arc;
use url::Url;

use crate::network::HttpClient;
use crate::robots::RobotsChecker;
use crate::signals::{HeadingCounts, LinkSignals, PageSignals};

/// Source of extracted signals, as a seam so the scheduler can be driven by
/// a stub in tests. Extraction never fails: fetch and parse problems yield
/// the empty record, which is an observation in its own right.
#[async_trait]
pub trait SignalSource: Send + Sync {
    async fn page_signals(&self, url: &str) -> PageSignals;
    async fn link_signals(&self, source_url: &str, target_url: &str) -> LinkSignals;
}

/// Fetches pages over HTTP and extracts SEO signals from the HTML.
pub struct SignalExtractor {
    http: Arc<HttpClient>,
    robots: RobotsChecker,
}

impl SignalExtractor {
    pub fn new(http: Arc<HttpClient>, robots: RobotsChecker) -> Self {
        Self { http, robots }
    }
}

#[async_trait]
impl SignalSource for SignalExtractor {
    async fn page_signals(&self, url: &str) -> PageSignals {
        if url.trim().is_empty() {
            return PageSignals::default();
        }

        let fetched = match self.http.fetch(url).await {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!(url = %url, error = %e, "page fetch failed");
                return PageSignals::default();
            }
        };

        let robots_allowed = Some(self.robots.is_allowed(url).await);

        // Parsing is synchronous; the Html tree never crosses an await point.
        let parsed = parse_page(&fetched.content);
        PageSignals {
            titles: parsed.titles,
            descriptions: parsed.descriptions,
            heading_counts: parsed.heading_counts,
            heading_contents: parsed.heading_contents,
            robots_meta: parsed.robots_meta,
            x_robots_tag: fetched.x_robots_tag,
            robots_allowed,
        }
    }

    async fn link_signals(&self, source_url: &str, target_url: &str) -> LinkSignals {
        if source_url.trim().is_empty() || target_url.trim().is_empty() {
            return LinkSignals::default();
        }

        let source = match Url::parse(source_url) {
            Ok(url) => url,
            Err(e) => {
                tracing::warn!(url = %source_url, error = %e, "invalid source URL");
                return LinkSignals::default();
            }
        };

        let fetched = match self.http.fetch(source_url).await {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!(url = %source_url, error = %e, "source fetch failed");
                return LinkSignals::default();
            }
        };

        let robots_allowed = Some(self.robots.is_allowed(source_url).await);

        let parsed = parse_link(&fetched.content, &source, target_url);
        LinkSignals {
            link_path: parsed.link_path,
            hrefs_resolved: parsed.hrefs_resolved,
            rel_attribute: parsed.rel_attribute,
            robots_meta: parsed.robots_meta,
            x_robots_tag: fetched.x_robots_tag,
            anchor_text: parsed.anchor_text,
            parent_text: parsed.parent_text,
            robots_allowed,
        }
    }
}

fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("static selector")
}

/// Page-level fields parsed from the HTML body.
#[derive(Debug, Default)]
pub struct ParsedPage {
    pub titles: Vec<String>,
    pub descriptions: Vec<String>,
    pub heading_counts: HeadingCounts,
    pub heading_contents: Vec<(String, String)>,
    pub robots_meta: Option<String>,
}

pub fn parse_page(html: &str) -> ParsedPage {
    let document = Html::parse_document(html);
    let mut parsed = ParsedPage::default();

    for element in document.select(&selector("title")) {
        let text = element.text().collect::<String>().trim().to_string();
        if !text.is_empty() {
            parsed.titles.push(text);
        }
    }

    for element in document.select(&selector(r#"meta[name="description"]"#)) {
        if let Some(content) = element.value().attr("content") {
            parsed.descriptions.push(content.to_string());
        }
    }

    // Selector matching walks the whole tree, so nested headings are counted too
    for element in document.select(&selector("h1, h2, h3, h4, h5, h6")) {
        let level = element.value().name().to_string();
        let text = element.text().collect::<String>().trim().to_string();
        parsed.heading_counts.bump(&level);
        parsed.heading_contents.push((level, text));
    }

    parsed.robots_meta = robots_meta(&document);
    parsed
}

/// Link-level fields parsed from the source page's HTML.
#[derive(Debug, Default)]
pub struct ParsedLink {
    pub link_path: Option<String>,
    pub hrefs_resolved: Vec<String>,
    pub rel_attribute: Option<String>,
    pub anchor_text: Option<String>,
    pub parent_text: Option<String>,
    pub robots_meta: Option<String>,
}

pub fn parse_link(html: &str, source_url: &Url, target_url: &str) -> ParsedLink {
    let document = Html::parse_document(html);
    let mut parsed = ParsedLink {
        robots_meta: robots_meta(&document),
        ..Default::default()
    };

    let base = effective_base(&document, source_url);
    let resolved_target = resolve_target(&base, target_url);

    let mut matched = false;
    for anchor in document.select(&selector("a[href]")) {
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };
        let resolved = match base.join(href.trim()) {
            Ok(mut url) => {
                url.set_fragment(None);
                url.to_string()
            }
            // Unresolvable hrefs are kept verbatim; they can never match
            Err(_) => href.trim().to_string(),
        };

        if !matched && Some(resolved.as_str()) == resolved_target.as_deref() {
            matched = true;
            parsed.link_path = Some(element_path(anchor));
            parsed.rel_attribute = anchor.value().attr("rel").map(str::to_string);
            parsed.anchor_text = non_empty(collapse_text(anchor));
            parsed.parent_text = anchor
                .parent()
                .and_then(ElementRef::wrap)
                .and_then(|parent| non_empty(collapse_text(parent)));
        }

        parsed.hrefs_resolved.push(resolved);
    }

    parsed
}

/// The `href` of the first `<base>` element, resolved against the source URL;
/// the source URL itself when absent or unresolvable.
fn effective_base(document: &Html, source_url: &Url) -> Url {
    document
        .select(&selector("base[href]"))
        .next()
        .and_then(|el| el.value().attr("href"))
        .and_then(|href| source_url.join(href.trim()).ok())
        .unwrap_or_else(|| source_url.clone())
}

/// Absolute targets are taken as-is, scheme-less ones resolve against the
/// base. The fragment is stripped to mirror anchor resolution.
fn resolve_target(base: &Url, target_url: &str) -> Option<String> {
    let mut url = match Url::parse(target_url) {
        Ok(url) => url,
        Err(_) => base.join(target_url).ok()?,
    };
    url.set_fragment(None);
    Some(url.to_string())
}

fn robots_meta(document: &Html) -> Option<String> {
    document
        .select(&selector(r#"meta[name="robots"]"#))
        .next()
        .and_then(|el| el.value().attr("content"))
        .map(str::to_string)
}

fn collapse_text(element: ElementRef) -> String {
    element
        .text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn non_empty(text: String) -> Option<String> {
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

/// Structural path from the document root to an element, lxml-style:
/// `/html/body/div/a[2]`, with an index only when the element has siblings
/// of the same name.
fn element_path(element: ElementRef) -> String {
    let mut parts: Vec<String> = Vec::new();
    let mut current = *element;

    loop {
        let Some(elem) = current.value().as_element() else {
            break;
        };
        let name = elem.name().to_string();

        let before = current
            .prev_siblings()
            .filter(|n| n.value().as_element().is_some_and(|e| e.name() == name))
            .count();
        let after = current
            .next_siblings()
            .filter(|n| n.value().as_element().is_some_and(|e| e.name() == name))
            .count();

        if before + after > 0 {
            parts.push(format!("{}[{}]", name, before + 1));
        } else {
            parts.push(name);
        }

        match current.parent() {
            Some(parent) => current = parent,
            None => break,
        }
    }

    parts.reverse();
    format!("/{}", parts.join("/"))
}
