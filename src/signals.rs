use serde::{Deserialize, Serialize};
use std::fmt;

/// A tracked subject: either a (source, target) hyperlink pair or a single page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Link { source: String, target: String },
    Page { url: String },
}

impl Target {
    pub fn kind(&self) -> ObservationKind {
        match self {
            Target::Link { .. } => ObservationKind::Link,
            Target::Page { .. } => ObservationKind::Page,
        }
    }

    /// Stable key identifying the subject across runs.
    ///
    /// Link pairs serialize to a JSON array so both URLs survive in one
    /// column; pages use the URL verbatim.
    pub fn subject_key(&self) -> String {
        match self {
            Target::Link { source, target } => {
                serde_json::to_string(&[source.as_str(), target.as_str()])
                    .unwrap_or_else(|_| format!("[{:?},{:?}]", source, target))
            }
            Target::Page { url } => url.clone(),
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Link { source, target } => write!(f, "link {} -> {}", source, target),
            Target::Page { url } => write!(f, "page {}", url),
        }
    }
}

/// Discriminates the two observation families in storage and diffing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObservationKind {
    Link,
    Page,
}

impl ObservationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObservationKind::Link => "link",
            ObservationKind::Page => "page",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "link" => Some(ObservationKind::Link),
            "page" => Some(ObservationKind::Page),
            _ => None,
        }
    }
}

impl fmt::Display for ObservationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-level heading tallies. All six levels are always present so that
/// serialized payloads compare structurally even when a page has no headings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeadingCounts {
    pub h1: u32,
    pub h2: u32,
    pub h3: u32,
    pub h4: u32,
    pub h5: u32,
    pub h6: u32,
}

impl HeadingCounts {
    /// Bump the counter for a heading tag name ("h1".."h6").
    pub fn bump(&mut self, level: &str) {
        match level {
            "h1" => self.h1 += 1,
            "h2" => self.h2 += 1,
            "h3" => self.h3 += 1,
            "h4" => self.h4 += 1,
            "h5" => self.h5 += 1,
            "h6" => self.h6 += 1,
            _ => {}
        }
    }

    pub fn total(&self) -> u32 {
        self.h1 + self.h2 + self.h3 + self.h4 + self.h5 + self.h6
    }
}

/// Signals extracted from a single page fetch.
///
/// A failed fetch or parse yields `PageSignals::default()`; the empty record
/// is itself an observation, so an outage shows up as a change.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageSignals {
    /// Non-empty trimmed `<title>` texts, document order.
    pub titles: Vec<String>,
    /// `content` attributes of every `meta[name=description]`.
    pub descriptions: Vec<String>,
    pub heading_counts: HeadingCounts,
    /// `(level, trimmed text)` for every heading in document order,
    /// regardless of nesting depth.
    pub heading_contents: Vec<(String, String)>,
    /// First `meta[name=robots]` content attribute.
    pub robots_meta: Option<String>,
    /// `X-Robots-Tag` response header.
    pub x_robots_tag: Option<String>,
    /// robots.txt verdict for the page URL (None when the fetch failed).
    pub robots_allowed: Option<bool>,
}

/// Signals extracted for one tracked (source page, target URL) link pair.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LinkSignals {
    /// Structural path to the first matching anchor, e.g. `/html/body/p/a[2]`.
    pub link_path: Option<String>,
    /// Every anchor href on the source page, fragment-stripped and resolved
    /// against the effective base. Document order, duplicates kept.
    pub hrefs_resolved: Vec<String>,
    /// `rel` attribute of the matching anchor.
    pub rel_attribute: Option<String>,
    pub robots_meta: Option<String>,
    pub x_robots_tag: Option<String>,
    /// Text content of the matching anchor.
    pub anchor_text: Option<String>,
    /// Text content of the matching anchor's parent element.
    pub parent_text: Option<String>,
    /// robots.txt verdict for the source URL.
    pub robots_allowed: Option<bool>,
}

/// Kind-tagged payload stored with every observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SignalPayload {
    Link(LinkSignals),
    Page(PageSignals),
}

impl SignalPayload {
    pub fn kind(&self) -> ObservationKind {
        match self {
            SignalPayload::Link(_) => ObservationKind::Link,
            SignalPayload::Page(_) => ObservationKind::Page,
        }
    }
}
