// src/services/extractor.rs

//! Content-region extraction.
//!
//! Selects the configured content region from a page and renders two views of
//! it: a display string (node markup, shown in feeds) and a comparison string
//! (normalized, hashed and diffed). Selector matching goes through
//! [`MatchableDocument`] so the fallback chain does not depend on the parser.

use std::fmt;

use scraper::{ElementRef, Html, Selector};

use crate::error::{AppError, Result};
use crate::models::{ExtractionMode, SiteDescriptor};
use crate::services::normalizer::normalize;

/// Elements that never carry content and are removed before selection.
pub const NOISE_ELEMENTS: &str = "script, style, noscript, iframe, template";

/// Candidates of the main-landmark fallback tier, in order.
const MAIN_LANDMARKS: [&str; 6] = [
    "main",
    "[role=main]",
    ".main-content",
    ".content",
    "#content",
    "#main",
];

/// Separator between the display fragments of matched nodes.
pub const DISPLAY_SEPARATOR: &str = "\n\n";

/// How many node descriptions are spelled out in the metadata.
const DESCRIBED_NODES: usize = 5;

/// A matched node, rendered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeContent {
    /// Full outer markup
    pub html: String,
    /// Trimmed text nodes joined by single spaces
    pub text: String,
    /// Short label such as `div#content.news`
    pub label: String,
}

/// A parsed page that can answer selector queries.
pub trait MatchableDocument {
    /// Nodes matching a CSS selector, in document order.
    fn select(&self, selector: &str) -> Result<Vec<NodeContent>>;

    /// The body element, if any.
    fn body(&self) -> Option<NodeContent>;

    /// The whole document, if it has a root element.
    fn root(&self) -> Option<NodeContent>;
}

/// [`MatchableDocument`] backed by `scraper`, with noise already removed.
pub struct HtmlDocument {
    html: Html,
}

impl HtmlDocument {
    /// Parse a page and strip noise elements and comments.
    pub fn parse(markup: &str) -> Self {
        let mut html = Html::parse_document(markup);
        strip_noise(&mut html);
        Self { html }
    }

    fn render(element: ElementRef<'_>) -> NodeContent {
        NodeContent {
            html: element.html(),
            text: element_text(element),
            label: describe_element(element),
        }
    }
}

impl MatchableDocument for HtmlDocument {
    fn select(&self, selector: &str) -> Result<Vec<NodeContent>> {
        let selector = parse_selector(selector)?;
        Ok(self.html.select(&selector).map(Self::render).collect())
    }

    fn body(&self) -> Option<NodeContent> {
        let selector = parse_selector("body").ok()?;
        self.html.select(&selector).next().map(Self::render)
    }

    fn root(&self) -> Option<NodeContent> {
        Some(Self::render(self.html.root_element()))
    }
}

/// Parse a CSS selector.
pub fn parse_selector(s: &str) -> Result<Selector> {
    Selector::parse(s).map_err(|e| AppError::selector(s, format!("{e:?}")))
}

/// Detach noise elements and comment nodes from a parsed tree.
pub fn strip_noise(html: &mut Html) {
    let mut doomed: Vec<_> = html
        .tree
        .nodes()
        .filter(|node| node.value().is_comment())
        .map(|node| node.id())
        .collect();

    if let Ok(noise) = Selector::parse(NOISE_ELEMENTS) {
        doomed.extend(html.select(&noise).map(|element| element.id()));
    }

    for id in doomed {
        if let Some(mut node) = html.tree.get_mut(id) {
            node.detach();
        }
    }
}

fn element_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .map(str::trim)
        .filter(|chunk| !chunk.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn describe_element(element: ElementRef<'_>) -> String {
    let value = element.value();
    let mut label = value.name().to_string();
    if let Some(id) = value.id() {
        label.push('#');
        label.push_str(id);
    }
    for class in value.classes() {
        label.push('.');
        label.push_str(class);
    }
    label
}

/// Fallback tier used when no configured selector matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackTier {
    /// A main landmark candidate matched
    Main,
    /// The document body
    Body,
    /// The whole document
    Document,
}

/// Which strategy produced the selected nodes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionStrategy {
    /// At least one configured selector matched
    Selectors,
    /// The fallback chain fired
    Fallback(FallbackTier),
}

impl fmt::Display for SelectionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SelectionStrategy::Selectors => write!(f, "selectors"),
            SelectionStrategy::Fallback(FallbackTier::Main) => write!(f, "fallback:main"),
            SelectionStrategy::Fallback(FallbackTier::Body) => write!(f, "fallback:body"),
            SelectionStrategy::Fallback(FallbackTier::Document) => write!(f, "fallback:document"),
        }
    }
}

/// Result of extracting a page's content region.
#[derive(Debug, Clone)]
pub struct Extraction {
    /// Node markup joined by blank lines
    pub display: String,
    /// Normalized comparison text
    pub comparison: String,
    pub strategy: SelectionStrategy,
    /// Selectors that matched, or `fallback:<candidate>`
    pub selectors_used: Vec<String>,
    pub node_count: usize,
    /// Human-readable description of the matched nodes
    pub matched_nodes: String,
    /// Length of the plain text in characters
    pub content_length: usize,
}

/// Extract the content region of `markup` for `site`.
///
/// Returns `None` for a blank response or when not a single node could be
/// selected.
pub fn extract(markup: &str, site: &SiteDescriptor) -> Option<Extraction> {
    if markup.trim().is_empty() {
        return None;
    }
    let document = HtmlDocument::parse(markup);
    extract_from(&document, &site.selectors, site.mode, &site.name)
}

/// Run the selection and fallback chain over any [`MatchableDocument`].
pub fn extract_from(
    document: &impl MatchableDocument,
    selectors: &[String],
    mode: ExtractionMode,
    site_name: &str,
) -> Option<Extraction> {
    let mut nodes = Vec::new();
    let mut used = Vec::new();

    for selector in selectors.iter().map(|s| s.trim()).filter(|s| !s.is_empty()) {
        match document.select(selector) {
            Ok(found) if !found.is_empty() => {
                nodes.extend(found);
                used.push(selector.to_string());
            }
            Ok(_) => log::debug!("Selector '{}' matched nothing for {}", selector, site_name),
            Err(e) => log::warn!("Skipping selector for {}: {}", site_name, e),
        }
    }

    let strategy = if nodes.is_empty() {
        let (tier, candidate, fallback_nodes) = select_fallback(document)?;
        log::debug!("No selector matched for {}, using {}", site_name, candidate);
        nodes = fallback_nodes;
        used = vec![format!("fallback:{candidate}")];
        SelectionStrategy::Fallback(tier)
    } else {
        SelectionStrategy::Selectors
    };

    if nodes.is_empty() {
        return None;
    }

    let text = nodes
        .iter()
        .map(|node| node.text.as_str())
        .collect::<Vec<_>>()
        .join(" ");
    let comparison = match mode {
        ExtractionMode::Text => normalize(&text),
        ExtractionMode::Html => normalize(
            &nodes
                .iter()
                .map(|node| node.html.as_str())
                .collect::<Vec<_>>()
                .join(" "),
        ),
    };
    let display = nodes
        .iter()
        .map(|node| node.html.trim())
        .collect::<Vec<_>>()
        .join(DISPLAY_SEPARATOR);

    Some(Extraction {
        display,
        comparison,
        strategy,
        selectors_used: used,
        node_count: nodes.len(),
        matched_nodes: describe_nodes(&nodes),
        content_length: text.chars().count(),
    })
}

fn select_fallback(
    document: &impl MatchableDocument,
) -> Option<(FallbackTier, String, Vec<NodeContent>)> {
    for candidate in MAIN_LANDMARKS {
        if let Ok(found) = document.select(candidate) {
            if !found.is_empty() {
                return Some((FallbackTier::Main, candidate.to_string(), found));
            }
        }
    }

    if let Some(body) = document.body() {
        return Some((FallbackTier::Body, "body".to_string(), vec![body]));
    }

    let root = document.root()?;
    Some((FallbackTier::Document, "document".to_string(), vec![root]))
}

fn describe_nodes(nodes: &[NodeContent]) -> String {
    let labels: Vec<&str> = nodes
        .iter()
        .take(DESCRIBED_NODES)
        .map(|node| node.label.as_str())
        .collect();
    let more = nodes.len().saturating_sub(DESCRIBED_NODES);
    let suffix = if more > 0 {
        format!(", +{more} more")
    } else {
        String::new()
    };
    format!("{} node(s): {}{}", nodes.len(), labels.join(", "), suffix)
}
