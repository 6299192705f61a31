// src/models/site.rs

//! Watched site descriptors.

use serde::{Deserialize, Serialize};

/// How a site's content region is compared between runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionMode {
    /// Compare the plain text of the matched nodes
    #[default]
    Text,
    /// Compare the serialized markup of the matched nodes
    Html,
}

/// A watched page as configured in `[[sites]]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteDescriptor {
    /// Display name, also the source of the slug
    #[serde(default)]
    pub name: String,

    /// Region label (Bundesland) used to group feeds
    #[serde(rename = "bundesland", default = "default_region")]
    pub region: String,

    /// Page to poll
    #[serde(default)]
    pub url: String,

    /// CSS selectors for the content region, applied additively
    #[serde(default)]
    pub selectors: Vec<String>,

    /// Comparison mode
    #[serde(default)]
    pub mode: ExtractionMode,

    /// Scheduling hint, not interpreted by the watcher
    #[serde(default = "default_hint")]
    pub update_frequency: String,

    /// Scheduling hint, not interpreted by the watcher
    #[serde(default = "default_hint")]
    pub priority: String,
}

fn default_region() -> String {
    "Unknown".to_string()
}

fn default_hint() -> String {
    "normal".to_string()
}

impl SiteDescriptor {
    /// Create a descriptor with default mode and hints.
    pub fn new(
        name: impl Into<String>,
        region: impl Into<String>,
        url: impl Into<String>,
        selectors: &[&str],
    ) -> Self {
        Self {
            name: name.into(),
            region: region.into(),
            url: url.into(),
            selectors: selectors.iter().map(|s| s.to_string()).collect(),
            mode: ExtractionMode::default(),
            update_frequency: default_hint(),
            priority: default_hint(),
        }
    }

    /// Stable state key for this site.
    pub fn slug(&self) -> String {
        slugify(&self.name)
    }

    /// Whether the entry carries the required fields.
    pub fn is_complete(&self) -> bool {
        !self.name.trim().is_empty() && !self.url.trim().is_empty()
    }
}

/// Convert a name into a URL-safe slug.
///
/// Lowercases, collapses every run of characters outside `[a-z0-9]` into a
/// single `-` and trims leading/trailing hyphens.
pub fn slugify(value: &str) -> String {
    let mut slug = String::with_capacity(value.len());
    let mut pending_dash = false;

    for c in value.chars().flat_map(char::to_lowercase) {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c);
        } else {
            pending_dash = true;
        }
    }

    slug
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slugify_basic() {
        assert_eq!(slugify("Nordrhein-Westfalen Plan"), "nordrhein-westfalen-plan");
        assert_eq!(slugify("Demo Plan"), "demo-plan");
    }

    #[test]
    fn test_slugify_is_deterministic() {
        let first = slugify("Nordrhein-Westfalen Plan");
        let second = slugify("Nordrhein-Westfalen Plan");
        assert_eq!(first, second);
    }

    #[test]
    fn test_slugify_collapses_and_trims() {
        assert_eq!(slugify("  --Regionalplan  Köln!! "), "regionalplan-k-ln");
        assert_eq!(slugify("RP Düsseldorf (2024)"), "rp-d-sseldorf-2024");
        assert_eq!(slugify("!!!"), "");
    }

    #[test]
    fn test_descriptor_defaults_from_toml() {
        let site: SiteDescriptor =
            toml::from_str("name = \"Demo Plan\"\nurl = \"https://example.com\"").unwrap();
        assert_eq!(site.region, "Unknown");
        assert_eq!(site.mode, ExtractionMode::Text);
        assert!(site.selectors.is_empty());
        assert_eq!(site.priority, "normal");
        assert_eq!(site.slug(), "demo-plan");
    }

    #[test]
    fn test_descriptor_html_mode() {
        let site: SiteDescriptor = toml::from_str(
            "name = \"X\"\nurl = \"https://x\"\nbundesland = \"Hessen\"\nmode = \"html\"",
        )
        .unwrap();
        assert_eq!(site.mode, ExtractionMode::Html);
        assert_eq!(site.region, "Hessen");
    }

    #[test]
    fn test_incomplete_descriptor() {
        let site: SiteDescriptor = toml::from_str("name = \"No URL\"").unwrap();
        assert!(!site.is_complete());
    }
}
