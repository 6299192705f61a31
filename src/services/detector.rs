// src/services/detector.rs

//! Hash-gated change detection.
//!
//! The detector compares a fresh [`Extraction`] with the stored record of its
//! site and applies the outcome to the [`StateStore`]: a new record on first
//! sighting, a `last_checked` bump when the hash is unchanged, or a record
//! update plus a change event carrying the added paragraphs.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use unicode_segmentation::UnicodeSegmentation;

use crate::error::Result;
use crate::models::{ChangeEvent, ChangeKind, SiteDescriptor, SiteRecord};
use crate::pipeline::diff::added_paragraphs;
use crate::services::extractor::Extraction;
use crate::storage::{RecordUpdate, StateStore};

/// Fragment of the first capture of a site.
pub const INITIAL_NOTICE: &str = "<p><em>Erste Erfassung - Überwachung gestartet.</em></p>";

/// Fragment of an update whose paragraphs all matched after normalization.
pub const NO_CONTENT_NOTICE: &str =
    "<p><em>Keine neuen Inhalte erkannt (möglicherweise nur Formatierungsänderungen).</em></p>";

/// Paragraphs rendered into one fragment.
const MAX_REPORTED_PARAGRAPHS: usize = 5;

/// Outcome of checking one site.
#[derive(Debug, Clone, PartialEq)]
pub enum Detection {
    /// First capture; the record was created
    Initial(ChangeEvent),
    /// Content changed; the record was updated
    Updated(ChangeEvent),
    /// Same hash as before
    Unchanged,
}

impl Detection {
    /// The appended event, if any.
    pub fn event(&self) -> Option<&ChangeEvent> {
        match self {
            Detection::Initial(event) | Detection::Updated(event) => Some(event),
            Detection::Unchanged => None,
        }
    }
}

/// SHA-256 of comparison text, lowercase hex.
pub fn content_hash(comparison: &str) -> String {
    hex::encode(Sha256::digest(comparison.as_bytes()))
}

/// Render reported paragraphs as an HTML fragment.
pub fn render_added(paragraphs: &[String]) -> String {
    if paragraphs.is_empty() {
        return NO_CONTENT_NOTICE.to_string();
    }

    let mut fragment: String = paragraphs
        .iter()
        .take(MAX_REPORTED_PARAGRAPHS)
        .map(|p| format!("<p>{}</p>", html_escape::encode_text(p)))
        .collect();

    let more = paragraphs.len().saturating_sub(MAX_REPORTED_PARAGRAPHS);
    if more > 0 {
        fragment.push_str(&format!("<p><em>... und {more} weitere Änderungen</em></p>"));
    }
    fragment
}

/// First `limit` grapheme clusters of `content`, with `...` when cut.
pub fn preview(content: &str, limit: usize) -> String {
    let mut graphemes = content.graphemes(true);
    let head: String = graphemes.by_ref().take(limit).collect();
    if graphemes.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}

/// Change detector over the state store.
#[derive(Debug, Clone)]
pub struct ChangeDetector {
    preview_graphemes: usize,
}

impl ChangeDetector {
    pub fn new(preview_graphemes: usize) -> Self {
        Self { preview_graphemes }
    }

    /// Compare `extraction` with the stored state of `site` and record the outcome.
    pub fn detect(
        &self,
        store: &mut StateStore,
        site: &SiteDescriptor,
        extraction: &Extraction,
        now: DateTime<Utc>,
    ) -> Result<Detection> {
        let slug = site.slug();
        let new_hash = content_hash(&extraction.comparison);

        let Some(record) = store.record(&slug) else {
            let record = SiteRecord {
                name: site.name.clone(),
                region: site.region.clone(),
                url: site.url.clone(),
                hash: new_hash,
                current_content: extraction.display.clone(),
                previous_content: String::new(),
                first_seen: now,
                last_change: now,
                last_checked: now,
                content_length: extraction.content_length,
                selectors_used: extraction.selectors_used.clone(),
            };
            store.apply_change(&slug, RecordUpdate::Created(record))?;

            let event = self.event(
                &slug,
                site,
                extraction,
                now,
                now,
                ChangeKind::Initial,
                INITIAL_NOTICE.to_string(),
                String::new(),
            );
            store.append_event(event.clone());
            log::info!("NEW: {}", site.name);
            return Ok(Detection::Initial(event));
        };

        if record.hash == new_hash {
            store.apply_change(&slug, RecordUpdate::Checked { at: now })?;
            log::debug!("Unchanged: {}", site.name);
            return Ok(Detection::Unchanged);
        }

        let old_hash = record.hash.clone();
        let first_seen = record.first_seen;
        let changes_html = render_added(&added_paragraphs(
            &record.current_content,
            &extraction.display,
        ));
        let previous_html = preview(&record.current_content, self.preview_graphemes);

        store.apply_change(
            &slug,
            RecordUpdate::Changed {
                hash: new_hash.clone(),
                content: extraction.display.clone(),
                content_length: extraction.content_length,
                selectors_used: extraction.selectors_used.clone(),
                at: now,
            },
        )?;

        let event = self.event(
            &slug,
            site,
            extraction,
            first_seen,
            now,
            ChangeKind::Update,
            changes_html,
            previous_html,
        );
        store.append_event(event.clone());
        log::info!(
            "CHANGE: {} (hash: {} -> {})",
            site.name,
            short_hash(&old_hash),
            short_hash(&new_hash)
        );
        Ok(Detection::Updated(event))
    }

    #[allow(clippy::too_many_arguments)]
    fn event(
        &self,
        slug: &str,
        site: &SiteDescriptor,
        extraction: &Extraction,
        first_seen: DateTime<Utc>,
        now: DateTime<Utc>,
        kind: ChangeKind,
        changes_html: String,
        previous_html: String,
    ) -> ChangeEvent {
        ChangeEvent {
            id: ChangeEvent::make_id(slug, &now),
            slug: slug.to_string(),
            name: site.name.clone(),
            region: site.region.clone(),
            url: site.url.clone(),
            first_seen: Some(first_seen),
            checked_at: now,
            kind,
            selectors_used: extraction.selectors_used.clone(),
            matched_nodes: extraction.matched_nodes.clone(),
            changes_html,
            previous_html,
        }
    }
}

/// First 12 hex digits of a hash.
pub fn short_hash(hash: &str) -> &str {
    hash.get(..12).unwrap_or(hash)
}
