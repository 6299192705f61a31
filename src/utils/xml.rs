// src/utils/xml.rs

//! Helpers for embedding HTML fragments in XML documents.

use scraper::Html;

use crate::services::extractor::strip_noise;

/// CDATA terminator, which must never appear inside one section.
const CDATA_END: &str = "]]>";

/// Whether `c` is allowed by the XML 1.0 `Char` production.
pub fn is_xml_char(c: char) -> bool {
    matches!(c,
        '\t' | '\n' | '\r'
        | '\u{20}'..='\u{D7FF}'
        | '\u{E000}'..='\u{FFFD}'
        | '\u{10000}'..='\u{10FFFF}')
}

/// Drop every character XML 1.0 cannot carry.
pub fn xml_safe(text: &str) -> String {
    text.chars().filter(|&c| is_xml_char(c)).collect()
}

/// Re-parse an HTML fragment and drop active content and comments.
pub fn sanitize_fragment(fragment: &str) -> String {
    if fragment.trim().is_empty() {
        return String::new();
    }
    let mut html = Html::parse_fragment(fragment);
    strip_noise(&mut html);
    html.root_element().inner_html()
}

/// Split `content` into CDATA section bodies that never contain `]]>`.
///
/// Concatenating the sections gives back `content`.
pub fn cdata_sections(content: &str) -> Vec<String> {
    let mut sections = Vec::new();
    let mut rest = content;
    let mut carry = "";
    while let Some(pos) = rest.find(CDATA_END) {
        sections.push(format!("{carry}{}]]", &rest[..pos]));
        carry = ">";
        rest = &rest[pos + CDATA_END.len()..];
    }
    sections.push(format!("{carry}{rest}"));
    sections
}
