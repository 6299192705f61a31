//! Sequence alignment and paragraph diff.
//!
//! [`align`] is a generic minimal edit-script alignment over any
//! comparable sequence. [`added_paragraphs`] builds on it to find the
//! paragraphs that are new in a page's display content.

use std::hash::Hash;
use std::ops::Range;
use std::sync::LazyLock;

use regex::Regex;
use similar::{Algorithm, DiffOp, capture_diff_slices};

use crate::services::normalizer::{normalize, strip_placeholders};

/// One aligned range between an old and a new sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Opcode {
    /// Both ranges hold equal elements
    Equal { old: Range<usize>, new: Range<usize> },
    /// Old elements without counterpart
    Delete { old: Range<usize>, new: Range<usize> },
    /// New elements without counterpart
    Insert { old: Range<usize>, new: Range<usize> },
    /// Old elements replaced by new ones
    Replace { old: Range<usize>, new: Range<usize> },
}

/// Align two sequences with a Myers diff.
pub fn align<T: Eq + Hash + Ord>(old: &[T], new: &[T]) -> Vec<Opcode> {
    capture_diff_slices(Algorithm::Myers, old, new)
        .into_iter()
        .map(|op| match op {
            DiffOp::Equal {
                old_index,
                new_index,
                len,
            } => Opcode::Equal {
                old: old_index..old_index + len,
                new: new_index..new_index + len,
            },
            DiffOp::Delete {
                old_index,
                old_len,
                new_index,
            } => Opcode::Delete {
                old: old_index..old_index + old_len,
                new: new_index..new_index,
            },
            DiffOp::Insert {
                old_index,
                new_index,
                new_len,
            } => Opcode::Insert {
                old: old_index..old_index,
                new: new_index..new_index + new_len,
            },
            DiffOp::Replace {
                old_index,
                old_len,
                new_index,
                new_len,
            } => Opcode::Replace {
                old: old_index..old_index + old_len,
                new: new_index..new_index + new_len,
            },
        })
        .collect()
}

static BLANK_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{3,}").unwrap_or_else(|e| panic!("blank-run pattern: {e}")));

/// Split display text into trimmed, non-empty paragraphs.
pub fn split_paragraphs(text: &str) -> Vec<String> {
    let text = text.replace("\r\n", "\n").replace('\r', "\n");
    let text = BLANK_RUN.replace_all(&text, "\n\n");
    text.split("\n\n")
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(String::from)
        .collect()
}

/// Paragraphs of `new_text` that carry content not present in `old_text`.
///
/// Inserted paragraphs are always reported. In a replaced range each new
/// paragraph is compared with the old paragraph at the same offset and
/// reported only if they still differ once normalization placeholders are
/// removed; new paragraphs past the end of the old range count as inserted.
pub fn added_paragraphs(old_text: &str, new_text: &str) -> Vec<String> {
    let old_paragraphs = split_paragraphs(old_text);
    let new_paragraphs = split_paragraphs(new_text);

    let old_normalized: Vec<String> = old_paragraphs.iter().map(|p| normalize(p)).collect();
    let new_normalized: Vec<String> = new_paragraphs.iter().map(|p| normalize(p)).collect();

    let mut added = Vec::new();
    for op in align(&old_normalized, &new_normalized) {
        match op {
            Opcode::Insert { new, .. } => {
                added.extend(new_paragraphs[new].iter().cloned());
            }
            Opcode::Replace { old, new } => {
                for (offset, new_index) in new.enumerate() {
                    let counterpart = old.clone().nth(offset);
                    let differs = match counterpart {
                        Some(old_index) => {
                            strip_placeholders(&old_normalized[old_index])
                                != strip_placeholders(&new_normalized[new_index])
                        }
                        None => true,
                    };
                    if differs {
                        added.push(new_paragraphs[new_index].clone());
                    }
                }
            }
            Opcode::Equal { .. } | Opcode::Delete { .. } => {}
        }
    }
    added
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_align_insert_and_replace() {
        let ops = align(&["a", "b", "c"], &["a", "x", "c", "d"]);
        assert_eq!(
            ops,
            vec![
                Opcode::Equal { old: 0..1, new: 0..1 },
                Opcode::Replace { old: 1..2, new: 1..2 },
                Opcode::Equal { old: 2..3, new: 2..3 },
                Opcode::Insert { old: 3..3, new: 3..4 },
            ]
        );
    }

    #[test]
    fn test_align_identical_is_equal() {
        let ops = align(&[1, 2, 3], &[1, 2, 3]);
        assert_eq!(ops, vec![Opcode::Equal { old: 0..3, new: 0..3 }]);
    }

    #[test]
    fn test_split_paragraphs() {
        let text = "A\r\n\r\nB\n\n\n\n  C  \n\n \n\nD\nE";
        assert_eq!(split_paragraphs(text), vec!["A", "B", "C", "D\nE"]);
    }

    #[test]
    fn test_appended_paragraph_is_reported_alone() {
        assert_eq!(added_paragraphs("A\n\nB", "A\n\nB\n\nC"), vec!["C"]);
    }

    #[test]
    fn test_removed_paragraph_is_not_reported() {
        assert!(added_paragraphs("A\n\nB\n\nC", "A\n\nC").is_empty());
    }

    #[test]
    fn test_whitespace_only_change_is_not_reported() {
        assert!(added_paragraphs("Plan  A\n\nB", "Plan A\n\nB").is_empty());
    }

    #[test]
    fn test_replaced_paragraph_is_reported_verbatim() {
        let added = added_paragraphs("Intro\n\nOld  text\n\nOutro", "Intro\n\nNew   text\n\nOutro");
        assert_eq!(added, vec!["New   text"]);
    }

    #[test]
    fn test_placeholder_only_replacement_is_suppressed() {
        let old = "Intro\n\nSeite generiert am 01.02.2024 um 10:11:12 Plan\n\nOutro";
        let new = "Intro\n\nSeite Plan\n\nOutro";
        assert!(added_paragraphs(old, new).is_empty());
    }

    #[test]
    fn test_mid_document_insertions_keep_common_paragraphs() {
        let added = added_paragraphs("H\n\nB\n\nC\n\nF", "H\n\nN\n\nB\n\nC\n\nX\n\nF");
        assert_eq!(added, vec!["N", "X"]);
    }

    #[test]
    fn test_align_keeps_common_tail() {
        let ops = align(&["h", "b", "c", "f"], &["h", "n", "b", "c", "x", "f"]);
        assert!(ops.contains(&Opcode::Equal { old: 1..3, new: 2..4 }));
    }

    #[test]
    fn test_longer_replacement_reports_surplus() {
        let added = added_paragraphs("Intro\n\nOld\n\nOutro", "Intro\n\nNew one\n\nNew two\n\nOutro");
        assert_eq!(added, vec!["New one", "New two"]);
    }
}
