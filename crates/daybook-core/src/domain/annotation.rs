//! Provenance annotations
//!
//! Event descriptions may carry a trailing machine-generated block that
//! records who created and who last edited the event:
//!
//! ```text
//! Quarterly planning notes.
//!
//! ---
//! created by alice@daybook.app at 2026-03-01T09:00:00+00:00
//! last edited by bob@daybook.app at 2026-03-04T17:30:00+00:00
//! ```
//!
//! The block is parsed structurally: a separator line followed only by
//! labeled annotation lines. Anything that does not parse as an
//! annotation keeps the whole tail as author content, so a description
//! that merely contains `---` is never mangled.
//!
//! Change detection compares descriptions with all annotations stripped
//! and whitespace collapsed, so annotation churn never looks like a real
//! edit.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Line that separates author content from the annotation block
pub const ANNOTATION_SEPARATOR: &str = "---";

const CREATED_LABEL: &str = "created by ";
const EDITED_LABEL: &str = "last edited by ";
const AT_INFIX: &str = " at ";

// ============================================================================
// Annotation
// ============================================================================

/// Kind of a provenance annotation line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnnotationKind {
    /// Records the original author
    Created,
    /// Records the most recent editor
    Edited,
}

/// One parsed provenance line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Annotation {
    /// Whether this is a creation or edit record
    pub kind: AnnotationKind,
    /// Author the line attributes the change to
    pub author: String,
    /// When the change happened
    pub at: DateTime<Utc>,
}

impl Annotation {
    /// Creates a creation annotation
    pub fn created(author: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            kind: AnnotationKind::Created,
            author: author.into(),
            at,
        }
    }

    /// Creates an edit annotation
    pub fn edited(author: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            kind: AnnotationKind::Edited,
            author: author.into(),
            at,
        }
    }

    /// Parses a single annotation line
    ///
    /// Returns `None` if the line does not match the labeled pattern or
    /// its timestamp is not RFC 3339. The timestamp is taken after the
    /// *last* ` at ` so author names containing ` at ` still parse.
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        let (kind, rest) = if let Some(rest) = line.strip_prefix(CREATED_LABEL) {
            (AnnotationKind::Created, rest)
        } else if let Some(rest) = line.strip_prefix(EDITED_LABEL) {
            (AnnotationKind::Edited, rest)
        } else {
            return None;
        };

        let at_pos = rest.rfind(AT_INFIX)?;
        let author = rest[..at_pos].trim();
        let stamp = rest[at_pos + AT_INFIX.len()..].trim();
        if author.is_empty() {
            return None;
        }

        let at = DateTime::parse_from_rfc3339(stamp).ok()?.with_timezone(&Utc);
        Some(Self {
            kind,
            author: author.to_string(),
            at,
        })
    }
}

impl fmt::Display for Annotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self.kind {
            AnnotationKind::Created => CREATED_LABEL,
            AnnotationKind::Edited => EDITED_LABEL,
        };
        write!(
            f,
            "{label}{}{AT_INFIX}{}",
            self.author,
            self.at.to_rfc3339_opts(SecondsFormat::Secs, true)
        )
    }
}

// ============================================================================
// Description splitting
// ============================================================================

/// Splits a description into author content and its parsed annotations
///
/// The annotation block is the tail that starts at the last separator
/// line whose following non-empty lines *all* parse as annotations. If no
/// such tail exists the whole description is author content.
pub fn split_description(description: &str) -> (String, Vec<Annotation>) {
    let lines: Vec<&str> = description.lines().collect();

    // Find the last separator line that opens a well-formed block.
    for (idx, line) in lines.iter().enumerate().rev() {
        if line.trim() != ANNOTATION_SEPARATOR {
            continue;
        }
        let tail = &lines[idx + 1..];
        let parsed: Vec<Annotation> = tail
            .iter()
            .filter(|l| !l.trim().is_empty())
            .map(|l| Annotation::parse(l))
            .collect::<Option<Vec<_>>>()
            .unwrap_or_default();

        let non_empty = tail.iter().filter(|l| !l.trim().is_empty()).count();
        if non_empty > 0 && parsed.len() == non_empty {
            let core = lines[..idx].join("\n");
            return (core.trim_end().to_string(), parsed);
        }
    }

    (description.trim_end().to_string(), Vec::new())
}

/// Returns the author content with the annotation block removed
pub fn extract_core_content(description: &str) -> String {
    split_description(description).0
}

/// Normalizes a description for change-detection equality
///
/// Strips all annotations and separators, then collapses whitespace runs,
/// so formatting and annotation churn never register as content changes.
pub fn normalize_for_comparison(description: &str) -> String {
    let core = extract_core_content(description);
    core.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Renders author content plus an annotation block
fn render(core: &str, annotations: &[Annotation]) -> String {
    if annotations.is_empty() {
        return core.to_string();
    }
    let mut out = String::with_capacity(core.len() + 64 * annotations.len());
    out.push_str(core);
    if !core.is_empty() {
        out.push_str("\n\n");
    }
    out.push_str(ANNOTATION_SEPARATOR);
    for annotation in annotations {
        out.push('\n');
        out.push_str(&annotation.to_string());
    }
    out
}

/// Prepares an incoming remote description for local storage
///
/// Keeps the author content and the existing creation annotation; edit
/// annotations from the remote copy are dropped. If no creation
/// annotation exists, one is generated for `author` at `now`.
pub fn ensure_created_annotation(description: &str, author: &str, now: DateTime<Utc>) -> String {
    let (core, annotations) = split_description(description);
    let created = annotations
        .into_iter()
        .find(|a| a.kind == AnnotationKind::Created)
        .unwrap_or_else(|| Annotation::created(author, now));
    render(&core, &[created])
}

/// Prepares an outgoing local description for the remote service
///
/// Strips existing edit annotations, keeps creation annotations (never
/// duplicated), and appends exactly one fresh edit annotation.
pub fn refresh_edit_annotation(description: &str, author: &str, now: DateTime<Utc>) -> String {
    let (core, annotations) = split_description(description);
    let mut kept: Vec<Annotation> = annotations
        .into_iter()
        .filter(|a| a.kind == AnnotationKind::Created)
        .collect();
    kept.dedup_by(|a, b| a.kind == b.kind);
    kept.push(Annotation::edited(author, now));
    render(&core, &kept)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn stamp() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap()
    }

    fn annotated() -> String {
        render(
            "Quarterly planning notes.",
            &[
                Annotation::created("alice@daybook.app", stamp()),
                Annotation::edited("bob@daybook.app", stamp()),
            ],
        )
    }

    mod parse_tests {
        use super::*;

        #[test]
        fn test_parse_created() {
            let line = "created by alice@daybook.app at 2026-03-01T09:00:00Z";
            let annotation = Annotation::parse(line).unwrap();
            assert_eq!(annotation.kind, AnnotationKind::Created);
            assert_eq!(annotation.author, "alice@daybook.app");
            assert_eq!(annotation.at, stamp());
        }

        #[test]
        fn test_parse_edited() {
            let line = "last edited by bob at 2026-03-01T09:00:00+00:00";
            let annotation = Annotation::parse(line).unwrap();
            assert_eq!(annotation.kind, AnnotationKind::Edited);
            assert_eq!(annotation.author, "bob");
        }

        #[test]
        fn test_parse_author_containing_at() {
            let line = "created by night owl at the office at 2026-03-01T09:00:00Z";
            let annotation = Annotation::parse(line).unwrap();
            assert_eq!(annotation.author, "night owl at the office");
        }

        #[test]
        fn test_parse_rejects_bad_timestamp() {
            assert!(Annotation::parse("created by alice at yesterday").is_none());
        }

        #[test]
        fn test_parse_rejects_unlabeled_line() {
            assert!(Annotation::parse("some footnote").is_none());
        }

        #[test]
        fn test_display_roundtrip() {
            let annotation = Annotation::edited("bob", stamp());
            let parsed = Annotation::parse(&annotation.to_string()).unwrap();
            assert_eq!(annotation, parsed);
        }
    }

    mod split_tests {
        use super::*;

        #[test]
        fn test_split_without_block() {
            let (core, annotations) = split_description("Just notes.");
            assert_eq!(core, "Just notes.");
            assert!(annotations.is_empty());
        }

        #[test]
        fn test_split_with_block() {
            let (core, annotations) = split_description(&annotated());
            assert_eq!(core, "Quarterly planning notes.");
            assert_eq!(annotations.len(), 2);
        }

        #[test]
        fn test_separator_in_author_content_kept() {
            let text = "Agenda\n---\nnot an annotation line";
            let (core, annotations) = split_description(text);
            assert_eq!(core, text);
            assert!(annotations.is_empty());
        }

        #[test]
        fn test_last_block_wins() {
            let text = format!(
                "Notes\n---\nstill author content\n\n---\ncreated by alice at {}",
                stamp().to_rfc3339()
            );
            let (core, annotations) = split_description(&text);
            assert!(core.contains("still author content"));
            assert_eq!(annotations.len(), 1);
        }
    }

    mod normalization_tests {
        use super::*;

        #[test]
        fn test_annotation_churn_is_invisible() {
            let plain = "Quarterly planning notes.";
            assert_eq!(
                normalize_for_comparison(plain),
                normalize_for_comparison(&annotated())
            );
        }

        #[test]
        fn test_whitespace_collapsed() {
            assert_eq!(
                normalize_for_comparison("a   b\n\nc"),
                normalize_for_comparison("a b c")
            );
        }

        #[test]
        fn test_real_edit_still_visible() {
            assert_ne!(
                normalize_for_comparison("old text"),
                normalize_for_comparison("new text")
            );
        }
    }

    mod rewrite_tests {
        use super::*;

        #[test]
        fn test_ensure_created_generates_when_missing() {
            let result = ensure_created_annotation("Notes.", "alice", stamp());
            let (core, annotations) = split_description(&result);
            assert_eq!(core, "Notes.");
            assert_eq!(annotations.len(), 1);
            assert_eq!(annotations[0].kind, AnnotationKind::Created);
            assert_eq!(annotations[0].author, "alice");
        }

        #[test]
        fn test_ensure_created_keeps_existing() {
            let result = ensure_created_annotation(&annotated(), "carol", stamp());
            let (_, annotations) = split_description(&result);
            assert_eq!(annotations.len(), 1);
            assert_eq!(annotations[0].author, "alice@daybook.app");
        }

        #[test]
        fn test_refresh_edit_replaces_old_edits() {
            let result = refresh_edit_annotation(&annotated(), "carol", stamp());
            let (_, annotations) = split_description(&result);
            let edits: Vec<_> = annotations
                .iter()
                .filter(|a| a.kind == AnnotationKind::Edited)
                .collect();
            assert_eq!(edits.len(), 1);
            assert_eq!(edits[0].author, "carol");
            // Creation annotation preserved, never duplicated
            let created: Vec<_> = annotations
                .iter()
                .filter(|a| a.kind == AnnotationKind::Created)
                .collect();
            assert_eq!(created.len(), 1);
        }

        #[test]
        fn test_core_roundtrip_stability() {
            // core(add_edit(core(x))) == core(x)
            let samples = [
                "plain text",
                "",
                "multi\nline\ncontent",
                &annotated(),
                "ends with separator\n---",
            ];
            for sample in samples {
                let core = extract_core_content(sample);
                let with_edit = refresh_edit_annotation(&core, "alice", stamp());
                assert_eq!(extract_core_content(&with_edit), core, "sample: {sample:?}");
            }
        }
    }
}
