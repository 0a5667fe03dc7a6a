//! Entry Normalizer - Stable Identifiers
//!
//! Walks catalog groups in document order and derives one `NormalizedEntry`
//! per class. The first entry to produce an identifier owns it; later entries
//! mapping to the same identifier are dropped from the output and recorded in
//! `Normalization::dropped`. Normalization never fails.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::catalog::{CatalogGroup, ClassEntry};

/// Which source field produced an identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentifierSource {
    Name,
    Id,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedEntry {
    pub identifier: String,
    pub identifier_source: IdentifierSource,
    pub slug: String,
    pub category_key: String,
    pub title: String,
    pub group: String,
}

/// An entry that lost its identifier to an earlier one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DroppedEntry {
    pub identifier: String,
    pub group: String,
    pub entry: ClassEntry,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Normalization {
    pub entries: Vec<NormalizedEntry>,
    pub dropped: Vec<DroppedEntry>,
}

/// Keep ASCII letters and digits only. Case is preserved.
pub fn sanitize(raw: &str) -> String {
    raw.chars().filter(char::is_ascii_alphanumeric).collect()
}

/// Lowercase with dots turned into dashes. Nothing else is rewritten.
pub fn slugify(raw_name: &str) -> String {
    raw_name.replace('.', "-").to_lowercase()
}

pub fn category_key(namespace: &str, slug: &str) -> String {
    format!("{namespace}-{slug}")
}

/// Identifier for an entry before dedup: sanitized name, else sanitized id.
pub fn candidate_identifier(entry: &ClassEntry) -> (String, IdentifierSource) {
    let from_name = sanitize(&entry.raw_name);
    if from_name.is_empty() {
        (sanitize(&entry.raw_id), IdentifierSource::Id)
    } else {
        (from_name, IdentifierSource::Name)
    }
}

/// Normalize every class across all groups.
///
/// The seen-identifier set spans the whole catalog, not each group.
pub fn normalize(groups: &[CatalogGroup], namespace: &str) -> Normalization {
    let (normalization, _seen) = groups
        .iter()
        .flat_map(|group| group.entries.iter().map(move |entry| (group, entry)))
        .fold(
            (Normalization::default(), HashSet::new()),
            |(mut acc, mut seen), (group, entry)| {
                let (identifier, identifier_source) = candidate_identifier(entry);
                if seen.insert(identifier.clone()) {
                    let slug = slugify(&entry.raw_name);
                    acc.entries.push(NormalizedEntry {
                        category_key: category_key(namespace, &slug),
                        identifier,
                        identifier_source,
                        slug,
                        title: entry.raw_title.clone(),
                        group: group.name.clone(),
                    });
                } else {
                    acc.dropped.push(DroppedEntry {
                        identifier,
                        group: group.name.clone(),
                        entry: entry.clone(),
                    });
                }
                (acc, seen)
            },
        );
    normalization
}

#[cfg(test)]
mod tests {
    use super::*;

    fn group(name: &str, entries: Vec<ClassEntry>) -> CatalogGroup {
        CatalogGroup { name: name.to_string(), entries }
    }

    #[test]
    fn sanitize_strips_separators_and_keeps_case() {
        assert_eq!(sanitize("AB.12-cd!"), "AB12cd");
        assert_eq!(sanitize("..."), "");
        assert_eq!(sanitize("Größe 1"), "Gre1");
    }

    #[test]
    fn slug_only_rewrites_dots() {
        assert_eq!(slugify("Identity.Spoofing"), "identity-spoofing");
        assert_eq!(slugify("T.Pe.006"), "t-pe-006");
        assert_eq!(slugify("Two Words"), "two words");
    }

    #[test]
    fn falls_back_to_raw_id() {
        let groups = vec![group("G", vec![ClassEntry::new("TS.000", "...", "Dots only")])];
        let result = normalize(&groups, "automotive");
        let entry = &result.entries[0];
        assert_eq!(entry.identifier, "TS000");
        assert_eq!(entry.identifier_source, IdentifierSource::Id);
        // The slug still derives from the name.
        assert_eq!(entry.category_key, "automotive----");
    }

    #[test]
    fn first_entry_wins_across_groups() {
        let groups = vec![
            group("A", vec![ClassEntry::new("TS000", "Spoofing", "first")]),
            group("B", vec![ClassEntry::new("TS900", "Spoofing!!", "second")]),
        ];
        let result = normalize(&groups, "automotive");
        assert_eq!(result.entries.len(), 1);
        assert_eq!(result.entries[0].title, "first");
        assert_eq!(result.entries[0].group, "A");
        assert_eq!(result.dropped.len(), 1);
        assert_eq!(result.dropped[0].identifier, "Spoofing");
        assert_eq!(result.dropped[0].group, "B");
    }

    #[test]
    fn empty_titles_still_normalize() {
        let groups = vec![group("G", vec![ClassEntry::new("X1", "Thing", "")])];
        let result = normalize(&groups, "ns");
        assert_eq!(result.entries[0].title, "");
        assert_eq!(result.entries[0].category_key, "ns-thing");
    }

    #[test]
    fn unidentifiable_entries_share_the_empty_identifier() {
        let groups = vec![group(
            "G",
            vec![ClassEntry::new("", "", "one"), ClassEntry::new("--", "!!", "two")],
        )];
        let result = normalize(&groups, "ns");
        assert_eq!(result.entries.len(), 1);
        assert_eq!(result.entries[0].identifier, "");
        assert_eq!(result.dropped.len(), 1);
    }
}
