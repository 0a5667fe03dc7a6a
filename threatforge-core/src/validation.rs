//! Catalog Lint - Rule/Policy Separation
//!
//! Checks produce structured diagnostics about a normalization result.
//! Policy (`FailureMode` in the template's lint config) decides whether any
//! of them stop the compile. Normalization itself never fails; this is where
//! silently dropped entries become visible.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::normalize::{IdentifierSource, Normalization};
use crate::rules::curated_rules;
use crate::templates::{FailureMode, RuleTemplate};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticSeverity {
    Error,
    Warning,
    Info,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Diagnostic {
    pub check: String,
    pub severity: DiagnosticSeverity,
    pub message: String,
    pub identifier: Option<String>,
    pub remediation: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LintReport {
    pub passed: bool,
    pub diagnostics: Vec<Diagnostic>,
}

impl LintReport {
    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(|d| d.severity == DiagnosticSeverity::Error)
    }

    pub fn by_check<'a>(&'a self, check: &'a str) -> impl Iterator<Item = &'a Diagnostic> + 'a {
        self.diagnostics.iter().filter(move |d| d.check == check)
    }
}

/// Lint check trait - produces diagnostics
pub trait CatalogCheck {
    fn name(&self) -> &'static str;
    fn check(&self, normalization: &Normalization, template: &RuleTemplate) -> Vec<Diagnostic>;
}

fn diagnostic(
    check: &dyn CatalogCheck,
    severity: DiagnosticSeverity,
    identifier: Option<&str>,
    message: String,
    remediation: &str,
) -> Diagnostic {
    Diagnostic {
        check: check.name().to_string(),
        severity,
        message,
        identifier: identifier.map(str::to_string),
        remediation: vec![remediation.to_string()],
    }
}

// --- Concrete Checks ---

pub struct DuplicateIdentifierCheck;

impl CatalogCheck for DuplicateIdentifierCheck {
    fn name(&self) -> &'static str { "duplicate_identifier" }

    fn check(&self, normalization: &Normalization, _template: &RuleTemplate) -> Vec<Diagnostic> {
        normalization
            .dropped
            .iter()
            .map(|d| {
                diagnostic(
                    self,
                    DiagnosticSeverity::Error,
                    Some(d.identifier.as_str()),
                    format!(
                        "Class {:?} (id {:?}) in group {:?} maps to identifier {:?}, already taken; it was dropped",
                        d.entry.raw_name, d.entry.raw_id, d.group, d.identifier
                    ),
                    "Rename the class so its alphanumeric characters differ from the earlier entry",
                )
            })
            .collect()
    }
}

pub struct EmptyIdentifierCheck;

impl CatalogCheck for EmptyIdentifierCheck {
    fn name(&self) -> &'static str { "empty_identifier" }

    fn check(&self, normalization: &Normalization, _template: &RuleTemplate) -> Vec<Diagnostic> {
        normalization
            .entries
            .iter()
            .filter(|e| e.identifier.is_empty())
            .map(|e| {
                diagnostic(
                    self,
                    DiagnosticSeverity::Error,
                    Some(""),
                    format!("Class titled {:?} has no letters or digits in its name or id", e.title),
                    "Give the class an alphanumeric name or id",
                )
            })
            .collect()
    }
}

pub struct CategoryKeyCollisionCheck;

impl CatalogCheck for CategoryKeyCollisionCheck {
    fn name(&self) -> &'static str { "category_key_collision" }

    fn check(&self, normalization: &Normalization, template: &RuleTemplate) -> Vec<Diagnostic> {
        let curated = if template.include_curated { curated_rules() } else { vec![] };
        let mut owners: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        for entry in &normalization.entries {
            owners.entry(&entry.category_key).or_default().push(&entry.identifier);
        }
        for rule in &curated {
            owners.entry(&rule.category.id).or_default().push(&rule.identifier);
        }

        owners
            .into_iter()
            .filter(|(_, ids)| ids.len() > 1)
            .map(|(key, ids)| {
                diagnostic(
                    self,
                    DiagnosticSeverity::Error,
                    ids.first().copied(),
                    format!("Category key {key:?} is shared by rules {ids:?}; their findings would share synthetic ids"),
                    "Make the class names differ by more than letter case",
                )
            })
            .collect()
    }
}

pub struct IdentifierFallbackCheck;

impl CatalogCheck for IdentifierFallbackCheck {
    fn name(&self) -> &'static str { "identifier_fallback" }

    fn check(&self, normalization: &Normalization, _template: &RuleTemplate) -> Vec<Diagnostic> {
        normalization
            .entries
            .iter()
            .filter(|e| e.identifier_source == IdentifierSource::Id && !e.identifier.is_empty())
            .map(|e| {
                diagnostic(
                    self,
                    DiagnosticSeverity::Info,
                    Some(e.identifier.as_str()),
                    format!("Identifier {:?} was derived from the class id", e.identifier),
                    "Add an alphanumeric name to the class",
                )
            })
            .collect()
    }
}

pub struct EmptyTitleCheck;

impl CatalogCheck for EmptyTitleCheck {
    fn name(&self) -> &'static str { "empty_title" }

    fn check(&self, normalization: &Normalization, _template: &RuleTemplate) -> Vec<Diagnostic> {
        normalization
            .entries
            .iter()
            .filter(|e| e.title.trim().is_empty())
            .map(|e| {
                diagnostic(
                    self,
                    DiagnosticSeverity::Warning,
                    Some(e.identifier.as_str()),
                    format!("Rule {:?} has an empty title", e.identifier),
                    "Set the class title attribute",
                )
            })
            .collect()
    }
}

pub struct UnusedMitigationOverrideCheck;

impl CatalogCheck for UnusedMitigationOverrideCheck {
    fn name(&self) -> &'static str { "unused_mitigation_override" }

    fn check(&self, normalization: &Normalization, template: &RuleTemplate) -> Vec<Diagnostic> {
        template
            .mitigation_overrides
            .iter()
            .filter(|o| !normalization.entries.iter().any(|e| e.identifier == o.identifier))
            .map(|o| {
                diagnostic(
                    self,
                    DiagnosticSeverity::Warning,
                    Some(o.identifier.as_str()),
                    format!("Mitigation override for {:?} matches no catalog rule", o.identifier),
                    "Remove the override or fix its identifier",
                )
            })
            .collect()
    }
}

/// Linter orchestrates checks and applies policy
pub struct Linter {
    checks: Vec<Box<dyn CatalogCheck>>,
}

impl Linter {
    pub fn new() -> Self {
        Self {
            checks: vec![
                Box::new(DuplicateIdentifierCheck),
                Box::new(EmptyIdentifierCheck),
                Box::new(CategoryKeyCollisionCheck),
                Box::new(IdentifierFallbackCheck),
                Box::new(EmptyTitleCheck),
                Box::new(UnusedMitigationOverrideCheck),
            ],
        }
    }

    pub fn lint(&self, normalization: &Normalization, template: &RuleTemplate) -> LintReport {
        let diagnostics: Vec<Diagnostic> = self
            .checks
            .iter()
            .filter(|c| template.lint.is_enabled(c.name()))
            .flat_map(|c| c.check(normalization, template))
            .collect();

        let mut report = LintReport { passed: true, diagnostics };
        report.passed = match template.lint.failure_mode {
            FailureMode::Block => !report.has_errors(),
            // Never block, just record
            FailureMode::Warn | FailureMode::Log => true,
        };
        report
    }
}

impl Default for Linter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{CatalogGroup, ClassEntry};
    use crate::normalize::normalize;

    fn normalized(entries: Vec<ClassEntry>) -> Normalization {
        normalize(&[CatalogGroup { name: "G".into(), entries }], "automotive")
    }

    #[test]
    fn dropped_entries_are_reported() {
        let n = normalized(vec![
            ClassEntry::new("TS000", "Spoofing", "a"),
            ClassEntry::new("TS001", "Spoofing!!", "b"),
        ]);
        let report = Linter::new().lint(&n, &RuleTemplate::default());
        assert!(report.passed);
        let dups: Vec<_> = report.by_check("duplicate_identifier").collect();
        assert_eq!(dups.len(), 1);
        assert_eq!(dups[0].identifier.as_deref(), Some("Spoofing"));
        assert!(dups[0].message.contains("TS001"));
    }

    #[test]
    fn case_only_differences_collide_on_category_key() {
        let n = normalized(vec![
            ClassEntry::new("A", "Spoofing", "a"),
            ClassEntry::new("B", "spoofing", "b"),
        ]);
        assert_eq!(n.entries.len(), 2);
        let report = Linter::new().lint(&n, &RuleTemplate::default());
        assert_eq!(report.by_check("category_key_collision").count(), 1);
    }

    #[test]
    fn block_policy_fails_on_errors_only() {
        let mut template = RuleTemplate::default();
        template.lint.failure_mode = FailureMode::Block;

        let clean = normalized(vec![ClassEntry::new("TPe006", "TPe006", "")]);
        let report = Linter::new().lint(&clean, &template);
        assert!(report.passed);
        assert_eq!(report.by_check("empty_title").count(), 1);

        let dirty = normalized(vec![
            ClassEntry::new("1", "X", "x"),
            ClassEntry::new("2", "X.", "y"),
        ]);
        assert!(!Linter::new().lint(&dirty, &template).passed);
    }

    #[test]
    fn disabled_checks_are_skipped() {
        let mut template = RuleTemplate::default();
        template.lint.disabled = vec!["unused_mitigation_override".into()];
        let n = normalized(vec![ClassEntry::new("1", "X", "x")]);
        let report = Linter::new().lint(&n, &template);
        assert_eq!(report.by_check("unused_mitigation_override").count(), 0);

        let report = Linter::new().lint(&n, &RuleTemplate::default());
        assert_eq!(report.by_check("unused_mitigation_override").count(), 1);
    }

    #[test]
    fn fallback_is_informational() {
        let n = normalized(vec![ClassEntry::new("TS.9", "--", "t")]);
        let report = Linter::new().lint(&n, &RuleTemplate::default());
        let fallback: Vec<_> = report.by_check("identifier_fallback").collect();
        assert_eq!(fallback.len(), 1);
        assert_eq!(fallback[0].severity, DiagnosticSeverity::Info);
    }
}
