//! Artifact Emitter - Normalized Entries to a Rule Pack
//!
//! Emission is a pure substitution of four per-entry fields into a fixed
//! `RuleTemplate`. The resulting `RulePack` is the in-memory artifact; its
//! JSON rendering is the file written to disk. Same entries in, same bytes
//! out.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

use crate::hashing::content_hash;
use crate::model::{calculate_severity, Severity};
use crate::normalize::NormalizedEntry;
use crate::rules::{
    curated_rules, Applicability, MitigationCheck, RiskCategory, RiskRule, RuleDescriptor,
};
use crate::templates::{PatternError, Placeholder, RuleTemplate, TextPattern};
use crate::ENGINE_VERSION;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Template render error: {0}")]
    Template(String),

    #[error("Template render error: {0}")]
    Pattern(#[from] PatternError),

    #[error("Template render error: duplicate registry identifier {0:?}")]
    DuplicateIdentifier(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum PackError {
    #[error("Invalid rule pack: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Rule pack registry does not list its rules in order")]
    RegistryMismatch,

    #[error("Rule pack hash mismatch: recorded {recorded}, computed {computed}")]
    HashMismatch { recorded: String, computed: String },
}

/// The compiled artifact: every rule plus the ordered registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RulePack {
    pub engine_version: String,
    pub template_version: String,
    pub namespace: String,
    pub catalog_digest: String,
    pub rules: Vec<RuleDescriptor>,
    pub registry: Vec<String>,
    pub pack_hash: String,
}

/// Everything in a pack except its own hash.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PackContent<'a> {
    engine_version: &'a str,
    template_version: &'a str,
    namespace: &'a str,
    catalog_digest: &'a str,
    rules: &'a [RuleDescriptor],
    registry: &'a [String],
}

impl RulePack {
    pub fn compute_hash(&self) -> Result<String, serde_json::Error> {
        content_hash(&PackContent {
            engine_version: &self.engine_version,
            template_version: &self.template_version,
            namespace: &self.namespace,
            catalog_digest: &self.catalog_digest,
            rules: &self.rules,
            registry: &self.registry,
        })
    }

    /// Pretty JSON with a trailing newline. This is the on-disk format.
    pub fn render(&self) -> Result<String, RenderError> {
        let mut text = serde_json::to_string_pretty(self)?;
        text.push('\n');
        Ok(text)
    }

    /// Reload a rendered pack, checking the registry and hash.
    pub fn from_json(json: &str) -> Result<Self, PackError> {
        let pack: RulePack = serde_json::from_str(json)?;
        let in_order = pack.registry.len() == pack.rules.len()
            && pack
                .registry
                .iter()
                .zip(&pack.rules)
                .all(|(id, rule)| *id == rule.identifier);
        if !in_order {
            return Err(PackError::RegistryMismatch);
        }
        let computed = pack.compute_hash()?;
        if computed != pack.pack_hash {
            return Err(PackError::HashMismatch { recorded: pack.pack_hash, computed });
        }
        Ok(pack)
    }

    /// Rules in registry order, ready for a host engine.
    pub fn registry(&self) -> Vec<&dyn RiskRule> {
        self.rules.iter().map(|r| r as &dyn RiskRule).collect()
    }

    pub fn rule(&self, identifier: &str) -> Option<&RuleDescriptor> {
        self.rules.iter().find(|r| r.identifier == identifier)
    }
}

/// A validated template, ready to render entries.
#[derive(Debug)]
pub struct Emitter<'t> {
    template: &'t RuleTemplate,
    description: TextPattern,
    finding_title: TextPattern,
    severity: Severity,
}

impl<'t> Emitter<'t> {
    /// Check the template once. Any error here is a configuration problem,
    /// never a property of the catalog.
    pub fn new(template: &'t RuleTemplate) -> Result<Self, RenderError> {
        if template.namespace.trim().is_empty() {
            return Err(RenderError::Template("namespace must not be empty".into()));
        }
        if template.supported_tags.iter().all(|t| t.trim().is_empty()) {
            return Err(RenderError::Template("supportedTags must name at least one tag".into()));
        }

        let description = TextPattern::parse(&template.description_pattern)?;
        if description.uses(Placeholder::Component) {
            return Err(RenderError::Template(format!(
                "descriptionPattern cannot use {} (descriptions are per category, not per component)",
                Placeholder::Component
            )));
        }
        let finding_title = TextPattern::parse(&template.finding_title)?;

        Ok(Self {
            template,
            description,
            finding_title,
            severity: calculate_severity(template.likelihood, template.impact_level),
        })
    }

    /// Render one rule. Empty titles render to empty strings, never errors.
    pub fn render_entry(&self, entry: &NormalizedEntry) -> RuleDescriptor {
        let t = self.template;
        let mitigation = MitigationCheck::from_tags(t.mitigation_tags_for(&entry.identifier));
        if mitigation != MitigationCheck::None {
            tracing::debug!(identifier = %entry.identifier, "applying mitigation override");
        }

        RuleDescriptor {
            identifier: entry.identifier.clone(),
            category: RiskCategory {
                id: entry.category_key.clone(),
                title: entry.title.clone(),
                description: self.description.render(&entry.title, ""),
                impact: t.impact.clone(),
                function: t.function,
                stride: t.stride,
                action: t.action.clone(),
                mitigation: t.mitigation.clone(),
                check: t.check.clone(),
                cwe: None,
                asvs: None,
                cheat_sheet: None,
            },
            supported_tags: t
                .supported_tags
                .iter()
                .filter(|tag| !tag.trim().is_empty())
                .cloned()
                .collect(),
            applicability: Applicability::AnyTag,
            likelihood: t.likelihood,
            impact: t.impact_level,
            severity: self.severity,
            data_breach_probability: t.data_breach_probability,
            finding_title: self.finding_title.clone(),
            mitigation,
        }
    }

    /// Render every entry, append curated rules, and seal the pack.
    pub fn emit(
        &self,
        entries: &[NormalizedEntry],
        catalog_digest: &str,
    ) -> Result<RulePack, RenderError> {
        let mut rules: Vec<RuleDescriptor> = entries.iter().map(|e| self.render_entry(e)).collect();
        if self.template.include_curated {
            rules.extend(curated_rules());
        }

        // Catalog identifiers are alphanumeric and deduplicated, curated ones
        // carry a `/`; a clash here is a bug, not a catalog problem.
        let mut seen = HashSet::new();
        for rule in &rules {
            if !seen.insert(rule.identifier.as_str()) {
                return Err(RenderError::DuplicateIdentifier(rule.identifier.clone()));
            }
        }

        let registry = rules.iter().map(|r| r.identifier.clone()).collect();
        let mut pack = RulePack {
            engine_version: ENGINE_VERSION.to_string(),
            template_version: self.template.template_version.clone(),
            namespace: self.template.namespace.clone(),
            catalog_digest: catalog_digest.to_string(),
            rules,
            registry,
            pack_hash: String::new(),
        };
        pack.pack_hash = pack.compute_hash()?;
        Ok(pack)
    }
}
