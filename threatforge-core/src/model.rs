//! Host Model Interface - What Rules Are Evaluated Against
//!
//! Rules never own the model. They read components through `SystemModel`
//! and `Component`, which a host engine implements over its own graph.
//! `ThreatModel` is the in-memory reference implementation used by the CLI
//! and the tests.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Likelihood {
    Unlikely,
    Likely,
    VeryLikely,
    Frequent,
}

impl Likelihood {
    pub fn weight(self) -> u32 {
        match self {
            Likelihood::Unlikely => 1,
            Likelihood::Likely => 2,
            Likelihood::VeryLikely => 3,
            Likelihood::Frequent => 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Impact {
    Low,
    Medium,
    High,
    VeryHigh,
}

impl Impact {
    pub fn weight(self) -> u32 {
        match self {
            Impact::Low => 1,
            Impact::Medium => 2,
            Impact::High => 3,
            Impact::VeryHigh => 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Severity {
    Low,
    Medium,
    Elevated,
    High,
    Critical,
}

/// Severity matrix: likelihood weight times impact weight, bucketed.
pub fn calculate_severity(likelihood: Likelihood, impact: Impact) -> Severity {
    match likelihood.weight() * impact.weight() {
        0..=1 => Severity::Low,
        2..=3 => Severity::Medium,
        4..=8 => Severity::Elevated,
        9..=12 => Severity::High,
        _ => Severity::Critical,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DataBreachProbability {
    Improbable,
    Possible,
    Probable,
}

/// Organisational function a risk category is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RiskFunction {
    BusinessSide,
    Architecture,
    Development,
    Operations,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Stride {
    Spoofing,
    Tampering,
    Repudiation,
    InformationDisclosure,
    DenialOfService,
    ElevationOfPrivilege,
}

/// A single component as seen by a rule.
pub trait Component {
    fn id(&self) -> &str;
    fn display_name(&self) -> &str;
    fn is_out_of_scope(&self) -> bool;
    fn is_tagged_with(&self, tag: &str) -> bool;

    fn is_tagged_with_any(&self, tags: &[&str]) -> bool {
        tags.iter().any(|tag| self.is_tagged_with(tag))
    }
}

/// Read-only view of a system model.
///
/// `sorted_component_ids` must be a deterministic total order; rules visit
/// components in exactly that order so findings are reproducible.
pub trait SystemModel {
    fn sorted_component_ids(&self) -> Vec<&str>;
    fn component_by_id(&self, id: &str) -> Option<&dyn Component>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TechnicalAsset {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub out_of_scope: bool,
}

impl Component for TechnicalAsset {
    fn id(&self) -> &str {
        &self.id
    }

    fn display_name(&self) -> &str {
        &self.title
    }

    fn is_out_of_scope(&self) -> bool {
        self.out_of_scope
    }

    // Tags compare case-insensitively, matching how threat models are authored.
    fn is_tagged_with(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t.eq_ignore_ascii_case(tag))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ModelFile {
    #[serde(default)]
    technical_assets: Vec<TechnicalAsset>,
}

/// In-memory model keyed by asset id; iteration order is lexicographic.
#[derive(Debug, Clone, Default)]
pub struct ThreatModel {
    assets: BTreeMap<String, TechnicalAsset>,
}

impl ThreatModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from assets. A later asset with an already-used id replaces the earlier one.
    pub fn from_assets(assets: impl IntoIterator<Item = TechnicalAsset>) -> Self {
        let mut model = Self::new();
        for asset in assets {
            model.insert(asset);
        }
        model
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let file: ModelFile = serde_json::from_str(json)?;
        Ok(Self::from_assets(file.technical_assets))
    }

    pub fn insert(&mut self, asset: TechnicalAsset) {
        self.assets.insert(asset.id.clone(), asset);
    }
}

impl SystemModel for ThreatModel {
    fn sorted_component_ids(&self) -> Vec<&str> {
        self.assets.keys().map(String::as_str).collect()
    }

    fn component_by_id(&self, id: &str) -> Option<&dyn Component> {
        self.assets.get(id).map(|a| a as &dyn Component)
    }
}
