//! Rule Evaluation Contract
//!
//! Every emitted artifact is a `RuleDescriptor`: plain data that implements
//! `RiskRule`. Catalog rules differ only in their category and, for a few, a
//! mitigation tag check. Curated rules reuse the same shape with their own
//! tag sets and severities.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::model::{
    Component, DataBreachProbability, Impact, Likelihood, RiskFunction, Severity, Stride,
    SystemModel,
};
use crate::templates::TextPattern;

/// Risk category descriptor, constant per rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskCategory {
    pub id: String,
    pub title: String,
    pub description: String,
    pub impact: String,
    pub function: RiskFunction,
    pub stride: Stride,
    pub action: String,
    pub mitigation: String,
    pub check: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwe: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asvs: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cheat_sheet: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FindingStatus {
    #[default]
    Open,
    Mitigated,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Finding {
    pub category_id: String,
    pub severity: Severity,
    pub exploitation_likelihood: Likelihood,
    pub exploitation_impact: Impact,
    pub title: String,
    pub most_relevant_component_id: String,
    pub data_breach_probability: DataBreachProbability,
    pub data_breach_component_ids: Vec<String>,
    pub synthetic_id: String,
    pub status: FindingStatus,
}

/// How `supported_tags` gates a component.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Applicability {
    #[default]
    AnyTag,
    AllTags,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum MitigationCheck {
    #[default]
    None,
    AnyTag { tags: Vec<String> },
}

impl MitigationCheck {
    pub fn from_tags(tags: Option<&[String]>) -> Self {
        match tags {
            Some(tags) if !tags.is_empty() => MitigationCheck::AnyTag { tags: tags.to_vec() },
            _ => MitigationCheck::None,
        }
    }

    fn is_mitigated(&self, component: &dyn Component) -> bool {
        match self {
            MitigationCheck::None => false,
            MitigationCheck::AnyTag { tags } => {
                let tags: Vec<&str> = tags.iter().map(String::as_str).collect();
                component.is_tagged_with_any(&tags)
            }
        }
    }
}

/// The three operations a host engine calls on every rule.
pub trait RiskRule: Send + Sync {
    /// Registry key, unique within a pack.
    fn identifier(&self) -> &str;

    fn category(&self) -> &RiskCategory;

    fn supported_tags(&self) -> &BTreeSet<String>;

    /// Findings for every in-scope component matching the tag gate, in the
    /// model's sort order. Never fails; an empty model yields no findings.
    fn generate_findings(&self, model: &dyn SystemModel) -> Vec<Finding>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleDescriptor {
    pub identifier: String,
    pub category: RiskCategory,
    pub supported_tags: BTreeSet<String>,
    #[serde(default)]
    pub applicability: Applicability,
    pub likelihood: Likelihood,
    pub impact: Impact,
    pub severity: Severity,
    pub data_breach_probability: DataBreachProbability,
    /// `{title}` is the category title, `{component}` the component display name.
    pub finding_title: TextPattern,
    #[serde(default)]
    pub mitigation: MitigationCheck,
}

impl RuleDescriptor {
    fn applies_to(&self, component: &dyn Component) -> bool {
        match self.applicability {
            Applicability::AnyTag => {
                let tags: Vec<&str> = self.supported_tags.iter().map(String::as_str).collect();
                component.is_tagged_with_any(&tags)
            }
            Applicability::AllTags => {
                !self.supported_tags.is_empty()
                    && self.supported_tags.iter().all(|t| component.is_tagged_with(t))
            }
        }
    }

    fn finding_for(&self, component: &dyn Component) -> Finding {
        let category_id = self.category.id.clone();
        let component_id = component.id().to_string();
        let status = if self.mitigation.is_mitigated(component) {
            FindingStatus::Mitigated
        } else {
            FindingStatus::Open
        };
        Finding {
            synthetic_id: format!("{category_id}@{component_id}"),
            category_id,
            severity: self.severity,
            exploitation_likelihood: self.likelihood,
            exploitation_impact: self.impact,
            title: self.finding_title.render(&self.category.title, component.display_name()),
            most_relevant_component_id: component_id.clone(),
            data_breach_probability: self.data_breach_probability,
            data_breach_component_ids: vec![component_id],
            status,
        }
    }
}

impl RiskRule for RuleDescriptor {
    fn identifier(&self) -> &str {
        &self.identifier
    }

    fn category(&self) -> &RiskCategory {
        &self.category
    }

    fn supported_tags(&self) -> &BTreeSet<String> {
        &self.supported_tags
    }

    fn generate_findings(&self, model: &dyn SystemModel) -> Vec<Finding> {
        model
            .sorted_component_ids()
            .into_iter()
            .filter_map(|id| model.component_by_id(id))
            .filter(|component| !component.is_out_of_scope())
            .filter(|component| self.applies_to(*component))
            .map(|component| self.finding_for(component))
            .collect()
    }
}

/// Curated identifiers carry a `/`, which `sanitize` never lets through, so
/// they can't clash with catalog identifiers.
pub const CURATED_PREFIX: &str = "curated/";

fn curated_identifier(name: &str) -> String {
    format!("{CURATED_PREFIX}{name}")
}

fn tag_set(tags: &[&str]) -> BTreeSet<String> {
    tags.iter().map(|t| t.to_string()).collect()
}

/// Hand-written rules shipped alongside every automotive pack.
pub fn curated_rules() -> Vec<RuleDescriptor> {
    vec![
        RuleDescriptor {
            identifier: curated_identifier("UnsecuredHardwareDebugPort"),
            category: RiskCategory {
                id: "unsecured-hardware-debug-port".into(),
                title: "Unsecured Hardware Debug Interface (JTAG/SWD)".into(),
                description: "Hardware debug interfaces like JTAG or SWD are open and not secured. These ports provide low-level access to the device during development but can be used by attackers to extract firmware, dump memory, or hijack execution flow in production.".into(),
                impact: "Full control over the device execution flow and firmware extraction. An attacker with physical access could reverse engineer the firmware, extract secrets (keys, certificates), or implant malware.".into(),
                function: RiskFunction::Operations,
                stride: Stride::ElevationOfPrivilege,
                action: "Hardware Hardening".into(),
                mitigation: "Permanently disable debug interfaces (e.g. via eFuse) before production. If debug access is required for field diagnostics, implement strong cryptographic authentication (e.g. Challenge-Response) to unlock the JTAG port.".into(),
                check: "Verify if JTAG/SWD ports are accessible on the PCB and if they are electronically disabled or password protected.".into(),
                cwe: Some(1260),
                asvs: Some("V1.1.2".into()),
                cheat_sheet: Some("https://cheatsheetseries.owasp.org/cheatsheets/Embedded_Application_Security_Cheat_Sheet.html".into()),
            },
            supported_tags: tag_set(&["hardware", "ecu", "microcontroller", "device"]),
            applicability: Applicability::AnyTag,
            likelihood: Likelihood::Likely,
            impact: Impact::VeryHigh,
            severity: Severity::Critical,
            data_breach_probability: DataBreachProbability::Probable,
            finding_title: TextPattern::around_component("<b>Unsecured Hardware Debug Port (JTAG/SWD)</b> on ", ""),
            mitigation: MitigationCheck::AnyTag {
                tags: vec!["jtag_locked".into(), "no_debug".into()],
            },
        },
        RuleDescriptor {
            identifier: curated_identifier("ImproperSoCIsolation"),
            category: RiskCategory {
                id: "unsecured-soc-isolation".into(),
                title: "Improper SoC Isolation (CWE-1189)".into(),
                description: "The System-on-Chip (SoC) does not appear to have sufficient isolation mechanisms (e.g. hardware virtualization, TrustZone, or physical separation) to prevent shared resource corruption between mixed-criticality domains.".into(),
                impact: "Lack of isolation can allow a compromised non-safety core (e.g. QM / Linux) to interfere with safety-critical functions (ASIL-D), leading to loss of vehicle control.".into(),
                function: RiskFunction::Architecture,
                stride: Stride::Tampering,
                action: "Implement Hardware Enforced Isolation".into(),
                mitigation: "Use hardware virtualization extensions, memory protection units (MPU), or physical core separation.".into(),
                check: "Does the SoC host mixed-criticality workloads without certified isolation?".into(),
                cwe: Some(1189),
                asvs: None,
                cheat_sheet: None,
            },
            // Gateway SoCs: hardware that also routes mixed traffic.
            supported_tags: tag_set(&["hardware", "gateway"]),
            applicability: Applicability::AllTags,
            likelihood: Likelihood::Likely,
            impact: Impact::VeryHigh,
            severity: Severity::Critical,
            data_breach_probability: DataBreachProbability::Probable,
            finding_title: TextPattern::around_component("<b>Improper SoC Isolation</b> at <b>", "</b>"),
            mitigation: MitigationCheck::AnyTag {
                tags: vec!["isolation".into(), "virtualization".into(), "partitioning".into()],
            },
        },
        RuleDescriptor {
            identifier: curated_identifier("MissingInputValidation"),
            category: RiskCategory {
                id: "missing-input-validation".into(),
                title: "Missing Input Validation (CWE-20)".into(),
                description: "The asset appears to accept external input (ingress, diagnostics, API) but does not have explicit input validation controls documented.".into(),
                impact: "Lack of input validation can lead to injection attacks (SQLi, Command Injection), buffer overflows, and crash scenarios (DoS).".into(),
                function: RiskFunction::Development,
                stride: Stride::Tampering,
                action: "Implement Strict Input Validation".into(),
                mitigation: "Validate all inputs against a strict allow-list. Sanitize data at trust boundaries.".into(),
                check: "Are all external inputs validated before processing?".into(),
                cwe: Some(20),
                asvs: None,
                cheat_sheet: None,
            },
            supported_tags: tag_set(&["ingress", "diagnostics", "web", "api", "gateway"]),
            applicability: Applicability::AnyTag,
            likelihood: Likelihood::Likely,
            impact: Impact::High,
            severity: Severity::High,
            data_breach_probability: DataBreachProbability::Probable,
            finding_title: TextPattern::around_component("<b>Missing Input Validation</b> at <b>", "</b>"),
            mitigation: MitigationCheck::AnyTag {
                tags: vec!["input-validation".into(), "waf".into()],
            },
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{TechnicalAsset, ThreatModel};

    fn asset(id: &str, tags: &[&str]) -> TechnicalAsset {
        TechnicalAsset {
            id: id.to_string(),
            title: id.to_uppercase(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            out_of_scope: false,
        }
    }

    fn curated(identifier: &str) -> RuleDescriptor {
        curated_rules()
            .into_iter()
            .find(|r| r.identifier == identifier)
            .unwrap()
    }

    #[test]
    fn soc_isolation_requires_every_tag() {
        let rule = curated("curated/ImproperSoCIsolation");
        let model = ThreatModel::from_assets(vec![
            asset("soc", &["hardware", "gateway"]),
            asset("mcu", &["hardware"]),
            asset("hsm", &["hardware", "gateway", "partitioning"]),
        ]);
        let findings = rule.generate_findings(&model);
        let ids: Vec<_> = findings.iter().map(|f| f.most_relevant_component_id.as_str()).collect();
        assert_eq!(ids, vec!["hsm", "soc"]);
        assert_eq!(findings[0].status, FindingStatus::Mitigated);
        assert_eq!(findings[1].status, FindingStatus::Open);
        assert_eq!(findings[1].title, "<b>Improper SoC Isolation</b> at <b>SOC</b>");
    }

    #[test]
    fn debug_port_title_and_severity() {
        let rule = curated("curated/UnsecuredHardwareDebugPort");
        let model = ThreatModel::from_assets(vec![asset("ecu", &["ecu", "jtag_locked"])]);
        let findings = rule.generate_findings(&model);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].severity, Severity::Critical);
        assert_eq!(findings[0].title, "<b>Unsecured Hardware Debug Port (JTAG/SWD)</b> on ECU");
        assert_eq!(findings[0].status, FindingStatus::Mitigated);
        assert_eq!(findings[0].synthetic_id, "unsecured-hardware-debug-port@ecu");
    }

    #[test]
    fn any_tag_gate_and_mitigation_ignore_case() {
        let rule = curated("curated/MissingInputValidation");
        let model = ThreatModel::from_assets(vec![
            asset("api", &["API", "WAF"]),
            asset("diag", &["Diagnostics"]),
            asset("ecu", &["ecu"]),
        ]);
        let findings = rule.generate_findings(&model);
        let status: Vec<_> = findings
            .iter()
            .map(|f| (f.most_relevant_component_id.as_str(), f.status))
            .collect();
        assert_eq!(
            status,
            vec![("api", FindingStatus::Mitigated), ("diag", FindingStatus::Open)]
        );
    }

    #[test]
    fn mitigation_check_serializes_tagged() {
        let json = serde_json::to_value(MitigationCheck::AnyTag { tags: vec!["waf".into()] }).unwrap();
        assert_eq!(json, serde_json::json!({"kind": "any-tag", "tags": ["waf"]}));
        let none = serde_json::to_value(MitigationCheck::None).unwrap();
        assert_eq!(none, serde_json::json!({"kind": "none"}));
    }
}
