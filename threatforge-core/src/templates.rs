//! Rule Template System - Enforceable Contracts
//!
//! A `RuleTemplate` carries every catalog-wide constant baked into emitted
//! rules. Only identifier, category key, title and description vary per
//! entry. Defaults reproduce the automotive catalog.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::model::{DataBreachProbability, Impact, Likelihood, RiskFunction, Stride};

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("Failed to read template {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid template {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleTemplate {
    #[serde(default = "default_namespace")]
    pub namespace: String,
    #[serde(default = "default_template_version")]
    pub template_version: String,
    #[serde(default = "default_engine_min_version")]
    pub engine_min_version: String,
    #[serde(default = "default_supported_tags")]
    pub supported_tags: Vec<String>,
    #[serde(default = "default_description_pattern")]
    pub description_pattern: String,
    #[serde(default = "default_finding_title")]
    pub finding_title: String,
    #[serde(default = "default_impact_text")]
    pub impact: String,
    #[serde(default = "default_function")]
    pub function: RiskFunction,
    #[serde(default = "default_stride")]
    pub stride: Stride,
    #[serde(default = "default_action")]
    pub action: String,
    #[serde(default = "default_mitigation")]
    pub mitigation: String,
    #[serde(default = "default_check")]
    pub check: String,
    #[serde(default = "default_likelihood")]
    pub likelihood: Likelihood,
    #[serde(default = "default_impact_level")]
    pub impact_level: Impact,
    #[serde(default = "default_data_breach")]
    pub data_breach_probability: DataBreachProbability,
    #[serde(default = "default_mitigation_overrides")]
    pub mitigation_overrides: Vec<MitigationOverride>,
    #[serde(default = "default_true")]
    pub include_curated: bool,
    #[serde(default)]
    pub lint: LintConfig,
}

/// Marks findings of one rule as mitigated when a component carries any of `tags`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MitigationOverride {
    pub identifier: String,
    pub tags: Vec<String>,
}

fn default_true() -> bool { true }
fn default_namespace() -> String { "automotive".into() }
fn default_template_version() -> String { "1.0.0".into() }
fn default_engine_min_version() -> String { "1.0.0".into() }
fn default_supported_tags() -> Vec<String> { vec!["automotive".into()] }
fn default_description_pattern() -> String { "{title} (Imported from XSAM)".into() }
fn default_finding_title() -> String { "<b>{title}</b> risk at <b>{component}</b>".into() }
fn default_impact_text() -> String {
    "Potential impact depending on the specific automotive context.".into()
}
fn default_function() -> RiskFunction { RiskFunction::BusinessSide }
fn default_stride() -> Stride { Stride::Tampering }
fn default_action() -> String { "Review automotive standards".into() }
fn default_mitigation() -> String { "Apply automotive security controls (e.g. UN R155)".into() }
fn default_check() -> String { "Is this threat applicable?".into() }
fn default_likelihood() -> Likelihood { Likelihood::Likely }
fn default_impact_level() -> Impact { Impact::Medium }
fn default_data_breach() -> DataBreachProbability { DataBreachProbability::Probable }

fn default_mitigation_overrides() -> Vec<MitigationOverride> {
    // Hardware fault injection is covered by CWE-1256 style tamper protection.
    vec![MitigationOverride {
        identifier: "TPe006".into(),
        tags: vec!["tamper-protection".into(), "hardware-hardening".into()],
    }]
}

impl Default for RuleTemplate {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            template_version: default_template_version(),
            engine_min_version: default_engine_min_version(),
            supported_tags: default_supported_tags(),
            description_pattern: default_description_pattern(),
            finding_title: default_finding_title(),
            impact: default_impact_text(),
            function: default_function(),
            stride: default_stride(),
            action: default_action(),
            mitigation: default_mitigation(),
            check: default_check(),
            likelihood: default_likelihood(),
            impact_level: default_impact_level(),
            data_breach_probability: default_data_breach(),
            mitigation_overrides: default_mitigation_overrides(),
            include_curated: true,
            lint: LintConfig::default(),
        }
    }
}

impl RuleTemplate {
    pub fn load_from_path(path: &Path) -> Result<Self, TemplateError> {
        let content = fs::read_to_string(path).map_err(|source| TemplateError::Io {
            path: path.display().to_string(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| TemplateError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn mitigation_tags_for(&self, identifier: &str) -> Option<&[String]> {
        self.mitigation_overrides
            .iter()
            .find(|o| o.identifier == identifier)
            .map(|o| o.tags.as_slice())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FailureMode {
    Block,
    #[default]
    Warn,
    Log,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LintConfig {
    #[serde(default)]
    pub failure_mode: FailureMode,
    /// Check names to skip, e.g. `identifier_fallback`.
    #[serde(default)]
    pub disabled: Vec<String>,
}

impl Default for LintConfig {
    fn default() -> Self {
        Self { failure_mode: FailureMode::Warn, disabled: vec![] }
    }
}

impl LintConfig {
    pub fn is_enabled(&self, check: &str) -> bool {
        !self.disabled.iter().any(|d| d == check)
    }
}

/// Placeholder accepted inside a text pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placeholder {
    Title,
    Component,
}

impl Placeholder {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "title" => Some(Placeholder::Title),
            "component" => Some(Placeholder::Component),
            _ => None,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Placeholder::Title => "title",
            Placeholder::Component => "component",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Slot(Placeholder),
}

/// A parsed `{placeholder}` pattern such as `<b>{title}</b> risk at <b>{component}</b>`.
///
/// `{{` and `}}` escape literal braces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TextPattern {
    source: String,
    segments: Vec<Segment>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatternError {
    #[error("unterminated placeholder in pattern {0:?}")]
    Unterminated(String),

    #[error("unmatched '}}' in pattern {0:?}")]
    UnmatchedClose(String),

    #[error("unknown placeholder {{{name}}} in pattern {pattern:?}")]
    UnknownPlaceholder { name: String, pattern: String },
}

impl TextPattern {
    pub fn parse(source: &str) -> Result<Self, PatternError> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = source.chars().peekable();

        while let Some(c) = chars.next() {
            match c {
                '{' if chars.peek() == Some(&'{') => {
                    chars.next();
                    literal.push('{');
                }
                '}' if chars.peek() == Some(&'}') => {
                    chars.next();
                    literal.push('}');
                }
                '{' => {
                    let mut name = String::new();
                    loop {
                        match chars.next() {
                            Some('}') => break,
                            Some(n) => name.push(n),
                            None => return Err(PatternError::Unterminated(source.to_string())),
                        }
                    }
                    let slot = Placeholder::from_name(&name).ok_or_else(|| {
                        PatternError::UnknownPlaceholder { name, pattern: source.to_string() }
                    })?;
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::Slot(slot));
                }
                '}' => return Err(PatternError::UnmatchedClose(source.to_string())),
                other => literal.push(other),
            }
        }
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Ok(Self { source: source.to_string(), segments })
    }

    /// `prefix{component}suffix` with both sides taken literally.
    pub fn around_component(prefix: &str, suffix: &str) -> Self {
        let escape = |text: &str| text.replace('{', "{{").replace('}', "}}");
        let mut segments = Vec::new();
        if !prefix.is_empty() {
            segments.push(Segment::Literal(prefix.to_string()));
        }
        segments.push(Segment::Slot(Placeholder::Component));
        if !suffix.is_empty() {
            segments.push(Segment::Literal(suffix.to_string()));
        }
        Self {
            source: format!("{}{{component}}{}", escape(prefix), escape(suffix)),
            segments,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn uses(&self, placeholder: Placeholder) -> bool {
        self.segments.iter().any(|s| *s == Segment::Slot(placeholder))
    }

    /// Substitute slot values. Values are inserted verbatim, never re-parsed.
    pub fn render(&self, title: &str, component: &str) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Slot(Placeholder::Title) => out.push_str(title),
                Segment::Slot(Placeholder::Component) => out.push_str(component),
            }
        }
        out
    }
}

impl TryFrom<String> for TextPattern {
    type Error = PatternError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<TextPattern> for String {
    fn from(pattern: TextPattern) -> Self {
        pattern.source
    }
}

impl fmt::Display for Placeholder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{}}}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_json_yields_automotive_defaults() {
        let template: RuleTemplate = serde_json::from_str("{}").unwrap();
        assert_eq!(template.namespace, "automotive");
        assert_eq!(template.supported_tags, vec!["automotive".to_string()]);
        assert_eq!(template.likelihood, Likelihood::Likely);
        assert_eq!(template.impact_level, Impact::Medium);
        assert!(template.include_curated);
        assert_eq!(template.lint.failure_mode, FailureMode::Warn);
        assert_eq!(
            template.mitigation_tags_for("TPe006"),
            Some(&["tamper-protection".to_string(), "hardware-hardening".to_string()][..])
        );
    }

    #[test]
    fn partial_json_overrides_fields() {
        let template: RuleTemplate = serde_json::from_str(
            r#"{"namespace":"rail","supportedTags":["rail","signal"],"impactLevel":"high","lint":{"failureMode":"block"}}"#,
        )
        .unwrap();
        assert_eq!(template.namespace, "rail");
        assert_eq!(template.supported_tags.len(), 2);
        assert_eq!(template.impact_level, Impact::High);
        assert_eq!(template.lint.failure_mode, FailureMode::Block);
        assert_eq!(template.check, "Is this threat applicable?");
    }

    #[test]
    fn pattern_renders_slots_verbatim() {
        let pattern = TextPattern::parse("<b>{title}</b> risk at <b>{component}</b>").unwrap();
        assert!(pattern.uses(Placeholder::Title));
        assert_eq!(
            pattern.render("Spoofing {component}", "ECU"),
            "<b>Spoofing {component}</b> risk at <b>ECU</b>"
        );
    }

    #[test]
    fn around_component_round_trips_through_source() {
        let pattern = TextPattern::around_component("<b>{x}</b> at ", "!");
        let reparsed = TextPattern::parse(pattern.as_str()).unwrap();
        assert_eq!(reparsed, pattern);
        assert_eq!(pattern.render("ignored", "ECU"), "<b>{x}</b> at ECU!");
    }

    #[test]
    fn pattern_escapes_and_errors() {
        assert_eq!(TextPattern::parse("{{x}} {title}").unwrap().render("T", ""), "{x} T");
        assert!(matches!(TextPattern::parse("{title"), Err(PatternError::Unterminated(_))));
        assert!(matches!(TextPattern::parse("a } b"), Err(PatternError::UnmatchedClose(_))));
        assert!(matches!(
            TextPattern::parse("{severity}"),
            Err(PatternError::UnknownPlaceholder { .. })
        ));
    }
}
