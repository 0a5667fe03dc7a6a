//! ThreatForge Core - Threat Catalog Compiler
//!
//! # The Five Laws (Non-Negotiable)
//! 1. The Catalog Is Truth
//! 2. First Entry Wins
//! 3. Same Catalog, Same Bytes
//! 4. Rules Read, Never Write
//! 5. Nothing Half-Written

pub mod catalog;
pub mod normalize;
pub mod templates;
pub mod model;
pub mod rules;
pub mod emit;
pub mod validation;
pub mod hashing;
pub mod pipeline;

pub use catalog::{CatalogGroup, ClassEntry, LoadError};
pub use normalize::{normalize, sanitize, DroppedEntry, Normalization, NormalizedEntry};
pub use templates::{FailureMode, RuleTemplate, TextPattern};
pub use model::{Component, Severity, SystemModel, TechnicalAsset, ThreatModel};
pub use rules::{curated_rules, Finding, FindingStatus, RiskCategory, RiskRule, RuleDescriptor};
pub use emit::{Emitter, PackError, RenderError, RulePack};
pub use validation::{Diagnostic, LintReport, Linter};
pub use hashing::{canonical_json, catalog_digest, content_hash};
pub use pipeline::{CompilationPipeline, CompileOutput, Inspection, PipelineError};

pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");
