//! Compilation Pipeline - Single Entry Point
//!
//! Load → Normalize → Lint → Emit → Write. Either the whole pack is written
//! or nothing is: rendering finishes in memory before the output file is
//! touched, and the file is replaced atomically.

use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::Path;
use thiserror::Error;

use crate::catalog::{self, LoadError};
use crate::emit::{Emitter, RenderError, RulePack};
use crate::hashing::catalog_digest;
use crate::normalize::{normalize, Normalization};
use crate::templates::{FailureMode, RuleTemplate};
use crate::validation::{DiagnosticSeverity, LintReport, Linter};
use crate::ENGINE_VERSION;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    MalformedDocument(#[from] LoadError),

    #[error(transparent)]
    TemplateRender(#[from] RenderError),

    #[error("Template version {0} requires engine >= {1}, current is {2}")]
    EngineVersionMismatch(String, String, String),

    #[error("Catalog lint failed: {0}")]
    LintFailed(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Load, normalize and lint without emitting.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Inspection {
    pub groups: usize,
    pub classes: usize,
    pub normalization: Normalization,
    pub lint: LintReport,
}

#[derive(Debug, Clone)]
pub struct CompileOutput {
    pub pack: RulePack,
    pub inspection: Inspection,
}

/// The compilation pipeline - single entry point for catalog compiles
pub struct CompilationPipeline {
    template: RuleTemplate,
    linter: Linter,
}

impl CompilationPipeline {
    pub fn new(template: RuleTemplate) -> Self {
        Self {
            template,
            linter: Linter::new(),
        }
    }

    pub fn template(&self) -> &RuleTemplate {
        &self.template
    }

    pub fn inspect(&self, document: &[u8]) -> Result<Inspection, PipelineError> {
        let groups = catalog::load_bytes(document)?;
        let classes: usize = groups.iter().map(|g| g.entries.len()).sum();
        let normalization = normalize(&groups, &self.template.namespace);
        tracing::info!(
            groups = groups.len(),
            classes,
            kept = normalization.entries.len(),
            dropped = normalization.dropped.len(),
            "normalized catalog"
        );

        let lint = self.linter.lint(&normalization, &self.template);
        self.log_diagnostics(&lint);

        Ok(Inspection {
            groups: groups.len(),
            classes,
            normalization,
            lint,
        })
    }

    /// Compile a catalog document into a sealed rule pack.
    ///
    /// Lint runs on every compile; under the `block` policy its errors abort.
    #[tracing::instrument(skip_all, fields(namespace = %self.template.namespace))]
    pub fn compile(&self, document: &[u8]) -> Result<CompileOutput, PipelineError> {
        self.check_engine_version()?;
        let emitter = Emitter::new(&self.template)?;

        let inspection = self.inspect(document)?;
        if !inspection.lint.passed {
            let messages: Vec<_> = inspection
                .lint
                .diagnostics
                .iter()
                .filter(|d| d.severity == DiagnosticSeverity::Error)
                .map(|d| format!("{}: {}", d.check, d.message))
                .collect();
            return Err(PipelineError::LintFailed(messages.join("; ")));
        }

        let pack = emitter.emit(&inspection.normalization.entries, &catalog_digest(document))?;
        tracing::info!(rules = pack.rules.len(), pack_hash = %pack.pack_hash, "emitted rule pack");

        Ok(CompileOutput { pack, inspection })
    }

    /// Compile `input` and replace `output` with the rendered pack.
    pub fn compile_file(&self, input: &Path, output: &Path) -> Result<CompileOutput, PipelineError> {
        let document = fs::read(input).map_err(|source| PipelineError::Io {
            path: input.display().to_string(),
            source,
        })?;
        let compiled = self.compile(&document)?;
        let text = compiled.pack.render()?;
        write_atomically(output, &text)?;
        tracing::info!(path = %output.display(), bytes = text.len(), "wrote rule pack");
        Ok(compiled)
    }

    fn check_engine_version(&self) -> Result<(), PipelineError> {
        let engine_ver = semver::Version::parse(ENGINE_VERSION)
            .map_err(|_| RenderError::Template("invalid engine version".into()))?;
        let min_ver = semver::Version::parse(&self.template.engine_min_version).map_err(|e| {
            RenderError::Template(format!(
                "invalid engineMinVersion {:?}: {e}",
                self.template.engine_min_version
            ))
        })?;

        if engine_ver < min_ver {
            return Err(PipelineError::EngineVersionMismatch(
                self.template.template_version.clone(),
                self.template.engine_min_version.clone(),
                ENGINE_VERSION.to_string(),
            ));
        }

        Ok(())
    }

    fn log_diagnostics(&self, report: &LintReport) {
        for d in &report.diagnostics {
            let identifier = d.identifier.as_deref().unwrap_or("-");
            match self.template.lint.failure_mode {
                FailureMode::Log => {
                    tracing::debug!(check = %d.check, identifier, "{}", d.message)
                }
                FailureMode::Warn | FailureMode::Block => {
                    tracing::warn!(check = %d.check, identifier, "{}", d.message)
                }
            }
        }
    }
}

impl Default for CompilationPipeline {
    fn default() -> Self {
        Self::new(RuleTemplate::default())
    }
}

/// Write through a temporary file in the target directory, then rename over
/// `path`. Readers never observe a partially written file.
pub fn write_atomically(path: &Path, contents: &str) -> Result<(), PipelineError> {
    let io_err = |source: std::io::Error| PipelineError::Io {
        path: path.display().to_string(),
        source,
    };
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir).map_err(io_err)?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(io_err)?;
    tmp.write_all(contents.as_bytes()).map_err(io_err)?;
    tmp.as_file().sync_all().map_err(io_err)?;
    tmp.persist(path).map_err(|e| io_err(e.error))?;
    Ok(())
}
