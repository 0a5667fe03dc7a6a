//! ThreatForge CLI - Catalog compiler front end
//!
//! Commands: compile, inspect, evaluate
//! Outputs JSON to stdout, logs to stderr
//! Exit codes: 0 success, 1 I/O or input error, 2 compile failure

use clap::{Parser, Subcommand};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use threatforge_core::{
    CompilationPipeline, PipelineError, RiskRule, RulePack, RuleTemplate, ThreatModel,
};

#[derive(Parser)]
#[command(name = "threatforge-cli")]
#[command(about = "ThreatForge CLI - Threat Catalog Compiler")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log at debug level (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a catalog into a rule pack
    Compile {
        #[arg(short, long, default_value = "input/threat_catalog.xsam")]
        input: PathBuf,

        #[arg(short, long, default_value = "generated/automotive_rules.json")]
        output: PathBuf,

        /// Rule template JSON (built-in automotive template if omitted)
        #[arg(short, long)]
        template: Option<PathBuf>,
    },

    /// Load, normalize and lint a catalog without writing anything
    Inspect {
        #[arg(short, long, default_value = "input/threat_catalog.xsam")]
        input: PathBuf,

        #[arg(short, long)]
        template: Option<PathBuf>,
    },

    /// Run a compiled rule pack against a model
    Evaluate {
        /// Rule pack written by `compile`
        #[arg(short, long)]
        rules: PathBuf,

        /// Model JSON (`{"technicalAssets": [...]}`)
        #[arg(short, long)]
        model: PathBuf,
    },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RuleFindings<'a> {
    identifier: &'a str,
    findings: Vec<threatforge_core::Finding>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Compile { input, output, template } => {
            let pipeline = match load_pipeline(template.as_deref()) {
                Ok(p) => p,
                Err(code) => return code,
            };

            match pipeline.compile_file(&input, &output) {
                Ok(compiled) => {
                    print_json(&serde_json::json!({
                        "success": true,
                        "output": output.display().to_string(),
                        "rules": compiled.pack.rules.len(),
                        "registry": compiled.pack.registry,
                        "packHash": compiled.pack.pack_hash,
                        "dropped": compiled.inspection.normalization.dropped.len(),
                        "diagnostics": compiled.inspection.lint.diagnostics,
                    }));
                    ExitCode::SUCCESS
                }
                Err(e) => failure(&e, exit_code_for(&e)),
            }
        }

        Commands::Inspect { input, template } => {
            let pipeline = match load_pipeline(template.as_deref()) {
                Ok(p) => p,
                Err(code) => return code,
            };
            let document = match read(&input) {
                Ok(d) => d,
                Err(code) => return code,
            };

            match pipeline.inspect(&document) {
                Ok(inspection) => {
                    print_json(&inspection);
                    ExitCode::SUCCESS
                }
                Err(e) => failure(&e, exit_code_for(&e)),
            }
        }

        Commands::Evaluate { rules, model } => {
            let pack = match read_text(&rules).map(|t| RulePack::from_json(&t)) {
                Ok(Ok(pack)) => pack,
                Ok(Err(e)) => return failure(&e, ExitCode::FAILURE),
                Err(code) => return code,
            };
            let model = match read_text(&model).map(|t| ThreatModel::from_json(&t)) {
                Ok(Ok(model)) => model,
                Ok(Err(e)) => return failure(&format!("Invalid model: {e}"), ExitCode::FAILURE),
                Err(code) => return code,
            };

            let results: Vec<RuleFindings> = pack
                .registry()
                .into_iter()
                .map(|rule| RuleFindings {
                    identifier: rule.identifier(),
                    findings: rule.generate_findings(&model),
                })
                .collect();
            let total: usize = results.iter().map(|r| r.findings.len()).sum();
            tracing::info!(rules = results.len(), findings = total, "evaluated rule pack");

            print_json(&serde_json::json!({
                "success": true,
                "findings": total,
                "rules": results,
            }));
            ExitCode::SUCCESS
        }
    }
}

fn init_tracing(verbose: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| build_env_filter(verbose));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .compact()
        .init();
}

fn build_env_filter(verbose: bool) -> tracing_subscriber::EnvFilter {
    if verbose {
        tracing_subscriber::EnvFilter::new("debug")
    } else {
        tracing_subscriber::EnvFilter::new("warn")
    }
}

fn load_pipeline(template: Option<&Path>) -> Result<CompilationPipeline, ExitCode> {
    let template = match template {
        Some(path) => RuleTemplate::load_from_path(path)
            .map_err(|e| failure(&e, ExitCode::FAILURE))?,
        None => RuleTemplate::default(),
    };
    Ok(CompilationPipeline::new(template))
}

fn read(path: &Path) -> Result<Vec<u8>, ExitCode> {
    fs::read(path).map_err(|e| {
        failure(&format!("Failed to read {}: {e}", path.display()), ExitCode::FAILURE)
    })
}

fn read_text(path: &Path) -> Result<String, ExitCode> {
    fs::read_to_string(path).map_err(|e| {
        failure(&format!("Failed to read {}: {e}", path.display()), ExitCode::FAILURE)
    })
}

fn exit_code_for(error: &PipelineError) -> ExitCode {
    match error {
        PipelineError::Io { .. } => ExitCode::FAILURE,
        _ => ExitCode::from(2), // Compile failure
    }
}

fn failure(error: &dyn std::fmt::Display, code: ExitCode) -> ExitCode {
    print_json(&serde_json::json!({
        "success": false,
        "error": error.to_string(),
    }));
    code
}

fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{text}"),
        Err(e) => println!("{}", serde_json::json!({ "success": false, "error": e.to_string() })),
    }
}
