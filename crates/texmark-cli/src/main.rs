use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use serde::Serialize;
use texmark_core::{
    Config, ConfigError, Diagnostic, HtmlEmitOptions, MathFallback, emit_html,
    emit_html_sanitized, parse,
};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(version, about = "Render markdown with TeX math to HTML and MathML", long_about = None)]
struct Cli {
    /// Markdown file to read; stdin when omitted
    input: Option<PathBuf>,

    /// Configuration file (TOML)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Define a macro, e.g. `--macro 'R=\mathbb{R}'`; may be repeated
    #[arg(long = "macro", value_name = "NAME=EXPANSION")]
    macros: Vec<String>,

    /// Sanitize the output with the built-in allow-list
    #[arg(long)]
    sanitized: bool,

    /// Emit code blocks as plain <pre><code>
    #[arg(long)]
    simple_code: bool,

    /// What to emit for math the engine rejects
    #[arg(long, value_enum)]
    fallback: Option<FallbackArg>,

    /// Print diagnostics to stderr
    #[arg(long, value_enum, value_name = "FORMAT")]
    diagnostics: Option<DiagnosticsMode>,
}

#[derive(Clone, Copy, ValueEnum)]
enum FallbackArg {
    Source,
    Empty,
}

impl From<FallbackArg> for MathFallback {
    fn from(value: FallbackArg) -> Self {
        match value {
            FallbackArg::Source => MathFallback::Source,
            FallbackArg::Empty => MathFallback::Empty,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum DiagnosticsMode {
    Json,
    Pretty,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("{message}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), String> {
    let config = load_config(&cli).map_err(|err| err.to_string())?;
    let source = read_input(cli.input.as_ref())?;

    let parsed = parse(&source);
    let renderer = config.renderer();
    let options = HtmlEmitOptions {
        simple_code_blocks: cli.simple_code,
    };
    let emitted = if config.sanitize {
        emit_html_sanitized(&parsed.document, &parsed.source_map, &renderer, &options)
    } else {
        emit_html(&parsed.document, &parsed.source_map, &renderer, &options)
    };

    let mut diagnostics = parsed.diagnostics;
    diagnostics.extend(emitted.diagnostics);
    debug!(diagnostics = diagnostics.len(), "rendered document");
    if let Some(mode) = cli.diagnostics {
        emit_diagnostics(&diagnostics, mode)?;
    }

    print!("{}", emitted.html);
    Ok(())
}

/// File settings first, then command-line overrides.
fn load_config(cli: &Cli) -> Result<Config, ConfigError> {
    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    for definition in &cli.macros {
        config.define_macro(definition)?;
    }
    if cli.sanitized {
        config.sanitize = true;
    }
    if let Some(fallback) = cli.fallback {
        config.fallback = fallback.into();
    }
    Ok(config)
}

fn read_input(input: Option<&PathBuf>) -> Result<String, String> {
    match input {
        Some(path) => fs::read_to_string(path)
            .map_err(|err| format!("failed to read {}: {}", path.display(), err)),
        None => {
            let mut buffer = String::new();
            io::stdin()
                .read_to_string(&mut buffer)
                .map_err(|err| format!("failed to read stdin: {}", err))?;
            Ok(buffer)
        }
    }
}

#[derive(Serialize)]
struct JsonDiagnostic<'a> {
    code: &'a str,
    severity: &'a str,
    message: &'a str,
    range: JsonRange,
}

#[derive(Serialize)]
struct JsonRange {
    start: JsonPosition,
    end: JsonPosition,
}

#[derive(Serialize)]
struct JsonPosition {
    line: usize,
    character: usize,
}

impl<'a> From<&'a Diagnostic> for JsonDiagnostic<'a> {
    fn from(diag: &'a Diagnostic) -> Self {
        Self {
            code: diag.code,
            severity: diag.severity.label(),
            message: &diag.message,
            range: JsonRange {
                start: JsonPosition {
                    line: diag.range.start.line,
                    character: diag.range.start.character,
                },
                end: JsonPosition {
                    line: diag.range.end.line,
                    character: diag.range.end.character,
                },
            },
        }
    }
}

fn emit_diagnostics(diagnostics: &[Diagnostic], mode: DiagnosticsMode) -> Result<(), String> {
    match mode {
        DiagnosticsMode::Json => {
            let values: Vec<JsonDiagnostic<'_>> = diagnostics.iter().map(Into::into).collect();
            let json = serde_json::to_string_pretty(&values)
                .map_err(|err| format!("failed to encode diagnostics: {err}"))?;
            eprintln!("{json}");
        }
        DiagnosticsMode::Pretty => {
            for diagnostic in diagnostics {
                eprintln!("{}", diagnostic_to_pretty(diagnostic));
            }
        }
    }
    Ok(())
}

fn diagnostic_to_pretty(diagnostic: &Diagnostic) -> String {
    let start_line = diagnostic.range.start.line + 1;
    let start_col = diagnostic.range.start.character + 1;
    format!(
        "{}:{}:{} {} {}",
        start_line,
        start_col,
        diagnostic.severity.label(),
        diagnostic.code,
        diagnostic.message
    )
}
