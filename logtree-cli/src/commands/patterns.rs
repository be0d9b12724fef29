//! `logtree patterns` command handler

use std::collections::BTreeSet;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::info;

use logtree_classifier::{CompileOptions, PatternLoader, PatternSources, compile};

use crate::cli::{PatternsAction, PatternsArgs};
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Execute the `patterns` command.
pub async fn execute(args: PatternsArgs, writer: &OutputWriter) -> Result<(), CliError> {
    match args.action {
        PatternsAction::Validate { files } => {
            let report = validate_files(&files).await;
            writer.render(&report)?;
            if !report.is_valid() {
                return Err(CliError::Pattern(format!(
                    "{} invalid pattern files, {} dropped patterns",
                    report.invalid,
                    report.dropped.len()
                )));
            }
            Ok(())
        }
    }
}

/// Load every file, then compile them together with the built-in set.
///
/// A file is invalid when it cannot be read or parsed. A pattern is dropped
/// when it parses but does not survive compilation (bad template, unknown
/// fragment, duplicate name).
pub async fn validate_files(paths: &[PathBuf]) -> PatternValidationReport {
    let mut sources = PatternSources::new();
    let mut files = Vec::with_capacity(paths.len());
    let mut declared = BTreeSet::new();

    for path in paths {
        info!(path = %path.display(), "validating pattern source");
        match PatternLoader::load_path(path).await {
            Ok(loaded) => {
                for file in loaded {
                    declared.extend(file.patterns.iter().map(|p| p.name.clone()));
                    files.push(FileEntry {
                        file: file.source.clone(),
                        patterns: file.patterns.len(),
                        fragments: file.grok.len(),
                        error: None,
                    });
                    sources = sources.with_file(file);
                }
            }
            Err(e) => files.push(FileEntry {
                file: display(path),
                patterns: 0,
                fragments: 0,
                error: Some(e.to_string()),
            }),
        }
    }

    let invalid = files.iter().filter(|f| f.error.is_some()).count();
    let (compiled, dropped, compile_error) = match compile(&sources, &CompileOptions::default())
    {
        Ok(tree) => {
            let dropped = declared
                .iter()
                .filter(|name| !tree.contains(name))
                .cloned()
                .collect();
            (tree.len(), dropped, None)
        }
        Err(e) => (0, Vec::new(), Some(e.to_string())),
    };

    PatternValidationReport {
        files,
        invalid,
        compiled,
        dropped,
        compile_error,
    }
}

fn display(path: &Path) -> String {
    path.display().to_string()
}

/// Pattern validation report.
#[derive(Debug, Serialize)]
pub struct PatternValidationReport {
    pub files: Vec<FileEntry>,
    pub invalid: usize,
    /// Nodes in the combined tree (built-ins included)
    pub compiled: usize,
    /// Declared patterns missing from the compiled tree
    pub dropped: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compile_error: Option<String>,
}

impl PatternValidationReport {
    pub fn is_valid(&self) -> bool {
        self.invalid == 0 && self.dropped.is_empty() && self.compile_error.is_none()
    }
}

#[derive(Debug, Serialize)]
pub struct FileEntry {
    pub file: String,
    pub patterns: usize,
    pub fragments: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Render for PatternValidationReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(w, "{}", "Pattern Validation".bold())?;
        for entry in &self.files {
            match &entry.error {
                None => writeln!(
                    w,
                    "  {} {} ({} patterns, {} fragments)",
                    "OK".green().bold(),
                    entry.file,
                    entry.patterns,
                    entry.fragments
                )?,
                Some(err) => writeln!(
                    w,
                    "  {} {}: {}",
                    "FAIL".red().bold(),
                    entry.file,
                    err.red()
                )?,
            }
        }

        for name in &self.dropped {
            writeln!(w, "  {} pattern '{}' was dropped", "DROP".yellow().bold(), name)?;
        }
        if let Some(err) = &self.compile_error {
            writeln!(w, "  {} {}", "FAIL".red().bold(), err.red())?;
        }

        let result = if self.is_valid() {
            "VALID".green().bold()
        } else {
            "INVALID".red().bold()
        };
        writeln!(w, "  Compiled: {} patterns", self.compiled)?;
        writeln!(w, "  Result: {}", result)?;
        Ok(())
    }
}
