//! Command handlers -- one module per subcommand
//!
//! Shared helpers load the effective configuration and turn it, together with
//! the pattern flags of `classify` / `tree`, into a [`Classifier`].

pub mod classify;
pub mod config;
pub mod patterns;
pub mod tree;

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use logtree_classifier::{Classifier, LoadContext};
use logtree_core::config::{LogtreeConfig, PatternsConfig};

use crate::cli::PatternOpts;
use crate::error::CliError;

/// Config file looked up in the working directory when `--config` is absent.
pub const DEFAULT_CONFIG_FILE: &str = "logtree.toml";

/// Effective configuration plus the file it came from (if any).
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: LogtreeConfig,
    pub path: Option<PathBuf>,
}

/// Load the effective configuration.
///
/// An explicit path must exist. Without one, `logtree.toml` in the working
/// directory is used when present, otherwise defaults plus env overrides.
pub async fn load_config(explicit: Option<&Path>) -> Result<LoadedConfig, CliError> {
    let path = match explicit {
        Some(path) => Some(path.to_path_buf()),
        None => {
            let default = PathBuf::from(DEFAULT_CONFIG_FILE);
            tokio::fs::try_exists(&default)
                .await
                .unwrap_or(false)
                .then_some(default)
        }
    };

    let config = match &path {
        Some(path) => LogtreeConfig::load(path).await?,
        None => LogtreeConfig::from_env()?,
    };

    Ok(LoadedConfig { config, path })
}

/// Merge command-line pattern flags into the `[patterns]` section.
///
/// Paths given on the command line are relative to the working directory,
/// so they are made absolute before joining the configured list.
pub fn apply_pattern_opts(
    patterns: &mut PatternsConfig,
    opts: &PatternOpts,
) -> Result<(), CliError> {
    for path in &opts.patterns {
        patterns.files.push(absolute(path)?);
    }
    for path in &opts.fragments {
        patterns.fragment_files.push(absolute(path)?);
    }
    if !opts.only_types.is_empty() {
        patterns.restrict_types = opts.only_types.clone();
    }
    if opts.no_builtins {
        patterns.use_builtins = false;
    }
    Ok(())
}

/// Build a classifier from the loaded config and command-line pattern flags.
pub async fn build_classifier(
    loaded: &LoadedConfig,
    opts: &PatternOpts,
    force_stats: bool,
) -> Result<Classifier, CliError> {
    let mut patterns = loaded.config.patterns.clone();
    apply_pattern_opts(&mut patterns, opts)?;
    patterns.stats |= force_stats;

    let ctx = LoadContext::new(patterns.resolve_base_dir(loaded.path.as_deref()));
    debug!(base_dir = %ctx.base_dir.display(), files = patterns.files.len(), "building classifier");

    let classifier = Classifier::from_config(&patterns, &ctx).await?;
    info!(
        patterns = classifier.snapshot().tree().len(),
        stats = classifier.stats_enabled(),
        "pattern tree compiled"
    );
    Ok(classifier)
}

fn absolute(path: &Path) -> Result<String, CliError> {
    Ok(std::path::absolute(path)?.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pattern_opts_extend_config() {
        let mut patterns = PatternsConfig {
            files: vec!["base.yaml".to_owned()],
            restrict_types: vec!["old".to_owned()],
            ..PatternsConfig::default()
        };
        let opts = PatternOpts {
            patterns: vec![PathBuf::from("/abs/app.yaml")],
            fragments: vec![PathBuf::from("/abs/extra.grok")],
            only_types: vec!["custom_key".to_owned()],
            no_builtins: true,
        };

        apply_pattern_opts(&mut patterns, &opts).unwrap();
        assert_eq!(patterns.files, vec!["base.yaml", "/abs/app.yaml"]);
        assert_eq!(patterns.fragment_files, vec!["/abs/extra.grok"]);
        assert_eq!(patterns.restrict_types, vec!["custom_key"]);
        assert!(!patterns.use_builtins);
    }

    #[test]
    fn empty_pattern_opts_keep_config() {
        let mut patterns = PatternsConfig {
            restrict_types: vec!["keep".to_owned()],
            ..PatternsConfig::default()
        };
        apply_pattern_opts(&mut patterns, &PatternOpts::default()).unwrap();
        assert_eq!(patterns.restrict_types, vec!["keep"]);
        assert!(patterns.use_builtins);
    }

    #[tokio::test]
    async fn explicit_missing_config_is_an_error() {
        let err = load_config(Some(Path::new("/nonexistent/logtree.toml")))
            .await
            .unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }
}
