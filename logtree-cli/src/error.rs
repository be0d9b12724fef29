//! CLI-specific error types and exit code mapping

use logtree_classifier::ClassifierError;
use logtree_core::error::LogtreeError;

/// CLI-specific error type.
///
/// Each variant carries enough context for a user-friendly message.
/// The `exit_code()` method maps errors to standard Unix exit codes.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Configuration loading or validation failure.
    #[error("configuration error: {0}")]
    Config(String),

    /// A subcommand-specific operation failed.
    #[error("{0}")]
    Command(String),

    /// Pattern file loading or tree compilation failed.
    #[error("pattern error: {0}")]
    Pattern(String),

    /// JSON serialisation failed during output rendering.
    #[error("json output error: {0}")]
    JsonSerialize(#[from] serde_json::Error),

    /// IO error (file read, stdout write, etc.).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Wrapped domain error from logtree-core.
    #[error("{0}")]
    Core(LogtreeError),
}

impl CliError {
    /// Map the error to a process exit code.
    ///
    /// | Code | Meaning                        |
    /// |------|--------------------------------|
    /// | 0    | Success                        |
    /// | 1    | General / command error        |
    /// | 2    | Configuration error            |
    /// | 3    | Pattern load / compile error   |
    /// | 10   | IO error                       |
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) | Self::Core(LogtreeError::Config(_)) => 2,
            Self::Pattern(_) | Self::Core(LogtreeError::Pattern(_)) => 3,
            Self::Io(_) | Self::Core(LogtreeError::Io(_)) => 10,
            Self::JsonSerialize(_) | Self::Command(_) | Self::Core(LogtreeError::Sink(_)) => 1,
        }
    }
}

impl From<LogtreeError> for CliError {
    fn from(e: LogtreeError) -> Self {
        Self::Core(e)
    }
}

impl From<ClassifierError> for CliError {
    fn from(e: ClassifierError) -> Self {
        Self::Pattern(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use logtree_core::error::{ConfigError, PatternError, SinkError};

    #[test]
    fn test_exit_code_config_error() {
        let err = CliError::Config("test error".to_owned());
        assert_eq!(err.exit_code(), 2, "config error should return exit code 2");
    }

    #[test]
    fn test_exit_code_core_config_error() {
        let err: CliError = LogtreeError::Config(ConfigError::FileNotFound {
            path: "logtree.toml".to_owned(),
        })
        .into();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_exit_code_pattern_error() {
        let err: CliError = ClassifierError::PatternLoad {
            path: "app.yaml".to_owned(),
            reason: "YAML parse error".to_owned(),
        }
        .into();
        assert_eq!(err.exit_code(), 3, "pattern error should return exit code 3");
        assert!(err.to_string().contains("app.yaml"));

        let core: CliError = LogtreeError::Pattern(PatternError::Compile("x".to_owned())).into();
        assert_eq!(core.exit_code(), 3);
    }

    #[test]
    fn test_exit_code_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err = CliError::Io(io_err);
        assert_eq!(err.exit_code(), 10, "io error should return exit code 10");
    }

    #[test]
    fn test_exit_code_command_and_sink_errors() {
        assert_eq!(CliError::Command("failed".to_owned()).exit_code(), 1);

        let sink: CliError = LogtreeError::Sink(SinkError::Unknown("kafka".to_owned())).into();
        assert_eq!(sink.exit_code(), 1);
    }

    #[test]
    fn test_error_display_config() {
        let err = CliError::Config("invalid TOML syntax".to_owned());
        let display_str = err.to_string();
        assert!(display_str.contains("configuration error"));
        assert!(display_str.contains("invalid TOML syntax"));
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let cli_err: CliError = io_err.into();
        match cli_err {
            CliError::Io(e) => assert_eq!(e.kind(), std::io::ErrorKind::PermissionDenied),
            _ => panic!("expected Io error variant"),
        }
    }
}
