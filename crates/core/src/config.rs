//! 설정 관리 — logtree.toml 파싱 및 런타임 설정
//!
//! [`LogtreeConfig`]는 모든 모듈의 설정을 담는 최상위 구조체입니다.
//!
//! # 설정 로딩 우선순위
//! 1. CLI 인자 (최고 우선)
//! 2. 환경변수 (`LOGTREE_PATTERNS_STATS=true` 형식)
//! 3. 설정 파일 (`logtree.toml`)
//! 4. 기본값 (`Default` 구현)
//!
//! # 사용 예시
//! ```no_run
//! # async fn example() -> Result<(), logtree_core::error::LogtreeError> {
//! use logtree_core::config::LogtreeConfig;
//!
//! // 파일에서 로드 + 환경변수 오버라이드
//! let config = LogtreeConfig::load("logtree.toml").await?;
//!
//! // TOML 문자열에서 직접 파싱
//! let config = LogtreeConfig::parse("[general]\nlog_level = \"debug\"")?;
//! # Ok(())
//! # }
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use crate::error::{ConfigError, LogtreeError};

/// 싱크 레지스트리에 등록된 싱크 타입 이름
pub const KNOWN_SINKS: [&str; 3] = ["stdout", "file", "noop"];

/// logtree 통합 설정
///
/// `logtree.toml` 파일의 최상위 구조를 나타냅니다.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LogtreeConfig {
    /// 일반 설정
    #[serde(default)]
    pub general: GeneralConfig,
    /// 패턴 소스 설정
    #[serde(default)]
    pub patterns: PatternsConfig,
    /// 출력 싱크 설정
    #[serde(default)]
    pub output: OutputConfig,
}

impl LogtreeConfig {
    /// TOML 파일에서 설정을 로드하고 환경변수 오버라이드를 적용합니다.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, LogtreeError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// 설정 파일 없이 기본값 + 환경변수 오버라이드로 설정을 만듭니다.
    pub fn from_env() -> Result<Self, LogtreeError> {
        let mut config = Self::default();
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// TOML 파일에서 설정을 로드합니다 (환경변수 오버라이드 없음).
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, LogtreeError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                LogtreeError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                LogtreeError::Io(e)
            }
        })?;
        let config = Self::parse(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// TOML 문자열에서 설정을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, LogtreeError> {
        toml::from_str(toml_str).map_err(|e| {
            LogtreeError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 환경변수 네이밍 규칙: `LOGTREE_{SECTION}_{FIELD}`
    pub fn apply_env_overrides(&mut self) {
        // General
        override_string(&mut self.general.log_level, "LOGTREE_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "LOGTREE_GENERAL_LOG_FORMAT");

        // Patterns
        override_bool(
            &mut self.patterns.use_builtins,
            "LOGTREE_PATTERNS_USE_BUILTINS",
        );
        override_csv(&mut self.patterns.files, "LOGTREE_PATTERNS_FILES");
        override_csv(
            &mut self.patterns.fragment_files,
            "LOGTREE_PATTERNS_FRAGMENT_FILES",
        );
        override_string(&mut self.patterns.base_dir, "LOGTREE_PATTERNS_BASE_DIR");
        override_csv(
            &mut self.patterns.restrict_types,
            "LOGTREE_PATTERNS_RESTRICT_TYPES",
        );
        override_bool(&mut self.patterns.stats, "LOGTREE_PATTERNS_STATS");

        // Output
        override_string(&mut self.output.sink, "LOGTREE_OUTPUT_SINK");
        override_string(&mut self.output.path, "LOGTREE_OUTPUT_PATH");
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), LogtreeError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "general.log_level".to_owned(),
                reason: format!("must be one of: {}", valid_levels.join(", ")),
            }
            .into());
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "general.log_format".to_owned(),
                reason: format!("must be one of: {}", valid_formats.join(", ")),
            }
            .into());
        }

        if !KNOWN_SINKS.contains(&self.output.sink.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "output.sink".to_owned(),
                reason: format!("must be one of: {}", KNOWN_SINKS.join(", ")),
            }
            .into());
        }

        if self.output.sink == "file" && self.output.path.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "output.path".to_owned(),
                reason: "path must not be empty when sink is 'file'".to_owned(),
            }
            .into());
        }

        // 인라인 정의는 최소한 name 키를 가져야 함
        for (idx, def) in self
            .patterns
            .definitions
            .iter()
            .chain(self.patterns.event_types.iter())
            .enumerate()
        {
            let has_name = def
                .get("name")
                .and_then(Value::as_str)
                .is_some_and(|n| !n.is_empty());
            if !has_name {
                return Err(ConfigError::InvalidValue {
                    field: format!("patterns.definitions[{idx}].name"),
                    reason: "inline pattern definition must declare a non-empty name".to_owned(),
                }
                .into());
            }
        }

        Ok(())
    }
}

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 로그 형식 (json, pretty)
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "pretty".to_owned(),
        }
    }
}

/// 패턴 소스 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PatternsConfig {
    /// 내장 기본 패턴 세트 사용 여부
    pub use_builtins: bool,
    /// YAML 패턴 파일 목록
    pub files: Vec<String>,
    /// grok 형식 fragment 파일 목록 (`NAME regex`)
    pub fragment_files: Vec<String>,
    /// 상대 경로 해석 기준 디렉토리 (비어 있으면 설정 파일 위치)
    pub base_dir: String,
    /// 지정 시 이 타입들과 그 조상만 남김
    pub restrict_types: Vec<String>,
    /// 패턴별 매칭 통계 수집 여부
    pub stats: bool,
    /// 인라인 패턴 정의
    pub definitions: Vec<Map<String, Value>>,
    /// 사전 등록 이벤트 타입 (같은 이름이 없을 때만 추가)
    pub event_types: Vec<Map<String, Value>>,
}

impl Default for PatternsConfig {
    fn default() -> Self {
        Self {
            use_builtins: true,
            files: Vec::new(),
            fragment_files: Vec::new(),
            base_dir: String::new(),
            restrict_types: Vec::new(),
            stats: false,
            definitions: Vec::new(),
            event_types: Vec::new(),
        }
    }
}

impl PatternsConfig {
    /// 패턴 파일 상대 경로를 해석할 기준 디렉토리를 결정합니다.
    ///
    /// `base_dir`이 지정되면 그 값을, 아니면 설정 파일의 디렉토리를,
    /// 둘 다 없으면 현재 디렉토리를 사용합니다.
    pub fn resolve_base_dir(&self, config_path: Option<&Path>) -> PathBuf {
        if !self.base_dir.is_empty() {
            return PathBuf::from(&self.base_dir);
        }
        config_path
            .and_then(Path::parent)
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

/// 출력 싱크 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// 싱크 타입 (stdout, file, noop)
    pub sink: String,
    /// file 싱크의 대상 경로
    pub path: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            sink: "stdout".to_owned(),
            path: String::new(),
        }
    }
}

// --- 환경변수 오버라이드 헬퍼 ---

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_bool(target: &mut bool, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<bool>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse bool from env var, ignoring"
            ),
        }
    }
}

fn override_csv(target: &mut Vec<String>, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val
            .split(',')
            .map(|s| s.trim().to_owned())
            .filter(|s| !s.is_empty())
            .collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_sane_values() {
        let config = LogtreeConfig::default();
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.general.log_format, "pretty");
        assert!(config.patterns.use_builtins);
        assert!(!config.patterns.stats);
        assert_eq!(config.output.sink, "stdout");
    }

    #[test]
    fn default_config_passes_validation() {
        LogtreeConfig::default().validate().unwrap();
    }

    #[test]
    fn from_str_empty_toml_uses_defaults() {
        let config = LogtreeConfig::parse("").unwrap();
        assert_eq!(config.general.log_level, "info");
        assert!(config.patterns.files.is_empty());
    }

    #[test]
    fn from_str_partial_toml_merges_with_defaults() {
        let toml = r#"
[general]
log_level = "debug"

[patterns]
files = ["app.yaml"]
"#;
        let config = LogtreeConfig::parse(toml).unwrap();
        assert_eq!(config.general.log_level, "debug");
        // log_format은 기본값 유지
        assert_eq!(config.general.log_format, "pretty");
        assert_eq!(config.patterns.files, vec!["app.yaml"]);
        assert!(config.patterns.use_builtins);
    }

    #[test]
    fn from_str_inline_definitions() {
        let toml = r#"
[[patterns.definitions]]
name = "custom_int"
parent = "events"
pattern = "%{INT:customvalue}"

[[patterns.definitions]]
name = "custom_str"
pattern = ["%{LD:customvalue}"]
order = 5

[[patterns.event_types]]
name = "alerts"
"#;
        let config = LogtreeConfig::parse(toml).unwrap();
        assert_eq!(config.patterns.definitions.len(), 2);
        assert_eq!(config.patterns.definitions[0]["name"], "custom_int");
        assert_eq!(config.patterns.definitions[1]["order"], 5);
        assert_eq!(config.patterns.event_types.len(), 1);
        config.validate().unwrap();
    }

    #[test]
    fn from_str_invalid_toml_returns_error() {
        let err = LogtreeConfig::parse("invalid = [[[toml").unwrap_err();
        assert!(matches!(
            err,
            LogtreeError::Config(ConfigError::ParseFailed { .. })
        ));
    }

    #[test]
    fn validate_rejects_invalid_log_level() {
        let mut config = LogtreeConfig::default();
        config.general.log_level = "verbose".to_owned();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("log_level"));
    }

    #[test]
    fn validate_rejects_invalid_log_format() {
        let mut config = LogtreeConfig::default();
        config.general.log_format = "xml".to_owned();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("log_format"));
    }

    #[test]
    fn validate_rejects_unknown_sink() {
        let mut config = LogtreeConfig::default();
        config.output.sink = "kafka".to_owned();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("output.sink"));
    }

    #[test]
    fn validate_rejects_file_sink_without_path() {
        let mut config = LogtreeConfig::default();
        config.output.sink = "file".to_owned();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("output.path"));
    }

    #[test]
    fn validate_rejects_nameless_inline_definition() {
        let toml = r#"
[[patterns.definitions]]
pattern = "%{INT:x}"
"#;
        let config = LogtreeConfig::parse(toml).unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("name"));
    }

    #[test]
    fn resolve_base_dir_prefers_explicit_value() {
        let mut patterns = PatternsConfig::default();
        patterns.base_dir = "/opt/patterns".to_owned();
        assert_eq!(
            patterns.resolve_base_dir(Some(Path::new("/etc/logtree/logtree.toml"))),
            PathBuf::from("/opt/patterns")
        );
    }

    #[test]
    fn resolve_base_dir_falls_back_to_config_dir() {
        let patterns = PatternsConfig::default();
        assert_eq!(
            patterns.resolve_base_dir(Some(Path::new("/etc/logtree/logtree.toml"))),
            PathBuf::from("/etc/logtree")
        );
        assert_eq!(
            patterns.resolve_base_dir(Some(Path::new("logtree.toml"))),
            PathBuf::from(".")
        );
        assert_eq!(patterns.resolve_base_dir(None), PathBuf::from("."));
    }

    #[test]
    #[serial_test::serial]
    fn env_override_string() {
        let mut val = "original".to_owned();
        // SAFETY: serial 테스트로 실행되므로 환경변수 조작이 다른 테스트와 겹치지 않습니다.
        unsafe { std::env::set_var("TEST_LOGTREE_STR", "overridden") };
        override_string(&mut val, "TEST_LOGTREE_STR");
        assert_eq!(val, "overridden");
        unsafe { std::env::remove_var("TEST_LOGTREE_STR") };
    }

    #[test]
    #[serial_test::serial]
    fn env_override_bool_invalid_keeps_original() {
        let mut val = false;
        // SAFETY: serial 테스트로 실행되므로 환경변수 조작이 다른 테스트와 겹치지 않습니다.
        unsafe { std::env::set_var("TEST_LOGTREE_BOOL_BAD", "not-a-bool") };
        override_bool(&mut val, "TEST_LOGTREE_BOOL_BAD");
        assert!(!val); // 원래 값 유지
        unsafe { std::env::remove_var("TEST_LOGTREE_BOOL_BAD") };
    }

    #[test]
    #[serial_test::serial]
    fn env_override_csv_skips_empty_items() {
        let mut val = vec!["a".to_owned()];
        // SAFETY: serial 테스트로 실행되므로 환경변수 조작이 다른 테스트와 겹치지 않습니다.
        unsafe { std::env::set_var("TEST_LOGTREE_CSV", "x, y,,z ") };
        override_csv(&mut val, "TEST_LOGTREE_CSV");
        assert_eq!(val, vec!["x", "y", "z"]);
        unsafe { std::env::remove_var("TEST_LOGTREE_CSV") };
    }

    #[test]
    fn env_override_missing_var_keeps_original() {
        let mut val = "original".to_owned();
        override_string(&mut val, "TEST_LOGTREE_NONEXISTENT_12345");
        assert_eq!(val, "original");
    }

    #[test]
    fn config_serialize_roundtrip() {
        let mut config = LogtreeConfig::default();
        config.patterns.files = vec!["a.yaml".to_owned()];
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed = LogtreeConfig::parse(&toml_str).unwrap();
        assert_eq!(parsed.patterns.files, config.patterns.files);
        assert_eq!(parsed.output.sink, config.output.sink);
    }

    #[tokio::test]
    async fn from_file_not_found() {
        let err = LogtreeConfig::from_file("/nonexistent/path/logtree.toml")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LogtreeError::Config(ConfigError::FileNotFound { .. })
        ));
    }
}
