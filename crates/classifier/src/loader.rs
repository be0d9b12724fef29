//! 패턴 파일 로더 -- YAML 패턴 파일과 grok fragment 파일을 디스크에서 로드합니다.
//!
//! 패턴 파일은 최상위 `patterns` 목록과 선택적인 `grok` fragment 맵을 가집니다.
//!
//! ```yaml
//! grok:
//!   APPID: "[a-z]+-[0-9]+"
//! patterns:
//!   - name: app
//!     pattern: "%{APPID:app} %{GREEDYDATA:data}"
//! ```
//!
//! 개별 정의의 파싱 실패는 경고 로그를 남기고 건너뜁니다.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::definition::RawPatternDefinition;
use crate::error::ClassifierError;
use crate::fragment::parse_definitions;

/// 패턴 파일 최대 크기
const MAX_PATTERN_FILE_SIZE: u64 = 10 * 1024 * 1024; // 10MB
/// 디렉토리 하나에서 로드할 수 있는 최대 정의 수
const MAX_PATTERNS_COUNT: usize = 10_000;

/// 내장 기본 패턴 세트 (`events`, `logevents`)
const BUILTIN_PATTERNS: &str = include_str!("../patterns/000_base.yaml");
const BUILTIN_SOURCE: &str = "builtin:000_base.yaml";

/// 로드된 패턴 파일 하나
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PatternFile {
    /// 출처 (파일 경로 또는 `builtin:`)
    pub source: String,
    /// 파일이 선언한 fragment
    pub grok: Vec<(String, String)>,
    /// 유효한 패턴 정의 (선언 순서)
    pub patterns: Vec<RawPatternDefinition>,
}

#[derive(Debug, Default, Deserialize)]
struct PatternDocument {
    #[serde(default)]
    grok: BTreeMap<String, String>,
    #[serde(default)]
    patterns: Vec<serde_yaml::Value>,
}

/// 패턴 파일 로더
pub struct PatternLoader;

impl PatternLoader {
    /// 내장 기본 패턴 세트를 파싱합니다.
    pub fn builtin() -> Result<PatternFile, ClassifierError> {
        Self::parse_yaml(BUILTIN_PATTERNS, BUILTIN_SOURCE)
    }

    /// 경로가 디렉토리면 [`load_directory`](Self::load_directory), 파일이면
    /// [`load_file`](Self::load_file)을 호출합니다.
    pub async fn load_path(path: impl AsRef<Path>) -> Result<Vec<PatternFile>, ClassifierError> {
        let path = path.as_ref();
        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|e| load_error(path, format!("failed to read metadata: {e}")))?;

        if metadata.is_dir() {
            Self::load_directory(path).await
        } else {
            Ok(vec![Self::load_file(path).await?])
        }
    }

    /// 디렉토리에서 모든 YAML 패턴 파일을 로드합니다.
    ///
    /// `.yml`/`.yaml` 파일만 처리하며 파일 이름 순으로 읽습니다.
    /// 개별 파일 로딩 실패는 경고 로그를 남기고 건너뜁니다.
    ///
    /// # Errors
    /// - 디렉토리를 읽을 수 없는 경우
    /// - 정의 수가 `MAX_PATTERNS_COUNT`를 초과하는 경우
    pub async fn load_directory(
        dir: impl AsRef<Path>,
    ) -> Result<Vec<PatternFile>, ClassifierError> {
        let dir = dir.as_ref();

        let mut entries = tokio::fs::read_dir(dir)
            .await
            .map_err(|e| load_error(dir, format!("failed to read directory: {e}")))?;

        let mut paths: Vec<PathBuf> = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| load_error(dir, format!("failed to read directory entry: {e}")))?
        {
            let path = entry.path();
            let is_yaml = path
                .extension()
                .is_some_and(|ext| ext == "yml" || ext == "yaml");
            if is_yaml {
                paths.push(path);
            }
        }
        paths.sort();

        let mut files = Vec::with_capacity(paths.len());
        let mut total = 0;

        for path in paths {
            match Self::load_file(&path).await {
                Ok(file) => {
                    total += file.patterns.len();
                    files.push(file);
                }
                Err(e) => {
                    warn!(
                        path = %path.display(),
                        error = %e,
                        "failed to load pattern file, skipping"
                    );
                }
            }

            if total > MAX_PATTERNS_COUNT {
                return Err(load_error(
                    dir,
                    format!("too many patterns: max {MAX_PATTERNS_COUNT}"),
                ));
            }
        }

        info!(
            dir = %dir.display(),
            files = files.len(),
            patterns = total,
            "loaded pattern directory"
        );

        Ok(files)
    }

    /// 단일 YAML 패턴 파일을 로드합니다.
    pub async fn load_file(path: impl AsRef<Path>) -> Result<PatternFile, ClassifierError> {
        let path = path.as_ref();
        let content = read_bounded(path).await?;
        Self::parse_yaml(&content, &path.display().to_string())
    }

    /// grok 형식 fragment 파일을 로드합니다.
    pub async fn load_fragment_file(
        path: impl AsRef<Path>,
    ) -> Result<Vec<(String, String)>, ClassifierError> {
        let path = path.as_ref();
        let content = read_bounded(path).await?;
        let entries = parse_definitions(&content);
        debug!(path = %path.display(), count = entries.len(), "loaded fragment file");
        Ok(entries)
    }

    /// YAML 문자열을 파싱합니다.
    ///
    /// 빈 문서는 빈 패턴 파일입니다. 문서 자체가 잘못되면 에러이고,
    /// 잘못된 개별 정의는 경고 후 건너뜁니다.
    pub fn parse_yaml(yaml_str: &str, source: &str) -> Result<PatternFile, ClassifierError> {
        let doc: Option<PatternDocument> =
            serde_yaml::from_str(yaml_str).map_err(|e| ClassifierError::PatternLoad {
                path: source.to_owned(),
                reason: format!("YAML parse error: {e}"),
            })?;
        let doc = doc.unwrap_or_default();

        let mut patterns = Vec::with_capacity(doc.patterns.len());
        let mut seen = HashSet::new();

        for (index, entry) in doc.patterns.into_iter().enumerate() {
            let parsed = serde_json::to_value(&entry)
                .map_err(|e| ClassifierError::Definition {
                    name: format!("#{index}"),
                    reason: e.to_string(),
                })
                .and_then(RawPatternDefinition::from_value);

            match parsed {
                Ok(def) => {
                    if !seen.insert(def.name.clone()) {
                        warn!(
                            pattern = %def.name,
                            source,
                            "duplicate pattern name in file, keeping the first definition"
                        );
                        continue;
                    }
                    patterns.push(def);
                }
                Err(e) => {
                    warn!(source, index, error = %e, "invalid pattern definition, skipping");
                }
            }
        }

        Ok(PatternFile {
            source: source.to_owned(),
            grok: doc.grok.into_iter().collect(),
            patterns,
        })
    }
}

async fn read_bounded(path: &Path) -> Result<String, ClassifierError> {
    let metadata = tokio::fs::metadata(path)
        .await
        .map_err(|e| load_error(path, format!("failed to read file metadata: {e}")))?;

    if metadata.len() > MAX_PATTERN_FILE_SIZE {
        return Err(load_error(
            path,
            format!(
                "file too large: {} bytes (max: {MAX_PATTERN_FILE_SIZE})",
                metadata.len()
            ),
        ));
    }

    tokio::fs::read_to_string(path)
        .await
        .map_err(|e| load_error(path, format!("failed to read file: {e}")))
}

fn load_error(path: &Path, reason: String) -> ClassifierError {
    ClassifierError::PatternLoad {
        path: path.display().to_string(),
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_set_has_events_and_logevents() {
        let file = PatternLoader::builtin().unwrap();
        let names: Vec<_> = file.patterns.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["events", "logevents"]);
        assert_eq!(file.patterns[1].parents, vec!["events"]);
    }

    #[test]
    fn parse_patterns_and_grok() {
        let yaml = r#"
grok:
  APPID: "[a-z]+-[0-9]+"
patterns:
  - name: app
    pattern: "%{APPID:app} %{GREEDYDATA:data}"
"#;
        let file = PatternLoader::parse_yaml(yaml, "app.yaml").unwrap();
        assert_eq!(file.grok, vec![("APPID".to_owned(), "[a-z]+-[0-9]+".to_owned())]);
        assert_eq!(file.patterns.len(), 1);
        assert_eq!(file.source, "app.yaml");
    }

    #[test]
    fn empty_document_is_empty_file() {
        let file = PatternLoader::parse_yaml("", "empty.yaml").unwrap();
        assert!(file.patterns.is_empty());
        assert!(file.grok.is_empty());
    }

    #[test]
    fn malformed_document_is_error() {
        let result = PatternLoader::parse_yaml("patterns: [valid: yaml: {{{", "bad.yaml");
        assert!(result.is_err());
    }

    #[test]
    fn invalid_entries_are_skipped() {
        let yaml = r#"
patterns:
  - pattern: "%{INT:x}"
  - name: ok
    pattern: "%{INT:x}"
  - name: bad_order
    order: later
"#;
        let file = PatternLoader::parse_yaml(yaml, "mixed.yaml").unwrap();
        let names: Vec<_> = file.patterns.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["ok"]);
    }

    #[test]
    fn duplicate_names_keep_first() {
        let yaml = r#"
patterns:
  - name: dup
    order: 1
  - name: dup
    order: 2
"#;
        let file = PatternLoader::parse_yaml(yaml, "dup.yaml").unwrap();
        assert_eq!(file.patterns.len(), 1);
        assert_eq!(file.patterns[0].order, Some(1));
    }

    #[tokio::test]
    async fn load_nonexistent_file_returns_error() {
        let result = PatternLoader::load_file("/nonexistent/patterns.yaml").await;
        assert!(matches!(result, Err(ClassifierError::PatternLoad { .. })));
    }

    #[tokio::test]
    async fn load_directory_reads_yaml_files_in_name_order() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("20_b.yaml"),
            "patterns:\n  - name: b\n    pattern: b\n",
        )
        .unwrap();
        std::fs::write(
            dir.path().join("10_a.yml"),
            "patterns:\n  - name: a\n    pattern: a\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();
        std::fs::write(dir.path().join("30_broken.yaml"), "patterns: [: {").unwrap();

        let files = PatternLoader::load_directory(dir.path()).await.unwrap();
        let names: Vec<_> = files
            .iter()
            .flat_map(|f| f.patterns.iter().map(|p| p.name.clone()))
            .collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn load_fragment_file_parses_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("extra.grok");
        std::fs::write(&path, "# custom\nTICKET [A-Z]+-[0-9]+\n").unwrap();

        let entries = PatternLoader::load_fragment_file(&path).await.unwrap();
        assert_eq!(entries, vec![("TICKET".to_owned(), "[A-Z]+-[0-9]+".to_owned())]);
    }
}
