//! 패턴 소스 모음과 로드 컨텍스트
//!
//! [`PatternSources`]는 컴파일러에 넘길 원시 입력을 모아 둡니다.
//! 병합 순서는 컴파일러가 정합니다: 내장 세트, 파일, 인라인 정의,
//! 사전 등록 이벤트 타입 순.

use std::path::{Path, PathBuf};

use logtree_core::config::PatternsConfig;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::definition::RawPatternDefinition;
use crate::error::ClassifierError;
use crate::loader::{PatternFile, PatternLoader};

/// 상대 경로 해석에 쓰이는 명시적 컨텍스트
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadContext {
    pub base_dir: PathBuf,
}

impl LoadContext {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// 상대 경로는 `base_dir` 기준으로, 절대 경로는 그대로 반환합니다.
    pub fn resolve(&self, path: impl AsRef<Path>) -> PathBuf {
        let path = path.as_ref();
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }
}

impl Default for LoadContext {
    fn default() -> Self {
        Self::new(".")
    }
}

/// 컴파일 입력 모음
#[derive(Debug, Clone, Default)]
pub struct PatternSources {
    /// 파일에서 읽은 패턴 세트 (선언 순서)
    pub files: Vec<PatternFile>,
    /// fragment 파일에서 읽은 정의 `(출처, 항목)`
    pub fragment_files: Vec<(String, Vec<(String, String)>)>,
    /// 코드에서 등록한 fragment
    pub fragments: Vec<(String, String)>,
    /// 인라인 정의
    pub definitions: Vec<RawPatternDefinition>,
    /// 사전 등록 이벤트 타입 (같은 이름이 없을 때만 추가)
    pub event_types: Vec<RawPatternDefinition>,
}

impl PatternSources {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, file: PatternFile) -> Self {
        self.files.push(file);
        self
    }

    pub fn with_fragment_file(
        mut self,
        source: impl Into<String>,
        entries: Vec<(String, String)>,
    ) -> Self {
        self.fragment_files.push((source.into(), entries));
        self
    }

    pub fn with_fragment(mut self, name: impl Into<String>, body: impl Into<String>) -> Self {
        self.fragments.push((name.into(), body.into()));
        self
    }

    pub fn with_definition(mut self, def: RawPatternDefinition) -> Self {
        self.definitions.push(def);
        self
    }

    pub fn with_event_type(mut self, def: RawPatternDefinition) -> Self {
        self.event_types.push(def);
        self
    }

    /// 전체 정의 수 (내장 세트 제외)
    pub fn definition_count(&self) -> usize {
        self.files.iter().map(|f| f.patterns.len()).sum::<usize>()
            + self.definitions.len()
            + self.event_types.len()
    }

    /// `[patterns]` 설정에서 소스를 구성합니다.
    ///
    /// 존재하지 않는 파일은 경고 후 건너뜁니다. 존재하지만 읽거나 파싱할 수
    /// 없는 파일은 에러입니다. 인라인 정의 중 잘못된 항목은 경고 후 건너뜁니다.
    pub async fn from_config(
        config: &PatternsConfig,
        ctx: &LoadContext,
    ) -> Result<Self, ClassifierError> {
        let mut sources = Self::new();

        for file in &config.fragment_files {
            let path = ctx.resolve(file);
            if !exists(&path, "fragment").await? {
                continue;
            }
            let entries = PatternLoader::load_fragment_file(&path).await?;
            sources = sources.with_fragment_file(path.display().to_string(), entries);
        }

        for file in &config.files {
            let path = ctx.resolve(file);
            if !exists(&path, "pattern").await? {
                continue;
            }
            for loaded in PatternLoader::load_path(&path).await? {
                sources = sources.with_file(loaded);
            }
        }

        sources.definitions = inline_definitions(&config.definitions, "patterns.definitions");
        sources.event_types = inline_definitions(&config.event_types, "patterns.event_types");

        debug!(
            files = sources.files.len(),
            fragment_files = sources.fragment_files.len(),
            definitions = sources.definition_count(),
            base_dir = %ctx.base_dir.display(),
            "collected pattern sources"
        );

        Ok(sources)
    }
}

async fn exists(path: &Path, kind: &str) -> Result<bool, ClassifierError> {
    let found = tokio::fs::try_exists(path)
        .await
        .map_err(|e| ClassifierError::PatternLoad {
            path: path.display().to_string(),
            reason: format!("failed to check {kind} file: {e}"),
        })?;
    if !found {
        warn!(path = %path.display(), kind, "source file not found, skipping");
    }
    Ok(found)
}

fn inline_definitions(tables: &[Map<String, Value>], section: &str) -> Vec<RawPatternDefinition> {
    tables
        .iter()
        .filter_map(
            |table| match RawPatternDefinition::from_value(Value::Object(table.clone())) {
                Ok(def) => Some(def),
                Err(e) => {
                    warn!(section, error = %e, "invalid inline pattern definition, skipping");
                    None
                }
            },
        )
        .collect()
}
