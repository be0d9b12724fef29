//! 분류기 에러 타입
//!
//! [`ClassifierError`]는 패턴 로딩, 정의 검증, 템플릿 확장, 복합 필드 디코딩에서
//! 발생하는 에러를 표현합니다. `From<ClassifierError> for LogtreeError` 변환이
//! 구현되어 있어 상위 레이어에서 `?` 연산자로 전파할 수 있습니다.
//!
//! 라인 분류(`classify`) 자체는 에러를 반환하지 않습니다. 분류 중 발생한
//! 에러는 로그와 카운터로만 드러납니다.

use logtree_core::error::{LogtreeError, PatternError};

/// 분류기 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum ClassifierError {
    /// 패턴/fragment 파일 로딩 실패
    #[error("pattern load error: {path}: {reason}")]
    PatternLoad {
        /// 파일 경로
        path: String,
        /// 로딩 실패 사유
        reason: String,
    },

    /// 패턴 정의 유효성 검증 실패
    #[error("pattern definition error: '{name}': {reason}")]
    Definition {
        /// 문제가 된 패턴 이름
        name: String,
        /// 검증 실패 사유
        reason: String,
    },

    /// 템플릿 확장 실패 (알 수 없는 fragment, 순환 참조 등)
    #[error("template error in '{template}': {reason}")]
    Template {
        /// 원본 템플릿 문자열
        template: String,
        /// 실패 사유
        reason: String,
    },

    /// 복합 필드(json, csv, urlargs) 디코딩 실패
    #[error("{kind} decode error on field '{field}': {reason}")]
    Decode {
        /// 복합 필드 종류
        kind: &'static str,
        /// 디코딩 대상 필드
        field: String,
        /// 실패 사유
        reason: String,
    },

    /// 트리 컴파일 실패
    #[error("compile error: {0}")]
    Compile(String),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// 정규식 컴파일 에러
    #[error("regex error: {0}")]
    Regex(#[from] regex::Error),
}

impl From<ClassifierError> for LogtreeError {
    fn from(err: ClassifierError) -> Self {
        match err {
            ClassifierError::PatternLoad { path, reason } => {
                LogtreeError::Pattern(PatternError::Load { path, reason })
            }
            ClassifierError::Definition { name, reason } => {
                LogtreeError::Pattern(PatternError::Invalid { name, reason })
            }
            ClassifierError::Template { template, reason } => {
                LogtreeError::Pattern(PatternError::Invalid {
                    name: template,
                    reason,
                })
            }
            ClassifierError::Decode { kind, field, reason } => {
                LogtreeError::Pattern(PatternError::Invalid {
                    name: field,
                    reason: format!("{kind}: {reason}"),
                })
            }
            ClassifierError::Compile(reason) => LogtreeError::Pattern(PatternError::Compile(reason)),
            ClassifierError::Io(e) => LogtreeError::Io(e),
            ClassifierError::Regex(e) => LogtreeError::Pattern(PatternError::Invalid {
                name: "(regex)".to_owned(),
                reason: e.to_string(),
            }),
        }
    }
}
