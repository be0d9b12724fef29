//! 에러 타입 — 도메인별 에러 정의

/// logtree 최상위 에러 타입
#[derive(Debug, thiserror::Error)]
pub enum LogtreeError {
    /// 설정 관련 에러
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// 패턴 로딩/컴파일 에러
    #[error("pattern error: {0}")]
    Pattern(#[from] PatternError),

    /// 출력 싱크 에러
    #[error("sink error: {0}")]
    Sink(#[from] SinkError),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// 설정 관련 에러
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// 설정 파일을 찾을 수 없음
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    /// 설정 파싱 실패
    #[error("failed to parse config: {reason}")]
    ParseFailed { reason: String },

    /// 유효하지 않은 설정 값
    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// 패턴 정의 관련 에러
#[derive(Debug, thiserror::Error)]
pub enum PatternError {
    /// 패턴 소스(파일) 로딩 실패
    #[error("failed to load pattern source {path}: {reason}")]
    Load { path: String, reason: String },

    /// 개별 패턴 정의가 잘못됨
    #[error("invalid pattern '{name}': {reason}")]
    Invalid { name: String, reason: String },

    /// 트리 전체를 컴파일할 수 없음 (기본 타입 생성 실패 등)
    #[error("pattern tree compile failed: {0}")]
    Compile(String),
}

/// 출력 싱크 에러
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    /// 등록되지 않은 싱크 타입
    #[error("unknown sink type: {0}")]
    Unknown(String),

    /// 레코드 직렬화/쓰기 실패
    #[error("failed to write record to {sink}: {reason}")]
    Write { sink: String, reason: String },
}
