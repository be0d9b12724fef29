//! 메트릭 상수 및 설명 등록
//!
//! 모든 메트릭의 이름과 설명을 중앙에서 정의합니다.
//! 각 모듈은 이 상수를 사용하여 `metrics::counter!()`, `metrics::gauge!()`
//! 매크로를 호출합니다. 레코더가 설치되지 않았다면 호출은 아무 일도 하지 않습니다.
//!
//! # 네이밍 컨벤션
//!
//! - 접두어: `logtree_`
//! - 모듈명: `classifier_`, `sink_`
//! - 접미어: `_total` (counter), 없음 (gauge)
//!
//! # 사용 예시
//!
//! ```ignore
//! use metrics::counter;
//!
//! counter!(logtree_core::metrics::CLASSIFIER_LINES_TOTAL).increment(1);
//! ```

// ─── 레이블 키 상수 ────────────────────────────────────────────────

/// 패턴(이벤트 타입) 이름 레이블 키
pub const LABEL_PATTERN: &str = "pattern";

/// 싱크 이름 레이블 키 (stdout, file, noop)
pub const LABEL_SINK: &str = "sink";

/// 복합 필드 종류 레이블 키 (json, csv, urlargs)
pub const LABEL_COMPLEX_KIND: &str = "kind";

// ─── Classifier 메트릭 ──────────────────────────────────────────────

/// Classifier: 분류된 전체 라인 수 (counter)
pub const CLASSIFIER_LINES_TOTAL: &str = "logtree_classifier_lines_total";

/// Classifier: 기본 타입으로 떨어진 라인 수 (counter)
pub const CLASSIFIER_FALLBACK_TOTAL: &str = "logtree_classifier_fallback_total";

/// Classifier: 숫자 변환 실패 수 (counter, label: pattern)
pub const CLASSIFIER_COERCION_FAILURES_TOTAL: &str = "logtree_classifier_coercion_failures_total";

/// Classifier: 복합 필드 디코딩 실패 수 (counter, label: pattern, kind)
pub const CLASSIFIER_DECODE_FAILURES_TOTAL: &str = "logtree_classifier_decode_failures_total";

/// Classifier: 현재 트리에 로드된 패턴 수 (gauge)
pub const CLASSIFIER_PATTERNS_LOADED: &str = "logtree_classifier_patterns_loaded";

/// Classifier: 트리 재컴파일(교체) 횟수 (counter)
pub const CLASSIFIER_RELOADS_TOTAL: &str = "logtree_classifier_reloads_total";

// ─── Sink 메트릭 ────────────────────────────────────────────────────

/// Sink: 전달된 레코드 수 (counter, label: sink)
pub const SINK_RECORDS_SENT_TOTAL: &str = "logtree_sink_records_sent_total";

/// Sink: 전달 실패 수 (counter, label: sink)
pub const SINK_ERRORS_TOTAL: &str = "logtree_sink_errors_total";

// ─── 설명 등록 함수 ─────────────────────────────────────────────────

/// 모든 메트릭의 설명(description)을 등록합니다.
///
/// 전역 레코더 설치 후 한 번 호출합니다.
pub fn describe_all() {
    use metrics::{describe_counter, describe_gauge};

    describe_counter!(
        CLASSIFIER_LINES_TOTAL,
        "Total number of lines classified"
    );
    describe_counter!(
        CLASSIFIER_FALLBACK_TOTAL,
        "Lines that matched no pattern below the base type"
    );
    describe_counter!(
        CLASSIFIER_COERCION_FAILURES_TOTAL,
        "Numeric field coercions that failed and kept the raw string"
    );
    describe_counter!(
        CLASSIFIER_DECODE_FAILURES_TOTAL,
        "Complex field decodes (json, csv, urlargs) that failed"
    );
    describe_gauge!(
        CLASSIFIER_PATTERNS_LOADED,
        "Number of pattern nodes in the active compiled tree"
    );
    describe_counter!(
        CLASSIFIER_RELOADS_TOTAL,
        "Number of times the compiled tree was replaced"
    );

    describe_counter!(SINK_RECORDS_SENT_TOTAL, "Records handed to a sink");
    describe_counter!(SINK_ERRORS_TOTAL, "Records a sink failed to accept");
}
