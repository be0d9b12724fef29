//! 파이프라인 trait — 모듈 확장 포인트 정의

use crate::error::LogtreeError;
use crate::types::Record;

/// 라인 분류기 trait
///
/// 한 줄의 텍스트를 분류된 레코드로 바꿉니다. 분류는 실패하지 않으며,
/// 아무 패턴에도 맞지 않는 라인도 기본 타입 레코드로 반환됩니다.
pub trait LineParser: Send + Sync {
    /// 분류기 이름
    fn name(&self) -> &str;

    /// 한 줄을 분류합니다.
    fn parse(&self, line: &str) -> Record;
}

/// 분류된 레코드를 받는 하위 소비자 trait
///
/// 새로운 출력 대상을 추가하려면 이 trait을 구현하고 싱크 레지스트리에 등록합니다.
pub trait EventSink: Send {
    /// 싱크 이름
    fn name(&self) -> &str;

    /// `(eventType, record)` 쌍을 전달합니다.
    fn send(&mut self, event_type: &str, record: &Record) -> Result<(), LogtreeError>;

    /// 버퍼링된 출력을 내보냅니다.
    fn flush(&mut self) -> Result<(), LogtreeError> {
        Ok(())
    }
}
