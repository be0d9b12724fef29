//! 도메인 타입 — 분류 결과 레코드
//!
//! [`Record`]는 한 줄의 로그를 분류한 결과입니다. 임의의 필드 맵과 함께
//! 세 개의 예약 키(`data`, `__match`, `eventType`)를 가집니다.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// 원본 라인(또는 현재 매칭 대상)을 담는 필드
pub const DATA_FIELD: &str = "data";

/// 매칭된 타입 이름의 순서 목록 (루트부터)
pub const MATCH_FIELD: &str = "__match";

/// 가장 구체적으로 매칭된 타입 이름
pub const EVENT_TYPE_FIELD: &str = "eventType";

/// 이벤트 자체의 보조 타임스탬프 (epoch 밀리초)
pub const SOURCE_TIME_FIELD: &str = "src_logts_timestamp";

/// 예약된 기본 타입 이름
pub const BASE_EVENT_TYPE: &str = "events";

/// 분류 결과 레코드
///
/// 내부적으로 `serde_json::Map`을 사용하므로 JSON 한 줄로 그대로 직렬화됩니다.
/// 키 순서는 정렬 순서로 고정되어 같은 입력에 대해 같은 출력을 보장합니다.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record {
    fields: Map<String, Value>,
}

impl Record {
    /// 빈 레코드를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 분류 시작 시점의 누산기를 생성합니다: `data = line`, `__match = []`.
    pub fn from_line(line: &str) -> Self {
        let mut record = Self::new();
        record.insert(DATA_FIELD, line);
        record.insert(MATCH_FIELD, Value::Array(Vec::new()));
        record
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// 문자열 값인 경우에만 반환합니다.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }

    /// 필드가 존재하고 null이 아닌지 확인합니다.
    pub fn has(&self, key: &str) -> bool {
        self.fields.get(key).is_some_and(|v| !v.is_null())
    }

    /// 스칼라 값을 문자열 표현으로 반환합니다.
    ///
    /// 문자열은 그대로, 숫자/불리언은 `to_string()` 결과를 사용합니다.
    /// null, 배열, 객체는 `None`입니다.
    pub fn text(&self, key: &str) -> Option<String> {
        match self.fields.get(key)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            Value::Null | Value::Array(_) | Value::Object(_) => None,
        }
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.fields.insert(key.into(), value.into())
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.fields.remove(key)
    }

    /// 매칭 계보(`__match`)를 반환합니다.
    pub fn lineage(&self) -> Vec<&str> {
        self.fields
            .get(MATCH_FIELD)
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default()
    }

    /// 계보 끝에 타입 이름을 추가합니다.
    pub fn push_match(&mut self, name: &str) {
        match self.fields.get_mut(MATCH_FIELD) {
            Some(Value::Array(items)) => items.push(Value::from(name)),
            _ => {
                self.fields
                    .insert(MATCH_FIELD.to_owned(), Value::Array(vec![Value::from(name)]));
            }
        }
    }

    pub fn event_type(&self) -> Option<&str> {
        self.get_str(EVENT_TYPE_FIELD)
    }

    pub fn set_event_type(&mut self, event_type: &str) {
        self.insert(EVENT_TYPE_FIELD, event_type);
    }

    /// 원본 라인 (`data` 필드)
    pub fn data(&self) -> Option<&str> {
        self.get_str(DATA_FIELD)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn into_fields(self) -> Map<String, Value> {
        self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl From<Map<String, Value>> for Record {
    fn from(fields: Map<String, Value>) -> Self {
        Self { fields }
    }
}
