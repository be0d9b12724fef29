//! 패턴 정의 데이터 타입
//!
//! YAML 패턴 파일, 설정 파일의 인라인 정의, 코드에서 만든 정의가 모두
//! [`RawPatternDefinition`]으로 모입니다. 컴파일 전의 원시 형태이며,
//! 알 수 없는 키는 확장 속성 테이블(`extensions`)에 보존됩니다.
//!
//! # YAML 스키마
//! ```yaml
//! name: nginx_access
//! parent: [weblogs]
//! order: 10
//! field: message
//! pattern:
//!   - '%{IPORHOST:client} %{NOTSPACE:ident} %{NOTSPACE:user} \[%{HTTPDATE:ts}\] "%{WORD:method} %{NOTSPACE:path}"'
//! optionalpattern: '.* rt=%{NUMBER:rt:float}.*'
//! fields:
//!   status: int
//! cond:
//!   program: nginx
//! softcond:
//!   level: "info|notice"
//! replace:
//!   - { field: path, regex: '\?.*$', replacement: '' }
//! srctime-field: ts
//! srctime-format: "dd/MMM/yyyy:HH:mm:ss Z"
//! ```

use std::collections::BTreeMap;
use std::fmt;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::ClassifierError;

/// 패턴 이름 최대 길이
const MAX_NAME_LEN: usize = 256;

/// 필드의 의미 타입
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Int,
    Long,
    Float,
    Double,
    Map,
}

impl FieldType {
    /// 매칭 후 숫자 변환 대상인지 여부
    pub fn is_numeric(self) -> bool {
        matches!(self, Self::Int | Self::Long | Self::Float | Self::Double)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Int => "int",
            Self::Long => "long",
            Self::Float => "float",
            Self::Double => "double",
            Self::Map => "map",
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 값 안에 또 다른 구조를 담고 있는 복합 필드의 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComplexKind {
    /// 내장 JSON 객체
    Json,
    /// 쉼표 구분 값
    Csv,
    /// URL 쿼리 문자열 (`a=1&b=2`)
    UrlArgs,
}

impl ComplexKind {
    pub const ALL: [ComplexKind; 3] = [Self::Json, Self::Csv, Self::UrlArgs];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Csv => "csv",
            Self::UrlArgs => "urlargs",
        }
    }
}

/// 필드 타입 태그 — 일반 타입 또는 복합 필드 마커
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeTag {
    Field(FieldType),
    Complex { kind: ComplexKind, nested: bool },
}

impl TypeTag {
    /// 선언된 타입 문자열을 해석합니다. 알 수 없는 타입이면 `None`.
    pub fn parse(tag: &str) -> Option<Self> {
        let tag = tag.trim().to_ascii_lowercase();
        let parsed = match tag.as_str() {
            "string" | "str" => Self::Field(FieldType::String),
            "int" | "integer" => Self::Field(FieldType::Int),
            "long" => Self::Field(FieldType::Long),
            "float" => Self::Field(FieldType::Float),
            "double" => Self::Field(FieldType::Double),
            "map" => Self::Field(FieldType::Map),
            other => {
                let (base, nested) = match other.strip_suffix(".nested") {
                    Some(base) => (base, true),
                    None => (other, false),
                };
                let kind = ComplexKind::ALL.into_iter().find(|k| k.as_str() == base)?;
                Self::Complex { kind, nested }
            }
        };
        Some(parsed)
    }

    /// fragment 이름에서 캡처 타입을 추론합니다.
    ///
    /// 고정된 작은 매핑만 사용하며, 나머지는 모두 `string`입니다.
    pub fn from_fragment(fragment: &str) -> Self {
        match fragment.to_ascii_uppercase().as_str() {
            "INT" => Self::Field(FieldType::Int),
            "CSV" => Self::Complex { kind: ComplexKind::Csv, nested: false },
            "CSV_NESTED" => Self::Complex { kind: ComplexKind::Csv, nested: true },
            "JSON" => Self::Complex { kind: ComplexKind::Json, nested: false },
            "JSON_NESTED" => Self::Complex { kind: ComplexKind::Json, nested: true },
            "URLARGS" => Self::Complex { kind: ComplexKind::UrlArgs, nested: false },
            "URLARGS_NESTED" => Self::Complex { kind: ComplexKind::UrlArgs, nested: true },
            _ => Self::Field(FieldType::String),
        }
    }
}

/// `fields` 키의 두 가지 형태: 이름 목록 또는 이름→타입 맵
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldSpec {
    Names(Vec<String>),
    Typed(BTreeMap<String, String>),
}

impl FieldSpec {
    /// `(필드명, 타입 문자열)` 목록으로 펼칩니다.
    ///
    /// 이름 목록 형태는 모두 `string`이며, 이름의 `-`는 `_`로 바뀝니다.
    pub fn entries(&self) -> Vec<(String, String)> {
        match self {
            Self::Names(names) => names
                .iter()
                .map(|n| (n.replace('-', "_"), "string".to_owned()))
                .collect(),
            Self::Typed(map) => map.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        }
    }
}

/// `json.nested` 등의 값: 필드명을 직접 지정하거나 `true`로 표시
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NestedMarker {
    Field(String),
    Flag(bool),
}

/// 정규식 치환 규칙
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplaceRule {
    /// 대상 필드
    pub field: String,
    /// 찾을 정규식
    pub regex: String,
    /// 치환 문자열 (`$1`, `${name}` 참조 가능)
    pub replacement: String,
}

/// 원시 패턴 정의 — 패턴 트리의 노드 하나
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawPatternDefinition {
    /// 고유 이름 (필수)
    #[serde(default)]
    pub name: String,

    /// 부모 이름 목록 (문자열 하나 또는 목록)
    #[serde(
        default,
        rename = "parent",
        deserialize_with = "one_or_many",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub parents: Vec<String>,

    /// 형제 간 평가 순서 (작을수록 먼저, 없으면 마지막)
    #[serde(
        default,
        deserialize_with = "int_or_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub order: Option<i64>,

    /// 주 매칭 템플릿
    #[serde(
        default,
        rename = "pattern",
        deserialize_with = "one_or_many",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub patterns: Vec<String>,

    /// 매칭 후 추가 필드만 캡처하는 선택 템플릿
    #[serde(
        default,
        rename = "optionalpattern",
        deserialize_with = "one_or_many",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub optional_patterns: Vec<String>,

    /// 명시적 필드 타입 (추론 결과를 덮어씀)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields: Option<FieldSpec>,

    /// CSV 디코딩 결과 열 이름
    #[serde(default, rename = "csv-fields", skip_serializing_if = "Vec::is_empty")]
    pub csv_fields: Vec<String>,

    /// 하드 조건: 필드가 반드시 있고 정규식에 맞아야 함
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub cond: BTreeMap<String, String>,

    /// 소프트 조건: 필드가 있을 때만 검사
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub softcond: BTreeMap<String, String>,

    /// 템플릿을 적용할 누산기 필드 (기본값 `data`)
    #[serde(default, rename = "field", skip_serializing_if = "Option::is_none")]
    pub match_field: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json: Option<String>,
    #[serde(default, rename = "json.nested", skip_serializing_if = "Option::is_none")]
    pub json_nested: Option<NestedMarker>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub csv: Option<String>,
    #[serde(default, rename = "csv.nested", skip_serializing_if = "Option::is_none")]
    pub csv_nested: Option<NestedMarker>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub urlargs: Option<String>,
    #[serde(default, rename = "urlargs.nested", skip_serializing_if = "Option::is_none")]
    pub urlargs_nested: Option<NestedMarker>,

    /// 정규식 치환 규칙 (선언 순서대로 적용)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub replace: Vec<ReplaceRule>,

    /// 보조 타임스탬프 원본 필드
    #[serde(default, rename = "srctime-field", skip_serializing_if = "Option::is_none")]
    pub srctime_field: Option<String>,

    /// 보조 타임스탬프 형식
    #[serde(default, rename = "srctime-format", skip_serializing_if = "Option::is_none")]
    pub srctime_format: Option<String>,

    /// 그 외 확장 속성
    #[serde(flatten)]
    pub extensions: BTreeMap<String, Value>,
}

impl RawPatternDefinition {
    /// 이름만 가진 빈 정의를 만듭니다.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// 임의의 JSON/YAML/TOML 값에서 정의를 만듭니다.
    pub fn from_value(value: Value) -> Result<Self, ClassifierError> {
        let name = value
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or("(unnamed)")
            .to_owned();
        let def: Self = serde_json::from_value(value).map_err(|e| ClassifierError::Definition {
            name,
            reason: e.to_string(),
        })?;
        def.validate()?;
        Ok(def)
    }

    /// 정의의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), ClassifierError> {
        if self.name.trim().is_empty() {
            return Err(ClassifierError::Definition {
                name: "(empty)".to_owned(),
                reason: "pattern definition must declare a name".to_owned(),
            });
        }

        if self.name.len() > MAX_NAME_LEN {
            return Err(ClassifierError::Definition {
                name: self.name.clone(),
                reason: format!("name must not exceed {MAX_NAME_LEN} characters"),
            });
        }

        if self.srctime_field.is_some() != self.srctime_format.is_some() {
            return Err(ClassifierError::Definition {
                name: self.name.clone(),
                reason: "srctime-field and srctime-format must be declared together".to_owned(),
            });
        }

        Ok(())
    }

    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parents.push(parent.into());
        self
    }

    pub fn with_order(mut self, order: i64) -> Self {
        self.order = Some(order);
        self
    }

    pub fn with_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.patterns.push(pattern.into());
        self
    }

    pub fn with_optional_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.optional_patterns.push(pattern.into());
        self
    }

    /// 템플릿을 적용할 필드를 지정합니다.
    pub fn with_source_field(mut self, field: impl Into<String>) -> Self {
        self.match_field = Some(field.into());
        self
    }

    /// 명시적 필드 타입을 추가합니다.
    pub fn with_field(mut self, name: impl Into<String>, ty: impl Into<String>) -> Self {
        let mut typed = match self.fields.take() {
            Some(spec) => spec.entries().into_iter().collect(),
            None => BTreeMap::new(),
        };
        typed.insert(name.into(), ty.into());
        self.fields = Some(FieldSpec::Typed(typed));
        self
    }

    pub fn with_condition(mut self, field: impl Into<String>, regex: impl Into<String>) -> Self {
        self.cond.insert(field.into(), regex.into());
        self
    }

    pub fn with_soft_condition(
        mut self,
        field: impl Into<String>,
        regex: impl Into<String>,
    ) -> Self {
        self.softcond.insert(field.into(), regex.into());
        self
    }

    pub fn with_replace(
        mut self,
        field: impl Into<String>,
        regex: impl Into<String>,
        replacement: impl Into<String>,
    ) -> Self {
        self.replace.push(ReplaceRule {
            field: field.into(),
            regex: regex.into(),
            replacement: replacement.into(),
        });
        self
    }

    pub fn with_source_time(mut self, field: impl Into<String>, format: impl Into<String>) -> Self {
        self.srctime_field = Some(field.into());
        self.srctime_format = Some(format.into());
        self
    }

    pub fn with_csv_fields<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.csv_fields.extend(names.into_iter().map(Into::into));
        self
    }
}

// --- serde 헬퍼 ---

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<OneOrMany>::deserialize(deserializer)? {
        None => Vec::new(),
        Some(OneOrMany::One(s)) => vec![s],
        Some(OneOrMany::Many(v)) => v,
    })
}

#[derive(Deserialize)]
#[serde(untagged)]
enum IntOrString {
    Int(i64),
    Str(String),
}

fn int_or_string<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<IntOrString>::deserialize(deserializer)? {
        None => Ok(None),
        Some(IntOrString::Int(i)) => Ok(Some(i)),
        Some(IntOrString::Str(s)) => s
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| D::Error::custom(format!("order must be an integer, got '{s}'"))),
    }
}
