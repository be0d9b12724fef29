//! 매칭 후 필드 후처리
//!
//! 노드가 매칭된 뒤 누산기 레코드에 적용되는 단계들입니다.
//!
//! 1. 숫자 변환 ([`coerce_fields`]) — 실패하면 원래 문자열을 유지하고 경고
//! 2. 복합 필드 확장 ([`expand_complex`]) — JSON, CSV, URL 쿼리 문자열.
//!    실패는 에러로 반환되어 매칭 엔진이 후보를 불일치로 처리합니다.
//! 3. 정규식 치환 ([`apply_transforms`])
//! 4. 보조 타임스탬프 추출 ([`extract_source_time`]) — 실패는 조용히 무시

use logtree_core::metrics as m;
use logtree_core::types::{EVENT_TYPE_FIELD, MATCH_FIELD, Record, SOURCE_TIME_FIELD};
use regex::Regex;
use serde_json::{Map, Number, Value};
use tracing::warn;

use crate::definition::{ComplexKind, FieldType};
use crate::error::ClassifierError;
use crate::timefmt::SourceTimeFormat;

/// 복합 필드 선언
#[derive(Debug, Clone, PartialEq)]
pub struct ComplexField {
    pub kind: ComplexKind,
    pub field: String,
    /// `true`면 디코딩 결과를 같은 필드에 맵으로 저장, 아니면 최상위로 병합
    pub nested: bool,
}

/// 컴파일된 치환 규칙
#[derive(Debug, Clone)]
pub struct Transform {
    pub field: String,
    pub regex: Regex,
    pub replacement: String,
}

/// 컴파일된 보조 타임스탬프 선언
#[derive(Debug, Clone)]
pub struct SourceTime {
    pub field: String,
    pub format: SourceTimeFormat,
}

// --- 숫자 변환 ---

/// 선언된 숫자 타입으로 필드를 변환하고 실패 횟수를 반환합니다.
///
/// 문자열 값만 변환 대상입니다. 이미 숫자이거나 없는 필드는 건너뜁니다.
pub fn coerce_fields<'a, I>(record: &mut Record, fields: I, pattern: &str) -> usize
where
    I: IntoIterator<Item = (&'a str, FieldType)>,
{
    let mut failures = 0;

    for (name, ty) in fields {
        if !ty.is_numeric() {
            continue;
        }
        let Some(raw) = record.get_str(name) else {
            continue;
        };

        match coerce_value(raw, ty) {
            Some(value) => {
                record.insert(name, value);
            }
            None => {
                warn!(
                    pattern,
                    field = name,
                    value = raw,
                    ty = %ty,
                    "could not coerce field value, keeping string"
                );
                metrics::counter!(
                    m::CLASSIFIER_COERCION_FAILURES_TOTAL,
                    m::LABEL_PATTERN => pattern.to_owned()
                )
                .increment(1);
                failures += 1;
            }
        }
    }

    failures
}

/// 문자열 하나를 숫자 타입으로 변환합니다.
pub fn coerce_value(raw: &str, ty: FieldType) -> Option<Value> {
    match ty {
        FieldType::Int => raw.parse::<i32>().ok().map(Value::from),
        FieldType::Long => raw.parse::<i64>().ok().map(Value::from),
        FieldType::Float => raw
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite() && v.abs() <= f64::from(f32::MAX))
            .and_then(Number::from_f64)
            .map(Value::Number),
        FieldType::Double => raw
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .and_then(Number::from_f64)
            .map(Value::Number),
        FieldType::String | FieldType::Map => None,
    }
}

// --- 복합 필드 ---

/// 선언된 복합 필드를 확장하고 시도한 디코딩 횟수를 반환합니다.
///
/// 필드가 없거나 null이면 건너뜁니다.
///
/// # Errors
/// 디코딩 실패 시 [`ClassifierError::Decode`]
pub fn expand_complex(
    record: &mut Record,
    complex: &[ComplexField],
    csv_fields: &[String],
) -> Result<usize, ClassifierError> {
    let mut attempts = 0;

    for decl in complex {
        let Some(raw) = record.text(&decl.field) else {
            continue;
        };
        attempts += 1;

        let decoded = match decl.kind {
            ComplexKind::Json => decode_json(&raw),
            ComplexKind::Csv => split_csv_line(&raw).map(|columns| name_columns(columns, csv_fields)),
            ComplexKind::UrlArgs => split_query_args(&raw),
        }
        .map_err(|reason| ClassifierError::Decode {
            kind: decl.kind.as_str(),
            field: decl.field.clone(),
            reason,
        })?;

        if decl.nested {
            record.insert(decl.field.as_str(), Value::Object(decoded));
        } else {
            record.remove(&decl.field);
            for (key, value) in decoded {
                if is_reserved(&key) {
                    warn!(field = %decl.field, key = %key, "decoded payload key collides with a reserved key, skipping");
                    continue;
                }
                record.insert(key, value);
            }
        }
    }

    Ok(attempts)
}

/// 매칭 계보 키는 디코딩된 페이로드로 덮어쓸 수 없습니다.
fn is_reserved(key: &str) -> bool {
    key == MATCH_FIELD || key == EVENT_TYPE_FIELD
}

/// JSON 객체 문자열을 맵으로 디코딩합니다.
pub fn decode_json(raw: &str) -> Result<Map<String, Value>, String> {
    serde_json::from_str::<Map<String, Value>>(raw).map_err(|e| e.to_string())
}

/// CSV 한 줄을 열 목록으로 나눕니다.
///
/// 구분자 `,`, 인용 부호 `"`, 인용 안의 `""`는 따옴표 리터럴,
/// `\`는 뒤따르는 따옴표나 역슬래시를 이스케이프합니다.
pub fn split_csv_line(line: &str) -> Result<Vec<String>, String> {
    let mut columns = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\\' if matches!(chars.peek(), Some('"' | '\\')) => {
                if let Some(next) = chars.next() {
                    current.push(next);
                }
            }
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                current.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => columns.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }

    if in_quotes {
        return Err("unterminated quoted field".to_owned());
    }
    columns.push(current);
    Ok(columns)
}

fn name_columns(columns: Vec<String>, names: &[String]) -> Map<String, Value> {
    names
        .iter()
        .zip(columns)
        .map(|(name, value)| (name.replace('-', "_"), Value::String(value)))
        .collect()
}

/// URL 쿼리 문자열을 키-값 맵으로 나눕니다.
///
/// `=`가 없거나 맨 앞에 있는 쌍은 원문 그대로를 키로, null을 값으로 둡니다.
pub fn split_query_args(raw: &str) -> Result<Map<String, Value>, String> {
    let mut args = Map::new();

    for pair in raw.split('&').filter(|p| !p.is_empty()) {
        match pair.find('=') {
            Some(idx) if idx > 0 => {
                let key = percent_decode(&pair[..idx])?;
                let value = &pair[idx + 1..];
                let value = if value.is_empty() {
                    Value::Null
                } else {
                    Value::String(percent_decode(value)?)
                };
                args.insert(key, value);
            }
            _ => {
                args.insert(pair.to_owned(), Value::Null);
            }
        }
    }

    Ok(args)
}

/// `application/x-www-form-urlencoded` 디코딩 (`+`는 공백)
fn percent_decode(s: &str) -> Result<String, String> {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b'%' => {
                let hex = bytes
                    .get(i + 1..i + 3)
                    .filter(|h| h.iter().all(u8::is_ascii_hexdigit))
                    .and_then(|h| std::str::from_utf8(h).ok())
                    .and_then(|h| u8::from_str_radix(h, 16).ok())
                    .ok_or_else(|| format!("invalid percent escape at offset {i}"))?;
                out.push(hex);
                i += 3;
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }

    Ok(String::from_utf8_lossy(&out).into_owned())
}

// --- 치환 / 타임스탬프 ---

/// 패턴 파일의 치환 문자열을 `regex` 크레이트 형식으로 바꿉니다.
///
/// `$N`은 `${N}`이 되어 뒤따르는 문자가 그룹 이름에 섞이지 않고,
/// `\$`는 리터럴 `$`(`$$`), `\x`는 `x`가 됩니다.
pub fn normalize_replacement(replacement: &str) -> String {
    let mut out = String::with_capacity(replacement.len() + 4);
    let mut chars = replacement.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some('$') => out.push_str("$$"),
                Some(next) => out.push(next),
                None => out.push('\\'),
            },
            '$' if chars.peek().is_some_and(char::is_ascii_digit) => {
                out.push_str("${");
                while let Some(d) = chars.next_if(char::is_ascii_digit) {
                    out.push(d);
                }
                out.push('}');
            }
            _ => out.push(c),
        }
    }

    out
}

/// 선언 순서대로 정규식 치환을 적용합니다. 필드가 있을 때만 동작합니다.
pub fn apply_transforms(record: &mut Record, transforms: &[Transform]) {
    for transform in transforms {
        let Some(current) = record.text(&transform.field) else {
            continue;
        };
        let replaced = transform
            .regex
            .replace_all(&current, transform.replacement.as_str())
            .into_owned();
        record.insert(transform.field.as_str(), replaced);
    }
}

/// 보조 타임스탬프를 파싱해 [`SOURCE_TIME_FIELD`]에 기록합니다.
pub fn extract_source_time(record: &mut Record, source_time: &SourceTime) {
    let Some(raw) = record.text(&source_time.field) else {
        return;
    };
    if let Some(millis) = source_time.format.parse_millis(&raw) {
        record.insert(SOURCE_TIME_FIELD, millis);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(pairs: &[(&str, Value)]) -> Record {
        let mut r = Record::new();
        for (k, v) in pairs {
            r.insert(*k, v.clone());
        }
        r
    }

    #[test]
    fn coerce_int_and_double() {
        let mut r = record(&[("a", json!("4")), ("b", json!("2.5"))]);
        let failures = coerce_fields(
            &mut r,
            [("a", FieldType::Int), ("b", FieldType::Double)],
            "test",
        );
        assert_eq!(failures, 0);
        assert_eq!(r.get("a"), Some(&json!(4)));
        assert_eq!(r.get("b"), Some(&json!(2.5)));
    }

    #[test]
    fn coerce_failure_keeps_string() {
        let mut r = record(&[("a", json!("four"))]);
        let failures = coerce_fields(&mut r, [("a", FieldType::Int)], "test");
        assert_eq!(failures, 1);
        assert_eq!(r.get("a"), Some(&json!("four")));
    }

    #[test]
    fn int_overflow_fails_but_long_succeeds() {
        assert!(coerce_value("3000000000", FieldType::Int).is_none());
        assert_eq!(
            coerce_value("3000000000", FieldType::Long),
            Some(json!(3_000_000_000_i64))
        );
    }

    #[test]
    fn float_rejects_out_of_range_and_non_finite() {
        assert!(coerce_value("1e300", FieldType::Float).is_none());
        assert!(coerce_value("NaN", FieldType::Double).is_none());
        assert!(coerce_value("1e300", FieldType::Double).is_some());
    }

    #[test]
    fn coerce_skips_missing_and_non_string_values() {
        let mut r = record(&[("n", json!(7))]);
        let failures = coerce_fields(
            &mut r,
            [("n", FieldType::Int), ("missing", FieldType::Long)],
            "test",
        );
        assert_eq!(failures, 0);
        assert_eq!(r.get("n"), Some(&json!(7)));
    }

    #[test]
    fn json_merge_removes_raw_field() {
        let mut r = record(&[("payload", json!(r#"{"user":"bob","n":1}"#))]);
        let decl = [ComplexField {
            kind: ComplexKind::Json,
            field: "payload".to_owned(),
            nested: false,
        }];
        let attempts = expand_complex(&mut r, &decl, &[]).unwrap();
        assert_eq!(attempts, 1);
        assert!(r.get("payload").is_none());
        assert_eq!(r.get("user"), Some(&json!("bob")));
        assert_eq!(r.get("n"), Some(&json!(1)));
    }

    #[test]
    fn json_nested_stores_map_in_place() {
        let mut r = record(&[("payload", json!(r#"{"user":"bob"}"#))]);
        let decl = [ComplexField {
            kind: ComplexKind::Json,
            field: "payload".to_owned(),
            nested: true,
        }];
        expand_complex(&mut r, &decl, &[]).unwrap();
        assert_eq!(r.get("payload"), Some(&json!({"user": "bob"})));
    }

    #[test]
    fn json_decode_failure_is_error() {
        let mut r = record(&[("payload", json!("{not json"))]);
        let decl = [ComplexField {
            kind: ComplexKind::Json,
            field: "payload".to_owned(),
            nested: false,
        }];
        let err = expand_complex(&mut r, &decl, &[]).unwrap_err();
        assert!(matches!(err, ClassifierError::Decode { kind: "json", .. }));
    }

    #[test]
    fn absent_complex_field_is_skipped() {
        let mut r = Record::new();
        let decl = [ComplexField {
            kind: ComplexKind::Json,
            field: "payload".to_owned(),
            nested: false,
        }];
        assert_eq!(expand_complex(&mut r, &decl, &[]).unwrap(), 0);
    }

    #[test]
    fn csv_split_handles_quotes_and_escapes() {
        assert_eq!(split_csv_line("a,b,c").unwrap(), vec!["a", "b", "c"]);
        assert_eq!(
            split_csv_line(r#""x,y",z"#).unwrap(),
            vec!["x,y", "z"]
        );
        assert_eq!(
            split_csv_line(r#""say ""hi""",\"q"#).unwrap(),
            vec![r#"say "hi""#, r#""q"#]
        );
        assert_eq!(split_csv_line("a,,").unwrap(), vec!["a", "", ""]);
        assert!(split_csv_line(r#""open"#).is_err());
    }

    #[test]
    fn csv_columns_map_to_declared_names() {
        let mut r = record(&[("row", json!("1,GET,/index"))]);
        let decl = [ComplexField {
            kind: ComplexKind::Csv,
            field: "row".to_owned(),
            nested: false,
        }];
        let names = vec!["id".to_owned(), "http-method".to_owned()];
        expand_complex(&mut r, &decl, &names).unwrap();
        assert!(r.get("row").is_none());
        assert_eq!(r.get("id"), Some(&json!("1")));
        assert_eq!(r.get("http_method"), Some(&json!("GET")));
        assert_eq!(r.len(), 2);
    }

    #[test]
    fn query_args_decoding() {
        let args = split_query_args("a=1&b=hello+world&c=%2Fpath&flag&=x&d=").unwrap();
        assert_eq!(args.get("a"), Some(&json!("1")));
        assert_eq!(args.get("b"), Some(&json!("hello world")));
        assert_eq!(args.get("c"), Some(&json!("/path")));
        assert_eq!(args.get("flag"), Some(&Value::Null));
        assert_eq!(args.get("=x"), Some(&Value::Null));
        assert_eq!(args.get("d"), Some(&Value::Null));
    }

    #[test]
    fn query_args_bad_escape_is_error() {
        assert!(split_query_args("a=%zz").is_err());
        assert!(split_query_args("a=%4").is_err());
    }

    #[test]
    fn urlargs_nested_keeps_field() {
        let mut r = record(&[("q", json!("k=v"))]);
        let decl = [ComplexField {
            kind: ComplexKind::UrlArgs,
            field: "q".to_owned(),
            nested: true,
        }];
        expand_complex(&mut r, &decl, &[]).unwrap();
        assert_eq!(r.get("q"), Some(&json!({"k": "v"})));
    }

    #[test]
    fn transforms_apply_in_order_when_present() {
        let mut r = record(&[("path", json!("/a/b?x=1"))]);
        let transforms = vec![
            Transform {
                field: "path".to_owned(),
                regex: Regex::new(r"\?.*$").unwrap(),
                replacement: String::new(),
            },
            Transform {
                field: "path".to_owned(),
                regex: Regex::new(r"/(\w)").unwrap(),
                replacement: "[$1]".to_owned(),
            },
            Transform {
                field: "missing".to_owned(),
                regex: Regex::new(".*").unwrap(),
                replacement: "x".to_owned(),
            },
        ];
        apply_transforms(&mut r, &transforms);
        assert_eq!(r.get("path"), Some(&json!("[a][b]")));
        assert!(r.get("missing").is_none());
    }

    #[test]
    fn json_merge_cannot_overwrite_lineage_keys() {
        let mut r = record(&[
            ("body", json!(r#"{"__match":"evil","eventType":"spoofed","user":"bob"}"#)),
            (MATCH_FIELD, json!(["events", "json_body"])),
        ]);
        let decl = [ComplexField {
            kind: ComplexKind::Json,
            field: "body".to_owned(),
            nested: false,
        }];
        expand_complex(&mut r, &decl, &[]).unwrap();
        assert_eq!(r.get(MATCH_FIELD), Some(&json!(["events", "json_body"])));
        assert!(r.get(EVENT_TYPE_FIELD).is_none());
        assert_eq!(r.get("user"), Some(&json!("bob")));
    }

    #[test]
    fn replacement_group_references_are_delimited() {
        assert_eq!(normalize_replacement("$1x"), "${1}x");
        assert_eq!(normalize_replacement("svc-$12"), "svc-${12}");
        assert_eq!(normalize_replacement(r"\$1"), "$$1");
        assert_eq!(normalize_replacement("${name}"), "${name}");

        let mut r = record(&[("w", json!("abc"))]);
        let transforms = vec![Transform {
            field: "w".to_owned(),
            regex: Regex::new("(abc)").unwrap(),
            replacement: normalize_replacement("$1x"),
        }];
        apply_transforms(&mut r, &transforms);
        assert_eq!(r.get("w"), Some(&json!("abcx")));
    }

    #[test]
    fn source_time_is_written_as_millis() {
        let mut r = record(&[("ts", json!("1970-01-01 00:00:02"))]);
        let st = SourceTime {
            field: "ts".to_owned(),
            format: SourceTimeFormat::new("yyyy-MM-dd HH:mm:ss").unwrap(),
        };
        extract_source_time(&mut r, &st);
        assert_eq!(r.get(SOURCE_TIME_FIELD), Some(&json!(2000)));
    }

    #[test]
    fn source_time_failure_omits_field() {
        let mut r = record(&[("ts", json!("garbage"))]);
        let st = SourceTime {
            field: "ts".to_owned(),
            format: SourceTimeFormat::new("yyyy-MM-dd").unwrap(),
        };
        extract_source_time(&mut r, &st);
        assert!(r.get(SOURCE_TIME_FIELD).is_none());
    }
}
