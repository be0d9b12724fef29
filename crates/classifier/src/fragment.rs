//! Fragment 라이브러리 — 재사용 가능한 이름 붙은 정규식 조각
//!
//! 템플릿은 `%{FRAGMENT}`, `%{FRAGMENT:capture}`, `%{FRAGMENT:capture:type}`
//! 플레이스홀더로 fragment를 참조합니다. 확장 결과는 정규식 문자열과
//! 캡처 슬롯 목록입니다.
//!
//! - 캡처 이름이 있으면 `(?P<__gN>...)` 그룹으로, 없으면 `(?:...)`로 감쌉니다.
//!   캡처 이름 자체는 슬롯 테이블에만 기록되므로 정규식 그룹 이름 규칙에
//!   얽매이지 않습니다.
//! - fragment는 다른 fragment를 참조할 수 있습니다. 확장 깊이는
//!   [`MAX_EXPANSION_DEPTH`]로 제한되고 순환 참조는 에러입니다.
//! - 등록은 먼저 정의된 쪽이 이깁니다. 본문이 다른 재정의는 경고만 남깁니다.

use std::collections::BTreeMap;

use tracing::{debug, warn};

use crate::definition::TypeTag;
use crate::error::ClassifierError;

/// 내장 fragment 정의 (grok 형식)
pub const BUILTIN_FRAGMENTS: &str = include_str!("../patterns/grok-patterns");

/// fragment 중첩 확장 최대 깊이
pub const MAX_EXPANSION_DEPTH: usize = 32;

/// 확장된 템플릿의 캡처 슬롯 하나
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureSlot {
    /// 정규식 안의 그룹 이름 (`__g0`, `__g1`, ...)
    pub group: String,
    /// 레코드에 기록될 필드 이름
    pub field: String,
    /// 참조한 fragment 이름
    pub fragment: String,
    /// 추론되었거나 명시된 타입
    pub tag: TypeTag,
}

/// 플레이스홀더 확장 결과
#[derive(Debug, Clone, PartialEq)]
pub struct Expansion {
    /// 앵커가 붙지 않은 정규식 본문
    pub regex: String,
    pub captures: Vec<CaptureSlot>,
}

/// 이름 → 정규식 조각 레지스트리
#[derive(Debug, Clone, Default)]
pub struct FragmentLibrary {
    fragments: BTreeMap<String, String>,
}

impl FragmentLibrary {
    /// 빈 라이브러리를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 내장 fragment가 등록된 라이브러리를 생성합니다.
    pub fn with_builtins() -> Self {
        let mut library = Self::new();
        let added = library.register_all(parse_definitions(BUILTIN_FRAGMENTS), "builtin");
        debug!(count = added, "registered builtin fragments");
        library
    }

    /// fragment 하나를 등록합니다. 새로 등록되었으면 `true`.
    ///
    /// 이미 같은 이름이 있으면 기존 정의를 유지합니다.
    pub fn register(&mut self, name: &str, body: &str) -> bool {
        if !is_fragment_name(name) {
            warn!(fragment = name, "invalid fragment name, skipping");
            return false;
        }

        match self.fragments.get(name) {
            Some(existing) => {
                if existing != body {
                    warn!(
                        fragment = name,
                        "fragment already defined with a different body, keeping the first definition"
                    );
                }
                false
            }
            None => {
                self.fragments.insert(name.to_owned(), body.to_owned());
                true
            }
        }
    }

    /// 여러 fragment를 등록하고 새로 추가된 개수를 반환합니다.
    pub fn register_all<I>(&mut self, entries: I, source: &str) -> usize
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let added = entries
            .into_iter()
            .filter(|(name, body)| self.register(name, body))
            .count();
        debug!(source, added, "registered fragments");
        added
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.fragments.get(name).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fragments.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.fragments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fragments.keys().map(String::as_str)
    }

    /// 템플릿의 모든 플레이스홀더를 확장합니다.
    ///
    /// # Errors
    /// - 등록되지 않은 fragment 참조
    /// - 순환 참조 또는 최대 깊이 초과
    /// - 알 수 없는 명시 타입 (`%{INT:x:bogus}`)
    pub fn expand(&self, template: &str) -> Result<Expansion, ClassifierError> {
        let mut regex = String::with_capacity(template.len() * 2);
        let mut captures = Vec::new();
        let mut stack = Vec::new();
        self.expand_into(template, template, &mut regex, &mut captures, &mut stack)?;
        Ok(Expansion { regex, captures })
    }

    fn expand_into(
        &self,
        template: &str,
        text: &str,
        out: &mut String,
        captures: &mut Vec<CaptureSlot>,
        stack: &mut Vec<String>,
    ) -> Result<(), ClassifierError> {
        let mut rest = text;

        while let Some(start) = rest.find("%{") {
            out.push_str(&rest[..start]);
            let after = &rest[start + 2..];

            let Some(placeholder) = Placeholder::parse(after) else {
                // 플레이스홀더 형식이 아니면 리터럴로 둡니다.
                out.push_str("%{");
                rest = after;
                continue;
            };
            rest = &after[placeholder.len..];

            let body = self
                .fragments
                .get(placeholder.fragment)
                .ok_or_else(|| template_error(template, format!(
                    "unknown fragment '{}'",
                    placeholder.fragment
                )))?;

            if stack.iter().any(|name| name == placeholder.fragment) {
                return Err(template_error(
                    template,
                    format!(
                        "recursive fragment reference: {} -> {}",
                        stack.join(" -> "),
                        placeholder.fragment
                    ),
                ));
            }
            if stack.len() >= MAX_EXPANSION_DEPTH {
                return Err(template_error(
                    template,
                    format!("fragment nesting exceeds {MAX_EXPANSION_DEPTH} levels"),
                ));
            }

            match placeholder.capture {
                Some(field) => {
                    let tag = match placeholder.kind {
                        Some(kind) => TypeTag::parse(kind).ok_or_else(|| {
                            template_error(template, format!("unknown field type '{kind}'"))
                        })?,
                        None => TypeTag::from_fragment(placeholder.fragment),
                    };
                    // 슬롯 번호는 하위 확장 전에 예약해 그룹 순서와 일치시킵니다.
                    let group = format!("__g{}", captures.len());
                    captures.push(CaptureSlot {
                        group: group.clone(),
                        field: field.to_owned(),
                        fragment: placeholder.fragment.to_owned(),
                        tag,
                    });
                    out.push_str("(?P<");
                    out.push_str(&group);
                    out.push('>');
                }
                None => out.push_str("(?:"),
            }

            stack.push(placeholder.fragment.to_owned());
            self.expand_into(template, body, out, captures, stack)?;
            stack.pop();
            out.push(')');
        }

        out.push_str(rest);
        Ok(())
    }
}

/// `%{` 뒤의 플레이스홀더 내용
struct Placeholder<'a> {
    fragment: &'a str,
    capture: Option<&'a str>,
    kind: Option<&'a str>,
    /// 닫는 `}`까지 포함한 길이
    len: usize,
}

impl<'a> Placeholder<'a> {
    fn parse(after: &'a str) -> Option<Self> {
        let end = after.find('}')?;
        let inner = &after[..end];
        let mut parts = inner.splitn(3, ':');

        let fragment = parts.next()?;
        if !is_fragment_name(fragment) {
            return None;
        }
        let capture = parts.next().filter(|s| !s.is_empty());
        let kind = parts.next().filter(|s| !s.is_empty());
        if kind.is_some_and(|k| k.contains(':')) {
            return None;
        }

        Some(Self {
            fragment,
            capture,
            kind,
            len: end + 1,
        })
    }
}

fn is_fragment_name(name: &str) -> bool {
    !name.is_empty() && name.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_')
}

fn template_error(template: &str, reason: String) -> ClassifierError {
    ClassifierError::Template {
        template: template.to_owned(),
        reason,
    }
}

/// grok 형식 텍스트(`NAME regex` 한 줄씩)를 파싱합니다.
///
/// 빈 줄과 `#` 주석은 무시합니다. 본문이 없는 줄은 경고 후 건너뜁니다.
pub fn parse_definitions(text: &str) -> Vec<(String, String)> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| {
            let (name, body) = match line.split_once(char::is_whitespace) {
                Some((name, body)) => (name, body.trim()),
                None => (line, ""),
            };
            if body.is_empty() {
                warn!(fragment = name, "fragment definition has no body, skipping");
                return None;
            }
            Some((name.to_owned(), body.to_owned()))
        })
        .collect()
}
