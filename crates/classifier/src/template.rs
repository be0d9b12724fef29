//! 컴파일된 매칭 템플릿
//!
//! 템플릿 문자열을 fragment 라이브러리로 확장한 뒤 전체 일치(`^...$`)
//! 정규식으로 컴파일합니다. `regex` 크레이트는 선형 시간 엔진이므로
//! 백트래킹 폭주가 없고, 컴파일 크기 제한으로 과도한 템플릿을 거부합니다.

use std::collections::HashSet;

use regex::{Regex, RegexBuilder};

use crate::definition::{FieldType, TypeTag};
use crate::error::ClassifierError;
use crate::fragment::{CaptureSlot, FragmentLibrary};

/// 템플릿 하나가 차지할 수 있는 최대 컴파일 크기 (bytes)
const MAX_COMPILED_SIZE: usize = 10 * (1 << 20);

/// 컴파일된 템플릿
#[derive(Debug, Clone)]
pub struct Template {
    source: String,
    regex: Regex,
    captures: Vec<CaptureSlot>,
    /// 템플릿에 직접 쓴 이름 그룹 (`(?P<name>...)`)
    raw_groups: Vec<String>,
}

impl Template {
    /// 템플릿을 확장하고 컴파일합니다.
    pub fn compile(source: &str, library: &FragmentLibrary) -> Result<Self, ClassifierError> {
        let expansion = library.expand(source)?;
        let anchored = format!("^(?:{})$", expansion.regex);

        let regex = RegexBuilder::new(&anchored)
            .size_limit(MAX_COMPILED_SIZE)
            .build()
            .map_err(|e| ClassifierError::Template {
                template: source.to_owned(),
                reason: e.to_string(),
            })?;

        let slot_groups: HashSet<&str> = expansion
            .captures
            .iter()
            .map(|slot| slot.group.as_str())
            .collect();
        let raw_groups = regex
            .capture_names()
            .flatten()
            .filter(|name| !slot_groups.contains(name))
            .map(str::to_owned)
            .collect();

        Ok(Self {
            source: source.to_owned(),
            regex,
            captures: expansion.captures,
            raw_groups,
        })
    }

    /// 원본 템플릿 문자열
    pub fn source(&self) -> &str {
        &self.source
    }

    /// 이 템플릿이 만드는 필드와 타입 태그 (선언 순서)
    pub fn fields(&self) -> impl Iterator<Item = (&str, TypeTag)> + '_ {
        self.captures
            .iter()
            .map(|slot| (slot.field.as_str(), slot.tag))
            .chain(
                self.raw_groups
                    .iter()
                    .map(|name| (name.as_str(), TypeTag::Field(FieldType::String))),
            )
    }

    pub fn is_match(&self, subject: &str) -> bool {
        self.regex.is_match(subject)
    }

    /// 전체 일치 시 캡처된 `(필드, 값)` 목록을 반환합니다.
    ///
    /// 참여하지 않은 그룹은 포함하지 않습니다.
    pub fn apply(&self, subject: &str) -> Option<Vec<(String, String)>> {
        let caps = self.regex.captures(subject)?;

        let slots = self.captures.iter().filter_map(|slot| {
            caps.name(&slot.group)
                .map(|m| (slot.field.clone(), m.as_str().to_owned()))
        });
        let raw = self.raw_groups.iter().filter_map(|name| {
            caps.name(name)
                .map(|m| (name.clone(), m.as_str().to_owned()))
        });

        Some(slots.chain(raw).collect())
    }
}
