//! 보조 타임스탬프(srctime) 형식 처리
//!
//! `srctime-format`은 두 가지 형태를 받습니다.
//! - `%`를 포함하면 strftime 형식으로 그대로 사용합니다 (`%Y-%m-%dT%H:%M:%S%z`).
//! - 그 외에는 Java 스타일 날짜 토큰(`yyyy-MM-dd'T'HH:mm:ssX`)으로 보고
//!   strftime으로 변환합니다.
//!
//! 시간대 정보가 없는 값은 UTC로 해석합니다.

use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, NaiveDate, NaiveDateTime};

/// 컴파일된 srctime 형식
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceTimeFormat {
    original: String,
    strftime: String,
}

impl SourceTimeFormat {
    /// 형식 문자열을 해석합니다.
    ///
    /// # Errors
    /// 지원하지 않는 토큰이나 잘못된 strftime 지정자가 있으면 사유 문자열을 반환합니다.
    pub fn new(format: &str) -> Result<Self, String> {
        let strftime = if format.contains('%') {
            format.to_owned()
        } else {
            translate_java(format)?
        };

        if StrftimeItems::new(&strftime).any(|item| matches!(item, Item::Error)) {
            return Err(format!("invalid time format '{format}'"));
        }

        Ok(Self {
            original: format.to_owned(),
            strftime,
        })
    }

    /// 사용자가 선언한 원래 형식
    pub fn original(&self) -> &str {
        &self.original
    }

    /// 실제 파싱에 쓰이는 strftime 형식
    pub fn strftime(&self) -> &str {
        &self.strftime
    }

    /// 값을 epoch 밀리초로 파싱합니다. 실패하면 `None`.
    pub fn parse_millis(&self, value: &str) -> Option<i64> {
        let value = value.trim();
        if let Ok(dt) = DateTime::parse_from_str(value, &self.strftime) {
            return Some(dt.timestamp_millis());
        }
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, &self.strftime) {
            return Some(naive.and_utc().timestamp_millis());
        }
        NaiveDate::parse_from_str(value, &self.strftime)
            .ok()
            .and_then(|date| date.and_hms_opt(0, 0, 0))
            .map(|naive| naive.and_utc().timestamp_millis())
    }
}

/// Java 날짜 패턴을 strftime으로 변환합니다.
fn translate_java(format: &str) -> Result<String, String> {
    let chars: Vec<char> = format.chars().collect();
    let twelve_hour = has_am_pm_marker(&chars);
    let mut out = String::with_capacity(format.len() * 2);
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        if c == '\'' {
            // '' 는 작은따옴표 리터럴
            if chars.get(i + 1) == Some(&'\'') {
                out.push('\'');
                i += 2;
                continue;
            }
            let mut j = i + 1;
            loop {
                match chars.get(j) {
                    None => return Err(format!("unterminated quote in '{format}'")),
                    Some('\'') if chars.get(j + 1) == Some(&'\'') => {
                        out.push('\'');
                        j += 2;
                    }
                    Some('\'') => break,
                    Some(&lit) => {
                        push_literal(&mut out, lit);
                        j += 1;
                    }
                }
            }
            i = j + 1;
            continue;
        }

        if !c.is_ascii_alphabetic() {
            push_literal(&mut out, c);
            i += 1;
            continue;
        }

        let run = chars[i..].iter().take_while(|&&x| x == c).count();
        let spec = match (c, run) {
            ('y' | 'Y' | 'u', 2) => "%y",
            ('y' | 'Y' | 'u', _) => "%Y",
            ('M' | 'L', 1 | 2) => "%m",
            ('M' | 'L', 3) => "%b",
            ('M' | 'L', _) => "%B",
            ('d', _) => "%d",
            ('h' | 'K', _) if twelve_hour => "%I",
            // 오전/오후 표시가 없으면 12시간제 토큰도 0시를 받도록 %H로 읽습니다.
            ('H' | 'k' | 'h' | 'K', _) => "%H",
            ('m', _) => "%M",
            ('s', _) => "%S",
            ('S', 1..=3) => "%3f",
            ('S', 4..=6) => "%6f",
            ('S', _) => "%9f",
            ('a', _) => "%p",
            ('E', 1..=3) => "%a",
            ('E', _) => "%A",
            ('X' | 'x' | 'Z', _) => "%#z",
            (other, _) => {
                return Err(format!(
                    "unsupported date token '{}' in '{format}'",
                    other.to_string().repeat(run)
                ));
            }
        };
        out.push_str(spec);
        i += run;
    }

    Ok(out)
}

/// 인용 구간 밖에 `a`(오전/오후) 토큰이 있는지 확인합니다.
fn has_am_pm_marker(chars: &[char]) -> bool {
    let mut quoted = false;
    chars.iter().any(|&c| {
        if c == '\'' {
            quoted = !quoted;
        }
        !quoted && c == 'a'
    })
}

fn push_literal(out: &mut String, c: char) {
    if c == '%' {
        out.push_str("%%");
    } else {
        out.push(c);
    }
}
