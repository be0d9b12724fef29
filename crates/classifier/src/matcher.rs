//! 매칭 엔진 -- 컴파일된 트리로 한 줄을 분류합니다.
//!
//! 레벨마다 정렬된 후보를 차례로 시험하고, 처음으로 완전히 매칭된 후보의
//! 자식으로 내려간 뒤 그 레벨의 나머지 형제는 보지 않습니다.
//!
//! 후보는 누산기의 복사본 위에서 처리됩니다. 복합 필드 디코딩이 실패하면
//! 복사본을 버리고 다음 형제를 시도하므로 실패한 후보의 캡처나 `__match`
//! 항목은 레코드에 남지 않습니다.

use logtree_core::metrics as m;
use logtree_core::types::{BASE_EVENT_TYPE, Record};
use serde_json::Value;
use tracing::{trace, warn};

use crate::compiler::{CompiledNode, CompiledTree, NodeId};
use crate::error::ClassifierError;
use crate::postprocess::{apply_transforms, coerce_fields, expand_complex, extract_source_time};
use crate::stats::{PatternStats, StatKind};

impl CompiledTree {
    /// 한 줄을 분류합니다. 분류는 실패하지 않습니다.
    pub fn classify(&self, line: &str) -> Record {
        self.classify_with_stats(line, None)
    }

    /// 통계 수집기와 함께 분류합니다.
    pub fn classify_with_stats(&self, line: &str, stats: Option<&PatternStats>) -> Record {
        metrics::counter!(m::CLASSIFIER_LINES_TOTAL).increment(1);

        let mut record = Record::from_line(line);
        self.walk(&self.roots, &mut record, stats);

        let lineage_len = record.lineage().len();
        if lineage_len == 0 {
            record.push_match(BASE_EVENT_TYPE);
        }
        if lineage_len <= 1 {
            metrics::counter!(m::CLASSIFIER_FALLBACK_TOTAL).increment(1);
        }

        let event_type = record
            .lineage()
            .last()
            .map_or_else(|| BASE_EVENT_TYPE.to_owned(), |last| (*last).to_owned());
        record.set_event_type(&event_type);

        record
    }

    fn walk(&self, candidates: &[NodeId], record: &mut Record, stats: Option<&PatternStats>) {
        for &id in candidates {
            let Some(node) = self.get(id) else { continue };

            if !node.conditions_hold(record) {
                continue;
            }

            let Some(subject) = record.text(&node.match_field) else {
                continue;
            };

            let Some(captures) = node.patterns.iter().find_map(|t| t.apply(&subject)) else {
                count(stats, id, StatKind::NonMatches, 1);
                continue;
            };
            count(stats, id, StatKind::MatchCount, 1);

            let mut candidate = record.clone();
            for (field, value) in captures {
                candidate.insert(field, value);
            }
            candidate.push_match(&node.name);

            for template in &node.optional_patterns {
                if let Some(extra) = template.apply(&subject) {
                    for (field, value) in extra {
                        candidate.insert(field, value);
                    }
                }
            }

            coerce_fields(&mut candidate, node.coercion_fields(), &node.name);

            match expand_complex(&mut candidate, &node.complex, &node.csv_fields) {
                Ok(attempts) => count(stats, id, StatKind::DeserCount, attempts as u64),
                Err(e) => {
                    count(stats, id, StatKind::DeserCount, 1);
                    report_decode_failure(node, &e);
                    continue;
                }
            }

            apply_transforms(&mut candidate, &node.transforms);
            if let Some(source_time) = &node.source_time {
                extract_source_time(&mut candidate, source_time);
            }

            count(stats, id, StatKind::Matches, 1);
            trace!(pattern = %node.name, "pattern matched");

            *record = candidate;
            self.walk(&node.children, record, stats);
            break;
        }
    }
}

impl CompiledNode {
    /// 하드 조건은 모두 존재하고 일치해야 하며, 소프트 조건은 필드가 있을 때만 검사합니다.
    pub(crate) fn conditions_hold(&self, record: &Record) -> bool {
        let hard = self.conditions.iter().all(|cond| {
            record
                .text(&cond.field)
                .is_some_and(|value| cond.is_match(&value))
        });
        if !hard {
            return false;
        }

        self.soft_conditions
            .iter()
            .all(|cond| match record.get(&cond.field) {
                None | Some(Value::Null) => true,
                Some(_) => record
                    .text(&cond.field)
                    .is_some_and(|value| cond.is_match(&value)),
            })
    }
}

fn count(stats: Option<&PatternStats>, id: NodeId, kind: StatKind, n: u64) {
    if let Some(stats) = stats {
        if n > 0 {
            stats.add(id, kind, n);
        }
    }
}

fn report_decode_failure(node: &CompiledNode, error: &ClassifierError) {
    let kind = match error {
        ClassifierError::Decode { kind, .. } => *kind,
        _ => "unknown",
    };
    warn!(
        pattern = %node.name,
        kind,
        error = %error,
        "complex field decode failed, trying next candidate"
    );
    metrics::counter!(
        m::CLASSIFIER_DECODE_FAILURES_TOTAL,
        m::LABEL_PATTERN => node.name.clone(),
        m::LABEL_COMPLEX_KIND => kind
    )
    .increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::{CompileOptions, compile};
    use crate::definition::RawPatternDefinition;
    use crate::sources::PatternSources;
    use logtree_core::types::SOURCE_TIME_FIELD;
    use serde_json::json;

    fn tree(defs: Vec<RawPatternDefinition>) -> CompiledTree {
        let sources = defs
            .into_iter()
            .fold(PatternSources::new(), PatternSources::with_definition);
        compile(&sources, &CompileOptions::default()).unwrap()
    }

    #[test]
    fn unmatched_line_falls_back_to_base() {
        let t = tree(vec![]);
        let r = t.classify("logline");
        assert_eq!(r.event_type(), Some("events"));
        assert_eq!(r.data(), Some("logline"));
        assert_eq!(r.lineage(), vec!["events"]);
    }

    #[test]
    fn builtin_logevents_line() {
        let t = tree(vec![]);
        let r = t.classify("2020-04-14T14:11:21+03:00\tlocalhost\t1234\tlogline");
        assert_eq!(r.event_type(), Some("logevents"));
        assert_eq!(r.lineage(), vec!["events", "logevents"]);
        assert_eq!(r.get("host"), Some(&json!("localhost")));
        assert_eq!(r.get("pid"), Some(&json!("1234")));
        assert_eq!(r.data(), Some("logline"));
        assert_eq!(r.get(SOURCE_TIME_FIELD), Some(&json!(1_586_862_681_000_i64)));
    }

    #[test]
    fn first_matching_sibling_wins() {
        let t = tree(vec![
            RawPatternDefinition::new("late").with_order(2).with_pattern("%{INT:n}"),
            RawPatternDefinition::new("early").with_order(1).with_pattern("%{INT:n}"),
        ]);
        let r = t.classify("7");
        assert_eq!(r.lineage(), vec!["events", "early"]);
    }

    #[test]
    fn hard_condition_requires_field() {
        let t = tree(vec![
            RawPatternDefinition::new("guarded")
                .with_condition("level", "ERROR")
                .with_pattern("%{GREEDYDATA:msg}"),
        ]);
        assert_eq!(t.classify("anything").event_type(), Some("events"));
    }

    #[test]
    fn soft_condition_only_checked_when_present() {
        let t = tree(vec![
            RawPatternDefinition::new("level_line")
                .with_pattern("%{WORD:level} %{GREEDYDATA:rest}"),
            RawPatternDefinition::new("errors")
                .with_parent("level_line")
                .with_soft_condition("level", "ERROR|FATAL")
                .with_source_field("rest")
                .with_pattern("%{GREEDYDATA:detail}"),
            RawPatternDefinition::new("anything")
                .with_parent("level_line")
                .with_soft_condition("missing_field", "never")
                .with_source_field("rest")
                .with_pattern("%{GREEDYDATA:detail}"),
        ]);
        assert_eq!(t.classify("ERROR disk full").event_type(), Some("errors"));
        assert_eq!(t.classify("INFO all good").event_type(), Some("anything"));
    }

    #[test]
    fn decode_failure_tries_next_sibling_without_residue() {
        let mut json_node = RawPatternDefinition::new("json_body")
            .with_order(1)
            .with_pattern("%{WORD:verb} %{GREEDYDATA:body}");
        json_node.json = Some("body".to_owned());
        let t = tree(vec![
            json_node,
            RawPatternDefinition::new("plain")
                .with_order(2)
                .with_pattern("%{WORD:action} %{GREEDYDATA:text}"),
        ]);

        let r = t.classify("post {not json");
        assert_eq!(r.lineage(), vec!["events", "plain"]);
        assert!(r.get("verb").is_none());
        assert!(r.get("body").is_none());

        let ok = t.classify(r#"post {"user":"bob"}"#);
        assert_eq!(ok.event_type(), Some("json_body"));
        assert_eq!(ok.get("user"), Some(&json!("bob")));
    }

    #[test]
    fn children_see_enriched_record_and_inherited_coercion() {
        let t = tree(vec![
            RawPatternDefinition::new("coded").with_pattern("%{INT:code} %{GREEDYDATA:rest}"),
            RawPatternDefinition::new("detail")
                .with_parent("coded")
                .with_condition("code", "5..")
                .with_source_field("rest")
                .with_pattern("%{WORD:word}"),
        ]);
        let r = t.classify("503 unavailable");
        assert_eq!(r.event_type(), Some("detail"));
        assert_eq!(r.get("code"), Some(&json!(503)));
        assert_eq!(r.get("word"), Some(&json!("unavailable")));

        let r = t.classify("200 fine");
        assert_eq!(r.event_type(), Some("coded"));
    }

    #[test]
    fn optional_patterns_add_fields_only() {
        let t = tree(vec![
            RawPatternDefinition::new("req")
                .with_pattern("GET %{NOTSPACE:path}.*")
                .with_optional_pattern(".*rt=%{NUMBER:rt:float}.*"),
        ]);
        let with_rt = t.classify("GET /a rt=0.5");
        assert_eq!(with_rt.get("rt"), Some(&json!(0.5)));
        let without = t.classify("GET /a");
        assert_eq!(without.event_type(), Some("req"));
        assert!(without.get("rt").is_none());
    }

    #[test]
    fn stats_are_counted_per_node() {
        let t = tree(vec![RawPatternDefinition::new("num").with_pattern("%{INT:n}")]);
        let stats = PatternStats::new(t.names().map(str::to_owned));
        t.classify_with_stats("5", Some(&stats));
        t.classify_with_stats("x", Some(&stats));

        let snap = stats.snapshot();
        assert_eq!(snap.get("num").unwrap().matches, 1);
        assert_eq!(snap.get("num").unwrap().nonmatches, 1);
        assert_eq!(snap.get("events").unwrap().matches, 2);
    }
}
