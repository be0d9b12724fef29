//! 패턴별 진단 카운터
//!
//! 노드마다 네 개의 단조 증가 카운터를 가집니다.
//!
//! | 카운터 | 의미 |
//! |--------|------|
//! | `matchcount` | 주 템플릿이 일치한 횟수 |
//! | `matches` | 후처리까지 통과해 매칭으로 확정된 횟수 |
//! | `nonmatches` | 조건을 통과했지만 어떤 템플릿도 일치하지 않은 횟수 |
//! | `desercount` | 복합 필드 디코딩을 시도한 횟수 |
//!
//! 카운터는 원자적으로 증가하므로 여러 스레드가 같은 통계를 공유해도 됩니다.
//! 트리가 교체되면 통계도 새로 시작합니다.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::compiler::NodeId;

/// 카운터 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatKind {
    MatchCount,
    Matches,
    NonMatches,
    DeserCount,
}

impl StatKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::MatchCount => "matchcount",
            Self::Matches => "matches",
            Self::NonMatches => "nonmatches",
            Self::DeserCount => "desercount",
        }
    }
}

#[derive(Debug, Default)]
struct NodeCounters {
    matchcount: AtomicU64,
    matches: AtomicU64,
    nonmatches: AtomicU64,
    desercount: AtomicU64,
}

impl NodeCounters {
    fn slot(&self, kind: StatKind) -> &AtomicU64 {
        match kind {
            StatKind::MatchCount => &self.matchcount,
            StatKind::Matches => &self.matches,
            StatKind::NonMatches => &self.nonmatches,
            StatKind::DeserCount => &self.desercount,
        }
    }
}

/// 트리 하나에 대응하는 통계 수집기
#[derive(Debug)]
pub struct PatternStats {
    names: Vec<String>,
    counters: Vec<NodeCounters>,
}

impl PatternStats {
    /// 노드 이름 목록(NodeId 순서)으로 수집기를 생성합니다.
    pub fn new<I>(names: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        let names: Vec<String> = names.into_iter().collect();
        let counters = names.iter().map(|_| NodeCounters::default()).collect();
        Self { names, counters }
    }

    pub fn inc(&self, node: NodeId, kind: StatKind) {
        self.add(node, kind, 1);
    }

    pub fn add(&self, node: NodeId, kind: StatKind, n: u64) {
        if let Some(counters) = self.counters.get(node.index()) {
            counters.slot(kind).fetch_add(n, Ordering::Relaxed);
        }
    }

    pub fn get(&self, node: NodeId, kind: StatKind) -> u64 {
        self.counters
            .get(node.index())
            .map_or(0, |c| c.slot(kind).load(Ordering::Relaxed))
    }

    /// 현재 값을 직렬화 가능한 스냅샷으로 복사합니다.
    pub fn snapshot(&self) -> StatsSnapshot {
        let patterns = self
            .names
            .iter()
            .zip(&self.counters)
            .map(|(name, c)| {
                (
                    name.clone(),
                    PatternCounts {
                        matchcount: c.matchcount.load(Ordering::Relaxed),
                        matches: c.matches.load(Ordering::Relaxed),
                        nonmatches: c.nonmatches.load(Ordering::Relaxed),
                        desercount: c.desercount.load(Ordering::Relaxed),
                    },
                )
            })
            .collect();
        StatsSnapshot { patterns }
    }
}

/// 패턴 하나의 카운터 값
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PatternCounts {
    pub matchcount: u64,
    pub matches: u64,
    pub nonmatches: u64,
    pub desercount: u64,
}

impl PatternCounts {
    pub fn get(&self, kind: StatKind) -> u64 {
        match kind {
            StatKind::MatchCount => self.matchcount,
            StatKind::Matches => self.matches,
            StatKind::NonMatches => self.nonmatches,
            StatKind::DeserCount => self.desercount,
        }
    }
}

/// 통계 스냅샷 (패턴 이름순)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub patterns: BTreeMap<String, PatternCounts>,
}

impl StatsSnapshot {
    pub fn get(&self, pattern: &str) -> Option<&PatternCounts> {
        self.patterns.get(pattern)
    }

    /// 한 번이라도 카운트가 올라간 패턴만 남깁니다.
    pub fn non_zero(&self) -> impl Iterator<Item = (&str, &PatternCounts)> {
        self.patterns
            .iter()
            .filter(|(_, c)| **c != PatternCounts::default())
            .map(|(name, c)| (name.as_str(), c))
    }
}
