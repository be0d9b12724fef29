//! 교체 가능한 분류기 핸들
//!
//! [`Classifier`]는 현재 활성 트리를 `Arc`로 보관합니다. 분류 호출은 잠금을
//! 잠깐 잡아 스냅샷을 복제한 뒤 잠금 밖에서 진행하므로, [`Classifier::reload`]가
//! 새 트리로 교체해도 진행 중인 분류는 이전 트리를 끝까지 사용합니다.
//! 트리는 제자리에서 수정되지 않습니다.

use std::sync::{Arc, PoisonError, RwLock};

use logtree_core::config::PatternsConfig;
use logtree_core::metrics as m;
use logtree_core::pipeline::LineParser;
use logtree_core::types::Record;
use tracing::info;

use crate::compiler::{CompileOptions, CompiledTree, PatternCompiler};
use crate::error::ClassifierError;
use crate::sources::{LoadContext, PatternSources};
use crate::stats::{PatternStats, StatsSnapshot};

/// 트리와 그 트리 전용 통계
#[derive(Debug)]
pub struct ActiveTree {
    tree: CompiledTree,
    stats: Option<PatternStats>,
}

impl ActiveTree {
    fn new(tree: CompiledTree, with_stats: bool) -> Self {
        let stats = with_stats.then(|| PatternStats::new(tree.names().map(str::to_owned)));
        Self { tree, stats }
    }

    pub fn tree(&self) -> &CompiledTree {
        &self.tree
    }

    pub fn stats(&self) -> Option<&PatternStats> {
        self.stats.as_ref()
    }

    pub fn classify(&self, line: &str) -> Record {
        self.tree.classify_with_stats(line, self.stats.as_ref())
    }
}

/// 핫 리로드를 지원하는 분류기
#[derive(Debug)]
pub struct Classifier {
    active: RwLock<Arc<ActiveTree>>,
    stats_enabled: bool,
}

impl Classifier {
    /// 컴파일된 트리로 분류기를 생성합니다.
    pub fn new(tree: CompiledTree, stats_enabled: bool) -> Self {
        metrics::gauge!(m::CLASSIFIER_PATTERNS_LOADED).set(tree.len() as f64);
        Self {
            active: RwLock::new(Arc::new(ActiveTree::new(tree, stats_enabled))),
            stats_enabled,
        }
    }

    /// 소스를 컴파일해 분류기를 생성합니다.
    pub fn compile(
        sources: &PatternSources,
        options: CompileOptions,
        stats_enabled: bool,
    ) -> Result<Self, ClassifierError> {
        let tree = PatternCompiler::new(options).compile(sources)?;
        Ok(Self::new(tree, stats_enabled))
    }

    /// `[patterns]` 설정으로 분류기를 생성합니다.
    pub async fn from_config(
        config: &PatternsConfig,
        ctx: &LoadContext,
    ) -> Result<Self, ClassifierError> {
        let sources = PatternSources::from_config(config, ctx).await?;
        let options = compile_options(config);
        Self::compile(&sources, options, config.stats)
    }

    /// 현재 활성 트리 스냅샷
    pub fn snapshot(&self) -> Arc<ActiveTree> {
        let guard = self.active.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&guard)
    }

    pub fn classify(&self, line: &str) -> Record {
        self.snapshot().classify(line)
    }

    /// 새 트리로 교체합니다. 통계는 새로 시작합니다.
    pub fn reload(&self, tree: CompiledTree) {
        let nodes = tree.len();
        let next = Arc::new(ActiveTree::new(tree, self.stats_enabled));
        {
            let mut guard = self.active.write().unwrap_or_else(PoisonError::into_inner);
            *guard = next;
        }

        metrics::counter!(m::CLASSIFIER_RELOADS_TOTAL).increment(1);
        metrics::gauge!(m::CLASSIFIER_PATTERNS_LOADED).set(nodes as f64);
        info!(patterns = nodes, "pattern tree reloaded");
    }

    /// 설정을 다시 읽어 재컴파일하고 교체합니다.
    ///
    /// 실패하면 기존 트리를 유지합니다.
    pub async fn reload_from_config(
        &self,
        config: &PatternsConfig,
        ctx: &LoadContext,
    ) -> Result<(), ClassifierError> {
        let sources = PatternSources::from_config(config, ctx).await?;
        let tree = PatternCompiler::new(compile_options(config)).compile(&sources)?;
        self.reload(tree);
        Ok(())
    }

    /// 통계 스냅샷 (통계가 꺼져 있으면 `None`)
    pub fn stats(&self) -> Option<StatsSnapshot> {
        self.snapshot().stats().map(PatternStats::snapshot)
    }

    pub fn stats_enabled(&self) -> bool {
        self.stats_enabled
    }
}

impl LineParser for Classifier {
    fn name(&self) -> &str {
        "classifier"
    }

    fn parse(&self, line: &str) -> Record {
        self.classify(line)
    }
}

/// 설정에서 컴파일 옵션을 만듭니다.
pub fn compile_options(config: &PatternsConfig) -> CompileOptions {
    CompileOptions::default()
        .with_builtins(config.use_builtins)
        .restrict_to(config.restrict_types.iter().cloned())
}
