//! 패턴 컴파일러 -- 원시 정의를 불변 패턴 트리로 변환합니다.
//!
//! # 처리 순서
//! 1. fragment 등록: 내장 라이브러리, fragment 파일, 패턴 파일의 `grok` 맵,
//!    코드에서 등록한 fragment 순 (먼저 정의된 쪽이 이김)
//! 2. 정의 병합: 내장 세트, 파일, 인라인, 사전 등록 이벤트 타입 순
//!    (이름 중복 시 먼저 선언된 쪽이 이김)
//! 3. 노드별 템플릿/조건/치환 컴파일 -- 실패한 노드는 경고 후 제외
//! 4. 기본 타입(`events`)이 없으면 catch-all 노드 합성
//! 5. 부모 없는 노드를 기본 타입 아래로 재배치
//! 6. 아레나 연결, 조상 closure와 상속 필드 계산, 순환 참조 차단
//! 7. `restrict_to`가 있으면 대상과 조상만 남기고 다시 연결
//! 8. 자식 목록을 `(order, 선언 순서)`로 정렬
//!
//! 컴파일은 기본 타입조차 만들 수 없을 때만 실패합니다.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::fmt::Write as _;

use logtree_core::types::{BASE_EVENT_TYPE, DATA_FIELD};
use regex::Regex;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::definition::{ComplexKind, FieldType, NestedMarker, RawPatternDefinition, TypeTag};
use crate::error::ClassifierError;
use crate::fragment::FragmentLibrary;
use crate::loader::{PatternFile, PatternLoader};
use crate::postprocess::{ComplexField, SourceTime, Transform, normalize_replacement};
use crate::sources::PatternSources;
use crate::template::Template;
use crate::timefmt::SourceTimeFormat;

/// 컴파일 옵션
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileOptions {
    /// 내장 기본 패턴 세트 포함 여부
    pub use_builtins: bool,
    /// 지정하면 이 타입들과 그 조상만 남깁니다.
    pub restrict_to: Option<Vec<String>>,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            use_builtins: true,
            restrict_to: None,
        }
    }
}

impl CompileOptions {
    pub fn with_builtins(mut self, use_builtins: bool) -> Self {
        self.use_builtins = use_builtins;
        self
    }

    /// 빈 목록은 제한 없음으로 취급합니다.
    pub fn restrict_to<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        self.restrict_to = (!names.is_empty()).then_some(names);
        self
    }
}

/// 아레나 안의 노드 인덱스
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn new(index: usize) -> Self {
        Self(index)
    }

    pub fn index(self) -> usize {
        self.0
    }
}

/// 전체 일치로 검사하는 필드 조건
#[derive(Debug, Clone)]
pub struct Condition {
    pub field: String,
    regex: Regex,
}

impl Condition {
    fn new(field: &str, pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            field: field.to_owned(),
            regex: Regex::new(&format!("^(?:{pattern})$"))?,
        })
    }

    pub fn is_match(&self, value: &str) -> bool {
        self.regex.is_match(value)
    }
}

/// 컴파일된 패턴 노드
#[derive(Debug, Clone)]
pub struct CompiledNode {
    pub(crate) name: String,
    pub(crate) parent_names: Vec<String>,
    pub(crate) parents: Vec<NodeId>,
    pub(crate) children: Vec<NodeId>,
    pub(crate) order: Option<i64>,
    pub(crate) decl_index: usize,
    pub(crate) patterns: Vec<Template>,
    pub(crate) optional_patterns: Vec<Template>,
    pub(crate) fields: BTreeMap<String, FieldType>,
    pub(crate) inherited_fields: BTreeMap<String, FieldType>,
    pub(crate) conditions: Vec<Condition>,
    pub(crate) soft_conditions: Vec<Condition>,
    pub(crate) match_field: String,
    pub(crate) complex: Vec<ComplexField>,
    pub(crate) csv_fields: Vec<String>,
    pub(crate) transforms: Vec<Transform>,
    pub(crate) source_time: Option<SourceTime>,
    pub(crate) ancestors: BTreeSet<String>,
    pub(crate) extensions: BTreeMap<String, Value>,
}

impl CompiledNode {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 선언된 부모 이름
    pub fn parent_names(&self) -> &[String] {
        &self.parent_names
    }

    pub fn parents(&self) -> &[NodeId] {
        &self.parents
    }

    /// 평가 순서로 정렬된 자식
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn order(&self) -> Option<i64> {
        self.order
    }

    pub fn patterns(&self) -> &[Template] {
        &self.patterns
    }

    pub fn optional_patterns(&self) -> &[Template] {
        &self.optional_patterns
    }

    /// 자신의 필드 타입 테이블
    pub fn fields(&self) -> &BTreeMap<String, FieldType> {
        &self.fields
    }

    /// 조상들로부터 상속된 필드 (가까운 조상 우선)
    pub fn inherited_fields(&self) -> &BTreeMap<String, FieldType> {
        &self.inherited_fields
    }

    pub fn match_field(&self) -> &str {
        &self.match_field
    }

    pub fn complex_fields(&self) -> &[ComplexField] {
        &self.complex
    }

    pub fn source_time(&self) -> Option<&SourceTime> {
        self.source_time.as_ref()
    }

    /// 모든 전이적 조상 이름
    pub fn ancestors(&self) -> &BTreeSet<String> {
        &self.ancestors
    }

    /// 알 수 없는 키로 선언된 확장 속성
    pub fn extension(&self, key: &str) -> Option<&Value> {
        self.extensions.get(key)
    }

    /// 숫자 변환 대상 필드: 상속 필드에 자신의 선언을 덮어쓴 결과
    pub(crate) fn coercion_fields(&self) -> impl Iterator<Item = (&str, FieldType)> {
        self.inherited_fields
            .iter()
            .filter(|(name, _)| !self.fields.contains_key(*name))
            .chain(self.fields.iter())
            .map(|(name, ty)| (name.as_str(), *ty))
    }

    fn sort_key(&self) -> (bool, i64, usize) {
        (self.order.is_none(), self.order.unwrap_or(0), self.decl_index)
    }
}

/// 불변 패턴 트리
///
/// 노드는 아레나(`Vec`)에 저장되고 부모/자식 관계는 [`NodeId`]로 표현됩니다.
/// 트리는 한 번 만들어지면 바뀌지 않으며 여러 스레드에서 동시에 읽을 수 있습니다.
#[derive(Debug, Clone)]
pub struct CompiledTree {
    pub(crate) nodes: Vec<CompiledNode>,
    pub(crate) roots: Vec<NodeId>,
    index: HashMap<String, NodeId>,
}

impl CompiledTree {
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, id: NodeId) -> Option<&CompiledNode> {
        self.nodes.get(id.index())
    }

    pub fn id_of(&self, name: &str) -> Option<NodeId> {
        self.index.get(name).copied()
    }

    pub fn node(&self, name: &str) -> Option<&CompiledNode> {
        self.id_of(name).and_then(|id| self.get(id))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// 최상위 후보 (부모가 없는 노드)
    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.get(id).map_or(&[], |node| node.children())
    }

    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &CompiledNode)> {
        self.nodes
            .iter()
            .enumerate()
            .map(|(i, node)| (NodeId(i), node))
    }

    /// 노드 이름 (NodeId 순서)
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.nodes.iter().map(|node| node.name.as_str())
    }

    /// 계층을 한 줄에 노드 하나씩 출력합니다.
    ///
    /// 깊이마다 `+`가 하나씩 붙고, `with_fields`면 자신의 필드 이름을 덧붙입니다.
    ///
    /// ```text
    /// + events = data
    /// ++ logevents = data,host,logts,pid
    /// ```
    pub fn pretty_print(&self, with_fields: bool) -> String {
        let mut out = String::new();
        let mut stack: Vec<(NodeId, usize)> =
            self.roots.iter().rev().map(|&id| (id, 1)).collect();

        // 다중 부모 노드는 각 부모 아래에 모두 출력됩니다.
        while let Some((id, depth)) = stack.pop() {
            let Some(node) = self.get(id) else { continue };

            let _ = write!(out, "{} {}", "+".repeat(depth), node.name);
            if with_fields && !node.fields.is_empty() {
                let names: Vec<&str> = node.fields.keys().map(String::as_str).collect();
                let _ = write!(out, " = {}", names.join(","));
            }
            out.push('\n');

            stack.extend(node.children.iter().rev().map(|&child| (child, depth + 1)));
        }

        out
    }

    fn into_nodes(self) -> Vec<CompiledNode> {
        self.nodes
    }

    /// `restrict` 이름들과 그 조상 closure (기본 타입은 항상 포함)
    fn restriction_set(&self, restrict: &[String]) -> HashSet<String> {
        let mut keep = HashSet::from([BASE_EVENT_TYPE.to_owned()]);
        for name in restrict {
            match self.node(name) {
                Some(node) => {
                    keep.insert(name.clone());
                    keep.extend(node.ancestors.iter().cloned());
                }
                None => warn!(pattern = %name, "restricted type is not defined, ignoring"),
            }
        }
        keep
    }
}

/// 패턴 컴파일러
#[derive(Debug, Clone, Default)]
pub struct PatternCompiler {
    options: CompileOptions,
}

impl PatternCompiler {
    pub fn new(options: CompileOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &CompileOptions {
        &self.options
    }

    /// 소스를 컴파일해 새 트리를 만듭니다.
    ///
    /// # Errors
    /// - 내장 패턴 세트를 파싱할 수 없는 경우
    /// - 기본 타입 노드를 만들 수 없는 경우
    pub fn compile(&self, sources: &PatternSources) -> Result<CompiledTree, ClassifierError> {
        let builtin = if self.options.use_builtins {
            Some(PatternLoader::builtin()?)
        } else {
            None
        };

        let library = build_library(builtin.as_ref(), sources);
        let definitions = merge_definitions(builtin.as_ref(), sources);
        let declared = definitions.len();

        let mut nodes = Vec::with_capacity(declared + 1);
        for (decl_index, def) in definitions.iter().enumerate() {
            let compiled = def
                .validate()
                .and_then(|()| compile_node(def, decl_index, &library));
            match compiled {
                Ok(node) => nodes.push(node),
                Err(e) => {
                    warn!(pattern = %def.name, error = %e, "dropping invalid pattern definition");
                }
            }
        }

        if !nodes.iter().any(|n| n.name == BASE_EVENT_TYPE) {
            info!(
                pattern = BASE_EVENT_TYPE,
                "base pattern not defined, adding catch-all definition"
            );
            let base = RawPatternDefinition::new(BASE_EVENT_TYPE)
                .with_order(1)
                .with_pattern(format!("(?P<{DATA_FIELD}>.*)"));
            let node = compile_node(&base, declared, &library).map_err(|e| {
                ClassifierError::Compile(format!("cannot construct base pattern: {e}"))
            })?;
            nodes.push(node);
        }

        normalize_parents(&mut nodes);

        let mut tree = link(nodes);

        if let Some(restrict) = &self.options.restrict_to {
            let keep = tree.restriction_set(restrict);
            let kept: Vec<CompiledNode> = tree
                .into_nodes()
                .into_iter()
                .filter(|node| keep.contains(&node.name))
                .collect();
            tree = link(kept);
            debug!(kept = tree.len(), "restricted pattern tree");
        }

        info!(
            declared,
            compiled = tree.len(),
            fragments = library.len(),
            "compiled pattern tree"
        );

        Ok(tree)
    }
}

/// 기본 옵션으로 컴파일하는 편의 함수
pub fn compile(
    sources: &PatternSources,
    options: &CompileOptions,
) -> Result<CompiledTree, ClassifierError> {
    PatternCompiler::new(options.clone()).compile(sources)
}

fn build_library(builtin: Option<&PatternFile>, sources: &PatternSources) -> FragmentLibrary {
    let mut library = FragmentLibrary::with_builtins();

    if let Some(file) = builtin {
        library.register_all(file.grok.iter().cloned(), &file.source);
    }
    for (source, entries) in &sources.fragment_files {
        library.register_all(entries.iter().cloned(), source);
    }
    for file in &sources.files {
        library.register_all(file.grok.iter().cloned(), &file.source);
    }
    library.register_all(sources.fragments.iter().cloned(), "programmatic");

    library
}

fn merge_definitions(
    builtin: Option<&PatternFile>,
    sources: &PatternSources,
) -> Vec<RawPatternDefinition> {
    let mut merged: Vec<RawPatternDefinition> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();

    let ordered = builtin
        .into_iter()
        .chain(&sources.files)
        .flat_map(|file| file.patterns.iter())
        .chain(&sources.definitions);

    for def in ordered {
        if seen.insert(def.name.clone()) {
            merged.push(def.clone());
        } else {
            warn!(
                pattern = %def.name,
                "pattern already defined, keeping the first definition"
            );
        }
    }

    // 사전 등록 타입은 같은 이름이 없을 때만 추가됩니다.
    for def in &sources.event_types {
        if seen.insert(def.name.clone()) {
            merged.push(def.clone());
        } else {
            debug!(pattern = %def.name, "pre-registered event type already defined");
        }
    }

    merged
}

fn compile_node(
    def: &RawPatternDefinition,
    decl_index: usize,
    library: &FragmentLibrary,
) -> Result<CompiledNode, ClassifierError> {
    let patterns = compile_templates(&def.patterns, library)?;
    let optional_patterns = compile_templates(&def.optional_patterns, library)?;
    if patterns.is_empty() {
        warn!(pattern = %def.name, "pattern declares no templates and will never match");
    }

    let tags = field_tags(def, &patterns, &optional_patterns);
    let (fields, complex) = split_complex(&def.name, tags);

    if complex.iter().any(|c| c.kind == ComplexKind::Csv) && def.csv_fields.is_empty() {
        warn!(pattern = %def.name, "csv field declared without csv-fields, columns will be dropped");
    }

    let conditions = compile_conditions(&def.name, &def.cond)?;
    let soft_conditions = compile_conditions(&def.name, &def.softcond)?;

    let transforms = def
        .replace
        .iter()
        .map(|rule| {
            Regex::new(&rule.regex)
                .map(|regex| Transform {
                    field: rule.field.clone(),
                    regex,
                    replacement: normalize_replacement(&rule.replacement),
                })
                .map_err(|e| ClassifierError::Definition {
                    name: def.name.clone(),
                    reason: format!("invalid replace regex for field '{}': {e}", rule.field),
                })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let source_time = match (&def.srctime_field, &def.srctime_format) {
        (Some(field), Some(format)) => match SourceTimeFormat::new(format) {
            Ok(format) => Some(SourceTime {
                field: field.clone(),
                format,
            }),
            Err(reason) => {
                warn!(pattern = %def.name, %reason, "invalid srctime-format, source time disabled");
                None
            }
        },
        _ => None,
    };

    let mut parent_names: Vec<String> = Vec::with_capacity(def.parents.len());
    for parent in &def.parents {
        if !parent_names.contains(parent) {
            parent_names.push(parent.clone());
        }
    }

    Ok(CompiledNode {
        name: def.name.clone(),
        parent_names,
        parents: Vec::new(),
        children: Vec::new(),
        order: def.order,
        decl_index,
        patterns,
        optional_patterns,
        fields,
        inherited_fields: BTreeMap::new(),
        conditions,
        soft_conditions,
        match_field: def
            .match_field
            .clone()
            .unwrap_or_else(|| DATA_FIELD.to_owned()),
        complex,
        csv_fields: def.csv_fields.clone(),
        transforms,
        source_time,
        ancestors: BTreeSet::new(),
        extensions: def.extensions.clone(),
    })
}

fn compile_templates(
    sources: &[String],
    library: &FragmentLibrary,
) -> Result<Vec<Template>, ClassifierError> {
    sources
        .iter()
        .map(|source| Template::compile(source, library))
        .collect()
}

fn compile_conditions(
    pattern: &str,
    conditions: &BTreeMap<String, String>,
) -> Result<Vec<Condition>, ClassifierError> {
    conditions
        .iter()
        .map(|(field, regex)| {
            Condition::new(field, regex).map_err(|e| ClassifierError::Definition {
                name: pattern.to_owned(),
                reason: format!("invalid condition regex for field '{field}': {e}"),
            })
        })
        .collect()
}

/// 템플릿 추론, csv-fields, 명시 선언을 합쳐 필드별 타입 태그를 만듭니다.
///
/// 우선순위: 명시적 `fields` > 복합 필드 키 > 추론.
fn field_tags(
    def: &RawPatternDefinition,
    patterns: &[Template],
    optional_patterns: &[Template],
) -> BTreeMap<String, TypeTag> {
    let mut tags: BTreeMap<String, TypeTag> = BTreeMap::new();

    for template in patterns.iter().chain(optional_patterns) {
        for (field, tag) in template.fields() {
            tags.entry(field.to_owned()).or_insert(tag);
        }
    }

    for name in &def.csv_fields {
        tags.entry(name.replace('-', "_"))
            .or_insert(TypeTag::Field(FieldType::String));
    }

    if let Some(spec) = &def.fields {
        for (field, ty) in spec.entries() {
            let tag = TypeTag::parse(&ty).unwrap_or_else(|| {
                warn!(pattern = %def.name, field = %field, ty = %ty, "unknown field type, using string");
                TypeTag::Field(FieldType::String)
            });
            tags.insert(field, tag);
        }
    }

    // 명시적 json / csv / urlargs 키는 `fields` 선언보다 우선합니다.
    let markers = [
        (ComplexKind::Json, &def.json, &def.json_nested),
        (ComplexKind::Csv, &def.csv, &def.csv_nested),
        (ComplexKind::UrlArgs, &def.urlargs, &def.urlargs_nested),
    ];
    for (kind, field, marker) in markers {
        let nested = matches!(marker, Some(NestedMarker::Flag(true)));
        if let Some(field) = field {
            tags.insert(field.clone(), TypeTag::Complex { kind, nested });
        }
        if let Some(NestedMarker::Field(field)) = marker {
            tags.insert(field.clone(), TypeTag::Complex { kind, nested: true });
        }
    }

    tags
}

/// 복합 필드 마커를 분리합니다. 마커가 붙은 필드 자체는 `string`이 됩니다.
fn split_complex(
    pattern: &str,
    tags: BTreeMap<String, TypeTag>,
) -> (BTreeMap<String, FieldType>, Vec<ComplexField>) {
    let mut fields = BTreeMap::new();
    let mut complex: Vec<ComplexField> = Vec::new();

    for (name, tag) in tags {
        match tag {
            TypeTag::Field(ty) => {
                fields.insert(name, ty);
            }
            TypeTag::Complex { kind, nested } => {
                match complex.iter().find(|c| c.kind == kind) {
                    Some(existing) => warn!(
                        pattern,
                        kind = kind.as_str(),
                        field = %name,
                        kept = %existing.field,
                        "only one field per complex kind is supported, ignoring marker"
                    ),
                    None => complex.push(ComplexField {
                        kind,
                        field: name.clone(),
                        nested,
                    }),
                }
                fields.insert(name, FieldType::String);
            }
        }
    }

    // 디코딩 순서: json, csv, urlargs
    complex.sort_by_key(|c| c.kind as u8);
    (fields, complex)
}

fn normalize_parents(nodes: &mut [CompiledNode]) {
    for node in nodes.iter_mut() {
        if node.name == BASE_EVENT_TYPE {
            if !node.parent_names.is_empty() {
                warn!(
                    pattern = BASE_EVENT_TYPE,
                    parents = ?node.parent_names,
                    "base pattern cannot have parents, ignoring them"
                );
                node.parent_names.clear();
            }
        } else if node.parent_names.is_empty() {
            node.parent_names.push(BASE_EVENT_TYPE.to_owned());
        }
    }
}

/// 노드를 아레나로 연결하고 파생 메타데이터를 계산합니다.
fn link(mut nodes: Vec<CompiledNode>) -> CompiledTree {
    let index: HashMap<String, NodeId> = nodes
        .iter()
        .enumerate()
        .map(|(i, node)| (node.name.clone(), NodeId(i)))
        .collect();

    for node in nodes.iter_mut() {
        node.children.clear();
        node.parents.clear();
        for parent in &node.parent_names {
            match index.get(parent) {
                Some(&id) => node.parents.push(id),
                None => warn!(
                    pattern = %node.name,
                    parent = %parent,
                    "unknown parent pattern, ignoring edge"
                ),
            }
        }
    }

    // 가까운 조상부터의 BFS 순서 (순환이면 자기 자신에 도달)
    let reach: Vec<(Vec<NodeId>, bool)> = (0..nodes.len())
        .map(|i| ancestors_bfs(&nodes, NodeId(i)))
        .collect();

    for (i, (order, cyclic)) in reach.iter().enumerate() {
        let (ancestors, inherited) = if *cyclic {
            warn!(pattern = %nodes[i].name, "cyclic parent reference, node has no effective ancestors");
            (BTreeSet::new(), BTreeMap::new())
        } else {
            let ancestors = order.iter().map(|id| nodes[id.0].name.clone()).collect();
            let mut inherited = BTreeMap::new();
            for id in order {
                for (field, ty) in &nodes[id.0].fields {
                    inherited.entry(field.clone()).or_insert(*ty);
                }
            }
            (ancestors, inherited)
        };
        nodes[i].ancestors = ancestors;
        nodes[i].inherited_fields = inherited;
    }

    // 순환 위의 간선은 자식 목록에 넣지 않아 매칭 재귀가 항상 끝나도록 합니다.
    let mut edges: Vec<(NodeId, NodeId)> = Vec::new();
    for (i, node) in nodes.iter().enumerate() {
        let child = NodeId(i);
        for &parent in &node.parents {
            let closes_cycle = parent == child || reach[parent.0].0.contains(&child);
            if !closes_cycle {
                edges.push((parent, child));
            }
        }
    }
    for (parent, child) in edges {
        nodes[parent.0].children.push(child);
    }

    let keys: Vec<(bool, i64, usize)> = nodes.iter().map(CompiledNode::sort_key).collect();
    for node in nodes.iter_mut() {
        node.children.sort_by_key(|id| keys[id.0]);
    }

    let mut roots: Vec<NodeId> = nodes
        .iter()
        .enumerate()
        .filter(|(_, node)| node.parent_names.is_empty())
        .map(|(i, _)| NodeId(i))
        .collect();
    roots.sort_by_key(|id| keys[id.0]);

    CompiledTree {
        nodes,
        roots,
        index,
    }
}

fn ancestors_bfs(nodes: &[CompiledNode], start: NodeId) -> (Vec<NodeId>, bool) {
    let mut order = Vec::new();
    let mut visited: HashSet<NodeId> = HashSet::new();
    let mut queue: VecDeque<NodeId> = nodes[start.0].parents.iter().copied().collect();
    let mut cyclic = false;

    while let Some(id) = queue.pop_front() {
        if id == start {
            cyclic = true;
            continue;
        }
        if !visited.insert(id) {
            continue;
        }
        order.push(id);
        queue.extend(nodes[id.0].parents.iter().copied());
    }

    (order, cyclic)
}
