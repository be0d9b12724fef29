#![doc = include_str!("../README.md")]
//!
//! # 모듈 구성
//!
//! - [`definition`]: 원시 패턴 정의와 필드 타입
//! - [`fragment`]: 재사용 정규식 조각 라이브러리와 플레이스홀더 확장
//! - [`template`]: 컴파일된 매칭 템플릿
//! - [`loader`]: YAML 패턴 파일 / grok fragment 파일 로더
//! - [`sources`]: 컴파일 입력 모음과 로드 컨텍스트
//! - [`compiler`]: 불변 패턴 트리 컴파일러
//! - [`matcher`]: 재귀 분류 워크
//! - [`postprocess`]: 숫자 변환, 복합 필드 확장, 치환, 보조 타임스탬프
//! - [`timefmt`]: srctime 형식 변환
//! - [`stats`]: 패턴별 진단 카운터
//! - [`classifier`]: 핫 리로드 가능한 분류기 핸들
//!
//! # 사용 예시
//!
//! ```
//! use logtree_classifier::{CompileOptions, PatternSources, RawPatternDefinition, compile};
//!
//! let sources = PatternSources::new().with_definition(
//!     RawPatternDefinition::new("custom_int").with_pattern("%{INT:customvalue}"),
//! );
//! let tree = compile(&sources, &CompileOptions::default()).unwrap();
//!
//! let record = tree.classify("4");
//! assert_eq!(record.event_type(), Some("custom_int"));
//! assert_eq!(record.get("customvalue"), Some(&serde_json::json!(4)));
//! ```

pub mod classifier;
pub mod compiler;
pub mod definition;
pub mod error;
pub mod fragment;
pub mod loader;
pub mod matcher;
pub mod postprocess;
pub mod sources;
pub mod stats;
pub mod template;
pub mod timefmt;

pub use classifier::{ActiveTree, Classifier, compile_options};
pub use compiler::{CompileOptions, CompiledNode, CompiledTree, NodeId, PatternCompiler, compile};
pub use definition::{ComplexKind, FieldType, RawPatternDefinition, TypeTag};
pub use error::ClassifierError;
pub use fragment::FragmentLibrary;
pub use loader::{PatternFile, PatternLoader};
pub use sources::{LoadContext, PatternSources};
pub use stats::{PatternCounts, PatternStats, StatKind, StatsSnapshot};
