//! 출력 싱크 -- 분류된 레코드의 하위 소비자
//!
//! 싱크 타입 태그(`stdout`, `file`, `noop`)는 [`SINK_REGISTRY`] 정적 테이블에서
//! 생성자로 매핑됩니다. 새 싱크를 추가하려면 [`EventSink`]를 구현하고 테이블에
//! 한 줄을 추가합니다.

use std::fs::File;
use std::io::{BufWriter, Stdout, Write};
use std::path::PathBuf;

use logtree_core::error::{LogtreeError, SinkError};
use logtree_core::metrics as m;
use logtree_core::pipeline::EventSink;
use logtree_core::types::Record;
use tracing::debug;

/// 싱크 생성에 필요한 설정
#[derive(Debug, Clone, Default)]
pub struct SinkSpec {
    /// file 싱크 대상 경로
    pub path: Option<PathBuf>,
}

type SinkFactory = fn(&SinkSpec) -> Result<Box<dyn EventSink>, LogtreeError>;

/// 싱크 타입 태그 -> 생성자
pub static SINK_REGISTRY: &[(&str, SinkFactory)] = &[
    ("stdout", stdout_sink),
    ("file", file_sink),
    ("noop", noop_sink),
];

fn stdout_sink(_: &SinkSpec) -> Result<Box<dyn EventSink>, LogtreeError> {
    Ok(Box::new(JsonLinesSink::stdout()))
}

fn file_sink(spec: &SinkSpec) -> Result<Box<dyn EventSink>, LogtreeError> {
    Ok(Box::new(JsonLinesSink::file(spec)?))
}

fn noop_sink(_: &SinkSpec) -> Result<Box<dyn EventSink>, LogtreeError> {
    Ok(Box::new(NoopSink::default()))
}

/// 등록된 싱크 타입 이름
pub fn registered_sinks() -> impl Iterator<Item = &'static str> {
    SINK_REGISTRY.iter().map(|(name, _)| *name)
}

/// 타입 태그로 싱크를 생성합니다.
pub fn create_sink(kind: &str, spec: &SinkSpec) -> Result<Box<dyn EventSink>, LogtreeError> {
    let (_, factory) = SINK_REGISTRY
        .iter()
        .find(|(name, _)| *name == kind)
        .ok_or_else(|| SinkError::Unknown(kind.to_owned()))?;
    debug!(sink = kind, "creating sink");
    factory(spec)
}

/// 레코드를 한 줄에 JSON 객체 하나씩 쓰는 싱크
pub struct JsonLinesSink<W: Write + Send> {
    name: &'static str,
    writer: BufWriter<W>,
}

impl JsonLinesSink<Stdout> {
    pub fn stdout() -> Self {
        Self::new("stdout", std::io::stdout())
    }
}

impl JsonLinesSink<File> {
    /// 대상 파일을 새로 만듭니다 (기존 내용은 지웁니다).
    pub fn file(spec: &SinkSpec) -> Result<Self, LogtreeError> {
        let path = spec
            .path
            .as_ref()
            .filter(|p| !p.as_os_str().is_empty())
            .ok_or_else(|| SinkError::Write {
                sink: "file".to_owned(),
                reason: "no target path configured".to_owned(),
            })?;
        let file = File::create(path).map_err(|e| SinkError::Write {
            sink: "file".to_owned(),
            reason: format!("failed to create {}: {e}", path.display()),
        })?;
        Ok(Self::new("file", file))
    }
}

impl<W: Write + Send> JsonLinesSink<W> {
    pub fn new(name: &'static str, writer: W) -> Self {
        Self {
            name,
            writer: BufWriter::new(writer),
        }
    }

    /// 버퍼를 비우고 내부 writer를 돌려줍니다.
    pub fn into_inner(self) -> Result<W, LogtreeError> {
        let name = self.name;
        self.writer
            .into_inner()
            .map_err(|e| write_error(name, e.error()))
    }

    fn write_record(&mut self, record: &Record) -> Result<(), LogtreeError> {
        serde_json::to_writer(&mut self.writer, record).map_err(|e| SinkError::Write {
            sink: self.name.to_owned(),
            reason: e.to_string(),
        })?;
        self.writer
            .write_all(b"\n")
            .map_err(|e| write_error(self.name, &e))
    }
}

impl<W: Write + Send> EventSink for JsonLinesSink<W> {
    fn name(&self) -> &str {
        self.name
    }

    fn send(&mut self, _event_type: &str, record: &Record) -> Result<(), LogtreeError> {
        let result = self.write_record(record);
        record_outcome(self.name, result.is_ok());
        result
    }

    fn flush(&mut self) -> Result<(), LogtreeError> {
        self.writer.flush().map_err(|e| write_error(self.name, &e))
    }
}

/// 레코드를 버리고 개수만 세는 싱크
#[derive(Debug, Default)]
pub struct NoopSink {
    received: u64,
}

impl NoopSink {
    pub fn received(&self) -> u64 {
        self.received
    }
}

impl EventSink for NoopSink {
    fn name(&self) -> &str {
        "noop"
    }

    fn send(&mut self, _event_type: &str, _record: &Record) -> Result<(), LogtreeError> {
        self.received += 1;
        record_outcome("noop", true);
        Ok(())
    }
}

fn record_outcome(sink: &'static str, ok: bool) {
    let name = if ok {
        m::SINK_RECORDS_SENT_TOTAL
    } else {
        m::SINK_ERRORS_TOTAL
    };
    metrics::counter!(name, m::LABEL_SINK => sink).increment(1);
}

fn write_error(sink: &str, e: &std::io::Error) -> LogtreeError {
    SinkError::Write {
        sink: sink.to_owned(),
        reason: e.to_string(),
    }
    .into()
}
