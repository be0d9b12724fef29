//! `logtree classify` command handler

use std::collections::BTreeMap;
use std::io::Write;
use std::path::PathBuf;

use serde::Serialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::info;

use logtree_classifier::{Classifier, StatsSnapshot};
use logtree_core::pipeline::EventSink;
use logtree_core::types::BASE_EVENT_TYPE;

use crate::cli::ClassifyArgs;
use crate::commands::{LoadedConfig, build_classifier};
use crate::error::CliError;
use crate::output::{OutputWriter, Render};
use crate::sinks::{SinkSpec, create_sink};

/// Execute the `classify` command.
///
/// Records go to the sink; the optional stats report goes to stderr so it
/// never mixes with records on stdout.
pub async fn execute(
    args: ClassifyArgs,
    loaded: LoadedConfig,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    let classifier = build_classifier(&loaded, &args.patterns, args.stats).await?;

    let sink_kind = args
        .sink
        .clone()
        .unwrap_or_else(|| loaded.config.output.sink.clone());
    let spec = SinkSpec {
        path: args.sink_path.clone().or_else(|| {
            let configured = &loaded.config.output.path;
            (!configured.is_empty()).then(|| PathBuf::from(configured))
        }),
    };
    let mut sink = create_sink(&sink_kind, &spec)?;

    let mut summary = match &args.input {
        Some(path) => {
            info!(input = %path.display(), sink = %sink_kind, "classifying file");
            let file = tokio::fs::File::open(path).await?;
            classify_stream(&classifier, BufReader::new(file), sink.as_mut()).await?
        }
        None => {
            info!(sink = %sink_kind, "classifying stdin");
            classify_stream(
                &classifier,
                BufReader::new(tokio::io::stdin()),
                sink.as_mut(),
            )
            .await?
        }
    };
    sink.flush()?;

    info!(lines = summary.lines, types = summary.by_type.len(), "classification finished");

    if args.stats {
        summary.stats = classifier.stats();
        let stderr = std::io::stderr();
        writer.render_to(&summary, &mut stderr.lock())?;
    }

    Ok(())
}

/// Classify every line of `reader` and send each record to `sink`.
///
/// A trailing `\r` is stripped so CRLF input classifies like LF input.
/// Invalid UTF-8 is replaced with U+FFFD instead of aborting the run.
pub async fn classify_stream<R>(
    classifier: &Classifier,
    mut reader: R,
    sink: &mut dyn EventSink,
) -> Result<ClassifySummary, CliError>
where
    R: AsyncBufRead + Unpin,
{
    let mut summary = ClassifySummary::default();
    let mut buf = Vec::new();

    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf).await? == 0 {
            break;
        }
        let bytes = buf.strip_suffix(b"\n").unwrap_or(&buf[..]);
        let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
        let line = String::from_utf8_lossy(bytes);
        let record = classifier.classify(&line);
        let event_type = record.event_type().unwrap_or(BASE_EVENT_TYPE).to_owned();

        sink.send(&event_type, &record)?;

        summary.lines += 1;
        *summary.by_type.entry(event_type).or_default() += 1;
    }

    Ok(summary)
}

/// Per-run classification summary.
#[derive(Debug, Default, Serialize)]
pub struct ClassifySummary {
    /// Lines read
    pub lines: u64,
    /// Records per event type
    pub by_type: BTreeMap<String, u64>,
    /// Per-pattern counters (only with `--stats`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<StatsSnapshot>,
}

impl Render for ClassifySummary {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(w, "{} {} lines", "Classified".bold(), self.lines)?;
        for (event_type, count) in &self.by_type {
            writeln!(w, "  {:<32} {:>10}", event_type, count)?;
        }

        if let Some(stats) = &self.stats {
            writeln!(w)?;
            writeln!(
                w,
                "{:<32} {:>10} {:>10} {:>10} {:>10}",
                "PATTERN".bold(),
                "MATCHCOUNT".bold(),
                "MATCHES".bold(),
                "NONMATCHES".bold(),
                "DESERCOUNT".bold()
            )?;
            for (name, counts) in stats.non_zero() {
                writeln!(
                    w,
                    "{:<32} {:>10} {:>10} {:>10} {:>10}",
                    name, counts.matchcount, counts.matches, counts.nonmatches, counts.desercount
                )?;
            }
        }

        Ok(())
    }
}
