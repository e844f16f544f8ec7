use fray_types::{LogRecord, Stream};
use std::io::Read;
use std::path::Path;

use crate::error::Result;

/// One parsed log record plus where it came from.
#[derive(Debug, Clone)]
pub struct RawRecord {
    /// Shared stream, or `None` for `local/runtime.jsonl` records.
    pub stream: Option<Stream>,
    pub record: LogRecord,
}

impl RawRecord {
    /// Canonical ordering key: (ts, origin, seq).
    pub fn sort_key(&self) -> (i64, String, u64) {
        let stamp = self.record.stamp();
        (stamp.ts, stamp.origin.clone(), stamp.seq)
    }
}

/// Per-read diagnostics, surfaced by `doctor`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReadReport {
    /// Lines that failed to parse as a known record.
    pub skipped_lines: usize,
    /// Trailing partial lines (no newline yet) discarded.
    pub partial_tail: usize,
}

impl ReadReport {
    pub fn merge(&mut self, other: ReadReport) {
        self.skipped_lines += other.skipped_lines;
        self.partial_tail += other.partial_tail;
    }
}

/// Read one stream file, appending parsed records. Lines are only trusted up
/// to the last newline: a concurrent appender may have left a torn tail,
/// which is discarded and counted rather than treated as corruption.
pub fn read_stream_file(
    path: &Path,
    stream: Stream,
    out: &mut Vec<RawRecord>,
    report: &mut ReadReport,
) -> Result<()> {
    read_file(path, Some(stream), out, report)
}

/// Read the machine-private runtime log.
pub fn read_runtime_records(
    path: &Path,
    out: &mut Vec<RawRecord>,
    report: &mut ReadReport,
) -> Result<()> {
    read_file(path, None, out, report)
}

fn read_file(
    path: &Path,
    stream: Option<Stream>,
    out: &mut Vec<RawRecord>,
    report: &mut ReadReport,
) -> Result<()> {
    let mut file = std::fs::File::open(path)?;
    let mut content = String::new();
    file.read_to_string(&mut content)?;

    let complete = match content.rfind('\n') {
        Some(last_newline) => {
            if last_newline + 1 < content.len() {
                report.partial_tail += 1;
            }
            &content[..last_newline]
        }
        None => {
            if !content.is_empty() {
                report.partial_tail += 1;
            }
            ""
        }
    };

    for line in complete.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<LogRecord>(line) {
            Ok(record) => out.push(RawRecord { stream, record }),
            Err(_) => report.skipped_lines += 1,
        }
    }

    Ok(())
}
