use fs2::FileExt;
use fray_core::MachineIdentity;
use fray_types::{LogRecord, Stream, now_ts};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::reader::{RawRecord, ReadReport, read_runtime_records, read_stream_file};

/// Shared-directory layout generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreLayout {
    /// Single machine: `shared/<stream>.jsonl`.
    V1,
    /// Multi-machine: `shared/machines/<id>/<stream>.jsonl` + `.v2` sentinel.
    V2,
}

/// Append-only JSONL store for one channel. Appends go to this machine's
/// shard (v2) or the flat shared files (v1); reads merge every shard.
pub struct LogStore {
    shared_dir: PathBuf,
    local_dir: PathBuf,
    layout: StoreLayout,
    machine_id: String,
    /// Files appended to since the last `sync_batch`.
    dirty: Vec<PathBuf>,
}

impl LogStore {
    pub fn open(shared_dir: PathBuf, local_dir: PathBuf) -> Result<LogStore> {
        std::fs::create_dir_all(&shared_dir)?;
        let layout = if shared_dir.join(".v2").exists() {
            StoreLayout::V2
        } else {
            StoreLayout::V1
        };

        let machine_id = match layout {
            StoreLayout::V2 => MachineIdentity::load_or_create(&local_dir, now_ts())?.id,
            StoreLayout::V1 => String::new(),
        };

        Ok(LogStore {
            shared_dir,
            local_dir,
            layout,
            machine_id,
            dirty: Vec::new(),
        })
    }

    pub fn layout(&self) -> StoreLayout {
        self.layout
    }

    pub fn machine_id(&self) -> &str {
        &self.machine_id
    }

    pub fn shared_dir(&self) -> &Path {
        &self.shared_dir
    }

    pub fn local_dir(&self) -> &Path {
        &self.local_dir
    }

    /// Directory this machine appends shared streams into.
    pub fn write_dir(&self) -> PathBuf {
        match self.layout {
            StoreLayout::V1 => self.shared_dir.clone(),
            StoreLayout::V2 => self
                .shared_dir
                .join("machines")
                .join(&self.machine_id),
        }
    }

    fn runtime_path(&self) -> PathBuf {
        self.local_dir.join("runtime.jsonl")
    }

    /// Stamp and append a record to its shared stream. The stamp's `ts` is
    /// filled if zero; `origin` and `seq` are always assigned here.
    pub fn append(&mut self, record: LogRecord) -> Result<LogRecord> {
        let record = self.prepare(record)?;
        self.append_prepared(&record)?;
        Ok(record)
    }

    /// Append a machine-private record to `local/runtime.jsonl`.
    pub fn append_runtime(&mut self, record: LogRecord) -> Result<LogRecord> {
        let record = self.prepare(record)?;
        self.append_runtime_prepared(&record)?;
        Ok(record)
    }

    /// Assign (ts, origin, seq) without writing. Callers that mirror records
    /// into the cache before the log append use this to stamp first.
    pub fn prepare(&mut self, mut record: LogRecord) -> Result<LogRecord> {
        self.stamp(&mut record)?;
        Ok(record)
    }

    /// Write a previously prepared record to its shared stream.
    pub fn append_prepared(&mut self, record: &LogRecord) -> Result<()> {
        let stream = record
            .stream()
            .ok_or_else(|| Error::Invalid("record is machine-private, use append_runtime".into()))?;
        let path = self.write_dir().join(format!("{}.jsonl", stream.basename()));
        self.append_line(&path, record)
    }

    /// Write a previously prepared record to `local/runtime.jsonl`.
    pub fn append_runtime_prepared(&mut self, record: &LogRecord) -> Result<()> {
        let path = self.runtime_path();
        self.append_line(&path, record)
    }

    fn stamp(&mut self, record: &mut LogRecord) -> Result<()> {
        if !MachineIdentity::exists(&self.local_dir) {
            MachineIdentity::load_or_create(&self.local_dir, now_ts())?;
        }
        let seq = MachineIdentity::reserve_seq(&self.local_dir, 1)?;

        let stamp = record.stamp_mut();
        if stamp.ts == 0 {
            stamp.ts = now_ts();
        }
        stamp.origin = self.machine_id.clone();
        stamp.seq = seq;
        Ok(())
    }

    /// Serialize one record and append it under an exclusive file lock.
    /// Readers tolerate a torn final line, so flush-without-fsync is enough
    /// here; durability is settled by `sync_batch` at command end.
    fn append_line(&mut self, path: &Path, record: &LogRecord) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let line = serde_json::to_string(record)?;
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        file.lock_exclusive()?;
        let write_result = file
            .write_all(line.as_bytes())
            .and_then(|_| file.write_all(b"\n"))
            .and_then(|_| file.flush());
        FileExt::unlock(&file)?;
        write_result?;

        if !self.dirty.contains(&path.to_path_buf()) {
            self.dirty.push(path.to_path_buf());
        }
        Ok(())
    }

    /// fsync every file appended to since the last batch. Called once per
    /// logical command.
    pub fn sync_batch(&mut self) -> Result<()> {
        for path in self.dirty.drain(..) {
            if let Ok(file) = File::open(&path) {
                file.sync_all()?;
            }
        }
        Ok(())
    }

    /// Directories that may contain stream files, local machine first.
    pub fn shard_dirs(&self) -> Vec<PathBuf> {
        match self.layout {
            StoreLayout::V1 => vec![self.shared_dir.clone()],
            StoreLayout::V2 => {
                let machines = self.shared_dir.join("machines");
                let mut dirs = vec![];
                if machines.is_dir() {
                    let mut entries: Vec<PathBuf> = walkdir::WalkDir::new(&machines)
                        .min_depth(1)
                        .max_depth(1)
                        .into_iter()
                        .filter_map(|e| e.ok())
                        .filter(|e| e.file_type().is_dir())
                        .map(|e| e.into_path())
                        .collect();
                    entries.sort();
                    dirs.extend(entries);
                }
                dirs
            }
        }
    }

    /// Read every record of one stream across all shards.
    pub fn read_stream(&self, stream: Stream) -> Result<(Vec<RawRecord>, ReadReport)> {
        let mut records = Vec::new();
        let mut report = ReadReport::default();
        for dir in self.shard_dirs() {
            let path = dir.join(format!("{}.jsonl", stream.basename()));
            if !path.exists() {
                continue;
            }
            read_stream_file(&path, stream, &mut records, &mut report)?;
        }
        Ok((records, report))
    }

    /// Read every shared stream plus the machine-private runtime log.
    pub fn read_all(&self) -> Result<(Vec<RawRecord>, ReadReport)> {
        let mut records = Vec::new();
        let mut report = ReadReport::default();

        for stream in Stream::ALL {
            for dir in self.shard_dirs() {
                let path = dir.join(format!("{}.jsonl", stream.basename()));
                if !path.exists() {
                    continue;
                }
                read_stream_file(&path, *stream, &mut records, &mut report)?;
            }
        }

        let runtime = self.runtime_path();
        if runtime.exists() {
            read_runtime_records(&runtime, &mut records, &mut report)?;
        }

        Ok((records, report))
    }

    /// Latest modification time across all log files, for cache-staleness
    /// checks at startup.
    pub fn latest_mtime(&self) -> Result<Option<std::time::SystemTime>> {
        let mut latest: Option<std::time::SystemTime> = None;
        let mut candidates = self.shard_dirs();
        candidates.push(self.local_dir.clone());

        for dir in candidates {
            if !dir.is_dir() {
                continue;
            }
            for entry in walkdir::WalkDir::new(&dir).max_depth(1) {
                let entry = match entry {
                    Ok(e) => e,
                    Err(_) => continue,
                };
                if entry.path().extension().and_then(|e| e.to_str()) != Some("jsonl") {
                    continue;
                }
                if let Ok(meta) = entry.metadata()
                    && let Ok(modified) = meta.modified()
                {
                    latest = Some(match latest {
                        Some(prev) if prev >= modified => prev,
                        _ => modified,
                    });
                }
            }
        }
        Ok(latest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fray_types::{MessageKind, MessageRecord, Stamp};
    use tempfile::TempDir;

    fn message(id: &str, body: &str) -> LogRecord {
        LogRecord::Message(MessageRecord {
            id: id.to_string(),
            from_agent: "alice".to_string(),
            body: body.to_string(),
            mentions: vec![],
            kind: MessageKind::Agent,
            home: "room".to_string(),
            reply_to: None,
            quote: None,
            references: None,
            surface_source: None,
            stamp: Stamp::default(),
        })
    }

    fn open_store(temp: &TempDir) -> LogStore {
        let fray = temp.path().join(".fray");
        LogStore::open(fray.join("shared"), fray.join("local")).unwrap()
    }

    #[test]
    fn test_append_and_read_back() {
        let temp = TempDir::new().unwrap();
        let mut store = open_store(&temp);

        store.append(message("msg-1", "one")).unwrap();
        store.append(message("msg-2", "two")).unwrap();
        store.sync_batch().unwrap();

        let (records, report) = store.read_stream(Stream::Messages).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(report.skipped_lines, 0);

        match &records[0].record {
            LogRecord::Message(m) => assert_eq!(m.body, "one"),
            other => panic!("unexpected record: {:?}", other),
        }
    }

    #[test]
    fn test_seq_advances_across_appends() {
        let temp = TempDir::new().unwrap();
        let mut store = open_store(&temp);

        let first = store.append(message("msg-1", "a")).unwrap();
        let second = store.append(message("msg-2", "b")).unwrap();
        assert!(second.stamp().seq > first.stamp().seq);
    }

    #[test]
    fn test_partial_final_line_is_discarded() {
        let temp = TempDir::new().unwrap();
        let mut store = open_store(&temp);
        store.append(message("msg-1", "whole")).unwrap();

        // Simulate a torn concurrent append: no trailing newline
        let path = store.write_dir().join("messages.jsonl");
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(br#"{"type":"message","id":"msg-2","#).unwrap();

        let (records, report) = store.read_stream(Stream::Messages).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(report.partial_tail, 1);
    }

    #[test]
    fn test_bad_lines_are_counted_not_fatal() {
        let temp = TempDir::new().unwrap();
        let mut store = open_store(&temp);
        store.append(message("msg-1", "good")).unwrap();

        let path = store.write_dir().join("messages.jsonl");
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(b"this is not json\n").unwrap();

        let (records, report) = store.read_stream(Stream::Messages).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(report.skipped_lines, 1);
    }

    #[test]
    fn test_v1_layout_writes_flat_files() {
        let temp = TempDir::new().unwrap();
        let mut store = open_store(&temp);
        assert_eq!(store.layout(), StoreLayout::V1);

        store.append(message("msg-1", "x")).unwrap();
        assert!(temp.path().join(".fray/shared/messages.jsonl").exists());
    }

    #[test]
    fn test_v2_layout_writes_machine_shard() {
        let temp = TempDir::new().unwrap();
        let fray = temp.path().join(".fray");
        std::fs::create_dir_all(fray.join("shared")).unwrap();
        std::fs::write(fray.join("shared/.v2"), "").unwrap();

        let mut store = LogStore::open(fray.join("shared"), fray.join("local")).unwrap();
        assert_eq!(store.layout(), StoreLayout::V2);
        assert!(store.machine_id().starts_with("mch-"));

        let record = store.append(message("msg-1", "x")).unwrap();
        assert_eq!(record.stamp().origin, store.machine_id());

        let shard = fray
            .join("shared/machines")
            .join(store.machine_id())
            .join("messages.jsonl");
        assert!(shard.exists());
    }

    #[test]
    fn test_read_all_merges_machine_shards() {
        let temp = TempDir::new().unwrap();
        let fray = temp.path().join(".fray");
        std::fs::create_dir_all(fray.join("shared")).unwrap();
        std::fs::write(fray.join("shared/.v2"), "").unwrap();

        // A remote machine's shard, written out-of-band
        let remote = fray.join("shared/machines/mch-remote99");
        std::fs::create_dir_all(&remote).unwrap();
        std::fs::write(
            remote.join("messages.jsonl"),
            r#"{"type":"message","id":"msg-r","from_agent":"bob","body":"from afar","kind":"agent","home":"room","ts":50,"origin":"mch-remote99","seq":1}"#
                .to_string()
                + "\n",
        )
        .unwrap();

        let mut store = LogStore::open(fray.join("shared"), fray.join("local")).unwrap();
        store.append(message("msg-l", "local")).unwrap();

        let (records, _) = store.read_all().unwrap();
        let bodies: Vec<String> = records
            .iter()
            .filter_map(|r| match &r.record {
                LogRecord::Message(m) => Some(m.body.clone()),
                _ => None,
            })
            .collect();
        assert!(bodies.contains(&"from afar".to_string()));
        assert!(bodies.contains(&"local".to_string()));
    }
}
