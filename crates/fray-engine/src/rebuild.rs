use fray_index::{Database, queries};
use fray_store::LogStore;
use std::collections::HashMap;

use crate::apply::{self, ApplyOutcome};
use crate::error::Result;

#[derive(Debug, Clone)]
pub enum RebuildProgress {
    Scanning,
    Applying { total: usize },
    Collision { guid: String, origin: String },
    Completed {
        applied: usize,
        collisions: usize,
        skipped_lines: usize,
    },
}

/// Folds every log record, across machine shards and the runtime log, into
/// a fresh cache in canonical (ts, origin, seq) order. Non-replicable local
/// state (`read_to`, `config`) is carried across; ghost cursors are
/// rederived from the runtime records themselves.
pub struct RebuildService<'a> {
    store: &'a LogStore,
    db: &'a mut Database,
}

impl<'a> RebuildService<'a> {
    pub fn new(store: &'a LogStore, db: &'a mut Database) -> Self {
        Self { store, db }
    }

    pub fn run<F>(self, mut on_progress: F) -> Result<()>
    where
        F: FnMut(RebuildProgress),
    {
        on_progress(RebuildProgress::Scanning);
        let (mut records, report) = self.store.read_all()?;
        records.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
        on_progress(RebuildProgress::Applying {
            total: records.len(),
        });

        let local_state = self.db.snapshot_local_state()?;
        self.db.reset_derived()?;

        let mut first_creates: HashMap<String, serde_json::Value> = HashMap::new();
        let mut applied = 0;
        let mut collisions = 0;

        let tx = self.db.conn_mut().transaction()?;
        for raw in &records {
            let outcome = apply::apply_record(&tx, &raw.record)?;
            match outcome {
                ApplyOutcome::Applied => {
                    applied += 1;
                    if let Some(guid) = apply::create_guid(&raw.record) {
                        first_creates.insert(guid.to_string(), payload_of(&raw.record)?);
                    }
                }
                ApplyOutcome::DuplicateCreate => {
                    let guid = apply::create_guid(&raw.record).unwrap_or_default().to_string();
                    let payload = payload_of(&raw.record)?;
                    let same_payload = first_creates
                        .get(&guid)
                        .map(|first| *first == payload)
                        .unwrap_or(false);

                    // A byte-equal replay (idempotent re-pull) is not a
                    // collision; a diverging payload is
                    if !same_payload {
                        let stamp = raw.record.stamp();
                        queries::collisions::record(
                            &tx,
                            &queries::collisions::CollisionEntry {
                                guid: guid.clone(),
                                origin: stamp.origin.clone(),
                                ts: stamp.ts,
                                preview: apply::collision_preview(&raw.record),
                            },
                        )?;
                        collisions += 1;
                        on_progress(RebuildProgress::Collision {
                            guid,
                            origin: stamp.origin.clone(),
                        });
                    }
                }
            }
        }
        tx.commit()?;

        self.db.restore_local_state(&local_state)?;

        on_progress(RebuildProgress::Completed {
            applied,
            collisions,
            skipped_lines: report.skipped_lines,
        });
        Ok(())
    }
}

/// Record payload with the stamp fields removed, for collision comparison.
fn payload_of(record: &fray_types::LogRecord) -> Result<serde_json::Value> {
    let mut value = serde_json::to_value(record)
        .map_err(|e| crate::error::Error::InvalidInput(format!("unserializable record: {}", e)))?;
    if let Some(object) = value.as_object_mut() {
        object.remove("ts");
        object.remove("origin");
        object.remove("seq");
    }
    Ok(value)
}
