use fray_core::MachineIdentity;
use fray_types::{Stream, now_ts};
use std::path::Path;

use crate::error::{Error, Result};

/// Outcome of a v1 → v2 layout migration.
#[derive(Debug, Clone)]
pub struct MigrationReport {
    pub machine_id: String,
    pub moved_streams: Vec<String>,
}

/// Rewrite a v1 shared directory into the multi-machine (v2) layout:
/// assign a machine id, move each stream file under `machines/<id>/`,
/// rename the originals to `*.jsonl.v1-migrated`, write the `.v2` sentinel,
/// and create `local/runtime.jsonl`.
pub fn migrate_to_multi_machine(shared_dir: &Path, local_dir: &Path) -> Result<MigrationReport> {
    if shared_dir.join(".v2").exists() {
        return Err(Error::Migration(
            "channel already uses the multi-machine layout".to_string(),
        ));
    }
    if !shared_dir.is_dir() {
        return Err(Error::MissingLayout(shared_dir.to_path_buf()));
    }

    let identity = MachineIdentity::load_or_create(local_dir, now_ts())?;
    let machine_dir = shared_dir.join("machines").join(&identity.id);
    std::fs::create_dir_all(&machine_dir)?;

    let mut moved_streams = Vec::new();
    for stream in Stream::ALL {
        let name = format!("{}.jsonl", stream.basename());
        let source = shared_dir.join(&name);
        if !source.exists() {
            continue;
        }

        std::fs::copy(&source, machine_dir.join(&name))?;
        std::fs::rename(&source, shared_dir.join(format!("{}.v1-migrated", name)))?;
        moved_streams.push(stream.basename().to_string());
    }

    let runtime = local_dir.join("runtime.jsonl");
    if !runtime.exists() {
        std::fs::write(&runtime, "")?;
    }

    std::fs::write(shared_dir.join(".v2"), "")?;

    Ok(MigrationReport {
        machine_id: identity.id,
        moved_streams,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_migrate_v1_project() {
        let temp = TempDir::new().unwrap();
        let shared = temp.path().join(".fray/shared");
        let local = temp.path().join(".fray/local");
        std::fs::create_dir_all(&shared).unwrap();
        std::fs::write(shared.join("messages.jsonl"), "{}\n").unwrap();
        std::fs::write(shared.join("agents.jsonl"), "{}\n").unwrap();

        let report = migrate_to_multi_machine(&shared, &local).unwrap();

        assert!(shared.join(".v2").exists());
        assert!(shared.join("messages.jsonl.v1-migrated").exists());
        assert!(!shared.join("messages.jsonl").exists());
        assert!(local.join("runtime.jsonl").exists());

        let machines: Vec<_> = std::fs::read_dir(shared.join("machines"))
            .unwrap()
            .collect();
        assert_eq!(machines.len(), 1);

        let shard = shared.join("machines").join(&report.machine_id);
        assert!(shard.join("messages.jsonl").exists());
        assert!(shard.join("agents.jsonl").exists());
        assert_eq!(report.moved_streams.len(), 2);
    }

    #[test]
    fn test_migrate_twice_fails() {
        let temp = TempDir::new().unwrap();
        let shared = temp.path().join("shared");
        let local = temp.path().join("local");
        std::fs::create_dir_all(&shared).unwrap();

        migrate_to_multi_machine(&shared, &local).unwrap();
        let second = migrate_to_multi_machine(&shared, &local);
        assert!(matches!(second, Err(Error::Migration(_))));
    }
}
