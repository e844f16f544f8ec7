use fs2::FileExt;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::OpenOptions;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::project::{Error, Result};

/// Per-machine identity stored at `.fray/local/machine-id`. The `seq` field
/// is the machine's append sequence; it only moves forward, under the file
/// lock, so (origin, seq) pairs are unique per machine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MachineIdentity {
    pub id: String,
    pub seq: u64,
    pub created_at: i64,
}

impl MachineIdentity {
    fn path(local_dir: &Path) -> PathBuf {
        local_dir.join("machine-id")
    }

    /// Load the machine identity, creating one on first use.
    pub fn load_or_create(local_dir: &Path, now: i64) -> Result<MachineIdentity> {
        let path = Self::path(local_dir);
        if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            return serde_json::from_str(&content)
                .map_err(|e| Error::Config(format!("corrupt machine-id file: {}", e)));
        }

        std::fs::create_dir_all(local_dir)?;
        let identity = MachineIdentity {
            id: fresh_machine_id(),
            seq: 0,
            created_at: now,
        };
        std::fs::write(&path, serde_json::to_string(&identity).map_err(serde_io)?)?;
        Ok(identity)
    }

    /// Reserve `count` sequence numbers, returning the first. Lock, re-read,
    /// bump, write back, so concurrent commands never hand out the same seq.
    pub fn reserve_seq(local_dir: &Path, count: u64) -> Result<u64> {
        let path = Self::path(local_dir);
        let mut file = OpenOptions::new().read(true).write(true).open(&path)?;
        file.lock_exclusive()?;

        let mut content = String::new();
        file.read_to_string(&mut content)?;
        let mut identity: MachineIdentity = serde_json::from_str(&content)
            .map_err(|e| Error::Config(format!("corrupt machine-id file: {}", e)))?;

        let first = identity.seq + 1;
        identity.seq += count;

        let serialized = serde_json::to_string(&identity).map_err(serde_io)?;
        file.set_len(0)?;
        file.seek(SeekFrom::Start(0))?;
        file.write_all(serialized.as_bytes())?;
        file.flush()?;
        fs2::FileExt::unlock(&file)?;

        Ok(first)
    }

    pub fn exists(local_dir: &Path) -> bool {
        Self::path(local_dir).exists()
    }
}

fn fresh_machine_id() -> String {
    let hex = uuid_hex();
    format!("mch-{}", &hex[..8])
}

// uuid is not a dependency of this crate; eight hex chars from a sha256 of
// hostname + timestamp + pid are unique enough for a per-user machine tag.
fn uuid_hex() -> String {
    let mut hasher = Sha256::new();
    if let Ok(hostname) = std::env::var("HOSTNAME") {
        hasher.update(hostname.as_bytes());
    }
    hasher.update(std::process::id().to_le_bytes());
    hasher.update(
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0)
            .to_le_bytes(),
    );
    format!("{:x}", hasher.finalize())
}

fn serde_io(err: serde_json::Error) -> Error {
    Error::Config(err.to_string())
}

/// Stable device description sent on hosted-sync registration.
pub fn device_fingerprint() -> String {
    let os = std::env::consts::OS;
    let arch = std::env::consts::ARCH;
    let host = std::env::var("HOSTNAME").unwrap_or_else(|_| "unknown".to_string());

    let mut hasher = Sha256::new();
    hasher.update(host.as_bytes());
    hasher.update(os.as_bytes());
    let digest = format!("{:x}", hasher.finalize());

    format!("{}/{} {}", os, arch, &digest[..12])
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_create_then_load() {
        let temp = TempDir::new().unwrap();
        let created = MachineIdentity::load_or_create(temp.path(), 1000).unwrap();
        assert!(created.id.starts_with("mch-"));
        assert_eq!(created.seq, 0);
        assert_eq!(created.created_at, 1000);

        let loaded = MachineIdentity::load_or_create(temp.path(), 2000).unwrap();
        assert_eq!(loaded.id, created.id);
        assert_eq!(loaded.created_at, 1000);
    }

    #[test]
    fn test_reserve_seq_is_monotonic() {
        let temp = TempDir::new().unwrap();
        MachineIdentity::load_or_create(temp.path(), 0).unwrap();

        let first = MachineIdentity::reserve_seq(temp.path(), 3).unwrap();
        assert_eq!(first, 1);
        let second = MachineIdentity::reserve_seq(temp.path(), 1).unwrap();
        assert_eq!(second, 4);

        let identity = MachineIdentity::load_or_create(temp.path(), 0).unwrap();
        assert_eq!(identity.seq, 4);
    }

    #[test]
    fn test_device_fingerprint_is_stable() {
        assert_eq!(device_fingerprint(), device_fingerprint());
    }
}
