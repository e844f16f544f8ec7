mod hosted;

pub use hosted::{HostedClient, HostedState, RegisterResponse, pull_streams, push_streams};

use fray_engine::{Channel, SyncConfig};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Where a `path`/`cloud` backend puts the channel's shared tree.
pub fn shared_destination(base: &Path, channel_name: &str) -> PathBuf {
    base.join(channel_name).join("shared")
}

/// Resolve the cloud-drive base directory from OS conventions: iCloud Drive
/// on macOS, a `~/Dropbox` folder anywhere.
pub fn cloud_base() -> Result<PathBuf> {
    let home =
        dirs::home_dir().ok_or_else(|| Error::Config("no home directory".to_string()))?;

    let icloud = home.join("Library/Mobile Documents/com~apple~CloudDocs");
    if icloud.is_dir() {
        return Ok(icloud.join("fray"));
    }
    let dropbox = home.join("Dropbox");
    if dropbox.is_dir() {
        return Ok(dropbox.join("fray"));
    }
    Err(Error::Sync(
        "no cloud drive found (looked for iCloud Drive and ~/Dropbox); use --path instead"
            .to_string(),
    ))
}

/// Move the channel's shared directory to `base/<channel>/shared` and leave
/// a symlink behind. Requires the multi-machine layout, since a flat v1
/// tree would have every machine writing the same files.
pub fn setup_path_backend(channel: &mut Channel, base: &Path, cloud: bool) -> Result<()> {
    let shared = channel.store().shared_dir().to_path_buf();
    if !shared.join(".v2").exists() {
        return Err(Error::Sync(
            "sync needs the multi-machine layout; run `fray migrate --multi-machine` first"
                .to_string(),
        ));
    }
    if shared.is_symlink() {
        return Err(Error::Sync(format!(
            "{} is already a symlink; sync is configured",
            shared.display()
        )));
    }

    let channel_name = channel.config().channel_name.clone();
    let destination = shared_destination(base, &channel_name);

    if destination.exists() {
        // Collision detection: moving would clobber another machine's copy
        // of the same stream file
        for entry in walkdir::WalkDir::new(&shared).min_depth(1) {
            let entry = entry.map_err(|e| Error::Sync(format!("scan: {}", e)))?;
            let relative = entry
                .path()
                .strip_prefix(&shared)
                .map_err(|e| Error::Sync(format!("scan: {}", e)))?;
            let target = destination.join(relative);
            if entry.file_type().is_file() && target.exists() {
                return Err(Error::Sync(format!(
                    "destination already has {}; refusing to overwrite",
                    target.display()
                )));
            }
        }
        move_tree(&shared, &destination)?;
    } else {
        if let Some(parent) = destination.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::rename(&shared, &destination).or_else(|_| {
            // Cross-device move: copy then remove
            move_tree(&shared, &destination)
        })?;
    }

    if shared.exists() {
        std::fs::remove_dir_all(&shared)?;
    }
    symlink_dir(&destination, &shared)?;

    channel.config_mut().sync = Some(if cloud {
        SyncConfig::Cloud {
            base: base.to_path_buf(),
        }
    } else {
        SyncConfig::Path {
            base: base.to_path_buf(),
        }
    });
    channel.save_config()?;
    Ok(())
}

fn move_tree(source: &Path, destination: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(destination)?;
    for entry in walkdir::WalkDir::new(source).min_depth(1) {
        let entry = entry.map_err(std::io::Error::other)?;
        let relative = entry
            .path()
            .strip_prefix(source)
            .map_err(std::io::Error::other)?;
        let target = destination.join(relative);
        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target)?;
        } else {
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

#[cfg(unix)]
fn symlink_dir(target: &Path, link: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(windows)]
fn symlink_dir(target: &Path, link: &Path) -> std::io::Result<()> {
    std::os::windows::fs::symlink_dir(target, link)
}

#[cfg(test)]
mod tests {
    use super::*;
    use fray_store::migrate_to_multi_machine;
    use tempfile::TempDir;

    fn v2_channel(temp: &TempDir) -> Channel {
        let channel = Channel::init(&temp.path().join("project"), "acme").unwrap();
        let shared = channel.store().shared_dir().to_path_buf();
        let local = channel.store().local_dir().to_path_buf();
        drop(channel);
        migrate_to_multi_machine(&shared, &local).unwrap();
        Channel::open(&temp.path().join("project")).unwrap()
    }

    #[test]
    fn test_setup_requires_v2() {
        let temp = TempDir::new().unwrap();
        let mut channel = Channel::init(&temp.path().join("project"), "acme").unwrap();
        let base = temp.path().join("drive");

        let result = setup_path_backend(&mut channel, &base, false);
        assert!(matches!(result, Err(Error::Sync(_))));
    }

    #[test]
    fn test_setup_moves_and_symlinks() {
        let temp = TempDir::new().unwrap();
        let mut channel = v2_channel(&temp);
        let base = temp.path().join("drive");
        std::fs::create_dir_all(&base).unwrap();

        setup_path_backend(&mut channel, &base, false).unwrap();

        let shared = temp.path().join("project/.fray/shared");
        assert!(shared.is_symlink());
        assert!(base.join("acme/shared/.v2").exists());

        let config = channel.config();
        assert!(matches!(config.sync, Some(SyncConfig::Path { .. })));
    }

    #[test]
    fn test_setup_detects_collisions() {
        let temp = TempDir::new().unwrap();
        let mut channel = v2_channel(&temp);

        let base = temp.path().join("drive");
        let clash = base.join("acme/shared/.v2");
        std::fs::create_dir_all(clash.parent().unwrap()).unwrap();
        std::fs::write(&clash, "").unwrap();

        let result = setup_path_backend(&mut channel, &base, false);
        assert!(matches!(result, Err(Error::Sync(_))));
    }
}
