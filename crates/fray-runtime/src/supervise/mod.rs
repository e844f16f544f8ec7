mod driver;
mod monitor;

pub use driver::{AgentProcess, Driver, ProcessHandle, Spawner, emit_env_file};
pub use monitor::{
    MonitorDecision, MonitorTimings, SessionView, Supervisor, SuperviseEvent, decide,
};

use fray_engine::Channel;
use fs2::FileExt;
use notify::{PollWatcher, RecursiveMode, Watcher};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::channel as mpsc_channel;
use std::time::Duration;

use crate::error::{Error, Result};

/// Advisory lock enforcing one supervisor per project.
pub struct DaemonLock {
    _file: File,
    path: PathBuf,
}

impl DaemonLock {
    fn lock_path(fray_dir: &Path) -> PathBuf {
        fray_dir.join("supervisor.lock")
    }

    /// Try to become the project's supervisor; `None` when one is running.
    pub fn try_acquire(fray_dir: &Path) -> Result<Option<DaemonLock>> {
        std::fs::create_dir_all(fray_dir)?;
        let path = Self::lock_path(fray_dir);
        let file = File::create(&path)?;
        match file.try_lock_exclusive() {
            Ok(()) => Ok(Some(DaemonLock { _file: file, path })),
            Err(_) => Ok(None),
        }
    }

    pub fn is_held(fray_dir: &Path) -> bool {
        let path = Self::lock_path(fray_dir);
        if !path.exists() {
            return false;
        }
        match File::open(&path) {
            Ok(file) => match file.try_lock_exclusive() {
                Ok(()) => {
                    let _ = FileExt::unlock(&file);
                    false
                }
                Err(_) => true,
            },
            Err(_) => false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Outcome of a one-shot `check` pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    /// Another supervisor holds the lock; nothing was done.
    SupervisorRunning,
    /// A pass ran; how many sessions were spawned by it.
    Ran { spawned: usize },
}

/// One-shot supervision pass. Spawning requires the daemon lock, so a held
/// lock turns this into a no-op.
pub fn check<S: Spawner>(channel: &mut Channel, spawner: S) -> Result<CheckOutcome> {
    let fray_dir = channel.fray_dir();
    let lock = match DaemonLock::try_acquire(&fray_dir)? {
        Some(lock) => lock,
        None => return Ok(CheckOutcome::SupervisorRunning),
    };

    let mut supervisor = Supervisor::new(spawner);
    supervisor.repair_orphans(channel, |_| {})?;

    let mut spawned = 0;
    supervisor.tick(channel, &mut |event| {
        if matches!(event, SuperviseEvent::Spawned { .. }) {
            spawned += 1;
        }
    })?;

    // Hand the spawned processes their own lifetime: a follow-up run (or
    // the orphan repair on the next start) settles their session ends.
    drop(lock);
    Ok(CheckOutcome::Ran { spawned })
}

/// Long-running supervision loop. Samples at 1 Hz, waking early when the
/// shared logs change. Returns once `cancel` flips.
pub fn run<S, F>(
    channel: &mut Channel,
    spawner: S,
    cancel: &AtomicBool,
    mut on_event: F,
) -> Result<()>
where
    S: Spawner,
    F: FnMut(SuperviseEvent),
{
    let fray_dir = channel.fray_dir();
    let _lock = DaemonLock::try_acquire(&fray_dir)?.ok_or_else(|| {
        Error::Supervision("another supervisor already runs this project".to_string())
    })?;

    let mut supervisor = Supervisor::new(spawner);
    supervisor.repair_orphans(channel, &mut on_event)?;

    // File watcher nudges the loop when a shard changes under us
    let (tx, rx) = mpsc_channel();
    let watch_root = channel.store().shared_dir().to_path_buf();
    let config = notify::Config::default().with_poll_interval(Duration::from_millis(1000));
    let mut watcher = PollWatcher::new(
        move |result: std::result::Result<notify::Event, notify::Error>| {
            if result.is_ok() {
                let _ = tx.send(());
            }
        },
        config,
    )
    .map_err(|e| Error::Supervision(format!("watcher: {}", e)))?;
    if watch_root.exists() {
        watcher
            .watch(&watch_root, RecursiveMode::Recursive)
            .map_err(|e| Error::Supervision(format!("watcher: {}", e)))?;
    }

    while !cancel.load(Ordering::Relaxed) {
        // Remote shards only reach the cache through a rebuild; refresh
        // folds them in before the mention scan
        channel.refresh()?;
        supervisor.tick(channel, &mut on_event)?;
        let _ = rx.recv_timeout(Duration::from_secs(1));
    }

    supervisor.shutdown(channel, &mut on_event)?;
    Ok(())
}
