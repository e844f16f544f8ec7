use fray_core::{FRAY_DIR, discover_project, fray_dir, local_dir, shared_dir};
use fray_index::{Database, WriterLock, queries};
use fray_store::LogStore;
use fray_types::{IdKind, LogRecord, new_id};
use std::path::{Path, PathBuf};

use crate::apply;
use crate::config::ChannelConfig;
use crate::error::{Error, Result};
use crate::rebuild::{RebuildProgress, RebuildService};

/// Environment variable carrying the caller identity when `--as` is omitted.
pub const AGENT_ID_ENV: &str = "FRAY_AGENT_ID";

const CACHE_SYNCED_KEY: &str = "cache_synced_mtime";

/// One open channel: project paths, the append-only store, the derived
/// cache, and the channel config. All entity operations go through this.
pub struct Channel {
    project_root: PathBuf,
    store: LogStore,
    db: Database,
    config: ChannelConfig,
}

impl Channel {
    /// Create a fresh channel in `project_root` (the `fray new` bootstrap).
    pub fn init(project_root: &Path, channel_name: &str) -> Result<Channel> {
        let fray = fray_dir(project_root);
        if fray.exists() {
            return Err(Error::Conflict(format!(
                "{} already exists",
                fray.display()
            )));
        }
        std::fs::create_dir_all(&fray)?;

        let config = ChannelConfig::new(new_id(IdKind::Channel), channel_name.to_string());
        config.save(&fray)?;

        Self::open(project_root)
    }

    /// Open an existing channel: discover the project, open cache and store,
    /// and rebuild the cache when the logs are newer than it.
    pub fn open(start: &Path) -> Result<Channel> {
        let project_root = discover_project(start)?;
        let fray = fray_dir(&project_root);
        let config = ChannelConfig::load(&fray)?;

        let store = LogStore::open(shared_dir(&project_root), local_dir(&project_root))?;
        let db = Database::open(&fray.join("fray.db"))?;

        let mut channel = Channel {
            project_root,
            store,
            db,
            config,
        };

        if channel.cache_is_stale()? {
            channel.rebuild(|_: RebuildProgress| {})?;
        }

        Ok(channel)
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    pub fn fray_dir(&self) -> PathBuf {
        self.project_root.join(FRAY_DIR)
    }

    pub fn db_path(&self) -> PathBuf {
        self.fray_dir().join("fray.db")
    }

    pub fn store(&self) -> &LogStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut LogStore {
        &mut self.store
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn db_mut(&mut self) -> &mut Database {
        &mut self.db
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut ChannelConfig {
        &mut self.config
    }

    pub fn save_config(&self) -> Result<()> {
        self.config.save(&self.fray_dir())
    }

    /// Caller identity: explicit `--as` wins, then `FRAY_AGENT_ID`.
    pub fn resolve_caller(&self, explicit: Option<&str>) -> Result<String> {
        if let Some(name) = explicit {
            return Ok(fray_core::AgentRef::parse(name)
                .ok_or_else(|| Error::InvalidInput(format!("bad agent reference: {}", name)))?
                .base()
                .to_string());
        }
        match std::env::var(AGENT_ID_ENV) {
            Ok(value) if !value.is_empty() => Ok(value),
            _ => Err(Error::InvalidInput(
                "no caller identity: pass --as or set FRAY_AGENT_ID".to_string(),
            )),
        }
    }

    /// Whether the caller is an agent process rather than a human at the
    /// terminal: true exactly when the identity came from the environment.
    pub fn caller_is_agent(explicit: Option<&str>) -> bool {
        explicit.is_none() && std::env::var(AGENT_ID_ENV).map(|v| !v.is_empty()).unwrap_or(false)
    }

    /// Commit a batch of records: stamp, mirror into the cache inside one
    /// transaction, append to the logs, then confirm. A failed append rolls
    /// the cache back; a crash after append is repaired by the next rebuild.
    pub fn commit(
        &mut self,
        shared: Vec<LogRecord>,
        runtime: Vec<LogRecord>,
    ) -> Result<CommitReceipt> {
        let shared: Vec<LogRecord> = shared
            .into_iter()
            .map(|r| self.store.prepare(r))
            .collect::<fray_store::Result<_>>()?;
        let runtime: Vec<LogRecord> = runtime
            .into_iter()
            .map(|r| self.store.prepare(r))
            .collect::<fray_store::Result<_>>()?;

        let tx = self.db.conn_mut().transaction()?;
        for record in shared.iter().chain(runtime.iter()) {
            apply::apply_record(&tx, record)?;
        }
        for record in &shared {
            self.store.append_prepared(record)?;
        }
        for record in &runtime {
            self.store.append_runtime_prepared(record)?;
        }
        tx.commit()?;

        self.store.sync_batch()?;
        self.mark_cache_synced()?;

        Ok(CommitReceipt { shared, runtime })
    }

    /// Fold in log changes made by other writers (remote shards arriving
    /// through sync, another local process) by rebuilding when stale. A
    /// rebuild already running in another process is left to finish.
    pub fn refresh(&mut self) -> Result<()> {
        if self.cache_is_stale()? {
            match self.rebuild(|_: RebuildProgress| {}) {
                Ok(()) | Err(Error::Conflict(_)) => {}
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }

    /// Rebuild the derived cache from the logs. Single-writer: the cache
    /// lock keeps two processes from folding at once.
    pub fn rebuild<F>(&mut self, on_progress: F) -> Result<()>
    where
        F: FnMut(RebuildProgress),
    {
        let _guard = WriterLock::try_acquire(&self.db_path())?.ok_or_else(|| {
            Error::Conflict("another process is rebuilding this cache".to_string())
        })?;
        RebuildService::new(&self.store, &mut self.db).run(on_progress)?;
        self.mark_cache_synced()?;
        Ok(())
    }

    fn cache_is_stale(&self) -> Result<bool> {
        let latest = match self.store.latest_mtime()? {
            Some(mtime) => mtime,
            None => return Ok(false),
        };
        let latest_nanos = latest
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos() as i64)
            .unwrap_or(0);

        match queries::config::get(self.db.conn(), CACHE_SYNCED_KEY)? {
            Some(stored) => {
                let stored: i64 = stored.parse().unwrap_or(0);
                Ok(latest_nanos > stored)
            }
            // Logs exist but the cache has never been built
            None => Ok(true),
        }
    }

    fn mark_cache_synced(&self) -> Result<()> {
        let latest_nanos = self
            .store
            .latest_mtime()?
            .and_then(|m| m.duration_since(std::time::UNIX_EPOCH).ok())
            .map(|d| d.as_nanos() as i64)
            .unwrap_or(0);
        queries::config::set(
            self.db.conn(),
            CACHE_SYNCED_KEY,
            &latest_nanos.to_string(),
        )?;
        Ok(())
    }
}

/// Stamped records written by a successful commit, in issue order.
pub struct CommitReceipt {
    pub shared: Vec<LogRecord>,
    pub runtime: Vec<LogRecord>,
}

impl CommitReceipt {
    /// The first shared record, for ops that write exactly one.
    pub fn first(&self) -> Option<&LogRecord> {
        self.shared.first()
    }
}
