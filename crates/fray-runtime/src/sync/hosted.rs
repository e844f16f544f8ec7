use fray_core::device_fingerprint;
use fray_engine::Channel;
use fray_store::LogStore;
use fray_types::Stream;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_ATTEMPTS: u32 = 3;

/// Per-stream cursors and the machine token, persisted in
/// `.fray/hostedsync/state.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HostedState {
    pub url: String,
    pub machine_id: String,
    pub token: String,
    /// Lines of each local stream already pushed.
    #[serde(default)]
    pub push_cursors: BTreeMap<String, u64>,
    /// Opaque server cursor per stream for pulls.
    #[serde(default)]
    pub pull_cursors: BTreeMap<String, String>,
}

impl HostedState {
    fn dir(fray_dir: &Path) -> PathBuf {
        fray_dir.join("hostedsync")
    }

    fn path(fray_dir: &Path) -> PathBuf {
        Self::dir(fray_dir).join("state.json")
    }

    pub fn load(fray_dir: &Path) -> Result<Option<HostedState>> {
        let path = Self::path(fray_dir);
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&path)?;
        let state = serde_json::from_str(&content)
            .map_err(|e| Error::Sync(format!("corrupt hostedsync state: {}", e)))?;
        Ok(Some(state))
    }

    pub fn save(&self, fray_dir: &Path) -> Result<()> {
        std::fs::create_dir_all(Self::dir(fray_dir))?;
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| Error::Sync(format!("hostedsync state: {}", e)))?;
        std::fs::write(Self::path(fray_dir), content)?;
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
pub struct RegisterResponse {
    pub ok: bool,
    pub machine_id: String,
    pub token: String,
}

#[derive(Debug, Serialize)]
struct RegisterRequest<'a> {
    channel_id: &'a str,
    machine_id: &'a str,
    device_info: String,
}

#[derive(Debug, Serialize)]
struct PushRequest<'a> {
    channel_id: &'a str,
    machine_id: &'a str,
    stream: &'a str,
    records: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct PushResponse {
    ok: bool,
    #[serde(default)]
    accepted: u64,
}

#[derive(Debug, Serialize)]
struct PullRequest<'a> {
    channel_id: &'a str,
    machine_id: &'a str,
    stream: &'a str,
    cursor: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct PullRecord {
    origin: String,
    line: String,
}

#[derive(Debug, Deserialize)]
struct PullResponse {
    ok: bool,
    #[serde(default)]
    records: Vec<PullRecord>,
    #[serde(default)]
    cursor: Option<String>,
}

/// Blocking HTTP client for the hosted relay. Transient failures (5xx,
/// connect) retry with exponential backoff; the final failure surfaces as a
/// network error.
pub struct HostedClient {
    http: reqwest::blocking::Client,
    base_url: String,
}

impl HostedClient {
    pub fn new(base_url: &str) -> Result<HostedClient> {
        let http = reqwest::blocking::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| Error::Network(format!("client: {}", e)))?;
        Ok(HostedClient {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Register this machine with the relay and persist the bearer token.
    pub fn register(
        &self,
        channel_id: &str,
        machine_id: &str,
    ) -> Result<RegisterResponse> {
        let request = RegisterRequest {
            channel_id,
            machine_id,
            device_info: device_fingerprint(),
        };

        let response: RegisterResponse = self.post_with_retry(
            "/v1/sync/register-machine",
            None,
            &request,
        )?;
        if !response.ok {
            return Err(Error::Network("relay rejected registration".to_string()));
        }
        Ok(response)
    }

    fn post_with_retry<B: Serialize, R: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        token: Option<&str>,
        body: &B,
    ) -> Result<R> {
        let url = format!("{}{}", self.base_url, path);
        let mut last_error = String::new();

        for attempt in 0..MAX_ATTEMPTS {
            if attempt > 0 {
                std::thread::sleep(Duration::from_millis(500 * (1 << attempt)));
            }

            let mut request = self.http.post(&url).json(body);
            if let Some(token) = token {
                request = request.bearer_auth(token);
            }

            match request.send() {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return response
                            .json()
                            .map_err(|e| Error::Network(format!("{}: bad response: {}", path, e)));
                    }
                    if status.is_server_error() {
                        last_error = format!("{}: server returned {}", path, status);
                        continue;
                    }
                    return Err(Error::Network(format!(
                        "{}: relay returned {}",
                        path, status
                    )));
                }
                Err(err) if err.is_timeout() || err.is_connect() => {
                    last_error = format!("{}: {}", path, err);
                    continue;
                }
                Err(err) => return Err(Error::Network(format!("{}: {}", path, err))),
            }
        }

        Err(Error::Network(format!(
            "{} failed after {} attempts: {}",
            path, MAX_ATTEMPTS, last_error
        )))
    }
}

/// Push every local stream's unpushed lines. Idempotent: the relay dedups
/// by (origin, seq), so replaying a line is harmless.
pub fn push_streams(channel: &Channel, state: &mut HostedState) -> Result<PushReport> {
    let client = HostedClient::new(&state.url)?;
    let store = channel.store();
    let channel_id = channel.config().channel_id.clone();
    let write_dir = store.write_dir();

    let mut report = PushReport::default();
    for stream in Stream::ALL {
        let path = write_dir.join(format!("{}.jsonl", stream.basename()));
        if !path.exists() {
            continue;
        }

        let content = std::fs::read_to_string(&path)?;
        let lines: Vec<&str> = complete_lines(&content);
        let already = state
            .push_cursors
            .get(stream.basename())
            .copied()
            .unwrap_or(0) as usize;
        if lines.len() <= already {
            continue;
        }

        let fresh: Vec<String> = lines[already..].iter().map(|l| l.to_string()).collect();
        let count = fresh.len();
        let response: PushResponse = client.post_with_retry(
            "/v1/sync/push",
            Some(&state.token),
            &PushRequest {
                channel_id: &channel_id,
                machine_id: &state.machine_id,
                stream: stream.basename(),
                records: fresh,
            },
        )?;
        if !response.ok {
            return Err(Error::Network(format!(
                "relay rejected push for {}",
                stream.basename()
            )));
        }

        state
            .push_cursors
            .insert(stream.basename().to_string(), (already + count) as u64);
        report.pushed += response.accepted.max(count as u64);
    }

    state.save(&channel.fray_dir())?;
    Ok(report)
}

/// Pull every stream from the relay into the owning machine's shard
/// directory. Records for this machine are skipped; the local shard is
/// authoritative for its own origin.
pub fn pull_streams(channel: &Channel, state: &mut HostedState) -> Result<PullReport> {
    let client = HostedClient::new(&state.url)?;
    let store = channel.store();
    let channel_id = channel.config().channel_id.clone();

    let mut report = PullReport::default();
    for stream in Stream::ALL {
        let cursor = state.pull_cursors.get(stream.basename()).cloned();
        let response: PullResponse = client.post_with_retry(
            "/v1/sync/pull",
            Some(&state.token),
            &PullRequest {
                channel_id: &channel_id,
                machine_id: &state.machine_id,
                stream: stream.basename(),
                cursor: cursor.as_deref(),
            },
        )?;
        if !response.ok {
            return Err(Error::Network(format!(
                "relay rejected pull for {}",
                stream.basename()
            )));
        }

        for record in response.records {
            if record.origin == state.machine_id {
                continue;
            }
            report.pulled += append_remote_line(store, &record.origin, *stream, &record.line)?;
        }

        if let Some(cursor) = response.cursor {
            state
                .pull_cursors
                .insert(stream.basename().to_string(), cursor);
        }
    }

    state.save(&channel.fray_dir())?;
    Ok(report)
}

/// Append a pulled line into `machines/<origin>/<stream>.jsonl` unless an
/// identical (origin, seq) line is already there.
fn append_remote_line(
    store: &LogStore,
    origin: &str,
    stream: Stream,
    line: &str,
) -> Result<u64> {
    let seq = serde_json::from_str::<serde_json::Value>(line)
        .ok()
        .and_then(|v| v.get("seq").and_then(|s| s.as_u64()));

    let dir = store.shared_dir().join("machines").join(origin);
    std::fs::create_dir_all(&dir)?;
    let path = dir.join(format!("{}.jsonl", stream.basename()));

    if let Some(seq) = seq
        && path.exists()
    {
        let existing = std::fs::read_to_string(&path)?;
        let duplicate = complete_lines(&existing).iter().any(|l| {
            serde_json::from_str::<serde_json::Value>(l)
                .ok()
                .and_then(|v| v.get("seq").and_then(|s| s.as_u64()))
                == Some(seq)
        });
        if duplicate {
            return Ok(0);
        }
    }

    use std::io::Write;
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)?;
    writeln!(file, "{}", line.trim_end())?;
    Ok(1)
}

fn complete_lines(content: &str) -> Vec<&str> {
    match content.rfind('\n') {
        Some(last) => content[..last].lines().filter(|l| !l.trim().is_empty()).collect(),
        None => Vec::new(),
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct PushReport {
    pub pushed: u64,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct PullReport {
    pub pulled: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_state_round_trip() {
        let temp = TempDir::new().unwrap();
        let mut state = HostedState {
            url: "https://relay.example".to_string(),
            machine_id: "mch-ab12cd34".to_string(),
            token: "tok".to_string(),
            ..HostedState::default()
        };
        state.push_cursors.insert("messages".to_string(), 7);

        state.save(temp.path()).unwrap();
        let loaded = HostedState::load(temp.path()).unwrap().unwrap();
        assert_eq!(loaded.machine_id, "mch-ab12cd34");
        assert_eq!(loaded.push_cursors.get("messages"), Some(&7));
    }

    #[test]
    fn test_missing_state_is_none() {
        let temp = TempDir::new().unwrap();
        assert!(HostedState::load(temp.path()).unwrap().is_none());
    }

    #[test]
    fn test_complete_lines_drops_torn_tail() {
        let lines = complete_lines("{\"a\":1}\n{\"b\":2}\n{\"torn\":");
        assert_eq!(lines, vec!["{\"a\":1}", "{\"b\":2}"]);
    }
}
