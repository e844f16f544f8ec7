use fray_core::base_of;
use fray_engine::Channel;
use fray_index::queries;
use fray_types::{
    Agent, AgentUpdateRecord, GhostCursorRecord, InvokeConfig, LogRecord, Presence, ROOM,
    SessionEndRecord, SessionStartRecord, Stamp, now_ts,
};
use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::supervise::driver::{AgentProcess, Spawner, emit_env_file};

/// Timeouts governing one managed session, taken from the agent's invoke
/// config with the documented defaults.
#[derive(Debug, Clone, Copy)]
pub struct MonitorTimings {
    pub spawn_timeout_ms: u64,
    pub idle_after_ms: u64,
    pub min_checkin_ms: u64,
    pub max_runtime_ms: u64,
}

impl MonitorTimings {
    pub fn from_invoke(invoke: &InvokeConfig) -> Self {
        Self {
            spawn_timeout_ms: invoke.spawn_timeout_ms(),
            idle_after_ms: invoke.idle_after_ms(),
            min_checkin_ms: invoke.min_checkin_ms(),
            max_runtime_ms: invoke.max_runtime_ms(),
        }
    }
}

/// Snapshot of one live session fed into the decision function.
#[derive(Debug, Clone, Copy)]
pub struct SessionView {
    pub presence: Presence,
    pub spawned_at_ms: i64,
    /// Latest post by the agent since spawn, in ms.
    pub last_activity_ms: Option<i64>,
    /// When the session last transitioned to idle, in ms.
    pub idle_since_ms: Option<i64>,
    pub process_alive: bool,
}

/// What the monitor should do with a session right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorDecision {
    Wait,
    MarkActive,
    MarkIdle,
    /// Done-detection: idle, never posted, min_checkin elapsed.
    GracefulStop,
    /// Still spawning past spawn_timeout_ms.
    KillSpawnTimeout,
    /// Ran past max_runtime_ms.
    KillZombie,
    /// Process exited on its own.
    Exited,
}

/// Pure decision: no clocks, no IO. The supervisor samples state and clocks
/// and this says what transition applies.
pub fn decide(view: &SessionView, now_ms: i64, timings: &MonitorTimings) -> MonitorDecision {
    if !view.process_alive {
        return MonitorDecision::Exited;
    }

    if timings.max_runtime_ms > 0
        && now_ms - view.spawned_at_ms > timings.max_runtime_ms as i64
    {
        return MonitorDecision::KillZombie;
    }

    match view.presence {
        Presence::Spawning => {
            if view.last_activity_ms.is_some() {
                MonitorDecision::MarkActive
            } else if now_ms - view.spawned_at_ms > timings.spawn_timeout_ms as i64 {
                MonitorDecision::KillSpawnTimeout
            } else {
                MonitorDecision::Wait
            }
        }
        Presence::Active => {
            let last = view.last_activity_ms.unwrap_or(view.spawned_at_ms);
            if now_ms - last > timings.idle_after_ms as i64 {
                MonitorDecision::MarkIdle
            } else {
                MonitorDecision::Wait
            }
        }
        Presence::Idle => {
            let woke = match (view.last_activity_ms, view.idle_since_ms) {
                (Some(activity), Some(idle_since)) => activity > idle_since,
                _ => false,
            };
            if woke {
                MonitorDecision::MarkActive
            } else if timings.min_checkin_ms > 0
                && view.last_activity_ms.is_none()
                && now_ms - view.spawned_at_ms > timings.min_checkin_ms as i64
            {
                MonitorDecision::GracefulStop
            } else {
                MonitorDecision::Wait
            }
        }
        Presence::Offline | Presence::Error => MonitorDecision::Wait,
    }
}

struct LiveSession {
    agent_guid: String,
    agent_id: String,
    process: Box<dyn AgentProcess>,
    timings: MonitorTimings,
    presence: Presence,
    spawned_at_ms: i64,
    idle_since_ms: Option<i64>,
}

/// Events the supervisor reports while running, rendered by the CLI.
#[derive(Debug, Clone)]
pub enum SuperviseEvent {
    OrphanRepaired { session_id: String, agent_id: String },
    Spawned { agent_id: String, session_id: String, pid: u32 },
    Transition { agent_id: String, presence: Presence },
    Ended { agent_id: String, session_id: String, reason: String },
}

/// Drives managed agents through spawn, activity sampling, and teardown.
/// One instance per process; the project-level daemon lock is handled by
/// the caller before construction.
pub struct Supervisor<S: Spawner> {
    spawner: S,
    sessions: HashMap<String, LiveSession>,
}

impl<S: Spawner> Supervisor<S> {
    pub fn new(spawner: S) -> Self {
        Self {
            spawner,
            sessions: HashMap::new(),
        }
    }

    pub fn live_count(&self) -> usize {
        self.sessions.len()
    }

    /// Close any session_start without a session_end left by a dead
    /// supervisor, so the session ledger stays balanced.
    pub fn repair_orphans<F>(&self, channel: &mut Channel, mut on_event: F) -> Result<()>
    where
        F: FnMut(SuperviseEvent),
    {
        let orphans = queries::sessions::list_open(channel.db().conn())?;
        for orphan in orphans {
            channel.commit(
                vec![LogRecord::SessionEnd(SessionEndRecord {
                    agent_id: orphan.agent_id.clone(),
                    session_id: orphan.session_id.clone(),
                    reason: "error".to_string(),
                    ended_at: now_ts(),
                    stamp: Stamp::default(),
                })],
                vec![],
            )?;
            on_event(SuperviseEvent::OrphanRepaired {
                session_id: orphan.session_id,
                agent_id: orphan.agent_id,
            });
        }
        Ok(())
    }

    /// One supervisor pass: wake agents with fresh mentions, then sample
    /// every live session and apply the due transition.
    pub fn tick<F>(&mut self, channel: &mut Channel, on_event: &mut F) -> Result<()>
    where
        F: FnMut(SuperviseEvent),
    {
        self.scan_and_wake(channel, on_event)?;
        self.sample_sessions(channel, on_event)?;
        Ok(())
    }

    /// Wake managed agents that have unread mentions past their watermark.
    /// Messages authored by the agent's own base never wake it.
    fn scan_and_wake<F>(&mut self, channel: &mut Channel, on_event: &mut F) -> Result<()>
    where
        F: FnMut(SuperviseEvent),
    {
        let agents = queries::agents::list_managed(channel.db().conn())?;
        for agent in agents {
            if self.sessions.contains_key(&agent.agent_id) {
                continue;
            }

            let base = base_of(&agent.agent_id).to_string();
            let after = match &agent.mention_watermark {
                Some(guid) => queries::messages::ts_and_seq(channel.db().conn(), guid)?,
                None => None,
            };
            let mut mentions =
                queries::messages::mentions_after(channel.db().conn(), &base, after)?;
            mentions.retain(|m| base_of(&m.from_agent) != base);
            if mentions.is_empty() {
                continue;
            }

            let newest = mentions
                .last()
                .map(|m| m.guid.clone())
                .unwrap_or_default();
            let prompt = wake_prompt(&agent, &mentions);
            self.spawn_session(channel, &agent, &prompt, Some(newest), on_event)?;
        }
        Ok(())
    }

    fn spawn_session<F>(
        &mut self,
        channel: &mut Channel,
        agent: &Agent,
        prompt: &str,
        watermark: Option<String>,
        on_event: &mut F,
    ) -> Result<()>
    where
        F: FnMut(SuperviseEvent),
    {
        let invoke = agent
            .invoke
            .clone()
            .ok_or_else(|| Error::Supervision(format!("{} has no invoke config", agent.agent_id)))?;
        let timings = MonitorTimings::from_invoke(&invoke);

        emit_env_file(&agent.agent_id)?;

        let process = match self.spawner.spawn(agent, prompt) {
            Ok(process) => process,
            Err(err) => {
                // Spawn failure: error then offline, no session to track
                self.mirror_presence(channel, &agent.guid, Presence::Error)?;
                self.mirror_presence(channel, &agent.guid, Presence::Offline)?;
                return Err(err);
            }
        };

        let session_id = process.session_id().to_string();
        let now = now_ts();

        let mut records = vec![
            LogRecord::SessionStart(SessionStartRecord {
                agent_id: agent.agent_id.clone(),
                session_id: session_id.clone(),
                triggered_by: watermark.clone(),
                started_at: now,
                stamp: Stamp::default(),
            }),
            presence_record(&agent.guid, Presence::Spawning),
        ];

        // Pin a must-read boundary at the previous watermark so the wake
        // batch reaches the agent through `notifs` even if its read cursor
        // already moved past it. Consumed only by an explicit session ack.
        let mut runtime_records = Vec::new();
        if let Some(old_mark) = &agent.mention_watermark {
            runtime_records.push(LogRecord::GhostCursor(GhostCursorRecord {
                agent_id: base_of(&agent.agent_id).to_string(),
                home: ROOM.to_string(),
                message_guid: old_mark.clone(),
                assigned_at: now,
                stamp: Stamp::default(),
            }));
        }

        // Advance the watermark, never backwards
        if let Some(new_mark) = watermark {
            let advances = match &agent.mention_watermark {
                Some(old) => {
                    let old_key = queries::messages::ts_and_seq(channel.db().conn(), old)?;
                    let new_key = queries::messages::ts_and_seq(channel.db().conn(), &new_mark)?;
                    match (old_key, new_key) {
                        (Some(old_key), Some(new_key)) => new_key > old_key,
                        _ => true,
                    }
                }
                None => true,
            };
            if advances {
                records.push(LogRecord::AgentUpdate(AgentUpdateRecord {
                    id: agent.guid.clone(),
                    mention_watermark: Some(Some(new_mark)),
                    ..AgentUpdateRecord::default()
                }));
            }
        }

        channel.commit(records, runtime_records)?;

        on_event(SuperviseEvent::Spawned {
            agent_id: agent.agent_id.clone(),
            session_id: session_id.clone(),
            pid: process.pid(),
        });

        self.sessions.insert(
            agent.agent_id.clone(),
            LiveSession {
                agent_guid: agent.guid.clone(),
                agent_id: agent.agent_id.clone(),
                process,
                timings,
                presence: Presence::Spawning,
                spawned_at_ms: now * 1000,
                idle_since_ms: None,
            },
        );
        Ok(())
    }

    fn sample_sessions<F>(&mut self, channel: &mut Channel, on_event: &mut F) -> Result<()>
    where
        F: FnMut(SuperviseEvent),
    {
        let now_ms = now_ts() * 1000;
        let mut finished: Vec<(String, String)> = Vec::new();

        for session in self.sessions.values_mut() {
            let last_activity_ms = queries::messages::last_post_ts(
                channel.db().conn(),
                &session.agent_id,
                session.spawned_at_ms / 1000,
            )?
            .map(|ts| ts * 1000);

            let view = SessionView {
                presence: session.presence,
                spawned_at_ms: session.spawned_at_ms,
                last_activity_ms,
                idle_since_ms: session.idle_since_ms,
                process_alive: session.process.is_running(),
            };

            match decide(&view, now_ms, &session.timings) {
                MonitorDecision::Wait => {}
                MonitorDecision::MarkActive => {
                    session.presence = Presence::Active;
                    session.idle_since_ms = None;
                    mirror(channel, &session.agent_guid, Presence::Active)?;
                    on_event(SuperviseEvent::Transition {
                        agent_id: session.agent_id.clone(),
                        presence: Presence::Active,
                    });
                }
                MonitorDecision::MarkIdle => {
                    session.presence = Presence::Idle;
                    session.idle_since_ms = Some(now_ms);
                    mirror(channel, &session.agent_guid, Presence::Idle)?;
                    on_event(SuperviseEvent::Transition {
                        agent_id: session.agent_id.clone(),
                        presence: Presence::Idle,
                    });
                }
                MonitorDecision::GracefulStop => {
                    session.process.kill();
                    finished.push((session.agent_id.clone(), "done".to_string()));
                }
                MonitorDecision::KillSpawnTimeout => {
                    session.process.kill();
                    mirror(channel, &session.agent_guid, Presence::Error)?;
                    finished.push((session.agent_id.clone(), "spawn_timeout".to_string()));
                }
                MonitorDecision::KillZombie => {
                    session.process.kill();
                    mirror(channel, &session.agent_guid, Presence::Error)?;
                    finished.push((session.agent_id.clone(), "zombie".to_string()));
                }
                MonitorDecision::Exited => {
                    finished.push((session.agent_id.clone(), "exited".to_string()));
                }
            }
        }

        for (agent_id, reason) in finished {
            self.end_session(channel, &agent_id, &reason, on_event)?;
        }
        Ok(())
    }

    fn end_session<F>(
        &mut self,
        channel: &mut Channel,
        agent_id: &str,
        reason: &str,
        on_event: &mut F,
    ) -> Result<()>
    where
        F: FnMut(SuperviseEvent),
    {
        let session = match self.sessions.remove(agent_id) {
            Some(session) => session,
            None => return Ok(()),
        };

        channel.commit(
            vec![
                LogRecord::SessionEnd(SessionEndRecord {
                    agent_id: session.agent_id.clone(),
                    session_id: session.process.session_id().to_string(),
                    reason: reason.to_string(),
                    ended_at: now_ts(),
                    stamp: Stamp::default(),
                }),
                presence_record(&session.agent_guid, Presence::Offline),
            ],
            vec![],
        )?;

        on_event(SuperviseEvent::Ended {
            agent_id: session.agent_id.clone(),
            session_id: session.process.session_id().to_string(),
            reason: reason.to_string(),
        });
        Ok(())
    }

    /// Kill every live session and record the ends (supervisor shutdown).
    pub fn shutdown<F>(&mut self, channel: &mut Channel, on_event: &mut F) -> Result<()>
    where
        F: FnMut(SuperviseEvent),
    {
        let agent_ids: Vec<String> = self.sessions.keys().cloned().collect();
        for agent_id in agent_ids {
            if let Some(session) = self.sessions.get_mut(&agent_id) {
                session.process.kill();
            }
            self.end_session(channel, &agent_id, "stopped", on_event)?;
        }
        Ok(())
    }

    fn mirror_presence(
        &self,
        channel: &mut Channel,
        agent_guid: &str,
        presence: Presence,
    ) -> Result<()> {
        mirror(channel, agent_guid, presence)
    }
}

fn presence_record(agent_guid: &str, presence: Presence) -> LogRecord {
    LogRecord::AgentUpdate(AgentUpdateRecord {
        id: agent_guid.to_string(),
        presence: Some(Some(presence)),
        last_seen: Some(Some(now_ts())),
        ..AgentUpdateRecord::default()
    })
}

fn mirror(channel: &mut Channel, agent_guid: &str, presence: Presence) -> Result<()> {
    channel.commit(vec![presence_record(agent_guid, presence)], vec![])?;
    Ok(())
}

fn wake_prompt(agent: &Agent, mentions: &[fray_types::Message]) -> String {
    let mut prompt = format!(
        "You are {}. You have {} unread mention(s):\n",
        agent.agent_id,
        mentions.len()
    );
    for message in mentions {
        prompt.push_str(&format!("- [{}] {}\n", message.from_agent, message.body));
    }
    prompt.push_str("Respond in the channel with `fray post`.");
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    fn timings() -> MonitorTimings {
        MonitorTimings {
            spawn_timeout_ms: 10_000,
            idle_after_ms: 30_000,
            min_checkin_ms: 60_000,
            max_runtime_ms: 600_000,
        }
    }

    fn view(presence: Presence) -> SessionView {
        SessionView {
            presence,
            spawned_at_ms: 0,
            last_activity_ms: None,
            idle_since_ms: None,
            process_alive: true,
        }
    }

    #[test]
    fn test_spawning_times_out() {
        let v = view(Presence::Spawning);
        assert_eq!(decide(&v, 5_000, &timings()), MonitorDecision::Wait);
        assert_eq!(
            decide(&v, 10_001, &timings()),
            MonitorDecision::KillSpawnTimeout
        );
    }

    #[test]
    fn test_first_activity_activates() {
        let mut v = view(Presence::Spawning);
        v.last_activity_ms = Some(2_000);
        assert_eq!(decide(&v, 5_000, &timings()), MonitorDecision::MarkActive);
    }

    #[test]
    fn test_active_goes_idle_after_gap() {
        let mut v = view(Presence::Active);
        v.last_activity_ms = Some(1_000);
        assert_eq!(decide(&v, 20_000, &timings()), MonitorDecision::Wait);
        assert_eq!(decide(&v, 31_001, &timings()), MonitorDecision::MarkIdle);
    }

    #[test]
    fn test_idle_reactivates_on_new_activity() {
        let mut v = view(Presence::Idle);
        v.last_activity_ms = Some(50_000);
        v.idle_since_ms = Some(40_000);
        assert_eq!(decide(&v, 51_000, &timings()), MonitorDecision::MarkActive);
    }

    #[test]
    fn test_done_detection_when_never_posted() {
        let mut v = view(Presence::Idle);
        v.idle_since_ms = Some(30_000);
        assert_eq!(
            decide(&v, 61_000, &timings()),
            MonitorDecision::GracefulStop
        );
    }

    #[test]
    fn test_zombie_overrides_everything() {
        let mut v = view(Presence::Active);
        v.last_activity_ms = Some(599_000);
        assert_eq!(decide(&v, 600_001, &timings()), MonitorDecision::KillZombie);
    }

    #[test]
    fn test_exited_process_wins() {
        let mut v = view(Presence::Active);
        v.process_alive = false;
        assert_eq!(decide(&v, 1_000, &timings()), MonitorDecision::Exited);
    }

    #[test]
    fn test_zero_max_runtime_disables_zombie_check() {
        let mut t = timings();
        t.max_runtime_ms = 0;
        let mut v = view(Presence::Active);
        v.last_activity_ms = Some(999_999_000);
        assert_eq!(decide(&v, 1_000_000_000, &t), MonitorDecision::Wait);
    }
}
