use fray_types::{Agent, IdKind, InvokeConfig, PromptDelivery, new_id};
use std::io::Write;
use std::process::{Child, Command, Stdio};

use crate::error::{Error, Result};

/// A spawned agent process: pid, driver-scoped session id, and the handle
/// used to poll and terminate it.
pub struct ProcessHandle {
    pub pid: u32,
    pub session_id: String,
    child: Child,
    /// Temp file holding the prompt for `tempfile` delivery; removed when
    /// the handle drops.
    _prompt_file: Option<tempfile::NamedTempFile>,
}

impl Drop for ProcessHandle {
    fn drop(&mut self) {
        let _ = self.child.kill();
    }
}

/// Control surface over a spawned agent process. The monitor only needs
/// liveness and termination; everything else stays driver-private.
pub trait AgentProcess: Send {
    fn pid(&self) -> u32;
    fn session_id(&self) -> &str;
    fn is_running(&mut self) -> bool;
    fn kill(&mut self);
}

impl AgentProcess for ProcessHandle {
    fn pid(&self) -> u32 {
        self.pid
    }

    fn session_id(&self) -> &str {
        &self.session_id
    }

    fn is_running(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    fn kill(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// Something that can spawn an agent process from a prompt. The concrete
/// drivers shell out; tests install a fake.
pub trait Spawner {
    fn spawn(&self, agent: &Agent, prompt: &str) -> Result<Box<dyn AgentProcess>>;
}

/// An invoke driver: a known external agent CLI plus the policy for how the
/// prompt reaches it. Adding a driver means adding a variant here, not a
/// subclass anywhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Driver {
    Claude,
    Codex,
    Opencode,
}

impl Driver {
    pub fn from_name(name: &str) -> Result<Driver> {
        match name {
            "claude" => Ok(Driver::Claude),
            "codex" => Ok(Driver::Codex),
            "opencode" => Ok(Driver::Opencode),
            other => Err(Error::Supervision(format!("unknown driver '{}'", other))),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Driver::Claude => "claude",
            Driver::Codex => "codex",
            Driver::Opencode => "opencode",
        }
    }

    /// Prompt delivery when the agent's invoke config does not override it.
    pub fn default_delivery(&self) -> PromptDelivery {
        match self {
            Driver::Claude => PromptDelivery::Stdin,
            Driver::Codex => PromptDelivery::Args,
            Driver::Opencode => PromptDelivery::Tempfile,
        }
    }

    fn base_args(&self) -> &'static [&'static str] {
        match self {
            Driver::Claude => &["-p"],
            Driver::Codex => &["exec"],
            Driver::Opencode => &["run"],
        }
    }
}

impl Spawner for Driver {
    fn spawn(&self, agent: &Agent, prompt: &str) -> Result<Box<dyn AgentProcess>> {
        let invoke = agent.invoke.clone().unwrap_or_else(|| InvokeConfig::new(self.name()));
        let delivery = invoke.prompt_delivery.unwrap_or_else(|| self.default_delivery());

        let mut command = Command::new(self.name());
        command.args(self.base_args());
        if let Some(model) = &invoke.model {
            command.arg("--model").arg(model);
        }
        command.env("FRAY_AGENT_ID", &agent.agent_id);
        command.stdout(Stdio::piped());
        command.stderr(Stdio::piped());

        let mut prompt_file = None;
        match delivery {
            PromptDelivery::Args => {
                command.arg(prompt);
                command.stdin(Stdio::null());
            }
            PromptDelivery::Stdin => {
                command.stdin(Stdio::piped());
            }
            PromptDelivery::Tempfile => {
                let mut file = tempfile::NamedTempFile::new()
                    .map_err(|e| Error::Supervision(format!("prompt tempfile: {}", e)))?;
                file.write_all(prompt.as_bytes())
                    .map_err(|e| Error::Supervision(format!("prompt tempfile: {}", e)))?;
                file.flush()
                    .map_err(|e| Error::Supervision(format!("prompt tempfile: {}", e)))?;
                command.arg(file.path());
                command.stdin(Stdio::null());
                prompt_file = Some(file);
            }
        }

        let mut child = command.spawn().map_err(|e| {
            Error::Supervision(format!("failed to spawn {} for {}: {}", self.name(), agent.agent_id, e))
        })?;

        if delivery == PromptDelivery::Stdin
            && let Some(mut stdin) = child.stdin.take()
        {
            stdin
                .write_all(prompt.as_bytes())
                .map_err(|e| Error::Supervision(format!("writing prompt: {}", e)))?;
            // Dropping closes the pipe so the driver sees EOF
        }

        drain_to_discard(&mut child);

        Ok(Box::new(ProcessHandle {
            pid: child.id(),
            session_id: new_id(IdKind::Session),
            child,
            _prompt_file: prompt_file,
        }))
    }
}

/// Detach reader threads for stdout/stderr so the child never blocks on a
/// full pipe. Output is discarded; the logs the supervisor cares about are
/// the agent's posts, not its terminal chatter.
fn drain_to_discard(child: &mut Child) {
    use std::io::Read;

    if let Some(mut stdout) = child.stdout.take() {
        std::thread::spawn(move || {
            let mut sink = [0u8; 8192];
            while let Ok(n) = stdout.read(&mut sink) {
                if n == 0 {
                    break;
                }
            }
        });
    }
    if let Some(mut stderr) = child.stderr.take() {
        std::thread::spawn(move || {
            let mut sink = [0u8; 8192];
            while let Ok(n) = stderr.read(&mut sink) {
                if n == 0 {
                    break;
                }
            }
        });
    }
}

/// Emit key=value lines for the spawning LLM host when it asked for them
/// via `CLAUDE_ENV_FILE`.
pub fn emit_env_file(agent_id: &str) -> Result<()> {
    if let Ok(path) = std::env::var("CLAUDE_ENV_FILE")
        && !path.is_empty()
    {
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)?;
        writeln!(file, "FRAY_AGENT_ID={}", agent_id)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_driver_names_round_trip() {
        for driver in [Driver::Claude, Driver::Codex, Driver::Opencode] {
            assert_eq!(Driver::from_name(driver.name()).unwrap(), driver);
        }
        assert!(Driver::from_name("mystery").is_err());
    }

    #[test]
    fn test_default_deliveries() {
        assert_eq!(Driver::Claude.default_delivery(), PromptDelivery::Stdin);
        assert_eq!(Driver::Codex.default_delivery(), PromptDelivery::Args);
        assert_eq!(Driver::Opencode.default_delivery(), PromptDelivery::Tempfile);
    }
}
