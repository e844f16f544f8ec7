//! TestWorld pattern for declarative integration test setup.
//!
//! Provides a fluent interface for:
//! - Creating isolated channel directories
//! - Controlling the caller-identity environment
//! - Executing CLI commands with proper context

use assert_cmd::Command;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Builder for constructing TestWorld with fine-grained control.
///
/// Lets tests cover edge cases like running commands before `fray new`
/// or with a preset `FRAY_AGENT_ID`.
pub struct TestWorldBuilder {
    init_channel: bool,
    channel_name: String,
    env_vars: HashMap<String, String>,
}

impl TestWorldBuilder {
    pub fn new() -> Self {
        Self {
            init_channel: true,
            channel_name: "testchannel".to_string(),
            env_vars: HashMap::new(),
        }
    }

    /// Skip `fray new`, leaving a bare directory with no `.fray`.
    pub fn without_channel(mut self) -> Self {
        self.init_channel = false;
        self
    }

    pub fn channel_name(mut self, name: impl Into<String>) -> Self {
        self.channel_name = name.into();
        self
    }

    /// Set an environment variable for CLI execution.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env_vars.insert(key.into(), value.into());
        self
    }

    pub fn build(self) -> TestWorld {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let project = temp_dir.path().join("project");
        fs::create_dir_all(&project).expect("Failed to create project dir");

        let world = TestWorld {
            temp_dir,
            project,
            env_vars: self.env_vars,
        };

        if self.init_channel {
            world.fray(&["new", &self.channel_name]).assert().success();
        }
        world
    }
}

impl Default for TestWorldBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Declarative test environment: a temp project directory and a command
/// runner wired to it.
pub struct TestWorld {
    temp_dir: TempDir,
    project: PathBuf,
    env_vars: HashMap<String, String>,
}

impl TestWorld {
    pub fn builder() -> TestWorldBuilder {
        TestWorldBuilder::new()
    }

    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn project(&self) -> &Path {
        &self.project
    }

    pub fn fray_dir(&self) -> PathBuf {
        self.project.join(".fray")
    }

    pub fn temp_root(&self) -> &Path {
        self.temp_dir.path()
    }

    /// A `fray` invocation rooted in the project directory. Callers chain
    /// assert_cmd assertions on the result.
    pub fn fray(&self, args: &[&str]) -> Command {
        let mut command = Command::cargo_bin("fray").expect("fray binary");
        command.current_dir(&self.project);
        command.env_remove("FRAY_AGENT_ID");
        for (key, value) in &self.env_vars {
            command.env(key, value);
        }
        command.args(args);
        command
    }

    /// Same, but with the caller identity injected through the agent env
    /// var instead of `--as`.
    pub fn fray_as(&self, agent_id: &str, args: &[&str]) -> Command {
        let mut command = self.fray(args);
        command.env("FRAY_AGENT_ID", agent_id);
        command
    }

    /// Register an agent, panicking on failure (setup helper).
    pub fn join(&self, agent_id: &str) {
        self.fray(&["join", agent_id]).assert().success();
    }

    /// Post a room message as `agent_id`, returning stdout.
    pub fn post(&self, agent_id: &str, body: &str) -> String {
        let output = self
            .fray(&["post", body, "--as", agent_id])
            .assert()
            .success();
        String::from_utf8_lossy(&output.get_output().stdout).to_string()
    }

    pub fn assert_database_exists(&self) -> bool {
        self.fray_dir().join("fray.db").exists()
    }

    pub fn shared_dir(&self) -> PathBuf {
        self.fray_dir().join("shared")
    }
}

impl Default for TestWorld {
    fn default() -> Self {
        Self::new()
    }
}
