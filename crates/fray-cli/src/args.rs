use clap::{Parser, Subcommand, ValueEnum};
use std::fmt;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
#[value(rename_all = "lowercase")]
pub enum OutputFormat {
    Plain,
    Json,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Plain => write!(f, "plain"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
#[value(rename_all = "lowercase")]
pub enum DriverName {
    Claude,
    Codex,
    Opencode,
}

impl fmt::Display for DriverName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DriverName::Claude => write!(f, "claude"),
            DriverName::Codex => write!(f, "codex"),
            DriverName::Opencode => write!(f, "opencode"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
#[value(rename_all = "lowercase")]
pub enum DeliveryName {
    Args,
    Stdin,
    Tempfile,
}

#[derive(Debug, Parser)]
#[command(name = "fray", about = "Local-first messaging and coordination for AI agents", version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output format
    #[arg(long, global = true, default_value_t = OutputFormat::Plain)]
    pub format: OutputFormat,

    /// Shorthand for --format json
    #[arg(long, global = true)]
    pub json: bool,
}

impl Cli {
    pub fn wants_json(&self) -> bool {
        self.json || self.format == OutputFormat::Json
    }
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Create a fray channel in the current directory
    New {
        /// Channel name (defaults to the directory name)
        name: Option<String>,
    },

    /// Join the channel as a new (human or external) agent
    Join {
        agent_id: String,
        #[arg(long)]
        goal: Option<String>,
        #[arg(long)]
        bio: Option<String>,
    },

    /// Manage agents
    #[command(subcommand)]
    Agent(AgentCommand),

    /// Post a message to the room or a thread
    Post {
        body: String,
        #[arg(long = "as")]
        as_agent: Option<String>,
        #[arg(long)]
        thread: Option<String>,
        #[arg(long)]
        reply_to: Option<String>,
        #[arg(long)]
        quote: Option<String>,
        /// Mark a question answered by this message
        #[arg(long)]
        answer: Option<String>,
    },

    /// Edit a message body (agents must give a reason with -m)
    Edit {
        token: String,
        body: String,
        #[arg(long = "as")]
        as_agent: Option<String>,
        #[arg(short = 'm', long = "message")]
        reason: Option<String>,
    },

    /// React to a message with an emoji
    React {
        token: String,
        emoji: String,
        #[arg(long = "as")]
        as_agent: Option<String>,
    },

    /// Surface a message into the room
    Surface {
        token: String,
        #[arg(long = "as")]
        as_agent: Option<String>,
    },

    /// Show a message, or `get notifs` for unread mentions
    Get {
        token: String,
        #[arg(long = "as")]
        as_agent: Option<String>,
    },

    /// Unread mentions for an agent (marks them read)
    Notifs {
        #[arg(long = "as")]
        as_agent: Option<String>,
    },

    /// Mark the room read without listing anything
    Read {
        #[arg(long = "as")]
        as_agent: Option<String>,
    },

    /// Manage threads
    #[command(subcommand)]
    Thread(ThreadCommand),

    /// Ask a question
    Ask {
        text: String,
        #[arg(long = "as")]
        as_agent: Option<String>,
        #[arg(long)]
        to: Option<String>,
        #[arg(long)]
        thread: Option<String>,
    },

    /// Answer a question with a new message
    Answer {
        question: String,
        body: String,
        #[arg(long = "as")]
        as_agent: Option<String>,
    },

    /// Close a question
    Close {
        question: String,
        #[arg(long = "as")]
        as_agent: Option<String>,
    },

    /// List questions, optionally by status
    Questions {
        #[arg(long)]
        status: Option<String>,
    },

    /// Archive (tombstone) a message
    Archive {
        token: String,
        #[arg(long = "as")]
        as_agent: Option<String>,
    },

    /// Claim exclusive ownership of a work item
    Claim {
        pattern: String,
        #[arg(long = "as")]
        as_agent: Option<String>,
        #[arg(long, conflicts_with_all = ["bd", "issue"])]
        file: bool,
        #[arg(long, conflicts_with = "issue")]
        bd: bool,
        #[arg(long)]
        issue: bool,
        #[arg(long)]
        force: bool,
    },

    /// List live claims
    Claims,

    /// Clear claims (all of them, or one with --file/--bd/--issue)
    Clear {
        #[arg(long = "as")]
        as_agent: Option<String>,
        #[arg(long, value_name = "PATTERN")]
        file: Option<String>,
        #[arg(long, value_name = "PATTERN")]
        bd: Option<String>,
        #[arg(long, value_name = "PATTERN")]
        issue: Option<String>,
    },

    /// Rebuild the derived cache from the logs
    Rebuild,

    /// Report store and cache health
    Doctor,

    /// Rewrite a single-machine channel to the multi-machine layout
    Migrate {
        #[arg(long)]
        multi_machine: bool,
    },

    /// Supervise managed agents
    #[command(subcommand)]
    Supervise(SuperviseCommand),

    /// Configure and drive shared-log sync
    #[command(subcommand)]
    Sync(SyncCommand),
}

#[derive(Debug, Subcommand)]
pub enum AgentCommand {
    /// Create a managed agent with an invoke config
    Create {
        agent_id: String,
        #[arg(long, default_value_t = DriverName::Claude)]
        driver: DriverName,
        #[arg(long)]
        model: Option<String>,
        #[arg(long)]
        goal: Option<String>,
        #[arg(long)]
        prompt_delivery: Option<DeliveryName>,
        #[arg(long)]
        spawn_timeout_ms: Option<u64>,
        #[arg(long)]
        idle_after_ms: Option<u64>,
        #[arg(long)]
        min_checkin_ms: Option<u64>,
        #[arg(long)]
        max_runtime_ms: Option<u64>,
    },
    /// Update an agent's profile
    Update {
        token: String,
        #[arg(long)]
        goal: Option<String>,
        #[arg(long)]
        bio: Option<String>,
        #[arg(long)]
        status: Option<String>,
        /// Clear the goal instead of setting one
        #[arg(long, conflicts_with = "goal")]
        clear_goal: bool,
    },
    /// Mark an agent as having left the channel
    Leave { token: String },
    /// List agents
    List,
}

#[derive(Debug, Subcommand)]
pub enum ThreadCommand {
    /// Create a thread (optionally under a parent)
    New {
        name: String,
        #[arg(long)]
        parent: Option<String>,
        #[arg(long = "type")]
        kind: Option<String>,
    },
    /// Re-parent a thread (omit --parent to move to the root)
    Move {
        token: String,
        #[arg(long)]
        parent: Option<String>,
    },
    /// Archive a thread
    Archive { token: String },
    /// Rename a thread
    Rename { token: String, name: String },
    /// List threads
    List,
    /// Subscribe an agent to a thread
    Subscribe {
        token: String,
        #[arg(long = "as")]
        as_agent: Option<String>,
    },
    /// Unsubscribe an agent from a thread
    Unsubscribe {
        token: String,
        #[arg(long = "as")]
        as_agent: Option<String>,
    },
    /// Mute a thread for an agent
    Mute {
        token: String,
        #[arg(long = "as")]
        as_agent: Option<String>,
    },
    /// Unmute a thread for an agent
    Unmute {
        token: String,
        #[arg(long = "as")]
        as_agent: Option<String>,
    },
    /// Add a message to a thread's membership
    Add {
        token: String,
        message: String,
        #[arg(long = "as")]
        as_agent: Option<String>,
    },
    /// Remove a message from a thread's membership
    Remove {
        token: String,
        message: String,
        #[arg(long = "as")]
        as_agent: Option<String>,
    },
    /// Pin a message in a thread
    Pin {
        token: String,
        message: String,
        #[arg(long = "as")]
        as_agent: Option<String>,
    },
    /// Unpin a message in a thread
    Unpin {
        token: String,
        message: String,
        #[arg(long = "as")]
        as_agent: Option<String>,
    },
}

#[derive(Debug, Subcommand)]
pub enum SuperviseCommand {
    /// Run the supervisor loop until interrupted
    Run,
    /// One-shot pass: wake agents with pending mentions unless a
    /// supervisor already runs
    Check,
}

#[derive(Debug, Subcommand)]
pub enum SyncCommand {
    /// Choose a sync backend for this channel
    Setup {
        #[arg(long, conflicts_with_all = ["cloud", "hosted"])]
        path: Option<PathBuf>,
        #[arg(long, conflicts_with = "hosted")]
        cloud: bool,
        #[arg(long, value_name = "URL")]
        hosted: Option<String>,
    },
    /// Push local stream records to the hosted relay
    Push,
    /// Pull remote stream records from the hosted relay
    Pull,
    /// Show sync configuration and cursors
    Status,
}
