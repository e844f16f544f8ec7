use fray_engine::{Channel, ops};
use fray_index::queries;
use fray_runtime::supervise::{AgentProcess, Spawner};
use fray_types::{ClaimType, InvokeConfig, PromptDelivery};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::args::{
    AgentCommand, Cli, Commands, DeliveryName, SuperviseCommand, SyncCommand, ThreadCommand,
};
use crate::output;

// Exit codes: 0 ok, 1 user error, 2 conflict, 3 io/cache, 4 supervision.
const EXIT_OK: i32 = 0;
const EXIT_USER: i32 = 1;
const EXIT_CONFLICT: i32 = 2;
const EXIT_IO: i32 = 3;
const EXIT_SUPERVISION: i32 = 4;

enum CliError {
    Engine(fray_engine::Error),
    Runtime(fray_runtime::Error),
}

impl CliError {
    fn exit_code(&self) -> i32 {
        match self {
            CliError::Engine(err) => match err {
                fray_engine::Error::NotFound(_)
                | fray_engine::Error::Ambiguous(_)
                | fray_engine::Error::InvalidInput(_) => EXIT_USER,
                fray_engine::Error::Conflict(_) => EXIT_CONFLICT,
                // A missing channel is the user's mistake, not an IO fault
                fray_engine::Error::Project(fray_core::Error::NoProject(_)) => EXIT_USER,
                fray_engine::Error::Store(_)
                | fray_engine::Error::Index(_)
                | fray_engine::Error::Project(_)
                | fray_engine::Error::Io(_) => EXIT_IO,
            },
            CliError::Runtime(err) => match err {
                fray_runtime::Error::Engine(inner) => CliError::kind_of_engine(inner),
                fray_runtime::Error::Supervision(_) => EXIT_SUPERVISION,
                fray_runtime::Error::Config(_) | fray_runtime::Error::Sync(_) => EXIT_USER,
                fray_runtime::Error::Network(_)
                | fray_runtime::Error::Store(_)
                | fray_runtime::Error::Io(_) => EXIT_IO,
            },
        }
    }

    fn kind_of_engine(err: &fray_engine::Error) -> i32 {
        match err {
            fray_engine::Error::NotFound(_)
            | fray_engine::Error::Ambiguous(_)
            | fray_engine::Error::InvalidInput(_) => EXIT_USER,
            fray_engine::Error::Conflict(_) => EXIT_CONFLICT,
            _ => EXIT_IO,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            CliError::Engine(err) => match err {
                fray_engine::Error::NotFound(_) => "not_found",
                fray_engine::Error::Ambiguous(_) => "ambiguous",
                fray_engine::Error::InvalidInput(_) => "invalid_input",
                fray_engine::Error::Conflict(_) => "conflict",
                fray_engine::Error::Project(fray_core::Error::NoProject(_)) => "not_found",
                _ => "io",
            },
            CliError::Runtime(err) => match err {
                fray_runtime::Error::Supervision(_) => "supervision",
                fray_runtime::Error::Network(_) => "network",
                fray_runtime::Error::Sync(_) | fray_runtime::Error::Config(_) => "invalid_input",
                fray_runtime::Error::Engine(_) => "engine",
                _ => "io",
            },
        }
    }
}

impl std::fmt::Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CliError::Engine(err) => write!(f, "{}", err),
            CliError::Runtime(err) => write!(f, "{}", err),
        }
    }
}

impl From<fray_engine::Error> for CliError {
    fn from(err: fray_engine::Error) -> Self {
        CliError::Engine(err)
    }
}

impl From<fray_runtime::Error> for CliError {
    fn from(err: fray_runtime::Error) -> Self {
        CliError::Runtime(err)
    }
}

impl From<fray_index::Error> for CliError {
    fn from(err: fray_index::Error) -> Self {
        CliError::Engine(fray_engine::Error::Index(err))
    }
}

impl From<fray_store::Error> for CliError {
    fn from(err: fray_store::Error) -> Self {
        CliError::Engine(fray_engine::Error::Store(err))
    }
}

/// Dispatch a parsed invocation, printing output and errors; returns the
/// process exit code.
pub fn run(cli: Cli) -> i32 {
    let json = cli.wants_json();
    match dispatch(&cli) {
        Ok(()) => EXIT_OK,
        Err(err) => {
            if json {
                eprintln!(
                    r#"{{"error":{},"kind":"{}"}}"#,
                    serde_json::json!(err.to_string()),
                    err.kind()
                );
            } else {
                eprintln!("Error: {}", err);
            }
            err.exit_code()
        }
    }
}

fn open_channel() -> Result<Channel, CliError> {
    Ok(Channel::open(Path::new("."))?)
}

fn caller(channel: &Channel, explicit: Option<&str>) -> Result<(String, bool), CliError> {
    let as_agent = Channel::caller_is_agent(explicit);
    let id = channel.resolve_caller(explicit)?;
    Ok((id, as_agent))
}

fn dispatch(cli: &Cli) -> Result<(), CliError> {
    let json = cli.wants_json();

    match &cli.command {
        Commands::New { name } => {
            let cwd = std::env::current_dir().map_err(fray_engine::Error::Io)?;
            let channel_name = match name {
                Some(name) => name.clone(),
                None => cwd
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_else(|| "channel".to_string()),
            };
            let channel = Channel::init(&cwd, &channel_name)?;
            output::print_ok(
                &format!(
                    "created channel '{}' ({})",
                    channel.config().channel_name,
                    channel.config().channel_id
                ),
                json,
            );
            Ok(())
        }

        Commands::Join { agent_id, goal, bio } => {
            let mut channel = open_channel()?;
            let agent = ops::agent::join(
                &mut channel,
                ops::agent::JoinParams {
                    agent_id: agent_id.clone(),
                    goal: goal.clone(),
                    bio: bio.clone(),
                    managed: false,
                    invoke: None,
                    avatar: None,
                },
            )?;
            output::print_agent(&agent, json);
            Ok(())
        }

        Commands::Agent(command) => run_agent(command, json),

        Commands::Post {
            body,
            as_agent,
            thread,
            reply_to,
            quote,
            answer,
        } => {
            let mut channel = open_channel()?;
            let (from_agent, is_agent) = caller(&channel, as_agent.as_deref())?;
            let outcome = ops::message::post(
                &mut channel,
                ops::message::PostParams {
                    from_agent,
                    body: body.clone(),
                    as_agent: is_agent,
                    thread_token: thread.clone(),
                    reply_to_token: reply_to.clone(),
                    quote_token: quote.clone(),
                    answer_token: answer.clone(),
                },
            )?;
            match outcome {
                ops::message::PostOutcome::Posted(message) => {
                    output::print_message(&message, json)
                }
                ops::message::PostOutcome::Reacted(reaction) => output::print_ok(
                    &format!(
                        "reacted {} to #{}",
                        reaction.reaction,
                        fray_types::short_prefix(&reaction.message_guid)
                    ),
                    json,
                ),
            }
            Ok(())
        }

        Commands::Edit {
            token,
            body,
            as_agent,
            reason,
        } => {
            let mut channel = open_channel()?;
            let (from_agent, _) = caller(&channel, as_agent.as_deref())?;
            let message = ops::message::edit(
                &mut channel,
                ops::message::EditParams {
                    token: token.clone(),
                    new_body: body.clone(),
                    reason: reason.clone(),
                    from_agent,
                },
            )?;
            output::print_message(&message, json);
            Ok(())
        }

        Commands::React {
            token,
            emoji,
            as_agent,
        } => {
            let mut channel = open_channel()?;
            let (from_agent, _) = caller(&channel, as_agent.as_deref())?;
            let reaction = ops::message::react(&mut channel, &from_agent, token, emoji)?;
            output::print_ok(
                &format!(
                    "reacted {} to #{}",
                    reaction.reaction,
                    fray_types::short_prefix(&reaction.message_guid)
                ),
                json,
            );
            Ok(())
        }

        Commands::Surface { token, as_agent } => {
            let mut channel = open_channel()?;
            let (from_agent, _) = caller(&channel, as_agent.as_deref())?;
            let message = ops::message::surface(&mut channel, &from_agent, token)?;
            output::print_message(&message, json);
            Ok(())
        }

        Commands::Get { token, as_agent } => {
            if token == "notifs" {
                return run_notifs(as_agent.as_deref(), json);
            }
            let channel = open_channel()?;
            let message = ops::message::get(&channel, token)?;
            output::print_message(&message, json);
            Ok(())
        }

        Commands::Notifs { as_agent } => run_notifs(as_agent.as_deref(), json),

        Commands::Read { as_agent } => {
            let mut channel = open_channel()?;
            let (agent_id, _) = caller(&channel, as_agent.as_deref())?;
            let unread = fray_engine::take_unread_mentions(&mut channel, &agent_id)?;
            output::print_ok(
                &format!("marked {} mention(s) read", unread.messages.len()),
                json,
            );
            Ok(())
        }

        Commands::Thread(command) => run_thread(command, json),

        Commands::Ask {
            text,
            as_agent,
            to,
            thread,
        } => {
            let mut channel = open_channel()?;
            let (from_agent, _) = caller(&channel, as_agent.as_deref())?;
            let question = ops::question::ask(
                &mut channel,
                ops::question::AskParams {
                    text: text.clone(),
                    from_agent,
                    to_agent: to.clone(),
                    thread_token: thread.clone(),
                    options: vec![],
                },
            )?;
            output::print_question(&question, json);
            Ok(())
        }

        Commands::Answer {
            question,
            body,
            as_agent,
        } => {
            let mut channel = open_channel()?;
            let (from_agent, is_agent) = caller(&channel, as_agent.as_deref())?;
            let target = ops::question::get(&channel, question)?;
            let outcome = ops::message::post(
                &mut channel,
                ops::message::PostParams {
                    from_agent,
                    body: body.clone(),
                    as_agent: is_agent,
                    thread_token: target.thread.clone(),
                    reply_to_token: target.asked_in.clone(),
                    quote_token: None,
                    answer_token: Some(target.guid.clone()),
                },
            )?;
            if let ops::message::PostOutcome::Posted(message) = outcome {
                output::print_message(&message, json);
            }
            let question = ops::question::get(&channel, &target.guid)?;
            output::print_question(&question, json);
            Ok(())
        }

        Commands::Close { question, .. } => {
            let mut channel = open_channel()?;
            let closed = ops::question::close(&mut channel, question)?;
            output::print_question(&closed, json);
            Ok(())
        }

        Commands::Questions { status } => {
            let channel = open_channel()?;
            let status = match status.as_deref() {
                Some(raw) => Some(fray_types::QuestionStatus::parse(raw).ok_or_else(|| {
                    fray_engine::Error::InvalidInput(format!("unknown question status: {}", raw))
                })?),
                None => None,
            };
            for question in ops::question::list(&channel, status)? {
                output::print_question(&question, json);
            }
            Ok(())
        }

        Commands::Archive { token, .. } => {
            let mut channel = open_channel()?;
            let message = ops::message::archive(&mut channel, token)?;
            output::print_message(&message, json);
            Ok(())
        }

        Commands::Claim {
            pattern,
            as_agent,
            file: _,
            bd,
            issue,
            force,
        } => {
            let mut channel = open_channel()?;
            let (agent_id, _) = caller(&channel, as_agent.as_deref())?;
            let claim_type = if *bd {
                ClaimType::Bd
            } else if *issue {
                ClaimType::Issue
            } else {
                ClaimType::File
            };
            let claim = ops::claim::claim(&mut channel, &agent_id, claim_type, pattern, *force)?;
            output::print_claim(&claim, json);
            Ok(())
        }

        Commands::Claims => {
            let channel = open_channel()?;
            for claim in ops::claim::list(&channel)? {
                output::print_claim(&claim, json);
            }
            Ok(())
        }

        Commands::Clear {
            as_agent,
            file,
            bd,
            issue,
        } => {
            let mut channel = open_channel()?;
            let (agent_id, _) = caller(&channel, as_agent.as_deref())?;
            let target = if let Some(pattern) = file {
                Some((ClaimType::File, pattern.as_str()))
            } else if let Some(pattern) = bd {
                Some((ClaimType::Bd, pattern.as_str()))
            } else {
                issue.as_ref().map(|pattern| (ClaimType::Issue, pattern.as_str()))
            };
            let cleared = ops::claim::clear(&mut channel, &agent_id, target)?;
            output::print_ok(&format!("cleared {} claim(s)", cleared.len()), json);
            Ok(())
        }

        Commands::Rebuild => {
            let mut channel = open_channel()?;
            let mut summary = String::new();
            channel.rebuild(|progress| {
                if let fray_engine::RebuildProgress::Completed {
                    applied,
                    collisions,
                    skipped_lines,
                } = progress
                {
                    summary = format!(
                        "rebuilt: {} records applied, {} collisions, {} bad lines",
                        applied, collisions, skipped_lines
                    );
                }
            })?;
            output::print_ok(&summary, json);
            Ok(())
        }

        Commands::Doctor => run_doctor(json),

        Commands::Migrate { multi_machine } => {
            if !multi_machine {
                return Err(CliError::Engine(fray_engine::Error::InvalidInput(
                    "nothing to migrate (did you mean --multi-machine?)".to_string(),
                )));
            }
            let channel = open_channel()?;
            let shared = channel.store().shared_dir().to_path_buf();
            let local = channel.store().local_dir().to_path_buf();
            drop(channel);

            let report = fray_store::migrate_to_multi_machine(&shared, &local)?;
            output::print_ok(
                &format!(
                    "migrated to multi-machine layout as {} ({} streams moved)",
                    report.machine_id,
                    report.moved_streams.len()
                ),
                json,
            );
            Ok(())
        }

        Commands::Supervise(command) => run_supervise(command, json),

        Commands::Sync(command) => run_sync(command, json),
    }
}

fn run_notifs(as_agent: Option<&str>, json: bool) -> Result<(), CliError> {
    let mut channel = open_channel()?;
    let (agent_id, _) = caller(&channel, as_agent)?;
    let unread = fray_engine::take_unread_mentions(&mut channel, &agent_id)?;
    output::print_messages(&unread.messages, json);
    Ok(())
}

fn run_agent(command: &AgentCommand, json: bool) -> Result<(), CliError> {
    match command {
        AgentCommand::Create {
            agent_id,
            driver,
            model,
            goal,
            prompt_delivery,
            spawn_timeout_ms,
            idle_after_ms,
            min_checkin_ms,
            max_runtime_ms,
        } => {
            let mut channel = open_channel()?;
            let mut invoke = InvokeConfig::new(driver.to_string());
            invoke.model = model.clone();
            invoke.prompt_delivery = prompt_delivery.map(|d| match d {
                DeliveryName::Args => PromptDelivery::Args,
                DeliveryName::Stdin => PromptDelivery::Stdin,
                DeliveryName::Tempfile => PromptDelivery::Tempfile,
            });
            invoke.spawn_timeout_ms = *spawn_timeout_ms;
            invoke.idle_after_ms = *idle_after_ms;
            invoke.min_checkin_ms = *min_checkin_ms;
            invoke.max_runtime_ms = *max_runtime_ms;

            let agent = ops::agent::join(
                &mut channel,
                ops::agent::JoinParams {
                    agent_id: agent_id.clone(),
                    goal: goal.clone(),
                    bio: None,
                    managed: true,
                    invoke: Some(invoke),
                    avatar: None,
                },
            )?;
            output::print_agent(&agent, json);
            Ok(())
        }

        AgentCommand::Update {
            token,
            goal,
            bio,
            status,
            clear_goal,
        } => {
            let mut channel = open_channel()?;
            let agent = ops::agent::update(
                &mut channel,
                token,
                ops::agent::AgentUpdateParams {
                    goal: if *clear_goal {
                        Some(None)
                    } else {
                        goal.clone().map(Some)
                    },
                    bio: bio.clone().map(Some),
                    status: status.clone().map(Some),
                    ..ops::agent::AgentUpdateParams::default()
                },
            )?;
            output::print_agent(&agent, json);
            Ok(())
        }

        AgentCommand::Leave { token } => {
            let mut channel = open_channel()?;
            let agent = ops::agent::leave(&mut channel, token)?;
            output::print_agent(&agent, json);
            Ok(())
        }

        AgentCommand::List => {
            let channel = open_channel()?;
            for agent in ops::agent::list(&channel)? {
                output::print_agent(&agent, json);
            }
            Ok(())
        }
    }
}

fn run_thread(command: &ThreadCommand, json: bool) -> Result<(), CliError> {
    match command {
        ThreadCommand::New { name, parent, kind } => {
            let mut channel = open_channel()?;
            let thread =
                ops::thread::create(&mut channel, name, parent.as_deref(), kind.as_deref())?;
            output::print_thread(&thread, json);
            Ok(())
        }
        ThreadCommand::Move { token, parent } => {
            let mut channel = open_channel()?;
            let thread = ops::thread::move_thread(&mut channel, token, parent.as_deref())?;
            output::print_thread(&thread, json);
            Ok(())
        }
        ThreadCommand::Archive { token } => {
            let mut channel = open_channel()?;
            let thread = ops::thread::archive(&mut channel, token)?;
            output::print_thread(&thread, json);
            Ok(())
        }
        ThreadCommand::Rename { token, name } => {
            let mut channel = open_channel()?;
            let thread = ops::thread::rename(&mut channel, token, name)?;
            output::print_thread(&thread, json);
            Ok(())
        }
        ThreadCommand::List => {
            let channel = open_channel()?;
            for thread in ops::thread::list(&channel)? {
                output::print_thread(&thread, json);
            }
            Ok(())
        }
        ThreadCommand::Subscribe { token, as_agent } => {
            with_agent(token, as_agent.as_deref(), json, ops::thread::subscribe)
        }
        ThreadCommand::Unsubscribe { token, as_agent } => {
            with_agent(token, as_agent.as_deref(), json, ops::thread::unsubscribe)
        }
        ThreadCommand::Mute { token, as_agent } => {
            with_agent(token, as_agent.as_deref(), json, ops::thread::mute)
        }
        ThreadCommand::Unmute { token, as_agent } => {
            with_agent(token, as_agent.as_deref(), json, ops::thread::unmute)
        }
        ThreadCommand::Add {
            token,
            message,
            as_agent,
        } => with_agent_message(token, message, as_agent.as_deref(), json, ops::thread::add_message),
        ThreadCommand::Remove {
            token,
            message,
            as_agent,
        } => with_agent_message(
            token,
            message,
            as_agent.as_deref(),
            json,
            ops::thread::remove_message,
        ),
        ThreadCommand::Pin {
            token,
            message,
            as_agent,
        } => with_agent_message(token, message, as_agent.as_deref(), json, ops::thread::pin),
        ThreadCommand::Unpin {
            token,
            message,
            as_agent,
        } => with_agent_message(token, message, as_agent.as_deref(), json, ops::thread::unpin),
    }
}

fn with_agent(
    token: &str,
    as_agent: Option<&str>,
    json: bool,
    op: fn(&mut Channel, &str, &str) -> fray_engine::Result<()>,
) -> Result<(), CliError> {
    let mut channel = open_channel()?;
    let (agent_id, _) = caller(&channel, as_agent)?;
    op(&mut channel, token, &agent_id)?;
    output::print_ok("ok", json);
    Ok(())
}

fn with_agent_message(
    token: &str,
    message: &str,
    as_agent: Option<&str>,
    json: bool,
    op: fn(&mut Channel, &str, &str, &str) -> fray_engine::Result<()>,
) -> Result<(), CliError> {
    let mut channel = open_channel()?;
    let (agent_id, _) = caller(&channel, as_agent)?;
    op(&mut channel, token, message, &agent_id)?;
    output::print_ok("ok", json);
    Ok(())
}

fn run_doctor(json: bool) -> Result<(), CliError> {
    let channel = open_channel()?;
    let (records, report) = channel.store().read_all()?;
    let collisions = queries::collisions::count(channel.db().conn())?;
    let lock_held = fray_runtime::DaemonLock::is_held(&channel.fray_dir());

    if json {
        println!(
            "{}",
            serde_json::json!({
                "records": records.len(),
                "skipped_lines": report.skipped_lines,
                "partial_tails": report.partial_tail,
                "collisions": collisions,
                "schema_version": fray_index::SCHEMA_VERSION,
                "layout": format!("{:?}", channel.store().layout()),
                "supervisor_running": lock_held,
            })
        );
    } else {
        println!("records:            {}", records.len());
        println!("bad lines skipped:  {}", report.skipped_lines);
        println!("torn tails seen:    {}", report.partial_tail);
        println!("guid collisions:    {}", collisions);
        println!("schema version:     {}", fray_index::SCHEMA_VERSION);
        println!("layout:             {:?}", channel.store().layout());
        println!("supervisor running: {}", lock_held);
    }
    Ok(())
}

fn run_supervise(command: &SuperviseCommand, json: bool) -> Result<(), CliError> {
    match command {
        SuperviseCommand::Check => {
            let mut channel = open_channel()?;
            let outcome = fray_runtime::check(&mut channel, driver_spawner())?;
            match outcome {
                fray_runtime::CheckOutcome::SupervisorRunning => {
                    output::print_ok("supervisor already running; nothing to do", json)
                }
                fray_runtime::CheckOutcome::Ran { spawned } => {
                    output::print_ok(&format!("spawned {} agent(s)", spawned), json)
                }
            }
            Ok(())
        }
        SuperviseCommand::Run => {
            let mut channel = open_channel()?;
            let cancel = Arc::new(AtomicBool::new(false));
            let handler_flag = cancel.clone();
            ctrlc::set_handler(move || {
                handler_flag.store(true, Ordering::Relaxed);
            })
            .map_err(|e| fray_runtime::Error::Supervision(format!("signal handler: {}", e)))?;

            fray_runtime::run(&mut channel, driver_spawner(), &cancel, |event| {
                print_supervise_event(&event, json);
            })?;
            Ok(())
        }
    }
}

/// Spawner that picks the driver from each agent's invoke config.
struct InvokeDriverSpawner;

impl Spawner for InvokeDriverSpawner {
    fn spawn(
        &self,
        agent: &fray_types::Agent,
        prompt: &str,
    ) -> fray_runtime::Result<Box<dyn AgentProcess>> {
        let driver_name = agent
            .invoke
            .as_ref()
            .map(|invoke| invoke.driver.clone())
            .unwrap_or_else(|| "claude".to_string());
        let driver = fray_runtime::Driver::from_name(&driver_name)?;
        driver.spawn(agent, prompt)
    }
}

fn driver_spawner() -> InvokeDriverSpawner {
    InvokeDriverSpawner
}

fn print_supervise_event(event: &fray_runtime::SuperviseEvent, json: bool) {
    use fray_runtime::SuperviseEvent;

    if json {
        let value = match event {
            SuperviseEvent::OrphanRepaired { session_id, agent_id } => serde_json::json!({
                "event": "orphan_repaired", "session_id": session_id, "agent_id": agent_id
            }),
            SuperviseEvent::Spawned { agent_id, session_id, pid } => serde_json::json!({
                "event": "spawned", "agent_id": agent_id, "session_id": session_id, "pid": pid
            }),
            SuperviseEvent::Transition { agent_id, presence } => serde_json::json!({
                "event": "transition", "agent_id": agent_id, "presence": presence.as_str()
            }),
            SuperviseEvent::Ended { agent_id, session_id, reason } => serde_json::json!({
                "event": "ended", "agent_id": agent_id, "session_id": session_id, "reason": reason
            }),
        };
        println!("{}", value);
        return;
    }

    match event {
        SuperviseEvent::OrphanRepaired { session_id, agent_id } => {
            println!("repaired orphan session {} for {}", session_id, agent_id)
        }
        SuperviseEvent::Spawned { agent_id, session_id, pid } => {
            println!("spawned {} ({} pid {})", agent_id, session_id, pid)
        }
        SuperviseEvent::Transition { agent_id, presence } => {
            println!("{} -> {}", agent_id, presence.as_str())
        }
        SuperviseEvent::Ended { agent_id, session_id, reason } => {
            println!("{} ended {} ({})", agent_id, session_id, reason)
        }
    }
}

fn run_sync(command: &SyncCommand, json: bool) -> Result<(), CliError> {
    match command {
        SyncCommand::Setup { path, cloud, hosted } => {
            let mut channel = open_channel()?;
            if let Some(url) = hosted {
                let machine_id = channel.store().machine_id().to_string();
                if machine_id.is_empty() {
                    return Err(CliError::Runtime(fray_runtime::Error::Sync(
                        "hosted sync needs the multi-machine layout; run `fray migrate --multi-machine` first"
                            .to_string(),
                    )));
                }
                let client = fray_runtime::HostedClient::new(url)?;
                let response =
                    client.register(&channel.config().channel_id, &machine_id)?;
                let state = fray_runtime::HostedState {
                    url: url.clone(),
                    machine_id: response.machine_id,
                    token: response.token,
                    ..fray_runtime::HostedState::default()
                };
                state.save(&channel.fray_dir())?;
                channel.config_mut().sync = Some(fray_engine::SyncConfig::Hosted {
                    url: url.clone(),
                });
                channel.save_config()?;
                output::print_ok("registered with hosted relay", json);
            } else if *cloud {
                let base = fray_runtime::cloud_base()?;
                fray_runtime::setup_path_backend(&mut channel, &base, true)?;
                output::print_ok(&format!("sync via {}", base.display()), json);
            } else if let Some(base) = path {
                fray_runtime::setup_path_backend(&mut channel, base, false)?;
                output::print_ok(&format!("sync via {}", base.display()), json);
            } else {
                return Err(CliError::Engine(fray_engine::Error::InvalidInput(
                    "pick a backend: --path <dir>, --cloud, or --hosted <url>".to_string(),
                )));
            }
            Ok(())
        }

        SyncCommand::Push => {
            let channel = open_channel()?;
            let mut state = hosted_state(&channel)?;
            let report = fray_runtime::push_streams(&channel, &mut state)?;
            output::print_ok(&format!("pushed {} record(s)", report.pushed), json);
            Ok(())
        }

        SyncCommand::Pull => {
            let mut channel = open_channel()?;
            let mut state = hosted_state(&channel)?;
            let report = fray_runtime::pull_streams(&channel, &mut state)?;
            // Pulled shards invalidate the cache exactly like a foreign write
            channel.rebuild(|_| {})?;
            output::print_ok(&format!("pulled {} record(s)", report.pulled), json);
            Ok(())
        }

        SyncCommand::Status => {
            let channel = open_channel()?;
            match &channel.config().sync {
                None => output::print_ok("sync not configured", json),
                Some(config) => {
                    if json {
                        println!("{}", serde_json::to_string(config).unwrap_or_default());
                    } else {
                        match config {
                            fray_engine::SyncConfig::Path { base } => {
                                println!("backend: path ({})", base.display())
                            }
                            fray_engine::SyncConfig::Cloud { base } => {
                                println!("backend: cloud ({})", base.display())
                            }
                            fray_engine::SyncConfig::Hosted { url } => {
                                println!("backend: hosted ({})", url);
                                if let Some(state) = fray_runtime::HostedState::load(
                                    &channel.fray_dir(),
                                )? {
                                    for (stream, cursor) in &state.push_cursors {
                                        println!("  pushed {}: {} lines", stream, cursor);
                                    }
                                }
                            }
                        }
                    }
                }
            }
            Ok(())
        }
    }
}

fn hosted_state(channel: &Channel) -> Result<fray_runtime::HostedState, CliError> {
    fray_runtime::HostedState::load(&channel.fray_dir())?.ok_or_else(|| {
        CliError::Runtime(fray_runtime::Error::Sync(
            "hosted sync is not configured; run `fray sync setup --hosted <url>`".to_string(),
        ))
    })
}
