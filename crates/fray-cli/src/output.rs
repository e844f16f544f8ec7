use fray_types::{Agent, Claim, Message, Question, Thread, short_prefix};
use is_terminal::IsTerminal;
use owo_colors::OwoColorize;

pub fn use_color() -> bool {
    std::io::stdout().is_terminal()
}

pub fn print_message(message: &Message, json: bool) {
    if json {
        println!("{}", serde_json::to_string(message).unwrap_or_default());
        return;
    }

    let prefix = format!("#{}", short_prefix(&message.guid));
    let header = format!("{} [{}]", prefix, message.from_agent);
    if use_color() {
        println!("{} {}", header.dimmed(), message.body);
    } else {
        println!("{} {}", header, message.body);
    }
}

pub fn print_messages(messages: &[Message], json: bool) {
    if json {
        println!("{}", serde_json::to_string(messages).unwrap_or_default());
        return;
    }
    for message in messages {
        print_message(message, false);
    }
}

pub fn print_agent(agent: &Agent, json: bool) {
    if json {
        println!("{}", serde_json::to_string(agent).unwrap_or_default());
        return;
    }

    let presence = agent.presence.as_str();
    let left = if agent.left_at.is_some() { " (left)" } else { "" };
    let managed = if agent.managed { " [managed]" } else { "" };
    if use_color() {
        println!(
            "{}{}{} — {}{}",
            agent.agent_id.bold(),
            managed,
            left,
            presence,
            agent
                .goal
                .as_deref()
                .map(|g| format!(" — {}", g))
                .unwrap_or_default()
        );
    } else {
        println!(
            "{}{}{} — {}{}",
            agent.agent_id,
            managed,
            left,
            presence,
            agent
                .goal
                .as_deref()
                .map(|g| format!(" — {}", g))
                .unwrap_or_default()
        );
    }
}

pub fn print_thread(thread: &Thread, json: bool) {
    if json {
        println!("{}", serde_json::to_string(thread).unwrap_or_default());
        return;
    }
    println!(
        "{} {} [{}]{}",
        short_prefix(&thread.guid),
        thread.name,
        thread.status.as_str(),
        thread
            .kind
            .as_deref()
            .map(|k| format!(" ({})", k))
            .unwrap_or_default()
    );
}

pub fn print_question(question: &Question, json: bool) {
    if json {
        println!("{}", serde_json::to_string(question).unwrap_or_default());
        return;
    }
    println!(
        "{} [{}] {} (from {}{})",
        short_prefix(&question.guid),
        question.status.as_str(),
        question.re,
        question.from_agent,
        question
            .to_agent
            .as_deref()
            .map(|t| format!(" to {}", t))
            .unwrap_or_default()
    );
}

pub fn print_claim(claim: &Claim, json: bool) {
    if json {
        println!("{}", serde_json::to_string(claim).unwrap_or_default());
        return;
    }
    println!(
        "{}:{} held by {}",
        claim.claim_type.as_str(),
        claim.pattern,
        claim.agent_id
    );
}

pub fn print_ok(message: &str, json: bool) {
    if json {
        println!(r#"{{"ok":true,"message":{}}}"#, serde_json::json!(message));
    } else {
        println!("{}", message);
    }
}
