//! Raw JSONL fixtures for seeding shard files without going through the
//! CLI, used by multi-machine and corruption tests.

use std::path::Path;

/// A messages-stream line as another machine would have written it. The
/// mention list is whatever the writing machine extracted.
pub fn raw_message_line(
    id: &str,
    from_agent: &str,
    body: &str,
    mentions: &[&str],
    ts: i64,
    origin: &str,
    seq: u64,
) -> String {
    serde_json::json!({
        "type": "message",
        "id": id,
        "from_agent": from_agent,
        "body": body,
        "mentions": mentions,
        "kind": "agent",
        "home": "room",
        "ts": ts,
        "origin": origin,
        "seq": seq,
    })
    .to_string()
}

/// An agents-stream line.
pub fn raw_agent_line(guid: &str, agent_id: &str, ts: i64, origin: &str, seq: u64) -> String {
    serde_json::json!({
        "type": "agent",
        "id": guid,
        "agent_id": agent_id,
        "registered_at": ts,
        "last_seen": ts,
        "ts": ts,
        "origin": origin,
        "seq": seq,
    })
    .to_string()
}

/// Write a stream file under `machines/<origin>/` from raw lines.
pub fn write_shard_file(shared_dir: &Path, origin: &str, stream: &str, lines: &[String]) {
    let dir = shared_dir.join("machines").join(origin);
    std::fs::create_dir_all(&dir).expect("create shard dir");
    let mut content = lines.join("\n");
    content.push('\n');
    std::fs::write(dir.join(format!("{}.jsonl", stream)), content).expect("write shard file");
}
