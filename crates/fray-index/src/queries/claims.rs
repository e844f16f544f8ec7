use fray_types::{Claim, ClaimType};
use rusqlite::{Connection, OptionalExtension, Row, params};

use crate::error::Result;

fn from_row(row: &Row) -> rusqlite::Result<Claim> {
    let claim_type: String = row.get(0)?;
    Ok(Claim {
        claim_type: ClaimType::parse(&claim_type).unwrap_or(ClaimType::File),
        pattern: row.get(1)?,
        agent_id: row.get(2)?,
        claimed_at: row.get(3)?,
    })
}

pub fn get(conn: &Connection, claim_type: ClaimType, pattern: &str) -> Result<Option<Claim>> {
    let result = conn
        .query_row(
            "SELECT claim_type, pattern, agent_id, claimed_at FROM claims
             WHERE claim_type = ?1 AND pattern = ?2",
            params![claim_type.as_str(), pattern],
            from_row,
        )
        .optional()?;
    Ok(result)
}

/// Insert or overwrite the holder. Uniqueness per (type, pattern) comes from
/// the primary key; the conflict rules live in the op layer.
pub fn upsert(conn: &Connection, claim: &Claim) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO claims (claim_type, pattern, agent_id, claimed_at)
        VALUES (?1, ?2, ?3, ?4)
        ON CONFLICT(claim_type, pattern) DO UPDATE SET
            agent_id = ?3,
            claimed_at = ?4
        "#,
        params![
            claim.claim_type.as_str(),
            &claim.pattern,
            &claim.agent_id,
            claim.claimed_at
        ],
    )?;
    Ok(())
}

pub fn remove(conn: &Connection, claim_type: ClaimType, pattern: &str) -> Result<()> {
    conn.execute(
        "DELETE FROM claims WHERE claim_type = ?1 AND pattern = ?2",
        params![claim_type.as_str(), pattern],
    )?;
    Ok(())
}

/// Remove every claim held by `agent_id`, returning what was cleared.
pub fn remove_all_for(conn: &Connection, agent_id: &str) -> Result<Vec<Claim>> {
    let cleared = list_for(conn, agent_id)?;
    conn.execute("DELETE FROM claims WHERE agent_id = ?1", [agent_id])?;
    Ok(cleared)
}

pub fn list(conn: &Connection) -> Result<Vec<Claim>> {
    let mut stmt = conn.prepare(
        "SELECT claim_type, pattern, agent_id, claimed_at FROM claims ORDER BY claim_type, pattern",
    )?;
    let claims = stmt
        .query_map([], from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(claims)
}

pub fn list_for(conn: &Connection, agent_id: &str) -> Result<Vec<Claim>> {
    let mut stmt = conn.prepare(
        "SELECT claim_type, pattern, agent_id, claimed_at FROM claims
         WHERE agent_id = ?1 ORDER BY claim_type, pattern",
    )?;
    let claims = stmt
        .query_map([agent_id], from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(claims)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    fn claim(claim_type: ClaimType, pattern: &str, agent: &str) -> Claim {
        Claim {
            claim_type,
            pattern: pattern.to_string(),
            agent_id: agent.to_string(),
            claimed_at: 1,
        }
    }

    #[test]
    fn test_one_holder_per_type_pattern() {
        let db = Database::open_in_memory().unwrap();
        upsert(db.conn(), &claim(ClaimType::File, "src/*.rs", "alice")).unwrap();
        upsert(db.conn(), &claim(ClaimType::File, "src/*.rs", "bob")).unwrap();

        let all = list(db.conn()).unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].agent_id, "bob");
    }

    #[test]
    fn test_same_pattern_different_type_coexists() {
        let db = Database::open_in_memory().unwrap();
        upsert(db.conn(), &claim(ClaimType::File, "x", "alice")).unwrap();
        upsert(db.conn(), &claim(ClaimType::Issue, "x", "bob")).unwrap();

        assert_eq!(list(db.conn()).unwrap().len(), 2);
    }

    #[test]
    fn test_remove_all_for_agent() {
        let db = Database::open_in_memory().unwrap();
        upsert(db.conn(), &claim(ClaimType::File, "a", "alice")).unwrap();
        upsert(db.conn(), &claim(ClaimType::Bd, "bd-12", "alice")).unwrap();
        upsert(db.conn(), &claim(ClaimType::File, "b", "bob")).unwrap();

        let cleared = remove_all_for(db.conn(), "alice").unwrap();
        assert_eq!(cleared.len(), 2);
        assert_eq!(list(db.conn()).unwrap().len(), 1);
    }
}
