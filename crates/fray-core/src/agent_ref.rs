use std::fmt;

/// A parsed agent reference: `name`, `@name`, `name.variant`, `name@host`,
/// or `name.variant@host`. The base name is the identity used for mention
/// matching and the self-filter; variant and host qualify where the agent
/// runs.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AgentRef {
    pub name: String,
    pub variant: Option<String>,
    pub host: Option<String>,
}

impl AgentRef {
    /// Parse a user-typed reference. Leading `@` is stripped. Empty name
    /// segments are rejected.
    pub fn parse(token: &str) -> Option<AgentRef> {
        let token = token.strip_prefix('@').unwrap_or(token);
        if token.is_empty() {
            return None;
        }

        let (name_part, host) = match token.split_once('@') {
            Some((n, h)) => {
                if h.is_empty() {
                    return None;
                }
                (n, Some(h.to_string()))
            }
            None => (token, None),
        };

        let (name, variant) = match name_part.split_once('.') {
            Some((n, v)) => {
                if v.is_empty() {
                    return None;
                }
                (n, Some(v.to_string()))
            }
            None => (name_part, None),
        };

        if name.is_empty() || !name.chars().all(valid_name_char) {
            return None;
        }

        Some(AgentRef {
            name: name.to_string(),
            variant,
            host,
        })
    }

    /// The base identity: name without variant or host qualifiers.
    pub fn base(&self) -> &str {
        &self.name
    }

    /// `name.variant` when a variant is present, plain name otherwise.
    pub fn qualified(&self) -> String {
        match &self.variant {
            Some(v) => format!("{}.{}", self.name, v),
            None => self.name.clone(),
        }
    }

    /// Whether two references share a base name (the self-mention test).
    pub fn same_base(&self, other: &AgentRef) -> bool {
        self.name == other.name
    }
}

/// Base name of any agent-id string, tolerating variant/host suffixes.
pub fn base_of(agent_id: &str) -> &str {
    let agent_id = agent_id.strip_prefix('@').unwrap_or(agent_id);
    let without_host = agent_id.split('@').next().unwrap_or(agent_id);
    without_host.split('.').next().unwrap_or(without_host)
}

fn valid_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

impl fmt::Display for AgentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        if let Some(v) = &self.variant {
            write!(f, ".{}", v)?;
        }
        if let Some(h) = &self.host {
            write!(f, "@{}", h)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bare_name() {
        let r = AgentRef::parse("alice").unwrap();
        assert_eq!(r.name, "alice");
        assert_eq!(r.variant, None);
        assert_eq!(r.host, None);
    }

    #[test]
    fn test_parse_at_prefixed() {
        let r = AgentRef::parse("@alice").unwrap();
        assert_eq!(r.name, "alice");
    }

    #[test]
    fn test_parse_variant_and_host() {
        let r = AgentRef::parse("opus.notes@laptop").unwrap();
        assert_eq!(r.name, "opus");
        assert_eq!(r.variant, Some("notes".to_string()));
        assert_eq!(r.host, Some("laptop".to_string()));
        assert_eq!(r.qualified(), "opus.notes");
        assert_eq!(r.to_string(), "opus.notes@laptop");
    }

    #[test]
    fn test_parse_rejects_empty_segments() {
        assert!(AgentRef::parse("").is_none());
        assert!(AgentRef::parse("@").is_none());
        assert!(AgentRef::parse("alice@").is_none());
        assert!(AgentRef::parse("alice.").is_none());
        assert!(AgentRef::parse(".notes").is_none());
    }

    #[test]
    fn test_base_of() {
        assert_eq!(base_of("opus.notes@laptop"), "opus");
        assert_eq!(base_of("@bob"), "bob");
        assert_eq!(base_of("carol"), "carol");
    }

    #[test]
    fn test_same_base_across_variants() {
        let a = AgentRef::parse("opus.notes").unwrap();
        let b = AgentRef::parse("opus@desktop").unwrap();
        assert!(a.same_base(&b));
    }
}
