use once_cell::sync::Lazy;
use regex::Regex;

static MENTION_RE: Lazy<Regex> = Lazy::new(|| {
    // Leading boundary keeps email local-parts (user@host) out of the match
    Regex::new(r"(?:^|[^A-Za-z0-9_@])@([A-Za-z0-9][A-Za-z0-9_-]*)").expect("mention regex")
});

/// Extract raw `@name` tokens from a message body, in order, deduplicated.
/// The caller intersects these with the known-agent set; `all` is returned
/// as-is so the caller can expand it.
pub fn extract_mention_tokens(body: &str) -> Vec<String> {
    let mut seen = Vec::new();
    for capture in MENTION_RE.captures_iter(body) {
        let name = capture[1].to_string();
        if !seen.contains(&name) {
            seen.push(name);
        }
    }
    seen
}

/// Whether a body consists of a single emoji (used to reinterpret a reply as
/// a reaction). A grapheme-precise check is overkill here: one non-ASCII
/// scalar outside the alphanumeric planes, optionally followed by variation
/// selectors / skin-tone modifiers, counts.
pub fn is_single_emoji(body: &str) -> bool {
    let trimmed = body.trim();
    if trimmed.is_empty() || trimmed.len() > 16 {
        return false;
    }
    let mut chars = trimmed.chars();
    let first = match chars.next() {
        Some(c) => c,
        None => return false,
    };
    if first.is_ascii() {
        return false;
    }
    if !is_emoji_scalar(first) {
        return false;
    }
    chars.all(is_emoji_joiner)
}

fn is_emoji_scalar(c: char) -> bool {
    matches!(u32::from(c),
        0x1F000..=0x1FAFF  // misc pictographs, emoticons, symbols
        | 0x2600..=0x27BF  // dingbats, misc symbols
        | 0x2B00..=0x2BFF  // arrows/stars block (⭐ etc.)
        | 0x2190..=0x21FF)
}

fn is_emoji_joiner(c: char) -> bool {
    matches!(u32::from(c),
        0xFE0E | 0xFE0F                // variation selectors
        | 0x200D                       // zero-width joiner
        | 0x1F3FB..=0x1F3FF)           // skin tone modifiers
        || is_emoji_scalar(c)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_mentions_dedup_in_order() {
        let tokens = extract_mention_tokens("hey @bob and @alice, ping @bob again");
        assert_eq!(tokens, vec!["bob", "alice"]);
    }

    #[test]
    fn test_extract_mentions_ignores_emails() {
        let tokens = extract_mention_tokens("mail me at someone@example.com or tag @carol");
        assert_eq!(tokens, vec!["carol"]);
    }

    #[test]
    fn test_extract_all_token() {
        assert_eq!(extract_mention_tokens("@all stand up"), vec!["all"]);
    }

    #[test]
    fn test_single_emoji() {
        assert!(is_single_emoji("👍"));
        assert!(is_single_emoji("👍🏽"));
        assert!(is_single_emoji("⭐"));
        assert!(!is_single_emoji("nice 👍"));
        assert!(!is_single_emoji("ok"));
        assert!(!is_single_emoji(""));
    }
}
