/// Pre-parse shim: two shortcuts users type constantly are expanded to
/// their canonical forms before clap ever sees them.
///
/// - `fray @alice …`  → `fray get notifs --as alice …`
/// - `fray msg-1234…` → `fray get msg-1234…`
///
/// Only a bare first positional triggers the rewrite; flags and known verbs
/// pass through untouched.
pub fn rewrite_args(mut args: Vec<String>) -> Vec<String> {
    if args.len() < 2 {
        return args;
    }

    let first = args[1].clone();
    if let Some(name) = first.strip_prefix('@') {
        if !name.is_empty() {
            let mut rewritten = vec![args[0].clone()];
            rewritten.push("get".to_string());
            rewritten.push("notifs".to_string());
            rewritten.push("--as".to_string());
            rewritten.push(name.to_string());
            rewritten.extend(args.drain(2..));
            return rewritten;
        }
    } else if first.starts_with("msg-") {
        let mut rewritten = vec![args[0].clone()];
        rewritten.push("get".to_string());
        rewritten.push(first);
        rewritten.extend(args.drain(2..));
        return rewritten;
    }

    args
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rewrite(input: &[&str]) -> Vec<String> {
        rewrite_args(input.iter().map(|s| s.to_string()).collect())
    }

    #[test]
    fn test_at_name_becomes_get_notifs() {
        assert_eq!(
            rewrite(&["fray", "@alice"]),
            vec!["fray", "get", "notifs", "--as", "alice"]
        );
    }

    #[test]
    fn test_message_guid_becomes_get() {
        assert_eq!(
            rewrite(&["fray", "msg-abc123"]),
            vec!["fray", "get", "msg-abc123"]
        );
    }

    #[test]
    fn test_trailing_args_survive() {
        assert_eq!(
            rewrite(&["fray", "@bob", "--json"]),
            vec!["fray", "get", "notifs", "--as", "bob", "--json"]
        );
    }

    #[test]
    fn test_ordinary_verbs_untouched() {
        assert_eq!(rewrite(&["fray", "post", "hi"]), vec!["fray", "post", "hi"]);
        assert_eq!(rewrite(&["fray", "@"]), vec!["fray", "@"]);
        assert_eq!(rewrite(&["fray"]), vec!["fray"]);
    }
}
