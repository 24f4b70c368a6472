//! Matching helpers used to decide whether an inbound message triggers the bot.

/// Return the first prefix in `prefixes` that `content` starts with.
///
/// An empty string in the list matches everything, which is how "no prefix
/// required" is expressed in config.
pub fn check_prefix<'a>(content: &str, prefixes: &'a [String]) -> Option<&'a str> {
    prefixes
        .iter()
        .map(String::as_str)
        .find(|prefix| content.starts_with(prefix))
}

/// Whether `content` contains any of `keywords`.
pub fn check_contain(content: &str, keywords: &[String]) -> bool {
    keywords
        .iter()
        .any(|k| !k.is_empty() && content.contains(k.as_str()))
}

/// Check if a name matches an entry of `list`.
///
/// Entries are matched case-insensitively, with glob-style `*` wildcards.
/// An empty list matches nothing.
pub fn is_listed(name: &str, list: &[String]) -> bool {
    let name = name.to_lowercase();
    list.iter().any(|pattern| {
        let pat = pattern.to_lowercase();
        if pat.contains('*') {
            glob_match(&pat, &name)
        } else {
            pat == name
        }
    })
}

/// Remove leading `@name` mentions (terminated by a space or U+2005) so
/// commands reach the generator clean.
pub fn strip_leading_mentions(content: &str) -> &str {
    let mut rest = content.trim_start();
    while let Some(after_at) = rest.strip_prefix('@') {
        match after_at.find([' ', '\u{2005}']) {
            Some(end) => {
                let sep_len = after_at[end..].chars().next().map_or(1, char::len_utf8);
                rest = after_at[end + sep_len..].trim_start();
            },
            None => return "",
        }
    }
    rest
}

/// Remove every `@name` mention of `name` (followed by space or U+2005).
pub fn strip_mention_of(content: &str, name: &str) -> String {
    if name.is_empty() {
        return content.to_string();
    }
    let tag = format!("@{name}");
    let mut out = String::with_capacity(content.len());
    let mut rest = content;
    while let Some(idx) = rest.find(&tag) {
        let after = &rest[idx + tag.len()..];
        match after.chars().next() {
            Some(sep @ (' ' | '\u{2005}')) => {
                out.push_str(&rest[..idx]);
                rest = &after[sep.len_utf8()..];
            },
            _ => {
                out.push_str(&rest[..idx + tag.len()]);
                rest = after;
            },
        }
    }
    out.push_str(rest);
    out
}

/// Simple glob matching supporting `*` as a wildcard for any sequence of chars.
fn glob_match(pattern: &str, text: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();
    let (Some(first), Some(last)) = (parts.first(), parts.last()) else {
        return pattern == text;
    };
    if parts.len() == 1 {
        return pattern == text;
    }
    if !text.starts_with(first) {
        return false;
    }

    let mut pos = first.len();
    for part in &parts[1..parts.len() - 1] {
        match text[pos..].find(part) {
            Some(idx) => pos += idx + part.len(),
            None => return false,
        }
    }
    text.len() >= pos + last.len() && text.ends_with(last)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn empty_prefix_matches_everything() {
        assert_eq!(check_prefix("hello", &list(&[""])), Some(""));
        assert_eq!(check_prefix("hello", &[]), None);
    }

    #[test]
    fn first_matching_prefix_wins() {
        let prefixes = list(&["bot", "@bot"]);
        assert_eq!(check_prefix("@bot hi", &prefixes), Some("@bot"));
        assert_eq!(check_prefix("hi", &prefixes), None);
    }

    #[test]
    fn contain_ignores_empty_keywords() {
        assert!(check_contain("please help", &list(&["help"])));
        assert!(!check_contain("anything", &list(&[""])));
    }

    #[test]
    fn listed_is_case_insensitive_and_globbed() {
        let names = list(&["Spammer", "bot_*"]);
        assert!(is_listed("spammer", &names));
        assert!(is_listed("bot_42", &names));
        assert!(!is_listed("alice", &names));
        assert!(!is_listed("alice", &[]));
    }

    #[test]
    fn glob_positions() {
        assert!(glob_match("*@example.com", "user@example.com"));
        assert!(!glob_match("*@example.com", "user@other.com"));
        assert!(glob_match("user_*_admin", "user_123_admin"));
        assert!(!glob_match("user_*_admin", "user_123_mod"));
        assert!(!glob_match("ab*ba", "aba"));
    }

    #[test]
    fn strips_leading_mentions() {
        assert_eq!(strip_leading_mentions("@bot #reset"), "#reset");
        assert_eq!(strip_leading_mentions("@bot\u{2005}@other hi"), "hi");
        assert_eq!(strip_leading_mentions("no mention"), "no mention");
        assert_eq!(strip_leading_mentions("@bot"), "");
    }

    #[test]
    fn strips_named_mention_anywhere() {
        assert_eq!(strip_mention_of("hey @Bot what's up", "Bot"), "hey what's up");
        assert_eq!(strip_mention_of("mail @Botany", "Bot"), "mail @Botany");
    }
}
