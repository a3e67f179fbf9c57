//! Identifier validation.

/// Maximum nickname length per RFC 1459.
pub const NICK_MAX: usize = 9;

/// Maximum channel-name length, prefix included.
pub const CHANNEL_NAME_MAX: usize = 50;

/// Specials permitted in nicknames alongside letters.
fn is_nick_special(c: char) -> bool {
    matches!(c, '[' | ']' | '\\' | '`' | '_' | '^' | '{' | '|' | '}')
}

/// Nickname shape: 1-9 characters, first a letter or special, the rest
/// letters, digits, `-`, or specials.
pub fn is_valid_nick(nick: &str) -> bool {
    if nick.is_empty() || nick.len() > NICK_MAX {
        return false;
    }
    let mut chars = nick.chars();
    let first = chars.next().expect("non-empty");
    if !first.is_ascii_alphabetic() && !is_nick_special(first) {
        return false;
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '-' || is_nick_special(c))
}

/// Channel-name shape: `#` or `&` prefix, at least one more character, at
/// most 50 total, and none of space, comma, or control characters.
pub fn is_valid_channel_name(name: &str) -> bool {
    if name.len() < 2 || name.len() > CHANNEL_NAME_MAX {
        return false;
    }
    if !name.starts_with('#') && !name.starts_with('&') {
        return false;
    }
    name.chars().all(|c| !c.is_control() && c != ' ' && c != ',')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nick_boundaries() {
        assert!(is_valid_nick("a"));
        assert!(is_valid_nick("ninechars"));
        assert!(!is_valid_nick("tencharsxx"));
        assert!(!is_valid_nick(""));
    }

    #[test]
    fn nick_character_set() {
        assert!(is_valid_nick("[w]ave"));
        assert!(is_valid_nick("`tick"));
        assert!(is_valid_nick("a-b-c"));
        assert!(is_valid_nick("n0de"));
        assert!(!is_valid_nick("9lives")); // digit first
        assert!(!is_valid_nick("-dash")); // dash first
        assert!(!is_valid_nick("spa ce"));
        assert!(!is_valid_nick("at@sign"));
    }

    #[test]
    fn channel_names() {
        assert!(is_valid_channel_name("#reef"));
        assert!(is_valid_channel_name("&local"));
        assert!(is_valid_channel_name(&format!("#{}", "x".repeat(49))));
        assert!(!is_valid_channel_name(&format!("#{}", "x".repeat(50))));
        assert!(!is_valid_channel_name("#"));
        assert!(!is_valid_channel_name("reef"));
        assert!(!is_valid_channel_name("#with space"));
        assert!(!is_valid_channel_name("#with,comma"));
        assert!(!is_valid_channel_name("#bell\u{7}"));
        assert!(!is_valid_channel_name("0"));
    }
}
