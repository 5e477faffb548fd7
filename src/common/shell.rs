//! Shell quoting for displaying command lines.

/// Quote `s` for a POSIX shell, only when it needs quoting.
///
/// ```ignore
/// assert_eq!(shell_quote("--noconfirm"), "--noconfirm");
/// assert_eq!(shell_quote("MAKEFLAGS=\"-j$(nproc)\""), "'MAKEFLAGS=\"-j$(nproc)\"'");
/// ```
pub fn shell_quote(s: &str) -> String {
    if s.is_empty() {
        return "''".to_string();
    }

    if s.chars()
        .all(|c| c.is_alphanumeric() || matches!(c, '-' | '_' | '=' | '/' | '.' | ':' | ',' | '+' | '@'))
    {
        return s.to_string();
    }

    format!("'{}'", s.replace('\'', r"'\''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shell_quote() {
        assert_eq!(shell_quote(""), "''");
        assert_eq!(shell_quote("pacman"), "pacman");
        assert_eq!(shell_quote("--depth=1"), "--depth=1");
        assert_eq!(shell_quote("/etc/pacman.d/mirrorlist"), "/etc/pacman.d/mirrorlist");
        assert_eq!(shell_quote("libc++"), "libc++");
        assert_eq!(shell_quote("foo bar"), "'foo bar'");
        assert_eq!(shell_quote("it's"), "'it'\\''s'");
        assert_eq!(shell_quote("-j$(nproc)"), "'-j$(nproc)'");
    }
}
