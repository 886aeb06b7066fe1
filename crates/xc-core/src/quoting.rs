//! Shell quoting and safe-token detection.

/// Characters that are safe to emit unquoted in a POSIX shell command line.
fn is_safe_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '/' | '=' | ':' | '@' | '%' | '+' | '-')
}

/// Quote a single token for safe inclusion in a shell command line.
///
/// Tokens consisting entirely of the safe character set are returned
/// verbatim; everything else is wrapped in single quotes, with embedded
/// single quotes escaped as `'\''`.
pub fn quote_token(token: &str) -> String {
    if !token.is_empty() && token.chars().all(is_safe_char) {
        return token.to_string();
    }
    let mut quoted = String::with_capacity(token.len() + 2);
    quoted.push('\'');
    for c in token.chars() {
        if c == '\'' {
            quoted.push_str("'\\''");
        } else {
            quoted.push(c);
        }
    }
    quoted.push('\'');
    quoted
}

/// Quote a sequence of tokens and join them with spaces.
pub fn quote<I, S>(tokens: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    tokens
        .into_iter()
        .map(|t| quote_token(t.as_ref()))
        .collect::<Vec<_>>()
        .join(" ")
}
