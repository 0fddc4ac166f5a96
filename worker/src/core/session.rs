//! Session identifier sanitization for the agent runtime.
//!
//! Runtime session/conversation ids must match `[a-zA-Z0-9][a-zA-Z0-9-_]*`.

/// Map an arbitrary string onto the runtime's session-id alphabet.
///
/// Invalid characters become `-`, leading/trailing `-` are stripped, an empty
/// result falls back to `session`, and a non-alphanumeric first character gets
/// an `s-` prefix.
pub fn sanitize_session_id(raw: &str) -> String {
    let mapped: String = raw
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' {
                ch
            } else {
                '-'
            }
        })
        .collect();
    let mut s = mapped.trim_matches('-').to_string();
    if s.is_empty() {
        s = "session".to_string();
    }
    if !s.chars().next().is_some_and(|c| c.is_ascii_alphanumeric()) {
        s = format!("s-{s}");
    }
    s
}
