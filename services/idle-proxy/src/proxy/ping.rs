//! HTTP ping interception.
//!
//! Health checkers that poll the proxy with a single HTTP request get a
//! canned `200 OK` instead of being forwarded, so they never reach or wake
//! the backend. Only the first line of each client chunk is inspected.
//!
//! A chunk is read as UTF-8 with invalid sequences dropped, and its first
//! line ends at any Unicode line boundary (`\n`, `\r`, vertical tab, form
//! feed, the `\x1c`..`\x1e` separators, NEL, U+2028, U+2029). Matching
//! upper-cases both sides with full Unicode case mapping.

use bytes::Bytes;

/// Default ping method.
pub const DEFAULT_PING_METHOD: &str = "GET";

/// Default ping path.
pub const DEFAULT_PING_PATH: &str = "/ping";

/// Default ping response body.
pub const DEFAULT_PING_BODY: &str = "PONG";

/// Request line prefix to intercept and the response to answer with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PingConfig {
    method: String,
    path: String,
    body: String,
    /// Upper-cased `"METHOD PATH "`.
    needle: String,
    /// Chars of first line needed to decide a match.
    needle_chars: usize,
    response: Bytes,
}

impl PingConfig {
    /// Build a ping matcher. The method is upper-cased.
    pub fn new(method: &str, path: &str, body: &str) -> Self {
        let method = method.to_uppercase();
        let needle = format!("{} {} ", method, path).to_uppercase();
        let needle_chars = needle.chars().count();
        let response = Bytes::from(format!(
            "HTTP/1.1 200 OK\r\n\
             Content-Type: text/plain; charset=utf-8\r\n\
             Content-Length: {}\r\n\
             Connection: keep-alive\r\n\
             \r\n\
             {}",
            body.len(),
            body
        ));

        Self {
            method,
            path: path.to_string(),
            body: body.to_string(),
            needle,
            needle_chars,
            response,
        }
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    /// Whether a client chunk is a ping request.
    ///
    /// True when the chunk's first line starts with `"METHOD PATH "`,
    /// compared case-insensitively. Empty chunks never match.
    pub fn matches(&self, chunk: &[u8]) -> bool {
        // Upper-casing never shrinks a char, so a prefix as long as the
        // needle decides the match.
        let prefix: String = chunk
            .utf8_chunks()
            .flat_map(|part| part.valid().chars())
            .take_while(|c| !is_line_break(*c))
            .take(self.needle_chars)
            .collect();

        prefix.to_uppercase().starts_with(&self.needle)
    }

    /// The full HTTP response written back to the client.
    pub fn response(&self) -> &Bytes {
        &self.response
    }
}

fn is_line_break(c: char) -> bool {
    matches!(
        c,
        '\n' | '\r'
            | '\x0b'
            | '\x0c'
            | '\x1c'
            | '\x1d'
            | '\x1e'
            | '\u{85}'
            | '\u{2028}'
            | '\u{2029}'
    )
}

impl Default for PingConfig {
    fn default() -> Self {
        Self::new(DEFAULT_PING_METHOD, DEFAULT_PING_PATH, DEFAULT_PING_BODY)
    }
}
