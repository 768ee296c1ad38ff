//! Minimal upgrade handshake.
//!
//! A client opens the push channel by sending an HTTP-style request head:
//!
//! ```text
//! GET / HTTP/1.1\r\n
//! Upgrade: websocket\r\n
//! Connection: Upgrade\r\n
//! \r\n
//! ```
//!
//! The server validates the request line and the `Upgrade` header and answers
//! with the fixed [`UPGRADE_RESPONSE`].  No key negotiation, extensions, or
//! subprotocols are involved.

use thiserror::Error;

/// Response written verbatim after a valid upgrade request.
pub const UPGRADE_RESPONSE: &[u8] =
    b"HTTP/1.1 101 Switching Protocols\r\nUpgrade: websocket\r\nConnection: Upgrade\r\n\r\n";

/// Largest request head accepted, terminator included.
pub const MAX_REQUEST_LEN: usize = 8 * 1024;

const TERMINATOR: &[u8] = b"\r\n\r\n";

/// Reasons an upgrade request is rejected.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum HandshakeError {
    #[error("request head is not valid UTF-8")]
    NotUtf8,

    #[error("malformed request line: {0:?}")]
    MalformedRequestLine(String),

    #[error("unsupported request method: {0}")]
    NotGet(String),

    #[error("request does not ask for a websocket upgrade")]
    MissingUpgrade,

    #[error("malformed header line: {0:?}")]
    MalformedHeader(String),

    #[error("request head exceeds {MAX_REQUEST_LEN} bytes")]
    TooLarge,
}

/// A validated upgrade request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpgradeRequest {
    pub path: String,
    /// Header `(name, value)` pairs in arrival order, values trimmed.
    pub headers: Vec<(String, String)>,
}

impl UpgradeRequest {
    /// Case-insensitive header lookup returning the first match.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Returns the length of the request head including its `\r\n\r\n`
/// terminator, or `None` if the terminator has not arrived yet.
pub fn find_request_end(buf: &[u8]) -> Option<usize> {
    buf.windows(TERMINATOR.len())
        .position(|w| w == TERMINATOR)
        .map(|pos| pos + TERMINATOR.len())
}

/// Parses and validates a complete request head.
///
/// `head` is everything up to and including the blank line; trailing bytes
/// belong to the frame stream and must not be passed in.
///
/// # Errors
///
/// Returns [`HandshakeError`] when the head is oversized, not UTF-8, not a
/// `GET`, or lacks an `Upgrade: websocket` header.
///
/// # Examples
///
/// ```rust
/// use touch_core::protocol::handshake::parse_upgrade_request;
///
/// let req = parse_upgrade_request(
///     b"GET /touch HTTP/1.1\r\nUpgrade: WebSocket\r\nConnection: Upgrade\r\n\r\n",
/// )
/// .unwrap();
/// assert_eq!(req.path, "/touch");
/// assert_eq!(req.header("connection"), Some("Upgrade"));
/// ```
pub fn parse_upgrade_request(head: &[u8]) -> Result<UpgradeRequest, HandshakeError> {
    if head.len() > MAX_REQUEST_LEN {
        return Err(HandshakeError::TooLarge);
    }
    let text = std::str::from_utf8(head).map_err(|_| HandshakeError::NotUtf8)?;
    let mut lines = text.split("\r\n");

    let request_line = lines.next().unwrap_or_default();
    let mut parts = request_line.split_whitespace();
    let (Some(method), Some(path), Some(version), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(HandshakeError::MalformedRequestLine(request_line.to_string()));
    };
    if !version.starts_with("HTTP/1.") {
        return Err(HandshakeError::MalformedRequestLine(request_line.to_string()));
    }
    if method != "GET" {
        return Err(HandshakeError::NotGet(method.to_string()));
    }

    let mut headers = Vec::new();
    for line in lines.take_while(|l| !l.is_empty()) {
        let Some((name, value)) = line.split_once(':') else {
            return Err(HandshakeError::MalformedHeader(line.to_string()));
        };
        let name = name.trim();
        if name.is_empty() {
            return Err(HandshakeError::MalformedHeader(line.to_string()));
        }
        headers.push((name.to_string(), value.trim().to_string()));
    }

    let request = UpgradeRequest {
        path: path.to_string(),
        headers,
    };

    let wants_websocket = request
        .header("upgrade")
        .is_some_and(|v| v.to_ascii_lowercase().contains("websocket"));
    if !wants_websocket {
        return Err(HandshakeError::MissingUpgrade);
    }

    Ok(request)
}
