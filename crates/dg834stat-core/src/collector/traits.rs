//! Abstraction over the router so the poll loop can run against a fake.

use std::time::Duration;

/// Failure talking to the router.
#[derive(Debug)]
pub enum CollectError {
    /// TCP connection could not be established (refused, unreachable, bad host).
    Connect(std::io::Error),
    /// Deadline expired before the exchange completed.
    Timeout,
    /// Remote side closed the session before sending a prompt.
    ConnectionClosed,
    /// Other socket error during the exchange.
    Io(std::io::Error),
    /// HTTP request enabling the remote shell did not complete.
    Enable(String),
}

impl std::fmt::Display for CollectError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CollectError::Connect(e) => write!(f, "connection failed: {}", e),
            CollectError::Timeout => write!(f, "timed out waiting for router"),
            CollectError::ConnectionClosed => write!(f, "connection closed by router"),
            CollectError::Io(e) => write!(f, "I/O error: {}", e),
            CollectError::Enable(msg) => write!(f, "enabling telnet failed: {}", msg),
        }
    }
}

impl std::error::Error for CollectError {}

impl From<std::io::Error> for CollectError {
    fn from(e: std::io::Error) -> Self {
        use std::io::ErrorKind;

        match e.kind() {
            ErrorKind::TimedOut | ErrorKind::WouldBlock => CollectError::Timeout,
            _ => CollectError::Io(e),
        }
    }
}

/// Access to the router's statistics.
///
/// Implementations are stateless between calls: every [`collect`] opens and
/// closes its own session.
///
/// [`collect`]: ModemClient::collect
pub trait ModemClient {
    /// Switches on the router's remote shell. Called once at startup.
    ///
    /// Any HTTP response counts as success; only transport failures are errors.
    fn enable_remote_access(&self, host: &str) -> Result<(), CollectError>;

    /// Runs the statistics command on `host` and returns its output.
    ///
    /// `timeout` bounds the whole connect, prompt, command and response
    /// sequence.
    fn collect(&self, host: &str, timeout: Duration) -> Result<String, CollectError>;
}
