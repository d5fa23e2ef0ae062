//! Network-backed [`ModemClient`] for DG834 routers.

use std::time::Duration;

use regex::Regex;
use tracing::{debug, info};

use crate::collector::avsar::STATS_PATH;
use crate::collector::setup::enable_debug_shell;
use crate::collector::telnet::{PROMPT_PATTERN, TELNET_PORT, TelnetSession};
use crate::collector::traits::{CollectError, ModemClient};

/// Talks to a DG834 over HTTP (enablement) and telnet (statistics).
#[derive(Debug, Clone)]
pub struct Dg834Client {
    port: u16,
    enable_timeout: Duration,
    prompt: Regex,
    command: String,
}

impl Dg834Client {
    /// Creates a client using telnet `port` and the given HTTP timeout for
    /// the enablement request.
    pub fn new(port: u16, enable_timeout: Duration) -> Self {
        Self {
            port,
            enable_timeout,
            prompt: Regex::new(PROMPT_PATTERN).expect("prompt pattern is valid"),
            command: format!("cat {}", STATS_PATH),
        }
    }
}

impl Default for Dg834Client {
    fn default() -> Self {
        Self::new(TELNET_PORT, Duration::from_secs(10))
    }
}

impl ModemClient for Dg834Client {
    fn enable_remote_access(&self, host: &str) -> Result<(), CollectError> {
        let status = enable_debug_shell(host, self.enable_timeout)?;
        debug!("Setup page on {} answered with HTTP {}", host, status);
        Ok(())
    }

    fn collect(&self, host: &str, timeout: Duration) -> Result<String, CollectError> {
        info!("Collecting router stats from {}", host);
        let mut session = TelnetSession::connect(host, self.port, timeout)?;
        session.wait_for(&self.prompt)?;
        session.cmd(&self.command, &self.prompt)
    }
}
