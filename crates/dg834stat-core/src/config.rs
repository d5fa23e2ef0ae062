//! Daemon configuration, fixed at process start.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::collector::telnet::TELNET_PORT;

/// Router address used when `ROUTER_IP` is not set.
pub const DEFAULT_ROUTER_IP: &str = "192.168.0.1";

/// What to do when the startup call enabling telnet fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnablePolicy {
    /// Log the failure and start polling anyway (telnet may already be on).
    #[default]
    Warn,
    /// Abort startup.
    Require,
    /// Never issue the enablement call.
    Skip,
}

impl FromStr for EnablePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "warn" => Ok(EnablePolicy::Warn),
            "require" => Ok(EnablePolicy::Require),
            "skip" => Ok(EnablePolicy::Skip),
            other => Err(format!(
                "unknown enable policy '{}' (expected warn, require or skip)",
                other
            )),
        }
    }
}

impl std::fmt::Display for EnablePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            EnablePolicy::Warn => "warn",
            EnablePolicy::Require => "require",
            EnablePolicy::Skip => "skip",
        })
    }
}

/// Settings for the poll loop and its collaborators.
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    /// Router host name or IP address, without a port.
    pub router_ip: String,
    /// Telnet port on the router.
    pub telnet_port: u16,
    /// Pause between poll cycles.
    pub interval: Duration,
    /// Bound on one telnet exchange.
    pub session_timeout: Duration,
    /// Bound on the enablement HTTP request.
    pub enable_timeout: Duration,
    /// Handling of enablement failures.
    pub enable_policy: EnablePolicy,
    /// Directory holding the output files and the process log.
    pub log_dir: PathBuf,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            router_ip: DEFAULT_ROUTER_IP.to_string(),
            telnet_port: TELNET_PORT,
            interval: Duration::from_secs(10),
            session_timeout: Duration::from_secs(10),
            enable_timeout: Duration::from_secs(10),
            enable_policy: EnablePolicy::Warn,
            log_dir: PathBuf::from("log"),
        }
    }
}
