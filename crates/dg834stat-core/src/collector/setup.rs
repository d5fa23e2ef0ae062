//! HTTP call that switches on the router's telnet debug shell.

use std::time::Duration;

use tracing::debug;

use crate::collector::traits::CollectError;

/// Setup page that enables the debug shell.
pub const SETUP_PATH: &str = "/setup.cgi?todo=debug";

/// Requests `http://<host>/setup.cgi?todo=debug` and returns the HTTP status.
///
/// The body is ignored and any status counts as completion, since the router
/// answers with an error page once the shell is already enabled. Transport
/// failures (resolve, connect, timeout) are reported as
/// [`CollectError::Enable`].
pub fn enable_debug_shell(host: &str, timeout: Duration) -> Result<u16, CollectError> {
    let url = format!("http://{}{}", host, SETUP_PATH);
    let agent = ureq::AgentBuilder::new().timeout(timeout).build();

    debug!("GET {}", url);
    match agent.get(&url).call() {
        Ok(response) => Ok(response.status()),
        Err(ureq::Error::Status(code, _)) => Ok(code),
        Err(e) => Err(CollectError::Enable(e.to_string())),
    }
}
