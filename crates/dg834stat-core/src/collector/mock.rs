//! Scripted in-memory [`ModemClient`] for tests and `--simulate` runs.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use crate::collector::traits::{CollectError, ModemClient};
use crate::daemon::ShutdownFlag;

/// Typical `avsar_modem_stats` output of a trained DG834 line.
pub const DG834_STATS_FIXTURE: &str = "\
AR7 DSL Modem Statistics:
--------------------------------
[DSL Modem Stats]
\tUS Connection Rate:\t832\tDS Connection Rate:\t8128
\tDS Line Attenuation:\t31\tDS Margin:\t12
\tUS Line Attenuation:\t15\tUS Margin:\t6
\tUS Payload :\t828\tDS Payload:\t8092
\tDS Superframes:\t5312004\tUS Superframes:\t5312011
\tDS Superframes Errors:\t2\tUS Superframes Errors:\t0
\tTrained Path:\t0\tUS Peak Cell Rate:\t1962
\tTrained Mode:\t3\tSelected Mode:\t1
\tATUC Vendor Code:\tBDCM\tATUC Revision:\t1
\tHybrid Selected:\t0\tTrellis:\t1
\tShowtime Count:\t1\tDS Max Attainable Bit Rate:\t9472 kbps
\tBitSwap:\t1\tUS Max Attainable Bit Rate:\tn/a
";

/// In-memory router.
///
/// Each [`collect`](ModemClient::collect) pops the next scripted result. When
/// the script is exhausted the fallback text is returned, or
/// [`CollectError::ConnectionClosed`] if there is none.
#[derive(Default)]
pub struct MockModem {
    script: Mutex<VecDeque<Result<String, CollectError>>>,
    fallback: Option<String>,
    enable_error: Option<String>,
    stop_after: Option<(usize, ShutdownFlag)>,
    enable_calls: AtomicUsize,
    collect_calls: AtomicUsize,
}

impl MockModem {
    /// Creates a mock with an empty script.
    pub fn new() -> Self {
        Self::default()
    }

    /// Mock that always answers with [`DG834_STATS_FIXTURE`].
    pub fn typical_dg834() -> Self {
        Self::new().with_fallback(DG834_STATS_FIXTURE)
    }

    /// Queues a successful response.
    pub fn push_response(self, text: impl Into<String>) -> Self {
        self.lock_script().push_back(Ok(text.into()));
        self
    }

    /// Queues a failed collection.
    pub fn push_failure(self, error: CollectError) -> Self {
        self.lock_script().push_back(Err(error));
        self
    }

    /// Text returned once the script is exhausted.
    pub fn with_fallback(mut self, text: impl Into<String>) -> Self {
        self.fallback = Some(text.into());
        self
    }

    /// Makes [`enable_remote_access`](ModemClient::enable_remote_access) fail.
    pub fn with_enable_error(mut self, message: impl Into<String>) -> Self {
        self.enable_error = Some(message.into());
        self
    }

    /// Requests shutdown on `flag` while serving the `n`-th collect call.
    ///
    /// Simulates a signal arriving in the middle of a cycle.
    pub fn stop_after(mut self, n: usize, flag: ShutdownFlag) -> Self {
        self.stop_after = Some((n, flag));
        self
    }

    /// Number of enablement calls seen.
    pub fn enable_calls(&self) -> usize {
        self.enable_calls.load(Ordering::SeqCst)
    }

    /// Number of collect calls seen.
    pub fn collect_calls(&self) -> usize {
        self.collect_calls.load(Ordering::SeqCst)
    }

    fn lock_script(&self) -> std::sync::MutexGuard<'_, VecDeque<Result<String, CollectError>>> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ModemClient for MockModem {
    fn enable_remote_access(&self, _host: &str) -> Result<(), CollectError> {
        self.enable_calls.fetch_add(1, Ordering::SeqCst);
        match &self.enable_error {
            Some(message) => Err(CollectError::Enable(message.clone())),
            None => Ok(()),
        }
    }

    fn collect(&self, _host: &str, _timeout: Duration) -> Result<String, CollectError> {
        let call = self.collect_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some((n, flag)) = &self.stop_after
            && call == *n
        {
            flag.request_stop();
        }

        match self.lock_script().pop_front() {
            Some(result) => result,
            None => self
                .fallback
                .clone()
                .ok_or(CollectError::ConnectionClosed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_script_then_fallback() {
        let modem = MockModem::new()
            .push_response("first")
            .push_failure(CollectError::Timeout)
            .with_fallback("again");

        let timeout = Duration::from_secs(1);
        assert_eq!(modem.collect("h", timeout).unwrap(), "first");
        assert!(matches!(modem.collect("h", timeout), Err(CollectError::Timeout)));
        assert_eq!(modem.collect("h", timeout).unwrap(), "again");
        assert_eq!(modem.collect("h", timeout).unwrap(), "again");
        assert_eq!(modem.collect_calls(), 4);
    }

    #[test]
    fn test_exhausted_without_fallback() {
        let modem = MockModem::new();
        assert!(matches!(
            modem.collect("h", Duration::from_secs(1)),
            Err(CollectError::ConnectionClosed)
        ));
    }

    #[test]
    fn test_enable_counts_calls() {
        let modem = MockModem::new();
        modem.enable_remote_access("h").unwrap();
        modem.enable_remote_access("h").unwrap();
        assert_eq!(modem.enable_calls(), 2);

        let failing = MockModem::new().with_enable_error("no route");
        assert!(matches!(
            failing.enable_remote_access("h"),
            Err(CollectError::Enable(_))
        ));
    }

    #[test]
    fn test_stop_after_raises_flag() {
        let flag = ShutdownFlag::new();
        let modem = MockModem::typical_dg834().stop_after(2, flag.clone());
        let timeout = Duration::from_secs(1);

        modem.collect("h", timeout).unwrap();
        assert!(!flag.is_stop_requested());
        modem.collect("h", timeout).unwrap();
        assert!(flag.is_stop_requested());
    }
}
