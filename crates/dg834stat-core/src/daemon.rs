//! The poll-parse-persist loop.
//!
//! [`PollLoop`] enables the router's telnet shell once, then repeatedly
//! collects the statistics text, extracts a [`Sample`] and records it, pausing
//! `interval` between cycles. A [`ShutdownFlag`] is checked at the top of each
//! cycle and during the pause; a cycle already in progress always completes.
//!
//! ```text
//! Starting ──enable──▶ Running ──flag──▶ Stopping ──▶ Stopped
//!     │                   │                              ▲
//!     └── enable failed ──┴──── recorder failed ─────────┘
//!         (Require policy)
//! ```

use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::collector::{CollectError, FieldPatternSet, ModemClient, extract};
use crate::config::{DaemonConfig, EnablePolicy};
use crate::storage::{RecordError, SampleRecorder};

/// Granularity of the shutdown check while sleeping between cycles.
const SLEEP_SLICE: Duration = Duration::from_millis(100);

/// Cooperative stop request shared between the signal handler and the loop.
#[derive(Debug, Clone, Default)]
pub struct ShutdownFlag(Arc<AtomicBool>);

impl ShutdownFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Asks the loop to stop after the current cycle.
    pub fn request_stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stop_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Lifecycle state of a [`PollLoop`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DaemonState {
    Starting,
    Running,
    Stopping,
    Stopped,
}

/// Fatal daemon error.
#[derive(Debug)]
pub enum DaemonError {
    /// Enabling telnet failed under [`EnablePolicy::Require`].
    Enable(CollectError),
    /// An output sink could not be written.
    Record(RecordError),
}

impl std::fmt::Display for DaemonError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DaemonError::Enable(e) => write!(f, "startup failed: {}", e),
            DaemonError::Record(e) => write!(f, "cannot record sample: {}", e),
        }
    }
}

impl std::error::Error for DaemonError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DaemonError::Enable(e) => Some(e),
            DaemonError::Record(e) => Some(e),
        }
    }
}

impl From<RecordError> for DaemonError {
    fn from(e: RecordError) -> Self {
        DaemonError::Record(e)
    }
}

/// Result of a single poll cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// A sample with this many fields was recorded.
    Recorded(usize),
    /// Collection failed; nothing was written.
    Skipped,
}

/// Counters over the lifetime of the loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopStats {
    pub cycles: u64,
    pub recorded: u64,
    pub failed: u64,
}

/// Drives the poll cycle until a stop is requested.
pub struct PollLoop<C: ModemClient, W: Write> {
    client: C,
    patterns: FieldPatternSet,
    recorder: SampleRecorder<W>,
    config: DaemonConfig,
    shutdown: ShutdownFlag,
    state: DaemonState,
    stats: LoopStats,
}

impl<C: ModemClient, W: Write> PollLoop<C, W> {
    /// Creates a loop in the [`DaemonState::Starting`] state.
    ///
    /// The recorder's sinks must already be open.
    pub fn new(
        client: C,
        patterns: FieldPatternSet,
        recorder: SampleRecorder<W>,
        config: DaemonConfig,
        shutdown: ShutdownFlag,
    ) -> Self {
        Self {
            client,
            patterns,
            recorder,
            config,
            shutdown,
            state: DaemonState::Starting,
            stats: LoopStats::default(),
        }
    }

    pub fn state(&self) -> DaemonState {
        self.state
    }

    pub fn stats(&self) -> LoopStats {
        self.stats
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// Consumes the loop, returning the recorder with its sinks.
    pub fn into_recorder(self) -> SampleRecorder<W> {
        self.recorder
    }

    /// Performs the one-time enablement call and moves to `Running`.
    pub fn start(&mut self) -> Result<(), DaemonError> {
        if self.state != DaemonState::Starting {
            return Ok(());
        }

        let host = self.config.router_ip.as_str();
        match self.config.enable_policy {
            EnablePolicy::Skip => {
                info!("Skipping telnet enablement for DG834@{}", host);
            }
            policy => {
                debug!("Enabling telnet interface for DG834@{}", host);
                match self.client.enable_remote_access(host) {
                    Ok(()) => info!("Enabled telnet interface for DG834@{}", host),
                    Err(e) if policy == EnablePolicy::Require => {
                        error!("Enabling telnet interface for DG834@{} failed: {}", host, e);
                        self.state = DaemonState::Stopped;
                        return Err(DaemonError::Enable(e));
                    }
                    Err(e) => {
                        warn!(
                            "Enabling telnet interface for DG834@{} failed: {}; polling anyway",
                            host, e
                        );
                    }
                }
            }
        }

        self.state = DaemonState::Running;
        Ok(())
    }

    /// Runs one collect, extract and record cycle.
    ///
    /// Collection failures are logged and reported as
    /// [`CycleOutcome::Skipped`]; only a recorder failure is an error.
    pub fn run_cycle(&mut self) -> Result<CycleOutcome, DaemonError> {
        self.stats.cycles += 1;

        let text = match self
            .client
            .collect(&self.config.router_ip, self.config.session_timeout)
        {
            Ok(text) => text,
            Err(e) => {
                warn!("Failed to collect router stats: {}", e);
                self.stats.failed += 1;
                return Ok(CycleOutcome::Skipped);
            }
        };

        let sample = extract(&text, &self.patterns);
        let fields = sample.field_count();
        if fields < self.patterns.len() {
            debug!(
                "Missing fields: {}",
                sample
                    .missing_fields()
                    .iter()
                    .map(|f| f.name())
                    .collect::<Vec<_>>()
                    .join(", ")
            );
        }

        self.recorder.record(sample)?;
        self.stats.recorded += 1;
        info!(
            "Sample #{}: {}/{} fields",
            self.stats.recorded,
            fields,
            self.patterns.len()
        );
        Ok(CycleOutcome::Recorded(fields))
    }

    /// Runs until the shutdown flag is raised or a fatal error occurs.
    pub fn run(&mut self) -> Result<LoopStats, DaemonError> {
        self.start()?;
        info!(
            "Starting collection loop: interval={}s, timeout={}s",
            self.config.interval.as_secs(),
            self.config.session_timeout.as_secs()
        );

        while self.state == DaemonState::Running {
            if self.shutdown.is_stop_requested() {
                self.state = DaemonState::Stopping;
                break;
            }

            if let Err(e) = self.run_cycle() {
                error!("{}", e);
                self.state = DaemonState::Stopped;
                return Err(e);
            }

            self.sleep_interval();
        }

        info!(
            "Collection loop stopped after {} cycles ({} recorded, {} failed)",
            self.stats.cycles, self.stats.recorded, self.stats.failed
        );
        self.state = DaemonState::Stopped;
        Ok(self.stats)
    }

    /// Sleeps for the configured interval, waking early on shutdown.
    fn sleep_interval(&self) {
        let mut remaining = self.config.interval;
        while remaining > Duration::ZERO && !self.shutdown.is_stop_requested() {
            let sleep_time = remaining.min(SLEEP_SLICE);
            std::thread::sleep(sleep_time);
            remaining = remaining.saturating_sub(sleep_time);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::MockModem;
    use crate::collector::mock::DG834_STATS_FIXTURE;
    use crate::storage::Sample;
    use std::io;
    use std::time::Instant;

    fn config(policy: EnablePolicy) -> DaemonConfig {
        DaemonConfig {
            interval: Duration::ZERO,
            enable_policy: policy,
            ..DaemonConfig::default()
        }
    }

    fn memory_loop(
        modem: MockModem,
        policy: EnablePolicy,
        shutdown: ShutdownFlag,
    ) -> PollLoop<MockModem, Vec<u8>> {
        PollLoop::new(
            modem,
            FieldPatternSet::dg834(),
            SampleRecorder::new(Vec::new(), Vec::new()),
            config(policy),
            shutdown,
        )
    }

    fn csv_lines(poll: PollLoop<MockModem, Vec<u8>>) -> Vec<String> {
        let (_, csv) = poll.into_recorder().into_inner();
        String::from_utf8(csv)
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn test_stops_after_current_cycle() {
        let shutdown = ShutdownFlag::new();
        let modem = MockModem::typical_dg834().stop_after(3, shutdown.clone());
        let mut poll = memory_loop(modem, EnablePolicy::Warn, shutdown);

        let stats = poll.run().unwrap();
        assert_eq!(poll.state(), DaemonState::Stopped);
        assert_eq!(
            stats,
            LoopStats {
                cycles: 3,
                recorded: 3,
                failed: 0
            }
        );
        assert_eq!(poll.client().enable_calls(), 1);
        assert_eq!(poll.client().collect_calls(), 3);
        assert_eq!(csv_lines(poll).len(), 3);
    }

    #[test]
    fn test_stop_before_first_cycle() {
        let shutdown = ShutdownFlag::new();
        shutdown.request_stop();
        let mut poll = memory_loop(MockModem::typical_dg834(), EnablePolicy::Warn, shutdown);

        let stats = poll.run().unwrap();
        assert_eq!(stats.cycles, 0);
        assert_eq!(poll.client().enable_calls(), 1);
        assert!(csv_lines(poll).is_empty());
    }

    #[test]
    fn test_failed_cycle_leaves_gap() {
        let shutdown = ShutdownFlag::new();
        let modem = MockModem::new()
            .push_response(DG834_STATS_FIXTURE)
            .push_failure(CollectError::Timeout)
            .push_response("US Margin: 0\n")
            .stop_after(3, shutdown.clone());
        let mut poll = memory_loop(modem, EnablePolicy::Warn, shutdown);

        let stats = poll.run().unwrap();
        assert_eq!(stats.cycles, 3);
        assert_eq!(stats.recorded, 2);
        assert_eq!(stats.failed, 1);

        let lines = csv_lines(poll);
        assert_eq!(lines.len(), 2);
        let second = Sample::from_csv_line(&lines[1]).unwrap();
        assert_eq!(second.us_margin, Some(0));
        assert_eq!(second.field_count(), 1);
    }

    #[test]
    fn test_end_to_end_line() {
        let shutdown = ShutdownFlag::new();
        let modem = MockModem::new()
            .push_response("DS Connection Rate: 8128\nDS Margin : 12\nUS Connection Rate: 832\n")
            .stop_after(1, shutdown.clone());
        let mut poll = memory_loop(modem, EnablePolicy::Warn, shutdown);
        poll.run().unwrap();

        let (json, csv) = poll.into_recorder().into_inner();
        let csv = String::from_utf8(csv).unwrap();
        let (ts, rest) = csv.trim_end().split_once(',').unwrap();
        assert!(ts.parse::<i64>().unwrap() > 0);
        assert_eq!(rest, "8128,,12,,832,,,");

        let json = String::from_utf8(json).unwrap();
        let sample: Sample = serde_json::from_str(json.trim()).unwrap();
        assert_eq!(sample.ds_conn_rate, Some(8128));
        assert_eq!(sample.ds_margin, Some(12));
        assert_eq!(sample.us_conn_rate, Some(832));
        assert_eq!(sample.field_count(), 3);
        assert!(!json.contains("null"));
    }

    #[test]
    fn test_required_enable_failure_is_fatal() {
        let modem = MockModem::typical_dg834().with_enable_error("no route to host");
        let mut poll = memory_loop(modem, EnablePolicy::Require, ShutdownFlag::new());

        let err = poll.run().unwrap_err();
        assert!(matches!(err, DaemonError::Enable(_)));
        assert_eq!(poll.state(), DaemonState::Stopped);
        assert_eq!(poll.client().collect_calls(), 0);
    }

    #[test]
    fn test_enable_failure_warns_and_continues() {
        let shutdown = ShutdownFlag::new();
        let modem = MockModem::typical_dg834()
            .with_enable_error("no route to host")
            .stop_after(1, shutdown.clone());
        let mut poll = memory_loop(modem, EnablePolicy::Warn, shutdown);

        assert_eq!(poll.run().unwrap().recorded, 1);
    }

    #[test]
    fn test_skip_policy_never_enables() {
        let shutdown = ShutdownFlag::new();
        let modem = MockModem::typical_dg834().stop_after(1, shutdown.clone());
        let mut poll = memory_loop(modem, EnablePolicy::Skip, shutdown);

        poll.run().unwrap();
        assert_eq!(poll.client().enable_calls(), 0);
    }

    #[test]
    fn test_run_cycle_directly() {
        let modem = MockModem::new().push_failure(CollectError::ConnectionClosed);
        let mut poll = memory_loop(modem, EnablePolicy::Warn, ShutdownFlag::new());
        poll.start().unwrap();
        assert_eq!(poll.state(), DaemonState::Running);

        assert_eq!(poll.run_cycle().unwrap(), CycleOutcome::Skipped);
        assert_eq!(poll.stats().failed, 1);
    }

    struct FailingSink;

    impl Write for FailingSink {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::StorageFull, "disk full"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_recorder_failure_is_fatal() {
        let mut poll = PollLoop::new(
            MockModem::typical_dg834(),
            FieldPatternSet::dg834(),
            SampleRecorder::new(FailingSink, FailingSink),
            config(EnablePolicy::Warn),
            ShutdownFlag::new(),
        );

        let err = poll.run().unwrap_err();
        assert!(matches!(err, DaemonError::Record(_)));
        assert_eq!(poll.state(), DaemonState::Stopped);
        assert_eq!(poll.client().collect_calls(), 1);
    }

    #[test]
    fn test_shutdown_interrupts_sleep() {
        let shutdown = ShutdownFlag::new();
        let modem = MockModem::typical_dg834().stop_after(1, shutdown.clone());
        let mut poll = PollLoop::new(
            modem,
            FieldPatternSet::dg834(),
            SampleRecorder::new(Vec::new(), Vec::new()),
            DaemonConfig {
                interval: Duration::from_secs(30),
                ..DaemonConfig::default()
            },
            shutdown,
        );

        let started = Instant::now();
        poll.run().unwrap();
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
