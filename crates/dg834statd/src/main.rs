//! dg834statd - DG834 line statistics collector daemon.
//!
//! Enables the router's telnet shell, then polls
//! `/proc/avalanche/avsar_modem_stats` at a fixed interval and appends each
//! sample to `dg834.json` and `dg834.csv`. Runs in the foreground; use a
//! service manager to background it.

mod signals;

use std::fs::OpenOptions;
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Mutex;
use std::time::Duration;

use clap::Parser;
use tracing::{Level, error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::Directive;

use dg834stat_core::collector::{Dg834Client, FieldPatternSet, MockModem, ModemClient};
use dg834stat_core::config::{DEFAULT_ROUTER_IP, DaemonConfig, EnablePolicy};
use dg834stat_core::daemon::{DaemonError, LoopStats, PollLoop, ShutdownFlag};
use dg834stat_core::storage::{CSV_FILE_NAME, JSON_FILE_NAME, SampleRecorder};

/// File name of the process log inside the log directory.
const PROCESS_LOG_FILE_NAME: &str = "dg834statds.log";

/// DG834 line statistics collector daemon.
#[derive(Parser, Debug)]
#[command(name = "dg834statd", about = "DG834 line statistics collector daemon", version)]
struct Args {
    /// Router address.
    #[arg(long, env = "ROUTER_IP", default_value = DEFAULT_ROUTER_IP)]
    router_ip: String,

    /// Collection interval in seconds.
    #[arg(short, long, default_value = "10", value_parser = clap::value_parser!(u64).range(1..))]
    interval: u64,

    /// Timeout in seconds for one telnet exchange and for the enablement request.
    #[arg(long, default_value = "10")]
    timeout: u64,

    /// Telnet port on the router.
    #[arg(long, default_value = "23")]
    port: u16,

    /// Directory for dg834.json, dg834.csv and the process log.
    #[arg(short = 'o', long, env = "DG834_LOG_DIR", default_value = "./log")]
    log_dir: PathBuf,

    /// What to do if enabling telnet fails: warn, require or skip.
    #[arg(long, default_value = "warn")]
    enable_policy: EnablePolicy,

    /// Run a single poll cycle and exit.
    #[arg(long)]
    once: bool,

    /// Use canned router output instead of the network.
    #[arg(long)]
    simulate: bool,

    /// Log to stderr instead of the process log file.
    #[arg(long)]
    log_stderr: bool,

    /// Increase logging verbosity (-v for debug, -vv for trace). Default is info level.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode - only show errors.
    #[arg(short, long)]
    quiet: bool,
}

impl Args {
    fn daemon_config(&self) -> DaemonConfig {
        DaemonConfig {
            router_ip: self.router_ip.clone(),
            telnet_port: self.port,
            interval: Duration::from_secs(self.interval),
            session_timeout: Duration::from_secs(self.timeout),
            enable_timeout: Duration::from_secs(self.timeout),
            enable_policy: self.enable_policy,
            log_dir: self.log_dir.clone(),
        }
    }
}

/// Initializes the tracing subscriber with the appropriate log level.
/// Default level is INFO. Use -q for quiet mode (errors only).
fn init_logging(args: &Args) -> io::Result<()> {
    let level = if args.quiet {
        Level::ERROR
    } else {
        match args.verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };

    let mut filter = EnvFilter::from_default_env();
    for target in ["dg834statd", "dg834stat_core"] {
        if let Ok(directive) = format!("{}={}", target, level).parse::<Directive>() {
            filter = filter.add_directive(directive);
        }
    }

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);

    if args.log_stderr {
        builder.with_writer(io::stderr).init();
    } else {
        std::fs::create_dir_all(&args.log_dir)?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(args.log_dir.join(PROCESS_LOG_FILE_NAME))?;
        builder.with_ansi(false).with_writer(Mutex::new(file)).init();
    }
    Ok(())
}

/// Builds the poll loop around `client` and drives it.
fn run<C: ModemClient>(
    client: C,
    recorder: SampleRecorder,
    config: DaemonConfig,
    shutdown: ShutdownFlag,
    once: bool,
) -> Result<LoopStats, DaemonError> {
    let mut poll = PollLoop::new(client, FieldPatternSet::dg834(), recorder, config, shutdown);
    if once {
        poll.start()?;
        poll.run_cycle()?;
        Ok(poll.stats())
    } else {
        poll.run()
    }
}

fn main() -> ExitCode {
    let args = Args::parse();

    if let Err(e) = init_logging(&args) {
        eprintln!(
            "dg834statd: cannot open {}: {}",
            args.log_dir.join(PROCESS_LOG_FILE_NAME).display(),
            e
        );
        return ExitCode::FAILURE;
    }

    let config = args.daemon_config();
    info!("dg834statd {} starting", env!("CARGO_PKG_VERSION"));
    info!(
        "Config: router={}, port={}, interval={}s, timeout={}s, enable_policy={}",
        config.router_ip,
        config.telnet_port,
        config.interval.as_secs(),
        config.session_timeout.as_secs(),
        config.enable_policy
    );

    let shutdown = ShutdownFlag::new();
    if let Err(e) = signals::install(shutdown.clone()) {
        warn!("Failed to install signal handlers: {}", e);
    }

    let recorder = match SampleRecorder::create(&config.log_dir) {
        Ok(recorder) => recorder,
        Err(e) => {
            error!("Cannot open output files: {}", e);
            return ExitCode::FAILURE;
        }
    };
    info!(
        "Recording to {} and {}",
        config.log_dir.join(JSON_FILE_NAME).display(),
        config.log_dir.join(CSV_FILE_NAME).display()
    );

    let result = if args.simulate {
        info!("Simulation mode: using canned DG834 statistics");
        run(MockModem::typical_dg834(), recorder, config, shutdown, args.once)
    } else {
        let client = Dg834Client::new(config.telnet_port, config.enable_timeout);
        run(client, recorder, config, shutdown, args.once)
    };

    match result {
        Ok(stats) if args.once && stats.recorded == 0 => {
            error!("No sample recorded");
            ExitCode::FAILURE
        }
        Ok(_) => {
            info!("Shutdown complete");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn args_map_to_daemon_config() {
        let args = Args::try_parse_from([
            "dg834statd",
            "--router-ip",
            "10.0.0.138",
            "-i",
            "30",
            "--timeout",
            "5",
            "-o",
            "/var/log/dg834",
            "--enable-policy",
            "require",
        ])
        .unwrap();

        let config = args.daemon_config();
        assert_eq!(config.router_ip, "10.0.0.138");
        assert_eq!(config.interval, Duration::from_secs(30));
        assert_eq!(config.session_timeout, Duration::from_secs(5));
        assert_eq!(config.telnet_port, 23);
        assert_eq!(config.log_dir, PathBuf::from("/var/log/dg834"));
        assert_eq!(config.enable_policy, EnablePolicy::Require);
    }

    #[test]
    fn args_reject_unknown_enable_policy() {
        assert!(Args::try_parse_from(["dg834statd", "--enable-policy", "retry"]).is_err());
    }

    #[test]
    fn args_reject_zero_interval() {
        assert!(Args::try_parse_from(["dg834statd", "-i", "0"]).is_err());
        assert!(Args::try_parse_from(["dg834statd", "-i", "1"]).is_ok());
    }

    #[test]
    fn simulated_single_cycle_writes_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let recorder = SampleRecorder::create(dir.path()).unwrap();
        let config = DaemonConfig {
            log_dir: dir.path().to_path_buf(),
            ..DaemonConfig::default()
        };

        let stats = run(
            MockModem::typical_dg834(),
            recorder,
            config,
            ShutdownFlag::new(),
            true,
        )
        .unwrap();
        assert_eq!(stats.recorded, 1);

        let csv = std::fs::read_to_string(dir.path().join(CSV_FILE_NAME)).unwrap();
        assert!(csv.ends_with(",8128,31,12,8092,832,15,6,828\n"));
    }
}
