//! Translation of process signals into a [`ShutdownFlag`].
//!
//! SIGTERM, SIGQUIT and SIGINT request a graceful stop; SIGHUP is only
//! logged, since configuration is never reloaded.

use std::io;
use std::thread;

use dg834stat_core::daemon::ShutdownFlag;
use nix::sys::signal::{SigSet, Signal};
use tracing::{info, warn};

const HANDLED: [Signal; 4] = [
    Signal::SIGTERM,
    Signal::SIGQUIT,
    Signal::SIGINT,
    Signal::SIGHUP,
];

/// What the daemon does on receipt of a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SignalAction {
    Stop,
    ReloadNotice,
}

fn action_for(signal: Signal) -> SignalAction {
    match signal {
        Signal::SIGHUP => SignalAction::ReloadNotice,
        _ => SignalAction::Stop,
    }
}

/// Blocks the handled signals on the calling thread and spawns a thread that
/// waits for them.
///
/// Must be called before any other thread is spawned, so every thread
/// inherits the blocked mask and only the waiter receives the signals.
pub fn install(shutdown: ShutdownFlag) -> io::Result<()> {
    let mut set = SigSet::empty();
    for signal in HANDLED {
        set.add(signal);
    }
    set.thread_block().map_err(io::Error::from)?;

    thread::Builder::new()
        .name("signals".to_string())
        .spawn(move || {
            loop {
                match set.wait() {
                    Ok(signal) => match action_for(signal) {
                        SignalAction::Stop => {
                            info!("Shutting down on {}", signal.as_str());
                            shutdown.request_stop();
                        }
                        SignalAction::ReloadNotice => {
                            info!(
                                "Received {}, configuration reload is not supported",
                                signal.as_str()
                            );
                        }
                    },
                    Err(e) => {
                        warn!("Waiting for signals failed: {}", e);
                        break;
                    }
                }
            }
        })?;

    Ok(())
}
