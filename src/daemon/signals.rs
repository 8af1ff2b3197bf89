//! Signal handling: SIGTERM/SIGINT request a graceful stop of the daemon loop.
//!
//! Uses the `signal-hook` crate for safe signal registration. The loop never
//! blocks on signals; it polls the flag while waiting between ticks, so a
//! shutdown takes effect at the next wait boundary and never interrupts a
//! resize in flight.

#![allow(missing_docs)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use signal_hook::consts::{SIGINT, SIGTERM};

/// Longest single sleep while waiting; bounds shutdown latency.
const WAIT_SLICE: Duration = Duration::from_millis(100);

/// Shutdown flag shared between the signal handler and the daemon loop.
#[derive(Clone)]
pub struct ShutdownSignal {
    shutdown_flag: Arc<AtomicBool>,
}

impl ShutdownSignal {
    /// Create a signal and register SIGTERM/SIGINT hooks.
    ///
    /// Registration is best-effort; failures are logged to stderr but not fatal.
    pub fn install() -> Self {
        let signal = Self::detached();
        signal.register_signals();
        signal
    }

    /// A signal with no OS hooks; only [`request_shutdown`](Self::request_shutdown) trips it.
    pub fn detached() -> Self {
        Self {
            shutdown_flag: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn should_shutdown(&self) -> bool {
        self.shutdown_flag.load(Ordering::Relaxed)
    }

    pub fn request_shutdown(&self) {
        self.shutdown_flag.store(true, Ordering::Relaxed);
    }

    /// Sleep for `duration` unless shutdown is requested first.
    ///
    /// Returns `true` when the full duration elapsed, `false` when the wait
    /// was cut short by a shutdown request.
    pub fn wait(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        loop {
            if self.should_shutdown() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            thread::sleep(WAIT_SLICE.min(deadline - now));
        }
    }

    fn register_signals(&self) {
        if let Err(e) = signal_hook::flag::register(SIGTERM, Arc::clone(&self.shutdown_flag)) {
            eprintln!("[EMB-SIGNAL] failed to register SIGTERM: {e}");
        }
        if let Err(e) = signal_hook::flag::register(SIGINT, Arc::clone(&self.shutdown_flag)) {
            eprintln!("[EMB-SIGNAL] failed to register SIGINT: {e}");
        }
    }
}
