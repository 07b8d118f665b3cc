//! Resource-bounded execution of analyzer invocations.
//!
//! Each invocation runs on a dedicated thread with a hard wall-clock
//! budget. Timeouts and panics are converted into `Fatal` component results
//! at this boundary; neither ever reaches the orchestrator as an unhandled
//! fault, and neither aborts sibling analyzers. The runner also owns
//! invocation timing, so `duration_ms` is stamped here rather than by a
//! separate instrumentation wrapper.

use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use crate::analyzer::{Analyzer, ComponentResult, PriorResults};
use crate::error::DiscoveryError;
use crate::fswalk::ProjectView;

/// Extra wall-clock slack granted beyond the configured timeout, so an
/// analyzer finishing right at the deadline is not spuriously killed.
pub const GRACE_MARGIN: Duration = Duration::from_millis(250);

/// Runs one analyzer invocation under a wall-clock limit.
pub struct SandboxRunner {
    timeout: Duration,
}

impl SandboxRunner {
    /// Create a runner with the given per-invocation budget.
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// The configured per-invocation budget.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Execute one analyzer. Always returns within `timeout + grace`.
    ///
    /// The worker thread is detached on timeout; whatever it eventually
    /// produces is dropped with the channel. A panic inside the analyzer is
    /// caught and converted, never propagated.
    pub fn run(
        &self,
        analyzer: Box<dyn Analyzer>,
        view: &ProjectView,
        prior: &PriorResults,
    ) -> ComponentResult {
        let name = analyzer.name();
        let started = Instant::now();

        let (tx, rx) = mpsc::channel();
        let view = view.clone();
        let prior = prior.clone();

        let spawned = thread::Builder::new()
            .name(format!("archscout-{}", name))
            .spawn(move || {
                let outcome =
                    panic::catch_unwind(AssertUnwindSafe(|| analyzer.analyze(&view, &prior)));
                // Receiver may be gone if we timed out; nothing to do then.
                let _ = tx.send(outcome);
            });

        // Spawn failure is an environment problem, not an analyzer fault,
        // but it still must not escape this boundary.
        if let Err(e) = spawned {
            let mut result =
                ComponentResult::fatal(name, format!("failed to spawn analyzer thread: {}", e));
            result.duration_ms = started.elapsed().as_millis() as u64;
            return result;
        }

        let mut result = match rx.recv_timeout(self.timeout + GRACE_MARGIN) {
            Ok(Ok(Ok(result))) => result,
            Ok(Ok(Err(e))) => ComponentResult::fatal(name, format!("analyzer failed: {:#}", e)),
            Ok(Err(panic_payload)) => ComponentResult::fatal(
                name,
                DiscoveryError::AnalyzerPanic {
                    analyzer: name.to_string(),
                    message: panic_message(panic_payload.as_ref()),
                }
                .to_string(),
            ),
            Err(mpsc::RecvTimeoutError::Timeout) => ComponentResult::fatal(
                name,
                DiscoveryError::AnalyzerTimeout {
                    analyzer: name.to_string(),
                    timeout_ms: self.timeout.as_millis() as u64,
                }
                .to_string(),
            ),
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                // Worker died without sending; treat like a panic.
                ComponentResult::fatal(name, "analyzer thread exited unexpectedly".to_string())
            }
        };

        result.duration_ms = started.elapsed().as_millis() as u64;
        result
    }
}

/// Best-effort extraction of a panic payload message.
fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
