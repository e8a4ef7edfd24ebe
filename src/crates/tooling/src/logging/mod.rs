//! Turn instrumentation helpers
//!
//! [`PhaseTimer`] measures how long a named phase of a turn took. The
//! runtime reads `elapsed_ms` into the envelope metadata; dropping the
//! timer also logs the figure at debug level for traces without a
//! subscriber.

use std::time::Instant;
use tracing::debug;

/// Wall-clock timer for one named phase
pub struct PhaseTimer {
    phase: String,
    started: Instant,
}

impl PhaseTimer {
    /// Start timing a phase
    pub fn start(phase: impl Into<String>) -> Self {
        Self {
            phase: phase.into(),
            started: Instant::now(),
        }
    }

    /// Phase name this timer was started with
    pub fn phase(&self) -> &str {
        &self.phase
    }

    /// Elapsed wall time in milliseconds
    pub fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }
}

impl Drop for PhaseTimer {
    fn drop(&mut self) {
        debug!(phase = %self.phase, elapsed_ms = self.elapsed_ms(), "phase finished");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timer_reports_phase_and_elapsed() {
        let timer = PhaseTimer::start("process_query");
        assert_eq!(timer.phase(), "process_query");
        assert!(timer.elapsed_ms() < 1_000);
    }

    #[tokio::test]
    async fn test_elapsed_grows_with_time() {
        let timer = PhaseTimer::start("slow_phase");
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(timer.elapsed_ms() >= 20);
    }
}
