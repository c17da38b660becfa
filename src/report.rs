//! Diagnostics reporting port.
//!
//! The solver and basis builder emit purely observational text (basis tables,
//! condition numbers, per-atom coefficient rows, convergence warnings)
//! through an injected [`Reporter`] rather than a process-wide logger. The
//! default [`NullReporter`] discards everything, which keeps tests silent;
//! [`TracingReporter`] forwards to the `tracing` ecosystem.

/// Sink for diagnostic output. No core behavior depends on it.
pub trait Reporter {
    /// Verbose per-atom and per-iteration detail.
    fn debug(&self, message: &str);

    /// Run-level milestones: basis summary, conditioning, iteration counts.
    fn info(&self, message: &str);

    /// Non-fatal problems, such as exhausting the iteration cap.
    fn warn(&self, message: &str);
}

/// Reporter that discards all messages. The default for constructed solvers.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullReporter;

impl Reporter for NullReporter {
    fn debug(&self, _message: &str) {}

    fn info(&self, _message: &str) {}

    fn warn(&self, _message: &str) {}
}

/// Reporter that forwards to the `tracing` macros at matching levels.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl Reporter for TracingReporter {
    fn debug(&self, message: &str) {
        tracing::debug!("{message}");
    }

    fn info(&self, message: &str) {
        tracing::info!("{message}");
    }

    fn warn(&self, message: &str) {
        tracing::warn!("{message}");
    }
}

/// Reporter that appends every message to a shared buffer.
///
/// Clones share the same buffer, so a test can hand one clone to a solver
/// and inspect the other after the run.
#[derive(Debug, Default, Clone)]
pub struct CapturingReporter {
    lines: std::sync::Arc<std::sync::Mutex<Vec<String>>>,
}

impl CapturingReporter {
    /// Creates an empty capturing reporter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of every message captured so far.
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().expect("reporter buffer poisoned").clone()
    }
}

impl Reporter for CapturingReporter {
    fn debug(&self, message: &str) {
        self.lines.lock().expect("reporter buffer poisoned").push(message.to_string());
    }

    fn info(&self, message: &str) {
        self.lines.lock().expect("reporter buffer poisoned").push(message.to_string());
    }

    fn warn(&self, message: &str) {
        self.lines.lock().expect("reporter buffer poisoned").push(message.to_string());
    }
}
