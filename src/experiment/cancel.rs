//! Pause/stop intents shared between the controller and a running engine.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Default)]
struct Flags {
    pause_requested: AtomicBool,
    stop_requested: AtomicBool,
}

/// Two independent intents polled by the engine at every loop boundary.
///
/// Cloning shares the flags. A token belongs to exactly one run; the engine
/// creates a fresh one on every start so a stale stop never leaks forward.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flags: Arc<Flags>,
}

impl CancellationToken {
    /// Fresh token with both intents cleared.
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the engine to hold at the next sample tick.
    pub fn request_pause(&self) {
        self.flags.pause_requested.store(true, Ordering::SeqCst);
    }

    /// Withdraw a pause request.
    pub fn resume(&self) {
        self.flags.pause_requested.store(false, Ordering::SeqCst);
    }

    /// Flip the pause intent; returns `true` when the run is now asked to pause.
    pub fn toggle_pause(&self) -> bool {
        !self.flags.pause_requested.fetch_xor(true, Ordering::SeqCst)
    }

    /// Ask the engine to finish. Irreversible for this token.
    pub fn request_stop(&self) {
        self.flags.stop_requested.store(true, Ordering::SeqCst);
    }

    /// Current pause intent.
    pub fn is_pause_requested(&self) -> bool {
        self.flags.pause_requested.load(Ordering::SeqCst)
    }

    /// Current stop intent.
    pub fn is_stop_requested(&self) -> bool {
        self.flags.stop_requested.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_intents() {
        let token = CancellationToken::new();
        let engine_side = token.clone();

        token.request_pause();
        assert!(engine_side.is_pause_requested());
        assert!(!engine_side.is_stop_requested());

        token.request_stop();
        assert!(engine_side.is_stop_requested());
    }

    #[test]
    fn toggle_reports_new_intent() {
        let token = CancellationToken::new();
        assert!(token.toggle_pause());
        assert!(token.is_pause_requested());
        assert!(!token.toggle_pause());
        assert!(!token.is_pause_requested());
    }

    #[test]
    fn resume_does_not_clear_stop() {
        let token = CancellationToken::new();
        token.request_stop();
        token.resume();
        assert!(token.is_stop_requested());
    }
}
