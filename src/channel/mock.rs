//! Mock measurement channel for testing
//!
//! This channel implements [`MeasurementChannel`] without physical hardware.
//! It provides:
//! - Scripted readings (a queue, then a steady value)
//! - Simulated instrument latency
//! - Controllable failure injection (one-shot, every read, every configuration)
//! - Call logging for test verification

use super::MeasurementChannel;
use crate::error::ChannelError;
use crate::measurement::Phase;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Mock measurement channel for testing
///
/// # Example
///
/// ```
/// use ate_daq::channel::{MeasurementChannel, MockChannel};
///
/// # tokio_test::block_on(async {
/// let dmm = MockChannel::constant(1.234);
/// assert_eq!(dmm.read_one().await.unwrap(), 1.234);
/// assert_eq!(dmm.get_call_log(), vec!["read_one"]);
/// # })
/// ```
pub struct MockChannel {
    latency: Duration,
    readings: Mutex<VecDeque<f64>>,
    steady_value: f64,
    fail_next: AtomicBool,
    fail_reads: AtomicBool,
    fail_config: AtomicBool,
    read_count: AtomicU64,
    call_log: Arc<Mutex<Vec<String>>>,
}

impl MockChannel {
    /// Create a mock that reads `0.0` with no latency
    pub fn new() -> Self {
        Self::constant(0.0)
    }

    /// Create a mock that always reads `value`
    pub fn constant(value: f64) -> Self {
        Self {
            latency: Duration::ZERO,
            readings: Mutex::new(VecDeque::new()),
            steady_value: value,
            fail_next: AtomicBool::new(false),
            fail_reads: AtomicBool::new(false),
            fail_config: AtomicBool::new(false),
            read_count: AtomicU64::new(0),
            call_log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Serve `values` in order before falling back to the steady value
    pub fn with_readings(self, values: impl IntoIterator<Item = f64>) -> Self {
        self.readings.lock().extend(values);
        self
    }

    /// Set simulated latency for every call
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Make every `read_one` fail
    pub fn failing_reads(self) -> Self {
        self.fail_reads.store(true, Ordering::SeqCst);
        self
    }

    /// Make every configuration call fail
    pub fn failing_config(self) -> Self {
        self.fail_config.store(true, Ordering::SeqCst);
        self
    }

    /// Trigger a failure on the next operation
    pub fn trigger_failure(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    /// Number of `read_one` calls so far
    pub fn read_count(&self) -> u64 {
        self.read_count.load(Ordering::SeqCst)
    }

    /// Get a copy of the call log for verification
    pub fn get_call_log(&self) -> Vec<String> {
        self.call_log.lock().clone()
    }

    /// Clear the call log
    pub fn clear_call_log(&self) {
        self.call_log.lock().clear();
    }

    fn log_call(&self, call: String) {
        self.call_log.lock().push(call);
    }

    async fn simulate(&self, call: String, fail_always: &AtomicBool) -> Result<(), ChannelError> {
        self.log_call(call);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        if self.fail_next.swap(false, Ordering::SeqCst) || fail_always.load(Ordering::SeqCst) {
            return Err(ChannelError::Transport("Mock instrument failure".into()));
        }
        Ok(())
    }
}

impl Default for MockChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MeasurementChannel for MockChannel {
    async fn configure_autorange(&self, on: bool) -> Result<(), ChannelError> {
        self.simulate(format!("autorange {}", if on { "on" } else { "off" }), &self.fail_config)
            .await
    }

    async fn configure_function(&self, phase: Phase) -> Result<(), ChannelError> {
        self.simulate(format!("function {}", phase), &self.fail_config)
            .await
    }

    async fn configure_range(&self, value: f64) -> Result<(), ChannelError> {
        self.simulate(format!("range {}", value), &self.fail_config)
            .await
    }

    async fn read_one(&self) -> Result<f64, ChannelError> {
        self.read_count.fetch_add(1, Ordering::SeqCst);
        self.simulate("read_one".to_string(), &self.fail_reads).await?;
        let scripted = self.readings.lock().pop_front();
        Ok(scripted.unwrap_or(self.steady_value))
    }

    async fn identify(&self) -> Result<String, ChannelError> {
        self.log_call("identify".to_string());
        Ok("MOCK INSTRUMENTS,MODEL DMM6500,0,1.0.0".to_string())
    }

    fn describe(&self) -> String {
        format!("MockChannel (latency: {}ms)", self.latency.as_millis())
    }
}
