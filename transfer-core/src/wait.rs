//! Consumer wait strategies
//!
//! The consumer asks a strategy to wait until the highest contiguous
//! published sequence reaches the one it wants next. Busy spinning is the
//! default for the low-latency path; yielding and blocking variants trade
//! latency for CPU without changing what gets processed or in which order.

use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Raised when a stop was requested and nothing is ready
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Alerted;

/// Strategy used by the consumer to wait for published sequences.
pub trait WaitStrategy: Send + Sync + fmt::Debug {
    /// Wait until `ready()` returns a value `>= sequence`, returning it.
    ///
    /// `ready` must be checked before `alerted`, so a stop request never
    /// hides sequences that are already published.
    fn wait_for(
        &self,
        sequence: i64,
        ready: &dyn Fn() -> i64,
        alerted: &AtomicBool,
    ) -> Result<i64, Alerted>;

    /// Wake a consumer parked inside [`WaitStrategy::wait_for`]
    fn signal_all_when_blocking(&self);
}

/// Which strategy the engine builds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitStrategyKind {
    /// Poll continuously
    #[default]
    BusySpin,
    /// Spin briefly, then yield the thread
    Yielding,
    /// Park on a condition variable until signalled
    Blocking,
}

impl WaitStrategyKind {
    /// Build the strategy
    pub fn build(self) -> Arc<dyn WaitStrategy> {
        match self {
            WaitStrategyKind::BusySpin => Arc::new(BusySpinWaitStrategy),
            WaitStrategyKind::Yielding => Arc::new(YieldingWaitStrategy::default()),
            WaitStrategyKind::Blocking => Arc::new(BlockingWaitStrategy::default()),
        }
    }
}

impl fmt::Display for WaitStrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WaitStrategyKind::BusySpin => "busy_spin",
            WaitStrategyKind::Yielding => "yielding",
            WaitStrategyKind::Blocking => "blocking",
        };
        f.write_str(name)
    }
}

impl std::str::FromStr for WaitStrategyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "busy_spin" => Ok(WaitStrategyKind::BusySpin),
            "yielding" => Ok(WaitStrategyKind::Yielding),
            "blocking" => Ok(WaitStrategyKind::Blocking),
            other => Err(format!("unknown wait strategy: {}", other)),
        }
    }
}

/// Busy-spin: lowest latency, burns a core.
#[derive(Debug, Default, Clone, Copy)]
pub struct BusySpinWaitStrategy;

impl WaitStrategy for BusySpinWaitStrategy {
    fn wait_for(
        &self,
        sequence: i64,
        ready: &dyn Fn() -> i64,
        alerted: &AtomicBool,
    ) -> Result<i64, Alerted> {
        loop {
            let available = ready();
            if available >= sequence {
                return Ok(available);
            }
            if alerted.load(Ordering::Acquire) {
                return Err(Alerted);
            }
            std::hint::spin_loop();
        }
    }

    fn signal_all_when_blocking(&self) {}
}

/// Spin for a while, then `yield_now` between polls.
#[derive(Debug, Clone, Copy)]
pub struct YieldingWaitStrategy {
    spin_tries: u32,
}

impl Default for YieldingWaitStrategy {
    fn default() -> Self {
        Self { spin_tries: 100 }
    }
}

impl WaitStrategy for YieldingWaitStrategy {
    fn wait_for(
        &self,
        sequence: i64,
        ready: &dyn Fn() -> i64,
        alerted: &AtomicBool,
    ) -> Result<i64, Alerted> {
        let mut counter = self.spin_tries;
        loop {
            let available = ready();
            if available >= sequence {
                return Ok(available);
            }
            if alerted.load(Ordering::Acquire) {
                return Err(Alerted);
            }
            if counter == 0 {
                std::thread::yield_now();
            } else {
                counter -= 1;
                std::hint::spin_loop();
            }
        }
    }

    fn signal_all_when_blocking(&self) {}
}

/// Park on a condition variable; producers signal on publish.
#[derive(Debug)]
pub struct BlockingWaitStrategy {
    mutex: Mutex<()>,
    condvar: Condvar,
    recheck: Duration,
}

impl Default for BlockingWaitStrategy {
    fn default() -> Self {
        Self {
            mutex: Mutex::new(()),
            condvar: Condvar::new(),
            recheck: Duration::from_millis(1),
        }
    }
}

impl WaitStrategy for BlockingWaitStrategy {
    fn wait_for(
        &self,
        sequence: i64,
        ready: &dyn Fn() -> i64,
        alerted: &AtomicBool,
    ) -> Result<i64, Alerted> {
        loop {
            let available = ready();
            if available >= sequence {
                return Ok(available);
            }
            if alerted.load(Ordering::Acquire) {
                return Err(Alerted);
            }

            let mut guard = self.mutex.lock();
            // Re-check under the lock so a publish between the poll above
            // and parking is not slept through.
            if ready() < sequence && !alerted.load(Ordering::Acquire) {
                self.condvar.wait_for(&mut guard, self.recheck);
            }
        }
    }

    fn signal_all_when_blocking(&self) {
        let _guard = self.mutex.lock();
        self.condvar.notify_all();
    }
}
