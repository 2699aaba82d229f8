//! Single consumer loop
//!
//! The processor owns its handler and runs on one dedicated thread. Each
//! wake-up it takes the longest contiguous run of published sequences,
//! hands every slot to the handler in ascending order, then moves the
//! consumer cursor past the run so producers can reuse those slots.

use crate::handler::{panic_message, EventHandler};
use crate::metrics::Metrics;
use crate::ring::RingBuffer;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Batch event processor for a ring of `T`
pub struct BatchEventProcessor<T, H> {
    ring: Arc<RingBuffer<T>>,
    handler: H,
    alerted: Arc<AtomicBool>,
    metrics: Option<Metrics>,
}

impl<T, H> BatchEventProcessor<T, H>
where
    T: Send + 'static,
    H: EventHandler<T> + 'static,
{
    /// Create a processor consuming `ring` with `handler`
    pub fn new(ring: Arc<RingBuffer<T>>, handler: H) -> Self {
        Self {
            ring,
            handler,
            alerted: Arc::new(AtomicBool::new(false)),
            metrics: None,
        }
    }

    /// Record batch sizes and the consumer cursor into `metrics`
    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Flag that asks the loop to drain and exit once set.
    ///
    /// Close the ring's sequencer before raising it, otherwise new claims
    /// keep the drain going.
    pub fn alert_flag(&self) -> Arc<AtomicBool> {
        self.alerted.clone()
    }

    /// Run the loop on a named thread; joining yields the handler back
    pub fn spawn(self, name: &str) -> io::Result<JoinHandle<H>> {
        thread::Builder::new()
            .name(name.to_string())
            .spawn(move || self.run())
    }

    /// Run the loop on the current thread until alerted and drained
    pub fn run(mut self) -> H {
        let ring = self.ring.clone();
        let sequencer = ring.sequencer();
        let mut next = sequencer.consumer_cursor() + 1;

        tracing::info!(
            capacity = sequencer.capacity(),
            start = next,
            "event processor started"
        );
        self.handler.on_start();

        loop {
            if let Some(available) = sequencer.wait_for(next, &self.alerted) {
                self.process_batch(next, available);
                next = available + 1;
                continue;
            }

            // Stop requested and nothing ready: finish whatever producers
            // already claimed. `in_flight` is read before the cursor so the
            // cursor cannot move after the final check.
            let idle = sequencer.in_flight() == 0;
            let claimed = sequencer.cursor();
            let available = sequencer.next_ready(next);
            if available >= next {
                self.process_batch(next, available);
                next = available + 1;
            } else if idle && claimed < next {
                break;
            } else {
                std::hint::spin_loop();
            }
        }

        self.handler.on_shutdown();
        tracing::info!(processed = next - 1, "event processor stopped");
        self.handler
    }

    fn process_batch(&mut self, first: i64, last: i64) {
        for sequence in first..=last {
            // SAFETY: `sequence` is published and the consumer cursor has not
            // passed it yet, so no producer can touch this slot.
            let event = unsafe { self.ring.get_mut(sequence) };
            let handler = &mut self.handler;
            let result = panic::catch_unwind(AssertUnwindSafe(|| {
                handler.on_event(event, sequence, sequence == last)
            }));
            if let Err(payload) = result {
                tracing::error!(
                    sequence,
                    message = %panic_message(payload.as_ref()),
                    "event handler panicked, continuing"
                );
            }
        }

        self.ring.sequencer().set_consumer_cursor(last);
        if let Some(metrics) = &self.metrics {
            metrics.record_batch((last - first + 1) as usize, last);
        }
    }
}

/// Ask a running processor to drain and exit
pub fn halt<T>(ring: &RingBuffer<T>, alerted: &AtomicBool) {
    ring.sequencer().close();
    alerted.store(true, Ordering::Release);
    ring.sequencer().signal();
}
