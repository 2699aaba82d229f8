//! Pre-allocated ring of request slots and its multi-producer sequencer
//!
//! # Protocol
//!
//! ```text
//!  producer A ── claim() ──► seq 7 ── populate slot[7 & mask] ── publish(7) ─┐
//!  producer B ── claim() ──► seq 8 ── populate slot[8 & mask] ── publish(8) ─┤
//!                                                                            ▼
//!  consumer   ◄── next_ready(7) = highest contiguous published sequence ──────┘
//!             process 7..=n in order, then advance the consumer cursor to n
//! ```
//!
//! - `cursor` is the highest claimed sequence, moved by CAS so every
//!   sequence goes to exactly one producer.
//! - A claim waits while `next - consumer_cursor > capacity`; that bound is
//!   the only backpressure and it keeps memory fixed.
//! - Each slot has a publish flag holding the "lap" (`sequence >> shift`)
//!   it was last published for. The release store of that flag is the fence
//!   that hands the populated slot to the consumer.
//!
//! # Ordering hazard
//!
//! The consumer only ever processes a contiguous run of published
//! sequences. A producer that claims `n` and stalls before publishing holds
//! back every sequence above `n`, even ones already published. This is
//! inherent to a single shared ring and is kept as is: [`RingBuffer::publish_event`]
//! publishes from a drop guard so a panicking populate step cannot cause it.

use crate::error::{Error, Result};
use crate::sequence::{Sequence, INITIAL_CURSOR_VALUE};
use crate::wait::WaitStrategy;
use crossbeam::utils::{Backoff, CachePadded};
use std::cell::UnsafeCell;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicUsize, Ordering};
use std::sync::Arc;

/// Sequence coordination for many producers and one consumer.
pub struct Sequencer {
    capacity: i64,
    mask: i64,
    index_shift: u32,

    /// Highest claimed sequence
    cursor: Sequence,

    /// Highest sequence fully processed by the consumer
    consumer: Sequence,

    /// Lap each slot was last published for
    available: Box<[AtomicI32]>,

    /// Producers between entering `claim` and finishing `publish`
    in_flight: CachePadded<AtomicUsize>,

    closed: AtomicBool,
    wait_strategy: Arc<dyn WaitStrategy>,
}

impl Sequencer {
    /// Create a sequencer for a ring of `capacity` slots.
    pub fn new(capacity: usize, wait_strategy: Arc<dyn WaitStrategy>) -> Result<Self> {
        if capacity < 2 || !capacity.is_power_of_two() {
            return Err(Error::Config(format!(
                "ring capacity must be a power of two >= 2, got {}",
                capacity
            )));
        }

        let available = (0..capacity)
            .map(|_| AtomicI32::new(-1))
            .collect::<Vec<_>>()
            .into_boxed_slice();

        Ok(Self {
            capacity: capacity as i64,
            mask: capacity as i64 - 1,
            index_shift: capacity.trailing_zeros(),
            cursor: Sequence::new(INITIAL_CURSOR_VALUE),
            consumer: Sequence::new(INITIAL_CURSOR_VALUE),
            available,
            in_flight: CachePadded::new(AtomicUsize::new(0)),
            closed: AtomicBool::new(false),
            wait_strategy,
        })
    }

    /// Number of slots
    pub fn capacity(&self) -> usize {
        self.capacity as usize
    }

    /// Highest claimed sequence
    pub fn cursor(&self) -> i64 {
        self.cursor.get()
    }

    /// Highest sequence the consumer has finished
    pub fn consumer_cursor(&self) -> i64 {
        self.consumer.get()
    }

    /// Slots a producer could claim right now without waiting
    pub fn remaining_capacity(&self) -> i64 {
        self.capacity - (self.cursor.get() - self.consumer.get())
    }

    /// Reserve the next sequence.
    ///
    /// Waits while the ring is full. Fails with [`Error::Shutdown`] once the
    /// sequencer is closed, including while waiting for capacity. Every
    /// successful claim must be followed by exactly one [`Sequencer::publish`]
    /// of the same sequence; outside this crate that pairing is only
    /// reachable through [`RingBuffer::publish_event`].
    pub(crate) fn claim(&self) -> Result<i64> {
        // Registering before the closed check pairs with `close`: either the
        // stopping side sees this producer in flight, or we see `closed`.
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        if self.closed.load(Ordering::SeqCst) {
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            return Err(Error::Shutdown);
        }

        let backoff = Backoff::new();
        loop {
            let current = self.cursor.get();
            let next = current + 1;
            let wrap_point = next - self.capacity;

            if wrap_point > self.consumer.get() {
                if self.closed.load(Ordering::SeqCst) {
                    self.in_flight.fetch_sub(1, Ordering::SeqCst);
                    return Err(Error::Shutdown);
                }
                backoff.snooze();
                continue;
            }

            if self.cursor.compare_and_set(current, next) {
                return Ok(next);
            }
            backoff.spin();
        }
    }

    /// Mark a claimed sequence as ready for the consumer.
    ///
    /// `sequence` must come from [`Sequencer::claim`] and be published once.
    pub(crate) fn publish(&self, sequence: i64) {
        debug_assert!(
            sequence <= self.cursor.get() && !self.is_published(sequence),
            "sequence {} published without a matching claim",
            sequence
        );
        let index = (sequence & self.mask) as usize;
        self.available[index].store(self.lap(sequence), Ordering::Release);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.wait_strategy.signal_all_when_blocking();
    }

    /// Whether `sequence` has been published on its current lap
    pub fn is_published(&self, sequence: i64) -> bool {
        let index = (sequence & self.mask) as usize;
        self.available[index].load(Ordering::Acquire) == self.lap(sequence)
    }

    /// Highest sequence in `lower..=upper` such that every sequence up to it
    /// is published; `lower - 1` when `lower` itself is not.
    pub fn highest_published(&self, lower: i64, upper: i64) -> i64 {
        let mut sequence = lower;
        while sequence <= upper {
            if !self.is_published(sequence) {
                return sequence - 1;
            }
            sequence += 1;
        }
        upper
    }

    /// Highest contiguous published sequence starting at `next`.
    pub fn next_ready(&self, next: i64) -> i64 {
        self.highest_published(next, self.cursor.get())
    }

    /// Wait until `next` is published or the sequencer is closed and idle.
    pub(crate) fn wait_for(&self, next: i64, alerted: &AtomicBool) -> Option<i64> {
        self.wait_strategy
            .wait_for(next, &|| self.next_ready(next), alerted)
            .ok()
    }

    /// Release every slot up to and including `sequence` back to producers
    pub(crate) fn set_consumer_cursor(&self, sequence: i64) {
        self.consumer.set(sequence);
    }

    /// Refuse all future claims and wake producers waiting for capacity
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.wait_strategy.signal_all_when_blocking();
    }

    /// Whether [`Sequencer::close`] was called
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Producers that claimed but have not yet published
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Wake a consumer parked in its wait strategy
    pub(crate) fn signal(&self) {
        self.wait_strategy.signal_all_when_blocking();
    }

    fn lap(&self, sequence: i64) -> i32 {
        (sequence >> self.index_shift) as i32
    }
}

impl fmt::Debug for Sequencer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sequencer")
            .field("capacity", &self.capacity)
            .field("cursor", &self.cursor.get())
            .field("consumer", &self.consumer.get())
            .field("in_flight", &self.in_flight())
            .field("closed", &self.is_closed())
            .field("wait_strategy", &self.wait_strategy)
            .finish()
    }
}

/// Fixed array of reusable slots indexed by `sequence & mask`.
pub struct RingBuffer<T> {
    slots: Box<[UnsafeCell<T>]>,
    mask: i64,
    sequencer: Sequencer,
}

// SAFETY: a slot is only touched by the producer holding its claimed
// sequence (before publish) or by the single consumer (after publish and
// before the consumer cursor passes it). The sequencer's release/acquire
// publish flag and consumer cursor order those phases, and a claim cannot
// wrap onto a slot the consumer has not released.
unsafe impl<T: Send> Sync for RingBuffer<T> {}
unsafe impl<T: Send> Send for RingBuffer<T> {}

impl<T: Default> RingBuffer<T> {
    /// Pre-allocate `capacity` default slots.
    pub fn new(capacity: usize, wait_strategy: Arc<dyn WaitStrategy>) -> Result<Self> {
        let sequencer = Sequencer::new(capacity, wait_strategy)?;
        let slots = (0..capacity)
            .map(|_| UnsafeCell::new(T::default()))
            .collect::<Vec<_>>()
            .into_boxed_slice();

        Ok(Self {
            slots,
            mask: capacity as i64 - 1,
            sequencer,
        })
    }
}

impl<T> RingBuffer<T> {
    /// Sequence coordination for this ring
    pub fn sequencer(&self) -> &Sequencer {
        &self.sequencer
    }

    /// Number of slots
    pub fn capacity(&self) -> usize {
        self.sequencer.capacity()
    }

    /// Claim the next sequence (see [`Sequencer::claim`])
    pub(crate) fn next(&self) -> Result<i64> {
        self.sequencer.claim()
    }

    /// Publish a claimed sequence (see [`Sequencer::publish`])
    pub(crate) fn publish(&self, sequence: i64) {
        self.sequencer.publish(sequence);
    }

    /// Mutable access to the slot for `sequence`.
    ///
    /// # Safety
    ///
    /// The caller must own `sequence`: either it claimed it and has not yet
    /// published it, or it is the consumer and `sequence` is published but
    /// not yet released through the consumer cursor. No other reference to
    /// the same slot may be live.
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn get_mut(&self, sequence: i64) -> &mut T {
        &mut *self.slots[(sequence & self.mask) as usize].get()
    }

    /// Claim a slot, let `populate` fill it, then publish.
    ///
    /// This is the only public way to claim or publish: each claimed
    /// sequence is published exactly once, and only after `populate` has
    /// returned. Publishing happens from a drop guard, so the sequence is
    /// released to the consumer even if `populate` panics.
    pub fn publish_event<F>(&self, populate: F) -> Result<i64>
    where
        F: FnOnce(&mut T, i64),
    {
        let sequence = self.next()?;
        let _guard = PublishGuard {
            sequencer: &self.sequencer,
            sequence,
        };
        // SAFETY: `sequence` was just claimed by this call and is published
        // only when the guard drops, after this borrow ends.
        let slot = unsafe { self.get_mut(sequence) };
        populate(slot, sequence);
        Ok(sequence)
    }
}

impl<T> fmt::Debug for RingBuffer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RingBuffer")
            .field("sequencer", &self.sequencer)
            .finish_non_exhaustive()
    }
}

struct PublishGuard<'a> {
    sequencer: &'a Sequencer,
    sequence: i64,
}

impl Drop for PublishGuard<'_> {
    fn drop(&mut self) {
        self.sequencer.publish(self.sequence);
    }
}
