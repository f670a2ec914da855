//! Bounded event ring
//!
//! A fixed array of pre-allocated event slots with a single publisher and
//! a chain of consumers, each advancing its own cursor. Capacity is a
//! power of two so slot indexing is a mask. No per-event allocation of
//! slots on the hot path and no locks between the publisher and the
//! consumers: the publisher release-stores its cursor after filling a
//! slot, consumers acquire-load it.
//!
//! ```text
//!            claim/write            acquire
//!  publisher ──────────► [slots] ◄─────────── handler 0
//!      ▲                              cursor0 ◄── handler 1 (never passes 0)
//!      │ waits on                     cursor1 ◄── handler 2 (never passes 1)
//!      └───────────────────────────── cursor2  (slowest; gates slot reuse)
//! ```
//!
//! The publisher side is serialized externally (the engine wraps publish
//! in its producer lock); this module only assumes calls to `publish` do
//! not overlap.

use super::{Event, EventKind};
use crossbeam_utils::Backoff;
use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// The bounded ring. Owned by the engine for the engine's lifetime.
pub struct EventRing {
    slots: Box<[UnsafeCell<Event>]>,
    mask: u64,
    /// Next sequence to publish. Slots `[0, published)` are visible to
    /// consumers.
    published: AtomicU64,
    /// Cursor of the final pipeline stage. Because stage N never overtakes
    /// stage N-1, this is the slowest consumer and gates slot reuse.
    gating: Arc<AtomicU64>,
}

// SAFETY: A slot is mutated only by the publisher, and only for sequences
// no consumer can be reading: the publisher waits until the gating cursor
// has passed `seq - capacity` before rewriting the slot for `seq`, and
// consumers only read slots below `published` (release-store by the
// publisher, acquire-load by consumers). Publisher calls are serialized by
// the engine's producer lock.
unsafe impl Send for EventRing {}
unsafe impl Sync for EventRing {}

impl EventRing {
    /// Create a ring with `capacity` pre-allocated slots.
    ///
    /// `capacity` must be a non-zero power of two (validated by config).
    /// `gating` is the final handler's cursor.
    pub fn new(capacity: usize, gating: Arc<AtomicU64>) -> Self {
        debug_assert!(capacity.is_power_of_two() && capacity > 0);
        let slots: Box<[UnsafeCell<Event>]> = (0..capacity)
            .map(|_| UnsafeCell::new(Event::empty()))
            .collect();
        Self {
            slots,
            mask: capacity as u64 - 1,
            published: AtomicU64::new(0),
            gating,
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Sequence of the next event to be published.
    #[inline]
    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Acquire)
    }

    /// Publish one event, populating the claimed slot through `fill`.
    ///
    /// Blocks (spin, then yield) while the ring is full, until the slowest
    /// consumer frees the slot. Returns the event's sequence. Must not be
    /// called re-entrantly; the caller serializes publishers.
    pub fn publish<F>(&self, kind: EventKind, timestamp_nanos: i64, fill: F) -> u64
    where
        F: FnOnce(&mut Event),
    {
        let seq = self.published.load(Ordering::Relaxed);

        // Wait for the slot to be released by the slowest consumer.
        let backoff = Backoff::new();
        while seq.wrapping_sub(self.gating.load(Ordering::Acquire)) >= self.slots.len() as u64 {
            backoff.snooze();
        }

        let idx = (seq & self.mask) as usize;
        // SAFETY: see the Send/Sync comment above; this slot is neither
        // read nor written by any other thread right now.
        unsafe {
            let event = &mut *self.slots[idx].get();
            event.clear(kind, seq, timestamp_nanos);
            fill(event);
        }

        self.published.store(seq + 1, Ordering::Release);
        seq
    }

    /// Read the event at `seq`. Callers must hold `seq < published()` and
    /// must not retain the reference past the handler return.
    #[inline]
    pub(crate) fn get(&self, seq: u64) -> &Event {
        let idx = (seq & self.mask) as usize;
        // SAFETY: consumers call this only for published sequences within
        // one capacity of their cursor; the publisher cannot be rewriting
        // the slot (it waits on the gating cursor).
        unsafe { &*self.slots[idx].get() }
    }
}
