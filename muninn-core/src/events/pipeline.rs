//! Handler pipeline
//!
//! A fixed ordered chain of handlers consumes ring events on dedicated
//! threads. Each handler owns a cursor; handler N is bounded by handler
//! N-1's cursor, so every handler observes events in publication order and
//! the chain order OrderHandler -> PositionHandler -> MetricsHandler holds
//! for every event. The final cursor gates slot reuse in the ring.
//!
//! Handlers must be non-blocking and must not publish to the ring.

use super::{Event, EventRing};
use crossbeam_utils::Backoff;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error};

/// A pipeline stage.
///
/// `on_event` runs on the stage's own thread, in publication order. The
/// event reference is only valid for the duration of the call.
pub trait EventHandler: Send {
    fn name(&self) -> &'static str;

    fn on_event(&mut self, sequence: u64, event: &Event);
}

/// The running consumer chain.
pub struct Pipeline {
    threads: Vec<JoinHandle<()>>,
    cursors: Vec<Arc<AtomicU64>>,
    running: Arc<AtomicBool>,
}

impl Pipeline {
    /// Allocate one cursor per stage. Call before constructing the ring so
    /// the last cursor can be handed to it as the gating cursor.
    pub fn cursors(stages: usize) -> Vec<Arc<AtomicU64>> {
        (0..stages).map(|_| Arc::new(AtomicU64::new(0))).collect()
    }

    /// Spawn one consumer thread per handler.
    ///
    /// `cursors` must be the vector returned by [`Pipeline::cursors`] for
    /// the same number of handlers, with the last one given to the ring.
    pub fn start(
        ring: Arc<EventRing>,
        handlers: Vec<Box<dyn EventHandler>>,
        cursors: Vec<Arc<AtomicU64>>,
    ) -> Self {
        assert_eq!(handlers.len(), cursors.len());
        let running = Arc::new(AtomicBool::new(true));
        let mut threads = Vec::with_capacity(handlers.len());

        for (stage, mut handler) in handlers.into_iter().enumerate() {
            let ring = ring.clone();
            let running = running.clone();
            let running_err = running.clone();
            let cursor = cursors[stage].clone();
            // Stage 0 is bounded by the publisher; stage N by stage N-1.
            let upstream = if stage == 0 {
                None
            } else {
                Some(cursors[stage - 1].clone())
            };

            let handle = thread::Builder::new()
                .name(format!("pipeline-{}", handler.name()))
                .spawn(move || {
                    run_stage(&ring, handler.as_mut(), &cursor, upstream.as_deref(), &running);
                });

            match handle {
                Ok(h) => threads.push(h),
                Err(e) => {
                    error!(stage, error = %e, "failed to spawn pipeline stage");
                    running_err.store(false, Ordering::Release);
                }
            }
        }

        Self {
            threads,
            cursors,
            running,
        }
    }

    /// Cursor positions per stage (events consumed so far).
    pub fn positions(&self) -> Vec<u64> {
        self.cursors
            .iter()
            .map(|c| c.load(Ordering::Acquire))
            .collect()
    }

    /// Stop accepting work and join once every stage has drained to the
    /// producer cursor. The publisher must already have stopped.
    pub fn drain_and_stop(mut self, ring: &EventRing) {
        let target = ring.published();
        let backoff = Backoff::new();
        while self
            .cursors
            .iter()
            .any(|c| c.load(Ordering::Acquire) < target)
        {
            backoff.snooze();
        }

        self.running.store(false, Ordering::Release);
        for handle in self.threads.drain(..) {
            if handle.join().is_err() {
                error!("pipeline stage panicked during shutdown");
            }
        }
        debug!(drained_to = target, "pipeline stopped");
    }
}

fn run_stage(
    ring: &EventRing,
    handler: &mut dyn EventHandler,
    cursor: &AtomicU64,
    upstream: Option<&AtomicU64>,
    running: &AtomicBool,
) {
    let mut next = cursor.load(Ordering::Relaxed);
    let backoff = Backoff::new();

    loop {
        let published = ring.published();
        let limit = match upstream {
            Some(up) => published.min(up.load(Ordering::Acquire)),
            None => published,
        };

        if next < limit {
            while next < limit {
                let event = ring.get(next);
                handler.on_event(next, event);
                next += 1;
                cursor.store(next, Ordering::Release);
            }
            backoff.reset();
        } else {
            if !running.load(Ordering::Acquire) && next >= ring.published() {
                break;
            }
            backoff.snooze();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;
    use std::sync::atomic::AtomicU64 as StdAtomicU64;
    use std::sync::Mutex;

    /// Records the sequences it sees into a shared log.
    struct Recorder {
        name: &'static str,
        log: Arc<Mutex<Vec<(u64, &'static str)>>>,
        seen: Arc<StdAtomicU64>,
    }

    impl EventHandler for Recorder {
        fn name(&self) -> &'static str {
            self.name
        }

        fn on_event(&mut self, sequence: u64, _event: &Event) {
            self.log.lock().unwrap().push((sequence, self.name));
            self.seen.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn build(stages: Vec<&'static str>) -> (
        Arc<EventRing>,
        Pipeline,
        Arc<Mutex<Vec<(u64, &'static str)>>>,
        Vec<Arc<StdAtomicU64>>,
    ) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let seen: Vec<Arc<StdAtomicU64>> =
            stages.iter().map(|_| Arc::new(StdAtomicU64::new(0))).collect();
        let cursors = Pipeline::cursors(stages.len());
        let ring = Arc::new(EventRing::new(16, cursors[stages.len() - 1].clone()));
        let handlers: Vec<Box<dyn EventHandler>> = stages
            .iter()
            .zip(seen.iter())
            .map(|(name, seen)| {
                Box::new(Recorder {
                    name: *name,
                    log: log.clone(),
                    seen: seen.clone(),
                }) as Box<dyn EventHandler>
            })
            .collect();
        let pipeline = Pipeline::start(ring.clone(), handlers, cursors);
        (ring, pipeline, log, seen)
    }

    #[test]
    fn test_every_stage_sees_publication_order() {
        let (ring, pipeline, log, _seen) = build(vec!["a", "b", "c"]);

        for i in 0..50u64 {
            ring.publish(EventKind::QuoteUpdate, i as i64, |_| {});
        }
        pipeline.drain_and_stop(&ring);

        let log = log.lock().unwrap();
        for stage in ["a", "b", "c"] {
            let seqs: Vec<u64> = log
                .iter()
                .filter(|(_, s)| *s == stage)
                .map(|(seq, _)| *seq)
                .collect();
            assert_eq!(seqs, (0..50).collect::<Vec<_>>(), "stage {}", stage);
        }
    }

    #[test]
    fn test_later_stage_never_overtakes() {
        let (ring, pipeline, log, _seen) = build(vec!["first", "second"]);

        for i in 0..200u64 {
            ring.publish(EventKind::QuoteUpdate, i as i64, |_| {});
        }
        pipeline.drain_and_stop(&ring);

        // For every sequence, "first" must appear before "second".
        let log = log.lock().unwrap();
        let mut first_at = std::collections::HashMap::new();
        for (pos, (seq, stage)) in log.iter().enumerate() {
            if *stage == "first" {
                first_at.insert(*seq, pos);
            }
        }
        for (pos, (seq, stage)) in log.iter().enumerate() {
            if *stage == "second" {
                let fpos = first_at.get(seq).copied().unwrap();
                assert!(fpos < pos, "stage order violated at sequence {}", seq);
            }
        }
    }

    #[test]
    fn test_drain_processes_everything() {
        let (ring, pipeline, _log, seen) = build(vec!["only"]);
        for i in 0..1000u64 {
            ring.publish(EventKind::QuoteUpdate, i as i64, |_| {});
        }
        pipeline.drain_and_stop(&ring);
        assert_eq!(seen[0].load(Ordering::SeqCst), 1000);
    }

    #[test]
    fn test_wraparound_beyond_capacity() {
        // Ring capacity 16, publish 10x that; backpressure must not lose
        // or reorder anything.
        let (ring, pipeline, log, _seen) = build(vec!["x", "y", "z"]);
        for i in 0..160u64 {
            ring.publish(EventKind::QuoteUpdate, i as i64, |e| {
                e.client_order_id = i as i64;
            });
        }
        pipeline.drain_and_stop(&ring);

        let log = log.lock().unwrap();
        assert_eq!(log.len(), 160 * 3);
    }
}
