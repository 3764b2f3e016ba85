// src/queue.rs - Bounded FIFO between trajectory ingestion and the execution worker
use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use thiserror::Error;

use crate::config::OverflowPolicy;
use crate::waypoint::Waypoint;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("Waypoint queue full (capacity {capacity})")]
    Full { capacity: usize },
    #[error("Waypoint queue closed")]
    Closed,
    #[error("Waypoint queue cleared while enqueuing")]
    Cleared,
}

#[derive(Debug, Default)]
struct QueueInner {
    items: VecDeque<Waypoint>,
    /// Waypoints handed to the consumer and not yet released with `task_done`.
    in_flight: usize,
    /// Bumped by every `clear`; producers from an older generation are turned away.
    generation: u64,
    closed: bool,
}

/// Thread-safe waypoint FIFO.
///
/// Push, pop and clear all run under the same internal lock, so `clear` can
/// never interleave with a dequeue in progress. The queue also counts
/// waypoints the consumer is still working on; `is_busy` reports those too.
#[derive(Debug)]
pub struct WaypointQueue {
    inner: Mutex<QueueInner>,
    not_empty: Condvar,
    not_full: Condvar,
    capacity: Option<usize>,
    policy: OverflowPolicy,
}

impl WaypointQueue {
    /// `capacity` of `None` means unbounded.
    pub fn new(capacity: Option<usize>, policy: OverflowPolicy) -> Self {
        Self {
            inner: Mutex::new(QueueInner::default()),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            capacity,
            policy,
        }
    }

    pub fn unbounded() -> Self {
        Self::new(None, OverflowPolicy::Block)
    }

    fn lock(&self) -> MutexGuard<'_, QueueInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_full(&self, inner: &QueueInner) -> bool {
        self.capacity.is_some_and(|cap| inner.items.len() >= cap)
    }

    /// Appends to the tail. When full, blocks or fails per the overflow policy.
    /// Fails with `Cleared` if the queue is cleared while blocked.
    pub fn enqueue(&self, waypoint: Waypoint) -> Result<(), QueueError> {
        self.push(waypoint, None)
    }

    /// Like [`enqueue`](Self::enqueue), but also fails with `Cleared` if the
    /// queue has been cleared at any point since `generation` was read.
    pub fn enqueue_for(&self, waypoint: Waypoint, generation: u64) -> Result<(), QueueError> {
        self.push(waypoint, Some(generation))
    }

    /// Current clear generation.
    pub fn generation(&self) -> u64 {
        self.lock().generation
    }

    fn push(&self, waypoint: Waypoint, generation: Option<u64>) -> Result<(), QueueError> {
        let mut inner = self.lock();
        let generation = generation.unwrap_or(inner.generation);
        loop {
            if inner.closed {
                return Err(QueueError::Closed);
            }
            if inner.generation != generation {
                return Err(QueueError::Cleared);
            }
            if !self.is_full(&inner) {
                break;
            }
            match (self.policy, self.capacity) {
                (OverflowPolicy::Reject, Some(capacity)) => {
                    return Err(QueueError::Full { capacity });
                }
                _ => {
                    inner = self
                        .not_full
                        .wait(inner)
                        .unwrap_or_else(PoisonError::into_inner);
                }
            }
        }
        inner.items.push_back(waypoint);
        drop(inner);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Blocks until a waypoint is available and returns it, marking it in flight.
    /// Returns `None` once the queue has been closed.
    pub fn dequeue(&self) -> Option<Waypoint> {
        let mut inner = self.lock();
        loop {
            if inner.closed {
                return None;
            }
            if let Some(waypoint) = inner.items.pop_front() {
                inner.in_flight += 1;
                drop(inner);
                self.not_full.notify_one();
                return Some(waypoint);
            }
            inner = self
                .not_empty
                .wait(inner)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Releases one waypoint previously returned by a dequeue.
    pub fn task_done(&self) {
        let mut inner = self.lock();
        inner.in_flight = inner.in_flight.saturating_sub(1);
    }

    /// Atomically drops every queued waypoint and turns away producers blocked
    /// on a full queue. In-flight work is unaffected.
    pub fn clear(&self) -> usize {
        let mut inner = self.lock();
        let dropped = inner.items.len();
        inner.items.clear();
        inner.generation = inner.generation.wrapping_add(1);
        drop(inner);
        self.not_full.notify_all();
        dropped
    }

    /// Wakes every blocked producer and consumer. Queued waypoints are kept.
    pub fn close(&self) {
        self.lock().closed = true;
        self.not_empty.notify_all();
        self.not_full.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub fn is_empty(&self) -> bool {
        self.lock().items.is_empty()
    }

    /// True while anything is queued or still being executed.
    pub fn is_busy(&self) -> bool {
        let inner = self.lock();
        !inner.items.is_empty() || inner.in_flight > 0
    }

    pub fn len(&self) -> usize {
        self.lock().items.len()
    }
}
