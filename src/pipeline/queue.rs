// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Bounded work queue between the watcher and the pipeline workers

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use tokio::sync::Notify;

use crate::config::Backpressure;
use crate::{Result, SnapSightError};

/// Result of a push
#[derive(Debug, PartialEq)]
pub enum PushOutcome<T> {
    Queued,
    /// The queue was full; this item (the oldest queued one, or the new one,
    /// depending on policy) was dropped
    Dropped(T),
}

struct QueueState<T> {
    items: VecDeque<T>,
    closed: bool,
}

pub struct WorkQueue<T> {
    state: Mutex<QueueState<T>>,
    capacity: usize,
    policy: Backpressure,
    not_empty: Notify,
    not_full: Notify,
}

impl<T> WorkQueue<T> {
    pub fn new(capacity: usize, policy: Backpressure) -> Self {
        Self {
            state: Mutex::new(QueueState {
                items: VecDeque::with_capacity(capacity),
                closed: false,
            }),
            capacity: capacity.max(1),
            policy,
            not_empty: Notify::new(),
            not_full: Notify::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState<T>> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Add an item, applying the backpressure policy when full.
    ///
    /// With [`Backpressure::Block`] this waits for a free slot.
    pub async fn push(&self, item: T) -> Result<PushOutcome<T>> {
        let mut item = Some(item);
        loop {
            let notified = self.not_full.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.lock();
                if state.closed {
                    return Err(SnapSightError::QueueClosed);
                }
                if state.items.len() < self.capacity {
                    if let Some(item) = item.take() {
                        state.items.push_back(item);
                    }
                    drop(state);
                    self.not_empty.notify_one();
                    return Ok(PushOutcome::Queued);
                }
                match self.policy {
                    Backpressure::DropNewest => {
                        if let Some(item) = item.take() {
                            return Ok(PushOutcome::Dropped(item));
                        }
                    }
                    Backpressure::DropOldest => {
                        let evicted = state.items.pop_front();
                        if let Some(item) = item.take() {
                            state.items.push_back(item);
                        }
                        drop(state);
                        self.not_empty.notify_one();
                        return Ok(match evicted {
                            Some(old) => PushOutcome::Dropped(old),
                            None => PushOutcome::Queued,
                        });
                    }
                    Backpressure::Block => {}
                }
            }

            notified.await;
        }
    }

    /// Next item, waiting if necessary. `None` once closed and drained.
    pub async fn pop(&self) -> Option<T> {
        loop {
            let notified = self.not_empty.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.lock();
                if let Some(item) = state.items.pop_front() {
                    drop(state);
                    self.not_full.notify_one();
                    return Some(item);
                }
                if state.closed {
                    return None;
                }
            }

            notified.await;
        }
    }

    /// Stop accepting items. Already queued items can still be popped.
    pub fn close(&self) {
        self.lock().closed = true;
        self.not_empty.notify_waiters();
        self.not_full.notify_waiters();
    }

    /// Remove everything still waiting in the queue
    pub fn take_pending(&self) -> Vec<T> {
        let pending: Vec<T> = self.lock().items.drain(..).collect();
        self.not_full.notify_waiters();
        pending
    }
}
