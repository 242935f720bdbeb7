//! The node's event queue.
//!
//! The runtime pushes events; the application pops them through
//! [`Node::recv`](crate::Node::recv). Pollers register a watcher to be woken
//! whenever an event arrives. The queue is bounded; once full, new events
//! are dropped until the application catches up.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tokio::sync::Notify;

use crate::Event;

#[derive(Default)]
struct InboxState {
    queue: VecDeque<Event>,
    closed: bool,
    watchers: Vec<Weak<Notify>>,
}

pub(crate) struct Inbox {
    state: Mutex<InboxState>,
    notify: Notify,
    capacity: usize,
}

/// What happened to a pushed event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PushOutcome {
    Queued,
    /// The queue held `capacity` unread events; this one was dropped.
    Full,
    Closed,
}

impl Inbox {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            state: Mutex::new(InboxState::default()),
            notify: Notify::new(),
            capacity: capacity.max(1),
        }
    }

    fn state(&self) -> MutexGuard<'_, InboxState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue an event unless the inbox is closed or full.
    pub(crate) fn push(&self, event: Event) -> PushOutcome {
        let mut state = self.state();
        if state.closed {
            return PushOutcome::Closed;
        }
        if state.queue.len() >= self.capacity {
            return PushOutcome::Full;
        }
        state.queue.push_back(event);
        self.wake(state);
        PushOutcome::Queued
    }

    /// Queue `last` regardless of capacity, then close. Used for STOP so the
    /// application always learns the node ended.
    pub(crate) fn finish(&self, last: Event) {
        let mut state = self.state();
        if !state.closed {
            state.queue.push_back(last);
        }
        state.closed = true;
        self.wake(state);
    }

    fn wake(&self, mut state: MutexGuard<'_, InboxState>) {
        state.watchers.retain(|w| match w.upgrade() {
            Some(watcher) => {
                watcher.notify_one();
                true
            }
            None => false,
        });
        drop(state);
        self.notify.notify_waiters();
    }

    /// Wait for the next event. `None` once the inbox is closed and drained.
    pub(crate) async fn recv(&self) -> Option<Event> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            {
                let mut state = self.state();
                if let Some(event) = state.queue.pop_front() {
                    return Some(event);
                }
                if state.closed {
                    return None;
                }
            }
            notified.await;
        }
    }

    pub(crate) fn try_recv(&self) -> Option<Event> {
        self.state().queue.pop_front()
    }

    /// Whether an event can be popped without waiting.
    pub(crate) fn is_ready(&self) -> bool {
        !self.state().queue.is_empty()
    }

    /// Refuse further events. Queued events stay readable.
    pub(crate) fn close(&self) {
        let mut state = self.state();
        state.closed = true;
        for watcher in state.watchers.drain(..).filter_map(|w| w.upgrade()) {
            watcher.notify_one();
        }
        drop(state);
        self.notify.notify_waiters();
    }

    pub(crate) fn watch(&self, watcher: &Arc<Notify>) {
        let mut state = self.state();
        let already = state
            .watchers
            .iter()
            .any(|w| w.upgrade().is_some_and(|w| Arc::ptr_eq(&w, watcher)));
        if !already {
            state.watchers.push(Arc::downgrade(watcher));
        }
    }

    pub(crate) fn unwatch(&self, watcher: &Arc<Notify>) {
        self.state()
            .watchers
            .retain(|w| w.upgrade().is_some_and(|w| !Arc::ptr_eq(&w, watcher)));
    }
}
