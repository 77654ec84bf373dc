//! Push-based token fan-out with late subscription.
//!
//! Writes never block on consumers. Items are buffered until at least one
//! subscriber is attached; with `auto_flush` on, a buffer that reaches
//! `buffer_size` with nobody listening is discarded.
//!
//! Delivery is serialized: whichever caller finds the stream idle becomes
//! the drainer and keeps delivering until the buffer is empty. Writes made
//! meanwhile, from other threads or from inside a callback, are queued and
//! picked up by that drainer in write order.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

pub const DEFAULT_BUFFER_SIZE: usize = 1024;

/// Receives `(Some(item), false)` per item and `(None, true)` once at the end.
pub type TokenCallback<T> = Box<dyn FnMut(Option<T>, bool) + Send>;
pub type DoneCallback = Box<dyn FnOnce() + Send>;

pub type SubscriberId = usize;

type Slot<T> = Arc<Mutex<TokenCallback<T>>>;

struct Subscriber<T> {
    id: SubscriberId,
    on_token: Slot<T>,
    active: Arc<AtomicBool>,
    on_done: Option<DoneCallback>,
}

struct State<T> {
    buffer: VecDeque<T>,
    ended: bool,
    draining: bool,
    subscribers: Vec<Subscriber<T>>,
    next_id: SubscriberId,
}

struct Inner<T> {
    state: Mutex<State<T>>,
    buffer_size: usize,
    auto_flush: bool,
}

enum Work<T> {
    Deliver(Vec<T>, Vec<(Slot<T>, Arc<AtomicBool>)>),
    Finish(Vec<Subscriber<T>>),
}

pub struct TokenStream<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for TokenStream<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Clone + Send + 'static> TokenStream<T> {
    pub fn new() -> Self {
        Self::with_options(DEFAULT_BUFFER_SIZE, true)
    }

    pub fn with_options(buffer_size: usize, auto_flush: bool) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State {
                    buffer: VecDeque::new(),
                    ended: false,
                    draining: false,
                    subscribers: Vec::new(),
                    next_id: 0,
                }),
                buffer_size,
                auto_flush,
            }),
        }
    }

    pub fn with_buffer_size(buffer_size: usize) -> Self {
        Self::with_options(buffer_size, true)
    }

    pub fn buffer_size(&self) -> usize {
        self.inner.buffer_size
    }

    pub fn auto_flush(&self) -> bool {
        self.inner.auto_flush
    }

    /// Returns `false` if the stream has already ended.
    pub fn write(&self, item: T) -> bool {
        self.write_many(std::iter::once(item))
    }

    pub fn write_many<I>(&self, items: I) -> bool
    where
        I: IntoIterator<Item = T>,
    {
        {
            let mut state = self.inner.state.lock();
            if state.ended {
                return false;
            }
            state.buffer.extend(items);
        }
        self.drain();
        true
    }

    /// Ends the stream. Repeated calls are no-ops.
    ///
    /// Subscribers get their terminal notification once every item written
    /// before the call has been delivered to them.
    pub fn end(&self) {
        {
            let mut state = self.inner.state.lock();
            if state.ended {
                return;
            }
            state.ended = true;
        }
        self.drain();
    }

    /// Attaches a consumer. Items still buffered are delivered to it right
    /// away; on an ended stream it only receives the terminal notification.
    pub fn subscribe<F, D>(&self, on_token: F, on_done: Option<D>) -> Subscription<T>
    where
        F: FnMut(Option<T>, bool) + Send + 'static,
        D: FnOnce() + Send + 'static,
    {
        let mut subscriber = Subscriber {
            id: 0,
            on_token: Arc::new(Mutex::new(Box::new(on_token) as TokenCallback<T>)),
            active: Arc::new(AtomicBool::new(true)),
            on_done: on_done.map(|d| Box::new(d) as DoneCallback),
        };

        let (id, rejected) = {
            let mut state = self.inner.state.lock();
            let id = state.next_id;
            state.next_id += 1;
            subscriber.id = id;
            if state.ended {
                (id, Some(subscriber))
            } else {
                state.subscribers.push(subscriber);
                (id, None)
            }
        };

        match rejected {
            Some(subscriber) => finish(subscriber),
            None => self.drain(),
        }

        Subscription {
            stream: Arc::downgrade(&self.inner),
            id,
        }
    }

    /// Convenience for consumers that only care about items.
    pub fn on_token<F>(&self, on_token: F) -> Subscription<T>
    where
        F: FnMut(Option<T>, bool) + Send + 'static,
    {
        self.subscribe(on_token, None::<fn()>)
    }

    pub fn is_ended(&self) -> bool {
        self.inner.state.lock().ended
    }

    /// Items written but not yet delivered.
    pub fn buffered(&self) -> usize {
        self.inner.state.lock().buffer.len()
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.state.lock().subscribers.len()
    }

    fn drain(&self) {
        {
            let mut state = self.inner.state.lock();
            if state.draining {
                return;
            }
            state.draining = true;
        }

        loop {
            let work = {
                let mut state = self.inner.state.lock();
                if state.subscribers.is_empty() {
                    if self.inner.auto_flush && state.buffer.len() >= self.inner.buffer_size {
                        tracing::debug!(dropped = state.buffer.len(), "token stream buffer full, flushing");
                        state.buffer.clear();
                    }
                    state.draining = false;
                    return;
                }
                if !state.buffer.is_empty() {
                    let items: Vec<T> = state.buffer.drain(..).collect();
                    let slots = state
                        .subscribers
                        .iter()
                        .map(|s| (Arc::clone(&s.on_token), Arc::clone(&s.active)))
                        .collect();
                    Work::Deliver(items, slots)
                } else if state.ended {
                    Work::Finish(std::mem::take(&mut state.subscribers))
                } else {
                    state.draining = false;
                    return;
                }
            };

            match work {
                Work::Deliver(items, slots) => {
                    for item in items {
                        for (slot, active) in &slots {
                            if active.load(Ordering::SeqCst) {
                                deliver(slot, Some(item.clone()), false);
                            }
                        }
                    }
                }
                Work::Finish(subscribers) => {
                    for subscriber in subscribers {
                        finish(subscriber);
                    }
                }
            }
        }
    }
}

impl<T: Clone + Send + 'static> Default for TokenStream<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle returned by [`TokenStream::subscribe`]. Dropping it keeps the
/// subscription alive; call [`Subscription::unsubscribe`] to detach.
pub struct Subscription<T> {
    stream: Weak<Inner<T>>,
    id: SubscriberId,
}

impl<T> Subscription<T> {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Removes the subscriber and its done-callback. Returns `false` if it
    /// was already gone.
    pub fn unsubscribe(self) -> bool {
        let Some(inner) = self.stream.upgrade() else {
            return false;
        };
        let mut state = inner.state.lock();
        let Some(pos) = state.subscribers.iter().position(|s| s.id == self.id) else {
            return false;
        };
        let removed = state.subscribers.remove(pos);
        removed.active.store(false, Ordering::SeqCst);
        true
    }
}

fn finish<T>(subscriber: Subscriber<T>) {
    deliver(&subscriber.on_token, None, true);
    if let Some(on_done) = subscriber.on_done {
        if panic::catch_unwind(AssertUnwindSafe(on_done)).is_err() {
            tracing::error!(subscriber = subscriber.id, "token stream done-callback panicked");
        }
    }
}

/// Runs one callback with panics contained. Only the drainer calls this, so
/// the slot lock is never contended by another delivery.
fn deliver<T>(slot: &Slot<T>, item: Option<T>, done: bool) {
    let mut callback = slot.lock();
    if panic::catch_unwind(AssertUnwindSafe(|| (*callback)(item, done))).is_err() {
        tracing::error!("token stream subscriber panicked");
    }
}
