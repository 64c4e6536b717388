//! Observe-until-found
//!
//! Waits for the first element matching a selector. A match that already
//! exists fires the callback before `wait_for` returns; otherwise the wait
//! is parked until a mutation batch produces a match, its deadline passes,
//! or its handle is cancelled. Every wait fires at most once.
//!
//! The watcher keeps its [`MutationSource`] connected exactly while at
//! least one wait is parked.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

/// Something that can be searched with a CSS selector.
pub trait ElementQuery {
    type Element;

    fn query_selector(&self, selector: &str) -> Option<Self::Element>;
}

/// The page's subtree mutation stream.
pub trait MutationSource {
    fn connect(&self);
    fn disconnect(&self);
}

type Callback<E> = Box<dyn FnOnce(E)>;

struct Pending<E> {
    id: u64,
    selector: String,
    deadline: Option<u64>,
    callback: Callback<E>,
}

struct WatchState<E> {
    pending: Vec<Pending<E>>,
    next_id: u64,
    connected: bool,
}

struct WatcherInner<E> {
    source: Box<dyn MutationSource>,
    state: RefCell<WatchState<E>>,
}

impl<E> WatcherInner<E> {
    /// Disconnect from the mutation stream if nothing is parked anymore.
    fn settle(&self) {
        let disconnect = {
            let mut state = self.state.borrow_mut();
            if state.pending.is_empty() && state.connected {
                state.connected = false;
                true
            } else {
                false
            }
        };
        if disconnect {
            self.source.disconnect();
        }
    }
}

trait CancelWait {
    fn cancel(&self, id: u64) -> bool;
}

impl<E> CancelWait for WatcherInner<E> {
    fn cancel(&self, id: u64) -> bool {
        let removed = {
            let mut state = self.state.borrow_mut();
            let before = state.pending.len();
            state.pending.retain(|pending| pending.id != id);
            state.pending.len() != before
        };
        self.settle();
        removed
    }
}

/// Cancels one parked wait. Inert if the wait already fired or expired.
pub struct WatchHandle {
    target: Option<(Weak<dyn CancelWait>, u64)>,
}

impl WatchHandle {
    fn inert() -> Self {
        Self { target: None }
    }

    /// Returns whether a parked wait was cancelled.
    pub fn cancel(self) -> bool {
        match self.target {
            Some((weak, id)) => weak.upgrade().is_some_and(|inner| inner.cancel(id)),
            None => false,
        }
    }
}

pub struct ElementWatcher<E> {
    inner: Rc<WatcherInner<E>>,
}

impl<E: 'static> ElementWatcher<E> {
    pub fn new(source: impl MutationSource + 'static) -> Self {
        Self {
            inner: Rc::new(WatcherInner {
                source: Box::new(source),
                state: RefCell::new(WatchState {
                    pending: Vec::new(),
                    next_id: 0,
                    connected: false,
                }),
            }),
        }
    }

    /// Wait for `selector` under `root`.
    ///
    /// `timeout_ms == 0` waits until cancelled. `now_ms` is the caller's
    /// clock; the same clock must be passed to [`expire`](Self::expire).
    pub fn wait_for<Q>(
        &self,
        root: &Q,
        selector: &str,
        timeout_ms: u64,
        now_ms: u64,
        callback: impl FnOnce(E) + 'static,
    ) -> WatchHandle
    where
        Q: ElementQuery<Element = E>,
    {
        if let Some(element) = root.query_selector(selector) {
            callback(element);
            return WatchHandle::inert();
        }

        let (id, connect) = {
            let mut state = self.inner.state.borrow_mut();
            let id = state.next_id;
            state.next_id += 1;
            state.pending.push(Pending {
                id,
                selector: selector.to_string(),
                deadline: (timeout_ms > 0).then(|| now_ms.saturating_add(timeout_ms)),
                callback: Box::new(callback),
            });
            let connect = !state.connected;
            state.connected = true;
            (id, connect)
        };

        if connect {
            self.inner.source.connect();
        }

        let weak: Weak<WatcherInner<E>> = Rc::downgrade(&self.inner);
        let weak: Weak<dyn CancelWait> = weak;
        WatchHandle {
            target: Some((weak, id)),
        }
    }

    /// Re-check parked waits after a mutation batch. Returns how many fired.
    pub fn on_mutations<Q>(&self, root: &Q) -> usize
    where
        Q: ElementQuery<Element = E>,
    {
        let fired: Vec<(Callback<E>, E)> = {
            let mut state = self.inner.state.borrow_mut();
            let mut fired = Vec::new();
            let mut waiting = Vec::with_capacity(state.pending.len());
            for pending in state.pending.drain(..) {
                match root.query_selector(&pending.selector) {
                    Some(element) => fired.push((pending.callback, element)),
                    None => waiting.push(pending),
                }
            }
            state.pending = waiting;
            fired
        };

        self.inner.settle();

        let count = fired.len();
        for (callback, element) in fired {
            callback(element);
        }
        count
    }

    /// Drop waits whose deadline is at or before `now_ms`. Their callbacks
    /// never run. Returns how many expired.
    pub fn expire(&self, now_ms: u64) -> usize {
        let expired = {
            let mut state = self.inner.state.borrow_mut();
            let before = state.pending.len();
            state
                .pending
                .retain(|pending| pending.deadline.map_or(true, |deadline| deadline > now_ms));
            before - state.pending.len()
        };
        if expired > 0 {
            log::debug!("{expired} element wait(s) timed out");
        }
        self.inner.settle();
        expired
    }

    /// Expire due waits, then report how many milliseconds remain until the
    /// next deadline. `None` once no wait has a deadline left, which is when
    /// a timer driving expiry can stop re-arming.
    pub fn expire_and_next(&self, now_ms: u64) -> Option<u64> {
        self.expire(now_ms);
        self.next_deadline()
            .map(|deadline| deadline.saturating_sub(now_ms).max(1))
    }

    pub fn pending(&self) -> usize {
        self.inner.state.borrow().pending.len()
    }

    pub fn is_observing(&self) -> bool {
        self.inner.state.borrow().connected
    }

    /// Earliest deadline among parked waits.
    pub fn next_deadline(&self) -> Option<u64> {
        self.inner
            .state
            .borrow()
            .pending
            .iter()
            .filter_map(|pending| pending.deadline)
            .min()
    }
}
