//! Local publish/subscribe router.
//!
//! [`EventRouter`] maps an event key to an ordered list of callbacks. It knows
//! nothing about transports: the connection manager feeds it parsed events,
//! UI-side code subscribes to the keys it cares about.

use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::{debug, error};

type Callback<P> = Arc<dyn Fn(&P) + Send + Sync>;

struct Handler<P> {
    id: u64,
    callback: Callback<P>,
}

struct RouterInner<K, P> {
    next_id: u64,
    handlers: HashMap<K, Vec<Handler<P>>>,
}

/// Generic event router keyed by `K`, delivering `&P` to subscribers.
///
/// Cloning is cheap; clones share the same subscriber table.
pub struct EventRouter<K, P> {
    inner: Arc<Mutex<RouterInner<K, P>>>,
}

impl<K, P> Clone for EventRouter<K, P> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<K, P> Default for EventRouter<K, P>
where
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
    P: 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, P> EventRouter<K, P>
where
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
    P: 'static,
{
    /// Create a router with no subscribers.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(RouterInner {
                next_id: 1,
                handlers: HashMap::new(),
            })),
        }
    }

    /// Register `callback` for `key`.
    ///
    /// Every call produces a distinct registration, even for the same
    /// callback and key; the returned [`Subscription`] removes only its own.
    pub fn subscribe<F>(&self, key: K, callback: F) -> Subscription
    where
        F: Fn(&P) + Send + Sync + 'static,
    {
        let id = {
            let mut inner = self.inner.lock();
            let id = inner.next_id;
            inner.next_id += 1;
            inner.handlers.entry(key.clone()).or_default().push(Handler {
                id,
                callback: Arc::new(callback),
            });
            id
        };
        debug!(?key, subscription = id, "subscribed");

        let weak: Weak<Mutex<RouterInner<K, P>>> = Arc::downgrade(&self.inner);
        Subscription {
            remove: Box::new(move || {
                let Some(inner) = weak.upgrade() else {
                    return;
                };
                let mut inner = inner.lock();
                if let Some(list) = inner.handlers.get_mut(&key) {
                    list.retain(|h| h.id != id);
                    if list.is_empty() {
                        inner.handlers.remove(&key);
                    }
                }
            }),
        }
    }

    /// Invoke every callback registered for `key`, in registration order.
    ///
    /// Works on a snapshot taken before the first callback runs, so callbacks
    /// may subscribe or unsubscribe freely. A panicking callback is logged and
    /// skipped. Returns the number of callbacks that completed normally.
    pub fn dispatch(&self, key: &K, payload: &P) -> usize {
        let callbacks: Vec<(u64, Callback<P>)> = {
            let inner = self.inner.lock();
            match inner.handlers.get(key) {
                Some(list) => list.iter().map(|h| (h.id, h.callback.clone())).collect(),
                None => return 0,
            }
        };

        let mut completed = 0;
        for (id, callback) in callbacks {
            match panic::catch_unwind(AssertUnwindSafe(|| callback(payload))) {
                Ok(()) => completed += 1,
                Err(cause) => {
                    error!(
                        ?key,
                        subscription = id,
                        panic = %panic_message(cause.as_ref()),
                        "subscriber callback panicked"
                    );
                }
            }
        }
        completed
    }

    /// Number of live registrations for `key`.
    pub fn subscriber_count(&self, key: &K) -> usize {
        self.inner.lock().handlers.get(key).map_or(0, Vec::len)
    }

    /// Drop every registration.
    pub fn clear(&self) {
        self.inner.lock().handlers.clear();
    }
}

fn panic_message(cause: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = cause.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = cause.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Handle returned by [`EventRouter::subscribe`].
///
/// Dropping it leaves the callback registered; call
/// [`unsubscribe`](Subscription::unsubscribe) on teardown.
#[must_use = "keep the Subscription and call unsubscribe() on teardown"]
pub struct Subscription {
    remove: Box<dyn Fn() + Send + Sync>,
}

impl Subscription {
    /// Remove this registration. Idempotent, and a no-op once the router
    /// itself is gone.
    pub fn unsubscribe(&self) {
        (self.remove)();
    }
}

impl Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    type TestRouter = EventRouter<&'static str, u32>;

    fn recorder() -> (Arc<Mutex<Vec<String>>>, impl Fn(&'static str) -> Box<dyn Fn(&u32) + Send + Sync>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let log2 = log.clone();
        let make = move |name: &'static str| {
            let log = log2.clone();
            Box::new(move |v: &u32| log.lock().push(format!("{}:{}", name, v))) as Box<dyn Fn(&u32) + Send + Sync>
        };
        (log, make)
    }

    #[test]
    fn test_unsubscribe_before_dispatch() {
        let router = TestRouter::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let c = calls.clone();
        let sub = router.subscribe("LIKE", move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });
        sub.unsubscribe();

        assert_eq!(router.dispatch(&"LIKE", &1), 0);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_subscribers_run_once_in_order() {
        let router = TestRouter::new();
        let (log, make) = recorder();
        let _a = router.subscribe("NEW_TASK", make("a"));
        let _b = router.subscribe("NEW_TASK", make("b"));

        assert_eq!(router.dispatch(&"NEW_TASK", &42), 2);
        assert_eq!(*log.lock(), vec!["a:42".to_string(), "b:42".to_string()]);
    }

    #[test]
    fn test_panicking_callback_does_not_stop_later_ones() {
        let router = TestRouter::new();
        let (log, make) = recorder();
        let _boom = router.subscribe("LIKE", |_| panic!("render failed"));
        let _ok = router.subscribe("LIKE", make("ok"));

        assert_eq!(router.dispatch(&"LIKE", &3), 1);
        assert_eq!(*log.lock(), vec!["ok:3".to_string()]);
    }

    #[test]
    fn test_same_callback_registered_twice_is_independent() {
        let router = TestRouter::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let callback = {
            let calls = calls.clone();
            move |_: &u32| {
                calls.fetch_add(1, Ordering::SeqCst);
            }
        };
        let first = router.subscribe("LIKE", callback.clone());
        let _second = router.subscribe("LIKE", callback.clone());
        let _other = router.subscribe("NEW_TASK", callback);

        first.unsubscribe();
        router.dispatch(&"LIKE", &0);
        router.dispatch(&"NEW_TASK", &0);

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(router.subscriber_count(&"LIKE"), 1);
        assert_eq!(router.subscriber_count(&"NEW_TASK"), 1);
    }

    #[test]
    fn test_unsubscribe_is_idempotent() {
        let router = TestRouter::new();
        let (log, make) = recorder();
        let keep = router.subscribe("LIKE", make("keep"));
        let gone = router.subscribe("LIKE", make("gone"));

        gone.unsubscribe();
        gone.unsubscribe();
        router.dispatch(&"LIKE", &9);

        assert_eq!(*log.lock(), vec!["keep:9".to_string()]);
        keep.unsubscribe();
        assert_eq!(router.subscriber_count(&"LIKE"), 0);
    }

    #[test]
    fn test_unsubscribe_after_router_dropped() {
        let router = TestRouter::new();
        let sub = router.subscribe("LIKE", |_| {});
        drop(router);
        sub.unsubscribe();
        sub.unsubscribe();
    }

    #[test]
    fn test_owned_keys_unsubscribe_from_another_thread() {
        let router: EventRouter<String, u32> = EventRouter::default();
        let sub = router.subscribe("LIKE".to_string(), |_| {});
        assert_eq!(router.subscriber_count(&"LIKE".to_string()), 1);

        std::thread::spawn(move || sub.unsubscribe())
            .join()
            .unwrap();
        assert_eq!(router.subscriber_count(&"LIKE".to_string()), 0);
    }

    #[test]
    fn test_dispatch_without_subscribers() {
        let router = TestRouter::new();
        assert_eq!(router.dispatch(&"TASK_STATUS_UPDATE", &1), 0);
    }

    #[test]
    fn test_callback_may_unsubscribe_itself() {
        let router = TestRouter::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let slot: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));

        let c = calls.clone();
        let s = slot.clone();
        let sub = router.subscribe("LIKE", move |_| {
            c.fetch_add(1, Ordering::SeqCst);
            if let Some(sub) = s.lock().as_ref() {
                sub.unsubscribe();
            }
        });
        *slot.lock() = Some(sub);

        router.dispatch(&"LIKE", &1);
        router.dispatch(&"LIKE", &2);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
