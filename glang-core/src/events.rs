//! In-process publish/subscribe.
//!
//! Delivery is synchronous and unordered. A subscriber that panics is logged
//! and skipped; the remaining subscribers still receive the event. Callbacks
//! run on a snapshot of the listener set, so they may subscribe or
//! unsubscribe freely.

use dashmap::DashMap;
use std::collections::HashMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Weak};
use uuid::Uuid;

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct Listener<T> {
    callback: Callback<T>,
    once: bool,
}

struct BusInner<T> {
    /// Event name -> subscription id -> listener.
    listeners: DashMap<String, HashMap<Uuid, Listener<T>>>,
}

trait Unsubscribe: Send + Sync {
    fn remove(&self, event: &str, id: &Uuid) -> bool;
}

impl<T: Send + Sync + 'static> Unsubscribe for BusInner<T> {
    fn remove(&self, event: &str, id: &Uuid) -> bool {
        let removed = match self.listeners.get_mut(event) {
            Some(mut entry) => entry.value_mut().remove(id).is_some(),
            None => false,
        };
        if removed {
            self.listeners.remove_if(event, |_, map| map.is_empty());
        }
        removed
    }
}

/// Handle for an active subscription.
///
/// Dropping the handle does not unsubscribe; call [`Subscription::cancel`] or
/// [`EventBus::unsubscribe`].
pub struct Subscription {
    id: Uuid,
    event: String,
    bus: Weak<dyn Unsubscribe>,
}

impl Subscription {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn event(&self) -> &str {
        &self.event
    }

    /// Removes the listener. Returns false if it was already gone.
    pub fn cancel(self) -> bool {
        match self.bus.upgrade() {
            Some(bus) => bus.remove(&self.event, &self.id),
            None => false,
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("event", &self.event)
            .finish()
    }
}

/// Publish/subscribe channel keyed by event name.
///
/// Cloning the bus yields another handle to the same listener set.
pub struct EventBus<T> {
    inner: Arc<BusInner<T>>,
}

impl<T> Clone for EventBus<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Send + Sync + 'static> Default for EventBus<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send + Sync + 'static> fmt::Debug for EventBus<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("events", &self.event_names())
            .finish()
    }
}

impl<T: Send + Sync + 'static> EventBus<T> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(BusInner {
                listeners: DashMap::new(),
            }),
        }
    }

    /// Subscribes to an event.
    pub fn subscribe<F>(&self, event: &str, callback: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.add(event, Arc::new(callback), false)
    }

    /// Subscribes for a single delivery.
    pub fn subscribe_once<F>(&self, event: &str, callback: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.add(event, Arc::new(callback), true)
    }

    fn add(&self, event: &str, callback: Callback<T>, once: bool) -> Subscription {
        let id = Uuid::new_v4();
        self.inner
            .listeners
            .entry(event.to_string())
            .or_default()
            .insert(id, Listener { callback, once });

        let inner: Arc<dyn Unsubscribe> = self.inner.clone();
        Subscription {
            id,
            event: event.to_string(),
            bus: Arc::downgrade(&inner),
        }
    }

    /// Removes a subscription. Returns true if it was found.
    pub fn unsubscribe(&self, subscription: &Subscription) -> bool {
        self.inner.remove(&subscription.event, &subscription.id)
    }

    /// Delivers `payload` to every subscriber of `event`.
    ///
    /// Returns the number of subscribers invoked.
    pub fn publish(&self, event: &str, payload: &T) -> usize {
        let callbacks: Vec<Callback<T>> = match self.inner.listeners.get_mut(event) {
            Some(mut entry) => {
                let map = entry.value_mut();
                let callbacks = map.values().map(|l| Arc::clone(&l.callback)).collect();
                // Once-listeners leave before delivery so they fire exactly once.
                map.retain(|_, l| !l.once);
                callbacks
            }
            None => return 0,
        };
        self.inner
            .listeners
            .remove_if(event, |_, map| map.is_empty());

        for callback in &callbacks {
            if let Err(panic) = catch_unwind(AssertUnwindSafe(|| callback(payload))) {
                tracing::error!(
                    "subscriber for '{}' panicked: {}",
                    event,
                    panic_message(panic.as_ref())
                );
            }
        }

        callbacks.len()
    }

    /// Removes the listeners of one event, or of all events.
    pub fn clear(&self, event: Option<&str>) {
        match event {
            Some(event) => {
                self.inner.listeners.remove(event);
            }
            None => self.inner.listeners.clear(),
        }
    }

    pub fn listener_count(&self, event: &str) -> usize {
        self.inner
            .listeners
            .get(event)
            .map(|entry| entry.len())
            .unwrap_or(0)
    }

    /// Returns the names of events that currently have listeners.
    pub fn event_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .inner
            .listeners
            .iter()
            .filter(|entry| !entry.value().is_empty())
            .map(|entry| entry.key().clone())
            .collect();
        names.sort();
        names
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_subscribe_and_publish() {
        let bus: EventBus<Value> = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = seen.clone();
        bus.subscribe("tool.start", move |p| sink.lock().push(p.clone()));

        assert_eq!(bus.publish("tool.start", &json!({"name": "search"})), 1);
        assert_eq!(bus.publish("tool.other", &json!({})), 0);

        assert_eq!(*seen.lock(), vec![json!({"name": "search"})]);
    }

    #[test]
    fn test_cancel_subscription() {
        let bus: EventBus<u32> = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));

        let c = count.clone();
        let sub = bus.subscribe("tick", move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });
        bus.publish("tick", &1);
        assert!(bus.unsubscribe(&sub));
        assert!(!sub.cancel()); // already removed
        bus.publish("tick", &2);

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(bus.listener_count("tick"), 0);
        assert!(bus.event_names().is_empty());
    }

    #[test]
    fn test_subscribe_once() {
        let bus: EventBus<u32> = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));

        let c = count.clone();
        bus.subscribe_once("done", move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(bus.listener_count("done"), 1);

        bus.publish("done", &1);
        bus.publish("done", &2);

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(bus.listener_count("done"), 0);
    }

    #[test]
    fn test_panicking_subscriber_does_not_abort_delivery() {
        let bus: EventBus<u32> = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));

        bus.subscribe("evt", |_| panic!("subscriber failure"));
        for _ in 0..3 {
            let c = count.clone();
            bus.subscribe("evt", move |_| {
                c.fetch_add(1, Ordering::SeqCst);
            });
        }

        assert_eq!(bus.publish("evt", &0), 4);
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_subscribe_from_callback() {
        let bus: EventBus<u32> = EventBus::new();
        let nested = bus.clone();
        bus.subscribe("outer", move |_| {
            nested.subscribe("inner", |_| {});
        });

        bus.publish("outer", &0);
        assert_eq!(bus.listener_count("inner"), 1);
    }

    #[test]
    fn test_clear() {
        let bus: EventBus<u32> = EventBus::new();
        bus.subscribe("a", |_| {});
        bus.subscribe("a", |_| {});
        bus.subscribe("b", |_| {});

        assert_eq!(bus.listener_count("a"), 2);
        assert_eq!(bus.event_names(), vec!["a".to_string(), "b".to_string()]);

        bus.clear(Some("a"));
        assert_eq!(bus.listener_count("a"), 0);
        assert_eq!(bus.listener_count("b"), 1);

        bus.clear(None);
        assert!(bus.event_names().is_empty());
    }

    #[test]
    fn test_cancel_after_bus_dropped() {
        let bus: EventBus<u32> = EventBus::new();
        let sub = bus.subscribe("x", |_| {});
        assert_eq!(sub.event(), "x");
        drop(bus);
        assert!(!sub.cancel());
    }
}
