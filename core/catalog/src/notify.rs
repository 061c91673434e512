//! Update notification with explicit subscription handles.

use std::sync::{Arc, RwLock};
use uuid::Uuid;

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Token returned by [`Notifier::subscribe`].
///
/// Dropping the token does not unsubscribe; hand it back to
/// [`Notifier::unsubscribe`].
#[must_use = "keep the subscription to be able to unsubscribe"]
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct Subscription(Uuid);

/// Set of callbacks invoked on every update of a cached item.
pub struct Notifier<T> {
    observers: RwLock<Vec<(Uuid, Callback<T>)>>,
}

impl<T> Notifier<T> {
    /// Create a notifier with no subscribers.
    pub fn new() -> Self {
        Self {
            observers: RwLock::new(Vec::new()),
        }
    }

    /// Register a callback.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = Uuid::new_v4();
        self.observers
            .write()
            .unwrap()
            .push((id, Arc::new(callback)));
        Subscription(id)
    }

    /// Remove a callback.
    ///
    /// # Returns
    /// `false` if the subscription belonged to another notifier.
    pub fn unsubscribe(&self, subscription: Subscription) -> bool {
        let mut observers = self.observers.write().unwrap();
        let before = observers.len();
        observers.retain(|(id, _)| *id != subscription.0);
        observers.len() != before
    }

    /// Invoke every callback, in subscription order.
    ///
    /// Callbacks run outside the registry lock, so they may subscribe or
    /// unsubscribe themselves.
    pub fn notify(&self, value: &T) {
        let callbacks: Vec<Callback<T>> = self
            .observers
            .read()
            .unwrap()
            .iter()
            .map(|(_, cb)| cb.clone())
            .collect();
        for callback in callbacks {
            callback(value);
        }
    }

    /// Number of active subscriptions.
    pub fn len(&self) -> usize {
        self.observers.read().unwrap().len()
    }

    /// Check if nobody is subscribed.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Default for Notifier<T> {
    fn default() -> Self {
        Self::new()
    }
}
