use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

/// A type-erased, reference-counted state snapshot. Clone is an Arc clone.
#[derive(Clone)]
pub struct StateValue {
    inner: Arc<dyn Any + Send + Sync>,
}

impl StateValue {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self { inner: Arc::new(value) }
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.inner.downcast_ref::<T>()
    }
}

impl fmt::Debug for StateValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateValue").finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

pub type ChangeHandler = Arc<dyn Fn(&str, &StateValue) + Send + Sync>;

struct Subscriber {
    id: SubscriptionId,
    pattern: String,
    handler: ChangeHandler,
}

/// Path-addressed state published by the console services.
///
/// A UI (or the CLI) observes the services through this hub instead of
/// holding references to them:
///
/// - `auth/state`: [`AuthState`](crate::state::AuthState)
/// - `notification/state`: [`NotificationSnapshot`](crate::state::NotificationSnapshot)
/// - `app/route`, `app/title`: current route path and document title
/// - `prefs/dark-mode`, `prefs/sidebar`: preferences
///
/// Subscriptions take MQTT-style patterns: `+` matches one level, `#` any
/// number of trailing levels. Handlers run synchronously on the publishing
/// thread, after the hub's locks are released, so a handler may publish.
pub struct StateHub {
    values: RwLock<BTreeMap<String, StateValue>>,
    subscribers: RwLock<Vec<Subscriber>>,
    next_id: AtomicU64,
}

impl StateHub {
    pub fn new() -> Self {
        Self {
            values: RwLock::new(BTreeMap::new()),
            subscribers: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Publish a typed value at `path` and notify matching subscribers.
    pub fn set<T: Any + Send + Sync>(&self, path: &str, value: T) {
        self.set_value(path, StateValue::new(value));
    }

    pub fn set_value(&self, path: &str, value: StateValue) {
        {
            let mut values = self.values.write().unwrap_or_else(|e| e.into_inner());
            values.insert(path.to_string(), value.clone());
        }
        let handlers: Vec<ChangeHandler> = {
            let subs = self.subscribers.read().unwrap_or_else(|e| e.into_inner());
            subs.iter()
                .filter(|s| topic_matches(&s.pattern, path))
                .map(|s| s.handler.clone())
                .collect()
        };
        for handler in handlers {
            handler(path, &value);
        }
    }

    pub fn get_value(&self, path: &str) -> Option<StateValue> {
        let values = self.values.read().unwrap_or_else(|e| e.into_inner());
        values.get(path).cloned()
    }

    /// Clone of the value at `path`, if one of type `T` is there.
    pub fn get<T: Any + Clone>(&self, path: &str) -> Option<T> {
        self.get_value(path)?.downcast_ref::<T>().cloned()
    }

    pub fn subscribe<F>(&self, pattern: &str, handler: F) -> SubscriptionId
    where
        F: Fn(&str, &StateValue) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut subs = self.subscribers.write().unwrap_or_else(|e| e.into_inner());
        subs.push(Subscriber {
            id,
            pattern: pattern.to_string(),
            handler: Arc::new(handler),
        });
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subs = self.subscribers.write().unwrap_or_else(|e| e.into_inner());
        let before = subs.len();
        subs.retain(|s| s.id != id);
        subs.len() < before
    }
}

impl Default for StateHub {
    fn default() -> Self {
        Self::new()
    }
}

/// MQTT-style topic match of a concrete `topic` against `pattern`.
fn topic_matches(pattern: &str, topic: &str) -> bool {
    let mut pattern = pattern.split('/');
    let mut topic = topic.split('/');
    loop {
        match (pattern.next(), topic.next()) {
            (Some("#"), _) => return true,
            (Some("+"), Some(_)) => {}
            (Some(p), Some(t)) if p == t => {}
            (None, None) => return true,
            _ => return false,
        }
    }
}
