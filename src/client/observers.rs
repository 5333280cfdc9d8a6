use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::error;

use super::status::StatusSnapshot;

pub type StatusCallback = Arc<dyn Fn(&StatusSnapshot) + Send + Sync>;

/// Handle returned by `subscribe`, used to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Ordered list of status listeners
///
/// Listeners run in subscription order. A panicking listener is logged and
/// skipped; the remaining listeners still run.
#[derive(Default)]
pub struct StatusObservers {
    next_id: AtomicU64,
    listeners: Mutex<Vec<(SubscriptionId, StatusCallback)>>,
}

impl StatusObservers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&StatusSnapshot) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.lock().push((id, Arc::new(callback)));
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut listeners = self.lock();
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn notify(&self, snapshot: &StatusSnapshot) {
        // Snapshot the list so listeners may (un)subscribe while being notified
        let listeners: Vec<(SubscriptionId, StatusCallback)> = self.lock().clone();

        for (id, callback) in listeners {
            let result = panic::catch_unwind(AssertUnwindSafe(|| callback(snapshot)));
            if let Err(payload) = result {
                error!(
                    "Error in status change callback {:?}: {}",
                    id,
                    panic_message(payload.as_ref())
                );
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<(SubscriptionId, StatusCallback)>> {
        // Listeners never run under the lock, so poisoning cannot leave it inconsistent
        self.listeners
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ConnectionStatus;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_listeners_run_in_subscription_order() {
        let observers = StatusObservers::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for n in 0..3 {
            let order = Arc::clone(&order);
            observers.subscribe(move |_| order.lock().unwrap().push(n));
        }

        observers.notify(&StatusSnapshot::default());
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn test_panicking_listener_does_not_stop_others() {
        let observers = StatusObservers::new();
        let calls = Arc::new(AtomicUsize::new(0));

        observers.subscribe(|_| panic!("listener failure"));
        let counter = Arc::clone(&calls);
        observers.subscribe(move |snapshot| {
            assert_eq!(snapshot.connection, ConnectionStatus::Connected);
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let snapshot = StatusSnapshot {
            connection: ConnectionStatus::Connected,
            ..Default::default()
        };
        observers.notify(&snapshot);
        observers.notify(&snapshot);

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(observers.len(), 2);
    }

    #[test]
    fn test_unsubscribe_removes_only_that_listener() {
        let observers = StatusObservers::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&calls);
        let first = observers.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let counter = Arc::clone(&calls);
        observers.subscribe(move |_| {
            counter.fetch_add(10, Ordering::SeqCst);
        });

        assert!(observers.unsubscribe(first));
        assert!(!observers.unsubscribe(first));

        observers.notify(&StatusSnapshot::default());
        assert_eq!(calls.load(Ordering::SeqCst), 10);
    }
}
