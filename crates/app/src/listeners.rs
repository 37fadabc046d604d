//! Ordered handler registry shared by the event bus and the integrations.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use hassflow_domain::error::FlowError;
use hassflow_domain::id::ListenerId;

/// Callback invoked for each emitted payload.
pub type Handler<P> = Arc<dyn Fn(&P) -> Result<(), FlowError> + Send + Sync>;

struct Entry<P> {
    id: ListenerId,
    owner: String,
    handler: Handler<P>,
}

/// Ordered list of handlers for one kind of payload.
///
/// Handlers run in insertion order. Emission works on a snapshot taken when
/// it starts, so a handler may add or remove handlers; the change applies to
/// the next emission.
pub struct Listeners<P> {
    entries: Mutex<Vec<Entry<P>>>,
}

impl<P> Default for Listeners<P> {
    fn default() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
        }
    }
}

impl<P> Listeners<P> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a handler; `owner` names it in failure logs.
    pub fn add<F>(&self, owner: impl Into<String>, handler: F) -> ListenerId
    where
        F: Fn(&P) -> Result<(), FlowError> + Send + Sync + 'static,
    {
        let id = ListenerId::new();
        self.lock().push(Entry {
            id,
            owner: owner.into(),
            handler: Arc::new(handler),
        });
        id
    }

    /// Remove a handler. Returns `false` if it was not registered.
    pub fn remove(&self, id: ListenerId) -> bool {
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|entry| entry.id != id);
        entries.len() != before
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Deliver `payload` to every handler and return how many succeeded.
    ///
    /// A handler that returns an error or panics is logged against its owner
    /// and does not stop delivery to the following handlers.
    pub fn emit(&self, payload: &P) -> usize {
        let snapshot: Vec<(String, Handler<P>)> = self
            .lock()
            .iter()
            .map(|entry| (entry.owner.clone(), Arc::clone(&entry.handler)))
            .collect();

        let mut delivered = 0;
        for (owner, handler) in snapshot {
            match catch_unwind(AssertUnwindSafe(|| handler(payload))) {
                Ok(Ok(())) => delivered += 1,
                Ok(Err(err)) => {
                    tracing::warn!(owner = %owner, error = ?err, "listener failed");
                }
                Err(_) => {
                    tracing::error!(owner = %owner, "listener panicked");
                }
            }
        }
        delivered
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Entry<P>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hassflow_domain::error::ValidationError;

    #[test]
    fn should_call_handlers_in_insertion_order() {
        let listeners = Listeners::<u32>::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        for name in ["a", "b", "c"] {
            let seen = Arc::clone(&seen);
            listeners.add(name, move |value: &u32| {
                seen.lock().unwrap().push(format!("{name}{value}"));
                Ok(())
            });
        }

        assert_eq!(listeners.emit(&1), 3);
        assert_eq!(*seen.lock().unwrap(), vec!["a1", "b1", "c1"]);
    }

    #[test]
    fn should_keep_delivering_after_a_failing_handler() {
        let listeners = Listeners::<u32>::new();
        let reached = Arc::new(Mutex::new(false));
        listeners.add("bad", |_: &u32| Err(ValidationError::EmptyNodeId.into()));
        let flag = Arc::clone(&reached);
        listeners.add("good", move |_: &u32| {
            *flag.lock().unwrap() = true;
            Ok(())
        });

        assert_eq!(listeners.emit(&7), 1);
        assert!(*reached.lock().unwrap());
    }

    #[test]
    fn should_keep_delivering_after_a_panicking_handler() {
        let listeners = Listeners::<u32>::new();
        let reached = Arc::new(Mutex::new(false));
        listeners.add("boom", |_: &u32| panic!("handler exploded"));
        let flag = Arc::clone(&reached);
        listeners.add("good", move |_: &u32| {
            *flag.lock().unwrap() = true;
            Ok(())
        });

        assert_eq!(listeners.emit(&7), 1);
        assert!(*reached.lock().unwrap());
    }

    #[test]
    fn should_stop_calling_removed_handler() {
        let listeners = Listeners::<u32>::new();
        let id = listeners.add("a", |_: &u32| Ok(()));
        assert!(listeners.remove(id));
        assert!(!listeners.remove(id));
        assert!(listeners.is_empty());
        assert_eq!(listeners.emit(&1), 0);
    }

    #[test]
    fn should_allow_removal_from_inside_a_handler() {
        let listeners = Arc::new(Listeners::<u32>::new());
        let slot: Arc<Mutex<Option<ListenerId>>> = Arc::new(Mutex::new(None));

        let registry = Arc::clone(&listeners);
        let own_id = Arc::clone(&slot);
        let id = listeners.add("self-removing", move |_: &u32| {
            if let Some(id) = *own_id.lock().unwrap() {
                registry.remove(id);
            }
            Ok(())
        });
        *slot.lock().unwrap() = Some(id);

        assert_eq!(listeners.emit(&1), 1);
        assert_eq!(listeners.emit(&2), 0);
    }
}
