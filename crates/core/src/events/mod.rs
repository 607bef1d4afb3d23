//! Named publish/subscribe registry shared by every scene component.
//!
//! Dispatch is synchronous. `emit` snapshots the handlers registered for an
//! event name before invoking any of them, so handlers added while an emit is
//! in flight only see later emissions. Handler failures (returned errors and
//! panics alike) are logged and never reach the caller of `emit`.

use std::{
    any::Any,
    collections::HashMap,
    fmt,
    panic::{self, AssertUnwindSafe},
    sync::{Arc, Mutex, MutexGuard, PoisonError, Weak},
};

use crate::{QualityLevel, QualitySettings, Result, SceneError};

/// Published whenever the active quality level is (re)applied.
pub const QUALITY_CHANGED: &str = "quality:changed";
pub const LOOP_PAUSED: &str = "loop:paused";
pub const LOOP_RESUMED: &str = "loop:resumed";
/// Pointer position in normalised device coordinates (-1..1 on both axes).
pub const POINTER_MOVED: &str = "pointer:moved";

/// Payload carried by the scene's own events.
#[derive(Debug, Clone, PartialEq)]
pub enum SceneEvent {
    QualityChanged {
        level: QualityLevel,
        settings: QualitySettings,
    },
    LoopPaused,
    LoopResumed,
    PointerMoved {
        x: f32,
        y: f32,
    },
}

/// Bus specialised to [`SceneEvent`] payloads.
pub type SceneBus = EventBus<SceneEvent>;

/// Callback invoked with a borrowed payload.
pub type Handler<P> = Arc<dyn Fn(&P) -> Result<()> + Send + Sync>;

/// Wraps a closure into a [`Handler`]. Keep a clone of the returned value if
/// it later needs to be passed to [`EventBus::unsubscribe`].
pub fn handler<P, F>(f: F) -> Handler<P>
where
    F: Fn(&P) -> Result<()> + Send + Sync + 'static,
{
    Arc::new(f)
}

struct Registration<P> {
    id: u64,
    handler: Handler<P>,
}

struct Listeners<P> {
    persistent: Vec<Registration<P>>,
    once: Vec<Registration<P>>,
}

impl<P> Default for Listeners<P> {
    fn default() -> Self {
        Self {
            persistent: Vec::new(),
            once: Vec::new(),
        }
    }
}

impl<P> Listeners<P> {
    fn len(&self) -> usize {
        self.persistent.len() + self.once.len()
    }

    fn is_empty(&self) -> bool {
        self.persistent.is_empty() && self.once.is_empty()
    }
}

/// Fire-once registration taken out of its event list by an emit that has not
/// reached it yet. It can still be cancelled until it is dispatched.
struct PendingOnce<P> {
    event: String,
    handler: Handler<P>,
}

struct Registry<P> {
    next_id: u64,
    events: HashMap<String, Listeners<P>>,
    pending_once: HashMap<u64, PendingOnce<P>>,
}

impl<P> Registry<P> {
    fn is_persistent(&self, event: &str, id: u64) -> bool {
        self.events.get(event).is_some_and(|listeners| {
            listeners
                .persistent
                .iter()
                .any(|registration| registration.id == id)
        })
    }
}

/// Process-wide event registry. Clones share the same registrations.
pub struct EventBus<P> {
    registry: Arc<Mutex<Registry<P>>>,
}

impl<P> EventBus<P> {
    pub fn new() -> Self {
        tracing::debug!("event bus initialised");
        Self {
            registry: Arc::new(Mutex::new(Registry {
                next_id: 0,
                events: HashMap::new(),
                pending_once: HashMap::new(),
            })),
        }
    }

    /// Registers `handler` under `event`. Registering the same handler twice
    /// creates two independent registrations.
    #[must_use = "dropping the subscription keeps the handler registered"]
    pub fn subscribe(&self, event: impl Into<String>, handler: Handler<P>) -> Subscription<P> {
        self.register(event.into(), handler, false)
    }

    /// Registers a handler that is removed as soon as it has fired once.
    pub fn subscribe_once(&self, event: impl Into<String>, handler: Handler<P>) -> Subscription<P> {
        self.register(event.into(), handler, true)
    }

    /// Removes every registration of `handler` under `event`, persistent and
    /// fire-once alike.
    pub fn unsubscribe(&self, event: &str, handler: &Handler<P>) {
        let mut guard = self.registry();
        let registry = &mut *guard;

        let pending_before = registry.pending_once.len();
        registry.pending_once.retain(|_, pending| {
            pending.event != event || !same_handler(&pending.handler, handler)
        });
        let mut removed = pending_before - registry.pending_once.len();

        match registry.events.get_mut(event) {
            Some(listeners) => {
                let before = listeners.len();
                listeners
                    .persistent
                    .retain(|registration| !same_handler(&registration.handler, handler));
                listeners
                    .once
                    .retain(|registration| !same_handler(&registration.handler, handler));
                removed += before - listeners.len();
                if listeners.is_empty() {
                    registry.events.remove(event);
                }
            }
            None if removed == 0 => {
                tracing::warn!(event, "unsubscribe from event with no listeners");
                return;
            }
            None => {}
        }
        if removed == 0 {
            tracing::warn!(event, "unsubscribe of a handler that was not registered");
        }
    }

    /// Invokes every persistent handler, then every fire-once handler,
    /// registered for `event` at the time of the call. A registration removed
    /// by an earlier handler of the same emit is skipped. Returns the number
    /// of handlers invoked.
    pub fn emit(&self, event: &str, payload: &P) -> usize {
        let (persistent, once_ids) = {
            let mut guard = self.registry();
            let registry = &mut *guard;
            let Some(listeners) = registry.events.get_mut(event) else {
                tracing::trace!(event, "emit without listeners");
                return 0;
            };
            let persistent: Vec<(u64, Handler<P>)> = listeners
                .persistent
                .iter()
                .map(|registration| (registration.id, Arc::clone(&registration.handler)))
                .collect();
            let once = std::mem::take(&mut listeners.once);
            if listeners.is_empty() {
                registry.events.remove(event);
            }

            let once_ids: Vec<u64> = once.iter().map(|registration| registration.id).collect();
            for registration in once {
                registry.pending_once.insert(
                    registration.id,
                    PendingOnce {
                        event: event.to_string(),
                        handler: registration.handler,
                    },
                );
            }
            (persistent, once_ids)
        };

        let mut invoked = 0;
        for (id, handler) in persistent {
            if !self.registry().is_persistent(event, id) {
                continue;
            }
            dispatch(event, &handler, payload);
            invoked += 1;
        }
        for id in once_ids {
            let pending = self.registry().pending_once.remove(&id);
            if let Some(pending) = pending {
                dispatch(event, &pending.handler, payload);
                invoked += 1;
            }
        }
        invoked
    }

    pub fn clear(&self, event: &str) {
        let mut registry = self.registry();
        registry.events.remove(event);
        registry
            .pending_once
            .retain(|_, pending| pending.event != event);
    }

    pub fn clear_all(&self) {
        let mut registry = self.registry();
        registry.events.clear();
        registry.pending_once.clear();
    }

    /// Persistent plus fire-once registrations currently held for `event`.
    pub fn listener_count(&self, event: &str) -> usize {
        self.registry()
            .events
            .get(event)
            .map(Listeners::len)
            .unwrap_or(0)
    }

    fn register(&self, event: String, handler: Handler<P>, once: bool) -> Subscription<P> {
        let mut registry = self.registry();
        let id = registry.next_id;
        registry.next_id += 1;

        tracing::trace!(event = %event, id, once, "subscribing handler");
        let listeners = registry.events.entry(event.clone()).or_default();
        let registration = Registration { id, handler };
        if once {
            listeners.once.push(registration);
        } else {
            listeners.persistent.push(registration);
        }

        Subscription {
            event,
            id,
            registry: Arc::downgrade(&self.registry),
        }
    }

    fn registry(&self) -> MutexGuard<'_, Registry<P>> {
        lock_registry(&self.registry)
    }
}

impl<P> Default for EventBus<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P> Clone for EventBus<P> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
        }
    }
}

impl<P> fmt::Debug for EventBus<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let registry = self.registry();
        f.debug_struct("EventBus")
            .field("events", &registry.events.len())
            .finish()
    }
}

/// Capability returned by [`EventBus::subscribe`] that removes exactly the
/// registration it was created for.
pub struct Subscription<P> {
    event: String,
    id: u64,
    registry: Weak<Mutex<Registry<P>>>,
}

impl<P> Subscription<P> {
    pub fn event(&self) -> &str {
        &self.event
    }

    /// Removes the registration, including a fire-once registration an
    /// in-flight emit has not reached yet. A no-op if it already fired, was
    /// cleared, or the bus is gone.
    pub fn unsubscribe(self) {
        let Some(registry) = self.registry.upgrade() else {
            return;
        };
        let mut registry = lock_registry(&registry);
        if registry.pending_once.remove(&self.id).is_some() {
            return;
        }
        let Some(listeners) = registry.events.get_mut(&self.event) else {
            return;
        };
        listeners
            .persistent
            .retain(|registration| registration.id != self.id);
        listeners.once.retain(|registration| registration.id != self.id);
        if listeners.is_empty() {
            registry.events.remove(&self.event);
        }
    }
}

impl<P> fmt::Debug for Subscription<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("event", &self.event)
            .field("id", &self.id)
            .finish()
    }
}

fn lock_registry<P>(registry: &Mutex<Registry<P>>) -> MutexGuard<'_, Registry<P>> {
    // Handlers never run while the lock is held, so a poisoned registry is
    // still structurally sound.
    registry.lock().unwrap_or_else(PoisonError::into_inner)
}

fn same_handler<P>(a: &Handler<P>, b: &Handler<P>) -> bool {
    Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
}

fn dispatch<P>(event: &str, handler: &Handler<P>, payload: &P) {
    match panic::catch_unwind(AssertUnwindSafe(|| handler(payload))) {
        Ok(Ok(())) => {}
        Ok(Err(err)) => {
            let err = SceneError::Handler {
                event: event.to_string(),
                message: err.to_string(),
            };
            tracing::warn!(event, error = %err, "event handler failed");
        }
        Err(panic) => {
            tracing::error!(
                event,
                panic = panic_message(panic.as_ref()),
                "event handler panicked"
            );
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}
