//! Typed publish/subscribe bus connecting the model, the timeline and the plot.
//!
//! - Subscribers register per event type and are invoked synchronously on emit
//! - Every emitted event is also queued; the session drains the queue with
//!   `poll()` once per pump and routes events to the views
//!
//! Callback order is FIFO within one event type. Ordering across types is
//! only guaranteed through the queue, which preserves emission order.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use log::warn;

/// Maximum queued events before the oldest half is evicted
const MAX_QUEUE_SIZE: usize = 4096;

/// Marker trait for events.
pub trait Event: Any + Send + Sync + 'static {
    fn as_any(&self) -> &dyn Any;
    fn type_name(&self) -> &'static str;
}

impl<T: Any + Send + Sync + 'static> Event for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }
}

type Callback = Arc<dyn Fn(&dyn Any) + Send + Sync>;

pub type BoxedEvent = Box<dyn Event>;

/// Shared state behind both the bus and its emitter handles.
#[derive(Default)]
struct Shared {
    subscribers: RwLock<HashMap<TypeId, Vec<Callback>>>,
    queue: Mutex<Vec<BoxedEvent>>,
}

impl Shared {
    fn dispatch(&self, type_id: TypeId, event: &dyn Any) {
        // Clone the list so a callback may subscribe without deadlocking
        let callbacks = self
            .subscribers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&type_id)
            .cloned();
        for cb in callbacks.into_iter().flatten() {
            cb(event);
        }
    }

    fn enqueue(&self, event: BoxedEvent) {
        let mut queue = self.queue.lock().unwrap_or_else(|e| e.into_inner());
        if queue.len() >= MAX_QUEUE_SIZE {
            let evict = queue.len() / 2;
            warn!("event queue full ({} events), evicting oldest {}", queue.len(), evict);
            queue.drain(0..evict);
        }
        queue.push(event);
    }

    fn emit<E: Event>(&self, event: E) {
        self.dispatch(TypeId::of::<E>(), &event);
        self.enqueue(Box::new(event));
    }
}

/// Pub/sub bus with deferred processing.
#[derive(Clone, Default)]
pub struct EventBus {
    shared: Arc<Shared>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to events of type `E`. The callback runs inside `emit()`.
    pub fn subscribe<E, F>(&self, callback: F)
    where
        E: Event,
        F: Fn(&E) + Send + Sync + 'static,
    {
        let wrapped: Callback = Arc::new(move |any: &dyn Any| {
            if let Some(event) = any.downcast_ref::<E>() {
                callback(event);
            }
        });
        self.shared
            .subscribers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .entry(TypeId::of::<E>())
            .or_default()
            .push(wrapped);
    }

    pub fn emit<E: Event>(&self, event: E) {
        self.shared.emit(event);
    }

    /// Take every event queued since the last poll, in emission order.
    pub fn poll(&self) -> Vec<BoxedEvent> {
        std::mem::take(&mut *self.shared.queue.lock().unwrap_or_else(|e| e.into_inner()))
    }

    /// Handle for components that only publish.
    pub fn emitter(&self) -> EventEmitter {
        EventEmitter {
            shared: Some(Arc::clone(&self.shared)),
        }
    }

    pub fn unsubscribe_all<E: Event>(&self) {
        self.shared
            .subscribers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&TypeId::of::<E>());
    }

    pub fn has_subscribers<E: Event>(&self) -> bool {
        self.shared
            .subscribers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&TypeId::of::<E>())
            .is_some_and(|v| !v.is_empty())
    }

    pub fn queue_len(&self) -> usize {
        self.shared.queue.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

/// Publishing handle held by the model and the controller.
///
/// A detached emitter (`EventEmitter::detached()`) drops everything; used by
/// components constructed before a bus exists.
#[derive(Clone, Default)]
pub struct EventEmitter {
    shared: Option<Arc<Shared>>,
}

impl std::fmt::Debug for EventEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventEmitter")
            .field("attached", &self.shared.is_some())
            .finish()
    }
}

impl EventEmitter {
    pub fn detached() -> Self {
        Self { shared: None }
    }

    pub fn is_attached(&self) -> bool {
        self.shared.is_some()
    }

    pub fn emit<E: Event>(&self, event: E) {
        if let Some(shared) = &self.shared {
            shared.emit(event);
        }
    }
}

/// Downcast a queued event to its concrete type.
///
/// Derefs to `dyn Event` first: calling `as_any()` on the `Box` itself would
/// hit the blanket impl for `Box<dyn Event>` and never match.
#[inline]
pub fn downcast_event<E: Event>(event: &BoxedEvent) -> Option<&E> {
    (**event).as_any().downcast_ref::<E>()
}
