//! Event bus - fire-and-forget notifications fanned out to observers
//!
//! Publishers call [`EventBus::post`], which enqueues and returns at once.
//! An [`EventDispatcher`] drains the queue and hands each envelope to every
//! observer in the [`ObserverRegistry`], in posting order.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Event plus delivery metadata
#[derive(Debug, Clone)]
pub struct EventEnvelope<E> {
    /// Unique event ID
    pub event_id: Uuid,
    /// Position in the bus, starting at 1
    pub sequence: u64,
    /// Time the event was posted
    pub published_at: DateTime<Utc>,
    /// The posted event
    pub event: E,
}

/// Observer of published events
#[async_trait]
pub trait EventObserver<E>: Send + Sync {
    /// Called once per delivered envelope, in posting order
    async fn on_event(&self, envelope: &EventEnvelope<E>);
}

/// Registered observers
pub struct ObserverRegistry<E> {
    observers: RwLock<Vec<Arc<dyn EventObserver<E>>>>,
}

impl<E> ObserverRegistry<E> {
    /// Empty registry
    pub fn new() -> Self {
        Self {
            observers: RwLock::new(Vec::new()),
        }
    }

    /// Add an observer; it sees events delivered from now on
    pub fn register(&self, observer: Arc<dyn EventObserver<E>>) {
        self.observers.write().push(observer);
    }

    /// Number of registered observers
    pub fn len(&self) -> usize {
        self.observers.read().len()
    }

    /// True when nothing is registered
    pub fn is_empty(&self) -> bool {
        self.observers.read().is_empty()
    }

    fn snapshot(&self) -> Vec<Arc<dyn EventObserver<E>>> {
        self.observers.read().clone()
    }
}

impl<E> Default for ObserverRegistry<E> {
    fn default() -> Self {
        Self::new()
    }
}

/// Publishing side of the bus
pub struct EventBus<E> {
    sender: mpsc::UnboundedSender<EventEnvelope<E>>,
    sequence: Arc<AtomicU64>,
}

impl<E> Clone for EventBus<E> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            sequence: self.sequence.clone(),
        }
    }
}

impl<E: Send + Sync + 'static> EventBus<E> {
    /// Create a bus and the dispatcher that feeds `registry`
    pub fn channel(registry: Arc<ObserverRegistry<E>>) -> (Self, EventDispatcher<E>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let bus = Self {
            sender,
            sequence: Arc::new(AtomicU64::new(0)),
        };
        (bus, EventDispatcher { receiver, registry })
    }

    /// Enqueue an event; never waits for observers
    pub fn post(&self, event: E) {
        let envelope = EventEnvelope {
            event_id: Uuid::new_v4(),
            sequence: self.sequence.fetch_add(1, Ordering::Relaxed) + 1,
            published_at: Utc::now(),
            event,
        };
        if let Err(dropped) = self.sender.send(envelope) {
            tracing::warn!(sequence = dropped.0.sequence, "event dropped, dispatcher is gone");
        }
    }
}

/// Consuming side of the bus
pub struct EventDispatcher<E> {
    receiver: mpsc::UnboundedReceiver<EventEnvelope<E>>,
    registry: Arc<ObserverRegistry<E>>,
}

impl<E: Send + Sync + 'static> EventDispatcher<E> {
    async fn deliver(&self, envelope: &EventEnvelope<E>) {
        for observer in self.registry.snapshot() {
            observer.on_event(envelope).await;
        }
        tracing::trace!(sequence = envelope.sequence, "event delivered");
    }

    /// Deliver events until every bus handle is dropped
    pub async fn run(mut self) {
        while let Some(envelope) = self.receiver.recv().await {
            self.deliver(&envelope).await;
        }
    }

    /// Run the dispatcher on the current tokio runtime
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Deliver whatever is queued right now, returns the number delivered
    pub async fn drain(&mut self) -> usize {
        let mut delivered = 0;
        while let Ok(envelope) = self.receiver.try_recv() {
            self.deliver(&envelope).await;
            delivered += 1;
        }
        delivered
    }
}

/// Observer that keeps every event it sees
pub struct RecordingObserver<E> {
    seen: RwLock<Vec<E>>,
}

impl<E: Clone> RecordingObserver<E> {
    /// Observer with nothing recorded
    pub fn new() -> Self {
        Self {
            seen: RwLock::new(Vec::new()),
        }
    }

    /// Events seen so far, in delivery order
    pub fn events(&self) -> Vec<E> {
        self.seen.read().clone()
    }
}

impl<E: Clone> Default for RecordingObserver<E> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<E: Clone + Send + Sync> EventObserver<E> for RecordingObserver<E> {
    async fn on_event(&self, envelope: &EventEnvelope<E>) {
        self.seen.write().push(envelope.event.clone());
    }
}
