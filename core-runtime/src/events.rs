//! # Event Bus System
//!
//! Carries typed notifications from producers (the collection backend) to
//! consumers (the grouping index, observers, UIs) using two kinds of
//! subscription:
//!
//! - **Broadcast subscribers** (`subscribe`) sit on a `tokio::sync::broadcast`
//!   channel. They are cheap and independent, but a slow subscriber can lag
//!   and lose events (`RecvError::Lagged`).
//! - **Ordered subscribers** (`subscribe_ordered`) get an unbounded
//!   `tokio::sync::mpsc` channel. Every event is delivered exactly once and in
//!   emission order. Index maintenance must use this kind, because applying a
//!   removal before the matching insertion corrupts its key maps.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     emit      ┌────────────┐   subscribe_ordered  ┌──────────────┐
//! │   Backend   ├──────────────>│            ├─────────────────────>│ Index model  │
//! └─────────────┘               │  EventBus  │                      └──────────────┘
//!                               │            │   subscribe          ┌──────────────┐
//!                               │            ├─────────────────────>│  Observer    │
//!                               └────────────┘                      └──────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::EventBus;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let bus: EventBus<u32> = EventBus::new(16);
//! let mut ordered = bus.subscribe_ordered();
//!
//! bus.emit(1);
//! bus.emit(2);
//!
//! assert_eq!(ordered.recv().await, Some(1));
//! assert_eq!(ordered.recv().await, Some(2));
//! # }
//! ```
//!
//! ## Error Handling
//!
//! Broadcast receivers can observe two errors:
//!
//! - **`RecvError::Lagged(n)`**: the subscriber missed `n` events and may
//!   continue.
//! - **`RecvError::Closed`**: every sender was dropped; treat it as shutdown.
//!
//! Ordered receivers return `None` once the bus is dropped.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Mutex};
use tokio::sync::{broadcast, mpsc};

pub use tokio::sync::broadcast::error::RecvError;
pub use tokio::sync::broadcast::Receiver;

/// Receiving end of an ordered, lossless subscription.
pub type OrderedReceiver<E> = mpsc::UnboundedReceiver<E>;

/// Default buffer size for the broadcast channel.
///
/// Broadcast subscribers that fall further behind than this receive
/// `RecvError::Lagged`. Ordered subscribers are not bounded by it.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

/// Event severity levels for filtering and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    /// Debug-level events (verbose)
    Debug,
    /// Informational events
    Info,
    /// Warning events
    Warning,
    /// Error events
    Error,
}

// ============================================================================
// Event Bus
// ============================================================================

/// Fan-out channel for typed events.
///
/// Cloning the bus is cheap; clones share the same broadcast sender and the
/// same list of ordered subscribers.
pub struct EventBus<E> {
    sender: broadcast::Sender<E>,
    ordered: Arc<Mutex<Vec<mpsc::UnboundedSender<E>>>>,
}

impl<E> Clone for EventBus<E> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            ordered: Arc::clone(&self.ordered),
        }
    }
}

impl<E: Clone + Send + 'static> EventBus<E> {
    /// Creates a new event bus whose broadcast side buffers `capacity` events.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero, like `tokio::sync::broadcast::channel`.
    /// `CoreConfig` rejects a zero buffer size before it gets here.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            ordered: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Creates a new event bus with [`DEFAULT_EVENT_BUFFER_SIZE`].
    pub fn with_default_capacity() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }

    /// Publishes an event to every subscriber.
    ///
    /// Ordered subscribers are served first, in subscription order; closed
    /// ordered subscribers are pruned. Returns the number of subscribers the
    /// event reached. Emitting with nobody listening is not an error.
    pub fn emit(&self, event: E) -> usize {
        let mut delivered = 0;

        {
            let mut ordered = self
                .ordered
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            ordered.retain(|tx| {
                if tx.send(event.clone()).is_ok() {
                    delivered += 1;
                    true
                } else {
                    false
                }
            });
        }

        delivered + self.sender.send(event).unwrap_or(0)
    }

    /// Creates a broadcast subscriber that receives all future events.
    ///
    /// Past events are not replayed. A slow subscriber may lag.
    pub fn subscribe(&self) -> Receiver<E> {
        self.sender.subscribe()
    }

    /// Creates an ordered, lossless subscriber.
    ///
    /// Events are delivered in emission order and never dropped while the
    /// receiver is alive.
    pub fn subscribe_ordered(&self) -> OrderedReceiver<E> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.ordered
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(tx);
        rx
    }

    /// Returns the number of live subscribers of both kinds.
    pub fn subscriber_count(&self) -> usize {
        let ordered = self
            .ordered
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .filter(|tx| !tx.is_closed())
            .count();
        ordered + self.sender.receiver_count()
    }
}

impl<E> fmt::Debug for EventBus<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("broadcast_subscribers", &self.sender.receiver_count())
            .finish()
    }
}

// ============================================================================
// Event Stream Wrapper
// ============================================================================

type EventFilter<E> = Box<dyn Fn(&E) -> bool + Send + Sync>;

/// A wrapper around `broadcast::Receiver` with optional filtering.
///
/// ```rust
/// use core_runtime::events::{EventBus, EventStream};
///
/// # #[tokio::main]
/// # async fn main() {
/// let bus: EventBus<u32> = EventBus::new(8);
/// let mut evens = EventStream::new(bus.subscribe()).filter(|n| n % 2 == 0);
///
/// bus.emit(1);
/// bus.emit(2);
/// assert_eq!(evens.recv().await.unwrap(), 2);
/// # }
/// ```
pub struct EventStream<E> {
    receiver: Receiver<E>,
    filter: Option<EventFilter<E>>,
}

impl<E: Clone> EventStream<E> {
    pub fn new(receiver: Receiver<E>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    /// Only events matching `predicate` will be returned by `recv()`.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&E) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    /// Receives the next event that passes the filter (if any).
    ///
    /// # Errors
    ///
    /// Returns `RecvError::Lagged(n)` if the subscriber fell behind by `n` events.
    /// Returns `RecvError::Closed` if all senders have been dropped.
    pub async fn recv(&mut self) -> Result<E, RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            match &self.filter {
                Some(filter) if !filter(&event) => continue,
                _ => return Ok(event),
            }
        }
    }

    /// Non-blocking variant of [`recv`](Self::recv).
    pub fn try_recv(&mut self) -> Result<E, broadcast::error::TryRecvError> {
        loop {
            let event = self.receiver.try_recv()?;
            match &self.filter {
                Some(filter) if !filter(&event) => continue,
                _ => return Ok(event),
            }
        }
    }
}
