//! Event queue
//!
//! Decouples any number of event producers (one per supervised account)
//! from a single consumer task that forwards events to a [`WebhookSink`].
//!
//! ```text
//!  monitor A ──┐
//!  monitor B ──┼── unbounded FIFO ──► consumer task ──► WebhookSink
//!  monitor C ──┘
//! ```
//!
//! ## Guarantees
//!
//! - Enqueueing never waits on the sink
//! - Events from one producer are delivered in emission order
//! - A failed delivery is logged and the consumer moves on
//! - Once [`EventQueue::close`] returns, nothing more is forwarded
//! - `close` reports success only when the backlog is empty, whichever
//!   caller observes it
//!
//! ## Lifecycle
//!
//! `Open` → `Draining` (close called, backlog flushing) → `Closed`

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};
use crate::event::Event;
use crate::traits::WebhookSink;

/// Lifecycle state of an [`EventQueue`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueState {
    /// Accepting and forwarding events
    Open,
    /// No longer accepting; flushing the backlog
    Draining,
    /// Terminal; nothing is forwarded anymore
    Closed,
}

struct Shared {
    sender: Option<mpsc::UnboundedSender<Event>>,
    state: QueueState,
    consumer: Option<JoinHandle<()>>,
}

struct Inner {
    shared: Mutex<Shared>,
    /// Events accepted but not yet handed to the sink
    pending: Arc<AtomicUsize>,
    /// Set once the first close has finished draining or given up
    drained: watch::Sender<bool>,
}

enum CloseStep {
    Drain(Option<JoinHandle<()>>),
    Await(watch::Receiver<bool>),
    Report,
}

/// Asynchronous, ordered mailbox in front of a webhook sink
///
/// Cloning is cheap; all clones feed the same consumer.
#[derive(Clone)]
pub struct EventQueue {
    inner: Arc<Inner>,
}

impl EventQueue {
    /// Create the queue and spawn its consumer task
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(sink: Arc<dyn WebhookSink>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let pending = Arc::new(AtomicUsize::new(0));
        let consumer = tokio::spawn(consume(rx, sink, Arc::clone(&pending)));
        let (drained, _) = watch::channel(false);

        Self {
            inner: Arc::new(Inner {
                shared: Mutex::new(Shared {
                    sender: Some(tx),
                    state: QueueState::Open,
                    consumer: Some(consumer),
                }),
                pending,
                drained,
            }),
        }
    }

    fn shared(&self) -> MutexGuard<'_, Shared> {
        self.inner
            .shared
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Enqueue an event
    ///
    /// # Returns
    ///
    /// - `Ok(())`: Accepted; it will be delivered unless close times out
    /// - `Err(Error::QueueClosed)`: The queue is draining or closed
    pub fn add_event(&self, event: Event) -> Result<()> {
        let shared = self.shared();
        let sender = match (&shared.sender, shared.state) {
            (Some(sender), QueueState::Open) => sender,
            _ => return Err(Error::QueueClosed),
        };

        self.inner.pending.fetch_add(1, Ordering::SeqCst);
        if sender.send(event).is_err() {
            // Consumer is gone (it panicked); the event will never be delivered
            self.inner.pending.fetch_sub(1, Ordering::SeqCst);
            return Err(Error::QueueClosed);
        }
        Ok(())
    }

    /// Enqueue an event, logging instead of failing if it is rejected
    pub fn emit(&self, event: Event) {
        let kind = event.kind;
        let context = event.context.clone();
        if let Err(e) = self.add_event(event) {
            warn!(?kind, %context, "Event dropped: {}", e);
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> QueueState {
        self.shared().state
    }

    /// Number of accepted events not yet handed to the sink
    pub fn pending(&self) -> usize {
        self.inner.pending.load(Ordering::SeqCst)
    }

    /// Stop accepting events and flush the backlog
    ///
    /// Returns once every buffered event has been handed to the sink or the
    /// deadline elapses, whichever comes first. On timeout the consumer is
    /// aborted and the remaining events are abandoned.
    ///
    /// A close racing an in-flight drain waits for that drain under its own
    /// deadline. Closing a closed queue reports how the drain ended.
    ///
    /// # Returns
    ///
    /// - `Ok(())`: Backlog fully delivered
    /// - `Err(Error::QueueTimeout)`: Deadline elapsed with events undelivered
    pub async fn close(&self, deadline: Duration) -> Result<()> {
        let step = {
            let mut shared = self.shared();
            match shared.state {
                QueueState::Open => {
                    shared.state = QueueState::Draining;
                    // Dropping the only sender ends the consumer once the backlog is empty
                    shared.sender = None;
                    CloseStep::Drain(shared.consumer.take())
                }
                QueueState::Draining => CloseStep::Await(self.inner.drained.subscribe()),
                QueueState::Closed => CloseStep::Report,
            }
        };

        match step {
            CloseStep::Drain(consumer) => self.drain(consumer, deadline).await,
            CloseStep::Await(mut drained) => {
                debug!("Event queue already draining, waiting for it");
                match tokio::time::timeout(deadline, drained.wait_for(|done| *done)).await {
                    Ok(_) => self.outcome(),
                    Err(_) => Err(Error::QueueTimeout {
                        pending: self.pending(),
                    }),
                }
            }
            CloseStep::Report => self.outcome(),
        }
    }

    async fn drain(&self, consumer: Option<JoinHandle<()>>, deadline: Duration) -> Result<()> {
        info!(pending = self.pending(), "Draining event queue");

        let result = match consumer {
            Some(mut handle) => match tokio::time::timeout(deadline, &mut handle).await {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => {
                    error!("Event consumer task failed: {}", e);
                    Err(Error::Other(format!("event consumer task failed: {}", e)))
                }
                Err(_) => {
                    handle.abort();
                    let _ = handle.await;
                    let pending = self.pending();
                    warn!(
                        pending,
                        "Event queue drain timed out after {:?}, abandoning remaining events",
                        deadline
                    );
                    Err(Error::QueueTimeout { pending })
                }
            },
            None => self.outcome(),
        };

        self.shared().state = QueueState::Closed;
        self.inner.drained.send_replace(true);
        result
    }

    /// Result of a finished drain, judged by what is still undelivered
    fn outcome(&self) -> Result<()> {
        match self.pending() {
            0 => Ok(()),
            pending => Err(Error::QueueTimeout { pending }),
        }
    }
}

impl std::fmt::Debug for EventQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventQueue")
            .field("state", &self.state())
            .field("pending", &self.pending())
            .finish()
    }
}

async fn consume(
    rx: mpsc::UnboundedReceiver<Event>,
    sink: Arc<dyn WebhookSink>,
    pending: Arc<AtomicUsize>,
) {
    let mut events = UnboundedReceiverStream::new(rx);

    while let Some(event) = events.next().await {
        if let Err(e) = sink.deliver(&event).await {
            warn!(
                kind = ?event.kind,
                context = %event.context,
                "Failed to deliver event: {}",
                e
            );
        }
        pending.fetch_sub(1, Ordering::SeqCst);
    }

    debug!("Event queue consumer stopped");
}
