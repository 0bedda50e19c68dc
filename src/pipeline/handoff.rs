//! Rendezvous queues between pipeline stages.
//!
//! A handoff is a `tokio::sync::mpsc` channel with a single slot, so a
//! producer can run at most one item ahead of the slowest consumer. The
//! receiving half is shared behind an async mutex, turning the
//! single-consumer channel into a work queue: each item goes to exactly one
//! of the competing consumers, in no guaranteed order across consumers.
//!
//! The queue closes once every [`HandoffSender`] clone has been dropped;
//! consumers then drain what is left and see `None`.

use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};

/// Items a producer may place before it has to wait for a consumer.
const HANDOFF_SLOTS: usize = 1;

/// Create a handoff queue.
pub fn handoff<T>() -> (HandoffSender<T>, HandoffReceiver<T>) {
    let (tx, rx) = mpsc::channel(HANDOFF_SLOTS);
    (
        HandoffSender { inner: tx },
        HandoffReceiver {
            inner: Arc::new(Mutex::new(rx)),
        },
    )
}

/// Returned by [`HandoffSender::send`] when every consumer is gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Closed;

/// Producer half. Clone it for every producing task.
#[derive(Debug)]
pub struct HandoffSender<T> {
    inner: mpsc::Sender<T>,
}

impl<T> Clone for HandoffSender<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> HandoffSender<T> {
    /// Place an item, waiting until a slot is free.
    pub async fn send(&self, item: T) -> Result<(), Closed> {
        self.inner.send(item).await.map_err(|_| Closed)
    }
}

/// Consumer half. Clone it for every consuming task.
#[derive(Debug)]
pub struct HandoffReceiver<T> {
    inner: Arc<Mutex<mpsc::Receiver<T>>>,
}

impl<T> Clone for HandoffReceiver<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> HandoffReceiver<T> {
    /// Take the next item, or `None` once the queue is closed and drained.
    pub async fn recv(&self) -> Option<T> {
        self.inner.lock().await.recv().await
    }
}
