//! Hand-off queues between the supervised tasks.
//!
//! A queue outlives the tasks on either end: a restarted task re-attaches to the same
//! receiver, so senders never observe a closed channel while its consumer restarts.

use std::sync::Arc;
use tokio::sync::{mpsc, Mutex, OwnedMutexGuard};

/// Capacity 1: a sender waits until the consumer has taken the previous item.
const HANDOFF_CAPACITY: usize = 1;

/// Single-consumer queue whose receiver survives consumer restarts.
pub struct Queue<T> {
    tx: mpsc::Sender<T>,
    rx: Arc<Mutex<mpsc::Receiver<T>>>,
}

impl<T> Clone for Queue<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            rx: self.rx.clone(),
        }
    }
}

impl<T> Default for Queue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Queue<T> {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel(HANDOFF_CAPACITY);
        Self {
            tx,
            rx: Arc::new(Mutex::new(rx)),
        }
    }

    pub fn sender(&self) -> mpsc::Sender<T> {
        self.tx.clone()
    }

    /// Exclusive access to the receiving end for one consumer run.
    /// Released when the guard drops, i.e. when the consuming task ends or is aborted.
    pub async fn attach(&self) -> OwnedMutexGuard<mpsc::Receiver<T>> {
        self.rx.clone().lock_owned().await
    }
}
