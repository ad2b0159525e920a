//! Emitter - disposable event source backed by a broadcast channel
//!
//! Subscribers get a `broadcast::Receiver`. Disposing drops the sender, so
//! every receiver sees `RecvError::Closed` once it drains what was fired.

use std::sync::Mutex;
use tokio::sync::broadcast;

pub const DEFAULT_CAPACITY: usize = 1024;

/// Event emitter that can be torn down exactly once
pub struct Emitter<T: Clone> {
    tx: Mutex<Option<broadcast::Sender<T>>>,
}

impl<T: Clone> Emitter<T> {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            tx: Mutex::new(Some(tx)),
        }
    }

    /// Fire an event. Returns the number of receivers it reached.
    pub fn fire(&self, event: T) -> usize {
        let guard = self.tx.lock().unwrap_or_else(|e| e.into_inner());
        match guard.as_ref() {
            Some(tx) => tx.send(event).unwrap_or(0), // No subscribers is fine
            None => 0,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<T> {
        let guard = self.tx.lock().unwrap_or_else(|e| e.into_inner());
        match guard.as_ref() {
            Some(tx) => tx.subscribe(),
            None => {
                // A receiver whose sender is already gone
                let (tx, rx) = broadcast::channel(1);
                drop(tx);
                rx
            }
        }
    }

    /// Drop the sender. Returns false if already disposed.
    pub fn dispose(&self) -> bool {
        let mut guard = self.tx.lock().unwrap_or_else(|e| e.into_inner());
        guard.take().is_some()
    }

    pub fn is_disposed(&self) -> bool {
        self.tx
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_none()
    }

    pub fn receiver_count(&self) -> usize {
        let guard = self.tx.lock().unwrap_or_else(|e| e.into_inner());
        guard.as_ref().map_or(0, |tx| tx.receiver_count())
    }
}

impl<T: Clone> Default for Emitter<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::broadcast::error::RecvError;

    #[tokio::test]
    async fn test_fire_and_receive() {
        let emitter = Emitter::new();
        let mut rx = emitter.subscribe();

        assert_eq!(emitter.fire("hello"), 1);

        match rx.recv().await {
            Ok("hello") => {}
            other => panic!("Expected hello, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_dispose_closes_receivers() {
        let emitter: Emitter<u32> = Emitter::with_capacity(8);
        let mut rx = emitter.subscribe();

        emitter.fire(1);
        assert!(emitter.dispose());
        assert!(!emitter.dispose());
        assert_eq!(emitter.fire(2), 0);

        assert_eq!(rx.recv().await.unwrap(), 1);
        assert!(matches!(rx.recv().await, Err(RecvError::Closed)));

        let mut late = emitter.subscribe();
        assert!(matches!(late.recv().await, Err(RecvError::Closed)));
    }
}
