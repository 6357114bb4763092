use tokio::sync::watch;

/// Caller side of a cancellation pair
#[derive(Debug, Clone)]
pub struct CancellationHandle {
    sender: watch::Sender<bool>,
}

/// Pipeline side: checked at phase boundaries and raced against in-flight calls
#[derive(Debug, Clone)]
pub struct CancelSignal {
    receiver: watch::Receiver<bool>,
}

pub fn cancellation_pair() -> (CancellationHandle, CancelSignal) {
    let (sender, receiver) = watch::channel(false);
    (CancellationHandle { sender }, CancelSignal { receiver })
}

impl CancellationHandle {
    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }

    pub fn signal(&self) -> CancelSignal {
        CancelSignal {
            receiver: self.sender.subscribe(),
        }
    }
}

impl CancelSignal {
    /// A signal that never fires
    pub fn never() -> Self {
        let (_, receiver) = watch::channel(false);
        CancelSignal { receiver }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Resolves once cancellation is requested
    pub async fn cancelled(&self) {
        let mut receiver = self.receiver.clone();
        if receiver.wait_for(|cancelled| *cancelled).await.is_err() {
            // Handle dropped without cancelling: never resolve
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_cancel_wakes_waiters() {
        let (handle, signal) = cancellation_pair();
        assert!(!signal.is_cancelled());

        let waiter = tokio::spawn({
            let signal = signal.clone();
            async move { signal.cancelled().await }
        });
        handle.cancel();

        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should wake")
            .unwrap();
        assert!(signal.is_cancelled());
    }

    #[tokio::test]
    async fn test_never_signal_stays_pending() {
        let signal = CancelSignal::never();
        let result = tokio::time::timeout(Duration::from_millis(20), signal.cancelled()).await;
        assert!(result.is_err());
        assert!(!signal.is_cancelled());
    }
}
