//! The action bus: a single ordered multicast stream
//!
//! Every action emitted by any producer passes through one broadcast
//! channel, which fixes the global delivery order. Each subscription runs
//! on its own task, so a slow handler never stalls emission or any other
//! subscriber.

use std::future::Future;

use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::action::{Action, DispatchAction, ROOT_MODULE_ID, ROOT_MODULE_NAME};

/// Default capacity of the bus broadcast channel
pub const DEFAULT_BUS_CAPACITY: usize = 256;

/// Handle to a live bus subscription
///
/// Cancelling is idempotent and safe after the subscriber task has
/// already finished.
#[derive(Debug)]
pub struct Subscription {
    cancel: CancellationToken,
}

impl Subscription {
    /// Cancel the subscription, stopping its task
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Check whether the subscription has been cancelled
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// The ordered multicast action stream
#[derive(Clone)]
pub struct ActionBus {
    tx: broadcast::Sender<Action>,
}

impl ActionBus {
    /// Create a new bus with the default capacity
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_BUS_CAPACITY)
    }

    /// Create a new bus with an explicit channel capacity
    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, rx) = broadcast::channel(capacity);
        let bus = Self { tx };
        bus.spawn_log_sink(rx);
        bus
    }

    /// Standing diagnostic subscription: every action, unfiltered, at debug
    fn spawn_log_sink(&self, mut rx: broadcast::Receiver<Action>) {
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(action) => {
                        debug!(
                            "[{}] ({}, {}, {})",
                            action.provenance(),
                            action.module_name,
                            action.action_type,
                            action.payload_summary(),
                        );
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("Bus log sink lagged, skipped {} actions", n);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
    }

    /// Emit a fully-formed action, with provenance already stamped
    pub fn emit(&self, action: Action) {
        // The log sink holds a receiver for the bus lifetime, so send only
        // fails once the bus is torn down.
        let _ = self.tx.send(action);
    }

    /// Stamp module provenance and emit
    pub fn emit_from(
        &self,
        action: DispatchAction,
        from_module_id: &str,
        from_module_name: &str,
    ) {
        self.emit(action.stamped(from_module_id, from_module_name));
    }

    /// Stamp root provenance and emit; used for system lifecycle actions
    pub fn emit_root(&self, action: DispatchAction) {
        self.emit(action.stamped(ROOT_MODULE_ID, ROOT_MODULE_NAME));
    }

    /// Raw receiver over the full stream, observing actions emitted from now on
    pub fn receiver(&self) -> broadcast::Receiver<Action> {
        self.tx.subscribe()
    }

    /// Register a filter + handler pair on its own task
    ///
    /// The handler sees matching actions in emission order. Returns a
    /// cancellation handle.
    pub fn subscribe<F, H, Fut>(&self, filter: F, handler: H) -> Subscription
    where
        F: Fn(&Action) -> bool + Send + 'static,
        H: Fn(Action) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send,
    {
        let mut rx = self.tx.subscribe();
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    received = rx.recv() => match received {
                        Ok(action) => {
                            if filter(&action) {
                                handler(action).await;
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            warn!("Bus subscriber lagged, skipped {} actions", n);
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            }
        });
        Subscription { cancel }
    }

    /// Build a filtered channel view of the bus, e.g. a module's action stream
    pub fn filtered_stream<F>(&self, filter: F) -> (mpsc::Receiver<Action>, Subscription)
    where
        F: Fn(&Action) -> bool + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(DEFAULT_BUS_CAPACITY);
        let subscription = self.subscribe(filter, move |action| {
            let tx = tx.clone();
            async move {
                // Receiver dropped means the consumer is gone; nothing to do
                let _ = tx.send(action).await;
            }
        });
        (rx, subscription)
    }
}

impl Default for ActionBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;
    use tokio::sync::Mutex;
    use tokio::time::{timeout, Duration};

    fn beat(n: u64) -> DispatchAction {
        DispatchAction::new("Heartbeat", "beat", json!({ "n": n }))
    }

    #[tokio::test]
    async fn test_subscriber_sees_actions_in_emission_order() {
        let bus = ActionBus::new();
        let (mut rx, _sub) = bus.filtered_stream(|_| true);

        for n in 0..5 {
            bus.emit_root(beat(n));
        }

        for n in 0..5 {
            let action = timeout(Duration::from_secs(1), rx.recv())
                .await
                .expect("recv timed out")
                .expect("stream closed");
            assert_eq!(action.payload["n"], n);
        }
    }

    #[tokio::test]
    async fn test_no_replay_before_subscription() {
        let bus = ActionBus::new();
        bus.emit_root(beat(0));

        let (mut rx, _sub) = bus.filtered_stream(|_| true);
        bus.emit_root(beat(1));

        let action = timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("recv timed out")
            .expect("stream closed");
        assert_eq!(action.payload["n"], 1);
    }

    #[tokio::test]
    async fn test_filter_limits_delivery() {
        let bus = ActionBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let _sub = bus.subscribe(
            |action| action.action_type == "beat",
            move |action| {
                let sink = Arc::clone(&sink);
                async move {
                    sink.lock().await.push(action.payload["n"].clone());
                }
            },
        );

        bus.emit_root(beat(1));
        bus.emit_root(DispatchAction::new("Heartbeat", "other", json!({})));
        bus.emit_root(beat(2));

        tokio::time::sleep(Duration::from_millis(50)).await;
        let seen = seen.lock().await;
        assert_eq!(seen.as_slice(), &[json!(1), json!(2)]);
    }

    #[tokio::test]
    async fn test_cancel_is_idempotent() {
        let bus = ActionBus::new();
        let (mut rx, sub) = bus.filtered_stream(|_| true);
        sub.cancel();
        sub.cancel();
        assert!(sub.is_cancelled());

        bus.emit_root(beat(1));
        // Subscription task has stopped forwarding; the channel drains to None
        let received = timeout(Duration::from_millis(100), rx.recv()).await;
        assert!(matches!(received, Ok(None) | Err(_)));
    }

    #[tokio::test]
    async fn test_emit_from_stamps_provenance() {
        let bus = ActionBus::new();
        let (mut rx, _sub) = bus.filtered_stream(|_| true);
        bus.emit_from(beat(1), "Heartbeat.2", "Heartbeat");

        let action = rx.recv().await.expect("stream closed");
        assert_eq!(action.from_module_id, "Heartbeat.2");
        assert_eq!(action.from_module_name, "Heartbeat");
    }
}
