//! Typed fan-out of authority broadcasts to every mounted surface.
//!
//! One `broadcast` channel carries every [`BridgeEvent`]; each subscription
//! owns a receiver and a dispatch task that filters by topic and calls the
//! registered handler in publish order.

use std::sync::{Arc, Mutex, PoisonError};

use tokio::{
    runtime::Handle,
    sync::broadcast::{self, error::RecvError},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;

use crate::{
    error::AuthorityError,
    models::{BridgeEvent, Topic},
};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_warn};

const CHANNEL_CAPACITY: usize = 256;

pub type EventHandler = Box<dyn FnMut(&BridgeEvent) + Send + 'static>;

/// Anything surfaces can subscribe to.
pub trait EventSource: Send + Sync {
    fn subscribe(&self, topic: Topic, handler: EventHandler)
        -> Result<Subscription, AuthorityError>;
}

#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<BridgeEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    /// Returns how many subscriptions will see the event.
    pub fn publish(&self, event: BridgeEvent) -> usize {
        match self.sender.send(event) {
            Ok(receivers) => receivers,
            Err(broadcast::error::SendError(event)) => {
                log_debug!("No subscribers for {}", event.topic());
                0
            }
        }
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl EventSource for EventBus {
    fn subscribe(
        &self,
        topic: Topic,
        handler: EventHandler,
    ) -> Result<Subscription, AuthorityError> {
        let runtime = Handle::try_current()
            .map_err(|_| AuthorityError::transport("no async runtime to dispatch events on"))?;

        let mut receiver = self.sender.subscribe();
        let slot: Arc<Mutex<Option<EventHandler>>> = Arc::new(Mutex::new(Some(handler)));
        let token = CancellationToken::new();

        let task_slot = slot.clone();
        let task_token = token.clone();
        let task = runtime.spawn(async move {
            loop {
                let received = tokio::select! {
                    _ = task_token.cancelled() => break,
                    received = receiver.recv() => received,
                };

                match received {
                    Ok(event) => {
                        if event.topic() != topic {
                            continue;
                        }
                        let mut guard = task_slot.lock().unwrap_or_else(PoisonError::into_inner);
                        match guard.as_mut() {
                            Some(handler) => handler(&event),
                            None => break,
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        log_warn!("Subscriber on {topic} lagged, skipped {skipped} events");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });

        Ok(Subscription {
            topic,
            slot,
            token,
            task: Some(task),
        })
    }
}

/// Handle to a registered handler. Dropping it unsubscribes.
pub struct Subscription {
    topic: Topic,
    slot: Arc<Mutex<Option<EventHandler>>>,
    token: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl Subscription {
    pub fn topic(&self) -> Topic {
        self.topic
    }

    /// Unsubscribes. Waits for an in-flight handler call, so the handler is
    /// never invoked once this returns. Must not be called from inside the
    /// handler itself.
    pub fn cancel(mut self) {
        self.release();
    }

    fn release(&mut self) {
        self.token.cancel();
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("topic", &self.topic)
            .field("cancelled", &self.token.is_cancelled())
            .finish()
    }
}
