//! Background listeners behind push subscriptions.
//!
//! A listener repeatedly leases messages from one subscription, hands each
//! to the subscriber's handler and settles the lease according to the
//! handler's [`AckReply`]. Both broker implementations drive their push
//! subscribers through [`spawn_listener`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::broker::MessageBroker;
use crate::metrics::get_metrics;
use crate::types::{AckHandle, LeasedMessage};
use crate::Error;

/// What a handler wants done with a delivered message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckReply {
    /// Acknowledge; the broker stops redelivering the message.
    Ack,
    /// Release the lease so the message is redelivered.
    Nack,
}

/// Callback invoked for every delivered message.
pub type MessageHandler = Arc<dyn Fn(&LeasedMessage) -> AckReply + Send + Sync>;

/// Polling parameters for a listener.
#[derive(Debug, Clone, Copy)]
pub struct ListenerOptions {
    /// Maximum messages leased per poll.
    pub max_messages: u32,
    /// Delay between polls while the subscription is idle or failing.
    pub poll_interval: Duration,
}

impl Default for ListenerOptions {
    fn default() -> Self {
        Self {
            max_messages: 100,
            poll_interval: Duration::from_millis(500),
        }
    }
}

/// Delivery counters of a listener.
#[derive(Debug, Default)]
pub struct ListenerStats {
    delivered: AtomicU64,
    acked: AtomicU64,
}

impl ListenerStats {
    /// Messages handed to the handler.
    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    /// Messages whose acknowledgment the broker confirmed.
    pub fn acked(&self) -> u64 {
        self.acked.load(Ordering::Relaxed)
    }
}

/// Counts a listener in the active-subscriber gauge for as long as its
/// task is alive, however the task ends.
struct ActiveListener;

impl ActiveListener {
    fn enter() -> Self {
        get_metrics().active_subscribers.inc();
        ActiveListener
    }
}

impl Drop for ActiveListener {
    fn drop(&mut self) {
        get_metrics().active_subscribers.dec();
    }
}

/// A running listener bound to one subscription.
#[derive(Debug)]
pub struct SubscriberTask {
    subscription: String,
    cancel: CancellationToken,
    stats: Arc<ListenerStats>,
    handle: JoinHandle<()>,
}

impl SubscriberTask {
    /// Subscription this listener consumes.
    pub fn subscription(&self) -> &str {
        &self.subscription
    }

    /// Delivery counters.
    pub fn stats(&self) -> Arc<ListenerStats> {
        self.stats.clone()
    }

    /// Whether the listener loop is still alive.
    pub fn is_running(&self) -> bool {
        !self.cancel.is_cancelled() && !self.handle.is_finished()
    }

    /// Cancel the listener and wait for its loop to exit.
    pub async fn stop(self) {
        self.cancel.cancel();
        if let Err(e) = self.handle.await {
            warn!(subscription = %self.subscription, "Listener task ended abnormally: {}", e);
        }
        info!(subscription = %self.subscription, "Listener stopped");
    }
}

/// Spawn a listener loop for `subscription` on the current tokio runtime.
pub fn spawn_listener<B>(
    broker: B,
    subscription: String,
    handler: MessageHandler,
    options: ListenerOptions,
) -> SubscriberTask
where
    B: MessageBroker + 'static,
{
    let cancel = CancellationToken::new();
    let stats = Arc::new(ListenerStats::default());
    let active = ActiveListener::enter();

    let listener = run_listener(
        broker,
        subscription.clone(),
        handler,
        options,
        cancel.clone(),
        stats.clone(),
    );
    let handle = tokio::spawn(async move {
        let _active = active;
        listener.await;
    });

    info!(subscription = %subscription, "Listener started");

    SubscriberTask {
        subscription,
        cancel,
        stats,
        handle,
    }
}

async fn run_listener<B: MessageBroker>(
    broker: B,
    subscription: String,
    handler: MessageHandler,
    options: ListenerOptions,
    cancel: CancellationToken,
    stats: Arc<ListenerStats>,
) {
    loop {
        let pulled = tokio::select! {
            _ = cancel.cancelled() => break,
            result = broker.pull(&subscription, options.max_messages, true) => result,
        };

        match pulled {
            Ok(messages) if !messages.is_empty() => {
                dispatch(&broker, &subscription, &handler, &messages, &stats).await;
                // Keep draining while the subscription has a backlog.
                continue;
            }
            Ok(_) => {}
            Err(Error::SubscriptionNotFound(_)) => {
                warn!(subscription = %subscription, "Subscription no longer exists, listener exiting");
                break;
            }
            Err(e) => {
                warn!(subscription = %subscription, "Listener pull failed: {}", e);
            }
        }

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(options.poll_interval) => {}
        }
    }

    debug!(subscription = %subscription, "Listener loop exited");
}

async fn dispatch<B: MessageBroker>(
    broker: &B,
    subscription: &str,
    handler: &MessageHandler,
    messages: &[LeasedMessage],
    stats: &ListenerStats,
) {
    let mut acks: Vec<AckHandle> = Vec::new();
    let mut nacks: Vec<AckHandle> = Vec::new();

    for message in messages {
        stats.delivered.fetch_add(1, Ordering::Relaxed);
        match handler(message) {
            AckReply::Ack => acks.push(message.ack_handle.clone()),
            AckReply::Nack => nacks.push(message.ack_handle.clone()),
        }
    }

    if !acks.is_empty() {
        match broker.acknowledge(&acks).await {
            Ok(()) => {
                stats.acked.fetch_add(acks.len() as u64, Ordering::Relaxed);
                debug!(subscription = %subscription, count = acks.len(), "Listener acked messages");
            }
            Err(e) => warn!(subscription = %subscription, "Listener ack failed: {}", e),
        }
    }

    if !nacks.is_empty() {
        if let Err(e) = broker.modify_ack_deadline(&nacks, 0).await {
            warn!(subscription = %subscription, "Listener nack failed: {}", e);
        }
    }
}
