//! Identity-deduplicated union of pulled messages.

use std::collections::HashSet;

use crate::types::{AckHandle, LeasedMessage};

/// Messages pulled from one or more subscriptions, deduplicated by broker
/// identity.
///
/// When a message arrives more than once, the first lease is kept as the
/// set's element and the later leases are remembered as shadow handles so
/// acknowledging the set settles every copy.
#[derive(Debug, Default)]
pub struct MergedPullResult {
    messages: HashSet<LeasedMessage>,
    shadow_handles: Vec<AckHandle>,
}

impl MergedPullResult {
    /// Create an empty result.
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge a batch of messages and return how many collapsed into existing entries.
    pub fn extend<I>(&mut self, batch: I) -> usize
    where
        I: IntoIterator<Item = LeasedMessage>,
    {
        let mut collapsed = 0;
        for message in batch {
            let handle = message.ack_handle.clone();
            if !self.messages.insert(message) {
                self.shadow_handles.push(handle);
                collapsed += 1;
            }
        }
        collapsed
    }

    /// Number of distinct messages.
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Whether no message was pulled.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Number of leases collapsed into existing entries.
    pub fn collapsed(&self) -> usize {
        self.shadow_handles.len()
    }

    /// Distinct messages, in no particular order.
    pub fn messages(&self) -> impl Iterator<Item = &LeasedMessage> {
        self.messages.iter()
    }

    /// Every lease backing the set, shadows included.
    pub fn ack_handles(&self) -> Vec<AckHandle> {
        self.messages
            .iter()
            .map(|m| m.ack_handle.clone())
            .chain(self.shadow_handles.iter().cloned())
            .collect()
    }
}
