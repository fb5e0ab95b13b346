//! Entity state
//!
//! An `Entity` is one receivable message store: a queue, or one subscription
//! on a topic. Messages move between three places:
//!
//! - `ready`: waiting for a receiver, in enqueue order
//! - `locked`: delivered under a lock token and awaiting disposition
//! - `dead_letters`: settled to the side channel, never redelivered
//!
//! Concurrency note: callers must hold the broker lock while touching an
//! entity. Waiters park on `notify` outside that lock.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Notify;
use tokio::time::Instant;
use uuid::Uuid;

use super::envelope::Envelope;
use crate::utils::error::SourceError;

/// Dead-letter reason used when a message is delivered too many times.
pub const MAX_DELIVERY_COUNT_EXCEEDED: &str = "MaxDeliveryCountExceeded";

/// Stand-in for "never" when an instant would overflow.
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// `now + duration`, saturating at a far-future instant instead of panicking.
fn instant_after(now: Instant, duration: Duration) -> Instant {
    now.checked_add(duration)
        .or_else(|| now.checked_add(FAR_FUTURE))
        .unwrap_or(now)
}

#[derive(Debug, Clone)]
pub(crate) struct StoredMessage {
    pub id: String,
    pub sequence: u64,
    pub enqueued_time: DateTime<Utc>,
    pub body: Vec<u8>,
    pub application_properties: HashMap<String, String>,
    pub delivery_count: u32,
}

#[derive(Debug)]
struct LockedMessage {
    message: StoredMessage,
    locked_until: Instant,
}

/// A message settled to an entity's dead-letter list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeadLetteredMessage {
    pub id: String,
    pub body: Vec<u8>,
    pub application_properties: HashMap<String, String>,
    pub reason: String,
    pub description: String,
    pub delivery_count: u32,
    pub dead_lettered_at: DateTime<Utc>,
}

#[derive(Debug)]
pub(crate) struct Entity {
    pub name: String,
    ready: VecDeque<StoredMessage>,
    locked: HashMap<Uuid, LockedMessage>,
    dead_letters: Vec<DeadLetteredMessage>,
    notify: Arc<Notify>,
}

impl Entity {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ready: VecDeque::new(),
            locked: HashMap::new(),
            dead_letters: Vec::new(),
            notify: Arc::new(Notify::new()),
        }
    }

    pub fn notifier(&self) -> Arc<Notify> {
        self.notify.clone()
    }

    pub fn enqueue(&mut self, message: StoredMessage) {
        self.ready.push_back(message);
        self.notify.notify_one();
    }

    pub fn ready_count(&self) -> usize {
        self.ready.len()
    }

    pub fn locked_count(&self) -> usize {
        self.locked.len()
    }

    pub fn dead_letters(&self) -> &[DeadLetteredMessage] {
        &self.dead_letters
    }

    /// Earliest instant at which a held lock lapses, if any are held.
    pub fn next_lock_expiry(&self) -> Option<Instant> {
        self.locked.values().map(|l| l.locked_until).min()
    }

    /// Returns every lapsed lock to the front of `ready`, keeping enqueue order.
    pub fn reclaim_expired(&mut self, now: Instant) {
        let expired: Vec<Uuid> = self
            .locked
            .iter()
            .filter(|(_, l)| l.locked_until <= now)
            .map(|(token, _)| *token)
            .collect();
        if expired.is_empty() {
            return;
        }

        let mut reclaimed: Vec<StoredMessage> = expired
            .iter()
            .filter_map(|token| self.locked.remove(token))
            .map(|l| l.message)
            .collect();
        reclaimed.sort_by_key(|m| std::cmp::Reverse(m.sequence));
        for message in reclaimed {
            tracing::debug!(entity = %self.name, message_id = %message.id, "lock expired");
            self.ready.push_front(message);
        }
        self.notify.notify_one();
    }

    /// Locks and returns the next deliverable message. Messages that would
    /// exceed `max_delivery_count` are dead-lettered on the way.
    pub fn take_next(
        &mut self,
        now: Instant,
        lock_duration: Duration,
        max_delivery_count: u32,
    ) -> Option<Envelope> {
        self.reclaim_expired(now);
        let locked_until = instant_after(now, lock_duration);

        while let Some(mut message) = self.ready.pop_front() {
            message.delivery_count += 1;
            if message.delivery_count > max_delivery_count {
                tracing::warn!(
                    entity = %self.name,
                    message_id = %message.id,
                    "delivery count exceeded, dead-lettering"
                );
                let description = format!(
                    "Message could not be consumed after {max_delivery_count} delivery attempts"
                );
                self.push_dead_letter(message, MAX_DELIVERY_COUNT_EXCEEDED, &description);
                continue;
            }

            let lock_token = Uuid::new_v4();
            let envelope = Envelope {
                id: message.id.clone(),
                enqueued_time: message.enqueued_time,
                body: message.body.clone(),
                application_properties: message.application_properties.clone(),
                lock_token,
                delivery_count: message.delivery_count,
            };
            self.locked.insert(
                lock_token,
                LockedMessage {
                    message,
                    locked_until,
                },
            );
            return Some(envelope);
        }
        None
    }

    pub fn complete(&mut self, lock_token: Uuid, now: Instant) -> Result<(), SourceError> {
        self.release(lock_token, now).map(|_| ())
    }

    pub fn dead_letter(
        &mut self,
        lock_token: Uuid,
        now: Instant,
        reason: &str,
        description: &str,
    ) -> Result<(), SourceError> {
        let message = self.release(lock_token, now)?;
        self.push_dead_letter(message, reason, description);
        Ok(())
    }

    pub fn abandon(&mut self, lock_token: Uuid, now: Instant) -> Result<(), SourceError> {
        let message = self.release(lock_token, now)?;
        self.ready.push_front(message);
        self.notify.notify_one();
        Ok(())
    }

    /// Returns every held lock to `ready`, regardless of expiry.
    pub fn abandon_all(&mut self, lock_tokens: &[Uuid]) {
        for token in lock_tokens {
            if let Some(locked) = self.locked.remove(token) {
                self.ready.push_front(locked.message);
            }
        }
        self.notify.notify_one();
    }

    fn release(&mut self, lock_token: Uuid, now: Instant) -> Result<StoredMessage, SourceError> {
        self.reclaim_expired(now);
        self.locked
            .remove(&lock_token)
            .map(|l| l.message)
            .ok_or(SourceError::LockLost(lock_token))
    }

    fn push_dead_letter(&mut self, message: StoredMessage, reason: &str, description: &str) {
        self.dead_letters.push(DeadLetteredMessage {
            id: message.id,
            body: message.body,
            application_properties: message.application_properties,
            reason: reason.to_string(),
            description: description.to_string(),
            delivery_count: message.delivery_count,
            dead_lettered_at: Utc::now(),
        });
    }
}
