//! Broker engine
//!
//! `MemoryBroker` is an in-process, peek-lock message broker:
//! - queues and topics, each topic fanning out to named subscriptions
//! - at-least-once delivery under expiring locks
//! - complete / dead-letter / abandon dispositions per lock token
//! - automatic dead-lettering once `max_delivery_count` is exceeded
//!
//! Concurrency and usage notes:
//! - The broker is shared as `Arc<MemoryBroker>`; all state sits behind one
//!   mutex which is never held across an await point.
//! - Receivers waiting on an empty entity park on that entity's `Notify` and
//!   wake on send, abandon, lock expiry, timeout or cancellation.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::entity::{DeadLetteredMessage, Entity, StoredMessage};
use super::envelope::{Envelope, EntityPath, OutgoingMessage};
use super::source::{MessageSender, MessageSource, Received};
use crate::utils::error::SourceError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BrokerOptions {
    /// How long a delivered message stays locked to its receiver.
    pub lock_duration: Duration,
    /// Deliveries allowed before a message is dead-lettered automatically.
    pub max_delivery_count: u32,
}

impl Default for BrokerOptions {
    fn default() -> Self {
        Self {
            lock_duration: Duration::from_secs(30),
            max_delivery_count: 10,
        }
    }
}

#[derive(Debug)]
struct Topic {
    subscriptions: HashMap<String, Entity>,
}

#[derive(Debug, Default)]
struct BrokerState {
    queues: HashMap<String, Entity>,
    topics: HashMap<String, Topic>,
    next_sequence: u64,
}

impl BrokerState {
    /// Looks up a receivable entity, creating it on first use.
    fn receivable(&mut self, path: &EntityPath) -> Result<&mut Entity, SourceError> {
        match path {
            EntityPath::Queue { name } => Ok(self
                .queues
                .entry(name.clone())
                .or_insert_with(|| Entity::new(name))),
            EntityPath::Subscription { topic, name } => Ok(self
                .topics
                .entry(topic.clone())
                .or_insert_with(|| Topic {
                    subscriptions: HashMap::new(),
                })
                .subscriptions
                .entry(name.clone())
                .or_insert_with(|| Entity::new(&path.to_string()))),
            EntityPath::Topic { name } => Err(SourceError::Protocol(format!(
                "cannot receive from topic `{name}`; receive from one of its subscriptions"
            ))),
        }
    }

    fn existing(&mut self, path: &EntityPath) -> Result<&mut Entity, SourceError> {
        let entity = match path {
            EntityPath::Queue { name } => self.queues.get_mut(name),
            EntityPath::Subscription { topic, name } => self
                .topics
                .get_mut(topic)
                .and_then(|t| t.subscriptions.get_mut(name)),
            EntityPath::Topic { .. } => None,
        };
        entity.ok_or_else(|| SourceError::EntityNotFound(path.to_string()))
    }
}

#[derive(Debug, Default)]
pub struct MemoryBroker {
    state: Mutex<BrokerState>,
    options: BrokerOptions,
}

impl MemoryBroker {
    pub fn new(options: BrokerOptions) -> Self {
        Self {
            state: Mutex::new(BrokerState::default()),
            options,
        }
    }

    fn lock(&self) -> MutexGuard<'_, BrokerState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn provision_queue(&self, name: &str) {
        let mut state = self.lock();
        state
            .queues
            .entry(name.to_string())
            .or_insert_with(|| Entity::new(name));
    }

    /// Creates the topic and any missing subscriptions. Existing
    /// subscriptions keep their messages.
    pub fn provision_topic(&self, topic: &str, subscriptions: &[String]) {
        let mut state = self.lock();
        let entry = state.topics.entry(topic.to_string()).or_insert_with(|| Topic {
            subscriptions: HashMap::new(),
        });
        for name in subscriptions {
            let path = EntityPath::subscription(topic, name.as_str());
            entry
                .subscriptions
                .entry(name.clone())
                .or_insert_with(|| Entity::new(&path.to_string()));
        }
    }

    /// Enqueues a message on a queue, or a copy on every subscription of a
    /// topic. Returns the assigned message id.
    pub fn send(&self, path: &EntityPath, message: OutgoingMessage) -> Result<String, SourceError> {
        let mut state = self.lock();
        let id = Uuid::new_v4().to_string();
        let sequence = state.next_sequence;
        state.next_sequence += 1;

        let stored = StoredMessage {
            id: id.clone(),
            sequence,
            enqueued_time: Utc::now(),
            body: message.body,
            application_properties: message.application_properties,
            delivery_count: 0,
        };

        match path {
            EntityPath::Queue { name } => {
                state
                    .queues
                    .entry(name.clone())
                    .or_insert_with(|| Entity::new(name))
                    .enqueue(stored);
            }
            EntityPath::Topic { name } => match state.topics.get_mut(name) {
                Some(topic) if !topic.subscriptions.is_empty() => {
                    for entity in topic.subscriptions.values_mut() {
                        entity.enqueue(stored.clone());
                    }
                }
                _ => {
                    tracing::warn!(topic = %name, message_id = %id, "topic has no subscriptions, message dropped");
                }
            },
            EntityPath::Subscription { .. } => {
                return Err(SourceError::Protocol(format!(
                    "cannot send to subscription `{path}`; send to its topic"
                )));
            }
        }

        tracing::debug!(entity = %path, message_id = %id, "message enqueued");
        Ok(id)
    }

    pub async fn receive(
        &self,
        path: &EntityPath,
        timeout: Option<Duration>,
        cancel: &CancellationToken,
    ) -> Result<Received, SourceError> {
        // A timeout too large to represent waits without a deadline.
        let deadline = timeout.and_then(|t| Instant::now().checked_add(t));

        loop {
            if cancel.is_cancelled() {
                return Ok(Received::Cancelled);
            }

            let now = Instant::now();
            let (notify, lock_expiry) = {
                let mut state = self.lock();
                let entity = state.receivable(path)?;
                if let Some(envelope) = entity.take_next(
                    now,
                    self.options.lock_duration,
                    self.options.max_delivery_count,
                ) {
                    return Ok(Received::Message(envelope));
                }
                (entity.notifier(), entity.next_lock_expiry())
            };

            if deadline.is_some_and(|d| now >= d) {
                return Ok(Received::Empty);
            }

            let wake_at = match (deadline, lock_expiry) {
                (Some(d), Some(e)) => Some(d.min(e)),
                (d, e) => d.or(e),
            };
            let sleep = async move {
                match wake_at {
                    Some(at) => tokio::time::sleep_until(at).await,
                    None => std::future::pending::<()>().await,
                }
            };

            tokio::select! {
                _ = cancel.cancelled() => return Ok(Received::Cancelled),
                _ = notify.notified() => {}
                _ = sleep => {}
            }
        }
    }

    pub fn complete(&self, path: &EntityPath, lock_token: Uuid) -> Result<(), SourceError> {
        let mut state = self.lock();
        state.existing(path)?.complete(lock_token, Instant::now())
    }

    pub fn dead_letter(
        &self,
        path: &EntityPath,
        lock_token: Uuid,
        reason: &str,
        description: &str,
    ) -> Result<(), SourceError> {
        let mut state = self.lock();
        state
            .existing(path)?
            .dead_letter(lock_token, Instant::now(), reason, description)
    }

    pub fn abandon(&self, path: &EntityPath, lock_token: Uuid) -> Result<(), SourceError> {
        let mut state = self.lock();
        state.existing(path)?.abandon(lock_token, Instant::now())
    }

    /// Releases locks held by a receiver that went away.
    pub fn release_locks(&self, path: &EntityPath, lock_tokens: &[Uuid]) {
        let mut state = self.lock();
        if let Ok(entity) = state.existing(path) {
            entity.abandon_all(lock_tokens);
        }
    }

    pub fn dead_letters(&self, path: &EntityPath) -> Vec<DeadLetteredMessage> {
        let mut state = self.lock();
        state
            .existing(path)
            .map(|e| e.dead_letters().to_vec())
            .unwrap_or_default()
    }

    /// Messages waiting for a receiver, excluding locked ones.
    pub fn active_count(&self, path: &EntityPath) -> usize {
        let mut state = self.lock();
        state.existing(path).map(|e| e.ready_count()).unwrap_or(0)
    }

    pub fn locked_count(&self, path: &EntityPath) -> usize {
        let mut state = self.lock();
        state.existing(path).map(|e| e.locked_count()).unwrap_or(0)
    }

    pub fn receiver(self: &Arc<Self>, path: EntityPath) -> MemoryReceiver {
        MemoryReceiver {
            broker: self.clone(),
            path,
        }
    }

    pub fn sender(self: &Arc<Self>, path: EntityPath) -> MemorySender {
        MemorySender {
            broker: self.clone(),
            path,
        }
    }
}

/// `MessageSource` bound to one queue or subscription of a `MemoryBroker`.
#[derive(Debug, Clone)]
pub struct MemoryReceiver {
    broker: Arc<MemoryBroker>,
    path: EntityPath,
}

impl MemoryReceiver {
    pub fn path(&self) -> &EntityPath {
        &self.path
    }
}

#[async_trait]
impl MessageSource for MemoryReceiver {
    async fn receive(
        &self,
        timeout: Option<Duration>,
        cancel: &CancellationToken,
    ) -> Result<Received, SourceError> {
        self.broker.receive(&self.path, timeout, cancel).await
    }

    async fn complete(&self, envelope: &Envelope) -> Result<(), SourceError> {
        self.broker.complete(&self.path, envelope.lock_token)
    }

    async fn dead_letter(
        &self,
        envelope: &Envelope,
        reason: &str,
        description: &str,
    ) -> Result<(), SourceError> {
        self.broker
            .dead_letter(&self.path, envelope.lock_token, reason, description)
    }

    async fn abandon(&self, envelope: &Envelope) -> Result<(), SourceError> {
        self.broker.abandon(&self.path, envelope.lock_token)
    }
}

/// `MessageSender` bound to one queue or topic of a `MemoryBroker`.
#[derive(Debug, Clone)]
pub struct MemorySender {
    broker: Arc<MemoryBroker>,
    path: EntityPath,
}

#[async_trait]
impl MessageSender for MemorySender {
    async fn send(&self, message: OutgoingMessage) -> Result<String, SourceError> {
        self.broker.send(&self.path, message)
    }
}
