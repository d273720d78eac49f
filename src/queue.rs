// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Queue Entities
//!
//! This module provides the runtime representation of a queue inside the fake
//! broker: an ordered mailbox of pending messages plus an explicit list of
//! publish listeners fired synchronously on every enqueue. Active consumers
//! register a listener; there is no hidden event wiring.
//!
//! Enqueue and dequeue are atomic with respect to size reads, but listeners
//! are always invoked outside the internal lock: a consumer callback may
//! re-enter the broker (for example to ack the delivery it just received)
//! without deadlocking.

use crate::{binding::ExchangeQueueBinding, message::RabbitMessage};
use dashmap::DashMap;
use lapin::types::FieldTable;
use std::{
    collections::VecDeque,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};
use uuid::Uuid;

/// Queue-declaration argument naming the dead-letter exchange that receives
/// messages rejected or nacked without requeue.
pub const AMQP_HEADERS_DEAD_LETTER_EXCHANGE: &str = "x-dead-letter-exchange";

/// Callback invoked synchronously whenever a message is enqueued.
pub(crate) type PublishListener = Arc<dyn Fn(&RabbitMessage) + Send + Sync>;

/// A declared queue held by the entity store.
///
/// Attributes are fixed at first declaration (first declaration wins). The
/// owner is the identity of the channel that declared the queue, used for the
/// exclusive-access check.
pub struct Queue {
    name: String,
    durable: bool,
    exclusive: bool,
    auto_delete: bool,
    arguments: FieldTable,
    owner: Option<Uuid>,
    messages: Mutex<VecDeque<RabbitMessage>>,
    listeners: Mutex<Vec<(String, PublishListener)>>,
    bindings: DashMap<String, ExchangeQueueBinding>,
}

impl Queue {
    /// Creates a new queue entity.
    ///
    /// # Parameters
    /// * `name` - Unique queue name
    /// * `durable` - Durability flag, recorded only
    /// * `exclusive` - When set, only the owning channel may redeclare the
    ///   queue
    /// * `auto_delete` - When set, the queue is removed when its declaring
    ///   channel closes
    /// * `arguments` - Declaration arguments, may carry dead-letter directives
    /// * `owner` - Identity of the declaring channel
    pub fn new(
        name: &str,
        durable: bool,
        exclusive: bool,
        auto_delete: bool,
        arguments: FieldTable,
        owner: Option<Uuid>,
    ) -> Queue {
        Queue {
            name: name.to_owned(),
            durable,
            exclusive,
            auto_delete,
            arguments,
            owner,
            messages: Mutex::default(),
            listeners: Mutex::default(),
            bindings: DashMap::default(),
        }
    }

    /// Returns the queue name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the durability flag.
    pub fn is_durable(&self) -> bool {
        self.durable
    }

    /// Returns the exclusivity flag.
    pub fn is_exclusive(&self) -> bool {
        self.exclusive
    }

    /// Returns the auto-delete flag.
    pub fn is_auto_delete(&self) -> bool {
        self.auto_delete
    }

    /// Returns the declaration arguments.
    pub fn arguments(&self) -> &FieldTable {
        &self.arguments
    }

    /// Returns the identity of the channel that declared the queue.
    pub fn owner(&self) -> Option<Uuid> {
        self.owner
    }

    /// Enqueues a message at the tail, stamping it with this queue's name,
    /// then fires every registered publish listener.
    pub fn publish(&self, mut message: RabbitMessage) {
        message.queue = Some(self.name.clone());
        self.lock_messages().push_back(message.clone());

        // Snapshot before firing: callbacks may re-enter the queue.
        let listeners: Vec<PublishListener> = self
            .lock_listeners()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in listeners {
            listener(&message);
        }
    }

    /// Removes and returns the message at the head of the queue.
    pub fn dequeue(&self) -> Option<RabbitMessage> {
        self.lock_messages().pop_front()
    }

    /// Returns a copy of the message at the head without removing it.
    pub fn peek(&self) -> Option<RabbitMessage> {
        self.lock_messages().front().cloned()
    }

    /// Empties the pending sequence, returning the number of messages
    /// removed. In-flight working entries already checked out are unaffected.
    pub fn purge(&self) -> u32 {
        let mut messages = self.lock_messages();
        let purged = messages.len() as u32;
        messages.clear();
        purged
    }

    /// Returns the number of pending messages.
    pub fn message_count(&self) -> u32 {
        self.lock_messages().len() as u32
    }

    /// Returns a snapshot of the pending messages in queue order.
    pub fn messages(&self) -> Vec<RabbitMessage> {
        self.lock_messages().iter().cloned().collect()
    }

    /// Inserts a binding, replacing any previous binding with the same
    /// identity key.
    pub(crate) fn bind(&self, binding: ExchangeQueueBinding) {
        self.bindings.insert(binding.key(), binding);
    }

    /// Removes the binding with the given identity key, if present.
    pub(crate) fn unbind(&self, key: &str) {
        self.bindings.remove(key);
    }

    /// Returns a snapshot of the current bindings.
    pub fn bindings(&self) -> Vec<ExchangeQueueBinding> {
        self.bindings.iter().map(|e| e.value().clone()).collect()
    }

    /// Returns the number of bindings currently attached to the queue.
    pub fn binding_count(&self) -> usize {
        self.bindings.len()
    }

    /// Registers a publish listener under the given consumer tag.
    pub(crate) fn subscribe(&self, consumer_tag: &str, listener: PublishListener) {
        self.lock_listeners()
            .push((consumer_tag.to_owned(), listener));
    }

    /// Removes the publish listener registered under the given consumer tag.
    pub(crate) fn unsubscribe(&self, consumer_tag: &str) {
        self.lock_listeners().retain(|(tag, _)| tag != consumer_tag);
    }

    /// Returns the dead-letter exchange named by the queue's declaration
    /// arguments, if any.
    pub fn dead_letter_exchange(&self) -> Option<String> {
        self.arguments
            .inner()
            .get(AMQP_HEADERS_DEAD_LETTER_EXCHANGE)
            .and_then(|value| value.as_long_string())
            .map(|name| name.to_string())
    }

    fn lock_messages(&self) -> MutexGuard<'_, VecDeque<RabbitMessage>> {
        self.messages.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_listeners(&self) -> MutexGuard<'_, Vec<(String, PublishListener)>> {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
