// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Channel Operation Surface
//!
//! `FakeChannel` is the per-channel face of the broker fake: declares, binds,
//! publishes, consumer registration, synchronous fetch, and the
//! acknowledgment state machine. Every channel carries its own identity (used
//! for exclusive-queue ownership), its own monotonically increasing delivery
//! tag counter, and its own working set of delivered-but-unacknowledged
//! messages; all channels share one [`RabbitServer`].
//!
//! All operations are synchronous and in-memory. Consumer callbacks run on
//! the publishing call's stack and may re-enter the channel.

use crate::{
    binding::ExchangeQueueBinding,
    consumer::{ConsumerHandler, Delivery},
    errors::{AmqpError, ShutdownInitiator},
    exchange::{Exchange, ExchangeKind},
    message::RabbitMessage,
    queue::Queue,
    server::RabbitServer,
};
use dashmap::DashMap;
use lapin::{
    options::{
        BasicConsumeOptions, BasicGetOptions, BasicPublishOptions, ExchangeDeclareOptions,
        ExchangeDeleteOptions, QueueDeclareOptions, QueueDeleteOptions,
    },
    types::FieldTable,
    BasicProperties,
};
use std::{
    collections::HashSet,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc, Mutex, MutexGuard, PoisonError,
    },
};
use tracing::{debug, error};
use uuid::Uuid;

/// Why and by whom a channel was shut down, mirroring a broker's
/// channel-close frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseReason {
    pub reply_code: u16,
    pub reply_text: String,
    pub initiator: ShutdownInitiator,
}

/// Reply to a queue declaration.
///
/// Carries the effective queue name (relevant when the declaration asked for
/// a generated name) and the pending message count of the stored queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeclareOk {
    pub queue: String,
    pub message_count: u32,
    pub consumer_count: u32,
}

/// A message fetched synchronously via [`FakeChannel::basic_get`].
#[derive(Debug, Clone, PartialEq)]
pub struct BasicGetResult {
    pub delivery_tag: u64,
    pub redelivered: bool,
    pub exchange: String,
    pub routing_key: String,
    /// Messages left on the queue at the moment of the fetch.
    pub message_count: u32,
    pub properties: BasicProperties,
    pub body: Vec<u8>,
}

/// Prefetch settings recorded by [`FakeChannel::basic_qos`]. The fake stores
/// them for inspection but never throttles delivery.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QosSettings {
    pub prefetch_size: u32,
    pub prefetch_count: u16,
    pub global: bool,
}

struct ConsumerRegistration {
    queue: String,
    handler: Arc<dyn ConsumerHandler>,
}

/// A single channel against a shared in-memory broker.
pub struct FakeChannel {
    id: Uuid,
    channel_number: u16,
    server: Arc<RabbitServer>,
    last_delivery_tag: Arc<AtomicU64>,
    working_messages: Arc<DashMap<u64, RabbitMessage>>,
    consumers: DashMap<String, ConsumerRegistration>,
    declared_exchanges: Mutex<HashSet<String>>,
    declared_queues: Mutex<HashSet<String>>,
    qos: Mutex<QosSettings>,
    flow_active: AtomicBool,
    next_publish_seq_no: AtomicU64,
    open: AtomicBool,
    close_reason: Mutex<Option<CloseReason>>,
}

impl FakeChannel {
    /// Opens a standalone channel against the given broker.
    pub fn open(server: Arc<RabbitServer>) -> FakeChannel {
        FakeChannel::with_number(server, 1)
    }

    pub(crate) fn with_number(server: Arc<RabbitServer>, channel_number: u16) -> FakeChannel {
        FakeChannel {
            id: Uuid::new_v4(),
            channel_number,
            server,
            last_delivery_tag: Arc::new(AtomicU64::new(0)),
            working_messages: Arc::new(DashMap::default()),
            consumers: DashMap::default(),
            declared_exchanges: Mutex::default(),
            declared_queues: Mutex::default(),
            qos: Mutex::default(),
            flow_active: AtomicBool::new(true),
            next_publish_seq_no: AtomicU64::new(0),
            open: AtomicBool::new(true),
            close_reason: Mutex::new(None),
        }
    }

    /// Returns the stable identity of this channel, the key used for
    /// exclusive-queue ownership checks.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Returns the channel number assigned by the owning connection.
    pub fn channel_number(&self) -> u16 {
        self.channel_number
    }

    /// Returns the broker this channel operates against.
    pub fn server(&self) -> Arc<RabbitServer> {
        Arc::clone(&self.server)
    }

    // ---- entity store operations ----

    /// Declares an exchange. Redeclaring an existing name is a no-op that
    /// keeps the first declaration's attributes.
    pub fn exchange_declare(
        &self,
        exchange: &str,
        kind: ExchangeKind,
        options: ExchangeDeclareOptions,
        arguments: FieldTable,
    ) -> Result<(), AmqpError> {
        let kind = if options.passive { None } else { Some(kind) };
        self.declare_exchange(exchange, kind, options.durable, options.auto_delete, arguments);
        Ok(())
    }

    /// Declares an exchange passively. Unlike a real broker this never fails
    /// on a missing exchange; it creates one with an unset kind.
    pub fn exchange_declare_passive(&self, exchange: &str) -> Result<(), AmqpError> {
        self.declare_exchange(exchange, None, false, false, FieldTable::default());
        Ok(())
    }

    fn declare_exchange(
        &self,
        name: &str,
        kind: Option<ExchangeKind>,
        durable: bool,
        auto_delete: bool,
        arguments: FieldTable,
    ) {
        debug!(exchange = name, "declaring exchange");
        self.server
            .exchanges
            .entry(name.to_owned())
            .or_insert_with(|| Arc::new(Exchange::new(name, kind, durable, auto_delete, arguments)));
        self.lock_declared_exchanges().insert(name.to_owned());
    }

    /// Deletes an exchange. Silent no-op when absent; the `if_unused` flag is
    /// recorded in the options but not enforced.
    pub fn exchange_delete(&self, exchange: &str, _options: ExchangeDeleteOptions) {
        self.server.exchanges.remove(exchange);
    }

    /// Declares a queue, generating a name when `queue` is empty.
    ///
    /// Redeclaring an existing name is idempotent and returns the stored
    /// queue's state (first declaration wins). Declaring a queue that another
    /// channel holds exclusively fails with [`AmqpError::ResourceLocked`].
    pub fn queue_declare(
        &self,
        queue: &str,
        options: QueueDeclareOptions,
        arguments: FieldTable,
    ) -> Result<DeclareOk, AmqpError> {
        let name = if queue.is_empty() {
            Uuid::new_v4().to_string()
        } else {
            queue.to_owned()
        };
        debug!(queue = name.as_str(), "declaring queue");

        let queue = match self.server.queues.entry(name.clone()) {
            dashmap::mapref::entry::Entry::Occupied(entry) => {
                let existing = Arc::clone(entry.get());
                if existing.is_exclusive() && existing.owner() != Some(self.id) {
                    error!(
                        queue = name.as_str(),
                        "exclusive queue is owned by another channel"
                    );
                    return Err(AmqpError::ResourceLocked(name));
                }
                existing
            }
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                let queue = Arc::new(Queue::new(
                    &name,
                    options.durable,
                    options.exclusive,
                    options.auto_delete,
                    arguments,
                    Some(self.id),
                ));
                entry.insert(Arc::clone(&queue));
                queue
            }
        };

        self.lock_declared_queues().insert(name.clone());

        Ok(DeclareOk {
            queue: name,
            message_count: queue.message_count(),
            consumer_count: 0,
        })
    }

    /// Declares a queue passively. Unlike a real broker this never fails on a
    /// missing queue; it creates one with default attributes.
    pub fn queue_declare_passive(&self, queue: &str) -> Result<DeclareOk, AmqpError> {
        self.queue_declare(queue, QueueDeclareOptions::default(), FieldTable::default())
    }

    /// Deletes a queue, returning 1 when a queue was removed and 0 when the
    /// name was absent. The `if_unused`/`if_empty` flags are not enforced.
    pub fn queue_delete(&self, queue: &str, _options: QueueDeleteOptions) -> u32 {
        match self.server.queues.remove(queue) {
            Some(_) => 1,
            None => 0,
        }
    }

    /// Empties the named queue's pending messages, returning the number
    /// removed (0 when the queue is absent). In-flight working entries
    /// checked out before the purge are unaffected.
    pub fn queue_purge(&self, queue: &str) -> u32 {
        match self.server.queue(queue) {
            Some(queue) => queue.purge(),
            None => 0,
        }
    }

    /// Binds a queue to an exchange under a routing key.
    ///
    /// The binding is inserted into both the exchange's and the queue's
    /// binding maps; a side whose entity does not exist is skipped silently.
    /// Rebinding an identical (exchange, routing key, queue) triple replaces
    /// the previous binding without duplication.
    pub fn queue_bind(
        &self,
        queue: &str,
        exchange: &str,
        routing_key: &str,
        _arguments: FieldTable,
    ) -> Result<(), AmqpError> {
        debug!(
            queue = queue,
            exchange = exchange,
            routing_key = routing_key,
            "binding queue to exchange"
        );
        let binding = ExchangeQueueBinding::new(exchange, routing_key, queue);
        if let Some(exchange) = self.server.exchange(exchange) {
            exchange.bind(binding.clone());
        }
        if let Some(queue) = self.server.queue(queue) {
            queue.bind(binding);
        }
        Ok(())
    }

    /// Removes a binding from both the exchange's and the queue's binding
    /// maps. Silent no-op for absent entities or an unknown triple.
    pub fn queue_unbind(
        &self,
        queue: &str,
        exchange: &str,
        routing_key: &str,
        _arguments: FieldTable,
    ) {
        let key = ExchangeQueueBinding::new(exchange, routing_key, queue).key();
        if let Some(exchange) = self.server.exchange(exchange) {
            exchange.unbind(&key);
        }
        if let Some(queue) = self.server.queue(queue) {
            queue.unbind(&key);
        }
    }

    /// Exchange-to-exchange bindings are not modeled.
    pub fn exchange_bind(
        &self,
        _destination: &str,
        _source: &str,
        _routing_key: &str,
        _arguments: FieldTable,
    ) -> Result<(), AmqpError> {
        Err(AmqpError::Unsupported("exchange.bind"))
    }

    /// Exchange-to-exchange bindings are not modeled.
    pub fn exchange_unbind(
        &self,
        _destination: &str,
        _source: &str,
        _routing_key: &str,
        _arguments: FieldTable,
    ) -> Result<(), AmqpError> {
        Err(AmqpError::Unsupported("exchange.unbind"))
    }

    // ---- publish path ----

    /// Publishes a message.
    ///
    /// An undeclared exchange is created on the fly (direct, non-durable);
    /// the message lands on every queue bound to the exchange regardless of
    /// routing-key patterns. The mandatory/immediate flags are recorded on
    /// the message, never enforced.
    pub fn basic_publish(
        &self,
        exchange: &str,
        routing_key: &str,
        options: BasicPublishOptions,
        properties: BasicProperties,
        body: &[u8],
    ) -> Result<(), AmqpError> {
        debug!(exchange = exchange, routing_key = routing_key, "publishing message");
        self.server.publish(RabbitMessage {
            exchange: exchange.to_owned(),
            routing_key: routing_key.to_owned(),
            mandatory: options.mandatory,
            immediate: options.immediate,
            properties,
            body: body.to_vec(),
            queue: None,
        });
        self.next_publish_seq_no.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    /// Returns the number of messages published on this channel.
    pub fn next_publish_seq_no(&self) -> u64 {
        self.next_publish_seq_no.load(Ordering::SeqCst)
    }

    // ---- delivery tracking ----

    /// Registers a consumer on a queue, returning the consumer tag (a
    /// generated uuid when `consumer_tag` is empty).
    ///
    /// Every currently pending message is delivered immediately and a
    /// listener is installed so future enqueues are delivered as they
    /// happen. Each delivery draws a fresh delivery tag and lands in the
    /// working set; deliveries never remove messages from the queue, the
    /// head is dequeued at ack time. When the queue does not exist the
    /// registration is accepted but inert.
    ///
    /// The `no_ack` consume flag is accepted but not honored: deliveries are
    /// always tracked for acknowledgment.
    pub fn basic_consume(
        &self,
        queue: &str,
        consumer_tag: &str,
        _options: BasicConsumeOptions,
        handler: Arc<dyn ConsumerHandler>,
    ) -> Result<String, AmqpError> {
        let consumer_tag = if consumer_tag.is_empty() {
            Uuid::new_v4().to_string()
        } else {
            consumer_tag.to_owned()
        };

        let Some(queue) = self.server.queue(queue) else {
            debug!(
                consumer_tag = consumer_tag.as_str(),
                "consume on unknown queue, registration is inert"
            );
            return Ok(consumer_tag);
        };

        self.consumers.insert(
            consumer_tag.clone(),
            ConsumerRegistration {
                queue: queue.name().to_owned(),
                handler: Arc::clone(&handler),
            },
        );

        for message in queue.messages() {
            deliver(
                &self.last_delivery_tag,
                &self.working_messages,
                &consumer_tag,
                handler.as_ref(),
                &message,
            );
        }

        let counter = Arc::clone(&self.last_delivery_tag);
        let working = Arc::clone(&self.working_messages);
        let tag = consumer_tag.clone();
        queue.subscribe(
            &consumer_tag,
            Arc::new(move |message| {
                deliver(&counter, &working, &tag, handler.as_ref(), message);
            }),
        );

        Ok(consumer_tag)
    }

    /// Cancels a consumer registration and confirms via `handle_cancel_ok`.
    /// Working entries already delivered to the consumer are unaffected.
    pub fn basic_cancel(&self, consumer_tag: &str) {
        if let Some((tag, registration)) = self.consumers.remove(consumer_tag) {
            if let Some(queue) = self.server.queue(&registration.queue) {
                queue.unsubscribe(&tag);
            }
            registration.handler.handle_cancel_ok(&tag);
        }
    }

    /// Fetches a single message synchronously.
    ///
    /// Returns `None` when the queue is absent or empty. With `no_ack` set
    /// the head is removed immediately and nothing is tracked; otherwise the
    /// head stays on the queue and a working entry is recorded for a later
    /// ack. The result reports the queue's remaining message count at the
    /// moment of the fetch.
    pub fn basic_get(&self, queue: &str, options: BasicGetOptions) -> Option<BasicGetResult> {
        let queue = self.server.queue(queue)?;
        let message = if options.no_ack {
            queue.dequeue()?
        } else {
            queue.peek()?
        };

        let delivery_tag = self.next_delivery_tag();
        if !options.no_ack {
            self.working_messages.insert(delivery_tag, message.clone());
        }

        Some(BasicGetResult {
            delivery_tag,
            redelivered: false,
            exchange: message.exchange.clone(),
            routing_key: message.routing_key.clone(),
            message_count: queue.message_count(),
            properties: message.properties.clone(),
            body: message.body,
        })
    }

    // ---- acknowledgment state machine ----

    /// Acknowledges the working entry for `delivery_tag`, dequeuing the head
    /// of the owning queue. Unknown tags are a no-op. With `multiple` set the
    /// ack repeats for `delivery_tag`, `delivery_tag - 1`, … acknowledging
    /// the whole contiguous prefix until a tag has no working entry.
    pub fn basic_ack(&self, delivery_tag: u64, multiple: bool) {
        if multiple {
            let mut tag = delivery_tag;
            while self.ack_single(tag) {
                match tag.checked_sub(1) {
                    Some(previous) if previous > 0 => tag = previous,
                    _ => break,
                }
            }
        } else {
            self.ack_single(delivery_tag);
        }
    }

    fn ack_single(&self, delivery_tag: u64) -> bool {
        let Some((_, message)) = self.working_messages.remove(&delivery_tag) else {
            return false;
        };
        match message.queue.as_deref().and_then(|name| self.server.queue(name)) {
            Some(queue) => queue.dequeue().is_some(),
            None => true,
        }
    }

    /// Rejects a single delivery; identical to `basic_nack` with
    /// `multiple = false`.
    pub fn basic_reject(&self, delivery_tag: u64, requeue: bool) {
        self.basic_nack(delivery_tag, false, requeue);
    }

    /// Negatively acknowledges a delivery. The `multiple` flag is accepted
    /// but not acted on.
    ///
    /// With `requeue` set this is a full-channel recovery rather than a
    /// targeted retry: every queue referenced by the working set is reset and
    /// every in-flight message is re-enqueued (active consumers see
    /// redeliveries under fresh tags).
    ///
    /// Without `requeue` the entry for `delivery_tag` is removed and either
    /// republished through the queue's dead-letter exchange (when configured
    /// and existing) or dropped. Dropping also re-enqueues every *other*
    /// in-flight message; non-standard broker behavior preserved for
    /// compatibility with the modeled implementation.
    pub fn basic_nack(&self, delivery_tag: u64, _multiple: bool, requeue: bool) {
        if requeue {
            self.reset_working_queues();
            for (_, message) in self.drain_working_set() {
                self.republish_to_queue(message);
            }
            return;
        }

        self.reset_working_queues();

        let Some((_, message)) = self.working_messages.remove(&delivery_tag) else {
            return;
        };

        let dead_letter = message
            .queue
            .as_deref()
            .and_then(|name| self.server.queue(name))
            .and_then(|queue| queue.dead_letter_exchange());
        if let Some(exchange) = dead_letter {
            if self.server.route_through(&exchange, message.clone()) {
                debug!(
                    delivery_tag = delivery_tag,
                    exchange = exchange.as_str(),
                    "message dead-lettered"
                );
                return;
            }
        }

        let remaining: Vec<RabbitMessage> = self
            .working_messages
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        for message in remaining {
            self.republish_to_queue(message);
        }
    }

    /// Redelivers unacknowledged messages.
    ///
    /// With `requeue` set every working-set message is republished to its
    /// originating queue; the working set is cleared afterwards in both
    /// cases, including entries created by redeliveries during the call
    /// (observed behavior of the modeled implementation).
    pub fn basic_recover(&self, requeue: bool) {
        if requeue {
            for (_, message) in self.working_snapshot() {
                self.republish_to_queue(message);
            }
        }
        self.working_messages.clear();
    }

    fn reset_working_queues(&self) {
        let queues: HashSet<String> = self
            .working_messages
            .iter()
            .filter_map(|entry| entry.value().queue.clone())
            .collect();
        for name in queues {
            if let Some(queue) = self.server.queue(&name) {
                queue.purge();
            }
        }
    }

    fn working_snapshot(&self) -> Vec<(u64, RabbitMessage)> {
        let mut entries: Vec<(u64, RabbitMessage)> = self
            .working_messages
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();
        entries.sort_by_key(|(tag, _)| *tag);
        entries
    }

    fn drain_working_set(&self) -> Vec<(u64, RabbitMessage)> {
        let entries = self.working_snapshot();
        self.working_messages.clear();
        entries
    }

    fn republish_to_queue(&self, message: RabbitMessage) {
        if let Some(queue) = message.queue.as_deref().and_then(|name| self.server.queue(name)) {
            queue.publish(message);
        }
    }

    fn next_delivery_tag(&self) -> u64 {
        self.last_delivery_tag.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Returns the working set as (delivery tag, message) pairs in tag order.
    pub fn working_messages(&self) -> Vec<(u64, RabbitMessage)> {
        self.working_snapshot()
    }

    /// Returns the number of delivered-but-unacknowledged messages.
    pub fn working_count(&self) -> usize {
        self.working_messages.len()
    }

    // ---- channel state ----

    /// Records prefetch settings. The fake never throttles delivery.
    pub fn basic_qos(&self, prefetch_size: u32, prefetch_count: u16, global: bool) {
        *self.lock_qos() = QosSettings {
            prefetch_size,
            prefetch_count,
            global,
        };
    }

    /// Returns the last recorded prefetch settings.
    pub fn qos(&self) -> QosSettings {
        *self.lock_qos()
    }

    /// Records the channel-flow active flag.
    pub fn channel_flow(&self, active: bool) {
        self.flow_active.store(active, Ordering::SeqCst);
    }

    /// Returns the channel-flow active flag.
    pub fn is_flow_active(&self) -> bool {
        self.flow_active.load(Ordering::SeqCst)
    }

    /// Returns true while the channel has not been closed.
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    /// Returns true once the channel has been closed or aborted.
    pub fn is_closed(&self) -> bool {
        !self.is_open()
    }

    /// Returns the recorded close reason, if the channel was closed.
    pub fn close_reason(&self) -> Option<CloseReason> {
        self.lock_close_reason().clone()
    }

    /// Closes the channel with the default reply.
    pub fn close(&self) {
        self.close_with(u16::MAX, "");
    }

    /// Aborts the channel; same effect as [`FakeChannel::close`].
    pub fn abort(&self) {
        self.close_with(u16::MAX, "");
    }

    /// Closes the channel: records the close reason, detaches every consumer
    /// listener, then removes auto-delete queues declared by this channel and
    /// auto-delete exchanges declared by this channel that have no bindings
    /// remaining.
    pub fn close_with(&self, reply_code: u16, reply_text: &str) {
        debug!(channel = self.channel_number, "closing channel");
        self.open.store(false, Ordering::SeqCst);
        *self.lock_close_reason() = Some(CloseReason {
            reply_code,
            reply_text: reply_text.to_owned(),
            initiator: ShutdownInitiator::Library,
        });

        let registrations: Vec<(String, String)> = self
            .consumers
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().queue.clone()))
            .collect();
        self.consumers.clear();
        for (tag, queue_name) in registrations {
            if let Some(queue) = self.server.queue(&queue_name) {
                queue.unsubscribe(&tag);
            }
        }

        let declared_queues: Vec<String> = self.lock_declared_queues().drain().collect();
        for name in declared_queues {
            let auto_delete = self
                .server
                .queue(&name)
                .map(|queue| queue.is_auto_delete())
                .unwrap_or(false);
            if auto_delete {
                debug!(queue = name.as_str(), "removing auto-delete queue");
                self.server.queues.remove(&name);
            }
        }

        let declared_exchanges: Vec<String> = self.lock_declared_exchanges().drain().collect();
        for name in declared_exchanges {
            let removable = self
                .server
                .exchange(&name)
                .map(|exchange| exchange.is_auto_delete() && exchange.binding_count() == 0)
                .unwrap_or(false);
            if removable {
                debug!(exchange = name.as_str(), "removing auto-delete exchange");
                self.server.exchanges.remove(&name);
            }
        }
    }

    // ---- capabilities the simulation does not model ----

    /// Publisher confirms are not modeled.
    pub fn confirm_select(&self) -> Result<(), AmqpError> {
        Err(AmqpError::Unsupported("confirm.select"))
    }

    /// Publisher confirms are not modeled.
    pub fn wait_for_confirms(&self) -> Result<bool, AmqpError> {
        Err(AmqpError::Unsupported("confirm.wait"))
    }

    /// Transactions are not modeled.
    pub fn tx_select(&self) -> Result<(), AmqpError> {
        Err(AmqpError::Unsupported("tx.select"))
    }

    /// Transactions are not modeled.
    pub fn tx_commit(&self) -> Result<(), AmqpError> {
        Err(AmqpError::Unsupported("tx.commit"))
    }

    /// Transactions are not modeled.
    pub fn tx_rollback(&self) -> Result<(), AmqpError> {
        Err(AmqpError::Unsupported("tx.rollback"))
    }

    /// Distributed transactions are not modeled.
    pub fn dtx_select(&self) -> Result<(), AmqpError> {
        Err(AmqpError::Unsupported("dtx.select"))
    }

    /// Distributed transactions are not modeled.
    pub fn dtx_start(&self, _dtx_identifier: &str) -> Result<(), AmqpError> {
        Err(AmqpError::Unsupported("dtx.start"))
    }

    /// Batch publishing is not modeled.
    pub fn basic_publish_batch(&self, _messages: Vec<RabbitMessage>) -> Result<(), AmqpError> {
        Err(AmqpError::Unsupported("basic.publish-batch"))
    }

    /// Server-side message counting is not modeled; inspect the queue via
    /// [`RabbitServer::messages_on_queue`] instead.
    pub fn message_count(&self, _queue: &str) -> Result<u32, AmqpError> {
        Err(AmqpError::Unsupported("queue.message-count"))
    }

    /// Server-side consumer counting is not modeled.
    pub fn consumer_count(&self, _queue: &str) -> Result<u32, AmqpError> {
        Err(AmqpError::Unsupported("queue.consumer-count"))
    }

    fn lock_declared_exchanges(&self) -> MutexGuard<'_, HashSet<String>> {
        self.declared_exchanges
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_declared_queues(&self) -> MutexGuard<'_, HashSet<String>> {
        self.declared_queues
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_qos(&self) -> MutexGuard<'_, QosSettings> {
        self.qos.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_close_reason(&self) -> MutexGuard<'_, Option<CloseReason>> {
        self.close_reason
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

fn deliver(
    counter: &AtomicU64,
    working: &DashMap<u64, RabbitMessage>,
    consumer_tag: &str,
    handler: &dyn ConsumerHandler,
    message: &RabbitMessage,
) {
    let delivery_tag = counter.fetch_add(1, Ordering::SeqCst) + 1;
    working.insert(delivery_tag, message.clone());
    handler.handle_delivery(Delivery {
        consumer_tag: consumer_tag.to_owned(),
        delivery_tag,
        redelivered: false,
        exchange: message.exchange.clone(),
        routing_key: message.routing_key.clone(),
        properties: message.properties.clone(),
        body: message.body.clone(),
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consumer::MockConsumerHandler;

    fn channel_with_queue(queue: &str) -> (Arc<RabbitServer>, FakeChannel) {
        let server = Arc::new(RabbitServer::new());
        let channel = FakeChannel::open(Arc::clone(&server));
        channel
            .queue_declare(queue, QueueDeclareOptions::default(), FieldTable::default())
            .unwrap();
        (server, channel)
    }

    #[test]
    fn consume_drains_pending_messages_through_the_handler() {
        let (server, channel) = channel_with_queue("jobs");
        server
            .queue("jobs")
            .unwrap()
            .publish(RabbitMessage::new("work", "jobs", b"payload"));

        let mut handler = MockConsumerHandler::new();
        handler
            .expect_handle_delivery()
            .withf(|delivery: &Delivery| {
                delivery.body == b"payload" && delivery.delivery_tag == 1 && !delivery.redelivered
            })
            .times(1)
            .return_const(());

        let tag = channel
            .basic_consume(
                "jobs",
                "ctag-1",
                BasicConsumeOptions::default(),
                Arc::new(handler),
            )
            .unwrap();

        assert_eq!(tag, "ctag-1");
        assert_eq!(channel.working_count(), 1);
    }

    #[test]
    fn cancel_confirms_through_the_handler_and_stops_deliveries() {
        let (server, channel) = channel_with_queue("jobs");

        let mut handler = MockConsumerHandler::new();
        handler.expect_handle_delivery().times(0);
        handler
            .expect_handle_cancel_ok()
            .withf(|tag: &str| tag == "ctag-1")
            .times(1)
            .return_const(());

        channel
            .basic_consume(
                "jobs",
                "ctag-1",
                BasicConsumeOptions::default(),
                Arc::new(handler),
            )
            .unwrap();
        channel.basic_cancel("ctag-1");

        server
            .queue("jobs")
            .unwrap()
            .publish(RabbitMessage::new("work", "jobs", b"late"));
        assert_eq!(channel.working_count(), 0);
    }

    #[test]
    fn delivery_tags_increase_across_queues_and_operations() {
        let (server, channel) = channel_with_queue("a");
        channel
            .queue_declare("b", QueueDeclareOptions::default(), FieldTable::default())
            .unwrap();
        server
            .queue("a")
            .unwrap()
            .publish(RabbitMessage::new("", "a", b"1"));
        server
            .queue("b")
            .unwrap()
            .publish(RabbitMessage::new("", "b", b"2"));

        let first = channel.basic_get("a", BasicGetOptions::default()).unwrap();
        let second = channel.basic_get("b", BasicGetOptions::default()).unwrap();

        assert_eq!(first.delivery_tag, 1);
        assert_eq!(second.delivery_tag, 2);
    }

    #[test]
    fn consume_on_unknown_queue_is_inert_but_returns_a_tag() {
        let server = Arc::new(RabbitServer::new());
        let channel = FakeChannel::open(server);

        let handler = MockConsumerHandler::new();
        let tag = channel
            .basic_consume(
                "missing",
                "",
                BasicConsumeOptions::default(),
                Arc::new(handler),
            )
            .unwrap();

        assert!(!tag.is_empty());
        assert_eq!(channel.working_count(), 0);
    }
}
