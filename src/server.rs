// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Broker Entity Store and Routing Engine
//!
//! `RabbitServer` is the ground truth the rest of the fake mutates: the set of
//! declared exchanges and queues, each behind its own concurrent map entry so
//! that operations on different entities never contend. A server instance is
//! explicitly constructed and shared between every channel that should observe
//! the same broker state; there is no ambient global.
//!
//! The publish path implements the routing engine: an absent exchange is
//! created on the fly (permissive broker behavior, convenient for tests, not
//! strict AMQP), the message is recorded in the exchange history, and a copy
//! is enqueued into every bound queue. Matching is binding-identity based:
//! a queue receives the message if and only if a binding exists, regardless
//! of exchange kind or topic wildcard syntax in the routing key.

use crate::{
    exchange::{Exchange, ExchangeKind},
    message::RabbitMessage,
    queue::Queue,
};
use dashmap::DashMap;
use lapin::types::FieldTable;
use std::sync::Arc;
use tracing::debug;

/// The in-memory broker state shared by every channel of a simulation.
#[derive(Default)]
pub struct RabbitServer {
    pub(crate) exchanges: DashMap<String, Arc<Exchange>>,
    pub(crate) queues: DashMap<String, Arc<Queue>>,
}

impl RabbitServer {
    /// Creates an empty broker.
    pub fn new() -> RabbitServer {
        RabbitServer::default()
    }

    /// Removes every exchange and queue, returning the broker to its initial
    /// state.
    pub fn reset(&self) {
        self.exchanges.clear();
        self.queues.clear();
    }

    /// Looks up an exchange by name.
    pub fn exchange(&self, name: &str) -> Option<Arc<Exchange>> {
        self.exchanges.get(name).map(|e| Arc::clone(e.value()))
    }

    /// Looks up a queue by name. Queue and exchange names are independent
    /// namespaces; the two may share a name without conflict.
    pub fn queue(&self, name: &str) -> Option<Arc<Queue>> {
        self.queues.get(name).map(|q| Arc::clone(q.value()))
    }

    /// Returns the number of declared exchanges.
    pub fn exchange_count(&self) -> usize {
        self.exchanges.len()
    }

    /// Returns the number of declared queues.
    pub fn queue_count(&self) -> usize {
        self.queues.len()
    }

    /// Returns the full publish history of the named exchange, empty when the
    /// exchange does not exist.
    pub fn messages_published_to_exchange(&self, exchange: &str) -> Vec<RabbitMessage> {
        self.exchange(exchange)
            .map(|e| e.message_history())
            .unwrap_or_default()
    }

    /// Returns the pending messages of the named queue, empty when the queue
    /// does not exist.
    pub fn messages_on_queue(&self, queue: &str) -> Vec<RabbitMessage> {
        self.queue(queue).map(|q| q.messages()).unwrap_or_default()
    }

    /// Routes a published message, creating the destination exchange on the
    /// fly when it has not been declared.
    pub(crate) fn publish(&self, message: RabbitMessage) {
        let exchange = {
            let entry = self
                .exchanges
                .entry(message.exchange.clone())
                .or_insert_with(|| {
                    debug!(
                        exchange = message.exchange.as_str(),
                        "publish to undeclared exchange, creating it"
                    );
                    Arc::new(Exchange::new(
                        &message.exchange,
                        Some(ExchangeKind::Direct),
                        false,
                        false,
                        FieldTable::default(),
                    ))
                });
            Arc::clone(entry.value())
        };

        self.route(&exchange, message);
    }

    /// Routes a message through an already-declared exchange. Returns false
    /// without touching anything when the exchange does not exist (the
    /// dead-letter path never auto-creates).
    pub(crate) fn route_through(&self, exchange: &str, message: RabbitMessage) -> bool {
        match self.exchange(exchange) {
            Some(exchange) => {
                self.route(&exchange, message);
                true
            }
            None => false,
        }
    }

    fn route(&self, exchange: &Arc<Exchange>, message: RabbitMessage) {
        exchange.record_message(message.clone());

        for binding in exchange.bindings() {
            if let Some(queue) = self.queue(&binding.queue) {
                debug!(
                    exchange = exchange.name(),
                    queue = binding.queue.as_str(),
                    routing_key = binding.routing_key.as_str(),
                    "routing message to bound queue"
                );
                queue.publish(message.clone());
            }
        }
    }
}
