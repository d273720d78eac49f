// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Exchange Entities
//!
//! This module provides the runtime representation of an exchange inside the
//! fake broker. An exchange owns its binding map and an append-only history of
//! every message ever published through it, kept for later inspection by
//! tests.
//!
//! Note on routing fidelity: a real broker pattern-matches routing keys
//! against binding patterns for topic and headers exchanges. This simulation
//! routes purely by binding existence regardless of the exchange kind; the
//! kind is stored and reported but never consulted by the routing engine.

use crate::{binding::ExchangeQueueBinding, message::RabbitMessage};
use dashmap::DashMap;
use lapin::types::FieldTable;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Represents the types of exchanges available in RabbitMQ.
///
/// Each exchange type has specific routing behavior on a real broker:
/// - Direct: routes on an exact match of routing keys
/// - Fanout: broadcasts to all bound queues regardless of routing keys
/// - Topic: routes on wildcard pattern matching of routing keys
/// - Headers: routes on message header values instead of routing keys
///
/// The fake records the kind for observability only; see the module notes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ExchangeKind {
    #[default]
    Direct,
    Fanout,
    Topic,
    Headers,
}

impl ExchangeKind {
    /// Returns the protocol name of the exchange kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            ExchangeKind::Direct => "direct",
            ExchangeKind::Fanout => "fanout",
            ExchangeKind::Topic => "topic",
            ExchangeKind::Headers => "headers",
        }
    }
}

/// A declared exchange held by the entity store.
///
/// Attributes are fixed at first declaration; redeclaring an existing name is
/// a no-op that keeps the original instance (first declaration wins).
#[derive(Debug)]
pub struct Exchange {
    name: String,
    kind: Option<ExchangeKind>,
    durable: bool,
    auto_delete: bool,
    arguments: FieldTable,
    bindings: DashMap<String, ExchangeQueueBinding>,
    messages: Mutex<Vec<RabbitMessage>>,
}

impl Exchange {
    /// Creates a new exchange entity.
    ///
    /// # Parameters
    /// * `name` - Unique exchange name
    /// * `kind` - Exchange kind, `None` for a passive declaration
    /// * `durable` - Durability flag, recorded only
    /// * `auto_delete` - When set, the exchange is removed once its declaring
    ///   channel closes and no bindings remain
    /// * `arguments` - Opaque declaration arguments
    pub fn new(
        name: &str,
        kind: Option<ExchangeKind>,
        durable: bool,
        auto_delete: bool,
        arguments: FieldTable,
    ) -> Exchange {
        Exchange {
            name: name.to_owned(),
            kind,
            durable,
            auto_delete,
            arguments,
            bindings: DashMap::default(),
            messages: Mutex::default(),
        }
    }

    /// Returns the exchange name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the declared kind, `None` when the exchange was declared
    /// passively or auto-created by a publish.
    pub fn kind(&self) -> Option<&ExchangeKind> {
        self.kind.as_ref()
    }

    /// Returns the durability flag.
    pub fn is_durable(&self) -> bool {
        self.durable
    }

    /// Returns the auto-delete flag.
    pub fn is_auto_delete(&self) -> bool {
        self.auto_delete
    }

    /// Returns the declaration arguments.
    pub fn arguments(&self) -> &FieldTable {
        &self.arguments
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

    /// Returns the number of bindings currently attached to the exchange.
    pub fn binding_count(&self) -> usize {
        self.bindings.len()
    }

    /// Appends a message to the publish history.
    pub(crate) fn record_message(&self, message: RabbitMessage) {
        self.lock_messages().push(message);
    }

    /// Returns a snapshot of every message ever published through this
    /// exchange, in publish order.
    pub fn message_history(&self) -> Vec<RabbitMessage> {
        self.lock_messages().clone()
    }

    fn lock_messages(&self) -> MutexGuard<'_, Vec<RabbitMessage>> {
        self.messages.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rebinding_the_same_triple_does_not_duplicate() {
        let exchange = Exchange::new(
            "orders",
            Some(ExchangeKind::Direct),
            false,
            false,
            FieldTable::default(),
        );

        exchange.bind(ExchangeQueueBinding::new("orders", "new", "orders-q"));
        exchange.bind(ExchangeQueueBinding::new("orders", "new", "orders-q"));

        assert_eq!(exchange.binding_count(), 1);
    }

    #[test]
    fn unbind_removes_only_the_named_triple() {
        let exchange = Exchange::new(
            "orders",
            Some(ExchangeKind::Direct),
            false,
            false,
            FieldTable::default(),
        );

        let keep = ExchangeQueueBinding::new("orders", "new", "orders-q");
        let drop = ExchangeQueueBinding::new("orders", "cancelled", "audit-q");
        exchange.bind(keep.clone());
        exchange.bind(drop.clone());

        exchange.unbind(&drop.key());

        assert_eq!(exchange.bindings(), vec![keep]);
    }

    #[test]
    fn message_history_is_append_only_and_ordered() {
        let exchange = Exchange::new(
            "orders",
            Some(ExchangeKind::Fanout),
            false,
            false,
            FieldTable::default(),
        );

        exchange.record_message(RabbitMessage::new("orders", "a", b"first"));
        exchange.record_message(RabbitMessage::new("orders", "b", b"second"));

        let history = exchange.message_history();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].body, b"first");
        assert_eq!(history[1].body, b"second");
    }

    #[test]
    fn kind_reports_protocol_names() {
        assert_eq!(ExchangeKind::Direct.as_str(), "direct");
        assert_eq!(ExchangeKind::Topic.as_str(), "topic");
    }
}
