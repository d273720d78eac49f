// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Exchange/Queue Bindings
//!
//! A binding is the routing rule linking one exchange to one queue under a
//! routing key. Its identity is the composite of all three names, so at most
//! one binding exists per (exchange, routing key, queue) triple; redeclaring
//! the same triple replaces it without duplication.

/// Associates one exchange, one queue, and a routing key.
///
/// Entities are referenced by name rather than by handle: a binding stays
/// valid as a record even if one of its endpoints is later deleted, in which
/// case routing simply skips the missing side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeQueueBinding {
    /// Name of the source exchange.
    pub exchange: String,
    /// Routing key the binding was declared with.
    pub routing_key: String,
    /// Name of the destination queue.
    pub queue: String,
}

impl ExchangeQueueBinding {
    /// Creates a binding for the given (exchange, routing key, queue) triple.
    pub fn new(exchange: &str, routing_key: &str, queue: &str) -> ExchangeQueueBinding {
        ExchangeQueueBinding {
            exchange: exchange.to_owned(),
            routing_key: routing_key.to_owned(),
            queue: queue.to_owned(),
        }
    }

    /// Returns the identity key of the binding, unique within an exchange's
    /// and a queue's binding maps.
    pub fn key(&self) -> String {
        format!("{}|{}|{}", self.exchange, self.routing_key, self.queue)
    }
}
