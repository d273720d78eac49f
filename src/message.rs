// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Message Record
//!
//! The unit of work the broker fake routes, queues, and tracks. A message is
//! created at publish time and mutated exactly once afterwards: the destination
//! queue name is stamped onto it when it is enqueued, so that later
//! acknowledgments can find their way back to the owning queue.

use lapin::BasicProperties;

/// A message published through the fake broker.
///
/// The body is raw bytes; `properties` is the opaque metadata bag carried
/// alongside it. `queue` is `None` until the routing engine enqueues the
/// message into a destination queue.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RabbitMessage {
    /// Name of the exchange the message was published to.
    pub exchange: String,
    /// Routing key supplied at publish time.
    pub routing_key: String,
    /// The publish-time mandatory flag. Recorded, never acted on.
    pub mandatory: bool,
    /// The publish-time immediate flag. Recorded, never acted on.
    pub immediate: bool,
    /// Protocol properties attached to the message.
    pub properties: BasicProperties,
    /// Raw message payload.
    pub body: Vec<u8>,
    /// Name of the queue currently holding the message, stamped on enqueue.
    pub queue: Option<String>,
}

impl RabbitMessage {
    /// Creates a message addressed to the given exchange and routing key.
    ///
    /// # Parameters
    /// * `exchange` - Destination exchange name
    /// * `routing_key` - Routing key for the publish
    /// * `body` - Raw payload bytes
    ///
    /// # Returns
    /// A message with default properties, ready to be published
    pub fn new(exchange: &str, routing_key: &str, body: &[u8]) -> RabbitMessage {
        RabbitMessage {
            exchange: exchange.to_owned(),
            routing_key: routing_key.to_owned(),
            mandatory: false,
            immediate: false,
            properties: BasicProperties::default(),
            body: body.to_vec(),
            queue: None,
        }
    }
}
