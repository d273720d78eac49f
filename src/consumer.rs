// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Consumer Contract
//!
//! This module defines the callback seam between the broker fake and consumer
//! code. A consumer registered on a queue receives every pending and future
//! message through [`ConsumerHandler::handle_delivery`], invoked synchronously
//! on the publisher's call stack. Handlers may re-enter the channel (ack,
//! publish, cancel) from inside the callback.
//!
//! [`CollectingConsumer`] is a ready-made recording handler for tests that
//! only need to observe what was delivered.

use lapin::BasicProperties;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[cfg(test)]
use mockall::automock;

/// A single delivery handed to a consumer.
///
/// Carries the consumer tag the delivery was routed to, the channel-unique
/// delivery tag used to target later ack/nack/reject calls, and the message
/// content.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    /// Tag of the consumer registration that received the message.
    pub consumer_tag: String,
    /// Monotonically increasing per-channel identifier of this delivery.
    pub delivery_tag: u64,
    /// Whether the message was delivered before. Always false in the fake.
    pub redelivered: bool,
    /// Exchange the message was originally published to.
    pub exchange: String,
    /// Routing key supplied at publish time.
    pub routing_key: String,
    /// Protocol properties attached to the message.
    pub properties: BasicProperties,
    /// Raw message payload.
    pub body: Vec<u8>,
}

/// Receives deliveries and lifecycle notifications for one consumer
/// registration.
#[cfg_attr(test, automock)]
pub trait ConsumerHandler: Send + Sync {
    /// Called once per message delivered to this consumer.
    fn handle_delivery(&self, delivery: Delivery);

    /// Called after the registration has been cancelled via `basic_cancel`.
    fn handle_cancel_ok(&self, _consumer_tag: &str) {}
}

/// A [`ConsumerHandler`] that records everything it receives.
#[derive(Default)]
pub struct CollectingConsumer {
    deliveries: Mutex<Vec<Delivery>>,
    cancellations: Mutex<Vec<String>>,
}

impl CollectingConsumer {
    /// Creates a new recording consumer, ready to be registered.
    pub fn new() -> Arc<CollectingConsumer> {
        Arc::new(CollectingConsumer::default())
    }

    /// Returns every delivery received so far, in delivery order.
    pub fn received(&self) -> Vec<Delivery> {
        self.lock_deliveries().clone()
    }

    /// Returns the number of deliveries received so far.
    pub fn delivery_count(&self) -> usize {
        self.lock_deliveries().len()
    }

    /// Returns the consumer tags for which a cancel confirmation arrived.
    pub fn cancelled(&self) -> Vec<String> {
        self.cancellations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn lock_deliveries(&self) -> MutexGuard<'_, Vec<Delivery>> {
        self.deliveries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl ConsumerHandler for CollectingConsumer {
    fn handle_delivery(&self, delivery: Delivery) {
        self.lock_deliveries().push(delivery);
    }

    fn handle_cancel_ok(&self, consumer_tag: &str) {
        self.cancellations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(consumer_tag.to_owned());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn delivery(tag: u64, body: &[u8]) -> Delivery {
        Delivery {
            consumer_tag: "ctag".to_owned(),
            delivery_tag: tag,
            redelivered: false,
            exchange: "orders".to_owned(),
            routing_key: "new".to_owned(),
            properties: BasicProperties::default(),
            body: body.to_vec(),
        }
    }

    #[test]
    fn collecting_consumer_records_deliveries_in_order() {
        let consumer = CollectingConsumer::new();

        consumer.handle_delivery(delivery(1, b"first"));
        consumer.handle_delivery(delivery(2, b"second"));

        let received = consumer.received();
        assert_eq!(received.len(), 2);
        assert_eq!(received[0].body, b"first");
        assert_eq!(received[1].delivery_tag, 2);
    }

    #[test]
    fn collecting_consumer_records_cancellations() {
        let consumer = CollectingConsumer::new();

        consumer.handle_cancel_ok("ctag-9");

        assert_eq!(consumer.cancelled(), vec!["ctag-9".to_owned()]);
    }
}
