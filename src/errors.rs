// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Error Types for the Broker Fake
//!
//! This module provides the error taxonomy of the in-memory broker. Almost every
//! operation degrades gracefully instead of failing: publishing to an undeclared
//! exchange creates it, operations against absent queues return empty results,
//! and deletes of absent entities are silent no-ops. The only conditions that
//! surface as errors are the exclusive-queue ownership violation, capabilities
//! the fake deliberately does not model, and channel creation on a closed
//! connection.

use thiserror::Error;

/// AMQP reply code reported for an exclusive-queue ownership violation.
pub const REPLY_RESOURCE_LOCKED: u16 = 405;
/// AMQP reply code reported for capabilities the fake does not implement.
pub const REPLY_NOT_IMPLEMENTED: u16 = 540;
/// AMQP reply code reported for channel-level failures.
pub const REPLY_CHANNEL_ERROR: u16 = 504;

/// Identifies which side of the simulated conversation raised a failure,
/// mirroring the shutdown-initiator field of a real broker's channel close.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownInitiator {
    /// The client library (the fake itself) initiated the shutdown.
    Library,
    /// The simulated broker rejected the operation.
    Peer,
}

/// Represents errors that can occur against the in-memory broker.
///
/// All declare/bind/route/ack operations are expected to succeed; the variants
/// here are the only conditions that abort an operation outright.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum AmqpError {
    /// Declaring an exclusive queue that is exclusively owned by a different
    /// channel identity.
    #[error("RESOURCE_LOCKED - cannot obtain exclusive access to locked queue '{0}'")]
    ResourceLocked(String),

    /// A capability the simulation deliberately does not model. These fail
    /// loudly and unconditionally so that a caller relying on them finds out
    /// immediately instead of silently no-opping.
    #[error("NOT_IMPLEMENTED - `{0}` is not supported by the in-memory broker")]
    Unsupported(&'static str),

    /// Failure to create a channel, raised when the owning connection has
    /// already been closed.
    #[error("failure to create a channel")]
    ChannelError,
}

impl AmqpError {
    /// Returns the AMQP reply code associated with this error.
    pub fn reply_code(&self) -> u16 {
        match self {
            AmqpError::ResourceLocked(_) => REPLY_RESOURCE_LOCKED,
            AmqpError::Unsupported(_) => REPLY_NOT_IMPLEMENTED,
            AmqpError::ChannelError => REPLY_CHANNEL_ERROR,
        }
    }

    /// Returns which side of the conversation rejected the operation.
    ///
    /// Resource-locked failures come from the simulated broker (peer); the
    /// rest originate in the library surface itself.
    pub fn initiator(&self) -> ShutdownInitiator {
        match self {
            AmqpError::ResourceLocked(_) => ShutdownInitiator::Peer,
            _ => ShutdownInitiator::Library,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resource_locked_carries_broker_reply_contract() {
        let err = AmqpError::ResourceLocked("jobs".to_owned());

        assert_eq!(err.reply_code(), 405);
        assert_eq!(err.initiator(), ShutdownInitiator::Peer);
        assert!(err
            .to_string()
            .starts_with("RESOURCE_LOCKED - cannot obtain exclusive access to locked queue 'jobs'"));
    }

    #[test]
    fn unsupported_operations_report_not_implemented() {
        let err = AmqpError::Unsupported("confirm.select");

        assert_eq!(err.reply_code(), 540);
        assert_eq!(err.initiator(), ShutdownInitiator::Library);
    }
}
