// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Connection and Factory
//!
//! `FakeConnection` groups channels against one shared [`RabbitServer`] and
//! cascades its close to every channel it created. `FakeConnectionFactory`
//! mirrors the usual factory seam of client libraries so code under test can
//! be handed a factory instead of a live endpoint.

use crate::{channel::FakeChannel, errors::AmqpError, server::RabbitServer};
use std::sync::{
    atomic::{AtomicBool, AtomicU16, Ordering},
    Arc, Mutex, MutexGuard, PoisonError,
};
use tracing::debug;

/// A connection to an in-memory broker.
pub struct FakeConnection {
    server: Arc<RabbitServer>,
    channels: Mutex<Vec<Arc<FakeChannel>>>,
    next_channel_number: AtomicU16,
    open: AtomicBool,
}

impl FakeConnection {
    /// Opens a connection against the given broker.
    pub fn open(server: Arc<RabbitServer>) -> FakeConnection {
        FakeConnection {
            server,
            channels: Mutex::default(),
            next_channel_number: AtomicU16::new(1),
            open: AtomicBool::new(true),
        }
    }

    /// Returns the broker this connection operates against.
    pub fn server(&self) -> Arc<RabbitServer> {
        Arc::clone(&self.server)
    }

    /// Creates a new channel with the next channel number.
    ///
    /// Fails with [`AmqpError::ChannelError`] once the connection has been
    /// closed.
    pub fn create_channel(&self) -> Result<Arc<FakeChannel>, AmqpError> {
        if !self.is_open() {
            return Err(AmqpError::ChannelError);
        }

        let number = self.next_channel_number.fetch_add(1, Ordering::SeqCst);
        debug!(channel = number, "creating channel");
        let channel = Arc::new(FakeChannel::with_number(Arc::clone(&self.server), number));
        self.lock_channels().push(Arc::clone(&channel));
        Ok(channel)
    }

    /// Returns every channel created on this connection, in creation order.
    pub fn channels(&self) -> Vec<Arc<FakeChannel>> {
        self.lock_channels().clone()
    }

    /// Returns true while the connection has not been closed.
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    /// Closes the connection and every channel created on it.
    pub fn close(&self) {
        debug!("closing connection");
        self.open.store(false, Ordering::SeqCst);
        let channels = self.lock_channels().clone();
        for channel in channels {
            if channel.is_open() {
                channel.close();
            }
        }
    }

    fn lock_channels(&self) -> MutexGuard<'_, Vec<Arc<FakeChannel>>> {
        self.channels.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Creates connections bound to one shared broker.
#[derive(Default)]
pub struct FakeConnectionFactory {
    server: Arc<RabbitServer>,
}

impl FakeConnectionFactory {
    /// Creates a factory with a fresh broker.
    pub fn new() -> FakeConnectionFactory {
        FakeConnectionFactory::default()
    }

    /// Creates a factory around an existing broker so tests can seed or
    /// inspect broker state directly.
    pub fn with_server(server: Arc<RabbitServer>) -> FakeConnectionFactory {
        FakeConnectionFactory { server }
    }

    /// Returns the broker shared by every connection this factory creates.
    pub fn server(&self) -> Arc<RabbitServer> {
        Arc::clone(&self.server)
    }

    /// Opens a new connection against the shared broker.
    pub fn create_connection(&self) -> FakeConnection {
        FakeConnection::open(Arc::clone(&self.server))
    }
}
