// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

pub mod binding;
pub mod channel;
pub mod connection;
pub mod consumer;
pub mod errors;
pub mod exchange;
pub mod message;
pub mod queue;
pub mod server;
