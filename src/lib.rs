// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # rmq-rpc
//!
//! Declarative RabbitMQ topology management and RPC-style messaging.
//!
//! Every operation of [`Client`] opens its own connection (retried according to
//! [`ConnectOpts`]) and channel, issues one broker command and closes both.
//! [`Client::subscribe`] turns a queue into a request/reply endpoint that runs
//! until its cancellation token fires.

mod otel;

pub mod channel;
pub mod client;
pub mod config;
pub mod connector;
pub mod consumer;
pub mod errors;
pub mod exchange;
pub mod publisher;
pub mod queue;
pub mod subscriber;
pub mod topology;
pub mod transport;

pub use client::{Client, Rpc};
pub use config::AmqpConfigs;
pub use connector::ConnectOpts;
pub use consumer::{Delivery, DeliveryHandler};
pub use errors::{AmqpError, HandlerError};
pub use lapin::types::{AMQPValue, FieldTable};
pub use publisher::{HeaderValue, PublishOpts, Publishing};
pub use tokio_util::sync::CancellationToken;
