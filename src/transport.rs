// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Broker Transport Seam
//!
//! The client never talks to the protocol library directly. Every operation goes
//! through the three traits below: a [`Transport`] opens connections, an
//! [`AmqpConnection`] opens channels and an [`AmqpChannel`] issues the broker
//! commands. The lapin implementation lives in [`crate::channel`].

use crate::{
    connector::ConnectOpts,
    consumer::{ConsumeOpts, Delivery},
    errors::AmqpError,
    exchange::{DeclareExchangeOpts, DeleteExchangeOpts},
    publisher::{PublishOpts, Publishing},
    queue::{DeclareQueueOpts, QueueBindOpts, QueueDeleteOpts, QueueInfo},
};
use async_trait::async_trait;
use futures_util::stream::BoxStream;

/// Lazy, unbounded sequence of deliveries produced by a consumer.
///
/// The stream ends when the broker closes the channel or the connection.
pub type DeliveryStream = BoxStream<'static, Result<Delivery, AmqpError>>;

/// Opens connections to a broker.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    /// Performs a single connection attempt. Retrying is the caller's job.
    async fn connect(&self, opts: &ConnectOpts) -> Result<Box<dyn AmqpConnection>, AmqpError>;
}

/// One live transport session.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AmqpConnection: Send + Sync {
    async fn channel(&self) -> Result<Box<dyn AmqpChannel>, AmqpError>;

    async fn close(&self) -> Result<(), AmqpError>;
}

/// A channel multiplexed on an [`AmqpConnection`].
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AmqpChannel: Send + Sync {
    async fn exchange_declare(
        &self,
        name: &str,
        opts: &DeclareExchangeOpts,
    ) -> Result<(), AmqpError>;

    async fn exchange_delete(&self, name: &str, opts: &DeleteExchangeOpts)
        -> Result<(), AmqpError>;

    async fn queue_declare(
        &self,
        name: &str,
        opts: &DeclareQueueOpts,
    ) -> Result<QueueInfo, AmqpError>;

    async fn queue_bind(
        &self,
        queue: &str,
        exchange: &str,
        routing_key: &str,
        opts: &QueueBindOpts,
    ) -> Result<(), AmqpError>;

    async fn queue_unbind(
        &self,
        queue: &str,
        exchange: &str,
        routing_key: &str,
        opts: &QueueBindOpts,
    ) -> Result<(), AmqpError>;

    /// Deletes the queue and returns the number of messages it still held.
    async fn queue_delete(&self, name: &str, opts: &QueueDeleteOpts) -> Result<u32, AmqpError>;

    /// Purges the queue and returns the number of removed messages.
    async fn queue_purge(&self, name: &str, no_wait: bool) -> Result<u32, AmqpError>;

    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        opts: &PublishOpts,
        msg: &Publishing,
    ) -> Result<(), AmqpError>;

    async fn consume(
        &self,
        queue: &str,
        consumer_tag: &str,
        opts: &ConsumeOpts,
    ) -> Result<DeliveryStream, AmqpError>;

    async fn cancel(&self, consumer_tag: &str) -> Result<(), AmqpError>;

    async fn ack(&self, delivery_tag: u64) -> Result<(), AmqpError>;

    async fn nack(&self, delivery_tag: u64, requeue: bool) -> Result<(), AmqpError>;

    async fn close(&self) -> Result<(), AmqpError>;
}
