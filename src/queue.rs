// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Queue Management for RabbitMQ
//!
//! This module provides the options for declaring, binding, deleting and purging
//! queues, together with the one-shot client operations issuing those commands.
//!
//! Every operation opens its own connection and channel, issues exactly one
//! command and releases both before returning.

use crate::{client::Client, connector::ConnectOpts, errors::AmqpError};
use lapin::types::{AMQPValue, FieldTable, LongInt, LongString, ShortString};
use tracing::{debug, error, info};

/// Constant for the header field used to specify a dead letter exchange
pub const AMQP_HEADERS_DEAD_LETTER_EXCHANGE: &str = "x-dead-letter-exchange";
/// Constant for the header field used to specify a dead letter routing key
pub const AMQP_HEADERS_DEAD_LETTER_ROUTING_KEY: &str = "x-dead-letter-routing-key";
/// Constant for the header field used to specify message TTL
pub const AMQP_HEADERS_MESSAGE_TTL: &str = "x-message-ttl";
/// Constant for the header field used to specify maximum queue length
pub const AMQP_HEADERS_MAX_LENGTH: &str = "x-max-length";
/// Constant for the header field used to specify maximum queue size in bytes
pub const AMQP_HEADERS_MAX_LENGTH_BYTES: &str = "x-max-length-bytes";

/// Options used when declaring a queue.
///
/// Durable and non-auto-deleted queues survive broker restarts and remain when
/// there are no consumers or bindings left, which is the default. Exclusive
/// queues are only accessible by the declaring connection and are deleted when
/// it closes: since every operation of this crate uses its own connection, an
/// exclusive queue only lives as long as the operation declaring it.
///
/// With `no_wait` the queue is assumed to be declared on the server and a
/// channel exception arrives later if the declaration conflicts.
#[derive(Debug, Clone, PartialEq)]
pub struct DeclareQueueOpts {
    pub durable: bool,
    pub auto_delete: bool,
    pub exclusive: bool,
    pub no_wait: bool,
    pub args: FieldTable,
}

impl Default for DeclareQueueOpts {
    fn default() -> Self {
        DeclareQueueOpts {
            durable: true,
            auto_delete: false,
            exclusive: false,
            no_wait: false,
            args: FieldTable::default(),
        }
    }
}

impl DeclareQueueOpts {
    /// Marks the queue as transient, it will not survive a broker restart.
    pub fn transient(mut self) -> Self {
        self.durable = false;
        self
    }

    /// Sets the queue to auto-delete when its last consumer is gone.
    pub fn auto_delete(mut self) -> Self {
        self.auto_delete = true;
        self
    }

    /// Makes the queue exclusive to the connection.
    pub fn exclusive(mut self) -> Self {
        self.exclusive = true;
        self
    }

    pub fn no_wait(mut self) -> Self {
        self.no_wait = true;
        self
    }

    /// Sets the message Time-To-Live (TTL) for the queue, in milliseconds.
    pub fn ttl(self, ttl: i32) -> Self {
        self.arg(
            AMQP_HEADERS_MESSAGE_TTL,
            AMQPValue::LongInt(LongInt::from(ttl)),
        )
    }

    /// Sets the maximum number of messages the queue can hold.
    ///
    /// When this limit is reached the oldest messages are discarded, or
    /// dead-lettered if a dead letter route is configured.
    pub fn max_length(self, max: i32) -> Self {
        self.arg(
            AMQP_HEADERS_MAX_LENGTH,
            AMQPValue::LongInt(LongInt::from(max)),
        )
    }

    /// Sets the maximum size in bytes the queue can hold.
    pub fn max_length_bytes(self, max_bytes: i32) -> Self {
        self.arg(
            AMQP_HEADERS_MAX_LENGTH_BYTES,
            AMQPValue::LongInt(LongInt::from(max_bytes)),
        )
    }

    /// Routes rejected, expired and overflowing messages to `exchange` with `routing_key`.
    ///
    /// An empty exchange name is the default exchange, where the routing key is
    /// the name of the target queue.
    pub fn dead_letter(self, exchange: &str, routing_key: &str) -> Self {
        self.arg(
            AMQP_HEADERS_DEAD_LETTER_EXCHANGE,
            AMQPValue::LongString(LongString::from(exchange)),
        )
        .arg(
            AMQP_HEADERS_DEAD_LETTER_ROUTING_KEY,
            AMQPValue::LongString(LongString::from(routing_key)),
        )
    }

    /// Adds a single argument to the queue.
    pub fn arg(mut self, key: &str, value: AMQPValue) -> Self {
        self.args.insert(ShortString::from(key), value);
        self
    }
}

/// Options used when binding or unbinding a queue, defaults to no flag and no argument.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueueBindOpts {
    pub no_wait: bool,
    pub args: FieldTable,
}

/// Options used when deleting a queue, every flag defaults to false.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueDeleteOpts {
    pub if_unused: bool,
    pub if_empty: bool,
    pub no_wait: bool,
}

/// Queue descriptor confirmed by the server on declaration.
///
/// For a queue declared with an empty name, `name` is the one generated by the
/// server.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueInfo {
    pub name: String,
    pub message_count: u32,
    pub consumer_count: u32,
}

impl Client {
    /// Declares a queue on the RabbitMQ server and returns its descriptor.
    ///
    /// `None` options fall back to [`DeclareQueueOpts::default`] and
    /// [`ConnectOpts::default`].
    pub async fn queue_declare(
        &self,
        name: &str,
        opts: Option<&DeclareQueueOpts>,
        conn_opts: Option<&ConnectOpts>,
    ) -> Result<QueueInfo, AmqpError> {
        let opts = opts.cloned().unwrap_or_default();
        let session = self.session(conn_opts).await?;

        debug!("creating queue: {}", name);
        let result = session.channel().queue_declare(name, &opts).await;
        session.close().await;

        match result {
            Err(err) => {
                error!(error = err.to_string(), name, "error to declare the queue");
                Err(err)
            }
            Ok(queue) => {
                debug!(
                    messages = queue.message_count,
                    consumers = queue.consumer_count,
                    "queue: {} was created",
                    queue.name
                );
                Ok(queue)
            }
        }
    }

    /// Binds `queue` to `exchange` with the routing `key`.
    pub async fn queue_bind(
        &self,
        exchange: &str,
        queue: &str,
        key: &str,
        opts: Option<&QueueBindOpts>,
        conn_opts: Option<&ConnectOpts>,
    ) -> Result<(), AmqpError> {
        let opts = opts.cloned().unwrap_or_default();
        let session = self.session(conn_opts).await?;

        debug!(
            "binding queue: {} to the exchange: {} with the key: {}",
            queue, exchange, key
        );
        let result = session
            .channel()
            .queue_bind(queue, exchange, key, &opts)
            .await;
        session.close().await;

        if let Err(err) = &result {
            error!(error = err.to_string(), "error to bind queue to exchange");
        }

        result
    }

    /// Removes the binding of `queue` to `exchange` with the routing `key`.
    pub async fn queue_unbind(
        &self,
        exchange: &str,
        queue: &str,
        key: &str,
        opts: Option<&QueueBindOpts>,
        conn_opts: Option<&ConnectOpts>,
    ) -> Result<(), AmqpError> {
        let opts = opts.cloned().unwrap_or_default();
        let session = self.session(conn_opts).await?;

        let result = session
            .channel()
            .queue_unbind(queue, exchange, key, &opts)
            .await;
        session.close().await;

        if let Err(err) = &result {
            error!(error = err.to_string(), "error to unbind queue from exchange");
        }

        result
    }

    /// Deletes a queue from the server.
    ///
    /// The number of messages dropped with the queue is logged.
    pub async fn queue_delete(
        &self,
        queue: &str,
        opts: Option<&QueueDeleteOpts>,
        conn_opts: Option<&ConnectOpts>,
    ) -> Result<(), AmqpError> {
        let opts = opts.cloned().unwrap_or_default();
        let session = self.session(conn_opts).await?;

        let result = session.channel().queue_delete(queue, &opts).await;
        session.close().await;

        match result {
            Err(err) => {
                error!(error = err.to_string(), queue, "error to delete the queue");
                Err(err)
            }
            Ok(purged) => {
                info!(queue, purged, "queue [{}] deleted, {} messages purged", queue, purged);
                Ok(())
            }
        }
    }

    /// Purges every message from the queue.
    ///
    /// With `no_wait` the server does not answer and the logged count is not
    /// meaningful.
    pub async fn queue_purge(
        &self,
        queue: &str,
        no_wait: bool,
        conn_opts: Option<&ConnectOpts>,
    ) -> Result<(), AmqpError> {
        let session = self.session(conn_opts).await?;

        let result = session.channel().queue_purge(queue, no_wait).await;
        session.close().await;

        match result {
            Err(err) => {
                error!(error = err.to_string(), queue, "error to purge the queue");
                Err(err)
            }
            Ok(purged) => {
                info!(queue, purged, "{} messages purged from queue [{}]", purged, queue);
                Ok(())
            }
        }
    }
}
