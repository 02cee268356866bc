// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # RPC Client
//!
//! [`Client`] is the entry point of the crate. It only carries the transport:
//! every operation opens its own connection and channel from the
//! [`ConnectOpts`] it receives, so a client can be shared freely between tasks.
//!
//! The operations themselves are implemented next to their options, in the
//! `exchange`, `queue`, `publisher` and `subscriber` modules.

use crate::{
    channel::LapinTransport,
    connector::{ConnectOpts, Session},
    consumer::DeliveryHandler,
    errors::AmqpError,
    exchange::DeclareExchangeOpts,
    publisher::{PublishOpts, Publishing},
    queue::{DeclareQueueOpts, QueueBindOpts, QueueInfo},
    transport::Transport,
};
use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Declarative topology and RPC-style messaging over a broker.
#[async_trait]
pub trait Rpc: Send + Sync {
    async fn exchange_declare(
        &self,
        name: &str,
        opts: Option<&DeclareExchangeOpts>,
        conn_opts: Option<&ConnectOpts>,
    ) -> Result<(), AmqpError>;

    async fn queue_declare(
        &self,
        name: &str,
        opts: Option<&DeclareQueueOpts>,
        conn_opts: Option<&ConnectOpts>,
    ) -> Result<QueueInfo, AmqpError>;

    async fn queue_bind(
        &self,
        exchange: &str,
        queue: &str,
        key: &str,
        opts: Option<&QueueBindOpts>,
        conn_opts: Option<&ConnectOpts>,
    ) -> Result<(), AmqpError>;

    async fn publish(
        &self,
        msg: Publishing,
        exchange: &str,
        routing_key: &str,
        opts: Option<&PublishOpts>,
        conn_opts: Option<&ConnectOpts>,
    ) -> Result<(), AmqpError>;

    #[allow(clippy::too_many_arguments)]
    async fn subscribe(
        &self,
        token: CancellationToken,
        queue: &str,
        consumer_tag: &str,
        auto_ack: bool,
        exclusive: bool,
        handler: Arc<dyn DeliveryHandler>,
        conn_opts: Option<&ConnectOpts>,
    ) -> Result<(), AmqpError>;
}

/// Client issuing every operation over its own connection.
#[derive(Clone)]
pub struct Client {
    transport: Arc<dyn Transport>,
}

impl Default for Client {
    fn default() -> Self {
        Client::new()
    }
}

impl Client {
    /// Creates a client talking to a real broker through lapin.
    pub fn new() -> Self {
        Client::with_transport(Arc::new(LapinTransport))
    }

    pub fn with_transport(transport: Arc<dyn Transport>) -> Self {
        Client { transport }
    }

    /// Opens the session of one operation, `None` options meaning the defaults.
    pub(crate) async fn session(
        &self,
        conn_opts: Option<&ConnectOpts>,
    ) -> Result<Session, AmqpError> {
        let conn_opts = conn_opts.cloned().unwrap_or_default();
        Session::open(self.transport.as_ref(), &conn_opts).await
    }
}

#[async_trait]
impl Rpc for Client {
    async fn exchange_declare(
        &self,
        name: &str,
        opts: Option<&DeclareExchangeOpts>,
        conn_opts: Option<&ConnectOpts>,
    ) -> Result<(), AmqpError> {
        Client::exchange_declare(self, name, opts, conn_opts).await
    }

    async fn queue_declare(
        &self,
        name: &str,
        opts: Option<&DeclareQueueOpts>,
        conn_opts: Option<&ConnectOpts>,
    ) -> Result<QueueInfo, AmqpError> {
        Client::queue_declare(self, name, opts, conn_opts).await
    }

    async fn queue_bind(
        &self,
        exchange: &str,
        queue: &str,
        key: &str,
        opts: Option<&QueueBindOpts>,
        conn_opts: Option<&ConnectOpts>,
    ) -> Result<(), AmqpError> {
        Client::queue_bind(self, exchange, queue, key, opts, conn_opts).await
    }

    async fn publish(
        &self,
        msg: Publishing,
        exchange: &str,
        routing_key: &str,
        opts: Option<&PublishOpts>,
        conn_opts: Option<&ConnectOpts>,
    ) -> Result<(), AmqpError> {
        Client::publish(self, msg, exchange, routing_key, opts, conn_opts).await
    }

    async fn subscribe(
        &self,
        token: CancellationToken,
        queue: &str,
        consumer_tag: &str,
        auto_ack: bool,
        exclusive: bool,
        handler: Arc<dyn DeliveryHandler>,
        conn_opts: Option<&ConnectOpts>,
    ) -> Result<(), AmqpError> {
        Client::subscribe(
            self,
            token,
            queue,
            consumer_tag,
            auto_ack,
            exclusive,
            handler,
            conn_opts,
        )
        .await
    }
}
