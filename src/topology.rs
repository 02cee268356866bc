// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # RabbitMQ Topology Management
//!
//! This module provides a way to declare a whole topology at once: exchanges,
//! queues and the bindings between them, installed in that order over a single
//! connection. Queue definitions support Dead Letter Queues (DLQs) and retry
//! queues built from dead-letter routing on the default exchange.

use crate::{
    client::Client,
    connector::ConnectOpts,
    errors::AmqpError,
    exchange::DeclareExchangeOpts,
    queue::{DeclareQueueOpts, QueueBindOpts},
    transport::AmqpChannel,
};
use lapin::types::FieldTable;
use tracing::debug;

/// An exchange to declare.
#[derive(Debug, Clone)]
pub struct ExchangeDefinition {
    pub(crate) name: String,
    pub(crate) opts: DeclareExchangeOpts,
}

impl ExchangeDefinition {
    pub fn new(name: &str) -> Self {
        ExchangeDefinition {
            name: name.to_owned(),
            opts: DeclareExchangeOpts::default(),
        }
    }

    pub fn opts(mut self, opts: DeclareExchangeOpts) -> Self {
        self.opts = opts;
        self
    }
}

/// A queue to declare, optionally with its DLQ and retry queue.
#[derive(Debug, Clone)]
pub struct QueueDefinition {
    pub(crate) name: String,
    pub(crate) opts: DeclareQueueOpts,
    pub(crate) dlq_name: Option<String>,
    pub(crate) retry_name: Option<String>,
    pub(crate) retry_ttl: Option<i32>,
}

impl QueueDefinition {
    pub fn new(name: &str) -> Self {
        QueueDefinition {
            name: name.to_owned(),
            opts: DeclareQueueOpts::default(),
            dlq_name: None,
            retry_name: None,
            retry_ttl: None,
        }
    }

    pub fn opts(mut self, opts: DeclareQueueOpts) -> Self {
        self.opts = opts;
        self
    }

    /// Adds a Dead Letter Queue named after the queue with a "-dlq" suffix.
    ///
    /// Without a retry queue, messages rejected by the queue end up in the DLQ.
    /// With a retry queue, rejected messages cycle between the queue and the
    /// retry queue and nothing is dead-lettered to the DLQ: consumers must
    /// publish there themselves, e.g. once the `x-death` count is too high.
    pub fn with_dlq(mut self) -> Self {
        self.dlq_name = Some(format!("{}-dlq", self.name));
        self
    }

    /// Adds a retry queue named after the queue with a "-retry" suffix.
    ///
    /// Messages rejected by the queue wait `ttl` milliseconds in the retry queue
    /// and are then routed back to the queue.
    pub fn with_retry(mut self, ttl: i32) -> Self {
        self.retry_name = Some(format!("{}-retry", self.name));
        self.retry_ttl = Some(ttl);
        self
    }

    /// Options of a companion queue: the queue's flags without its arguments.
    fn companion_opts(&self) -> DeclareQueueOpts {
        DeclareQueueOpts {
            args: FieldTable::default(),
            ..self.opts.clone()
        }
    }
}

/// A binding of a queue to an exchange.
#[derive(Debug, Clone)]
pub struct QueueBinding {
    pub(crate) queue: String,
    pub(crate) exchange: String,
    pub(crate) routing_key: String,
    pub(crate) opts: QueueBindOpts,
}

impl QueueBinding {
    /// By default, the exchange name and routing key are empty strings.
    pub fn new(queue: &str) -> Self {
        QueueBinding {
            queue: queue.to_owned(),
            exchange: String::new(),
            routing_key: String::new(),
            opts: QueueBindOpts::default(),
        }
    }

    pub fn exchange(mut self, exchange: &str) -> Self {
        self.exchange = exchange.to_owned();
        self
    }

    pub fn routing_key(mut self, key: &str) -> Self {
        self.routing_key = key.to_owned();
        self
    }
}

/// A set of exchanges, queues and bindings to install together.
#[derive(Debug, Clone, Default)]
pub struct Topology {
    pub(crate) exchanges: Vec<ExchangeDefinition>,
    pub(crate) queues: Vec<QueueDefinition>,
    pub(crate) bindings: Vec<QueueBinding>,
}

impl Topology {
    pub fn new() -> Self {
        Topology::default()
    }

    pub fn exchange(mut self, def: ExchangeDefinition) -> Self {
        self.exchanges.push(def);
        self
    }

    pub fn queue(mut self, def: QueueDefinition) -> Self {
        self.queues.push(def);
        self
    }

    pub fn queue_binding(mut self, binding: QueueBinding) -> Self {
        self.bindings.push(binding);
        self
    }

    /// Declares exchanges, then queues, then bindings; stops at the first failure.
    pub(crate) async fn install_on(&self, channel: &dyn AmqpChannel) -> Result<(), AmqpError> {
        for exch in &self.exchanges {
            debug!("creating exchange: {}", exch.name);
            channel.exchange_declare(&exch.name, &exch.opts).await?;
        }

        for def in &self.queues {
            self.install_queue(channel, def).await?;
        }

        for binding in &self.bindings {
            debug!(
                "binding queue: {} to the exchange: {} with the key: {}",
                binding.queue, binding.exchange, binding.routing_key
            );
            channel
                .queue_bind(
                    &binding.queue,
                    &binding.exchange,
                    &binding.routing_key,
                    &binding.opts,
                )
                .await?;
        }

        Ok(())
    }

    async fn install_queue(
        &self,
        channel: &dyn AmqpChannel,
        def: &QueueDefinition,
    ) -> Result<(), AmqpError> {
        let mut opts = def.opts.clone();

        if let (Some(retry_name), Some(ttl)) = (&def.retry_name, def.retry_ttl) {
            debug!("creating retry queue: {}", retry_name);
            let retry_opts = def.companion_opts().ttl(ttl).dead_letter("", &def.name);
            channel.queue_declare(retry_name, &retry_opts).await?;
            opts = opts.dead_letter("", retry_name);
        }

        if let Some(dlq_name) = &def.dlq_name {
            debug!("creating dlq: {}", dlq_name);
            channel
                .queue_declare(dlq_name, &def.companion_opts())
                .await?;
            if def.retry_name.is_none() {
                opts = opts.dead_letter("", dlq_name);
            }
        }

        debug!("creating queue: {}", def.name);
        channel.queue_declare(&def.name, &opts).await?;
        debug!("queue: {} was created", def.name);

        Ok(())
    }
}

impl Client {
    /// Installs the whole topology over a single connection and channel.
    pub async fn install(
        &self,
        topology: &Topology,
        conn_opts: Option<&ConnectOpts>,
    ) -> Result<(), AmqpError> {
        let session = self.session(conn_opts).await?;
        let result = topology.install_on(session.channel()).await;
        session.close().await;

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        exchange::ExchangeKind,
        queue::{
            QueueInfo, AMQP_HEADERS_DEAD_LETTER_ROUTING_KEY, AMQP_HEADERS_MESSAGE_TTL,
        },
        transport::MockAmqpChannel,
    };
    use lapin::types::{AMQPValue, LongString};

    fn routing_key_of(opts: &DeclareQueueOpts) -> Option<AMQPValue> {
        opts.args
            .inner()
            .get(AMQP_HEADERS_DEAD_LETTER_ROUTING_KEY)
            .cloned()
    }

    fn key(value: &str) -> Option<AMQPValue> {
        Some(AMQPValue::LongString(LongString::from(value)))
    }

    fn declared(name: &str) -> Result<QueueInfo, AmqpError> {
        Ok(QueueInfo {
            name: name.to_owned(),
            ..QueueInfo::default()
        })
    }

    #[tokio::test]
    async fn test_install_declares_in_order_with_retry_routing() {
        let mut seq = mockall::Sequence::new();
        let mut channel = MockAmqpChannel::new();

        channel
            .expect_exchange_declare()
            .withf(|name, opts| name.to_string() == "shop" && opts.kind == ExchangeKind::Topic)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(()));
        channel
            .expect_queue_declare()
            .withf(|name, opts| {
                name.to_string() == "orders-retry"
                    && routing_key_of(opts) == key("orders")
                    && opts.args.inner().get(AMQP_HEADERS_MESSAGE_TTL)
                        == Some(&AMQPValue::LongInt(1_000))
            })
            .times(1)
            .in_sequence(&mut seq)
            .returning(|name, _| declared(name));
        channel
            .expect_queue_declare()
            .withf(|name, opts| name.to_string() == "orders-dlq" && opts.args.inner().is_empty())
            .times(1)
            .in_sequence(&mut seq)
            .returning(|name, _| declared(name));
        channel
            .expect_queue_declare()
            .withf(|name, opts| {
                name.to_string() == "orders" && routing_key_of(opts) == key("orders-retry")
            })
            .times(1)
            .in_sequence(&mut seq)
            .returning(|name, _| declared(name));
        channel
            .expect_queue_bind()
            .withf(|queue, exchange, key, _| {
                queue.to_string() == "orders"
                    && exchange.to_string() == "shop"
                    && key.to_string() == "order.*"
            })
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _, _| Ok(()));

        let topology = Topology::new()
            .exchange(ExchangeDefinition::new("shop").opts(DeclareExchangeOpts::default().topic()))
            .queue(QueueDefinition::new("orders").with_retry(1_000).with_dlq())
            .queue_binding(
                QueueBinding::new("orders")
                    .exchange("shop")
                    .routing_key("order.*"),
            );

        assert_eq!(topology.install_on(&channel).await, Ok(()));
    }

    #[tokio::test]
    async fn test_dlq_without_retry_dead_letters_to_dlq() {
        let mut channel = MockAmqpChannel::new();
        channel
            .expect_queue_declare()
            .withf(|name, _| name.to_string() == "payments-dlq")
            .times(1)
            .returning(|name, _| declared(name));
        channel
            .expect_queue_declare()
            .withf(|name, opts| {
                name.to_string() == "payments" && routing_key_of(opts) == key("payments-dlq")
            })
            .times(1)
            .returning(|name, _| declared(name));

        let topology = Topology::new().queue(QueueDefinition::new("payments").with_dlq());

        assert_eq!(topology.install_on(&channel).await, Ok(()));
    }

    #[tokio::test]
    async fn test_install_stops_at_first_failure() {
        let mut channel = MockAmqpChannel::new();
        channel.expect_exchange_declare().times(1).returning(|name, _| {
            Err(AmqpError::DeclareExchangeError(
                name.to_owned(),
                "ACCESS_REFUSED".into(),
            ))
        });
        channel.expect_queue_declare().times(0);

        let topology = Topology::new()
            .exchange(ExchangeDefinition::new("shop"))
            .queue(QueueDefinition::new("orders"));

        let err = topology.install_on(&channel).await.unwrap_err();
        assert!(err.is_protocol_error());
    }
}
