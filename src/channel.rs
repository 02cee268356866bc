// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # AMQP Connection and Channel over lapin
//!
//! This module implements the transport traits on top of lapin. It establishes
//! connections to the RabbitMQ server, creates channels on them and maps every
//! channel command and lapin error onto the types of this crate.

use crate::{
    connector::ConnectOpts,
    consumer::{ConsumeOpts, Delivery},
    errors::AmqpError,
    exchange::{DeclareExchangeOpts, DeleteExchangeOpts},
    publisher::{PublishOpts, Publishing},
    queue::{DeclareQueueOpts, QueueBindOpts, QueueDeleteOpts, QueueInfo},
    transport::{AmqpChannel, AmqpConnection, DeliveryStream, Transport},
};
use async_trait::async_trait;
use futures_util::StreamExt;
use lapin::{
    options::{
        BasicAckOptions, BasicCancelOptions, BasicConsumeOptions, BasicNackOptions,
        BasicPublishOptions, ExchangeDeclareOptions, ExchangeDeleteOptions, QueueBindOptions,
        QueueDeclareOptions, QueueDeleteOptions, QueuePurgeOptions,
    },
    types::{FieldTable, LongString, ShortString},
    BasicProperties, Channel, Connection, ConnectionProperties,
};
use tracing::{debug, error};

/// Reply code sent when closing a channel or a connection normally
const REPLY_SUCCESS: u16 = 200;

/// Transport connecting to a real broker through lapin.
#[derive(Debug, Clone, Default)]
pub struct LapinTransport;

#[async_trait]
impl Transport for LapinTransport {
    async fn connect(&self, opts: &ConnectOpts) -> Result<Box<dyn AmqpConnection>, AmqpError> {
        let mut properties = ConnectionProperties::default();
        if let Some(name) = &opts.connection_name {
            properties = properties.with_connection_name(LongString::from(name.clone()));
        }

        match Connection::connect(&opts.url, properties).await {
            Ok(conn) => Ok(Box::new(LapinConnection { conn })),
            Err(err) => {
                error!(error = err.to_string(), "failure to connect");
                Err(AmqpError::TransportError(err.to_string()))
            }
        }
    }
}

/// A lapin connection.
pub struct LapinConnection {
    conn: Connection,
}

#[async_trait]
impl AmqpConnection for LapinConnection {
    async fn channel(&self) -> Result<Box<dyn AmqpChannel>, AmqpError> {
        match self.conn.create_channel().await {
            Ok(channel) => Ok(Box::new(LapinChannel { channel })),
            Err(err) => Err(AmqpError::ChannelError(err.to_string())),
        }
    }

    async fn close(&self) -> Result<(), AmqpError> {
        self.conn
            .close(REPLY_SUCCESS, "bye")
            .await
            .map_err(|err| AmqpError::TransportError(err.to_string()))
    }
}

/// A lapin channel.
pub struct LapinChannel {
    channel: Channel,
}

#[async_trait]
impl AmqpChannel for LapinChannel {
    async fn exchange_declare(
        &self,
        name: &str,
        opts: &DeclareExchangeOpts,
    ) -> Result<(), AmqpError> {
        self.channel
            .exchange_declare(
                name,
                lapin::ExchangeKind::from(&opts.kind),
                ExchangeDeclareOptions {
                    passive: false,
                    durable: opts.durable,
                    auto_delete: opts.auto_delete,
                    internal: opts.internal,
                    nowait: opts.no_wait,
                },
                opts.args.clone(),
            )
            .await
            .map_err(|err| AmqpError::DeclareExchangeError(name.to_owned(), err.to_string()))
    }

    async fn exchange_delete(
        &self,
        name: &str,
        opts: &DeleteExchangeOpts,
    ) -> Result<(), AmqpError> {
        self.channel
            .exchange_delete(
                name,
                ExchangeDeleteOptions {
                    if_unused: opts.if_unused,
                    nowait: opts.no_wait,
                },
            )
            .await
            .map_err(|err| AmqpError::DeleteExchangeError(name.to_owned(), err.to_string()))
    }

    async fn queue_declare(
        &self,
        name: &str,
        opts: &DeclareQueueOpts,
    ) -> Result<QueueInfo, AmqpError> {
        let queue = self
            .channel
            .queue_declare(
                name,
                QueueDeclareOptions {
                    passive: false,
                    durable: opts.durable,
                    exclusive: opts.exclusive,
                    auto_delete: opts.auto_delete,
                    nowait: opts.no_wait,
                },
                opts.args.clone(),
            )
            .await
            .map_err(|err| AmqpError::DeclareQueueError(name.to_owned(), err.to_string()))?;

        Ok(QueueInfo {
            name: queue.name().to_string(),
            message_count: queue.message_count(),
            consumer_count: queue.consumer_count(),
        })
    }

    async fn queue_bind(
        &self,
        queue: &str,
        exchange: &str,
        routing_key: &str,
        opts: &QueueBindOpts,
    ) -> Result<(), AmqpError> {
        self.channel
            .queue_bind(
                queue,
                exchange,
                routing_key,
                QueueBindOptions {
                    nowait: opts.no_wait,
                },
                opts.args.clone(),
            )
            .await
            .map_err(|err| {
                AmqpError::BindingExchangeToQueueError(
                    exchange.to_owned(),
                    queue.to_owned(),
                    err.to_string(),
                )
            })
    }

    async fn queue_unbind(
        &self,
        queue: &str,
        exchange: &str,
        routing_key: &str,
        opts: &QueueBindOpts,
    ) -> Result<(), AmqpError> {
        self.channel
            .queue_unbind(queue, exchange, routing_key, opts.args.clone())
            .await
            .map_err(|err| {
                AmqpError::UnbindingExchangeFromQueueError(
                    exchange.to_owned(),
                    queue.to_owned(),
                    err.to_string(),
                )
            })
    }

    async fn queue_delete(&self, name: &str, opts: &QueueDeleteOpts) -> Result<u32, AmqpError> {
        self.channel
            .queue_delete(
                name,
                QueueDeleteOptions {
                    if_unused: opts.if_unused,
                    if_empty: opts.if_empty,
                    nowait: opts.no_wait,
                },
            )
            .await
            .map_err(|err| AmqpError::DeleteQueueError(name.to_owned(), err.to_string()))
    }

    async fn queue_purge(&self, name: &str, no_wait: bool) -> Result<u32, AmqpError> {
        self.channel
            .queue_purge(name, QueuePurgeOptions { nowait: no_wait })
            .await
            .map_err(|err| AmqpError::PurgeQueueError(name.to_owned(), err.to_string()))
    }

    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        opts: &PublishOpts,
        msg: &Publishing,
    ) -> Result<(), AmqpError> {
        let confirm = self
            .channel
            .basic_publish(
                exchange,
                routing_key,
                BasicPublishOptions {
                    mandatory: opts.mandatory,
                    immediate: opts.immediate,
                },
                &msg.body,
                basic_properties(msg),
            )
            .await
            .map_err(|err| AmqpError::PublishingError(err.to_string()))?
            .await
            .map_err(|err| AmqpError::PublishingError(err.to_string()))?;

        if confirm.is_nack() {
            return Err(AmqpError::PublishingError(
                "publisher confirm NACK".to_owned(),
            ));
        }

        Ok(())
    }

    async fn consume(
        &self,
        queue: &str,
        consumer_tag: &str,
        opts: &ConsumeOpts,
    ) -> Result<DeliveryStream, AmqpError> {
        let consumer = self
            .channel
            .basic_consume(
                queue,
                consumer_tag,
                BasicConsumeOptions {
                    no_local: false,
                    no_ack: opts.no_ack,
                    exclusive: opts.exclusive,
                    nowait: false,
                },
                FieldTable::default(),
            )
            .await
            .map_err(|err| {
                AmqpError::ConsumerDeclarationError(consumer_tag.to_owned(), err.to_string())
            })?;

        debug!(queue, consumer_tag, "consumer created");

        Ok(consumer
            .map(|result| {
                result
                    .map(Delivery::from)
                    .map_err(|err| AmqpError::ConsumerError(err.to_string()))
            })
            .boxed())
    }

    async fn cancel(&self, consumer_tag: &str) -> Result<(), AmqpError> {
        self.channel
            .basic_cancel(consumer_tag, BasicCancelOptions { nowait: false })
            .await
            .map_err(|err| AmqpError::ConsumerError(err.to_string()))
    }

    async fn ack(&self, delivery_tag: u64) -> Result<(), AmqpError> {
        self.channel
            .basic_ack(delivery_tag, BasicAckOptions { multiple: false })
            .await
            .map_err(|err| AmqpError::AckMessageError(err.to_string()))
    }

    async fn nack(&self, delivery_tag: u64, requeue: bool) -> Result<(), AmqpError> {
        self.channel
            .basic_nack(
                delivery_tag,
                BasicNackOptions {
                    multiple: false,
                    requeue,
                },
            )
            .await
            .map_err(|err| AmqpError::NackMessageError(err.to_string()))
    }

    async fn close(&self) -> Result<(), AmqpError> {
        self.channel
            .close(REPLY_SUCCESS, "bye")
            .await
            .map_err(|err| AmqpError::ChannelError(err.to_string()))
    }
}

/// Maps the message metadata onto the AMQP basic properties.
fn basic_properties(msg: &Publishing) -> BasicProperties {
    let mut props = BasicProperties::default().with_headers(msg.header_table());

    if let Some(v) = &msg.content_type {
        props = props.with_content_type(ShortString::from(v.clone()));
    }
    if let Some(v) = &msg.content_encoding {
        props = props.with_content_encoding(ShortString::from(v.clone()));
    }
    if let Some(v) = &msg.correlation_id {
        props = props.with_correlation_id(ShortString::from(v.clone()));
    }
    if let Some(v) = &msg.reply_to {
        props = props.with_reply_to(ShortString::from(v.clone()));
    }
    if let Some(v) = &msg.message_id {
        props = props.with_message_id(ShortString::from(v.clone()));
    }
    if let Some(v) = &msg.kind {
        props = props.with_type(ShortString::from(v.clone()));
    }
    if let Some(v) = &msg.app_id {
        props = props.with_app_id(ShortString::from(v.clone()));
    }
    if let Some(v) = &msg.expiration {
        props = props.with_expiration(ShortString::from(v.clone()));
    }
    if let Some(v) = msg.delivery_mode {
        props = props.with_delivery_mode(v);
    }
    if let Some(v) = msg.priority {
        props = props.with_priority(v);
    }
    if let Some(v) = msg.timestamp {
        props = props.with_timestamp(v);
    }

    props
}

impl From<lapin::message::Delivery> for Delivery {
    fn from(delivery: lapin::message::Delivery) -> Self {
        let props = &delivery.properties;
        let text = |value: &Option<ShortString>| value.as_ref().map(|v| v.to_string());

        let correlation_id = text(props.correlation_id());
        let reply_to = text(props.reply_to());
        let message_id = text(props.message_id());
        let kind = text(props.kind());
        let content_type = text(props.content_type());
        let headers = props
            .headers()
            .as_ref()
            .map(|table| table.inner().clone())
            .unwrap_or_default();

        Delivery {
            delivery_tag: delivery.delivery_tag,
            exchange: delivery.exchange.to_string(),
            routing_key: delivery.routing_key.to_string(),
            redelivered: delivery.redelivered,
            correlation_id,
            reply_to,
            message_id,
            kind,
            content_type,
            headers,
            data: delivery.data,
        }
    }
}
