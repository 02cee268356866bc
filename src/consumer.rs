// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # RabbitMQ Message Consumer
//!
//! This module provides the incoming message type, the handler contract and the
//! processing of one delivery: run the handler, publish its reply to the
//! delivery's reply destination and settle the delivery with the broker.
//! Each delivery gets an OpenTelemetry consumer span.

use crate::{
    errors::{AmqpError, HandlerError},
    otel,
    publisher::{publish_on, PublishOpts, Publishing},
    transport::AmqpChannel,
};
use async_trait::async_trait;
use lapin::types::{AMQPValue, ShortString};
use opentelemetry::{
    global::BoxedTracer,
    trace::{Span, Status, TraceContextExt},
};
use serde::de::DeserializeOwned;
use std::{borrow::Cow, collections::BTreeMap, future::Future};
use tracing::{debug, error};

/// One message received by a consumer.
///
/// A delivery only lives for the duration of one handler invocation: it is moved
/// into the handler, the loop keeps the tag and reply routing it needs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Delivery {
    pub delivery_tag: u64,
    pub exchange: String,
    pub routing_key: String,
    pub redelivered: bool,
    pub correlation_id: Option<String>,
    pub reply_to: Option<String>,
    pub message_id: Option<String>,
    pub kind: Option<String>,
    pub content_type: Option<String>,
    pub headers: BTreeMap<ShortString, AMQPValue>,
    pub data: Vec<u8>,
}

impl Delivery {
    /// Deserializes the payload from JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, AmqpError> {
        serde_json::from_slice(&self.data).map_err(|err| {
            error!(error = err.to_string(), "failure to parse payload");
            AmqpError::ParsePayloadError(err.to_string())
        })
    }

    /// Reply destination, when the sender asked for one.
    pub fn reply_destination(&self) -> Option<&str> {
        self.reply_to.as_deref().filter(|reply_to| !reply_to.is_empty())
    }
}

/// Flags of the consume command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConsumeOpts {
    /// The broker considers deliveries acknowledged as soon as they are sent.
    pub no_ack: bool,
    pub exclusive: bool,
}

/// Turns a request delivery into a reply.
///
/// Any `Fn(Delivery) -> impl Future<Output = Result<Publishing, HandlerError>>`
/// is a handler.
#[async_trait]
pub trait DeliveryHandler: Send + Sync {
    async fn handle(&self, delivery: Delivery) -> Result<Publishing, HandlerError>;
}

#[async_trait]
impl<F, Fut> DeliveryHandler for F
where
    F: Fn(Delivery) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Publishing, HandlerError>> + Send + 'static,
{
    async fn handle(&self, delivery: Delivery) -> Result<Publishing, HandlerError> {
        (self)(delivery).await
    }
}

/// Processes one delivery.
///
/// Handler failures are settled with a nack without requeue and are not
/// returned: only channel-level failures (reply publish, ack, nack) are, since
/// they leave the subscription unusable. With `auto_ack` the broker already
/// settled the delivery and neither ack nor nack is sent.
pub(crate) async fn consume(
    tracer: &BoxedTracer,
    channel: &dyn AmqpChannel,
    delivery: Delivery,
    handler: &dyn DeliveryHandler,
    auto_ack: bool,
) -> Result<(), AmqpError> {
    let delivery_tag = delivery.delivery_tag;
    let reply_to = delivery.reply_destination().map(str::to_owned);
    let correlation_id = delivery.correlation_id.clone();
    let span_name = delivery
        .kind
        .clone()
        .unwrap_or_else(|| delivery.routing_key.clone());

    let (ctx, mut span) = otel::new_span(&delivery.headers, tracer, &span_name);

    debug!(
        delivery_tag,
        redelivered = delivery.redelivered,
        "received: {} - exchange: {}",
        span_name,
        delivery.exchange,
    );

    let reply = match handler.handle(delivery).await {
        Ok(reply) => reply,
        Err(err) => {
            error!(
                error = err.to_string(),
                delivery_tag, "handler failed to process the message"
            );
            span.record_error(&*err);
            span.set_status(Status::Error {
                description: Cow::from("handler failure"),
            });

            if !auto_ack {
                if let Err(e) = channel.nack(delivery_tag, false).await {
                    error!("error whiling nack msg");
                    span.record_error(&e);
                    return Err(e);
                }
            }

            return Ok(());
        }
    };

    if let Some(reply_to) = reply_to {
        let mut reply = reply;
        if reply.correlation_id.is_none() {
            reply.correlation_id = correlation_id;
        }

        let reply_ctx = ctx.with_remote_span_context(span.span_context().clone());
        if let Err(e) = publish_on(
            channel,
            &reply_ctx,
            "",
            &reply_to,
            &PublishOpts::default(),
            reply,
        )
        .await
        {
            span.record_error(&e);
            span.set_status(Status::Error {
                description: Cow::from("error to publish reply"),
            });
            return Err(e);
        }

        debug!(delivery_tag, reply_to, "reply published");
    }

    if !auto_ack {
        if let Err(e) = channel.ack(delivery_tag).await {
            error!("error whiling ack msg");
            span.record_error(&e);
            span.set_status(Status::Error {
                description: Cow::from("error to ack msg"),
            });
            return Err(e);
        }
    }

    debug!(delivery_tag, "message successfully processed");
    span.set_status(Status::Ok);

    Ok(())
}
