// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # RabbitMQ Message Publisher
//!
//! This module provides the outgoing message type and the one-shot publish
//! operation. Publishing propagates the OpenTelemetry trace context in the
//! message headers for distributed request tracking.
//!
//! Only connection establishment is retried: a publish is attempted at most once
//! per call.

use crate::{
    client::Client, connector::ConnectOpts, errors::AmqpError, otel::HeaderInjector,
    transport::AmqpChannel,
};
use lapin::types::{
    AMQPValue, FieldTable, LongInt, LongLongInt, LongString, LongUInt, ShortInt, ShortString,
    ShortUInt,
};
use opentelemetry::{global, Context};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, error};
use uuid::Uuid;

/// Default content type for JSON messages
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Typed value of a message header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderValue {
    Bool(bool),
    ShortString(String),
    LongString(String),
    Int(i16),
    LongInt(i32),
    LongLongInt(i64),
    Uint(u16),
    LongUint(u32),
}

impl From<&HeaderValue> for AMQPValue {
    fn from(value: &HeaderValue) -> Self {
        match value.clone() {
            HeaderValue::Bool(v) => AMQPValue::Boolean(v),
            HeaderValue::ShortString(v) => AMQPValue::ShortString(ShortString::from(v)),
            HeaderValue::LongString(v) => AMQPValue::LongString(LongString::from(v)),
            HeaderValue::Int(v) => AMQPValue::ShortInt(ShortInt::from(v)),
            HeaderValue::LongInt(v) => AMQPValue::LongInt(LongInt::from(v)),
            HeaderValue::LongLongInt(v) => AMQPValue::LongLongInt(LongLongInt::from(v)),
            HeaderValue::Uint(v) => AMQPValue::ShortUInt(ShortUInt::from(v)),
            HeaderValue::LongUint(v) => AMQPValue::LongUInt(LongUInt::from(v)),
        }
    }
}

/// An outgoing message: payload plus the AMQP basic properties.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Publishing {
    pub body: Vec<u8>,
    pub content_type: Option<String>,
    pub content_encoding: Option<String>,
    pub correlation_id: Option<String>,
    pub reply_to: Option<String>,
    pub message_id: Option<String>,
    pub kind: Option<String>,
    pub app_id: Option<String>,
    /// Per-message TTL in milliseconds, as the broker expects it.
    pub expiration: Option<String>,
    /// 1 for transient, 2 for persistent.
    pub delivery_mode: Option<u8>,
    pub priority: Option<u8>,
    /// Seconds since the epoch.
    pub timestamp: Option<u64>,
    pub headers: HashMap<String, HeaderValue>,
}

impl Publishing {
    pub fn new(body: impl Into<Vec<u8>>) -> Self {
        Publishing {
            body: body.into(),
            ..Publishing::default()
        }
    }

    /// Serializes `payload` as JSON and sets the JSON content type.
    pub fn json<T: Serialize + ?Sized>(payload: &T) -> Result<Self, AmqpError> {
        let body = serde_json::to_vec(payload).map_err(|err| {
            error!(error = err.to_string(), "failure to serialize payload");
            AmqpError::ParsePayloadError(err.to_string())
        })?;

        Ok(Publishing::new(body).with_content_type(JSON_CONTENT_TYPE))
    }

    pub fn with_content_type(mut self, content_type: &str) -> Self {
        self.content_type = Some(content_type.to_owned());
        self
    }

    pub fn with_correlation_id(mut self, id: &str) -> Self {
        self.correlation_id = Some(id.to_owned());
        self
    }

    pub fn with_reply_to(mut self, reply_to: &str) -> Self {
        self.reply_to = Some(reply_to.to_owned());
        self
    }

    pub fn with_message_id(mut self, id: &str) -> Self {
        self.message_id = Some(id.to_owned());
        self
    }

    pub fn with_kind(mut self, kind: &str) -> Self {
        self.kind = Some(kind.to_owned());
        self
    }

    pub fn with_expiration(mut self, ttl_ms: u64) -> Self {
        self.expiration = Some(ttl_ms.to_string());
        self
    }

    pub fn persistent(mut self) -> Self {
        self.delivery_mode = Some(2);
        self
    }

    pub fn with_header(mut self, key: &str, value: HeaderValue) -> Self {
        self.headers.insert(key.to_owned(), value);
        self
    }

    /// Converts the headers to the AMQP field table sent on the wire.
    pub fn header_table(&self) -> FieldTable {
        let mut btree = BTreeMap::<ShortString, AMQPValue>::default();
        for (key, value) in &self.headers {
            btree.insert(ShortString::from(key.clone()), AMQPValue::from(value));
        }
        FieldTable::from(btree)
    }
}

/// Flags of the publish command, both default to false.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishOpts {
    pub mandatory: bool,
    pub immediate: bool,
}

/// Publishes `msg` on an already open channel.
///
/// A message id is generated when the message has none, and `ctx` is injected in
/// the headers.
pub(crate) async fn publish_on(
    channel: &dyn AmqpChannel,
    ctx: &Context,
    exchange: &str,
    routing_key: &str,
    opts: &PublishOpts,
    msg: Publishing,
) -> Result<(), AmqpError> {
    let mut msg = msg;

    global::get_text_map_propagator(|propagator| {
        propagator.inject_context(ctx, &mut HeaderInjector::new(&mut msg.headers))
    });

    if msg.message_id.is_none() {
        msg.message_id = Some(Uuid::new_v4().to_string());
    }

    match channel.publish(exchange, routing_key, opts, &msg).await {
        Err(err) => {
            error!(
                error = err.to_string(),
                exchange, routing_key, "error publishing message"
            );
            Err(err)
        }
        Ok(()) => {
            debug!(exchange, routing_key, "message published");
            Ok(())
        }
    }
}

impl Client {
    /// Publishes one message to `exchange` with `routing_key`.
    ///
    /// The current trace context is propagated in the message headers.
    pub async fn publish(
        &self,
        msg: Publishing,
        exchange: &str,
        routing_key: &str,
        opts: Option<&PublishOpts>,
        conn_opts: Option<&ConnectOpts>,
    ) -> Result<(), AmqpError> {
        let opts = opts.cloned().unwrap_or_default();
        let session = self.session(conn_opts).await?;

        let result = publish_on(
            session.channel(),
            &Context::current(),
            exchange,
            routing_key,
            &opts,
            msg,
        )
        .await;
        session.close().await;

        result
    }
}
