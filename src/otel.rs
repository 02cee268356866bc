// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # OpenTelemetry Integration for RabbitMQ
//!
//! This module provides integration with OpenTelemetry for distributed tracing.
//! It includes adapters for propagating trace context through message headers,
//! extracting context from incoming deliveries, and creating trace spans for
//! message processing.

use crate::publisher::HeaderValue;
use lapin::types::{AMQPValue, ShortString};
use opentelemetry::{
    global::{BoxedSpan, BoxedTracer},
    propagation::{Extractor, Injector},
    trace::{SpanKind, Tracer},
    Context,
};
use std::{
    borrow::Cow,
    collections::{BTreeMap, HashMap},
};
use tracing::error;

/// Injects OpenTelemetry context into the headers of an outgoing message.
pub(crate) struct HeaderInjector<'a> {
    headers: &'a mut HashMap<String, HeaderValue>,
}

impl<'a> HeaderInjector<'a> {
    pub(crate) fn new(headers: &'a mut HashMap<String, HeaderValue>) -> Self {
        Self { headers }
    }
}

impl Injector for HeaderInjector<'_> {
    /// Sets a trace context key-value pair in the message headers.
    fn set(&mut self, key: &str, value: String) {
        self.headers
            .insert(key.to_lowercase(), HeaderValue::LongString(value));
    }
}

/// Extracts OpenTelemetry context from the headers of a delivery.
pub(crate) struct HeaderExtractor<'a> {
    headers: &'a BTreeMap<ShortString, AMQPValue>,
}

impl<'a> HeaderExtractor<'a> {
    pub(crate) fn new(headers: &'a BTreeMap<ShortString, AMQPValue>) -> Self {
        Self { headers }
    }
}

impl Extractor for HeaderExtractor<'_> {
    /// Gets a trace context value from the delivery headers.
    ///
    /// Only long and short string headers can carry a context value.
    fn get(&self, key: &str) -> Option<&str> {
        self.headers
            .get(key)
            .and_then(|header_value| match header_value {
                AMQPValue::LongString(value) => std::str::from_utf8(value.as_bytes())
                    .map_err(|e| error!("Error decoding header value {:?}", e))
                    .ok(),
                AMQPValue::ShortString(value) => Some(value.as_str()),
                _ => None,
            })
    }

    fn keys(&self) -> Vec<&str> {
        self.headers.keys().map(|header| header.as_str()).collect()
    }
}

/// Creates a consumer span for one delivery.
///
/// The parent context is extracted from the delivery headers; the returned
/// context is that parent, to be propagated to replies.
pub(crate) fn new_span(
    headers: &BTreeMap<ShortString, AMQPValue>,
    tracer: &BoxedTracer,
    name: &str,
) -> (Context, BoxedSpan) {
    let ctx = opentelemetry::global::get_text_map_propagator(|propagator| {
        propagator.extract(&HeaderExtractor::new(headers))
    });

    let span = tracer
        .span_builder(Cow::from(name.to_owned()))
        .with_kind(SpanKind::Consumer)
        .start_with_context(tracer, &ctx);

    (ctx, span)
}
