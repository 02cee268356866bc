// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # RPC Subscription Loop
//!
//! Adapts the push-based delivery stream of a consumer into a sequential
//! request, handler, reply cycle. Deliveries are handled one at a time in
//! arrival order; the cancellation token is checked before each receive, never
//! while a handler runs.

use crate::{
    client::Client,
    connector::ConnectOpts,
    consumer::{consume, ConsumeOpts, Delivery, DeliveryHandler},
    errors::AmqpError,
    transport::AmqpChannel,
};
use futures_util::StreamExt;
use opentelemetry::global;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

enum Next {
    Cancelled,
    Received(Option<Result<Delivery, AmqpError>>),
}

impl Client {
    /// Consumes `queue` and answers every delivery with the handler's reply.
    ///
    /// The reply is published on the default exchange to the delivery's
    /// `reply_to`, carrying its correlation id, then the delivery is acked
    /// (unless `auto_ack`). A failing handler gets the delivery nacked without
    /// requeue and the loop goes on.
    ///
    /// Returns `Ok(())` once `token` is cancelled, including while the
    /// connection is still being retried. Channel-level failures and
    /// the end of the delivery stream end the loop with an error. In every case
    /// the consumer's channel and connection are closed before returning.
    #[allow(clippy::too_many_arguments)]
    pub async fn subscribe(
        &self,
        token: CancellationToken,
        queue: &str,
        consumer_tag: &str,
        auto_ack: bool,
        exclusive: bool,
        handler: Arc<dyn DeliveryHandler>,
        conn_opts: Option<&ConnectOpts>,
    ) -> Result<(), AmqpError> {
        if token.is_cancelled() {
            debug!(queue, consumer_tag, "subscription cancelled before start");
            return Ok(());
        }

        let session = tokio::select! {
            biased;
            _ = token.cancelled() => {
                info!(queue, consumer_tag, "subscription cancelled while connecting");
                return Ok(());
            }
            session = self.session(conn_opts) => session?,
        };

        let result = receive_loop(
            session.channel(),
            &token,
            queue,
            consumer_tag,
            &ConsumeOpts {
                no_ack: auto_ack,
                exclusive,
            },
            handler.as_ref(),
        )
        .await;
        session.close().await;

        result
    }
}

async fn receive_loop(
    channel: &dyn AmqpChannel,
    token: &CancellationToken,
    queue: &str,
    consumer_tag: &str,
    opts: &ConsumeOpts,
    handler: &dyn DeliveryHandler,
) -> Result<(), AmqpError> {
    let mut deliveries = match channel.consume(queue, consumer_tag, opts).await {
        Err(err) => {
            error!(error = err.to_string(), "error to create the consumer");
            return Err(err);
        }
        Ok(stream) => stream,
    };

    info!(queue, consumer_tag, "consuming");
    let tracer = global::tracer("amqp consumer");

    loop {
        let next = tokio::select! {
            biased;
            _ = token.cancelled() => Next::Cancelled,
            received = deliveries.next() => Next::Received(received),
        };

        match next {
            Next::Cancelled => {
                info!(queue, consumer_tag, "subscription cancelled");
                if let Err(err) = channel.cancel(consumer_tag).await {
                    warn!(error = err.to_string(), "failure to cancel the consumer");
                }
                return Ok(());
            }
            Next::Received(None) => {
                error!(queue, consumer_tag, "delivery stream closed");
                return Err(AmqpError::StreamTerminated(consumer_tag.to_owned()));
            }
            Next::Received(Some(Err(err))) => {
                error!(error = err.to_string(), "errors consume msg");
                return Err(err);
            }
            Next::Received(Some(Ok(delivery))) => {
                consume(&tracer, channel, delivery, handler, opts.no_ack).await?;
            }
        }
    }
}
