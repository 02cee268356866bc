// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Exchange Management for RabbitMQ
//!
//! This module provides the options used to declare and delete exchanges and
//! the one-shot client operations doing so. Exchanges are the routing mechanism
//! in RabbitMQ that determine how messages are distributed to queues.

use crate::{client::Client, connector::ConnectOpts, errors::AmqpError};
use lapin::types::{AMQPValue, FieldTable, LongString, ShortString};
use tracing::{debug, error, info};

/// Constant for the header field used to specify the delayed exchange type
pub const AMQP_HEADERS_DELAYED_EXCHANGE_TYPE: &str = "x-delayed-type";
/// Exchange type registered by the delayed message exchange plugin
pub const AMQP_DELAYED_MESSAGE_EXCHANGE: &str = "x-delayed-message";

/// Represents the types of exchanges available in RabbitMQ.
///
/// Each exchange type has specific routing behavior:
/// - Direct: Routes messages to queues based on an exact match of routing keys
/// - Fanout: Broadcasts messages to all bound queues regardless of routing keys
/// - Topic: Routes messages based on wildcard pattern matching of routing keys
/// - Headers: Routes based on message header values instead of routing keys
/// - XMessageDelayed: Extension for delayed message delivery (plugin required)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ExchangeKind {
    #[default]
    Direct,
    Fanout,
    Topic,
    Headers,
    XMessageDelayed,
}

impl From<&ExchangeKind> for lapin::ExchangeKind {
    fn from(kind: &ExchangeKind) -> Self {
        match kind {
            ExchangeKind::Direct => lapin::ExchangeKind::Direct,
            ExchangeKind::Fanout => lapin::ExchangeKind::Fanout,
            ExchangeKind::Headers => lapin::ExchangeKind::Headers,
            ExchangeKind::Topic => lapin::ExchangeKind::Topic,
            ExchangeKind::XMessageDelayed => {
                lapin::ExchangeKind::Custom(AMQP_DELAYED_MESSAGE_EXCHANGE.to_owned())
            }
        }
    }
}

/// Options used when declaring an exchange.
///
/// The defaults describe a durable direct exchange: not auto-deleted, not
/// internal, waiting for the broker confirmation and without arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct DeclareExchangeOpts {
    pub kind: ExchangeKind,
    pub durable: bool,
    pub auto_delete: bool,
    pub internal: bool,
    pub no_wait: bool,
    pub args: FieldTable,
}

impl Default for DeclareExchangeOpts {
    fn default() -> Self {
        DeclareExchangeOpts {
            kind: ExchangeKind::Direct,
            durable: true,
            auto_delete: false,
            internal: false,
            no_wait: false,
            args: FieldTable::default(),
        }
    }
}

impl DeclareExchangeOpts {
    /// Sets the exchange type.
    pub fn kind(mut self, kind: ExchangeKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn fanout(self) -> Self {
        self.kind(ExchangeKind::Fanout)
    }

    pub fn topic(self) -> Self {
        self.kind(ExchangeKind::Topic)
    }

    /// Creates a delayed exchange routing like `routing`.
    ///
    /// This requires the x-delayed-message plugin to be installed on the RabbitMQ server.
    pub fn delayed(mut self, routing: ExchangeKind) -> Self {
        let routing = match routing {
            ExchangeKind::Fanout => "fanout",
            ExchangeKind::Topic => "topic",
            ExchangeKind::Headers => "headers",
            _ => "direct",
        };

        self.kind = ExchangeKind::XMessageDelayed;
        self.args.insert(
            ShortString::from(AMQP_HEADERS_DELAYED_EXCHANGE_TYPE),
            AMQPValue::LongString(LongString::from(routing)),
        );
        self
    }

    /// Marks the exchange as transient, it will not survive a broker restart.
    pub fn transient(mut self) -> Self {
        self.durable = false;
        self
    }

    /// Sets the exchange to auto-delete when no longer used.
    pub fn auto_delete(mut self) -> Self {
        self.auto_delete = true;
        self
    }

    /// Makes the exchange internal, preventing direct publishing.
    pub fn internal(mut self) -> Self {
        self.internal = true;
        self
    }

    pub fn no_wait(mut self) -> Self {
        self.no_wait = true;
        self
    }

    /// Adds a single argument to the exchange.
    pub fn arg(mut self, key: &str, value: AMQPValue) -> Self {
        self.args.insert(ShortString::from(key), value);
        self
    }
}

/// Options used when deleting an exchange, every flag defaults to false.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeleteExchangeOpts {
    pub if_unused: bool,
    pub no_wait: bool,
}

impl Client {
    /// Declares an exchange on the RabbitMQ server.
    ///
    /// `None` options fall back to [`DeclareExchangeOpts::default`] and
    /// [`ConnectOpts::default`].
    pub async fn exchange_declare(
        &self,
        name: &str,
        opts: Option<&DeclareExchangeOpts>,
        conn_opts: Option<&ConnectOpts>,
    ) -> Result<(), AmqpError> {
        let opts = opts.cloned().unwrap_or_default();
        let session = self.session(conn_opts).await?;

        debug!("creating exchange: {}", name);
        let result = session.channel().exchange_declare(name, &opts).await;
        session.close().await;

        match result {
            Err(err) => {
                error!(
                    error = err.to_string(),
                    name, "error to declare the exchange"
                );
                Err(err)
            }
            Ok(()) => {
                debug!("exchange: {} was created", name);
                Ok(())
            }
        }
    }

    /// Deletes an exchange from the RabbitMQ server.
    pub async fn exchange_delete(
        &self,
        name: &str,
        opts: Option<&DeleteExchangeOpts>,
        conn_opts: Option<&ConnectOpts>,
    ) -> Result<(), AmqpError> {
        let opts = opts.cloned().unwrap_or_default();
        let session = self.session(conn_opts).await?;

        let result = session.channel().exchange_delete(name, &opts).await;
        session.close().await;

        match result {
            Err(err) => {
                error!(
                    error = err.to_string(),
                    name, "error to delete the exchange"
                );
                Err(err)
            }
            Ok(()) => {
                info!("exchange [{}] deleted", name);
                Ok(())
            }
        }
    }
}
