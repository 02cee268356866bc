// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Error Types for the RPC Client
//!
//! This module provides the error type shared by every operation of the crate.
//! The `AmqpError` enum covers connection establishment, channel creation,
//! broker-side rejections of topology and publish commands, the subscribe loop
//! and configuration parsing.

use thiserror::Error;

/// Error type returned by a delivery handler.
///
/// Handler errors never leave the subscribe loop: they are logged, recorded on
/// the delivery span and the delivery is negatively acknowledged.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Represents errors that can occur during AMQP/RabbitMQ operations.
///
/// Variants carrying a `String` keep the text of the underlying transport error
/// so that the cause survives the conversion.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AmqpError {
    /// The connection options cannot be used to connect
    #[error("invalid connect options: {0}")]
    InvalidConnectOpts(String),

    /// The configuration source holds an unusable value
    #[error("invalid configuration `{0}`: {1}")]
    InvalidConfig(String, String),

    /// A single connection attempt failed
    #[error("transport failure: {0}")]
    TransportError(String),

    /// Every connection attempt failed, `reason` is the last failure
    #[error("failure to connect after {attempts} attempt(s): {reason}")]
    ConnectionError { attempts: u32, reason: String },

    /// Error creating a channel from an established connection
    #[error("failure to create a channel: {0}")]
    ChannelError(String),

    /// Error declaring an exchange with the given name
    #[error("failure to declare an exchange `{0}`: {1}")]
    DeclareExchangeError(String, String),

    /// Error deleting an exchange with the given name
    #[error("failure to delete an exchange `{0}`: {1}")]
    DeleteExchangeError(String, String),

    /// Error declaring a queue with the given name
    #[error("failure to declare a queue `{0}`: {1}")]
    DeclareQueueError(String, String),

    /// Error binding an exchange to a queue
    #[error("failure to bind exchange `{0}` to queue `{1}`: {2}")]
    BindingExchangeToQueueError(String, String, String),

    /// Error removing the binding between an exchange and a queue
    #[error("failure to unbind exchange `{0}` from queue `{1}`: {2}")]
    UnbindingExchangeFromQueueError(String, String, String),

    /// Error deleting a queue
    #[error("failure to delete a queue `{0}`: {1}")]
    DeleteQueueError(String, String),

    /// Error purging a queue
    #[error("failure to purge a queue `{0}`: {1}")]
    PurgeQueueError(String, String),

    /// Error publishing a message
    #[error("failure to publish: {0}")]
    PublishingError(String),

    /// Error encoding or decoding a message payload
    #[error("failure to parse payload: {0}")]
    ParsePayloadError(String),

    /// Error acknowledging a message
    #[error("failure to ack message: {0}")]
    AckMessageError(String),

    /// Error negative-acknowledging a message
    #[error("failure to nack message: {0}")]
    NackMessageError(String),

    /// Error declaring a consumer
    #[error("failure to declare consumer `{0}`: {1}")]
    ConsumerDeclarationError(String, String),

    /// The delivery stream yielded an error
    #[error("failure to consume message: {0}")]
    ConsumerError(String),

    /// The delivery stream ended while the subscription was still running
    #[error("delivery stream of consumer `{0}` terminated")]
    StreamTerminated(String),
}

impl AmqpError {
    /// Returns true when the broker rejected a command issued on an open channel.
    pub fn is_protocol_error(&self) -> bool {
        matches!(
            self,
            AmqpError::DeclareExchangeError(..)
                | AmqpError::DeleteExchangeError(..)
                | AmqpError::DeclareQueueError(..)
                | AmqpError::BindingExchangeToQueueError(..)
                | AmqpError::UnbindingExchangeFromQueueError(..)
                | AmqpError::DeleteQueueError(..)
                | AmqpError::PurgeQueueError(..)
                | AmqpError::PublishingError(..)
                | AmqpError::ConsumerDeclarationError(..)
        )
    }

    /// Returns true when the error ended a subscription because its delivery
    /// stream stopped.
    pub fn is_stream_termination(&self) -> bool {
        matches!(
            self,
            AmqpError::StreamTerminated(..) | AmqpError::ConsumerError(..)
        )
    }
}
