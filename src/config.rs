// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Broker Configuration
//!
//! Connection settings as they are usually deployed: separate host, port,
//! credentials and vhost, read from the environment or deserialized from any
//! serde source, and turned into [`ConnectOpts`].

use crate::{connector::ConnectOpts, errors::AmqpError};
use serde::Deserialize;
use std::{str::FromStr, time::Duration};
use urlencoding::encode;

pub const ENV_HOST: &str = "RABBITMQ_HOST";
pub const ENV_PORT: &str = "RABBITMQ_PORT";
pub const ENV_USER: &str = "RABBITMQ_USER";
pub const ENV_PASSWORD: &str = "RABBITMQ_PASSWORD";
pub const ENV_VHOST: &str = "RABBITMQ_VHOST";
pub const ENV_MAX_RETRIES: &str = "RABBITMQ_MAX_RETRIES";
pub const ENV_RETRY_INTERVAL_MS: &str = "RABBITMQ_RETRY_INTERVAL_MS";
pub const ENV_CONNECTION_NAME: &str = "RABBITMQ_CONNECTION_NAME";

/// RabbitMQ connection settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AmqpConfigs {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub vhost: String,
    pub max_retries: u32,
    pub retry_interval_ms: u64,
    pub connection_name: Option<String>,
}

impl Default for AmqpConfigs {
    fn default() -> Self {
        AmqpConfigs {
            host: "localhost".to_owned(),
            port: 5672,
            user: "guest".to_owned(),
            password: "guest".to_owned(),
            vhost: "/".to_owned(),
            max_retries: crate::connector::DEFAULT_MAX_RETRIES,
            retry_interval_ms: crate::connector::DEFAULT_RETRY_INTERVAL.as_millis() as u64,
            connection_name: None,
        }
    }
}

impl AmqpConfigs {
    /// Reads the settings from the `RABBITMQ_*` environment variables.
    ///
    /// Missing variables keep their default value.
    pub fn from_env() -> Result<Self, AmqpError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the settings through `lookup`, which returns the value of a variable.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AmqpError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = AmqpConfigs::default();

        if let Some(host) = lookup(ENV_HOST) {
            cfg.host = host;
        }
        if let Some(port) = lookup(ENV_PORT) {
            cfg.port = parse(ENV_PORT, &port)?;
        }
        if let Some(user) = lookup(ENV_USER) {
            cfg.user = user;
        }
        if let Some(password) = lookup(ENV_PASSWORD) {
            cfg.password = password;
        }
        if let Some(vhost) = lookup(ENV_VHOST) {
            cfg.vhost = vhost;
        }
        if let Some(retries) = lookup(ENV_MAX_RETRIES) {
            cfg.max_retries = parse(ENV_MAX_RETRIES, &retries)?;
        }
        if let Some(interval) = lookup(ENV_RETRY_INTERVAL_MS) {
            cfg.retry_interval_ms = parse(ENV_RETRY_INTERVAL_MS, &interval)?;
        }
        cfg.connection_name = lookup(ENV_CONNECTION_NAME).or(cfg.connection_name);

        Ok(cfg)
    }

    /// Builds the AMQP URI.
    ///
    /// Credentials and vhost are percent-encoded, so reserved characters in a
    /// password never leak into the host part.
    pub fn uri(&self) -> String {
        format!(
            "amqp://{}:{}@{}:{}/{}",
            encode(&self.user),
            encode(&self.password),
            self.host,
            self.port,
            encode(&self.vhost)
        )
    }
}

impl From<&AmqpConfigs> for ConnectOpts {
    fn from(cfg: &AmqpConfigs) -> Self {
        ConnectOpts {
            url: cfg.uri(),
            max_retries: cfg.max_retries,
            retry_interval: Duration::from_millis(cfg.retry_interval_ms),
            connection_name: cfg.connection_name.clone(),
        }
    }
}

fn parse<T: FromStr>(key: &str, value: &str) -> Result<T, AmqpError> {
    value
        .trim()
        .parse()
        .map_err(|_| AmqpError::InvalidConfig(key.to_owned(), value.to_owned()))
}
