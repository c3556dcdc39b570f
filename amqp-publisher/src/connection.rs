/********************************************************************************
 * Copyright (c) 2024 Contributors to the Eclipse Foundation
 *
 * See the NOTICE file(s) distributed with this work for additional
 * information regarding copyright ownership.
 *
 * This program and the accompanying materials are made available under the
 * terms of the Apache License Version 2.0 which is available at
 * https://www.apache.org/licenses/LICENSE-2.0
 *
 * SPDX-License-Identifier: Apache-2.0
 ********************************************************************************/

//! Broker-facing seams implemented by an underlying AMQP client library.
//!
//! The publisher never speaks the wire protocol itself. A client adapter hands it a
//! long-lived [`BrokerConnection`] and the publisher opens [`BrokerChannel`]s on it.

use crate::envelope::Envelope;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Opaque failure reported by a broker client adapter.
///
/// The client library's own error is kept as [`std::error::Error::source`] so nothing
/// library-specific leaks into the public contract.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct BrokerError {
    message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl BrokerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(
        message: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync + 'static>>,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Who tore a channel down.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ShutdownInitiator {
    /// The publisher itself closed the channel.
    Application,
    /// The broker closed the channel (for example a channel-level exception).
    Broker,
    /// The client library detected a network or protocol failure.
    Library,
}

impl ShutdownInitiator {
    /// Only shutdowns the application did not ask for require recovery.
    pub fn is_unexpected(self) -> bool {
        !matches!(self, ShutdownInitiator::Application)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ShutdownInitiator::Application => "application",
            ShutdownInitiator::Broker => "broker",
            ShutdownInitiator::Library => "library",
        }
    }
}

/// Shutdown notification delivered by a client adapter.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ShutdownSignal {
    pub initiator: ShutdownInitiator,
    pub reply_code: u16,
    pub reply_text: String,
}

impl ShutdownSignal {
    pub fn new(
        initiator: ShutdownInitiator,
        reply_code: u16,
        reply_text: impl Into<String>,
    ) -> Self {
        Self {
            initiator,
            reply_code,
            reply_text: reply_text.into(),
        }
    }
}

/// Synchronous shutdown callback registered on a channel.
///
/// Adapters may invoke it from their own I/O task, so implementations must
/// return promptly and must not block or await.
pub trait ShutdownListener: Send + Sync {
    fn on_shutdown(&self, signal: &ShutdownSignal);
}

/// Quality-of-service limits applied to a freshly opened channel.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct QosSettings {
    pub prefetch_count: u16,
    pub global: bool,
}

impl Default for QosSettings {
    fn default() -> Self {
        Self {
            prefetch_count: 1,
            global: false,
        }
    }
}

/// Broker answer to a mandatory publish.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum PublishConfirm {
    /// The broker accepted the message for routing.
    Routed,
    /// The broker returned the message because no queue was bound for it.
    Returned { reply_code: u16, reply_text: String },
}

/// A logical channel multiplexed over a [`BrokerConnection`].
#[async_trait]
pub trait BrokerChannel: Send + Sync {
    /// Cheap, non-blocking liveness check.
    fn is_open(&self) -> bool;

    async fn basic_qos(&self, qos: QosSettings) -> Result<(), BrokerError>;

    async fn basic_publish(
        &self,
        exchange: &str,
        routing_key: &str,
        mandatory: bool,
        envelope: &Envelope,
    ) -> Result<PublishConfirm, BrokerError>;

    /// Application-initiated close.
    async fn close(&self) -> Result<(), BrokerError>;

    /// Registers the shutdown callback for this channel.
    fn on_shutdown(&self, listener: Arc<dyn ShutdownListener>);
}

/// Externally owned broker session; the publisher holds it but never closes it.
#[async_trait]
pub trait BrokerConnection: Send + Sync {
    async fn create_channel(&self) -> Result<Arc<dyn BrokerChannel>, BrokerError>;
}

#[cfg(test)]
mod tests {
    use super::{BrokerError, ShutdownInitiator};
    use std::error::Error;
    use std::io;

    #[test]
    fn broker_error_keeps_library_error_as_source() {
        let error = BrokerError::with_source(
            "channel open refused",
            io::Error::new(io::ErrorKind::ConnectionRefused, "connection reset"),
        );

        assert_eq!(error.to_string(), "channel open refused");
        assert_eq!(
            error.source().map(|source| source.to_string()),
            Some("connection reset".to_string())
        );
    }

    #[test]
    fn broker_error_without_source_has_none() {
        assert!(BrokerError::new("closed").source().is_none());
    }

    #[test]
    fn only_application_shutdown_is_expected() {
        assert!(!ShutdownInitiator::Application.is_unexpected());
        assert!(ShutdownInitiator::Broker.is_unexpected());
        assert!(ShutdownInitiator::Library.is_unexpected());
    }
}
