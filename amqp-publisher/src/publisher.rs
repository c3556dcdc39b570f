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

use crate::channel_manager::{ChannelManager, ChannelState};
use crate::config::PublisherConfig;
use crate::connection::{BrokerConnection, PublishConfirm};
use crate::envelope::{Destination, Envelope, Headers, Payload};
use crate::error::{PublishError, PublishFailure};
use crate::observability::{events, fields};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

const COMPONENT: &str = "publisher";

/// Optional per-call metadata.
#[derive(Clone, Debug, Default)]
pub struct PublishOptions {
    /// Overrides the payload's declared type name.
    pub type_tag: Option<String>,
    pub headers: Option<Headers>,
}

impl PublishOptions {
    pub fn with_type_tag(mut self, type_tag: impl Into<String>) -> Self {
        self.type_tag = Some(type_tag.into());
        self
    }

    pub fn with_headers(mut self, headers: Headers) -> Self {
        self.headers = Some(headers);
        self
    }
}

/// Identifies a successful publish for downstream deduplication.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PublishReceipt {
    pub message_id: Uuid,
    pub channel_generation: u64,
}

/// At-least-once publisher over one shared broker connection.
///
/// Each call makes exactly one publish attempt; retries are left to the caller.
/// The attempt may transparently recreate the channel if the previous one was
/// shut down by the broker.
pub struct EventPublisher {
    channels: ChannelManager,
    config: PublisherConfig,
    disposed: AtomicBool,
}

impl EventPublisher {
    pub fn new(connection: Arc<dyn BrokerConnection>) -> Self {
        Self::with_config(connection, PublisherConfig::default())
    }

    pub fn with_config(connection: Arc<dyn BrokerConnection>, config: PublisherConfig) -> Self {
        Self {
            channels: ChannelManager::new(connection, config.qos()),
            config,
            disposed: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &PublisherConfig {
        &self.config
    }

    pub fn channel_state(&self) -> ChannelState {
        self.channels.state()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Publishes one mandatory message built from `payload` and `options`.
    pub async fn publish(
        &self,
        destination: &Destination,
        payload: Payload,
        options: PublishOptions,
        cancel: &CancellationToken,
    ) -> Result<PublishReceipt, PublishError> {
        self.reject_if_disposed(&destination.exchange, &destination.routing_key)?;

        let envelope = Envelope::builder(payload)
            .content_type(self.config.content_type.clone())
            .persistent(self.config.persistent)
            .type_tag(options.type_tag)
            .headers(options.headers)
            .build();

        self.publish_envelope(destination, &envelope, cancel).await
    }

    /// Serializes `message` with `serde_json` and publishes it.
    ///
    /// The default type tag is the short name of `T`.
    pub async fn publish_json<T: Serialize + ?Sized>(
        &self,
        exchange: &str,
        routing_key: &str,
        message: &T,
        options: PublishOptions,
        cancel: &CancellationToken,
    ) -> Result<PublishReceipt, PublishError> {
        self.reject_if_disposed(exchange, routing_key)?;

        let destination = Destination::new(exchange, routing_key);
        let payload = Payload::json(message).map_err(|err| {
            error!(
                event = events::PUBLISH_FAILED,
                component = COMPONENT,
                exchange = fields::format_exchange(exchange),
                routing_key,
                err = %err,
                "failed to serialize message"
            );
            PublishError::PublishFailed {
                exchange: exchange.to_string(),
                routing_key: routing_key.to_string(),
                source: PublishFailure::Serialization(err),
            }
        })?;

        self.publish(&destination, payload, options, cancel).await
    }

    fn reject_if_disposed(&self, exchange: &str, routing_key: &str) -> Result<(), PublishError> {
        if !self.is_disposed() {
            return Ok(());
        }
        warn!(
            event = events::PUBLISH_REJECTED_DISPOSED,
            component = COMPONENT,
            exchange = fields::format_exchange(exchange),
            routing_key,
            "publish attempted after dispose"
        );
        Err(PublishError::AlreadyDisposed)
    }

    async fn publish_envelope(
        &self,
        destination: &Destination,
        envelope: &Envelope,
        cancel: &CancellationToken,
    ) -> Result<PublishReceipt, PublishError> {
        let exchange = fields::format_exchange(&destination.exchange);
        let routing_key = destination.routing_key.as_str();

        let managed = match self.channels.acquire(cancel).await {
            Ok(managed) => managed,
            Err(PublishError::OperationCancelled) => {
                warn!(
                    event = events::PUBLISH_CANCELLED,
                    component = COMPONENT,
                    exchange,
                    routing_key,
                    msg_id = %fields::format_message_id(envelope),
                    "publish cancelled while acquiring channel"
                );
                return Err(PublishError::OperationCancelled);
            }
            Err(_) if self.channels.is_disposed() => return Err(PublishError::AlreadyDisposed),
            Err(err) => {
                error!(
                    event = events::PUBLISH_FAILED,
                    component = COMPONENT,
                    exchange,
                    routing_key,
                    msg_id = %fields::format_message_id(envelope),
                    err = %err,
                    "no broker channel available for publish"
                );
                return Err(err);
            }
        };

        // Dispose may have started while this call waited on channel creation.
        self.reject_if_disposed(&destination.exchange, routing_key)?;

        let confirm = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                warn!(
                    event = events::PUBLISH_CANCELLED,
                    component = COMPONENT,
                    exchange,
                    routing_key,
                    msg_id = %fields::format_message_id(envelope),
                    generation = managed.generation(),
                    "publish cancelled while broker call was outstanding"
                );
                return Err(PublishError::OperationCancelled);
            }
            confirm = managed.channel().basic_publish(
                &destination.exchange,
                &destination.routing_key,
                true,
                envelope,
            ) => confirm,
        };

        match confirm {
            Ok(PublishConfirm::Routed) => {
                debug!(
                    event = events::PUBLISH_OK,
                    component = COMPONENT,
                    exchange,
                    routing_key,
                    msg_id = %fields::format_message_id(envelope),
                    msg_type = fields::format_message_type(envelope),
                    generation = managed.generation(),
                    "published message"
                );
                Ok(PublishReceipt {
                    message_id: envelope.message_id(),
                    channel_generation: managed.generation(),
                })
            }
            Ok(PublishConfirm::Returned {
                reply_code,
                reply_text,
            }) => {
                error!(
                    event = events::PUBLISH_UNROUTABLE,
                    component = COMPONENT,
                    exchange,
                    routing_key,
                    msg_id = %fields::format_message_id(envelope),
                    reply_code,
                    reply_text = reply_text.as_str(),
                    "broker returned mandatory message as unroutable"
                );
                Err(PublishError::PublishFailed {
                    exchange: destination.exchange.clone(),
                    routing_key: destination.routing_key.clone(),
                    source: PublishFailure::Unroutable {
                        reply_code,
                        reply_text,
                    },
                })
            }
            Err(err) => {
                error!(
                    event = events::PUBLISH_FAILED,
                    component = COMPONENT,
                    exchange,
                    routing_key,
                    msg_id = %fields::format_message_id(envelope),
                    generation = managed.generation(),
                    err = %err,
                    "broker publish failed"
                );
                Err(PublishError::PublishFailed {
                    exchange: destination.exchange.clone(),
                    routing_key: destination.routing_key.clone(),
                    source: PublishFailure::Broker(err),
                })
            }
        }
    }

    /// Tears the publisher down and releases its channel. Idempotent.
    ///
    /// Later calls to [`publish`](Self::publish) fail with
    /// [`PublishError::AlreadyDisposed`].
    pub async fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.channels.dispose().await;
        info!(
            event = events::PUBLISHER_DISPOSED,
            component = COMPONENT,
            "publisher disposed"
        );
    }
}
