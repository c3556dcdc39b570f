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

//! Publisher error taxonomy.
//!
//! A [`PublishError::PublishFailed`] or [`PublishError::OperationCancelled`] does not
//! prove the message was never delivered; deduplicate downstream by message id.

use crate::connection::BrokerError;
use thiserror::Error;

/// Failures surfaced by [`EventPublisher`](crate::EventPublisher) and
/// [`ChannelManager`](crate::ChannelManager).
#[derive(Debug, Error)]
pub enum PublishError {
    /// No usable channel could be created or recreated.
    #[error("broker channel unavailable: {source}")]
    ChannelUnavailable {
        #[source]
        source: BrokerError,
    },
    /// The broker call failed or the message could not be routed.
    #[error("failed to publish to {exchange}/{routing_key}: {source}")]
    PublishFailed {
        exchange: String,
        routing_key: String,
        #[source]
        source: PublishFailure,
    },
    /// The caller's cancellation token fired first.
    #[error("publish operation was cancelled")]
    OperationCancelled,
    /// The publisher was disposed before the call.
    #[error("publisher has already been disposed")]
    AlreadyDisposed,
}

impl PublishError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, PublishError::OperationCancelled)
    }
}

/// Underlying cause carried by [`PublishError::PublishFailed`].
#[derive(Debug, Error)]
pub enum PublishFailure {
    #[error("broker call failed: {0}")]
    Broker(#[source] BrokerError),
    #[error("message was returned unroutable ({reply_code} {reply_text})")]
    Unroutable { reply_code: u16, reply_text: String },
    #[error("payload serialization failed: {0}")]
    Serialization(#[source] serde_json::Error),
}
