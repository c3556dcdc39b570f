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

//! # amqp-publisher
//!
//! `amqp-publisher` turns application "publish this event" calls into mandatory,
//! persistent deliveries on one shared AMQP 0-9-1 connection.
//!
//! Many callers may publish at once. They share a single lazily created channel
//! that is replaced on the next publish after the broker shuts it down. The
//! wire protocol itself is provided by a client adapter implementing
//! [`BrokerConnection`] and [`BrokerChannel`].
//!
//! ```
//! use std::sync::Arc;
//! use amqp_publisher::{BrokerConnection, EventPublisher, PublishOptions};
//! use tokio_util::sync::CancellationToken;
//!
//! # pub mod mock_broker {
//! #     use std::sync::Arc;
//! #     use async_trait::async_trait;
//! #     use amqp_publisher::{
//! #         BrokerChannel, BrokerConnection, BrokerError, Envelope, PublishConfirm,
//! #         QosSettings, ShutdownListener,
//! #     };
//! #
//! #     pub struct MockChannel;
//! #
//! #     #[async_trait]
//! #     impl BrokerChannel for MockChannel {
//! #         fn is_open(&self) -> bool { true }
//! #         async fn basic_qos(&self, _qos: QosSettings) -> Result<(), BrokerError> { Ok(()) }
//! #         async fn basic_publish(
//! #             &self,
//! #             _exchange: &str,
//! #             _routing_key: &str,
//! #             _mandatory: bool,
//! #             _envelope: &Envelope,
//! #         ) -> Result<PublishConfirm, BrokerError> {
//! #             Ok(PublishConfirm::Routed)
//! #         }
//! #         async fn close(&self) -> Result<(), BrokerError> { Ok(()) }
//! #         fn on_shutdown(&self, _listener: Arc<dyn ShutdownListener>) {}
//! #     }
//! #
//! #     pub struct MockConnection;
//! #
//! #     #[async_trait]
//! #     impl BrokerConnection for MockConnection {
//! #         async fn create_channel(&self) -> Result<Arc<dyn BrokerChannel>, BrokerError> {
//! #             Ok(Arc::new(MockChannel))
//! #         }
//! #     }
//! # }
//! #
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let connection: Arc<dyn BrokerConnection> = Arc::new(mock_broker::MockConnection);
//! let publisher = EventPublisher::new(connection);
//! let cancel = CancellationToken::new();
//!
//! let receipt = publisher
//!     .publish_json(
//!         "job.events",
//!         "job.created",
//!         &serde_json::json!({ "id": "42" }),
//!         PublishOptions::default().with_type_tag("JobCreated"),
//!         &cancel,
//!     )
//!     .await
//!     .unwrap();
//! assert_eq!(receipt.channel_generation, 1);
//!
//! publisher.dispose().await;
//! # });
//! ```
//!
//! ## Delivery guarantees
//!
//! Delivery is at-least-once. A failed or cancelled publish may still have
//! reached the broker, so consumers that need exactly-once processing should
//! deduplicate on the envelope's message id.
//!
//! ## Observability model
//!
//! The crate emits `tracing` events with canonical names from
//! [`observability::events`]. It never installs a global subscriber; binaries
//! and tests do that at process boundaries.

mod channel_manager;
pub use channel_manager::{ChannelManager, ChannelState, ManagedChannel};

mod config;
pub use config::PublisherConfig;

mod connection;
pub use connection::{
    BrokerChannel, BrokerConnection, BrokerError, PublishConfirm, QosSettings, ShutdownInitiator,
    ShutdownListener, ShutdownSignal,
};

mod envelope;
pub use envelope::{
    Destination, Envelope, EnvelopeBuilder, HeaderValue, Headers, Payload, DEFAULT_CONTENT_TYPE,
};

mod error;
pub use error::{PublishError, PublishFailure};

mod job_events;
pub use job_events::{
    JobEvent, JobEventPublisher, JOB_CREATED_EVENT_TYPE, JOB_CREATED_ROUTING_KEY,
    JOB_EVENTS_EXCHANGE,
};

#[doc(hidden)]
pub mod observability;

mod publisher;
pub use publisher::{EventPublisher, PublishOptions, PublishReceipt};
