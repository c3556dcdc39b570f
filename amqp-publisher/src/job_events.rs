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

//! "Job created" events published through an [`EventPublisher`].

use crate::envelope::Destination;
use crate::error::PublishError;
use crate::observability::{events, fields};
use crate::publisher::{EventPublisher, PublishOptions, PublishReceipt};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;
use uuid::Uuid;

pub const JOB_EVENTS_EXCHANGE: &str = "job.events";
pub const JOB_CREATED_ROUTING_KEY: &str = "job.created";
pub const JOB_CREATED_EVENT_TYPE: &str = "JobCreated";

const COMPONENT: &str = "job_events";

/// Wire document wrapping the job: `{eventId, eventType, timestamp, data}`.
#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct JobEvent<'a, T: ?Sized> {
    pub event_id: Uuid,
    pub event_type: &'a str,
    pub timestamp: DateTime<Utc>,
    pub data: &'a T,
}

impl<'a, T: ?Sized> JobEvent<'a, T> {
    pub fn created(data: &'a T) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            event_type: JOB_CREATED_EVENT_TYPE,
            timestamp: Utc::now(),
            data,
        }
    }
}

/// Publishes job lifecycle events to the job events exchange.
pub struct JobEventPublisher {
    publisher: Arc<EventPublisher>,
    destination: Destination,
}

impl JobEventPublisher {
    pub fn new(publisher: Arc<EventPublisher>) -> Self {
        Self::with_destination(
            publisher,
            Destination::new(JOB_EVENTS_EXCHANGE, JOB_CREATED_ROUTING_KEY),
        )
    }

    pub fn with_destination(publisher: Arc<EventPublisher>, destination: Destination) -> Self {
        Self {
            publisher,
            destination,
        }
    }

    pub fn destination(&self) -> &Destination {
        &self.destination
    }

    pub async fn publish_job_created<T: Serialize + ?Sized>(
        &self,
        job: &T,
        cancel: &CancellationToken,
    ) -> Result<PublishReceipt, PublishError> {
        let event = JobEvent::created(job);
        let receipt = self
            .publisher
            .publish_json(
                &self.destination.exchange,
                &self.destination.routing_key,
                &event,
                PublishOptions::default().with_type_tag(JOB_CREATED_EVENT_TYPE),
                cancel,
            )
            .await?;

        info!(
            event = events::JOB_EVENT_PUBLISHED,
            component = COMPONENT,
            destination = %fields::format_destination(&self.destination),
            event_id = %event.event_id,
            msg_id = %receipt.message_id,
            "published job created event"
        );
        Ok(receipt)
    }
}

#[cfg(test)]
mod tests {
    use super::JobEvent;
    use serde::Serialize;
    use serde_json::Value;

    #[derive(Serialize)]
    #[serde(rename_all = "camelCase")]
    struct Job {
        job_id: String,
        retry_count: u32,
    }

    #[test]
    fn job_event_serializes_camel_case_wrapper() {
        let job = Job {
            job_id: "42".to_string(),
            retry_count: 0,
        };

        let value = serde_json::to_value(JobEvent::created(&job)).unwrap();

        assert_eq!(value["eventType"], "JobCreated");
        assert_eq!(value["data"]["jobId"], "42");
        assert_eq!(value["data"]["retryCount"], 0);
        assert!(matches!(value["eventId"], Value::String(ref id) if id.len() == 36));
        assert!(value["timestamp"].is_string());
    }
}
