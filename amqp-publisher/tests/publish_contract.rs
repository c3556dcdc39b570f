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

mod support;

use amqp_publisher::{
    BrokerConnection, Destination, EventPublisher, HeaderValue, Headers, JobEventPublisher,
    Payload, PublishError, PublishFailure, PublishOptions, DEFAULT_CONTENT_TYPE,
};
use integration_test_utils::FailingConnection;
use serde_json::Value;
use std::sync::Arc;
use support::{job, make_publisher};
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn job_created_lands_on_job_events_exchange() {
    let (publisher, broker) = make_publisher("job_created_scenario");

    let receipt = publisher
        .publish_json(
            "job.events",
            "job.created",
            &job("42"),
            PublishOptions::default(),
            &CancellationToken::new(),
        )
        .await
        .expect("publish should succeed");

    let publishes = broker.publishes();
    assert_eq!(publishes.len(), 1);
    let publish = &publishes[0];
    assert_eq!(publish.exchange, "job.events");
    assert_eq!(publish.routing_key, "job.created");
    assert!(publish.mandatory);

    let envelope = &publish.envelope;
    assert_eq!(envelope.content_type(), DEFAULT_CONTENT_TYPE);
    assert!(envelope.persistent());
    assert_eq!(envelope.delivery_mode(), 2);
    assert!(!envelope.message_id().is_nil());
    assert_eq!(envelope.message_id(), receipt.message_id);
    assert_eq!(envelope.type_tag(), "Job");

    let body: Value = serde_json::from_slice(envelope.payload()).expect("payload should be json");
    assert_eq!(body["jobId"], "42");
    assert_eq!(body["queue"], "render");
}

#[tokio::test]
async fn job_event_publisher_wraps_job_in_event_document() {
    let (publisher, broker) = make_publisher("job_event_publisher");
    let jobs = JobEventPublisher::new(publisher);

    let receipt = jobs
        .publish_job_created(&job("7"), &CancellationToken::new())
        .await
        .expect("job event should publish");

    let publish = broker.publishes().pop().expect("one publish recorded");
    assert_eq!(publish.exchange, "job.events");
    assert_eq!(publish.routing_key, "job.created");
    assert_eq!(publish.envelope.type_tag(), "JobCreated");
    assert_eq!(publish.envelope.message_id(), receipt.message_id);

    let body: Value = serde_json::from_slice(publish.envelope.payload()).unwrap();
    assert_eq!(body["eventType"], "JobCreated");
    assert_eq!(body["data"]["jobId"], "7");
}

#[tokio::test]
async fn raw_payload_keeps_headers_and_type_override() {
    let (publisher, broker) = make_publisher("raw_payload");
    let mut headers = Headers::new();
    headers.insert("tenant".to_string(), HeaderValue::from("acme"));
    headers.insert("attempt".to_string(), HeaderValue::Int(3));

    publisher
        .publish(
            &Destination::new("", "jobs.inbox"),
            Payload::raw(b"hello".to_vec(), "Greeting"),
            PublishOptions::default()
                .with_type_tag("Salutation")
                .with_headers(headers.clone()),
            &CancellationToken::new(),
        )
        .await
        .expect("publish to default exchange should succeed");

    let publish = broker.publishes().pop().expect("one publish recorded");
    assert_eq!(publish.exchange, "");
    assert_eq!(publish.routing_key, "jobs.inbox");
    assert_eq!(publish.envelope.payload(), b"hello");
    assert_eq!(publish.envelope.type_tag(), "Salutation");
    assert_eq!(publish.envelope.headers(), &headers);
}

#[tokio::test]
async fn each_publish_gets_a_fresh_message_id() {
    let (publisher, broker) = make_publisher("fresh_message_ids");
    let cancel = CancellationToken::new();

    for _ in 0..2 {
        publisher
            .publish_json(
                "job.events",
                "job.created",
                &job("1"),
                PublishOptions::default(),
                &cancel,
            )
            .await
            .expect("publish should succeed");
    }

    let publishes = broker.publishes();
    assert_eq!(publishes[0].envelope.payload(), publishes[1].envelope.payload());
    assert_ne!(
        publishes[0].envelope.message_id(),
        publishes[1].envelope.message_id()
    );
}

#[tokio::test]
async fn unroutable_message_is_reported_as_publish_failure() {
    let (publisher, broker) = make_publisher("unroutable");
    broker.return_unroutable(true);

    let err = publisher
        .publish_json(
            "job.events",
            "nobody.listens",
            &job("1"),
            PublishOptions::default(),
            &CancellationToken::new(),
        )
        .await
        .expect_err("returned message should fail the publish");

    match err {
        PublishError::PublishFailed {
            exchange,
            routing_key,
            source: PublishFailure::Unroutable { reply_code, .. },
        } => {
            assert_eq!(exchange, "job.events");
            assert_eq!(routing_key, "nobody.listens");
            assert_eq!(reply_code, 312);
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn broker_write_error_is_reported_as_publish_failure() {
    let (publisher, broker) = make_publisher("write_error");
    broker.fail_publishes(true);

    let err = publisher
        .publish_json(
            "job.events",
            "job.created",
            &job("1"),
            PublishOptions::default(),
            &CancellationToken::new(),
        )
        .await
        .expect_err("write error should fail the publish");

    assert!(matches!(
        err,
        PublishError::PublishFailed {
            source: PublishFailure::Broker(_),
            ..
        }
    ));
    assert!(broker.publishes().is_empty());
}

#[tokio::test]
async fn refused_channel_surfaces_channel_unavailable_and_retries_lazily() {
    let (publisher, broker) = make_publisher("refused_channel");
    let cancel = CancellationToken::new();
    broker.refuse_channels(true);

    let err = publisher
        .publish_json(
            "job.events",
            "job.created",
            &job("1"),
            PublishOptions::default(),
            &cancel,
        )
        .await
        .expect_err("refused channel should fail the publish");
    assert!(matches!(err, PublishError::ChannelUnavailable { .. }));
    assert_eq!(broker.publish_attempts(), 0);

    broker.refuse_channels(false);
    publisher
        .publish_json(
            "job.events",
            "job.created",
            &job("2"),
            PublishOptions::default(),
            &cancel,
        )
        .await
        .expect("next publish should open a channel");
    assert_eq!(broker.create_attempts(), 2);
    assert_eq!(broker.channels_created(), 1);
}

#[tokio::test]
async fn failed_creation_is_not_cached() {
    integration_test_utils::init_logging();
    let broker = Arc::new(FailingConnection::new("always_refuses"));
    let connection: Arc<dyn BrokerConnection> = broker.clone();
    let publisher = EventPublisher::new(connection);
    let cancel = CancellationToken::new();

    for attempt in 1..=3 {
        let err = publisher
            .publish_json(
                "job.events",
                "job.created",
                &job("1"),
                PublishOptions::default(),
                &cancel,
            )
            .await
            .expect_err("every attempt should fail");
        assert!(matches!(err, PublishError::ChannelUnavailable { .. }));
        assert_eq!(broker.attempts(), attempt);
    }
}
