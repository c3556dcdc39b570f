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

use amqp_publisher::{ChannelState, PublishOptions, QosSettings, ShutdownInitiator};
use integration_test_utils::{bounded, wait_until};
use std::collections::HashSet;
use support::{job, make_publisher, TEST_TIMEOUT};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

const CONCURRENT_PUBLISHERS: usize = 16;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_first_publishes_share_one_channel() {
    let (publisher, broker) = make_publisher("concurrent_first_publish");
    broker.creation_gate().hold();

    let mut tasks = JoinSet::new();
    for i in 0..CONCURRENT_PUBLISHERS {
        let publisher = publisher.clone();
        tasks.spawn(async move {
            publisher
                .publish_json(
                    "job.events",
                    "job.created",
                    &job(&i.to_string()),
                    PublishOptions::default(),
                    &CancellationToken::new(),
                )
                .await
        });
    }

    assert!(wait_until(TEST_TIMEOUT, || broker.create_attempts() == 1).await);
    broker.creation_gate().release();

    let mut generations = HashSet::new();
    while let Some(joined) = bounded(TEST_TIMEOUT, tasks.join_next()).await {
        let receipt = joined
            .expect("publish task should not panic")
            .expect("publish should succeed");
        generations.insert(receipt.channel_generation);
    }

    assert_eq!(broker.create_attempts(), 1);
    assert_eq!(broker.channels_created(), 1);
    assert_eq!(generations, HashSet::from([1]));

    let publishes = broker.publishes();
    assert_eq!(publishes.len(), CONCURRENT_PUBLISHERS);
    assert!(publishes.iter().all(|publish| publish.channel_id == 1));
    assert_eq!(publisher.channel_state(), ChannelState::Open);
}

#[tokio::test]
async fn broker_shutdown_recreates_channel_on_next_publish() {
    let (publisher, broker) = make_publisher("broker_shutdown_recovery");
    let cancel = CancellationToken::new();

    let first = publisher
        .publish_json(
            "job.events",
            "job.created",
            &job("1"),
            PublishOptions::default(),
            &cancel,
        )
        .await
        .expect("first publish should succeed");

    let first_channel = broker.latest_channel().expect("channel should exist");
    first_channel.simulate_broker_close();
    assert_eq!(publisher.channel_state(), ChannelState::Stale);
    // Recovery is lazy.
    assert_eq!(broker.channels_created(), 1);

    let second = publisher
        .publish_json(
            "job.events",
            "job.created",
            &job("2"),
            PublishOptions::default(),
            &cancel,
        )
        .await
        .expect("publish after shutdown should recover");

    assert_ne!(first.channel_generation, second.channel_generation);
    assert_eq!(broker.channels_created(), 2);
    assert_eq!(publisher.channel_state(), ChannelState::Open);

    let publishes = broker.publishes();
    assert_eq!(publishes[0].channel_id, 1);
    assert_eq!(publishes[1].channel_id, 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_publishes_after_shutdown_recover_once() {
    let (publisher, broker) = make_publisher("concurrent_recovery");
    let cancel = CancellationToken::new();

    publisher
        .publish_json(
            "job.events",
            "job.created",
            &job("0"),
            PublishOptions::default(),
            &cancel,
        )
        .await
        .expect("warm-up publish should succeed");
    broker
        .latest_channel()
        .expect("channel should exist")
        .simulate_shutdown(ShutdownInitiator::Library, 320, "CONNECTION_FORCED");

    let mut tasks = JoinSet::new();
    for i in 0..CONCURRENT_PUBLISHERS {
        let publisher = publisher.clone();
        tasks.spawn(async move {
            publisher
                .publish_json(
                    "job.events",
                    "job.created",
                    &job(&i.to_string()),
                    PublishOptions::default(),
                    &CancellationToken::new(),
                )
                .await
        });
    }

    while let Some(joined) = bounded(TEST_TIMEOUT, tasks.join_next()).await {
        let receipt = joined
            .expect("publish task should not panic")
            .expect("publish should succeed");
        assert_eq!(receipt.channel_generation, 2);
    }

    assert_eq!(broker.channels_created(), 2);
}

#[tokio::test]
async fn every_channel_gets_single_message_prefetch() {
    let (publisher, broker) = make_publisher("qos_on_every_channel");
    let cancel = CancellationToken::new();

    for round in 0..3 {
        publisher
            .publish_json(
                "job.events",
                "job.created",
                &job(&round.to_string()),
                PublishOptions::default(),
                &cancel,
            )
            .await
            .expect("publish should succeed");
        broker
            .latest_channel()
            .expect("channel should exist")
            .simulate_broker_close();
    }

    let expected = QosSettings {
        prefetch_count: 1,
        global: false,
    };
    let channels = broker.channels();
    assert_eq!(channels.len(), 3);
    for channel in channels {
        assert_eq!(channel.qos_requests(), vec![expected]);
    }
}
