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
use amqp_publisher::{BrokerConnection, EventPublisher};
use integration_test_utils::FakeConnection;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

#[allow(dead_code)]
pub(crate) const TEST_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Job {
    pub job_id: String,
    pub queue: String,
}

pub(crate) fn job(id: &str) -> Job {
    Job {
        job_id: id.to_string(),
        queue: "render".to_string(),
    }
}

pub(crate) fn make_publisher(name: &str) -> (Arc<EventPublisher>, Arc<FakeConnection>) {
    integration_test_utils::init_logging();

    let broker = Arc::new(FakeConnection::new(name));
    let connection: Arc<dyn BrokerConnection> = broker.clone();
    (Arc::new(EventPublisher::new(connection)), broker)
}
