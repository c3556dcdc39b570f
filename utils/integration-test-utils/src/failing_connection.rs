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

use amqp_publisher::{BrokerChannel, BrokerConnection, BrokerError};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Connection whose broker refuses every channel open.
pub struct FailingConnection {
    name: Arc<String>,
    attempts: AtomicUsize,
}

impl FailingConnection {
    pub fn new(name: &str) -> Self {
        Self {
            name: Arc::new(name.to_string()),
            attempts: AtomicUsize::new(0),
        }
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BrokerConnection for FailingConnection {
    async fn create_channel(&self) -> Result<Arc<dyn BrokerChannel>, BrokerError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        debug!("{}: refusing channel open, attempt {attempt}", self.name);
        Err(BrokerError::new(format!(
            "{}: CHANNEL_ERROR - connection blocked",
            self.name
        )))
    }
}
