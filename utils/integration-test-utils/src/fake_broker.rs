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

use crate::gate::Gate;
use amqp_publisher::{
    BrokerChannel, BrokerConnection, BrokerError, Envelope, PublishConfirm, QosSettings,
    ShutdownInitiator, ShutdownListener, ShutdownSignal,
};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;

const NO_ROUTE: u16 = 312;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A message the fake broker accepted.
#[derive(Clone, Debug)]
pub struct RecordedPublish {
    pub channel_id: usize,
    pub exchange: String,
    pub routing_key: String,
    pub mandatory: bool,
    pub envelope: Envelope,
}

#[derive(Default)]
struct BrokerState {
    name: String,
    create_attempts: AtomicUsize,
    publish_attempts: AtomicUsize,
    refuse_channels: AtomicBool,
    return_unroutable: AtomicBool,
    fail_publishes: AtomicBool,
    creation_gate: Gate,
    qos_gate: Gate,
    publish_gate: Gate,
    channels: Mutex<Vec<Arc<FakeChannel>>>,
    publishes: Mutex<Vec<RecordedPublish>>,
}

/// In-memory broker connection that records every channel it opens and every publish it accepts.
pub struct FakeConnection {
    state: Arc<BrokerState>,
}

impl FakeConnection {
    pub fn new(name: &str) -> Self {
        Self {
            state: Arc::new(BrokerState {
                name: name.to_string(),
                ..Default::default()
            }),
        }
    }

    /// Channels successfully opened so far.
    pub fn channels_created(&self) -> usize {
        lock(&self.state.channels).len()
    }

    /// Calls to `create_channel`, including refused and parked ones.
    pub fn create_attempts(&self) -> usize {
        self.state.create_attempts.load(Ordering::SeqCst)
    }

    pub fn channels(&self) -> Vec<Arc<FakeChannel>> {
        lock(&self.state.channels).clone()
    }

    pub fn latest_channel(&self) -> Option<Arc<FakeChannel>> {
        lock(&self.state.channels).last().cloned()
    }

    pub fn publishes(&self) -> Vec<RecordedPublish> {
        lock(&self.state.publishes).clone()
    }

    /// Calls to `basic_publish` that reached an open channel, including parked ones.
    pub fn publish_attempts(&self) -> usize {
        self.state.publish_attempts.load(Ordering::SeqCst)
    }

    pub fn refuse_channels(&self, refuse: bool) {
        self.state.refuse_channels.store(refuse, Ordering::SeqCst);
    }

    pub fn return_unroutable(&self, unroutable: bool) {
        self.state
            .return_unroutable
            .store(unroutable, Ordering::SeqCst);
    }

    pub fn fail_publishes(&self, fail: bool) {
        self.state.fail_publishes.store(fail, Ordering::SeqCst);
    }

    /// Parks `create_channel` calls while held.
    pub fn creation_gate(&self) -> &Gate {
        &self.state.creation_gate
    }

    /// Parks `basic_qos` calls while held; the channel already exists at that point.
    pub fn qos_gate(&self) -> &Gate {
        &self.state.qos_gate
    }

    /// Parks `basic_publish` calls while held.
    pub fn publish_gate(&self) -> &Gate {
        &self.state.publish_gate
    }
}

#[async_trait]
impl BrokerConnection for FakeConnection {
    async fn create_channel(&self) -> Result<Arc<dyn BrokerChannel>, BrokerError> {
        self.state.create_attempts.fetch_add(1, Ordering::SeqCst);
        self.state.creation_gate.pass().await;

        if self.state.refuse_channels.load(Ordering::SeqCst) {
            debug!("{}: refusing channel open", self.state.name);
            return Err(BrokerError::new("channel open refused by broker"));
        }

        let mut channels = lock(&self.state.channels);
        let channel = Arc::new(FakeChannel {
            id: channels.len() + 1,
            open: AtomicBool::new(true),
            qos: Mutex::new(Vec::new()),
            listeners: Mutex::new(Vec::new()),
            close_calls: AtomicUsize::new(0),
            state: self.state.clone(),
        });
        channels.push(channel.clone());
        debug!("{}: opened channel {}", self.state.name, channel.id);
        Ok(channel)
    }
}

/// Channel handed out by [`FakeConnection`].
pub struct FakeChannel {
    id: usize,
    open: AtomicBool,
    qos: Mutex<Vec<QosSettings>>,
    listeners: Mutex<Vec<Arc<dyn ShutdownListener>>>,
    close_calls: AtomicUsize,
    state: Arc<BrokerState>,
}

impl FakeChannel {
    /// 1-based position in the order channels were opened.
    pub fn id(&self) -> usize {
        self.id
    }

    /// Every QoS request applied to this channel, in order.
    pub fn qos_requests(&self) -> Vec<QosSettings> {
        lock(&self.qos).clone()
    }

    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }

    /// Closes the channel from outside the application and notifies its listeners.
    pub fn simulate_shutdown(
        &self,
        initiator: ShutdownInitiator,
        reply_code: u16,
        reply_text: &str,
    ) {
        self.open.store(false, Ordering::SeqCst);
        self.notify(&ShutdownSignal::new(initiator, reply_code, reply_text));
    }

    /// Broker-initiated close, as sent on a channel-level protocol error.
    pub fn simulate_broker_close(&self) {
        self.simulate_shutdown(ShutdownInitiator::Broker, 406, "PRECONDITION_FAILED");
    }

    fn notify(&self, signal: &ShutdownSignal) {
        let listeners = lock(&self.listeners).clone();
        for listener in listeners {
            listener.on_shutdown(signal);
        }
    }
}

#[async_trait]
impl BrokerChannel for FakeChannel {
    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    async fn basic_qos(&self, qos: QosSettings) -> Result<(), BrokerError> {
        self.state.qos_gate.pass().await;
        lock(&self.qos).push(qos);
        Ok(())
    }

    async fn basic_publish(
        &self,
        exchange: &str,
        routing_key: &str,
        mandatory: bool,
        envelope: &Envelope,
    ) -> Result<PublishConfirm, BrokerError> {
        if !self.is_open() {
            return Err(BrokerError::new(format!("channel {} is closed", self.id)));
        }
        self.state.publish_attempts.fetch_add(1, Ordering::SeqCst);
        self.state.publish_gate.pass().await;

        if self.state.fail_publishes.load(Ordering::SeqCst) {
            return Err(BrokerError::new("connection reset while writing frame"));
        }

        lock(&self.state.publishes).push(RecordedPublish {
            channel_id: self.id,
            exchange: exchange.to_string(),
            routing_key: routing_key.to_string(),
            mandatory,
            envelope: envelope.clone(),
        });

        if self.state.return_unroutable.load(Ordering::SeqCst) {
            return Ok(PublishConfirm::Returned {
                reply_code: NO_ROUTE,
                reply_text: "NO_ROUTE".to_string(),
            });
        }
        Ok(PublishConfirm::Routed)
    }

    async fn close(&self) -> Result<(), BrokerError> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        if self.open.swap(false, Ordering::SeqCst) {
            self.notify(&ShutdownSignal::new(
                ShutdownInitiator::Application,
                200,
                "Goodbye",
            ));
        }
        Ok(())
    }

    fn on_shutdown(&self, listener: Arc<dyn ShutdownListener>) {
        lock(&self.listeners).push(listener);
    }
}
