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

use crate::config::RabbitMqOptions;
use amqp_publisher::observability::events;
use amqp_publisher::{
    BrokerChannel, BrokerConnection, BrokerError, Envelope, HeaderValue, Headers,
    PublishConfirm, QosSettings, ShutdownInitiator, ShutdownListener, ShutdownSignal,
};
use async_trait::async_trait;
use lapin::options::{BasicPublishOptions, BasicQosOptions, ConfirmSelectOptions};
use lapin::publisher_confirm::Confirmation;
use lapin::types::{AMQPValue, ByteArray, FieldTable, LongString, ShortString};
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, error, info};

const COMPONENT: &str = "lapin_transport";
const REPLY_SUCCESS: u16 = 200;

/// Shutdown listeners for the live channels of one connection, keyed by channel id.
#[derive(Default)]
struct ListenerRegistry {
    listeners: Mutex<HashMap<u16, Arc<dyn ShutdownListener>>>,
}

impl ListenerRegistry {
    fn lock(&self) -> MutexGuard<'_, HashMap<u16, Arc<dyn ShutdownListener>>> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn register(&self, channel_id: u16, listener: Arc<dyn ShutdownListener>) {
        self.lock().insert(channel_id, listener);
    }

    fn remove(&self, channel_id: u16) -> Option<Arc<dyn ShutdownListener>> {
        self.lock().remove(&channel_id)
    }

    /// The broker closed one channel, e.g. 404 NOT_FOUND or 406 PRECONDITION_FAILED.
    fn channel_lost(&self, channel_id: u16, err: &lapin::Error) {
        let Some(listener) = self.remove(channel_id) else {
            return;
        };
        let signal = shutdown_signal(err);

        debug!(
            component = COMPONENT,
            channel_id,
            initiator = signal.initiator.as_str(),
            reply_code = signal.reply_code,
            err = %err,
            "broker channel closed"
        );
        listener.on_shutdown(&signal);
    }

    /// A lost connection takes every channel with it.
    fn connection_lost(&self, err: &lapin::Error) {
        let listeners = std::mem::take(&mut *self.lock());
        let signal = shutdown_signal(err);

        error!(
            event = events::CONNECTION_LOST,
            component = COMPONENT,
            initiator = signal.initiator.as_str(),
            channels = listeners.len(),
            err = %err,
            "broker connection lost"
        );

        for listener in listeners.into_values() {
            listener.on_shutdown(&signal);
        }
    }
}

/// Protocol errors are closes sent by the broker and carry its reply code.
fn shutdown_signal(err: &lapin::Error) -> ShutdownSignal {
    match err {
        lapin::Error::ProtocolError(amqp_error) => ShutdownSignal::new(
            ShutdownInitiator::Broker,
            amqp_error.get_id(),
            amqp_error.get_message().as_str(),
        ),
        _ => ShutdownSignal::new(ShutdownInitiator::Library, 0, err.to_string()),
    }
}

/// Closes a channel whose setup was abandoned before it was handed out.
struct CloseOnDrop(Option<Channel>);

impl CloseOnDrop {
    fn disarm(mut self) {
        self.0 = None;
    }
}

impl Drop for CloseOnDrop {
    fn drop(&mut self) {
        let Some(channel) = self.0.take() else {
            return;
        };
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };
        runtime.spawn(async move {
            if let Err(err) = channel.close(REPLY_SUCCESS, "Goodbye").await {
                debug!(
                    component = COMPONENT,
                    channel_id = channel.id(),
                    err = %err,
                    "unable to close abandoned channel"
                );
            }
        });
    }
}

/// [`BrokerConnection`] backed by a lapin [`Connection`].
pub struct LapinConnection {
    connection: Connection,
    listeners: Arc<ListenerRegistry>,
}

impl LapinConnection {
    /// Opens a connection to the broker described by `options`.
    pub async fn connect(options: &RabbitMqOptions) -> Result<Self, BrokerError> {
        let uri = options
            .amqp_uri()
            .map_err(|err| BrokerError::with_source("invalid broker address", err))?;

        let connection = Connection::connect(uri.as_str(), ConnectionProperties::default())
            .await
            .map_err(|err| {
                error!(
                    event = events::CONNECTION_OPEN_FAILED,
                    component = COMPONENT,
                    host = options.host_name.as_str(),
                    port = options.port,
                    vhost = options.virtual_host.as_str(),
                    err = %err,
                    "unable to connect to broker"
                );
                BrokerError::with_source(
                    format!("unable to connect to {}:{}", options.host_name, options.port),
                    err,
                )
            })?;

        info!(
            event = events::CONNECTION_OPENED,
            component = COMPONENT,
            host = options.host_name.as_str(),
            port = options.port,
            vhost = options.virtual_host.as_str(),
            "connected to broker"
        );
        Ok(Self::from_connection(connection))
    }

    /// Wraps a connection opened elsewhere. Its error handler is taken over.
    pub fn from_connection(connection: Connection) -> Self {
        let listeners = Arc::new(ListenerRegistry::default());
        let registry = listeners.clone();
        connection.on_error(move |err| registry.connection_lost(&err));

        Self {
            connection,
            listeners,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connection.status().connected()
    }

    /// Closes the underlying connection. Channels opened from it become unusable.
    pub async fn close(&self) -> Result<(), BrokerError> {
        self.connection
            .close(REPLY_SUCCESS, "Goodbye")
            .await
            .map_err(|err| BrokerError::with_source("failed to close connection", err))
    }
}

#[async_trait]
impl BrokerConnection for LapinConnection {
    async fn create_channel(&self) -> Result<Arc<dyn BrokerChannel>, BrokerError> {
        let channel = self
            .connection
            .create_channel()
            .await
            .map_err(|err| BrokerError::with_source("failed to open channel", err))?;

        // Dropping this future mid-setup must not leave the channel open.
        let pending = CloseOnDrop(Some(channel.clone()));
        channel
            .confirm_select(ConfirmSelectOptions::default())
            .await
            .map_err(|err| BrokerError::with_source("failed to enable publisher confirms", err))?;
        pending.disarm();

        let channel_id = channel.id();
        let registry = self.listeners.clone();
        channel.on_error(move |err| registry.channel_lost(channel_id, &err));

        Ok(Arc::new(LapinChannel {
            channel,
            listeners: self.listeners.clone(),
        }))
    }
}

/// [`BrokerChannel`] backed by a lapin [`Channel`] in confirm mode.
pub struct LapinChannel {
    channel: Channel,
    listeners: Arc<ListenerRegistry>,
}

#[async_trait]
impl BrokerChannel for LapinChannel {
    fn is_open(&self) -> bool {
        self.channel.status().connected()
    }

    async fn basic_qos(&self, qos: QosSettings) -> Result<(), BrokerError> {
        self.channel
            .basic_qos(qos.prefetch_count, BasicQosOptions { global: qos.global })
            .await
            .map_err(|err| BrokerError::with_source("basic.qos failed", err))
    }

    async fn basic_publish(
        &self,
        exchange: &str,
        routing_key: &str,
        mandatory: bool,
        envelope: &Envelope,
    ) -> Result<PublishConfirm, BrokerError> {
        let options = BasicPublishOptions {
            mandatory,
            ..BasicPublishOptions::default()
        };

        let confirmation = self
            .channel
            .basic_publish(
                exchange,
                routing_key,
                options,
                envelope.payload(),
                properties(envelope),
            )
            .await
            .map_err(|err| BrokerError::with_source("basic.publish failed", err))?
            .await
            .map_err(|err| BrokerError::with_source("publisher confirm failed", err))?;

        match confirmation {
            Confirmation::Ack(None) | Confirmation::NotRequested => Ok(PublishConfirm::Routed),
            Confirmation::Ack(Some(returned)) | Confirmation::Nack(Some(returned)) => {
                Ok(PublishConfirm::Returned {
                    reply_code: returned.reply_code,
                    reply_text: returned.reply_text.as_str().to_string(),
                })
            }
            Confirmation::Nack(None) => Err(BrokerError::new("broker nacked the message")),
        }
    }

    async fn close(&self) -> Result<(), BrokerError> {
        let channel_id = self.channel.id();
        if let Some(listener) = self.listeners.remove(channel_id) {
            listener.on_shutdown(&ShutdownSignal::new(
                ShutdownInitiator::Application,
                REPLY_SUCCESS,
                "Goodbye",
            ));
        }

        if !self.is_open() {
            debug!(component = COMPONENT, channel_id, "channel already closed");
            return Ok(());
        }

        self.channel
            .close(REPLY_SUCCESS, "Goodbye")
            .await
            .map_err(|err| BrokerError::with_source("channel.close failed", err))
    }

    fn on_shutdown(&self, listener: Arc<dyn ShutdownListener>) {
        self.listeners.register(self.channel.id(), listener);
    }
}

fn properties(envelope: &Envelope) -> BasicProperties {
    let properties = BasicProperties::default()
        .with_content_type(ShortString::from(envelope.content_type().to_string()))
        .with_delivery_mode(envelope.delivery_mode())
        .with_message_id(ShortString::from(envelope.message_id().to_string()))
        .with_timestamp(envelope.timestamp_secs())
        .with_kind(ShortString::from(envelope.type_tag().to_string()));

    if envelope.headers().is_empty() {
        properties
    } else {
        properties.with_headers(field_table(envelope.headers()))
    }
}

fn field_table(headers: &Headers) -> FieldTable {
    let mut table = FieldTable::default();
    for (key, value) in headers {
        table.insert(ShortString::from(key.clone()), amqp_value(value));
    }
    table
}

fn amqp_value(value: &HeaderValue) -> AMQPValue {
    match value {
        HeaderValue::Bool(value) => AMQPValue::Boolean(*value),
        HeaderValue::Int(value) => AMQPValue::LongLongInt(*value),
        HeaderValue::Float(value) => AMQPValue::Double(*value),
        HeaderValue::String(value) => AMQPValue::LongString(LongString::from(value.clone())),
        HeaderValue::Bytes(value) => AMQPValue::ByteArray(ByteArray::from(value.clone())),
    }
}

#[cfg(test)]
mod tests {
    use super::{amqp_value, field_table, properties, ListenerRegistry};
    use amqp_publisher::{
        Envelope, HeaderValue, Headers, Payload, ShutdownInitiator, ShutdownListener,
        ShutdownSignal,
    };
    use lapin::protocol::{AMQPError, AMQPErrorKind, AMQPSoftError};
    use lapin::types::{AMQPValue, LongString, ShortString};
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct RecordingListener {
        signals: Mutex<Vec<ShutdownSignal>>,
    }

    impl ShutdownListener for RecordingListener {
        fn on_shutdown(&self, signal: &ShutdownSignal) {
            self.signals.lock().unwrap().push(signal.clone());
        }
    }

    fn not_found() -> lapin::Error {
        lapin::Error::ProtocolError(AMQPError::new(
            AMQPErrorKind::Soft(AMQPSoftError::NOTFOUND),
            ShortString::from("NOT_FOUND - no exchange 'job.events'"),
        ))
    }

    #[test]
    fn broker_channel_close_signals_only_that_channel() {
        let registry = ListenerRegistry::default();
        let first = Arc::new(RecordingListener::default());
        let second = Arc::new(RecordingListener::default());
        registry.register(1, first.clone());
        registry.register(2, second.clone());

        registry.channel_lost(1, &not_found());
        registry.channel_lost(1, &not_found());

        let signals = first.signals.lock().unwrap();
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].initiator, ShutdownInitiator::Broker);
        assert_eq!(signals[0].reply_code, 404);
        assert!(second.signals.lock().unwrap().is_empty());
    }

    #[test]
    fn connection_failure_signals_every_channel_as_library() {
        let registry = ListenerRegistry::default();
        let first = Arc::new(RecordingListener::default());
        let second = Arc::new(RecordingListener::default());
        registry.register(1, first.clone());
        registry.register(2, second.clone());

        registry.connection_lost(&lapin::Error::MissingHeartbeatError);

        for listener in [first, second] {
            let signals = listener.signals.lock().unwrap();
            assert_eq!(signals.len(), 1);
            assert_eq!(signals[0].initiator, ShutdownInitiator::Library);
        }
        assert!(registry.remove(1).is_none());
    }

    #[test]
    fn header_values_map_to_amqp_field_types() {
        assert_eq!(amqp_value(&HeaderValue::Bool(true)), AMQPValue::Boolean(true));
        assert_eq!(amqp_value(&HeaderValue::Int(-3)), AMQPValue::LongLongInt(-3));
        assert_eq!(
            amqp_value(&HeaderValue::from("acme")),
            AMQPValue::LongString(LongString::from("acme".to_string()))
        );
    }

    #[test]
    fn headers_become_field_table_entries() {
        let mut headers = Headers::new();
        headers.insert("tenant".to_string(), HeaderValue::from("acme"));
        headers.insert("attempt".to_string(), HeaderValue::Int(2));

        let table = field_table(&headers);

        assert_eq!(table.inner().len(), 2);
        assert_eq!(
            table.inner().get(&ShortString::from("attempt".to_string())),
            Some(&AMQPValue::LongLongInt(2))
        );
    }

    #[test]
    fn envelope_metadata_maps_to_basic_properties() {
        let envelope = Envelope::builder(Payload::raw(b"{}".to_vec(), "JobCreated")).build();
        let message_id = envelope.message_id().to_string();

        let properties = properties(&envelope);

        assert_eq!(
            properties.content_type().as_ref().map(|value| value.as_str()),
            Some("application/json")
        );
        assert_eq!(*properties.delivery_mode(), Some(2));
        assert_eq!(
            properties.message_id().as_ref().map(|value| value.as_str()),
            Some(message_id.as_str())
        );
        assert_eq!(
            properties.kind().as_ref().map(|value| value.as_str()),
            Some("JobCreated")
        );
        assert_eq!(*properties.timestamp(), Some(envelope.timestamp_secs()));
        assert!(properties.headers().is_none());
    }
}
