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

//! Message envelope construction.
//!
//! ```
//! use amqp_publisher::{Envelope, HeaderValue, Payload};
//!
//! let envelope = Envelope::builder(Payload::raw(br#"{"id":"42"}"#.to_vec(), "JobCreated"))
//!     .header("tenant", HeaderValue::from("acme"))
//!     .build();
//!
//! assert_eq!(envelope.type_tag(), "JobCreated");
//! assert_eq!(envelope.content_type(), "application/json");
//! assert!(envelope.persistent());
//! ```

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use uuid::Uuid;

pub const DEFAULT_CONTENT_TYPE: &str = "application/json";

/// Exchange and routing key of one publish.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct Destination {
    pub exchange: String,
    pub routing_key: String,
}

impl Destination {
    pub fn new(exchange: impl Into<String>, routing_key: impl Into<String>) -> Self {
        Self {
            exchange: exchange.into(),
            routing_key: routing_key.into(),
        }
    }
}

/// Application header value carried in the envelope.
#[derive(Clone, Debug, PartialEq)]
pub enum HeaderValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Bytes(Vec<u8>),
}

impl From<bool> for HeaderValue {
    fn from(value: bool) -> Self {
        HeaderValue::Bool(value)
    }
}

impl From<i64> for HeaderValue {
    fn from(value: i64) -> Self {
        HeaderValue::Int(value)
    }
}

impl From<f64> for HeaderValue {
    fn from(value: f64) -> Self {
        HeaderValue::Float(value)
    }
}

impl From<&str> for HeaderValue {
    fn from(value: &str) -> Self {
        HeaderValue::String(value.to_string())
    }
}

impl From<String> for HeaderValue {
    fn from(value: String) -> Self {
        HeaderValue::String(value)
    }
}

impl From<Vec<u8>> for HeaderValue {
    fn from(value: Vec<u8>) -> Self {
        HeaderValue::Bytes(value)
    }
}

pub type Headers = BTreeMap<String, HeaderValue>;

/// Pre-serialized message body plus the name of the type it was produced from.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Payload {
    bytes: Vec<u8>,
    type_name: String,
}

impl Payload {
    pub fn raw(bytes: Vec<u8>, type_name: impl Into<String>) -> Self {
        Self {
            bytes,
            type_name: type_name.into(),
        }
    }

    /// Serializes `value` with `serde_json`; field naming follows the type's serde attributes.
    pub fn json<T: Serialize + ?Sized>(value: &T) -> Result<Self, serde_json::Error> {
        Ok(Self {
            bytes: serde_json::to_vec(value)?,
            type_name: short_type_name::<T>().to_string(),
        })
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }
}

/// `my_crate::jobs::JobCreated<T>` -> `JobCreated`.
pub(crate) fn short_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    let without_generics = full.split('<').next().unwrap_or(full);
    without_generics
        .rsplit("::")
        .next()
        .unwrap_or(without_generics)
}

/// Immutable metadata envelope for exactly one publish call.
#[derive(Clone, Debug, PartialEq)]
pub struct Envelope {
    payload: Vec<u8>,
    content_type: String,
    persistent: bool,
    message_id: Uuid,
    timestamp: DateTime<Utc>,
    type_tag: String,
    headers: Headers,
}

impl Envelope {
    pub fn builder(payload: Payload) -> EnvelopeBuilder {
        EnvelopeBuilder::new(payload)
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn persistent(&self) -> bool {
        self.persistent
    }

    /// AMQP delivery mode: 2 for persistent, 1 for transient.
    pub fn delivery_mode(&self) -> u8 {
        if self.persistent {
            2
        } else {
            1
        }
    }

    pub fn message_id(&self) -> Uuid {
        self.message_id
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// AMQP timestamps carry whole seconds since the Unix epoch.
    pub fn timestamp_secs(&self) -> u64 {
        u64::try_from(self.timestamp.timestamp()).unwrap_or_default()
    }

    pub fn type_tag(&self) -> &str {
        &self.type_tag
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }
}

/// Builds an [`Envelope`]. Pure: no I/O and no shared state.
#[derive(Clone, Debug)]
pub struct EnvelopeBuilder {
    payload: Payload,
    content_type: String,
    persistent: bool,
    type_tag: Option<String>,
    headers: Headers,
}

impl EnvelopeBuilder {
    pub fn new(payload: Payload) -> Self {
        Self {
            payload,
            content_type: DEFAULT_CONTENT_TYPE.to_string(),
            persistent: true,
            type_tag: None,
            headers: Headers::new(),
        }
    }

    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }

    pub fn persistent(mut self, persistent: bool) -> Self {
        self.persistent = persistent;
        self
    }

    /// Overrides the type tag; `None` keeps the payload's declared type name.
    pub fn type_tag(mut self, type_tag: Option<String>) -> Self {
        self.type_tag = type_tag;
        self
    }

    pub fn headers(mut self, headers: Option<Headers>) -> Self {
        self.headers = headers.unwrap_or_default();
        self
    }

    pub fn header(mut self, key: impl Into<String>, value: HeaderValue) -> Self {
        self.headers.insert(key.into(), value);
        self
    }

    /// Stamps a fresh message id and the current time.
    pub fn build(self) -> Envelope {
        self.build_with(Uuid::new_v4(), Utc::now())
    }

    pub(crate) fn build_with(self, message_id: Uuid, timestamp: DateTime<Utc>) -> Envelope {
        let Payload { bytes, type_name } = self.payload;

        Envelope {
            payload: bytes,
            content_type: self.content_type,
            persistent: self.persistent,
            message_id,
            timestamp,
            type_tag: self.type_tag.unwrap_or(type_name),
            headers: self.headers,
        }
    }
}
