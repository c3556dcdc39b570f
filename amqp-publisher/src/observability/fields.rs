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

//! Canonical structured field keys and value-format helpers.

use crate::envelope::{Destination, Envelope};

pub const EVENT: &str = "event";
pub const COMPONENT: &str = "component";
pub const GENERATION: &str = "generation";
pub const PREVIOUS_GENERATION: &str = "previous_generation";

pub const MSG_ID: &str = "msg_id";
pub const MSG_TYPE: &str = "msg_type";
pub const EXCHANGE: &str = "exchange";
pub const ROUTING_KEY: &str = "routing_key";

pub const INITIATOR: &str = "initiator";
pub const REPLY_CODE: &str = "reply_code";
pub const REPLY_TEXT: &str = "reply_text";
pub const REASON: &str = "reason";
pub const ERR: &str = "err";

pub const NONE: &str = "none";
pub const DEFAULT_EXCHANGE_LABEL: &str = "(default)";
pub const REASON_STALE: &str = "stale";
pub const REASON_DISPOSED: &str = "disposed";
pub const REASON_CANCELLED: &str = "cancelled";

/// The AMQP default exchange is the empty string; give it a readable label.
pub fn format_exchange(exchange: &str) -> &str {
    if exchange.is_empty() {
        DEFAULT_EXCHANGE_LABEL
    } else {
        exchange
    }
}

pub fn format_destination(destination: &Destination) -> String {
    format!(
        "{}/{}",
        format_exchange(&destination.exchange),
        destination.routing_key
    )
}

pub fn format_message_id(envelope: &Envelope) -> String {
    envelope.message_id().hyphenated().to_string()
}

pub fn format_message_type(envelope: &Envelope) -> &str {
    let type_tag = envelope.type_tag();
    if type_tag.is_empty() {
        NONE
    } else {
        type_tag
    }
}
