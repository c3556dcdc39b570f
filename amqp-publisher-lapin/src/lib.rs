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

//! [`lapin`] adapter for `amqp-publisher`.
//!
//! [`LapinConnection`] implements [`amqp_publisher::BrokerConnection`] on top of
//! one lapin connection. Channels it opens are put in publisher-confirm mode so
//! mandatory returns and broker nacks are reported per publish.

mod config;
pub use config::{ConfigError, RabbitMqOptions, DEFAULT_AMQP_PORT};

mod transport;
pub use transport::{LapinChannel, LapinConnection};
