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

use clap::Parser;
use std::path::PathBuf;

pub(crate) const DEFAULT_MESSAGE_TYPE: &str = "JsonMessage";

/// Publish one JSON event to a RabbitMQ exchange.
#[derive(Parser, Debug)]
#[command(version)]
pub(crate) struct PublisherArgs {
    /// JSON5 broker configuration.
    #[arg(short, long, value_name = "FILE")]
    pub(crate) config: PathBuf,

    /// Target exchange; defaults to `job_events_exchange` from the config.
    #[arg(short, long)]
    pub(crate) exchange: Option<String>,

    /// Routing key; defaults to `job_created_queue` from the config.
    #[arg(short, long)]
    pub(crate) routing_key: Option<String>,

    /// Type tag stamped on the message; defaults to `JsonMessage`.
    #[arg(short = 't', long)]
    pub(crate) message_type: Option<String>,

    /// Application header, repeatable.
    #[arg(long = "header", value_name = "KEY=VALUE", value_parser = parse_header)]
    pub(crate) headers: Vec<(String, String)>,

    /// Wrap the payload in a "job created" event document.
    #[arg(long, conflicts_with_all = ["message_type", "headers"])]
    pub(crate) job_created: bool,

    /// Message body as JSON.
    pub(crate) payload: String,
}

impl PublisherArgs {
    pub(crate) fn message_type(&self) -> &str {
        self.message_type.as_deref().unwrap_or(DEFAULT_MESSAGE_TYPE)
    }
}

fn parse_header(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected KEY=VALUE, got `{raw}`")),
    }
}
