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

mod args;

use crate::args::PublisherArgs;
use amqp_publisher::{
    BrokerConnection, Destination, EventPublisher, HeaderValue, Headers, JobEventPublisher,
    PublishOptions, PublishReceipt,
};
use amqp_publisher_lapin::{LapinConnection, RabbitMqOptions};
use clap::Parser;
use std::error::Error;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let _ = tracing_subscriber::fmt::try_init();

    let args = PublisherArgs::parse();
    let options = RabbitMqOptions::load(&args.config)?;
    let payload: serde_json::Value = serde_json::from_str(&args.payload)?;

    info!("Started configurable-publisher against {options:?}");

    let destination = Destination::new(
        args.exchange
            .clone()
            .unwrap_or_else(|| options.job_events_exchange.clone()),
        args.routing_key
            .clone()
            .unwrap_or_else(|| options.job_created_queue.clone()),
    );

    let connection = Arc::new(LapinConnection::connect(&options).await?);
    let broker: Arc<dyn BrokerConnection> = connection.clone();
    let publisher = Arc::new(EventPublisher::with_config(broker, options.publisher.clone()));

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted; cancelling publish");
            on_interrupt.cancel();
        }
    });

    let published: Result<PublishReceipt, _> = if args.job_created {
        JobEventPublisher::with_destination(publisher.clone(), destination)
            .publish_job_created(&payload, &cancel)
            .await
    } else {
        let publish_options = PublishOptions::default()
            .with_type_tag(args.message_type())
            .with_headers(headers(&args));
        publisher
            .publish_json(
                &destination.exchange,
                &destination.routing_key,
                &payload,
                publish_options,
                &cancel,
            )
            .await
    };

    publisher.dispose().await;
    if let Err(err) = connection.close().await {
        warn!("unable to close broker connection: {err}");
    }

    let receipt = published?;
    info!(
        "published message {} on channel generation {}",
        receipt.message_id, receipt.channel_generation
    );
    Ok(())
}

fn headers(args: &PublisherArgs) -> Headers {
    args.headers
        .iter()
        .map(|(key, value)| (key.clone(), HeaderValue::from(value.as_str())))
        .collect()
}
