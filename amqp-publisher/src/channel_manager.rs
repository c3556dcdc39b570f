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

//! Lazily created, lazily recovered channel shared by all publish calls.
//!
//! State machine: `Absent -> Open` on first create, `Open -> Stale` on an unexpected
//! shutdown signal, `Stale -> Open` on the next [`ChannelManager::acquire`], and
//! `Open | Stale -> Disposed` on [`ChannelManager::dispose`].
//!
//! Readers check the cached channel without taking the exclusive section. All
//! mutation of the cached channel happens while holding it.

use crate::connection::{
    BrokerChannel, BrokerConnection, BrokerError, QosSettings, ShutdownListener, ShutdownSignal,
};
use crate::error::PublishError;
use crate::observability::{events, fields};
use arc_swap::ArcSwapOption;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const COMPONENT: &str = "channel_manager";

/// Observable lifecycle state of a [`ChannelManager`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ChannelState {
    Absent,
    Open,
    Stale,
    Disposed,
}

/// One generation of the shared channel.
///
/// Once marked stale it is never handed out again; holders must re-acquire.
pub struct ManagedChannel {
    generation: u64,
    channel: Arc<dyn BrokerChannel>,
    stale: Arc<AtomicBool>,
}

impl ManagedChannel {
    /// Monotonic per-manager counter; distinct for every (re)created channel.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn channel(&self) -> &Arc<dyn BrokerChannel> {
        &self.channel
    }

    pub fn is_usable(&self) -> bool {
        !self.stale.load(Ordering::Acquire) && self.channel.is_open()
    }

    fn mark_stale(&self) {
        self.stale.store(true, Ordering::Release);
    }
}

/// Shutdown callback installed on every channel. It only flips the stale flag.
struct StaleOnShutdown {
    generation: u64,
    stale: Arc<AtomicBool>,
}

impl ShutdownListener for StaleOnShutdown {
    fn on_shutdown(&self, signal: &ShutdownSignal) {
        if !signal.initiator.is_unexpected() {
            debug!(
                event = events::CHANNEL_SHUTDOWN_EXPECTED,
                component = COMPONENT,
                generation = self.generation,
                reply_code = signal.reply_code,
                "channel closed by application"
            );
            return;
        }

        self.stale.store(true, Ordering::Release);
        warn!(
            event = events::CHANNEL_SHUTDOWN_DETECTED,
            component = COMPONENT,
            generation = self.generation,
            initiator = signal.initiator.as_str(),
            reply_code = signal.reply_code,
            reply_text = signal.reply_text.as_str(),
            "channel shutdown detected; recreating on next use"
        );
    }
}

enum OpenFailure {
    Cancelled,
    Broker(BrokerError),
}

struct Lifecycle {
    next_generation: u64,
    disposed: bool,
}

/// Owns the single channel multiplexed over a shared [`BrokerConnection`].
pub struct ChannelManager {
    connection: Arc<dyn BrokerConnection>,
    qos: QosSettings,
    current: ArcSwapOption<ManagedChannel>,
    // Exclusive section guarding create/replace/dispose.
    lifecycle: Mutex<Lifecycle>,
    disposed: AtomicBool,
}

impl ChannelManager {
    pub fn new(connection: Arc<dyn BrokerConnection>, qos: QosSettings) -> Self {
        Self {
            connection,
            qos,
            current: ArcSwapOption::empty(),
            lifecycle: Mutex::new(Lifecycle {
                next_generation: 1,
                disposed: false,
            }),
            disposed: AtomicBool::new(false),
        }
    }

    pub fn state(&self) -> ChannelState {
        if self.disposed.load(Ordering::Acquire) {
            return ChannelState::Disposed;
        }
        match &*self.current.load() {
            None => ChannelState::Absent,
            Some(current) if current.is_usable() => ChannelState::Open,
            Some(_) => ChannelState::Stale,
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Returns an open channel, creating or replacing it when needed.
    ///
    /// Concurrent callers that find no usable channel queue on the exclusive
    /// section; exactly one of them creates the channel and the rest reuse it.
    ///
    /// Cancel through `cancel` rather than by dropping the returned future: only
    /// the token path closes a half-configured channel.
    pub async fn acquire(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Arc<ManagedChannel>, PublishError> {
        if cancel.is_cancelled() {
            return Err(PublishError::OperationCancelled);
        }
        if self.is_disposed() {
            return Err(disposed_error());
        }

        if let Some(current) = self.current.load_full() {
            if current.is_usable() {
                return Ok(current);
            }
        }

        let mut lifecycle = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(PublishError::OperationCancelled),
            guard = self.lifecycle.lock() => guard,
        };

        if lifecycle.disposed {
            return Err(disposed_error());
        }

        let previous = self.current.load_full();
        if let Some(current) = previous.as_ref() {
            if current.is_usable() {
                return Ok(current.clone());
            }
        }

        // Stale channels are replaced, never repaired.
        let previous_generation = match previous {
            Some(stale) => {
                stale.mark_stale();
                self.current.store(None);
                let generation = stale.generation;
                release_channel(&stale, fields::REASON_STALE).await;
                Some(generation)
            }
            None => None,
        };

        let generation = lifecycle.next_generation;
        lifecycle.next_generation += 1;

        debug!(
            event = events::CHANNEL_CREATE_START,
            component = COMPONENT,
            generation,
            "opening broker channel"
        );

        match self.open_channel(generation, cancel).await {
            Ok(managed) => {
                let managed = Arc::new(managed);
                self.current.store(Some(managed.clone()));
                match previous_generation {
                    Some(previous_generation) => info!(
                        event = events::CHANNEL_RECREATED,
                        component = COMPONENT,
                        generation,
                        previous_generation,
                        "broker channel recreated"
                    ),
                    None => info!(
                        event = events::CHANNEL_CREATED,
                        component = COMPONENT,
                        generation,
                        "broker channel created"
                    ),
                }
                Ok(managed)
            }
            Err(OpenFailure::Cancelled) => {
                debug!(
                    event = events::CHANNEL_CREATE_CANCELLED,
                    component = COMPONENT,
                    generation,
                    "channel creation cancelled"
                );
                Err(PublishError::OperationCancelled)
            }
            Err(OpenFailure::Broker(err)) => {
                if previous_generation.is_some() {
                    error!(
                        event = events::CHANNEL_RECOVERY_FAILED,
                        component = COMPONENT,
                        generation,
                        err = %err,
                        "failed to recover broker channel"
                    );
                } else {
                    error!(
                        event = events::CHANNEL_CREATE_FAILED,
                        component = COMPONENT,
                        generation,
                        err = %err,
                        "failed to create broker channel"
                    );
                }
                Err(PublishError::ChannelUnavailable { source: err })
            }
        }
    }

    /// Creates and configures one channel. A channel that was already created
    /// when `cancel` fires is closed before returning, so nothing is left open
    /// on the broker untracked.
    async fn open_channel(
        &self,
        generation: u64,
        cancel: &CancellationToken,
    ) -> Result<ManagedChannel, OpenFailure> {
        let created = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(OpenFailure::Cancelled),
            created = self.connection.create_channel() => created,
        };
        let channel = created.map_err(OpenFailure::Broker)?;
        let stale = Arc::new(AtomicBool::new(false));

        channel.on_shutdown(Arc::new(StaleOnShutdown {
            generation,
            stale: stale.clone(),
        }));

        let managed = ManagedChannel {
            generation,
            channel,
            stale,
        };

        let configured = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(OpenFailure::Cancelled),
            configured = managed.channel.basic_qos(self.qos) => {
                configured.map_err(OpenFailure::Broker)
            }
        };

        if let Err(failure) = configured {
            let reason = match &failure {
                OpenFailure::Cancelled => fields::REASON_CANCELLED,
                OpenFailure::Broker(_) => fields::REASON_STALE,
            };
            managed.mark_stale();
            release_channel(&managed, reason).await;
            return Err(failure);
        }

        Ok(managed)
    }

    /// Releases the current channel. Idempotent; close failures are only logged.
    pub async fn dispose(&self) {
        let mut lifecycle = self.lifecycle.lock().await;
        if lifecycle.disposed {
            return;
        }
        lifecycle.disposed = true;
        self.disposed.store(true, Ordering::Release);

        if let Some(current) = self.current.swap(None) {
            current.mark_stale();
            release_channel(&current, fields::REASON_DISPOSED).await;
        }

        info!(
            event = events::CHANNEL_MANAGER_DISPOSED,
            component = COMPONENT,
            "channel manager disposed"
        );
    }
}

fn disposed_error() -> PublishError {
    PublishError::ChannelUnavailable {
        source: BrokerError::new("channel manager has been disposed"),
    }
}

async fn release_channel(managed: &ManagedChannel, reason: &'static str) {
    if !managed.channel.is_open() {
        return;
    }
    if let Err(err) = managed.channel.close().await {
        warn!(
            event = events::CHANNEL_CLOSE_FAILED,
            component = COMPONENT,
            generation = managed.generation,
            reason,
            err = %err,
            "failed to close broker channel"
        );
    }
}
