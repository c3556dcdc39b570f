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

use tokio::sync::watch;

/// A latch that test code closes to park fake broker calls and opens to let them finish.
pub struct Gate {
    held: watch::Sender<bool>,
}

impl Default for Gate {
    fn default() -> Self {
        Self::new()
    }
}

impl Gate {
    /// Creates an open gate.
    pub fn new() -> Self {
        let (held, _) = watch::channel(false);
        Self { held }
    }

    pub fn hold(&self) {
        self.held.send_replace(true);
    }

    pub fn release(&self) {
        self.held.send_replace(false);
    }

    pub fn is_held(&self) -> bool {
        *self.held.borrow()
    }

    /// Waits until the gate is open.
    pub async fn pass(&self) {
        let mut rx = self.held.subscribe();
        loop {
            let held = *rx.borrow_and_update();
            if !held {
                return;
            }
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}
