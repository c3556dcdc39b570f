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

use crate::connection::QosSettings;
use crate::envelope::DEFAULT_CONTENT_TYPE;
use serde::{Deserialize, Serialize};

/// Per-publisher settings applied to every channel and every envelope.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields, default)]
pub struct PublisherConfig {
    pub prefetch_count: u16,
    pub prefetch_global: bool,
    pub content_type: String,
    pub persistent: bool,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            prefetch_count: 1,
            prefetch_global: false,
            content_type: DEFAULT_CONTENT_TYPE.to_string(),
            persistent: true,
        }
    }
}

impl PublisherConfig {
    pub fn qos(&self) -> QosSettings {
        QosSettings {
            prefetch_count: self.prefetch_count,
            global: self.prefetch_global,
        }
    }
}
