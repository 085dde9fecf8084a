// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Event Bus / Publisher (L4, §6): typed pub/sub for update progress,
//! chain lifecycle, and health changes. Publish failures are always
//! non-fatal (§7 Propagation) — nothing downstream of a `publish` call
//! should ever fail because nobody happened to be listening.

use nnc_core::Event;
use tokio::sync::broadcast;

const DEFAULT_CAPACITY: usize = 256;

/// A cloneable handle onto a broadcast channel of [`Event`]s. Every
/// engine component that emits events (Update Engine, PBR Engine,
/// Chain Router, Chain Kill-Switch, Chain Latency Measurer) takes a
/// `EventBus` by value — cloning just clones the sender handle.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<Event>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    /// Publish an event. No receivers (or a lagging one) is logged at
    /// warning level and otherwise ignored — publish never surfaces an
    /// error to the caller.
    pub fn publish(&self, event: Event) {
        if let Err(err) = self.tx.send(event) {
            tracing::warn!(event = %err.0.name(), "event bus had no subscribers");
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "bus_tests.rs"]
mod tests;
