// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use crate::{
    error::LedgerError,
    ledger::{LedgerClient, ObjectMetadata},
};
use async_trait::async_trait;
use serde_json::json;
use std::{
    sync::atomic::{AtomicU32, Ordering},
    time::Duration,
};

type Responder = Box<dyn Fn(u32) -> Result<ObjectMetadata, LedgerError> + Send + Sync>;

/// A ledger that answers object fetches from a closure (given the zero-based
/// call number) and counts how often it was asked
pub struct ScriptedLedger {
    epoch: u64,
    fetch_delay: Duration,
    fetches: AtomicU32,
    responder: Responder,
}

impl ScriptedLedger {
    pub fn new(
        responder: impl Fn(u32) -> Result<ObjectMetadata, LedgerError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            epoch: 10,
            fetch_delay: Duration::ZERO,
            fetches: AtomicU32::new(0),
            responder: Box::new(responder),
        }
    }

    pub fn with_fetch_delay(mut self, fetch_delay: Duration) -> Self {
        self.fetch_delay = fetch_delay;
        self
    }

    pub fn fetch_count(&self) -> u32 {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LedgerClient for ScriptedLedger {
    async fn current_epoch(&self) -> Result<u64, LedgerError> {
        Ok(self.epoch)
    }

    async fn get_object(&self, _object_id: &str) -> Result<ObjectMetadata, LedgerError> {
        let call = self.fetches.fetch_add(1, Ordering::SeqCst);
        if !self.fetch_delay.is_zero() {
            tokio::time::sleep(self.fetch_delay).await;
        }
        (self.responder)(call)
    }
}

/// Builds a site object whose metadata holds the given entries
pub fn site_object(object_id: &str, entries: &[(&str, &str)]) -> ObjectMetadata {
    let contents: Vec<_> = entries
        .iter()
        .map(|(key, value)| json!({ "fields": { "key": key, "value": value } }))
        .collect();
    serde_json::from_value(json!({
        "objectId": object_id,
        "version": "1",
        "content": {
            "dataType": "moveObject",
            "type": "0x2::dynamic_field::Field",
            "fields": {
                "value": { "fields": { "metadata": { "fields": { "contents": contents } } } }
            }
        }
    }))
    .unwrap()
}
