// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

//! Waits for on-chain object metadata to reflect a previously submitted
//! mutation.

use crate::{
    error::LedgerError,
    ledger::{LedgerClient, ObjectMetadata},
};
use sites_keyless_common::PollingConfig;
use std::sync::Arc;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// The metadata key holding a site's assigned id
pub const SITE_ID_KEY: &str = "site_id";

/// The metadata key holding a site's serialized member list
pub const MEMBER_KEY: &str = "member";

/// Why a poll sequence ended
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PollOutcome {
    /// The predicate held for a fetched state
    Matched,
    /// The object does not exist (or no longer exists)
    NotFound,
    /// The timeout elapsed before the predicate held
    TimedOut,
    /// Every attempt was spent without the predicate holding
    AttemptsExhausted,
    /// The caller cancelled the wait
    Cancelled,
}

impl PollOutcome {
    pub fn is_matched(&self) -> bool {
        matches!(self, PollOutcome::Matched)
    }
}

/// Polls a ledger object until a predicate over its metadata holds
pub struct StatePoller<L: ?Sized = dyn LedgerClient> {
    ledger: Arc<L>,
}

impl<L: LedgerClient + ?Sized> StatePoller<L> {
    pub fn new(ledger: Arc<L>) -> Self {
        Self { ledger }
    }

    /// Returns true once the predicate holds, and false on timeout, attempt
    /// exhaustion or when the object does not exist
    pub async fn wait_for_state_update<P>(
        &self,
        object_id: &str,
        predicate: P,
        config: &PollingConfig,
    ) -> bool
    where
        P: Fn(&ObjectMetadata) -> bool,
    {
        self.wait_for_state_update_with_cancel(
            object_id,
            predicate,
            config,
            &CancellationToken::new(),
        )
        .await
        .is_matched()
    }

    /// Like `wait_for_state_update`, but reports why polling stopped and
    /// stops early once `cancel` fires
    pub async fn wait_for_state_update_with_cancel<P>(
        &self,
        object_id: &str,
        predicate: P,
        config: &PollingConfig,
        cancel: &CancellationToken,
    ) -> PollOutcome
    where
        P: Fn(&ObjectMetadata) -> bool,
    {
        let start_time = Instant::now();
        let mut attempts = 0;

        while attempts < config.max_attempts() {
            // Checked before every fetch, so one slow fetch can end the wait
            if start_time.elapsed() > config.timeout() {
                info!(
                    object_id = object_id,
                    attempts = attempts,
                    "Timed out waiting for the object state"
                );
                return PollOutcome::TimedOut;
            }

            let fetch_result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return cancelled(object_id, attempts),
                result = self.ledger.get_object(object_id) => result,
            };

            match fetch_result {
                Ok(metadata) if predicate(&metadata) => {
                    info!(
                        object_id = object_id,
                        attempt = attempts + 1,
                        "Object reached the expected state"
                    );
                    return PollOutcome::Matched;
                },
                Ok(_) => {
                    debug!(
                        object_id = object_id,
                        attempt = attempts + 1,
                        "Object has not reached the expected state yet"
                    );
                },
                Err(LedgerError::NotFound(_)) => {
                    info!(object_id = object_id, "Object was not found, stop polling");
                    return PollOutcome::NotFound;
                },
                Err(error) => {
                    warn!(
                        object_id = object_id,
                        attempt = attempts + 1,
                        "Failed to fetch the object state: {}",
                        error
                    );
                },
            }

            attempts += 1;
            if attempts < config.max_attempts() {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return cancelled(object_id, attempts),
                    _ = sleep(config.poll_interval()) => {},
                }
            }
        }

        info!(
            object_id = object_id,
            attempts = attempts,
            "Gave up waiting for the object state"
        );
        PollOutcome::AttemptsExhausted
    }

    /// Waits until the member list of the object equals `member_string`
    pub async fn handle_member_state_update(
        &self,
        object_id: &str,
        member_string: &str,
        config: Option<&PollingConfig>,
    ) -> bool {
        let config = config.unwrap_or(&PollingConfig::QUICK);
        self.wait_for_state_update(object_id, member_state_matches(member_string), config)
            .await
    }

    /// Waits until the object has been assigned a site id
    pub async fn handle_site_state_update(
        &self,
        object_id: &str,
        config: Option<&PollingConfig>,
    ) -> bool {
        let config = config.unwrap_or(&PollingConfig::QUICK);
        self.wait_for_state_update(object_id, site_id_assigned(), config)
            .await
    }

    /// Waits until the object has been deleted
    pub async fn handle_deletion_state_update(
        &self,
        object_id: &str,
        config: Option<&PollingConfig>,
    ) -> bool {
        let config = config.unwrap_or(&PollingConfig::QUICK);
        let outcome = self
            .wait_for_state_update_with_cancel(
                object_id,
                |_| false,
                config,
                &CancellationToken::new(),
            )
            .await;
        outcome == PollOutcome::NotFound
    }
}

fn cancelled(object_id: &str, attempts: u32) -> PollOutcome {
    info!(object_id = object_id, attempts = attempts, "Polling was cancelled");
    PollOutcome::Cancelled
}

/// Holds once the object carries a non-empty site id
pub fn site_id_assigned() -> impl Fn(&ObjectMetadata) -> bool {
    |metadata| {
        metadata
            .metadata_value(SITE_ID_KEY)
            .is_some_and(|site_id| !site_id.is_empty())
    }
}

/// Holds once the member list equals `expected`. A missing member entry
/// counts as an empty list.
pub fn member_state_matches(expected: &str) -> impl Fn(&ObjectMetadata) -> bool + '_ {
    move |metadata| metadata.metadata_value(MEMBER_KEY).unwrap_or_default() == expected
}

/// Holds once the metadata entry `key` equals `value`
pub fn metadata_value_equals<'a>(
    key: &'a str,
    value: &'a str,
) -> impl Fn(&ObjectMetadata) -> bool + 'a {
    move |metadata| metadata.metadata_value(key).as_deref() == Some(value)
}
