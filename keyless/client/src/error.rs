// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use crate::{oauth::OAuthProvider, session_store::SessionField};
use sites_keyless_common::KeylessError;
use thiserror::Error;

/// An error that ends the current login flow. None of these leave a partially
/// trusted session behind: the user has to start the login again.
#[derive(Debug, Error)]
pub enum LoginError {
    #[error("Missing login session data: {0}")]
    MissingSessionData(SessionField),
    #[error("The callback URL does not carry an id_token in its fragment")]
    MissingToken,
    #[error("Invalid callback URL: {0}")]
    InvalidCallbackUrl(String),
    #[error("The identity token nonce does not match the login session nonce")]
    NonceMismatch,
    #[error("The callback belongs to login session {received}, but the active session is {active}")]
    SessionMismatch { active: String, received: String },
    #[error("Failed to query the current epoch: {0}")]
    EpochQueryFailed(String),
    #[error("Salt service responded with status {status}")]
    SaltFetchFailed { status: u16 },
    #[error("Proving service responded with status {status}: {message}")]
    ProofServiceError { status: u16, message: String },
    #[error("Session storage error: {0}")]
    Storage(String),
    #[error("No OAuth client id is configured for {0}")]
    MissingClientId(OAuthProvider),
    #[error("Failed to navigate to the identity provider: {0}")]
    Navigation(String),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error(transparent)]
    Keyless(#[from] KeylessError),
}

/// An error returned when reading objects from the ledger
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Object {0} was not found")]
    NotFound(String),
    #[error("JSON-RPC error {code}: {message}")]
    Rpc { code: String, message: String },
    #[error("Ledger transport error: {0}")]
    Transport(String),
    #[error("Failed to decode the ledger response: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for LedgerError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_decode() {
            LedgerError::Decode(error.to_string())
        } else {
            LedgerError::Transport(error.to_string())
        }
    }
}
