// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use thiserror::Error;

/// Errors raised by the pure zkLogin primitives (no I/O happens in this crate)
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum KeylessError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Invalid ephemeral key: {0}")]
    InvalidKey(String),
    #[error("JWT decoding error: {0}")]
    JwtDecoding(String),
    #[error("Poseidon hashing error: {0}")]
    Poseidon(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
}
