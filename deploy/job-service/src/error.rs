// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A job service error (e.g., for bad API requests, failed job runs, etc.)
#[derive(Clone, Debug, Deserialize, Error, PartialEq, Eq, Serialize)]
pub enum JobServiceError {
    #[error("Bad request error: {0}")]
    BadRequest(String),
    #[error("Internal service error: {0}")]
    InternalError(String),
    #[error("Unexpected error: {0}")]
    UnexpectedError(String),
}

impl From<reqwest::Error> for JobServiceError {
    fn from(error: reqwest::Error) -> Self {
        JobServiceError::InternalError(error.to_string())
    }
}
