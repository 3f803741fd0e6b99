// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use crate::error::LoginError;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sites_keyless_common::KeylessError;
use tracing::{info, warn};
use url::Url;

const SALT_PATH: &str = "salt";

#[derive(Debug, Serialize)]
struct SaltRequest<'a> {
    iss: &'a str,
    sub: &'a str,
}

#[derive(Debug, Deserialize)]
struct SaltResponse {
    salt: Value,
}

/// Fetches the per-identity salt from the trusted salt service
#[derive(Clone, Debug)]
pub struct SaltClient {
    client: Client,
    salt_url: Url,
}

impl SaltClient {
    pub fn new(client: Client, salt_service_url: &Url) -> Result<Self, LoginError> {
        Ok(Self {
            client,
            salt_url: join_path(salt_service_url, SALT_PATH)?,
        })
    }

    pub fn salt_url(&self) -> &Url {
        &self.salt_url
    }

    /// Returns the salt for the given identity as a decimal string. The salt
    /// is never logged.
    pub async fn fetch_salt(&self, iss: &str, sub: &str) -> Result<String, LoginError> {
        let response = self
            .client
            .post(self.salt_url.clone())
            .json(&SaltRequest { iss, sub })
            .send()
            .await
            .map_err(|error| {
                warn!(iss = iss, "Salt request failed: {}", error);
                LoginError::Http(error)
            })?;

        let status = response.status();
        if !status.is_success() {
            warn!(iss = iss, status = status.as_u16(), "Salt service rejected the request");
            return Err(LoginError::SaltFetchFailed {
                status: status.as_u16(),
            });
        }

        let response: SaltResponse = response.json().await?;
        let salt = match response.salt {
            Value::String(salt) => salt,
            // Larger numbers lose precision when parsed, so they must be sent as strings
            Value::Number(salt) => match salt.as_u64() {
                Some(salt) => salt.to_string(),
                None => {
                    warn!(iss = iss, "Salt service returned a salt that is not a u64 number");
                    return Err(KeylessError::InvalidInput(
                        "numeric salts must fit in a u64, larger salts must be decimal strings".into(),
                    )
                    .into());
                },
            },
            _ => {
                warn!(iss = iss, "Salt service returned a malformed salt");
                return Err(KeylessError::InvalidInput("salt must be a decimal string".into()).into());
            },
        };
        info!(iss = iss, "Fetched salt for identity");
        Ok(salt)
    }
}

/// Appends a path segment to a base URL, keeping any existing path
pub(crate) fn join_path(base: &Url, segment: &str) -> Result<Url, LoginError> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| KeylessError::InvalidInput(format!("{} cannot be a base URL", base)))?
        .pop_if_empty()
        .push(segment);
    Ok(url)
}
