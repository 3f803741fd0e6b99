// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use crate::error::KeylessError;
use jsonwebtoken::{DecodingKey, Validation};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{collections::BTreeMap, ops::Deref};

/// The `aud` claim, which providers emit either as a string or as an array
#[derive(Clone, Debug, Deserialize, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Audience {
    Single(String),
    Multiple(Vec<String>),
}

impl Audience {
    /// Returns the single audience value. Tokens issued for several
    /// audiences cannot be bound to one address.
    pub fn single(&self) -> Result<&str, KeylessError> {
        match self {
            Audience::Single(aud) => Ok(aud),
            Audience::Multiple(auds) if auds.len() == 1 => Ok(&auds[0]),
            Audience::Multiple(auds) => Err(KeylessError::JwtDecoding(format!(
                "expected a single 'aud' value, found {}",
                auds.len()
            ))),
        }
    }
}

/// The claims the zkLogin flow needs from an identity token
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Claims {
    pub iss: String,
    pub sub: String,
    pub aud: Audience,
    pub nonce: String,
    pub exp: Option<u64>,
    pub iat: Option<u64>,
    #[serde(flatten)]
    pub additional_claims: BTreeMap<String, Value>,
}

/// An identity token issued by an OpenID provider. It is untrusted until its
/// nonce has been matched against the login session that requested it.
#[derive(Clone, Debug)]
pub struct IdentityToken {
    raw: String,
    claims: Claims,
}

impl IdentityToken {
    /// Decodes the token's claims without verifying the provider signature
    pub fn decode(jwt: &str) -> Result<Self, KeylessError> {
        let token_data = jsonwebtoken::decode::<Claims>(
            jwt,
            DUMMY_DECODING_KEY.deref(),
            VALIDATION_CONFIG_NO_SIG_VRFY.deref(),
        )
        .map_err(|error| KeylessError::JwtDecoding(error.to_string()))?;

        Ok(Self {
            raw: jwt.to_owned(),
            claims: token_data.claims,
        })
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn claims(&self) -> &Claims {
        &self.claims
    }

    pub fn iss(&self) -> &str {
        &self.claims.iss
    }

    pub fn sub(&self) -> &str {
        &self.claims.sub
    }

    pub fn aud(&self) -> Result<&str, KeylessError> {
        self.claims.aud.single()
    }

    pub fn nonce(&self) -> &str {
        &self.claims.nonce
    }
}

static DUMMY_DECODING_KEY: Lazy<DecodingKey> = Lazy::new(|| DecodingKey::from_secret(&[]));

static VALIDATION_CONFIG_NO_SIG_VRFY: Lazy<Validation> = Lazy::new(|| {
    let mut config = Validation::default();
    config.insecure_disable_signature_validation();
    config.validate_exp = false;
    config.required_spec_claims.clear();
    config
});
