// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use crate::{
    error::LoginError,
    prover_client::{ProofRequest, ProofRequester},
    salt_client::SaltClient,
    session_store::{EphemeralKeyStore, LoginSession, SessionStorage},
};
use sites_keyless_common::{
    address::{address_seed_for_token, derive_address},
    assemble, CompositeSignature, EphemeralKeyPair, IdentityToken, ProofMaterial,
};
use std::{fmt, sync::Arc};
use tracing::{error, info};
use url::Url;

const ID_TOKEN_PARAM: &str = "id_token";
const STATE_PARAM: &str = "state";

/// The outcome of a successful login
#[derive(Debug)]
pub struct ResolvedLogin {
    pub address: String,
    pub account: ZkLoginAccount,
}

/// A logged-in zkLogin account. The ephemeral key only lives in memory from
/// here on, and the proof is spent by the first signature.
pub struct ZkLoginAccount {
    address: String,
    address_seed: String,
    max_epoch: u64,
    proof: ProofMaterial,
    ephemeral_key_pair: EphemeralKeyPair,
}

impl ZkLoginAccount {
    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn address_seed(&self) -> &str {
        &self.address_seed
    }

    pub fn max_epoch(&self) -> u64 {
        self.max_epoch
    }

    pub fn proof_material(&self) -> &ProofMaterial {
        &self.proof
    }

    /// Signs the transaction with the ephemeral key and wraps the signature
    /// with the proof. The account (and its key) is consumed.
    pub fn sign_transaction(self, tx_bytes: &[u8]) -> CompositeSignature {
        let user_signature = self.ephemeral_key_pair.sign_transaction(tx_bytes);
        info!(address = %self.address, max_epoch = self.max_epoch, "Signed transaction with zkLogin");
        assemble(self.proof, self.address_seed, self.max_epoch, user_signature)
    }
}

impl fmt::Debug for ZkLoginAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ZkLoginAccount")
            .field("address", &self.address)
            .field("max_epoch", &self.max_epoch)
            .finish_non_exhaustive()
    }
}

/// Finishes a login when the identity provider redirects back
pub struct CallbackResolver<S> {
    key_store: Arc<EphemeralKeyStore<S>>,
    salt_client: SaltClient,
    prover: Arc<dyn ProofRequester>,
}

impl<S: SessionStorage> CallbackResolver<S> {
    pub fn new(
        key_store: Arc<EphemeralKeyStore<S>>,
        salt_client: SaltClient,
        prover: Arc<dyn ProofRequester>,
    ) -> Self {
        Self {
            key_store,
            salt_client,
            prover,
        }
    }

    /// Validates the callback against the stored session, derives the
    /// address and obtains the proof. On success the login session is
    /// consumed and only the derived address remains in storage.
    pub async fn resolve_callback(&self, callback_url: &str) -> Result<ResolvedLogin, LoginError> {
        match self.try_resolve_callback(callback_url).await {
            Ok(resolved) => Ok(resolved),
            Err(error) => {
                error!("Failed to resolve the login callback: {}", error);
                Err(error)
            },
        }
    }

    async fn try_resolve_callback(&self, callback_url: &str) -> Result<ResolvedLogin, LoginError> {
        let params = CallbackParams::parse(callback_url)?;
        let token = IdentityToken::decode(&params.id_token)?;
        let session = self.key_store.restore()?;

        self.check_session_id(params.state.as_deref())?;
        if token.nonce().as_bytes() != session.nonce.as_bytes() {
            return Err(LoginError::NonceMismatch);
        }

        let salt = self.salt_client.fetch_salt(token.iss(), token.sub()).await?;
        let address_seed = address_seed_for_token(&token, &salt)?;
        let address = derive_address(token.iss(), &address_seed)?;

        let LoginSession {
            ephemeral_key_pair,
            randomness,
            max_epoch,
            ..
        } = session;
        let request = ProofRequest::new(
            token.raw(),
            &ephemeral_key_pair.public_key(),
            max_epoch,
            &randomness,
            &salt,
        );
        let proof = self.prover.request_proof(&request).await?;

        self.key_store.clear()?;
        self.key_store.store_address(&address)?;
        self.key_store.store_id_token(token.raw())?;
        info!(address = %address, iss = token.iss(), max_epoch = max_epoch, "zkLogin completed");

        Ok(ResolvedLogin {
            address: address.clone(),
            account: ZkLoginAccount {
                address,
                address_seed,
                max_epoch,
                proof,
                ephemeral_key_pair,
            },
        })
    }

    /// Callbacks without a `state` are matched on the nonce alone
    fn check_session_id(&self, state: Option<&str>) -> Result<(), LoginError> {
        let Some(received) = state else {
            return Ok(());
        };
        let active = self.key_store.active_session_id()?;
        match active {
            Some(active) if active.to_string() == received => Ok(()),
            active => Err(LoginError::SessionMismatch {
                active: active.map_or_else(|| "none".to_owned(), |id| id.to_string()),
                received: received.to_owned(),
            }),
        }
    }
}

/// The parameters a provider appends to the redirect URI
#[derive(Debug, PartialEq, Eq)]
struct CallbackParams {
    id_token: String,
    state: Option<String>,
}

impl CallbackParams {
    /// Reads `id_token` from the URL fragment. `state` may be in the fragment
    /// or in the query string.
    fn parse(callback_url: &str) -> Result<Self, LoginError> {
        let url = Url::parse(callback_url)
            .map_err(|error| LoginError::InvalidCallbackUrl(error.to_string()))?;

        let mut id_token = None;
        let mut state = None;
        if let Some(fragment) = url.fragment() {
            for (key, value) in url::form_urlencoded::parse(fragment.as_bytes()) {
                match key.as_ref() {
                    ID_TOKEN_PARAM => id_token = Some(value.into_owned()),
                    STATE_PARAM => state = Some(value.into_owned()),
                    _ => {},
                }
            }
        }
        if state.is_none() {
            state = url
                .query_pairs()
                .find(|(key, _)| key == STATE_PARAM)
                .map(|(_, value)| value.into_owned());
        }

        let id_token = id_token
            .filter(|token| !token.is_empty())
            .ok_or(LoginError::MissingToken)?;
        Ok(Self { id_token, state })
    }
}
