// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use crate::{
    callback::{CallbackResolver, ResolvedLogin},
    config::ClientConfig,
    error::LoginError,
    ledger::{LedgerClient, SuiJsonRpcClient},
    oauth::{Navigator, OAuthNonceFlow, OAuthProvider},
    prover_client::ProverClient,
    salt_client::SaltClient,
    session_store::{EphemeralKeyStore, FileSessionStorage, SessionId},
    state_poller::StatePoller,
};
use reqwest::Client;
use std::{sync::Arc, time::Duration};
use tracing::debug;

const USER_AGENT: &str = concat!("sites-login/", env!("CARGO_PKG_VERSION"));

/// Creates the HTTP client shared by the salt, prover and ledger clients
pub fn create_request_client(timeout: Duration) -> Result<Client, LoginError> {
    Ok(Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .build()?)
}

/// The login flow wired to its configured services, with the session kept
/// in a file
pub struct ZkLoginClient {
    key_store: Arc<EphemeralKeyStore<FileSessionStorage>>,
    ledger: Arc<dyn LedgerClient>,
    oauth_flow: OAuthNonceFlow<FileSessionStorage>,
    callback_resolver: CallbackResolver<FileSessionStorage>,
}

impl ZkLoginClient {
    pub fn new(config: &ClientConfig, navigator: Arc<dyn Navigator>) -> Result<Self, LoginError> {
        let client = create_request_client(config.request_timeout())?;
        let session_file = config.session_file();
        debug!(session_file = %session_file.display(), "Using file session storage");

        let key_store = Arc::new(EphemeralKeyStore::new(FileSessionStorage::new(session_file)));
        let ledger: Arc<dyn LedgerClient> = Arc::new(SuiJsonRpcClient::new(
            client.clone(),
            config.ledger_rpc_url.clone(),
        ));
        let oauth_flow = OAuthNonceFlow::new(
            key_store.clone(),
            ledger.clone(),
            navigator,
            config.client_ids.clone(),
            config.redirect_uri.clone(),
        );
        let callback_resolver = CallbackResolver::new(
            key_store.clone(),
            SaltClient::new(client.clone(), &config.salt_service_url)?,
            Arc::new(ProverClient::new(client, config.prover_url.clone())),
        );

        Ok(Self {
            key_store,
            ledger,
            oauth_flow,
            callback_resolver,
        })
    }

    pub async fn start_login(&self, provider: OAuthProvider) -> Result<SessionId, LoginError> {
        self.oauth_flow.start_login(provider).await
    }

    pub async fn resolve_callback(&self, callback_url: &str) -> Result<ResolvedLogin, LoginError> {
        self.callback_resolver.resolve_callback(callback_url).await
    }

    /// The address of the last completed login, if any
    pub fn address(&self) -> Result<Option<String>, LoginError> {
        self.key_store.address()
    }

    pub fn logout(&self) -> Result<(), LoginError> {
        self.key_store.logout()
    }

    pub fn state_poller(&self) -> StatePoller {
        StatePoller::new(self.ledger.clone())
    }
}
