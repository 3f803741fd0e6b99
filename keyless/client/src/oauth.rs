// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use crate::{
    error::LoginError,
    ledger::LedgerClient,
    session_store::{EphemeralKeyStore, LoginSession, SessionId, SessionStorage},
};
use serde::{Deserialize, Serialize};
use sites_keyless_common::generate_randomness;
use std::{fmt, str::FromStr, sync::Arc};
use tracing::{error, info, warn};
use url::Url;

/// The number of epochs past the current one that a login stays valid for
pub const MAX_EPOCH_WINDOW: u64 = 2;

const GOOGLE_AUTHORIZATION_ENDPOINT: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const FACEBOOK_AUTHORIZATION_ENDPOINT: &str = "https://www.facebook.com/v17.0/dialog/oauth";

const ID_TOKEN_RESPONSE_TYPE: &str = "id_token";

/// The supported OpenID providers
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OAuthProvider {
    Google,
    Facebook,
}

impl OAuthProvider {
    pub fn authorization_endpoint(&self) -> &'static str {
        match self {
            OAuthProvider::Google => GOOGLE_AUTHORIZATION_ENDPOINT,
            OAuthProvider::Facebook => FACEBOOK_AUTHORIZATION_ENDPOINT,
        }
    }

    pub fn scope(&self) -> &'static str {
        match self {
            OAuthProvider::Google => "openid email",
            OAuthProvider::Facebook => "openid",
        }
    }

    /// Builds the authorization URL that returns an id_token committing to
    /// the given nonce. The session id travels in `state`.
    pub fn authorization_url(
        &self,
        client_id: &str,
        redirect_uri: &Url,
        nonce: &str,
        session_id: SessionId,
    ) -> Result<Url, LoginError> {
        let mut url = Url::parse(self.authorization_endpoint())
            .map_err(|error| LoginError::Navigation(error.to_string()))?;
        url.query_pairs_mut()
            .append_pair("client_id", client_id)
            .append_pair("redirect_uri", redirect_uri.as_str())
            .append_pair("response_type", ID_TOKEN_RESPONSE_TYPE)
            .append_pair("scope", self.scope())
            .append_pair("nonce", nonce)
            .append_pair("state", &session_id.to_string());
        Ok(url)
    }
}

impl fmt::Display for OAuthProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OAuthProvider::Google => write!(f, "google"),
            OAuthProvider::Facebook => write!(f, "facebook"),
        }
    }
}

impl FromStr for OAuthProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "google" => Ok(OAuthProvider::Google),
            "facebook" => Ok(OAuthProvider::Facebook),
            other => Err(format!("unsupported provider '{}'", other)),
        }
    }
}

/// The OAuth client ids registered with each provider
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq, Serialize)]
pub struct OAuthClientIds {
    #[serde(default)]
    pub google: Option<String>,
    #[serde(default)]
    pub facebook: Option<String>,
}

impl OAuthClientIds {
    pub fn get(&self, provider: OAuthProvider) -> Option<&str> {
        match provider {
            OAuthProvider::Google => self.google.as_deref(),
            OAuthProvider::Facebook => self.facebook.as_deref(),
        }
    }
}

/// Hands control over to the identity provider
pub trait Navigator: Send + Sync {
    fn navigate(&self, url: &Url) -> Result<(), LoginError>;
}

/// Opens the authorization URL in the system browser, printing it when no
/// browser can be launched
#[derive(Clone, Copy, Debug, Default)]
pub struct BrowserNavigator;

impl Navigator for BrowserNavigator {
    fn navigate(&self, url: &Url) -> Result<(), LoginError> {
        if let Err(error) = open::that(url.as_str()) {
            warn!("Failed to open a browser: {}", error);
            println!("Open this URL to continue the login:\n{}", url);
        }
        Ok(())
    }
}

/// Starts zkLogin attempts
pub struct OAuthNonceFlow<S> {
    key_store: Arc<EphemeralKeyStore<S>>,
    ledger: Arc<dyn LedgerClient>,
    navigator: Arc<dyn Navigator>,
    client_ids: OAuthClientIds,
    redirect_uri: Url,
}

impl<S: SessionStorage> OAuthNonceFlow<S> {
    pub fn new(
        key_store: Arc<EphemeralKeyStore<S>>,
        ledger: Arc<dyn LedgerClient>,
        navigator: Arc<dyn Navigator>,
        client_ids: OAuthClientIds,
        redirect_uri: Url,
    ) -> Self {
        Self {
            key_store,
            ledger,
            navigator,
            client_ids,
            redirect_uri,
        }
    }

    /// Generates the ephemeral key and randomness, binds them to an epoch
    /// window, persists the session and navigates to the provider. Nothing
    /// is persisted when the epoch query fails.
    pub async fn start_login(&self, provider: OAuthProvider) -> Result<SessionId, LoginError> {
        match self.try_start_login(provider).await {
            Ok(session_id) => Ok(session_id),
            Err(error) => {
                error!(provider = %provider, "Failed to start zkLogin: {}", error);
                Err(error)
            },
        }
    }

    async fn try_start_login(&self, provider: OAuthProvider) -> Result<SessionId, LoginError> {
        let client_id = self
            .client_ids
            .get(provider)
            .ok_or(LoginError::MissingClientId(provider))?;

        let ephemeral_key_pair = self.key_store.create();
        let randomness = generate_randomness();

        let current_epoch = self
            .ledger
            .current_epoch()
            .await
            .map_err(|error| LoginError::EpochQueryFailed(error.to_string()))?;
        let max_epoch = current_epoch.checked_add(MAX_EPOCH_WINDOW).ok_or_else(|| {
            LoginError::EpochQueryFailed(format!("epoch {} is out of range", current_epoch))
        })?;

        let session = LoginSession::new(ephemeral_key_pair, max_epoch, randomness)?;
        let session_id = self.key_store.persist(&session)?;
        let url = provider.authorization_url(client_id, &self.redirect_uri, &session.nonce, session_id)?;

        info!(
            provider = %provider,
            session_id = %session_id,
            current_epoch = current_epoch,
            max_epoch = max_epoch,
            "Starting zkLogin"
        );
        self.navigator.navigate(&url)?;
        Ok(session_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::LedgerError,
        ledger::ObjectMetadata,
        session_store::InMemorySessionStorage,
    };
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use sites_keyless_common::derive_nonce;
    use std::{collections::HashMap, io};

    struct FixedEpochLedger(Option<u64>);

    #[async_trait]
    impl LedgerClient for FixedEpochLedger {
        async fn current_epoch(&self) -> Result<u64, LedgerError> {
            self.0
                .ok_or_else(|| LedgerError::Transport("connection refused".into()))
        }

        async fn get_object(&self, object_id: &str) -> Result<ObjectMetadata, LedgerError> {
            Err(LedgerError::NotFound(object_id.to_owned()))
        }
    }

    #[derive(Default)]
    struct RecordingNavigator {
        urls: Mutex<Vec<Url>>,
    }

    impl Navigator for RecordingNavigator {
        fn navigate(&self, url: &Url) -> Result<(), LoginError> {
            self.urls.lock().push(url.clone());
            Ok(())
        }
    }

    fn client_ids() -> OAuthClientIds {
        OAuthClientIds {
            google: Some("google-client".into()),
            facebook: Some("facebook-client".into()),
        }
    }

    fn new_flow(
        epoch: Option<u64>,
    ) -> (
        OAuthNonceFlow<InMemorySessionStorage>,
        Arc<EphemeralKeyStore<InMemorySessionStorage>>,
        Arc<RecordingNavigator>,
    ) {
        let key_store = Arc::new(EphemeralKeyStore::new(InMemorySessionStorage::new()));
        let navigator = Arc::new(RecordingNavigator::default());
        let flow = OAuthNonceFlow::new(
            key_store.clone(),
            Arc::new(FixedEpochLedger(epoch)),
            navigator.clone(),
            client_ids(),
            Url::parse("https://app.example.com/callback").unwrap(),
        );
        (flow, key_store, navigator)
    }

    #[test]
    fn builds_provider_specific_urls() {
        let redirect_uri = Url::parse("https://app.example.com/").unwrap();
        let url = OAuthProvider::Google
            .authorization_url("client", &redirect_uri, "abc", SessionId::new(3))
            .unwrap();
        assert!(url.as_str().starts_with(GOOGLE_AUTHORIZATION_ENDPOINT));
        let params: HashMap<_, _> = url.query_pairs().into_owned().collect();
        assert_eq!(params["client_id"], "client");
        assert_eq!(params["redirect_uri"], "https://app.example.com/");
        assert_eq!(params["response_type"], "id_token");
        assert_eq!(params["scope"], "openid email");
        assert_eq!(params["nonce"], "abc");
        assert_eq!(params["state"], "3");

        let url = OAuthProvider::Facebook
            .authorization_url("client", &redirect_uri, "abc", SessionId::new(3))
            .unwrap();
        assert!(url.as_str().starts_with(FACEBOOK_AUTHORIZATION_ENDPOINT));
        let params: HashMap<_, _> = url.query_pairs().into_owned().collect();
        assert_eq!(params["scope"], "openid");
    }

    #[test]
    fn parses_provider_names() {
        assert_eq!("Google".parse::<OAuthProvider>().unwrap(), OAuthProvider::Google);
        assert_eq!("facebook".parse::<OAuthProvider>().unwrap(), OAuthProvider::Facebook);
        assert!("github".parse::<OAuthProvider>().is_err());
    }

    #[tokio::test]
    async fn start_login_persists_a_consistent_session() {
        let (flow, key_store, navigator) = new_flow(Some(100));
        let session_id = flow.start_login(OAuthProvider::Google).await.unwrap();

        let session = key_store.restore().unwrap();
        assert_eq!(session.max_epoch, 100 + MAX_EPOCH_WINDOW);
        assert_eq!(
            session.nonce,
            derive_nonce(
                &session.ephemeral_key_pair.public_key(),
                session.max_epoch,
                &session.randomness
            )
            .unwrap()
        );
        assert_eq!(key_store.active_session_id().unwrap(), Some(session_id));

        let urls = navigator.urls.lock();
        assert_eq!(urls.len(), 1);
        let params: HashMap<_, _> = urls[0].query_pairs().into_owned().collect();
        assert_eq!(params["nonce"], session.nonce);
        assert_eq!(params["state"], session_id.to_string());
    }

    #[tokio::test]
    async fn epoch_failure_leaves_no_session_behind() {
        let (flow, key_store, navigator) = new_flow(None);
        assert!(matches!(
            flow.start_login(OAuthProvider::Google).await,
            Err(LoginError::EpochQueryFailed(_))
        ));
        assert!(matches!(
            key_store.restore(),
            Err(LoginError::MissingSessionData(_))
        ));
        assert_eq!(key_store.active_session_id().unwrap(), None);
        assert!(navigator.urls.lock().is_empty());
    }

    #[tokio::test]
    async fn a_second_login_replaces_the_first() {
        let (flow, key_store, _navigator) = new_flow(Some(5));
        let first = flow.start_login(OAuthProvider::Google).await.unwrap();
        let first_nonce = key_store.restore().unwrap().nonce;
        let second = flow.start_login(OAuthProvider::Facebook).await.unwrap();
        assert!(second > first);
        assert_ne!(key_store.restore().unwrap().nonce, first_nonce);
    }

    struct ReadOnlyStorage;

    impl SessionStorage for ReadOnlyStorage {
        fn get(&self, _key: &str) -> Result<Option<String>, LoginError> {
            Ok(None)
        }

        fn set(&self, key: &str, _value: &str) -> Result<(), LoginError> {
            Err(LoginError::Storage(format!("{} is read-only", key)))
        }

        fn remove(&self, _key: &str) -> Result<(), LoginError> {
            Ok(())
        }
    }

    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn storage_failures_are_logged_before_returning() {
        let logs = CapturedLogs::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let navigator = Arc::new(RecordingNavigator::default());
        let flow = OAuthNonceFlow::new(
            Arc::new(EphemeralKeyStore::new(ReadOnlyStorage)),
            Arc::new(FixedEpochLedger(Some(7))),
            navigator.clone(),
            client_ids(),
            Url::parse("https://app.example.com/callback").unwrap(),
        );
        assert!(matches!(
            flow.start_login(OAuthProvider::Google).await,
            Err(LoginError::Storage(_))
        ));
        assert!(navigator.urls.lock().is_empty());

        let output = String::from_utf8(logs.0.lock().clone()).unwrap();
        assert!(output.contains("Failed to start zkLogin"));
        assert!(output.contains("read-only"));
    }
}
