// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use crate::oauth::OAuthClientIds;
use figment::{
    providers::{Env, Format as _, Serialized, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use sites_keyless_common::PollingConfig;
use std::{path::{Path, PathBuf}, time::Duration};
use url::Url;

/// Environment variables with this prefix override the config file
pub const ENV_PREFIX: &str = "SITES_LOGIN_";

const DEFAULT_LEDGER_RPC_URL: &str = "https://fullnode.testnet.sui.io:443";
const DEFAULT_SALT_SERVICE_URL: &str = "https://sui-zklogin-salt-api.vercel.app/api";
const DEFAULT_PROVER_URL: &str = "https://prover-dev.mystenlabs.com/v1";
const DEFAULT_REDIRECT_URI: &str = "http://localhost:5173/";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

const SESSION_DIR_NAME: &str = "sites-login";
const SESSION_FILE_NAME: &str = "session.json";

/// Configuration of the login client
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub struct ClientConfig {
    pub ledger_rpc_url: Url,
    pub salt_service_url: Url,
    pub prover_url: Url,
    pub redirect_uri: Url,
    pub client_ids: OAuthClientIds,
    /// Where the login session is kept between `start` and `callback`.
    /// Defaults to the user's local data directory.
    pub session_dir: Option<PathBuf>,
    pub request_timeout_secs: u64,
    pub polling: PollingConfig,
    pub log_json: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            ledger_rpc_url: parse_default_url(DEFAULT_LEDGER_RPC_URL),
            salt_service_url: parse_default_url(DEFAULT_SALT_SERVICE_URL),
            prover_url: parse_default_url(DEFAULT_PROVER_URL),
            redirect_uri: parse_default_url(DEFAULT_REDIRECT_URI),
            client_ids: OAuthClientIds::default(),
            session_dir: None,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            polling: PollingConfig::DEFAULT,
            log_json: false,
        }
    }
}

fn parse_default_url(url: &str) -> Url {
    Url::parse(url).expect("Default URLs should parse")
}

impl ClientConfig {
    /// Layers the defaults, the optional YAML file and `SITES_LOGIN_*`
    /// environment variables (nested keys are separated by `__`)
    pub fn load(config_path: Option<&Path>) -> Result<Self, figment::Error> {
        let mut figment = Figment::from(Serialized::defaults(ClientConfig::default()));
        if let Some(config_path) = config_path {
            figment = figment.merge(Yaml::file(config_path));
        }
        figment.merge(Env::prefixed(ENV_PREFIX).split("__")).extract()
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn session_file(&self) -> PathBuf {
        let session_dir = self.session_dir.clone().unwrap_or_else(|| {
            dirs::data_local_dir()
                .map(|dir| dir.join(SESSION_DIR_NAME))
                .unwrap_or_else(|| PathBuf::from(format!(".{}", SESSION_DIR_NAME)))
        });
        session_dir.join(SESSION_FILE_NAME)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{fs, io::Write};

    #[test]
    fn defaults_apply_without_a_file() {
        let config = ClientConfig::load(None).unwrap();
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
        assert_eq!(config.polling, PollingConfig::DEFAULT);
        assert!(config.client_ids.google.is_none());
    }

    #[test]
    fn yaml_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("login.yaml");
        let mut file = fs::File::create(&path).unwrap();
        writeln!(
            file,
            r#"
salt_service_url: "http://localhost:9000/api"
client_ids:
  google: "google-client"
session_dir: "{}"
polling:
  max_attempts: 3
  poll_interval_ms: 500
  timeout_ms: 4000
"#,
            dir.path().display()
        )
        .unwrap();

        let config = ClientConfig::load(Some(&path)).unwrap();
        assert_eq!(config.salt_service_url.as_str(), "http://localhost:9000/api");
        assert_eq!(config.client_ids.google.as_deref(), Some("google-client"));
        assert_eq!(config.polling.max_attempts(), 3);
        assert_eq!(config.session_file(), dir.path().join(SESSION_FILE_NAME));
    }

    #[test]
    fn invalid_polling_budgets_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("login.yaml");
        fs::write(
            &path,
            "polling:\n  max_attempts: 0\n  poll_interval_ms: 1\n  timeout_ms: 1\n",
        )
        .unwrap();
        assert!(ClientConfig::load(Some(&path)).is_err());
    }
}
