// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use figment::{
    providers::{Env, Format as _, Serialized, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    path::Path,
    time::Duration,
};
use url::Url;

/// Environment variables with this prefix override the config file
pub const ENV_PREFIX: &str = "SITES_JOB_";

// Default port for the job service
pub const DEFAULT_JOB_SERVICE_PORT: u16 = 8080;

const DEFAULT_CLOUD_RUN_API_URL: &str = "https://run.googleapis.com";
const DEFAULT_METADATA_TOKEN_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Configuration of the job service
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub struct JobServiceConfig {
    pub listen_address: IpAddr,
    pub listen_port: u16,
    pub project_id: String,
    pub region: String,
    pub job_name: String,
    pub cloud_run_api_url: Url,
    /// A fixed OAuth access token for the Cloud Run API. When absent, a
    /// token is requested from the metadata server for every job run.
    pub access_token: Option<String>,
    pub metadata_token_url: Url,
    pub request_timeout_secs: u64,
    pub log_json: bool,
}

impl Default for JobServiceConfig {
    fn default() -> Self {
        Self {
            listen_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            listen_port: DEFAULT_JOB_SERVICE_PORT,
            project_id: String::new(),
            region: String::new(),
            job_name: String::new(),
            cloud_run_api_url: parse_default_url(DEFAULT_CLOUD_RUN_API_URL),
            access_token: None,
            metadata_token_url: parse_default_url(DEFAULT_METADATA_TOKEN_URL),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            log_json: false,
        }
    }
}

fn parse_default_url(url: &str) -> Url {
    Url::parse(url).expect("Default URLs should parse")
}

impl JobServiceConfig {
    /// Layers the defaults, the optional YAML file and `SITES_JOB_*`
    /// environment variables
    pub fn load(config_path: Option<&Path>) -> Result<Self, figment::Error> {
        let mut figment = Figment::from(Serialized::defaults(JobServiceConfig::default()));
        if let Some(config_path) = config_path {
            figment = figment.merge(Yaml::file(config_path));
        }
        figment.merge(Env::prefixed(ENV_PREFIX)).extract()
    }

    pub fn socket_address(&self) -> SocketAddr {
        SocketAddr::new(self.listen_address, self.listen_port)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Returns the names of the job settings that are still empty
    pub fn missing_job_settings(&self) -> Vec<&'static str> {
        [
            ("project_id", &self.project_id),
            ("region", &self.region),
            ("job_name", &self.job_name),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| name)
        .collect()
    }
}
