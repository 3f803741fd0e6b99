// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use crate::{config::JobServiceConfig, error::JobServiceError};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{error, info};
use url::Url;

/// The environment variable through which the job learns its object
pub const OBJECT_ID_ENV_VAR: &str = "OBJECT_ID";

// Returned when the API accepts the run without naming an execution
const DEFAULT_EXECUTION_NAME: &str = "Job execution started";

const METADATA_FLAVOR_HEADER: &str = "Metadata-Flavor";
const METADATA_FLAVOR_GOOGLE: &str = "Google";

/// Starts one execution of the publishing job for an on-chain object
#[async_trait]
pub trait JobRunner: Send + Sync {
    /// Returns the name of the started execution
    async fn run_job(&self, object_id: &str) -> Result<String, JobServiceError>;
}

/// Where the Cloud Run API token comes from
#[derive(Clone, Debug)]
pub enum AccessTokenSource {
    Static(String),
    MetadataServer(Url),
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RunJobRequest<'a> {
    overrides: Overrides<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Overrides<'a> {
    container_overrides: Vec<ContainerOverride<'a>>,
}

#[derive(Debug, Serialize)]
struct ContainerOverride<'a> {
    env: Vec<EnvVar<'a>>,
}

#[derive(Debug, Serialize)]
struct EnvVar<'a> {
    name: &'a str,
    value: &'a str,
}

impl<'a> RunJobRequest<'a> {
    fn for_object(object_id: &'a str) -> Self {
        Self {
            overrides: Overrides {
                container_overrides: vec![ContainerOverride {
                    env: vec![EnvVar {
                        name: OBJECT_ID_ENV_VAR,
                        value: object_id,
                    }],
                }],
            },
        }
    }
}

/// The long-running operation returned by `jobs:run`
#[derive(Debug, Deserialize)]
struct RunJobOperation {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    metadata: Option<OperationMetadata>,
}

#[derive(Debug, Deserialize)]
struct OperationMetadata {
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MetadataToken {
    access_token: String,
}

/// Runs the job through the Cloud Run Admin API (v2)
pub struct CloudRunJobRunner {
    client: Client,
    run_url: Url,
    token_source: AccessTokenSource,
}

impl CloudRunJobRunner {
    pub fn new(
        client: Client,
        config: &JobServiceConfig,
    ) -> Result<Self, JobServiceError> {
        let missing_settings = config.missing_job_settings();
        if !missing_settings.is_empty() {
            return Err(JobServiceError::InternalError(format!(
                "missing job settings: {}",
                missing_settings.join(", ")
            )));
        }

        let run_path = format!(
            "v2/projects/{}/locations/{}/jobs/{}:run",
            config.project_id, config.region, config.job_name
        );
        let run_url = config.cloud_run_api_url.join(&run_path).map_err(|error| {
            JobServiceError::InternalError(format!("invalid job URL {}: {}", run_path, error))
        })?;

        let token_source = match &config.access_token {
            Some(token) => AccessTokenSource::Static(token.clone()),
            None => AccessTokenSource::MetadataServer(config.metadata_token_url.clone()),
        };

        Ok(Self {
            client,
            run_url,
            token_source,
        })
    }

    pub fn run_url(&self) -> &Url {
        &self.run_url
    }

    async fn access_token(&self) -> Result<String, JobServiceError> {
        match &self.token_source {
            AccessTokenSource::Static(token) => Ok(token.clone()),
            AccessTokenSource::MetadataServer(token_url) => {
                let response = self
                    .client
                    .get(token_url.clone())
                    .header(METADATA_FLAVOR_HEADER, METADATA_FLAVOR_GOOGLE)
                    .send()
                    .await?;
                let status = response.status();
                if !status.is_success() {
                    return Err(JobServiceError::InternalError(format!(
                        "metadata server responded with status {}",
                        status
                    )));
                }
                let token: MetadataToken = response.json().await?;
                Ok(token.access_token)
            },
        }
    }
}

#[async_trait]
impl JobRunner for CloudRunJobRunner {
    async fn run_job(&self, object_id: &str) -> Result<String, JobServiceError> {
        let access_token = self.access_token().await?;
        let response = self
            .client
            .post(self.run_url.clone())
            .bearer_auth(access_token)
            .json(&RunJobRequest::for_object(object_id))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(
                object_id = object_id,
                status = status.as_u16(),
                "Cloud Run rejected the job run: {}",
                body
            );
            return Err(JobServiceError::InternalError(format!(
                "Failed to execute Cloud Run job: status {}: {}",
                status, body
            )));
        }

        let operation: RunJobOperation = response.json().await?;
        let execution_name = operation
            .metadata
            .and_then(|metadata| metadata.name)
            .or(operation.name)
            .unwrap_or_else(|| DEFAULT_EXECUTION_NAME.to_owned());
        info!(
            object_id = object_id,
            execution = %execution_name,
            "Started the publishing job"
        );
        Ok(execution_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::{
        matchers::{body_json, header, method, path},
        Mock, MockServer, ResponseTemplate,
    };

    const OBJECT_ID: &str = "0x5e1";
    const RUN_PATH: &str = "/v2/projects/sites-prod/locations/us-central1/jobs/publish-site:run";

    fn config(server: &MockServer, access_token: Option<&str>) -> JobServiceConfig {
        JobServiceConfig {
            project_id: "sites-prod".into(),
            region: "us-central1".into(),
            job_name: "publish-site".into(),
            cloud_run_api_url: Url::parse(&server.uri()).unwrap(),
            access_token: access_token.map(str::to_owned),
            metadata_token_url: Url::parse(&format!("{}/token", server.uri())).unwrap(),
            ..JobServiceConfig::default()
        }
    }

    #[tokio::test]
    async fn runs_the_job_with_the_object_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(RUN_PATH))
            .and(header("authorization", "Bearer static-token"))
            .and(body_json(json!({
                "overrides": {
                    "containerOverrides": [
                        { "env": [{ "name": "OBJECT_ID", "value": OBJECT_ID }] }
                    ]
                }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": "projects/sites-prod/locations/us-central1/operations/op-1",
                "metadata": {
                    "name": "projects/sites-prod/locations/us-central1/jobs/publish-site/executions/publish-site-abc"
                }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let runner =
            CloudRunJobRunner::new(Client::new(), &config(&server, Some("static-token"))).unwrap();
        let execution = runner.run_job(OBJECT_ID).await.unwrap();
        assert!(execution.ends_with("/executions/publish-site-abc"));
    }

    #[tokio::test]
    async fn fetches_a_token_from_the_metadata_server() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/token"))
            .and(header("Metadata-Flavor", "Google"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "metadata-token",
                "expires_in": 3599,
                "token_type": "Bearer"
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(RUN_PATH))
            .and(header("authorization", "Bearer metadata-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(1)
            .mount(&server)
            .await;

        let runner = CloudRunJobRunner::new(Client::new(), &config(&server, None)).unwrap();
        assert_eq!(runner.run_job(OBJECT_ID).await.unwrap(), DEFAULT_EXECUTION_NAME);
    }

    #[tokio::test]
    async fn api_failures_are_internal_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(RUN_PATH))
            .respond_with(ResponseTemplate::new(403).set_body_string("permission denied"))
            .mount(&server)
            .await;

        let runner =
            CloudRunJobRunner::new(Client::new(), &config(&server, Some("static-token"))).unwrap();
        match runner.run_job(OBJECT_ID).await {
            Err(JobServiceError::InternalError(message)) => {
                assert!(message.contains("permission denied"));
            },
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn incomplete_job_settings_are_rejected() {
        let config = JobServiceConfig {
            project_id: "sites-prod".into(),
            ..JobServiceConfig::default()
        };
        assert!(matches!(
            CloudRunJobRunner::new(Client::new(), &config),
            Err(JobServiceError::InternalError(_))
        ));
    }
}
