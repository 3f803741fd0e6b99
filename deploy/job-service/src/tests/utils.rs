// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use crate::{error::JobServiceError, job_runner::JobRunner, validation::CreateSiteRequest};
use async_trait::async_trait;
use hyper::{Body, Method, Request, Response};
use parking_lot::Mutex;
use serde_json::Value;

pub const OWNER: &str = "0x1f2e3d4c5b6a79880f1e2d3c4b5a69788f9e0d1c2b3a49586f7e8d9c0b1a2f3e";

/// A job runner that records the objects it was asked to run
#[derive(Default)]
pub struct RecordingJobRunner {
    pub runs: Mutex<Vec<String>>,
    pub failure: Option<JobServiceError>,
}

impl RecordingJobRunner {
    pub fn failing(error: JobServiceError) -> Self {
        Self {
            runs: Mutex::new(vec![]),
            failure: Some(error),
        }
    }
}

#[async_trait]
impl JobRunner for RecordingJobRunner {
    async fn run_job(&self, object_id: &str) -> Result<String, JobServiceError> {
        self.runs.lock().push(object_id.to_owned());
        match &self.failure {
            Some(error) => Err(error.clone()),
            None => Ok(format!("executions/{}", object_id)),
        }
    }
}

/// Builds a request with an origin header and the given body
pub fn request(method: Method, path: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(path)
        .header("origin", "https://sites.test")
        .body(Body::from(body.to_owned()))
        .unwrap()
}

/// Reads the response body as JSON
pub async fn json_body(response: Response<Body>) -> Value {
    let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// Returns a create-site payload that passes every rule
pub fn valid_site_request() -> CreateSiteRequest {
    CreateSiteRequest {
        site_name: "my-site".into(),
        owner: OWNER.into(),
        ownership: "0".into(),
        send_to: OWNER.into(),
        epochs: "5".into(),
        start_date: "2025-01-01".into(),
        end_date: "2025-01-02".into(),
        status: "1".into(),
        cache: "7".into(),
        root: "/".into(),
        install_command: "npm install".into(),
        build_command: "npm run build".into(),
        default_route: "/index.html".into(),
        is_build: "1".into(),
        sui_ns: None,
        output_dir: Some("dist".into()),
    }
}
