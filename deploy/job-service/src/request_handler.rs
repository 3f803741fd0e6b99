// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use crate::{
    error::JobServiceError,
    job_runner::JobRunner,
    validation::{CreateSiteRequest, ValidationErrors},
};
use hyper::{
    header::{
        ACCESS_CONTROL_ALLOW_CREDENTIALS, ACCESS_CONTROL_ALLOW_HEADERS,
        ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN, CONTENT_TYPE,
    },
    http::response,
    Body, Method, Request, Response, StatusCode,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::{convert::Infallible, sync::Arc};
use tracing::{error, info, warn};

// The list of endpoints/paths offered by the job service.
// Note: if you update these paths, please also update the "ALL_PATHS" array below.
pub const HEALTH_PATH: &str = "/health";
pub const TRIGGER_JOB_PATH: &str = "/trigger-job";
pub const VALIDATE_SITE_PATH: &str = "/validate-site";

// An array of all known endpoints/paths
pub const ALL_PATHS: [&str; 3] = [HEALTH_PATH, TRIGGER_JOB_PATH, VALIDATE_SITE_PATH];

// Content type constants
const CONTENT_TYPE_JSON: &str = "application/json";
const CONTENT_TYPE_TEXT: &str = "text/plain";

// Origin header constants
const MISSING_ORIGIN_STRING: &str = "";
const ORIGIN_HEADER: &str = "origin";

// Useful message constants
const METHOD_NOT_ALLOWED_MESSAGE: &str =
    "The request method is not allowed for the requested path!";
const UNEXPECTED_ERROR_MESSAGE: &str = "An unexpected error was encountered!";
const MISSING_OBJECT_ID_MESSAGE: &str = "objectId is required";
const JOB_TRIGGERED_MESSAGE: &str = "Cloud Run job triggered successfully";
const JOB_TRIGGER_FAILED_MESSAGE: &str = "Failed to trigger Cloud Run job";
const HEALTHY_STATUS: &str = "OK";

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerJobRequest {
    #[serde(default)]
    pub object_id: Option<String>,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerJobResponse {
    pub message: String,
    pub job_execution_name: String,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct HealthResponse {
    pub status: String,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ValidSiteResponse {
    pub valid: bool,
}

/// Reads the request body and deserializes it as JSON
async fn read_json_body<T: DeserializeOwned>(
    request: Request<Body>,
) -> Result<T, JobServiceError> {
    let request_bytes = hyper::body::to_bytes(request.into_body())
        .await
        .map_err(|error| {
            JobServiceError::InternalError(format!("Failed to get request body bytes: {}", error))
        })?;
    serde_json::from_slice(&request_bytes).map_err(|error| {
        JobServiceError::BadRequest(format!("Failed to deserialize request body JSON: {}", error))
    })
}

/// Starts the publishing job for the object named in the request
async fn handle_trigger_job_request(
    origin: String,
    request: Request<Body>,
    job_runner: &dyn JobRunner,
) -> Result<Response<Body>, Infallible> {
    let object_id = match read_json_body::<TriggerJobRequest>(request).await {
        Ok(TriggerJobRequest {
            object_id: Some(object_id),
        }) if !object_id.is_empty() => object_id,
        Ok(_) => {
            warn!("Trigger request without an object id");
            return generate_error_response(
                origin,
                StatusCode::BAD_REQUEST,
                MISSING_OBJECT_ID_MESSAGE,
                None,
            );
        },
        Err(JobServiceError::BadRequest(error)) => {
            warn!("{}", error);
            return generate_error_response(
                origin,
                StatusCode::BAD_REQUEST,
                MISSING_OBJECT_ID_MESSAGE,
                Some(error),
            );
        },
        Err(error) => {
            error!("Failed to read the trigger request: {}", error);
            return generate_internal_server_error_response(origin);
        },
    };

    match job_runner.run_job(&object_id).await {
        Ok(job_execution_name) => {
            info!(
                object_id = %object_id,
                "Trigger request processed successfully! Origin: {}",
                origin
            );
            let trigger_response = TriggerJobResponse {
                message: JOB_TRIGGERED_MESSAGE.into(),
                job_execution_name,
            };
            generate_serialized_json_response(origin, StatusCode::OK, &trigger_response)
        },
        Err(error) => {
            error!(object_id = %object_id, "Failed to trigger the job: {}", error);
            generate_error_response(
                origin,
                StatusCode::INTERNAL_SERVER_ERROR,
                JOB_TRIGGER_FAILED_MESSAGE,
                Some(error.to_string()),
            )
        },
    }
}

/// Checks a create-site payload and reports every issue found
async fn handle_validate_site_request(
    origin: String,
    request: Request<Body>,
) -> Result<Response<Body>, Infallible> {
    let create_site_request = match read_json_body::<CreateSiteRequest>(request).await {
        Ok(create_site_request) => create_site_request,
        Err(JobServiceError::BadRequest(error)) => {
            warn!("{}", error);
            return generate_error_response(origin, StatusCode::BAD_REQUEST, &error, None);
        },
        Err(error) => {
            error!("Failed to read the create-site request: {}", error);
            return generate_internal_server_error_response(origin);
        },
    };

    match create_site_request.validate() {
        Ok(()) => generate_serialized_json_response(
            origin,
            StatusCode::OK,
            &ValidSiteResponse { valid: true },
        ),
        Err(validation_errors) => {
            info!(
                issues = validation_errors.issues.len(),
                "Create-site request failed validation"
            );
            generate_serialized_json_response::<ValidationErrors>(
                origin,
                StatusCode::BAD_REQUEST,
                &validation_errors,
            )
        },
    }
}

/// Returns a response builder prepopulated with common headers
fn create_response_builder(origin: String, status_code: StatusCode) -> response::Builder {
    hyper::Response::builder()
        .status(status_code)
        .header(ACCESS_CONTROL_ALLOW_ORIGIN, origin)
        .header(ACCESS_CONTROL_ALLOW_CREDENTIALS, "true")
}

/// Generates a JSON error body of the form `{error, details?}`
fn generate_error_response(
    origin: String,
    status_code: StatusCode,
    error: &str,
    details: Option<String>,
) -> Result<Response<Body>, Infallible> {
    let error_response = ErrorResponse {
        error: error.to_owned(),
        details,
    };
    generate_serialized_json_response(origin, status_code, &error_response)
}

/// Generates a 500 response for unexpected internal server errors
fn generate_internal_server_error_response(origin: String) -> Result<Response<Body>, Infallible> {
    generate_text_response(
        origin,
        StatusCode::INTERNAL_SERVER_ERROR,
        UNEXPECTED_ERROR_MESSAGE.into(),
    )
}

/// Generates a JSON response with the given status code and body string
fn generate_json_response(
    origin: String,
    status_code: StatusCode,
    body_str: String,
) -> Result<Response<Body>, Infallible> {
    let response = create_response_builder(origin, status_code)
        .header(CONTENT_TYPE, CONTENT_TYPE_JSON)
        .body(Body::from(body_str))
        .expect("Failed to build JSON response!");
    Ok(response)
}

/// Serializes the given value and generates a JSON response
fn generate_serialized_json_response<T: Serialize>(
    origin: String,
    status_code: StatusCode,
    value: &T,
) -> Result<Response<Body>, Infallible> {
    match serde_json::to_string(value) {
        Ok(response_body) => generate_json_response(origin, status_code, response_body),
        Err(error) => {
            error!("Failed to serialize to JSON response: {}", error);
            generate_internal_server_error_response(origin)
        },
    }
}

/// Generates a 405 response for invalid methods on known paths
fn generate_method_not_allowed_response(origin: String) -> Result<Response<Body>, Infallible> {
    generate_text_response(
        origin,
        StatusCode::METHOD_NOT_ALLOWED,
        METHOD_NOT_ALLOWED_MESSAGE.into(),
    )
}

/// Generates a 404 response for invalid paths
fn generate_not_found_response(
    origin: String,
    request_method: &Method,
    invalid_path: &str,
) -> Result<Response<Body>, Infallible> {
    let response_message = format!(
        "The request for '{}' with method '{}' was not found!",
        invalid_path, request_method
    );
    generate_text_response(origin, StatusCode::NOT_FOUND, response_message)
}

/// Generates a response for options requests
fn generate_options_response(origin: String) -> Result<Response<Body>, Infallible> {
    let response = create_response_builder(origin, StatusCode::OK)
        .header(ACCESS_CONTROL_ALLOW_METHODS, "GET, POST, OPTIONS")
        .header(ACCESS_CONTROL_ALLOW_HEADERS, "*")
        .body(Body::empty())
        .expect("Failed to build options response!");
    Ok(response)
}

/// Extracts the origin header from the request
fn get_request_origin(request: &Request<Body>) -> String {
    request
        .headers()
        .get(ORIGIN_HEADER)
        .and_then(|header_value| header_value.to_str().ok())
        .unwrap_or(MISSING_ORIGIN_STRING)
        .to_owned()
}

/// Generates a text response with the given status code and body string
fn generate_text_response(
    origin: String,
    status_code: StatusCode,
    body_str: String,
) -> Result<Response<Body>, Infallible> {
    let response = create_response_builder(origin, status_code)
        .header(CONTENT_TYPE, CONTENT_TYPE_TEXT)
        .body(Body::from(body_str))
        .expect("Failed to build text response!");
    Ok(response)
}

/// Handles the given request and returns a response
pub async fn handle_request(
    request: Request<Body>,
    job_runner: Arc<dyn JobRunner>,
) -> Result<Response<Body>, Infallible> {
    // Get the request origin
    let origin = get_request_origin(&request);

    // Handle any OPTIONS requests
    let request_method = request.method().clone();
    if request_method == Method::OPTIONS {
        return generate_options_response(origin);
    }

    // Handle any GET requests
    if request_method == Method::GET && request.uri().path() == HEALTH_PATH {
        let health_response = HealthResponse {
            status: HEALTHY_STATUS.into(),
        };
        return generate_serialized_json_response(origin, StatusCode::OK, &health_response);
    }

    // Handle any POST requests
    if request_method == Method::POST {
        match request.uri().path() {
            TRIGGER_JOB_PATH => {
                return handle_trigger_job_request(origin, request, job_runner.as_ref()).await
            },
            VALIDATE_SITE_PATH => return handle_validate_site_request(origin, request).await,
            _ => { /* Continue below */ },
        };
    }

    // If the request is to a known path but with an invalid method, return a method not allowed response
    let path = request.uri().path();
    if is_known_path(path) {
        return generate_method_not_allowed_response(origin);
    }

    // Otherwise, no matching route was found
    generate_not_found_response(origin, &request_method, path)
}

/// Returns true if the given URI path is a known path/endpoint
fn is_known_path(uri_path: &str) -> bool {
    ALL_PATHS.contains(&uri_path)
}
