// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use crate::error::LoginError;
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use sites_keyless_common::{address::KEY_CLAIM_NAME, EphemeralPublicKey, ProofMaterial};
use tracing::{error, info};
use url::Url;

/// The request body understood by the zkLogin proving service
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProofRequest<'a> {
    pub jwt: &'a str,
    pub extended_ephemeral_public_key: String,
    pub max_epoch: String,
    pub jwt_randomness: &'a str,
    pub salt: &'a str,
    pub key_claim_name: &'a str,
}

impl<'a> ProofRequest<'a> {
    pub fn new(
        jwt: &'a str,
        ephemeral_public_key: &EphemeralPublicKey,
        max_epoch: u64,
        jwt_randomness: &'a str,
        salt: &'a str,
    ) -> Self {
        Self {
            jwt,
            extended_ephemeral_public_key: ephemeral_public_key.extended_public_key(),
            max_epoch: max_epoch.to_string(),
            jwt_randomness,
            salt,
            key_claim_name: KEY_CLAIM_NAME,
        }
    }
}

/// Obtains the proof binding an ephemeral key to an identity token. The proof
/// is not checked locally, and failed requests are not retried.
#[async_trait]
pub trait ProofRequester: Send + Sync {
    async fn request_proof(&self, request: &ProofRequest<'_>) -> Result<ProofMaterial, LoginError>;
}

/// A `ProofRequester` backed by a remote proving service
#[derive(Clone, Debug)]
pub struct ProverClient {
    client: Client,
    prover_url: Url,
}

impl ProverClient {
    pub fn new(client: Client, prover_url: Url) -> Self {
        Self { client, prover_url }
    }
}

#[async_trait]
impl ProofRequester for ProverClient {
    async fn request_proof(&self, request: &ProofRequest<'_>) -> Result<ProofMaterial, LoginError> {
        let started = std::time::Instant::now();
        let response = self
            .client
            .post(self.prover_url.clone())
            .json(request)
            .send()
            .await
            .map_err(|error| {
                error!(prover_url = %self.prover_url, "Proof request failed: {}", error);
                LoginError::Http(error)
            })?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            error!(
                prover_url = %self.prover_url,
                status = status.as_u16(),
                "Proving service rejected the request: {}",
                message
            );
            return Err(LoginError::ProofServiceError {
                status: status.as_u16(),
                message,
            });
        }

        let proof: ProofMaterial = response.json().await?;
        info!(
            max_epoch = %request.max_epoch,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Received zkLogin proof"
        );
        Ok(proof)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use sites_keyless_common::{test_utils::sample_proof_material, EphemeralKeyPair};
    use wiremock::{
        matchers::{body_partial_json, method},
        Mock, MockServer, ResponseTemplate,
    };

    #[tokio::test]
    async fn posts_the_prover_payload() {
        let keypair = EphemeralKeyPair::generate();
        let public_key = keypair.public_key();
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({
                "jwt": "a.b.c",
                "extendedEphemeralPublicKey": public_key.extended_public_key(),
                "maxEpoch": "12",
                "jwtRandomness": "100",
                "salt": "42",
                "keyClaimName": "sub",
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(sample_proof_material()))
            .expect(1)
            .mount(&server)
            .await;

        let prover = ProverClient::new(Client::new(), Url::parse(&server.uri()).unwrap());
        let request = ProofRequest::new("a.b.c", &public_key, 12, "100", "42");
        let proof = prover.request_proof(&request).await.unwrap();
        assert_eq!(proof, sample_proof_material());
    }

    #[tokio::test]
    async fn failures_are_surfaced_unchanged() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_string("invalid jwt"))
            .expect(1)
            .mount(&server)
            .await;

        let prover = ProverClient::new(Client::new(), Url::parse(&server.uri()).unwrap());
        let public_key = EphemeralKeyPair::generate().public_key();
        let request = ProofRequest::new("a.b.c", &public_key, 12, "100", "42");
        match prover.request_proof(&request).await {
            Err(LoginError::ProofServiceError { status, message }) => {
                assert_eq!(status, 400);
                assert_eq!(message, "invalid jwt");
            },
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
