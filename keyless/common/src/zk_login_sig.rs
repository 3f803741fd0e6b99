// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use crate::{address::ZK_LOGIN_FLAG, ephemeral::UserSignature, error::KeylessError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The Groth16 proof points, as decimal strings (projective coordinates)
#[derive(Clone, Debug, Deserialize, PartialEq, Eq, Serialize)]
pub struct ProofPoints {
    pub a: Vec<String>,
    pub b: Vec<Vec<String>>,
    pub c: Vec<String>,
}

/// The base64 slice of the JWT payload that contains the `iss` claim
#[derive(Clone, Debug, Deserialize, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IssBase64Details {
    pub value: String,
    pub index_mod_4: u8,
}

/// The proof returned by the proving service. It is bound to one ephemeral
/// key and max epoch, and is consumed when a signature is assembled.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProofMaterial {
    pub proof_points: ProofPoints,
    pub iss_base64_details: IssBase64Details,
    pub header_base64: String,
}

/// The proof material together with the address seed it was generated for
#[derive(Clone, Debug, Deserialize, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ZkLoginInputs {
    pub proof_points: ProofPoints,
    pub iss_base64_details: IssBase64Details,
    pub header_base64: String,
    pub address_seed: String,
}

impl ZkLoginInputs {
    pub fn new(proof: ProofMaterial, address_seed: String) -> Self {
        let ProofMaterial {
            proof_points,
            iss_base64_details,
            header_base64,
        } = proof;
        Self {
            proof_points,
            iss_base64_details,
            header_base64,
            address_seed,
        }
    }
}

/// The BCS layout of a zkLogin authenticator (without its scheme flag)
#[derive(Clone, Debug, Deserialize, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ZkLoginSignature {
    pub inputs: ZkLoginInputs,
    pub max_epoch: u64,
    pub user_signature: Vec<u8>,
}

/// A serialized zkLogin signature ready to accompany a transaction:
/// base64(flag || BCS(ZkLoginSignature))
#[derive(Clone, PartialEq, Eq)]
pub struct CompositeSignature(Vec<u8>);

impl CompositeSignature {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_base64(&self) -> String {
        base64::encode(&self.0)
    }

    /// Parses a serialized signature back into its parts
    pub fn decode(&self) -> Result<ZkLoginSignature, KeylessError> {
        match self.0.split_first() {
            Some((&ZK_LOGIN_FLAG, body)) => bcs::from_bytes(body)
                .map_err(|error| KeylessError::Serialization(error.to_string())),
            Some((flag, _)) => Err(KeylessError::Serialization(format!(
                "unexpected signature flag {:#04x}",
                flag
            ))),
            None => Err(KeylessError::Serialization("empty signature".into())),
        }
    }
}

impl fmt::Debug for CompositeSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CompositeSignature({} bytes)", self.0.len())
    }
}

impl fmt::Display for CompositeSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_base64())
    }
}

/// Combines the proof, the address seed and the ephemeral signature over the
/// transaction into the signature the ledger verifies.
pub fn assemble(
    proof: ProofMaterial,
    address_seed: String,
    max_epoch: u64,
    user_signature: UserSignature,
) -> CompositeSignature {
    let signature = ZkLoginSignature {
        inputs: ZkLoginInputs::new(proof, address_seed),
        max_epoch,
        user_signature: user_signature.as_bytes().to_vec(),
    };
    let body = bcs::to_bytes(&signature).expect("zkLogin signatures only contain BCS-compatible types");

    let mut serialized = Vec::with_capacity(1 + body.len());
    serialized.push(ZK_LOGIN_FLAG);
    serialized.extend_from_slice(&body);
    CompositeSignature(serialized)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ephemeral::EphemeralKeyPair, test_utils::sample_proof_material};

    #[test]
    fn proof_material_uses_prover_field_names() {
        let json = serde_json::to_value(sample_proof_material()).unwrap();
        assert!(json.get("proofPoints").is_some());
        assert!(json.get("headerBase64").is_some());
        assert_eq!(json["issBase64Details"]["indexMod4"], 1);
    }

    #[test]
    fn assembled_signature_carries_every_part() {
        let keypair = EphemeralKeyPair::generate();
        let user_signature = keypair.sign_transaction(b"tx");
        let proof = sample_proof_material();

        let composite = assemble(proof.clone(), "12345".into(), 9, user_signature.clone());
        assert_eq!(composite.as_bytes()[0], ZK_LOGIN_FLAG);

        let decoded = composite.decode().unwrap();
        assert_eq!(decoded.max_epoch, 9);
        assert_eq!(decoded.inputs.address_seed, "12345");
        assert_eq!(decoded.inputs.proof_points, proof.proof_points);
        assert_eq!(decoded.user_signature, user_signature.as_bytes());
    }

    #[test]
    fn decode_rejects_foreign_flags() {
        let keypair = EphemeralKeyPair::generate();
        let composite = CompositeSignature(keypair.sign_transaction(b"tx").as_bytes().to_vec());
        assert!(matches!(
            composite.decode(),
            Err(KeylessError::Serialization(_))
        ));
    }
}
