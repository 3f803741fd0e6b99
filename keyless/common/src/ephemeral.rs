// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use crate::{blake2b_256, error::KeylessError};
use ed25519_dalek::{Keypair, PublicKey, SecretKey, Signer, PUBLIC_KEY_LENGTH, SECRET_KEY_LENGTH};
use num_bigint::{BigUint, RandBigInt};
use rand::rngs::OsRng;
use std::fmt;

/// The signature scheme flag prepended to Ed25519 public keys and signatures
pub const ED25519_FLAG: u8 = 0x00;

/// Intent prefix for transaction data: (scope, version, app id)
pub const TRANSACTION_INTENT: [u8; 3] = [0, 0, 0];

/// The number of random bits committed to in the nonce
pub const RANDOMNESS_NUM_BITS: u64 = 128;

/// An Ed25519 keypair generated fresh for a single login attempt
pub struct EphemeralKeyPair {
    keypair: Keypair,
}

impl EphemeralKeyPair {
    /// Generates a new keypair from the operating system's CSPRNG
    pub fn generate() -> Self {
        let mut csprng = OsRng;
        Self {
            keypair: Keypair::generate(&mut csprng),
        }
    }

    /// Rebuilds the keypair from raw private key bytes
    pub fn from_private_key_bytes(bytes: &[u8]) -> Result<Self, KeylessError> {
        if bytes.len() != SECRET_KEY_LENGTH {
            return Err(KeylessError::InvalidKey(format!(
                "expected {} private key bytes, got {}",
                SECRET_KEY_LENGTH,
                bytes.len()
            )));
        }
        let secret = SecretKey::from_bytes(bytes)
            .map_err(|error| KeylessError::InvalidKey(error.to_string()))?;
        let public = PublicKey::from(&secret);
        Ok(Self {
            keypair: Keypair { secret, public },
        })
    }

    /// Rebuilds the keypair from a base64-encoded private key
    pub fn from_private_key_base64(encoded: &str) -> Result<Self, KeylessError> {
        let bytes = base64::decode(encoded)
            .map_err(|error| KeylessError::InvalidKey(format!("invalid base64: {}", error)))?;
        Self::from_private_key_bytes(&bytes)
    }

    /// Returns the base64-encoded private key (for short-lived session storage only)
    pub fn private_key_base64(&self) -> String {
        base64::encode(self.keypair.secret.as_bytes())
    }

    pub fn public_key(&self) -> EphemeralPublicKey {
        EphemeralPublicKey(self.keypair.public.to_bytes())
    }

    /// The ledger encoding of the public key: flag || 32 key bytes
    pub fn sui_public_key_bytes(&self) -> Vec<u8> {
        self.public_key().to_flagged_bytes()
    }

    pub fn extended_public_key(&self) -> String {
        self.public_key().extended_public_key()
    }

    /// Signs transaction bytes under the transaction intent and returns the
    /// serialized user signature (flag || signature || public key)
    pub fn sign_transaction(&self, tx_bytes: &[u8]) -> UserSignature {
        let mut intent_message = Vec::with_capacity(TRANSACTION_INTENT.len() + tx_bytes.len());
        intent_message.extend_from_slice(&TRANSACTION_INTENT);
        intent_message.extend_from_slice(tx_bytes);
        let digest = blake2b_256(&intent_message);

        let signature = self.keypair.sign(&digest);
        let mut serialized = Vec::with_capacity(1 + 64 + PUBLIC_KEY_LENGTH);
        serialized.push(ED25519_FLAG);
        serialized.extend_from_slice(&signature.to_bytes());
        serialized.extend_from_slice(self.keypair.public.as_bytes());
        UserSignature(serialized)
    }
}

impl fmt::Debug for EphemeralKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Never print the private key
        f.debug_struct("EphemeralKeyPair")
            .field("public_key", &self.public_key())
            .finish()
    }
}

/// A raw 32-byte Ed25519 public key
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct EphemeralPublicKey([u8; PUBLIC_KEY_LENGTH]);

impl EphemeralPublicKey {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, KeylessError> {
        let bytes: [u8; PUBLIC_KEY_LENGTH] = bytes.try_into().map_err(|_| {
            KeylessError::InvalidKey(format!(
                "expected {} public key bytes, got {}",
                PUBLIC_KEY_LENGTH,
                bytes.len()
            ))
        })?;
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; PUBLIC_KEY_LENGTH] {
        &self.0
    }

    /// The flagged key encoding used by the ledger: flag || key bytes
    pub fn to_flagged_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(1 + PUBLIC_KEY_LENGTH);
        bytes.push(ED25519_FLAG);
        bytes.extend_from_slice(&self.0);
        bytes
    }

    /// The flagged key read as a big-endian integer, in base 10. This is the
    /// form the proving service expects.
    pub fn extended_public_key(&self) -> String {
        BigUint::from_bytes_be(&self.to_flagged_bytes()).to_string()
    }
}

impl fmt::Debug for EphemeralPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

/// A serialized Ed25519 user signature: flag || signature || public key
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UserSignature(Vec<u8>);

impl UserSignature {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn from_base64(encoded: &str) -> Result<Self, KeylessError> {
        base64::decode(encoded)
            .map(Self)
            .map_err(|error| KeylessError::InvalidInput(format!("invalid base64: {}", error)))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_base64(&self) -> String {
        base64::encode(&self.0)
    }
}

/// Generates the JWT randomness: 128 random bits rendered in base 10
pub fn generate_randomness() -> String {
    let mut csprng = OsRng;
    csprng.gen_biguint(RANDOMNESS_NUM_BITS).to_string()
}
