// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use crate::{
    ephemeral::EphemeralPublicKey,
    error::KeylessError,
    poseidon::{decimal_to_field, field_to_be_bytes, poseidon_hash},
};
use ark_bn254::Fr;
use ark_ff::PrimeField;

/// The number of trailing digest bytes kept in the nonce
pub const NONCE_NUM_BYTES: usize = 20;

/// The length of a base64url (unpadded) nonce
pub const NONCE_LENGTH: usize = 27;

/// The number of low-order public key bytes placed in the second scalar
const PUBLIC_KEY_SPLIT_BYTES: usize = 16;

/// Derives the OAuth nonce committing to the ephemeral public key, the last
/// epoch the login stays valid for, and the JWT randomness.
///
/// The flagged public key (33 bytes) does not fit in a single scalar, so it is
/// split into its high and low 128 bits before hashing.
pub fn derive_nonce(
    public_key: &EphemeralPublicKey,
    max_epoch: u64,
    randomness: &str,
) -> Result<String, KeylessError> {
    let flagged = public_key.to_flagged_bytes();
    let (high, low) = flagged.split_at(flagged.len() - PUBLIC_KEY_SPLIT_BYTES);

    let digest = poseidon_hash(vec![
        Fr::from_be_bytes_mod_order(high),
        Fr::from_be_bytes_mod_order(low),
        Fr::from(max_epoch),
        decimal_to_field(randomness)?,
    ])?;

    let bytes = field_to_be_bytes(&digest);
    let truncated = &bytes[bytes.len() - NONCE_NUM_BYTES..];
    Ok(base64::encode_config(truncated, base64::URL_SAFE_NO_PAD))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ephemeral::{generate_randomness, EphemeralKeyPair};

    #[test]
    fn nonce_is_deterministic() {
        let public_key = EphemeralKeyPair::generate().public_key();
        let randomness = generate_randomness();
        let first = derive_nonce(&public_key, 12, &randomness).unwrap();
        let second = derive_nonce(&public_key, 12, &randomness).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), NONCE_LENGTH);
    }

    #[test]
    fn nonce_commits_to_every_input() {
        let public_key = EphemeralKeyPair::generate().public_key();
        let other_key = EphemeralKeyPair::generate().public_key();
        let nonce = derive_nonce(&public_key, 12, "100").unwrap();

        assert_ne!(nonce, derive_nonce(&public_key, 13, "100").unwrap());
        assert_ne!(nonce, derive_nonce(&public_key, 12, "101").unwrap());
        assert_ne!(nonce, derive_nonce(&other_key, 12, "100").unwrap());
    }

    #[test]
    fn nonce_is_url_safe() {
        let public_key = EphemeralKeyPair::generate().public_key();
        let nonce = derive_nonce(&public_key, 7, &generate_randomness()).unwrap();
        assert!(
            nonce
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        );
    }

    #[test]
    fn rejects_non_decimal_randomness() {
        let public_key = EphemeralKeyPair::generate().public_key();
        assert!(matches!(
            derive_nonce(&public_key, 1, "not-a-number"),
            Err(KeylessError::InvalidInput(_))
        ));
    }
}
