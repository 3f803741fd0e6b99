// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

//! Circom-compatible Poseidon hashing over BN254, plus the string and integer
//! packing helpers that the zkLogin circuit expects.

use crate::error::KeylessError;
use ark_bn254::Fr;
use ark_ff::{BigInteger, PrimeField};
use num_bigint::BigUint;
use once_cell::sync::Lazy;
use poseidon_ark::Poseidon;
use std::str::FromStr;

/// The maximum number of scalars a single Poseidon permutation accepts
pub const MAX_POSEIDON_INPUTS: usize = 16;

/// The number of bits packed into each scalar when hashing strings
pub const PACK_WIDTH_BITS: usize = 248;

/// The number of bytes packed into each scalar when hashing strings
pub const BYTES_PACKED_PER_SCALAR: usize = PACK_WIDTH_BITS / 8;

static POSEIDON: Lazy<Poseidon> = Lazy::new(Poseidon::new);

/// Hashes up to 32 scalars. Inputs longer than 16 are split in two halves
/// whose digests are hashed together, mirroring the zkLogin circuit.
pub fn poseidon_hash(inputs: Vec<Fr>) -> Result<Fr, KeylessError> {
    let num_inputs = inputs.len();
    if num_inputs == 0 {
        return Err(KeylessError::Poseidon(
            "cannot hash an empty list of scalars".into(),
        ));
    }

    if num_inputs <= MAX_POSEIDON_INPUTS {
        return POSEIDON.hash(inputs).map_err(KeylessError::Poseidon);
    }

    if num_inputs <= 2 * MAX_POSEIDON_INPUTS {
        let mut first_half = inputs;
        let second_half = first_half.split_off(MAX_POSEIDON_INPUTS);
        let first_digest = POSEIDON.hash(first_half).map_err(KeylessError::Poseidon)?;
        let second_digest = POSEIDON
            .hash(second_half)
            .map_err(KeylessError::Poseidon)?;
        return POSEIDON
            .hash(vec![first_digest, second_digest])
            .map_err(KeylessError::Poseidon);
    }

    Err(KeylessError::Poseidon(format!(
        "too many inputs to hash: {} (max {})",
        num_inputs,
        2 * MAX_POSEIDON_INPUTS
    )))
}

/// Pads the string with zero bytes up to `max_len`, packs it into 31-byte
/// big-endian chunks (the first chunk is the short one) and hashes the chunks.
pub fn hash_ascii_str_to_field(value: &str, max_len: usize) -> Result<Fr, KeylessError> {
    let bytes = value.as_bytes();
    if bytes.len() > max_len {
        return Err(KeylessError::InvalidInput(format!(
            "string of {} bytes exceeds the maximum of {}",
            bytes.len(),
            max_len
        )));
    }

    let mut padded = bytes.to_vec();
    padded.resize(max_len, 0);

    // Chunks are cut from the end so that only the leading chunk may be short
    let mut chunks: Vec<Fr> = padded
        .rchunks(BYTES_PACKED_PER_SCALAR)
        .map(Fr::from_be_bytes_mod_order)
        .collect();
    chunks.reverse();

    poseidon_hash(chunks)
}

/// Parses a base-10 integer string into a scalar
pub fn decimal_to_field(value: &str) -> Result<Fr, KeylessError> {
    let big_uint = BigUint::from_str(value).map_err(|error| {
        KeylessError::InvalidInput(format!("'{}' is not a decimal integer: {}", value, error))
    })?;
    Ok(Fr::from_be_bytes_mod_order(&big_uint.to_bytes_be()))
}

/// Renders a scalar as a base-10 integer string
pub fn field_to_decimal(value: &Fr) -> String {
    BigUint::from_bytes_be(&field_to_be_bytes(value)).to_string()
}

/// Returns the 32-byte big-endian encoding of a scalar
pub fn field_to_be_bytes(value: &Fr) -> Vec<u8> {
    value.into_bigint().to_bytes_be()
}
