// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

//! Primitives of the zkLogin protocol shared by the login client and the
//! backend services. Nothing in this crate performs I/O.

use blake2::{digest::consts::U32, Blake2b, Digest};

pub mod address;
pub mod ephemeral;
pub mod error;
pub mod jwt;
pub mod nonce;
pub mod polling;
pub mod poseidon;
pub mod zk_login_sig;

#[cfg(any(test, feature = "testing"))]
pub mod test_utils;

pub use address::{derive_address, gen_address_seed, jwt_to_address};
pub use ephemeral::{generate_randomness, EphemeralKeyPair, EphemeralPublicKey, UserSignature};
pub use error::KeylessError;
pub use jwt::{Claims, IdentityToken};
pub use nonce::derive_nonce;
pub use polling::PollingConfig;
pub use zk_login_sig::{assemble, CompositeSignature, ProofMaterial};

type Blake2b256 = Blake2b<U32>;

/// Returns the blake2b-256 digest of the given bytes
pub fn blake2b_256(bytes: &[u8]) -> [u8; 32] {
    let mut hasher = Blake2b256::new();
    hasher.update(bytes);
    let mut digest = [0u8; 32];
    digest.copy_from_slice(&hasher.finalize());
    digest
}
