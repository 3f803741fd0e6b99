// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

//! Derivation of the ledger address bound to an OpenID identity

use crate::{
    blake2b_256,
    error::KeylessError,
    jwt::IdentityToken,
    poseidon::{decimal_to_field, field_to_be_bytes, field_to_decimal, hash_ascii_str_to_field, poseidon_hash},
};

/// The signature scheme flag of zkLogin authenticators
pub const ZK_LOGIN_FLAG: u8 = 0x05;

pub const MAX_KEY_CLAIM_NAME_LENGTH: usize = 32;
pub const MAX_KEY_CLAIM_VALUE_LENGTH: usize = 115;
pub const MAX_AUD_VALUE_LENGTH: usize = 145;

/// The claim identifying the user within an issuer
pub const KEY_CLAIM_NAME: &str = "sub";

const GOOGLE_ISS_WITHOUT_SCHEME: &str = "accounts.google.com";
const GOOGLE_ISS: &str = "https://accounts.google.com";

/// Google may issue tokens whose `iss` omits the scheme. Both forms must map
/// to the same address.
pub fn normalize_iss(iss: &str) -> &str {
    if iss == GOOGLE_ISS_WITHOUT_SCHEME {
        GOOGLE_ISS
    } else {
        iss
    }
}

/// Computes the address seed (a decimal field element) from the salt and the
/// key claim, binding it to the client the token was issued for.
pub fn gen_address_seed(
    salt: &str,
    name: &str,
    value: &str,
    aud: &str,
) -> Result<String, KeylessError> {
    let salt_hash = poseidon_hash(vec![decimal_to_field(salt)?])?;
    let seed = poseidon_hash(vec![
        hash_ascii_str_to_field(name, MAX_KEY_CLAIM_NAME_LENGTH)?,
        hash_ascii_str_to_field(value, MAX_KEY_CLAIM_VALUE_LENGTH)?,
        hash_ascii_str_to_field(aud, MAX_AUD_VALUE_LENGTH)?,
        salt_hash,
    ])?;
    Ok(field_to_decimal(&seed))
}

/// Computes the `0x`-prefixed address for the given issuer and address seed
pub fn derive_address(iss: &str, address_seed: &str) -> Result<String, KeylessError> {
    let iss = normalize_iss(iss).as_bytes();
    let iss_len = u8::try_from(iss.len()).map_err(|_| {
        KeylessError::InvalidInput(format!("issuer of {} bytes is too long", iss.len()))
    })?;
    let seed = field_to_be_bytes(&decimal_to_field(address_seed)?);

    let mut preimage = Vec::with_capacity(2 + iss.len() + seed.len());
    preimage.push(ZK_LOGIN_FLAG);
    preimage.push(iss_len);
    preimage.extend_from_slice(iss);
    preimage.extend_from_slice(&seed);

    Ok(format!("0x{}", hex::encode(blake2b_256(&preimage))))
}

/// Derives the address seed for a decoded identity token
pub fn address_seed_for_token(token: &IdentityToken, salt: &str) -> Result<String, KeylessError> {
    gen_address_seed(salt, KEY_CLAIM_NAME, token.sub(), token.aud()?)
}

/// Derives the address owned by the holder of `jwt` under the given salt
pub fn jwt_to_address(jwt: &str, salt: &str) -> Result<String, KeylessError> {
    let token = IdentityToken::decode(jwt)?;
    let address_seed = address_seed_for_token(&token, salt)?;
    derive_address(token.iss(), &address_seed)
}
