// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

//! Fixtures shared by the unit and integration tests of the keyless crates

use crate::zk_login_sig::{IssBase64Details, ProofMaterial, ProofPoints};
use serde_json::{json, Value};

pub const SAMPLE_ISS: &str = "https://accounts.google.com";
pub const SAMPLE_SUB: &str = "110463452167303598383";
pub const SAMPLE_AUD: &str = "sites-test-client.apps.googleusercontent.com";
pub const SAMPLE_SALT: &str = "42";
pub const SAMPLE_IAT: u64 = 1_700_000_000;
pub const SAMPLE_EXP: u64 = 1_700_003_600;

const SAMPLE_JWT_HEADER: &str = r#"{"alg":"RS256","kid":"sites-test-kid","typ":"JWT"}"#;
const SAMPLE_JWT_SIGNATURE: &[u8] = b"not-a-real-signature";

/// Returns the claims of a sample Google identity token carrying the given nonce
pub fn sample_claims(nonce: &str) -> Value {
    json!({
        "iss": SAMPLE_ISS,
        "azp": SAMPLE_AUD,
        "aud": SAMPLE_AUD,
        "sub": SAMPLE_SUB,
        "email": "sites.tester@example.com",
        "nonce": nonce,
        "iat": SAMPLE_IAT,
        "exp": SAMPLE_EXP,
    })
}

/// Encodes the claims as an (unsigned) compact JWT
pub fn sample_jwt(claims: &Value) -> String {
    format!(
        "{}.{}.{}",
        base64::encode_config(SAMPLE_JWT_HEADER, base64::URL_SAFE_NO_PAD),
        base64::encode_config(claims.to_string(), base64::URL_SAFE_NO_PAD),
        base64::encode_config(SAMPLE_JWT_SIGNATURE, base64::URL_SAFE_NO_PAD),
    )
}

/// Returns a sample JWT for the default identity with the given nonce
pub fn sample_jwt_with_nonce(nonce: &str) -> String {
    sample_jwt(&sample_claims(nonce))
}

/// Returns proof material shaped like a real prover response
pub fn sample_proof_material() -> ProofMaterial {
    ProofMaterial {
        proof_points: ProofPoints {
            a: vec![
                "17318089125952421736342263717932719437717844282410187957984751939942898251250".into(),
                "11373966645469122582074082295985388258840681618268593976697325892280915681207".into(),
                "1".into(),
            ],
            b: vec![
                vec![
                    "5939871147348834997361720122238980177152303274311047249905942384915768690895".into(),
                    "4533568271134785278731234570361482651996740791888285864966884032717049811708".into(),
                ],
                vec![
                    "10564387285071555469753990661410840118635925466597037018058770041347518461368".into(),
                    "12597323547277579144698496372242615368085801313343155735511330003884767957854".into(),
                ],
                vec!["1".into(), "0".into()],
            ],
            c: vec![
                "15791589472556826263231644728873337629015269984699404073623603352537678813171".into(),
                "4547866499248881449676161158024748060485373250029423904113017422539037162527".into(),
                "1".into(),
            ],
        },
        iss_base64_details: IssBase64Details {
            value: "wiaXNzIjoiaHR0cHM6Ly9hY2NvdW50cy5nb29nbGUuY29tIiw".into(),
            index_mod_4: 1,
        },
        header_base64: base64::encode_config(SAMPLE_JWT_HEADER, base64::URL_SAFE_NO_PAD),
    }
}
