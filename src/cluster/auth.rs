// Peer authentication: an HS256 token over the shared cluster secret.
// The token carries no per-request state; possession of a token signed
// with the right secret is the whole credential.

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
struct PeerClaims {
    sub: String,
}

const PEER_SUBJECT: &str = "confit-node";

pub fn generate_token(secret: &str) -> anyhow::Result<String> {
    let token = encode(
        &Header::new(Algorithm::HS256),
        &PeerClaims {
            sub: PEER_SUBJECT.to_string(),
        },
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;
    Ok(token)
}

pub fn verify_token(token: &str, secret: &str) -> bool {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = false;
    validation.required_spec_claims = Default::default();

    match decode::<PeerClaims>(token, &DecodingKey::from_secret(secret.as_bytes()), &validation) {
        Ok(data) => data.claims.sub == PEER_SUBJECT,
        Err(_) => false,
    }
}
