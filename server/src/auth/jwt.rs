use std::path::Path;

use chrono::Utc;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use rand::Rng;

use crate::auth::middleware::Claims;

/// Load or generate the JWT signing key (256-bit random secret).
/// Key is stored as raw bytes in data_dir/jwt_secret.
pub fn load_or_generate_jwt_secret(data_dir: &str) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
    let key_path = Path::new(data_dir).join("jwt_secret");

    if key_path.exists() {
        let key = std::fs::read(&key_path)?;
        if key.len() == 32 {
            tracing::info!("JWT signing key loaded from {}", key_path.display());
            return Ok(key);
        }
        tracing::warn!("JWT key file has wrong size ({}), regenerating", key.len());
    }

    let key: [u8; 32] = rand::rng().random();
    std::fs::write(&key_path, key)?;
    tracing::info!("JWT signing key generated at {}", key_path.display());
    Ok(key.to_vec())
}

/// Issue an access token. The subject is the user's email address.
pub fn issue_access_token(
    secret: &[u8],
    email: &str,
    ttl_minutes: i64,
) -> Result<String, jsonwebtoken::errors::Error> {
    let now = Utc::now().timestamp();
    let claims = Claims {
        sub: email.to_string(),
        iat: now,
        exp: now + ttl_minutes * 60,
    };

    encode(
        &Header::default(), // HS256
        &claims,
        &EncodingKey::from_secret(secret),
    )
}

/// Verify a bearer token and return its claims, or None if the token is
/// missing, expired, or malformed. Used for WebSocket handshake auth,
/// where any failure maps to a single "invalid token" close code.
pub fn verify_token(secret: &[u8], token: &str) -> Option<Claims> {
    if token.is_empty() {
        return None;
    }
    let validation = Validation::new(jsonwebtoken::Algorithm::HS256);
    decode::<Claims>(token, &DecodingKey::from_secret(secret), &validation)
        .map(|data| data.claims)
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issued_token_round_trips() {
        let secret = b"0123456789abcdef0123456789abcdef".to_vec();
        let token = issue_access_token(&secret, "alice@example.com", 30).unwrap();
        let claims = verify_token(&secret, &token).expect("token should verify");
        assert_eq!(claims.sub, "alice@example.com");
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let secret = b"0123456789abcdef0123456789abcdef".to_vec();
        let other = b"fedcba9876543210fedcba9876543210".to_vec();
        let token = issue_access_token(&secret, "alice@example.com", 30).unwrap();
        assert!(verify_token(&other, &token).is_none());
    }

    #[test]
    fn garbage_token_is_rejected() {
        let secret = b"0123456789abcdef0123456789abcdef".to_vec();
        assert!(verify_token(&secret, "not-a-jwt").is_none());
        assert!(verify_token(&secret, "").is_none());
    }
}
