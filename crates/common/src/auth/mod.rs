//! Authentication utilities
//!
//! Provides admin token hashing and header extraction. Tokens are stored
//! as SHA-256 hex digests so configuration never holds the raw secret.

use sha2::{Digest, Sha256};

/// Hash a token for storage or comparison
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

/// Validate a token against a stored hash
pub fn validate_token(token: &str, stored_hash: &str) -> bool {
    hash_token(token) == stored_hash
}

/// Generate a new admin token
pub fn generate_token() -> String {
    let random_bytes: [u8; 32] = rand::random();
    format!("pw_{}", hex::encode(random_bytes))
}

/// Extract a bearer token from an Authorization header value
pub fn extract_bearer(auth_header: &str) -> Option<&str> {
    auth_header.strip_prefix("Bearer ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_roundtrip() {
        let token = "pw_test_12345";
        let hash = hash_token(token);
        assert!(validate_token(token, &hash));
        assert!(!validate_token("wrong_token", &hash));
    }

    #[test]
    fn test_generate_token() {
        let token = generate_token();
        assert!(token.starts_with("pw_"));
        assert!(token.len() > 10);
    }

    #[test]
    fn test_extract_bearer() {
        assert_eq!(extract_bearer("Bearer pw_123"), Some("pw_123"));
        assert_eq!(extract_bearer("pw_123"), None);
        assert_eq!(extract_bearer("Basic abc"), None);
    }
}
