use rand::RngCore;
use rand::rngs::OsRng;
use base64::{Engine as _, engine::general_purpose};

/// The size of a session token in bytes, before encoding.
pub const SESSION_TOKEN_BYTES: usize = 32;

/// Generates a new random session token.
///
/// The full 256 bits are encoded; the result is never truncated.
///
/// # Returns
///
/// A URL-safe base64-encoded token, 43 characters long.
pub fn generate_session_token() -> String {
    let mut token = [0u8; SESSION_TOKEN_BYTES];
    OsRng.fill_bytes(&mut token);

    general_purpose::URL_SAFE_NO_PAD.encode(token)
}

/// Whether `token` has the shape of a token produced by [`generate_session_token`].
pub fn is_well_formed(token: &str) -> bool {
    token.len() == 43
        && token
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_token_keeps_full_entropy() {
        let token = generate_session_token();
        assert_eq!(token.len(), 43);

        let decoded = general_purpose::URL_SAFE_NO_PAD.decode(&token).unwrap();
        assert_eq!(decoded.len(), SESSION_TOKEN_BYTES);
    }

    #[test]
    fn test_token_is_url_safe() {
        let token = generate_session_token();
        assert!(token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn test_well_formed() {
        assert!(is_well_formed(&generate_session_token()));
        assert!(!is_well_formed(""));
        assert!(!is_well_formed(&"a".repeat(42)));
        assert!(!is_well_formed(&format!("{}=", "a".repeat(42))));
    }

    #[test]
    fn test_tokens_do_not_repeat() {
        let tokens: HashSet<String> = (0..1000).map(|_| generate_session_token()).collect();
        assert_eq!(tokens.len(), 1000);
    }
}
