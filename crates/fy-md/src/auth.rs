//! Market-data session credential.
//!
//! The data socket does not take the access token directly. Its auth packet
//! carries the `hsm_key` claim embedded in the access token's JWT payload.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use fy_core::FyError;

/// Extract the `hsm_key` claim from an access token.
///
/// Accepts either the bare JWT or the `client_id:token` form used in the
/// REST `Authorization` header.
pub fn hsm_key(access_token: &str) -> Result<String, FyError> {
    let jwt = access_token.rsplit(':').next().unwrap_or(access_token).trim();
    let payload = jwt
        .split('.')
        .nth(1)
        .ok_or_else(|| FyError::Token("access token is not a JWT".into()))?;

    let decoded = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|e| FyError::Token(format!("access token payload: {e}")))?;

    let claims: serde_json::Value = serde_json::from_slice(&decoded)
        .map_err(|e| FyError::Token(format!("access token claims: {e}")))?;

    claims
        .get("hsm_key")
        .and_then(|v| v.as_str())
        .filter(|k| !k.is_empty())
        .map(str::to_owned)
        .ok_or_else(|| FyError::Token("access token has no hsm_key claim".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jwt(claims: &str) -> String {
        format!(
            "eyJhbGciOiJIUzI1NiJ9.{}.c2lnbmF0dXJl",
            URL_SAFE_NO_PAD.encode(claims)
        )
    }

    #[test]
    fn extracts_hsm_key() {
        let token = jwt(r#"{"sub":"access_token","hsm_key":"5f2b0c"}"#);
        assert_eq!(hsm_key(&token).unwrap(), "5f2b0c");
        assert_eq!(hsm_key(&format!("XX0000-100:{token}")).unwrap(), "5f2b0c");
    }

    #[test]
    fn rejects_tokens_without_claim() {
        assert!(matches!(hsm_key("not-a-jwt"), Err(FyError::Token(_))));
        assert!(matches!(hsm_key(&jwt(r#"{"sub":"x"}"#)), Err(FyError::Token(_))));
        assert!(matches!(hsm_key("a.!!!.c"), Err(FyError::Token(_))));
    }
}
