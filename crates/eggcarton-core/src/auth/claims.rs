//! Owner identity from the access token's claim set

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::Deserialize;

use super::error::ClaimsError;

#[derive(Deserialize)]
struct SubjectClaims {
    #[serde(default)]
    sub: String,
}

/// Decode the JWT payload segment and return its `sub` claim.
///
/// The signature is not verified; the vault API does that server-side.
pub fn owner_from_access_token(access_token: &str) -> Result<String, ClaimsError> {
    let parts: Vec<&str> = access_token.split('.').collect();
    if parts.len() != 3 {
        return Err(ClaimsError::MalformedToken);
    }

    // Some issuers pad the segment anyway
    let payload = URL_SAFE_NO_PAD.decode(parts[1].trim_end_matches('='))?;
    let claims: SubjectClaims = serde_json::from_slice(&payload)?;

    if claims.sub.is_empty() {
        return Err(ClaimsError::MissingSubject);
    }

    Ok(claims.sub)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jwt(payload: &str) -> String {
        format!(
            "{}.{}.sig",
            URL_SAFE_NO_PAD.encode(r#"{"alg":"RS256"}"#),
            URL_SAFE_NO_PAD.encode(payload)
        )
    }

    #[test]
    fn test_extracts_subject() {
        let token = jwt(r#"{"sub":"user-123","token_use":"access"}"#);
        assert_eq!(owner_from_access_token(&token).unwrap(), "user-123");
    }

    #[test]
    fn test_wrong_segment_count() {
        assert!(matches!(
            owner_from_access_token("only.two"),
            Err(ClaimsError::MalformedToken)
        ));
    }

    #[test]
    fn test_bad_base64() {
        assert!(matches!(
            owner_from_access_token("a.!!!.c"),
            Err(ClaimsError::Decode(_))
        ));
    }

    #[test]
    fn test_not_json() {
        let token = format!("a.{}.c", URL_SAFE_NO_PAD.encode("not json"));
        assert!(matches!(
            owner_from_access_token(&token),
            Err(ClaimsError::Parse(_))
        ));
    }

    #[test]
    fn test_missing_subject() {
        let token = jwt(r#"{"email":"a@b.c"}"#);
        assert!(matches!(
            owner_from_access_token(&token),
            Err(ClaimsError::MissingSubject)
        ));
    }
}
