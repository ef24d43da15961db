//! Identity claims delivered by the external identity provider.

use base64::Engine;
use crm_core::{CrmError, CrmResult};
use serde::{Deserialize, Serialize};

/// The signed-in user as described by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityClaims {
    /// Provider subject id.
    #[serde(rename = "id", alias = "sub", default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,
}

impl IdentityClaims {
    /// Read the claims from the payload segment of a JWT identity token.
    ///
    /// The signature is NOT verified: the claims are trusted as delivered.
    pub fn from_id_token(token: &str) -> CrmResult<Self> {
        let mut parts = token.trim().split('.');
        let payload = match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(_header), Some(payload), Some(_signature), None) => payload,
            _ => {
                return Err(CrmError::validation(
                    "identity token must have three dot-separated parts",
                ))
            }
        };
        let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
            .decode(payload.trim_end_matches('='))
            .map_err(|e| CrmError::Validation(format!("identity token payload: {e}")))?;
        let claims: IdentityClaims = serde_json::from_slice(&bytes)?;
        if claims.subject.is_none() && claims.email.is_none() {
            return Err(CrmError::validation(
                "identity token carries neither subject nor email",
            ));
        }
        Ok(claims)
    }

    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .or(self.email.as_deref())
            .unwrap_or("Unknown user")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(payload: serde_json::Value) -> String {
        let engine = base64::engine::general_purpose::URL_SAFE_NO_PAD;
        format!(
            "{}.{}.{}",
            engine.encode(br#"{"alg":"RS256","typ":"JWT"}"#),
            engine.encode(payload.to_string()),
            engine.encode(b"signature")
        )
    }

    #[test]
    fn test_decode_google_style_token() {
        let t = token(serde_json::json!({
            "sub": "1122334455",
            "name": "Alex Johnson",
            "email": "alex.johnson@example.com",
            "picture": "https://example.com/alex.png",
            "iss": "accounts.example.com"
        }));
        let claims = IdentityClaims::from_id_token(&t).unwrap();
        assert_eq!(claims.subject.as_deref(), Some("1122334455"));
        assert_eq!(claims.display_name(), "Alex Johnson");
    }

    #[test]
    fn test_rejects_malformed_tokens() {
        assert!(IdentityClaims::from_id_token("not-a-token").is_err());
        assert!(IdentityClaims::from_id_token("a.b.c.d").is_err());
        assert!(IdentityClaims::from_id_token("a.%%%.c").is_err());
        let anonymous = token(serde_json::json!({ "name": "Nobody" }));
        assert!(matches!(
            IdentityClaims::from_id_token(&anonymous),
            Err(CrmError::Validation(_))
        ));
    }

    #[test]
    fn test_stored_form_uses_id_key() {
        let claims = IdentityClaims {
            subject: Some("42".into()),
            name: None,
            email: Some("a@example.com".into()),
            picture: None,
        };
        let json = serde_json::to_value(&claims).unwrap();
        assert_eq!(json, serde_json::json!({ "id": "42", "email": "a@example.com" }));
        assert_eq!(claims.display_name(), "a@example.com");
    }
}
