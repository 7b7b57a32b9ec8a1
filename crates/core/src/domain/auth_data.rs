// Credential payloads exchanged with providers

use serde::{Deserialize, Serialize};

/// Provider credential payload.
///
/// Serialized to canonical JSON before encryption. `Debug` never prints
/// token material.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "@type")]
pub enum AuthData {
    /// OAuth 1.0 style token + secret pair
    TokenSecret { token: String, secret: String },
    /// OAuth 2.0 style access token with refresh information
    TokensAndUrl {
        access_token: String,
        refresh_token: Option<String>,
        token_server_url: String,
    },
    /// Plain bearer token
    Token { token: String },
}

impl AuthData {
    pub fn token_secret(token: impl Into<String>, secret: impl Into<String>) -> Self {
        Self::TokenSecret {
            token: token.into(),
            secret: secret.into(),
        }
    }

    pub fn bearer(token: impl Into<String>) -> Self {
        Self::Token {
            token: token.into(),
        }
    }

    /// Primary token regardless of variant
    pub fn token(&self) -> &str {
        match self {
            AuthData::TokenSecret { token, .. } => token,
            AuthData::TokensAndUrl { access_token, .. } => access_token,
            AuthData::Token { token } => token,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            AuthData::TokenSecret { .. } => "TokenSecret",
            AuthData::TokensAndUrl { .. } => "TokensAndUrl",
            AuthData::Token { .. } => "Token",
        }
    }
}

impl std::fmt::Debug for AuthData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "AuthData::{}(<redacted>)", self.kind())
    }
}

/// Result of starting an authorization flow with a provider
#[derive(Debug, Clone)]
pub struct AuthFlowConfiguration {
    /// URL the user's browser is redirected to
    pub auth_url: String,
    /// Request token for two-step (OAuth 1.0) flows
    pub initial_auth_data: Option<AuthData>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialization_is_tagged() {
        let auth = AuthData::token_secret("t1", "s1");
        let json = serde_json::to_string(&auth).unwrap();
        assert_eq!(json, r#"{"@type":"TokenSecret","token":"t1","secret":"s1"}"#);
        assert_eq!(serde_json::from_str::<AuthData>(&json).unwrap(), auth);
    }

    #[test]
    fn test_debug_hides_tokens() {
        let auth = AuthData::bearer("very-secret");
        let rendered = format!("{:?}", auth);
        assert!(!rendered.contains("very-secret"));
        assert_eq!(rendered, "AuthData::Token(<redacted>)");
    }
}
