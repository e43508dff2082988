//! Authentication handling

use extgate_core::{AuthConfig, AuthMode, GatewayError, Result};
use serde::{Deserialize, Serialize};

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

/// What a caller presents on first contact.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct Credentials {
    #[serde(default)]
    pub token: Option<String>,
    /// Optional caller label, recorded on the session.
    #[serde(default)]
    pub principal: Option<String>,
}

impl Credentials {
    pub fn token(token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
            principal: None,
        }
    }
}

/// Who a session belongs to.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Identity {
    pub principal: String,
}

/// Pluggable authentication provider.
#[async_trait::async_trait]
pub trait Authenticator: Send + Sync {
    async fn authenticate(&self, credentials: &Credentials) -> Result<Identity>;
}

/// Shared-secret authenticator driven by `[auth]` config.
#[derive(Clone, Debug)]
pub struct TokenAuthenticator {
    pub mode: AuthMode,
    pub token: Option<String>,
}

impl TokenAuthenticator {
    pub fn from_config(config: &AuthConfig) -> Self {
        Self {
            mode: config.mode.clone(),
            token: config.token.clone(),
        }
    }

    pub fn verify_token(&self, provided: Option<&str>) -> Result<()> {
        match self.mode {
            AuthMode::None => Ok(()),
            AuthMode::Token => {
                let expected = self
                    .token
                    .as_deref()
                    .ok_or_else(|| GatewayError::auth("no token configured"))?;
                let provided = provided.ok_or_else(|| GatewayError::auth("token required"))?;
                if !constant_time_eq(expected.as_bytes(), provided.as_bytes()) {
                    return Err(GatewayError::auth("invalid token"));
                }
                Ok(())
            }
        }
    }
}

#[async_trait::async_trait]
impl Authenticator for TokenAuthenticator {
    async fn authenticate(&self, credentials: &Credentials) -> Result<Identity> {
        self.verify_token(credentials.token.as_deref())?;
        Ok(Identity {
            principal: credentials
                .principal
                .clone()
                .unwrap_or_else(|| "agent".to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_auth() {
        let auth = TokenAuthenticator { mode: AuthMode::Token, token: Some("test-token-123".into()) };
        assert!(auth.verify_token(Some("test-token-123")).is_ok());
        assert!(auth.verify_token(Some("wrong-token")).is_err());
        assert!(auth.verify_token(None).is_err());
    }

    #[test]
    fn test_no_auth() {
        let auth = TokenAuthenticator { mode: AuthMode::None, token: None };
        assert!(auth.verify_token(None).is_ok());
        assert!(auth.verify_token(Some("anything")).is_ok());
    }

    #[test]
    fn token_mode_without_configured_token_rejects() {
        let auth = TokenAuthenticator { mode: AuthMode::Token, token: None };
        let err = auth.verify_token(Some("x")).unwrap_err();
        assert_eq!(err.kind(), extgate_core::ErrorKind::Auth);
    }

    #[tokio::test]
    async fn authenticate_records_principal() {
        let auth = TokenAuthenticator { mode: AuthMode::None, token: None };
        let id = auth
            .authenticate(&Credentials { token: None, principal: Some("crawler".into()) })
            .await
            .unwrap();
        assert_eq!(id.principal, "crawler");
    }
}
