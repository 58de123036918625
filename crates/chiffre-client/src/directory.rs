//! HTTP client for the external directory / authentication service.
//!
//! The directory issues session tokens and stores per-user public keys.
//! It is consumed, not implemented, by this crate: three endpoints cover
//! registration, login, and public-key upload.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;

use chiffre_store::Session;

use crate::error::DirectoryError;

/// Client for the directory service.
#[derive(Debug, Clone)]
pub struct DirectoryClient {
    base_url: String,
    http: reqwest::Client,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RegisterRequest<'a> {
    username: &'a str,
    email: &'a str,
    password: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    public_key: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct UploadKeyRequest<'a> {
    public_key: &'a str,
}

/// Identity fields returned by the directory.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct AuthUser {
    pub username: String,
    pub email: String,
}

/// Successful authentication response.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct AuthResponse {
    pub token: String,
    pub user: AuthUser,
}

/// Error body shape the directory uses for rejections.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: Option<String>,
    message: Option<String>,
}

impl AuthResponse {
    /// Convert into the session record persisted by the store.
    pub fn into_session(self) -> Session {
        Session {
            token: self.token,
            username: self.user.username,
            email: self.user.email,
            created_at: Utc::now(),
        }
    }
}

impl DirectoryClient {
    /// Create a client for the directory at `base_url`.
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            base_url,
            http: reqwest::Client::new(),
        }
    }

    /// Register a new account, optionally publishing a public key in the
    /// same call.
    pub async fn register(
        &self,
        username: &str,
        email: &str,
        password: &str,
        public_key: Option<&str>,
    ) -> Result<AuthResponse, DirectoryError> {
        let resp = self
            .http
            .post(format!("{}/api/register", self.base_url))
            .json(&RegisterRequest {
                username,
                email,
                password,
                public_key,
            })
            .send()
            .await?;

        let resp = reject_on_error(resp).await?;
        let auth: AuthResponse = resp
            .json()
            .await
            .map_err(|e| DirectoryError::InvalidResponse(e.to_string()))?;

        info!(user = %auth.user.username, "Registered with directory");
        Ok(auth)
    }

    /// Authenticate an existing account.
    pub async fn login(&self, email: &str, password: &str) -> Result<AuthResponse, DirectoryError> {
        let resp = self
            .http
            .post(format!("{}/api/login", self.base_url))
            .json(&LoginRequest { email, password })
            .send()
            .await?;

        let resp = reject_on_error(resp).await?;
        let auth: AuthResponse = resp
            .json()
            .await
            .map_err(|e| DirectoryError::InvalidResponse(e.to_string()))?;

        info!(user = %auth.user.username, "Logged in with directory");
        Ok(auth)
    }

    /// Upload (or re-upload) the public key under the authenticated
    /// identity.  Idempotent: a republish overwrites the prior record.
    pub async fn upload_public_key(
        &self,
        public_key: &str,
        token: &str,
    ) -> Result<(), DirectoryError> {
        let resp = self
            .http
            .post(format!("{}/api/keys", self.base_url))
            .bearer_auth(token)
            .json(&UploadKeyRequest { public_key })
            .send()
            .await?;

        reject_on_error(resp).await?;
        info!("Public key uploaded to directory");
        Ok(())
    }
}

/// Map a non-2xx response into [`DirectoryError::AuthRejected`], extracting
/// the directory's error message when the body carries one.
async fn reject_on_error(resp: reqwest::Response) -> Result<reqwest::Response, DirectoryError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let body = resp.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&body)
        .ok()
        .and_then(|b| b.error.or(b.message))
        .unwrap_or(body);

    Err(DirectoryError::AuthRejected {
        status: status.as_u16(),
        message,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_response_deserializes() {
        let json = r#"{"token":"tok-1","user":{"username":"alice","email":"alice@example.org"}}"#;
        let auth: AuthResponse = serde_json::from_str(json).unwrap();

        assert_eq!(auth.token, "tok-1");
        assert_eq!(auth.user.username, "alice");
    }

    #[test]
    fn test_into_session_maps_fields() {
        let auth = AuthResponse {
            token: "tok-1".to_string(),
            user: AuthUser {
                username: "alice".to_string(),
                email: "alice@example.org".to_string(),
            },
        };

        let session = auth.into_session();
        assert_eq!(session.token, "tok-1");
        assert_eq!(session.username, "alice");
        assert_eq!(session.email, "alice@example.org");
    }

    #[test]
    fn test_register_request_omits_absent_key() {
        let req = RegisterRequest {
            username: "alice",
            email: "a@b.c",
            password: "pw",
            public_key: None,
        };
        let value = serde_json::to_value(&req).unwrap();
        assert!(value.get("publicKey").is_none());

        let req = RegisterRequest {
            public_key: Some("QUJD"),
            ..req
        };
        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(value["publicKey"], "QUJD");
    }

    #[test]
    fn test_error_body_variants() {
        let body: ErrorBody = serde_json::from_str(r#"{"error":"invalid credentials"}"#).unwrap();
        assert_eq!(body.error.as_deref(), Some("invalid credentials"));

        let body: ErrorBody = serde_json::from_str(r#"{"message":"try later"}"#).unwrap();
        assert_eq!(body.message.as_deref(), Some("try later"));
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let client = DirectoryClient::new("https://dir.example.org/");
        assert_eq!(client.base_url, "https://dir.example.org");
    }
}
