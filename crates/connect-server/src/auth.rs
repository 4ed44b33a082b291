//! Admin Authentication
//!
//! HTTP Basic auth for the admin-only provisioning endpoint. Both the
//! username and password compare in constant time.

use axum::http::HeaderMap;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use subtle::ConstantTimeEq;

use connect_core::{ConnectError, Result};

/// Expected admin credentials
#[derive(Clone)]
pub struct AdminCredentials {
    username: String,
    password: String,
}

impl AdminCredentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Verify the `Authorization: Basic` header on a request
    pub fn verify(&self, headers: &HeaderMap) -> Result<()> {
        let header = headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ConnectError::Authentication("missing authorization header".into()))?;

        let encoded = header
            .strip_prefix("Basic ")
            .ok_or_else(|| ConnectError::Authentication("expected basic authorization".into()))?;

        let decoded = STANDARD
            .decode(encoded)
            .map_err(|_| ConnectError::Authentication("malformed authorization header".into()))?;
        let decoded = String::from_utf8(decoded)
            .map_err(|_| ConnectError::Authentication("malformed authorization header".into()))?;

        let (username, password) = decoded
            .split_once(':')
            .ok_or_else(|| ConnectError::Authentication("malformed credentials".into()))?;

        let username_ok: bool = username
            .as_bytes()
            .ct_eq(self.username.as_bytes())
            .into();
        let password_ok: bool = password
            .as_bytes()
            .ct_eq(self.password.as_bytes())
            .into();

        if username_ok && password_ok {
            Ok(())
        } else {
            Err(ConnectError::Authentication(
                "invalid admin credentials".into(),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers_with(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::AUTHORIZATION,
            value.parse().unwrap(),
        );
        headers
    }

    fn basic(username: &str, password: &str) -> String {
        format!("Basic {}", STANDARD.encode(format!("{username}:{password}")))
    }

    #[test]
    fn correct_credentials_pass() {
        let creds = AdminCredentials::new("admin", "hunter2");
        assert!(creds.verify(&headers_with(&basic("admin", "hunter2"))).is_ok());
    }

    #[test]
    fn wrong_credentials_fail() {
        let creds = AdminCredentials::new("admin", "hunter2");
        assert!(creds.verify(&headers_with(&basic("admin", "wrong"))).is_err());
        assert!(creds.verify(&headers_with(&basic("other", "hunter2"))).is_err());
    }

    #[test]
    fn missing_or_malformed_header_fails() {
        let creds = AdminCredentials::new("admin", "hunter2");
        assert!(creds.verify(&HeaderMap::new()).is_err());
        assert!(creds.verify(&headers_with("Bearer token")).is_err());
        assert!(creds.verify(&headers_with("Basic not-base64!")).is_err());
    }
}
