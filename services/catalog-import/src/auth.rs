//! Authorization for the import endpoint.
//!
//! The HTTP layer asks an [`Authorizer`] for a verdict on the raw
//! `Authorization` header and turns a denial into 401 or 403.

use async_trait::async_trait;
use axum::http::StatusCode;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::collections::HashMap;
use tracing::{debug, warn};

/// Verdict of the authorization collaborator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthDecision {
    Allow,
    Deny,
}

/// External authorization check applied to the import endpoint.
///
/// Receives the raw `Authorization` header, if any.
#[async_trait]
pub trait Authorizer: Send + Sync {
    async fn authorize(&self, authorization: Option<&str>) -> AuthDecision;
}

/// Admits every request
pub struct AllowAll;

#[async_trait]
impl Authorizer for AllowAll {
    async fn authorize(&self, _authorization: Option<&str>) -> AuthDecision {
        AuthDecision::Allow
    }
}

/// HTTP Basic credentials checked against a configured login table.
///
/// Logins match case-insensitively; passwords must match exactly.
pub struct BasicAuthorizer {
    credentials: HashMap<String, String>,
}

impl BasicAuthorizer {
    pub fn new(credentials: impl IntoIterator<Item = (String, String)>) -> Self {
        Self {
            credentials: credentials
                .into_iter()
                .map(|(login, password)| (login.to_lowercase(), password))
                .collect(),
        }
    }

    fn check(&self, authorization: Option<&str>) -> AuthDecision {
        let Some(header) = authorization else {
            debug!("No authorization header provided");
            return AuthDecision::Deny;
        };

        let Some(("Basic", encoded)) = header.trim().split_once(' ') else {
            warn!("Unsupported authorization scheme");
            return AuthDecision::Deny;
        };

        let Some(decoded) = STANDARD
            .decode(encoded.trim())
            .ok()
            .and_then(|bytes| String::from_utf8(bytes).ok())
        else {
            warn!("Undecodable basic credentials");
            return AuthDecision::Deny;
        };

        let Some((login, password)) = decoded.split_once(':') else {
            warn!("Malformed basic credentials");
            return AuthDecision::Deny;
        };

        match self.credentials.get(&login.to_lowercase()) {
            Some(stored) if stored == password => AuthDecision::Allow,
            Some(_) => {
                warn!(login, "Password mismatch");
                AuthDecision::Deny
            }
            None => {
                warn!(login, "Unknown login");
                AuthDecision::Deny
            }
        }
    }
}

#[async_trait]
impl Authorizer for BasicAuthorizer {
    async fn authorize(&self, authorization: Option<&str>) -> AuthDecision {
        self.check(authorization)
    }
}

/// Status to reject with, or `None` to let the request through
pub fn rejection_status(authorization: Option<&str>, decision: AuthDecision) -> Option<StatusCode> {
    match (decision, authorization) {
        (AuthDecision::Allow, _) => None,
        (AuthDecision::Deny, None) => Some(StatusCode::UNAUTHORIZED),
        (AuthDecision::Deny, Some(_)) => Some(StatusCode::FORBIDDEN),
    }
}
