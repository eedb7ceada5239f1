//! Authentication challenges for Docker registry access
//!
//! A registry answers an unauthenticated request with `401` and a
//! `WWW-Authenticate` header. `Bearer` challenges name a token realm, `Basic`
//! challenges want the credentials on every request.

use crate::config::AuthConfig;
use crate::error::{RegistryError, Result};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use regex::Regex;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::LazyLock;
use tracing::debug;

static PARAM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"([A-Za-z_]+)="([^"]*)""#).expect("static auth parameter regex")
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Challenge {
    Bearer {
        realm: String,
        service: Option<String>,
        scope: Option<String>,
    },
    Basic,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: Option<String>,
    access_token: Option<String>,
}

impl Challenge {
    /// Parse a `WWW-Authenticate` header value. Unknown schemes yield `None`.
    pub fn parse(header: &str) -> Option<Self> {
        let header = header.trim();
        let (scheme, params) = header.split_once(' ').unwrap_or((header, ""));

        if scheme.eq_ignore_ascii_case("basic") {
            return Some(Challenge::Basic);
        }
        if !scheme.eq_ignore_ascii_case("bearer") {
            return None;
        }

        let mut map: HashMap<String, String> = PARAM
            .captures_iter(params)
            .map(|caps| (caps[1].to_ascii_lowercase(), caps[2].to_string()))
            .collect();

        Some(Challenge::Bearer {
            realm: map.remove("realm")?,
            service: map.remove("service"),
            scope: map.remove("scope"),
        })
    }

    /// Produce the `Authorization` header value answering this challenge.
    pub async fn authorize(&self, client: &Client, auth: &AuthConfig) -> Result<String> {
        match self {
            Challenge::Basic => basic_header(auth).ok_or_else(|| {
                RegistryError::Auth("registry requires credentials but none were provided".into())
            }),
            Challenge::Bearer { realm, service, scope } => {
                let mut query = Vec::new();
                if let Some(service) = service {
                    query.push(("service", service.as_str()));
                }
                if let Some(scope) = scope {
                    query.push(("scope", scope.as_str()));
                }

                debug!(realm = %realm, ?scope, "requesting registry token");

                let mut request = client.get(realm).query(&query);
                if let (Some(username), Some(password)) = (&auth.username, &auth.password) {
                    request = request.basic_auth(username, Some(password));
                }

                let response = request.send().await?;
                let status = response.status();
                if !status.is_success() {
                    let body = response.text().await.unwrap_or_default();
                    return Err(RegistryError::Auth(format!(
                        "token request to {} failed with status {}: {}",
                        realm, status, body
                    )));
                }

                let token: TokenResponse = response
                    .json()
                    .await
                    .map_err(|e| RegistryError::Parse(format!("token response: {}", e)))?;

                token
                    .token
                    .or(token.access_token)
                    .map(|token| format!("Bearer {}", token))
                    .ok_or_else(|| RegistryError::Auth(format!("no token in response from {}", realm)))
            }
        }
    }
}

pub(crate) fn basic_header(auth: &AuthConfig) -> Option<String> {
    let (username, password) = (auth.username.as_ref()?, auth.password.as_ref()?);
    let encoded = STANDARD.encode(format!("{}:{}", username, password));
    Some(format!("Basic {}", encoded))
}
