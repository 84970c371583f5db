//! services/api/src/adapters/directory.rs
//!
//! This module contains the adapter for the external identity provider's
//! REST API. It implements the `IdentityDirectory` port from the `core`
//! crate.
//!
//! Only two operations of the provider are consumed: verifying a bearer
//! session token, and resolving a user id to its email address. Callers
//! treat both as best-effort; a provider outage must never take a media
//! request down with it.

use async_trait::async_trait;
use music_school_core::ports::{IdentityDirectory, PortError, PortResult};
use serde::Deserialize;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements the `IdentityDirectory` port against the
/// identity provider's REST API.
#[derive(Clone)]
pub struct HttpIdentityDirectory {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpIdentityDirectory {
    /// Creates a new `HttpIdentityDirectory`.
    pub fn new(client: reqwest::Client, base_url: String, api_key: Option<String>) -> Self {
        // A trailing slash would double up when joining paths below.
        let base_url = base_url.trim_end_matches('/').to_string();
        Self {
            client,
            base_url,
            api_key,
        }
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }
}

//=========================================================================================
// Provider Response Payloads
//=========================================================================================

#[derive(Deserialize)]
struct VerifiedSession {
    user_id: String,
}

#[derive(Deserialize)]
struct DirectoryEmail {
    email_address: String,
}

/// The provider returns either a list of addresses or a single `email`
/// field depending on API version; tolerate both.
#[derive(Deserialize)]
struct DirectoryUser {
    #[serde(default)]
    email_addresses: Vec<DirectoryEmail>,
    #[serde(default)]
    email: Option<String>,
}

impl DirectoryUser {
    fn primary_email(self) -> Option<String> {
        self.email
            .or_else(|| self.email_addresses.into_iter().next().map(|e| e.email_address))
    }
}

//=========================================================================================
// `IdentityDirectory` Trait Implementation
//=========================================================================================

#[async_trait]
impl IdentityDirectory for HttpIdentityDirectory {
    async fn verify_session(&self, token: &str) -> PortResult<Option<String>> {
        let url = format!("{}/v1/sessions/verify", self.base_url);
        let response = self
            .authorized(self.client.post(&url))
            .json(&serde_json::json!({ "token": token }))
            .send()
            .await
            .map_err(|e| PortError::Unavailable(e.to_string()))?;

        if !response.status().is_success() {
            // An unverifiable token is a normal outcome, not an error.
            return Ok(None);
        }

        let session: VerifiedSession = response
            .json()
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        Ok(Some(session.user_id))
    }

    async fn email_for_user(&self, user_id: &str) -> PortResult<Option<String>> {
        let url = format!("{}/v1/users/{}", self.base_url, user_id);
        let response = self
            .authorized(self.client.get(&url))
            .send()
            .await
            .map_err(|e| PortError::Unavailable(e.to_string()))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(PortError::Unexpected(format!(
                "Identity provider returned {}",
                response.status()
            )));
        }

        let user: DirectoryUser = response
            .json()
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        Ok(user.primary_email())
    }
}
