//! Identity collaborator turning a bearer credential into a stable user id.

use std::{sync::Arc, time::Duration};

use futures::future::BoxFuture;
use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Verified identity attached to a member.
#[derive(Debug, Clone)]
pub struct VerifiedUser {
    pub user_id: String,
    pub photo_url: Option<String>,
}

/// Failures of the identity collaborator. Verification failure is never a
/// hard failure for joining; callers downgrade to unauthenticated.
#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("no token verifier configured")]
    NotConfigured,
    #[error("token rejected")]
    Rejected,
    #[error("verifier request failed")]
    Request(#[source] reqwest::Error),
    #[error("verifier response malformed")]
    Decode(#[source] reqwest::Error),
}

/// Capability: verify a bearer token.
pub trait TokenVerifier: Send + Sync {
    fn verify(&self, token: &str) -> BoxFuture<'static, Result<VerifiedUser, VerifyError>>;
}

/// Adapter POSTing the token to a configured verification endpoint.
pub struct HttpTokenVerifier {
    client: Client,
    endpoint: Option<Arc<str>>,
}

impl HttpTokenVerifier {
    pub fn new(endpoint: Option<String>) -> Self {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("default reqwest client");
        Self {
            client,
            endpoint: endpoint.map(Arc::from),
        }
    }
}

#[derive(Debug, Deserialize)]
struct VerifyResponse {
    #[serde(rename = "userId")]
    user_id: String,
    #[serde(rename = "photoURL", default)]
    photo_url: Option<String>,
}

impl TokenVerifier for HttpTokenVerifier {
    fn verify(&self, token: &str) -> BoxFuture<'static, Result<VerifiedUser, VerifyError>> {
        let client = self.client.clone();
        let endpoint = self.endpoint.clone();
        let token = token.to_string();
        Box::pin(async move {
            let Some(endpoint) = endpoint else {
                return Err(VerifyError::NotConfigured);
            };

            let response = client
                .post(endpoint.as_ref())
                .json(&serde_json::json!({ "token": token }))
                .send()
                .await
                .map_err(VerifyError::Request)?;

            if !response.status().is_success() {
                return Err(VerifyError::Rejected);
            }

            let body: VerifyResponse = response.json().await.map_err(VerifyError::Decode)?;
            Ok(VerifiedUser {
                user_id: body.user_id,
                photo_url: body.photo_url,
            })
        })
    }
}
