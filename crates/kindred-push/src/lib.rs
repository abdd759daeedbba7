//! Push delivery to mobile devices via FCM's HTTP v1 API.
//!
//! The rest of the system only sees [`PushGateway`]: hand it a device
//! token and a notification and it either delivers or fails. Failures
//! are the caller's problem to log and swallow; a notification counts
//! as sent once it is durably stored.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use chrono::Utc;
use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::Mutex;
use tracing::debug;

use kindred_types::models::Notification;

const FIREBASE_SCOPE: &str = "https://www.googleapis.com/auth/firebase.messaging";
const OAUTH_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// Access tokens are valid for an hour; refresh a little early.
const TOKEN_TTL: Duration = Duration::from_secs(55 * 60);

pub trait PushGateway: Send + Sync {
    fn deliver<'a>(
        &'a self,
        token: &'a str,
        notification: &'a Notification,
    ) -> BoxFuture<'a, Result<()>>;
}

/// Wired in when FCM credentials are not configured. Every dispatch
/// attempt succeeds without doing anything.
pub struct DisabledPush;

impl PushGateway for DisabledPush {
    fn deliver<'a>(
        &'a self,
        _token: &'a str,
        notification: &'a Notification,
    ) -> BoxFuture<'a, Result<()>> {
        debug!(
            notification_id = %notification.id,
            "push gateway disabled, skipping dispatch"
        );
        Box::pin(async { Ok(()) })
    }
}

#[derive(Debug, Serialize)]
struct ServiceAccountClaims {
    iss: String,
    scope: String,
    aud: String,
    exp: i64,
    iat: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

struct CachedToken {
    access_token: String,
    fetched_at: std::time::Instant,
}

pub struct FcmClient {
    http: reqwest::Client,
    project_id: String,
    client_email: String,
    private_key_pem: String,
    token: Mutex<Option<CachedToken>>,
}

impl FcmClient {
    /// Reads `FCM_PROJECT_ID`, `FCM_CLIENT_EMAIL` and `FCM_PRIVATE_KEY`.
    /// Returns `None` when any of them is absent so the server can fall
    /// back to [`DisabledPush`].
    pub fn from_env() -> Option<Arc<Self>> {
        let project_id = std::env::var("FCM_PROJECT_ID").ok()?;
        let client_email = std::env::var("FCM_CLIENT_EMAIL").ok()?;
        let private_key = std::env::var("FCM_PRIVATE_KEY").ok()?;
        Some(Arc::new(Self::new(project_id, client_email, private_key)))
    }

    pub fn new(project_id: String, client_email: String, private_key_pem: String) -> Self {
        // Env vars often carry the key with literal \n sequences.
        let private_key_pem = private_key_pem.replace("\\n", "\n");
        Self {
            http: reqwest::Client::new(),
            project_id,
            client_email,
            private_key_pem,
            token: Mutex::new(None),
        }
    }

    /// Service-account OAuth flow: sign a JWT with the account's RSA
    /// key, exchange it for a bearer token, cache until near expiry.
    async fn access_token(&self) -> Result<String> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if token.fetched_at.elapsed() < TOKEN_TTL {
                return Ok(token.access_token.clone());
            }
        }

        let now = Utc::now().timestamp();
        let claims = ServiceAccountClaims {
            iss: self.client_email.clone(),
            scope: FIREBASE_SCOPE.to_string(),
            aud: OAUTH_TOKEN_URL.to_string(),
            exp: now + 3600,
            iat: now,
        };

        let key = jsonwebtoken::EncodingKey::from_rsa_pem(self.private_key_pem.as_bytes())
            .context("invalid FCM private key")?;
        let assertion = jsonwebtoken::encode(
            &jsonwebtoken::Header::new(jsonwebtoken::Algorithm::RS256),
            &claims,
            &key,
        )
        .context("failed to sign service account JWT")?;

        let response = self
            .http
            .post(OAUTH_TOKEN_URL)
            .form(&[
                ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
                ("assertion", assertion.as_str()),
            ])
            .send()
            .await
            .context("token exchange request failed")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("token exchange failed: {status} {body}"));
        }

        let token: TokenResponse = response
            .json()
            .await
            .context("malformed token exchange response")?;

        let access_token = token.access_token.clone();
        *cached = Some(CachedToken {
            access_token: token.access_token,
            fetched_at: std::time::Instant::now(),
        });
        Ok(access_token)
    }

    async fn send(&self, device_token: &str, notification: &Notification) -> Result<()> {
        let access_token = self.access_token().await?;

        let mut data = json!({
            "click_action": "FLUTTER_NOTIFICATION_CLICK",
            "type": notification.kind,
            "id": notification.id,
            "userId": notification.user_id,
        });
        if let Some(metadata) = &notification.metadata {
            data["metadata"] = json!(metadata);
        }

        let message = json!({
            "message": {
                "token": device_token,
                "notification": {
                    "title": notification.title,
                    "body": notification.body,
                },
                "data": data,
            }
        });

        let url = format!(
            "https://fcm.googleapis.com/v1/projects/{}/messages:send",
            self.project_id
        );
        let response = self
            .http
            .post(&url)
            .bearer_auth(access_token)
            .json(&message)
            .send()
            .await
            .context("FCM request failed")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("FCM rejected message: {status} {body}"));
        }

        debug!(notification_id = %notification.id, "FCM dispatch accepted");
        Ok(())
    }
}

impl PushGateway for FcmClient {
    fn deliver<'a>(
        &'a self,
        token: &'a str,
        notification: &'a Notification,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(self.send(token, notification))
    }
}
