//! Admin capability grant via the external authorization provider.
//!
//! One GET to the provider decides whether an identity may upload. The check
//! fails closed: any transport error, malformed body, or non-administrator
//! status is a denial. Nothing here is retried; after a denial the user must
//! explicitly re-attempt. The resulting [`AdminCapability`] gates the upload
//! affordance inside this process only — it is not a trust boundary.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Deserialize;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::clock::Clock;
use crate::config::AuthConfig;

/// The sole member status that grants upload rights.
const ADMINISTRATOR_STATUS: &str = "administrator";

/// Transport or decoding failure while consulting the provider.
#[derive(Debug, Error)]
pub enum AuthProviderError {
    #[error("Provider request failed: {0}")]
    Transport(String),

    #[error("Provider response could not be decoded: {0}")]
    Decode(String),

    #[error("Provider rejected the request: {description}")]
    Rejected { description: String },
}

/// Why a capability request was refused.
#[derive(Debug, Error)]
pub enum GateDenied {
    #[error("Identity is not an administrator (status: {status})")]
    NotAdministrator { status: String },

    #[error("Authorization provider failed: {0}")]
    Provider(#[from] AuthProviderError),
}

/// Provider response body for a member lookup.
#[derive(Debug, Clone, Deserialize)]
pub struct MemberCheckResponse {
    pub ok: bool,
    #[serde(default)]
    pub result: Option<MemberInfo>,
}

/// Member record inside a provider response.
#[derive(Debug, Clone, Deserialize)]
pub struct MemberInfo {
    pub status: String,
}

/// Boundary to the external authorization provider.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Fetch the member record for `user_id` within `chat_id`.
    async fn check_member(
        &self,
        chat_id: &str,
        user_id: &str,
    ) -> Result<MemberCheckResponse, AuthProviderError>;
}

/// HTTP client for the provider's `getChatMember` endpoint.
pub struct HttpAuthProvider {
    client: reqwest::Client,
    base_url: String,
}

impl HttpAuthProvider {
    pub fn new(config: &AuthConfig) -> Result<Self, AuthProviderError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| AuthProviderError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            base_url: format!(
                "{}/bot{}",
                config.provider_base_url.trim_end_matches('/'),
                config.bot_token
            ),
        })
    }
}

#[async_trait]
impl AuthProvider for HttpAuthProvider {
    async fn check_member(
        &self,
        chat_id: &str,
        user_id: &str,
    ) -> Result<MemberCheckResponse, AuthProviderError> {
        let url = format!("{}/getChatMember", self.base_url);

        let response = self
            .client
            .get(&url)
            .query(&[("chat_id", chat_id), ("user_id", user_id)])
            .send()
            .await
            .map_err(|e| AuthProviderError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(AuthProviderError::Rejected {
                description: format!("HTTP {}", response.status()),
            });
        }

        response
            .json::<MemberCheckResponse>()
            .await
            .map_err(|e| AuthProviderError::Decode(e.to_string()))
    }
}

/// Proof that the provider granted upload rights to an identity.
///
/// Only [`AdminGate`] mints these; holding one is what authorizes
/// [`MediaIngest::ingest`](crate::media_ingest::MediaIngest::ingest).
#[derive(Debug, Clone)]
pub struct AdminCapability {
    token: Uuid,
    user_id: String,
    granted_at: DateTime<Utc>,
}

impl AdminCapability {
    pub fn token(&self) -> Uuid {
        self.token
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn granted_at(&self) -> DateTime<Utc> {
        self.granted_at
    }

    #[cfg(test)]
    pub(crate) fn for_tests(user_id: &str) -> Self {
        Self {
            token: Uuid::new_v4(),
            user_id: user_id.to_string(),
            granted_at: Utc::now(),
        }
    }
}

/// Gate in front of the upload path.
pub struct AdminGate {
    provider: Arc<dyn AuthProvider>,
    clock: Arc<dyn Clock>,
    chat_id: String,
}

impl AdminGate {
    pub fn new(
        provider: Arc<dyn AuthProvider>,
        clock: Arc<dyn Clock>,
        chat_id: impl Into<String>,
    ) -> Self {
        Self {
            provider,
            clock,
            chat_id: chat_id.into(),
        }
    }

    /// Ask the provider whether `user_id` administers the configured group.
    ///
    /// Grants a capability only for an explicit `administrator` status; every
    /// other outcome, including provider failure, is a denial.
    pub async fn request_admin_capability(
        &self,
        user_id: &str,
    ) -> Result<AdminCapability, GateDenied> {
        let response = match self.provider.check_member(&self.chat_id, user_id).await {
            Ok(response) => response,
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "Authorization provider check failed");
                metrics::counter!("admin.denied").increment(1);
                return Err(GateDenied::Provider(e));
            }
        };

        let status = response
            .result
            .filter(|_| response.ok)
            .map(|member| member.status)
            .unwrap_or_else(|| "unknown".to_string());

        if status == ADMINISTRATOR_STATUS {
            let capability = AdminCapability {
                token: Uuid::new_v4(),
                user_id: user_id.to_string(),
                granted_at: self.clock.now(),
            };
            info!(user_id = %user_id, token = %capability.token, "Admin capability granted");
            metrics::counter!("admin.granted").increment(1);
            Ok(capability)
        } else {
            warn!(user_id = %user_id, status = %status, "Admin capability denied");
            metrics::counter!("admin.denied").increment(1);
            Err(GateDenied::NotAdministrator { status })
        }
    }
}

/// Process-wide holder for the granted capability.
///
/// The capability itself is threaded into ingest calls; this holder is only
/// where the service boundary keeps it between requests. Never persisted,
/// cleared only by restart.
#[derive(Default)]
pub struct AdminSession {
    capability: RwLock<Option<AdminCapability>>,
}

impl AdminSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn grant(&self, capability: AdminCapability) {
        *self.capability.write() = Some(capability);
    }

    pub fn capability(&self) -> Option<AdminCapability> {
        self.capability.read().clone()
    }

    pub fn is_granted(&self) -> bool {
        self.capability.read().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn gate(provider: MockAuthProvider) -> AdminGate {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        AdminGate::new(Arc::new(provider), clock, "-100123")
    }

    fn member_response(ok: bool, status: Option<&str>) -> MemberCheckResponse {
        MemberCheckResponse {
            ok,
            result: status.map(|s| MemberInfo {
                status: s.to_string(),
            }),
        }
    }

    #[tokio::test]
    async fn administrator_status_grants_capability() {
        let mut provider = MockAuthProvider::new();
        provider
            .expect_check_member()
            .withf(|chat_id, user_id| chat_id == "-100123" && user_id == "42")
            .returning(|_, _| Ok(member_response(true, Some("administrator"))));

        let capability = gate(provider)
            .request_admin_capability("42")
            .await
            .expect("administrator should be granted");

        assert_eq!(capability.user_id(), "42");
    }

    #[tokio::test]
    async fn member_status_is_denied() {
        let mut provider = MockAuthProvider::new();
        provider
            .expect_check_member()
            .returning(|_, _| Ok(member_response(true, Some("member"))));

        let denied = gate(provider)
            .request_admin_capability("42")
            .await
            .expect_err("member must not be granted");

        match denied {
            GateDenied::NotAdministrator { status } => assert_eq!(status, "member"),
            other => panic!("Expected NotAdministrator, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn not_ok_response_is_denied_even_with_admin_status() {
        let mut provider = MockAuthProvider::new();
        provider
            .expect_check_member()
            .returning(|_, _| Ok(member_response(false, Some("administrator"))));

        let denied = gate(provider).request_admin_capability("42").await;
        assert!(matches!(
            denied,
            Err(GateDenied::NotAdministrator { .. })
        ));
    }

    #[tokio::test]
    async fn missing_result_is_denied() {
        let mut provider = MockAuthProvider::new();
        provider
            .expect_check_member()
            .returning(|_, _| Ok(member_response(true, None)));

        let denied = gate(provider).request_admin_capability("42").await;
        assert!(matches!(
            denied,
            Err(GateDenied::NotAdministrator { .. })
        ));
    }

    #[tokio::test]
    async fn provider_failure_fails_closed() {
        let mut provider = MockAuthProvider::new();
        provider.expect_check_member().returning(|_, _| {
            Err(AuthProviderError::Transport("connection refused".to_string()))
        });

        let denied = gate(provider).request_admin_capability("42").await;
        assert!(matches!(denied, Err(GateDenied::Provider(_))));
    }

    #[test]
    fn session_holds_granted_capability() {
        let session = AdminSession::new();
        assert!(!session.is_granted());
        assert!(session.capability().is_none());

        session.grant(AdminCapability::for_tests("42"));
        assert!(session.is_granted());
        assert_eq!(session.capability().unwrap().user_id(), "42");
    }

    #[test]
    fn member_check_response_decodes_provider_body() {
        let body = r#"{"ok": true, "result": {"status": "administrator"}}"#;
        let response: MemberCheckResponse = serde_json::from_str(body).unwrap();
        assert!(response.ok);
        assert_eq!(response.result.unwrap().status, "administrator");

        let error_body = r#"{"ok": false}"#;
        let response: MemberCheckResponse = serde_json::from_str(error_body).unwrap();
        assert!(!response.ok);
        assert!(response.result.is_none());
    }
}
