use std::collections::HashMap;

use async_trait::async_trait;

use creditflow_core::identity::UserProfile;

use crate::ServiceError;

/// Read-only view of the user service. Used to resolve participant
/// profiles and to check that ledger entries point at students.
#[async_trait]
pub trait IdentityDirectory: Send + Sync {
    async fn profile(&self, user_id: &str) -> Result<UserProfile, ServiceError>;
}

/// Directory backed by the user service's HTTP API.
pub struct HttpDirectory {
    base_url: String,
    client: reqwest::Client,
}

impl HttpDirectory {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl IdentityDirectory for HttpDirectory {
    async fn profile(&self, user_id: &str) -> Result<UserProfile, ServiceError> {
        let url = format!("{}/api/users/{user_id}", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ServiceError::Internal(format!("user service request: {e}")))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(ServiceError::NotFound(format!("user {user_id}")));
        }
        if !response.status().is_success() {
            return Err(ServiceError::Internal(format!(
                "user service returned {} for {url}",
                response.status()
            )));
        }

        response
            .json::<UserProfile>()
            .await
            .map_err(|e| ServiceError::Internal(format!("user service response: {e}")))
    }
}

/// Fixed in-memory directory for tests and single-node setups.
#[derive(Default)]
pub struct StaticDirectory {
    users: HashMap<String, UserProfile>,
}

impl StaticDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(mut self, profile: UserProfile) -> Self {
        self.users.insert(profile.user_id.clone(), profile);
        self
    }
}

#[async_trait]
impl IdentityDirectory for StaticDirectory {
    async fn profile(&self, user_id: &str) -> Result<UserProfile, ServiceError> {
        self.users
            .get(user_id)
            .cloned()
            .ok_or_else(|| ServiceError::NotFound(format!("user {user_id}")))
    }
}
