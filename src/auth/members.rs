//! HTTP client for the member service

use axum::http::header::COOKIE;
use axum::http::HeaderMap;
use futures::future::BoxFuture;
use reqwest::Client;

use super::AuthProvider;
use crate::error::AppError;
use crate::models::user::{MemberUser, Permission};

/// Resolves users by forwarding the browser's cookies to the member service
pub struct MembersClient {
    client: Client,
    base_url: String,
}

impl MembersClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    async fn fetch_user(&self, headers: &HeaderMap) -> Option<MemberUser> {
        let cookie = headers.get(COOKIE)?;

        let response = self
            .client
            .get(format!("{}/api/user", self.base_url))
            .header(COOKIE, cookie.clone())
            .send()
            .await
            .map_err(|e| tracing::warn!("Member service lookup failed: {}", e))
            .ok()?;

        if !response.status().is_success() {
            tracing::debug!(status = %response.status(), "Member service did not recognize request");
            return None;
        }

        response
            .json::<MemberUser>()
            .await
            .map_err(|e| tracing::warn!("Malformed member service user: {}", e))
            .ok()
    }

    async fn fetch_users(&self, permission: Permission) -> Result<Vec<MemberUser>, AppError> {
        let users = self
            .client
            .get(format!("{}/api/users", self.base_url))
            .query(&[("permission", permission.as_str())])
            .send()
            .await?
            .error_for_status()?
            .json::<Vec<MemberUser>>()
            .await?;

        Ok(users)
    }
}

impl AuthProvider for MembersClient {
    fn user_for_request<'a>(&'a self, headers: &'a HeaderMap) -> BoxFuture<'a, Option<MemberUser>> {
        Box::pin(self.fetch_user(headers))
    }

    fn users_with_permission(
        &self,
        permission: Permission,
    ) -> BoxFuture<'_, Result<Vec<MemberUser>, AppError>> {
        Box::pin(self.fetch_users(permission))
    }
}
