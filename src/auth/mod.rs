//! Auth gate
//!
//! Every request is resolved to a member-service user, first from the
//! browser session and then from the member service itself. Requests that
//! resolve to nobody are sent to the sign-in portal unless the path is public.

pub mod members;

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::{IntoResponse, Redirect, Response};
use futures::future::BoxFuture;
use tower_sessions::Session;

use crate::error::AppError;
use crate::models::user::{MemberUser, Permission};
use crate::AppState;

pub use members::MembersClient;

/// Session key holding the cached [`MemberUser`]
pub const SESSION_USER_KEY: &str = "user";

/// Paths reachable without signing in, besides the RFID event endpoints
const PUBLIC_PATHS: [&str; 5] = ["/", "/signin", "/sms", "/tag/live", "/tag_ws"];

/// Source of user identity and permissions
pub trait AuthProvider: Send + Sync {
    /// Resolve the user behind a request's credentials, if any
    fn user_for_request<'a>(&'a self, headers: &'a HeaderMap) -> BoxFuture<'a, Option<MemberUser>>;

    /// List every member holding `permission`
    fn users_with_permission(
        &self,
        permission: Permission,
    ) -> BoxFuture<'_, Result<Vec<MemberUser>, AppError>>;
}

/// User resolved for the current request, inserted by [`auth_gate`]
#[derive(Debug, Clone, Default)]
pub struct CurrentUser(pub Option<MemberUser>);

impl CurrentUser {
    /// Require `permission`, failing with 403 "Insufficient permissions."
    pub fn require(&self, permission: Permission) -> Result<&MemberUser, AppError> {
        self.require_or(permission, AppError::forbidden("Insufficient permissions."))
    }

    /// Require `permission`, failing with the given error
    pub fn require_or(&self, permission: Permission, err: AppError) -> Result<&MemberUser, AppError> {
        match &self.0 {
            Some(user) if user.has_permission(permission) => Ok(user),
            _ => Err(err),
        }
    }
}

pub fn is_public_path(path: &str) -> bool {
    PUBLIC_PATHS.contains(&path) || path.contains("tag/event")
}

/// Sign-in portal URL that returns the user to `path` afterwards
pub fn sign_in_redirect(members_url: &str, path: &str) -> String {
    format!("{}?site=hours&path={}", members_url, urlencoding::encode(path))
}

/// Middleware resolving the current user for every request
pub async fn auth_gate(
    State(state): State<Arc<AppState>>,
    session: Session,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let mut user: Option<MemberUser> = session.get(SESSION_USER_KEY).await?;

    if user.is_none() {
        user = state.auth.user_for_request(request.headers()).await;
        match &user {
            Some(resolved) => {
                tracing::debug!(user_id = resolved.id, "Caching member in session");
                session.insert(SESSION_USER_KEY, resolved).await?;
            }
            None => {
                let path = request.uri().path();
                if !is_public_path(path) {
                    let target = sign_in_redirect(&state.config.members_url, path);
                    return Ok(Redirect::to(&target).into_response());
                }
            }
        }
    }

    request.extensions_mut().insert(CurrentUser(user));
    Ok(next.run(request).await)
}

/// `GET /logout`
pub async fn logout(State(state): State<Arc<AppState>>, session: Session) -> Result<Redirect, AppError> {
    session.remove::<MemberUser>(SESSION_USER_KEY).await?;
    Ok(Redirect::to(&format!("{}/logout", state.config.members_url)))
}
