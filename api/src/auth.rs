use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use uuid::Uuid;

use tempo_core::model::Plan;

use crate::error::AppError;
use crate::state::AppState;
use crate::store::Store;

/// Authenticated user extracted from the `Authorization: Bearer <token>`
/// header. The token is SHA-256-hashed and resolved against the sessions
/// table; only the hash is ever stored or compared.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user_id: Uuid,
}

impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| AppError::Unauthorized {
                message: "Missing Authorization header".to_string(),
                docs_hint: Some(
                    "Include 'Authorization: Bearer <token>' using a session token (tempo_sk_...)."
                        .to_string(),
                ),
            })?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .ok_or_else(|| AppError::Unauthorized {
                message: "Authorization header must use Bearer scheme".to_string(),
                docs_hint: Some("Format: 'Authorization: Bearer <token>'".to_string()),
            })?;

        let token_hash = tempo_core::auth::hash_token(token);
        let user_id = state
            .store
            .session_user(&token_hash)
            .await?
            .ok_or_else(|| AppError::Unauthorized {
                message: "Invalid session token".to_string(),
                docs_hint: Some(
                    "Check that the token is correct and the session has not been revoked."
                        .to_string(),
                ),
            })?;

        Ok(AuthenticatedUser { user_id })
    }
}

/// Entitlement gate for premium-only features. Checks the caller's plan row;
/// a failed lookup is an internal error, not a denial.
pub async fn require_premium(store: &dyn Store, user_id: Uuid) -> Result<(), AppError> {
    let plan = store.user_plan(user_id).await.map_err(|err| {
        tracing::error!(user_id = %user_id, error = %err, "failed to verify user plan");
        AppError::Internal("Could not verify user plan".to_string())
    })?;

    match plan {
        Some(Plan::Premium) => Ok(()),
        _ => {
            tracing::info!(user_id = %user_id, decision = "deny", "premium entitlement check");
            Err(AppError::Forbidden {
                message: "This feature is only available for premium users".to_string(),
                docs_hint: Some("Upgrade to the premium plan to use smart scheduling.".to_string()),
            })
        }
    }
}
