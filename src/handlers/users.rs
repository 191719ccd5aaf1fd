//! User registration and activation handlers.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use chrono::{Duration, Utc};
use serde::Deserialize;
use serde_json::json;
use tracing::{error, instrument};

use crate::error::{AppError, AppResult};
use crate::models::user::{Password, User};
use crate::models::token::SCOPE_ACTIVATION;
use crate::state::AppState;
use crate::validation::{
    Validator, validate_password_plaintext, validate_token_plaintext, validate_user,
};

/// How long an activation token stays valid.
const ACTIVATION_TOKEN_TTL_DAYS: i64 = 3;

/// Request body for `POST /v1/users`.
#[derive(Debug, Deserialize)]
pub struct RegisterUserRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

/// Register a new (inactive) account.
///
/// Grants the baseline `movies:read` permission, issues an activation token,
/// and hands the welcome mail to a supervised background task - the 202
/// response does not wait for SMTP.
#[instrument(skip(state, payload), fields(email = %payload.email))]
pub async fn register_user(
    State(state): State<AppState>,
    Json(payload): Json<RegisterUserRequest>,
) -> AppResult<(StatusCode, Json<serde_json::Value>)> {
    let mut v = Validator::new();
    validate_user(&mut v, &payload.name, &payload.email);
    validate_password_plaintext(&mut v, &payload.password);
    v.into_result()?;

    let mut user = User {
        id: 0,
        created_at: Utc::now(),
        name: payload.name,
        email: payload.email,
        password: Password::set(&payload.password)?,
        activated: false,
        version: 0,
    };

    state.store.users.create(&mut user).await?;
    state
        .store
        .permissions
        .add_for_user(user.id, &["movies:read"])
        .await?;

    let token = state
        .store
        .tokens
        .new_token(user.id, Duration::days(ACTIVATION_TOKEN_TTL_DAYS), SCOPE_ACTIVATION)
        .await?;

    spawn_welcome_mail(&state, &user, &token.plaintext);

    Ok((StatusCode::ACCEPTED, Json(json!({ "user": user }))))
}

/// Request body for `PUT /v1/users/activated`.
#[derive(Debug, Deserialize)]
pub struct ActivateUserRequest {
    pub token: String,
}

/// Activate an account with an emailed token.
///
/// The activation flip goes through the version-guarded update, so a
/// concurrent edit to the same user surfaces as an edit conflict the client
/// can retry.
#[instrument(skip(state, payload))]
pub async fn activate_user(
    State(state): State<AppState>,
    Json(payload): Json<ActivateUserRequest>,
) -> AppResult<Json<serde_json::Value>> {
    let mut v = Validator::new();
    validate_token_plaintext(&mut v, &payload.token);
    v.into_result()?;

    let mut user = match state
        .store
        .users
        .get_for_token(SCOPE_ACTIVATION, &payload.token)
        .await
    {
        Ok(user) => user,
        Err(AppError::NotFound) => {
            let mut errors = std::collections::BTreeMap::new();
            errors.insert(
                "token".to_string(),
                "invalid or expired activation token".to_string(),
            );
            return Err(AppError::Validation(errors));
        }
        Err(err) => return Err(err),
    };

    user.activated = true;
    state.store.users.update(&mut user).await?;

    // The token served its purpose; revoke any others issued for this scope.
    state
        .store
        .tokens
        .delete_all_for_user(SCOPE_ACTIVATION, user.id)
        .await?;

    Ok(Json(json!({ "user": user })))
}

/// Queue the welcome mail on the lifecycle supervisor.
pub(crate) fn spawn_welcome_mail(state: &AppState, user: &User, token_plaintext: &str) {
    let mailer = state.mailer.clone();
    let email = user.email.clone();
    let user_id = user.id;
    let token = token_plaintext.to_string();

    state.tasks.spawn(async move {
        if let Err(e) = mailer.send_welcome(&email, user_id, &token).await {
            error!(user_id, error = %e, "failed to send welcome email");
        }
    });
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_register_payload_requires_all_fields() {
        let result: Result<RegisterUserRequest, _> =
            serde_json::from_str(r#"{"name": "Alice", "email": "a@example.com"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_activate_payload_shape() {
        let payload: ActivateUserRequest =
            serde_json::from_str(r#"{"token": "ABCDEFGHIJKLMNOPQRSTUVWXYZ"}"#).unwrap();
        assert_eq!(payload.token.len(), 26);
    }
}
