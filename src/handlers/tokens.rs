//! Token issuance handlers.

use std::collections::BTreeMap;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use chrono::Duration;
use serde::Deserialize;
use serde_json::json;
use tracing::instrument;

use crate::error::{AppError, AppResult};
use crate::handlers::users::spawn_welcome_mail;
use crate::models::token::{SCOPE_ACTIVATION, SCOPE_AUTHENTICATION};
use crate::state::AppState;
use crate::validation::{Validator, validate_email, validate_password_plaintext};

/// How long an authentication token stays valid.
const AUTHENTICATION_TOKEN_TTL_DAYS: i64 = 1;

/// Request body for `POST /v1/tokens/authentication`.
#[derive(Debug, Deserialize)]
pub struct CreateAuthTokenRequest {
    pub email: String,
    pub password: String,
}

/// Exchange email + password for a bearer token.
#[instrument(skip(state, payload), fields(email = %payload.email))]
pub async fn create_authentication_token(
    State(state): State<AppState>,
    Json(payload): Json<CreateAuthTokenRequest>,
) -> AppResult<(StatusCode, Json<serde_json::Value>)> {
    let mut v = Validator::new();
    validate_email(&mut v, &payload.email);
    validate_password_plaintext(&mut v, &payload.password);
    v.into_result()?;

    // An unknown email and a wrong password produce the same rejection, so
    // the endpoint doesn't confirm which addresses have accounts.
    let user = match state.store.users.get_by_email(&payload.email).await {
        Ok(user) => user,
        Err(AppError::NotFound) => return Err(AppError::InvalidCredential),
        Err(err) => return Err(err),
    };

    if !user.password.matches(&payload.password)? {
        return Err(AppError::InvalidCredential);
    }

    let token = state
        .store
        .tokens
        .new_token(
            user.id,
            Duration::days(AUTHENTICATION_TOKEN_TTL_DAYS),
            SCOPE_AUTHENTICATION,
        )
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({ "authentication_token": token })),
    ))
}

/// Request body for `POST /v1/tokens/activation`.
#[derive(Debug, Deserialize)]
pub struct ResendActivationRequest {
    pub email: String,
}

/// Issue a fresh activation token for a not-yet-activated account and mail
/// it in the background.
#[instrument(skip(state, payload), fields(email = %payload.email))]
pub async fn resend_activation_token(
    State(state): State<AppState>,
    Json(payload): Json<ResendActivationRequest>,
) -> AppResult<(StatusCode, Json<serde_json::Value>)> {
    let mut v = Validator::new();
    validate_email(&mut v, &payload.email);
    v.into_result()?;

    let user = match state.store.users.get_by_email(&payload.email).await {
        Ok(user) => user,
        Err(AppError::NotFound) => {
            let mut errors = BTreeMap::new();
            errors.insert(
                "email".to_string(),
                "no matching email address found".to_string(),
            );
            return Err(AppError::Validation(errors));
        }
        Err(err) => return Err(err),
    };

    if user.activated {
        let mut errors = BTreeMap::new();
        errors.insert(
            "email".to_string(),
            "user has already been activated".to_string(),
        );
        return Err(AppError::Validation(errors));
    }

    let token = state
        .store
        .tokens
        .new_token(user.id, Duration::days(3), SCOPE_ACTIVATION)
        .await?;

    spawn_welcome_mail(&state, &user, &token.plaintext);

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({
            "message": "an email will be sent to you containing activation instructions"
        })),
    ))
}
