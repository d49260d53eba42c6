use axum::{
    extract::{FromRef, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use lazy_static::lazy_static;
use regex::Regex;
use time::OffsetDateTime;
use tracing::{error, info, instrument, warn};

use crate::{
    auth::{
        password::hash_password,
        verification::{TokenError, VerifyKeys},
        AuthUser,
    },
    error::{is_unique_violation, ApiError},
    notify::VerificationMessage,
    state::AppState,
};

use super::{
    dto::{NewUserRequest, PublicUser, UpdateUserRequest, VerifyParams},
    repo::User,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/user", post(create_user))
        .route("/user/verify", get(verify_email))
        .route("/user/self", get(get_self).put(update_self))
}

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

#[instrument(skip(state, payload))]
pub async fn create_user(
    State(state): State<AppState>,
    Json(payload): Json<NewUserRequest>,
) -> Result<(StatusCode, Json<PublicUser>), ApiError> {
    let email = payload
        .email
        .as_deref()
        .map(|e| e.trim().to_lowercase())
        .unwrap_or_default();
    let password = payload.password.unwrap_or_default();
    let first_name = payload.first_name.unwrap_or_default();
    let last_name = payload.last_name.unwrap_or_default();

    if email.is_empty() || password.is_empty() || first_name.is_empty() || last_name.is_empty() {
        warn!("registration with missing fields");
        return Err(ApiError::MissingFields);
    }
    if !is_valid_email(&email) {
        warn!(email = %email, "invalid email");
        return Err(ApiError::InvalidEmail);
    }
    if User::find_by_email(&state.db, &email).await?.is_some() {
        warn!(email = %email, "email already registered");
        return Err(ApiError::DuplicateEmail);
    }

    let hash = hash_password(&password)?;
    // The unique constraint settles the race two concurrent registrations
    // with the same email would otherwise win together.
    let user = match User::create(&state.db, &email, &hash, &first_name, &last_name).await {
        Ok(u) => u,
        Err(e) if is_unique_violation(&e) => {
            warn!(email = %email, "email already registered (concurrent insert)");
            return Err(ApiError::DuplicateEmail);
        }
        Err(e) => return Err(ApiError::Internal(e)),
    };

    let keys = VerifyKeys::from_ref(&state);
    let token = keys.sign(user.id)?;
    User::set_verification_token(&state.db, user.id, &token).await?;

    // Best-effort: the account exists either way, a lost message only delays
    // verification until the user re-requests it.
    let msg = VerificationMessage {
        user_id: user.id,
        email: user.email.clone(),
        token,
        issued_at: OffsetDateTime::now_utc(),
    };
    if let Err(e) = state.notifier.publish_verification(&msg).await {
        error!(error = %e, user_id = %user.id, "verification publish failed");
    }

    info!(user_id = %user.id, email = %user.email, "user registered");
    Ok((StatusCode::CREATED, Json(user.into())))
}

#[instrument(skip(state, params))]
pub async fn verify_email(
    State(state): State<AppState>,
    Query(params): Query<VerifyParams>,
) -> Result<&'static str, ApiError> {
    let token = params
        .token
        .filter(|t| !t.is_empty())
        .ok_or(ApiError::MissingToken)?;

    let keys = VerifyKeys::from_ref(&state);
    let claims = keys.decode(&token).map_err(|e| match e {
        TokenError::Expired => ApiError::TokenExpired,
        TokenError::Invalid => ApiError::TokenInvalid,
    })?;

    let user = User::find_by_id(&state.db, claims.sub)
        .await?
        .ok_or(ApiError::NotFound("user"))?;

    if user.verified {
        return Err(ApiError::AlreadyVerified);
    }
    // A signed token is not enough: it must be the one currently stored, so
    // a consumed or superseded token cannot verify the account.
    if user.verification_token.as_deref() != Some(token.as_str()) {
        warn!(user_id = %user.id, "verification token does not match stored token");
        return Err(ApiError::TokenInvalid);
    }

    User::mark_verified(&state.db, user.id).await?;
    info!(user_id = %user.id, "email verified");
    Ok("email verified")
}

#[instrument(skip_all, fields(user_id = %user.id))]
pub async fn get_self(AuthUser(user): AuthUser) -> Result<Json<PublicUser>, ApiError> {
    if !user.verified {
        return Err(ApiError::NotVerified);
    }
    Ok(Json(user.into()))
}

fn validate_update(payload: &UpdateUserRequest, current_email: &str) -> Result<(), ApiError> {
    if payload.account_created.is_some() || payload.account_updated.is_some() {
        return Err(ApiError::ForbiddenFieldUpdate);
    }
    // Same email is a no-op, a different one is rejected.
    if let Some(email) = payload.email.as_deref() {
        if email != current_email {
            return Err(ApiError::EmailImmutable);
        }
    }
    Ok(())
}

#[instrument(skip_all, fields(user_id = %user.id))]
pub async fn update_self(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(payload): Json<UpdateUserRequest>,
) -> Result<StatusCode, ApiError> {
    if !user.verified {
        return Err(ApiError::NotVerified);
    }
    validate_update(&payload, &user.email)?;

    let password_hash = match payload.password.as_deref() {
        Some(plain) => Some(hash_password(plain)?),
        None => None,
    };

    User::update_profile(
        &state.db,
        user.id,
        payload.first_name.as_deref(),
        payload.last_name.as_deref(),
        password_hash.as_deref(),
    )
    .await?;

    info!(user_id = %user.id, "user updated");
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_conventional_addresses() {
        assert!(is_valid_email("jane.doe@example.com"));
        assert!(is_valid_email("a@b.co"));
        assert!(is_valid_email("first+tag@sub.domain.org"));
    }

    #[test]
    fn rejects_malformed_addresses() {
        assert!(!is_valid_email(""));
        assert!(!is_valid_email("plainaddress"));
        assert!(!is_valid_email("no-tld@domain"));
        assert!(!is_valid_email("two@@example.com"));
        assert!(!is_valid_email("spaces in@example.com"));
    }

    #[test]
    fn update_rejects_timestamp_fields() {
        let payload = UpdateUserRequest {
            account_created: Some(serde_json::json!("2020-01-01")),
            ..Default::default()
        };
        assert!(matches!(
            validate_update(&payload, "a@b.com"),
            Err(ApiError::ForbiddenFieldUpdate)
        ));
    }

    #[test]
    fn update_rejects_email_change() {
        let payload = UpdateUserRequest {
            email: Some("other@b.com".into()),
            ..Default::default()
        };
        assert!(matches!(
            validate_update(&payload, "a@b.com"),
            Err(ApiError::EmailImmutable)
        ));
    }

    #[test]
    fn update_allows_same_email_and_partial_fields() {
        let payload = UpdateUserRequest {
            email: Some("a@b.com".into()),
            first_name: Some("Janet".into()),
            ..Default::default()
        };
        assert!(validate_update(&payload, "a@b.com").is_ok());
    }

    #[test]
    fn update_allows_empty_body() {
        assert!(validate_update(&UpdateUserRequest::default(), "a@b.com").is_ok());
    }
}
