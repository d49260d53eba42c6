use axum::{
    async_trait,
    extract::FromRequestParts,
    http::request::Parts,
};
use base64ct::{Base64, Encoding};
use tracing::warn;

use crate::error::ApiError;
use crate::state::AppState;
use crate::users::repo::User;

use super::password::verify_password;

/// Resolved account of the caller. Every protected route re-authenticates
/// from the `Authorization: Basic` header; there are no sessions.
pub struct AuthUser(pub User);

/// Splits a Basic authorization header into email and password.
pub(crate) fn decode_basic(header: &str) -> Result<(String, String), ApiError> {
    let encoded = header
        .strip_prefix("Basic ")
        .ok_or(ApiError::MissingCredentials)?;
    let raw = Base64::decode_vec(encoded.trim()).map_err(|_| ApiError::MissingCredentials)?;
    let decoded = String::from_utf8(raw).map_err(|_| ApiError::MissingCredentials)?;
    let (email, password) = decoded
        .split_once(':')
        .ok_or(ApiError::MissingCredentials)?;
    Ok((email.to_string(), password.to_string()))
}

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or(ApiError::MissingCredentials)?;

        let (email, password) = decode_basic(header)?;

        // Unknown email and wrong password produce the same error so the
        // response never reveals which half failed.
        let user = User::find_by_email(&state.db, &email)
            .await
            .map_err(ApiError::Internal)?
            .ok_or_else(|| {
                warn!(email = %email, "authentication for unknown email");
                ApiError::InvalidCredentials
            })?;

        if !verify_password(&password, &user.password_hash).map_err(ApiError::Internal)? {
            warn!(user_id = %user.id, "password mismatch");
            return Err(ApiError::InvalidCredentials);
        }

        Ok(AuthUser(user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(creds: &str) -> String {
        format!("Basic {}", Base64::encode_string(creds.as_bytes()))
    }

    #[test]
    fn decodes_well_formed_header() {
        let (email, password) = decode_basic(&encode("a@b.com:pw")).unwrap();
        assert_eq!(email, "a@b.com");
        assert_eq!(password, "pw");
    }

    #[test]
    fn password_may_contain_colons() {
        let (email, password) = decode_basic(&encode("a@b.com:pw:with:colons")).unwrap();
        assert_eq!(email, "a@b.com");
        assert_eq!(password, "pw:with:colons");
    }

    #[test]
    fn rejects_non_basic_scheme() {
        assert!(matches!(
            decode_basic("Bearer abc"),
            Err(ApiError::MissingCredentials)
        ));
    }

    #[test]
    fn rejects_invalid_base64() {
        assert!(matches!(
            decode_basic("Basic ???"),
            Err(ApiError::MissingCredentials)
        ));
    }

    #[test]
    fn rejects_payload_without_colon() {
        let header = encode("no-colon-here");
        assert!(matches!(
            decode_basic(&header),
            Err(ApiError::MissingCredentials)
        ));
    }
}
