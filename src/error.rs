use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::error;

/// Every failure a handler can surface, mapped to a status code at the
/// boundary. Bodies carry a terse static message and never any credential,
/// token or backtrace material; the full chain is logged server-side.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("missing required fields")]
    MissingFields,
    #[error("invalid email address")]
    InvalidEmail,
    #[error("email already registered")]
    DuplicateEmail,
    #[error("verification token is required")]
    MissingToken,
    #[error("verification token expired")]
    TokenExpired,
    #[error("verification token invalid")]
    TokenInvalid,
    #[error("account already verified")]
    AlreadyVerified,
    #[error("missing or malformed credentials")]
    MissingCredentials,
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("account not verified")]
    NotVerified,
    #[error("account timestamps cannot be updated")]
    ForbiddenFieldUpdate,
    #[error("email cannot be changed")]
    EmailImmutable,
    #[error("only jpg, jpeg, png and gif files are allowed")]
    InvalidFileType,
    #[error("a profile picture already exists")]
    ImageAlreadyExists,
    #[error("request body must be empty")]
    UnexpectedBody,
    #[error("{0}")]
    Validation(&'static str),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::MissingFields
            | ApiError::InvalidEmail
            | ApiError::DuplicateEmail
            | ApiError::MissingToken
            | ApiError::TokenExpired
            | ApiError::TokenInvalid
            | ApiError::AlreadyVerified
            | ApiError::MissingCredentials
            | ApiError::InvalidCredentials
            | ApiError::ForbiddenFieldUpdate
            | ApiError::EmailImmutable
            | ApiError::InvalidFileType
            | ApiError::UnexpectedBody
            | ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::NotVerified | ApiError::ImageAlreadyExists => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            ApiError::Internal(e) => {
                error!(error = ?e, "internal error");
                "internal server error".to_string()
            }
            other => other.to_string(),
        };
        (status, body).into_response()
    }
}

/// True when the error chain bottoms out in a Postgres unique-constraint
/// violation. Used to turn insert races into DuplicateEmail /
/// ImageAlreadyExists instead of a 500.
pub fn is_unique_violation(err: &anyhow::Error) -> bool {
    err.downcast_ref::<sqlx::Error>()
        .and_then(|e| e.as_database_error())
        .and_then(|db| db.code())
        .map(|code| code == "23505")
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_errors_map_to_400() {
        for err in [
            ApiError::MissingFields,
            ApiError::InvalidEmail,
            ApiError::DuplicateEmail,
            ApiError::MissingToken,
            ApiError::TokenExpired,
            ApiError::TokenInvalid,
            ApiError::AlreadyVerified,
            ApiError::MissingCredentials,
            ApiError::InvalidCredentials,
            ApiError::ForbiddenFieldUpdate,
            ApiError::EmailImmutable,
            ApiError::InvalidFileType,
            ApiError::UnexpectedBody,
        ] {
            assert_eq!(err.status(), StatusCode::BAD_REQUEST, "{err}");
        }
    }

    #[test]
    fn gated_and_missing_resources_map_to_403_and_404() {
        assert_eq!(ApiError::NotVerified.status(), StatusCode::FORBIDDEN);
        assert_eq!(ApiError::ImageAlreadyExists.status(), StatusCode::FORBIDDEN);
        assert_eq!(ApiError::NotFound("image").status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn internal_error_hides_detail() {
        let err = ApiError::Internal(anyhow::anyhow!("password=hunter2 leaked"));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        // The message shown to clients comes from into_response, not Display;
        // Display is only ever logged.
    }

    #[test]
    fn unique_violation_detection_ignores_other_errors() {
        let plain = anyhow::anyhow!("nope");
        assert!(!is_unique_violation(&plain));
        let not_db = anyhow::Error::from(sqlx::Error::RowNotFound);
        assert!(!is_unique_violation(&not_db));
    }
}
