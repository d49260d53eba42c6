use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use super::repo::User;

/// Request body for registration. Every field is optional at the serde
/// layer so a missing key becomes a 400 from our validation instead of a
/// deserializer rejection.
#[derive(Debug, Deserialize)]
pub struct NewUserRequest {
    pub email: Option<String>,
    pub password: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

/// Request body for PUT /user/self. Absent fields are left unchanged;
/// present fields are applied as-is, including empty strings. The timestamp
/// keys are captured only so their presence can be rejected.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateUserRequest {
    pub email: Option<String>,
    pub password: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub account_created: Option<serde_json::Value>,
    pub account_updated: Option<serde_json::Value>,
}

/// Query string of GET /user/verify.
#[derive(Debug, Deserialize)]
pub struct VerifyParams {
    pub token: Option<String>,
}

/// Public part of the user returned to the client.
#[derive(Debug, Serialize)]
pub struct PublicUser {
    pub id: Uuid,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(with = "time::serde::rfc3339")]
    pub account_created: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub account_updated: OffsetDateTime,
}

impl From<User> for PublicUser {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            first_name: user.first_name,
            last_name: user.last_name,
            account_created: user.account_created,
            account_updated: user.account_updated,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_user() -> User {
        User {
            id: Uuid::new_v4(),
            email: "jane.doe@example.com".into(),
            password_hash: "$argon2id$fake".into(),
            first_name: "Jane".into(),
            last_name: "Doe".into(),
            verified: false,
            verification_token: Some("tok".into()),
            account_created: time::macros::datetime!(2024-03-01 12:00:00 UTC),
            account_updated: time::macros::datetime!(2024-03-01 12:00:00 UTC),
        }
    }

    #[test]
    fn public_user_never_contains_password_or_token() {
        let json = serde_json::to_string(&PublicUser::from(sample_user())).unwrap();
        assert!(json.contains("jane.doe@example.com"));
        assert!(json.contains("\"first_name\":\"Jane\""));
        assert!(json.contains("\"last_name\":\"Doe\""));
        assert!(json.contains("2024-03-01T12:00:00Z"));
        assert!(!json.contains("password"));
        assert!(!json.contains("argon2"));
        assert!(!json.contains("tok\""));
        assert!(!json.contains("verification"));
    }

    #[test]
    fn update_request_distinguishes_absent_from_empty() {
        let partial: UpdateUserRequest =
            serde_json::from_str(r#"{"first_name": ""}"#).unwrap();
        assert_eq!(partial.first_name.as_deref(), Some(""));
        assert!(partial.last_name.is_none());
        assert!(partial.password.is_none());
    }

    #[test]
    fn update_request_captures_forbidden_timestamp_keys() {
        let body: UpdateUserRequest =
            serde_json::from_str(r#"{"account_created": "2020-01-01"}"#).unwrap();
        assert!(body.account_created.is_some());
        assert!(body.account_updated.is_none());
    }

    #[test]
    fn new_user_request_tolerates_missing_keys() {
        let body: NewUserRequest = serde_json::from_str(r#"{"email": "a@b.com"}"#).unwrap();
        assert_eq!(body.email.as_deref(), Some("a@b.com"));
        assert!(body.password.is_none());
    }
}
