use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

use super::repo::ProfileImage;

/// Image metadata returned on upload and retrieval.
#[derive(Debug, Serialize)]
pub struct ImageResponse {
    pub id: Uuid,
    pub file_name: String,
    pub url: String,
    #[serde(with = "time::serde::rfc3339")]
    pub upload_date: OffsetDateTime,
    pub user_id: Uuid,
}

impl From<ProfileImage> for ImageResponse {
    fn from(image: ProfileImage) -> Self {
        Self {
            id: image.id,
            file_name: image.file_name,
            url: image.url,
            upload_date: image.upload_date,
            user_id: image.user_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_response_serialization() {
        let image = ProfileImage {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            file_name: "avatar.png".into(),
            url: "https://bucket.s3.us-east-1.amazonaws.com/u/avatar.png".into(),
            upload_date: time::macros::datetime!(2024-03-01 12:00:00 UTC),
        };
        let json = serde_json::to_string(&ImageResponse::from(image)).unwrap();
        assert!(json.contains("avatar.png"));
        assert!(json.contains("2024-03-01T12:00:00Z"));
        assert!(json.contains("user_id"));
    }
}
