use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

/// The single profile picture a user may own. `user_id` is UNIQUE in the
/// schema, which is what actually enforces the cardinality under races.
#[derive(Debug, Clone, FromRow)]
pub struct ProfileImage {
    pub id: Uuid,
    pub user_id: Uuid,
    pub file_name: String,
    pub url: String,
    pub upload_date: OffsetDateTime,
}

impl ProfileImage {
    pub async fn find_by_user(db: &PgPool, user_id: Uuid) -> anyhow::Result<Option<ProfileImage>> {
        let image = sqlx::query_as::<_, ProfileImage>(
            r#"
            SELECT id, user_id, file_name, url, upload_date
            FROM profile_images
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(db)
        .await?;
        Ok(image)
    }

    pub async fn create(
        db: &PgPool,
        user_id: Uuid,
        file_name: &str,
        url: &str,
    ) -> anyhow::Result<ProfileImage> {
        let image = sqlx::query_as::<_, ProfileImage>(
            r#"
            INSERT INTO profile_images (id, user_id, file_name, url)
            VALUES ($1, $2, $3, $4)
            RETURNING id, user_id, file_name, url, upload_date
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(file_name)
        .bind(url)
        .fetch_one(db)
        .await?;
        Ok(image)
    }

    pub async fn delete(db: &PgPool, id: Uuid) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM profile_images WHERE id = $1")
            .bind(id)
            .execute(db)
            .await?;
        Ok(())
    }
}
