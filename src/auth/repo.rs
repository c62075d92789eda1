use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

/// User record. The password hash never leaves the server.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub image: Option<String>,
    pub created_at: OffsetDateTime,
}

impl User {
    /// Login accepts either a username or an email address.
    pub async fn find_by_login(db: &PgPool, login: &str) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, username, email, password_hash, image, created_at
            FROM users
            WHERE username = $1 OR email = $1
            "#,
        )
        .bind(login)
        .fetch_optional(db)
        .await?;
        Ok(user)
    }

    pub async fn find_by_email(db: &PgPool, email: &str) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, username, email, password_hash, image, created_at
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(db)
        .await?;
        Ok(user)
    }

    pub async fn find_by_id(db: &PgPool, id: Uuid) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, username, email, password_hash, image, created_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(db)
        .await?;
        Ok(user)
    }

    /// Unique violations (username or email taken) surface as sqlx database
    /// errors with code 23505 and are mapped to Conflict at the boundary.
    pub async fn create(
        db: &PgPool,
        username: &str,
        email: &str,
        password_hash: &str,
    ) -> Result<User, sqlx::Error> {
        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (username, email, password_hash)
            VALUES ($1, $2, $3)
            RETURNING id, username, email, password_hash, image, created_at
            "#,
        )
        .bind(username)
        .bind(email)
        .bind(password_hash)
        .fetch_one(db)
        .await?;
        Ok(user)
    }

    pub async fn update_password(db: &PgPool, id: Uuid, new_hash: &str) -> anyhow::Result<()> {
        sqlx::query(r#"UPDATE users SET password_hash = $2 WHERE id = $1"#)
            .bind(id)
            .bind(new_hash)
            .execute(db)
            .await?;
        Ok(())
    }

    pub async fn update_image(db: &PgPool, id: Uuid, image_path: &str) -> anyhow::Result<()> {
        sqlx::query(r#"UPDATE users SET image = $2 WHERE id = $1"#)
            .bind(id)
            .bind(image_path)
            .execute(db)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_hash_is_never_serialized() {
        let user = User {
            id: Uuid::new_v4(),
            username: "alice".into(),
            email: "alice@x.com".into(),
            password_hash: "$argon2id$secret".into(),
            image: None,
            created_at: OffsetDateTime::UNIX_EPOCH,
        };
        let json = serde_json::to_string(&user).unwrap();
        assert!(!json.contains("password_hash"));
        assert!(!json.contains("argon2id"));
        assert!(json.contains("alice"));
    }
}
