use sqlx::PgPool;

/// Record a token as logged out. Idempotent: revoking a token that is
/// already on the blacklist is a no-op.
pub async fn revoke(db: &PgPool, token: &str) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO token_blacklist (token)
        VALUES ($1)
        ON CONFLICT (token) DO NOTHING
        "#,
    )
    .bind(token)
    .execute(db)
    .await?;
    Ok(())
}

pub async fn is_revoked(db: &PgPool, token: &str) -> anyhow::Result<bool> {
    let row: Option<(String,)> = sqlx::query_as(
        r#"
        SELECT token FROM token_blacklist WHERE token = $1
        "#,
    )
    .bind(token)
    .fetch_optional(db)
    .await?;
    Ok(row.is_some())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[sqlx::test]
    async fn revoke_then_check(pool: PgPool) {
        assert!(!is_revoked(&pool, "token-a").await.unwrap());
        revoke(&pool, "token-a").await.unwrap();
        assert!(is_revoked(&pool, "token-a").await.unwrap());
        // Only the exact string is revoked.
        assert!(!is_revoked(&pool, "token-b").await.unwrap());
    }

    #[sqlx::test]
    async fn double_revoke_is_a_noop(pool: PgPool) {
        revoke(&pool, "token-a").await.unwrap();
        revoke(&pool, "token-a")
            .await
            .expect("revoking an already-revoked token must not error");
        assert!(is_revoked(&pool, "token-a").await.unwrap());
    }
}
