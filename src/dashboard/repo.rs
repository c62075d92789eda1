use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::inference::ConfidenceScores;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Article {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub content: String,
    pub created_at: OffsetDateTime,
}

impl Article {
    pub async fn create(
        db: &PgPool,
        user_id: Uuid,
        title: &str,
        content: &str,
    ) -> anyhow::Result<Article> {
        let article = sqlx::query_as::<_, Article>(
            r#"
            INSERT INTO articles (user_id, title, content)
            VALUES ($1, $2, $3)
            RETURNING id, user_id, title, content, created_at
            "#,
        )
        .bind(user_id)
        .bind(title)
        .bind(content)
        .fetch_one(db)
        .await?;
        Ok(article)
    }

    pub async fn list_by_user(db: &PgPool, user_id: Uuid) -> anyhow::Result<Vec<Article>> {
        let rows = sqlx::query_as::<_, Article>(
            r#"
            SELECT id, user_id, title, content, created_at
            FROM articles
            WHERE user_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(db)
        .await?;
        Ok(rows)
    }
}

/// Raw row shape; scores live in a JSONB column whose key order is not
/// trustworthy for legacy records.
#[derive(Debug, Clone, FromRow)]
struct ResultRow {
    id: Uuid,
    user_id: Uuid,
    image_path: String,
    prediction: String,
    explanation: String,
    confidence_scores: serde_json::Value,
    created_at: OffsetDateTime,
}

/// A stored prediction. Scores are re-canonicalized on every read, so even
/// records written before the fixed ordering come back in canonical form.
#[derive(Debug, Clone, Serialize)]
pub struct PredictionResult {
    pub id: Uuid,
    pub user_id: Uuid,
    pub image_path: String,
    pub prediction: String,
    pub explanation: String,
    pub confidence_scores: ConfidenceScores,
    pub created_at: OffsetDateTime,
}

impl From<ResultRow> for PredictionResult {
    fn from(row: ResultRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            image_path: row.image_path,
            prediction: row.prediction,
            explanation: row.explanation,
            confidence_scores: ConfidenceScores::canonicalize(&row.confidence_scores),
            created_at: row.created_at,
        }
    }
}

impl PredictionResult {
    /// Insert-only; results are never overwritten or mutated.
    pub async fn append(
        db: &PgPool,
        user_id: Uuid,
        image_path: &str,
        prediction: &str,
        explanation: &str,
        scores: ConfidenceScores,
    ) -> anyhow::Result<PredictionResult> {
        let scores_json = serde_json::to_value(scores)?;
        let row = sqlx::query_as::<_, ResultRow>(
            r#"
            INSERT INTO results (user_id, image_path, prediction, explanation, confidence_scores)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, user_id, image_path, prediction, explanation, confidence_scores, created_at
            "#,
        )
        .bind(user_id)
        .bind(image_path)
        .bind(prediction)
        .bind(explanation)
        .bind(scores_json)
        .fetch_one(db)
        .await?;
        Ok(row.into())
    }

    /// Most recent first.
    pub async fn history(db: &PgPool, user_id: Uuid) -> anyhow::Result<Vec<PredictionResult>> {
        let rows = sqlx::query_as::<_, ResultRow>(
            r#"
            SELECT id, user_id, image_path, prediction, explanation, confidence_scores, created_at
            FROM results
            WHERE user_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(db)
        .await?;
        Ok(rows.into_iter().map(PredictionResult::from).collect())
    }
}
