use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::dashboard::repo::{Article, PredictionResult};
use crate::inference::ConfidenceScores;

#[derive(Debug, Serialize)]
pub struct DashboardResponse {
    pub message: String,
    pub all_articles: Vec<Article>,
    pub your_predictions: Vec<PredictionResult>,
}

#[derive(Debug, Deserialize)]
pub struct InsertArticleRequest {
    pub title: String,
    pub content: String,
}

#[derive(Debug, Serialize)]
pub struct ArticleResponse {
    pub message: String,
    pub article: Article,
}

#[derive(Debug, Serialize)]
pub struct PredictResponse {
    pub message: String,
    pub prediction: String,
    pub explanation: String,
    pub confidence_scores: ConfidenceScores,
    #[serde(rename = "photoUrl")]
    pub photo_url: String,
}

/// One history row, timestamps pre-formatted for display and the stored
/// image path rewritten to an absolute URL.
#[derive(Debug, Serialize)]
pub struct HistoryEntry {
    pub id: Uuid,
    pub prediction: String,
    pub explanation: String,
    pub confidence_scores: ConfidenceScores,
    #[serde(rename = "createdAt")]
    pub created_at: String,
    #[serde(rename = "photoUrl")]
    pub photo_url: String,
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub message: String,
    pub history: Vec<HistoryEntry>,
}
