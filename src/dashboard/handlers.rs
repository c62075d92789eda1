use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use time::{
    format_description::FormatItem,
    macros::{format_description, offset},
    OffsetDateTime, UtcOffset,
};
use tracing::{info, instrument, warn};

use bytes::Bytes;

use crate::{
    auth::{extractors::AuthSession, repo::User},
    dashboard::dto::{
        ArticleResponse, DashboardResponse, HistoryEntry, HistoryResponse, InsertArticleRequest,
        PredictResponse,
    },
    dashboard::repo::{Article, PredictionResult},
    error::ApiError,
    inference::ConfidenceScores,
    state::AppState,
    uploads,
};

pub fn dashboard_routes() -> Router<AppState> {
    Router::new()
        .route("/:username/dashboard", get(dashboard))
        .route("/:username/dashboard/insert_article", post(insert_article))
        .route("/:username/dashboard/predict", post(predict))
        .route("/:username/dashboard/history", get(history))
        .layer(DefaultBodyLimit::max(20 * 1024 * 1024)) // 20MB uploads
}

/// Display convention for history timestamps: UTC+7, `2025-Jan-05 13:45:00`.
const DISPLAY_FORMAT: &[FormatItem<'static>] =
    format_description!("[year]-[month repr:short]-[day] [hour]:[minute]:[second]");
const DISPLAY_OFFSET: UtcOffset = offset!(+7);

fn format_display_timestamp(ts: OffsetDateTime) -> String {
    ts.to_offset(DISPLAY_OFFSET)
        .format(&DISPLAY_FORMAT)
        .unwrap_or_default()
}

#[instrument(skip(state, session))]
pub async fn dashboard(
    State(state): State<AppState>,
    session: AuthSession,
) -> Result<Json<DashboardResponse>, ApiError> {
    let user = session.user;
    let articles = Article::list_by_user(&state.db, user.id)
        .await
        .map_err(|e| ApiError::internal("Failed to load dashboard", e))?;
    let results = PredictionResult::history(&state.db, user.id)
        .await
        .map_err(|e| ApiError::internal("Failed to load dashboard", e))?;

    Ok(Json(DashboardResponse {
        message: format!("Hello, {}!", user.username),
        all_articles: articles,
        your_predictions: results,
    }))
}

#[instrument(skip(state, session, payload))]
pub async fn insert_article(
    State(state): State<AppState>,
    session: AuthSession,
    Json(payload): Json<InsertArticleRequest>,
) -> Result<(StatusCode, Json<ArticleResponse>), ApiError> {
    if payload.title.is_empty() || payload.content.is_empty() {
        return Err(ApiError::bad_request("Title and content are required"));
    }

    let article = Article::create(&state.db, session.user.id, &payload.title, &payload.content)
        .await
        .map_err(|e| ApiError::internal("Failed to save article", e))?;

    info!(user_id = %session.user.id, article_id = %article.id, "article created");
    Ok((
        StatusCode::CREATED,
        Json(ArticleResponse {
            message: "Article added".into(),
            article,
        }),
    ))
}

/// Forward the uploaded image to the scoring service, then persist the
/// canonicalized result. Nothing is inserted when scoring fails, so a
/// failed call leaves no partial record (the uploaded file itself stays on
/// disk, as the static area is append-only).
async fn run_prediction(
    state: &AppState,
    user: &User,
    filename: Option<&str>,
    data: Bytes,
) -> Result<PredictResponse, ApiError> {
    if data.is_empty() {
        return Err(ApiError::bad_request("An image must be uploaded"));
    }

    let name = uploads::unique_filename(filename);
    let stored_path = uploads::save_upload(&state.config.upload_dir, &name, &data)
        .await
        .map_err(|e| ApiError::internal("Failed to store upload", e))?;

    let outcome = state.inference.classify(&name, data).await.map_err(|e| {
        warn!(error = %e, user_id = %user.id, "inference call failed");
        ApiError::upstream("Failed to process prediction", e)
    })?;

    let scores = ConfidenceScores::canonicalize(&outcome.confidence_scores);
    let result = PredictionResult::append(
        &state.db,
        user.id,
        &stored_path,
        &outcome.prediction,
        &outcome.explanation,
        scores,
    )
    .await
    .map_err(|e| ApiError::internal("Failed to save prediction", e))?;

    info!(
        user_id = %user.id,
        result_id = %result.id,
        prediction = %result.prediction,
        "prediction stored"
    );
    Ok(PredictResponse {
        message: "Prediction saved".into(),
        prediction: result.prediction,
        explanation: result.explanation,
        confidence_scores: result.confidence_scores,
        photo_url: outcome.photo_url,
    })
}

#[instrument(skip(state, session, mp))]
pub async fn predict(
    State(state): State<AppState>,
    session: AuthSession,
    mut mp: Multipart,
) -> Result<Json<PredictResponse>, ApiError> {
    let Some((filename, data)) = uploads::read_image_field(&mut mp).await? else {
        return Err(ApiError::bad_request("An image must be uploaded"));
    };
    let response = run_prediction(&state, &session.user, filename.as_deref(), data).await?;
    Ok(Json(response))
}

#[instrument(skip(state, session))]
pub async fn history(
    State(state): State<AppState>,
    session: AuthSession,
) -> Result<Json<HistoryResponse>, ApiError> {
    let user = session.user;
    let results = PredictionResult::history(&state.db, user.id)
        .await
        .map_err(|e| ApiError::internal("Failed to load history", e))?;

    let history = results
        .into_iter()
        .map(|r| HistoryEntry {
            id: r.id,
            prediction: r.prediction,
            explanation: r.explanation,
            confidence_scores: r.confidence_scores,
            created_at: format_display_timestamp(r.created_at),
            photo_url: uploads::public_url(&state.config.public_base_url, &r.image_path),
        })
        .collect();

    Ok(Json(HistoryResponse {
        message: format!("Prediction history for {}", user.username),
        history,
    }))
}
