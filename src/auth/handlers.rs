use axum::{
    extract::{FromRef, Multipart, Path, Query, State},
    http::StatusCode,
    response::Html,
    routing::{get, patch, post},
    Form, Json, Router,
};
use lazy_static::lazy_static;
use regex::Regex;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::{
    auth::{
        blacklist,
        dto::{
            ChangePasswordRequest, ForgotPasswordRequest, ForgotPasswordResponse, LoginRequest,
            LoginResponse, MessageResponse, ProfileResponse, ProfileUser, PublicUser,
            RegisterRequest, RegisterResponse, ResetPasswordForm, ResetTokenQuery, UserInfo,
            UserInfoResponse,
        },
        extractors::AuthSession,
        jwt::JwtKeys,
        password::{hash_password, verify_password},
        repo::User,
    },
    error::ApiError,
    mailer::reset_email_body,
    state::AppState,
    uploads,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/user", get(get_user))
        .route("/auth/profile/edit", patch(edit_profile))
        .route("/auth/change-password", patch(change_password))
        .route("/auth/forgot-password", post(forgot_password))
        .route(
            "/auth/reset-password/:id",
            get(reset_password_form).post(reset_password),
        )
        .route("/auth/logout", post(logout))
}

fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

fn image_link(base: &str, image: Option<&str>) -> Option<String> {
    image.map(|path| uploads::public_url(base, path))
}

/// The reset form reflects the token query value; escape it so a crafted
/// link cannot inject markup.
fn html_escape(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    Json(mut payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<RegisterResponse>), ApiError> {
    payload.username = payload.username.trim().to_string();
    payload.email = payload.email.trim().to_lowercase();

    if payload.username.is_empty()
        || payload.email.is_empty()
        || payload.password.is_empty()
        || payload.retype_password.is_empty()
    {
        return Err(ApiError::bad_request("All fields are required"));
    }
    if payload.password != payload.retype_password {
        return Err(ApiError::bad_request(
            "Password and confirmation do not match",
        ));
    }
    if !is_valid_email(&payload.email) {
        warn!(email = %payload.email, "invalid email");
        return Err(ApiError::bad_request("Invalid email"));
    }

    // Pre-check for a friendlier message; the unique constraints still
    // backstop races (23505 maps to Conflict).
    if User::find_by_login(&state.db, &payload.username).await?.is_some()
        || User::find_by_email(&state.db, &payload.email).await?.is_some()
    {
        warn!(username = %payload.username, "identifier already taken");
        return Err(ApiError::conflict("Username or email already in use"));
    }

    let hash = hash_password(&payload.password)
        .map_err(|e| ApiError::internal("Failed to hash password", e))?;

    let user = User::create(&state.db, &payload.username, &payload.email, &hash).await?;

    info!(user_id = %user.id, username = %user.username, "user registered");
    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            message: "Registration successful".into(),
            user: PublicUser {
                id: user.id,
                username: user.username,
                email: user.email,
            },
        }),
    ))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let login = payload.login.trim();
    if login.is_empty() || payload.password.is_empty() {
        return Err(ApiError::bad_request("Login and password are required"));
    }

    // Unknown account and wrong password stay distinguishable, matching the
    // documented API (404 vs 401).
    let user = User::find_by_login(&state.db, login)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    let ok = verify_password(&payload.password, &user.password_hash)
        .map_err(|e| ApiError::internal("Failed to verify password", e))?;
    if !ok {
        warn!(user_id = %user.id, "login invalid password");
        return Err(ApiError::unauthorized("Wrong password"));
    }

    let token = JwtKeys::from_ref(&state)
        .sign_session(user.id)
        .map_err(|e| ApiError::internal("Failed to sign token", e))?;

    info!(user_id = %user.id, username = %user.username, "user logged in");
    Ok(Json(LoginResponse {
        message: "Login successful".into(),
        greeting: format!("Hello, {}!", user.username),
        token,
    }))
}

#[instrument(skip(state, session))]
pub async fn get_user(
    State(state): State<AppState>,
    session: AuthSession,
) -> Result<Json<UserInfoResponse>, ApiError> {
    let user = session.user;
    Ok(Json(UserInfoResponse {
        message: "User info retrieved".into(),
        user: UserInfo {
            username: user.username,
            image_link: image_link(&state.config.public_base_url, user.image.as_deref()),
            email: user.email,
        },
    }))
}

#[instrument(skip(state, session, mp))]
pub async fn edit_profile(
    State(state): State<AppState>,
    session: AuthSession,
    mut mp: Multipart,
) -> Result<Json<ProfileResponse>, ApiError> {
    let mut user = session.user;

    if let Some((filename, data)) = uploads::read_image_field(&mut mp).await? {
        if data.is_empty() {
            return Err(ApiError::bad_request("Uploaded image is empty"));
        }
        let name = uploads::unique_filename(filename.as_deref());
        let stored = uploads::save_upload(&state.config.upload_dir, &name, &data)
            .await
            .map_err(|e| ApiError::internal("Failed to store image", e))?;
        User::update_image(&state.db, user.id, &stored)
            .await
            .map_err(|e| ApiError::internal("Failed to update profile image", e))?;
        user.image = Some(stored);
        info!(user_id = %user.id, "profile image updated");
    }

    Ok(Json(ProfileResponse {
        message: "Profile image updated".into(),
        user: ProfileUser {
            id: user.id,
            username: user.username,
            email: user.email,
            image_link: image_link(&state.config.public_base_url, user.image.as_deref()),
            created_at: user.created_at,
        },
    }))
}

#[instrument(skip(state, session, payload))]
pub async fn change_password(
    State(state): State<AppState>,
    session: AuthSession,
    Json(payload): Json<ChangePasswordRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    if payload.new_password.is_empty() || payload.retype_password.is_empty() {
        return Err(ApiError::bad_request("All fields are required"));
    }
    if payload.new_password != payload.retype_password {
        return Err(ApiError::bad_request("Password confirmation does not match"));
    }

    let hash = hash_password(&payload.new_password)
        .map_err(|e| ApiError::internal("Failed to hash password", e))?;
    User::update_password(&state.db, session.user.id, &hash)
        .await
        .map_err(|e| ApiError::internal("Failed to update password", e))?;

    info!(user_id = %session.user.id, "password changed");
    Ok(Json(MessageResponse {
        message: "Password changed".into(),
    }))
}

#[instrument(skip(state, payload))]
pub async fn forgot_password(
    State(state): State<AppState>,
    Json(payload): Json<ForgotPasswordRequest>,
) -> Result<Json<ForgotPasswordResponse>, ApiError> {
    let email = payload.email.trim().to_lowercase();
    if email.is_empty() {
        return Err(ApiError::bad_request("Email is required"));
    }

    let user = User::find_by_email(&state.db, &email)
        .await?
        .ok_or_else(|| ApiError::not_found("Email not found"))?;

    let token = JwtKeys::from_ref(&state)
        .sign_reset(user.id)
        .map_err(|e| ApiError::internal("Failed to sign reset token", e))?;
    let reset_link = format!(
        "{}/auth/reset-password/{}?token={}",
        state.config.public_base_url.trim_end_matches('/'),
        user.id,
        token
    );

    let body = reset_email_body(
        &user.username,
        &reset_link,
        state.config.jwt.reset_ttl_minutes,
    );
    state
        .mailer
        .send(&user.email, "Reset Password Catascan", body)
        .await
        .map_err(|e| {
            error!(error = %e, user_id = %user.id, "reset email delivery failed");
            ApiError::upstream("Failed to send reset email", e)
        })?;

    info!(user_id = %user.id, "reset email queued");
    Ok(Json(ForgotPasswordResponse {
        message: "Password reset email sent".into(),
        reset_link,
    }))
}

#[instrument]
pub async fn reset_password_form(
    Path(id): Path<Uuid>,
    Query(query): Query<ResetTokenQuery>,
) -> (StatusCode, Html<String>) {
    let Some(token) = query.token else {
        return (
            StatusCode::BAD_REQUEST,
            Html("<h2>Token not provided</h2>".to_string()),
        );
    };

    let token = html_escape(&token);
    let form = format!(
        "<h2>Change Password</h2>\
         <form method=\"POST\" action=\"/auth/reset-password/{id}?token={token}\">\
           <input type=\"password\" name=\"newPassword\" placeholder=\"New Password\" required />\
           <input type=\"password\" name=\"retypePassword\" placeholder=\"Retype Password\" required />\
           <button type=\"submit\">Reset Password</button>\
         </form>"
    );
    (StatusCode::OK, Html(form))
}

#[instrument(skip(state, form))]
pub async fn reset_password(
    State(state): State<AppState>,
    Path(_id): Path<Uuid>,
    Query(query): Query<ResetTokenQuery>,
    Form(form): Form<ResetPasswordForm>,
) -> (StatusCode, Html<String>) {
    let Some(token) = query.token else {
        return (
            StatusCode::BAD_REQUEST,
            Html("<h3>Token not found</h3>".to_string()),
        );
    };
    if form.new_password.is_empty() || form.retype_password.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Html("<h3>Fields must not be empty</h3>".to_string()),
        );
    }
    if form.new_password != form.retype_password {
        return (
            StatusCode::BAD_REQUEST,
            Html("<h3>Passwords do not match</h3>".to_string()),
        );
    }

    // The user is identified by the token claims, not the path segment.
    let claims = match JwtKeys::from_ref(&state).verify_reset(&token) {
        Ok(c) => c,
        Err(e) => {
            warn!(error = %e, "reset token rejected");
            return (
                StatusCode::BAD_REQUEST,
                Html("<h3>Token invalid or expired</h3>".to_string()),
            );
        }
    };

    let user = match User::find_by_id(&state.db, claims.sub).await {
        Ok(Some(u)) => u,
        Ok(None) => {
            return (
                StatusCode::NOT_FOUND,
                Html("<h3>User not found</h3>".to_string()),
            )
        }
        Err(e) => {
            error!(error = %e, "reset password lookup failed");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Html("<h3>Server error</h3>".to_string()),
            );
        }
    };

    let hash = match hash_password(&form.new_password) {
        Ok(h) => h,
        Err(e) => {
            error!(error = %e, "hash_password failed");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Html("<h3>Server error</h3>".to_string()),
            );
        }
    };
    if let Err(e) = User::update_password(&state.db, user.id, &hash).await {
        error!(error = %e, user_id = %user.id, "password reset update failed");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Html("<h3>Server error</h3>".to_string()),
        );
    }

    info!(user_id = %user.id, "password reset completed");
    (
        StatusCode::OK,
        Html("<h2>Password has been reset. Please log in again.</h2>".to_string()),
    )
}

#[instrument(skip(state, session))]
pub async fn logout(
    State(state): State<AppState>,
    session: AuthSession,
) -> Result<Json<MessageResponse>, ApiError> {
    blacklist::revoke(&state.db, &session.token)
        .await
        .map_err(|e| ApiError::internal("Failed to log out", e))?;

    info!(user_id = %session.user.id, "token blacklisted");
    Ok(Json(MessageResponse {
        message: "Logout successful, token blacklisted".into(),
    }))
}
