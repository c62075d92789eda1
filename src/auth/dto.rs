use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// Request body for registration; confirmation field must match.
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    pub retype_password: String,
}

/// `login` accepts either a username or an email address.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub login: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub message: String,
    pub greeting: String,
    pub token: String,
}

/// Public profile fields only; never the hash.
#[derive(Debug, Serialize)]
pub struct PublicUser {
    pub id: Uuid,
    pub username: String,
    pub email: String,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub message: String,
    pub user: PublicUser,
}

#[derive(Debug, Serialize)]
pub struct UserInfo {
    pub username: String,
    pub image_link: Option<String>,
    pub email: String,
}

#[derive(Debug, Serialize)]
pub struct UserInfoResponse {
    pub message: String,
    pub user: UserInfo,
}

#[derive(Debug, Serialize)]
pub struct ProfileUser {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub image_link: Option<String>,
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Serialize)]
pub struct ProfileResponse {
    pub message: String,
    pub user: ProfileUser,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    pub new_password: String,
    pub retype_password: String,
}

#[derive(Debug, Deserialize)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

#[derive(Debug, Serialize)]
pub struct ForgotPasswordResponse {
    pub message: String,
    #[serde(rename = "resetLink")]
    pub reset_link: String,
}

/// Form-encoded body of the reset-password page.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordForm {
    pub new_password: String,
    pub retype_password: String,
}

#[derive(Debug, Deserialize)]
pub struct ResetTokenQuery {
    pub token: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}
