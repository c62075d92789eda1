use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    /// TTL for password-reset tokens. Session tokens carry no expiry.
    pub reset_ttl_minutes: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InferenceConfig {
    pub url: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SmtpConfig {
    pub host: String,
    pub username: String,
    pub password: String,
    pub from: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    /// Base URL clients reach us at; used for reset links and photo URLs.
    pub public_base_url: String,
    pub upload_dir: String,
    pub jwt: JwtConfig,
    pub inference: InferenceConfig,
    pub smtp: SmtpConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")?;
        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET")?,
            reset_ttl_minutes: std::env::var("RESET_TTL_MINUTES")
                .ok()
                .and_then(|v| v.parse::<i64>().ok())
                .unwrap_or(10),
        };
        let inference = InferenceConfig {
            url: std::env::var("INFERENCE_URL")
                .unwrap_or_else(|_| "http://localhost:5000/predict".into()),
            timeout_secs: std::env::var("INFERENCE_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(30),
        };
        let smtp = SmtpConfig {
            host: std::env::var("SMTP_HOST").unwrap_or_else(|_| "smtp.gmail.com".into()),
            username: std::env::var("SMTP_USER").unwrap_or_default(),
            password: std::env::var("SMTP_PASS").unwrap_or_default(),
            from: std::env::var("SMTP_FROM")
                .or_else(|_| std::env::var("SMTP_USER"))
                .unwrap_or_default(),
        };
        Ok(Self {
            database_url,
            public_base_url: std::env::var("PUBLIC_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:3000".into()),
            upload_dir: std::env::var("UPLOAD_DIR").unwrap_or_else(|_| "uploads".into()),
            jwt,
            inference,
            smtp,
        })
    }
}
