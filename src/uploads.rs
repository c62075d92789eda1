use std::path::Path;

use anyhow::Context;
use axum::extract::Multipart;
use bytes::Bytes;
use time::OffsetDateTime;

use crate::error::ApiError;

/// Pull the `image` field out of a multipart request. Returns the original
/// filename (if any) and the raw bytes.
pub async fn read_image_field(
    mp: &mut Multipart,
) -> Result<Option<(Option<String>, Bytes)>, ApiError> {
    while let Some(field) = mp
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Invalid multipart body: {e}")))?
    {
        if field.name() == Some("image") {
            let filename = field.file_name().map(str::to_string);
            let data = field
                .bytes()
                .await
                .map_err(|e| ApiError::bad_request(format!("Failed to read image field: {e}")))?;
            return Ok(Some((filename, data)));
        }
    }
    Ok(None)
}

/// Unique on-disk name in the style `image-<millis>-<rand>.<ext>`.
pub fn unique_filename(original: Option<&str>) -> String {
    let ext = original
        .and_then(|name| Path::new(name).extension())
        .and_then(|e| e.to_str())
        .unwrap_or("bin");
    let millis = OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000;
    format!("image-{}-{}.{}", millis, rand::random::<u32>(), ext)
}

/// Write the upload to the shared uploads directory and return the relative
/// path recorded on the owning record (always `uploads/<name>`, the prefix
/// the static file service answers under).
pub async fn save_upload(dir: &str, filename: &str, body: &[u8]) -> anyhow::Result<String> {
    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("create upload dir {dir}"))?;
    let disk_path = Path::new(dir).join(filename);
    tokio::fs::write(&disk_path, body)
        .await
        .with_context(|| format!("write upload {}", disk_path.display()))?;
    Ok(format!("uploads/{filename}"))
}

/// Stored paths are relative; rewrite to an absolute URL for display.
/// Legacy records may contain backslashes.
pub fn public_url(base: &str, stored_path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        stored_path.replace('\\', "/")
    )
}
