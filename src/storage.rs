use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::AppError;

pub const MAX_EMOJI_SIZE: usize = 256 * 1024; // 256 KB
pub const MAX_BACKUP_NAME_LEN: usize = 64;

/// Write `bytes` to `path` through a sibling temp file and a rename, so a
/// crash mid-write leaves the previous file intact.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;

    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("file");
    let tmp = dir.join(format!(".{file_name}.{}.tmp", uuid::Uuid::new_v4()));

    let result = (|| -> std::io::Result<()> {
        let mut file = std::fs::File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        std::fs::rename(&tmp, path)
    })();

    if result.is_err() {
        let _ = std::fs::remove_file(&tmp);
    }
    result
}

/// `write_atomic` on the blocking pool.
pub async fn write_atomic_async(path: PathBuf, bytes: Vec<u8>) -> std::io::Result<()> {
    tokio::task::spawn_blocking(move || write_atomic(&path, &bytes))
        .await
        .map_err(std::io::Error::other)?
}

/// Validate a user-supplied backup name. Only `[A-Za-z0-9_-]` is allowed so
/// the name can never escape the backup directory.
pub fn validate_backup_name(name: &str) -> Result<(), AppError> {
    if name.is_empty() {
        return Err(AppError::BadRequest("backup name must not be empty".to_string()));
    }
    if name.len() > MAX_BACKUP_NAME_LEN {
        return Err(AppError::BadRequest(format!(
            "backup name must be {MAX_BACKUP_NAME_LEN} characters or fewer"
        )));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(AppError::BadRequest(
            "backup name may only contain letters, digits, underscores and hyphens".to_string(),
        ));
    }
    Ok(())
}

/// Sanitize a path component (guild ids come from the platform, but still).
pub fn sanitize_component(name: &str) -> String {
    let name = name.replace(['/', '\\', '\0'], "_");
    let name = name.trim_start_matches('.');
    if name.is_empty() {
        "unknown".to_string()
    } else {
        name.to_string()
    }
}

/// Identify an image by its magic bytes.
pub fn sniff_image_type(bytes: &[u8]) -> Option<&'static str> {
    if bytes.starts_with(b"\x89PNG\r\n\x1a\n") {
        Some("image/png")
    } else if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
        Some("image/gif")
    } else if bytes.len() >= 12 && &bytes[..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        Some("image/webp")
    } else if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Some("image/jpeg")
    } else {
        None
    }
}

pub fn mime_to_ext(content_type: &str) -> &'static str {
    match content_type {
        "image/png" => "png",
        "image/gif" => "gif",
        "image/webp" => "webp",
        "image/jpeg" => "jpg",
        _ => "bin",
    }
}

/// Build a `data:<mime>;base64,<data>` URI for an image upload.
pub fn image_data_uri(bytes: &[u8]) -> Result<String, AppError> {
    let mime = sniff_image_type(bytes)
        .ok_or_else(|| AppError::BadRequest("unsupported or unrecognized image format".to_string()))?;
    Ok(format!(
        "data:{mime};base64,{}",
        data_encoding::BASE64.encode(bytes)
    ))
}

/// Reject images the platform would refuse anyway.
pub fn check_emoji_size(bytes: &[u8]) -> Result<(), AppError> {
    if bytes.len() > MAX_EMOJI_SIZE {
        return Err(AppError::PayloadTooLarge(format!(
            "emoji file is too large (max {} KB)",
            MAX_EMOJI_SIZE / 1024
        )));
    }
    Ok(())
}

/// Unique scratch path for tests.
pub fn temp_storage_path() -> PathBuf {
    let mut path = std::env::temp_dir();
    path.push(format!("emojibot-test-{}", uuid::Uuid::new_v4()));
    path
}
