use chrono::{DateTime, Utc};
use common::storage::{ObjectKey, StorageError};
use uuid::Uuid;

const KNOWN_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp", "heic"];
const DEFAULT_EXTENSION: &str = "jpg";
const THUMB_SUFFIX: &str = "_thumb.webp";

/// Extension used in the object key for an uploaded file name.
///
/// Takes the text after the last `.`, lower-cased, keeping only ASCII
/// alphanumerics. Anything unrecognised falls back to `jpg`.
pub fn extension_for(file_name: &str) -> String {
    let Some((_, ext)) = file_name.rsplit_once('.') else {
        return DEFAULT_EXTENSION.to_string();
    };
    let ext: String = ext
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_lowercase())
        .collect();
    if KNOWN_EXTENSIONS.contains(&ext.as_str()) {
        ext
    } else {
        DEFAULT_EXTENSION.to_string()
    }
}

/// Allocate a fresh original key: `users/{owner}/photos/{YYYY-MM}/{id}.{ext}`.
///
/// The thumbnail key is never stored up front; `thumb_key_for` derives it.
pub fn allocate(
    owner_id: i32,
    file_name: &str,
    now: DateTime<Utc>,
) -> Result<ObjectKey, StorageError> {
    let id = Uuid::new_v4();
    ObjectKey::parse(format!(
        "users/{owner_id}/photos/{}/{id}.{}",
        now.format("%Y-%m"),
        extension_for(file_name)
    ))
}

/// Thumbnail key for an original key: same directory and base name with a
/// `_thumb.webp` suffix.
pub fn thumb_key_for(original: &ObjectKey) -> Result<ObjectKey, StorageError> {
    let name = original.file_name();
    let stem = name.rsplit_once('.').map_or(name, |(stem, _)| stem);
    original.with_file_name(&format!("{stem}{THUMB_SUFFIX}"))
}
