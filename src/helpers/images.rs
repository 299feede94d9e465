//! Recipe images arrive as `data:image/<ext>;base64,<payload>` strings and are
//! stored as files under the media root.

use base64::{Engine, engine::general_purpose::STANDARD};
use std::path::Path;
use tracing::{debug, warn};

use crate::error::ApiError;

const IMAGE_DIR: &str = "recipes/images";
const ALLOWED_EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "gif", "webp"];

/// A decoded upload, not yet written anywhere.
#[derive(Debug, PartialEq, Eq)]
pub struct DecodedImage {
    pub extension: String,
    pub bytes: Vec<u8>,
}

pub fn decode_data_url(data: &str) -> Result<DecodedImage, ApiError> {
    let invalid = || ApiError::field("image", "Upload a valid image.");

    let rest = data.strip_prefix("data:image/").ok_or_else(invalid)?;
    let (extension, payload) = rest.split_once(";base64,").ok_or_else(invalid)?;
    let extension = extension.to_ascii_lowercase();
    if !ALLOWED_EXTENSIONS.contains(&extension.as_str()) {
        return Err(invalid());
    }

    let bytes = STANDARD.decode(payload.trim()).map_err(|_| invalid())?;
    if bytes.is_empty() {
        return Err(ApiError::field("image", "The submitted file is empty."));
    }
    Ok(DecodedImage { extension, bytes })
}

/// Writes the image below `media_root` and returns its relative path.
pub async fn save_image(media_root: &Path, image: DecodedImage) -> Result<String, ApiError> {
    let relative = format!(
        "{IMAGE_DIR}/{}.{}",
        uuid::Uuid::new_v4().simple(),
        image.extension
    );
    let target = media_root.join(&relative);
    if let Some(parent) = target.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| ApiError::Internal(format!("Failed to create media directory: {e}")))?;
    }
    tokio::fs::write(&target, &image.bytes)
        .await
        .map_err(|e| ApiError::Internal(format!("Failed to store image: {e}")))?;

    debug!("Stored image at {}", target.display());
    Ok(relative)
}

/// Best-effort removal of a previously stored image.
pub async fn remove_image(media_root: &Path, relative: &str) {
    let target = media_root.join(relative);
    if let Err(e) = tokio::fs::remove_file(&target).await {
        warn!("Could not remove image {}: {}", target.display(), e);
    }
}

/// Public URL of a stored image.
pub fn image_url(media_url: &str, relative: &str) -> String {
    format!("{}/{}", media_url.trim_end_matches('/'), relative)
}
